//! Error types for environment hydration.

use miette::Diagnostic;
use thiserror::Error;

/// Result type for environment factory operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while hydrating a hermetic environment.
#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    /// Resolving a tool spec against the package index failed.
    #[error(transparent)]
    #[diagnostic(transparent)]
    Resolver(#[from] ordo_resolver::Error),

    /// Materialising the build shell or parsing its variables failed.
    #[error("environment hydration failed: {message}")]
    #[diagnostic(
        code(ordo::envs::hydration),
        help("check that the builder tool is installed and flakes are enabled")
    )]
    EnvironmentHydration {
        /// What went wrong, including any builder stderr.
        message: String,
    },
}

impl Error {
    /// Create a hydration error.
    #[must_use]
    pub fn hydration(message: impl Into<String>) -> Self {
        Self::EnvironmentHydration {
            message: message.into(),
        }
    }
}
