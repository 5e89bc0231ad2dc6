//! Error types for package index resolution.

use miette::Diagnostic;
use thiserror::Error;

/// Result type for resolver operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while resolving a tool spec against the package index.
#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    /// The index request could not be completed.
    #[error("package index request failed for `{alias}@{version}`: {message}")]
    #[diagnostic(
        code(ordo::resolver::index_request),
        help("check network connectivity and the configured index URL")
    )]
    IndexRequest {
        /// Requested package alias.
        alias: String,
        /// Requested version.
        version: String,
        /// Transport-level failure description.
        message: String,
    },

    /// The index responded with a body that did not decode.
    #[error("package index returned an unreadable response for `{alias}@{version}`")]
    #[diagnostic(code(ordo::resolver::index_parse))]
    IndexParse {
        /// Requested package alias.
        alias: String,
        /// Requested version.
        version: String,
        /// Underlying decode error.
        #[source]
        source: serde_json::Error,
    },

    /// The index has no entry for this alias and version.
    #[error("package `{alias}@{version}` not found in the index")]
    #[diagnostic(code(ordo::resolver::package_not_found))]
    PackageNotFound {
        /// Requested package alias.
        alias: String,
        /// Requested version.
        version: String,
    },

    /// An entry exists but carries no record for the current system.
    #[error("package `{alias}@{version}` has no build for system `{system}`")]
    #[diagnostic(code(ordo::resolver::unsupported_system))]
    UnsupportedSystem {
        /// Requested package alias.
        alias: String,
        /// Requested version.
        version: String,
        /// The current system string.
        system: String,
    },

    /// The host is not one of the supported system architectures.
    #[error("unsupported host system `{system}`")]
    #[diagnostic(
        code(ordo::resolver::unsupported_host),
        help("supported systems: x86_64-linux, aarch64-linux, x86_64-darwin, aarch64-darwin")
    )]
    UnsupportedHost {
        /// The detected arch-os pair.
        system: String,
    },
}
