//! Error types for the loader.

use thiserror::Error;

/// Failures surfaced by the engine to caller code.
#[derive(Error, Debug)]
pub enum LoaderError {
    /// A module whose fetch failed was required or executed.
    #[error("module was broken: {location}")]
    Broken {
        /// Canonical location of the broken module.
        location: String,
    },

    /// A module was required before its definition arrived.
    #[error("module is not loaded yet: {location}")]
    NotLoaded { location: String },

    /// A module factory returned an error.
    #[error("factory for {location} failed: {source}")]
    Factory {
        /// Canonical location of the module being executed.
        location: String,
        /// What the factory reported.
        #[source]
        source: anyhow::Error,
    },

    /// The completion channel closed while fetches were still outstanding.
    #[error("completion channel closed with {in_flight} fetches in flight")]
    Disconnected {
        /// Number of request locations still waiting for completion.
        in_flight: usize,
    },

    /// A map rule pattern did not compile.
    #[error("invalid map pattern {pattern:?}: {source}")]
    InvalidPattern {
        /// The offending pattern text.
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// Configuration text could not be decoded.
    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),
}

/// Transport-level failures carried inside a [`Completion`](crate::transport::Completion).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("resource not found: {location}")]
    NotFound { location: String },

    #[error("io error fetching {location}: {message}")]
    Io { location: String, message: String },

    #[error("could not decode {location}: {message}")]
    Decode { location: String, message: String },
}

pub type Result<T, E = LoaderError> = std::result::Result<T, E>;
