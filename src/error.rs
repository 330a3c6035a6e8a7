use std::sync::Arc;

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced while looking up toggles or configuring a toggle map.
#[derive(thiserror::Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
    /// The requested key has no corresponding toggle record.
    #[error("unable to look up toggle state for key {key}")]
    ToggleNotFound {
        /// The key that was looked up.
        key: String,
    },

    /// The backing source (e.g., a remote table) could not be queried.
    #[error("toggle source unavailable: {0}")]
    SourceUnavailable(Arc<dyn std::error::Error + Send + Sync>),

    /// An I/O error.
    #[error(transparent)]
    // std::io::Error is not clonable, so we're wrapping it in an Arc.
    Io(Arc<std::io::Error>),

    /// A toggle document could not be parsed.
    #[error("unable to parse toggle document")]
    Document(#[source] Arc<serde_yaml::Error>),

    /// Cache spec string is malformed. This is a configuration error and is never produced
    /// at lookup time.
    #[error("invalid cache spec {spec:?}: {reason}")]
    InvalidCacheSpec {
        /// The offending spec string.
        spec: String,
        /// What is wrong with it.
        reason: String,
    },
}

impl Error {
    pub(crate) fn not_found(key: impl Into<String>) -> Error {
        Error::ToggleNotFound { key: key.into() }
    }

    /// Wrap an arbitrary source error as [`Error::SourceUnavailable`].
    pub fn source_unavailable(err: impl std::error::Error + Send + Sync + 'static) -> Error {
        Error::SourceUnavailable(Arc::new(err))
    }

    /// Returns `true` if the error signals that toggle data is absent or unreachable, as opposed
    /// to a programming or configuration error.
    ///
    /// Caching maps absorb these into a fallback answer.
    pub fn is_lookup_failure(&self) -> bool {
        match self {
            Error::ToggleNotFound { .. }
            | Error::SourceUnavailable(_)
            | Error::Io(_)
            | Error::Document(_) => true,
            Error::InvalidCacheSpec { .. } => false,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::Io(Arc::new(value))
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(value: serde_yaml::Error) -> Self {
        Self::Document(Arc::new(value))
    }
}
