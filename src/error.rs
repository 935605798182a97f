//! Error types for the message converter.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using the converter's Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for converter operations.
#[derive(Error, Debug)]
pub enum Error {
    /// The custom payload type was selected without a converter library.
    #[error("no converter library configured for custom payload type")]
    MissingConverterLibrary,

    /// The converter library could not be opened.
    #[error("failed to load converter library {path}: {reason}")]
    ConverterLoad {
        /// Path that was handed to the loader.
        path: PathBuf,
        /// Loader error detail.
        reason: String,
    },

    /// The converter library does not export one of the required symbols.
    #[error("converter library is missing symbol: {symbol}")]
    MissingSymbol {
        /// Name of the first symbol that failed to resolve.
        symbol: &'static str,
    },

    /// The converter returned no context.
    #[error("converter failed to create a context for payload type {0}")]
    ContextCreation(crate::payload::PayloadType),

    /// The user metadata pool has no free slots.
    #[error("user metadata pool exhausted: no slots available")]
    PoolExhausted,

    /// A configuration property had an unusable value.
    #[error("invalid value for property '{name}': {reason}")]
    InvalidProperty {
        /// Property name.
        name: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// A property that is immutable while running was changed after start.
    #[error("property '{0}' cannot be changed while the converter is running")]
    AlreadyStarted(&'static str),

    /// A buffer was pushed before the element was started.
    #[error("converter element is not started")]
    NotStarted,

    /// Encoding the payload document failed.
    #[error("payload serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Whether this error is fatal at start rather than per buffer.
    pub fn is_startup_error(&self) -> bool {
        matches!(
            self,
            Error::MissingConverterLibrary
                | Error::ConverterLoad { .. }
                | Error::MissingSymbol { .. }
                | Error::ContextCreation(_)
        )
    }
}
