//! Error types for rate-limit annotation processing.

use thiserror::Error;

/// Main error type for annotation processing.
#[derive(Error, Debug)]
pub enum Error {
    /// A directive value could not be parsed as an integer, duration or size
    #[error("invalid value '{value}' in {directive} annotation: {reason}")]
    Parse {
        directive: String,
        value: String,
        reason: String,
    },

    /// A directive was processed before the directive it depends on
    #[error("{directive} annotation requires rate-limit-requests to be set first")]
    MissingPrerequisite { directive: String },

    /// A whitelist entry is neither an IP address nor a CIDR block
    #[error("incorrect address '{address}' in {directive} annotation")]
    InvalidAddress { address: String, directive: String },

    /// The directive name is not part of the rate-limit vocabulary
    #[error("unknown rate-limit annotation '{0}'")]
    UnknownDirective(String),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn parse(directive: impl Into<String>, value: &str, reason: impl ToString) -> Self {
        Error::Parse {
            directive: directive.into(),
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Result type alias for annotation processing.
pub type Result<T> = std::result::Result<T, Error>;
