//! Domain error type shared by every component.

use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TabulaError {
    /// A requested resource could not be opened.
    #[error("Not found: {0}")]
    NotFound(String),

    /// An option value that could not be interpreted.
    #[error("Invalid value '{value}' for {option}: {reason}")]
    MalformedOption {
        option: String,
        value: String,
        reason: String,
    },

    /// A second pass was requested over a source that can only be read once.
    #[error("{0} has already been read and cannot be read again")]
    MultiPassUnsupported(String),

    #[error("I/O error on {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },

    #[error("{location}: {message}")]
    Mapping { location: String, message: String },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl TabulaError {
    /// Wrap an I/O error, turning `NotFound` into the dedicated variant.
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        let context = context.into();
        if source.kind() == io::ErrorKind::NotFound {
            return TabulaError::NotFound(context);
        }
        TabulaError::Io { context, source }
    }

    pub fn mapping(location: impl Into<String>, message: impl Into<String>) -> Self {
        TabulaError::Mapping {
            location: location.into(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, TabulaError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_not_found_becomes_not_found() {
        let err = TabulaError::io("data.csv", io::Error::new(io::ErrorKind::NotFound, "gone"));
        assert!(matches!(err, TabulaError::NotFound(ref p) if p == "data.csv"));
    }

    #[test]
    fn io_other_keeps_source() {
        let err = TabulaError::io(
            "data.csv",
            io::Error::new(io::ErrorKind::PermissionDenied, "nope"),
        );
        assert!(matches!(err, TabulaError::Io { .. }));
        assert!(std::error::Error::source(&err).is_some());
        assert!(err.to_string().contains("data.csv"));
    }
}
