//! Unified error types for the gridscope ecosystem
//!
//! This module provides a common error type [`EpisodeError`] shared by the
//! analytics pipeline. Construction-time failures (malformed actions,
//! misaligned record sequences) abort the whole build; lookup-time failures
//! (unknown equipment names) are recoverable per call.

use thiserror::Error;

/// Unified error type for episode analytics operations.
#[derive(Error, Debug)]
pub enum EpisodeError {
    /// An action record cannot be introspected for topological impact.
    /// Fatal to the construction of that episode's analytics: silently
    /// emitting zero impact would corrupt downstream KPI counts.
    #[error("malformed action: {0}")]
    MalformedAction(String),

    /// Observation/action/reward/event sequence lengths violate the
    /// expected T+1/T/T/T relationship. Fatal.
    #[error("misaligned episode sequences: {0}")]
    MisalignedSequence(String),

    /// A table lookup was requested for an equipment name not present in
    /// the episode's static metadata. Recoverable by the caller.
    #[error("unknown equipment '{0}'")]
    UnknownEquipment(String),

    /// I/O errors (file access, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Parsing/deserialization errors
    #[error("parse error: {0}")]
    Parse(String),

    /// Generic errors (for wrapping external errors)
    #[error("{0}")]
    Other(String),
}

/// Convenience type alias for Results using EpisodeError.
pub type EpisodeResult<T> = Result<T, EpisodeError>;

impl From<anyhow::Error> for EpisodeError {
    fn from(err: anyhow::Error) -> Self {
        EpisodeError::Other(err.to_string())
    }
}

impl From<serde_json::Error> for EpisodeError {
    fn from(err: serde_json::Error) -> Self {
        EpisodeError::Parse(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = EpisodeError::MalformedAction("no line status vector".into());
        assert!(err.to_string().contains("malformed action"));
        assert!(err.to_string().contains("no line status vector"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: EpisodeError = io_err.into();
        assert!(matches!(err, EpisodeError::Io(_)));
    }

    #[test]
    fn test_question_mark_operator() {
        fn inner() -> EpisodeResult<()> {
            Err(EpisodeError::UnknownEquipment("load_99".into()))
        }

        fn outer() -> EpisodeResult<()> {
            inner()?;
            Ok(())
        }

        assert!(outer().is_err());
    }
}
