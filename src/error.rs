//! Error handling for preampd.
//!
//! Command-facing errors render to the short reply strings the control
//! protocol expects; infrastructure errors carry their source.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for preampd operations
pub type Result<T> = std::result::Result<T, PreampError>;

/// Main error type for preampd operations
#[derive(Error, Debug)]
pub enum PreampError {
    /// A command argument or selection that cannot be accepted.
    /// The message is sent back to the client verbatim.
    #[error("{reason}")]
    Validation { reason: String },

    /// The projected gain structure would clip.
    #[error("no headroom")]
    NoHeadroom { headroom: f32 },

    /// The DSP engine could not be reached or refused the operation.
    #[error("engine unavailable: {reason}")]
    EngineUnavailable { reason: String },

    /// The compiler produced or met a graph that references an unknown
    /// filter or mixer. This is a programming/data error, not user input.
    #[error("config inconsistency: {reason}")]
    ConfigInconsistency { reason: String },

    #[error("cannot read {path}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot write {path}")]
    FileWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PreampError {
    pub fn validation(reason: impl Into<String>) -> Self {
        PreampError::Validation {
            reason: reason.into(),
        }
    }

    pub fn inconsistency(reason: impl Into<String>) -> Self {
        PreampError::ConfigInconsistency {
            reason: reason.into(),
        }
    }

    /// True for errors that reject the command but leave the process healthy.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            PreampError::Validation { .. } | PreampError::NoHeadroom { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_headroom_message() {
        let err = PreampError::NoHeadroom { headroom: -3.5 };
        assert_eq!(err.to_string(), "no headroom");
        assert!(err.is_rejection());
    }

    #[test]
    fn test_validation_message_is_verbatim() {
        let err = PreampError::validation("must be in: [\"sofa\", \"desk\"]");
        assert_eq!(err.to_string(), "must be in: [\"sofa\", \"desk\"]");
        assert!(err.is_rejection());
    }

    #[test]
    fn test_engine_error_is_not_rejection() {
        let err = PreampError::EngineUnavailable {
            reason: "connect timed out".into(),
        };
        assert!(!err.is_rejection());
    }
}
