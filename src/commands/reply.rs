//! Command replies.
//!
//! Every command yields exactly one reply: `done`, a clamp notice, a
//! descriptive error string, or a JSON payload for getters.

use std::fmt;

use crate::error::PreampError;

#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Done,
    /// The request was applied, but the value was clamped (or rounded) to
    /// what the hardware path accepts; callers reconcile against this value.
    Clamped(f32),
    /// The command named the value already in effect.
    Nothing,
    Json(serde_json::Value),
    Error(String),
}

impl Reply {
    pub fn from_error(e: &PreampError) -> Self {
        Reply::Error(e.to_string())
    }

    pub fn is_done(&self) -> bool {
        matches!(self, Reply::Done | Reply::Clamped(_))
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Done => write!(f, "done"),
            Reply::Clamped(value) => write!(f, "clamped to {value}"),
            Reply::Nothing => write!(f, "nothing was done"),
            Reply::Json(value) => write!(f, "{value}"),
            Reply::Error(msg) => write!(f, "{msg}"),
        }
    }
}
