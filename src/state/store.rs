//! Durable storage for the preamp state.
//!
//! The state file is shared with sibling processes (a monitor daemon, web
//! helpers) without a lock: writes use a short bounded retry and the last
//! writer wins.

use std::fs;
use std::path::{Path, PathBuf};
use std::thread::sleep;
use std::time::Duration;

use log::{debug, error, warn};

use crate::error::{PreampError, Result};
use crate::state::PreampState;

/// Attempts before a contended write is given up.
const WRITE_TRIES: u32 = 10;
const WRITE_RETRY_PERIOD: Duration = Duration::from_millis(100);

/// Loads and persists the [`PreampState`] record at a fixed path.
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the persisted state, falling back to defaults when the file is
    /// absent or unparsable. Pure reads never touch the file.
    pub fn load(&self) -> PreampState {
        match fs::read_to_string(&self.path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(state) => state,
                Err(e) => {
                    warn!(
                        "corrupt state file {}, using defaults: {}",
                        self.path.display(),
                        e
                    );
                    PreampState::default()
                }
            },
            Err(_) => {
                warn!(
                    "no state file at {}, using defaults",
                    self.path.display()
                );
                PreampState::default()
            }
        }
    }

    /// Persist the state with bounded retry on write contention.
    pub fn persist(&self, state: &PreampState) -> Result<()> {
        let content = serde_json::to_string(state)?;

        let mut tries = WRITE_TRIES;
        loop {
            match fs::write(&self.path, &content) {
                Ok(()) => return Ok(()),
                Err(e) if tries > 1 => {
                    tries -= 1;
                    debug!("state write contended, retrying: {e}");
                    sleep(WRITE_RETRY_PERIOD);
                }
                Err(e) => {
                    error!("cannot persist state to {}: {}", self.path.display(), e);
                    return Err(PreampError::FileWrite {
                        path: self.path.clone(),
                        source: e,
                    });
                }
            }
        }
    }
}
