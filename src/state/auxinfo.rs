//! Shared auxiliary info file.
//!
//! Slow external observers (the web page, a monitor daemon) cannot tell when
//! a new EQ curve has landed on disk. After each reload the `new_eq_graph`
//! flag is raised here and cleared by a short timer, giving them a window to
//! notice the change. The file is shared without a lock; failures are logged
//! and never fail the owning command.

use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::warn;
use serde::{Deserialize, Serialize};

/// How long the `new_eq_graph` flag stays raised.
const FLAG_WINDOW: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct AuxInfoFile {
    new_eq_graph: bool,
    last_eq_update: Option<DateTime<Utc>>,
}

/// Handle on the shared aux-info JSON file.
#[derive(Debug, Clone)]
pub struct AuxInfo {
    path: PathBuf,
}

impl AuxInfo {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Raise the `new_eq_graph` flag and start a timer that clears it.
    /// Fire-and-forget: the timer thread is not joined and a write failure
    /// only warns.
    pub fn pulse_new_eq_graph(&self) {
        self.set_flag(true, true);

        let aux = self.clone();
        thread::spawn(move || {
            thread::sleep(FLAG_WINDOW);
            aux.set_flag(false, false);
        });
    }

    pub fn new_eq_graph(&self) -> bool {
        self.read().new_eq_graph
    }

    fn set_flag(&self, mode: bool, stamp: bool) {
        let mut info = self.read();
        info.new_eq_graph = mode;
        if stamp {
            info.last_eq_update = Some(Utc::now());
        }
        self.write(&info);
    }

    fn read(&self) -> AuxInfoFile {
        fs::read_to_string(&self.path)
            .ok()
            .and_then(|content| serde_json::from_str(&content).ok())
            .unwrap_or_default()
    }

    fn write(&self, info: &AuxInfoFile) {
        let content = match serde_json::to_string(info) {
            Ok(c) => c,
            Err(e) => {
                warn!("cannot serialize aux info: {}", e);
                return;
            }
        };
        if let Err(e) = fs::write(&self.path, content) {
            warn!("cannot write aux info {}: {}", self.path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_flag_defaults_false() {
        let dir = tempdir().unwrap();
        let aux = AuxInfo::new(dir.path().join(".aux_info"));
        assert!(!aux.new_eq_graph());
    }

    #[test]
    fn test_pulse_raises_then_clears() {
        let dir = tempdir().unwrap();
        let aux = AuxInfo::new(dir.path().join(".aux_info"));

        aux.pulse_new_eq_graph();
        assert!(aux.new_eq_graph());

        thread::sleep(FLAG_WINDOW + Duration::from_millis(300));
        assert!(!aux.new_eq_graph());
    }

    #[test]
    fn test_pulse_stamps_update_time() {
        let dir = tempdir().unwrap();
        let aux = AuxInfo::new(dir.path().join(".aux_info"));

        aux.pulse_new_eq_graph();
        let info = aux.read();
        assert!(info.last_eq_update.is_some());
    }

    #[test]
    fn test_foreign_fields_survive_default() {
        // A sibling process may have written fields we do not know about;
        // reading must not fail on them.
        let dir = tempdir().unwrap();
        let path = dir.path().join(".aux_info");
        fs::write(&path, r#"{ "new_eq_graph": true, "amp_on": "yes" }"#).unwrap();

        let aux = AuxInfo::new(&path);
        assert!(aux.new_eq_graph());
    }
}
