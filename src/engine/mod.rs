//! DSP engine boundary.
//!
//! The engine is an external real-time process; the controller talks to it
//! over a small synchronous protocol. [`DspEngine`] is the seam: the TCP
//! client implements it for production, [`MockEngine`] for tests.

pub mod client;
pub mod mock;

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::pipeline::EngineConfig;

pub use client::{scrape_log_errors, wait_running, TcpEngineClient};
pub use mock::{MockEngine, MockHandle};

/// Processing state reported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EngineState {
    Starting,
    Running,
    Paused,
    Inactive,
}

/// Synchronous adapter to the external DSP engine.
///
/// `apply` pushes a complete configuration; incremental edits are expected
/// to start from `active_config` rather than a local cache, so controller
/// and engine cannot drift. The engine also owns the main fader and mute.
pub trait DspEngine: Send {
    /// Push a full configuration and wait the settle delay.
    fn apply(&mut self, config: &EngineConfig) -> Result<()>;

    /// Read back the live configuration.
    fn active_config(&mut self) -> Result<EngineConfig>;

    fn state(&mut self) -> Result<EngineState>;

    fn set_volume(&mut self, db: f32) -> Result<()>;
    fn volume(&mut self) -> Result<f32>;
    fn set_mute(&mut self, mute: bool) -> Result<()>;
    fn mute(&mut self) -> Result<bool>;
}

/// Engine handle shared between the command path and the EQ worker.
pub type SharedEngine = Arc<Mutex<Box<dyn DspEngine>>>;

/// Wrap an engine implementation for shared use.
pub fn shared(engine: Box<dyn DspEngine>) -> SharedEngine {
    Arc::new(Mutex::new(engine))
}
