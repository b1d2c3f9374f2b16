//! In-memory engine used by the test suites.
//!
//! Behaves like the real engine from the controller's point of view: it
//! stores the applied configuration, serves it back, and owns fader/mute
//! values. Tests keep the shared handle to inspect or sabotage it.

use std::sync::{Arc, Mutex};

use crate::engine::{DspEngine, EngineState};
use crate::error::{PreampError, Result};
use crate::pipeline::EngineConfig;

/// Observable internals of the mock.
#[derive(Debug)]
pub struct MockInner {
    /// Every configuration pushed, in order.
    pub applied: Vec<EngineConfig>,
    pub active: Option<EngineConfig>,
    pub volume: f32,
    pub muted: bool,
    pub state: EngineState,
    /// When set, the next `apply` fails as if the engine refused it.
    pub fail_apply: bool,
}

impl Default for MockInner {
    fn default() -> Self {
        Self {
            applied: Vec::new(),
            active: None,
            volume: 0.0,
            muted: false,
            state: EngineState::Running,
            fail_apply: false,
        }
    }
}

/// Shared handle tests keep next to the boxed engine.
pub type MockHandle = Arc<Mutex<MockInner>>;

pub struct MockEngine {
    inner: MockHandle,
}

impl MockEngine {
    pub fn new() -> (Self, MockHandle) {
        let inner: MockHandle = Arc::default();
        (
            Self {
                inner: Arc::clone(&inner),
            },
            inner,
        )
    }
}

impl DspEngine for MockEngine {
    fn apply(&mut self, config: &EngineConfig) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.fail_apply {
            return Err(PreampError::EngineUnavailable {
                reason: "mock engine refused the config".into(),
            });
        }
        inner.applied.push(config.clone());
        inner.active = Some(config.clone());
        Ok(())
    }

    fn active_config(&mut self) -> Result<EngineConfig> {
        self.inner
            .lock()
            .unwrap()
            .active
            .clone()
            .ok_or_else(|| PreampError::EngineUnavailable {
                reason: "no configuration loaded".into(),
            })
    }

    fn state(&mut self) -> Result<EngineState> {
        Ok(self.inner.lock().unwrap().state)
    }

    fn set_volume(&mut self, db: f32) -> Result<()> {
        self.inner.lock().unwrap().volume = db;
        Ok(())
    }

    fn volume(&mut self) -> Result<f32> {
        Ok(self.inner.lock().unwrap().volume)
    }

    fn set_mute(&mut self, mute: bool) -> Result<()> {
        self.inner.lock().unwrap().muted = mute;
        Ok(())
    }

    fn mute(&mut self) -> Result<bool> {
        Ok(self.inner.lock().unwrap().muted)
    }
}
