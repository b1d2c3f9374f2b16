//! TCP client for the DSP engine.
//!
//! One JSON request per line, one JSON reply per line. The engine applies a
//! new configuration asynchronously, so `apply` blocks for a short fixed
//! settle delay before returning; that keeps command handling strictly
//! ordered at the cost of a bounded wait.

use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::net::TcpStream;
use std::path::Path;
use std::thread::sleep;
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::engine::{DspEngine, EngineState};
use crate::error::{PreampError, Result};
use crate::pipeline::EngineConfig;

const CONNECT_TRIES: u32 = 15;
const CONNECT_RETRY_PERIOD: Duration = Duration::from_millis(200);
const HEALTH_POLL_PERIOD: Duration = Duration::from_millis(500);
const READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Settle delay after pushing a configuration.
const APPLY_SETTLE: Duration = Duration::from_millis(100);

#[derive(Debug, Serialize)]
enum Request<'a> {
    SetConfig(&'a EngineConfig),
    GetConfig,
    GetState,
    SetVolume(f32),
    GetVolume,
    SetMute(bool),
    GetMute,
}

#[derive(Debug, Deserialize, PartialEq)]
enum ReplyResult {
    Ok,
    Error,
}

#[derive(Debug, Deserialize)]
struct Reply {
    result: ReplyResult,
    #[serde(default)]
    value: serde_json::Value,
}

/// Synchronous JSON-line client on the engine control socket.
pub struct TcpEngineClient {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
    addr: String,
}

impl TcpEngineClient {
    /// Connect with bounded retries and fixed backoff. Exhausting the
    /// retries at startup is fatal for the caller: no audio path exists
    /// without the engine.
    pub fn connect(addr: &str) -> Result<Self> {
        let mut tries = CONNECT_TRIES;
        loop {
            match TcpStream::connect(addr) {
                Ok(stream) => {
                    stream.set_read_timeout(Some(READ_TIMEOUT))?;
                    let reader = BufReader::new(stream.try_clone()?);
                    info!("connected to engine at {addr}");
                    return Ok(Self {
                        reader,
                        writer: stream,
                        addr: addr.to_string(),
                    });
                }
                Err(e) => {
                    tries -= 1;
                    if tries == 0 {
                        return Err(PreampError::EngineUnavailable {
                            reason: format!("cannot connect to {addr}: {e}"),
                        });
                    }
                    debug!("engine not up yet at {addr}, retrying: {e}");
                    sleep(CONNECT_RETRY_PERIOD);
                }
            }
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    fn request(&mut self, request: &Request) -> Result<serde_json::Value> {
        let mut line = serde_json::to_string(request)?;
        line.push('\n');
        self.writer
            .write_all(line.as_bytes())
            .map_err(|e| PreampError::EngineUnavailable {
                reason: format!("send to {} failed: {e}", self.addr),
            })?;

        let mut reply_line = String::new();
        self.reader
            .read_line(&mut reply_line)
            .map_err(|e| PreampError::EngineUnavailable {
                reason: format!("read from {} failed: {e}", self.addr),
            })?;

        let reply: Reply = serde_json::from_str(&reply_line)?;
        match reply.result {
            ReplyResult::Ok => Ok(reply.value),
            ReplyResult::Error => Err(PreampError::EngineUnavailable {
                reason: reply
                    .value
                    .as_str()
                    .unwrap_or("engine refused the request")
                    .to_string(),
            }),
        }
    }
}

impl DspEngine for TcpEngineClient {
    fn apply(&mut self, config: &EngineConfig) -> Result<()> {
        self.request(&Request::SetConfig(config))?;
        // the engine reconfigures asynchronously
        sleep(APPLY_SETTLE);
        Ok(())
    }

    fn active_config(&mut self) -> Result<EngineConfig> {
        let value = self.request(&Request::GetConfig)?;
        Ok(serde_json::from_value(value)?)
    }

    fn state(&mut self) -> Result<EngineState> {
        let value = self.request(&Request::GetState)?;
        Ok(serde_json::from_value(value)?)
    }

    fn set_volume(&mut self, db: f32) -> Result<()> {
        self.request(&Request::SetVolume(db)).map(|_| ())
    }

    fn volume(&mut self) -> Result<f32> {
        let value = self.request(&Request::GetVolume)?;
        Ok(serde_json::from_value(value)?)
    }

    fn set_mute(&mut self, mute: bool) -> Result<()> {
        self.request(&Request::SetMute(mute)).map(|_| ())
    }

    fn mute(&mut self) -> Result<bool> {
        let value = self.request(&Request::GetMute)?;
        Ok(serde_json::from_value(value)?)
    }
}

/// Poll the engine until it reports `Running`, for at most `timeout`.
///
/// On expiry the engine's own log is scraped and its error lines surface
/// verbatim in the returned error.
pub fn wait_running(
    engine: &mut dyn DspEngine,
    timeout: Duration,
    log_path: &Path,
) -> Result<()> {
    let deadline = Instant::now() + timeout;
    loop {
        match engine.state() {
            Ok(EngineState::Running) => return Ok(()),
            Ok(other) => debug!("engine state {:?}, waiting", other),
            Err(e) => warn!("engine state poll failed: {e}"),
        }
        if Instant::now() >= deadline {
            let errors = scrape_log_errors(log_path);
            let reason = if errors.is_empty() {
                "engine did not reach Running".to_string()
            } else {
                format!("engine did not reach Running: {}", errors.join(" | "))
            };
            return Err(PreampError::EngineUnavailable { reason });
        }
        sleep(HEALTH_POLL_PERIOD);
    }
}

/// Error-tagged lines of the engine log, verbatim.
pub fn scrape_log_errors(log_path: &Path) -> Vec<String> {
    match fs::read_to_string(log_path) {
        Ok(content) => content
            .lines()
            .filter(|l| l.contains("ERROR"))
            .map(|l| l.trim().to_string())
            .collect(),
        Err(e) => {
            warn!("cannot read engine log {}: {e}", log_path.display());
            Vec::new()
        }
    }
}
