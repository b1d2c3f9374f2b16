//! Background EQ synthesis worker.
//!
//! Synthesis and the slot write are kept off the command path: commands
//! submit a settings snapshot and return immediately. A single worker thread
//! drains the job queue in order, so slot alternation and the engine
//! repoint stay serialized. Completion is observable through the receiver
//! each submission hands back; steady-state callers simply drop it.
//! Failures are logged, never retried.

use std::path::PathBuf;
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use log::{debug, error};

use crate::curves::buffers::EqBuffers;
use crate::curves::synth::{compose, semispectrum_to_impulse, EqSettings};
use crate::curves::tables::CurveTables;
use crate::engine::SharedEngine;
use crate::error::Result;
use crate::pipeline::PREAMP_EQ;
use crate::state::AuxInfo;

enum WorkItem {
    Synth {
        settings: EqSettings,
        done: Sender<Result<PathBuf>>,
    },
    /// Acknowledged once every earlier job has completed.
    Barrier { done: Sender<()> },
}

/// Handle on the synthesis worker thread.
pub struct EqWorker {
    tx: Option<Sender<WorkItem>>,
    handle: Option<JoinHandle<()>>,
}

impl EqWorker {
    /// Start the worker. It owns the buffer slots; the engine handle is
    /// shared with the command path and locked only for the brief repoint.
    pub fn spawn(
        tables: Arc<CurveTables>,
        mut buffers: EqBuffers,
        engine: SharedEngine,
        aux: AuxInfo,
    ) -> Self {
        let (tx, rx): (Sender<WorkItem>, Receiver<WorkItem>) = channel();

        let handle = thread::Builder::new()
            .name("eq-synth".into())
            .spawn(move || {
                for item in rx {
                    match item {
                        WorkItem::Synth { settings, done } => {
                            let result = run_job(&tables, &mut buffers, &engine, &settings);
                            if let Err(e) = &result {
                                error!("eq synthesis failed: {e}");
                            } else {
                                aux.pulse_new_eq_graph();
                            }
                            // the submitter may have dropped its receiver
                            let _ = done.send(result);
                        }
                        WorkItem::Barrier { done } => {
                            let _ = done.send(());
                        }
                    }
                }
            })
            .expect("cannot spawn eq worker thread");

        Self {
            tx: Some(tx),
            handle: Some(handle),
        }
    }

    /// Queue a synthesis and hand back its completion channel.
    pub fn submit(&self, settings: EqSettings) -> Receiver<Result<PathBuf>> {
        let (done, completion) = channel();
        if let Some(tx) = &self.tx {
            let _ = tx.send(WorkItem::Synth { settings, done });
        }
        completion
    }

    /// Block until every job queued so far has completed.
    pub fn flush(&self) {
        let (done, ack) = channel();
        if let Some(tx) = &self.tx {
            if tx.send(WorkItem::Barrier { done }).is_ok() {
                let _ = ack.recv();
            }
        }
    }
}

impl Drop for EqWorker {
    fn drop(&mut self) {
        // closing the channel lets the thread drain pending jobs and exit
        self.tx.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn run_job(
    tables: &CurveTables,
    buffers: &mut EqBuffers,
    engine: &SharedEngine,
    settings: &EqSettings,
) -> Result<PathBuf> {
    debug!(
        "synthesizing eq: bass {} treble {} spl {} loudness {} target {}",
        settings.bass, settings.treble, settings.spl, settings.equal_loudness, settings.target
    );

    let curve = compose(tables, settings)?;
    let impulse = semispectrum_to_impulse(&curve);
    let path = buffers.write_next(&impulse)?;

    // the slot file is complete; repoint the engine's convolver at it
    let mut engine = engine.lock().expect("engine mutex poisoned");
    let mut config = engine.active_config()?;
    config.set_conv_filename(PREAMP_EQ, path.clone())?;
    engine.apply(&config)?;

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::curves::buffers::load_pcm32;
    use crate::curves::tables::write_test_tables;
    use crate::engine::{shared, DspEngine, MockEngine};
    use crate::pipeline::model::{DeviceConfig, FilterDef};
    use crate::pipeline::EngineConfig;
    use std::collections::BTreeMap;
    use std::fs;
    use tempfile::{tempdir, TempDir};

    fn worker_fixture(dir: &TempDir) -> (EqWorker, crate::engine::MockHandle) {
        let folder = write_test_tables(dir.path(), 9);
        let tables = Arc::new(CurveTables::load(&folder, 83.0).unwrap());
        let buffers = EqBuffers::prepare(dir.path().join("eq"), 16).unwrap();
        let aux = AuxInfo::new(dir.path().join(".aux_info"));

        let (mut mock, handle) = MockEngine::new();
        let mut filters = BTreeMap::new();
        filters.insert(
            PREAMP_EQ.to_string(),
            FilterDef::Conv {
                filename: dir.path().join("eq").join("eq_flat.pcm"),
            },
        );
        mock.apply(&EngineConfig {
            devices: DeviceConfig::new(44100, 1024, 2),
            filters,
            mixers: BTreeMap::new(),
            pipeline: Vec::new(),
        })
        .unwrap();

        let worker = EqWorker::spawn(tables, buffers, shared(Box::new(mock)), aux);
        (worker, handle)
    }

    #[test]
    fn test_job_writes_slot_and_repoints_engine() {
        let dir = tempdir().unwrap();
        let (worker, handle) = worker_fixture(&dir);

        let done = worker.submit(EqSettings::default());
        let path = done.recv().unwrap().unwrap();
        assert!(path.ends_with("eq_A.pcm"));

        let impulse = load_pcm32(&path).unwrap();
        assert_eq!(impulse.len(), 16);

        let active = handle.lock().unwrap().active.clone().unwrap();
        assert_eq!(
            active.filters[PREAMP_EQ],
            FilterDef::Conv {
                filename: path.clone()
            }
        );
    }

    #[test]
    fn test_jobs_alternate_slots() {
        let dir = tempdir().unwrap();
        let (worker, _handle) = worker_fixture(&dir);

        let first = worker.submit(EqSettings::default()).recv().unwrap().unwrap();
        let second = worker
            .submit(EqSettings {
                bass: 3.0,
                ..EqSettings::default()
            })
            .recv()
            .unwrap()
            .unwrap();
        let third = worker.submit(EqSettings::default()).recv().unwrap().unwrap();

        assert!(first.ends_with("eq_A.pcm"));
        assert!(second.ends_with("eq_B.pcm"));
        assert!(third.ends_with("eq_A.pcm"));
    }

    #[test]
    fn test_failure_is_reported_not_retried() {
        let dir = tempdir().unwrap();
        let (worker, handle) = worker_fixture(&dir);

        let done = worker.submit(EqSettings {
            target: "bogus".into(),
            ..EqSettings::default()
        });
        assert!(done.recv().unwrap().is_err());

        // only the initial config is on the engine
        assert_eq!(handle.lock().unwrap().applied.len(), 1);
    }

    #[test]
    fn test_flush_waits_for_queued_jobs() {
        let dir = tempdir().unwrap();
        let (worker, handle) = worker_fixture(&dir);

        let _ = worker.submit(EqSettings::default());
        let _ = worker.submit(EqSettings {
            treble: -2.0,
            ..EqSettings::default()
        });
        worker.flush();

        // initial config + one apply per job
        assert_eq!(handle.lock().unwrap().applied.len(), 3);
    }

    #[test]
    fn test_completion_pulses_aux_flag() {
        let dir = tempdir().unwrap();
        let (worker, _handle) = worker_fixture(&dir);

        worker.submit(EqSettings::default()).recv().unwrap().unwrap();

        let aux_content = fs::read_to_string(dir.path().join(".aux_info")).unwrap();
        assert!(aux_content.contains("new_eq_graph"));
    }
}
