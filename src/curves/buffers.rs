//! EQ impulse double buffer.
//!
//! The engine reloads its convolver only when the `filename` parameter
//! changes, so consecutive syntheses must land on alternating files. Two
//! slots (`eq_A.pcm` / `eq_B.pcm`) take turns; a stable `eq.pcm` symlink
//! always points at the slot the engine currently references, for external
//! viewers. A slot is never retargeted before its write completed, and the
//! same slot is never written twice in a row.

use std::fs;
use std::path::{Path, PathBuf};

use log::debug;

use crate::error::{PreampError, Result};

/// One of the two impulse buffer slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    A,
    B,
}

impl Slot {
    pub fn other(self) -> Slot {
        match self {
            Slot::A => Slot::B,
            Slot::B => Slot::A,
        }
    }

    fn file_name(self) -> &'static str {
        match self {
            Slot::A => "eq_A.pcm",
            Slot::B => "eq_B.pcm",
        }
    }
}

/// Double-buffered FLOAT32LE impulse storage under the eq folder.
#[derive(Debug)]
pub struct EqBuffers {
    folder: PathBuf,
    /// Slot the next synthesis will be written to.
    next: Slot,
}

impl EqBuffers {
    /// Seed both slots with the flat impulse and start writing at slot A.
    ///
    /// The flat impulse (`eq_flat.pcm`) is generated as a unit delta of
    /// `taps` samples when missing.
    pub fn prepare(folder: impl Into<PathBuf>, taps: usize) -> Result<Self> {
        let folder = folder.into();
        fs::create_dir_all(&folder)?;

        let flat = folder.join("eq_flat.pcm");
        if !flat.exists() {
            let mut delta = vec![0.0f32; taps];
            delta[0] = 1.0;
            save_pcm32(&flat, &delta)?;
        }

        for slot in [Slot::A, Slot::B] {
            fs::copy(&flat, folder.join(slot.file_name())).map_err(|e| {
                PreampError::FileWrite {
                    path: folder.join(slot.file_name()),
                    source: e,
                }
            })?;
        }

        Ok(Self {
            folder,
            next: Slot::A,
        })
    }

    /// Path of the stable pointer external viewers follow.
    pub fn link_path(&self) -> PathBuf {
        self.folder.join("eq.pcm")
    }

    /// Slot the next write will target.
    pub fn next_slot(&self) -> Slot {
        self.next
    }

    /// Write the impulse to the inactive slot, retarget the stable link,
    /// flip slots and return the path the engine must be pointed at.
    pub fn write_next(&mut self, impulse: &[f32]) -> Result<PathBuf> {
        let path = self.folder.join(self.next.file_name());
        save_pcm32(&path, impulse)?;

        // retarget only after the slot write completed
        let link = self.link_path();
        if link.symlink_metadata().is_ok() {
            fs::remove_file(&link)?;
        }
        std::os::unix::fs::symlink(&path, &link)?;

        debug!("eq impulse written to {}", path.display());
        self.next = self.next.other();
        Ok(path)
    }
}

/// Write samples as raw little-endian f32, the engine's Conv format.
pub fn save_pcm32(path: &Path, samples: &[f32]) -> Result<()> {
    let mut bytes = Vec::with_capacity(samples.len() * 4);
    for s in samples {
        bytes.extend_from_slice(&s.to_le_bytes());
    }
    fs::write(path, bytes).map_err(|e| PreampError::FileWrite {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Read raw little-endian f32 samples.
pub fn load_pcm32(path: &Path) -> Result<Vec<f32>> {
    let bytes = fs::read(path).map_err(|e| PreampError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;
    Ok(bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}
