//! Tabulated magnitude curves.
//!
//! The curve folder holds precomputed magnitude tables as whitespace
//! separated text matrices (one frequency-bin column per value, one curve
//! per row):
//!
//! ```text
//! curves_<fs>_N11/bass_mag.dat                  25 rows, -12..+12 dB
//! curves_<fs>_N11/treble_mag.dat                25 rows, -12..+12 dB
//! curves_<fs>_N11/ref_83_loudness_mag.dat       one row per dB SPL
//! curves_<fs>_N11/room_target/<id>_target_mag.dat
//! ```
//!
//! All tables of one folder share the same bin count.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::{PreampError, Result};

/// Tone curves cover -12..+12 dB in 1 dB steps.
pub const TONE_SPAN: i32 = 12;

const TONE_ROWS: usize = (2 * TONE_SPAN + 1) as usize;
const TARGET_SUFFIX: &str = "_target_mag.dat";

/// Read-only magnitude curve tables, indexed by discrete steps.
#[derive(Debug, Clone)]
pub struct CurveTables {
    bass: Vec<Vec<f32>>,
    treble: Vec<Vec<f32>>,
    loudness: Vec<Vec<f32>>,
    targets: BTreeMap<String, Vec<f32>>,
    bins: usize,
}

impl CurveTables {
    /// Load every table found under the curves folder.
    pub fn load(folder: &Path, loudness_ref: f32) -> Result<Self> {
        let bass = load_matrix(&folder.join("bass_mag.dat"))?;
        let treble = load_matrix(&folder.join("treble_mag.dat"))?;
        let loudness = load_matrix(
            &folder.join(format!("ref_{}_loudness_mag.dat", loudness_ref as i32)),
        )?;

        if bass.len() != TONE_ROWS || treble.len() != TONE_ROWS {
            return Err(PreampError::inconsistency(format!(
                "tone tables must have {} rows, got bass={} treble={}",
                TONE_ROWS,
                bass.len(),
                treble.len()
            )));
        }

        let bins = bass[0].len();
        let targets = load_targets(&folder.join("room_target"), bins)?;

        for (name, table) in [("treble", &treble), ("loudness", &loudness)] {
            if table.iter().any(|row| row.len() != bins) {
                return Err(PreampError::inconsistency(format!(
                    "{name} table bin count differs from bass table ({bins})"
                )));
            }
        }

        Ok(Self {
            bass,
            treble,
            loudness,
            targets,
            bins,
        })
    }

    /// Frequency bins per curve.
    pub fn bins(&self) -> usize {
        self.bins
    }

    /// Combined bass + treble curve for integer dB settings in `[-12, 12]`.
    pub fn tone_curve(&self, bass_db: i32, treble_db: i32) -> Result<Vec<f32>> {
        if bass_db.abs() > TONE_SPAN || treble_db.abs() > TONE_SPAN {
            return Err(PreampError::validation(format!(
                "tone values must be in +/- {TONE_SPAN} dB"
            )));
        }
        let bass_row = &self.bass[(bass_db + TONE_SPAN) as usize];
        let treble_row = &self.treble[(treble_db + TONE_SPAN) as usize];
        Ok(bass_row
            .iter()
            .zip(treble_row.iter())
            .map(|(b, t)| b + t)
            .collect())
    }

    /// Loudness compensation row for the given SPL index, clamped to the
    /// table bounds.
    pub fn loudness_curve(&self, spl_index: i32) -> &[f32] {
        let max_index = self.loudness.len() as i32 - 1;
        let index = spl_index.clamp(0, max_index) as usize;
        &self.loudness[index]
    }

    /// Room target curve. `none` is the flat curve.
    pub fn target_curve(&self, id: &str) -> Result<Vec<f32>> {
        if id == "none" {
            return Ok(vec![0.0; self.bins]);
        }
        self.targets
            .get(id)
            .cloned()
            .ok_or_else(|| PreampError::validation(format!("unknown target '{id}'")))
    }

    /// Available room target ids, sorted.
    pub fn target_sets(&self) -> Vec<String> {
        self.targets.keys().cloned().collect()
    }

    pub fn has_target(&self, id: &str) -> bool {
        id == "none" || self.targets.contains_key(id)
    }
}

/// Parse a whitespace separated float matrix, `#` comments allowed.
fn load_matrix(path: &Path) -> Result<Vec<Vec<f32>>> {
    let content = fs::read_to_string(path).map_err(|e| PreampError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    let mut rows: Vec<Vec<f32>> = Vec::new();
    for (lineno, line) in content.lines().enumerate() {
        let data = line.split('#').next().unwrap_or("").trim();
        if data.is_empty() {
            continue;
        }
        let row: std::result::Result<Vec<f32>, _> =
            data.split_whitespace().map(|v| v.parse::<f32>()).collect();
        match row {
            Ok(row) => rows.push(row),
            Err(_) => {
                return Err(PreampError::inconsistency(format!(
                    "bad number in {} line {}",
                    path.display(),
                    lineno + 1
                )))
            }
        }
    }

    if rows.is_empty() {
        return Err(PreampError::inconsistency(format!(
            "empty curve table {}",
            path.display()
        )));
    }
    let width = rows[0].len();
    if rows.iter().any(|r| r.len() != width) {
        return Err(PreampError::inconsistency(format!(
            "ragged curve table {}",
            path.display()
        )));
    }

    Ok(rows)
}

/// `<id>_target_mag.dat` files inside the room_target folder.
fn load_targets(folder: &Path, bins: usize) -> Result<BTreeMap<String, Vec<f32>>> {
    let mut targets = BTreeMap::new();

    for entry in WalkDir::new(folder)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
    {
        let fname = entry.file_name().to_string_lossy().to_string();
        let Some(id) = fname.strip_suffix(TARGET_SUFFIX) else {
            continue;
        };

        let rows = load_matrix(entry.path())?;
        if rows.len() != 1 || rows[0].len() != bins {
            return Err(PreampError::inconsistency(format!(
                "target curve {} must be a single row of {} bins",
                entry.path().display(),
                bins
            )));
        }
        targets.insert(id.to_string(), rows.into_iter().next().unwrap());
    }

    Ok(targets)
}

/// Write a small, well-formed set of curve tables for the test suites.
///
/// Tone rows carry their dB setting on every bin, loudness rows carry
/// `90 - spl`, and two room targets exist (`+0.0-0.0`, `+3.0-1.0`).
#[cfg(test)]
pub(crate) fn write_test_tables(root: &Path, bins: usize) -> PathBuf {
    let folder = root.join("curves_44100_N11");
    fs::create_dir_all(folder.join("room_target")).unwrap();

    let tone: String = (-TONE_SPAN..=TONE_SPAN)
        .map(|db| vec![format!("{db}.0"); bins].join(" ") + "\n")
        .collect();
    fs::write(folder.join("bass_mag.dat"), &tone).unwrap();
    fs::write(folder.join("treble_mag.dat"), &tone).unwrap();

    let loud: String = (0..=90)
        .map(|spl| vec![format!("{}.0", 90 - spl); bins].join(" ") + "\n")
        .collect();
    fs::write(folder.join("ref_83_loudness_mag.dat"), &loud).unwrap();

    for (id, gain) in [("+0.0-0.0", 0.0f32), ("+3.0-1.0", 3.0)] {
        let row = vec![format!("{gain}"); bins].join(" ");
        fs::write(
            folder.join("room_target").join(format!("{id}{TARGET_SUFFIX}")),
            row,
        )
        .unwrap();
    }

    folder
}
