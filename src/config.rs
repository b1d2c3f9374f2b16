//! Controller configuration.
//!
//! Loaded once at startup from a JSON file. Everything path-like is derived
//! from `main_folder` so the whole installation can be relocated.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{PreampError, Result};

/// Reference listening level for the loudness compensation tables, in dB SPL.
pub const LOUDNESS_REF_LEVEL: f32 = 83.0;

fn default_tones_span() -> f32 {
    6.0
}

fn default_chunksize() -> usize {
    1024
}

fn default_dither_bits() -> u32 {
    16
}

fn default_engine_addr() -> String {
    "127.0.0.1:1234".into()
}

/// One physical output leg of the sound card.
///
/// `output` is the 1-based card output number. An empty `name` marks the
/// output as unused (void). Names follow the `way.channel` convention
/// (`lo.L`, `hi.R`) except the subwoofer leg, plain `sw`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutputConfig {
    pub name: String,
    #[serde(default)]
    pub gain: f32,
    #[serde(default)]
    pub polarity: LegPolarity,
    /// Output delay in milliseconds.
    #[serde(default)]
    pub delay: f32,
}

/// Wiring polarity of an output leg.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LegPolarity {
    #[default]
    #[serde(rename = "+", alias = "1")]
    Plus,
    #[serde(rename = "-", alias = "-1")]
    Minus,
}

impl LegPolarity {
    pub fn inverted(self) -> bool {
        matches!(self, LegPolarity::Minus)
    }
}

/// A named input source. Routing the source is the sound server's business;
/// the controller only validates and records the selection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InputConfig {
    #[serde(default)]
    pub gain: f32,
}

/// Optional user settings that take precedence over the persisted state at
/// startup. Selections are validated against the loudspeaker profile first.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StartupOverrides {
    pub level: Option<f32>,
    pub balance: Option<f32>,
    pub bass: Option<f32>,
    pub treble: Option<f32>,
    pub tone_defeat: Option<bool>,
    pub lu_offset: Option<f32>,
    pub equal_loudness: Option<bool>,
    pub target: Option<String>,
    pub drc_set: Option<String>,
}

/// The controller configuration record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Installation root. State, eq and loudspeaker folders hang from here.
    pub main_folder: PathBuf,

    pub loudspeaker: String,

    /// Sample rate the engine and all FIR material run at.
    pub fs: u32,

    /// Span of the bass/treble controls, in dB.
    #[serde(default = "default_tones_span")]
    pub tones_span_db: f32,

    /// Working gain offset the DRC sets were designed with (non positive).
    #[serde(default)]
    pub drcs_offset: f32,

    #[serde(default)]
    pub inputs: BTreeMap<String, InputConfig>,

    /// Sound card outputs keyed by 1-based output number.
    #[serde(default)]
    pub outputs: BTreeMap<u32, OutputConfig>,

    #[serde(default = "default_engine_addr")]
    pub engine_addr: String,

    #[serde(default = "default_chunksize")]
    pub chunksize: usize,

    #[serde(default = "default_dither_bits")]
    pub dither_bits: u32,

    #[serde(default)]
    pub overrides: StartupOverrides,
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| PreampError::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config: AppConfig = serde_json::from_str(&content)?;
        Ok(config)
    }

    pub fn eq_folder(&self) -> PathBuf {
        self.main_folder.join("eq")
    }

    /// Folder holding the magnitude curve tables for the configured rate.
    pub fn curves_folder(&self) -> PathBuf {
        self.eq_folder().join(format!("curves_{}_N11", self.fs))
    }

    pub fn lspk_folder(&self) -> PathBuf {
        self.main_folder
            .join("loudspeakers")
            .join(&self.loudspeaker)
    }

    pub fn state_path(&self) -> PathBuf {
        self.main_folder.join(".preamp_state")
    }

    pub fn aux_info_path(&self) -> PathBuf {
        self.main_folder.join(".aux_info")
    }

    pub fn engine_log_path(&self) -> PathBuf {
        self.main_folder.join("log").join("engine.log")
    }

    pub fn input_names(&self) -> Vec<String> {
        self.inputs.keys().cloned().collect()
    }
}
