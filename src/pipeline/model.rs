//! Typed engine configuration model.
//!
//! The engine consumes one JSON document holding devices, a filter catalog,
//! a mixer catalog and the pipeline (the ordered stage list referencing both
//! catalogs by name). Everything is modeled with concrete types and
//! validated at construction; serialization to the wire happens only at the
//! engine boundary.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{PreampError, Result};

// Well-known filter and mixer names of the preamp stage.
pub const PREAMP_EQ: &str = "preamp_eq";
pub const DRC_GAIN: &str = "drc_gain";
pub const LU_OFFSET: &str = "lu_offset";
pub const BAL_POL_L: &str = "bal_pol_L";
pub const BAL_POL_R: &str = "bal_pol_R";
pub const DITHER: &str = "dither";
pub const PREAMP_MIXER: &str = "preamp_mixer";

/// Dither noise shaping selected by the output sample rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DitherKind {
    Shibata441,
    Shibata48,
    Simple,
}

impl DitherKind {
    pub fn for_samplerate(fs: u32) -> Self {
        match fs {
            44100 => DitherKind::Shibata441,
            48000 => DitherKind::Shibata48,
            _ => DitherKind::Simple,
        }
    }
}

/// One entry of the filter catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "parameters")]
pub enum FilterDef {
    /// Plain gain with optional inversion and mute.
    Gain {
        gain: f32,
        #[serde(default)]
        inverted: bool,
        #[serde(default)]
        mute: bool,
    },
    /// FIR convolution against a raw FLOAT32LE file.
    Conv { filename: PathBuf },
    /// Constant output delay in milliseconds.
    Delay { delay: f32 },
    /// Dither before bit-depth reduction.
    Dither { bits: u32, shaping: DitherKind },
}

impl FilterDef {
    pub fn unity_gain() -> Self {
        FilterDef::Gain {
            gain: 0.0,
            inverted: false,
            mute: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MixerChannels {
    #[serde(rename = "in")]
    pub input: u32,
    #[serde(rename = "out")]
    pub output: u32,
}

/// One source feeding a mixer destination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MixerSource {
    pub channel: u32,
    pub gain: f32,
    #[serde(default)]
    pub inverted: bool,
    #[serde(default)]
    pub mute: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MixerMapping {
    pub dest: u32,
    pub sources: Vec<MixerSource>,
}

/// A routing matrix with per-path gain/invert/mute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MixerDef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub channels: MixerChannels,
    pub mapping: Vec<MixerMapping>,
}

/// Coarse role of a pipeline stage, derived from its description.
/// Used to find the terminal stages the dither filter belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageKind {
    Preamp,
    Xover,
}

/// One pipeline step: either a mixer or a channel-bound filter chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Stage {
    Mixer {
        name: String,
    },
    Filter {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
        channels: Vec<u32>,
        names: Vec<String>,
    },
}

impl Stage {
    pub fn description(&self) -> Option<&str> {
        match self {
            Stage::Mixer { .. } => None,
            Stage::Filter { description, .. } => description.as_deref(),
        }
    }

    /// Filter stage kind; mixers and undescribed stages have none.
    pub fn kind(&self) -> Option<StageKind> {
        let description = self.description()?.to_lowercase();
        if description.starts_with("xover.") {
            Some(StageKind::Xover)
        } else if description.starts_with("preamp.") {
            Some(StageKind::Preamp)
        } else {
            None
        }
    }

    pub fn names(&self) -> &[String] {
        match self {
            Stage::Mixer { .. } => &[],
            Stage::Filter { names, .. } => names,
        }
    }

    pub fn names_mut(&mut self) -> Option<&mut Vec<String>> {
        match self {
            Stage::Mixer { .. } => None,
            Stage::Filter { names, .. } => Some(names),
        }
    }
}

/// Engine device section. The controller only fills in what it owns; the
/// engine applies its own backend defaults on top.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub samplerate: u32,
    pub chunksize: usize,
    pub silence_threshold: i32,
    pub silence_timeout: u32,
    pub capture_channels: u32,
    pub playback_channels: u32,
}

impl DeviceConfig {
    pub fn new(samplerate: u32, chunksize: usize, playback_channels: u32) -> Self {
        Self {
            samplerate,
            chunksize,
            silence_threshold: -80,
            silence_timeout: 30,
            capture_channels: 2,
            playback_channels,
        }
    }
}

/// The complete engine configuration document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub devices: DeviceConfig,
    pub filters: BTreeMap<String, FilterDef>,
    pub mixers: BTreeMap<String, MixerDef>,
    pub pipeline: Vec<Stage>,
}

impl EngineConfig {
    /// Check that every name the pipeline references resolves against the
    /// catalogs. An unresolved name is a programming/data error.
    pub fn validate(&self) -> Result<()> {
        for (idx, stage) in self.pipeline.iter().enumerate() {
            match stage {
                Stage::Mixer { name } => {
                    if !self.mixers.contains_key(name) {
                        return Err(PreampError::inconsistency(format!(
                            "pipeline stage {idx} references unknown mixer '{name}'"
                        )));
                    }
                }
                Stage::Filter { names, .. } => {
                    for name in names {
                        if !self.filters.contains_key(name) {
                            return Err(PreampError::inconsistency(format!(
                                "pipeline stage {idx} references unknown filter '{name}'"
                            )));
                        }
                    }
                }
            }
        }
        Ok(())
    }

    pub fn filter_mut(&mut self, name: &str) -> Result<&mut FilterDef> {
        self.filters
            .get_mut(name)
            .ok_or_else(|| PreampError::inconsistency(format!("no filter '{name}' in catalog")))
    }

    /// Update a Gain filter through a closure; any other kind is an error.
    pub fn update_gain(
        &mut self,
        name: &str,
        f: impl FnOnce(&mut f32, &mut bool, &mut bool),
    ) -> Result<()> {
        match self.filter_mut(name)? {
            FilterDef::Gain {
                gain,
                inverted,
                mute,
            } => {
                f(gain, inverted, mute);
                Ok(())
            }
            _ => Err(PreampError::inconsistency(format!(
                "filter '{name}' is not a Gain filter"
            ))),
        }
    }

    /// Repoint a Conv filter at a new impulse file.
    pub fn set_conv_filename(&mut self, name: &str, path: PathBuf) -> Result<()> {
        match self.filter_mut(name)? {
            FilterDef::Conv { filename } => {
                *filename = path;
                Ok(())
            }
            _ => Err(PreampError::inconsistency(format!(
                "filter '{name}' is not a Conv filter"
            ))),
        }
    }

    /// The stereo preamp chains are always pipeline stages 1 and 2.
    pub fn stereo_chains_mut(&mut self) -> Result<[&mut Vec<String>; 2]> {
        if self.pipeline.len() < 3 {
            return Err(PreampError::inconsistency(
                "pipeline is missing the stereo preamp chains",
            ));
        }
        let [_, left, right, ..] = self.pipeline.as_mut_slice() else {
            return Err(PreampError::inconsistency(
                "pipeline is missing the stereo preamp chains",
            ));
        };
        match (left.names_mut(), right.names_mut()) {
            (Some(l), Some(r)) => Ok([l, r]),
            _ => Err(PreampError::inconsistency(
                "pipeline stages 1-2 are not filter chains",
            )),
        }
    }
}
