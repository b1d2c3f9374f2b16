//! Loudspeaker profile.
//!
//! Read-only view over a loudspeaker folder, rebuilt at startup. The folder
//! holds per-channel DRC FIR files at its root and per-sample-rate crossover
//! FIR files in a rate subfolder:
//!
//! ```text
//! loudspeakers/<name>/drc.L.<id>.pcm
//! loudspeakers/<name>/drc.R.<id>.pcm
//! loudspeakers/<name>/<fs>/xo.<way>.<mp|lp>.pcm
//! ```
//!
//! A DRC id is a valid set only when both the L and R files exist.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use log::{info, warn};
use walkdir::WalkDir;

use crate::config::{AppConfig, LegPolarity, OutputConfig};
use crate::error::Result;

/// One usable output leg derived from the outputs configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputLeg {
    /// 1-based sound card output number.
    pub output: u32,
    /// `way.channel` name (`lo.L`, `hi.R`) or plain `sw`.
    pub name: String,
    pub gain: f32,
    pub polarity: LegPolarity,
    /// Output delay in milliseconds.
    pub delay: f32,
}

impl OutputLeg {
    /// The way this leg belongs to: `lo.L` -> `lo`, `sw` -> `sw`.
    pub fn way(&self) -> &str {
        if self.is_sw() {
            "sw"
        } else {
            self.name.rsplit_once('.').map(|(w, _)| w).unwrap_or(&self.name)
        }
    }

    /// Channel suffix of the leg name (`L`, `R`, or `sw` for the subwoofer).
    pub fn channel(&self) -> &str {
        self.name.rsplit('.').next().unwrap_or(&self.name)
    }

    pub fn is_sw(&self) -> bool {
        self.name.to_lowercase().contains("sw")
    }
}

/// Read-only routing and filter metadata for the configured loudspeaker.
#[derive(Debug, Clone)]
pub struct LoudspeakerProfile {
    pub name: String,
    pub folder: PathBuf,
    pub fs: u32,
    /// DRC set ids with both channel files present, sorted.
    pub drc_sets: Vec<String>,
    /// Crossover filter ids as found on disk (`lo.mp`, `hi.lp`, `sw.mp`).
    pub xo_filters: Vec<String>,
    /// Crossover set ids (`mp`, `lp`), derived from the filters.
    pub xo_sets: Vec<String>,
    /// Usable output legs in card output order (void legs excluded).
    pub outputs: Vec<OutputLeg>,
}

impl LoudspeakerProfile {
    /// Scan the loudspeaker folder and derive the profile.
    pub fn scan(config: &AppConfig) -> Result<Self> {
        let folder = config.lspk_folder();

        let drc_sets = scan_drc_sets(&folder);
        let xo_filters = scan_xo_filters(&folder, config.fs);
        let xo_sets = xo_sets_from_filters(&xo_filters);
        let outputs = collect_outputs(&config.outputs);

        info!(
            "loudspeaker '{}': drc sets {:?}, xo sets {:?}, {} outputs in use",
            config.loudspeaker,
            drc_sets,
            xo_sets,
            outputs.len()
        );

        Ok(Self {
            name: config.loudspeaker.clone(),
            folder,
            fs: config.fs,
            drc_sets,
            xo_filters,
            xo_sets,
            outputs,
        })
    }

    /// True when more than one stereo pair of outputs is in use.
    pub fn is_multiway(&self) -> bool {
        self.outputs.len() > 2
    }

    /// Distinct way names of the used outputs (`lo`, `hi`, `sw`).
    pub fn ways(&self) -> Vec<String> {
        let mut ways: Vec<String> = Vec::new();
        for leg in &self.outputs {
            let w = leg.way().to_string();
            if !ways.contains(&w) {
                ways.push(w);
            }
        }
        ways
    }

    pub fn has_drc_set(&self, id: &str) -> bool {
        self.drc_sets.iter().any(|s| s == id)
    }

    pub fn has_xo_set(&self, id: &str) -> bool {
        self.xo_sets.iter().any(|s| s == id)
    }

    pub fn drc_fir_path(&self, channel: &str, set: &str) -> PathBuf {
        self.folder.join(format!("drc.{channel}.{set}.pcm"))
    }

    pub fn xo_fir_path(&self, filter: &str) -> PathBuf {
        self.folder
            .join(self.fs.to_string())
            .join(format!("xo.{filter}.pcm"))
    }
}

/// `drc.<L|R>.<id>.pcm` at the folder root; an id needs both channels.
fn scan_drc_sets(folder: &Path) -> Vec<String> {
    let mut candidates: BTreeMap<String, Vec<String>> = BTreeMap::new();

    for entry in WalkDir::new(folder)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
    {
        let fname = entry.file_name().to_string_lossy().to_string();
        if !fname.starts_with("drc.") || !fname.ends_with(".pcm") {
            continue;
        }

        let stem = fname.trim_start_matches("drc.").trim_end_matches(".pcm");
        let Some((channel, id)) = stem.split_once('.') else {
            warn!("ignoring malformed drc file name: {}", fname);
            continue;
        };
        if id.is_empty() {
            continue;
        }

        let channels = candidates.entry(id.to_string()).or_default();
        if !channels.contains(&channel.to_string()) {
            channels.push(channel.to_string());
        }
    }

    candidates
        .into_iter()
        .filter(|(_, channels)| {
            let mut c = channels.clone();
            c.sort();
            c == ["L", "R"]
        })
        .map(|(id, _)| id)
        .collect()
}

/// `xo.<id>.pcm` inside the per-rate subfolder.
fn scan_xo_filters(folder: &Path, fs: u32) -> Vec<String> {
    let rate_folder = folder.join(fs.to_string());
    let mut filters: Vec<String> = WalkDir::new(&rate_folder)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| {
            let fname = e.file_name().to_string_lossy().to_string();
            if fname.starts_with("xo.") && fname.ends_with(".pcm") {
                Some(
                    fname
                        .trim_start_matches("xo.")
                        .trim_end_matches(".pcm")
                        .to_string(),
                )
            } else {
                None
            }
        })
        .collect();
    filters.sort();
    filters
}

/// Strip the way prefix from the filter ids to obtain the set ids.
fn xo_sets_from_filters(filters: &[String]) -> Vec<String> {
    let mut sets: Vec<String> = filters
        .iter()
        .map(|f| {
            f.rsplit_once('.')
                .map(|(_, set)| set.to_string())
                .unwrap_or_else(|| f.clone())
        })
        .collect();
    sets.sort();
    sets.dedup();
    sets
}

fn collect_outputs(outputs: &BTreeMap<u32, OutputConfig>) -> Vec<OutputLeg> {
    outputs
        .iter()
        .filter(|(_, cfg)| !cfg.name.is_empty())
        .map(|(&output, cfg)| OutputLeg {
            output,
            name: cfg.name.clone(),
            gain: cfg.gain,
            polarity: cfg.polarity,
            delay: cfg.delay,
        })
        .collect()
}
