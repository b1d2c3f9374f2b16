//! Pipeline compiler.
//!
//! Builds the complete engine configuration from the loudspeaker profile and
//! the current selections, and hosts the incremental pipeline edits (DRC
//! swap, XO flavour swap) applied to a live configuration read back from the
//! engine. The compiler never emits a partial graph: any name it cannot
//! resolve aborts the compile.

use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::error::Result;
use crate::pipeline::mixers::{multiway_mixer, multiway_mixer_name, preamp_mixer, MixerMode};
use crate::pipeline::model::{
    DeviceConfig, DitherKind, EngineConfig, FilterDef, Stage, StageKind, BAL_POL_L, BAL_POL_R,
    DITHER, DRC_GAIN, LU_OFFSET, PREAMP_EQ, PREAMP_MIXER,
};
use crate::speaker::LoudspeakerProfile;

/// The state selections a compile depends on.
#[derive(Debug, Clone, PartialEq)]
pub struct Selections {
    pub mixer_mode: MixerMode,
    /// DRC set id or `none`.
    pub drc_set: String,
    /// XO set id (`mp`/`lp`) or `none` for the default flavour.
    pub xo_set: String,
    /// Impulse file the preamp EQ convolver starts from.
    pub eq_path: PathBuf,
}

/// Compiles the preamp state into an engine configuration.
#[derive(Debug, Clone)]
pub struct PipelineCompiler<'a> {
    profile: &'a LoudspeakerProfile,
    chunksize: usize,
    dither_bits: u32,
}

impl<'a> PipelineCompiler<'a> {
    pub fn new(profile: &'a LoudspeakerProfile, chunksize: usize, dither_bits: u32) -> Self {
        Self {
            profile,
            chunksize,
            dither_bits,
        }
    }

    /// Build the full mixer/filter graph for the given selections.
    pub fn compile(&self, selections: &Selections) -> Result<EngineConfig> {
        let profile = self.profile;
        let playback_channels = profile
            .outputs
            .iter()
            .map(|l| l.output)
            .max()
            .unwrap_or(2);

        let mut config = EngineConfig {
            devices: DeviceConfig::new(profile.fs, self.chunksize, playback_channels),
            filters: self.base_filters(selections),
            mixers: BTreeMap::new(),
            pipeline: Vec::new(),
        };

        // stage 0: the preamp mixer; stages 1-2: the stereo chains
        config
            .mixers
            .insert(PREAMP_MIXER.into(), preamp_mixer(selections.mixer_mode));
        config.pipeline.push(Stage::Mixer {
            name: PREAMP_MIXER.into(),
        });
        config.pipeline.push(Stage::Filter {
            description: Some("preamp.L".into()),
            channels: vec![0],
            names: vec![
                PREAMP_EQ.into(),
                DRC_GAIN.into(),
                LU_OFFSET.into(),
                BAL_POL_L.into(),
            ],
        });
        config.pipeline.push(Stage::Filter {
            description: Some("preamp.R".into()),
            channels: vec![1],
            names: vec![
                PREAMP_EQ.into(),
                DRC_GAIN.into(),
                LU_OFFSET.into(),
                BAL_POL_R.into(),
            ],
        });

        if selections.drc_set != "none" {
            insert_drc(&mut config, &selections.drc_set)?;
        }

        if profile.is_multiway() {
            self.append_multiway(&mut config, selections);
        }

        append_dither(&mut config);

        config.validate()?;
        Ok(config)
    }

    /// The filter catalog: preamp stage filters plus every DRC/XO/delay
    /// filter the profile can ever select, so set swaps stay incremental.
    fn base_filters(&self, selections: &Selections) -> BTreeMap<String, FilterDef> {
        let profile = self.profile;
        let mut filters = BTreeMap::new();

        filters.insert(
            PREAMP_EQ.into(),
            FilterDef::Conv {
                filename: selections.eq_path.clone(),
            },
        );
        filters.insert(DRC_GAIN.into(), FilterDef::unity_gain());
        filters.insert(LU_OFFSET.into(), FilterDef::unity_gain());
        filters.insert(BAL_POL_L.into(), FilterDef::unity_gain());
        filters.insert(BAL_POL_R.into(), FilterDef::unity_gain());
        filters.insert(
            DITHER.into(),
            FilterDef::Dither {
                bits: self.dither_bits,
                shaping: DitherKind::for_samplerate(profile.fs),
            },
        );

        for set in &profile.drc_sets {
            for channel in ["L", "R"] {
                filters.insert(
                    format!("drc.{channel}.{set}"),
                    FilterDef::Conv {
                        filename: profile.drc_fir_path(channel, set),
                    },
                );
            }
        }

        for xo in &profile.xo_filters {
            filters.insert(
                format!("xo.{xo}"),
                FilterDef::Conv {
                    filename: profile.xo_fir_path(xo),
                },
            );
        }

        if profile.is_multiway() {
            for leg in &profile.outputs {
                filters.insert(
                    format!("delay.{}", leg.name),
                    FilterDef::Delay { delay: leg.delay },
                );
            }
        }

        filters
    }

    /// Expansion mixer plus one crossover chain per leg.
    fn append_multiway(&self, config: &mut EngineConfig, selections: &Selections) {
        let profile = self.profile;
        let name = multiway_mixer_name(&profile.outputs);
        config
            .mixers
            .insert(name.clone(), multiway_mixer(&profile.outputs));
        config.pipeline.push(Stage::Mixer { name });

        if profile.xo_filters.is_empty() {
            return;
        }

        let flavour = if selections.xo_set == "none" {
            "mp"
        } else {
            selections.xo_set.as_str()
        };

        for leg in &profile.outputs {
            config.pipeline.push(Stage::Filter {
                description: Some(format!("xover.{}.{}", leg.way(), leg.channel())),
                channels: vec![leg.output - 1],
                names: vec![
                    format!("xo.{}.{}", leg.way(), flavour),
                    format!("delay.{}", leg.name),
                ],
            });
        }
    }
}

/// Insert the per-channel DRC filters at position 1 of the stereo chains.
/// Existing `drc.*` entries are stripped first, so the operation is
/// idempotent.
pub fn insert_drc(config: &mut EngineConfig, id: &str) -> Result<()> {
    let chains = config.stereo_chains_mut()?;
    for (chain, channel) in chains.into_iter().zip(["L", "R"]) {
        chain.retain(|n| !n.starts_with("drc."));
        chain.insert(1, format!("drc.{channel}.{id}"));
    }
    Ok(())
}

/// Remove any DRC filter from the stereo chains.
pub fn clear_drc(config: &mut EngineConfig) -> Result<()> {
    let chains = config.stereo_chains_mut()?;
    for chain in chains {
        chain.retain(|n| !n.starts_with("drc."));
    }
    Ok(())
}

/// Swap the crossover flavour suffix on every crossover chain.
pub fn set_xo_flavour(config: &mut EngineConfig, set: &str) {
    for stage in &mut config.pipeline {
        let Some(names) = stage.names_mut() else {
            continue;
        };
        // the xo filter sits in the first position of its chain
        if let Some(first) = names.first_mut() {
            if first.starts_with("xo.") {
                if let Some(base) = first
                    .strip_suffix(".mp")
                    .or_else(|| first.strip_suffix(".lp"))
                {
                    *first = format!("{base}.{set}");
                }
            }
        }
    }
}

/// Append the dither filter to the trailing run of stages sharing the kind
/// of the last stage. Walking in reverse and stopping at the first kind
/// change puts dither exactly once, at the true terminal stage(s), whether
/// or not a multiway expansion occurred.
fn append_dither(config: &mut EngineConfig) {
    let mut last_kind: Option<StageKind> = None;

    for stage in config.pipeline.iter_mut().rev() {
        let Some(kind) = stage.kind() else {
            continue;
        };
        if let Some(last) = last_kind {
            if kind != last {
                break;
            }
        }
        if let Some(names) = stage.names_mut() {
            names.push(DITHER.into());
        }
        last_kind = Some(kind);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AppConfig, LegPolarity};
    use crate::speaker::OutputLeg;
    use pretty_assertions::assert_eq;

    fn stereo_profile() -> LoudspeakerProfile {
        LoudspeakerProfile {
            name: "desk".into(),
            folder: PathBuf::from("/tmp/lspk/desk"),
            fs: 44100,
            drc_sets: vec!["equilat".into(), "sofa".into()],
            xo_filters: vec![],
            xo_sets: vec![],
            outputs: vec![
                OutputLeg {
                    output: 1,
                    name: "fr.L".into(),
                    gain: 0.0,
                    polarity: LegPolarity::Plus,
                    delay: 0.0,
                },
                OutputLeg {
                    output: 2,
                    name: "fr.R".into(),
                    gain: 0.0,
                    polarity: LegPolarity::Plus,
                    delay: 0.0,
                },
            ],
        }
    }

    fn multiway_profile() -> LoudspeakerProfile {
        let leg = |output: u32, name: &str| OutputLeg {
            output,
            name: name.into(),
            gain: 0.0,
            polarity: LegPolarity::Plus,
            delay: 0.5,
        };
        LoudspeakerProfile {
            name: "big".into(),
            folder: PathBuf::from("/tmp/lspk/big"),
            fs: 48000,
            drc_sets: vec!["sofa".into()],
            xo_filters: vec![
                "hi.lp".into(),
                "hi.mp".into(),
                "lo.lp".into(),
                "lo.mp".into(),
                "sw.lp".into(),
                "sw.mp".into(),
            ],
            xo_sets: vec!["lp".into(), "mp".into()],
            outputs: vec![
                leg(1, "lo.L"),
                leg(2, "lo.R"),
                leg(3, "hi.L"),
                leg(4, "hi.R"),
                leg(6, "sw"),
            ],
        }
    }

    fn selections(drc: &str, xo: &str) -> Selections {
        Selections {
            mixer_mode: MixerMode::Normal,
            drc_set: drc.into(),
            xo_set: xo.into(),
            eq_path: PathBuf::from("/tmp/eq/eq_A.pcm"),
        }
    }

    fn chain(config: &EngineConfig, idx: usize) -> Vec<String> {
        config.pipeline[idx].names().to_vec()
    }

    #[test]
    fn test_stereo_compile_shape() {
        let profile = stereo_profile();
        let compiler = PipelineCompiler::new(&profile, 1024, 16);
        let config = compiler.compile(&selections("none", "none")).unwrap();

        assert_eq!(config.pipeline.len(), 3);
        assert!(matches!(&config.pipeline[0], Stage::Mixer { name } if name == PREAMP_MIXER));
        assert_eq!(
            chain(&config, 1),
            vec!["preamp_eq", "drc_gain", "lu_offset", "bal_pol_L", "dither"]
        );
        assert_eq!(
            chain(&config, 2),
            vec!["preamp_eq", "drc_gain", "lu_offset", "bal_pol_R", "dither"]
        );
        assert_eq!(config.devices.playback_channels, 2);
    }

    #[test]
    fn test_catalog_covers_all_drc_sets() {
        let profile = stereo_profile();
        let compiler = PipelineCompiler::new(&profile, 1024, 16);
        let config = compiler.compile(&selections("none", "none")).unwrap();

        for name in ["drc.L.sofa", "drc.R.sofa", "drc.L.equilat", "drc.R.equilat"] {
            assert!(config.filters.contains_key(name), "missing {name}");
        }
    }

    #[test]
    fn test_drc_selected_inserts_per_channel() {
        let profile = stereo_profile();
        let compiler = PipelineCompiler::new(&profile, 1024, 16);
        let config = compiler.compile(&selections("sofa", "none")).unwrap();

        assert_eq!(chain(&config, 1)[1], "drc.L.sofa");
        assert_eq!(chain(&config, 2)[1], "drc.R.sofa");
    }

    #[test]
    fn test_drc_insert_is_idempotent() {
        let profile = stereo_profile();
        let compiler = PipelineCompiler::new(&profile, 1024, 16);
        let mut config = compiler.compile(&selections("none", "none")).unwrap();

        insert_drc(&mut config, "sofa").unwrap();
        let once = config.clone();
        insert_drc(&mut config, "sofa").unwrap();
        assert_eq!(config, once);
        assert_eq!(chain(&config, 1).len(), 6);
    }

    #[test]
    fn test_drc_round_trip_restores_pipeline() {
        let profile = stereo_profile();
        let compiler = PipelineCompiler::new(&profile, 1024, 16);
        let original = compiler.compile(&selections("none", "none")).unwrap();

        let mut config = original.clone();
        insert_drc(&mut config, "equilat").unwrap();
        assert_ne!(config.pipeline, original.pipeline);
        clear_drc(&mut config).unwrap();
        assert_eq!(config.pipeline, original.pipeline);
    }

    #[test]
    fn test_drc_swap_replaces_previous_set() {
        let profile = stereo_profile();
        let compiler = PipelineCompiler::new(&profile, 1024, 16);
        let mut config = compiler.compile(&selections("sofa", "none")).unwrap();

        insert_drc(&mut config, "equilat").unwrap();
        assert_eq!(chain(&config, 1)[1], "drc.L.equilat");
        assert!(!chain(&config, 1).contains(&"drc.L.sofa".to_string()));
    }

    #[test]
    fn test_unknown_drc_aborts_compile() {
        let profile = stereo_profile();
        let compiler = PipelineCompiler::new(&profile, 1024, 16);
        let err = compiler.compile(&selections("ghost", "none")).unwrap_err();
        assert!(err.to_string().contains("config inconsistency"));
    }

    #[test]
    fn test_multiway_compile_shape() {
        let profile = multiway_profile();
        let compiler = PipelineCompiler::new(&profile, 1024, 16);
        let config = compiler.compile(&selections("none", "mp")).unwrap();

        // preamp mixer + 2 chains + expansion mixer + 5 xover chains
        assert_eq!(config.pipeline.len(), 9);
        assert!(matches!(
            &config.pipeline[3],
            Stage::Mixer { name } if name == "from2to5channels"
        ));

        let lo_l = &config.pipeline[4];
        assert_eq!(lo_l.description(), Some("xover.lo.L"));
        assert_eq!(lo_l.names()[0], "xo.lo.mp");
        assert_eq!(lo_l.names()[1], "delay.lo.L");

        let sw = &config.pipeline[8];
        assert_eq!(sw.description(), Some("xover.sw.sw"));
        assert_eq!(sw.names()[0], "xo.sw.mp");
        assert_eq!(sw.names()[1], "delay.sw");

        assert_eq!(config.devices.playback_channels, 6);
    }

    #[test]
    fn test_multiway_dither_only_on_xover_stages() {
        let profile = multiway_profile();
        let compiler = PipelineCompiler::new(&profile, 1024, 16);
        let config = compiler.compile(&selections("none", "mp")).unwrap();

        for idx in [1, 2] {
            assert!(
                !chain(&config, idx).contains(&DITHER.to_string()),
                "stereo chain {idx} must not dither"
            );
        }
        for idx in 4..9 {
            assert_eq!(chain(&config, idx).last().unwrap(), DITHER);
        }
    }

    #[test]
    fn test_dither_kind_follows_samplerate() {
        let profile = multiway_profile(); // 48000
        let compiler = PipelineCompiler::new(&profile, 1024, 24);
        let config = compiler.compile(&selections("none", "mp")).unwrap();
        assert_eq!(
            config.filters[DITHER],
            FilterDef::Dither {
                bits: 24,
                shaping: DitherKind::Shibata48
            }
        );
    }

    #[test]
    fn test_xo_flavour_swap() {
        let profile = multiway_profile();
        let compiler = PipelineCompiler::new(&profile, 1024, 16);
        let mut config = compiler.compile(&selections("none", "mp")).unwrap();

        set_xo_flavour(&mut config, "lp");
        assert_eq!(config.pipeline[4].names()[0], "xo.lo.lp");
        assert_eq!(config.pipeline[8].names()[0], "xo.sw.lp");
        config.validate().unwrap();

        set_xo_flavour(&mut config, "mp");
        assert_eq!(config.pipeline[4].names()[0], "xo.lo.mp");
    }

    #[test]
    fn test_compile_is_deterministic() {
        let profile = multiway_profile();
        let compiler = PipelineCompiler::new(&profile, 1024, 16);
        let a = compiler.compile(&selections("sofa", "lp")).unwrap();
        let b = compiler.compile(&selections("sofa", "lp")).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_profile_scan_feeds_compiler() {
        // a scanned profile with no filter material still compiles
        let dir = tempfile::tempdir().unwrap();
        let json = format!(
            r#"{{
                "main_folder": "{}",
                "loudspeaker": "desk",
                "fs": 96000,
                "outputs": {{
                    "1": {{ "name": "fr.L" }},
                    "2": {{ "name": "fr.R" }}
                }}
            }}"#,
            dir.path().display()
        );
        let config: AppConfig = serde_json::from_str(&json).unwrap();
        let profile = LoudspeakerProfile::scan(&config).unwrap();

        let compiler = PipelineCompiler::new(&profile, config.chunksize, config.dither_bits);
        let compiled = compiler.compile(&selections("none", "none")).unwrap();
        assert_eq!(
            compiled.filters[DITHER],
            FilterDef::Dither {
                bits: 16,
                shaping: DitherKind::Simple
            }
        );
    }
}
