//! Mixer construction.
//!
//! The preamp mixer is one of five fixed 2x2 matrices selecting the
//! mid/side/solo routing. The multiway expansion mixer routes the stereo
//! preamp output onto the sound card legs, with the subwoofer leg receiving
//! both channels power-split at -3 dB.

use crate::pipeline::model::{MixerChannels, MixerDef, MixerMapping, MixerSource};
use crate::speaker::OutputLeg;
use crate::state::{Midside, Solo};

/// Routing selected for the preamp mixer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MixerMode {
    #[default]
    Normal,
    Mid,
    Side,
    SoloLeft,
    SoloRight,
}

impl MixerMode {
    /// Solo overrides mid/side while engaged.
    pub fn from_state(midside: Midside, solo: Solo) -> Self {
        match solo {
            Solo::L => MixerMode::SoloLeft,
            Solo::R => MixerMode::SoloRight,
            Solo::Off => match midside {
                Midside::Off => MixerMode::Normal,
                Midside::Mid => MixerMode::Mid,
                Midside::Side => MixerMode::Side,
            },
        }
    }
}

/// Per-path (gain, inverted, mute) of one 2x2 matrix, ordered
/// `[src0->dest0, src1->dest0, src0->dest1, src1->dest1]`.
type Matrix2x2 = [(f32, bool, bool); 4];

fn matrix(mode: MixerMode) -> Matrix2x2 {
    match mode {
        MixerMode::Normal => [
            (0.0, false, false),
            (0.0, false, true),
            (0.0, false, true),
            (0.0, false, false),
        ],
        // mono: both sources on both destinations, -6 dB per path
        MixerMode::Mid => [
            (-6.0, false, false),
            (-6.0, false, false),
            (-6.0, false, false),
            (-6.0, false, false),
        ],
        // difference signal: the right source is inverted into dest 1
        MixerMode::Side => [
            (0.0, false, false),
            (0.0, false, true),
            (0.0, false, true),
            (0.0, true, false),
        ],
        MixerMode::SoloLeft => [
            (0.0, false, false),
            (0.0, false, true),
            (0.0, false, true),
            (0.0, false, true),
        ],
        MixerMode::SoloRight => [
            (0.0, false, true),
            (0.0, false, true),
            (0.0, false, true),
            (0.0, false, false),
        ],
    }
}

/// Build the 2-in/2-out preamp mixer for the given mode.
pub fn preamp_mixer(mode: MixerMode) -> MixerDef {
    let m = matrix(mode);
    let source = |idx: usize, channel: u32| MixerSource {
        channel,
        gain: m[idx].0,
        inverted: m[idx].1,
        mute: m[idx].2,
    };

    MixerDef {
        description: None,
        channels: MixerChannels {
            input: 2,
            output: 2,
        },
        mapping: vec![
            MixerMapping {
                dest: 0,
                sources: vec![source(0, 0), source(1, 1)],
            },
            MixerMapping {
                dest: 1,
                sources: vec![source(2, 0), source(3, 1)],
            },
        ],
    }
}

/// Name of the stereo-to-multiway expansion mixer.
pub fn multiway_mixer_name(legs: &[OutputLeg]) -> String {
    format!("from2to{}channels", legs.len())
}

/// Build the expansion mixer routing L/R onto the used output legs.
///
/// `*.L` / `*.R` legs map 1:1 from their source channel with the leg's gain
/// and polarity. A subwoofer leg receives both channels, each at
/// `gain/2 - 3 dB` so the summed pair lands at the configured gain.
/// Destinations are 0-based; card outputs are numbered from 1.
pub fn multiway_mixer(legs: &[OutputLeg]) -> MixerDef {
    let output_channels = legs.iter().map(|l| l.output).max().unwrap_or(2);

    let mut mapping = Vec::with_capacity(legs.len());
    let mut description = String::from("Sound card map:");

    for leg in legs {
        let dest = leg.output - 1;
        let sources = if leg.is_sw() {
            let gain = leg.gain / 2.0 - 3.0;
            vec![
                MixerSource {
                    channel: 0,
                    gain,
                    inverted: leg.polarity.inverted(),
                    mute: false,
                },
                MixerSource {
                    channel: 1,
                    gain,
                    inverted: leg.polarity.inverted(),
                    mute: false,
                },
            ]
        } else {
            let channel = match leg.channel() {
                "R" => 1,
                _ => 0,
            };
            vec![MixerSource {
                channel,
                gain: leg.gain,
                inverted: leg.polarity.inverted(),
                mute: false,
            }]
        };

        mapping.push(MixerMapping { dest, sources });
        description.push_str(&format!(" {}/{}", leg.output, leg.name));
    }

    MixerDef {
        description: Some(description),
        channels: MixerChannels {
            input: 2,
            output: output_channels,
        },
        mapping,
    }
}
