//! Preamp state management.
//!
//! The [`PreampState`] record is the authoritative user-facing control
//! state, mutated only through validated commands and persisted to a fixed
//! path after each successful mutation.

pub mod auxinfo;
pub mod store;

use serde::{Deserialize, Serialize};

pub use auxinfo::AuxInfo;
pub use store::StateStore;

/// Mid/side processing mode of the preamp mixer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Midside {
    #[default]
    Off,
    /// Mono: both channels summed at -6 dB per path.
    Mid,
    /// L-R difference signal.
    Side,
}

/// Solo mode of the preamp mixer. Overrides mid/side while active.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Solo {
    #[default]
    Off,
    L,
    R,
}

/// Absolute polarity applied per channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Polarity {
    #[default]
    #[serde(rename = "++")]
    PlusPlus,
    #[serde(rename = "--")]
    MinusMinus,
    #[serde(rename = "+-")]
    PlusMinus,
    #[serde(rename = "-+")]
    MinusPlus,
}

impl Polarity {
    /// Per-channel inversion flags (left, right).
    pub fn inversions(self) -> (bool, bool) {
        match self {
            Polarity::PlusPlus => (false, false),
            Polarity::MinusMinus => (true, true),
            Polarity::PlusMinus => (false, true),
            Polarity::MinusPlus => (true, false),
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        // 'normal' and 'off' are accepted aliases for ++
        match s {
            "++" | "normal" | "off" => Some(Polarity::PlusPlus),
            "--" => Some(Polarity::MinusMinus),
            "+-" => Some(Polarity::PlusMinus),
            "-+" => Some(Polarity::MinusPlus),
            _ => None,
        }
    }
}

/// The preamplifier control state.
///
/// `drc_set`, `xo_set` and `target` hold `"none"` or a member of the sets
/// derivable from the loudspeaker profile / curve folder; membership is
/// enforced before any side effect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreampState {
    pub input: String,
    pub level: f32,
    pub balance: f32,
    pub bass: f32,
    pub treble: f32,
    pub lu_offset: f32,
    pub equal_loudness: bool,
    pub target: String,
    pub tone_defeat: bool,
    pub drc_set: String,
    pub xo_set: String,
    pub muted: bool,
    pub midside: Midside,
    pub solo: Solo,
    pub polarity: Polarity,
    /// Derived clip margin in dB, cached for introspection.
    pub gain_headroom: f32,
    pub loudspeaker: String,
    /// Informative sample rate, set from the configuration at startup.
    pub fs: u32,
}

impl Default for PreampState {
    fn default() -> Self {
        Self {
            input: String::new(),
            level: -20.0,
            balance: 0.0,
            bass: 0.0,
            treble: 0.0,
            lu_offset: 0.0,
            equal_loudness: false,
            target: "none".into(),
            tone_defeat: false,
            drc_set: "none".into(),
            xo_set: "none".into(),
            muted: false,
            midside: Midside::Off,
            solo: Solo::Off,
            polarity: Polarity::PlusPlus,
            gain_headroom: 0.0,
            loudspeaker: String::new(),
            fs: 44100,
        }
    }
}
