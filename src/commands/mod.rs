//! Command surface of the controller.
//!
//! One textual phrase per request maps onto the closed [`Command`] enum and
//! yields exactly one [`Reply`]. Only the `preamp` surface exists here; the
//! line transport itself lives outside this crate.

pub mod parse;
pub mod reply;

use crate::state::{Midside, Polarity, Solo};

pub use parse::parse_phrase;
pub use reply::Reply;

/// On/off/toggle argument accepted by the switch-like commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchArg {
    On,
    Off,
    Toggle,
}

impl SwitchArg {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "on" | "true" | "1" => Some(SwitchArg::On),
            "off" | "false" | "0" => Some(SwitchArg::Off),
            "toggle" => Some(SwitchArg::Toggle),
            _ => None,
        }
    }

    /// Resolve against the current value.
    pub fn apply(self, current: bool) -> bool {
        match self {
            SwitchArg::On => true,
            SwitchArg::Off => false,
            SwitchArg::Toggle => !current,
        }
    }
}

/// The level-family control a gain command addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GainControl {
    Level,
    LuOffset,
    Bass,
    Treble,
    Balance,
}

impl GainControl {
    pub fn name(self) -> &'static str {
        match self {
            GainControl::Level => "level",
            GainControl::LuOffset => "lu_offset",
            GainControl::Bass => "bass",
            GainControl::Treble => "treble",
            GainControl::Balance => "balance",
        }
    }
}

/// Every request the preamp surface accepts.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    // getters, never persisted
    State,
    GetInputs,
    GetTargetSets,
    GetDrcSets,
    GetXoSets,
    GetEngineConfig,
    GetPreampMixer,
    GetPipeline,
    GetDrcGain,

    // mutations
    SetInput(String),
    Mono(SwitchArg),
    Midside(Midside),
    Solo(Solo),
    Polarity(Polarity),
    Mute(SwitchArg),
    EqualLoudness(SwitchArg),
    SetDrc(String),
    SetXo(String),
    Gain {
        control: GainControl,
        db: f32,
        add: bool,
    },
    Target(String),
    ToneDefeat(SwitchArg),
}

impl Command {
    /// Pure reads skip the whole mutation path.
    pub fn is_getter(&self) -> bool {
        matches!(
            self,
            Command::State
                | Command::GetInputs
                | Command::GetTargetSets
                | Command::GetDrcSets
                | Command::GetXoSets
                | Command::GetEngineConfig
                | Command::GetPreampMixer
                | Command::GetPipeline
                | Command::GetDrcGain
        )
    }
}
