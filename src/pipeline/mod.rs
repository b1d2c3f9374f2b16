//! Engine pipeline model and compiler.
//!
//! A typed description of the engine's mixer/filter graph, the compiler
//! that derives it from the preamp state, and the incremental edits applied
//! to a live configuration.

pub mod compiler;
pub mod mixers;
pub mod model;

pub use compiler::{clear_drc, insert_drc, set_xo_flavour, PipelineCompiler, Selections};
pub use mixers::{multiway_mixer, preamp_mixer, MixerMode};
pub use model::{
    DeviceConfig, DitherKind, EngineConfig, FilterDef, MixerDef, Stage, StageKind, BAL_POL_L,
    BAL_POL_R, DITHER, DRC_GAIN, LU_OFFSET, PREAMP_EQ, PREAMP_MIXER,
};
