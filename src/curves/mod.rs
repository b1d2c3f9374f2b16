//! EQ curve synthesis pipeline.
//!
//! Tabulated magnitude curves are combined into one EQ curve, turned into a
//! minimum-phase impulse and double-buffered to disk for the engine's
//! convolver, off the command-handling path.

pub mod buffers;
pub mod synth;
pub mod tables;
pub mod worker;

pub use buffers::{load_pcm32, save_pcm32, EqBuffers, Slot};
pub use synth::{compose, semispectrum_to_impulse, EqSettings};
pub use tables::{CurveTables, TONE_SPAN};
pub use worker::EqWorker;
