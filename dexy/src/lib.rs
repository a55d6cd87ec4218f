//! This crate contains the synthesis engine and real-time plumbing for Dexy,
//! a monophonic six-operator FM synthesizer module built around a two-core
//! microcontroller.  One core runs the audio loop, producing exactly one
//! sample per period of a hardware timer, while the other samples control
//! voltages and runs a handful of slow housekeeping tasks.
//!
//! The crate is `no_std` and avoids floating point, division and 64 bit
//! arithmetic on the audio path.  All of the waveform and envelope curves are
//! stored in lookup tables generated at compile time (see [fixedmath]).
//!
//! Roughly, data flows like this:
//!
//!  - [cv] turns raw ADC readings into a pitch increment and a timbre value,
//!    which are published through [synth::SynthControl].
//!  - [synth::Synth] owns the single [voice::Voice], which evaluates the
//!    selected [algorithm] over six [devices::Operator]s every sample.
//!  - [pipeline::AudioPipeline] hands the samples to the output device.
//!  - Anything that has to cross from one core to the other goes through a
//!    [sync::Mailbox] or a [sync::CritSecCell].

#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]

pub mod fixedmath;

pub mod context;
pub mod devices;

pub mod algorithm;
pub mod voice;

pub mod patch;
pub mod synth;

pub mod cv;
pub mod dac;
pub mod error;
pub mod pipeline;
pub mod sync;
pub mod tasks;

pub use context::{FreqRatio, Frequency, MidiNote, SAMPLE_RATE};
pub use devices::{Envelope, Operator, Oscillator};
pub use error::{ErrorFlags, ErrorKind};
pub use synth::{Synth, SynthControl};
pub use voice::Voice;

/// A phase accumulator value, also used for envelope progress and rates.
/// Only the low 24 bits are significant: 9 bits of table index and 15 bits of
/// fraction.  Arithmetic on this type always wraps.
pub type Phase = u32;
/// One audio sample, in and out of every stage of the engine
pub type AudioSample = i16;
/// An envelope or amplitude level, where `MAX_LEVEL` is full scale
pub type Level = u16;
/// A widened phase-modulation delta
pub type ModulationValue = i32;
/// A user-facing parameter ("knob") value in the range `0..=MAX_PARAM`
pub type ParamValue = u16;

/// Maximum value of a [ParamValue]
pub const MAX_PARAM: ParamValue = 1023;
/// Maximum value of a [Level]
pub const MAX_LEVEL: Level = Level::MAX;
/// Number of operators in a voice
pub const NUM_OPERATORS: usize = 6;
/// Number of built-in algorithms
pub const NUM_ALGORITHMS: usize = 32;
/// Number of patches in a patch bank
pub const NUM_PATCHES: usize = 32;
