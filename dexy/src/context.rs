//! This module holds the facts about the processing context that every
//! frequency conversion depends on.  Currently that is just the sample rate,
//! which is fixed by the hardware timer and so baked into every conversion.

use fixed::types::{I8F8, U17F15, U5F11};
use num_traits::Float;

use crate::fixedmath::{round, TABLE_INDEX_BITS};
use crate::Phase;

/// The output sample rate, in Hz.  This is `3 << 14`, which lets the
/// frequency conversions below avoid 64 bit arithmetic.
pub const SAMPLE_RATE: u32 = 49_152;

/// A frequency in Hz, as an unsigned 32 bit fixed point number with 15
/// fractional bits.
pub type Frequency = U17F15;
/// An operator frequency ratio, as an unsigned 16 bit fixed point number with
/// 5 integral bits and 11 fractional bits.
pub type FreqRatio = U5F11;
/// A pitch as a MIDI note number with 8 fractional bits (so one semitone is
/// 256).  This is signed so that sub-audio notes can be used for LFO-like
/// fixed-frequency operators.
pub type MidiNote = I8F8;

// SAMPLE_RATE == SAMPLE_RATE_MULT << SAMPLE_RATE_SHIFT
const SAMPLE_RATE_SHIFT: u32 = 14;
const SAMPLE_RATE_MULT: u32 = SAMPLE_RATE >> SAMPLE_RATE_SHIFT;
const _: () = assert!(SAMPLE_RATE_MULT << SAMPLE_RATE_SHIFT == SAMPLE_RATE);
const _: () = assert!(SAMPLE_RATE_SHIFT > TABLE_INDEX_BITS);

/// Calculate the phase increment that produces `freq`
pub const fn increment_for_frequency(freq: Frequency) -> Phase {
    // inc = Hz * 2^24 / SAMPLE_RATE = (Hz << 15) >> (14 - 9) / 3
    (freq.to_bits() >> (SAMPLE_RATE_SHIFT - TABLE_INDEX_BITS)) / SAMPLE_RATE_MULT
}

/// Calculate the phase increment for a frequency in Hz.  This uses floating
/// point math and should stay out of the audio path.
pub fn increment_for_hz(hz: f64) -> Phase {
    let hz = hz.max(0f64).min(Frequency::MAX.to_num::<f64>());
    increment_for_frequency(Frequency::from_num(hz))
}

/// Frequency in Hz of a (possibly fractional, possibly negative) MIDI note
pub fn hz_for_midi_note(note: MidiNote) -> f64 {
    440f64 * 2f64.powf((note.to_num::<f64>() - 69f64) / 12f64)
}

/// Calculate the phase increment for a MIDI note.  Like [increment_for_hz],
/// this is meant for parameter changes, not for the audio path.
pub fn increment_for_midi_note(note: MidiNote) -> Phase {
    increment_for_hz(hz_for_midi_note(note))
}

/// Round a float to the nearest [Phase]
pub(crate) const fn round_phase(x: f64) -> Phase {
    round(x) as Phase
}
