//! Conversion of the pitch and timbre control voltage readings.
//!
//! Both inputs are read by the RP2040's 12 bit ADC and converted through
//! lookup tables built at compile time, after correcting for the ADC's
//! differential non-linearity.

use crate::context::{round_phase, SAMPLE_RATE};
use crate::fixedmath::{exp2, TABLE_INDEX_BITS, TABLE_FRACTION_BITS};
use crate::synth::SynthControl;
use crate::{AudioSample, ErrorKind, Phase};

/// Largest ADC reading
pub const ADC_MAX: u16 = 4095;
const ADC_LEN: usize = ADC_MAX as usize + 1;

// Pitch calibration: readings at 0V and at PITCH_CV_MAX volts
const PITCH_ADC_MIN: f64 = 26.0;
const PITCH_ADC_MAX: f64 = 3626.0;
const PITCH_CV_MAX: f64 = 9.0;
// Frequency at 0V (C0)
const PITCH_HZ_BASE: f64 = 16.3516;

// Timbre calibration: the lowest and highest readings
const TIMBRE_ADC_MIN: f64 = 31.5;
const TIMBRE_ADC_MAX: f64 = 4007.3;

/// Correct a raw reading for the non-linearity of the RP2040 ADC (see the
/// RP2040 datasheet, errata E11).  The ADC misses codes around multiples of
/// 512, so an offset accumulates at each of them, and there's an overall
/// slope error on top.
pub const fn linearize(adc: u16) -> i32 {
    const STEPS: [(u16, i32); 7] = [
        (512, 9),
        (1024, 1),
        (1536, 8),
        (2048, -3),
        (2560, 8),
        (3072, 1),
        (3584, 9),
    ];
    let mut adjust = 0;
    let mut i = 0;
    while i < STEPS.len() && adc >= STEPS[i].0 {
        adjust += STEPS[i].1;
        i += 1;
    }
    adc as i32 + adjust - (adc as i32 >> 7)
}

static PITCH_MAP: [Phase; ADC_LEN] = {
    let mut table = [0; ADC_LEN];
    let mut i = 0;
    while i < ADC_LEN {
        let adc = linearize(i as u16) as f64;
        let cv = (adc - PITCH_ADC_MIN) * PITCH_CV_MAX / (PITCH_ADC_MAX - PITCH_ADC_MIN);
        let hz = PITCH_HZ_BASE * exp2(cv);
        let full_cycle = (1u32 << (TABLE_INDEX_BITS + TABLE_FRACTION_BITS)) as f64;
        table[i] = round_phase(hz * full_cycle / SAMPLE_RATE as f64);
        i += 1;
    }
    table
};

static TIMBRE_MAP: [AudioSample; ADC_LEN] = {
    const MIN: f64 = AudioSample::MIN as f64;
    const MAX: f64 = AudioSample::MAX as f64;
    let mut table = [0; ADC_LEN];
    let mut i = 0;
    while i < ADC_LEN {
        let adc = linearize(i as u16) as f64;
        let mut out = (adc - TIMBRE_ADC_MIN) / (TIMBRE_ADC_MAX - TIMBRE_ADC_MIN) * (MAX - MIN) + MIN;
        if out < MIN {
            out = MIN;
        } else if out > MAX {
            out = MAX;
        }
        table[i] = out as AudioSample;
        i += 1;
    }
    table
};

/// The note pitch, as a phase increment, for a pitch CV reading.  One volt
/// per octave, with 0V at C0.
#[inline]
pub fn pitch_for_adc(adc: u16) -> Phase {
    PITCH_MAP[adc.min(ADC_MAX) as usize]
}

/// The timbre modulation value for a timbre CV reading, covering the whole
/// [AudioSample] range
#[inline]
pub fn timbre_for_adc(adc: u16) -> AudioSample {
    TIMBRE_MAP[adc.min(ADC_MAX) as usize]
}

/// Turns ADC readings into pitch and timbre values for the audio context
pub struct ControlInputs<'a> {
    control: &'a SynthControl,
    prev_pitch: u16,
}

impl<'a> ControlInputs<'a> {
    /// Constructor
    pub fn new(control: &'a SynthControl) -> Self {
        Self {
            control,
            prev_pitch: 0,
        }
    }

    /// Publish a new pair of readings.  The pitch reading is averaged with
    /// the one before it to take the edge off ADC noise.
    pub fn update(&mut self, pitch_adc: u16, timbre_adc: u16) {
        let errors = self.control.errors();
        errors.assert_that(pitch_adc <= ADC_MAX && timbre_adc <= ADC_MAX, ErrorKind::BadArgument);
        let pitch_adc = pitch_adc.min(ADC_MAX);
        let averaged = (pitch_adc + self.prev_pitch) / 2;
        self.prev_pitch = pitch_adc;
        self.control.set_pitch(pitch_for_adc(averaged));
        self.control.set_timbre(timbre_for_adc(timbre_adc));
    }

    /// Like [Self::update], but straight from the ADC.  If either read
    /// failed nothing is published and [ErrorKind::AdcRead] is set.
    pub fn update_from<E>(&mut self, pitch: Result<u16, E>, timbre: Result<u16, E>) {
        match (pitch, timbre) {
            (Ok(pitch), Ok(timbre)) => self.update(pitch, timbre),
            _ => self.control.errors().set(ErrorKind::AdcRead),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::increment_for_hz;

    #[test]
    fn linearization() {
        assert_eq!(linearize(0), 0);
        assert_eq!(linearize(511), 511 - 3);
        assert_eq!(linearize(512), 512 + 9 - 4);
        assert_eq!(linearize(2047), 2047 + 18 - 15);
        assert_eq!(linearize(2048), 2048 + 15 - 16);
        assert_eq!(linearize(ADC_MAX), 4095 + 33 - 31);
    }

    #[test]
    fn pitch_is_one_volt_per_octave() {
        let c0 = pitch_for_adc(26);
        assert!(c0.abs_diff(increment_for_hz(PITCH_HZ_BASE)) <= 1);
        // 1226 and 826 linearize to 1227 and 829, 398 counts apart
        let ratio = pitch_for_adc(1226) as f64 / pitch_for_adc(826) as f64;
        let expected = 2f64.powf(398.0 / 400.0);
        assert!((ratio / expected - 1.0).abs() < 1e-3, "{ratio}");
        assert_eq!(pitch_for_adc(u16::MAX), pitch_for_adc(ADC_MAX));
    }

    #[test]
    fn timbre_covers_the_full_range() {
        assert_eq!(timbre_for_adc(0), AudioSample::MIN);
        assert_eq!(timbre_for_adc(ADC_MAX), AudioSample::MAX);
        assert!(timbre_for_adc(1900) < 0);
        assert!(timbre_for_adc(2200) > 0);
    }

    #[test]
    fn pitch_readings_are_averaged() {
        let control = SynthControl::new();
        let mut inputs = ControlInputs::new(&control);
        inputs.update(1000, 0);
        assert_eq!(control.pitch(), pitch_for_adc(500));
        assert_eq!(control.timbre(), AudioSample::MIN);
        inputs.update(1000, ADC_MAX);
        assert_eq!(control.pitch(), pitch_for_adc(1000));
        assert_eq!(control.timbre(), AudioSample::MAX);
        assert!(!control.errors().any_set());
        inputs.update(5000, 0);
        assert!(control.errors().is_set(ErrorKind::BadArgument));
        assert_eq!(control.pitch(), pitch_for_adc((ADC_MAX + 1000) / 2));
    }

    #[test]
    fn failed_reads_keep_the_last_values() {
        let control = SynthControl::new();
        let mut inputs = ControlInputs::new(&control);
        inputs.update_from::<()>(Ok(2000), Ok(3000));
        let (pitch, timbre) = (control.pitch(), control.timbre());
        assert!(!control.errors().any_set());
        inputs.update_from(Err(()), Ok(0));
        inputs.update_from(Ok(0), Err(()));
        assert_eq!(control.pitch(), pitch);
        assert_eq!(control.timbre(), timbre);
        assert!(control.errors().is_set(ErrorKind::AdcRead));
        assert!(!control.errors().is_set(ErrorKind::BadArgument));
        // the failed reads don't count towards the average
        inputs.update_from::<()>(Ok(2000), Ok(3000));
        assert_eq!(control.pitch(), pitch_for_adc(2000));
    }
}
