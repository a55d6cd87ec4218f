use super::*;

use crate::context::{increment_for_midi_note, FreqRatio, MidiNote};
use crate::patch::OpParams;

/// Exponential map from a level parameter to a [Level].  Maps 0 to 0 and
/// [MAX_PARAM] to [MAX_LEVEL].
static LEVEL_MAP: [Level; PARAM_COUNT] = {
    const fn generate() -> [Level; PARAM_COUNT] {
        let mut table = [0; PARAM_COUNT];
        let mut i = 0;
        while i < PARAM_COUNT {
            let level = fixedmath::exp(i as f64 * 0.00775) * 23.6285 - 24f64;
            table[i] = fixedmath::round(level) as Level;
            i += 1;
        }
        table
    }
    generate()
};

/// Convert a level parameter (output level, sustain level) to a [Level]
pub fn level_from_param(param: ParamValue) -> Level {
    LEVEL_MAP[param.min(MAX_PARAM) as usize]
}

/// Scale `sample` by `level`, where [MAX_LEVEL] is unity gain
#[inline]
pub fn scale(sample: AudioSample, level: Level) -> AudioSample {
    ((sample as i32 * (level as i32 + 1)) >> 16) as AudioSample
}

/// The gain applied by amplitude modulation `amp_mod` to an operator with
/// sensitivity `sensitivity`.  With zero sensitivity this is always
/// [MAX_LEVEL]; at full sensitivity the gain swings around half scale.
#[inline]
pub fn amp_mod_level(sensitivity: ParamValue, amp_mod: AudioSample) -> Level {
    let sensitivity = sensitivity.min(MAX_PARAM) as i32;
    let level = sensitivity * amp_mod as i32 / 1024 + (MAX_LEVEL as i32 - sensitivity * 32);
    level.clamp(0, MAX_LEVEL as i32) as Level
}

/// One FM operator: an [Oscillator] whose output is shaped by an [Envelope],
/// by amplitude modulation, and by a fixed output level.
///
/// An operator either tracks the note pitch through a frequency ratio, or
/// plays at a fixed frequency set when its parameters are loaded.
#[derive(Clone)]
pub struct Operator {
    osc: Oscillator,
    env: Envelope,

    fixed_freq: bool,
    ratio: FreqRatio,
    output_level: Level,
    use_envelope: bool,
    amp_mod_sens: ParamValue,
}

impl Default for Operator {
    fn default() -> Self {
        Self::new()
    }
}

impl Operator {
    /// Constructor, using the default [OpParams]
    pub fn new() -> Self {
        let mut op = Self {
            osc: Oscillator::new(),
            env: Envelope::new(),
            fixed_freq: false,
            ratio: FreqRatio::ONE,
            output_level: MAX_LEVEL,
            use_envelope: true,
            amp_mod_sens: 0,
        };
        op.set_params(&OpParams::default());
        op
    }
    /// Load settings from a patch.  This doesn't touch the running envelope
    /// or the oscillator phase, so it is safe to call while a note plays.
    ///
    /// A ratio operator keeps its current frequency until the next call to
    /// [Operator::set_note_pitch].
    pub fn set_params(&mut self, params: &OpParams) {
        self.fixed_freq = params.fixed_freq;
        if self.fixed_freq {
            let note = MidiNote::from_bits(params.note_or_freq as i16);
            self.osc.set_increment(increment_for_midi_note(note));
        } else {
            self.ratio = FreqRatio::from_bits(params.note_or_freq);
        }
        self.output_level = level_from_param(params.output_level);
        self.use_envelope = params.use_envelope;
        self.amp_mod_sens = params.amp_mod_sens.min(MAX_PARAM);
        self.env.set_params(&params.env);
    }
    /// Set the frequency from the note pitch, given as a phase increment.
    /// Fixed-frequency operators ignore this.
    pub fn set_note_pitch(&mut self, pitch: Phase) {
        if !self.fixed_freq {
            let increment = (pitch as u64 * self.ratio.to_bits() as u64) >> FreqRatio::FRAC_NBITS;
            self.osc.set_increment(increment as Phase);
        }
    }
    /// Start the envelope
    pub fn gate_start(&mut self) {
        self.env.gate_start();
    }
    /// Release the envelope
    pub fn gate_stop(&mut self) {
        self.env.gate_stop();
    }
    /// Restart the oscillator from phase zero
    pub fn reset_wave(&mut self) {
        self.osc.reset();
    }
    /// The output level, after mapping from the parameter value
    pub fn output_level(&self) -> Level {
        self.output_level
    }
    /// True if this operator plays at a fixed frequency
    pub fn is_fixed_freq(&self) -> bool {
        self.fixed_freq
    }
    /// The operator's envelope
    pub fn envelope(&self) -> &Envelope {
        &self.env
    }
    /// The operator's oscillator
    pub fn oscillator(&self) -> &Oscillator {
        &self.osc
    }
    /// Generate the next sample.  `freq_mod` is added to the oscillator phase
    /// and `amp_mod` is scaled by the operator's amplitude modulation
    /// sensitivity.
    #[inline]
    pub fn next(&mut self, freq_mod: AudioSample, amp_mod: AudioSample) -> AudioSample {
        let mut sample = self.osc.next(freq_mod);
        if self.use_envelope {
            sample = scale(sample, self.env.next());
        }
        sample = scale(sample, amp_mod_level(self.amp_mod_sens, amp_mod));
        scale(sample, self.output_level)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixedmath::TABLE_FRACTION_BITS;
    use crate::patch::EnvParams;

    fn plain_params() -> OpParams {
        OpParams {
            use_envelope: false,
            ..OpParams::default()
        }
    }

    #[test]
    fn level_map_endpoints() {
        assert_eq!(level_from_param(0), 0);
        assert_eq!(level_from_param(MAX_PARAM), MAX_LEVEL);
        assert_eq!(level_from_param(2000), MAX_LEVEL);
        assert!(LEVEL_MAP.windows(2).all(|w| w[0] <= w[1]));
        for (i, level) in LEVEL_MAP.iter().enumerate() {
            let expected = ((i as f64 * 0.00775).exp() * 23.6285 - 24.0).round();
            assert_eq!(*level as f64, expected.max(0.0), "entry {i}");
        }
    }

    #[test]
    fn scale_is_unity_at_max() {
        for sample in [i16::MIN, -12345, -1, 0, 1, 777, i16::MAX] {
            assert_eq!(scale(sample, MAX_LEVEL), sample);
            assert_eq!(scale(sample, 0), if sample < 0 { -1 } else { 0 });
        }
        assert_eq!(scale(20000, 32767), 10000);
    }

    #[test]
    fn amp_mod_range() {
        assert_eq!(amp_mod_level(0, i16::MIN), MAX_LEVEL);
        assert_eq!(amp_mod_level(0, i16::MAX), MAX_LEVEL);
        assert_eq!(amp_mod_level(MAX_PARAM, 0), 65535 - 1023 * 32);
        assert_eq!(amp_mod_level(MAX_PARAM, i16::MAX), 65534);
        assert_eq!(amp_mod_level(MAX_PARAM, i16::MIN), 63);
        // out of range sensitivity is clamped
        assert_eq!(amp_mod_level(5000, i16::MIN), 63);
        assert!(amp_mod_level(512, 1000) > amp_mod_level(512, -1000));
    }

    #[test]
    fn ratio_tracks_pitch() {
        let mut op = Operator::new();
        let mut params = plain_params();
        // ratio 2.5
        params.note_or_freq = 5 << (FreqRatio::FRAC_NBITS - 1);
        op.set_params(&params);
        op.set_note_pitch(100_000);
        assert_eq!(op.oscillator().increment(), 250_000);
        // large pitch times a large ratio must not overflow the intermediate
        params.note_or_freq = u16::MAX;
        op.set_params(&params);
        op.set_note_pitch(1 << 24);
        assert_eq!(op.oscillator().increment(), ((u16::MAX as u64) << 13) as Phase);
    }

    #[test]
    fn fixed_frequency_ignores_pitch() {
        let mut op = Operator::new();
        let mut params = plain_params();
        params.fixed_freq = true;
        params.note_or_freq = MidiNote::from_num(69).to_bits() as u16;
        op.set_params(&params);
        let increment = op.oscillator().increment();
        assert_eq!(increment, increment_for_midi_note(MidiNote::from_num(69)));
        op.set_note_pitch(12345);
        assert_eq!(op.oscillator().increment(), increment);
        assert!(op.is_fixed_freq());
    }

    #[test]
    fn negative_fixed_note_is_an_lfo() {
        let mut op = Operator::new();
        let mut params = plain_params();
        params.fixed_freq = true;
        params.note_or_freq = MidiNote::from_num(-36).to_bits() as u16;
        op.set_params(&params);
        let increment = op.oscillator().increment();
        assert!(increment > 0 && increment < 1000);
    }

    #[test]
    fn full_level_passes_sine_through() {
        let mut op = Operator::new();
        op.set_params(&plain_params());
        op.set_note_pitch(1 << TABLE_FRACTION_BITS);
        for i in 0..64 {
            assert_eq!(op.next(0, 0), SINE_TABLE.entries()[i]);
        }
    }

    #[test]
    fn muted_operator_is_silent() {
        let mut op = Operator::new();
        let mut params = plain_params();
        params.output_level = 0;
        op.set_params(&params);
        op.set_note_pitch(1 << TABLE_FRACTION_BITS);
        for _ in 0..512 {
            assert!(op.next(0, 0).abs() <= 1);
        }
        assert_eq!(op.output_level(), 0);
    }

    #[test]
    fn envelope_gates_output() {
        let mut op = Operator::new();
        let mut params = OpParams::default();
        params.env = EnvParams {
            attack: 1023,
            decay: 1023,
            release: 1023,
            ..EnvParams::default()
        };
        op.set_params(&params);
        op.set_note_pitch(1 << TABLE_FRACTION_BITS);
        // idle envelope: scale by zero leaves only the rounding of negatives
        for _ in 0..512 {
            assert!(op.next(0, 0) <= 0);
        }
        op.gate_start();
        let peak = (0..1024).map(|_| op.next(0, 0)).max().unwrap_or(0);
        assert!(peak > 30000);
        op.gate_stop();
        for _ in 0..8 {
            op.next(0, 0);
        }
        assert_eq!(op.envelope().stage(), EnvStage::Idle);
    }

    #[test]
    fn reset_wave_restarts_phase() {
        let mut op = Operator::new();
        op.set_note_pitch(1 << 20);
        for _ in 0..10 {
            op.next(0, 0);
        }
        assert_ne!(op.oscillator().phase(), 0);
        op.reset_wave();
        assert_eq!(op.oscillator().phase(), 0);
    }
}
