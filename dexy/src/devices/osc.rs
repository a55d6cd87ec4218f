use super::*;

/// Left shift applied to an [AudioSample] of frequency modulation to turn it
/// into a phase offset.  A full scale modulator swings the phase by about
/// +/- 8 table periods.
pub const MOD_SHIFT: u32 = 12;

/// The sine table shared (read-only) by every [Oscillator]
pub static SINE_TABLE: LookupTable<AudioSample> = {
    const fn generate() -> [AudioSample; TABLE_LEN] {
        const PERIOD: f64 = (TABLE_LEN - 1) as f64;
        let mut table = [0; TABLE_LEN];
        let mut i = 0;
        while i < TABLE_LEN {
            let phase = 2f64 * core::f64::consts::PI * (i as f64) / PERIOD;
            let value = fixedmath::sin(phase) * AudioSample::MAX as f64;
            table[i] = fixedmath::round(value) as AudioSample;
            i += 1;
        }
        // periodic, so the extra entry is the first one again
        table[TABLE_LEN - 1] = table[0];
        table
    }
    LookupTable::new(generate())
};

/// A phase-accumulator sine oscillator.
///
/// The frequency is set directly as a phase increment (see
/// [crate::context::increment_for_frequency]).  Each call to
/// [Oscillator::next] produces one sample and advances the phase.
#[derive(Clone, Default)]
pub struct Oscillator {
    phase: Phase,
    increment: Phase,
}

impl Oscillator {
    /// Constructor
    pub const fn new() -> Self {
        Self {
            phase: 0,
            increment: 0,
        }
    }
    /// Set the phase increment, which determines the frequency
    pub fn set_increment(&mut self, increment: Phase) {
        self.increment = increment;
    }
    /// The current phase increment
    pub fn increment(&self) -> Phase {
        self.increment
    }
    /// The current phase
    pub fn phase(&self) -> Phase {
        self.phase
    }
    /// Restart the waveform from phase zero
    pub fn reset(&mut self) {
        self.phase = 0;
    }
    /// Generate the next sample, with `modulation` added to the phase for
    /// this sample only
    #[inline]
    pub fn next(&mut self, modulation: AudioSample) -> AudioSample {
        let modulation = (modulation as ModulationValue) << MOD_SHIFT;
        SINE_TABLE.lookup_interpolate(&mut self.phase, self.increment, modulation)
    }
}
