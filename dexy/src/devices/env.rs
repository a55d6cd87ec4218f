use super::*;

use crate::patch::EnvParams;

/// Envelope progress at which a stage is complete.  Progress is a [Phase], so
/// this is the top of its 24 significant bits.
pub const MAX_PROGRESS: Phase = (1 << fixedmath::PHASE_BITS) - 1;

/// Quadratic attack curve.  Maps progress 0 to level 0 and the end of the
/// table to [MAX_LEVEL], like the DX7.
static ATTACK_CURVE: LookupTable<Level> = {
    const fn generate() -> [Level; TABLE_LEN] {
        let mut table = [0; TABLE_LEN];
        let mut i = 0;
        while i < TABLE_LEN {
            table[i] = fixedmath::round((i * i) as f64 * 0.2499962) as Level;
            i += 1;
        }
        table
    }
    LookupTable::new(generate())
};

/// Inverse of [ATTACK_CURVE]: maps a level (shifted into a [Phase]) back to
/// the attack progress that produces it, divided by 512.
static ATTACK_START: LookupTable<u16> = {
    const fn generate() -> [u16; TABLE_LEN] {
        let mut table = [0; TABLE_LEN];
        let mut i = 0;
        while i < TABLE_LEN {
            let progress = fixedmath::sqrt((i * 128) as f64 / 0.2499962) * 64f64;
            table[i] = fixedmath::round(progress) as u16;
            i += 1;
        }
        table
    }
    LookupTable::new(generate())
};

/// Exponential decay/release curve, from [MAX_LEVEL] down to 0
static DECAY_CURVE: LookupTable<Level> = {
    const fn generate() -> [Level; TABLE_LEN] {
        let mut table = [0; TABLE_LEN];
        let mut i = 0;
        // the last entry stays 0
        while i < TABLE_LEN - 1 {
            let x = (TABLE_LEN - 1 - i) as f64 * 0.01;
            table[i] = (fixedmath::round(fixedmath::exp(x) * 393.996) - 394f64) as Level;
            i += 1;
        }
        table
    }
    LookupTable::new(generate())
};

/// Inverse of [DECAY_CURVE], the same way [ATTACK_START] is for attack
static DECAY_START: LookupTable<u16> = {
    const fn generate() -> [u16; TABLE_LEN] {
        let mut table = [0; TABLE_LEN];
        let mut i = 0;
        while i < TABLE_LEN {
            let x = ((i * 128 + 394) as f64) / 393.996;
            table[i] = fixedmath::round(32768f64 - fixedmath::ln(x) * 6400f64) as u16;
            i += 1;
        }
        table
    }
    LookupTable::new(generate())
};

/// Exponential map from a rate parameter to a progress increment.  The top
/// parameter value is special and completes a stage in a single sample.
static RATE_MAP: [Phase; PARAM_COUNT] = {
    const fn generate() -> [Phase; PARAM_COUNT] {
        let mut table = [0; PARAM_COUNT];
        let mut i = 0;
        while i < PARAM_COUNT - 1 {
            let rate = fixedmath::round(fixedmath::exp(i as f64 * 0.01) * 12.0243) - 11f64;
            table[i] = rate as Phase;
            i += 1;
        }
        table[PARAM_COUNT - 1] = MAX_PROGRESS + 1;
        table
    }
    generate()
};

/// Convert a rate parameter to a progress increment per sample
pub fn rate_from_param(param: ParamValue) -> Phase {
    RATE_MAP[param.min(MAX_PARAM) as usize]
}

// Attack is a bit faster than decay and release, like the DX7
fn attack_rate_from_param(param: ParamValue) -> Phase {
    rate_from_param(param) * 3 / 2
}

/// The stages of an [Envelope]
#[derive(Eq, PartialEq, Clone, Copy, Debug, Default)]
pub enum EnvStage {
    /// Silent, waiting for a gate
    #[default]
    Idle,
    /// Waiting before the attack starts
    Delay,
    /// Rising to full level
    Attack,
    /// Falling to the sustain level
    Decay,
    /// Holding the sustain level until the gate ends
    Sustain,
    /// Falling to zero
    Release,
}

/// A DADSR envelope generator, one per [Operator].
///
/// Gate handling is edge triggered.  [Envelope::gate_start] always restarts
/// from the delay stage, and [Envelope::gate_stop] moves to release once per
/// gate.  Attack, decay and release don't restart their curves from the
/// beginning when entered: they look up the point on the curve matching the
/// current level, so retriggering a note mid-envelope doesn't click.
///
/// Looping envelopes skip sustain and go back to delay after release for as
/// long as the gate is held.
#[derive(Clone)]
pub struct Envelope {
    stage: EnvStage,
    progress: Phase,
    increment: Phase,
    level: Level,
    gate_on: bool,

    delay: Phase,
    attack: Phase,
    decay: Phase,
    sustain: Level,
    release: Phase,
    looping: bool,
}

impl Default for Envelope {
    fn default() -> Self {
        Self::new()
    }
}

impl Envelope {
    /// Constructor, using the default [EnvParams]
    pub fn new() -> Self {
        let mut env = Self {
            stage: EnvStage::Idle,
            progress: 0,
            increment: 0,
            level: 0,
            gate_on: false,
            delay: 0,
            attack: 0,
            decay: 0,
            sustain: 0,
            release: 0,
            looping: false,
        };
        env.set_params(&EnvParams::default());
        env
    }
    /// Convert `params` into rates and levels.  This can be called while the
    /// envelope runs; the new settings apply from the next stage change
    /// (or immediately, for the sustain level).
    pub fn set_params(&mut self, params: &EnvParams) {
        // delay is a time, but it runs as a rate
        self.delay = rate_from_param(MAX_PARAM - params.delay.min(MAX_PARAM));
        self.attack = attack_rate_from_param(params.attack);
        self.decay = rate_from_param(params.decay);
        self.sustain = level_from_param(params.sustain);
        self.release = rate_from_param(params.release);
        self.looping = params.looping;
    }
    /// Start (or restart) the envelope
    pub fn gate_start(&mut self) {
        self.gate_on = true;
        self.set_stage(EnvStage::Delay);
    }
    /// Release the envelope, if the gate is on
    pub fn gate_stop(&mut self) {
        if core::mem::replace(&mut self.gate_on, false) {
            self.set_stage(EnvStage::Release);
        }
    }
    /// Stop the envelope immediately
    pub fn stop(&mut self) {
        self.set_stage(EnvStage::Idle);
    }
    /// The current stage
    pub fn stage(&self) -> EnvStage {
        self.stage
    }
    /// The current output level
    pub fn level(&self) -> Level {
        self.level
    }
    /// Advance the envelope by one sample and return the new level
    #[inline]
    pub fn next(&mut self) -> Level {
        // Each stage is responsible for advancing progress
        match self.stage {
            EnvStage::Idle => {}
            EnvStage::Delay => self.step_delay(),
            EnvStage::Attack => self.step_attack(),
            EnvStage::Decay => self.step_decay(),
            EnvStage::Sustain => self.level = self.sustain,
            EnvStage::Release => self.step_release(),
        }
        self.level
    }

    fn set_stage(&mut self, stage: EnvStage) {
        self.stage = stage;
        match stage {
            EnvStage::Idle => {
                self.progress = 0;
                self.increment = 0;
                self.level = 0;
            }
            EnvStage::Delay => {
                // The level is left alone so a release that's still running
                // doesn't click.  It does mean the old level is held until the
                // attack starts.
                self.progress = 0;
                self.increment = self.delay;
            }
            EnvStage::Attack => {
                self.progress = Self::start_progress(&ATTACK_START, self.level);
                self.increment = self.attack;
            }
            EnvStage::Decay => {
                let above_sustain = self.level.saturating_sub(self.sustain);
                self.progress = Self::start_progress(&DECAY_START, above_sustain);
                self.increment = self.decay;
            }
            EnvStage::Sustain => {
                self.progress = 0;
                self.increment = 0;
                self.level = self.sustain;
            }
            EnvStage::Release => {
                self.progress = Self::start_progress(&DECAY_START, self.level);
                self.increment = self.release;
            }
        }
    }

    // Reverse lookup of the progress on a curve that gives `level`
    fn start_progress(table: &LookupTable<u16>, level: Level) -> Phase {
        let index = (level as Phase) << 8;
        512 * table.lookup(index) as Phase
    }

    fn step_delay(&mut self) {
        if self.progress >= MAX_PROGRESS {
            self.set_stage(EnvStage::Attack);
        } else {
            self.progress = self.progress.wrapping_add(self.increment);
        }
    }

    fn step_attack(&mut self) {
        if self.progress >= MAX_PROGRESS {
            // so that a zero attack time still reaches full level
            self.level = MAX_LEVEL;
            self.set_stage(EnvStage::Decay);
        } else {
            self.level = ATTACK_CURVE.lookup_interpolate(&mut self.progress, self.increment, 0);
        }
    }

    fn step_decay(&mut self) {
        if self.level <= self.sustain || self.progress >= MAX_PROGRESS {
            if self.looping {
                self.set_stage(EnvStage::Release);
            } else {
                self.set_stage(EnvStage::Sustain);
            }
        } else {
            let level = DECAY_CURVE.lookup_interpolate(&mut self.progress, self.increment, 0);
            self.level = level.saturating_add(self.sustain);
        }
    }

    fn step_release(&mut self) {
        if self.level == 0 || self.progress >= MAX_PROGRESS {
            if self.looping && self.gate_on {
                self.set_stage(EnvStage::Delay);
            } else {
                self.stop();
            }
        } else {
            self.level = DECAY_CURVE.lookup_interpolate(&mut self.progress, self.increment, 0);
        }
    }
}
