//! Contains the patch data structures, the factory patch bank, and support for
//! editing patches while they play.
//!
//! Everything here derives `serde` traits so the storage layer can pick its
//! own format.  The engine only ever sees patches that passed
//! [Patch::validate].

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::context::{FreqRatio, MidiNote};
use crate::{ParamValue, MAX_PARAM, NUM_ALGORITHMS, NUM_OPERATORS, NUM_PATCHES};

mod changes;
mod store;

pub use changes::{OpSetting, PatchChange, PatchSetting};
pub use store::{persist, restore, PatchStore};

/// Patch number loaded at power on
pub const INITIAL_PATCH: usize = 2;

/// Length of a [PatchName] in bytes
pub const PATCH_NAME_LEN: usize = 16;

/// Reasons a patch (or a change to one) can be rejected
#[derive(Error, Clone, Copy, Debug, PartialEq, Eq)]
pub enum PatchError {
    /// Patch number out of range
    #[error("no patch number {0}")]
    BadPatchIndex(usize),
    /// Operator number out of range
    #[error("no operator number {0}")]
    BadOperator(usize),
    /// Unknown field identifier in a setting change
    #[error("unknown field {0}")]
    UnknownField(u8),
    /// A parameter is bigger than `MAX_PARAM`
    #[error("parameter value {0} out of range")]
    ParamOutOfRange(ParamValue),
    /// Algorithm number out of range
    #[error("no algorithm number {0}")]
    BadAlgorithm(u8),
    /// A name contains a control character
    #[error("bad character {0:#04x} in patch name")]
    BadNameChar(u8),
}

fn check_param(value: ParamValue) -> Result<(), PatchError> {
    if value > MAX_PARAM {
        Err(PatchError::ParamOutOfRange(value))
    } else {
        Ok(())
    }
}

/// Envelope settings for one operator
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvParams {
    /// Delay time
    pub delay: ParamValue,
    /// Attack rate
    pub attack: ParamValue,
    /// Decay rate
    pub decay: ParamValue,
    /// Sustain level
    pub sustain: ParamValue,
    /// Release rate
    pub release: ParamValue,
    /// Repeat the envelope for as long as the gate is held
    pub looping: bool,
}

impl EnvParams {
    /// The default envelope: instant attack, full sustain, instant release
    pub const fn new() -> Self {
        Self {
            delay: 0,
            attack: 0,
            decay: 0,
            sustain: MAX_PARAM,
            release: 0,
            looping: false,
        }
    }
    const fn adsr(attack: ParamValue, decay: ParamValue, sustain: ParamValue, release: ParamValue) -> Self {
        Self {
            delay: 0,
            attack,
            decay,
            sustain,
            release,
            looping: false,
        }
    }
    /// Check that every value is in range
    pub fn validate(&self) -> Result<(), PatchError> {
        for value in [self.delay, self.attack, self.decay, self.sustain, self.release] {
            check_param(value)?;
        }
        Ok(())
    }
}

impl Default for EnvParams {
    fn default() -> Self {
        Self::new()
    }
}

/// Settings for one operator
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpParams {
    /// Play at a fixed frequency instead of following the pitch input
    pub fixed_freq: bool,
    /// The raw bits of a [MidiNote] if `fixed_freq` is set, or of a
    /// [FreqRatio] if not
    pub note_or_freq: u16,
    /// Output level
    pub output_level: ParamValue,
    /// Shape the output with the envelope
    pub use_envelope: bool,
    /// Envelope settings
    pub env: EnvParams,
    /// Amplitude modulation sensitivity
    pub amp_mod_sens: ParamValue,
}

impl OpParams {
    /// The default operator: ratio 1, full level, default envelope
    pub const fn new() -> Self {
        Self {
            fixed_freq: false,
            note_or_freq: FreqRatio::ONE.to_bits(),
            output_level: MAX_PARAM,
            use_envelope: true,
            env: EnvParams::new(),
            amp_mod_sens: 0,
        }
    }
    /// An operator following the pitch input at `ratio`
    pub const fn with_ratio(ratio: FreqRatio) -> Self {
        Self {
            note_or_freq: ratio.to_bits(),
            ..Self::new()
        }
    }
    /// An operator playing at a fixed pitch
    pub const fn with_note(note: MidiNote) -> Self {
        Self {
            fixed_freq: true,
            note_or_freq: note.to_bits() as u16,
            ..Self::new()
        }
    }
    /// Check that every value is in range.  `note_or_freq` is always valid.
    pub fn validate(&self) -> Result<(), PatchError> {
        check_param(self.output_level)?;
        check_param(self.amp_mod_sens)?;
        self.env.validate()
    }
}

impl Default for OpParams {
    fn default() -> Self {
        Self::new()
    }
}

/// A fixed length, blank padded patch name
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchName([u8; PATCH_NAME_LEN]);

impl PatchName {
    /// Build a name from a string, truncating it or padding it with blanks
    /// to [PATCH_NAME_LEN] bytes.  Non-ASCII characters become `?`.
    pub const fn new(name: &str) -> Self {
        let bytes = name.as_bytes();
        let mut name = [b' '; PATCH_NAME_LEN];
        let mut i = 0;
        while i < PATCH_NAME_LEN && i < bytes.len() {
            name[i] = if bytes[i].is_ascii() { bytes[i] } else { b'?' };
            i += 1;
        }
        Self(name)
    }
    /// Wrap raw bytes, which may not be valid
    pub const fn from_bytes(bytes: [u8; PATCH_NAME_LEN]) -> Self {
        Self(bytes)
    }
    /// The raw bytes
    pub fn as_bytes(&self) -> &[u8; PATCH_NAME_LEN] {
        &self.0
    }
    /// The name as a string, without the padding.  An invalid name reads as
    /// an empty string.
    pub fn as_str(&self) -> &str {
        core::str::from_utf8(&self.0).unwrap_or("").trim_end()
    }
    /// Check that every character can be displayed.  Names are blank padded,
    /// so `NUL` isn't allowed either.
    pub fn validate(&self) -> Result<(), PatchError> {
        match self.0.iter().find(|&&ch| ch < b' ') {
            Some(&ch) => Err(PatchError::BadNameChar(ch)),
            None => Ok(()),
        }
    }
}

impl Default for PatchName {
    fn default() -> Self {
        Self::new("")
    }
}

/// Everything needed to describe a sound
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Patch {
    /// Display name
    pub name: PatchName,
    /// Algorithm number, 0 based
    pub algorithm: u8,
    /// How much of the feedback history the feedback operator hears
    pub feedback_amount: ParamValue,
    /// Per-operator settings, in algorithm slot order
    pub op_params: [OpParams; NUM_OPERATORS],
}

impl Patch {
    /// A blank patch using the first algorithm and default operators
    pub const fn new() -> Self {
        Self {
            name: PatchName::new(""),
            algorithm: 0,
            feedback_amount: MAX_PARAM,
            op_params: [OpParams::new(); NUM_OPERATORS],
        }
    }
    /// Check every field
    pub fn validate(&self) -> Result<(), PatchError> {
        if self.algorithm as usize >= NUM_ALGORITHMS {
            return Err(PatchError::BadAlgorithm(self.algorithm));
        }
        check_param(self.feedback_amount)?;
        self.name.validate()?;
        self.op_params.iter().try_for_each(OpParams::validate)
    }

    /// The patch most of the factory bank starts out as
    pub const fn factory_default() -> Self {
        let env = EnvParams::adsr(930, 500, 700, 400);
        let op = OpParams {
            output_level: 700,
            env,
            amp_mod_sens: MAX_PARAM,
            ..OpParams::with_ratio(FreqRatio::const_from_int(2))
        };
        let mut op_params = [op; NUM_OPERATORS];
        // the final carrier is brighter and louder
        op_params[NUM_OPERATORS - 1] = OpParams {
            env: EnvParams::adsr(930, 400, 930, 400),
            ..OpParams::new()
        };
        Self {
            name: PatchName::new("default"),
            algorithm: 15,
            feedback_amount: MAX_PARAM,
            op_params,
        }
    }

    /// Two detuned carriers with inharmonic modulators and a fixed
    /// frequency partial
    pub const fn factory_bells() -> Self {
        const fn ratio(bits: u16) -> FreqRatio {
            FreqRatio::from_bits(bits)
        }
        let carrier = EnvParams::adsr(1000, 300, 0, 300);
        let modulator = EnvParams::adsr(1020, 120, 0, 200);
        Self {
            name: PatchName::new("bells"),
            algorithm: 4,
            feedback_amount: MAX_PARAM,
            op_params: [
                // modulator with feedback
                OpParams {
                    output_level: 800,
                    env: EnvParams::adsr(1020, 800, 0, 910),
                    ..OpParams::with_ratio(ratio(4075))
                },
                OpParams {
                    env: EnvParams::adsr(700, 500, 0, 600),
                    ..OpParams::with_note(MidiNote::const_from_int(64))
                },
                OpParams {
                    output_level: 670,
                    env: modulator,
                    ..OpParams::with_ratio(ratio(7147))
                },
                OpParams {
                    env: carrier,
                    ..OpParams::with_ratio(ratio(2027))
                },
                OpParams {
                    output_level: 700,
                    env: modulator,
                    ..OpParams::with_ratio(ratio(7188))
                },
                OpParams {
                    output_level: 972,
                    env: carrier,
                    ..OpParams::with_ratio(ratio(2068))
                },
            ],
        }
    }

    /// A single unmodulated sine, for checking tuning
    pub const fn factory_test() -> Self {
        let muted = OpParams {
            output_level: 0,
            env: EnvParams::adsr(930, 400, 930, 400),
            ..OpParams::new()
        };
        let mut op_params = [muted; NUM_OPERATORS];
        op_params[0] = OpParams {
            env: EnvParams::adsr(900, 0, MAX_PARAM, 400),
            ..OpParams::new()
        };
        Self {
            name: PatchName::new("test"),
            algorithm: 31,
            feedback_amount: 0,
            op_params,
        }
    }
}

impl Default for Patch {
    fn default() -> Self {
        Self::new()
    }
}

/// All of the patches the user can select between
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchBank {
    patches: [Patch; NUM_PATCHES],
}

impl PatchBank {
    /// The bank the module ships with
    pub const fn factory() -> Self {
        let mut patches = [Patch::factory_default(); NUM_PATCHES];
        patches[0] = Patch::factory_bells();
        patches[1] = Patch::factory_test();
        Self { patches }
    }
    /// Wrap a set of patches, checking them first
    pub fn from_patches(patches: [Patch; NUM_PATCHES]) -> Result<Self, PatchError> {
        let bank = Self { patches };
        bank.validate()?;
        Ok(bank)
    }
    /// Look up a patch
    pub fn get(&self, index: usize) -> Option<&Patch> {
        self.patches.get(index)
    }
    /// All of the patches
    pub fn patches(&self) -> &[Patch; NUM_PATCHES] {
        &self.patches
    }
    /// Check every patch
    pub fn validate(&self) -> Result<(), PatchError> {
        self.patches.iter().try_for_each(Patch::validate)
    }
    /// Replace the whole bank (for example after reading it from storage).
    /// An invalid bank is rejected and the current one kept.
    pub fn replace(&mut self, bank: &PatchBank) -> Result<(), PatchError> {
        bank.validate()?;
        self.patches = bank.patches;
        Ok(())
    }
}

impl Default for PatchBank {
    fn default() -> Self {
        Self::factory()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn factory_bank_is_valid() {
        let bank = PatchBank::factory();
        assert_eq!(bank.validate(), Ok(()));
        assert_eq!(bank.get(0).map(|p| p.name.as_str()), Some("bells"));
        assert_eq!(bank.get(1).map(|p| p.name.as_str()), Some("test"));
        for patch in &bank.patches()[2..] {
            assert_eq!(*patch, Patch::factory_default());
        }
        assert!(bank.get(NUM_PATCHES).is_none());
        assert_eq!(bank.get(INITIAL_PATCH).map(|p| p.algorithm), Some(15));
    }

    #[test]
    fn factory_values() {
        let default = Patch::factory_default();
        assert_eq!(default.op_params[0].note_or_freq, 2 << 11);
        assert_eq!(default.op_params[5].note_or_freq, 1 << 11);
        assert_eq!(default.op_params[5].env.sustain, 930);
        let bells = Patch::factory_bells();
        assert!(bells.op_params[1].fixed_freq);
        assert_eq!(bells.op_params[1].note_or_freq, 64 * 256);
        assert_eq!(bells.op_params[5].note_or_freq, (1.01f64 * 2048.0) as u16);
        assert_eq!(bells.op_params[2].note_or_freq, (3.49f64 * 2048.0) as u16);
        let test = Patch::factory_test();
        assert_eq!(test.op_params[0].output_level, MAX_PARAM);
        assert!(test.op_params[1..].iter().all(|op| op.output_level == 0));
    }

    #[test]
    fn names() {
        let name = PatchName::new("a name that is much too long");
        assert_eq!(name.as_str(), "a name that is m");
        let name = PatchName::new("pad");
        assert_eq!(name.as_bytes(), b"pad             ");
        assert_eq!(name.as_str(), "pad");
        assert_eq!(PatchName::new("caf\u{e9}").as_bytes()[3], b'?');
        assert_eq!(name.validate(), Ok(()));
        let mut bytes = *name.as_bytes();
        bytes[5] = 0;
        assert_eq!(
            PatchName::from_bytes(bytes).validate(),
            Err(PatchError::BadNameChar(0))
        );
    }

    #[test]
    fn validation() {
        let mut patch = Patch::factory_default();
        assert_eq!(patch.validate(), Ok(()));
        patch.algorithm = NUM_ALGORITHMS as u8;
        assert_eq!(patch.validate(), Err(PatchError::BadAlgorithm(32)));
        patch.algorithm = 0;
        patch.op_params[3].env.release = 1024;
        assert_eq!(patch.validate(), Err(PatchError::ParamOutOfRange(1024)));
        patch.op_params[3].env.release = 0;
        patch.op_params[2].amp_mod_sens = 5000;
        assert_eq!(patch.validate(), Err(PatchError::ParamOutOfRange(5000)));
        patch.op_params[2].amp_mod_sens = 0;
        patch.feedback_amount = 2000;
        assert_eq!(patch.validate(), Err(PatchError::ParamOutOfRange(2000)));
        patch.feedback_amount = 0;
        patch.op_params[4].note_or_freq = u16::MAX;
        assert_eq!(patch.validate(), Ok(()));
    }

    #[test]
    fn bad_bank_is_not_loaded() {
        let mut bank = PatchBank::factory();
        let mut patches = *bank.patches();
        patches[7].name = PatchName::from_bytes([b'\n'; PATCH_NAME_LEN]);
        assert_eq!(
            PatchBank::from_patches(patches),
            Err(PatchError::BadNameChar(b'\n'))
        );
        let bad = PatchBank { patches };
        assert!(bank.replace(&bad).is_err());
        assert_eq!(bank, PatchBank::factory());
        patches[7] = Patch::factory_test();
        let good = PatchBank::from_patches(patches).expect("valid bank");
        assert_eq!(bank.replace(&good), Ok(()));
        assert_eq!(bank.get(7), Some(&Patch::factory_test()));
    }

    #[test]
    fn serde_round_trip() {
        let patch = Patch::factory_bells();
        let json = serde_json::to_string(&patch).expect("serialize");
        let back: Patch = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, patch);
    }
}
