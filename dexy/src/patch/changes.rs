//! Live edits to the patch bank.
//!
//! A patch editor sends small changes (one field at a time) while the patch
//! plays.  Each change is applied to a copy of the patch, which only replaces
//! the original once it validates.

use serde::{Deserialize, Serialize};

use super::{Patch, PatchBank, PatchError, PatchName};
use crate::{ParamValue, NUM_OPERATORS};

/// A patch-level setting, numbered the way the editor numbers them
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PatchSetting {
    /// Algorithm number
    Algorithm,
    /// Feedback amount
    FeedbackAmount,
}

impl TryFrom<u8> for PatchSetting {
    type Error = PatchError;
    fn try_from(field: u8) -> Result<Self, PatchError> {
        match field {
            0 => Ok(Self::Algorithm),
            1 => Ok(Self::FeedbackAmount),
            _ => Err(PatchError::UnknownField(field)),
        }
    }
}

/// An operator setting, numbered the way the editor numbers them
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OpSetting {
    /// [super::OpParams::fixed_freq]
    FixedFreq,
    /// [super::OpParams::note_or_freq]
    NoteOrFreq,
    /// [super::OpParams::output_level]
    OutputLevel,
    /// [super::OpParams::use_envelope]
    UseEnvelope,
    /// [super::OpParams::amp_mod_sens]
    AmpModSens,
    /// Envelope delay
    EnvDelay,
    /// Envelope attack
    EnvAttack,
    /// Envelope decay
    EnvDecay,
    /// Envelope sustain
    EnvSustain,
    /// Envelope release
    EnvRelease,
    /// Envelope looping
    EnvLoop,
}

impl TryFrom<u8> for OpSetting {
    type Error = PatchError;
    fn try_from(field: u8) -> Result<Self, PatchError> {
        use OpSetting::*;
        const FIELDS: [OpSetting; 11] = [
            FixedFreq,
            NoteOrFreq,
            OutputLevel,
            UseEnvelope,
            AmpModSens,
            EnvDelay,
            EnvAttack,
            EnvDecay,
            EnvSustain,
            EnvRelease,
            EnvLoop,
        ];
        FIELDS
            .get(field as usize)
            .copied()
            .ok_or(PatchError::UnknownField(field))
    }
}

/// One edit to the patch bank
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PatchChange {
    /// Replace a whole patch
    Patch {
        /// Patch number
        index: usize,
        /// The new patch
        patch: Patch,
    },
    /// Rename a patch
    Name {
        /// Patch number
        index: usize,
        /// The new name
        name: PatchName,
    },
    /// Change a patch-level setting
    Setting {
        /// Patch number
        index: usize,
        /// Which setting
        setting: PatchSetting,
        /// The new value
        value: ParamValue,
    },
    /// Change one operator's setting
    OpSetting {
        /// Patch number
        index: usize,
        /// Operator (algorithm slot) number
        op: usize,
        /// Which setting
        setting: OpSetting,
        /// The new value.  Flags are set by any non-zero value.
        value: ParamValue,
    },
}

impl PatchChange {
    /// The number of the patch this change edits
    pub fn index(&self) -> usize {
        match *self {
            Self::Patch { index, .. }
            | Self::Name { index, .. }
            | Self::Setting { index, .. }
            | Self::OpSetting { index, .. } => index,
        }
    }

    /// Apply this change to `patch`
    fn apply(&self, patch: &mut Patch) -> Result<(), PatchError> {
        match *self {
            Self::Patch { patch: new, .. } => *patch = new,
            Self::Name { name, .. } => patch.name = name,
            Self::Setting { setting, value, .. } => match setting {
                PatchSetting::Algorithm => {
                    patch.algorithm =
                        u8::try_from(value).map_err(|_| PatchError::ParamOutOfRange(value))?
                }
                PatchSetting::FeedbackAmount => patch.feedback_amount = value,
            },
            Self::OpSetting {
                op, setting, value, ..
            } => {
                if op >= NUM_OPERATORS {
                    return Err(PatchError::BadOperator(op));
                }
                let params = &mut patch.op_params[op];
                match setting {
                    OpSetting::FixedFreq => params.fixed_freq = value != 0,
                    OpSetting::NoteOrFreq => params.note_or_freq = value,
                    OpSetting::OutputLevel => params.output_level = value,
                    OpSetting::UseEnvelope => params.use_envelope = value != 0,
                    OpSetting::AmpModSens => params.amp_mod_sens = value,
                    OpSetting::EnvDelay => params.env.delay = value,
                    OpSetting::EnvAttack => params.env.attack = value,
                    OpSetting::EnvDecay => params.env.decay = value,
                    OpSetting::EnvSustain => params.env.sustain = value,
                    OpSetting::EnvRelease => params.env.release = value,
                    OpSetting::EnvLoop => params.env.looping = value != 0,
                }
            }
        }
        Ok(())
    }
}

impl PatchBank {
    /// Apply a live edit.  The edited patch is checked before it replaces
    /// the original, so a bad change leaves the bank untouched.  Returns the
    /// number of the patch that changed.
    pub fn merge(&mut self, change: &PatchChange) -> Result<usize, PatchError> {
        let index = change.index();
        let current = self
            .patches
            .get_mut(index)
            .ok_or(PatchError::BadPatchIndex(index))?;
        let mut edited = *current;
        change.apply(&mut edited)?;
        edited.validate()?;
        *current = edited;
        Ok(index)
    }
}
