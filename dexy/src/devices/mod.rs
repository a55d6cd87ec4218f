//! This module contains the building blocks of an FM voice: a sine
//! [Oscillator], a DADSR [Envelope], and the [Operator] that combines the two
//! with its static settings.

use crate::fixedmath::{self, LookupTable, TABLE_LEN};
use crate::{AudioSample, Level, ModulationValue, ParamValue, Phase, MAX_LEVEL, MAX_PARAM};

mod env;
mod operator;
mod osc;

pub use env::{rate_from_param, EnvStage, Envelope, MAX_PROGRESS};
pub use operator::{amp_mod_level, level_from_param, scale, Operator};
pub use osc::{Oscillator, MOD_SHIFT, SINE_TABLE};

/// Number of distinct values of a [ParamValue], i.e. the length of the
/// parameter mapping tables
const PARAM_COUNT: usize = MAX_PARAM as usize + 1;
