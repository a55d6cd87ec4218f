//! The single voice of the synth: six operators wired together by an
//! [Algorithm].

use log::info;

use crate::algorithm::{Algorithm, ModSource, SaveMod, ALGORITHMS};
use crate::devices::Operator;
use crate::patch::{Patch, PatchError};
use crate::{AudioSample, ParamValue, Phase, MAX_PARAM, NUM_OPERATORS};

/// Six operators, the algorithm connecting them, and the feedback history.
#[derive(Clone)]
pub struct Voice {
    ops: [Operator; NUM_OPERATORS],
    algorithm: &'static Algorithm,
    feedback_amount: ParamValue,
    pitch: Phase,
    // newest first
    feedback: [i32; 2],
}

impl Default for Voice {
    fn default() -> Self {
        Self::new()
    }
}

impl Voice {
    /// A voice with default operators, using the first algorithm
    pub fn new() -> Self {
        Self {
            ops: core::array::from_fn(|_| Operator::new()),
            algorithm: &ALGORITHMS[0],
            feedback_amount: MAX_PARAM,
            pitch: 0,
            feedback: [0; 2],
        }
    }

    /// Apply a patch.  Envelopes keep running so a patch can be edited while
    /// a note plays, but every oscillator restarts from phase zero.
    pub fn load(&mut self, patch: &Patch) -> Result<(), PatchError> {
        let algorithm =
            Algorithm::get(patch.algorithm as usize).ok_or(PatchError::BadAlgorithm(patch.algorithm))?;
        self.algorithm = algorithm;
        self.feedback_amount = patch.feedback_amount.min(MAX_PARAM);
        for (op, params) in self.ops.iter_mut().zip(patch.op_params.iter()) {
            op.set_params(params);
            op.set_note_pitch(self.pitch);
            op.reset_wave();
        }
        info!("loaded patch \"{}\"", patch.name.as_str());
        Ok(())
    }

    /// Set the note pitch as a phase increment
    pub fn set_note_pitch(&mut self, pitch: Phase) {
        self.pitch = pitch;
        for op in self.ops.iter_mut() {
            op.set_note_pitch(pitch);
        }
    }

    /// The current note pitch
    pub fn note_pitch(&self) -> Phase {
        self.pitch
    }

    /// Start a note
    pub fn gate_start(&mut self) {
        for op in self.ops.iter_mut() {
            op.gate_start();
        }
    }

    /// Release a note
    pub fn gate_stop(&mut self) {
        for op in self.ops.iter_mut() {
            op.gate_stop();
        }
    }

    /// The operators, in algorithm slot order
    pub fn operators(&self) -> &[Operator; NUM_OPERATORS] {
        &self.ops
    }

    /// The algorithm in use
    pub fn algorithm(&self) -> &'static Algorithm {
        self.algorithm
    }

    fn feedback_mod(&self) -> AudioSample {
        let average = (self.feedback[0] + self.feedback[1]) / 2;
        // scaled down further than the amount alone would, to keep high
        // feedback settings from turning to noise
        ((self.feedback_amount as i32 * average) / (1024 * 20)) as AudioSample
    }

    /// Generate the next sample.  `timbre` is the amplitude modulation
    /// input shared by all operators.
    ///
    /// The output is the average of the carriers.  Carriers with an output
    /// level of zero are left out of the average, so muting one doesn't make
    /// the others quieter.
    #[inline]
    pub fn next(&mut self, timbre: AudioSample) -> AudioSample {
        let mut total: i32 = 0;
        let mut outputs: i32 = 0;
        let mut prev: AudioSample = 0;
        let mut saved: AudioSample = 0;
        for (i, slot) in self.algorithm.ops().iter().enumerate() {
            let freq_mod = match slot.mod_source {
                ModSource::None => 0,
                ModSource::Prev => prev,
                ModSource::Saved => saved,
                ModSource::Feedback => self.feedback_mod(),
            };
            let op = &mut self.ops[i];
            let out = op.next(freq_mod, timbre);
            if slot.is_output {
                if op.output_level() != 0 {
                    total += out as i32;
                    outputs += 1;
                }
            } else {
                prev = out;
                match slot.save_mod {
                    SaveMod::None => {}
                    SaveMod::Set => saved = out,
                    SaveMod::Add => saved = saved.wrapping_add(out),
                }
            }
            if slot.sets_feedback {
                self.feedback = [out as i32, self.feedback[0]];
            }
        }
        (total / outputs.max(1)) as AudioSample
    }
}
