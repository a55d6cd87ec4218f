//! The 32 modulation routings ("algorithms") of the DX7, expressed as a
//! list of per-operator instructions that [crate::voice::Voice] follows in
//! order, once per sample.
//!
//! Each slot says where its operator's frequency modulation comes from, and
//! what happens to its output: carriers are summed into the audio output and
//! modulators become the "previous" modulation value for the next slot.  A
//! modulator can also set or add to a saved modulation value, which is how
//! several modulators feed one carrier.  Exactly one slot feeds its own output
//! back, through a two sample history, to the one slot that uses feedback.
//!
//! Algorithm numbers here are zero based, so index 0 is DX7 algorithm 1.

use thiserror::Error;

use crate::{NUM_ALGORITHMS, NUM_OPERATORS};

/// Where an operator's frequency modulation comes from
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModSource {
    /// No modulation
    None,
    /// The output of the most recent modulator
    Prev,
    /// The saved modulation value
    Saved,
    /// The feedback history
    Feedback,
}

/// What a modulator does to the saved modulation value
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SaveMod {
    /// Nothing
    None,
    /// Overwrite it with this operator's output
    Set,
    /// Add this operator's output to it
    Add,
}

/// One slot of an [Algorithm]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AlgoOp {
    /// Carriers are audible, modulators aren't
    pub is_output: bool,
    /// Where this operator's frequency modulation comes from
    pub mod_source: ModSource,
    /// What this operator does to the saved modulation value
    pub save_mod: SaveMod,
    /// Record this operator's output in the feedback history
    pub sets_feedback: bool,
}

/// Constructor for a carrier slot
pub const fn carrier(mod_source: ModSource) -> AlgoOp {
    AlgoOp {
        is_output: true,
        mod_source,
        save_mod: SaveMod::None,
        sets_feedback: false,
    }
}

/// Constructor for a modulator slot
pub const fn modulator(mod_source: ModSource) -> AlgoOp {
    AlgoOp {
        is_output: false,
        mod_source,
        save_mod: SaveMod::None,
        sets_feedback: false,
    }
}

impl AlgoOp {
    /// This slot overwrites the saved modulation value
    pub const fn set_saved(self) -> Self {
        Self {
            save_mod: SaveMod::Set,
            ..self
        }
    }
    /// This slot adds to the saved modulation value
    pub const fn add_saved(self) -> Self {
        Self {
            save_mod: SaveMod::Add,
            ..self
        }
    }
    /// This slot is the source of feedback
    pub const fn feedback(self) -> Self {
        Self {
            sets_feedback: true,
            ..self
        }
    }
}

/// Reasons an [Algorithm] can be malformed
#[derive(Error, Clone, Copy, Debug, PartialEq, Eq)]
pub enum AlgorithmError {
    /// The first slot reads a modulation value nothing has written yet
    #[error("first operator uses modulation that hasn't been produced")]
    FirstOpReadsUnset,
    /// The last slot has to be audible
    #[error("last operator is not a carrier")]
    LastOpNotCarrier,
    /// There must be exactly one feedback source
    #[error("{0} operators set feedback, expected 1")]
    FeedbackSources(usize),
    /// There must be exactly one feedback user
    #[error("{0} operators use feedback, expected 1")]
    FeedbackUsers(usize),
    /// Only modulators may touch the saved modulation value
    #[error("carrier in slot {0} saves modulation")]
    CarrierSaves(usize),
    /// The saved modulation value is read or added to before being set
    #[error("slot {0} uses saved modulation before it is set")]
    SavedBeforeSet(usize),
}

/// A modulation routing: one [AlgoOp] per operator, evaluated in order
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Algorithm {
    ops: [AlgoOp; NUM_OPERATORS],
    num_carriers: usize,
}

impl Algorithm {
    /// Constructor
    pub const fn new(ops: [AlgoOp; NUM_OPERATORS]) -> Self {
        let mut num_carriers = 0;
        let mut i = 0;
        while i < NUM_OPERATORS {
            if ops[i].is_output {
                num_carriers += 1;
            }
            i += 1;
        }
        Self { ops, num_carriers }
    }
    /// The slots, in evaluation order
    pub const fn ops(&self) -> &[AlgoOp; NUM_OPERATORS] {
        &self.ops
    }
    /// Number of carrier slots, muted or not
    pub const fn num_carriers(&self) -> usize {
        self.num_carriers
    }
    /// Look up a built-in algorithm by (zero based) number
    pub fn get(index: usize) -> Option<&'static Algorithm> {
        ALGORITHMS.get(index)
    }
    /// Check that evaluating this algorithm never reads a modulation value
    /// before something writes it, and that feedback is wired up exactly
    /// once.
    pub const fn validate(&self) -> Result<(), AlgorithmError> {
        let ops = &self.ops;
        if matches!(ops[0].mod_source, ModSource::Prev | ModSource::Saved) {
            return Err(AlgorithmError::FirstOpReadsUnset);
        }
        if !ops[NUM_OPERATORS - 1].is_output {
            return Err(AlgorithmError::LastOpNotCarrier);
        }
        let mut sources = 0;
        let mut users = 0;
        let mut i = 0;
        while i < NUM_OPERATORS {
            if ops[i].sets_feedback {
                sources += 1;
            }
            if matches!(ops[i].mod_source, ModSource::Feedback) {
                users += 1;
            }
            i += 1;
        }
        if sources != 1 {
            return Err(AlgorithmError::FeedbackSources(sources));
        }
        if users != 1 {
            return Err(AlgorithmError::FeedbackUsers(users));
        }
        let mut saved_set = false;
        let mut i = 0;
        while i < NUM_OPERATORS {
            let op = &ops[i];
            if op.is_output && !matches!(op.save_mod, SaveMod::None) {
                return Err(AlgorithmError::CarrierSaves(i));
            }
            let reads = matches!(op.mod_source, ModSource::Saved);
            let adds = matches!(op.save_mod, SaveMod::Add);
            if (reads || adds) && !saved_set {
                return Err(AlgorithmError::SavedBeforeSet(i));
            }
            if matches!(op.save_mod, SaveMod::Set) {
                saved_set = true;
            }
            i += 1;
        }
        Ok(())
    }
}

/// The built-in algorithms, in DX7 order
pub static ALGORITHMS: [Algorithm; NUM_ALGORITHMS] = TABLE;

const TABLE: [Algorithm; NUM_ALGORITHMS] = {
    use ModSource::*;
    [
        // 1
        Algorithm::new([
            modulator(Feedback).feedback(),
            modulator(Prev),
            modulator(Prev),
            carrier(Prev),
            modulator(None),
            carrier(Prev),
        ]),
        // 2
        Algorithm::new([
            modulator(None),
            modulator(Prev),
            modulator(Prev),
            carrier(Prev),
            modulator(Feedback).feedback(),
            carrier(Prev),
        ]),
        // 3
        Algorithm::new([
            modulator(Feedback).feedback(),
            modulator(Prev),
            carrier(Prev),
            modulator(None),
            modulator(Prev),
            carrier(Prev),
        ]),
        // 4
        Algorithm::new([
            modulator(Feedback),
            modulator(Prev),
            carrier(Prev).feedback(),
            modulator(None),
            modulator(Prev),
            carrier(Prev),
        ]),
        // 5
        Algorithm::new([
            modulator(Feedback).feedback(),
            carrier(Prev),
            modulator(None),
            carrier(Prev),
            modulator(None),
            carrier(Prev),
        ]),
        // 6
        Algorithm::new([
            modulator(Feedback),
            carrier(Prev).feedback(),
            modulator(None),
            carrier(Prev),
            modulator(None),
            carrier(Prev),
        ]),
        // 7
        Algorithm::new([
            modulator(Feedback).feedback(),
            modulator(Prev).set_saved(),
            modulator(None).add_saved(),
            carrier(Saved),
            modulator(None),
            carrier(Prev),
        ]),
        // 8
        Algorithm::new([
            modulator(None),
            modulator(Prev).set_saved(),
            modulator(Feedback).add_saved().feedback(),
            carrier(Saved),
            modulator(None),
            carrier(Prev),
        ]),
        // 9
        Algorithm::new([
            modulator(None),
            modulator(Prev).set_saved(),
            modulator(None).add_saved(),
            carrier(Saved),
            modulator(Feedback).feedback(),
            carrier(Prev),
        ]),
        // 10
        Algorithm::new([
            modulator(None).set_saved(),
            modulator(None).add_saved(),
            carrier(Saved),
            modulator(Feedback).feedback(),
            modulator(Prev),
            carrier(Prev),
        ]),
        // 11
        Algorithm::new([
            modulator(Feedback).set_saved().feedback(),
            modulator(None).add_saved(),
            carrier(Saved),
            modulator(None),
            modulator(Prev),
            carrier(Prev),
        ]),
        // 12
        Algorithm::new([
            modulator(None).set_saved(),
            modulator(None).add_saved(),
            modulator(None).add_saved(),
            carrier(Saved),
            modulator(Feedback).feedback(),
            carrier(Prev),
        ]),
        // 13
        Algorithm::new([
            modulator(Feedback).set_saved().feedback(),
            modulator(None).add_saved(),
            modulator(None).add_saved(),
            carrier(Saved),
            modulator(None),
            carrier(Prev),
        ]),
        // 14
        Algorithm::new([
            modulator(Feedback).set_saved().feedback(),
            modulator(None).add_saved(),
            modulator(Saved),
            carrier(Prev),
            modulator(None),
            carrier(Prev),
        ]),
        // 15
        Algorithm::new([
            modulator(None).set_saved(),
            modulator(None).add_saved(),
            modulator(Saved),
            carrier(Prev),
            modulator(Feedback).feedback(),
            carrier(Prev),
        ]),
        // 16
        Algorithm::new([
            modulator(Feedback).feedback(),
            modulator(Prev).set_saved(),
            modulator(None),
            modulator(Prev).add_saved(),
            modulator(None).add_saved(),
            carrier(Saved),
        ]),
        // 17
        Algorithm::new([
            modulator(None),
            modulator(Prev).set_saved(),
            modulator(None),
            modulator(Prev).add_saved(),
            modulator(Feedback).add_saved().feedback(),
            carrier(Saved),
        ]),
        // 18
        Algorithm::new([
            modulator(None),
            modulator(Prev),
            modulator(Prev).set_saved(),
            modulator(Feedback).add_saved().feedback(),
            modulator(None).add_saved(),
            carrier(Saved),
        ]),
        // 19
        Algorithm::new([
            modulator(Feedback).set_saved().feedback(),
            carrier(Saved),
            carrier(Saved),
            modulator(None),
            modulator(Prev),
            carrier(Prev),
        ]),
        // 20
        Algorithm::new([
            modulator(None).set_saved(),
            modulator(None).add_saved(),
            carrier(Saved),
            modulator(Feedback).set_saved().feedback(),
            carrier(Saved),
            carrier(Saved),
        ]),
        // 21
        Algorithm::new([
            modulator(None).set_saved(),
            carrier(Saved),
            carrier(Saved),
            modulator(Feedback).set_saved().feedback(),
            carrier(Saved),
            carrier(Saved),
        ]),
        // 22
        Algorithm::new([
            modulator(Feedback).set_saved().feedback(),
            carrier(Saved),
            carrier(Saved),
            carrier(Saved),
            modulator(None),
            carrier(Prev),
        ]),
        // 23
        Algorithm::new([
            modulator(Feedback).set_saved().feedback(),
            carrier(Saved),
            carrier(Saved),
            modulator(None),
            carrier(Prev),
            carrier(None),
        ]),
        // 24
        Algorithm::new([
            modulator(Feedback).set_saved().feedback(),
            carrier(Saved),
            carrier(Saved),
            carrier(Saved),
            carrier(None),
            carrier(None),
        ]),
        // 25
        Algorithm::new([
            modulator(Feedback).set_saved().feedback(),
            carrier(Saved),
            carrier(Saved),
            carrier(None),
            carrier(None),
            carrier(None),
        ]),
        // 26
        Algorithm::new([
            modulator(Feedback).set_saved().feedback(),
            modulator(None).add_saved(),
            carrier(Saved),
            modulator(None),
            carrier(Prev),
            carrier(None),
        ]),
        // 27
        Algorithm::new([
            modulator(None).set_saved(),
            modulator(None).add_saved(),
            carrier(Saved),
            modulator(Feedback).feedback(),
            carrier(Prev),
            carrier(None),
        ]),
        // 28
        Algorithm::new([
            carrier(None),
            modulator(Feedback).feedback(),
            modulator(Prev),
            carrier(Prev),
            modulator(None),
            carrier(Prev),
        ]),
        // 29
        Algorithm::new([
            modulator(Feedback).feedback(),
            carrier(Prev),
            modulator(None),
            carrier(Prev),
            carrier(None),
            carrier(None),
        ]),
        // 30
        Algorithm::new([
            carrier(None),
            modulator(Feedback).feedback(),
            modulator(Prev),
            carrier(Prev),
            carrier(None),
            carrier(None),
        ]),
        // 31
        Algorithm::new([
            modulator(Feedback).feedback(),
            carrier(Prev),
            carrier(None),
            carrier(None),
            carrier(None),
            carrier(None),
        ]),
        // 32
        Algorithm::new([
            carrier(Feedback).feedback(),
            carrier(None),
            carrier(None),
            carrier(None),
            carrier(None),
            carrier(None),
        ]),
    ]
};

// Every built-in algorithm must validate
const _: () = {
    let mut i = 0;
    while i < NUM_ALGORITHMS {
        assert!(TABLE[i].validate().is_ok());
        i += 1;
    }
};

#[cfg(test)]
mod tests {
    use super::*;

    fn dx7_algorithm_1() -> [AlgoOp; NUM_OPERATORS] {
        *ALGORITHMS[0].ops()
    }

    #[test]
    fn builtin_algorithms_are_valid() {
        for (i, algo) in ALGORITHMS.iter().enumerate() {
            assert_eq!(algo.validate(), Ok(()), "algorithm {}", i + 1);
            assert!(algo.num_carriers() >= 1);
        }
        assert_eq!(ALGORITHMS[0].num_carriers(), 2);
        assert_eq!(ALGORITHMS[31].num_carriers(), 6);
        assert!(Algorithm::get(NUM_ALGORITHMS).is_none());
    }

    #[test]
    fn first_algorithm_layout() {
        let ops = dx7_algorithm_1();
        assert_eq!(ops[0], modulator(ModSource::Feedback).feedback());
        assert_eq!(ops[3], carrier(ModSource::Prev));
        assert_eq!(ops[4], modulator(ModSource::None));
        assert_eq!(ops[5], carrier(ModSource::Prev));
    }

    #[test]
    fn two_feedback_sources_rejected() {
        let mut ops = dx7_algorithm_1();
        ops[2] = ops[2].feedback();
        assert_eq!(
            Algorithm::new(ops).validate(),
            Err(AlgorithmError::FeedbackSources(2))
        );
        ops[2].sets_feedback = false;
        ops[0].sets_feedback = false;
        assert_eq!(
            Algorithm::new(ops).validate(),
            Err(AlgorithmError::FeedbackSources(0))
        );
    }

    #[test]
    fn first_slot_reading_prev_rejected() {
        let mut ops = dx7_algorithm_1();
        ops[0].mod_source = ModSource::Prev;
        assert_eq!(
            Algorithm::new(ops).validate(),
            Err(AlgorithmError::FirstOpReadsUnset)
        );
        ops[0].mod_source = ModSource::Saved;
        assert_eq!(
            Algorithm::new(ops).validate(),
            Err(AlgorithmError::FirstOpReadsUnset)
        );
    }

    #[test]
    fn other_rules() {
        let mut ops = dx7_algorithm_1();
        ops[5].is_output = false;
        assert_eq!(
            Algorithm::new(ops).validate(),
            Err(AlgorithmError::LastOpNotCarrier)
        );

        let mut ops = dx7_algorithm_1();
        ops[4].mod_source = ModSource::Feedback;
        assert_eq!(
            Algorithm::new(ops).validate(),
            Err(AlgorithmError::FeedbackUsers(2))
        );

        let mut ops = dx7_algorithm_1();
        ops[3] = ops[3].set_saved();
        assert_eq!(
            Algorithm::new(ops).validate(),
            Err(AlgorithmError::CarrierSaves(3))
        );

        let mut ops = dx7_algorithm_1();
        ops[1] = ops[1].add_saved();
        assert_eq!(
            Algorithm::new(ops).validate(),
            Err(AlgorithmError::SavedBeforeSet(1))
        );
        ops[1] = modulator(ModSource::Prev).set_saved();
        assert_eq!(Algorithm::new(ops).validate(), Ok(()));
        ops[5].mod_source = ModSource::Saved;
        assert_eq!(Algorithm::new(ops).validate(), Ok(()));
    }

    #[test]
    fn error_messages() {
        assert_eq!(
            AlgorithmError::SavedBeforeSet(3).to_string(),
            "slot 3 uses saved modulation before it is set"
        );
    }
}
