//! The top level of the engine.
//!
//! [Synth] is owned by the audio context and does all the sound generation.
//! [SynthControl] is shared with everything else (the control core, interrupt
//! handlers) and is the only way in: requests to load a patch or start and
//! stop a note are posted to its mailboxes and picked up by the audio loop
//! between samples, so the audio loop never waits on anything but its own
//! lock-free checks.

use core::sync::atomic::{AtomicI16, AtomicU32, AtomicU8, Ordering};

use log::debug;

use crate::error::{ErrorFlags, ErrorKind};
use crate::patch::{PatchBank, PatchChange, PatchError, PatchName, INITIAL_PATCH};
use crate::sync::{CritSecCell, LockedMailbox, LockoutHandshake, PatchBankLock};
use crate::voice::Voice;
use crate::{AudioSample, Phase, NUM_PATCHES};

/// A gate input edge
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GateEdge {
    /// Rising edge: start a note
    Start,
    /// Falling edge: release the note
    Stop,
}

/// The state shared between the audio context and everything else.
/// Normally a `static`.
pub struct SynthControl {
    load_patch: LockedMailbox<usize>,
    gate: LockedMailbox<GateEdge>,
    gate_started: LockedMailbox<()>,

    // Published without a lock.  Each value is valid on its own, and a
    // pitch and timbre from different updates is harmless.
    pitch: AtomicU32,
    timbre: AtomicI16,

    current_patch: AtomicU8,
    errors: ErrorFlags,
    bank: CritSecCell<PatchBank, PatchBankLock>,
    lockout: LockoutHandshake,
}

impl Default for SynthControl {
    fn default() -> Self {
        Self::new()
    }
}

impl SynthControl {
    /// Constructor, using the factory patch bank
    pub const fn new() -> Self {
        Self {
            load_patch: LockedMailbox::new(),
            gate: LockedMailbox::new(),
            gate_started: LockedMailbox::new(),
            pitch: AtomicU32::new(0),
            timbre: AtomicI16::new(0),
            current_patch: AtomicU8::new(INITIAL_PATCH as u8),
            errors: ErrorFlags::new(),
            bank: CritSecCell::new(PatchBank::factory()),
            lockout: LockoutHandshake::new(),
        }
    }
    /// Ask the audio context to switch to patch `index`
    pub fn load_patch(&self, index: usize) {
        self.load_patch.call(index);
    }
    /// Start or stop a note
    pub fn gate(&self, edge: GateEdge) {
        self.gate.call(edge);
    }
    /// Handle a gate pin interrupt.  Both edges in one interrupt start a note
    /// and stop it again.
    pub fn on_gate_irq(&self, rising: bool, falling: bool) {
        self.errors.assert_that(rising || falling, ErrorKind::WrongIrqEvent);
        if rising {
            self.gate(GateEdge::Start);
        }
        if falling {
            self.gate(GateEdge::Stop);
        }
    }
    /// Set the note pitch, as a phase increment
    pub fn set_pitch(&self, pitch: Phase) {
        self.pitch.store(pitch, Ordering::Relaxed);
    }
    /// The last published note pitch
    pub fn pitch(&self) -> Phase {
        self.pitch.load(Ordering::Relaxed)
    }
    /// Set the timbre (amplitude modulation) input
    pub fn set_timbre(&self, timbre: AudioSample) {
        self.timbre.store(timbre, Ordering::Relaxed);
    }
    /// The last published timbre input
    pub fn timbre(&self) -> AudioSample {
        self.timbre.load(Ordering::Relaxed)
    }
    /// The number of the patch playing, or about to play after a load
    pub fn current_patch(&self) -> usize {
        self.current_patch.load(Ordering::Relaxed) as usize
    }
    /// The name of the current patch
    pub fn current_patch_name(&self) -> PatchName {
        let index = self.current_patch();
        self.bank
            .with(|bank| bank.get(index).map(|patch| patch.name))
            .unwrap_or_default()
    }
    /// The sticky error flags
    pub fn errors(&self) -> &ErrorFlags {
        &self.errors
    }
    /// The patch bank
    pub fn bank(&self) -> &CritSecCell<PatchBank, PatchBankLock> {
        &self.bank
    }
    /// Posted each time a note starts, for the display
    pub fn gate_started(&self) -> &LockedMailbox<()> {
        &self.gate_started
    }
    /// Parks the audio context while flash is written
    pub fn lockout(&self) -> &LockoutHandshake {
        &self.lockout
    }
    /// Edit the patch bank.  An edit that would leave an invalid patch is
    /// rejected, [ErrorKind::BadPatchData] is set, and nothing changes.  If
    /// the playing patch was edited it's reloaded.
    pub fn apply_change(&self, change: &PatchChange) -> Result<(), PatchError> {
        let index = self.bank.with(|bank| bank.merge(change)).map_err(|e| {
            debug!("rejected patch change: {}", e);
            self.errors.set(ErrorKind::BadPatchData);
            e
        })?;
        if index == self.current_patch() {
            self.load_patch(index);
        }
        Ok(())
    }
}

/// The engine, owned by the audio context
pub struct Synth<'a> {
    control: &'a SynthControl,
    voice: Voice,
    patch_index: usize,
    patch_name: PatchName,
    pitch: Phase,
}

impl<'a> Synth<'a> {
    /// Constructor.  Loads the patch `control` says is current.
    pub fn new(control: &'a SynthControl) -> Self {
        let mut synth = Self {
            control,
            voice: Voice::new(),
            patch_index: 0,
            patch_name: PatchName::default(),
            pitch: 0,
        };
        synth.load(control.current_patch());
        synth
    }

    fn load(&mut self, index: usize) {
        let control = self.control;
        if !control.errors.assert_that(index < NUM_PATCHES, ErrorKind::BadArgument) {
            return;
        }
        let Some(patch) = control.bank.with(|bank| bank.get(index).copied()) else {
            return;
        };
        if self.voice.load(&patch).is_err() {
            control.errors.set(ErrorKind::BadPatchData);
            return;
        }
        self.patch_index = index;
        self.patch_name = patch.name;
        control.current_patch.store(index as u8, Ordering::Relaxed);
    }

    /// Handle any pending requests, then generate the next sample
    #[inline]
    pub fn next_sample(&mut self) -> AudioSample {
        let control = self.control;
        control.lockout.park_if_requested();
        control.load_patch.check_run(|index| self.load(index));
        let voice = &mut self.voice;
        control.gate.check_run(|edge| match edge {
            GateEdge::Start => {
                voice.gate_start();
                control.gate_started.notify();
            }
            GateEdge::Stop => voice.gate_stop(),
        });
        let pitch = control.pitch();
        if pitch != self.pitch {
            self.pitch = pitch;
            self.voice.set_note_pitch(pitch);
        }
        self.voice.next(control.timbre())
    }

    /// The number of the patch playing
    pub fn patch_index(&self) -> usize {
        self.patch_index
    }
    /// The name of the patch playing
    pub fn patch_name(&self) -> &PatchName {
        &self.patch_name
    }
    /// The voice
    pub fn voice(&self) -> &Voice {
        &self.voice
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::increment_for_hz;
    use crate::devices::EnvStage;
    use crate::patch::{OpSetting, PatchSetting};
    use std::sync::Arc;
    use std::thread;

    fn stages(synth: &Synth) -> Vec<EnvStage> {
        synth.voice().operators().iter().map(|op| op.envelope().stage()).collect()
    }

    #[test]
    fn starts_on_initial_patch() {
        let control = SynthControl::new();
        let synth = Synth::new(&control);
        assert_eq!(synth.patch_index(), INITIAL_PATCH);
        assert_eq!(control.current_patch(), INITIAL_PATCH);
        assert_eq!(*synth.patch_name(), control.current_patch_name());
        assert!(!control.errors().any_set());
    }

    #[test]
    fn load_requests_are_picked_up_between_samples() {
        let control = SynthControl::new();
        let mut synth = Synth::new(&control);
        control.load_patch(5);
        control.load_patch(0);
        assert_eq!(synth.patch_index(), INITIAL_PATCH);
        synth.next_sample();
        assert_eq!(synth.patch_index(), 0);
        assert_eq!(synth.patch_name().as_str(), "bells");
        assert_eq!(synth.voice().algorithm(), &crate::algorithm::ALGORITHMS[4]);

        control.load_patch(NUM_PATCHES);
        synth.next_sample();
        assert_eq!(synth.patch_index(), 0);
        assert!(control.errors().is_set(ErrorKind::BadArgument));
    }

    #[test]
    fn gate_edges() {
        let control = SynthControl::new();
        let mut synth = Synth::new(&control);
        assert!(stages(&synth).iter().all(|&s| s == EnvStage::Idle));
        control.on_gate_irq(true, false);
        synth.next_sample();
        assert!(stages(&synth).iter().all(|&s| s != EnvStage::Idle));
        assert!(control.gate_started().take().is_some());
        for _ in 0..2000 {
            synth.next_sample();
        }

        control.on_gate_irq(false, true);
        synth.next_sample();
        assert!(stages(&synth).iter().all(|&s| s == EnvStage::Release));
        assert!(!control.gate_started().is_pending());

        control.on_gate_irq(false, false);
        assert!(control.errors().is_set(ErrorKind::WrongIrqEvent));
    }

    #[test]
    fn pitch_and_timbre() {
        let control = SynthControl::new();
        let mut synth = Synth::new(&control);
        let pitch = increment_for_hz(261.63);
        control.set_pitch(pitch);
        control.set_timbre(-1234);
        assert_eq!(control.timbre(), -1234);
        synth.next_sample();
        assert_eq!(synth.voice().note_pitch(), pitch);
        let op = &synth.voice().operators()[0];
        assert!(op.is_fixed_freq() || op.oscillator().increment() != 0);
    }

    #[test]
    fn editing_the_playing_patch_reloads_it() {
        let control = SynthControl::new();
        let mut synth = Synth::new(&control);
        let change = PatchChange::Setting {
            index: INITIAL_PATCH,
            setting: PatchSetting::Algorithm,
            value: 7,
        };
        assert_eq!(control.apply_change(&change), Ok(()));
        synth.next_sample();
        assert_eq!(synth.voice().algorithm(), &crate::algorithm::ALGORITHMS[7]);

        // other patches don't disturb the voice
        let change = PatchChange::Setting {
            index: 9,
            setting: PatchSetting::Algorithm,
            value: 3,
        };
        assert_eq!(control.apply_change(&change), Ok(()));
        synth.next_sample();
        assert_eq!(synth.voice().algorithm(), &crate::algorithm::ALGORITHMS[7]);
    }

    #[test]
    fn bad_edits_are_flagged() {
        let control = SynthControl::new();
        let change = PatchChange::OpSetting {
            index: INITIAL_PATCH,
            op: 2,
            setting: OpSetting::OutputLevel,
            value: 5000,
        };
        assert_eq!(
            control.apply_change(&change),
            Err(PatchError::ParamOutOfRange(5000))
        );
        assert!(control.errors().is_set(ErrorKind::BadPatchData));
        assert!(!control.load_patch.is_pending());
    }

    #[test]
    fn audio_and_control_threads() {
        let control = Arc::new(SynthControl::new());
        let audio = {
            let control = Arc::clone(&control);
            thread::spawn(move || {
                let mut synth = Synth::new(&control);
                let mut loud = 0;
                let mut settled = 0;
                while settled < 5000 {
                    if synth.next_sample() != 0 {
                        loud += 1;
                    }
                    if synth.patch_index() == 7 {
                        settled += 1;
                    }
                }
                (synth.patch_index(), loud)
            })
        };
        control.set_pitch(increment_for_hz(440.0));
        control.gate(GateEdge::Start);
        for index in [3, 1, 7] {
            control.load_patch(index);
            thread::yield_now();
        }
        let (index, loud) = audio.join().expect("audio thread panicked");
        assert_eq!(index, 7);
        assert!(loud > 0);
        assert!(!control.errors().any_set());
    }
}
