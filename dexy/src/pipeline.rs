//! The hand-off from the audio loop to the output timer interrupt.
//!
//! The slot holds exactly one sample.  The audio loop fills it and waits for
//! the interrupt to empty it; the interrupt never waits.  If the interrupt
//! finds the slot empty the audio loop fell behind, which is flagged as
//! [ErrorKind::DataNotReady], and the output device keeps its last value.

use core::sync::atomic::{AtomicBool, AtomicU16, Ordering};

use crate::error::{ErrorFlags, ErrorKind};

/// Something that can output a sample, such as a DAC or a PWM channel
pub trait AudioOutput {
    /// Output `value`, where `0x8000` is silence
    fn set_output(&mut self, value: u16);
}

/// A single-sample slot between the audio loop and the output interrupt
pub struct AudioPipeline {
    sample: AtomicU16,
    ready: AtomicBool,
}

impl Default for AudioPipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioPipeline {
    /// An empty slot
    pub const fn new() -> Self {
        Self {
            sample: AtomicU16::new(0x8000),
            ready: AtomicBool::new(false),
        }
    }

    /// Call from the sample rate timer interrupt
    #[inline]
    pub fn on_timer(&self, output: &mut impl AudioOutput, errors: &ErrorFlags) {
        if !self.ready.load(Ordering::Acquire) {
            errors.set(ErrorKind::DataNotReady);
            return;
        }
        let sample = self.sample.load(Ordering::Relaxed);
        self.ready.store(false, Ordering::Release);
        output.set_output(sample);
    }

    /// Hand over the next sample, first waiting for the previous one to be
    /// output
    #[inline]
    pub fn publish(&self, sample: u16) {
        while self.ready.load(Ordering::Acquire) {
            core::hint::spin_loop();
        }
        self.sample.store(sample, Ordering::Relaxed);
        self.ready.store(true, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[derive(Default)]
    struct Recorder(Vec<u16>);

    impl AudioOutput for Recorder {
        fn set_output(&mut self, value: u16) {
            self.0.push(value);
        }
    }

    #[test]
    fn empty_slot_is_an_error() {
        let pipeline = AudioPipeline::new();
        let errors = ErrorFlags::new();
        let mut out = Recorder::default();
        pipeline.on_timer(&mut out, &errors);
        assert!(out.0.is_empty());
        assert!(errors.is_set(ErrorKind::DataNotReady));
    }

    #[test]
    fn one_sample_at_a_time() {
        let pipeline = AudioPipeline::new();
        let errors = ErrorFlags::new();
        let mut out = Recorder::default();
        pipeline.publish(1);
        pipeline.on_timer(&mut out, &errors);
        pipeline.publish(3);
        pipeline.on_timer(&mut out, &errors);
        assert_eq!(out.0, [1, 3]);
        assert!(!errors.any_set());
        // each sample goes out once
        pipeline.on_timer(&mut out, &errors);
        assert_eq!(out.0, [1, 3]);
        assert!(errors.is_set(ErrorKind::DataNotReady));
    }

    #[test]
    fn producer_and_interrupt_threads() {
        const N: u16 = 5000;
        let pipeline = Arc::new(AudioPipeline::new());
        let producer = {
            let pipeline = Arc::clone(&pipeline);
            thread::spawn(move || {
                for n in 0..N {
                    pipeline.publish(n);
                }
            })
        };
        let errors = ErrorFlags::new();
        let mut out = Recorder::default();
        while out.0.len() < N as usize {
            pipeline.on_timer(&mut out, &errors);
        }
        producer.join().expect("producer panicked");
        // nothing dropped, nothing repeated
        assert!(out.0.iter().copied().eq(0..N));
    }
}
