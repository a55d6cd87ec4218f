//! Sticky error flags.
//!
//! Most of the code that can go wrong runs in an interrupt handler or the
//! audio loop, where there's nothing useful to do about an error except keep
//! going.  Those places set a flag in [ErrorFlags] instead, and a slow task
//! ([crate::tasks::ReportErrors]) reports and clears the flags later.

use core::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;

/// Kinds of error that can be flagged
#[derive(Error, Clone, Copy, Debug, PartialEq, Eq)]
#[repr(usize)]
pub enum ErrorKind {
    /// The output timer fired before the next sample was ready
    #[error("audio sample not ready")]
    DataNotReady,
    /// An interrupt arrived from an unexpected pin
    #[error("interrupt from unexpected GPIO")]
    WrongIrqGpio,
    /// An interrupt arrived for an unexpected event
    #[error("unexpected interrupt event")]
    WrongIrqEvent,
    /// Code ran on the wrong core
    #[error("running on the wrong core")]
    WrongCore,
    /// The task scheduler fell behind
    #[error("watchdog timeout")]
    Watchdog,
    /// A patch or patch edit was rejected
    #[error("bad patch data")]
    BadPatchData,
    /// A control voltage couldn't be read
    #[error("ADC read failed")]
    AdcRead,
    /// The other core didn't respond to a lockout
    #[error("core lockout failed")]
    Lockout,
    /// Data read from flash was bad
    #[error("bad flash data")]
    BadFlashData,
    /// A function got an argument it can't handle
    #[error("bad argument")]
    BadArgument,
}

impl ErrorKind {
    /// Number of error kinds
    pub const COUNT: usize = 10;
    /// Every error kind, in flag order
    pub const ALL: [ErrorKind; Self::COUNT] = [
        Self::DataNotReady,
        Self::WrongIrqGpio,
        Self::WrongIrqEvent,
        Self::WrongCore,
        Self::Watchdog,
        Self::BadPatchData,
        Self::AdcRead,
        Self::Lockout,
        Self::BadFlashData,
        Self::BadArgument,
    ];
}

/// One sticky flag per [ErrorKind].  Flags stay set until cleared.
///
/// Only atomic loads and stores are used, so this works on cores without
/// compare-and-swap and is safe to use from interrupt handlers on either
/// core.
pub struct ErrorFlags {
    flags: [AtomicBool; ErrorKind::COUNT],
}

impl Default for ErrorFlags {
    fn default() -> Self {
        Self::new()
    }
}

impl ErrorFlags {
    /// All flags clear
    pub const fn new() -> Self {
        Self {
            flags: [const { AtomicBool::new(false) }; ErrorKind::COUNT],
        }
    }
    /// Set a flag
    #[inline]
    pub fn set(&self, kind: ErrorKind) {
        self.flags[kind as usize].store(true, Ordering::Relaxed);
    }
    /// Check a flag
    pub fn is_set(&self, kind: ErrorKind) -> bool {
        self.flags[kind as usize].load(Ordering::Relaxed)
    }
    /// Clear a flag
    pub fn clear(&self, kind: ErrorKind) {
        self.flags[kind as usize].store(false, Ordering::Relaxed);
    }
    /// Set `kind` unless `condition` holds.  Returns `condition`.
    #[inline]
    pub fn assert_that(&self, condition: bool, kind: ErrorKind) -> bool {
        if !condition {
            self.set(kind);
        }
        condition
    }
    /// True if any flag is set
    pub fn any_set(&self) -> bool {
        self.flags.iter().any(|f| f.load(Ordering::Relaxed))
    }
    /// Clear every flag
    pub fn clear_all(&self) {
        for flag in &self.flags {
            flag.store(false, Ordering::Relaxed);
        }
    }
    /// The kinds whose flags are set
    pub fn iter_set(&self) -> impl Iterator<Item = ErrorKind> + '_ {
        ErrorKind::ALL.into_iter().filter(|&kind| self.is_set(kind))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_match_flag_order() {
        for (i, kind) in ErrorKind::ALL.iter().enumerate() {
            assert_eq!(*kind as usize, i);
        }
        assert_eq!(ErrorKind::BadArgument as usize + 1, ErrorKind::COUNT);
    }

    #[test]
    fn flags_are_sticky() {
        let errors = ErrorFlags::new();
        assert!(!errors.any_set());
        errors.set(ErrorKind::Lockout);
        errors.set(ErrorKind::Lockout);
        errors.set(ErrorKind::DataNotReady);
        assert!(errors.is_set(ErrorKind::Lockout));
        assert!(!errors.is_set(ErrorKind::Watchdog));
        let set: Vec<_> = errors.iter_set().collect();
        assert_eq!(set, [ErrorKind::DataNotReady, ErrorKind::Lockout]);
        errors.clear(ErrorKind::DataNotReady);
        assert_eq!(errors.iter_set().count(), 1);
        errors.clear_all();
        assert!(!errors.any_set());
    }

    #[test]
    fn assertions() {
        let errors = ErrorFlags::new();
        assert!(errors.assert_that(1 + 1 == 2, ErrorKind::BadArgument));
        assert!(!errors.any_set());
        assert!(!errors.assert_that(false, ErrorKind::WrongCore));
        assert!(errors.is_set(ErrorKind::WrongCore));
    }

    #[test]
    fn display() {
        assert_eq!(ErrorKind::Watchdog.to_string(), "watchdog timeout");
        assert_eq!(ErrorKind::AdcRead.to_string(), "ADC read failed");
    }
}
