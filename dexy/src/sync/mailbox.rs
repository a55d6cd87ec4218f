use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicBool, Ordering};

use super::{CriticalSection, DeferLock};

/// A single slot for a deferred call.
///
/// [Mailbox::call] leaves an argument for the consumer, replacing any
/// argument that hasn't been picked up yet: requests coalesce, they never
/// queue.  The consumer polls with [Mailbox::check_run] and gets the newest
/// argument at most once.
///
/// With `LOCKED` set, the slot is guarded by [DeferLock] and the mailbox is
/// `Sync`, so the producer and the consumer may run on different cores (or
/// in an interrupt handler).  Unlocked mailboxes are for a producer and
/// consumer in the same context and aren't `Sync`.
///
/// Polling an empty mailbox is a single atomic load, so the audio loop can
/// check every sample without touching the lock.
pub struct Mailbox<T, const LOCKED: bool> {
    pending: AtomicBool,
    slot: UnsafeCell<Option<T>>,
}

/// A mailbox whose producer and consumer are in different contexts
pub type LockedMailbox<T> = Mailbox<T, true>;
/// A mailbox whose producer and consumer are in the same context
pub type LocalMailbox<T> = Mailbox<T, false>;

// Safety: the slot is only touched inside a DeferLock critical section
unsafe impl<T: Send> Sync for Mailbox<T, true> {}

impl<T, const LOCKED: bool> Default for Mailbox<T, LOCKED> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, const LOCKED: bool> Mailbox<T, LOCKED> {
    /// An empty mailbox
    pub const fn new() -> Self {
        Self {
            pending: AtomicBool::new(false),
            slot: UnsafeCell::new(None),
        }
    }

    // Both the slot and the pending flag are only written in here
    #[inline]
    fn with_slot<R>(&self, f: impl FnOnce(&mut Option<T>, &AtomicBool) -> R) -> R {
        let _cs = LOCKED.then(CriticalSection::<DeferLock>::enter);
        // Safety: either the lock is held, or the mailbox isn't Sync and no
        // reference to the slot outlives this call
        f(unsafe { &mut *self.slot.get() }, &self.pending)
    }

    /// Post a request, replacing any request still pending
    pub fn call(&self, arg: T) {
        self.with_slot(|slot, pending| {
            *slot = Some(arg);
            pending.store(true, Ordering::Release);
        });
    }

    /// Take the pending argument, if there is one
    #[inline]
    pub fn take(&self) -> Option<T> {
        if !self.pending.load(Ordering::Acquire) {
            return None;
        }
        self.with_slot(|slot, pending| {
            pending.store(false, Ordering::Release);
            slot.take()
        })
    }

    /// If a request is pending, clear it and run `f` with its argument.
    /// Returns true if `f` ran.
    ///
    /// `f` runs after the lock is released, so it may post to this mailbox
    /// (or any other) itself.
    #[inline]
    pub fn check_run(&self, f: impl FnOnce(T)) -> bool {
        match self.take() {
            Some(arg) => {
                f(arg);
                true
            }
            None => false,
        }
    }

    /// True if a request is waiting
    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }

    /// Drop any pending request without running it
    pub fn clear_pending(&self) {
        self.take();
    }
}

impl<const LOCKED: bool> Mailbox<(), LOCKED> {
    /// Post an argument-less request
    pub fn notify(&self) {
        self.call(());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn calls_coalesce() {
        let mailbox = LockedMailbox::<u32>::new();
        let mut seen = Vec::new();
        assert!(!mailbox.check_run(|arg| seen.push(arg)));
        mailbox.call(1);
        mailbox.call(2);
        assert!(mailbox.is_pending());
        assert!(mailbox.check_run(|arg| seen.push(arg)));
        assert!(!mailbox.check_run(|arg| seen.push(arg)));
        assert_eq!(seen, [2]);
    }

    #[test]
    fn local_mailbox() {
        let mailbox = LocalMailbox::<()>::new();
        mailbox.notify();
        mailbox.clear_pending();
        assert!(!mailbox.is_pending());
        assert!(!mailbox.check_run(|()| {}));
        mailbox.notify();
        let mut count = 0;
        assert!(mailbox.check_run(|()| count += 1));
        assert_eq!(count, 1);
    }

    #[test]
    fn target_may_repost() {
        let mailbox = LockedMailbox::<u8>::new();
        mailbox.call(5);
        assert!(mailbox.check_run(|n| mailbox.call(n + 1)));
        assert_eq!(mailbox.take(), Some(6));
        assert_eq!(mailbox.take(), None);
    }

    #[test]
    fn cross_thread_latest_wins() {
        const LAST: u32 = 20_000;
        let mailbox = Arc::new(LockedMailbox::<u32>::new());
        let received = Arc::new(AtomicU32::new(0));
        let producer = {
            let mailbox = Arc::clone(&mailbox);
            thread::spawn(move || {
                for n in 1..=LAST {
                    mailbox.call(n);
                }
            })
        };
        let consumer = {
            let mailbox = Arc::clone(&mailbox);
            let received = Arc::clone(&received);
            thread::spawn(move || {
                let mut last = 0;
                while last != LAST {
                    mailbox.check_run(|n| {
                        // never older than something already seen
                        assert!(n > last);
                        last = n;
                    });
                }
                received.store(last, Ordering::Relaxed);
            })
        };
        producer.join().expect("producer panicked");
        consumer.join().expect("consumer panicked");
        assert_eq!(received.load(Ordering::Relaxed), LAST);
        assert!(!mailbox.is_pending());
    }
}
