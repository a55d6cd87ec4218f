use core::cell::UnsafeCell;
use core::marker::PhantomData;

use super::interrupts::{self, IrqState};

/// Number of independent locks.  The RP2040 has 32 hardware spinlocks but
/// `rp2040-hal` keeps the last one for its own critical sections.
pub const MAX_LOCK_SLOTS: usize = 31;

/// A type naming a lock.  Declare these with [crate::lock_tag].
pub trait LockTag {
    /// Which lock this tag uses, `0..MAX_LOCK_SLOTS`
    const SLOT: usize;
}

#[cfg(feature = "rp2040")]
mod backend {
    use rp2040_hal::sio::Spinlock;

    macro_rules! spinlocks {
        ($slot:expr, $op:ident, $($n:literal)*) => {
            match $slot {
                $($n => spinlocks!(@$op $n),)*
                _ => {}
            }
        };
        (@acquire $n:literal) => {
            // The guard would release the lock when dropped; the lock is
            // released by hand in release() instead.
            core::mem::forget(Spinlock::<$n>::claim())
        };
        (@release $n:literal) => {
            // Safety: only called from CriticalSection::drop, which holds the lock
            unsafe { Spinlock::<$n>::release() }
        };
    }

    #[inline]
    pub fn acquire(slot: usize) {
        spinlocks!(slot, acquire,
            0 1 2 3 4 5 6 7 8 9 10 11 12 13 14 15
            16 17 18 19 20 21 22 23 24 25 26 27 28 29 30);
    }

    #[inline]
    pub fn release(slot: usize) {
        spinlocks!(slot, release,
            0 1 2 3 4 5 6 7 8 9 10 11 12 13 14 15
            16 17 18 19 20 21 22 23 24 25 26 27 28 29 30);
    }
}

#[cfg(all(not(feature = "rp2040"), target_has_atomic = "8"))]
mod backend {
    use core::sync::atomic::{AtomicBool, Ordering};

    static LOCKS: [AtomicBool; super::MAX_LOCK_SLOTS] =
        [const { AtomicBool::new(false) }; super::MAX_LOCK_SLOTS];

    #[inline]
    pub fn acquire(slot: usize) {
        while LOCKS[slot]
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            core::hint::spin_loop();
        }
    }

    #[inline]
    pub fn release(slot: usize) {
        LOCKS[slot].store(false, Ordering::Release);
    }
}

#[cfg(all(not(feature = "rp2040"), not(target_has_atomic = "8")))]
compile_error!("this target has no compare-and-swap; enable a hardware lock feature such as `rp2040`");

/// A held lock, released when dropped.
///
/// Locks are not reentrant: entering a critical section for a tag that the
/// current context already holds deadlocks.  Critical sections must be short,
/// since the audio context may be spinning on the same lock.
#[must_use]
pub struct CriticalSection<T: LockTag> {
    irq: IrqState,
    // not Send: the lock has to be released where it was taken
    _tag: PhantomData<(T, *const ())>,
}

impl<T: LockTag> CriticalSection<T> {
    const VALID_SLOT: () = assert!(T::SLOT < MAX_LOCK_SLOTS);

    /// Wait for the lock and take it
    #[inline]
    pub fn enter() -> Self {
        #[allow(clippy::let_unit_value)]
        let () = Self::VALID_SLOT;
        // mask interrupts first so an interrupt handler on this core can't
        // spin on a lock we hold
        let irq = interrupts::disable();
        backend::acquire(T::SLOT);
        Self {
            irq,
            _tag: PhantomData,
        }
    }

    /// Run `f` with the lock held
    #[inline]
    pub fn with<R>(f: impl FnOnce() -> R) -> R {
        let _cs = Self::enter();
        f()
    }
}

impl<T: LockTag> Drop for CriticalSection<T> {
    #[inline]
    fn drop(&mut self) {
        backend::release(T::SLOT);
        interrupts::restore(self.irq);
    }
}

/// A value that can only be reached from inside a [CriticalSection]
pub struct CritSecCell<V, T: LockTag> {
    value: UnsafeCell<V>,
    _tag: PhantomData<T>,
}

// Safety: every access to the value holds the lock for T
unsafe impl<V: Send, T: LockTag> Sync for CritSecCell<V, T> {}

impl<V, T: LockTag> CritSecCell<V, T> {
    /// Constructor
    pub const fn new(value: V) -> Self {
        Self {
            value: UnsafeCell::new(value),
            _tag: PhantomData,
        }
    }

    /// Run `f` on the value with the lock held.  `f` must not try to take the
    /// same lock again.
    #[inline]
    pub fn with<R>(&self, f: impl FnOnce(&mut V) -> R) -> R {
        let _cs = CriticalSection::<T>::enter();
        // Safety: the lock is held, so this is the only reference
        f(unsafe { &mut *self.value.get() })
    }

    /// Direct access through a unique reference, which needs no lock
    pub fn get_mut(&mut self) -> &mut V {
        self.value.get_mut()
    }
}
