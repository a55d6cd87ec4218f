//! The primitives that let the audio context and the control context share
//! data without ever blocking each other for long.
//!
//!  - [CriticalSection] is a short busy-wait lock, selected by a tag type so
//!    that unrelated data doesn't share a lock.
//!  - [CritSecCell] guards a value with a [CriticalSection].
//!  - [Mailbox] is a single slot, coalescing "please do this later" request.
//!  - [CoreLockout] stops the other core while flash is written.
//!
//! With the `rp2040` feature the locks are the RP2040's hardware spinlocks
//! and taking one also masks interrupts on the current core.  Otherwise
//! they're atomic flags, which is what the host tests use.

mod critsec;
mod lockout;
mod mailbox;

pub use critsec::{CritSecCell, CriticalSection, LockTag, MAX_LOCK_SLOTS};
pub use lockout::{
    CoreLockout, HandshakePartner, LockoutHandshake, PartnerCore, LOCKOUT_TIMEOUT_US,
};
pub use mailbox::{LocalMailbox, LockedMailbox, Mailbox};

/// Declare a [LockTag] type using the given lock slot.  Tags that share a
/// slot share a lock.
///
/// ```
/// dexy::lock_tag!(
///     /// Protects the display buffer
///     pub DisplayLock, 5
/// );
/// let _cs = dexy::sync::CriticalSection::<DisplayLock>::enter();
/// ```
#[macro_export]
macro_rules! lock_tag {
    ($(#[$attr:meta])* $vis:vis $name:ident, $slot:expr) => {
        $(#[$attr])*
        $vis enum $name {}
        impl $crate::sync::LockTag for $name {
            const SLOT: usize = $slot;
        }
    };
}

lock_tag!(
    /// Guards every [LockedMailbox]
    pub DeferLock, 0
);
lock_tag!(
    /// Guards the patch bank
    pub PatchBankLock, 1
);

/// Interrupt masking on the current core
pub mod interrupts {
    /// Whether interrupts were enabled before [disable]
    #[derive(Clone, Copy, Debug)]
    #[must_use]
    pub struct IrqState(bool);

    /// Mask interrupts, returning the previous state for [restore]
    #[cfg(feature = "rp2040")]
    #[inline]
    pub fn disable() -> IrqState {
        let enabled = cortex_m::register::primask::read().is_inactive();
        cortex_m::interrupt::disable();
        IrqState(enabled)
    }

    /// Unmask interrupts if they were enabled before the matching [disable]
    #[cfg(feature = "rp2040")]
    #[inline]
    pub fn restore(state: IrqState) {
        if state.0 {
            // Safety: this only undoes our own disable()
            unsafe { cortex_m::interrupt::enable() }
        }
    }

    /// Mask interrupts, returning the previous state for [restore].  There
    /// are no interrupts to mask on the host.
    #[cfg(not(feature = "rp2040"))]
    #[inline]
    pub fn disable() -> IrqState {
        IrqState(true)
    }

    /// Unmask interrupts if they were enabled before the matching [disable]
    #[cfg(not(feature = "rp2040"))]
    #[inline]
    pub fn restore(_state: IrqState) {}
}
