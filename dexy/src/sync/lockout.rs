use core::sync::atomic::{AtomicBool, Ordering};

use super::interrupts::{self, IrqState};
use crate::error::{ErrorFlags, ErrorKind};
use crate::tasks::Clock;

/// How long to wait for the other core to stop or restart
pub const LOCKOUT_TIMEOUT_US: u32 = 1000;

/// Control over the other core
pub trait PartnerCore {
    /// Ask the other core to stop and wait until it has, for up to
    /// `timeout_us`.  Returns false on timeout.
    fn pause(&mut self, timeout_us: u32) -> bool;
    /// Let the other core continue and wait until it has, for up to
    /// `timeout_us`.  Returns false on timeout.
    fn resume(&mut self, timeout_us: u32) -> bool;
}

/// Exclusive use of the whole chip, for writing to flash.
///
/// While this is alive the other core is parked (if it answered in time)
/// and interrupts on this core are masked.  Failing to park the other core
/// isn't fatal: the lockout goes ahead without it and the
/// [ErrorKind::Lockout] flag is set.
#[must_use]
pub struct CoreLockout<'a, P: PartnerCore> {
    partner: &'a mut P,
    errors: &'a ErrorFlags,
    paused: bool,
    irq: IrqState,
}

impl<'a, P: PartnerCore> CoreLockout<'a, P> {
    /// Stop the other core and mask interrupts
    pub fn enter(partner: &'a mut P, errors: &'a ErrorFlags) -> Self {
        let paused = partner.pause(LOCKOUT_TIMEOUT_US);
        if !paused {
            log::warn!("other core didn't stop for the lockout");
            errors.set(ErrorKind::Lockout);
        }
        let irq = interrupts::disable();
        Self {
            partner,
            errors,
            paused,
            irq,
        }
    }

    /// True if the other core is parked
    pub fn partner_paused(&self) -> bool {
        self.paused
    }
}

impl<P: PartnerCore> Drop for CoreLockout<'_, P> {
    fn drop(&mut self) {
        interrupts::restore(self.irq);
        if self.paused && !self.partner.resume(LOCKOUT_TIMEOUT_US) {
            self.errors.set(ErrorKind::Lockout);
        }
    }
}

/// A flag-based way for one core to park the other.
///
/// The parked core has to cooperate: it calls [LockoutHandshake::park_if_requested]
/// regularly (the audio loop does it once per sample) and spins there while
/// a lockout is active.  Only atomic loads and stores are used.
pub struct LockoutHandshake {
    request: AtomicBool,
    parked: AtomicBool,
}

impl Default for LockoutHandshake {
    fn default() -> Self {
        Self::new()
    }
}

impl LockoutHandshake {
    /// Constructor
    pub const fn new() -> Self {
        Self {
            request: AtomicBool::new(false),
            parked: AtomicBool::new(false),
        }
    }

    /// Called by the core that may be parked.  Returns once no lockout is
    /// requested.
    #[inline]
    pub fn park_if_requested(&self) {
        if !self.request.load(Ordering::Acquire) {
            return;
        }
        let irq = interrupts::disable();
        self.parked.store(true, Ordering::Release);
        while self.request.load(Ordering::Acquire) {
            core::hint::spin_loop();
        }
        self.parked.store(false, Ordering::Release);
        interrupts::restore(irq);
    }

    /// True while the other core is parked
    pub fn is_parked(&self) -> bool {
        self.parked.load(Ordering::Acquire)
    }

    /// A [PartnerCore] for the controlling core, timing out using `clock`
    pub fn partner<C: Clock>(&self, clock: C) -> HandshakePartner<'_, C> {
        HandshakePartner {
            handshake: self,
            clock,
        }
    }
}

/// The controlling end of a [LockoutHandshake]
pub struct HandshakePartner<'a, C: Clock> {
    handshake: &'a LockoutHandshake,
    clock: C,
}

impl<C: Clock> HandshakePartner<'_, C> {
    fn wait_for(&self, parked: bool, timeout_us: u32) -> bool {
        let deadline = self.clock.now_micros() + timeout_us as u64;
        while self.handshake.is_parked() != parked {
            if self.clock.now_micros() >= deadline {
                return false;
            }
            core::hint::spin_loop();
        }
        true
    }
}

impl<C: Clock> PartnerCore for HandshakePartner<'_, C> {
    fn pause(&mut self, timeout_us: u32) -> bool {
        self.handshake.request.store(true, Ordering::Release);
        let paused = self.wait_for(true, timeout_us);
        if !paused {
            // don't leave the other core to park later on its own
            self.handshake.request.store(false, Ordering::Release);
        }
        paused
    }

    fn resume(&mut self, timeout_us: u32) -> bool {
        self.handshake.request.store(false, Ordering::Release);
        self.wait_for(false, timeout_us)
    }
}
