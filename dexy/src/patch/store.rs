//! The boundary between the patch bank and non-volatile storage.
//!
//! Only the [PatchStore] trait and the lockout-aware [persist] and [restore]
//! live here.  No flash backend ships with the firmware yet, so on the
//! target the bank always starts from the factory patches.

use core::fmt::Debug;

use log::{debug, info};

use super::PatchBank;
use crate::error::{ErrorFlags, ErrorKind};
use crate::sync::{CoreLockout, CritSecCell, PartnerCore, PatchBankLock};

/// Non-volatile storage for the patch bank.  The encoding is up to the
/// implementation.
pub trait PatchStore {
    /// Why a load or a save failed
    type Error: Debug;
    /// Read the stored bank
    fn load(&mut self) -> Result<PatchBank, Self::Error>;
    /// Overwrite the stored bank
    fn save(&mut self, bank: &PatchBank) -> Result<(), Self::Error>;
}

/// Write the current bank to `store`.
///
/// The bank is copied out under its lock first, so the audio core can keep
/// loading patches until the write itself starts.  The write runs inside a
/// [CoreLockout], since on the target the other core can't run while flash
/// is being programmed.  A failed write sets [ErrorKind::BadFlashData].
pub fn persist<S: PatchStore, P: PartnerCore>(
    store: &mut S,
    bank: &CritSecCell<PatchBank, PatchBankLock>,
    partner: &mut P,
    errors: &ErrorFlags,
) -> Result<(), S::Error> {
    let snapshot = bank.with(|bank| bank.clone());
    let result = {
        let _lockout = CoreLockout::enter(partner, errors);
        store.save(&snapshot)
    };
    match &result {
        Ok(()) => info!("saved patch bank"),
        Err(e) => {
            debug!("saving patch bank failed: {:?}", e);
            errors.set(ErrorKind::BadFlashData);
        }
    }
    result
}

/// Replace the current bank with the one in `store`.  If nothing usable is
/// stored the current bank is kept, the matching flag is set, and this
/// returns false.
pub fn restore<S: PatchStore>(
    store: &mut S,
    bank: &CritSecCell<PatchBank, PatchBankLock>,
    errors: &ErrorFlags,
) -> bool {
    let stored = match store.load() {
        Ok(stored) => stored,
        Err(e) => {
            debug!("reading patch bank failed: {:?}", e);
            errors.set(ErrorKind::BadFlashData);
            return false;
        }
    };
    match bank.with(|bank| bank.replace(&stored)) {
        Ok(()) => {
            info!("restored patch bank");
            true
        }
        Err(e) => {
            debug!("stored patch bank rejected: {}", e);
            errors.set(ErrorKind::BadPatchData);
            false
        }
    }
}
