//! Settings flash: the last sectors of a bank.

use embedded_storage::nor_flash::ReadNorFlash;

use super::hal::flash::{LockedFlashBank, UnlockedFlashBank};
use crate::storage::{SettingsStore, UnlockFlash};

const SECTOR_SIZE: u32 = 128 * 1024;

/// Sectors reserved for the settings map.
const SETTINGS_SECTORS: u32 = 2;

pub type FlashError = <LockedFlashBank as embedded_storage::nor_flash::ErrorType>::Error;

pub struct Flash(LockedFlashBank);

impl UnlockFlash for Flash {
    type Error = FlashError;
    type Unlocked<'a> = UnlockedFlashBank<'a>;

    fn unlock(&mut self) -> Self::Unlocked<'_> {
        self.0.unlocked()
    }
}

pub type SettingsFlash = SettingsStore<Flash>;

/// Settings store at the end of `bank`.
pub fn settings_flash(bank: LockedFlashBank) -> SettingsFlash {
    let end = bank.capacity() as u32;
    SettingsStore::new(Flash(bank), end - SETTINGS_SECTORS * SECTOR_SIZE..end)
}
