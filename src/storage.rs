//! # Settings persistence
//!
//! Settings are stored as a `postcard` item in a `sequential_storage` key-value map spanning a
//! few flash sectors. A save appends a new item and only erases a sector once the map runs out
//! of space, after the live item has been moved: an interrupted save leaves the previous
//! settings readable.
//!
//! The flash itself is blocking. [AsyncFlash] presents it to the map code, which is driven to
//! completion with [embassy_futures::block_on].

use core::ops::Range;

use embassy_futures::block_on;
use embedded_storage::nor_flash::{ErrorType, NorFlash, ReadNorFlash};
use sequential_storage::{cache::NoCache, map};

use crate::settings::{self, Settings};

/// Map key of the settings item. Bump when the [Settings] layout changes.
const SETTINGS_KEY: u8 = 1;

/// Scratch space for one map item.
const ITEM_SIZE: usize = 256;

/// Flash that has to be unlocked for writing.
pub trait UnlockFlash {
    type Error: core::fmt::Debug;
    type Unlocked<'a>: NorFlash<Error = Self::Error>
    where
        Self: 'a;

    fn unlock(&mut self) -> Self::Unlocked<'_>;
}

/// Async view of a blocking flash.
pub struct AsyncFlash<F>(pub F);

impl<F: ErrorType> ErrorType for AsyncFlash<F> {
    type Error = F::Error;
}

impl<F: ReadNorFlash> embedded_storage_async::nor_flash::ReadNorFlash for AsyncFlash<F> {
    const READ_SIZE: usize = F::READ_SIZE;

    async fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
        self.0.read(offset, bytes)
    }

    fn capacity(&self) -> usize {
        self.0.capacity()
    }
}

impl<F: NorFlash> embedded_storage_async::nor_flash::NorFlash for AsyncFlash<F> {
    const WRITE_SIZE: usize = F::WRITE_SIZE;
    const ERASE_SIZE: usize = F::ERASE_SIZE;

    async fn erase(&mut self, from: u32, to: u32) -> Result<(), Self::Error> {
        self.0.erase(from, to)
    }

    async fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Self::Error> {
        self.0.write(offset, bytes)
    }
}

#[derive(Debug)]
pub enum Error<E> {
    Storage(sequential_storage::Error<E>),
    Settings(settings::Error),
}

pub struct SettingsStore<F> {
    flash: F,
    range: Range<u32>,
}

impl<F: UnlockFlash> SettingsStore<F> {
    /// # Args
    /// * `flash` - The flash holding the map.
    /// * `range` - Flash offsets of the map, at least two whole erase sectors.
    pub fn new(flash: F, range: Range<u32>) -> Self {
        Self { flash, range }
    }

    fn fetch(&mut self) -> Result<Option<Settings>, Error<F::Error>> {
        let mut buf = [0u8; ITEM_SIZE];
        let mut flash = AsyncFlash(self.flash.unlock());
        let item: Option<&[u8]> = block_on(map::fetch_item(
            &mut flash,
            self.range.clone(),
            &mut NoCache::new(),
            &mut buf,
            &SETTINGS_KEY,
        ))
        .map_err(Error::Storage)?;
        item.map(Settings::load)
            .transpose()
            .map_err(Error::Settings)
    }

    /// Read the stored settings, falling back to defaults.
    pub fn load(&mut self) -> Settings {
        match self.fetch() {
            Ok(Some(settings)) => settings,
            Ok(None) => {
                log::info!("No stored settings, using defaults");
                Settings::default()
            }
            Err(e) => {
                log::warn!("Using default settings: {e:?}");
                Settings::default()
            }
        }
    }

    /// Replace the stored settings.
    ///
    /// # Note
    /// A save may have to erase a sector.
    pub fn save(&mut self, settings: &Settings) -> Result<(), Error<F::Error>> {
        let mut record = [0u8; ITEM_SIZE / 2];
        let record: &[u8] = settings.store(&mut record).map_err(Error::Settings)?;
        let mut buf = [0u8; ITEM_SIZE];
        let mut flash = AsyncFlash(self.flash.unlock());
        block_on(map::store_item(
            &mut flash,
            self.range.clone(),
            &mut NoCache::new(),
            &mut buf,
            &SETTINGS_KEY,
            &record,
        ))
        .map_err(Error::Storage)?;
        log::info!("Settings saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    extern crate std;
    use std::vec;
    use std::vec::Vec;

    use embedded_storage::nor_flash::NorFlashErrorKind;

    use super::*;

    const SECTOR: usize = 1024;

    /// NOR flash in RAM: erase sets ones, writes can only clear bits.
    struct RamFlash(Vec<u8>);

    struct Unlocked<'a>(&'a mut [u8]);

    impl ErrorType for Unlocked<'_> {
        type Error = NorFlashErrorKind;
    }

    impl ReadNorFlash for Unlocked<'_> {
        const READ_SIZE: usize = 1;

        fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
            let start = offset as usize;
            let src = self
                .0
                .get(start..start + bytes.len())
                .ok_or(NorFlashErrorKind::OutOfBounds)?;
            bytes.copy_from_slice(src);
            Ok(())
        }

        fn capacity(&self) -> usize {
            self.0.len()
        }
    }

    impl NorFlash for Unlocked<'_> {
        const WRITE_SIZE: usize = 4;
        const ERASE_SIZE: usize = SECTOR;

        fn erase(&mut self, from: u32, to: u32) -> Result<(), Self::Error> {
            let (from, to) = (from as usize, to as usize);
            if from % SECTOR != 0 || to % SECTOR != 0 {
                return Err(NorFlashErrorKind::NotAligned);
            }
            self.0
                .get_mut(from..to)
                .ok_or(NorFlashErrorKind::OutOfBounds)?
                .fill(0xff);
            Ok(())
        }

        fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Self::Error> {
            let start = offset as usize;
            if start % Self::WRITE_SIZE != 0 || bytes.len() % Self::WRITE_SIZE != 0 {
                return Err(NorFlashErrorKind::NotAligned);
            }
            let dst = self
                .0
                .get_mut(start..start + bytes.len())
                .ok_or(NorFlashErrorKind::OutOfBounds)?;
            for (d, s) in dst.iter_mut().zip(bytes) {
                *d &= *s;
            }
            Ok(())
        }
    }

    impl UnlockFlash for RamFlash {
        type Error = NorFlashErrorKind;
        type Unlocked<'a> = Unlocked<'a>;

        fn unlock(&mut self) -> Unlocked<'_> {
            Unlocked(&mut self.0)
        }
    }

    fn store() -> SettingsStore<RamFlash> {
        SettingsStore::new(RamFlash(vec![0xff; 4 * SECTOR]), 0..4 * SECTOR as u32)
    }

    #[test]
    fn erased_flash_yields_defaults() {
        let mut store = store();
        assert!(matches!(store.fetch(), Ok(None)));
        assert_eq!(store.load(), Settings::default());
    }

    #[test]
    fn saved_settings_load_back() {
        let mut store = store();
        let mut settings = Settings::default();
        settings.trigger_high[1] = true;
        settings.pause_ms[3] = 80;
        store.save(&settings).unwrap();
        assert_eq!(store.load(), settings);
    }

    #[test]
    fn latest_save_wins_across_sectors() {
        let mut store = store();
        let mut settings = Settings::default();
        // enough saves to fill every sector and recycle the oldest
        for pause in 0..200 {
            settings.pause_ms[0] = pause;
            store.save(&settings).unwrap();
        }
        assert_eq!(store.load().pause_ms[0], 199);
    }

    #[test]
    fn undecodable_item_falls_back() {
        let mut store = store();
        let mut buf = [0u8; ITEM_SIZE];
        let mut flash = AsyncFlash(store.flash.unlock());
        block_on(map::store_item(
            &mut flash,
            store.range.clone(),
            &mut NoCache::new(),
            &mut buf,
            &SETTINGS_KEY,
            &&[0xffu8, 0xff][..],
        ))
        .unwrap();
        assert!(matches!(store.fetch(), Err(Error::Settings(_))));
        assert_eq!(store.load(), Settings::default());
    }
}
