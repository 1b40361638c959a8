use crate::{Driver, Error, IoWire, Rom};
use core::fmt::Debug;
use embedded_hal::delay::DelayNs;

/// Generic device interface
pub trait Device: Sized {
    /// Device family code
    const FAMILY_CODE: u8;

    /// Get device ROM ID
    fn rom(&self) -> &Rom;

    /// Instantiate device from a ROM ID without checking the family code
    fn from_rom_unchecked(rom: Rom) -> Self;

    /// Instantiate device from a ROM ID
    fn from_rom<E: Sized + Debug>(rom: Rom) -> Result<Self, Error<E>> {
        if rom.family_code() != Self::FAMILY_CODE {
            Err(Error::FamilyCodeMismatch(Self::FAMILY_CODE, rom.family_code()))
        } else {
            Ok(Self::from_rom_unchecked(rom))
        }
    }

    fn search_first<W: IoWire>(
        driver: &mut Driver<W>,
        delay: &mut impl DelayNs,
    ) -> Result<Option<Self>, Error<W::Error>> {
        Rom::search_first(driver, delay, Self::FAMILY_CODE)
            .map(|res| res.map(Self::from_rom_unchecked))
    }

    /// Reads the ROM of the only device on the bus
    fn get_single<W: IoWire>(
        driver: &mut Driver<W>,
        delay: &mut impl DelayNs,
    ) -> Result<Self, Error<W::Error>> {
        let rom = Rom::get_single(driver, delay)?;
        Self::from_rom(rom)
    }
}
