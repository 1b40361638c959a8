use crate::{Command, Driver, Error, IoWire, Rom};
use core::fmt::Debug;
use embedded_hal::delay::DelayNs;
use log::{debug, trace};

/// State carried from one search pass to the next.
///
/// Holds the ROM found by the previous pass and the last discrepancy it
/// reported (1-based bit position, 0 before the first pass). Passing the
/// same cursor to [`Driver::search_next`] until it returns `None`
/// enumerates every device once.
#[derive(Debug, Clone, Default)]
pub struct SearchCursor {
    rom: Rom,
    last_discrepancy: u8,
    exhausted: bool,
}

impl SearchCursor {
    pub fn new() -> SearchCursor {
        SearchCursor::default()
    }

    pub fn last_discrepancy(&self) -> u8 {
        self.last_discrepancy
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Start over with the next call
    pub fn reset(&mut self) {
        *self = SearchCursor::default();
    }

    #[allow(clippy::should_implement_trait)]
    pub fn into_iter<'a, W: IoWire, D: DelayNs>(
        self,
        driver: &'a mut Driver<W>,
        delay: &'a mut D,
    ) -> SearchIter<'a, W, D> {
        SearchIter {
            search: Some(self),
            driver,
            delay,
        }
    }
}

/// Yields each ROM on the bus; stops after the first error.
pub struct SearchIter<'a, W: IoWire, D: DelayNs> {
    search: Option<SearchCursor>,
    driver: &'a mut Driver<W>,
    delay: &'a mut D,
}

impl<W: IoWire, D: DelayNs> Iterator for SearchIter<'_, W, D> {
    type Item = Result<Rom, Error<W::Error>>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut search = self.search.take()?;
        let result = self
            .driver
            .search_next(&mut search, &mut *self.delay)
            .transpose()?;
        if result.is_ok() {
            self.search = Some(search);
        }
        Some(result)
    }
}

/// Bookkeeping of a single pass over the 64 ROM bits
struct SearchPass<'a> {
    rom: &'a mut Rom,
    /// 1-based position of the bit being resolved
    position: u8,
    last_discrepancy: u8,
    new_discrepancy: u8,
}

impl<'a> SearchPass<'a> {
    fn new(rom: &'a mut Rom, last_discrepancy: u8) -> Self {
        SearchPass {
            rom,
            position: 1,
            last_discrepancy,
            new_discrepancy: 0,
        }
    }

    /// Picks the direction for the current position from the bit and its
    /// complement as read from the bus, records it in the ROM and moves on.
    /// `None` if no device answered.
    fn step(&mut self, id_bit: bool, cmp_bit: bool) -> Option<bool> {
        let bit = self.position - 1;
        let direction = match (id_bit, cmp_bit) {
            (true, true) => return None,
            (true, false) | (false, true) => id_bit,
            (false, false) => {
                if self.position == self.last_discrepancy {
                    true
                } else if self.position > self.last_discrepancy {
                    self.new_discrepancy = self.position;
                    false
                } else {
                    let previous = self.rom.bit(bit);
                    if !previous {
                        self.new_discrepancy = self.position;
                    }
                    previous
                }
            }
        };
        self.rom.write_bit(bit, direction);
        self.position += 1;
        Some(direction)
    }
}

impl<E: Debug, W: IoWire<Error = E>> Driver<W> {
    /// One Search ROM pass. The caller issues the reset beforehand.
    ///
    /// `rom` must hold the result of the previous pass (anything for the
    /// first one, with `last_discrepancy` 0). On return it holds the ROM
    /// selected by this pass, and the new last discrepancy is returned: 0
    /// once every device has been found. The ROM CRC is not checked.
    ///
    /// Fails with [`Error::NoResponse`] when a bit and its complement both
    /// read 1, meaning nobody is taking part in the search.
    pub fn search_rom(
        &mut self,
        delay: &mut impl DelayNs,
        rom: &mut Rom,
        last_discrepancy: u8,
    ) -> Result<u8, Error<E>> {
        self.write_command(delay, Command::SearchRom)?;

        let mut pass = SearchPass::new(rom, last_discrepancy);
        for _ in 0..Rom::BITS {
            let id_bit = self.read_bit(delay)?;
            let cmp_bit = self.read_bit(delay)?;
            let direction = pass.step(id_bit, cmp_bit).ok_or(Error::<E>::NoResponse)?;
            // devices whose bit differs stay silent until the next reset
            self.write_bit(delay, direction)?;
        }
        Ok(pass.new_discrepancy)
    }

    /// Finds the next device: reset, one search pass, CRC check.
    ///
    /// Returns `Ok(None)` when the bus is empty or every device has been
    /// reported. On error the cursor is left untouched, so calling again
    /// repeats the same pass.
    pub fn search_next(
        &mut self,
        search: &mut SearchCursor,
        delay: &mut impl DelayNs,
    ) -> Result<Option<Rom>, Error<E>> {
        if search.exhausted {
            return Ok(None);
        }

        if !self.reset(delay)? {
            search.exhausted = true;
            return Ok(None);
        }

        let mut rom = search.rom;
        let discrepancy = self.search_rom(delay, &mut rom, search.last_discrepancy)?;
        rom.ensure_correct_crc8::<E>()?;

        trace!("search pass done, last discrepancy {}", discrepancy);
        debug!("found device {}", rom);

        search.rom = rom;
        search.last_discrepancy = discrepancy;
        search.exhausted = discrepancy == 0;
        Ok(Some(rom))
    }

    /// Iterates over all devices on the bus
    pub fn devices<'a, D: DelayNs>(&'a mut self, delay: &'a mut D) -> SearchIter<'a, W, D> {
        SearchCursor::new().into_iter(self, delay)
    }
}
