use crate::{Driver, Error, IoWire, SearchCursor};
use core::{
    fmt::{Debug, Display, Formatter, Result as FmtResult},
    ops::{Deref, DerefMut},
    str::FromStr,
};
use embedded_hal::delay::DelayNs;

/// 64-bit ROM ID of a slave.
///
/// Byte 0 is the family code, bytes 1..=6 the serial number and byte 7 the
/// CRC8 of bytes 0..=6.
#[derive(Debug, Clone, Copy, PartialOrd, Ord, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct Rom {
    raw: [u8; Self::BYTES as usize],
}

impl Default for Rom {
    fn default() -> Self {
        Self::from([0; Self::BYTES as usize])
    }
}

impl From<[u8; Self::BYTES as usize]> for Rom {
    fn from(raw: [u8; Self::BYTES as usize]) -> Self {
        Rom { raw }
    }
}

impl From<Rom> for [u8; Rom::BYTES as usize] {
    fn from(rom: Rom) -> [u8; Rom::BYTES as usize] {
        rom.raw
    }
}

impl Deref for Rom {
    type Target = [u8; Self::BYTES as usize];

    fn deref(&self) -> &Self::Target {
        &self.raw
    }
}

impl DerefMut for Rom {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.raw
    }
}

impl AsRef<[u8]> for Rom {
    fn as_ref(&self) -> &[u8] {
        self.deref() as _
    }
}

impl AsMut<[u8]> for Rom {
    fn as_mut(&mut self) -> &mut [u8] {
        self.deref_mut() as _
    }
}

impl Rom {
    /// The length of a ROM ID in bytes
    pub const BYTES: u8 = 8;

    /// The length of a ROM ID in bits
    pub const BITS: u8 = Self::BYTES * 8;

    /// Builds a ROM ID from family code and serial, appending the CRC
    pub fn new(family_code: u8, serial: [u8; 6]) -> Self {
        let mut raw = [0u8; Self::BYTES as usize];
        raw[0] = family_code;
        raw[1..7].copy_from_slice(&serial);
        raw[7] = crate::compute_partial_crc8(0, &raw[..7]);
        Rom { raw }
    }

    pub fn family_code(&self) -> u8 {
        self[0]
    }

    pub fn serial(&self) -> [u8; 6] {
        let mut serial = [0u8; 6];
        serial.copy_from_slice(&self[1..7]);
        serial
    }

    pub fn crc(&self) -> u8 {
        self[7]
    }

    /// Whether byte 7 matches the CRC8 of bytes 0..=6
    pub fn is_valid(&self) -> bool {
        self.ensure_correct_crc8::<()>().is_ok()
    }

    pub fn ensure_correct_crc8<E: Debug>(&self) -> Result<(), Error<E>> {
        crate::check_crc8(self.as_ref())
    }

    pub(crate) fn bit(&self, bit: u8) -> bool {
        self[(bit / 8) as usize] & (1 << (bit % 8)) != 0
    }

    pub(crate) fn write_bit(&mut self, bit: u8, value: bool) {
        let mask = 1 << (bit % 8);
        let byte = &mut self[(bit / 8) as usize];
        if value {
            *byte |= mask;
        } else {
            *byte &= !mask;
        }
    }
}

/// Error type
#[derive(Debug, PartialEq, Eq)]
pub enum RomParseError {
    NotEnough,
    Invalid,
}

fn hex_to_u8(c: char) -> Option<u8> {
    c.to_digit(16).map(|d| d as u8)
}

impl FromStr for Rom {
    type Err = RomParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut rom = Rom::default();
        let mut chars = s.chars().filter(|c| !c.is_whitespace() && *c != ':');

        for i in 0..Self::BYTES as usize {
            match (chars.next(), chars.next()) {
                (Some(h), Some(l)) => match (hex_to_u8(h), hex_to_u8(l)) {
                    (Some(h), Some(l)) => {
                        rom[i] = (h << 4) | l;
                    }
                    _ => return Err(RomParseError::Invalid),
                },
                _ => return Err(RomParseError::NotEnough),
            }
        }

        if chars.next().is_some() {
            return Err(RomParseError::Invalid);
        }

        Ok(rom)
    }
}

impl Display for Rom {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            self[0], self[1], self[2], self[3], self[4], self[5], self[6], self[7],
        )
    }
}

impl Rom {
    /// Reads the ROM of the only device on the bus
    pub fn get_single<W: IoWire>(
        driver: &mut Driver<W>,
        delay: &mut impl DelayNs,
    ) -> Result<Self, Error<W::Error>> {
        if !driver.reset(delay)? {
            return Err(Error::NoPresence);
        }
        let mut rom = Self::default();
        driver.read_rom(delay, &mut rom)?;
        rom.ensure_correct_crc8::<W::Error>()?;
        Ok(rom)
    }

    /// Searches the bus for the first device of the given family
    pub fn search_first<W: IoWire>(
        driver: &mut Driver<W>,
        delay: &mut impl DelayNs,
        family_code: u8,
    ) -> Result<Option<Self>, Error<W::Error>> {
        let mut search = SearchCursor::new();
        while let Some(rom) = driver.search_next(&mut search, delay)? {
            if family_code == rom.family_code() {
                return Ok(Some(rom));
            }
        }
        Ok(None)
    }
}
