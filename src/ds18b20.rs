use byteorder::{ByteOrder, LittleEndian};
use embedded_hal::delay::DelayNs;
use log::{debug, trace, warn};

use crate::{Device, Driver, Error, IoWire, OpCode, Rom};

/// Degrees Celsius per count of the raw temperature register
pub const PRECISION: f32 = 0.0625;

/// Function commands, sent after a ROM command
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Command {
    Convert = 0x44,
    WriteScratchpad = 0x4E,
    ReadScratchpad = 0xBE,
}

impl OpCode for Command {
    fn op_code(&self) -> u8 {
        *self as _
    }
}

/// Configuration register values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MeasureResolution {
    TC8 = 0b0001_1111,
    TC4 = 0b0011_1111,
    TC2 = 0b0101_1111,
    TC = 0b0111_1111,
}

impl MeasureResolution {
    pub fn time_ms(&self) -> u16 {
        match self {
            MeasureResolution::TC8 => 94,
            MeasureResolution::TC4 => 188,
            MeasureResolution::TC2 => 375,
            MeasureResolution::TC => 750,
        }
    }

    pub fn from_config_register(config: u8) -> Option<Self> {
        match config {
            0b0001_1111 => Some(MeasureResolution::TC8),
            0b0011_1111 => Some(MeasureResolution::TC4),
            0b0101_1111 => Some(MeasureResolution::TC2),
            0b0111_1111 => Some(MeasureResolution::TC),
            _ => None,
        }
    }
}

/// How long to poll for the end of a conversion
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConversionWait {
    /// Poll until the device reports completion, however long it takes
    #[default]
    Unbounded,
    /// Give up with [`Error::Timeout`] after this many read slots
    MaxPolls(u32),
}

/// The 9 bytes returned by Read Scratchpad
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scratchpad([u8; Scratchpad::BYTES]);

impl From<[u8; Scratchpad::BYTES]> for Scratchpad {
    fn from(raw: [u8; Scratchpad::BYTES]) -> Self {
        Scratchpad(raw)
    }
}

impl AsRef<[u8]> for Scratchpad {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Scratchpad {
    pub const BYTES: usize = 9;

    pub fn validate<E: core::fmt::Debug>(&self) -> Result<(), Error<E>> {
        crate::check_crc8(&self.0)
    }

    pub fn temperature_raw(&self) -> i16 {
        LittleEndian::read_i16(&self.0[0..2])
    }

    pub fn temperature(&self) -> f32 {
        f32::from(self.temperature_raw()) * PRECISION
    }

    pub fn alarm_high(&self) -> i8 {
        self.0[2] as i8
    }

    pub fn alarm_low(&self) -> i8 {
        self.0[3] as i8
    }

    pub fn resolution(&self) -> Option<MeasureResolution> {
        MeasureResolution::from_config_register(self.0[4])
    }
}

/// A DS18B20 on the bus and the last temperature read from it
#[derive(Debug, Clone, Copy)]
pub struct Ds18b20 {
    rom: Rom,
    temperature: f32,
    wait: ConversionWait,
}

impl Default for Ds18b20 {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Ds18b20> for Rom {
    fn from(device: Ds18b20) -> Self {
        device.rom
    }
}

impl Ds18b20 {
    /// Zeroed ROM and temperature. Pair with [`Driver::new`], which puts the
    /// line in its released state.
    pub fn new() -> Self {
        Ds18b20 {
            rom: Rom::default(),
            temperature: 0.0,
            wait: ConversionWait::Unbounded,
        }
    }

    pub fn with_conversion_wait(mut self, wait: ConversionWait) -> Self {
        self.wait = wait;
        self
    }

    /// Last successfully read temperature in °C
    pub fn temperature(&self) -> f32 {
        self.temperature
    }

    /// Reads and stores the ROM of the only device on the bus
    pub fn discover_rom<W: IoWire>(
        &mut self,
        driver: &mut Driver<W>,
        delay: &mut impl DelayNs,
    ) -> Result<Rom, Error<W::Error>> {
        let rom = Rom::get_single(driver, delay)?;
        debug!("ds18b20 at {}", rom);
        self.rom = rom;
        Ok(rom)
    }

    /// Full read cycle: convert, wait for completion, read and check the
    /// scratchpad. The stored temperature only changes on success.
    pub fn read_temperature<W: IoWire>(
        &mut self,
        driver: &mut Driver<W>,
        delay: &mut impl DelayNs,
    ) -> Result<f32, Error<W::Error>> {
        self.start_conversion(driver, delay)?;
        self.wait_for_conversion(driver, delay)?;
        let scratchpad = self.read_scratchpad(driver, delay)?;
        // ends the transaction
        driver.reset(delay)?;

        let temperature = scratchpad.temperature();
        trace!(
            "ds18b20 {}: raw {:#06x}, {} C",
            self.rom,
            scratchpad.temperature_raw(),
            temperature
        );
        self.temperature = temperature;
        Ok(temperature)
    }

    pub fn start_conversion<W: IoWire>(
        &self,
        driver: &mut Driver<W>,
        delay: &mut impl DelayNs,
    ) -> Result<(), Error<W::Error>> {
        driver.reset_match_write(delay, &self.rom, &[Command::Convert.op_code()])
    }

    /// Samples the line until the device stops holding it low. Returns the
    /// number of read slots spent, including the one that saw completion.
    pub fn wait_for_conversion<W: IoWire>(
        &self,
        driver: &mut Driver<W>,
        delay: &mut impl DelayNs,
    ) -> Result<u32, Error<W::Error>> {
        let mut polls = 0u32;
        loop {
            polls = polls.saturating_add(1);
            if driver.read_bit(delay)? {
                return Ok(polls);
            }
            if let ConversionWait::MaxPolls(max) = self.wait {
                if polls >= max {
                    warn!("ds18b20 {}: conversion still busy after {} polls", self.rom, polls);
                    return Err(Error::Timeout);
                }
            }
        }
    }

    /// Reads the scratchpad and checks its CRC
    pub fn read_scratchpad<W: IoWire>(
        &self,
        driver: &mut Driver<W>,
        delay: &mut impl DelayNs,
    ) -> Result<Scratchpad, Error<W::Error>> {
        let mut raw = [0u8; Scratchpad::BYTES];
        driver.reset_match_write_read(
            delay,
            &self.rom,
            &[Command::ReadScratchpad.op_code()],
            &mut raw,
        )?;
        let scratchpad = Scratchpad::from(raw);
        if let Err(e) = scratchpad.validate() {
            warn!("ds18b20 {}: scratchpad {:02x?} failed crc", self.rom, raw);
            return Err(e);
        }
        Ok(scratchpad)
    }

    /// Writes the alarm thresholds and the resolution to the scratchpad
    pub fn set_config<W: IoWire>(
        &self,
        driver: &mut Driver<W>,
        delay: &mut impl DelayNs,
        alarm_high: i8,
        alarm_low: i8,
        resolution: MeasureResolution,
    ) -> Result<(), Error<W::Error>> {
        driver.reset_match_write(
            delay,
            &self.rom,
            &[
                Command::WriteScratchpad.op_code(),
                alarm_high as u8,
                alarm_low as u8,
                resolution as u8,
            ],
        )
    }
}

/// Starts a conversion on every device on the bus at once
pub fn start_simultaneous_conversion<W: IoWire>(
    driver: &mut Driver<W>,
    delay: &mut impl DelayNs,
) -> Result<(), Error<W::Error>> {
    driver.reset_skip_write(delay, &[Command::Convert.op_code()])
}

impl Device for Ds18b20 {
    const FAMILY_CODE: u8 = 0x28;

    fn rom(&self) -> &Rom {
        &self.rom
    }

    fn from_rom_unchecked(rom: Rom) -> Self {
        Self {
            rom,
            ..Self::new()
        }
    }
}

/// Split raw value to two parts: integer and fraction N
/// Original value may be calculated as: integer + fraction/10000
pub fn split_temp(raw: i16) -> (i16, i16) {
    let abs = i32::from(raw).abs();
    let integer = (abs >> 4) as i16;
    let fraction = ((abs & 0xF) * 625) as i16;
    if raw < 0 {
        (-integer, -fraction)
    } else {
        (integer, fraction)
    }
}
