use crate::{atomic::InterruptFree, Command, Error, IoWire, OpCode, Rom, Timing};
use core::fmt::Debug;
use embedded_hal::delay::DelayNs;

pub struct Driver<W: IoWire> {
    io_wire: W,
    timing: Timing,
}

impl<E: Debug, W: IoWire<Error = E>> Driver<W> {
    /// Releases the line and waits one reset period so the slaves see an
    /// idle bus before the first reset.
    pub fn new(io_wire: W, delay: &mut impl DelayNs) -> Result<Self, Error<E>> {
        Self::with_timing(io_wire, Timing::STANDARD, delay)
    }

    pub fn with_timing(
        io_wire: W,
        timing: Timing,
        delay: &mut impl DelayNs,
    ) -> Result<Self, Error<E>> {
        let mut driver = Driver { io_wire, timing };
        driver.io_wire.release()?;
        delay.delay_us(timing.h);
        Ok(driver)
    }

    pub fn timing(&self) -> &Timing {
        &self.timing
    }

    pub fn into_inner(self) -> W {
        self.io_wire
    }

    /// Performs a reset and listens for a presence pulse.
    ///
    /// Returns `Ok(false)` if no slave answered. Slaves acknowledge by
    /// holding the line low, so presence reads as a low level.
    pub fn reset(&mut self, delay: &mut impl DelayNs) -> Result<bool, Error<E>> {
        let t = self.timing;
        if t.g > 0 {
            delay.delay_us(t.g);
        }

        let _cs = InterruptFree::enter();
        self.io_wire.drive_low()?;
        delay.delay_us(t.h);
        self.io_wire.release()?;
        delay.delay_us(t.i);
        let present = self.io_wire.is_low()?;
        delay.delay_us(t.j);
        Ok(present)
    }

    fn ensure_presence(&mut self, delay: &mut impl DelayNs) -> Result<(), Error<E>> {
        if self.reset(delay)? {
            Ok(())
        } else {
            Err(Error::NoPresence)
        }
    }

    pub fn reset_match_write(
        &mut self,
        delay: &mut impl DelayNs,
        rom: &Rom,
        write: &[u8],
    ) -> Result<(), Error<E>> {
        self.ensure_presence(delay)?;
        self.match_rom(delay, rom)?;
        self.write_bytes(delay, write)?;
        Ok(())
    }

    pub fn reset_match_write_read(
        &mut self,
        delay: &mut impl DelayNs,
        rom: &Rom,
        write: &[u8],
        read: &mut [u8],
    ) -> Result<(), Error<E>> {
        self.reset_match_write(delay, rom, write)?;
        self.read_bytes(delay, read)?;
        Ok(())
    }

    pub fn reset_skip_write(
        &mut self,
        delay: &mut impl DelayNs,
        write: &[u8],
    ) -> Result<(), Error<E>> {
        self.ensure_presence(delay)?;
        self.skip_rom(delay)?;
        self.write_bytes(delay, write)?;
        Ok(())
    }

    /// Addresses every device at once. Only meaningful for reads on a
    /// single-device bus.
    pub fn skip_rom(&mut self, delay: &mut impl DelayNs) -> Result<(), E> {
        self.write_command(delay, Command::SkipRom)
    }

    /// Reads the ROM of the only device on the bus. Slaves send the family
    /// code first and the CRC last, the same order Search ROM walks.
    pub fn read_rom(&mut self, delay: &mut impl DelayNs, rom: &mut Rom) -> Result<(), E> {
        self.write_command(delay, Command::ReadRom)?;
        self.read_bytes(delay, rom.as_mut())
    }

    /// Selects one device; `rom[0]` goes out first.
    pub fn match_rom(&mut self, delay: &mut impl DelayNs, rom: &Rom) -> Result<(), E> {
        self.write_command(delay, Command::MatchRom)?;
        self.write_bytes(delay, rom.as_ref())
    }

    pub fn write_command(&mut self, delay: &mut impl DelayNs, cmd: impl OpCode) -> Result<(), E> {
        self.write_byte(delay, cmd.op_code())
    }

    pub fn write_bytes(&mut self, delay: &mut impl DelayNs, bytes: &[u8]) -> Result<(), E> {
        for b in bytes {
            self.write_byte(delay, *b)?;
        }
        Ok(())
    }

    pub fn read_bytes(&mut self, delay: &mut impl DelayNs, dst: &mut [u8]) -> Result<(), E> {
        for d in dst {
            *d = self.read_byte(delay)?;
        }
        Ok(())
    }

    /// Sends a byte, least significant bit first
    pub fn write_byte(&mut self, delay: &mut impl DelayNs, byte: u8) -> Result<(), E> {
        let mut byte = byte;
        for _ in 0..8 {
            self.write_bit(delay, (byte & 0x01) == 0x01)?;
            byte >>= 1;
        }
        Ok(())
    }

    /// Receives a byte, least significant bit first
    pub fn read_byte(&mut self, delay: &mut impl DelayNs) -> Result<u8, E> {
        let mut byte = 0_u8;
        for _ in 0..8 {
            byte >>= 1;
            if self.read_bit(delay)? {
                byte |= 0x80;
            }
        }
        Ok(byte)
    }

    pub fn write_bit(&mut self, delay: &mut impl DelayNs, high: bool) -> Result<(), E> {
        let t = self.timing;
        let (low, recovery) = if high { (t.a, t.b) } else { (t.c, t.d) };

        let _cs = InterruptFree::enter();
        self.io_wire.drive_low()?;
        delay.delay_us(low);
        self.io_wire.release()?;
        delay.delay_us(recovery);
        Ok(())
    }

    pub fn read_bit(&mut self, delay: &mut impl DelayNs) -> Result<bool, E> {
        let t = self.timing;

        let _cs = InterruptFree::enter();
        self.io_wire.drive_low()?;
        delay.delay_us(t.a);
        self.io_wire.release()?;
        delay.delay_us(t.e);
        let val = self.io_wire.is_high()?;
        delay.delay_us(t.f);
        Ok(val)
    }
}
