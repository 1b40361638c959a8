#![cfg_attr(not(test), no_std)]
#![doc = include_str!("../README.md")]

mod address;
mod atomic;
mod command;
mod device;
mod driver;
#[cfg(feature = "ds18b20")]
pub mod ds18b20;
mod iowire;
mod result;
mod search;
#[cfg(test)]
mod sim;
mod timing;

use core::fmt::Debug;

pub use address::{Rom, RomParseError};
pub use command::{Command, OpCode};
pub use device::Device;
pub use driver::Driver;
pub use iowire::{Inverted, IoWire};
pub use result::Error;
pub use search::{SearchCursor, SearchIter};
pub use timing::Timing;

/// Dallas/Maxim polynomial x^8 + x^5 + x^4 + 1, as applied to the
/// right-shifting seed before the top bit is set
const CRC8_POLY: u8 = 0x18;

/// Feeds one byte (LSB first) into the running CRC8 `seed`.
///
/// Start with seed 0 and pass the result on to the next byte.
pub fn crc8(data: u8, seed: u8) -> u8 {
    let mut data = data;
    let mut seed = seed;
    for _ in 0..8 {
        if (data ^ seed) & 0x01 != 0 {
            seed ^= CRC8_POLY;
            seed >>= 1;
            seed |= 0x80;
        } else {
            seed >>= 1;
        }
        data >>= 1;
    }
    seed
}

pub fn compute_partial_crc8(crc: u8, data: &[u8]) -> u8 {
    data.iter().fold(crc, |crc, byte| crc8(*byte, crc))
}

/// Checks a buffer whose last byte is the CRC8 of the bytes before it
pub fn check_crc8<E: Debug>(data: &[u8]) -> Result<(), Error<E>> {
    match data.split_last() {
        Some((received, payload)) => {
            let computed = compute_partial_crc8(0, payload);
            if computed != *received {
                Err(Error::CrcMismatch(computed, *received))
            } else {
                Ok(())
            }
        }
        None => Ok(()),
    }
}
