//! Simulated bus for host tests.
//!
//! The pin and the delay share one `Wire`. Slot type is decoded from how
//! long the master held the line low, and every attached device answers
//! through a wired-AND: the line reads high only if no device pulls it
//! down. Every ROM transfer (Read ROM, Match ROM, Search ROM) runs byte 0
//! first, least significant bit first.

use crate::{atomic, compute_partial_crc8, Driver, Rom};
use core::convert::Infallible;
use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{ErrorType, InputPin, OutputPin};
use std::{cell::RefCell, rc::Rc};

/// Low times at or above this are reset pulses
const RESET_MIN_US: u64 = 480;
/// Slaves sample the line this long after the falling edge
const SLAVE_SAMPLE_US: u64 = 15;

#[derive(Debug, Clone, Copy, Default)]
struct Receiver {
    value: u8,
    count: u8,
}

impl Receiver {
    fn push(&mut self, bit: bool) -> Option<u8> {
        if bit {
            self.value |= 1 << self.count;
        }
        self.count += 1;
        if self.count == 8 {
            Some(self.value)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SearchPhase {
    Bit,
    Complement,
    Direction,
}

#[derive(Debug, Clone, Copy)]
enum State {
    Idle,
    RomCommand(Receiver),
    ReadRom(u8),
    MatchRom { bit: u8, matched: bool },
    Search { bit: u8, phase: SearchPhase },
    Function(Receiver),
    Converting { busy_left: usize },
    ReadScratchpad(u8),
    /// Receiving TH, TL and the configuration byte
    WriteScratchpad { index: u8, rx: Receiver },
    Done,
}

pub(crate) struct SimDevice {
    pub(crate) rom: Rom,
    pub(crate) scratchpad: [u8; 9],
    /// Read slots answered with 0 after each Convert T
    pub(crate) busy_polls: usize,
    /// Read slots seen while converting
    pub(crate) polls: usize,
    pub(crate) conversions: usize,
    pub(crate) scratchpad_reads: usize,
    state: State,
}

/// Scratchpad of a 12-bit DS18B20 holding `raw`
pub(crate) fn scratchpad_for(raw: i16) -> [u8; 9] {
    let [lo, hi] = raw.to_le_bytes();
    let mut scratchpad = [lo, hi, 0x4b, 0x46, 0x7f, 0xff, 0x0c, 0x10, 0x00];
    scratchpad[8] = compute_partial_crc8(0, &scratchpad[..8]);
    scratchpad
}

impl SimDevice {
    pub(crate) fn new(rom: Rom) -> Self {
        SimDevice {
            rom,
            scratchpad: scratchpad_for(0x0550),
            busy_polls: 0,
            polls: 0,
            conversions: 0,
            scratchpad_reads: 0,
            state: State::Idle,
        }
    }

    pub(crate) fn ds18b20(serial: [u8; 6], raw: i16) -> Self {
        let mut device = Self::new(Rom::new(0x28, serial));
        device.scratchpad = scratchpad_for(raw);
        device
    }

    pub(crate) fn with_busy_polls(mut self, busy_polls: usize) -> Self {
        self.busy_polls = busy_polls;
        self
    }

    fn reset(&mut self) {
        self.state = State::RomCommand(Receiver::default());
    }

    fn rom_command(cmd: u8) -> State {
        match cmd {
            0x33 => State::ReadRom(0),
            0x55 => State::MatchRom {
                bit: 0,
                matched: true,
            },
            0xCC => State::Function(Receiver::default()),
            0xF0 => State::Search {
                bit: 0,
                phase: SearchPhase::Bit,
            },
            _ => State::Done,
        }
    }

    fn function_command(&mut self, cmd: u8) -> State {
        match cmd {
            0x44 => {
                self.conversions += 1;
                State::Converting {
                    busy_left: self.busy_polls,
                }
            }
            0xBE => {
                self.scratchpad_reads += 1;
                State::ReadScratchpad(0)
            }
            0x4E => State::WriteScratchpad {
                index: 2,
                rx: Receiver::default(),
            },
            _ => State::Done,
        }
    }

    /// Handles one time slot. `master` is the bit the master wrote (a read
    /// slot looks like a written 1). Returns false if the device pulls the
    /// line low during the slot.
    fn slot(&mut self, master: bool) -> bool {
        let (output, next) = match self.state {
            State::Idle | State::Done => (true, self.state),
            State::RomCommand(mut rx) => match rx.push(master) {
                Some(cmd) => (true, Self::rom_command(cmd)),
                None => (true, State::RomCommand(rx)),
            },
            State::ReadRom(bit) => {
                let next = if bit + 1 == Rom::BITS {
                    State::Function(Receiver::default())
                } else {
                    State::ReadRom(bit + 1)
                };
                (self.rom.bit(bit), next)
            }
            State::MatchRom { bit, matched } => {
                let matched = matched && master == self.rom.bit(bit);
                let next = if bit + 1 < Rom::BITS {
                    State::MatchRom {
                        bit: bit + 1,
                        matched,
                    }
                } else if matched {
                    State::Function(Receiver::default())
                } else {
                    State::Done
                };
                (true, next)
            }
            State::Search { bit, phase } => {
                let value = self.rom.bit(bit);
                match phase {
                    SearchPhase::Bit => (
                        value,
                        State::Search {
                            bit,
                            phase: SearchPhase::Complement,
                        },
                    ),
                    SearchPhase::Complement => (
                        !value,
                        State::Search {
                            bit,
                            phase: SearchPhase::Direction,
                        },
                    ),
                    SearchPhase::Direction if master != value => (true, State::Done),
                    SearchPhase::Direction if bit + 1 == Rom::BITS => {
                        (true, State::Function(Receiver::default()))
                    }
                    SearchPhase::Direction => (
                        true,
                        State::Search {
                            bit: bit + 1,
                            phase: SearchPhase::Bit,
                        },
                    ),
                }
            }
            State::Function(mut rx) => match rx.push(master) {
                Some(cmd) => (true, self.function_command(cmd)),
                None => (true, State::Function(rx)),
            },
            State::Converting { busy_left } => {
                self.polls += 1;
                if busy_left > 0 {
                    (
                        false,
                        State::Converting {
                            busy_left: busy_left - 1,
                        },
                    )
                } else {
                    (true, self.state)
                }
            }
            State::ReadScratchpad(bit) => {
                let value = self.scratchpad[(bit / 8) as usize] & (1 << (bit % 8)) != 0;
                let next = if bit + 1 == 72 {
                    State::Done
                } else {
                    State::ReadScratchpad(bit + 1)
                };
                (value, next)
            }
            State::WriteScratchpad { index, mut rx } => match rx.push(master) {
                Some(byte) => {
                    self.scratchpad[index as usize] = byte;
                    self.scratchpad[8] = compute_partial_crc8(0, &self.scratchpad[..8]);
                    let next = if index == 4 {
                        State::Done
                    } else {
                        State::WriteScratchpad {
                            index: index + 1,
                            rx: Receiver::default(),
                        }
                    };
                    (true, next)
                }
                None => (true, State::WriteScratchpad { index, rx }),
            },
        };
        self.state = next;
        output
    }
}

/// Shared line state
pub(crate) struct Wire {
    pub(crate) devices: Vec<SimDevice>,
    /// Low time of every pulse, in µs
    pub(crate) lows: Vec<u64>,
    /// Time from the falling edge to every master sample, in µs
    pub(crate) samples: Vec<u64>,
    pub(crate) resets: usize,
    /// Edges driven or samples taken outside an interrupt-free region
    pub(crate) unguarded: usize,
    now_ns: u64,
    fell_at: u64,
    low_since: Option<u64>,
    level: bool,
}

impl Wire {
    fn release(&mut self) {
        let Some(start) = self.low_since.take() else {
            return;
        };
        let low_us = (self.now_ns - start) / 1000;
        self.lows.push(low_us);

        if low_us >= RESET_MIN_US {
            self.resets += 1;
            self.devices.iter_mut().for_each(SimDevice::reset);
            self.level = self.devices.is_empty();
        } else {
            let master = low_us < SLAVE_SAMPLE_US;
            let mut level = true;
            for device in self.devices.iter_mut() {
                level &= device.slot(master);
            }
            self.level = level;
        }
    }

    pub(crate) fn clear_log(&mut self) {
        self.lows.clear();
        self.samples.clear();
    }
}

#[derive(Clone)]
pub(crate) struct SimPin(Rc<RefCell<Wire>>);

impl ErrorType for SimPin {
    type Error = Infallible;
}

impl OutputPin for SimPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        let mut wire = self.0.borrow_mut();
        if !atomic::is_held() {
            wire.unguarded += 1;
        }
        if wire.low_since.is_none() {
            wire.low_since = Some(wire.now_ns);
            wire.fell_at = wire.now_ns;
        }
        wire.level = false;
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        let mut wire = self.0.borrow_mut();
        if wire.low_since.is_some() && !atomic::is_held() {
            wire.unguarded += 1;
        }
        wire.release();
        Ok(())
    }
}

impl InputPin for SimPin {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        let mut wire = self.0.borrow_mut();
        if !atomic::is_held() {
            wire.unguarded += 1;
        }
        let since_fall = (wire.now_ns - wire.fell_at) / 1000;
        wire.samples.push(since_fall);
        Ok(wire.level)
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        self.is_high().map(|high| !high)
    }
}

pub(crate) struct SimDelay(Rc<RefCell<Wire>>);

impl DelayNs for SimDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.0.borrow_mut().now_ns += u64::from(ns);
    }
}

pub(crate) type SimDriver = Driver<(SimPin,)>;

/// Driver attached to a bus carrying `devices`
pub(crate) fn bus(devices: Vec<SimDevice>) -> (SimDriver, SimDelay, Rc<RefCell<Wire>>) {
    let wire = Rc::new(RefCell::new(Wire {
        devices,
        lows: Vec::new(),
        samples: Vec::new(),
        resets: 0,
        unguarded: 0,
        now_ns: 0,
        fell_at: 0,
        low_since: None,
        level: true,
    }));
    let mut delay = SimDelay(wire.clone());
    let driver = Driver::new((SimPin(wire.clone()),), &mut delay).unwrap();
    (driver, delay, wire)
}
