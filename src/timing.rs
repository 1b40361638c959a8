/// Slot durations in microseconds, named after table 3 of the AVR318
/// "Dallas 1-Wire master" application note.
///
/// | Slot | Use                                        |
/// |------|--------------------------------------------|
/// | A    | low time of a write-1 and of a read slot   |
/// | B    | recovery after a write-1                   |
/// | C    | low time of a write-0                      |
/// | D    | recovery after a write-0                   |
/// | E    | release-to-sample time of a read slot      |
/// | F    | recovery after the read sample             |
/// | G    | delay before a reset (unused at standard speed) |
/// | H    | reset pulse low time                       |
/// | I    | release-to-presence-sample time            |
/// | J    | recovery after the presence sample         |
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    pub a: u32,
    pub b: u32,
    pub c: u32,
    pub d: u32,
    pub e: u32,
    pub f: u32,
    pub g: u32,
    pub h: u32,
    pub i: u32,
    pub j: u32,
}

impl Timing {
    /// Standard speed values
    pub const STANDARD: Timing = Timing {
        a: 6,
        b: 64,
        c: 60,
        d: 10,
        e: 9,
        f: 55,
        g: 0,
        h: 480,
        i: 70,
        j: 410,
    };

    /// Total length of a write-1 slot
    pub fn write_one_slot(&self) -> u32 {
        self.a + self.b
    }

    /// Total length of a write-0 slot
    pub fn write_zero_slot(&self) -> u32 {
        self.c + self.d
    }

    /// Total length of a read slot
    pub fn read_slot(&self) -> u32 {
        self.a + self.e + self.f
    }

    /// Subtracts a fixed pin-toggle overhead from every non-zero slot,
    /// saturating at 1 µs.
    pub fn calibrated(self, overhead: u32) -> Timing {
        let trim = |us: u32| {
            if us == 0 {
                0
            } else {
                us.saturating_sub(overhead).max(1)
            }
        };
        Timing {
            a: trim(self.a),
            b: trim(self.b),
            c: trim(self.c),
            d: trim(self.d),
            e: trim(self.e),
            f: trim(self.f),
            g: trim(self.g),
            h: trim(self.h),
            i: trim(self.i),
            j: trim(self.j),
        }
    }
}

impl Default for Timing {
    fn default() -> Self {
        Self::STANDARD
    }
}
