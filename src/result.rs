use core::fmt::{Debug, Display, Formatter, Result as FmtResult};

/// Error type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error<E: Sized + Debug> {
    /// No presence pulse after reset
    NoPresence,
    /// Both a search bit and its complement read as 1
    NoResponse,
    /// Computed CRC, received CRC
    CrcMismatch(u8, u8),
    /// Expected family code, found family code
    FamilyCodeMismatch(u8, u8),
    /// Conversion did not complete within the configured number of polls
    Timeout,
    PortError(E),
}

impl<E: Sized + Debug> From<E> for Error<E> {
    fn from(e: E) -> Self {
        Error::PortError(e)
    }
}

impl<E: Sized + Debug> Display for Error<E> {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        match self {
            Error::NoPresence => write!(f, "no device present on the bus"),
            Error::NoResponse => write!(f, "no device responded during search"),
            Error::CrcMismatch(computed, received) => write!(
                f,
                "crc mismatch: computed {:02x}, received {:02x}",
                computed, received
            ),
            Error::FamilyCodeMismatch(expected, found) => write!(
                f,
                "family code mismatch: expected {:02x}, found {:02x}",
                expected, found
            ),
            Error::Timeout => write!(f, "conversion timed out"),
            Error::PortError(e) => write!(f, "port error: {:?}", e),
        }
    }
}
