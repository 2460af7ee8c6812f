//! Status vocabulary of the secure element surface.

use std::fmt;

/// Outcome codes reported to the layer above, mirroring the secure element
/// HAL status set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum SeStatus {
    Success,
    Failed,
    ChannelNotAvailable,
    NoSuchElementError,
    UnsupportedOperation,
    IoError,
}

impl fmt::Display for SeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SeStatus::Success => "success",
            SeStatus::Failed => "failed",
            SeStatus::ChannelNotAvailable => "channel not available",
            SeStatus::NoSuchElementError => "no such element",
            SeStatus::UnsupportedOperation => "unsupported operation",
            SeStatus::IoError => "i/o error",
        };
        f.write_str(name)
    }
}

/// SW1/SW2 trailer of an APDU response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct StatusWord {
    pub sw1: u8,
    pub sw2: u8,
}

impl StatusWord {
    /// Normal completion, `90 00`.
    pub const SUCCESS: Self = Self::new(0x90, 0x00);

    /// Build a status word from its two bytes.
    pub const fn new(sw1: u8, sw2: u8) -> Self {
        Self { sw1, sw2 }
    }

    /// The trailer of a response, if it is long enough to carry one.
    pub fn from_response(response: &[u8]) -> Option<Self> {
        match response {
            [.., sw1, sw2] => Some(Self::new(*sw1, *sw2)),
            _ => None,
        }
    }

    /// The combined `SW1 SW2` value.
    pub const fn to_u16(self) -> u16 {
        ((self.sw1 as u16) << 8) | self.sw2 as u16
    }

    /// Whether this is the normal completion status `90 00`.
    pub const fn is_success(self) -> bool {
        self.sw1 == 0x90 && self.sw2 == 0x00
    }
}

impl fmt::Display for StatusWord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02X}{:02X}", self.sw1, self.sw2)
    }
}
