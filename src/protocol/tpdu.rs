//! T=1 block (TPDU) value type and byte codec.

use std::fmt;

use crate::atp::ChecksumKind;
use crate::constants::{
    PCB_I_MORE_BIT, PCB_I_NS_BIT, PCB_R_BASE, PCB_R_NR_BIT, PCB_S_RESPONSE_BIT, TPDU_MAX_DATA_LEN,
    TPDU_MAX_LEN, TPDU_PROLOGUE_LEN,
};
use crate::protocol::checksum::{crc16, lrc};
use crate::{Error, Result};

/// A single T=1 block: three-byte prologue, up to 254 data bytes, and an LRC
/// or CRC epilogue. Data lives in a fixed inline buffer so the hot path never
/// allocates.
#[derive(Clone)]
pub struct Tpdu {
    /// Node address byte.
    pub nad: u8,
    /// Protocol control byte.
    pub pcb: u8,
    len: u8,
    data: [u8; TPDU_MAX_DATA_LEN],
    checksum: u16,
}

/// Classification of a PCB into the three block families.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TpduKind {
    /// Information block carrying APDU data.
    I {
        /// Sender sequence number, mod 2.
        ns: u8,
        /// More-blocks chaining bit.
        more: bool,
    },
    /// Receive-ready supervisory block.
    R {
        /// Next expected sender sequence number.
        nr: u8,
        /// Error condition announced by the sender.
        error: RError,
    },
    /// Supervisory control block.
    S {
        /// Which control dialog this block belongs to.
        kind: SBlockKind,
        /// Request (false) or response (true).
        response: bool,
    },
}

/// Error condition carried in the low bits of an R-block PCB.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum RError {
    ErrorFree,
    ChecksumError,
    OtherError,
}

/// S-block dialog selector, from the low bits of the PCB.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum SBlockKind {
    Resynch,
    Ifs,
    Abort,
    Wtx,
    SoftReset,
    Unknown(u8),
}

/// Build an I-block PCB from the sequence number and chaining flag.
pub fn i_block_pcb(ns: u8, more: bool) -> u8 {
    let mut pcb = 0x00;
    if ns & 1 == 1 {
        pcb |= PCB_I_NS_BIT;
    }
    if more {
        pcb |= PCB_I_MORE_BIT;
    }
    pcb
}

/// Build an R-block PCB from the expected sequence number and error kind.
pub fn r_block_pcb(nr: u8, error: RError) -> u8 {
    let mut pcb = PCB_R_BASE;
    if nr & 1 == 1 {
        pcb |= PCB_R_NR_BIT;
    }
    pcb |= match error {
        RError::ErrorFree => 0b00,
        RError::ChecksumError => 0b01,
        RError::OtherError => 0b10,
    };
    pcb
}

impl Tpdu {
    /// Form a block with a freshly computed checksum.
    pub fn form(nad: u8, pcb: u8, data: &[u8], kind: ChecksumKind) -> Result<Self> {
        if data.len() > TPDU_MAX_DATA_LEN {
            return Err(Error::InvalidLength {
                max: TPDU_MAX_DATA_LEN,
                actual: data.len(),
            });
        }
        let mut tpdu = Self {
            nad,
            pcb,
            len: data.len() as u8,
            data: [0u8; TPDU_MAX_DATA_LEN],
            checksum: 0,
        };
        tpdu.data[..data.len()].copy_from_slice(data);
        tpdu.checksum = tpdu.compute_checksum(kind);
        Ok(tpdu)
    }

    /// Reassemble a block from fields read off the wire. The stored checksum
    /// is the received one; use [`Tpdu::checksum_ok`] to verify it.
    pub fn from_wire(nad: u8, pcb: u8, data: &[u8], checksum: u16) -> Result<Self> {
        if data.len() > TPDU_MAX_DATA_LEN {
            return Err(Error::InvalidLength {
                max: TPDU_MAX_DATA_LEN,
                actual: data.len(),
            });
        }
        let mut tpdu = Self {
            nad,
            pcb,
            len: data.len() as u8,
            data: [0u8; TPDU_MAX_DATA_LEN],
            checksum,
        };
        tpdu.data[..data.len()].copy_from_slice(data);
        Ok(tpdu)
    }

    /// Parse a complete serialized block.
    pub fn parse(bytes: &[u8], kind: ChecksumKind) -> Result<Self> {
        if bytes.len() < TPDU_PROLOGUE_LEN + kind.epilogue_len() {
            return Err(Error::InvalidLength {
                max: TPDU_MAX_LEN,
                actual: bytes.len(),
            });
        }
        let len = bytes[2] as usize;
        let expected = TPDU_PROLOGUE_LEN + len + kind.epilogue_len();
        if bytes.len() != expected {
            return Err(Error::InvalidLength {
                max: expected,
                actual: bytes.len(),
            });
        }
        let epilogue = &bytes[TPDU_PROLOGUE_LEN + len..];
        let checksum = match kind {
            ChecksumKind::Lrc => epilogue[0] as u16,
            ChecksumKind::Crc => u16::from_le_bytes([epilogue[0], epilogue[1]]),
        };
        Self::from_wire(
            bytes[0],
            bytes[1],
            &bytes[TPDU_PROLOGUE_LEN..TPDU_PROLOGUE_LEN + len],
            checksum,
        )
    }

    /// Serialize into a caller-provided buffer; returns the serialized length.
    pub fn serialize_into(&self, out: &mut [u8; TPDU_MAX_LEN], kind: ChecksumKind) -> usize {
        out[0] = self.nad;
        out[1] = self.pcb;
        out[2] = self.len;
        let len = self.len as usize;
        out[TPDU_PROLOGUE_LEN..TPDU_PROLOGUE_LEN + len].copy_from_slice(&self.data[..len]);
        let mut at = TPDU_PROLOGUE_LEN + len;
        match kind {
            ChecksumKind::Lrc => {
                out[at] = self.checksum as u8;
                at += 1;
            }
            ChecksumKind::Crc => {
                let bytes = self.checksum.to_le_bytes();
                out[at] = bytes[0];
                out[at + 1] = bytes[1];
                at += 2;
            }
        }
        at
    }

    /// Serialize into a fresh vector. Convenient for tests and log output.
    pub fn to_bytes(&self, kind: ChecksumKind) -> Vec<u8> {
        let mut buf = [0u8; TPDU_MAX_LEN];
        let n = self.serialize_into(&mut buf, kind);
        buf[..n].to_vec()
    }

    /// Compute the checksum over prologue + data.
    fn compute_checksum(&self, kind: ChecksumKind) -> u16 {
        let mut buf = [0u8; TPDU_MAX_LEN];
        buf[0] = self.nad;
        buf[1] = self.pcb;
        buf[2] = self.len;
        let len = self.len as usize;
        buf[TPDU_PROLOGUE_LEN..TPDU_PROLOGUE_LEN + len].copy_from_slice(&self.data[..len]);
        let covered = &buf[..TPDU_PROLOGUE_LEN + len];
        match kind {
            ChecksumKind::Lrc => lrc(covered) as u16,
            ChecksumKind::Crc => crc16(covered),
        }
    }

    /// Whether the stored checksum matches a fresh computation.
    pub fn checksum_ok(&self, kind: ChecksumKind) -> bool {
        self.compute_checksum(kind) == self.checksum
    }

    /// The data field.
    pub fn data(&self) -> &[u8] {
        &self.data[..self.len as usize]
    }

    /// The LEN field.
    pub fn len(&self) -> u8 {
        self.len
    }

    /// Whether the block carries no data.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The stored epilogue value.
    pub fn checksum(&self) -> u16 {
        self.checksum
    }

    /// Classify the block from its PCB bit pattern.
    pub fn kind(&self) -> TpduKind {
        classify(self.pcb)
    }
}

/// Classify a PCB into I, R or S per the T=1 bit patterns.
pub fn classify(pcb: u8) -> TpduKind {
    if pcb & 0x80 == 0 {
        TpduKind::I {
            ns: (pcb >> 6) & 1,
            more: pcb & PCB_I_MORE_BIT != 0,
        }
    } else if pcb & 0xC0 == PCB_R_BASE {
        let error = match pcb & 0b11 {
            0b00 => RError::ErrorFree,
            0b01 => RError::ChecksumError,
            _ => RError::OtherError,
        };
        TpduKind::R {
            nr: (pcb >> 4) & 1,
            error,
        }
    } else {
        let kind = match pcb & 0x1F {
            0x00 => SBlockKind::Resynch,
            0x01 => SBlockKind::Ifs,
            0x02 => SBlockKind::Abort,
            0x03 => SBlockKind::Wtx,
            0x0F => SBlockKind::SoftReset,
            other => SBlockKind::Unknown(other),
        };
        TpduKind::S {
            kind,
            response: pcb & PCB_S_RESPONSE_BIT != 0,
        }
    }
}

impl PartialEq for Tpdu {
    fn eq(&self, other: &Self) -> bool {
        self.nad == other.nad
            && self.pcb == other.pcb
            && self.checksum == other.checksum
            && self.data() == other.data()
    }
}

impl Eq for Tpdu {}

impl fmt::Debug for Tpdu {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tpdu")
            .field("nad", &format_args!("{:#04x}", self.nad))
            .field("pcb", &format_args!("{:#04x}", self.pcb))
            .field("len", &self.len)
            .field("data", &crate::utils::bytes_to_hex(self.data()))
            .field("checksum", &format_args!("{:#06x}", self.checksum))
            .finish()
    }
}
