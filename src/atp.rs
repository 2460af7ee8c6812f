//! Answer-To-Protocol parameters and their on-disk cache.
//!
//! The card answers a software reset with a small parameter record that fixes
//! the link timing and sizing for everything that follows. The raw bytes are
//! cached to a file so later boots skip the on-wire exchange; a warm reset
//! deletes the cache to force a fresh read.

use std::fs;
use std::path::Path;

use tracing::{debug, warn};

use crate::{Error, Result};

/// Epilogue algorithm declared by the card.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumKind {
    /// One-byte XOR.
    Lrc,
    /// Two-byte ISO 13239 CRC, little-endian on the wire.
    Crc,
}

impl ChecksumKind {
    /// Epilogue length in bytes.
    pub fn epilogue_len(self) -> usize {
        match self {
            ChecksumKind::Lrc => 1,
            ChecksumKind::Crc => 2,
        }
    }
}

/// Parsed Answer-To-Protocol record.
///
/// Read-only after init, except `ifsc` which the card may renegotiate with an
/// S(IFS) request mid-session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Atp {
    /// Protocol version byte, informational.
    pub pv: u8,
    /// Vendor identifier.
    pub vendor: [u8; 5],
    /// Epilogue algorithm for every block on the link.
    pub checksum: ChecksumKind,
    /// Maximum data bytes the card accepts per I-block.
    pub ifsc: u8,
    /// Information field size suggested for the host.
    pub ifsd: u8,
    /// Block waiting time in milliseconds.
    pub bwt_ms: u16,
    /// Nominal SPI clock in kHz.
    pub msf_khz: u16,
}

/// Minimum length of a raw ATP record.
pub const ATP_MIN_LEN: usize = 13;

impl Atp {
    /// Parse a raw ATP record.
    ///
    /// Layout: pv, vendor[5], checksum kind, ifsc, ifsd, bwt (u16 BE),
    /// msf (u16 BE). Trailing historical bytes are ignored.
    pub fn parse(raw: &[u8]) -> Result<Self> {
        if raw.len() < ATP_MIN_LEN {
            return Err(Error::InvalidAtp(format!(
                "record too short: {} bytes, need {}",
                raw.len(),
                ATP_MIN_LEN
            )));
        }
        let checksum = match raw[6] {
            0x00 => ChecksumKind::Lrc,
            0x01 => ChecksumKind::Crc,
            other => {
                return Err(Error::InvalidAtp(format!(
                    "unknown checksum kind {:#04x}",
                    other
                )))
            }
        };
        let ifsc = raw[7];
        if ifsc == 0 {
            return Err(Error::InvalidAtp("ifsc is zero".into()));
        }
        let bwt_ms = u16::from_be_bytes([raw[9], raw[10]]);
        if bwt_ms == 0 {
            return Err(Error::InvalidAtp("block waiting time is zero".into()));
        }
        let mut vendor = [0u8; 5];
        vendor.copy_from_slice(&raw[1..6]);
        Ok(Self {
            pv: raw[0],
            vendor,
            checksum,
            ifsc,
            ifsd: raw[8],
            bwt_ms,
            msf_khz: u16::from_be_bytes([raw[11], raw[12]]),
        })
    }

    /// Conservative parameters used only for the reset dialog that fetches
    /// the real ATP: CRC epilogues and a generous waiting time.
    pub fn bootstrap() -> Self {
        Self {
            pv: 0,
            vendor: [0u8; 5],
            checksum: ChecksumKind::Crc,
            ifsc: 254,
            ifsd: 254,
            bwt_ms: 200,
            msf_khz: 0,
        }
    }

    /// Load and parse the cached raw record.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read(path)?;
        debug!(path = %path.display(), len = raw.len(), "loaded cached atp");
        Self::parse(&raw)
    }

    /// Cache the raw record. A write failure is logged, not fatal: the only
    /// cost is re-reading the ATP on the next init.
    pub fn store(path: &Path, raw: &[u8]) {
        match fs::write(path, raw) {
            Ok(()) => debug!(path = %path.display(), "cached atp"),
            Err(err) => warn!(path = %path.display(), %err, "failed to cache atp"),
        }
    }
}
