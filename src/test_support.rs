//! Test support helpers intended for use by unit and integration tests.
//!
//! These centralize the ATP fixture and the card-side frame builders so
//! tests across the crate and the tests/ directory speak the same bytes.

use std::path::PathBuf;

use crate::atp::{Atp, ChecksumKind};
use crate::constants::NAD_SE_TO_HOST;
use crate::protocol::engine::{Engine, EngineConfig};
use crate::protocol::tpdu::{i_block_pcb, r_block_pcb, RError, Tpdu};
use crate::se::{SeConfig, SecureElement};
use crate::transport::mock::MockLink;
use crate::transport::Link;

/// Raw ATP fixture: CRC checksum, IFSC/IFSD 254, BWT 2 ms (keeps timeout
/// paths fast), no clock announcement.
#[doc(hidden)]
pub fn test_atp_raw() -> Vec<u8> {
    vec![
        0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01, 0xFE, 0xFE, 0x00, 0x02, 0x00, 0x00,
    ]
}

/// Parsed form of [`test_atp_raw`].
#[doc(hidden)]
pub fn test_atp() -> Atp {
    Atp::parse(&test_atp_raw()).unwrap()
}

/// [`test_atp`] with a different card information field size.
#[doc(hidden)]
pub fn test_atp_with_ifsc(ifsc: u8) -> Atp {
    let mut raw = test_atp_raw();
    raw[7] = ifsc;
    Atp::parse(&raw).unwrap()
}

/// Engine config pointing the ATP cache at a path that never exists.
#[doc(hidden)]
pub fn test_engine_config() -> EngineConfig {
    EngineConfig {
        atp_cache: std::env::temp_dir().join("libese-test-atp-absent.bin"),
        nbwt: 1,
    }
}

/// Engine over a clone of the given mock link, with the test ATP.
#[doc(hidden)]
pub fn mock_engine(link: &MockLink) -> Engine {
    mock_engine_with(link, test_atp(), test_engine_config())
}

/// Engine over a clone of the given mock link with explicit parameters.
#[doc(hidden)]
pub fn mock_engine_with(link: &MockLink, atp: Atp, config: EngineConfig) -> Engine {
    Engine::with_parts(Box::new(link.clone()), atp, config)
}

/// Channel manager over clones of the given mock link. The ATP cache is
/// written at `atp_cache` so init skips the on-wire dialog.
#[doc(hidden)]
pub fn mock_secure_element(link: &MockLink, atp_cache: PathBuf) -> SecureElement {
    Atp::store(&atp_cache, &test_atp_raw());
    let config = SeConfig {
        spi_path: PathBuf::from("/dev/null"),
        engine: EngineConfig { atp_cache, nbwt: 1 },
    };
    let link = link.clone();
    SecureElement::with_link_opener(
        config,
        Box::new(move || Ok(Box::new(link.clone()) as Box<dyn Link>)),
    )
}

/// Serialized card-side I-block.
#[doc(hidden)]
pub fn i_frame(ns: u8, more: bool, data: &[u8]) -> Vec<u8> {
    Tpdu::form(NAD_SE_TO_HOST, i_block_pcb(ns, more), data, ChecksumKind::Crc)
        .unwrap()
        .to_bytes(ChecksumKind::Crc)
}

/// Serialized card-side R-block.
#[doc(hidden)]
pub fn r_frame(nr: u8, error: RError) -> Vec<u8> {
    Tpdu::form(NAD_SE_TO_HOST, r_block_pcb(nr, error), &[], ChecksumKind::Crc)
        .unwrap()
        .to_bytes(ChecksumKind::Crc)
}

/// Serialized card-side S-block with the given PCB and payload.
#[doc(hidden)]
pub fn s_frame(pcb: u8, payload: &[u8]) -> Vec<u8> {
    Tpdu::form(NAD_SE_TO_HOST, pcb, payload, ChecksumKind::Crc)
        .unwrap()
        .to_bytes(ChecksumKind::Crc)
}

/// Flip a bit in the epilogue so the checksum no longer matches.
#[doc(hidden)]
pub fn corrupt(mut frame: Vec<u8>) -> Vec<u8> {
    let last = frame.len() - 1;
    frame[last] ^= 0x01;
    frame
}
