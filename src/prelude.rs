//! Convenience re-exports of the types most consumers need.

pub use crate::atp::{Atp, ChecksumKind};
pub use crate::protocol::engine::{Engine, EngineConfig, PartExchange};
pub use crate::protocol::tpdu::{Tpdu, TpduKind};
pub use crate::se::{LogicalChannelResponse, SeConfig, SeStatus, SecureElement, StatusWord};
pub use crate::transport::Link;
pub use crate::{Error, Result};

#[cfg(feature = "spi")]
pub use crate::transport::SpiLink;

// Re-export small utilities for convenience
pub use crate::utils::{bytes_to_hex, bytes_to_hex_spaced};
