//! ISO 7816-3 T=1 block protocol: checksums, block codec, block-layer
//! exchange and the protocol engine.

pub mod checksum;
pub mod comm;
pub mod engine;
pub mod tpdu;

pub use engine::{Engine, EngineConfig, PartExchange};
pub use tpdu::{Tpdu, TpduKind};
