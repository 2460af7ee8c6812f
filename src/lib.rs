//! libese
//!
//! Pure Rust host-side driver for SPI-attached embedded secure elements:
//! the ISO 7816-3 T=1 block protocol over a half-duplex SPI link, plus the
//! ISO 7816-4 logical channel management layered on top.
#![warn(missing_docs)]

pub mod atp;
pub mod constants;
pub mod error;
pub mod prelude;
pub mod protocol;
pub mod se;
pub mod test_support;
pub mod transport;
pub mod utils;

// Re-export the error type and common values at the crate root so consumers
// can use `libese::Error`, `libese::Result` and the prelude directly.
pub use crate::error::*;

pub use prelude::*;
