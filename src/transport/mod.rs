//! Byte-level link to the secure element.

pub mod mock;
pub mod spi;
pub mod traits;

pub use traits::Link;

#[cfg(feature = "spi")]
pub use spi::SpiLink;
