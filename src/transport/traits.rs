//! The link abstraction the protocol layers are written against.

use crate::Result;

/// Half-duplex byte pipe to the secure element.
///
/// Implementations own the bus-quiescence rules of the underlying wire (the
/// SPI transport sleeps out the guard time on direction changes); callers
/// just read and write bytes.
pub trait Link {
    /// Read up to `buf.len()` bytes. May block.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Write `buf` to the bus. May block.
    fn write(&mut self, buf: &[u8]) -> Result<usize>;

    /// Reconfigure the bus clock once the card's nominal frequency is known.
    /// Default implementation ignores the request so transports without a
    /// configurable clock keep working.
    fn set_clock_khz(&mut self, _khz: u32) -> Result<()> {
        Ok(())
    }
}
