#![cfg(feature = "spi")]
//! Real SPI link over the Linux spidev character device.

use std::io::{Read, Write};
use std::path::Path;
use std::time::{Duration, Instant};

use spidev::{SpiModeFlags, Spidev, SpidevOptions};
use tracing::{debug, trace};

use crate::transport::traits::Link;
use crate::Result;

/// Minimum bus quiescence between a transmit and a receive (or the reverse).
/// A wire requirement of the half-duplex SPI interface, not a lock.
const MIN_GUARD: Duration = Duration::from_millis(1);

/// Bus clock used until the card has announced its nominal frequency.
const DEFAULT_CLOCK_HZ: u32 = 1_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Rx,
    Tx,
}

/// Half-duplex SPI link over a `/dev/spidevX.Y` character device,
/// SPI mode 0, 8 bits per word.
pub struct SpiLink {
    dev: Spidev,
    direction: Direction,
    last_io: Instant,
}

impl SpiLink {
    /// Open and configure the SPI device at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut dev = Spidev::open(path)?;
        let options = SpidevOptions::new()
            .bits_per_word(8)
            .max_speed_hz(DEFAULT_CLOCK_HZ)
            .mode(SpiModeFlags::SPI_MODE_0)
            .build();
        dev.configure(&options)?;
        debug!(path = %path.display(), "opened spi device");
        Ok(Self {
            dev,
            direction: Direction::Rx,
            last_io: Instant::now(),
        })
    }

    /// Sleep out the remainder of the guard time when the bus changes
    /// direction.
    fn switch_direction(&mut self, direction: Direction) {
        if self.direction == direction {
            return;
        }
        self.direction = direction;
        let elapsed = self.last_io.elapsed();
        if elapsed < MIN_GUARD {
            let wait = MIN_GUARD - elapsed;
            trace!(?wait, ?direction, "guard time before direction switch");
            std::thread::sleep(wait);
        }
    }
}

impl Link for SpiLink {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.switch_direction(Direction::Rx);
        let n = self.dev.read(buf)?;
        self.last_io = Instant::now();
        Ok(n)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        self.switch_direction(Direction::Tx);
        trace!(tx = %crate::utils::bytes_to_hex_spaced(buf), "spi write");
        let n = self.dev.write(buf)?;
        self.last_io = Instant::now();
        Ok(n)
    }

    fn set_clock_khz(&mut self, khz: u32) -> Result<()> {
        let options = SpidevOptions::new().max_speed_hz(khz * 1000).build();
        self.dev.configure(&options)?;
        debug!(khz, "spi clock reconfigured");
        Ok(())
    }
}
