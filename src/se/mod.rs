//! APDU channel manager: logical channel bookkeeping and the MANAGE CHANNEL
//! and SELECT dialogs layered over the T=1 engine.

use std::io;
use std::path::PathBuf;

use tracing::{debug, error, warn};

use crate::constants::{
    INS_MANAGE_CHANNEL, INS_SELECT, MAX_CHANNELS, MIN_APDU_LENGTH, P1_MANAGE_CHANNEL_CLOSE,
    P1_MANAGE_CHANNEL_OPEN, P1_SELECT_BY_AID, SYNTHETIC_ATR,
};
use crate::protocol::engine::{Engine, EngineConfig};
use crate::transport::Link;
use crate::{Error, Result};

mod status;
pub use status::{SeStatus, StatusWord};

/// Factory producing a fresh link each time the manager needs to bring the
/// interface up: at the first channel open and again after a teardown.
pub type LinkOpener = Box<dyn FnMut() -> Result<Box<dyn Link>>>;

/// Configuration of the secure element interface.
#[derive(Debug, Clone)]
pub struct SeConfig {
    /// SPI character device the default opener uses.
    pub spi_path: PathBuf,
    /// Engine parameters.
    pub engine: EngineConfig,
}

impl Default for SeConfig {
    fn default() -> Self {
        Self {
            spi_path: PathBuf::from("/dev/spidev0.0"),
            engine: EngineConfig::default(),
        }
    }
}

/// Result of a logical channel open.
#[derive(Debug)]
pub struct LogicalChannelResponse {
    /// Assigned channel number, `0xFF` when the open failed.
    pub channel_number: u8,
    /// SELECT response including the status word; empty on failure.
    pub select_response: Vec<u8>,
}

/// The secure element interface exposed upward: channel lifecycle and raw
/// APDU transport. The channel table refcounts the link: the first open
/// initializes it, closing the last channel tears it down.
pub struct SecureElement {
    config: SeConfig,
    opener: LinkOpener,
    engine: Option<Engine>,
    opened: [bool; MAX_CHANNELS],
    open_count: u8,
}

impl SecureElement {
    /// Interface over the configured SPI device.
    #[cfg(feature = "spi")]
    pub fn new(config: SeConfig) -> Self {
        let path = config.spi_path.clone();
        let opener: LinkOpener = Box::new(move || {
            Ok(Box::new(crate::transport::SpiLink::open(&path)?) as Box<dyn Link>)
        });
        Self::with_link_opener(config, opener)
    }

    /// Interface over caller-provided links. Primarily intended for tests
    /// and for alternative transports.
    pub fn with_link_opener(config: SeConfig, opener: LinkOpener) -> Self {
        Self {
            config,
            opener,
            engine: None,
            opened: [false; MAX_CHANNELS],
            open_count: 0,
        }
    }

    /// Bring the link and the T=1 engine up. Idempotent.
    pub fn init(&mut self) -> Result<()> {
        if self.engine.is_some() {
            return Ok(());
        }
        let link = (self.opener)()?;
        self.engine = Some(Engine::init(link, self.config.engine.clone())?);
        Ok(())
    }

    /// Whether the link is currently up.
    pub fn is_initialized(&self) -> bool {
        self.engine.is_some()
    }

    /// The card is soldered down; it is always present.
    pub fn is_card_present(&self) -> bool {
        true
    }

    /// The card answers with an ATP rather than an ATR, so a fixed compliant
    /// ATR is reported instead.
    pub fn atr(&self) -> Vec<u8> {
        SYNTHETIC_ATR.to_vec()
    }

    /// Number of open channels.
    pub fn channel_count(&self) -> u8 {
        self.open_count
    }

    /// Whether a given channel slot is open.
    pub fn is_channel_open(&self, channel: u8) -> bool {
        (channel as usize) < MAX_CHANNELS && self.opened[channel as usize]
    }

    /// SELECT an applet on the basic channel. Returns the SELECT response
    /// (with status word) on success, an empty vector otherwise.
    pub fn open_basic_channel(&mut self, aid: &[u8], p2: u8) -> (Vec<u8>, SeStatus) {
        if self.init().is_err() {
            error!("link initialization failed");
            return (Vec::new(), SeStatus::IoError);
        }

        let select = build_select(0, p2, aid);
        let response = match self.transceive(&select) {
            Ok(response) => response,
            Err(err) => {
                error!(%err, "select on the basic channel failed");
                return (Vec::new(), SeStatus::IoError);
            }
        };
        let Some(sw) = StatusWord::from_response(&response) else {
            return (Vec::new(), SeStatus::IoError);
        };

        let mut newly_opened = false;
        let status = match (sw.sw1, sw.sw2) {
            (0x90, 0x00) => {
                if !self.opened[0] {
                    self.opened[0] = true;
                    self.open_count += 1;
                    newly_opened = true;
                }
                SeStatus::Success
            }
            // No applet with this AID
            (0x6A, 0x82) => SeStatus::NoSuchElementError,
            // P2 not permitted by the applet
            (0x6A, 0x86) => SeStatus::UnsupportedOperation,
            _ => SeStatus::IoError,
        };

        if status != SeStatus::Success && newly_opened && self.close_channel(0) != SeStatus::Success
        {
            error!("failed to close the basic channel after a failed select");
        }

        if status == SeStatus::Success {
            (response, status)
        } else {
            (Vec::new(), status)
        }
    }

    /// MANAGE CHANNEL OPEN followed by SELECT on the assigned channel. On
    /// any failure after the open, the channel is closed again and the
    /// returned channel number stays `0xFF`.
    pub fn open_logical_channel(&mut self, aid: &[u8], p2: u8) -> (LogicalChannelResponse, SeStatus) {
        let mut out = LogicalChannelResponse {
            channel_number: 0xFF,
            select_response: Vec::new(),
        };

        if self.init().is_err() {
            error!("link initialization failed");
            return (out, SeStatus::IoError);
        }

        let open_cmd = [0x00, INS_MANAGE_CHANNEL, P1_MANAGE_CHANNEL_OPEN, 0x00, 0x01];
        let response = match self.transceive(&open_cmd) {
            Ok(response) => response,
            Err(err) => {
                error!(%err, "manage channel open failed");
                return (out, SeStatus::IoError);
            }
        };
        let Some(sw) = StatusWord::from_response(&response) else {
            return (out, SeStatus::IoError);
        };

        let status = match (sw.sw1, sw.sw2) {
            (0x90, 0x00) => {
                if response.len() < 3 {
                    error!("manage channel response too short to carry a channel number");
                    return (out, SeStatus::IoError);
                }
                let channel = response[0];
                if channel == 0 || (channel as usize) >= MAX_CHANNELS {
                    error!(channel, "card assigned an out-of-range channel number");
                    return (out, SeStatus::IoError);
                }
                debug!(channel, "logical channel opened");
                out.channel_number = channel;
                self.opened[channel as usize] = true;
                self.open_count += 1;
                SeStatus::Success
            }
            (0x6A, 0x81) => SeStatus::ChannelNotAvailable,
            (0x6E, 0x00) | (0x6D, 0x00) => SeStatus::UnsupportedOperation,
            _ => SeStatus::IoError,
        };
        if status != SeStatus::Success {
            return (out, status);
        }

        // SELECT on the fresh channel; its number rides in the class byte.
        let select = build_select(out.channel_number, p2, aid);
        let mut status = SeStatus::IoError;
        match self.transceive(&select) {
            Ok(response) => {
                if let Some(sw) = StatusWord::from_response(&response) {
                    match (sw.sw1, sw.sw2) {
                        (0x90, 0x00) => {
                            out.select_response = response;
                            status = SeStatus::Success;
                        }
                        (0x6A, 0x82) => status = SeStatus::NoSuchElementError,
                        (0x6A, 0x86) => status = SeStatus::UnsupportedOperation,
                        _ => {}
                    }
                }
            }
            Err(err) => error!(%err, "select on the logical channel failed"),
        }

        if status != SeStatus::Success {
            if self.close_channel(out.channel_number) != SeStatus::Success {
                error!(
                    channel = out.channel_number,
                    "failed to close the channel after a failed select"
                );
            }
            out.channel_number = 0xFF;
        }
        (out, status)
    }

    /// Forward a raw APDU unmodified. Anything shorter than a command header
    /// and errors of any kind yield an empty response, per the HAL contract.
    pub fn transmit(&mut self, apdu: &[u8]) -> Vec<u8> {
        if apdu.len() < MIN_APDU_LENGTH {
            warn!(len = apdu.len(), "apdu shorter than the minimum header");
            return Vec::new();
        }
        match self.transceive(apdu) {
            Ok(response) => response,
            Err(err) => {
                error!(%err, "transmit failed");
                Vec::new()
            }
        }
    }

    /// Close a channel. Logical channels are closed on the wire with MANAGE
    /// CHANNEL CLOSE; closing the basic channel only drops its reference.
    /// The last close tears the link down.
    pub fn close_channel(&mut self, channel: u8) -> SeStatus {
        let idx = channel as usize;
        if idx >= MAX_CHANNELS || !self.opened[idx] {
            error!(channel, "close of an invalid or unopened channel");
            return SeStatus::Failed;
        }

        let mut status = SeStatus::Failed;
        if channel > 0 {
            let close_cmd = [
                channel,
                INS_MANAGE_CHANNEL,
                P1_MANAGE_CHANNEL_CLOSE,
                channel,
                0x00,
            ];
            status = match self.transceive(&close_cmd) {
                Ok(response) => match StatusWord::from_response(&response) {
                    Some(sw) if sw.is_success() => SeStatus::Success,
                    _ => SeStatus::Failed,
                },
                Err(err) => {
                    error!(%err, "manage channel close failed");
                    SeStatus::Failed
                }
            };
        }

        if channel == 0 || status == SeStatus::Success {
            self.opened[idx] = false;
            self.open_count -= 1;
            debug!(channel, remaining = self.open_count, "channel closed");
            status = if self.open_count == 0 {
                self.teardown()
            } else {
                SeStatus::Success
            };
        }
        status
    }

    fn teardown(&mut self) -> SeStatus {
        debug!("last channel closed, shutting the link down");
        self.engine = None;
        self.opened = [false; MAX_CHANNELS];
        self.open_count = 0;
        SeStatus::Success
    }

    fn transceive(&mut self, cmd: &[u8]) -> Result<Vec<u8>> {
        let engine = self.engine.as_mut().ok_or_else(|| {
            Error::Io(io::Error::new(
                io::ErrorKind::NotConnected,
                "link not initialized",
            ))
        })?;
        engine.transceive_apdu(cmd)
    }
}

/// `CLA A4 04 P2 Lc AID...`; the channel number rides in the class byte.
fn build_select(channel: u8, p2: u8, aid: &[u8]) -> Vec<u8> {
    let mut cmd = Vec::with_capacity(5 + aid.len());
    cmd.push(channel);
    cmd.push(INS_SELECT);
    cmd.push(P1_SELECT_BY_AID);
    cmd.push(p2);
    cmd.push(aid.len() as u8);
    cmd.extend_from_slice(aid);
    cmd
}
