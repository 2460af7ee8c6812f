//! Block-layer exchange: serialize a block onto the link, poll for the
//! start-of-frame byte within the block waiting time, read the block back.

use std::io;
use std::time::{Duration, Instant};

use tracing::{debug, trace, warn};

use crate::atp::{Atp, ChecksumKind};
use crate::constants::{
    DEFAULT_NBWT, NAD_HOST_TO_SE, NAD_SE_TO_HOST, PCB_S_SWRESET_REQ, PCB_S_SWRESET_RESP,
    TPDU_MAX_DATA_LEN, TPDU_MAX_LEN,
};
use crate::protocol::tpdu::Tpdu;
use crate::transport::Link;
use crate::utils::bytes_to_hex_spaced;
use crate::{Error, Result};

/// Pause between polls for the start-of-frame byte.
const POLL_INTERVAL: Duration = Duration::from_micros(200);

/// Serialize and write a block. One write, no retry.
pub fn write_tpdu(link: &mut dyn Link, tpdu: &Tpdu, kind: ChecksumKind) -> Result<()> {
    let mut buf = [0u8; TPDU_MAX_LEN];
    let len = tpdu.serialize_into(&mut buf, kind);
    trace!(tx = %bytes_to_hex_spaced(&buf[..len]), "block out");
    let written = link.write(&buf[..len])?;
    if written != len {
        return Err(Error::Io(io::Error::new(
            io::ErrorKind::WriteZero,
            "short write on the spi link",
        )));
    }
    Ok(())
}

/// Poll the link for the card's NAD byte. `0x00` means the card is not ready
/// yet; anything else that is not the NAD is line noise and is skipped. Gives
/// up after `nbwt` block waiting times.
pub fn wait_for_response(link: &mut dyn Link, nbwt: u32, bwt_ms: u16) -> Result<bool> {
    let deadline = Instant::now() + Duration::from_millis(u64::from(nbwt) * u64::from(bwt_ms));
    loop {
        let mut byte = [0u8; 1];
        link.read(&mut byte)?;
        if byte[0] == NAD_SE_TO_HOST {
            return Ok(true);
        }
        if Instant::now() >= deadline {
            return Ok(false);
        }
        std::thread::sleep(POLL_INTERVAL);
    }
}

/// Read the remainder of a block whose NAD byte has already been consumed.
///
/// Returns `None` for a frame whose LEN field exceeds the 254-byte cap: the
/// advertised bytes are drained off the bus and recovery treats the exchange
/// as an absent response.
pub fn read_tpdu(link: &mut dyn Link, kind: ChecksumKind) -> Result<Option<Tpdu>> {
    let mut header = [0u8; 2];
    read_exact(link, &mut header)?;
    let (pcb, len) = (header[0], header[1] as usize);

    if len > TPDU_MAX_DATA_LEN {
        let mut scratch = [0u8; 257];
        read_exact(link, &mut scratch[..len + kind.epilogue_len()])?;
        warn!(len, "oversized length field, draining the frame");
        return Ok(None);
    }

    let mut data = [0u8; TPDU_MAX_DATA_LEN];
    read_exact(link, &mut data[..len])?;

    let mut epilogue = [0u8; 2];
    read_exact(link, &mut epilogue[..kind.epilogue_len()])?;
    let checksum = match kind {
        ChecksumKind::Lrc => epilogue[0] as u16,
        ChecksumKind::Crc => u16::from_le_bytes(epilogue),
    };

    let tpdu = Tpdu::from_wire(NAD_SE_TO_HOST, pcb, &data[..len], checksum)?;
    trace!(rx = %bytes_to_hex_spaced(&tpdu.to_bytes(kind)), "block in");
    Ok(Some(tpdu))
}

/// Send a block and wait for the card's answer.
///
/// `Ok(None)` means the block waiting time elapsed without a start-of-frame
/// byte; link failures surface as errors.
pub fn transceive(link: &mut dyn Link, cmd: &Tpdu, nbwt: u32, atp: &Atp) -> Result<Option<Tpdu>> {
    write_tpdu(link, cmd, atp.checksum)?;
    if !wait_for_response(link, nbwt, atp.bwt_ms)? {
        return Ok(None);
    }
    read_tpdu(link, atp.checksum)
}

/// Run the reset dialog that fetches the Answer-To-Protocol: a software
/// reset request answered by the matching response whose payload is the raw
/// parameter record. The dialog itself runs on conservative bootstrap
/// parameters since the real ones are not known yet.
pub fn read_atp(link: &mut dyn Link) -> Result<(Atp, Vec<u8>)> {
    let boot = Atp::bootstrap();
    let request = Tpdu::form(NAD_HOST_TO_SE, PCB_S_SWRESET_REQ, &[], boot.checksum)?;
    let response = match transceive(link, &request, DEFAULT_NBWT, &boot)? {
        Some(response) => response,
        None => return Err(Error::Timeout),
    };
    if response.pcb != PCB_S_SWRESET_RESP {
        return Err(Error::Consistency("expected a software reset response"));
    }
    if !response.checksum_ok(boot.checksum) {
        return Err(Error::Consistency("checksum mismatch on the reset response"));
    }
    let atp = Atp::parse(response.data())?;
    debug!(
        ifsc = atp.ifsc,
        bwt_ms = atp.bwt_ms,
        msf_khz = atp.msf_khz,
        "answer-to-protocol read from the card"
    );
    Ok((atp, response.data().to_vec()))
}

fn read_exact(link: &mut dyn Link, buf: &mut [u8]) -> Result<()> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = link.read(&mut buf[filled..])?;
        if n == 0 {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "spi link returned no bytes",
            )));
        }
        filled += n;
    }
    Ok(())
}
