//! The T=1 protocol engine: sequence numbers, chaining, supervisory dialogs
//! and the staged recovery escalation.

use std::fs;
use std::path::PathBuf;

use tracing::{debug, error, warn};

use crate::atp::Atp;
use crate::constants::{
    DEFAULT_ATP_CACHE_PATH, DEFAULT_IFSD, DEFAULT_NBWT, NAD_HOST_TO_SE, PCB_I_NS_BIT,
    PCB_S_ABORT_REQ, PCB_S_ABORT_RESP, PCB_S_IFS_REQ, PCB_S_IFS_RESP, PCB_S_RESPONSE_BIT,
    PCB_S_RESYNCH_REQ, PCB_S_RESYNCH_RESP, PCB_S_SWRESET_REQ, PCB_S_SWRESET_RESP, PCB_S_WTX_REQ,
    PCB_S_WTX_RESP, TPDU_MAX_DATA_LEN,
};
use crate::protocol::comm;
use crate::protocol::tpdu::{i_block_pcb, r_block_pcb, RError, Tpdu, TpduKind};
use crate::transport::Link;
use crate::{Error, Result};

/// Recovery escalation pointer. Transitions are total; the separate
/// `first_transmission` flag decides whether the resend stage escalates to a
/// resynchronization or straight to a warm reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum Recovery {
    Ok,
    Resend1,
    Resend2,
    Resync1,
    Resync2,
    Resync3,
    WarmReset,
}

/// Engine parameters supplied by the layer above.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Location of the cached raw ATP. Presence skips the on-wire read;
    /// a warm reset deletes it.
    pub atp_cache: PathBuf,
    /// Block-wait-time multiplier for ordinary exchanges.
    pub nbwt: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            atp_cache: PathBuf::from(DEFAULT_ATP_CACHE_PATH),
            nbwt: DEFAULT_NBWT,
        }
    }
}

/// Outcome of a single APDU fragment exchange.
#[derive(Debug)]
pub struct PartExchange {
    /// Response bytes; present once the final command fragment was sent or a
    /// response fragment was solicited.
    pub data: Option<Vec<u8>>,
    /// The card announced more response fragments via the chaining bit.
    pub more: bool,
}

/// Flow decision after processing an R-block.
enum RBlockFlow {
    /// The card acknowledged our chained fragment; the caller sends the next.
    Acknowledged,
    /// A block was retransmitted; carry its answer back into the loop.
    Retried(Option<Tpdu>),
}

/// One T=1 link endpoint. Owns the byte link, the ATP parameters and all
/// protocol state; one outstanding APDU at a time.
pub struct Engine {
    link: Box<dyn Link>,
    atp: Atp,
    config: EngineConfig,
    ns_master: u8,
    ns_slave: u8,
    ifsd: u8,
    recovery: Recovery,
    first_transmission: bool,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("atp", &self.atp)
            .field("config", &self.config)
            .field("ns_master", &self.ns_master)
            .field("ns_slave", &self.ns_slave)
            .field("ifsd", &self.ifsd)
            .field("recovery", &self.recovery)
            .field("first_transmission", &self.first_transmission)
            .finish()
    }
}

impl Engine {
    /// Bring the link up: load the cached ATP if present, otherwise run the
    /// reset dialog and cache the result; then reset all protocol state.
    pub fn init(mut link: Box<dyn Link>, config: EngineConfig) -> Result<Self> {
        let atp = if config.atp_cache.exists() {
            Atp::load(&config.atp_cache)?
        } else {
            debug!(path = %config.atp_cache.display(), "no cached atp, reading from the card");
            let (atp, raw) = comm::read_atp(link.as_mut())?;
            Atp::store(&config.atp_cache, &raw);
            atp
        };
        if atp.msf_khz > 0 {
            link.set_clock_khz(u32::from(atp.msf_khz))?;
        }
        debug!(
            ifsc = atp.ifsc,
            bwt_ms = atp.bwt_ms,
            checksum = ?atp.checksum,
            "t=1 engine initialized"
        );
        Ok(Self::with_parts(link, atp, config))
    }

    /// Build an engine around an already-parsed ATP. Primarily intended for
    /// tests and for callers that manage the parameter record themselves.
    pub fn with_parts(link: Box<dyn Link>, atp: Atp, config: EngineConfig) -> Self {
        Self {
            link,
            atp,
            config,
            ns_master: 0,
            ns_slave: 0,
            ifsd: DEFAULT_IFSD,
            recovery: Recovery::Ok,
            first_transmission: true,
        }
    }

    /// The active link parameters.
    pub fn atp(&self) -> &Atp {
        &self.atp
    }

    #[doc(hidden)]
    pub fn sequence_numbers(&self) -> (u8, u8) {
        (self.ns_master, self.ns_slave)
    }

    /// Exchange a complete APDU: fragment the command at the card's IFSC,
    /// then concatenate chained response fragments until the card clears the
    /// chaining bit.
    pub fn transceive_apdu(&mut self, cmd: &[u8]) -> Result<Vec<u8>> {
        let mut response = Vec::new();
        let mut offset = 0;

        let mut more = loop {
            // Re-evaluated every round: an IFS request may have shrunk the
            // card's information field mid-command.
            let chunk = (self.atp.ifsc as usize).min(TPDU_MAX_DATA_LEN);
            let remaining = cmd.len() - offset;
            let take = remaining.min(chunk);
            let is_last = remaining <= chunk;
            let part = self.transceive_apdu_part(&cmd[offset..offset + take], is_last)?;
            offset += take;
            if is_last {
                if let Some(data) = part.data {
                    response.extend_from_slice(&data);
                }
                break part.more;
            }
        };

        while more {
            let part = self.transceive_apdu_part(&[], true)?;
            if let Some(data) = part.data {
                response.extend_from_slice(&data);
            }
            more = part.more;
        }

        Ok(response)
    }

    /// Send one APDU fragment (an empty fragment solicits the card's next
    /// chained response block) and drive the protocol until the exchange
    /// settles or fails terminally.
    pub fn transceive_apdu_part(&mut self, part: &[u8], is_last: bool) -> Result<PartExchange> {
        let mut original = self.form_command_tpdu(part, is_last)?;
        self.recovery = Recovery::Ok;
        let mut last_sent = original.clone();

        let first = self.exchange(&last_sent, self.config.nbwt)?;
        let response = self.handle_response(&mut original, &mut last_sent, first)?;

        let data = if is_last || part.is_empty() {
            Some(response.data().to_vec())
        } else {
            None
        };
        let more = matches!(response.kind(), TpduKind::I { more: true, .. });
        Ok(PartExchange { data, more })
    }

    /// An I-block for command data, an R-block solicitation when there is
    /// none.
    fn form_command_tpdu(&self, part: &[u8], is_last: bool) -> Result<Tpdu> {
        if part.is_empty() {
            Tpdu::form(
                NAD_HOST_TO_SE,
                r_block_pcb(self.ns_slave, RError::ErrorFree),
                &[],
                self.atp.checksum,
            )
        } else {
            Tpdu::form(
                NAD_HOST_TO_SE,
                i_block_pcb(self.ns_master, !is_last),
                part,
                self.atp.checksum,
            )
        }
    }

    fn exchange(&mut self, tpdu: &Tpdu, nbwt: u32) -> Result<Option<Tpdu>> {
        comm::transceive(self.link.as_mut(), tpdu, nbwt, &self.atp)
    }

    /// Iterate over received blocks until the exchange terminates: recover
    /// on silence or inconsistency, dispatch I/R/S blocks, and return the
    /// block that settles the fragment.
    fn handle_response(
        &mut self,
        original: &mut Tpdu,
        last_sent: &mut Tpdu,
        mut last_resp: Option<Tpdu>,
    ) -> Result<Tpdu> {
        loop {
            let response = match last_resp.take() {
                None => {
                    debug!("no response within the block waiting time");
                    last_resp = self.do_recovery(last_sent)?;
                    continue;
                }
                Some(response) => {
                    self.first_transmission = false;
                    response
                }
            };

            if let Err(reason) = self.check_consistency(last_sent, &response) {
                debug!(reason, "inconsistent block");
                last_resp = self.do_recovery(last_sent)?;
                continue;
            }

            self.recovery = Recovery::Ok;

            match response.kind() {
                TpduKind::I { .. } => {
                    if matches!(original.kind(), TpduKind::I { .. }) {
                        self.ns_master ^= 1;
                    }
                    self.ns_slave ^= 1;
                    return Ok(response);
                }
                TpduKind::R { nr, .. } => match self.process_r_block(original, last_sent, nr)? {
                    RBlockFlow::Acknowledged => return Ok(response),
                    RBlockFlow::Retried(next) => {
                        last_resp = next;
                        continue;
                    }
                },
                TpduKind::S { .. } => {
                    last_resp = self.process_s_block(original, last_sent, &response)?;
                    continue;
                }
            }
        }
    }

    /// The ordered consistency checks applied to every received block.
    fn check_consistency(
        &self,
        last_sent: &Tpdu,
        response: &Tpdu,
    ) -> std::result::Result<(), &'static str> {
        if !response.checksum_ok(self.atp.checksum) {
            return Err("checksum mismatch");
        }

        match response.kind() {
            TpduKind::I { ns, .. } => {
                if response.pcb & 0b0001_1111 != 0 {
                    return Err("reserved bits set in an i-block pcb");
                }
                if response.len() > self.ifsd {
                    return Err("i-block longer than the announced ifsd");
                }
                if ns != self.ns_slave {
                    return Err("unexpected send sequence number");
                }
            }
            TpduKind::R { .. } => {
                if response.pcb & 0b0110_1100 != 0 {
                    return Err("reserved bits set in an r-block pcb");
                }
                if response.len() != 0 {
                    return Err("r-block carrying data");
                }
            }
            TpduKind::S { .. } => {
                if response.pcb & 0b0001_0000 != 0 {
                    return Err("reserved bit set in an s-block pcb");
                }
                match response.pcb {
                    PCB_S_WTX_REQ | PCB_S_WTX_RESP | PCB_S_IFS_REQ | PCB_S_IFS_RESP => {
                        if response.len() != 1 {
                            return Err("wtx/ifs block without a one-byte payload");
                        }
                    }
                    PCB_S_ABORT_REQ | PCB_S_ABORT_RESP | PCB_S_RESYNCH_REQ
                    | PCB_S_RESYNCH_RESP => {
                        if response.len() != 0 {
                            return Err("abort/resynch block carrying data");
                        }
                    }
                    _ => {}
                }
            }
        }

        // A reply to one of our S requests must be the matching response.
        if matches!(
            last_sent.pcb,
            PCB_S_RESYNCH_REQ | PCB_S_IFS_REQ | PCB_S_ABORT_REQ | PCB_S_WTX_REQ | PCB_S_SWRESET_REQ
        ) && response.pcb != last_sent.pcb | PCB_S_RESPONSE_BIT
        {
            return Err("reply does not match the pending s request");
        }

        Ok(())
    }

    /// R-block dispatch: acknowledgements advance the send sequence, stale
    /// or resend-soliciting blocks trigger a retransmission.
    fn process_r_block(
        &mut self,
        original: &Tpdu,
        last_sent: &mut Tpdu,
        nr: u8,
    ) -> Result<RBlockFlow> {
        let chained = matches!(original.kind(), TpduKind::I { more: true, .. });
        if chained {
            if nr == (self.ns_master + 1) % 2 {
                // Fragment acknowledged; an ack advances the sequence exactly
                // once however often the block was delivered.
                self.ns_master ^= 1;
                Ok(RBlockFlow::Acknowledged)
            } else {
                debug!("stale acknowledgement, retransmitting the chained block");
                let next = self.exchange(original, self.config.nbwt)?;
                Ok(RBlockFlow::Retried(next))
            }
        } else if nr == self.ns_master {
            debug!("card solicited a retransmission");
            let next = self.exchange(original, self.config.nbwt)?;
            Ok(RBlockFlow::Retried(next))
        } else {
            debug!("unexpected r-block, requesting a resend");
            let next = self.send_resend_request(last_sent)?;
            Ok(RBlockFlow::Retried(next))
        }
    }

    /// S-block dispatch: answer card-initiated dialogs, complete our own.
    fn process_s_block(
        &mut self,
        original: &mut Tpdu,
        last_sent: &mut Tpdu,
        response: &Tpdu,
    ) -> Result<Option<Tpdu>> {
        match response.pcb {
            PCB_S_WTX_REQ => {
                let mult = response.data()[0];
                debug!(mult, "waiting time extension requested");
                *last_sent = self.form_s_response(response)?;
                // A zero multiplier would collapse the window; restore the
                // default as the original driver does.
                let nbwt = if mult == 0 {
                    self.config.nbwt
                } else {
                    u32::from(mult)
                };
                self.exchange(last_sent, nbwt)
            }
            PCB_S_IFS_REQ => {
                let ifsc = response.data()[0];
                if ifsc == 0 {
                    return Err(Error::Consistency("ifs request with a zero field size"));
                }
                debug!(ifsc, "information field size renegotiated");
                self.atp.ifsc = ifsc;
                *last_sent = self.form_s_response(response)?;
                self.exchange(last_sent, self.config.nbwt)
            }
            PCB_S_RESYNCH_REQ => {
                debug!("resynchronization requested by the card");
                self.reset_sequence_numbers();
                *last_sent = self.form_s_response(response)?;
                self.exchange(last_sent, self.config.nbwt)
            }
            PCB_S_RESYNCH_RESP => {
                debug!("resynchronization acknowledged, retransmitting");
                self.reset_sequence_numbers();
                // The retransmitted block restarts the sequence at zero.
                if let TpduKind::I { ns: 1, .. } = original.kind() {
                    *original = Tpdu::form(
                        original.nad,
                        original.pcb & !PCB_I_NS_BIT,
                        original.data(),
                        self.atp.checksum,
                    )?;
                }
                let next = self.exchange(original, self.config.nbwt)?;
                *last_sent = original.clone();
                Ok(next)
            }
            PCB_S_SWRESET_RESP => {
                warn!("software reset answered, adopting the new parameters");
                self.atp = Atp::parse(response.data())?;
                self.reset_sequence_numbers();
                Err(Error::Reset)
            }
            PCB_S_ABORT_REQ => {
                error!("abort requested by the card");
                Err(Error::Abort)
            }
            _ => Err(Error::Consistency("unsupported supervisory block")),
        }
    }

    fn form_s_response(&self, request: &Tpdu) -> Result<Tpdu> {
        Tpdu::form(
            NAD_HOST_TO_SE,
            request.pcb | PCB_S_RESPONSE_BIT,
            request.data(),
            self.atp.checksum,
        )
    }

    fn reset_sequence_numbers(&mut self) {
        self.ns_master = 0;
        self.ns_slave = 0;
    }

    /// Advance the escalation and run its stage. `Ok(next)` carries the
    /// answer to the recovery block back into the handle loop; the warm
    /// reset stage terminates the APDU unconditionally.
    fn do_recovery(&mut self, last_sent: &mut Tpdu) -> Result<Option<Tpdu>> {
        warn!("entering recovery");
        self.advance_recovery();
        match self.recovery {
            Recovery::Resend1 | Recovery::Resend2 => self.send_resend_request(last_sent),
            Recovery::Resync1 | Recovery::Resync2 | Recovery::Resync3 => {
                *last_sent = Tpdu::form(
                    NAD_HOST_TO_SE,
                    PCB_S_RESYNCH_REQ,
                    &[],
                    self.atp.checksum,
                )?;
                self.exchange(last_sent, self.config.nbwt)
            }
            Recovery::WarmReset => {
                // The card is presumed dead; force the next init to re-read
                // the ATP from the wire.
                match fs::remove_file(&self.config.atp_cache) {
                    Ok(()) => debug!("atp cache deleted"),
                    Err(err) => debug!(%err, "unable to delete the atp cache"),
                }
                debug!("soft reset required");
                if let Ok(request) =
                    Tpdu::form(NAD_HOST_TO_SE, PCB_S_SWRESET_REQ, &[], self.atp.checksum)
                {
                    *last_sent = request;
                    let _ = self.exchange(last_sent, self.config.nbwt);
                }
                Err(Error::Reset)
            }
            Recovery::Ok => unreachable!("recovery advanced out of the ok state"),
        }
    }

    fn send_resend_request(&mut self, last_sent: &mut Tpdu) -> Result<Option<Tpdu>> {
        *last_sent = Tpdu::form(
            NAD_HOST_TO_SE,
            r_block_pcb(self.ns_slave, RError::OtherError),
            &[],
            self.atp.checksum,
        )?;
        self.exchange(last_sent, self.config.nbwt)
    }

    fn advance_recovery(&mut self) {
        use Recovery::*;
        self.recovery = match self.recovery {
            Ok => {
                debug!("recovery: ok -> resend 1");
                Resend1
            }
            Resend1 => {
                debug!("recovery: resend 1 -> resend 2");
                Resend2
            }
            Resend2 => {
                if self.first_transmission {
                    debug!("recovery: resend 2 -> warm reset");
                    WarmReset
                } else {
                    debug!("recovery: resend 2 -> resynch 1");
                    Resync1
                }
            }
            Resync1 => {
                debug!("recovery: resynch 1 -> resynch 2");
                Resync2
            }
            Resync2 => {
                debug!("recovery: resynch 2 -> resynch 3");
                Resync3
            }
            Resync3 => {
                debug!("recovery: resynch 3 -> warm reset");
                WarmReset
            }
            WarmReset => WarmReset,
        };
    }
}
