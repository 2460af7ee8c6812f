//! Wire-level constants shared across the crate.

/// NAD byte for host-to-secure-element blocks.
pub const NAD_HOST_TO_SE: u8 = 0x00;

/// NAD byte announced by the secure element; frame recognition keys on it.
pub const NAD_SE_TO_HOST: u8 = 0x12;

/// NAD, PCB and LEN.
pub const TPDU_PROLOGUE_LEN: usize = 3;

/// Maximum data bytes a single T=1 block can carry.
pub const TPDU_MAX_DATA_LEN: usize = 254;

/// Prologue + max data + 2-byte CRC epilogue.
pub const TPDU_MAX_LEN: usize = 259;

/// I-block send-sequence bit, N(S).
pub const PCB_I_NS_BIT: u8 = 0x40;

/// I-block more-blocks (chaining) bit.
pub const PCB_I_MORE_BIT: u8 = 0x20;

/// Base pattern of an R-block PCB.
pub const PCB_R_BASE: u8 = 0x80;

/// R-block receive-sequence bit, N(R).
pub const PCB_R_NR_BIT: u8 = 0x10;

/// Bit distinguishing an S-block response from the matching request.
pub const PCB_S_RESPONSE_BIT: u8 = 0x20;

/// S-block resynchronization request.
pub const PCB_S_RESYNCH_REQ: u8 = 0xC0;
/// S-block resynchronization response.
pub const PCB_S_RESYNCH_RESP: u8 = 0xE0;
/// S-block information field size request.
pub const PCB_S_IFS_REQ: u8 = 0xC1;
/// S-block information field size response.
pub const PCB_S_IFS_RESP: u8 = 0xE1;
/// S-block abort request.
pub const PCB_S_ABORT_REQ: u8 = 0xC2;
/// S-block abort response.
pub const PCB_S_ABORT_RESP: u8 = 0xE2;
/// S-block waiting time extension request.
pub const PCB_S_WTX_REQ: u8 = 0xC3;
/// S-block waiting time extension response.
pub const PCB_S_WTX_RESP: u8 = 0xE3;
/// Vendor S-block software reset request.
pub const PCB_S_SWRESET_REQ: u8 = 0xCF;
/// Vendor S-block software reset response.
pub const PCB_S_SWRESET_RESP: u8 = 0xEF;

/// Host-announced information field size, set once at init time.
pub const DEFAULT_IFSD: u8 = 254;

/// Block-wait-time multiplier used for ordinary exchanges.
pub const DEFAULT_NBWT: u32 = 1;

/// Shortest APDU the channel manager will forward (CLA INS P1 P2 Lc/Le).
pub const MIN_APDU_LENGTH: usize = 5;

/// Number of channel slots: the basic channel plus three logical channels.
pub const MAX_CHANNELS: usize = 4;

/// Default location of the cached raw ATP blob.
pub const DEFAULT_ATP_CACHE_PATH: &str = "/data/atp.bin";

/// The card exposes an ATP rather than an ISO 7816-3 ATR, so the HAL
/// surface reports this fixed, compliant ATR instead.
pub const SYNTHETIC_ATR: [u8; 14] = [
    0x25, 0xd2, 0x76, 0x00, 0x01, 0x18, 0x06, 0x90, 0x32, 0x32, 0x2a, 0xf8, 0x01, 0xfe,
];

/// SELECT instruction byte.
pub const INS_SELECT: u8 = 0xA4;
/// SELECT P1: select by AID.
pub const P1_SELECT_BY_AID: u8 = 0x04;

/// MANAGE CHANNEL instruction byte.
pub const INS_MANAGE_CHANNEL: u8 = 0x70;
/// MANAGE CHANNEL P1: open.
pub const P1_MANAGE_CHANNEL_OPEN: u8 = 0x00;
/// MANAGE CHANNEL P1: close.
pub const P1_MANAGE_CHANNEL_CLOSE: u8 = 0x80;
