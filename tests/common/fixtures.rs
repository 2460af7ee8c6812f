// fixtures.rs — shared byte fixtures for the integration tests
#![allow(dead_code)]

use libese::test_support::i_frame;

/// AID used across the channel tests.
pub fn sample_aid() -> Vec<u8> {
    vec![0xA0, 0x00, 0x00, 0x01, 0x51]
}

/// Card I-block carrying only a status word.
pub fn sw_frame(ns: u8, sw1: u8, sw2: u8) -> Vec<u8> {
    i_frame(ns, false, &[sw1, sw2])
}

/// Card I-block answering a successful SELECT.
pub fn select_ok_frame(ns: u8) -> Vec<u8> {
    sw_frame(ns, 0x90, 0x00)
}

/// Card I-block answering MANAGE CHANNEL OPEN with a channel number.
pub fn manage_open_ok_frame(ns: u8, channel: u8) -> Vec<u8> {
    i_frame(ns, false, &[channel, 0x90, 0x00])
}
