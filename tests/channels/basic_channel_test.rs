use libese::protocol::checksum::crc16;
use libese::se::SeStatus;
use libese::test_support::mock_secure_element;
use libese::transport::mock::MockLink;

use crate::common::fixtures::{sample_aid, select_ok_frame, sw_frame};

#[test]
fn basic_select_success() {
    let dir = tempfile::tempdir().unwrap();
    let mock = MockLink::new();
    mock.script_reply(select_ok_frame(0));
    let mut se = mock_secure_element(&mock, dir.path().join("atp.bin"));

    let (response, status) = se.open_basic_channel(&sample_aid(), 0x00);
    assert_eq!(status, SeStatus::Success);
    assert_eq!(response, vec![0x90, 0x00]);
    assert!(se.is_channel_open(0));
    assert_eq!(se.channel_count(), 1);

    // The SELECT went out as a single I-block with the exact wire bytes
    let sent = mock.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(
        &sent[0][..13],
        &[0x00, 0x00, 0x0A, 0x00, 0xA4, 0x04, 0x00, 0x05, 0xA0, 0x00, 0x00, 0x01, 0x51]
    );
    let crc = crc16(&sent[0][..13]);
    assert_eq!(&sent[0][13..], &crc.to_le_bytes());
}

#[test]
fn basic_select_no_such_applet() {
    let dir = tempfile::tempdir().unwrap();
    let mock = MockLink::new();
    mock.script_reply(sw_frame(0, 0x6A, 0x82));
    let mut se = mock_secure_element(&mock, dir.path().join("atp.bin"));

    let (response, status) = se.open_basic_channel(&sample_aid(), 0x00);
    assert_eq!(status, SeStatus::NoSuchElementError);
    assert!(response.is_empty());
    assert!(!se.is_channel_open(0));
    assert_eq!(se.channel_count(), 0);
}

#[test]
fn basic_select_p2_not_permitted() {
    let dir = tempfile::tempdir().unwrap();
    let mock = MockLink::new();
    mock.script_reply(sw_frame(0, 0x6A, 0x86));
    let mut se = mock_secure_element(&mock, dir.path().join("atp.bin"));

    let (_, status) = se.open_basic_channel(&sample_aid(), 0x0C);
    assert_eq!(status, SeStatus::UnsupportedOperation);
}

#[test]
fn repeated_basic_open_keeps_a_single_reference() {
    let dir = tempfile::tempdir().unwrap();
    let mock = MockLink::new();
    mock.script_reply(select_ok_frame(0));
    mock.script_reply(select_ok_frame(1));
    let mut se = mock_secure_element(&mock, dir.path().join("atp.bin"));

    se.open_basic_channel(&sample_aid(), 0x00);
    se.open_basic_channel(&sample_aid(), 0x00);
    assert_eq!(se.channel_count(), 1);
}

#[test]
fn dead_card_reports_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let mock = MockLink::new();
    let mut se = mock_secure_element(&mock, dir.path().join("atp.bin"));

    let (response, status) = se.open_basic_channel(&sample_aid(), 0x00);
    assert_eq!(status, SeStatus::IoError);
    assert!(response.is_empty());
}
