use libese::se::SeStatus;
use libese::test_support::{i_frame, mock_secure_element};
use libese::transport::mock::MockLink;

use crate::common::fixtures::{sample_aid, select_ok_frame};

#[test]
fn transmit_forwards_the_apdu_unmodified() {
    let dir = tempfile::tempdir().unwrap();
    let mock = MockLink::new();
    mock.script_reply(select_ok_frame(0));
    mock.script_reply(i_frame(1, false, &[0x6F, 0x00, 0x90, 0x00]));
    let mut se = mock_secure_element(&mock, dir.path().join("atp.bin"));

    se.open_basic_channel(&sample_aid(), 0x00);

    // An APDU addressed to logical channel 2: the class byte low bits pass
    // through untouched
    let apdu = [0x02, 0xCA, 0x00, 0x45, 0x00];
    let response = se.transmit(&apdu);
    assert_eq!(response, vec![0x6F, 0x00, 0x90, 0x00]);

    let sent = mock.sent();
    assert_eq!(&sent[1][3..8], &apdu);
}

#[test]
fn short_apdu_yields_an_empty_response() {
    let dir = tempfile::tempdir().unwrap();
    let mock = MockLink::new();
    mock.script_reply(select_ok_frame(0));
    let mut se = mock_secure_element(&mock, dir.path().join("atp.bin"));

    se.open_basic_channel(&sample_aid(), 0x00);
    assert!(se.transmit(&[0x00, 0xA4, 0x04, 0x00]).is_empty());
    // Nothing beyond the select hit the wire
    assert_eq!(mock.sent().len(), 1);
}

#[test]
fn transmit_before_init_is_empty() {
    let dir = tempfile::tempdir().unwrap();
    let mock = MockLink::new();
    let mut se = mock_secure_element(&mock, dir.path().join("atp.bin"));
    assert!(se.transmit(&[0x00, 0xA4, 0x04, 0x00, 0x00]).is_empty());
}

#[test]
fn engine_failure_during_transmit_is_empty_but_recoverable() {
    let dir = tempfile::tempdir().unwrap();
    let mock = MockLink::new();
    mock.script_reply(select_ok_frame(0));
    let mut se = mock_secure_element(&mock, dir.path().join("atp.bin"));

    let (_, status) = se.open_basic_channel(&sample_aid(), 0x00);
    assert_eq!(status, SeStatus::Success);

    // The card goes silent: the transmit fails over the warm reset path and
    // the caller sees an empty response
    assert!(se.transmit(&[0x00, 0xB0, 0x00, 0x00, 0x00]).is_empty());
    assert!(se.is_initialized());
}
