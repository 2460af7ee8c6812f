use libese::protocol::tpdu::RError;
use libese::test_support::{i_frame, mock_engine_with, r_frame, test_atp_with_ifsc, test_engine_config};
use libese::transport::mock::MockLink;

#[test]
fn long_command_is_fragmented_at_the_ifsc() {
    // 300-byte command against IFSC 128 splits into 128 + 128 + 44
    let mock = MockLink::new();
    mock.script_reply(r_frame(1, RError::ErrorFree));
    mock.script_reply(r_frame(0, RError::ErrorFree));
    mock.script_reply(i_frame(0, false, &[0x90, 0x00]));
    let mut engine = mock_engine_with(&mock, test_atp_with_ifsc(128), test_engine_config());

    let cmd: Vec<u8> = (0..300).map(|i| (i & 0xFF) as u8).collect();
    let response = engine.transceive_apdu(&cmd).unwrap();
    assert_eq!(response, vec![0x90, 0x00]);

    let sent = mock.sent();
    assert_eq!(sent.len(), 3);
    // First two fragments chain with alternating N(S), the last one does not
    assert_eq!(sent[0][..3], [0x00, 0x20, 128]);
    assert_eq!(sent[1][..3], [0x00, 0x60, 128]);
    assert_eq!(sent[2][..3], [0x00, 0x00, 44]);
    // The data splits cleanly across the fragments
    assert_eq!(sent[0][3..3 + 128], cmd[..128]);
    assert_eq!(sent[1][3..3 + 128], cmd[128..256]);
    assert_eq!(sent[2][3..3 + 44], cmd[256..]);
}

#[test]
fn chained_response_is_reassembled() {
    let mock = MockLink::new();
    mock.script_reply(i_frame(0, true, &[0xAA; 32]));
    mock.script_reply(i_frame(1, false, &[0xBB, 0x90, 0x00]));
    let mut engine = mock_engine_with(&mock, test_atp_with_ifsc(254), test_engine_config());

    let response = engine.transceive_apdu(&[0x00, 0xB0, 0x00, 0x00, 0x00]).unwrap();
    let mut expected = vec![0xAA; 32];
    expected.extend_from_slice(&[0xBB, 0x90, 0x00]);
    assert_eq!(response, expected);

    let sent = mock.sent();
    assert_eq!(sent.len(), 2);
    // The second block solicits the pending fragment: R(N(R)=1), error-free
    assert_eq!(sent[1][..3], [0x00, 0x90, 0x00]);
}

#[test]
fn duplicate_acknowledgement_does_not_double_advance() {
    // A stale R(N(R)) forces one retransmission; the sequence number still
    // advances exactly once when the real acknowledgement arrives.
    let mock = MockLink::new();
    mock.script_reply(r_frame(0, RError::ErrorFree));
    mock.script_reply(r_frame(1, RError::ErrorFree));
    let mut engine = mock_engine_with(&mock, test_atp_with_ifsc(254), test_engine_config());

    let part = engine.transceive_apdu_part(&[0x11; 16], false).unwrap();
    assert!(part.data.is_none());
    assert!(!part.more);
    assert_eq!(engine.sequence_numbers().0, 1);

    let sent = mock.sent();
    assert_eq!(sent.len(), 2);
    // The same chained I-block went out twice, byte for byte
    assert_eq!(sent[0], sent[1]);
    assert_eq!(sent[0][..3], [0x00, 0x20, 16]);
}

#[test]
fn resend_solicitation_when_the_card_asks_for_our_block_again() {
    // An unchained I-block answered by R(N(R)=ns_master) means "send it
    // again"; the card then delivers its I-block.
    let mock = MockLink::new();
    mock.script_reply(r_frame(0, RError::ErrorFree));
    mock.script_reply(i_frame(0, false, &[0x90, 0x00]));
    let mut engine = mock_engine_with(&mock, test_atp_with_ifsc(254), test_engine_config());

    let response = engine.transceive_apdu(&[0x00, 0xA4, 0x04, 0x00, 0x00]).unwrap();
    assert_eq!(response, vec![0x90, 0x00]);

    let sent = mock.sent();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0], sent[1]);
}
