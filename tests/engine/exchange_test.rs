use libese::test_support::{i_frame, mock_engine};
use libese::transport::mock::MockLink;

#[test]
fn single_block_exchange_returns_the_card_data() {
    let mock = MockLink::new();
    mock.script_reply(i_frame(0, false, &[0x01, 0x90, 0x00]));
    let mut engine = mock_engine(&mock);

    let response = engine.transceive_apdu(&[0x00, 0x70, 0x00, 0x00, 0x01]).unwrap();
    assert_eq!(response, vec![0x01, 0x90, 0x00]);

    let sent = mock.sent();
    assert_eq!(sent.len(), 1);
    // I-block, N(S)=0, no chaining, five data bytes
    assert_eq!(sent[0][..3], [0x00, 0x00, 0x05]);
}

#[test]
fn sequence_numbers_flip_on_each_successful_exchange() {
    let mock = MockLink::new();
    mock.script_reply(i_frame(0, false, &[0x90, 0x00]));
    mock.script_reply(i_frame(1, false, &[0x90, 0x00]));
    let mut engine = mock_engine(&mock);
    assert_eq!(engine.sequence_numbers(), (0, 0));

    engine.transceive_apdu(&[0x00, 0xA4, 0x04, 0x00, 0x00]).unwrap();
    assert_eq!(engine.sequence_numbers(), (1, 1));

    engine.transceive_apdu(&[0x00, 0xA4, 0x04, 0x00, 0x00]).unwrap();
    assert_eq!(engine.sequence_numbers(), (0, 0));

    let sent = mock.sent();
    // N(S) alternates between the two command blocks
    assert_eq!(sent[0][1], 0x00);
    assert_eq!(sent[1][1], 0x40);
}

#[test]
fn write_failure_surfaces_as_io_error() {
    let mock = MockLink::new();
    mock.fail_writes(1);
    let mut engine = mock_engine(&mock);

    let err = engine
        .transceive_apdu(&[0x00, 0xA4, 0x04, 0x00, 0x00])
        .unwrap_err();
    assert!(matches!(err, libese::Error::Io(_)));
}
