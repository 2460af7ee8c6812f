use libese::constants::{PCB_S_RESYNCH_REQ, PCB_S_SWRESET_REQ};
use libese::protocol::engine::EngineConfig;
use libese::test_support::{corrupt, i_frame, mock_engine, mock_engine_with, test_atp};
use libese::transport::mock::MockLink;
use libese::Error;

#[test]
fn corrupted_reply_is_recovered_with_one_resend() {
    let mock = MockLink::new();
    mock.script_reply(corrupt(i_frame(0, false, &[0x90, 0x00])));
    mock.script_reply(i_frame(0, false, &[0x90, 0x00]));
    let mut engine = mock_engine(&mock);

    // The caller never sees the corruption
    let response = engine.transceive_apdu(&[0x00, 0xA4, 0x04, 0x00, 0x00]).unwrap();
    assert_eq!(response, vec![0x90, 0x00]);

    let sent = mock.sent();
    assert_eq!(sent.len(), 2);
    // Recovery asked for a resend: R(other error, N(R)=0)
    assert_eq!(sent[1][..3], [0x00, 0x82, 0x00]);

    // The engine is healthy again afterwards
    mock.script_reply(i_frame(1, false, &[0x90, 0x00]));
    engine.transceive_apdu(&[0x00, 0xA4, 0x04, 0x00, 0x00]).unwrap();
    assert_eq!(engine.sequence_numbers(), (0, 0));
}

#[test]
fn dead_link_before_any_success_escalates_straight_to_warm_reset() {
    let dir = tempfile::tempdir().unwrap();
    let cache = dir.path().join("atp.bin");
    std::fs::write(&cache, [0u8; 13]).unwrap();

    let mock = MockLink::new();
    let config = EngineConfig {
        atp_cache: cache.clone(),
        nbwt: 1,
    };
    let mut engine = mock_engine_with(&mock, test_atp(), config);

    let err = engine
        .transceive_apdu(&[0x00, 0xA4, 0x04, 0x00, 0x00])
        .unwrap_err();
    assert!(matches!(err, Error::Reset));

    // Two resends, then the software reset; no resynchronization attempts
    let sent = mock.sent();
    let pcbs: Vec<u8> = sent.iter().map(|frame| frame[1]).collect();
    assert_eq!(pcbs, vec![0x00, 0x82, 0x82, PCB_S_SWRESET_REQ]);

    // The warm reset removed the cached ATP
    assert!(!cache.exists());
}

#[test]
fn full_escalation_ladder_after_a_prior_success() {
    let mock = MockLink::new();
    mock.script_reply(i_frame(0, false, &[0x90, 0x00]));
    let mut engine = mock_engine(&mock);
    engine.transceive_apdu(&[0x00, 0xA4, 0x04, 0x00, 0x00]).unwrap();

    // Card goes silent for good
    let err = engine
        .transceive_apdu(&[0x00, 0xB0, 0x00, 0x00, 0x00])
        .unwrap_err();
    assert!(matches!(err, Error::Reset));

    let sent = mock.sent();
    let pcbs: Vec<u8> = sent[1..].iter().map(|frame| frame[1]).collect();
    assert_eq!(
        pcbs,
        vec![
            0x40,
            0x92,
            0x92,
            PCB_S_RESYNCH_REQ,
            PCB_S_RESYNCH_REQ,
            PCB_S_RESYNCH_REQ,
            PCB_S_SWRESET_REQ,
        ]
    );
}

#[test]
fn recovery_resets_once_a_consistent_block_arrives() {
    let mock = MockLink::new();
    // One silent exchange, then the card answers the resend request
    mock.script_no_reply();
    mock.script_reply(i_frame(0, false, &[0x90, 0x00]));
    let mut engine = mock_engine(&mock);

    engine.transceive_apdu(&[0x00, 0xA4, 0x04, 0x00, 0x00]).unwrap();

    // A later total failure still walks the whole ladder from the top,
    // proving the escalation pointer snapped back to ok
    let err = engine
        .transceive_apdu(&[0x00, 0xB0, 0x00, 0x00, 0x00])
        .unwrap_err();
    assert!(matches!(err, Error::Reset));
    let sent = mock.sent();
    let pcbs: Vec<u8> = sent[2..].iter().map(|frame| frame[1]).collect();
    assert_eq!(pcbs[1..3], [0x92, 0x92]);
    assert_eq!(pcbs[3..6], [PCB_S_RESYNCH_REQ; 3]);
}
