use libese::protocol::checksum::{crc16, lrc};

#[test]
fn crc16_reference_vector() {
    assert_eq!(crc16(b"123456789"), 0x906E);
}

#[test]
fn lrc_is_xor_of_all_bytes() {
    assert_eq!(lrc(&[0x00, 0x40, 0x02, 0x90, 0x00]), 0xD2);
}

#[test]
fn crc16_differs_across_prologues() {
    // Same data under different PCBs must produce different epilogues
    let a = crc16(&[0x00, 0x00, 0x02, 0x90, 0x00]);
    let b = crc16(&[0x00, 0x40, 0x02, 0x90, 0x00]);
    assert_ne!(a, b);
}
