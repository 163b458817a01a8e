//! Sector scan against simulated MIFARE Classic 1K and 4K cards

mod common;

use common::SimulatedClassic;
use tapkit_card::mifare::{BlockRead, KeyDictionary, KeyType, MifareClassic, MifareVariant};
use tapkit_card::error::ValidationError;
use tapkit_card::Error;

const CUSTOM_B: [u8; 6] = [0x66, 0x55, 0x44, 0x33, 0x22, 0x11];
const UNKNOWN: [u8; 6] = [0x11, 0x22, 0x33, 0x44, 0x55, 0x66];

fn card() -> SimulatedClassic {
    SimulatedClassic::new()
        .with_keys(1, [0xA0, 0xA1, 0xA2, 0xA3, 0xA4, 0xA5], CUSTOM_B)
        .with_keys(2, UNKNOWN, UNKNOWN)
}

#[test]
fn test_scan_counts() {
    let mut sim = card();
    let map = MifareClassic::detect(&mut sim)
        .scan_card(&KeyDictionary::with_defaults())
        .unwrap();

    assert_eq!(map.uid, vec![0x04, 0xA2, 0x2B, 0x91]);
    assert_eq!(map.variant, MifareVariant::Classic1K);
    assert_eq!(map.sectors.len(), 16);
    assert_eq!(map.accessible_sectors, 15);
    // 14 sectors with both keys, sector 1 with Key A only
    assert_eq!(map.keys_found, 29);
    assert_eq!(sim.writes(), 0);
}

#[test]
fn test_sector_results() {
    let mut sim = card();
    let map = MifareClassic::detect(&mut sim)
        .scan_card(&KeyDictionary::with_defaults())
        .unwrap();

    let sector1 = &map.sectors[1];
    assert!(sector1.key_a_success);
    assert!(!sector1.key_b_success);
    assert_eq!(sector1.key_a, Some([0xA0, 0xA1, 0xA2, 0xA3, 0xA4, 0xA5]));
    assert_eq!(sector1.blocks[0], BlockRead::Data(vec![4; 16]));

    let sector2 = &map.sectors[2];
    assert!(!sector2.is_accessible());
    assert_eq!(sector2.blocks, vec![BlockRead::NotAuthenticated; 4]);
    assert!(sector2.access.is_none());

    let access = map.sectors[0].access.as_ref().unwrap();
    assert!(access.is_valid);
    assert!(access.conditions[3].description.contains("transport configuration"));

    // Key A reads back as zeros in the trailer
    assert_eq!(map.sectors[0].blocks[3].data().map(|d| &d[..6]), Some(&[0u8; 6][..]));
}

#[test]
fn test_read_retries_with_other_key() {
    let mut sim = card();
    sim.deny_key_a = vec![1, 5];
    let map = MifareClassic::detect(&mut sim)
        .scan_card(&KeyDictionary::with_defaults())
        .unwrap();

    // Sector 0: Key B is known, so block 1 is read with it
    assert_eq!(map.sectors[0].blocks[1], BlockRead::Data(vec![1; 16]));
    assert_eq!(map.sectors[0].blocks[2], BlockRead::Data(vec![2; 16]));
    // Sector 1: only Key A is known, so the card is re-authenticated with it
    // after the refused read and the rest of the sector still reads
    let sector1 = &map.sectors[1];
    assert_eq!(sector1.blocks[1], BlockRead::ReadError);
    assert_eq!(sector1.blocks[2], BlockRead::Data(vec![6; 16]));
    assert!(sector1.blocks[3].data().is_some());
    assert!(sector1.access.as_ref().is_some_and(|a| a.is_valid));
}

#[test]
fn test_malformed_read_reply_is_a_read_error() {
    let mut sim = card();
    sim.truncated_reads = vec![5];
    let map = MifareClassic::detect(&mut sim)
        .scan_card(&KeyDictionary::with_defaults())
        .unwrap();

    assert_eq!(map.accessible_sectors, 15);
    let sector1 = &map.sectors[1];
    assert_eq!(sector1.blocks[1], BlockRead::ReadError);
    assert_eq!(sector1.blocks[2], BlockRead::Data(vec![6; 16]));
    assert!(sector1.access.is_some());
}

#[test]
fn test_4k_scan() {
    let mut sim = SimulatedClassic::new_4k().with_keys(39, UNKNOWN, UNKNOWN);
    sim.deny_key_a = vec![200];
    let map = MifareClassic::detect(&mut sim)
        .scan_card(&KeyDictionary::with_defaults())
        .unwrap();

    assert_eq!(map.variant, MifareVariant::Classic4K);
    assert_eq!(map.sectors.len(), 40);
    assert_eq!(map.accessible_sectors, 39);
    assert_eq!(map.keys_found, 78);

    let sector32 = &map.sectors[32];
    assert_eq!(sector32.blocks.len(), 16);
    assert_eq!(sector32.blocks[0], BlockRead::Data(vec![128; 16]));
    assert!(sector32.access.as_ref().is_some_and(|a| a.is_valid));

    // Block 200 is refused to Key A and read again with Key B
    assert_eq!(map.sectors[36].blocks[8], BlockRead::Data(vec![200; 16]));
    assert_eq!(map.sectors[38].blocks[0], BlockRead::Data(vec![224; 16]));
    assert_eq!(map.sectors[39].blocks, vec![BlockRead::NotAuthenticated; 16]);
    assert_eq!(sim.writes(), 0);
}

#[test]
fn test_4k_last_sector() {
    let mut sim = SimulatedClassic::new_4k();
    let result = MifareClassic::new(&mut sim, MifareVariant::Classic4K)
        .authenticate_sector(39, &KeyDictionary::with_defaults())
        .unwrap();

    assert!(result.key_a_success && result.key_b_success);
    assert_eq!(result.blocks[0], BlockRead::Data(vec![240; 16]));
    assert!(result.blocks[15].data().is_some());
    assert!(sim.authentications(255) > 0);
    assert_eq!(sim.authentications(254), 0);
}

#[test]
fn test_sector_out_of_range() {
    let mut sim = card();
    let err = MifareClassic::detect(&mut sim)
        .authenticate_sector(16, &KeyDictionary::with_defaults())
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Validation(ValidationError::SectorOutOfRange { sector: 16 })
    ));
    assert!(sim.sent.is_empty());
}

#[test]
fn test_custom_dictionary() {
    let mut sim = card();
    let mut keys = KeyDictionary::new();
    keys.push(UNKNOWN);
    let map = MifareClassic::detect(&mut sim).scan_card(&keys).unwrap();

    assert_eq!(map.accessible_sectors, 1);
    assert!(map.sectors[2].key_a_success && map.sectors[2].key_b_success);
    assert_eq!(map.keys_found, 2);
}

#[test]
fn test_sector_equality_ignores_blocks() {
    let mut first = card();
    let mut second = card();
    second.blocks[4] = [0xEE; 16];

    let keys = KeyDictionary::with_defaults();
    let a = MifareClassic::detect(&mut first).authenticate_sector(1, &keys).unwrap();
    let b = MifareClassic::detect(&mut second).authenticate_sector(1, &keys).unwrap();

    assert_ne!(a.blocks, b.blocks);
    assert_eq!(a, b);
}

#[test]
fn test_authenticate_refused() {
    let mut sim = card();
    let mut classic = MifareClassic::detect(&mut sim);

    assert!(!classic.authenticate_with(11, &[0xFF; 6], KeyType::A).unwrap());
    let err = classic.authenticate(11, KeyType::B).unwrap_err();
    assert!(matches!(err, Error::Security(_)));
    assert!(classic.authenticate_with(11, &UNKNOWN, KeyType::B).unwrap());
    assert_eq!(classic.read_block(8).unwrap(), BlockRead::Data(vec![8; 16]));
}

#[test]
fn test_trailer_never_written() {
    let mut sim = card();
    let mut classic = MifareClassic::detect(&mut sim);

    assert!(classic.write_block(7, &[0u8; 16]).is_err());
    drop(classic);
    assert_eq!(sim.writes(), 0);
}
