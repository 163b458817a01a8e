//! Discovery sequence against scripted cards

mod common;

use common::ScriptedTransport;
use tapkit_card::apdu::{commands, exchange_with_chaining};
use tapkit_card::error::TransportError;
use tapkit_card::{ChainingLimits, EmvCard, Error, Session, SessionConfig};

const SELECT_PPSE: &str = "00A404000E325041592E5359532E444446303100";
const SELECT_PSE: &str = "00A404000E315041592E5359532E444446303100";
const SELECT_VISA: &str = "00A4040007A000000003101000";
const SELECT_MASTERCARD: &str = "00A4040007A000000004101000";

/// FCI holding only the AID and an AIP of 4000
const VISA_FCI: &str = "6F0D8407A0000000031010820240009000";

fn visa_card() -> ScriptedTransport {
    ScriptedTransport::new()
        .on(SELECT_PPSE, "9000")
        .on(SELECT_VISA, VISA_FCI)
}

/// Mastercard listed by the PPSE, with a PDOL, a format 2 GPO and three records
fn mastercard_card() -> ScriptedTransport {
    ScriptedTransport::new()
        .on(
            SELECT_PPSE,
            "6F2F840E325041592E5359532E4444463031A51DBF0C1A61184F07A0000000041010\
             500A4D4153544552434152448701019000",
        )
        .on(
            SELECT_MASTERCARD,
            "6F208407A0000000041010A515500A4D4153544552434152449F38069F66049F02069000",
        )
        .on("80A8", "770E82021980940808010100100102009000")
        .on(
            "00B2010C",
            "702657115413330089010012D2512201000000000F5F201043415244484F4C4445522F54455354209000",
        )
        .on(
            "00B20114",
            "702E5A0854133300890100125F24032512315F280208408E0C000000000000000042031F00\
             8C099F02069F03069F1A029000",
        )
        .on("00B20214", "70059F420208409000")
        .on("80CA9F36", "9F360200079000")
}

#[test]
fn test_visa_without_records() {
    let mut transport = visa_card();
    let result = EmvCard::new(&mut transport).discover().unwrap();

    assert!(result.is_selected());
    assert_eq!(result.application_name.as_deref(), Some("Visa Credit/Debit"));
    assert!(result.aip_capabilities.contains(&"SDA supported".to_string()));
    assert_eq!(result.fields.pan, None);
    assert!(result.notes.iter().any(|n| n == "No PAN recovered"));

    assert_eq!(result.ppse_status.as_deref(), Some("9000"));
    assert_eq!(result.pse_status, None);
    assert_eq!(result.gpo_status.as_deref(), Some("6A82"));
    // No PDOL: GPO carries an empty tag 83
    assert_eq!(transport.count("80A80000028300"), 1);
}

#[test]
fn test_mastercard_full_read() {
    let mut transport = mastercard_card();
    let result = EmvCard::new(&mut transport).discover().unwrap();

    assert_eq!(result.directory.len(), 1);
    assert_eq!(result.selected_aid.as_deref(), Some(&[0xA0, 0x00, 0x00, 0x00, 0x04, 0x10, 0x10][..]));
    assert_eq!(result.application_name.as_deref(), Some("Mastercard"));

    // 9F66 (4) + 9F02 (6) zero-filled
    assert_eq!(result.pdol_data, vec![0u8; 10]);
    assert_eq!(transport.count("80A800000C830A0000000000000000000000"), 1);

    assert_eq!(result.gpo_status.as_deref(), Some("9000"));
    assert_eq!(result.afl.len(), 2);
    assert_eq!(result.records.len(), 3);
    assert!(result.aip.is_some());

    let fields = &result.fields;
    assert_eq!(fields.pan.as_deref(), Some("5413330089010012"));
    assert_eq!(fields.masked_pan().as_deref(), Some("************0012"));
    assert_eq!(fields.expiry.as_deref(), Some("12/25"));
    assert_eq!(fields.cardholder_name.as_deref(), Some("CARDHOLDER/TEST"));
    assert_eq!(fields.issuer_country.as_deref(), Some("840"));
    assert_eq!(fields.currency.as_deref(), Some("840"));
    assert_eq!(fields.atc, Some(7));
    assert_eq!(fields.pin_try_counter, None);
    assert_eq!(fields.track2.as_ref().map(|t| t.service_code.as_str()), Some("201"));

    assert_eq!(result.cvm.as_ref().map(|c| c.rules.len()), Some(2));
    assert_eq!(result.cdol1.as_ref().map(|d| d.entries.len()), Some(3));
    assert_eq!(result.cdol2, None);
    assert!(!result.notes.iter().any(|n| n == "No PAN recovered"));
}

#[test]
fn test_pse_directory_records() {
    let mut transport = ScriptedTransport::new()
        .on(
            SELECT_PSE,
            "6F15840E315041592E5359532E4444463031A5038801019000",
        )
        .on(
            "00B2010C",
            "701761154F07A0000000041010500A4D4153544552434152449000",
        );

    let apps = EmvCard::new(&mut transport).list_applications().unwrap();
    assert_eq!(apps.len(), 1);
    assert_eq!(apps[0].aid, vec![0xA0, 0x00, 0x00, 0x00, 0x04, 0x10, 0x10]);
    assert_eq!(apps[0].display_name(), "MASTERCARD");
    // Record 2 answered 6A82 and ended the directory read
    assert_eq!(transport.count("00B2020C"), 1);
    assert_eq!(transport.count("00B2030C"), 0);
}

#[test]
fn test_no_application() {
    let mut transport = ScriptedTransport::new();
    let result = EmvCard::new(&mut transport).discover().unwrap();

    assert!(!result.is_selected());
    assert!(result
        .notes
        .iter()
        .any(|n| n == "No payment application could be selected"));
    // PPSE, PSE, then every known AID once
    assert_eq!(transport.count("00A40400"), 2 + 16);
    assert_eq!(transport.count("80A8"), 0);
}

#[test]
fn test_record_probe_without_afl() {
    let mut transport = visa_card()
        .on("00B2010C", "70045A0212349000")
        .on("00B2020C", "6A83");
    let config = SessionConfig {
        brute_force_sfis: vec![1, 2],
        brute_force_records: 4,
        ..SessionConfig::default()
    };
    let result = EmvCard::with_config(&mut transport, &config).discover().unwrap();

    assert_eq!(result.records.len(), 1);
    assert_eq!(result.fields.pan.as_deref(), Some("1234"));
    // SFI 1 stops at its first failure, SFI 2 fails at once
    assert_eq!(transport.count("00B2030C"), 0);
    assert_eq!(transport.count("00B20114"), 1);
    assert_eq!(transport.count("00B20214"), 0);
}

#[test]
fn test_disconnect_aborts() {
    let mut transport = ScriptedTransport::new()
        .on(SELECT_PPSE, "9000")
        .fail_on(SELECT_VISA, TransportError::Disconnected);

    let err = EmvCard::new(&mut transport).discover().unwrap_err();
    assert!(matches!(err, Error::Transport(TransportError::Disconnected)));
    assert_eq!(transport.count("80A8"), 0);
}

#[test]
fn test_timeout_becomes_status() {
    let mut transport = ScriptedTransport::new()
        .fail_on(SELECT_PPSE, TransportError::Timeout)
        .on(SELECT_VISA, VISA_FCI);
    let result = EmvCard::new(&mut transport).discover().unwrap();

    assert_eq!(result.ppse_status.as_deref(), Some("6F00"));
    assert_eq!(result.pse_status.as_deref(), Some("6A82"));
    assert!(result.is_selected());
}

#[test]
fn test_session_releases_on_error() {
    let mut transport = ScriptedTransport::new().fail_on(SELECT_PPSE, TransportError::Disconnected);
    {
        let mut session = Session::open(&mut transport).unwrap();
        assert!(EmvCard::new(session.transport()).discover().is_err());
    }
    assert_eq!(transport.connects, 1);
    assert_eq!(transport.closes, 1);
}

#[test]
fn test_get_response_chaining() {
    let mut transport = ScriptedTransport::new()
        .on(SELECT_VISA, "AABB6102")
        .on("00C0000002", "CCDD9000");

    let response = exchange_with_chaining(
        &mut transport,
        &commands::select(&[0xA0, 0x00, 0x00, 0x00, 0x03, 0x10, 0x10]),
        ChainingLimits::default(),
    )
    .unwrap();

    assert_eq!(response.data, vec![0xAA, 0xBB, 0xCC, 0xDD]);
    assert_eq!(response.status_word(), 0x9000);
}

#[test]
fn test_wrong_length_retry() {
    let mut transport = ScriptedTransport::new()
        .on("00B2010C00", "6C05")
        .on("00B2010C05", "01020304059000");

    let response =
        exchange_with_chaining(&mut transport, &commands::read_record(1, 1), ChainingLimits::default())
            .unwrap();

    assert_eq!(response.data, vec![1, 2, 3, 4, 5]);
    assert!(response.is_success());
    assert_eq!(transport.sent_hex(), vec!["00B2010C00", "00B2010C05"]);
}

#[test]
fn test_chaining_bounded() {
    let mut transport = ScriptedTransport::new()
        .on(SELECT_VISA, "016101")
        .on("00C0000001", "026101");
    let limits = ChainingLimits {
        max_get_response: 3,
        max_le_corrections: 3,
    };

    let response = exchange_with_chaining(
        &mut transport,
        &commands::select(&[0xA0, 0x00, 0x00, 0x00, 0x03, 0x10, 0x10]),
        limits,
    )
    .unwrap();

    assert_eq!(transport.sent.len(), 4);
    assert_eq!(response.sw1, 0x61);
    assert_eq!(response.data, vec![0x01, 0x02, 0x02, 0x02]);
}
