//! Cardholder-facing fields pulled out of EMV records
//!
//! Extraction is tolerant: a missing or odd-looking tag leaves its field empty
//! and, where useful, leaves a note for the report. Track 2 is only a fallback
//! source for PAN and expiry.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::ValidationError;

/// PAN digits from BCD bytes with trailing `F` padding nibbles removed
pub fn pan_from_bcd(bytes: &[u8]) -> String {
    hex::encode_upper(bytes)
        .trim_end_matches(['F', 'f'])
        .to_string()
}

/// `YYMMDD` (or `YYMM`) BCD date reformatted as `MM/YY`
pub fn format_expiry(bytes: &[u8]) -> Option<String> {
    if bytes.len() < 2 {
        return None;
    }
    let digits = hex::encode_upper(bytes);
    Some(format!("{}/{}", &digits[2..4], &digits[0..2]))
}

/// `YYMMDD` BCD date as `20YY-MM-DD`
pub fn format_date(bytes: &[u8]) -> Option<String> {
    if bytes.len() != 3 {
        return None;
    }
    let digits = hex::encode_upper(bytes);
    Some(format!("20{}-{}-{}", &digits[0..2], &digits[2..4], &digits[4..6]))
}

/// ISO 3166 / ISO 4217 numeric code from its two-byte BCD form ("0840" -> "840")
pub fn numeric_code(bytes: &[u8]) -> String {
    let digits = hex::encode_upper(bytes);
    let start = digits.len().saturating_sub(3);
    digits[start..].to_string()
}

/// Track 2 equivalent data (tag 57)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Track2 {
    pub pan: String,
    /// `MM/YY`
    pub expiry: String,
    pub service_code: String,
    pub discretionary: String,
}

impl Track2 {
    /// Split on the single `D` separator into PAN, YYMM expiry, service code
    /// and discretionary data. Anything that does not fit that layout is
    /// reported as ambiguous rather than guessed at.
    pub fn parse(bytes: &[u8]) -> Result<Self, ValidationError> {
        let digits = hex::encode_upper(bytes);
        let digits = digits.trim_end_matches('F');

        let mut parts = digits.split('D');
        let (Some(pan), Some(rest), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(ValidationError::InvalidTrack2(
                "expected exactly one 'D' separator".to_string(),
            ));
        };

        if pan.is_empty() || pan.len() > 19 || !pan.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ValidationError::InvalidTrack2(format!(
                "PAN field '{}' is not 1-19 decimal digits",
                pan
            )));
        }
        if rest.len() < 7 || !rest[..7].bytes().all(|b| b.is_ascii_digit()) {
            return Err(ValidationError::InvalidTrack2(
                "missing expiry or service code after separator".to_string(),
            ));
        }

        Ok(Self {
            pan: pan.to_string(),
            expiry: format!("{}/{}", &rest[2..4], &rest[0..2]),
            service_code: rest[4..7].to_string(),
            discretionary: rest[7..].to_string(),
        })
    }
}

/// One Application File Locator entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AflEntry {
    pub sfi: u8,
    pub first_record: u8,
    pub last_record: u8,
    /// Records involved in offline data authentication
    pub offline_auth_records: u8,
}

impl AflEntry {
    /// Decode one 4-byte entry
    pub fn from_bytes(entry: [u8; 4]) -> Self {
        Self {
            sfi: entry[0] >> 3,
            first_record: entry[1],
            last_record: entry[2],
            offline_auth_records: entry[3],
        }
    }

    /// Decode an AFL value. Trailing bytes that do not make a full entry are
    /// ignored, as are entries with SFI 0, record 0 or an inverted range.
    pub fn parse_list(afl: &[u8]) -> Vec<Self> {
        afl.chunks_exact(4)
            .map(|c| Self::from_bytes([c[0], c[1], c[2], c[3]]))
            .filter(|e| e.sfi != 0 && e.first_record != 0 && e.last_record >= e.first_record)
            .collect()
    }

    /// Record numbers this entry covers
    pub fn records(&self) -> std::ops::RangeInclusive<u8> {
        self.first_record..=self.last_record
    }
}

/// Fields extracted from the flattened tag map
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CardFields {
    pub pan: Option<String>,
    pub expiry: Option<String>,
    pub cardholder_name: Option<String>,
    pub application_label: Option<String>,
    pub issuer_country: Option<String>,
    pub effective_date: Option<String>,
    pub currency: Option<String>,
    pub track2: Option<Track2>,
    pub atc: Option<u16>,
    pub pin_try_counter: Option<u8>,
    pub last_online_atc: Option<u16>,
}

fn tag_bytes(tags: &BTreeMap<String, String>, tag: &str) -> Option<Vec<u8>> {
    tags.get(tag).and_then(|v| hex::decode(v).ok())
}

fn be_u16(bytes: Vec<u8>) -> Option<u16> {
    match bytes[..] {
        [hi, lo] => Some(u16::from_be_bytes([hi, lo])),
        _ => None,
    }
}

fn text_field(bytes: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(bytes).trim().to_string();
    (!text.is_empty()).then_some(text)
}

impl CardFields {
    /// Extract every known field from a tag-hex -> value-hex map. Problems
    /// that leave a field empty are appended to `notes`.
    pub fn from_tags(tags: &BTreeMap<String, String>, notes: &mut Vec<String>) -> Self {
        let mut fields = Self {
            pan: tag_bytes(tags, "5A")
                .map(|b| pan_from_bcd(&b))
                .filter(|p| !p.is_empty()),
            expiry: tag_bytes(tags, "5F24").and_then(|b| format_expiry(&b)),
            cardholder_name: tag_bytes(tags, "5F20").and_then(|b| text_field(&b)),
            application_label: tag_bytes(tags, "50").and_then(|b| text_field(&b)),
            issuer_country: tag_bytes(tags, "5F28").map(|b| numeric_code(&b)),
            effective_date: tag_bytes(tags, "5F25").and_then(|b| format_date(&b)),
            currency: tag_bytes(tags, "9F42").map(|b| numeric_code(&b)),
            track2: None,
            atc: tag_bytes(tags, "9F36").and_then(be_u16),
            pin_try_counter: tag_bytes(tags, "9F17").and_then(|b| b.first().copied()),
            last_online_atc: tag_bytes(tags, "9F13").and_then(be_u16),
        };

        if let Some(raw) = tag_bytes(tags, "57") {
            match Track2::parse(&raw) {
                Ok(track2) => fields.track2 = Some(track2),
                Err(e) => notes.push(e.to_string()),
            }
        }

        if let Some(track2) = &fields.track2 {
            if fields.pan.is_none() {
                fields.pan = Some(track2.pan.clone());
            }
            if fields.expiry.is_none() {
                fields.expiry = Some(track2.expiry.clone());
            }
        }

        fields
    }

    /// PAN with all but the last four digits masked
    pub fn masked_pan(&self) -> Option<String> {
        self.pan.as_ref().map(|pan| {
            let visible = pan.len().saturating_sub(4);
            format!("{}{}", "*".repeat(visible), &pan[visible..])
        })
    }
}
