//! Field formatters for human-readable output

use clap::ValueEnum;
use tapkit_card::aip::decode_aip;
use tapkit_card::fields::{format_date, format_expiry, numeric_code, pan_from_bcd, Track2};

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum FormatMode {
    /// Raw hex output
    Raw,
    /// Human-readable formatted output
    Human,
}

impl FormatMode {
    pub fn description(&self) -> &'static str {
        match self {
            FormatMode::Raw => "Raw",
            FormatMode::Human => "Human-Readable",
        }
    }
}

fn text_or_hex(value: &[u8]) -> String {
    match std::str::from_utf8(value) {
        Ok(text) => text.trim().to_string(),
        Err(_) => hex::encode_upper(value),
    }
}

/// Format a field value based on its tag type
pub fn format_value(tag: &[u8], value: &[u8], mode: FormatMode) -> String {
    if mode == FormatMode::Raw {
        return hex::encode_upper(value);
    }

    match tag {
        // Application Label, Preferred Name, Cardholder Name
        [0x50] | [0x9F, 0x12] | [0x5F, 0x20] => text_or_hex(value),

        // Application PAN
        [0x5A] => pan_from_bcd(value),

        // Application Expiration Date (YYMMDD)
        [0x5F, 0x24] => format_expiry(value).unwrap_or_else(|| hex::encode_upper(value)),

        // Application Effective Date (YYMMDD)
        [0x5F, 0x25] => format_date(value).unwrap_or_else(|| hex::encode_upper(value)),

        // Issuer Country Code (ISO 3166-1 numeric)
        [0x5F, 0x28] => {
            let code = numeric_code(value);
            match code.parse().ok().and_then(get_country_name) {
                Some(country) => format!("{} ({})", code, country),
                None => code,
            }
        }

        // Currency Codes
        [0x5F, 0x2A] | [0x9F, 0x42] => {
            let code = numeric_code(value);
            match code.parse().ok().and_then(get_currency_name) {
                Some(currency) => currency.to_string(),
                None => format!("Currency Code {}", code),
            }
        }

        // Single-byte counters
        [0x5F, 0x34] | [0x87] | [0x9F, 0x17] if value.len() == 1 => value[0].to_string(),

        // Two-byte counters
        [0x9F, 0x36] | [0x9F, 0x13] if value.len() == 2 => {
            u16::from_be_bytes([value[0], value[1]]).to_string()
        }

        // Application Interchange Profile
        [0x82] => format!("{} ({})", hex::encode_upper(value), decode_aip(value).join(", ")),

        // Track 2 Equivalent Data
        [0x57] => match Track2::parse(value) {
            Ok(track2) => format!(
                "PAN {} | Expiry {} | Service code {}",
                track2.pan, track2.expiry, track2.service_code
            ),
            Err(_) => hex::encode_upper(value).replace('D', " | "),
        },

        // Large binary fields
        _ if value.len() > 32 => format!(
            "{} ... ({} bytes total)",
            hex::encode_upper(&value[..32]),
            value.len()
        ),

        _ => hex::encode_upper(value),
    }
}

/// ISO 3166-1 numeric country codes (subset)
fn get_country_name(code: u16) -> Option<&'static str> {
    match code {
        124 => Some("Canada"),
        840 => Some("United States"),
        826 => Some("United Kingdom"),
        276 => Some("Germany"),
        250 => Some("France"),
        380 => Some("Italy"),
        724 => Some("Spain"),
        528 => Some("Netherlands"),
        156 => Some("China"),
        392 => Some("Japan"),
        _ => None,
    }
}

/// ISO 4217 numeric currency codes (subset)
fn get_currency_name(code: u16) -> Option<&'static str> {
    match code {
        124 => Some("CAD (Canadian Dollar)"),
        840 => Some("USD (US Dollar)"),
        978 => Some("EUR (Euro)"),
        826 => Some("GBP (Pound Sterling)"),
        392 => Some("JPY (Japanese Yen)"),
        156 => Some("CNY (Chinese Yuan)"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_is_hex() {
        assert_eq!(format_value(&[0x50], b"VISA", FormatMode::Raw), "56495341");
    }

    #[test]
    fn test_human_fields() {
        assert_eq!(format_value(&[0x50], b"VISA ", FormatMode::Human), "VISA");
        assert_eq!(format_value(&[0x5F, 0x24], &[0x25, 0x12, 0x31], FormatMode::Human), "12/25");
        assert_eq!(
            format_value(&[0x5F, 0x28], &[0x08, 0x40], FormatMode::Human),
            "840 (United States)"
        );
        assert_eq!(format_value(&[0x9F, 0x42], &[0x09, 0x78], FormatMode::Human), "EUR (Euro)");
        assert_eq!(format_value(&[0x9F, 0x36], &[0x01, 0x00], FormatMode::Human), "256");
        assert!(format_value(&[0x82], &[0x40, 0x00], FormatMode::Human).contains("SDA supported"));
    }

    #[test]
    fn test_long_values_truncated() {
        let value = [0xAB; 40];
        let text = format_value(&[0x90], &value, FormatMode::Human);
        assert!(text.ends_with("(40 bytes total)"));
    }
}
