//! tapkit common - shared data structures and utilities for smartcard protocol processing
//!
//! BER-TLV parsing and encoding, the EMV tag dictionary and hex helpers used by
//! both the protocol engine and the command-line front end.

pub mod dictionary;
pub mod hex_serde;
pub mod tlv;

pub use dictionary::{get_tag_name, get_tag_name_hex, tags, EmvTag};
pub use tlv::{encode_tlv, extract_flat, parse, TlvError, TlvNode};

/// Search for a tag at the top level of BER-TLV data and return its value.
///
/// Only the top level is searched; constructed values are not descended into.
/// Callers unwrap templates (70, 77, A5, ...) explicitly, one level at a time.
///
/// # Arguments
/// * `data` - The BER-TLV encoded data to search
/// * `tag` - The complete tag bytes to search for
///
/// # Returns
/// * `Some(&[u8])` - The value bytes if the tag is found and fully present
/// * `None` - If the tag is not found or the data is malformed before it
pub fn find_tag<'a>(data: &'a [u8], tag: &[u8]) -> Option<&'a [u8]> {
    let mut i = 0;
    while i < data.len() {
        // 00 and FF between data objects are padding
        if data[i] == 0x00 || data[i] == 0xFF {
            i += 1;
            continue;
        }

        let tag_len = tlv::tag_length(&data[i..])?;
        let current_tag = &data[i..i + tag_len];
        i += tag_len;

        let (value_len, len_len) = tlv::read_length(&data[i..]).ok()?;
        i += len_len;

        if current_tag == tag {
            if i + value_len <= data.len() {
                return Some(&data[i..i + value_len]);
            }
            return None;
        }

        i = i.checked_add(value_len)?;
    }
    None
}

/// Encode bytes as an uppercase hex string
pub fn to_hex(bytes: &[u8]) -> String {
    hex::encode_upper(bytes)
}

/// Decode a hex string, accepting either case and ignoring whitespace and ':' separators
pub fn decode_hex(input: &str) -> Result<Vec<u8>, hex::FromHexError> {
    let cleaned: String = input
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ':')
        .collect();
    hex::decode(cleaned)
}
