//! BER-TLV reader and writer
//!
//! Parsing is best-effort: a malformed data object stops the walk at that
//! point, but every sibling parsed before it is kept. Constructed objects are
//! descended into up to [`MAX_DEPTH`] levels.

use std::collections::BTreeMap;

use serde::Serialize;
use thiserror::Error;

/// Maximum nesting depth followed when parsing constructed data objects
pub const MAX_DEPTH: usize = 16;

/// Errors found while walking BER-TLV data
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TlvError {
    /// The buffer ends inside a multi-byte tag
    #[error("truncated tag at offset {offset}")]
    TruncatedTag { offset: usize },

    /// The buffer ends inside the length field
    #[error("truncated length at offset {offset}")]
    TruncatedLength { offset: usize },

    /// The declared value length exceeds the remaining buffer
    #[error("declared length {declared} at offset {offset} exceeds remaining {remaining} bytes")]
    LengthOverrun {
        offset: usize,
        declared: usize,
        remaining: usize,
    },

    /// Long-form length with zero or more than four length bytes
    #[error("unsupported length form 0x{first:02X} at offset {offset}")]
    UnsupportedLengthForm { offset: usize, first: u8 },

    /// Constructed objects nested deeper than [`MAX_DEPTH`]
    #[error("constructed data nested deeper than 16 levels")]
    DepthExceeded,
}

/// A parsed BER-TLV data object
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TlvNode {
    /// Complete tag bytes
    #[serde(serialize_with = "crate::hex_serde::serialize")]
    pub tag: Vec<u8>,
    /// Declared value length
    pub length: usize,
    /// Raw value bytes
    #[serde(serialize_with = "crate::hex_serde::serialize")]
    pub value: Vec<u8>,
    /// Child objects, populated for constructed tags only
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<TlvNode>,
}

impl TlvNode {
    /// Whether the constructed bit (b6 of the first tag byte) is set
    pub fn is_constructed(&self) -> bool {
        self.tag.first().is_some_and(|b| b & 0x20 != 0)
    }

    /// Tag as an uppercase hex string, e.g. "9F38"
    pub fn tag_hex(&self) -> String {
        hex::encode_upper(&self.tag)
    }

    /// Human-readable name from the tag dictionary
    pub fn name(&self) -> &'static str {
        crate::get_tag_name(&self.tag)
    }

    /// Depth-first search for the first descendant (or self) with the given tag
    pub fn find(&self, tag: &[u8]) -> Option<&TlvNode> {
        if self.tag == tag {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find(tag))
    }

    /// Re-encode this node from its tag and value
    pub fn to_bytes(&self) -> Vec<u8> {
        encode_tlv(&self.tag, &self.value)
    }
}

/// Search a parsed node list depth-first for a tag
pub fn find_node<'a>(nodes: &'a [TlvNode], tag: &[u8]) -> Option<&'a TlvNode> {
    nodes.iter().find_map(|node| node.find(tag))
}

/// Number of bytes in the tag starting at `data[0]`, or `None` if truncated.
///
/// A tag is one byte unless its low five bits are all set, in which case
/// subsequent bytes follow while their high bit is set, plus one final byte.
pub fn tag_length(data: &[u8]) -> Option<usize> {
    let first = *data.first()?;
    if first & 0x1F != 0x1F {
        return Some(1);
    }

    let mut len = 1;
    loop {
        let byte = *data.get(len)?;
        len += 1;
        if byte & 0x80 == 0 {
            return Some(len);
        }
    }
}

/// Decode a BER length field, returning `(value_length, bytes_consumed)`
pub fn read_length(data: &[u8]) -> Result<(usize, usize), TlvError> {
    let first = *data.first().ok_or(TlvError::TruncatedLength { offset: 0 })?;
    if first & 0x80 == 0 {
        return Ok((first as usize, 1));
    }

    let count = (first & 0x7F) as usize;
    if count == 0 || count > 4 {
        return Err(TlvError::UnsupportedLengthForm { offset: 0, first });
    }
    if data.len() < 1 + count {
        return Err(TlvError::TruncatedLength { offset: 0 });
    }

    let value = data[1..=count]
        .iter()
        .fold(0usize, |acc, &b| (acc << 8) | b as usize);
    Ok((value, 1 + count))
}

/// Encode a BER length field
pub fn encode_length(len: usize) -> Vec<u8> {
    if len < 0x80 {
        return vec![len as u8];
    }

    let bytes: Vec<u8> = len
        .to_be_bytes()
        .iter()
        .copied()
        .skip_while(|&b| b == 0)
        .collect();
    let mut out = Vec::with_capacity(bytes.len() + 1);
    out.push(0x80 | bytes.len() as u8);
    out.extend_from_slice(&bytes);
    out
}

/// Encode a single data object
pub fn encode_tlv(tag: &[u8], value: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(tag.len() + 3 + value.len());
    out.extend_from_slice(tag);
    out.extend_from_slice(&encode_length(value.len()));
    out.extend_from_slice(value);
    out
}

/// Parse BER-TLV data into a node list, keeping everything parsed before any error
pub fn parse(data: &[u8]) -> Vec<TlvNode> {
    parse_with_diagnostics(data).0
}

/// Parse BER-TLV data and report the first structural problem encountered, if any
pub fn parse_with_diagnostics(data: &[u8]) -> (Vec<TlvNode>, Option<TlvError>) {
    let mut error = None;
    let nodes = parse_level(data, 0, 0, &mut error);
    (nodes, error)
}

fn parse_level(
    data: &[u8],
    base: usize,
    depth: usize,
    error: &mut Option<TlvError>,
) -> Vec<TlvNode> {
    let mut nodes = Vec::new();
    let mut i = 0;

    while i < data.len() {
        if data[i] == 0x00 || data[i] == 0xFF {
            i += 1;
            continue;
        }

        let offset = base + i;
        let Some(tag_len) = tag_length(&data[i..]) else {
            error.get_or_insert(TlvError::TruncatedTag { offset });
            break;
        };
        let tag = data[i..i + tag_len].to_vec();
        i += tag_len;

        let (length, len_len) = match read_length(&data[i..]) {
            Ok(v) => v,
            Err(e) => {
                error.get_or_insert(relocate(e, base + i));
                break;
            }
        };
        i += len_len;

        let remaining = data.len() - i;
        if length > remaining {
            error.get_or_insert(TlvError::LengthOverrun {
                offset,
                declared: length,
                remaining,
            });
            break;
        }

        let value = data[i..i + length].to_vec();
        let mut node = TlvNode {
            tag,
            length,
            value,
            children: Vec::new(),
        };

        if node.is_constructed() {
            if depth + 1 >= MAX_DEPTH {
                error.get_or_insert(TlvError::DepthExceeded);
            } else {
                node.children = parse_level(&node.value, base + i, depth + 1, error);
            }
        }

        nodes.push(node);
        i += length;
    }

    nodes
}

fn relocate(err: TlvError, offset: usize) -> TlvError {
    match err {
        TlvError::TruncatedLength { .. } => TlvError::TruncatedLength { offset },
        TlvError::UnsupportedLengthForm { first, .. } => {
            TlvError::UnsupportedLengthForm { offset, first }
        }
        other => other,
    }
}

/// Walk BER-TLV data and flatten every data object into tag-hex -> value-hex.
///
/// Constructed objects contribute their own raw value as well as their
/// children. When a tag occurs more than once the last occurrence wins.
pub fn extract_flat(data: &[u8]) -> BTreeMap<String, String> {
    let mut map = BTreeMap::new();
    flatten_into(&parse(data), &mut map);
    map
}

/// Flatten already-parsed nodes into an existing map (last occurrence wins)
pub fn flatten_into(nodes: &[TlvNode], map: &mut BTreeMap<String, String>) {
    for node in nodes {
        map.insert(node.tag_hex(), hex::encode_upper(&node.value));
        flatten_into(&node.children, map);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_nested_fci() {
        // 6F { 84 A0000000031010, A5 { 50 "VISA" } }
        let data = hex::decode("6F0F8407A0000000031010A5045002AABB").unwrap();
        let nodes = parse(&data);
        assert_eq!(nodes.len(), 1);
        assert!(nodes[0].is_constructed());
        assert_eq!(nodes[0].children.len(), 2);
        assert_eq!(nodes[0].children[0].tag, vec![0x84]);
        let label = find_node(&nodes, &[0x50]).unwrap();
        assert_eq!(label.value, vec![0xAA, 0xBB]);
    }

    #[test]
    fn test_multi_byte_tag() {
        let data = [0x9F, 0x38, 0x03, 0x9F, 0x66, 0x04];
        let nodes = parse(&data);
        assert_eq!(nodes[0].tag, vec![0x9F, 0x38]);
        assert_eq!(nodes[0].length, 3);
        assert!(!nodes[0].is_constructed());
    }

    #[test]
    fn test_long_form_length() {
        let mut data = vec![0x90, 0x81, 0x90];
        data.extend(std::iter::repeat(0x11).take(0x90));
        let nodes = parse(&data);
        assert_eq!(nodes[0].length, 0x90);
        assert_eq!(nodes[0].value.len(), 0x90);
    }

    #[test]
    fn test_partial_results_kept() {
        // 5A is complete, 5F24 declares 3 bytes but only 1 follows
        let data = [0x5A, 0x02, 0x41, 0x11, 0x5F, 0x24, 0x03, 0x27];
        let (nodes, error) = parse_with_diagnostics(&data);
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].tag, vec![0x5A]);
        assert!(matches!(error, Some(TlvError::LengthOverrun { declared: 3, .. })));
    }

    #[test]
    fn test_truncated_tag() {
        let (nodes, error) = parse_with_diagnostics(&[0x9F]);
        assert!(nodes.is_empty());
        assert_eq!(error, Some(TlvError::TruncatedTag { offset: 0 }));
    }

    #[test]
    fn test_depth_is_bounded() {
        // 40 levels of E1 nesting
        let mut data = vec![0x5A, 0x01, 0x01];
        for _ in 0..40 {
            data = encode_tlv(&[0xE1], &data);
        }
        let (nodes, error) = parse_with_diagnostics(&data);
        assert_eq!(nodes.len(), 1);
        assert_eq!(error, Some(TlvError::DepthExceeded));
    }

    #[test]
    fn test_extract_flat_last_wins() {
        let data = hex::decode("70085A0211115A022222").unwrap();
        let map = extract_flat(&data);
        assert_eq!(map.get("5A").map(String::as_str), Some("2222"));
        assert!(map.contains_key("70"));
    }

    #[test]
    fn test_encode_length_forms() {
        assert_eq!(encode_length(0x7F), vec![0x7F]);
        assert_eq!(encode_length(0x80), vec![0x81, 0x80]);
        assert_eq!(encode_length(0x1234), vec![0x82, 0x12, 0x34]);
    }

    #[test]
    fn test_node_re_encodes() {
        let data = hex::decode("9F360200A1").unwrap();
        let nodes = parse(&data);
        assert_eq!(nodes[0].to_bytes(), data);
    }
}
