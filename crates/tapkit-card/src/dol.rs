//! Data Object Lists (PDOL 9F38, CDOL1 8C, CDOL2 8D)
//!
//! A DOL is a list of tag + length pairs with no values. The responses built
//! here are inert: every requested object is filled with zero bytes. No
//! transaction date, amount or unpredictable number is ever invented.

use serde::Serialize;
use tapkit_common::tlv::tag_length;

/// Largest object list response that still fits a GET PROCESSING OPTIONS
/// command: 83 81 LL plus the data inside a 255-byte Lc
pub const MAX_DOL_DATA: usize = 252;

/// Expected lengths of the terminal data objects cards commonly request
const TERMINAL_DATA_LENGTHS: &[(&[u8], usize)] = &[
    (&[0x9F, 0x66], 4),  // Terminal Transaction Qualifiers
    (&[0x9F, 0x02], 6),  // Amount, Authorised
    (&[0x9F, 0x03], 6),  // Amount, Other
    (&[0x9F, 0x1A], 2),  // Terminal Country Code
    (&[0x95], 5),        // Terminal Verification Results
    (&[0x5F, 0x2A], 2),  // Transaction Currency Code
    (&[0x9A], 3),        // Transaction Date
    (&[0x9C], 1),        // Transaction Type
    (&[0x9F, 0x37], 4),  // Unpredictable Number
    (&[0x9F, 0x35], 1),  // Terminal Type
    (&[0x9F, 0x45], 2),  // Data Authentication Code
    (&[0x9F, 0x4C], 8),  // ICC Dynamic Number
    (&[0x9F, 0x34], 3),  // CVM Results
    (&[0x9F, 0x21], 3),  // Transaction Time
    (&[0x9F, 0x7C], 20), // Customer Exclusive Data
    (&[0x9F, 0x40], 5),  // Additional Terminal Capabilities
    (&[0x9F, 0x33], 3),  // Terminal Capabilities
    (&[0x9F, 0x09], 2),  // Application Version Number (Terminal)
    (&[0x9F, 0x1E], 8),  // Interface Device Serial Number
    (&[0x9F, 0x15], 2),  // Merchant Category Code
    (&[0x9F, 0x16], 15), // Merchant Identifier
    (&[0x9F, 0x1C], 8),  // Terminal Identification
    (&[0x9F, 0x4E], 20), // Merchant Name and Location
];

/// Expected length of a known terminal data object
pub fn terminal_data_length(tag: &[u8]) -> Option<usize> {
    TERMINAL_DATA_LENGTHS
        .iter()
        .find(|(t, _)| *t == tag)
        .map(|(_, len)| *len)
}

/// One requested data object
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DolEntry {
    #[serde(serialize_with = "tapkit_common::hex_serde::serialize")]
    pub tag: Vec<u8>,
    /// Length declared by the card in the DOL
    pub declared_length: usize,
}

impl DolEntry {
    /// Length used when building the response: the known-object table first,
    /// then the card's declared length for objects the table does not know
    pub fn fill_length(&self) -> usize {
        terminal_data_length(&self.tag).unwrap_or(self.declared_length)
    }
}

/// A parsed Data Object List
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Dol {
    pub entries: Vec<DolEntry>,
}

impl Dol {
    /// Parse tag/length pairs, stopping quietly at the first truncated entry.
    /// DOL lengths are a single byte; a long-form length ends the list.
    pub fn parse(data: &[u8]) -> Self {
        let mut entries = Vec::new();
        let mut i = 0;

        while i < data.len() {
            let Some(tag_len) = tag_length(&data[i..]) else {
                break;
            };
            let tag = data[i..i + tag_len].to_vec();
            i += tag_len;

            let Some(&length) = data.get(i).filter(|&&b| b < 0x80) else {
                break;
            };
            i += 1;
            let declared_length = usize::from(length);

            entries.push(DolEntry {
                tag,
                declared_length,
            });
        }

        Self { entries }
    }

    /// Inert default response: zero bytes for every requested object, cut
    /// to [`MAX_DOL_DATA`]
    pub fn default_data(&self) -> Vec<u8> {
        let total: usize = self.entries.iter().map(DolEntry::fill_length).sum();
        vec![0u8; total.min(MAX_DOL_DATA)]
    }

    /// Whether the list requests nothing
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
