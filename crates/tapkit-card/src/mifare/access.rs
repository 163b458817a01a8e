//! Sector trailer access bits (bytes 6 to 8)
//!
//! Each of the four access slots carries three bits C1 C2 C3, stored once
//! directly and once inverted:
//!
//! ```text
//! byte 6: !C2 (slots 3..0) | !C1 (slots 3..0)
//! byte 7:  C1 (slots 3..0) | !C3 (slots 3..0)
//! byte 8:  C3 (slots 3..0) |  C2 (slots 3..0)
//! ```

use serde::Serialize;

use crate::error::ValidationError;

/// Decoded conditions for one access slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccessCondition {
    /// First block covered by the slot, relative to the sector
    pub block: u8,
    pub c1: u8,
    pub c2: u8,
    pub c3: u8,
    pub is_trailer: bool,
    pub description: &'static str,
}

/// Access bits of one sector trailer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccessBits {
    pub is_valid: bool,
    pub error: Option<String>,
    pub conditions: Vec<AccessCondition>,
}

impl AccessBits {
    fn invalid(error: ValidationError) -> Self {
        Self {
            is_valid: false,
            error: Some(error.to_string()),
            conditions: Vec::new(),
        }
    }

    /// Condition for the slot covering a sector-relative block
    pub fn condition_for(&self, block: u8) -> Option<&AccessCondition> {
        self.conditions.iter().rev().find(|c| c.block <= block)
    }
}

/// First parity plane that fails the complement check
fn parity_error(b6: u8, b7: u8, b8: u8) -> Option<ValidationError> {
    if b6 & 0x0F != !(b7 >> 4) & 0x0F {
        return Some(ValidationError::ParityMismatch { plane: "C1" });
    }
    if b6 >> 4 != !b8 & 0x0F {
        return Some(ValidationError::ParityMismatch { plane: "C2" });
    }
    if b7 & 0x0F != !(b8 >> 4) & 0x0F {
        return Some(ValidationError::ParityMismatch { plane: "C3" });
    }
    None
}

/// Decode the access bits of a 16-byte sector trailer.
///
/// `block_count` is 4 for ordinary sectors or 16 for 4K large sectors, where
/// each data slot covers five blocks. The four slots are always decoded; a
/// parity failure marks the result invalid but keeps the conditions.
pub fn parse_access_bits(trailer: &[u8], block_count: usize) -> AccessBits {
    if trailer.len() != 16 {
        return AccessBits::invalid(ValidationError::InvalidTrailer { len: trailer.len() });
    }

    let (b6, b7, b8) = (trailer[6], trailer[7], trailer[8]);
    let stride = if block_count == 16 { 5 } else { 1 };

    let conditions = (0..4u8)
        .map(|slot| {
            let c1 = (b7 >> (4 + slot)) & 1;
            let c2 = (b8 >> slot) & 1;
            let c3 = (b8 >> (4 + slot)) & 1;
            let is_trailer = slot == 3;
            AccessCondition {
                block: slot * stride,
                c1,
                c2,
                c3,
                is_trailer,
                description: if is_trailer {
                    describe_sector_trailer_access(c1, c2, c3)
                } else {
                    describe_data_block_access(c1, c2, c3)
                },
            }
        })
        .collect();

    let error = parity_error(b6, b7, b8);
    AccessBits {
        is_valid: error.is_none(),
        error: error.map(|e| e.to_string()),
        conditions,
    }
}

/// Data block permissions for C1 C2 C3
pub fn describe_data_block_access(c1: u8, c2: u8, c3: u8) -> &'static str {
    match (c1 & 1, c2 & 1, c3 & 1) {
        (0, 0, 0) => {
            "Full read/write/increment/decrement with Key A or B (transport configuration)"
        }
        (0, 1, 0) => "Read-only with Key A or B; write, increment and decrement never",
        (1, 0, 0) => "Read with Key A or B, write with Key B; increment and decrement never",
        (1, 1, 0) => {
            "Value block: read with Key A or B, write with Key B, increment with Key B, \
             decrement/transfer/restore with Key A or B"
        }
        (0, 0, 1) => {
            "Value block (non-rechargeable): read and decrement/transfer/restore with \
             Key A or B; write and increment never"
        }
        (0, 1, 1) => "Read and write with Key B only; increment and decrement never",
        (1, 0, 1) => "Read with Key B only; write, increment and decrement never",
        _ => "No access: read, write, increment and decrement never",
    }
}

/// Sector trailer permissions for C1 C2 C3
pub fn describe_sector_trailer_access(c1: u8, c2: u8, c3: u8) -> &'static str {
    match (c1 & 1, c2 & 1, c3 & 1) {
        (0, 0, 0) => {
            "Key A: write with Key A; access bits: read with Key A, write never; \
             Key B: read and write with Key A"
        }
        (0, 1, 0) => {
            "Key A: write never; access bits: read with Key A, write never; \
             Key B: read with Key A, write never"
        }
        (1, 0, 0) => {
            "Key A: write with Key B; access bits: read with Key A or B, write never; \
             Key B: write with Key B"
        }
        (1, 1, 0) => {
            "Key A: write never; access bits: read with Key A or B, write never; \
             Key B: read and write never (trailer frozen)"
        }
        (0, 0, 1) => {
            "Key A: write with Key A; access bits: read and write with Key A; \
             Key B: read and write with Key A (transport configuration)"
        }
        (0, 1, 1) => {
            "Key A: write with Key B; access bits: read with Key A or B, write with Key B; \
             Key B: write with Key B"
        }
        (1, 0, 1) => {
            "Key A: write never; access bits: read with Key A or B, write with Key B; \
             Key B: read and write never"
        }
        _ => {
            "Key A: write never; access bits: read with Key A or B, write never; \
             Key B: read and write never (all access bits set, trailer frozen)"
        }
    }
}
