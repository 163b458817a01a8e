//! MIFARE Classic over PC/SC storage-card commands
//!
//! Sector geometry, CRYPTO1 access-bit decoding, the key dictionary and the
//! read-only sector scan.

pub mod access;
pub mod classic;
pub mod keys;

use std::fmt;

use serde::Serialize;

pub use access::{
    describe_data_block_access, describe_sector_trailer_access, parse_access_bits, AccessBits,
    AccessCondition,
};
pub use classic::{BlockRead, CardAuthMap, KeyType, MifareClassic, SectorAuthResult};
pub use keys::{KeyDictionary, MifareKey, DEFAULT_KEYS};

/// Bytes per block
pub const BLOCK_SIZE: usize = 16;

/// Card geometry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MifareVariant {
    /// 5 sectors of 4 blocks
    Mini,
    /// 16 sectors of 4 blocks
    Classic1K,
    /// 32 sectors of 4 blocks, then 8 sectors of 16 blocks
    Classic4K,
}

impl MifareVariant {
    /// Number of sectors
    pub fn sector_count(self) -> u8 {
        match self {
            Self::Mini => 5,
            Self::Classic1K => 16,
            Self::Classic4K => 40,
        }
    }

    /// Blocks in a sector (4, or 16 for 4K sectors 32 to 39)
    pub fn block_count(self, sector: u8) -> u8 {
        if sector < 32 {
            4
        } else {
            16
        }
    }

    /// Absolute number of the sector's first block
    pub fn first_block(self, sector: u8) -> u8 {
        if sector < 32 {
            sector * 4
        } else {
            128 + (sector - 32) * 16
        }
    }

    /// Absolute number of the sector trailer
    pub fn trailer_block(self, sector: u8) -> u8 {
        self.first_block(sector) + (self.block_count(sector) - 1)
    }

    /// Total blocks on the card
    pub fn total_blocks(self) -> u16 {
        (0..self.sector_count())
            .map(|s| u16::from(self.block_count(s)))
            .sum()
    }

    /// Sector holding a block, `None` past the end of the card
    pub fn sector_of(self, block: u8) -> Option<u8> {
        let sector = if block < 128 {
            block / 4
        } else {
            32 + (block - 128) / 16
        };
        (sector < self.sector_count()).then_some(sector)
    }

    /// Whether a block is a sector trailer
    pub fn is_trailer(self, block: u8) -> bool {
        self.sector_of(block)
            .is_some_and(|sector| self.trailer_block(sector) == block)
    }

    /// Variant from the SAK byte of the anticollision response
    pub fn from_sak(sak: u8) -> Option<Self> {
        match sak {
            0x09 => Some(Self::Mini),
            0x08 | 0x88 => Some(Self::Classic1K),
            0x18 => Some(Self::Classic4K),
            _ => None,
        }
    }

    /// Variant from the standard card name bytes of a PC/SC storage-card ATR
    pub fn from_historical_bytes(historical: &[u8]) -> Option<Self> {
        match historical.get(9..11) {
            Some([0x00, 0x01]) => Some(Self::Classic1K),
            Some([0x00, 0x02]) => Some(Self::Classic4K),
            Some([0x00, 0x26]) => Some(Self::Mini),
            _ => None,
        }
    }
}

impl fmt::Display for MifareVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mini => f.write_str("MIFARE Mini"),
            Self::Classic1K => f.write_str("MIFARE Classic 1K"),
            Self::Classic4K => f.write_str("MIFARE Classic 4K"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_1k_geometry() {
        let v = MifareVariant::Classic1K;
        assert_eq!(v.total_blocks(), 64);
        assert_eq!(v.first_block(1), 4);
        assert_eq!(v.trailer_block(15), 63);
        assert!(v.is_trailer(3));
        assert!(!v.is_trailer(4));
        assert_eq!(v.sector_of(64), None);
    }

    #[test]
    fn test_4k_large_sectors() {
        let v = MifareVariant::Classic4K;
        assert_eq!(v.total_blocks(), 256);
        assert_eq!(v.first_block(32), 128);
        assert_eq!(v.trailer_block(32), 143);
        assert_eq!(v.trailer_block(39), 255);
        assert!(v.is_trailer(255));
        assert!(!v.is_trailer(254));
        assert_eq!(v.sector_of(200), Some(36));
        assert!(v.is_trailer(143));
        assert!(!v.is_trailer(131));
    }

    #[test]
    fn test_detection() {
        assert_eq!(MifareVariant::from_sak(0x08), Some(MifareVariant::Classic1K));
        assert_eq!(MifareVariant::from_sak(0x20), None);
        let hist = hex::decode("804F0CA0000003060300020000000000").unwrap();
        assert_eq!(
            MifareVariant::from_historical_bytes(&hist),
            Some(MifareVariant::Classic4K)
        );
        assert_eq!(MifareVariant::Mini.sector_count(), 5);
    }
}
