//! Key dictionary for sector authentication

use std::io::BufRead;
use std::path::Path;

use crate::error::{Result, ValidationError};

/// A 48-bit CRYPTO1 key
pub type MifareKey = [u8; 6];

/// Factory and widely published keys, tried in this order
pub const DEFAULT_KEYS: &[MifareKey] = &[
    [0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF],
    [0xA0, 0xA1, 0xA2, 0xA3, 0xA4, 0xA5],
    [0xD3, 0xF7, 0xD3, 0xF7, 0xD3, 0xF7],
    [0x00, 0x00, 0x00, 0x00, 0x00, 0x00],
    [0xB0, 0xB1, 0xB2, 0xB3, 0xB4, 0xB5],
    [0x4D, 0x3A, 0x99, 0xC3, 0x51, 0xDD],
    [0x1A, 0x98, 0x2C, 0x7E, 0x45, 0x9A],
    [0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF],
    [0x71, 0x4C, 0x5C, 0x88, 0x6E, 0x97],
    [0x58, 0x7E, 0xE5, 0xF9, 0x35, 0x0F],
    [0xA0, 0x47, 0x8C, 0xC3, 0x90, 0x91],
    [0x53, 0x3C, 0xB6, 0xC7, 0x23, 0xF6],
    [0x8F, 0xD0, 0xA4, 0xF2, 0x56, 0xE9],
];

/// Ordered, duplicate-free list of candidate keys
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyDictionary {
    keys: Vec<MifareKey>,
}

impl KeyDictionary {
    /// Empty dictionary
    pub fn new() -> Self {
        Self::default()
    }

    /// Dictionary holding [`DEFAULT_KEYS`]
    pub fn with_defaults() -> Self {
        let mut dict = Self::new();
        for key in DEFAULT_KEYS {
            dict.push(*key);
        }
        dict
    }

    /// Append a key unless already present. Returns whether it was added.
    pub fn push(&mut self, key: MifareKey) -> bool {
        if self.keys.contains(&key) {
            return false;
        }
        self.keys.push(key);
        true
    }

    /// Append a key given as bytes
    pub fn push_slice(&mut self, key: &[u8]) -> std::result::Result<bool, ValidationError> {
        let key: MifareKey = key
            .try_into()
            .map_err(|_| ValidationError::InvalidKeyLength { len: key.len() })?;
        Ok(self.push(key))
    }

    /// Append a key given as hex (separators and whitespace ignored)
    pub fn parse_hex(&mut self, text: &str) -> std::result::Result<bool, ValidationError> {
        let bytes = tapkit_common::decode_hex(text)?;
        self.push_slice(&bytes)
    }

    /// Read keys from a reader: one hex key per line, `#` starts a comment
    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self> {
        let mut dict = Self::new();
        for line in reader.lines() {
            let line = line?;
            let text = line.split('#').next().unwrap_or_default().trim();
            if !text.is_empty() {
                dict.parse_hex(text)?;
            }
        }
        Ok(dict)
    }

    /// Load a key file
    pub fn load_file(path: impl AsRef<Path>) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(std::io::BufReader::new(file))
    }

    /// Append every key of another dictionary, keeping this one's order first
    pub fn extend(&mut self, other: &KeyDictionary) {
        for key in other.iter() {
            self.push(*key);
        }
    }

    pub fn keys(&self) -> &[MifareKey] {
        &self.keys
    }

    pub fn iter(&self) -> impl Iterator<Item = &MifareKey> {
        self.keys.iter()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}
