//! Configuration options for card sessions and the emulation responder

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::apdu::ChainingLimits;
use crate::error::Result;

/// Sharing mode for reader connections
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShareMode {
    /// Exclusive access to the card
    Exclusive,
    /// Shared access to the card (default)
    Shared,
}

impl From<ShareMode> for pcsc::ShareMode {
    fn from(mode: ShareMode) -> Self {
        match mode {
            ShareMode::Exclusive => Self::Exclusive,
            ShareMode::Shared => Self::Shared,
        }
    }
}

/// Options fixed once per reader session
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// How long to wait for a card to be presented, in milliseconds
    pub timeout_ms: u64,
    /// Reader sharing mode
    pub share_mode: ShareMode,
    /// Upper bound on GET RESPONSE rounds for one command (61xx chaining)
    pub max_get_response_rounds: usize,
    /// Upper bound on Le corrections for one command (6Cxx)
    pub max_le_corrections: usize,
    /// SFIs probed when a card offers no AFL
    pub brute_force_sfis: Vec<u8>,
    /// Records probed per SFI when a card offers no AFL
    pub brute_force_records: u8,
    /// Emulation responder settings
    pub emulation: EmulationConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 10_000,
            share_mode: ShareMode::Shared,
            max_get_response_rounds: 32,
            max_le_corrections: 3,
            brute_force_sfis: vec![1, 2, 3, 4, 5],
            brute_force_records: 10,
            emulation: EmulationConfig::default(),
        }
    }
}

impl SessionConfig {
    /// Load a JSON configuration file; missing fields take their defaults
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Card-present wait as a [`Duration`]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Response-chaining bounds for every command in the session
    pub fn chaining_limits(&self) -> ChainingLimits {
        ChainingLimits {
            max_get_response: self.max_get_response_rounds,
            max_le_corrections: self.max_le_corrections,
        }
    }
}

/// An extra application the responder answers SELECT for
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ExtraAid {
    /// AID as hex
    pub aid: String,
    /// Application label returned in the FCI
    pub label: String,
}

/// Emulation responder settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EmulationConfig {
    /// Answer SELECT for any AID, not just the known table
    pub global_emulation: bool,
    /// UID returned by GET DATA P2=00 (hex)
    pub uid: String,
    /// ATQA returned by GET DATA P2=01 (hex)
    pub atqa: String,
    /// SAK returned by GET DATA P2=02 (hex)
    pub sak: String,
    /// Applications appended to the known-AID table
    pub extra_aids: Vec<ExtraAid>,
}

impl Default for EmulationConfig {
    fn default() -> Self {
        Self {
            global_emulation: false,
            uid: "04A1B2C3D4E5F6".to_string(),
            atqa: "0044".to_string(),
            sak: "20".to_string(),
            extra_aids: Vec::new(),
        }
    }
}
