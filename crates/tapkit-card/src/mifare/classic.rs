//! MIFARE Classic card operations through PC/SC pseudo-APDUs

use serde::Serialize;
use tracing::{debug, info, warn};

use super::access::{parse_access_bits, AccessBits};
use super::keys::{KeyDictionary, MifareKey};
use super::{MifareVariant, BLOCK_SIZE};
use crate::apdu::{ApduCommand, ApduResponse};
use crate::error::{Error, Result, SecurityError, ValidationError};
use crate::transport::Transport;

/// Key slot used for authentication
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum KeyType {
    A,
    B,
}

impl KeyType {
    /// Key type byte of the GENERAL AUTHENTICATE data
    pub fn code(self) -> u8 {
        match self {
            Self::A => 0x60,
            Self::B => 0x61,
        }
    }

    pub fn letter(self) -> char {
        match self {
            Self::A => 'A',
            Self::B => 'B',
        }
    }

    pub fn other(self) -> Self {
        match self {
            Self::A => Self::B,
            Self::B => Self::A,
        }
    }
}

/// Outcome of reading one block
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "data", rename_all = "snake_case")]
pub enum BlockRead {
    Data(#[serde(serialize_with = "tapkit_common::hex_serde::serialize")] Vec<u8>),
    ReadError,
    NotAuthenticated,
}

impl BlockRead {
    pub fn data(&self) -> Option<&[u8]> {
        match self {
            Self::Data(data) => Some(data),
            _ => None,
        }
    }
}

/// Authentication and read results for one sector
#[derive(Debug, Clone, Serialize)]
pub struct SectorAuthResult {
    pub sector: u8,
    pub key_a_success: bool,
    pub key_b_success: bool,
    #[serde(serialize_with = "tapkit_common::hex_serde::serialize_option")]
    pub key_a: Option<MifareKey>,
    #[serde(serialize_with = "tapkit_common::hex_serde::serialize_option")]
    pub key_b: Option<MifareKey>,
    pub blocks: Vec<BlockRead>,
    pub access: Option<AccessBits>,
}

impl SectorAuthResult {
    /// Whether either key opened the sector
    pub fn is_accessible(&self) -> bool {
        self.key_a_success || self.key_b_success
    }

    /// Number of keys recovered (Key A and Key B count separately)
    pub fn keys_found(&self) -> usize {
        usize::from(self.key_a_success) + usize::from(self.key_b_success)
    }
}

/// Two results are the same when the same keys opened the same sector,
/// whatever the block contents
impl PartialEq for SectorAuthResult {
    fn eq(&self, other: &Self) -> bool {
        (self.sector, self.key_a_success, self.key_b_success)
            == (other.sector, other.key_a_success, other.key_b_success)
    }
}

/// Result of scanning every sector of a card
#[derive(Debug, Clone, Serialize)]
pub struct CardAuthMap {
    #[serde(serialize_with = "tapkit_common::hex_serde::serialize")]
    pub uid: Vec<u8>,
    pub variant: MifareVariant,
    pub sectors: Vec<SectorAuthResult>,
    pub accessible_sectors: usize,
    pub keys_found: usize,
}

/// MIFARE Classic card behind a PC/SC reader
pub struct MifareClassic<'t, T: Transport + ?Sized> {
    transport: &'t mut T,
    variant: MifareVariant,
}

impl<'t, T: Transport + ?Sized> MifareClassic<'t, T> {
    /// Create a handler for a known card layout
    pub fn new(transport: &'t mut T, variant: MifareVariant) -> Self {
        Self { transport, variant }
    }

    /// Create a handler, taking the layout from the ATR (1K when unknown)
    pub fn detect(transport: &'t mut T) -> Self {
        let variant = transport
            .historical_bytes()
            .and_then(MifareVariant::from_historical_bytes)
            .unwrap_or(MifareVariant::Classic1K);
        debug!(%variant, "MIFARE layout");
        Self::new(transport, variant)
    }

    pub fn variant(&self) -> MifareVariant {
        self.variant
    }

    fn send(&mut self, command: ApduCommand) -> Result<ApduResponse> {
        command.send(&mut *self.transport)
    }

    /// Read the UID of the card (`None` if the reader refuses)
    pub fn uid(&mut self) -> Result<Option<Vec<u8>>> {
        match self.send(ApduCommand::new(0xFF, 0xCA, 0x00, 0x00).le(0x00)) {
            Ok(response) => Ok(response.is_success().then_some(response.data)),
            Err(Error::Protocol(e)) => {
                debug!(error = %e, "Malformed UID response");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Load a key into the reader's volatile key slot 0
    pub fn load_key(&mut self, key: &MifareKey) -> Result<bool> {
        let response = self.send(ApduCommand::new(0xFF, 0x82, 0x00, 0x00).data(key.to_vec()))?;
        Ok(response.is_success())
    }

    /// Authenticate a block with the loaded key
    pub fn authenticate(&mut self, block: u8, key_type: KeyType) -> Result<()> {
        let data = vec![0x01, 0x00, block, key_type.code(), 0x00];
        let response = self.send(ApduCommand::new(0xFF, 0x86, 0x00, 0x00).data(data))?;
        if response.is_success() {
            Ok(())
        } else {
            Err(SecurityError::AuthenticationFailed {
                block,
                key_type: key_type.letter(),
                sw: response.status_word(),
            }
            .into())
        }
    }

    /// Load `key` and authenticate. A refusal or a malformed reply is
    /// `Ok(false)`; only transport failures are errors.
    pub fn authenticate_with(&mut self, block: u8, key: &MifareKey, key_type: KeyType) -> Result<bool> {
        let outcome = match self.load_key(key) {
            Ok(true) => self.authenticate(block, key_type),
            Ok(false) => return Ok(false),
            Err(e) => Err(e),
        };
        match outcome {
            Ok(()) => Ok(true),
            Err(Error::Security(e)) => {
                debug!(error = %e, "Key rejected");
                Ok(false)
            }
            Err(Error::Protocol(e)) => {
                debug!(block, error = %e, "Malformed authentication reply");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Read one block of an authenticated sector
    pub fn read_block(&mut self, block: u8) -> Result<BlockRead> {
        let response = match self.send(ApduCommand::new(0xFF, 0xB0, 0x00, block).le(BLOCK_SIZE as u8)) {
            Ok(response) => response,
            Err(Error::Protocol(e)) => {
                debug!(block, error = %e, "Malformed read reply");
                return Ok(BlockRead::ReadError);
            }
            Err(e) => return Err(e),
        };
        if response.is_success() && response.data.len() == BLOCK_SIZE {
            Ok(BlockRead::Data(response.data))
        } else {
            debug!(block, sw = %response.status_string(), "Block read failed");
            Ok(BlockRead::ReadError)
        }
    }

    /// Write one data block. Sector trailers are never written.
    pub fn write_block(&mut self, block: u8, data: &[u8]) -> Result<ApduResponse> {
        if self.variant.sector_of(block).is_none() {
            return Err(ValidationError::BlockOutOfRange { block: block.into() }.into());
        }
        if self.variant.is_trailer(block) {
            warn!(block, "Refusing to write sector trailer");
            return Err(SecurityError::TrailerWriteRefused { block }.into());
        }
        if data.len() != BLOCK_SIZE {
            return Err(ValidationError::InvalidBlockLength { len: data.len() }.into());
        }
        self.send(ApduCommand::new(0xFF, 0xD6, 0x00, block).data(data.to_vec()))
    }

    fn find_key(&mut self, trailer: u8, keys: &KeyDictionary, key_type: KeyType) -> Result<Option<MifareKey>> {
        for key in keys.iter() {
            if self.authenticate_with(trailer, key, key_type)? {
                return Ok(Some(*key));
            }
        }
        Ok(None)
    }

    /// Try every candidate as Key A and as Key B, then read the sector with
    /// whichever key worked. The card drops its authentication after a failed
    /// read, so the next block re-authenticates first. A failed block read is
    /// retried with the other key when both are known.
    pub fn authenticate_sector(&mut self, sector: u8, keys: &KeyDictionary) -> Result<SectorAuthResult> {
        if sector >= self.variant.sector_count() {
            return Err(ValidationError::SectorOutOfRange { sector }.into());
        }

        let first = self.variant.first_block(sector);
        let count = self.variant.block_count(sector);
        let trailer = self.variant.trailer_block(sector);

        let key_a = self.find_key(trailer, keys, KeyType::A)?;
        let key_b = self.find_key(trailer, keys, KeyType::B)?;
        let mut result = SectorAuthResult {
            sector,
            key_a_success: key_a.is_some(),
            key_b_success: key_b.is_some(),
            key_a,
            key_b,
            blocks: Vec::with_capacity(count.into()),
            access: None,
        };

        let key_for = |key_type: KeyType| match key_type {
            KeyType::A => key_a,
            KeyType::B => key_b,
        };
        let mut working = if key_a.is_some() { KeyType::A } else { KeyType::B };
        if key_for(working).is_none() {
            debug!(sector, "No key opened sector");
            result.blocks = vec![BlockRead::NotAuthenticated; count.into()];
            return Ok(result);
        }

        let mut authenticated = false;
        for block in (0..count).map(|offset| first + offset) {
            if !authenticated {
                if let Some(key) = key_for(working) {
                    authenticated = self.authenticate_with(trailer, &key, working)?;
                }
            }
            let mut read = if authenticated {
                self.read_block(block)?
            } else {
                BlockRead::NotAuthenticated
            };

            if read.data().is_none() {
                authenticated = false;
                let fallback = working.other();
                if let Some(key) = key_for(fallback) {
                    if self.authenticate_with(trailer, &key, fallback)? {
                        let retry = self.read_block(block)?;
                        if retry.data().is_some() {
                            working = fallback;
                            authenticated = true;
                            read = retry;
                        }
                    }
                }
            }
            result.blocks.push(read);
        }

        result.access = result
            .blocks
            .last()
            .and_then(BlockRead::data)
            .map(|data| parse_access_bits(data, count.into()));

        info!(
            sector,
            key_a = result.key_a_success,
            key_b = result.key_b_success,
            "Sector authenticated"
        );
        Ok(result)
    }

    /// Authenticate and read every sector. Read-only: nothing is written.
    pub fn scan_card(&mut self, keys: &KeyDictionary) -> Result<CardAuthMap> {
        let uid = self.uid()?.unwrap_or_default();
        info!(uid = %hex::encode_upper(&uid), variant = %self.variant, keys = keys.len(), "Scanning card");

        let mut sectors = Vec::with_capacity(self.variant.sector_count().into());
        for sector in 0..self.variant.sector_count() {
            sectors.push(self.authenticate_sector(sector, keys)?);
        }

        let accessible_sectors = sectors.iter().filter(|s| s.is_accessible()).count();
        let keys_found = sectors.iter().map(SectorAuthResult::keys_found).sum();
        info!(accessible_sectors, keys_found, "Scan finished");

        Ok(CardAuthMap {
            uid,
            variant: self.variant,
            sectors,
            accessible_sectors,
            keys_found,
        })
    }
}
