//! Common test utilities: scripted transports that stand in for a reader
#![allow(dead_code)]

use std::collections::VecDeque;

use tapkit_card::error::TransportError;
use tapkit_card::mifare::{MifareKey, BLOCK_SIZE};
use tapkit_card::Transport;

fn unhex(text: &str) -> Vec<u8> {
    hex::decode(text).unwrap_or_else(|_| panic!("bad hex in test script: {text}"))
}

enum Reply {
    Bytes(Vec<u8>),
    Fail(TransportError),
}

impl Reply {
    fn produce(&self) -> Result<Vec<u8>, TransportError> {
        match self {
            Self::Bytes(bytes) => Ok(bytes.clone()),
            Self::Fail(err) => Err(err.clone()),
        }
    }
}

/// Transport answering from a script of `command prefix -> replies`.
///
/// The first rule whose prefix matches the command answers. Replies queued
/// for one prefix are consumed in order and the last one repeats. Commands
/// that match nothing get 6A82.
pub struct ScriptedTransport {
    rules: Vec<(Vec<u8>, VecDeque<Reply>)>,
    fallback: Vec<u8>,
    pub sent: Vec<Vec<u8>>,
    pub connects: usize,
    pub closes: usize,
    open: bool,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self {
            rules: Vec::new(),
            fallback: vec![0x6A, 0x82],
            sent: Vec::new(),
            connects: 0,
            closes: 0,
            open: false,
        }
    }

    fn push(&mut self, prefix: &str, reply: Reply) {
        let prefix = unhex(prefix);
        match self.rules.iter_mut().find(|(p, _)| *p == prefix) {
            Some((_, replies)) => replies.push_back(reply),
            None => self.rules.push((prefix, VecDeque::from([reply]))),
        }
    }

    /// Answer commands starting with `prefix` with `response` (both hex)
    pub fn on(mut self, prefix: &str, response: &str) -> Self {
        self.push(prefix, Reply::Bytes(unhex(response)));
        self
    }

    /// Fail commands starting with `prefix` with a transport error
    pub fn fail_on(mut self, prefix: &str, err: TransportError) -> Self {
        self.push(prefix, Reply::Fail(err));
        self
    }

    /// Every command sent so far, upper-case hex
    pub fn sent_hex(&self) -> Vec<String> {
        self.sent.iter().map(hex::encode_upper).collect()
    }

    /// How many sent commands start with `prefix`
    pub fn count(&self, prefix: &str) -> usize {
        let prefix = unhex(prefix);
        self.sent.iter().filter(|c| c.starts_with(&prefix)).count()
    }
}

impl Transport for ScriptedTransport {
    fn connect(&mut self) -> Result<(), TransportError> {
        if !self.open {
            self.open = true;
            self.connects += 1;
        }
        Ok(())
    }

    fn close(&mut self) -> Result<(), TransportError> {
        if self.open {
            self.open = false;
            self.closes += 1;
        }
        Ok(())
    }

    fn do_exchange(&mut self, command: &[u8]) -> Result<Vec<u8>, TransportError> {
        self.sent.push(command.to_vec());
        let rule = self
            .rules
            .iter_mut()
            .find(|(prefix, _)| command.starts_with(prefix));
        match rule {
            Some((_, replies)) if replies.len() > 1 => {
                replies.pop_front().map_or(Ok(self.fallback.clone()), |r| r.produce())
            }
            Some((_, replies)) => replies
                .front()
                .map_or(Ok(self.fallback.clone()), Reply::produce),
            None => Ok(self.fallback.clone()),
        }
    }
}

/// Standard trailer: both keys FF, transport access bits, GPB 69
pub const TRANSPORT_TRAILER: [u8; 16] = [
    0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x07, 0x80, 0x69, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF,
];

/// Sector holding a block: 4-block sectors up to block 127, 16-block sectors after
fn sector_of(block: u8) -> usize {
    if block < 128 {
        usize::from(block / 4)
    } else {
        32 + usize::from((block - 128) / 16)
    }
}

fn is_trailer(block: u8) -> bool {
    if block < 128 {
        block % 4 == 3
    } else {
        (block - 128) % 16 == 15
    }
}

/// MIFARE Classic behind a PC/SC reader, answering the reader's
/// pseudo-APDUs the way an ACR122-class device does. A failed read drops
/// the authenticated state until the next successful authentication.
pub struct SimulatedClassic {
    pub uid: Vec<u8>,
    pub blocks: Vec<[u8; BLOCK_SIZE]>,
    pub key_a: Vec<MifareKey>,
    pub key_b: Vec<MifareKey>,
    /// Blocks the access bits deny to Key A
    pub deny_key_a: Vec<u8>,
    /// Blocks whose READ BINARY reply is cut to a single byte
    pub truncated_reads: Vec<u8>,
    pub sent: Vec<Vec<u8>>,
    historical: Option<Vec<u8>>,
    loaded: Option<MifareKey>,
    authenticated: Option<(usize, u8)>,
}

impl SimulatedClassic {
    /// Sixteen sectors, every key FF, block N filled with byte N
    pub fn new() -> Self {
        Self::with_blocks(64, 16, None)
    }

    /// Forty sectors (the last eight of 16 blocks), announced through the ATR
    pub fn new_4k() -> Self {
        let historical = unhex("804F0CA0000003060300020000000000");
        Self::with_blocks(256, 40, Some(historical))
    }

    fn with_blocks(count: usize, sectors: usize, historical: Option<Vec<u8>>) -> Self {
        let blocks = (0..count)
            .map(|n| {
                let block = n as u8;
                if is_trailer(block) {
                    TRANSPORT_TRAILER
                } else {
                    [block; BLOCK_SIZE]
                }
            })
            .collect();
        Self {
            uid: vec![0x04, 0xA2, 0x2B, 0x91],
            blocks,
            key_a: vec![[0xFF; 6]; sectors],
            key_b: vec![[0xFF; 6]; sectors],
            deny_key_a: Vec::new(),
            truncated_reads: Vec::new(),
            sent: Vec::new(),
            historical,
            loaded: None,
            authenticated: None,
        }
    }

    /// Replace both keys of a sector
    pub fn with_keys(mut self, sector: usize, key_a: MifareKey, key_b: MifareKey) -> Self {
        self.key_a[sector] = key_a;
        self.key_b[sector] = key_b;
        self
    }

    pub fn writes(&self) -> usize {
        self.sent.iter().filter(|c| c.starts_with(&[0xFF, 0xD6])).count()
    }

    /// Number of GENERAL AUTHENTICATE commands sent for a block
    pub fn authentications(&self, block: u8) -> usize {
        self.sent
            .iter()
            .filter(|c| c.starts_with(&[0xFF, 0x86]) && c.get(7) == Some(&block))
            .count()
    }

    fn authenticate(&mut self, block: u8, key_type: u8) -> Vec<u8> {
        let sector = sector_of(block);
        let expected = match key_type {
            0x60 => self.key_a.get(sector),
            0x61 => self.key_b.get(sector),
            _ => None,
        };
        if expected.is_some() && expected.copied() == self.loaded {
            self.authenticated = Some((sector, key_type));
            vec![0x90, 0x00]
        } else {
            self.authenticated = None;
            vec![0x63, 0x00]
        }
    }

    fn read(&mut self, block: u8) -> Vec<u8> {
        if self.truncated_reads.contains(&block) {
            self.authenticated = None;
            return vec![0x90];
        }
        let allowed = match self.authenticated {
            Some((sector, key_type)) => {
                sector == sector_of(block) && !(key_type == 0x60 && self.deny_key_a.contains(&block))
            }
            None => false,
        };
        let Some(data) = self.blocks.get(usize::from(block)).filter(|_| allowed) else {
            self.authenticated = None;
            return vec![0x69, 0x82];
        };

        let mut out = data.to_vec();
        if is_trailer(block) {
            // Key A never reads back
            out[..6].fill(0x00);
        }
        out.extend_from_slice(&[0x90, 0x00]);
        out
    }
}

impl Transport for SimulatedClassic {
    fn connect(&mut self) -> Result<(), TransportError> {
        Ok(())
    }

    fn close(&mut self) -> Result<(), TransportError> {
        Ok(())
    }

    fn historical_bytes(&self) -> Option<&[u8]> {
        self.historical.as_deref()
    }

    fn do_exchange(&mut self, command: &[u8]) -> Result<Vec<u8>, TransportError> {
        self.sent.push(command.to_vec());
        let response = match command {
            [0xFF, 0xCA, ..] => {
                let mut out = self.uid.clone();
                out.extend_from_slice(&[0x90, 0x00]);
                out
            }
            [0xFF, 0x82, 0x00, 0x00, 0x06, key @ ..] if key.len() == 6 => {
                self.loaded = key.try_into().ok();
                vec![0x90, 0x00]
            }
            [0xFF, 0x86, 0x00, 0x00, 0x05, 0x01, 0x00, block, key_type, 0x00] => {
                self.authenticate(*block, *key_type)
            }
            [0xFF, 0xB0, 0x00, block, 0x10] => self.read(*block),
            [0xFF, 0xD6, ..] => vec![0x69, 0x86],
            _ => vec![0x6D, 0x00],
        };
        Ok(response)
    }
}
