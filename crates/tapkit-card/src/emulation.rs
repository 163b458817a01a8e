//! Host card emulation responder
//!
//! [`respond`] maps one inbound command to its reply and the next state. It
//! never fails: every input, however malformed, yields well-formed response
//! bytes ending in a status word.

use std::fmt;

use rand::RngCore;
use tapkit_common::{encode_tlv, to_hex};
use tracing::{debug, info};

use crate::apdu::{ApduCommand, ApduResponse};
use crate::config::EmulationConfig;
use crate::error::ValidationError;
use crate::protocol::aids;
use crate::status::{
    SW_DATA_NOT_FOUND, SW_FILE_NOT_FOUND, SW_SUCCESS, SW_TECHNICAL_PROBLEM, SW_WRONG_LENGTH,
};

/// An application identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Aid(Vec<u8>);

impl Aid {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for Aid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&to_hex(&self.0))
    }
}

/// Responder state
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum EmulationState {
    /// Nothing selected: after activation, deselection or link loss
    #[default]
    Idle,
    /// A SELECT succeeded for this application
    AidSelected(Aid),
}

/// Why the reader went away
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeactivationReason {
    LinkLoss,
    Deselected,
}

/// Static data the responder answers with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmulationProfile {
    pub global_emulation: bool,
    pub uid: Vec<u8>,
    pub atqa: Vec<u8>,
    pub sak: Vec<u8>,
    /// (AID, label) pairs answered on SELECT
    pub applications: Vec<(Vec<u8>, String)>,
}

impl Default for EmulationProfile {
    fn default() -> Self {
        Self {
            global_emulation: false,
            uid: vec![0x04, 0xA1, 0xB2, 0xC3, 0xD4, 0xE5, 0xF6],
            atqa: vec![0x00, 0x44],
            sak: vec![0x20],
            applications: aids::KNOWN_AIDS
                .iter()
                .map(|(aid, name)| (aid.to_vec(), (*name).to_string()))
                .collect(),
        }
    }
}

impl EmulationProfile {
    /// Build from configuration: the known-AID table plus the configured extras
    pub fn from_config(config: &EmulationConfig) -> Result<Self, ValidationError> {
        let mut profile = Self {
            global_emulation: config.global_emulation,
            uid: tapkit_common::decode_hex(&config.uid)?,
            atqa: tapkit_common::decode_hex(&config.atqa)?,
            sak: tapkit_common::decode_hex(&config.sak)?,
            ..Self::default()
        };
        for extra in &config.extra_aids {
            let aid = tapkit_common::decode_hex(&extra.aid)?;
            profile.applications.push((aid, extra.label.clone()));
        }
        Ok(profile)
    }

    /// Label to return for a SELECT, `None` when the AID is not answered
    fn label_for(&self, aid: &[u8]) -> Option<String> {
        if let Some((_, label)) = self.applications.iter().find(|(known, _)| known == aid) {
            return Some(label.clone());
        }
        self.global_emulation.then(|| {
            aids::aid_name(aid)
                .unwrap_or("Emulated Application")
                .to_string()
        })
    }
}

fn reply(data: Vec<u8>, status_word: u16) -> Vec<u8> {
    ApduResponse::new(data, status_word).encode()
}

fn status(status_word: u16) -> Vec<u8> {
    ApduResponse::status_only(status_word).encode()
}

/// FCI: `6F { 84 aid, A5 { 50 label } }`
fn build_fci(aid: &[u8], label: &str) -> Vec<u8> {
    let proprietary = encode_tlv(&[0xA5], &encode_tlv(&[0x50], label.as_bytes()));
    let mut body = encode_tlv(&[0x84], aid);
    body.extend_from_slice(&proprietary);
    encode_tlv(&[0x6F], &body)
}

fn get_data(profile: &EmulationProfile, p1: u8, p2: u8) -> Vec<u8> {
    match (p1, p2) {
        (0x00, 0x00) => reply(profile.uid.clone(), SW_SUCCESS),
        (0x00, 0x01) => reply(profile.atqa.clone(), SW_SUCCESS),
        (0x00, 0x02) => reply(profile.sak.clone(), SW_SUCCESS),
        (0x00, 0x03) => {
            let mut identity = encode_tlv(&[0x80], &profile.uid);
            identity.extend(encode_tlv(&[0x81], &profile.atqa));
            identity.extend(encode_tlv(&[0x82], &profile.sak));
            reply(encode_tlv(&[0xA1], &identity), SW_SUCCESS)
        }
        (0x9F, 0x36) => reply(encode_tlv(&[0x9F, 0x36], &[0x00, 0x01]), SW_SUCCESS),
        (0x9F, 0x17) => reply(encode_tlv(&[0x9F, 0x17], &[0x03]), SW_SUCCESS),
        (0x9F, 0x13) => reply(encode_tlv(&[0x9F, 0x13], &[0x00, 0x00]), SW_SUCCESS),
        _ => status(SW_DATA_NOT_FOUND),
    }
}

/// Map one command to its reply and the next state
pub fn respond(
    profile: &EmulationProfile,
    state: &EmulationState,
    command: &[u8],
) -> (Vec<u8>, EmulationState) {
    let unchanged = || state.clone();

    let Ok(cmd) = ApduCommand::decode(command) else {
        debug!(len = command.len(), "Malformed command");
        return (status(SW_WRONG_LENGTH), unchanged());
    };

    if cmd.ins() == 0xA4 && cmd.p1() == 0x04 {
        let aid = cmd.payload().unwrap_or_default();
        return match profile.label_for(aid) {
            Some(label) => {
                info!(aid = %to_hex(aid), label = %label, "Application selected");
                (
                    reply(build_fci(aid, &label), SW_SUCCESS),
                    EmulationState::AidSelected(Aid::new(aid)),
                )
            }
            None => {
                debug!(aid = %to_hex(aid), "SELECT for unknown application");
                (status(SW_FILE_NOT_FOUND), unchanged())
            }
        };
    }

    if *state == EmulationState::Idle {
        debug!(ins = cmd.ins(), "Command before SELECT");
        return (status(SW_TECHNICAL_PROBLEM), unchanged());
    }

    let response = match cmd.ins() {
        // GET DATA
        0xCA => get_data(profile, cmd.p1(), cmd.p2()),
        // READ BINARY
        0xB0 => {
            let len = match cmd.expected_length() {
                Some(0) | None => 256,
                Some(le) => usize::from(le),
            };
            reply((0..len).map(|i| i as u8).collect(), SW_SUCCESS)
        }
        // READ RECORD
        0xB2 => reply(encode_tlv(&[0x70], &[]), SW_SUCCESS),
        // GET PROCESSING OPTIONS: AIP 0000, empty AFL
        0xA8 => {
            let mut body = encode_tlv(&[0x82], &[0x00, 0x00]);
            body.extend(encode_tlv(&[0x94], &[]));
            reply(encode_tlv(&[0x77], &body), SW_SUCCESS)
        }
        // GET CHALLENGE
        0x84 => {
            let mut challenge = vec![0u8; 8];
            rand::thread_rng().fill_bytes(&mut challenge);
            reply(challenge, SW_SUCCESS)
        }
        // EXTERNAL AUTHENTICATE
        0x82 => status(SW_SUCCESS),
        ins => {
            debug!(ins, "Unsupported instruction");
            status(SW_TECHNICAL_PROBLEM)
        }
    };
    (response, unchanged())
}

/// Stateful wrapper around [`respond`]
#[derive(Debug, Clone)]
pub struct Responder {
    profile: EmulationProfile,
    state: EmulationState,
}

impl Responder {
    pub fn new(profile: EmulationProfile) -> Self {
        Self {
            profile,
            state: EmulationState::Idle,
        }
    }

    pub fn from_config(config: &EmulationConfig) -> Result<Self, ValidationError> {
        Ok(Self::new(EmulationProfile::from_config(config)?))
    }

    /// Answer one inbound command
    pub fn process_apdu(&mut self, command: &[u8]) -> Vec<u8> {
        let (response, next) = respond(&self.profile, &self.state, command);
        self.state = next;
        response
    }

    /// The reader deselected us or the field was lost
    pub fn deactivate(&mut self, reason: DeactivationReason) {
        debug!(?reason, "Deactivated");
        self.state = EmulationState::Idle;
    }

    pub fn state(&self) -> &EmulationState {
        &self.state
    }

    pub fn selected_aid(&self) -> Option<&Aid> {
        match &self.state {
            EmulationState::AidSelected(aid) => Some(aid),
            EmulationState::Idle => None,
        }
    }
}
