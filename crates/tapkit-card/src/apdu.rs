//! APDU (Application Protocol Data Unit) command and response handling

use std::fmt;

use tracing::debug;

use crate::error::{Error, ProtocolError};
use crate::status::describe_status_word;
use crate::transport::Transport;

/// Most data bytes a short command can carry (one-byte Lc)
pub const MAX_SHORT_DATA: usize = 255;

/// APDU response containing data and status word
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApduResponse {
    /// Response data (without status word)
    pub data: Vec<u8>,
    /// Status word SW1
    pub sw1: u8,
    /// Status word SW2
    pub sw2: u8,
}

impl ApduResponse {
    /// Build a response from data and a 16-bit status word
    pub fn new(data: Vec<u8>, status_word: u16) -> Self {
        Self {
            data,
            sw1: (status_word >> 8) as u8,
            sw2: status_word as u8,
        }
    }

    /// A data-less response carrying only a status word
    pub fn status_only(status_word: u16) -> Self {
        Self::new(Vec::new(), status_word)
    }

    /// Parse raw response bytes (data followed by SW1 SW2)
    pub fn decode(raw: &[u8]) -> Result<Self, ProtocolError> {
        if raw.len() < 2 {
            return Err(ProtocolError::TruncatedResponse { len: raw.len() });
        }

        let (data, sw) = raw.split_at(raw.len() - 2);
        Ok(Self {
            data: data.to_vec(),
            sw1: sw[0],
            sw2: sw[1],
        })
    }

    /// Serialize as data followed by SW1 SW2
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.data.len() + 2);
        out.extend_from_slice(&self.data);
        out.push(self.sw1);
        out.push(self.sw2);
        out
    }

    /// Check if the response indicates success (9000)
    pub fn is_success(&self) -> bool {
        self.status_word() == 0x9000
    }

    /// Get the full status word as a 16-bit value
    pub fn status_word(&self) -> u16 {
        ((self.sw1 as u16) << 8) | (self.sw2 as u16)
    }

    /// Get status word as hex string (e.g., "9000")
    pub fn status_string(&self) -> String {
        format!("{:02X}{:02X}", self.sw1, self.sw2)
    }

    /// Human-readable status description
    pub fn status_description(&self) -> String {
        describe_status_word(self.status_word())
    }

    /// SW1 = 61: more response data is waiting for GET RESPONSE
    pub fn has_more_data(&self) -> bool {
        self.sw1 == 0x61
    }

    /// Bytes still available when [`has_more_data`](Self::has_more_data) is true (00 means 256)
    pub fn remaining_bytes(&self) -> Option<u8> {
        self.has_more_data().then_some(self.sw2)
    }

    /// SW1 = 6C: the command must be repeated with Le = SW2
    pub fn is_wrong_le(&self) -> bool {
        self.sw1 == 0x6C
    }

    /// Exact Le the card asked for when [`is_wrong_le`](Self::is_wrong_le) is true
    pub fn correct_le(&self) -> Option<u8> {
        self.is_wrong_le().then_some(self.sw2)
    }
}

impl fmt::Display for ApduResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({} data bytes, SW {})",
            self.status_description(),
            self.data.len(),
            self.status_string()
        )
    }
}

/// APDU command builder
///
/// Zero-length data is the same as no data: it is never encoded as `Lc = 00`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApduCommand {
    cla: u8,
    ins: u8,
    p1: u8,
    p2: u8,
    data: Vec<u8>,
    le: Option<u8>,
}

impl ApduCommand {
    /// Create a new APDU command
    pub fn new(cla: u8, ins: u8, p1: u8, p2: u8) -> Self {
        Self {
            cla,
            ins,
            p1,
            p2,
            data: Vec::new(),
            le: None,
        }
    }

    /// Set command data
    pub fn data(mut self, data: Vec<u8>) -> Self {
        self.data = data;
        self
    }

    /// Set expected response length
    pub fn le(mut self, le: u8) -> Self {
        self.le = Some(le);
        self
    }

    /// Class byte
    pub fn cla(&self) -> u8 {
        self.cla
    }

    /// Instruction byte
    pub fn ins(&self) -> u8 {
        self.ins
    }

    /// First parameter
    pub fn p1(&self) -> u8 {
        self.p1
    }

    /// Second parameter
    pub fn p2(&self) -> u8 {
        self.p2
    }

    /// Command data, `None` when empty
    pub fn payload(&self) -> Option<&[u8]> {
        (!self.data.is_empty()).then_some(self.data.as_slice())
    }

    /// Expected response length
    pub fn expected_length(&self) -> Option<u8> {
        self.le
    }

    /// Encoded length: 4 + (1 + |data| if data) + (1 if Le)
    pub fn encoded_len(&self) -> usize {
        let data_len = if self.data.is_empty() {
            0
        } else {
            1 + self.data.len()
        };
        4 + data_len + usize::from(self.le.is_some())
    }

    /// Build the APDU command bytes
    pub fn build(&self) -> Vec<u8> {
        let mut apdu = Vec::with_capacity(self.encoded_len());
        apdu.extend_from_slice(&[self.cla, self.ins, self.p1, self.p2]);

        if !self.data.is_empty() {
            apdu.push(self.data.len() as u8);
            apdu.extend_from_slice(&self.data);
        }

        if let Some(le) = self.le {
            apdu.push(le);
        }

        apdu
    }

    /// Alias for [`build`](Self::build)
    pub fn encode(&self) -> Vec<u8> {
        self.build()
    }

    /// Parse short command bytes (ISO 7816-4 cases 1 to 4)
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        if bytes.len() < 4 {
            return Err(ProtocolError::MalformedCommand(format!(
                "{} byte(s), header needs 4",
                bytes.len()
            )));
        }

        let command = Self::new(bytes[0], bytes[1], bytes[2], bytes[3]);
        let body = &bytes[4..];

        match body.len() {
            // Case 1
            0 => Ok(command),
            // Case 2
            1 => Ok(command.le(body[0])),
            _ => {
                let lc = body[0] as usize;
                if lc == 0 {
                    return Err(ProtocolError::MalformedCommand(
                        "Lc of zero with trailing bytes".to_string(),
                    ));
                }
                match body.len() - 1 {
                    // Case 3
                    n if n == lc => Ok(command.data(body[1..].to_vec())),
                    // Case 4
                    n if n == lc + 1 => Ok(command
                        .data(body[1..=lc].to_vec())
                        .le(body[lc + 1])),
                    n => Err(ProtocolError::MalformedCommand(format!(
                        "Lc {} does not match {} remaining byte(s)",
                        lc, n
                    ))),
                }
            }
        }
    }

    /// Send this command once, without chaining. Data that does not fit a
    /// one-byte Lc is refused before anything reaches the transport.
    pub fn send<T: Transport + ?Sized>(&self, transport: &mut T) -> Result<ApduResponse, Error> {
        if self.data.len() > MAX_SHORT_DATA {
            return Err(ProtocolError::MalformedCommand(format!(
                "{} data bytes, a short APDU carries at most {}",
                self.data.len(),
                MAX_SHORT_DATA
            ))
            .into());
        }
        let raw = transport.exchange(&self.build())?;
        Ok(ApduResponse::decode(&raw)?)
    }

    /// Copy of this command with Le replaced (or added)
    pub fn with_le(&self, le: u8) -> Self {
        self.clone().le(le)
    }
}

/// Bounds for the response-chaining loop
#[derive(Debug, Clone, Copy)]
pub struct ChainingLimits {
    /// Maximum GET RESPONSE rounds
    pub max_get_response: usize,
    /// Maximum Le corrections
    pub max_le_corrections: usize,
}

impl Default for ChainingLimits {
    fn default() -> Self {
        Self {
            max_get_response: 32,
            max_le_corrections: 3,
        }
    }
}

/// Send a command and transparently resolve 61xx / 6Cxx status words.
///
/// 61xx: issue GET RESPONSE with Le = SW2 and append its data.
/// 6Cxx: repeat the last command with Le = SW2.
/// Any other status ends the exchange. When a limit is reached the last
/// response is returned as-is, with whatever data was accumulated so far.
pub fn exchange_with_chaining<T: Transport + ?Sized>(
    transport: &mut T,
    command: &ApduCommand,
    limits: ChainingLimits,
) -> Result<ApduResponse, Error> {
    let mut last_sent = command.clone();
    let mut response = last_sent.send(transport)?;
    let mut data = Vec::new();
    let mut get_response_rounds = 0;
    let mut le_corrections = 0;

    loop {
        if response.has_more_data() && get_response_rounds < limits.max_get_response {
            get_response_rounds += 1;
            debug!(
                remaining = response.sw2,
                round = get_response_rounds,
                "More data available, sending GET RESPONSE"
            );
            data.append(&mut response.data);
            last_sent = commands::get_response(response.sw2);
            response = last_sent.send(transport)?;
            continue;
        }

        if response.is_wrong_le() && le_corrections < limits.max_le_corrections {
            le_corrections += 1;
            debug!(le = response.sw2, "Wrong Le, repeating command");
            last_sent = last_sent.with_le(response.sw2);
            response = last_sent.send(transport)?;
            continue;
        }

        data.append(&mut response.data);
        return Ok(ApduResponse {
            data,
            sw1: response.sw1,
            sw2: response.sw2,
        });
    }
}

/// Common EMV / ISO 7816-4 APDU commands
pub mod commands {
    use super::ApduCommand;

    /// SELECT command (by name/AID)
    pub fn select(aid: &[u8]) -> ApduCommand {
        ApduCommand::new(0x00, 0xA4, 0x04, 0x00)
            .data(aid.to_vec())
            .le(0x00)
    }

    /// GET RESPONSE command
    pub fn get_response(le: u8) -> ApduCommand {
        ApduCommand::new(0x00, 0xC0, 0x00, 0x00).le(le)
    }

    /// GET PROCESSING OPTIONS command; `pdol_data` is wrapped in tag 83
    pub fn get_processing_options(pdol_data: &[u8]) -> ApduCommand {
        ApduCommand::new(0x80, 0xA8, 0x00, 0x00)
            .data(tapkit_common::encode_tlv(&[0x83], pdol_data))
            .le(0x00)
    }

    /// READ RECORD command
    pub fn read_record(record_number: u8, sfi: u8) -> ApduCommand {
        let p2 = (sfi << 3) | 0x04;
        ApduCommand::new(0x00, 0xB2, record_number, p2).le(0x00)
    }

    /// GET DATA command - request specific data object from card
    pub fn get_data(tag: &[u8]) -> ApduCommand {
        match tag {
            [t] => ApduCommand::new(0x80, 0xCA, 0x00, *t).le(0x00),
            [t1, t2] => ApduCommand::new(0x80, 0xCA, *t1, *t2).le(0x00),
            _ => ApduCommand::new(0x80, 0xCA, 0x00, 0x00)
                .data(tag.to_vec())
                .le(0x00),
        }
    }
}
