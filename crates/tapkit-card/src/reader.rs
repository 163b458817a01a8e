//! PC/SC card reader management and the PC/SC transport

use std::ffi::{CStr, CString};
use std::fmt;
use std::time::Duration;

use pcsc::{Attribute, Card, Context, Disposition, Protocols, ReaderState, Scope, State};
use tracing::{debug, info};

use crate::config::{SessionConfig, ShareMode};
use crate::error::TransportError;
use crate::transport::Transport;

/// Card reader wrapper for managing PC/SC connections
pub struct CardReader {
    context: Context,
    config: SessionConfig,
}

impl fmt::Debug for CardReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CardReader")
            .field("config", &self.config)
            .finish()
    }
}

impl CardReader {
    /// Create a new CardReader by establishing a PC/SC context
    pub fn new() -> Result<Self, TransportError> {
        Self::with_config(SessionConfig::default())
    }

    /// Create a CardReader with explicit session options
    pub fn with_config(config: SessionConfig) -> Result<Self, TransportError> {
        let context = Context::establish(Scope::User)?;
        Ok(Self { context, config })
    }

    /// List all available card readers
    pub fn list_readers(&self) -> Result<Vec<String>, TransportError> {
        let readers = self.context.list_readers_owned()?;
        Ok(readers
            .iter()
            .map(|r| r.to_string_lossy().into_owned())
            .collect())
    }

    /// Open a transport on the first available reader
    pub fn open_first(&self) -> Result<PcscTransport, TransportError> {
        let readers = self.context.list_readers_owned()?;
        let reader = readers.into_iter().next().ok_or(TransportError::NoReader)?;
        self.open_reader(reader)
    }

    /// Open a transport on a specific reader by name
    pub fn open(&self, reader_name: &str) -> Result<PcscTransport, TransportError> {
        let reader = CString::new(reader_name)
            .map_err(|_| TransportError::Io(format!("invalid reader name: {}", reader_name)))?;
        self.open_reader(reader)
    }

    fn open_reader(&self, reader: CString) -> Result<PcscTransport, TransportError> {
        self.wait_for_card(&reader)?;
        Ok(PcscTransport {
            context: self.context.clone(),
            reader,
            share_mode: self.config.share_mode,
            card: None,
            atr: Vec::new(),
            historical: Vec::new(),
        })
    }

    /// Block until a card is present in the reader, bounded by the session timeout
    pub fn wait_for_card(&self, reader: &CStr) -> Result<(), TransportError> {
        let mut states = vec![ReaderState::new(reader.to_owned(), State::UNAWARE)];
        self.context.get_status_change(Some(Duration::ZERO), &mut states)?;

        if states[0].event_state().contains(State::PRESENT) {
            return Ok(());
        }

        info!(timeout_ms = self.config.timeout_ms, "Waiting for card");
        states[0].sync_current_state();
        self.context
            .get_status_change(Some(self.config.timeout()), &mut states)?;

        if states[0].event_state().contains(State::PRESENT) {
            Ok(())
        } else {
            Err(TransportError::Timeout)
        }
    }
}

/// Transport implementation using PC/SC
pub struct PcscTransport {
    context: Context,
    reader: CString,
    share_mode: ShareMode,
    card: Option<Card>,
    atr: Vec<u8>,
    historical: Vec<u8>,
}

impl fmt::Debug for PcscTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PcscTransport")
            .field("reader", &self.reader)
            .field("connected", &self.card.is_some())
            .field("atr", &hex::encode_upper(&self.atr))
            .finish()
    }
}

impl PcscTransport {
    /// Reader name
    pub fn reader_name(&self) -> String {
        self.reader.to_string_lossy().into_owned()
    }

    /// ATR of the connected card (empty before connect)
    pub fn atr(&self) -> &[u8] {
        &self.atr
    }
}

impl Transport for PcscTransport {
    fn connect(&mut self) -> Result<(), TransportError> {
        if self.card.is_some() {
            return Ok(());
        }

        let card = self
            .context
            .connect(&self.reader, self.share_mode.into(), Protocols::ANY)?;
        self.atr = card
            .get_attribute_owned(Attribute::AtrString)
            .unwrap_or_default();
        self.historical = historical_bytes(&self.atr);
        debug!(reader = %self.reader_name(), atr = %hex::encode_upper(&self.atr), "Card connected");
        self.card = Some(card);
        Ok(())
    }

    fn close(&mut self) -> Result<(), TransportError> {
        if let Some(card) = self.card.take() {
            card.disconnect(Disposition::LeaveCard)
                .map_err(|(_, e)| TransportError::from(e))?;
            debug!(reader = %self.reader_name(), "Card disconnected");
        }
        Ok(())
    }

    fn do_exchange(&mut self, command: &[u8]) -> Result<Vec<u8>, TransportError> {
        let card = self.card.as_ref().ok_or(TransportError::Disconnected)?;
        let mut rapdu_buf = [0; pcsc::MAX_BUFFER_SIZE];
        let rapdu = card.transmit(command, &mut rapdu_buf)?;
        Ok(rapdu.to_vec())
    }

    fn historical_bytes(&self) -> Option<&[u8]> {
        (!self.historical.is_empty()).then_some(self.historical.as_slice())
    }
}

impl Drop for PcscTransport {
    fn drop(&mut self) {
        crate::transport::release(self);
    }
}

/// Extract the historical bytes from an ATR (ISO 7816-3 section 8.2)
pub fn historical_bytes(atr: &[u8]) -> Vec<u8> {
    if atr.len() < 2 {
        return Vec::new();
    }

    let count = (atr[1] & 0x0F) as usize;
    let mut indicator = atr[1] >> 4;
    let mut i = 2;

    loop {
        // TA, TB, TC present bits
        i += (indicator & 0x07).count_ones() as usize;
        if indicator & 0x08 == 0 {
            break;
        }
        let Some(&td) = atr.get(i) else {
            return Vec::new();
        };
        indicator = td >> 4;
        i += 1;
    }

    atr.get(i..i + count).map(<[u8]>::to_vec).unwrap_or_default()
}
