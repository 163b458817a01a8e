//! Transport port: raw byte exchange with a card
//!
//! The engine never talks to a reader directly. Everything above this module
//! goes through [`Transport::exchange`], one command outstanding at a time.

use tracing::{debug, trace};

use crate::error::TransportError;

/// Short APDU maximum: 4 header bytes, Lc, 255 data bytes, Le
pub const DEFAULT_MAX_FRAME_SIZE: usize = 261;

/// A synchronous request/response channel to a card
pub trait Transport {
    /// Open the channel. Calling this on an open channel is a no-op.
    fn connect(&mut self) -> Result<(), TransportError>;

    /// Close the channel. Calling this on a closed channel is a no-op.
    fn close(&mut self) -> Result<(), TransportError>;

    /// Send command bytes and return the raw response (data followed by SW1 SW2)
    fn exchange(&mut self, command: &[u8]) -> Result<Vec<u8>, TransportError> {
        let max = self.max_frame_size();
        if command.len() > max {
            return Err(TransportError::FrameTooLarge {
                len: command.len(),
                max,
            });
        }

        trace!(command = %hex::encode_upper(command), "Transmitting command");
        let result = self.do_exchange(command);
        match &result {
            Ok(response) => trace!(response = %hex::encode_upper(response), "Received response"),
            Err(e) => debug!(error = %e, "Transport error during exchange"),
        }
        result
    }

    /// Concrete implementations provide the actual exchange here
    fn do_exchange(&mut self, command: &[u8]) -> Result<Vec<u8>, TransportError>;

    /// Largest command frame the channel accepts
    fn max_frame_size(&self) -> usize {
        DEFAULT_MAX_FRAME_SIZE
    }

    /// Historical bytes from the ATR (contact / PC/SC) or ATS (ISO-DEP)
    fn historical_bytes(&self) -> Option<&[u8]> {
        None
    }

    /// Higher-layer response from ATTRIB (ISO 14443-B)
    fn higher_layer_response(&self) -> Option<&[u8]> {
        None
    }
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn connect(&mut self) -> Result<(), TransportError> {
        (**self).connect()
    }

    fn close(&mut self) -> Result<(), TransportError> {
        (**self).close()
    }

    fn exchange(&mut self, command: &[u8]) -> Result<Vec<u8>, TransportError> {
        (**self).exchange(command)
    }

    fn do_exchange(&mut self, command: &[u8]) -> Result<Vec<u8>, TransportError> {
        (**self).do_exchange(command)
    }

    fn max_frame_size(&self) -> usize {
        (**self).max_frame_size()
    }

    fn historical_bytes(&self) -> Option<&[u8]> {
        (**self).historical_bytes()
    }

    fn higher_layer_response(&self) -> Option<&[u8]> {
        (**self).higher_layer_response()
    }
}

/// Scoped connection: connects on [`Session::open`], closes when dropped.
///
/// Every exit path of a reader-mode operation, including early returns and
/// errors, releases the channel.
#[derive(Debug)]
pub struct Session<'t, T: Transport + ?Sized> {
    transport: &'t mut T,
}

impl<'t, T: Transport + ?Sized> Session<'t, T> {
    /// Connect the transport and hold it for the session's lifetime
    pub fn open(transport: &'t mut T) -> Result<Self, TransportError> {
        transport.connect()?;
        debug!("Transport session opened");
        Ok(Self { transport })
    }

    /// The connected transport
    pub fn transport(&mut self) -> &mut T {
        self.transport
    }
}

impl<T: Transport + ?Sized> Drop for Session<'_, T> {
    fn drop(&mut self) {
        release(&mut *self.transport);
    }
}

/// Close a transport from a drop path, logging instead of propagating a
/// failed close. Returns whether the close succeeded.
pub(crate) fn release<T: Transport + ?Sized>(transport: &mut T) -> bool {
    match transport.close() {
        Ok(()) => {
            debug!("Transport closed");
            true
        }
        Err(e) => {
            debug!(error = %e, "Error closing transport");
            false
        }
    }
}
