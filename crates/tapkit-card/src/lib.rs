//! tapkit card engine
//!
//! This crate talks to contact and contactless cards through a [`Transport`]:
//! ISO 7816-4 APDU framing with response chaining, EMV application discovery,
//! MIFARE Classic access analysis, and the reverse direction as a host card
//! emulation responder.

pub mod aip;
pub mod apdu;
pub mod config;
pub mod cvm;
pub mod dol;
pub mod emulation;
pub mod error;
pub mod fields;
pub mod mifare;
pub mod protocol;
pub mod reader;
pub mod report;
pub mod status;
pub mod transport;

pub use apdu::{ApduCommand, ApduResponse, ChainingLimits};
pub use config::{EmulationConfig, SessionConfig};
pub use emulation::{respond, EmulationState, Responder};
pub use error::{Error, Result};
pub use protocol::{DiscoveryResult, EmvCard};
pub use reader::{CardReader, PcscTransport};
pub use report::{JsonLinesSink, ReportSink};
pub use status::describe_status_word;
pub use transport::{Session, Transport};
