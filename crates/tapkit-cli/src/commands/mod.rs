pub mod access;
pub mod dump;
pub mod dump_all_tags;
pub mod emulate;
pub mod emv;
pub mod mifare;
pub mod readers;
pub mod status;

use std::fs::OpenOptions;
use std::path::Path;

use serde::Serialize;
use tapkit_card::{CardReader, JsonLinesSink, PcscTransport, ReportSink, Result, SessionConfig};
use tapkit_common::{find_tag, get_tag_name};
use tracing::info;

use crate::formatters::{self, FormatMode};

/// Options shared by every command
pub struct Context {
    pub config: SessionConfig,
    pub reader: Option<String>,
}

impl Context {
    /// Connect to the named reader, or the first one, and wait for a card
    pub fn open_transport(&self) -> Result<PcscTransport> {
        let reader = CardReader::with_config(self.config.clone())?;
        let transport = match &self.reader {
            Some(name) => reader.open(name)?,
            None => reader.open_first()?,
        };
        info!(reader = %transport.reader_name(), "Card present");
        Ok(transport)
    }
}

/// Append a report to a JSON lines file
pub(crate) fn save_report<R: Serialize>(path: &Path, kind: &str, report: &R) -> Result<()> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    JsonLinesSink::new(file).store_report(kind, report)?;
    info!(path = %path.display(), kind, "Report appended");
    Ok(())
}

/// Display EMV tags from TLV data
pub(crate) fn display_tags(data: &[u8], mode: FormatMode) {
    let tags: Vec<&[u8]> = vec![
        &[0x84],       // Dedicated File Name
        &[0x50],       // Application Label
        &[0x9F, 0x12], // Application Preferred Name
        &[0x87],       // Application Priority Indicator
        &[0x5A],       // Application PAN
        &[0x5F, 0x20], // Cardholder Name
        &[0x5F, 0x24], // Application Expiration Date
        &[0x5F, 0x25], // Application Effective Date
        &[0x5F, 0x28], // Issuer Country Code
        &[0x5F, 0x34], // Application PAN Sequence Number
        &[0x57],       // Track 2 Equivalent Data
        &[0x82],       // Application Interchange Profile
        &[0x94],       // Application File Locator
        &[0x9F, 0x38], // PDOL
        &[0x8C],       // CDOL1
        &[0x8D],       // CDOL2
        &[0x8E],       // CVM List
        &[0x9F, 0x07], // Application Usage Control
        &[0x9F, 0x08], // Application Version Number
        &[0x9F, 0x42], // Application Currency Code
        &[0x9F, 0x36], // Application Transaction Counter
        &[0x9F, 0x17], // PIN Try Counter
        &[0x9F, 0x13], // Last Online ATC Register
    ];

    for tag in &tags {
        if let Some(value) = find_tag(data, tag) {
            let tag_name = get_tag_name(tag);
            let formatted_value = formatters::format_value(tag, value, mode);

            println!(
                "  [{}] {}: {}",
                hex::encode_upper(tag),
                tag_name,
                formatted_value
            );
        }
    }
}
