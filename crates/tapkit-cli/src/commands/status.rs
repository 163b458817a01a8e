use tapkit_card::error::ValidationError;
use tapkit_card::{describe_status_word, Result};
use tapkit_common::decode_hex;

/// Describe a status word given as hex (`6A82`, `90 00`)
pub fn cmd_status(sw_hex: &str) -> Result<()> {
    let bytes = decode_hex(sw_hex).map_err(ValidationError::from)?;
    let [sw1, sw2] = bytes[..] else {
        return Err(ValidationError::InvalidHex(hex::FromHexError::InvalidStringLength).into());
    };
    let word = u16::from_be_bytes([sw1, sw2]);
    println!("{:04X}: {}", word, describe_status_word(word));
    Ok(())
}
