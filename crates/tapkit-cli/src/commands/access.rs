use tapkit_card::mifare::parse_access_bits;
use tapkit_card::Result;
use tapkit_common::decode_hex;

use tapkit_card::error::ValidationError;

/// Decode a sector trailer given as hex, without touching a card
pub fn cmd_access(trailer_hex: &str, large_sector: bool) -> Result<()> {
    let trailer = decode_hex(trailer_hex).map_err(ValidationError::from)?;
    let block_count = if large_sector { 16 } else { 4 };
    let bits = parse_access_bits(&trailer, block_count);

    println!("Sector trailer: {}", hex::encode_upper(&trailer));
    if bits.is_valid {
        println!("Access bits valid\n");
    } else {
        println!(
            "Access bits INVALID: {}\n",
            bits.error.as_deref().unwrap_or("unknown")
        );
    }

    for condition in &bits.conditions {
        let kind = if condition.is_trailer { "Trailer" } else { "Data" };
        println!(
            "  {:<7} block {:>2}  C1C2C3={}{}{}  {}",
            kind, condition.block, condition.c1, condition.c2, condition.c3, condition.description
        );
    }
    Ok(())
}
