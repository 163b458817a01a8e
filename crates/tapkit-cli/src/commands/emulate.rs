use tapkit_card::error::ValidationError;
use tapkit_card::{Responder, Result};
use tapkit_common::decode_hex;

use super::Context;

/// Feed scripted command APDUs to the emulation responder and print each reply
pub fn cmd_emulate(ctx: &Context, global: bool, apdus: &[String]) -> Result<()> {
    let mut config = ctx.config.emulation.clone();
    config.global_emulation |= global;
    let mut responder = Responder::from_config(&config)?;

    for apdu in apdus {
        let command = decode_hex(apdu).map_err(ValidationError::from)?;
        let response = responder.process_apdu(&command);
        println!("> {}", hex::encode_upper(&command));
        println!("< {}", hex::encode_upper(&response));
    }

    match responder.selected_aid() {
        Some(aid) => println!("\nSelected AID: {}", aid),
        None => println!("\nNo application selected"),
    }
    Ok(())
}
