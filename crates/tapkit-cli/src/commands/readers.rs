use tapkit_card::{CardReader, Result};

use super::Context;

pub fn cmd_readers(ctx: &Context) -> Result<()> {
    let reader = CardReader::with_config(ctx.config.clone())?;
    let readers = reader.list_readers()?;

    if readers.is_empty() {
        println!("No card readers found");
    } else {
        println!("Found {} reader(s):", readers.len());
        for (i, name) in readers.iter().enumerate() {
            println!("  {}: {}", i, name);
        }
    }
    Ok(())
}
