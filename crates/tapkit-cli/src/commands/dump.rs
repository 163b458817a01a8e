use tapkit_card::{EmvCard, Result, Session};

use super::dump_all_tags::dump_all_tags;
use super::Context;

pub fn cmd_dump(ctx: &Context) -> Result<()> {
    println!("EMV Tag Dump - All TLV Tags\n");

    let mut transport = ctx.open_transport()?;
    let card_data = {
        let mut session = Session::open(&mut transport)?;
        EmvCard::with_config(session.transport(), &ctx.config).discover()?
    };

    if let Some(fci) = &card_data.fci {
        println!("=== SELECT RESPONSE ===\n");
        dump_all_tags(fci, 1);
        println!();
    }

    if let Some(gpo) = &card_data.gpo_response {
        println!("=== GET PROCESSING OPTIONS RESPONSE ===\n");
        dump_all_tags(gpo, 1);
        println!();
    }

    println!("=== DUMPING ALL TLV TAGS FROM ALL RECORDS ===\n");
    println!("Total records: {}\n", card_data.records.len());

    for record in &card_data.records {
        println!("SFI {} Record {}:", record.sfi, record.record);
        dump_all_tags(&record.data, 1);
        println!();
    }

    println!("=== Dump Complete ===");
    Ok(())
}
