use std::path::PathBuf;

use tapkit_card::mifare::{BlockRead, CardAuthMap, KeyDictionary, MifareClassic};
use tapkit_card::{Result, Session};

use super::{save_report, Context};

/// Default keys, then keys from the file, then keys from the command line
pub fn build_dictionary(key_file: Option<&PathBuf>, keys: &[String]) -> Result<KeyDictionary> {
    let mut dict = KeyDictionary::with_defaults();
    if let Some(path) = key_file {
        dict.extend(&KeyDictionary::load_file(path)?);
    }
    for key in keys {
        dict.parse_hex(key)?;
    }
    Ok(dict)
}

pub fn cmd_mifare(
    ctx: &Context,
    key_file: Option<PathBuf>,
    keys: &[String],
    json: bool,
    save: Option<PathBuf>,
) -> Result<()> {
    let dict = build_dictionary(key_file.as_ref(), keys)?;

    let mut transport = ctx.open_transport()?;
    let map = {
        let mut session = Session::open(&mut transport)?;
        MifareClassic::detect(session.transport()).scan_card(&dict)?
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&map)?);
    } else {
        print_map(&map, dict.len());
    }

    if let Some(path) = save {
        save_report(&path, "mifare", &map)?;
    }
    Ok(())
}

fn key_text(key: &Option<[u8; 6]>) -> String {
    key.map(hex::encode_upper).unwrap_or_else(|| "-".repeat(12))
}

fn print_map(map: &CardAuthMap, dictionary_size: usize) {
    println!("MIFARE Classic Scan\n");
    println!("UID: {}", hex::encode_upper(&map.uid));
    println!("Layout: {}", map.variant);
    println!("Keys tried: {}\n", dictionary_size);

    println!("Sector  Key A         Key B");
    for sector in &map.sectors {
        println!(
            "{:>6}  {}  {}",
            sector.sector,
            key_text(&sector.key_a),
            key_text(&sector.key_b)
        );
    }

    for sector in map.sectors.iter().filter(|s| s.is_accessible()) {
        println!("\n=== Sector {} ===", sector.sector);
        for (i, block) in sector.blocks.iter().enumerate() {
            let text = match block {
                BlockRead::Data(data) => hex::encode_upper(data),
                BlockRead::ReadError => "read error".to_string(),
                BlockRead::NotAuthenticated => "not authenticated".to_string(),
            };
            println!("  Block {:>2}: {}", i, text);
        }

        match &sector.access {
            Some(access) if access.is_valid => {
                for condition in &access.conditions {
                    println!(
                        "  Access {:>2} [{}{}{}]: {}",
                        condition.block, condition.c1, condition.c2, condition.c3, condition.description
                    );
                }
            }
            Some(access) => println!(
                "  Access bits invalid: {}",
                access.error.as_deref().unwrap_or("unknown")
            ),
            None => {}
        }
    }

    println!(
        "\n{} of {} sectors accessible, {} key(s) found",
        map.accessible_sectors,
        map.sectors.len(),
        map.keys_found
    );
}
