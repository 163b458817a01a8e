use std::path::PathBuf;

use tapkit_card::{DiscoveryResult, EmvCard, Result, Session};
use tapkit_common::find_tag;

use super::{display_tags, save_report, Context};
use crate::formatters::FormatMode;

pub fn cmd_emv(ctx: &Context, format_mode: FormatMode, json: bool, save: Option<PathBuf>) -> Result<()> {
    let mut transport = ctx.open_transport()?;
    let result = {
        let mut session = Session::open(&mut transport)?;
        EmvCard::with_config(session.transport(), &ctx.config).discover()?
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_discovery(&result, format_mode);
    }

    if let Some(path) = save {
        save_report(&path, "emv", &result)?;
    }
    Ok(())
}

fn print_discovery(result: &DiscoveryResult, format_mode: FormatMode) {
    println!("EMV Discovery - {} Mode\n", format_mode.description());

    println!("=== Discovering Available Applications ===\n");
    if let Some(sw) = &result.ppse_status {
        println!("PPSE: {}", sw);
    }
    if let Some(sw) = &result.pse_status {
        println!("PSE: {}", sw);
    }
    if result.directory.is_empty() {
        println!("No applications found via PSE/PPSE\n");
    } else {
        println!("Found {} application(s):\n", result.directory.len());
        for (i, app) in result.directory.iter().enumerate() {
            println!("Application {}:", i + 1);
            println!("  AID: {}", hex::encode_upper(&app.aid));
            if let Some(ref label) = app.label {
                println!("  Label: {}", label);
            }
            if let Some(ref pref_name) = app.preferred_name {
                println!("  Preferred Name: {}", pref_name);
            }
            if let Some(priority) = app.priority {
                println!("  Priority: {} (lower = higher priority)", priority & 0x0F);
            }
            println!();
        }
    }

    println!("=== Selecting EMV Application ===\n");
    let Some(aid) = &result.selected_aid else {
        println!("No payment application could be selected");
        print_notes(result);
        return;
    };
    println!(
        "Selected: {} ({})",
        hex::encode_upper(aid),
        result.application_name.as_deref().unwrap_or("unknown")
    );

    if let Some(fci) = &result.fci {
        println!("\n=== SELECT Response Details ===\n");
        if format_mode == FormatMode::Raw {
            println!("Raw SELECT response ({} bytes):", fci.len());
            println!("{}", hex::encode_upper(fci));
        } else if let Some(template) = find_tag(fci, &[0x6F]) {
            display_tags(template, format_mode);
            if let Some(a5) = find_tag(template, &[0xA5]) {
                println!("\nFCI Proprietary Template (A5):");
                display_tags(a5, format_mode);
            }
        }
    }

    println!("\n=== Application Interchange Profile ===\n");
    for capability in &result.aip_capabilities {
        println!("  - {}", capability);
    }
    if let Some(pdol) = &result.pdol {
        println!("\nPDOL: {} object(s), data {}", pdol.entries.len(), hex::encode_upper(&result.pdol_data));
    }

    if let Some(gpo) = &result.gpo_response {
        println!("\n=== GET PROCESSING OPTIONS Response ===\n");
        let search_data = find_tag(gpo, &[0x77])
            .or_else(|| find_tag(gpo, &[0x80]))
            .unwrap_or(gpo.as_slice());
        if format_mode == FormatMode::Raw {
            println!("  Data ({} bytes): {}", search_data.len(), hex::encode_upper(search_data));
        } else {
            display_tags(search_data, format_mode);
        }
    }
    for entry in &result.afl {
        println!(
            "  AFL: SFI {} records {}-{} ({} for offline authentication)",
            entry.sfi, entry.first_record, entry.last_record, entry.offline_auth_records
        );
    }

    println!("\nRecords read: {}\n", result.records.len());
    for record in &result.records {
        println!("SFI {} Record {}:", record.sfi, record.record);
        let search_data = find_tag(&record.data, &[0x70]).unwrap_or(record.data.as_slice());
        if format_mode == FormatMode::Raw {
            println!("  Data ({} bytes): {}", search_data.len(), hex::encode_upper(search_data));
        } else {
            display_tags(search_data, format_mode);
        }
        println!();
    }

    println!("=== Card Data ===\n");
    let fields = &result.fields;
    let show = |label: &str, value: &Option<String>| {
        if let Some(value) = value {
            println!("  {}: {}", label, value);
        }
    };
    show("PAN", &fields.masked_pan());
    show("Expiry", &fields.expiry);
    show("Cardholder", &fields.cardholder_name);
    show("Label", &fields.application_label);
    show("Issuer country", &fields.issuer_country);
    show("Effective date", &fields.effective_date);
    show("Currency", &fields.currency);
    show("ATC", &fields.atc.map(|v| v.to_string()));
    show("PIN tries left", &fields.pin_try_counter.map(|v| v.to_string()));
    show("Last online ATC", &fields.last_online_atc.map(|v| v.to_string()));

    if let Some(cvm) = &result.cvm {
        println!("\n=== Cardholder Verification ===\n");
        for line in cvm.describe() {
            println!("  {}", line);
        }
    }
    for (name, dol) in [("CDOL1", &result.cdol1), ("CDOL2", &result.cdol2)] {
        if let Some(dol) = dol {
            let tags: Vec<String> = dol.entries.iter().map(|e| hex::encode_upper(&e.tag)).collect();
            println!("  {}: {}", name, tags.join(" "));
        }
    }

    print_notes(result);
}

fn print_notes(result: &DiscoveryResult) {
    if !result.notes.is_empty() {
        println!("\nNotes:");
        for note in &result.notes {
            println!("  - {}", note);
        }
    }
}
