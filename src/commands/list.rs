use anyhow::{bail, Result};
use packsmith::{ModRecord, Side};
use std::env;

use super::LoadedPack;

fn source_label(record: &ModRecord) -> String {
    let names = record.source_names();
    if names.is_empty() {
        "manual".to_string()
    } else {
        names.join(", ")
    }
}

pub fn run(side: Option<String>, show_files: bool) -> Result<()> {
    let current_dir = env::current_dir()?;
    let loaded = LoadedPack::open(&current_dir)?;

    let side: Option<Side> = match side {
        Some(s) => match s.parse() {
            Ok(side) => Some(side),
            Err(_) => bail!("Invalid side '{}', must be one of client, server, or both", s),
        },
        None => None,
    };

    let mut records: Vec<&ModRecord> = loaded
        .pack
        .records()
        .filter(|r| match side {
            Some(Side::Both) | None => true,
            Some(wanted) => r.side == wanted || r.side == Side::Both,
        })
        .collect();
    records.sort_by_key(|r| r.name.to_lowercase());

    if records.is_empty() {
        println!("No mods in this pack.");
        println!();
        println!("Add one with: packsmith add modrinth <project>");
        return Ok(());
    }

    for record in &records {
        let pin = if record.pin { " [pinned]" } else { "" };
        if show_files {
            println!(
                "  {} ({}) - {} - {}{}",
                record.name,
                record.filename,
                record.side,
                source_label(record),
                pin
            );
        } else {
            println!("  {} - {} - {}{}", record.name, record.side, source_label(record), pin);
        }
    }

    println!();
    println!(
        "Total: {} mod{}",
        records.len(),
        if records.len() == 1 { "" } else { "s" }
    );

    Ok(())
}
