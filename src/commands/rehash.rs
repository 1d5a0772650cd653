use anyhow::{anyhow, Result};
use packsmith::download::{check_rehash_format, with_digest};
use packsmith::{Config, Downloader};
use std::env;

use super::{byte_progress, LoadedPack};

pub fn run(format: String) -> Result<()> {
    check_rehash_format(&format)?;

    let current_dir = env::current_dir()?;
    let config = Config::load()?;
    let downloader = Downloader::from_config(&config)?;

    println!("Loading modpack...");
    let mut loaded = LoadedPack::open(&current_dir)?;

    let records: Vec<_> = loaded
        .pack
        .records()
        .filter(|r| r.download.hash_format != format)
        .cloned()
        .collect();
    if records.is_empty() {
        println!("✓ Every file already uses {}", format);
        return Ok(());
    }

    println!("Rehashing {} file(s) to {}...", records.len(), format);
    let mut failed = Vec::new();
    let mut rehashed = 0;

    for record in &records {
        match downloader.rehash(record, &format, Some(byte_progress())) {
            Ok(digest) => {
                loaded
                    .pack
                    .write_record(&mut loaded.index, with_digest(record, digest))?;
                rehashed += 1;
            }
            Err(e) => {
                println!("  ✗ {}: {}", record.slug, e);
                failed.push(record.slug.clone());
            }
        }
    }

    if rehashed > 0 {
        loaded.refresh(None)?;
        loaded.save()?;
    }

    println!();
    println!("✓ Rehashed {} file(s)", rehashed);
    if !failed.is_empty() {
        return Err(anyhow!(
            "{} file(s) could not be rehashed: {}",
            failed.len(),
            failed.join(", ")
        ));
    }
    Ok(())
}
