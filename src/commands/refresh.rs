use anyhow::Result;
use std::env;

use super::{file_progress, LoadedPack};

pub fn run() -> Result<()> {
    let current_dir = env::current_dir()?;

    println!("Loading modpack...");
    let mut loaded = LoadedPack::open(&current_dir)?;

    let summary = loaded.refresh(Some(file_progress()))?;
    loaded.save()?;

    println!();
    println!(
        "✓ Index refreshed: {} file{} tracked",
        summary.indexed,
        if summary.indexed == 1 { "" } else { "s" }
    );
    if summary.removed > 0 {
        println!("  Removed {} missing entries", summary.removed);
    }

    Ok(())
}
