use anyhow::{bail, Result};
use std::env;

use super::LoadedPack;

/// Move the pack to another Minecraft version, optionally updating every mod
pub fn minecraft(version: String, update: bool) -> Result<()> {
    let version = version.trim().to_string();
    if version.is_empty() {
        bail!("Minecraft version must not be empty");
    }

    let current_dir = env::current_dir()?;

    println!("Loading modpack...");
    let mut loaded = LoadedPack::open(&current_dir)?;
    if loaded.pack.mc_version()? == version {
        println!("✓ Minecraft version is already {}", version);
        return Ok(());
    }

    loaded
        .pack
        .versions
        .insert("minecraft".to_string(), version.clone());
    loaded.save()?;
    println!("✓ Updated Minecraft version to {}", version);

    if update {
        super::update::run(None, true)?;
    } else {
        println!("Run 'packsmith update --all' to move your mods to {}", version);
    }
    Ok(())
}
