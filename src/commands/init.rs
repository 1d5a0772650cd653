use anyhow::{bail, Result};
use packsmith::{Config, ContentIndex, PackManifest, PACK_FILE_NAME};
use std::env;

use super::{file_progress, LoadedPack};

const LOADERS: [&str; 4] = ["fabric", "quilt", "forge", "neoforge"];

pub fn run(
    name: Option<String>,
    author: Option<String>,
    version: Option<String>,
    mc_version: String,
    modloader: Option<String>,
    loader_version: Option<String>,
    reinit: bool,
) -> Result<()> {
    let current_dir = env::current_dir()?;

    if PackManifest::exists(&current_dir) && !reinit {
        println!("✓ {} already exists in this directory", PACK_FILE_NAME);
        println!();
        println!("To recreate it, run 'packsmith init --reinit'.");
        return Ok(());
    }

    let name = match name {
        Some(name) => name,
        None => current_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "Modpack".to_string()),
    };

    let config = Config::load()?;
    let mut pack = PackManifest::new(&name, &mc_version, &config.index.hash_format);
    pack.author = author.unwrap_or_default();
    pack.version = version.unwrap_or_else(|| "1.0.0".to_string());

    match (modloader.as_deref(), loader_version) {
        (None, _) | (Some("none"), _) => {}
        (Some(loader), Some(loader_version)) if LOADERS.contains(&loader) => {
            pack.versions.insert(loader.to_string(), loader_version);
        }
        (Some(loader), None) if LOADERS.contains(&loader) => {
            bail!("--loader-version is required with --modloader {}", loader)
        }
        (Some(loader), _) => bail!(
            "Unknown mod loader '{}' (expected one of {}, or none)",
            loader,
            LOADERS.join(", ")
        ),
    }

    println!("Initializing pack {}...", pack.pack_name());

    let index = ContentIndex::new(&current_dir, &pack.index.file, &pack.index.hash_format);
    let mut loaded = LoadedPack {
        root: current_dir,
        pack,
        index,
    };
    let summary = loaded.refresh(Some(file_progress()))?;
    loaded.save()?;

    println!();
    println!("✓ Created {} (Minecraft {})", PACK_FILE_NAME, mc_version);
    if summary.indexed > 0 {
        println!("  Indexed {} existing files", summary.indexed);
    }
    println!();
    println!("Next steps:");
    println!("  • Add content: packsmith add modrinth <project>");
    println!("  • View managed content: packsmith list");
    println!();

    Ok(())
}
