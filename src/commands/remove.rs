use anyhow::Result;
use std::env;
use std::fs;

use super::LoadedPack;

pub fn run(name: String) -> Result<()> {
    let current_dir = env::current_dir()?;

    println!("Loading modpack...");
    let mut loaded = LoadedPack::open(&current_dir)?;
    let (meta_path, record) = loaded.find_record(&name)?;

    let path = loaded.index.resolve_path(&meta_path);
    match fs::remove_file(&path) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            println!("⚠ {} was already deleted", meta_path);
        }
        Err(e) => return Err(e.into()),
    }

    println!("Removing file from index...");
    loaded.index.remove(&meta_path);
    loaded.pack.remove_record(&record.slug);
    loaded.save()?;

    println!("✓ {} removed successfully!", name);
    Ok(())
}
