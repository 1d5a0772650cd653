use anyhow::Result;
use std::env;

use super::LoadedPack;

pub fn run(name: String, pinned: bool) -> Result<()> {
    let current_dir = env::current_dir()?;

    println!("Loading modpack...");
    let mut loaded = LoadedPack::open(&current_dir)?;
    let (_, mut record) = loaded.find_record(&name)?;

    let message = if pinned { "pinned" } else { "unpinned" };
    if record.pin == pinned {
        println!("✓ {} is already {}", name, message);
        return Ok(());
    }

    record.pin = pinned;
    let LoadedPack { pack, index, .. } = &mut loaded;
    pack.write_record(index, record)?;
    loaded.save()?;

    println!("✓ {} {} successfully!", name, message);
    Ok(())
}
