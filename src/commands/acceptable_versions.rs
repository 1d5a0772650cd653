use anyhow::Result;
use packsmith::PackManifest;
use std::env;

pub enum Action {
    List,
    Set(Vec<String>),
    Add(String),
    Remove(String),
}

fn print_versions(pack: &PackManifest) {
    let versions = pack.acceptable_game_versions();
    if versions.is_empty() {
        println!("No acceptable game versions set; only the pack's own version is used.");
    } else {
        println!("Acceptable game versions: {}", versions.join(", "));
    }
}

pub fn run(action: Action) -> Result<()> {
    let current_dir = env::current_dir()?;
    let mut pack = PackManifest::load(&current_dir)?;

    match action {
        Action::List => {
            print_versions(&pack);
            return Ok(());
        }
        Action::Set(versions) => pack.set_acceptable_game_versions(versions),
        Action::Add(version) => pack.add_acceptable_game_version(&version),
        Action::Remove(version) => {
            if !pack.remove_acceptable_game_version(&version) {
                println!("⚠ {} was not in the list", version);
                return Ok(());
            }
        }
    }

    pack.save(&current_dir)?;
    print_versions(&pack);
    Ok(())
}
