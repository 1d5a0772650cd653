use anyhow::{anyhow, bail, Result};
use packsmith::{Config, UpdateOutcome, UpdaterRegistry};
use std::env;

use super::{install_dependencies, LoadedPack};

pub fn run(name: Option<String>, all: bool) -> Result<()> {
    let current_dir = env::current_dir()?;

    println!("Loading modpack...");
    let mut loaded = LoadedPack::open(&current_dir)?;
    let config = Config::load()?;
    let registry = UpdaterRegistry::from_config(&config)?;

    println!("Checking for updates...");
    let outcomes = match (name, all) {
        (Some(name), _) => {
            let (_, record) = loaded.find_record(&name)?;
            vec![registry.update_one(&loaded.pack, &record.slug)?]
        }
        (None, true) => registry.update_all(&loaded.pack)?.outcomes,
        (None, false) => bail!("Specify a mod to update, or use --all to update everything"),
    };
    let single = outcomes.len() == 1;

    let mut updated = 0;
    let mut failed = 0;
    let mut messages = Vec::new();

    for outcome in outcomes {
        match outcome {
            UpdateOutcome::Updated {
                slug,
                summary,
                record,
                state,
            } => {
                println!("  ✓ {}: {}", slug, summary);
                loaded.pack.write_record(&mut loaded.index, record)?;
                updated += 1;

                let selected = state.selected_file();
                let client = registry.get(state.source()).and_then(|u| u.source_client());
                if let (Some((_, project, file)), Some(client)) = (selected, client) {
                    match install_dependencies(&mut loaded, client, &config, project, file) {
                        Ok(names) => {
                            for dep in names {
                                println!("    + {} (new dependency)", dep);
                            }
                        }
                        Err(e) => println!("    ⚠ Could not resolve new dependencies: {}", e),
                    }
                }
            }
            UpdateOutcome::UpToDate { slug } => {
                if single {
                    println!("  ✓ {} is already up to date", slug);
                }
            }
            UpdateOutcome::SkippedPinned { slug } => {
                println!("  ⚠ {} is pinned; skipping", slug);
            }
            UpdateOutcome::Unmanaged { slug } => {
                println!("  ⚠ {} has no known update source; skipping", slug);
            }
            UpdateOutcome::Failed { slug, error } => {
                println!("  ✗ {}: {}", slug, error);
                messages.push(format!("{}: {}", slug, error));
                failed += 1;
            }
        }
    }

    if updated > 0 {
        loaded.save()?;
    }

    println!();
    if updated == 0 && failed == 0 {
        println!("✓ All files are up to date!");
    } else if updated > 0 {
        println!(
            "✓ {} file{} updated",
            updated,
            if updated == 1 { "" } else { "s" }
        );
    }

    if failed > 0 && updated == 0 {
        return Err(anyhow!(
            "{} update check{} failed:\n  {}",
            failed,
            if failed == 1 { "" } else { "s" },
            messages.join("\n  ")
        ));
    }
    if failed > 0 {
        println!("⚠ {} file{} could not be updated", failed, if failed == 1 { "" } else { "s" });
    }

    Ok(())
}
