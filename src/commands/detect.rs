use anyhow::Result;
use packsmith::hash::Murmur2Cf;
use packsmith::sources::curseforge::{self, CurseForgeClient};
use packsmith::{Config, SelectionContext, SourceClient};
use std::collections::{BTreeMap, BTreeSet};
use std::env;
use std::fs;
use std::path::PathBuf;
use walkdir::WalkDir;

use super::LoadedPack;

const JAR_EXTENSIONS: [&str; 2] = ["jar", "litemod"];

/// Match loose jars in the mods folder against CurseForge and replace each
/// match with a descriptor
pub fn run() -> Result<()> {
    let current_dir = env::current_dir()?;
    let config = Config::load()?;
    let client = CurseForgeClient::new(
        config.sources.curseforge_url.clone(),
        config.sources.curseforge_api_key.clone(),
    )?;

    println!("Loading modpack...");
    let mut loaded = LoadedPack::open(&current_dir)?;
    let managed: BTreeSet<String> = loaded.pack.records().map(|r| r.dest_path()).collect();

    let folder = loaded.root.join(&config.index.meta_folder);
    let mut paths: BTreeMap<u32, PathBuf> = BTreeMap::new();
    for entry in WalkDir::new(&folder).into_iter().filter_map(|e| e.ok()) {
        let path = entry.path();
        let is_jar = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| JAR_EXTENSIONS.contains(&e));
        if !entry.file_type().is_file() || !is_jar {
            continue;
        }
        let rel_path = loaded.index.rel_path(path)?;
        if managed.contains(&rel_path) {
            continue;
        }

        println!("Hashing {}", rel_path);
        let mut hasher = Murmur2Cf::new();
        hasher.update(&fs::read(path)?);
        paths.insert(hasher.finish(), path.to_path_buf());
    }

    if paths.is_empty() {
        println!("✓ No unmanaged files in {}", config.index.meta_folder);
        return Ok(());
    }
    println!("Found {} files, submitting...", paths.len());

    let fingerprints: Vec<u32> = paths.keys().copied().collect();
    let report = client.match_fingerprints(&fingerprints)?;
    println!("✓ Matched {} files", report.matches.len());
    if !report.unmatched.is_empty() {
        println!("⚠ Failed to match the following {} files:", report.unmatched.len());
        for fingerprint in &report.unmatched {
            if let Some(path) = paths.get(fingerprint) {
                println!("  {} ({})", path.display(), fingerprint);
            }
        }
    }
    if report.matches.is_empty() {
        return Ok(());
    }

    println!("Retrieving metadata...");
    let ctx = SelectionContext::from_pack(&loaded.pack)?;
    let mut ids: Vec<String> = report.matches.iter().map(|m| m.project_id.to_string()).collect();
    ids.sort();
    ids.dedup();
    let projects: BTreeMap<String, _> = client
        .projects(&ids, &ctx)?
        .into_iter()
        .map(|p| (p.id.clone(), p))
        .collect();

    let mut added = 0;
    for matched in &report.matches {
        let Some(project) = projects.get(&matched.project_id.to_string()) else {
            println!("  ✗ No metadata for CurseForge project {}", matched.project_id);
            continue;
        };
        let record = curseforge::new_record(project, &matched.file, &config.index.meta_folder)?;
        if loaded.pack.record(&record.slug).is_some() {
            println!("  ⚠ {} is already in the pack; skipping", record.slug);
            continue;
        }

        println!("  ✓ {} ({})", record.name, record.filename);
        loaded.pack.write_record(&mut loaded.index, record)?;
        if let Some(path) = paths.get(&matched.fingerprint) {
            fs::remove_file(path)?;
        }
        added += 1;
    }

    if added > 0 {
        loaded.refresh(None)?;
        loaded.save()?;
    }
    println!("Detection complete! Replaced {} files with descriptors", added);
    Ok(())
}
