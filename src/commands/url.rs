use anyhow::{anyhow, bail, Result};
use packsmith::record::slugify;
use packsmith::{Config, Download, Downloader, ModRecord};
use std::env;

use super::{byte_progress, LoadedPack};

/// Hosts with a dedicated `add` source that also tracks updates
const MANAGED_HOSTS: [(&str, &str); 3] = [
    ("modrinth.com", "add modrinth"),
    ("curseforge.com", "add curseforge"),
    ("forgecdn.net", "add curseforge"),
];

/// Add a file by direct download link, without update metadata
pub fn add(name: String, link: String, force: bool, meta_name: Option<String>) -> Result<()> {
    let parsed = ::url::Url::parse(&link).map_err(|e| anyhow!("Failed to parse URL: {}", e))?;
    if parsed.scheme() != "https" && parsed.scheme() != "http" {
        bail!("Unsupported URL scheme: {}", parsed.scheme());
    }
    let host = parsed.host_str().unwrap_or_default();
    if !force {
        if let Some((_, command)) = MANAGED_HOSTS.iter().find(|(h, _)| host.ends_with(h)) {
            bail!(
                "Consider using 'packsmith {} {}' instead; \
                 use --force to add this file without update metadata",
                command,
                link
            );
        }
    }
    let filename = parsed
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| anyhow!("URL has no file name: {}", link))?
        .to_string();

    let current_dir = env::current_dir()?;
    let config = Config::load()?;

    println!("Loading modpack...");
    let mut loaded = LoadedPack::open(&current_dir)?;

    let slug = match meta_name {
        Some(meta_name) => meta_name,
        None => slugify(&name)?,
    };
    if loaded.pack.record(&slug).is_some() {
        bail!(
            "A mod named '{}' already exists; pick another with --meta-name",
            slug
        );
    }

    println!("Downloading {}...", filename);
    let downloader = Downloader::from_config(&config)?;
    let digest = downloader.hash_url(&link, "sha256", Some(byte_progress()))?;

    let record = ModRecord::new(
        &config.index.meta_folder,
        &slug,
        name.clone(),
        filename,
        Download::from_url(link.clone(), digest),
    );
    let meta_path = record.meta_path.clone();
    loaded.pack.write_record(&mut loaded.index, record)?;
    loaded.refresh(None)?;
    loaded.save()?;

    println!("✓ Added {} ({}) from: {}", name, meta_path, link);
    Ok(())
}
