pub mod acceptable_versions;
pub mod add;
pub mod config;
pub mod detect;
pub mod init;
pub mod list;
pub mod migrate;
pub mod pin;
pub mod refresh;
pub mod rehash;
pub mod remove;
pub mod update;
pub mod url;

use anyhow::{anyhow, Result};
use indicatif::{ProgressBar, ProgressStyle};
use packsmith::sources::{CandidateFile, SourceProject};
use packsmith::{
    Config, ContentIndex, DependencyResolver, HashRegistry, IgnoreRules, ModRecord, PackManifest,
    ProgressCallback, RefreshSummary, SelectionContext, SourceClient, PACK_FILE_NAME,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A pack opened for a command: manifest, index and every descriptor
pub struct LoadedPack {
    pub root: PathBuf,
    pub pack: PackManifest,
    pub index: ContentIndex,
}

impl LoadedPack {
    pub fn open(root: &Path) -> Result<Self> {
        let mut pack = PackManifest::load(root)?;
        let index = pack.open_index(root)?;
        pack.load_records(&index)?;
        Ok(Self {
            root: root.to_path_buf(),
            pack,
            index,
        })
    }

    /// Descriptor path and record for a slug as typed by the user
    pub fn find_record(&self, name: &str) -> Result<(String, ModRecord)> {
        let meta_path = self.index.find_by_slug(name).ok_or_else(|| {
            anyhow!(
                "Can't find '{}'. Run 'packsmith refresh' and use the name of the .pw.toml file \
                 (defaults to the project slug)",
                name
            )
        })?;
        let record = ModRecord::load(&self.root, &meta_path)?;
        Ok((meta_path, record))
    }

    /// Re-scan the pack directory into the index
    pub fn refresh(&mut self, progress: Option<ProgressCallback>) -> Result<RefreshSummary> {
        let rules = IgnoreRules::load(&self.root)?;
        Ok(self
            .index
            .refresh(&HashRegistry::new(), &rules, &[PACK_FILE_NAME], progress)?)
    }

    /// Write the index, then the manifest with the new index hash
    pub fn save(&mut self) -> Result<()> {
        self.pack.save_with_index(&self.root, &self.index)?;
        Ok(())
    }
}

/// Resolve the dependencies of a newly selected file and write a descriptor
/// for each; nothing is written unless every descriptor can be built
pub fn install_dependencies(
    loaded: &mut LoadedPack,
    client: &dyn SourceClient,
    config: &Config,
    project: &SourceProject,
    file: &CandidateFile,
) -> Result<Vec<String>> {
    let resolver = DependencyResolver::with_max_cycles(client, config.resolver.max_cycles);
    let resolved = resolver.resolve(&project.id, file, &loaded.pack)?;
    if resolved.is_empty() {
        return Ok(Vec::new());
    }

    let ctx = SelectionContext::from_pack(&loaded.pack)?;
    let ecosystem = client.ecosystem();
    let records = resolved
        .iter()
        .map(|dep| ecosystem.new_record(&dep.project, &dep.file, &ctx, &config.index.meta_folder))
        .collect::<packsmith::Result<Vec<_>>>()?;

    let mut names = Vec::with_capacity(records.len());
    for record in records {
        names.push(record.name.clone());
        loaded.pack.write_record(&mut loaded.index, record)?;
    }
    Ok(names)
}

/// An indicatif bar driven through a [`ProgressCallback`]
pub fn progress_callback(template: &str) -> ProgressCallback {
    let bar = ProgressBar::new(0);
    bar.set_style(
        ProgressStyle::default_bar()
            .template(template)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );

    Arc::new(move |msg: &str, current: u64, total: u64| {
        bar.set_length(total);
        bar.set_position(current);
        if current >= total && total > 0 {
            bar.finish_with_message(format!("✓ {}", msg));
        } else {
            bar.set_message(msg.to_string());
        }
    })
}

/// Progress over a number of files
pub fn file_progress() -> ProgressCallback {
    progress_callback("{spinner:.green} [{bar:30.cyan/blue}] {pos}/{len} {msg}")
}

/// Progress over the bytes of one download
pub fn byte_progress() -> ProgressCallback {
    progress_callback("  [{bar:30.cyan/blue}] {bytes}/{total_bytes} {msg}")
}
