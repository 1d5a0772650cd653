//! Pack manifest (`pack.toml`) handling
//!
//! The manifest names the pack, pins the game and loader versions, points at
//! the content index and carries pack-level options. Once loaded it also holds
//! every [`ModRecord`] the index lists, keyed by slug.
//!
//! # Examples
//!
//! ```no_run
//! use packsmith::PackManifest;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut pack = PackManifest::load(".")?;
//! let index = pack.open_index(".")?;
//! pack.load_records(&index)?;
//!
//! println!("{} targets {}", pack.pack_name(), pack.mc_version()?);
//! for record in pack.records() {
//!     println!("  {} ({})", record.name, record.side);
//! }
//! # Ok(())
//! # }
//! ```

use crate::hash::HashDigest;
use crate::index::{write_atomic, ContentIndex, DEFAULT_HASH_FORMAT, INDEX_FILE_NAME};
use crate::record::ModRecord;
use crate::version::sort_and_dedupe;
use crate::{Error, Result};
use semver::{Version, VersionReq};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

/// The manifest filename
pub const PACK_FILE_NAME: &str = "pack.toml";

/// Format written by this version
pub const CURRENT_PACK_FORMAT: &str = "packwiz:1.1.0";

const PACK_FORMAT_PREFIX: &str = "packwiz:";
const ACCEPTABLE_VERSIONS_KEY: &str = "acceptable-game-versions";

/// `[index]` section of the manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct IndexRef {
    #[serde(default)]
    pub file: String,
    #[serde(default)]
    pub hash_format: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub hash: String,
}

/// Pack manifest file (`pack.toml`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PackManifest {
    pub name: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub author: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,

    #[serde(default)]
    pub pack_format: String,

    pub index: IndexRef,

    /// Loader name to version; `minecraft` is mandatory
    #[serde(default)]
    pub versions: BTreeMap<String, String>,

    /// Per-format export settings, passed through untouched
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub export: BTreeMap<String, toml::Table>,

    #[serde(default, skip_serializing_if = "toml::Table::is_empty")]
    pub options: toml::Table,

    #[serde(skip)]
    records: BTreeMap<String, ModRecord>,
}

impl PackManifest {
    /// Create a manifest for a new pack
    pub fn new(name: &str, minecraft: &str, hash_format: &str) -> Self {
        let mut versions = BTreeMap::new();
        versions.insert("minecraft".to_string(), minecraft.to_string());
        Self {
            name: name.to_string(),
            author: String::new(),
            version: String::new(),
            description: String::new(),
            pack_format: CURRENT_PACK_FORMAT.to_string(),
            index: IndexRef {
                file: INDEX_FILE_NAME.to_string(),
                hash_format: hash_format.to_string(),
                hash: String::new(),
            },
            versions,
            export: BTreeMap::new(),
            options: toml::Table::new(),
            records: BTreeMap::new(),
        }
    }

    /// Load and validate `pack.toml` from a directory
    pub fn load<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let path = dir.as_ref().join(PACK_FILE_NAME);

        if !path.exists() {
            return Err(Error::NoPackFile(dir.as_ref().display().to_string()));
        }

        let contents = fs::read_to_string(&path)?;
        let mut pack = Self::from_toml_str(&contents)?;
        pack.validate()?;
        Ok(pack)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        toml::from_str(contents)
            .map_err(|e| Error::Malformed(format!("Failed to parse {}: {}", PACK_FILE_NAME, e)))
    }

    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string(self)?)
    }

    /// Save `pack.toml` to a directory (temporary sibling, then rename)
    pub fn save<P: AsRef<Path>>(&self, dir: P) -> Result<()> {
        let contents = self.to_toml_string()?;
        write_atomic(&dir.as_ref().join(PACK_FILE_NAME), contents.as_bytes())
    }

    pub fn exists<P: AsRef<Path>>(dir: P) -> bool {
        dir.as_ref().join(PACK_FILE_NAME).exists()
    }

    /// Check and normalize the pack format and index reference
    pub fn validate(&mut self) -> Result<()> {
        if self.pack_format.is_empty() {
            info!("Modpack manifest has no pack-format field; assuming {}", CURRENT_PACK_FORMAT);
            self.pack_format = CURRENT_PACK_FORMAT.to_string();
        }
        if self.pack_format == "packwiz:1.0.0" {
            info!("Migrating pack to {} format", CURRENT_PACK_FORMAT);
            self.pack_format = CURRENT_PACK_FORMAT.to_string();
        }

        let raw_version = self
            .pack_format
            .strip_prefix(PACK_FORMAT_PREFIX)
            .ok_or_else(|| {
                Error::Malformed(format!(
                    "pack-format '{}' does not indicate a valid pack",
                    self.pack_format
                ))
            })?;
        let version = Version::parse(raw_version).map_err(|e| {
            Error::Malformed(format!("pack-format field is not valid semver: {}", e))
        })?;

        if !VersionReq::parse("~1")?.matches(&version) {
            return Err(Error::Unsupported(format!(
                "pack-format {} is incompatible with this version of packsmith; please update",
                self.pack_format
            )));
        }
        if !VersionReq::parse("~1.1")?.matches(&version) {
            warn!(
                "Modpack uses pack-format {}, newer than this version of packsmith supports. \
                 Update packsmith for new features and bugfixes!",
                self.pack_format
            );
        }

        if self.index.file.is_empty() {
            self.index.file = INDEX_FILE_NAME.to_string();
        }
        if self.index.hash_format.is_empty() {
            self.index.hash_format = DEFAULT_HASH_FORMAT.to_string();
        }
        Ok(())
    }

    /// `name-version`, `name`, or `export` when the pack is unnamed
    pub fn pack_name(&self) -> String {
        if self.name.is_empty() {
            "export".to_string()
        } else if self.version.is_empty() {
            self.name.clone()
        } else {
            format!("{}-{}", self.name, self.version)
        }
    }

    pub fn mc_version(&self) -> Result<&str> {
        self.versions
            .get("minecraft")
            .map(String::as_str)
            .ok_or_else(|| Error::NotFound("no minecraft version specified in modpack".to_string()))
    }

    /// Accepted game versions plus the pack's own, ascending; the last is preferred
    pub fn supported_game_versions(&self) -> Result<Vec<String>> {
        let mut versions = self.acceptable_game_versions();
        versions.push(self.mc_version()?.to_string());
        sort_and_dedupe(&mut versions);
        Ok(versions)
    }

    pub fn acceptable_game_versions(&self) -> Vec<String> {
        match self.options.get(ACCEPTABLE_VERSIONS_KEY) {
            Some(toml::Value::Array(values)) => values
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Replace the accepted-version list, kept sorted and deduplicated
    pub fn set_acceptable_game_versions(&mut self, mut versions: Vec<String>) {
        sort_and_dedupe(&mut versions);
        if versions.is_empty() {
            self.options.remove(ACCEPTABLE_VERSIONS_KEY);
            return;
        }
        let values = versions.into_iter().map(toml::Value::String).collect();
        self.options
            .insert(ACCEPTABLE_VERSIONS_KEY.to_string(), toml::Value::Array(values));
    }

    pub fn add_acceptable_game_version(&mut self, version: &str) {
        let mut versions = self.acceptable_game_versions();
        versions.push(version.to_string());
        self.set_acceptable_game_versions(versions);
    }

    /// Returns whether the version was in the list
    pub fn remove_acceptable_game_version(&mut self, version: &str) -> bool {
        let mut versions = self.acceptable_game_versions();
        let before = versions.len();
        versions.retain(|v| v != version);
        let removed = versions.len() != before;
        self.set_acceptable_game_versions(versions);
        removed
    }

    /// Loaders whose content can run in this pack
    ///
    /// Quilt also runs Fabric content and NeoForge also runs Forge content.
    pub fn compatible_loaders(&self) -> Vec<String> {
        let mut loaders = Vec::new();
        if self.versions.contains_key("quilt") {
            loaders.extend(["quilt", "fabric"]);
        } else if self.versions.contains_key("fabric") {
            loaders.push("fabric");
        }
        if self.versions.contains_key("neoforge") {
            loaders.extend(["neoforge", "forge"]);
        } else if self.versions.contains_key("forge") {
            loaders.push("forge");
        }
        loaders.into_iter().map(str::to_string).collect()
    }

    /// Exactly the loaders configured in `[versions]`
    pub fn loaders(&self) -> Vec<String> {
        ["quilt", "fabric", "neoforge", "forge"]
            .into_iter()
            .filter(|l| self.versions.contains_key(*l))
            .map(str::to_string)
            .collect()
    }

    /// Record the hash of a freshly written index
    pub fn refresh_index_hash(&mut self, index: &ContentIndex, digest: &HashDigest) {
        self.index.hash_format = index.hash_format.clone();
        self.index.hash = digest.value.clone();
    }

    /// Load the content index this manifest points at
    pub fn open_index<P: AsRef<Path>>(&self, dir: P) -> Result<ContentIndex> {
        let mut index = ContentIndex::load(dir, &self.index.file)?;
        if index.is_empty() && !self.index.hash_format.is_empty() {
            index.hash_format = self.index.hash_format.clone();
        }
        Ok(index)
    }

    /// Save the index, chain its hash into the manifest, then save the manifest
    pub fn save_with_index<P: AsRef<Path>>(&mut self, dir: P, index: &ContentIndex) -> Result<()> {
        let digest = index.save()?;
        self.refresh_index_hash(index, &digest);
        self.save(dir)
    }

    /// Load every descriptor the index lists
    pub fn load_records(&mut self, index: &ContentIndex) -> Result<()> {
        self.records.clear();
        for meta_path in index.metafiles() {
            let record = ModRecord::load(index.root(), &meta_path)?;
            if let Some(existing) = self.records.get(&record.slug) {
                warn!(
                    "Duplicate slug '{}' in {} and {}; keeping the first",
                    record.slug, existing.meta_path, record.meta_path
                );
                continue;
            }
            self.records.insert(record.slug.clone(), record);
        }
        Ok(())
    }

    pub fn records(&self) -> impl Iterator<Item = &ModRecord> {
        self.records.values()
    }

    pub fn record(&self, slug: &str) -> Option<&ModRecord> {
        self.records.get(slug)
    }

    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    pub fn insert_record(&mut self, record: ModRecord) -> Option<ModRecord> {
        self.records.insert(record.slug.clone(), record)
    }

    pub fn remove_record(&mut self, slug: &str) -> Option<ModRecord> {
        self.records.remove(slug)
    }

    /// Write a descriptor, index it as a metafile and keep it in the collection
    pub fn write_record(&mut self, index: &mut ContentIndex, record: ModRecord) -> Result<()> {
        let digest = record.save(index.root())?;
        index.update_entry(&record.meta_path, &digest.format, &digest.value, true);
        self.insert_record(record);
        Ok(())
    }
}
