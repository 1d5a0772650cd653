//! Content index generation and parsing
//!
//! The index (`index.toml`) is a content-addressable ledger of every file the
//! pack tracks: per-item descriptors (metafiles) and plain override files such
//! as configs. Each entry records the file's hash so clients can tell what
//! changed, and `refresh` keeps it consistent with the filesystem.
//!
//! Entries live in an ordered map and are serialized sorted by (file, alias),
//! so the serialized index never depends on directory walk order.
//!
//! # Examples
//!
//! ```no_run
//! use packsmith::{ContentIndex, HashRegistry, IgnoreRules};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let hashes = HashRegistry::new();
//! let mut index = ContentIndex::load(".", "index.toml")?;
//!
//! let summary = index.refresh(&hashes, &IgnoreRules::load(".")?, &["pack.toml"], None)?;
//! println!("Indexed {} files, removed {}", summary.indexed, summary.removed);
//!
//! let digest = index.save()?;
//! println!("Index hash: {}", digest.value);
//! # Ok(())
//! # }
//! ```

use crate::hash::{HashDigest, HashRegistry, ProgressCallback};
use crate::ignore::{IgnoreRules, IGNORE_FILE_NAME};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// Default index filename
pub const INDEX_FILE_NAME: &str = "index.toml";

/// Extension of per-item descriptors
pub const META_EXTENSION: &str = ".pw.toml";

/// Descriptors written by old versions used a plain `.toml` extension
pub const META_EXTENSION_OLD: &str = ".toml";

/// Default hash format for new indexes
pub const DEFAULT_HASH_FORMAT: &str = "sha256";

fn is_false(value: &bool) -> bool {
    !*value
}

/// One tracked file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct IndexEntry {
    /// Forward-slash path relative to the index file
    pub file: String,

    #[serde(default)]
    pub hash: String,

    /// Only stored when it differs from the index default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash_format: Option<String>,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub alias: String,

    #[serde(default, skip_serializing_if = "is_false")]
    pub metafile: bool,

    /// Do not overwrite the file when a client updates
    #[serde(default, skip_serializing_if = "is_false")]
    pub preserve: bool,

    #[serde(skip)]
    found: bool,
}

impl IndexEntry {
    pub fn new(file: impl Into<String>, hash: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            hash: hash.into(),
            hash_format: None,
            alias: String::new(),
            metafile: false,
            preserve: false,
            found: false,
        }
    }

    /// Effective hash format given the index default
    pub fn format<'a>(&'a self, default_format: &'a str) -> &'a str {
        self.hash_format.as_deref().unwrap_or(default_format)
    }

    fn update(&mut self, format: Option<String>, hash: &str, mark_meta: bool) {
        self.hash = hash.to_string();
        self.hash_format = format;
        self.found = true;
        if mark_meta {
            self.metafile = true;
        }
    }
}

/// A path is tracked either once or under several aliases
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexSlot {
    Single(IndexEntry),
    Aliased(BTreeMap<String, IndexEntry>),
}

impl IndexSlot {
    pub fn entries(&self) -> Vec<&IndexEntry> {
        match self {
            IndexSlot::Single(entry) => vec![entry],
            IndexSlot::Aliased(map) => map.values().collect(),
        }
    }

    fn entries_mut(&mut self) -> Vec<&mut IndexEntry> {
        match self {
            IndexSlot::Single(entry) => vec![entry],
            IndexSlot::Aliased(map) => map.values_mut().collect(),
        }
    }

    pub fn is_metafile(&self) -> bool {
        self.entries().iter().any(|e| e.metafile)
    }

    pub fn hash(&self) -> Option<&str> {
        self.entries().first().map(|e| e.hash.as_str())
    }

    fn is_found(&self) -> bool {
        self.entries().iter().any(|e| e.found)
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct IndexToml {
    #[serde(default)]
    hash_format: String,
    #[serde(default)]
    files: Vec<IndexEntry>,
}

/// Result of a [`ContentIndex::refresh`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshSummary {
    /// Files hashed during the walk
    pub indexed: usize,
    /// Entries dropped because their file no longer exists
    pub removed: usize,
}

/// The pack's content index
#[derive(Debug, Clone)]
pub struct ContentIndex {
    /// Default hash format; entries with this format omit it
    pub hash_format: String,
    files: BTreeMap<String, IndexSlot>,
    /// Directory the index paths are relative to
    root: PathBuf,
    /// Index filename relative to the pack root
    file_name: String,
}

impl ContentIndex {
    /// Create an empty index rooted at the directory containing `file_name`
    pub fn new<P: AsRef<Path>>(pack_root: P, file_name: &str, hash_format: &str) -> Self {
        let index_path = pack_root.as_ref().join(file_name);
        let root = index_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| pack_root.as_ref().to_path_buf());
        Self {
            hash_format: hash_format.to_string(),
            files: BTreeMap::new(),
            root,
            file_name: file_name.to_string(),
        }
    }

    /// Load the index; a missing or empty file yields an empty index
    pub fn load<P: AsRef<Path>>(pack_root: P, file_name: &str) -> Result<Self> {
        let mut index = Self::new(&pack_root, file_name, DEFAULT_HASH_FORMAT);
        let path = index.path();
        if !path.exists() {
            return Ok(index);
        }

        let contents = fs::read_to_string(&path)?;
        index.load_str(&contents)?;
        Ok(index)
    }

    fn load_str(&mut self, contents: &str) -> Result<()> {
        let raw: IndexToml = toml::from_str(contents)
            .map_err(|e| Error::Malformed(format!("Failed to parse index: {}", e)))?;
        if !raw.hash_format.is_empty() {
            self.hash_format = raw.hash_format;
        }

        for mut entry in raw.files {
            entry.file = clean_path(&entry.file);
            if entry.alias == "." {
                entry.alias.clear();
            }
            if entry.hash_format.as_deref() == Some(self.hash_format.as_str()) {
                entry.hash_format = None;
            }
            self.insert_entry(entry);
        }
        Ok(())
    }

    fn insert_entry(&mut self, entry: IndexEntry) {
        let key = entry.file.clone();
        let slot = match self.files.remove(&key) {
            None => IndexSlot::Single(entry),
            Some(IndexSlot::Single(existing)) if existing.alias == entry.alias => {
                IndexSlot::Single(entry)
            }
            Some(IndexSlot::Single(existing)) => {
                let mut map = BTreeMap::new();
                map.insert(existing.alias.clone(), existing);
                map.insert(entry.alias.clone(), entry);
                IndexSlot::Aliased(map)
            }
            Some(IndexSlot::Aliased(mut map)) => {
                map.insert(entry.alias.clone(), entry);
                IndexSlot::Aliased(map)
            }
        };
        self.files.insert(key, slot);
    }

    /// Absolute path of the index file
    pub fn path(&self) -> PathBuf {
        self.root.join(
            Path::new(&self.file_name)
                .file_name()
                .unwrap_or_else(|| INDEX_FILE_NAME.as_ref()),
        )
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn get(&self, rel_path: &str) -> Option<&IndexSlot> {
        self.files.get(&clean_path(rel_path))
    }

    /// Every slot, ordered by path
    pub fn slots(&self) -> impl Iterator<Item = (&String, &IndexSlot)> {
        self.files.iter()
    }

    /// Upsert the entry for `rel_path`
    ///
    /// Every alias sharing the path receives the new hash. `mark_meta = false`
    /// never clears an existing metafile flag.
    pub fn update_entry(&mut self, rel_path: &str, format: &str, hash: &str, mark_meta: bool) {
        let path = clean_path(rel_path);
        let stored_format = if format.eq_ignore_ascii_case(&self.hash_format) {
            None
        } else {
            Some(format.to_ascii_lowercase())
        };

        match self.files.get_mut(&path) {
            Some(slot) => {
                for entry in slot.entries_mut() {
                    entry.update(stored_format.clone(), hash, mark_meta);
                }
            }
            None => {
                let mut entry = IndexEntry::new(path.clone(), hash);
                entry.hash_format = stored_format;
                entry.metafile = mark_meta;
                entry.found = true;
                self.files.insert(path, IndexSlot::Single(entry));
            }
        }
    }

    /// Upsert by filesystem path, which must live under the index root
    pub fn update_file<P: AsRef<Path>>(
        &mut self,
        path: P,
        digest: &HashDigest,
        mark_meta: bool,
    ) -> Result<()> {
        let rel = self.rel_path(path)?;
        self.update_entry(&rel, &digest.format, &digest.value, mark_meta);
        Ok(())
    }

    /// Delete a path and all of its aliases; returns whether it was tracked
    pub fn remove(&mut self, rel_path: &str) -> bool {
        self.files.remove(&clean_path(rel_path)).is_some()
    }

    /// Every metafile path, ordered
    pub fn metafiles(&self) -> Vec<String> {
        self.files
            .iter()
            .filter(|(_, slot)| slot.is_metafile())
            .map(|(path, _)| path.clone())
            .collect()
    }

    /// Find the descriptor for a slug, tolerating the legacy extension
    pub fn find_by_slug(&self, slug: &str) -> Option<String> {
        self.files
            .iter()
            .filter(|(_, slot)| slot.is_metafile())
            .find(|(path, _)| {
                let base = path.rsplit('/').next().unwrap_or(path);
                let stem = base
                    .strip_suffix(META_EXTENSION)
                    .or_else(|| base.strip_suffix(META_EXTENSION_OLD))
                    .unwrap_or(base);
                stem == slug
            })
            .map(|(path, _)| path.clone())
    }

    /// Index-relative forward-slash path for a filesystem path
    pub fn rel_path<P: AsRef<Path>>(&self, path: P) -> Result<String> {
        let path = path.as_ref();
        let rel = if path.is_absolute() {
            path.strip_prefix(&self.root).map_err(|_| {
                Error::InvalidOperation(format!(
                    "{} is outside the pack directory {}",
                    path.display(),
                    self.root.display()
                ))
            })?
        } else {
            path
        };

        let parts: Vec<String> = rel
            .components()
            .filter_map(|c| match c {
                Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect();
        Ok(parts.join("/"))
    }

    /// Filesystem path for an index-relative path
    pub fn resolve_path(&self, rel_path: &str) -> PathBuf {
        rel_path
            .split('/')
            .filter(|p| !p.is_empty())
            .fold(self.root.clone(), |acc, part| acc.join(part))
    }

    /// Rescan the pack directory
    ///
    /// Ignored directories are not descended into. `skip` lists extra
    /// index-relative files (such as the pack manifest) that are never tracked;
    /// the index file and the ignore file are always skipped. Every remaining
    /// file is hashed with the default format, descriptors are flagged as
    /// metafiles, and entries whose file was not seen are dropped.
    pub fn refresh(
        &mut self,
        hashes: &HashRegistry,
        ignore: &IgnoreRules,
        skip: &[&str],
        progress: Option<ProgressCallback>,
    ) -> Result<RefreshSummary> {
        for slot in self.files.values_mut() {
            for entry in slot.entries_mut() {
                entry.found = false;
            }
        }

        let index_rel = self.rel_path(self.path())?;
        let mut skipped: Vec<String> = skip.iter().map(|s| clean_path(s)).collect();
        skipped.push(index_rel);
        skipped.push(IGNORE_FILE_NAME.to_string());

        let root = self.root.clone();
        let mut to_hash = Vec::new();
        let walker = WalkDir::new(&root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| {
                if e.depth() == 0 || !e.file_type().is_dir() {
                    return true;
                }
                match e.path().strip_prefix(&root) {
                    Ok(rel) => !ignore.is_ignored(&to_slash(rel), true),
                    Err(_) => true,
                }
            });

        for entry in walker {
            let entry = entry.map_err(std::io::Error::from)?;
            if !entry.file_type().is_file() {
                continue;
            }
            let rel = self.rel_path(entry.path())?;
            if skipped.contains(&rel) || ignore.is_ignored(&rel, false) {
                debug!("Skipping {}", rel);
                continue;
            }
            to_hash.push((rel, entry.into_path()));
        }

        let total = to_hash.len() as u64;
        let format = self.hash_format.clone();
        for (i, (rel, path)) in to_hash.iter().enumerate() {
            if let Some(ref cb) = progress {
                cb(rel, i as u64, total);
            }
            let digest = hashes.hash_file(&format, path, None)?;
            let is_meta = rel.ends_with(META_EXTENSION);
            self.update_entry(rel, &digest.format, &digest.value, is_meta);
        }
        if let Some(ref cb) = progress {
            cb("Index refreshed", total, total);
        }

        let before = self.files.len();
        self.files.retain(|path, slot| {
            let keep = slot.is_found();
            if !keep {
                debug!("Removing {} from index", path);
            }
            keep
        });

        Ok(RefreshSummary {
            indexed: to_hash.len(),
            removed: before - self.files.len(),
        })
    }

    /// Serialize the index, entries sorted by (file, alias)
    pub fn to_toml_string(&self) -> Result<String> {
        let files = self
            .files
            .values()
            .flat_map(|slot| slot.entries().into_iter().cloned())
            .collect();
        let raw = IndexToml {
            hash_format: self.hash_format.clone(),
            files,
        };
        Ok(toml::to_string(&raw)?)
    }

    /// Write the index and return the hash of what was written, in the index's own format
    pub fn save(&self) -> Result<HashDigest> {
        let contents = self.to_toml_string()?;
        write_atomic(&self.path(), contents.as_bytes())?;
        HashRegistry::new().hash_bytes(&self.hash_format, contents.as_bytes())
    }
}

/// Write a file by writing a temporary sibling and renaming it into place
pub(crate) fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let file_name = path
        .file_name()
        .ok_or_else(|| Error::InvalidOperation(format!("{} is not a file path", path.display())))?;
    let mut tmp_name = file_name.to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    fs::write(&tmp_path, contents)?;
    fs::rename(&tmp_path, path)?;
    Ok(())
}

fn to_slash(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Lexically clean a forward-slash path: drop `.` and empty parts, fold `..`
fn clean_path(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for part in path.split(['/', '\\']) {
        match part {
            "" | "." => {}
            ".." => {
                if parts.last().is_some_and(|p| *p != "..") {
                    parts.pop();
                } else {
                    parts.push(part);
                }
            }
            other => parts.push(other),
        }
    }
    parts.join("/")
}
