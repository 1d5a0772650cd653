//! Per-item descriptors (`<folder>/<slug>.pw.toml`)
//!
//! A [`ModRecord`] describes one managed artifact: where to download it, how
//! to verify it, which side it runs on, and how each source ecosystem
//! identifies it for updates. The `update` table is decoded once at load time
//! into typed [`UpdateSource`] values.

use crate::hash::{HashDigest, HashRegistry};
use crate::index::{write_atomic, META_EXTENSION};
use crate::{Error, Result};
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

fn is_false(value: &bool) -> bool {
    !*value
}

/// Which side of the game an artifact is installed on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Side {
    Server,
    Client,
    /// Also what an empty or missing side means
    #[default]
    Both,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Server => "server",
            Side::Client => "client",
            Side::Both => "both",
        }
    }

    fn is_both(&self) -> bool {
        *self == Side::Both
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Side {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "server" => Ok(Side::Server),
            "client" => Ok(Side::Client),
            "both" | "" => Ok(Side::Both),
            other => Err(Error::Malformed(format!("invalid side '{}'", other))),
        }
    }
}

impl Serialize for Side {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Side {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// How a client obtains the artifact
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DownloadMode {
    /// Fetch `download.url` directly
    #[default]
    Url,
    /// Ask the named source for a download location (e.g. `metadata:curseforge`)
    Metadata(String),
}

impl DownloadMode {
    pub fn curseforge() -> Self {
        DownloadMode::Metadata("curseforge".to_string())
    }

    fn is_url(&self) -> bool {
        *self == DownloadMode::Url
    }
}

impl Serialize for DownloadMode {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            DownloadMode::Url => serializer.serialize_str("url"),
            DownloadMode::Metadata(source) => {
                serializer.serialize_str(&format!("metadata:{}", source))
            }
        }
    }
}

impl<'de> Deserialize<'de> for DownloadMode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        match s.as_str() {
            "" | "url" => Ok(DownloadMode::Url),
            other => match other.strip_prefix("metadata:") {
                Some(source) if !source.is_empty() => Ok(DownloadMode::Metadata(source.to_string())),
                _ => Err(serde::de::Error::custom(format!(
                    "unknown download mode '{}'",
                    other
                ))),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Download {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub hash_format: String,
    pub hash: String,
    #[serde(default, skip_serializing_if = "DownloadMode::is_url")]
    pub mode: DownloadMode,
}

impl Download {
    pub fn from_url(url: impl Into<String>, digest: HashDigest) -> Self {
        Self {
            url: Some(url.into()),
            hash_format: digest.format,
            hash: digest.value,
            mode: DownloadMode::Url,
        }
    }
}

/// Marks an artifact as user-selectable
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModOption {
    #[serde(default)]
    pub optional: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub default: bool,
}

/// `[update.modrinth]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModrinthSource {
    #[serde(rename = "mod-id")]
    pub project_id: String,
    #[serde(rename = "version")]
    pub version_id: String,
}

/// `[update.curseforge]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurseForgeSource {
    #[serde(rename = "project-id")]
    pub project_id: u32,
    #[serde(rename = "file-id")]
    pub file_id: u32,
}

/// `[update.github]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitHubSource {
    /// `owner/repo`
    pub slug: String,
    pub tag: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub branch: String,
    /// Selects the release asset to download
    pub regex: String,
}

/// A typed per-source update descriptor
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateSource {
    Modrinth(ModrinthSource),
    CurseForge(CurseForgeSource),
    GitHub(GitHubSource),
    /// A source this build does not know, kept verbatim
    Other(toml::Table),
}

impl UpdateSource {
    /// Decode the raw table stored under `update.<source>`
    pub fn parse(source: &str, table: toml::Table) -> Result<Self> {
        fn decode<T: serde::de::DeserializeOwned>(source: &str, table: toml::Table) -> Result<T> {
            toml::Value::Table(table).try_into().map_err(|e| {
                Error::Malformed(format!("invalid [update.{}] table: {}", source, e))
            })
        }

        match source {
            "modrinth" => Ok(UpdateSource::Modrinth(decode(source, table)?)),
            "curseforge" => Ok(UpdateSource::CurseForge(decode(source, table)?)),
            "github" => Ok(UpdateSource::GitHub(decode(source, table)?)),
            _ => Ok(UpdateSource::Other(table)),
        }
    }

    pub fn to_table(&self) -> Result<toml::Table> {
        let value = match self {
            UpdateSource::Modrinth(s) => toml::Value::try_from(s)?,
            UpdateSource::CurseForge(s) => toml::Value::try_from(s)?,
            UpdateSource::GitHub(s) => toml::Value::try_from(s)?,
            UpdateSource::Other(table) => return Ok(table.clone()),
        };
        match value {
            toml::Value::Table(table) => Ok(table),
            _ => Err(Error::Malformed("update descriptor is not a table".to_string())),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ModRecordToml {
    name: String,
    filename: String,
    #[serde(default, skip_serializing_if = "Side::is_both")]
    side: Side,
    #[serde(default, skip_serializing_if = "is_false")]
    pin: bool,
    download: Download,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    update: BTreeMap<String, toml::Table>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    option: Option<ModOption>,
}

/// One managed artifact
#[derive(Debug, Clone, PartialEq)]
pub struct ModRecord {
    /// Unique key within the pack, taken from the descriptor filename
    pub slug: String,
    /// Index-relative path of the descriptor
    pub meta_path: String,
    pub name: String,
    pub filename: String,
    pub side: Side,
    pub pin: bool,
    pub download: Download,
    pub update: BTreeMap<String, UpdateSource>,
    pub option: Option<ModOption>,
}

impl ModRecord {
    /// Create a record whose descriptor lives at `<folder>/<slug>.pw.toml`
    pub fn new(
        folder: &str,
        slug: &str,
        name: impl Into<String>,
        filename: impl Into<String>,
        download: Download,
    ) -> Self {
        let folder = folder.trim_matches('/');
        let meta_path = if folder.is_empty() {
            format!("{}{}", slug, META_EXTENSION)
        } else {
            format!("{}/{}{}", folder, slug, META_EXTENSION)
        };
        Self {
            slug: slug.to_string(),
            meta_path,
            name: name.into(),
            filename: filename.into(),
            side: Side::Both,
            pin: false,
            download,
            update: BTreeMap::new(),
            option: None,
        }
    }

    /// Parse a descriptor; the slug comes from the file name before its first `.`
    pub fn from_toml_str(meta_path: &str, contents: &str) -> Result<Self> {
        let raw: ModRecordToml = toml::from_str(contents)
            .map_err(|e| Error::Malformed(format!("Failed to parse {}: {}", meta_path, e)))?;

        let mut update = BTreeMap::new();
        for (source, table) in raw.update {
            let parsed = UpdateSource::parse(&source, table)?;
            update.insert(source, parsed);
        }

        Ok(Self {
            slug: slug_from_meta_path(meta_path),
            meta_path: meta_path.to_string(),
            name: raw.name,
            filename: raw.filename,
            side: raw.side,
            pin: raw.pin,
            download: raw.download,
            update,
            option: raw.option,
        })
    }

    pub fn to_toml_string(&self) -> Result<String> {
        let mut update = BTreeMap::new();
        for (source, descriptor) in &self.update {
            update.insert(source.clone(), descriptor.to_table()?);
        }
        let raw = ModRecordToml {
            name: self.name.clone(),
            filename: self.filename.clone(),
            side: self.side,
            pin: self.pin,
            download: self.download.clone(),
            update,
            option: self.option.clone(),
        };
        Ok(toml::to_string(&raw)?)
    }

    /// Load the descriptor at `meta_path` below `root`
    pub fn load<P: AsRef<Path>>(root: P, meta_path: &str) -> Result<Self> {
        let path = join_rel(root.as_ref(), meta_path);
        let contents = fs::read_to_string(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                Error::NotFound(format!("descriptor {} does not exist", meta_path))
            }
            _ => Error::Io(e),
        })?;
        Self::from_toml_str(meta_path, &contents)
    }

    /// Write the descriptor and return the sha256 of its bytes
    pub fn save<P: AsRef<Path>>(&self, root: P) -> Result<HashDigest> {
        let contents = self.to_toml_string()?;
        write_atomic(&join_rel(root.as_ref(), &self.meta_path), contents.as_bytes())?;
        HashRegistry::new().hash_bytes("sha256", contents.as_bytes())
    }

    /// Index-relative path of the downloaded artifact (next to its descriptor)
    pub fn dest_path(&self) -> String {
        match self.meta_path.rsplit_once('/') {
            Some((dir, _)) => format!("{}/{}", dir, self.filename),
            None => self.filename.clone(),
        }
    }

    pub fn modrinth(&self) -> Option<&ModrinthSource> {
        match self.update.get("modrinth") {
            Some(UpdateSource::Modrinth(s)) => Some(s),
            _ => None,
        }
    }

    pub fn curseforge(&self) -> Option<&CurseForgeSource> {
        match self.update.get("curseforge") {
            Some(UpdateSource::CurseForge(s)) => Some(s),
            _ => None,
        }
    }

    pub fn github(&self) -> Option<&GitHubSource> {
        match self.update.get("github") {
            Some(UpdateSource::GitHub(s)) => Some(s),
            _ => None,
        }
    }

    /// Names of the sources this record can be updated from
    pub fn source_names(&self) -> Vec<&str> {
        self.update.keys().map(String::as_str).collect()
    }
}

fn slug_from_meta_path(meta_path: &str) -> String {
    let base = meta_path.rsplit('/').next().unwrap_or(meta_path);
    match base.split_once('.') {
        Some((stem, _)) => stem.to_string(),
        None => base.to_string(),
    }
}

fn join_rel(root: &Path, rel: &str) -> PathBuf {
    rel.split('/')
        .filter(|p| !p.is_empty())
        .fold(root.to_path_buf(), |acc, part| acc.join(part))
}

struct SlugPatterns {
    brackets: Regex,
    suffix: Regex,
    invalid: Regex,
    dashes: Regex,
    edges: Regex,
}

fn slug_patterns() -> Result<&'static SlugPatterns> {
    static PATTERNS: OnceLock<SlugPatterns> = OnceLock::new();
    if let Some(patterns) = PATTERNS.get() {
        return Ok(patterns);
    }
    let compile = |p: &str| {
        Regex::new(p).map_err(|e| Error::Malformed(format!("slug pattern '{}': {}", p, e)))
    };
    let patterns = SlugPatterns {
        brackets: compile(r"\(.*\)")?,
        suffix: compile(r" - .+")?,
        invalid: compile(r"[^a-z\d]")?,
        dashes: compile(r"-+")?,
        edges: compile(r"^-|-$")?,
    };
    Ok(PATTERNS.get_or_init(|| patterns))
}

/// Turn a display name into a slug: `"Sodium Extra (Fabric) - 1.20"` -> `"sodium-extra"`
pub fn slugify(name: &str) -> Result<String> {
    let p = slug_patterns()?;
    let lower = name.to_lowercase();
    let s = p.brackets.replace_all(&lower, "");
    let s = p.suffix.replace_all(&s, "");
    let s = p.invalid.replace_all(&s, "-");
    let s = p.dashes.replace_all(&s, "-");
    Ok(p.edges.replace_all(&s, "").into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const CURSEFORGE_RECORD: &str = r#"
name = "Balm"
filename = "balm-fabric-1.21.5-21.5.14.jar"
side = "both"

[download]
hash-format = "sha1"
hash = "5694a7bdfd508cf23bb4f2ab2fca7d45a517def7"
mode = "metadata:curseforge"

[update.curseforge]
file-id = 6459015
project-id = 531761
"#;

    #[test]
    fn test_parse_curseforge_record() {
        let record = ModRecord::from_toml_str("mods/balm.pw.toml", CURSEFORGE_RECORD).unwrap();
        assert_eq!(record.slug, "balm");
        assert_eq!(record.side, Side::Both);
        assert_eq!(record.download.mode, DownloadMode::curseforge());
        assert_eq!(record.download.url, None);
        assert_eq!(
            record.curseforge(),
            Some(&CurseForgeSource {
                project_id: 531761,
                file_id: 6459015
            })
        );
        assert_eq!(record.dest_path(), "mods/balm-fabric-1.21.5-21.5.14.jar");
    }

    #[test]
    fn test_record_round_trip() {
        let mut record = ModRecord::new(
            "mods",
            "sodium",
            "Sodium",
            "sodium-fabric-0.5.3.jar",
            Download::from_url(
                "https://cdn.modrinth.com/data/AANobbMI/versions/abc/sodium.jar",
                HashDigest {
                    format: "sha512".into(),
                    value: "deadbeef".into(),
                },
            ),
        );
        record.side = Side::Client;
        record.pin = true;
        record.option = Some(ModOption {
            optional: true,
            description: Some("Faster rendering".into()),
            default: true,
        });
        record.update.insert(
            "modrinth".into(),
            UpdateSource::Modrinth(ModrinthSource {
                project_id: "AANobbMI".into(),
                version_id: "abc".into(),
            }),
        );

        let text = record.to_toml_string().unwrap();
        let parsed = ModRecord::from_toml_str(&record.meta_path, &text).unwrap();
        assert_eq!(parsed, record);
        assert!(text.contains("mod-id = \"AANobbMI\""));
        assert!(!text.contains("mode"));
    }

    #[test]
    fn test_empty_side_means_both() {
        let text = r#"
name = "X"
filename = "x.jar"
side = ""

[download]
url = "https://example.com/x.jar"
hash-format = "sha256"
hash = "00"
"#;
        let record = ModRecord::from_toml_str("x.pw.toml", text).unwrap();
        assert_eq!(record.side, Side::Both);
        assert!(!record.to_toml_string().unwrap().contains("side"));
    }

    #[test]
    fn test_invalid_side_is_malformed() {
        let text = CURSEFORGE_RECORD.replace("side = \"both\"", "side = \"everywhere\"");
        let result = ModRecord::from_toml_str("mods/balm.pw.toml", &text);
        assert!(matches!(result, Err(Error::Malformed(_))));
    }

    #[test]
    fn test_bad_update_table_is_malformed() {
        let text = CURSEFORGE_RECORD.replace("file-id = 6459015", "file-id = \"latest\"");
        let result = ModRecord::from_toml_str("mods/balm.pw.toml", &text);
        assert!(matches!(result, Err(Error::Malformed(_))));
    }

    #[test]
    fn test_unknown_source_is_preserved() {
        let text = format!("{}\n[update.jenkins]\njob = \"nightly\"\n", CURSEFORGE_RECORD);
        let record = ModRecord::from_toml_str("mods/balm.pw.toml", &text).unwrap();
        assert!(matches!(record.update.get("jenkins"), Some(UpdateSource::Other(_))));

        let out = record.to_toml_string().unwrap();
        assert!(out.contains("[update.jenkins]"));
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let record = ModRecord::from_toml_str("mods/balm.pw.toml", CURSEFORGE_RECORD).unwrap();

        let digest = record.save(temp_dir.path()).unwrap();
        assert_eq!(digest.format, "sha256");

        let bytes = fs::read(temp_dir.path().join("mods").join("balm.pw.toml")).unwrap();
        assert_eq!(
            HashRegistry::new().hash_bytes("sha256", &bytes).unwrap(),
            digest
        );

        let loaded = ModRecord::load(temp_dir.path(), "mods/balm.pw.toml").unwrap();
        assert_eq!(loaded, record);
    }

    #[test]
    fn test_load_missing_is_not_found() {
        let temp_dir = TempDir::new().unwrap();
        let result = ModRecord::load(temp_dir.path(), "mods/nope.pw.toml");
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[test]
    fn test_slug_from_meta_path() {
        assert_eq!(slug_from_meta_path("mods/fabric-api.pw.toml"), "fabric-api");
        assert_eq!(slug_from_meta_path("legacy.toml"), "legacy");
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Sodium").unwrap(), "sodium");
        assert_eq!(slugify("Fabric API").unwrap(), "fabric-api");
        assert_eq!(slugify("Just Enough Items (JEI)").unwrap(), "just-enough-items");
        assert_eq!(slugify("Xaero's Minimap - Fabric Edition").unwrap(), "xaero-s-minimap");
        assert_eq!(slugify("  --Iris Shaders!!--  ").unwrap(), "iris-shaders");
    }
}
