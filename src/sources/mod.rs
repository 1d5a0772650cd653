//! Remote source ecosystems
//!
//! Each ecosystem (Modrinth, CurseForge, GitHub) has its own identifier
//! scheme and API. The clients in this module normalize what they fetch into
//! [`SourceProject`] / [`CandidateFile`] so best-file selection and dependency
//! resolution can work across ecosystems without knowing their wire formats.

pub mod curseforge;
pub mod github;
pub mod modrinth;

use crate::manifest::PackManifest;
use crate::record::{ModRecord, Side};
use crate::version::version_less;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// User agent sent with every API request
pub const USER_AGENT: &str = concat!("packsmith/", env!("CARGO_PKG_VERSION"));

/// Source ecosystems that take part in dependency resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Ecosystem {
    Modrinth,
    CurseForge,
}

impl Ecosystem {
    /// Key used for this ecosystem in a descriptor's `update` table
    pub fn name(&self) -> &'static str {
        match self {
            Ecosystem::Modrinth => "modrinth",
            Ecosystem::CurseForge => "curseforge",
        }
    }

    /// Swap a dependency handle for its loader-native replacement
    ///
    /// Quilt packs get Quilted Fabric API instead of Fabric API, and the Quilt
    /// Kotlin libraries instead of Fabric Language Kotlin on game versions
    /// strictly between 1.19.1 and 2.0.0.
    pub fn map_dependency_override(&self, handle: &str, is_quilt: bool, mc_version: &str) -> String {
        if !is_quilt {
            return handle.to_string();
        }
        let kotlin_range = version_less("1.19.1", mc_version) && version_less(mc_version, "2.0.0");

        let mapped = match self {
            Ecosystem::Modrinth => match handle {
                "P7dR8mSH" | "fabric-api" => Some("qvIfYCYJ"),
                "Ha28R6CL" | "fabric-language-kotlin" if kotlin_range => Some("lwVhp9o5"),
                _ => None,
            },
            Ecosystem::CurseForge => match handle {
                "306612" => Some("634179"),
                "308769" if kotlin_range => Some("720410"),
                _ => None,
            },
        };
        mapped.map(str::to_string).unwrap_or_else(|| handle.to_string())
    }

    /// Project handles of every record in the pack that belongs to this ecosystem
    ///
    /// Slugs are included too, since a dependency may name a project by slug.
    pub fn installed_handles(&self, pack: &PackManifest) -> BTreeSet<String> {
        let mut handles = BTreeSet::new();
        for record in pack.records() {
            match self {
                Ecosystem::Modrinth => {
                    if let Some(source) = record.modrinth() {
                        handles.insert(source.project_id.clone());
                        handles.insert(record.slug.clone());
                    }
                }
                Ecosystem::CurseForge => {
                    if let Some(source) = record.curseforge() {
                        handles.insert(source.project_id.to_string());
                    }
                }
            }
        }
        handles
    }

    /// Build the descriptor for a selected file
    pub fn new_record(
        &self,
        project: &SourceProject,
        file: &CandidateFile,
        ctx: &SelectionContext,
        default_folder: &str,
    ) -> Result<ModRecord> {
        match self {
            Ecosystem::Modrinth => modrinth::new_record(project, file, ctx, default_folder),
            Ecosystem::CurseForge => curseforge::new_record(project, file, default_folder),
        }
    }
}

impl fmt::Display for Ecosystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for Ecosystem {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "modrinth" | "mr" => Ok(Ecosystem::Modrinth),
            "curseforge" | "cf" => Ok(Ecosystem::CurseForge),
            other => Err(Error::Unsupported(format!("source '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DependencyKind {
    Required,
    Optional,
    Incompatible,
    Embedded,
}

/// What a dependency points at
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DependencyHandle {
    Project(String),
    Version(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDependency {
    pub kind: DependencyKind,
    pub handle: DependencyHandle,
}

impl FileDependency {
    pub fn required_project(id: impl Into<String>) -> Self {
        Self {
            kind: DependencyKind::Required,
            handle: DependencyHandle::Project(id.into()),
        }
    }

    pub fn required_version(id: impl Into<String>) -> Self {
        Self {
            kind: DependencyKind::Required,
            handle: DependencyHandle::Version(id.into()),
        }
    }
}

/// One downloadable file of a project, normalized across ecosystems
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateFile {
    /// Modrinth version id or CurseForge file id
    pub id: String,
    pub version_number: String,
    pub filename: String,
    /// `None` when the author has disabled third-party downloads
    pub url: Option<String>,
    /// Algorithm name to digest
    pub hashes: BTreeMap<String, String>,
    pub game_versions: Vec<String>,
    pub loaders: Vec<String>,
    pub published: Option<DateTime<Utc>>,
    pub primary: bool,
    pub dependencies: Vec<FileDependency>,
}

impl CandidateFile {
    pub fn required_dependencies(&self) -> impl Iterator<Item = &DependencyHandle> {
        self.dependencies
            .iter()
            .filter(|d| d.kind == DependencyKind::Required)
            .map(|d| &d.handle)
    }

    /// First available hash in `preference` order
    pub fn best_hash(&self, preference: &[&str]) -> Option<(String, String)> {
        preference.iter().find_map(|algo| {
            self.hashes
                .get(*algo)
                .map(|value| (algo.to_string(), value.clone()))
        })
    }
}

/// A project with the files eligible for the pack
#[derive(Debug, Clone, PartialEq)]
pub struct SourceProject {
    pub id: String,
    pub slug: String,
    pub name: String,
    /// Ecosystem-specific content kind (`mod`, `resourcepack`, a class id, ...)
    pub kind: String,
    pub side: Side,
    pub files: Vec<CandidateFile>,
    /// Set when the project was found but its files could not be listed
    pub listing_error: Option<String>,
}

/// What the pack can accept, derived once from the manifest
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SelectionContext {
    /// Supported game versions, ascending; the last is preferred
    pub game_versions: Vec<String>,
    /// Compatible loaders; empty accepts anything
    pub loaders: Vec<String>,
}

impl SelectionContext {
    pub fn from_pack(pack: &PackManifest) -> Result<Self> {
        Ok(Self {
            game_versions: pack.supported_game_versions()?,
            loaders: pack.compatible_loaders(),
        })
    }
}

/// Project metadata lookups against one ecosystem
pub trait SourceClient {
    fn ecosystem(&self) -> Ecosystem;

    /// Batch-fetch projects, each with its files eligible under `ctx`
    fn projects(&self, ids: &[String], ctx: &SelectionContext) -> Result<Vec<SourceProject>>;

    /// Owning project id of each version id, in input order
    fn version_owners(&self, version_ids: &[String]) -> Result<Vec<String>>;
}

/// A tagged release with downloadable assets
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Release {
    pub tag: String,
    pub branch: String,
    pub assets: Vec<ReleaseAsset>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseAsset {
    pub name: String,
    pub url: String,
    /// `algorithm:hex`, e.g. `sha256:ab12...`
    pub digest: Option<String>,
}

impl ReleaseAsset {
    pub fn sha256(&self) -> Result<String> {
        match self.digest.as_deref().and_then(|d| d.strip_prefix("sha256:")) {
            Some(hash) if !hash.is_empty() => Ok(hash.to_string()),
            _ => Err(Error::ExternalFailure(format!(
                "asset {} has no sha256 digest",
                self.name
            ))),
        }
    }
}

/// Release lookups for repository-hosted artifacts
pub trait ReleaseClient {
    /// Newest release, or the newest one built from `branch` when given
    fn latest_release(&self, slug: &str, branch: Option<&str>) -> Result<Release>;
}

pub(crate) fn http_client() -> Result<reqwest::blocking::Client> {
    Ok(reqwest::blocking::Client::builder()
        .user_agent(USER_AGENT)
        .build()?)
}

/// Send a request and decode a JSON body, mapping failures to the error taxonomy
pub(crate) fn send_json<T: DeserializeOwned>(
    request: reqwest::blocking::RequestBuilder,
    service: &str,
    what: &str,
) -> Result<T> {
    let response = request.send().map_err(|e| {
        if e.is_connect() {
            Error::ExternalFailure(format!(
                "Cannot connect to {}\n\
                    Please check your network connection and the configured API URL.",
                service
            ))
        } else if e.is_timeout() {
            Error::ExternalFailure(format!("{} request timed out. Please try again.", service))
        } else {
            Error::ExternalFailure(format!("Failed to fetch {} from {}: {}", what, service, e))
        }
    })?;

    let status = response.status();

    if status == 404 {
        return Err(Error::NotFound(format!("{} not found on {}", what, service)));
    }

    if !status.is_success() {
        let error_msg = match status.as_u16() {
            401 | 403 => format!(
                "{} rejected the request (HTTP {}).\n\
                    Check the API key or token in ~/.packsmith/config.toml.",
                service,
                status.as_u16()
            ),
            500 | 502 | 503 | 504 => format!(
                "{} server error (HTTP {}).\n\
                    The service is experiencing issues. Please try again later.",
                service,
                status.as_u16()
            ),
            _ => format!("{} error: HTTP {}", service, status.as_u16()),
        };
        return Err(Error::ExternalFailure(error_msg));
    }

    response
        .json()
        .map_err(|e| Error::ExternalFailure(format!("Failed to parse {} response: {}", service, e)))
}

pub(crate) fn api_url(base: &str, path: &str) -> Result<url::Url> {
    let joined = format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'));
    url::Url::parse(&joined)
        .map_err(|e| Error::Malformed(format!("invalid API URL '{}': {}", joined, e)))
}
