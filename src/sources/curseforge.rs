//! CurseForge (v1 API) client
//!
//! Requests carry the `x-api-key` header. Project ids and file ids are
//! numeric; they are carried as strings in the normalized types. Loaders are
//! not a separate field on CurseForge: they are mixed into a file's game
//! version list and split out during normalization.
//!
//! A project's `latestFiles` only holds a handful of recent uploads. Older
//! game versions are reachable through `latestFilesIndexes`, which names the
//! newest file id per game version and loader; when one of those entries
//! beats everything in `latestFiles`, that file is fetched by id.

use super::{
    api_url, http_client, send_json, CandidateFile, DependencyHandle, DependencyKind, Ecosystem,
    FileDependency, SelectionContext, SourceClient, SourceProject,
};
use crate::hash::HashDigest;
use crate::record::{
    slugify, CurseForgeSource, Download, DownloadMode, ModRecord, Side, UpdateSource,
};
use crate::selection::select_best_file;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

const SERVICE: &str = "CurseForge";

/// Hash formats in the order a descriptor prefers them
pub const HASH_PREFERENCE: [&str; 2] = ["sha1", "md5"];

const LOADER_NAMES: [&str; 4] = ["Forge", "Fabric", "Quilt", "NeoForge"];

/// CurseForge's game id for Minecraft
const MINECRAFT_GAME_ID: u32 = 432;

#[derive(Debug, Deserialize)]
struct DataWrapper<T> {
    data: T,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ModsRequest<'a> {
    mod_ids: &'a [u32],
    filter_pc_only: bool,
}

#[derive(Debug, Serialize)]
struct FingerprintsRequest<'a> {
    fingerprints: &'a [u32],
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiMod {
    id: u32,
    name: String,
    #[serde(default)]
    slug: String,
    class_id: Option<u32>,
    #[serde(default)]
    links: ApiLinks,
    #[serde(default)]
    latest_files: Vec<ApiFile>,
    #[serde(default)]
    latest_files_indexes: Vec<ApiFileIndex>,
}

/// Newest file of a project for one game version and loader
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiFileIndex {
    game_version: String,
    file_id: u32,
    #[serde(default)]
    filename: String,
    mod_loader: Option<u8>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiFingerprintMatches {
    #[serde(default)]
    exact_matches: Vec<ApiFingerprintMatch>,
    #[serde(default)]
    unmatched_fingerprints: Option<Vec<u32>>,
}

#[derive(Debug, Deserialize)]
struct ApiFingerprintMatch {
    id: u32,
    file: ApiFile,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiLinks {
    #[serde(default)]
    website_url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiFile {
    id: u32,
    #[serde(default)]
    display_name: String,
    file_name: String,
    file_date: Option<DateTime<Utc>>,
    download_url: Option<String>,
    #[serde(default)]
    game_versions: Vec<String>,
    #[serde(default)]
    hashes: Vec<ApiHash>,
    #[serde(default)]
    dependencies: Vec<ApiDependency>,
    #[serde(default)]
    file_fingerprint: u32,
}

#[derive(Debug, Deserialize)]
struct ApiHash {
    value: String,
    algo: u8,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiDependency {
    mod_id: u32,
    relation_type: u8,
}

pub struct CurseForgeClient {
    base_url: String,
    api_key: Option<String>,
    client: reqwest::blocking::Client,
}

impl CurseForgeClient {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Result<Self> {
        Ok(Self {
            base_url: base_url.into(),
            api_key,
            client: http_client()?,
        })
    }

    fn with_key(
        &self,
        request: reqwest::blocking::RequestBuilder,
    ) -> Result<reqwest::blocking::RequestBuilder> {
        match &self.api_key {
            Some(key) => Ok(request.header("x-api-key", key)),
            None => Err(Error::ExternalFailure(
                "No CurseForge API key configured.\n\
                    Set CURSEFORGE_API_KEY or add curseforge_api_key to ~/.packsmith/config.toml."
                    .to_string(),
            )),
        }
    }

    fn get_mods(&self, ids: &[u32]) -> Result<Vec<ApiMod>> {
        let url = api_url(&self.base_url, "v1/mods")?;
        let request = self.with_key(self.client.post(url).json(&ModsRequest {
            mod_ids: ids,
            filter_pc_only: true,
        }))?;
        let wrapper: DataWrapper<Vec<ApiMod>> = send_json(request, SERVICE, "projects")?;
        Ok(wrapper.data)
    }

    fn get_file(&self, project_id: u32, file_id: u32) -> Result<ApiFile> {
        let url = api_url(&self.base_url, &format!("v1/mods/{}/files/{}", project_id, file_id))?;
        let request = self.with_key(self.client.get(url))?;
        let wrapper: DataWrapper<ApiFile> = send_json(
            request,
            SERVICE,
            &format!("file {} of project {}", file_id, project_id),
        )?;
        Ok(wrapper.data)
    }

    fn search_slug(&self, slug: &str) -> Result<Vec<ApiMod>> {
        let mut url = api_url(&self.base_url, "v1/mods/search")?;
        url.query_pairs_mut()
            .append_pair("gameId", &MINECRAFT_GAME_ID.to_string())
            .append_pair("slug", slug);
        let request = self.with_key(self.client.get(url))?;
        let wrapper: DataWrapper<Vec<ApiMod>> =
            send_json(request, SERVICE, &format!("project '{}'", slug))?;
        Ok(wrapper.data)
    }

    /// Numeric id of the project with this slug
    pub fn project_id_for_slug(&self, slug: &str) -> Result<u32> {
        self.search_slug(slug)?
            .into_iter()
            .find(|m| m.slug == slug)
            .map(|m| m.id)
            .ok_or_else(|| Error::NotFound(format!("no CurseForge project with slug '{}'", slug)))
    }

    /// One file of a project, normalized
    pub fn file(&self, project_id: u32, file_id: u32) -> Result<CandidateFile> {
        Ok(normalize_file(self.get_file(project_id, file_id)?))
    }

    /// Look up files by their CurseForge fingerprint
    pub fn match_fingerprints(&self, fingerprints: &[u32]) -> Result<FingerprintReport> {
        if fingerprints.is_empty() {
            return Ok(FingerprintReport::default());
        }
        let url = api_url(&self.base_url, "v1/fingerprints")?;
        let request = self.with_key(self.client.post(url).json(&FingerprintsRequest {
            fingerprints,
        }))?;
        let wrapper: DataWrapper<ApiFingerprintMatches> =
            send_json(request, SERVICE, "fingerprint matches")?;

        let matches = wrapper
            .data
            .exact_matches
            .into_iter()
            .map(|m| FingerprintMatch {
                fingerprint: m.file.file_fingerprint,
                project_id: m.id,
                file: normalize_file(m.file),
            })
            .collect();
        Ok(FingerprintReport {
            matches,
            unmatched: wrapper.data.unmatched_fingerprints.unwrap_or_default(),
        })
    }

    /// Normalize a project, fetching the best indexed file when `latestFiles`
    /// does not already hold it
    fn normalize_mod(&self, m: ApiMod, ctx: &SelectionContext) -> SourceProject {
        let mut files: Vec<CandidateFile> = m.latest_files.into_iter().map(normalize_file).collect();
        let listed: BTreeSet<String> = files.iter().map(|f| f.id.clone()).collect();
        debug!("{} has {} latest files", m.name, files.len());

        let mut pool = files.clone();
        pool.extend(
            m.latest_files_indexes
                .iter()
                .filter(|entry| !listed.contains(&entry.file_id.to_string()))
                .map(index_stub),
        );
        let indexed_pick = select_best_file(Ecosystem::CurseForge, &pool, ctx, &m.name)
            .filter(|best| !listed.contains(&best.id))
            .and_then(|best| best.id.parse::<u32>().ok());

        let mut listing_error = None;
        if let Some(file_id) = indexed_pick {
            debug!("Fetching indexed file {} of {}", file_id, m.name);
            match self.file(m.id, file_id) {
                Ok(file) => files.push(file),
                Err(e) => {
                    warn!("Failed to fetch file {} of {}: {}", file_id, m.name, e);
                    listing_error = Some(e.to_string());
                }
            }
        }

        SourceProject {
            id: m.id.to_string(),
            slug: m.slug,
            name: m.name,
            kind: m.class_id.map(|c| c.to_string()).unwrap_or_default(),
            side: Side::Both,
            files,
            listing_error,
        }
    }

    /// Direct download location of a file, `None` when the author opted out
    /// of third-party distribution
    pub fn download_url(&self, project_id: u32, file_id: u32) -> Result<Option<String>> {
        Ok(self
            .get_file(project_id, file_id)?
            .download_url
            .filter(|u| !u.is_empty()))
    }

    /// Project page for files that must be downloaded by hand
    pub fn website_url(&self, project_id: u32, file_id: u32) -> Result<String> {
        let project = self
            .get_mods(&[project_id])?
            .into_iter()
            .next()
            .ok_or_else(|| Error::NotFound(format!("CurseForge project {}", project_id)))?;
        Ok(format!("{}/files/{}", project.links.website_url, file_id))
    }
}

fn parse_ids(ids: &[String]) -> Result<Vec<u32>> {
    ids.iter()
        .map(|id| {
            id.parse::<u32>()
                .map_err(|_| Error::Malformed(format!("invalid CurseForge project id '{}'", id)))
        })
        .collect()
}

impl SourceClient for CurseForgeClient {
    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::CurseForge
    }

    fn projects(&self, ids: &[String], ctx: &SelectionContext) -> Result<Vec<SourceProject>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mods = self.get_mods(&parse_ids(ids)?)?;

        Ok(mods
            .into_iter()
            .map(|m| self.normalize_mod(m, ctx))
            .collect())
    }

    fn version_owners(&self, _version_ids: &[String]) -> Result<Vec<String>> {
        Err(Error::Unsupported(
            "CurseForge dependencies always name a project".to_string(),
        ))
    }
}

fn normalize_file(file: ApiFile) -> CandidateFile {
    let (loaders, game_versions): (Vec<String>, Vec<String>) = file
        .game_versions
        .into_iter()
        .partition(|v| LOADER_NAMES.contains(&v.as_str()));

    let hashes = file
        .hashes
        .into_iter()
        .filter_map(|h| match h.algo {
            1 => Some(("sha1".to_string(), h.value)),
            2 => Some(("md5".to_string(), h.value)),
            _ => None,
        })
        .collect();

    let dependencies = file
        .dependencies
        .into_iter()
        .filter_map(|d| {
            let kind = match d.relation_type {
                1 => DependencyKind::Embedded,
                2 => DependencyKind::Optional,
                3 => DependencyKind::Required,
                5 => DependencyKind::Incompatible,
                _ => return None,
            };
            Some(FileDependency {
                kind,
                handle: DependencyHandle::Project(d.mod_id.to_string()),
            })
        })
        .collect();

    CandidateFile {
        id: file.id.to_string(),
        version_number: file.display_name,
        filename: file.file_name,
        url: file.download_url.filter(|u| !u.is_empty()),
        hashes,
        game_versions,
        loaders: loaders.iter().map(|l| l.to_lowercase()).collect(),
        published: file.file_date,
        primary: true,
        dependencies,
    }
}

fn mod_loader_name(id: u8) -> Option<&'static str> {
    match id {
        1 => Some("forge"),
        3 => Some("liteloader"),
        4 => Some("fabric"),
        5 => Some("quilt"),
        6 => Some("neoforge"),
        _ => None,
    }
}

/// A file known only from `latestFilesIndexes`, enough to rank it
fn index_stub(entry: &ApiFileIndex) -> CandidateFile {
    CandidateFile {
        id: entry.file_id.to_string(),
        version_number: entry.filename.clone(),
        filename: entry.filename.clone(),
        url: None,
        hashes: BTreeMap::new(),
        game_versions: vec![entry.game_version.clone()],
        loaders: entry
            .mod_loader
            .and_then(mod_loader_name)
            .map(|l| vec![l.to_string()])
            .unwrap_or_default(),
        published: None,
        primary: true,
        dependencies: Vec::new(),
    }
}

/// Files matched by fingerprint
#[derive(Debug, Default)]
pub struct FingerprintReport {
    pub matches: Vec<FingerprintMatch>,
    /// Fingerprints CurseForge does not know
    pub unmatched: Vec<u32>,
}

#[derive(Debug)]
pub struct FingerprintMatch {
    pub fingerprint: u32,
    pub project_id: u32,
    pub file: CandidateFile,
}

/// A project as typed by a user: numeric id, slug or curseforge.com URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProjectRef {
    Id(u32),
    Slug {
        slug: String,
        /// Set when the URL points at one file
        file_id: Option<u32>,
    },
}

const PROJECT_URL_PATTERNS: [&str; 3] = [
    r"^https?://minecraft\.curseforge\.com/projects/(?P<slug>[^/]+)(?:/(?:files|download)/(?P<file>\d+))?",
    r"^https?://(?:www\.|beta\.|legacy\.)?curseforge\.com/minecraft/[^/]+/(?P<slug>[^/]+)(?:/(?:files|download)/(?P<file>\d+))?",
    r"^(?P<slug>[a-z][\da-z\-_]{0,127})$",
];

pub fn parse_project_ref(input: &str) -> Result<ProjectRef> {
    let input = input.trim();
    if let Ok(id) = input.parse::<u32>() {
        return Ok(ProjectRef::Id(id));
    }

    for pattern in PROJECT_URL_PATTERNS {
        let regex = Regex::new(pattern)
            .map_err(|e| Error::Malformed(format!("project pattern '{}': {}", pattern, e)))?;
        if let Some(caps) = regex.captures(input) {
            let slug = caps
                .name("slug")
                .map(|m| m.as_str().to_string())
                .unwrap_or_default();
            let file_id = caps.name("file").and_then(|m| m.as_str().parse::<u32>().ok());
            return Ok(ProjectRef::Slug { slug, file_id });
        }
    }
    Err(Error::Malformed(format!(
        "'{}' is not a CurseForge project id, slug or URL",
        input
    )))
}

/// Folder for a CurseForge class id
pub fn class_folder(class_id: &str) -> Option<&'static str> {
    match class_id {
        "5" => Some("plugins"),
        "6" => Some("mods"),
        "12" => Some("resourcepacks"),
        "17" => Some("saves"),
        _ => None,
    }
}

/// Descriptor for a selected CurseForge file
pub fn new_record(
    project: &SourceProject,
    file: &CandidateFile,
    default_folder: &str,
) -> Result<ModRecord> {
    let parse = |id: &str, what: &str| {
        id.parse::<u32>()
            .map_err(|_| Error::Malformed(format!("invalid CurseForge {} id '{}'", what, id)))
    };
    let project_id = parse(&project.id, "project")?;
    let file_id = parse(&file.id, "file")?;

    let (format, value) = file.best_hash(&HASH_PREFERENCE).ok_or_else(|| {
        Error::ExternalFailure(format!("{} {} has no usable hash", project.name, file.filename))
    })?;

    let slug = if project.slug.is_empty() {
        slugify(&project.name)?
    } else {
        project.slug.clone()
    };
    let folder = class_folder(&project.kind).unwrap_or(default_folder);

    let mut record = ModRecord::new(
        folder,
        &slug,
        project.name.clone(),
        file.filename.clone(),
        Download {
            url: None,
            hash_format: format,
            hash: value,
            mode: DownloadMode::curseforge(),
        },
    );
    record.update.insert(
        "curseforge".to_string(),
        UpdateSource::CurseForge(CurseForgeSource {
            project_id,
            file_id,
        }),
    );
    Ok(record)
}

/// The digest a descriptor records for a file
pub fn preferred_digest(file: &CandidateFile) -> Option<HashDigest> {
    file.best_hash(&HASH_PREFERENCE)
        .map(|(format, value)| HashDigest { format, value })
}
