//! Update checking and application
//!
//! Each source ecosystem that can update a record is an [`Updater`]. The
//! [`UpdaterRegistry`] is built once per invocation, routes every record to
//! the updater named in its `update` table, and runs the check / apply cycle:
//!
//! 1. [`Updater::check_update`] fetches what is newest for a batch of records
//!    and returns one [`UpdateCheck`] per record, carrying the fetched data as
//!    a [`CachedState`].
//! 2. [`apply_update`] turns a record plus its cached state into a new record
//!    without touching the network.
//!
//! Pinned records are never applied.
//!
//! # Examples
//!
//! ```no_run
//! use packsmith::{Config, PackManifest, UpdaterRegistry};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut pack = PackManifest::load(".")?;
//! let index = pack.open_index(".")?;
//! pack.load_records(&index)?;
//!
//! let registry = UpdaterRegistry::from_config(&Config::load()?)?;
//! let report = registry.update_all(&pack)?;
//! println!("{} updates available", report.updated().count());
//! # Ok(())
//! # }
//! ```

use crate::config::Config;
use crate::hash::HashDigest;
use crate::manifest::PackManifest;
use crate::record::{Download, DownloadMode, ModRecord, UpdateSource};
use crate::selection::select_best_file;
use crate::sources::curseforge::{self, CurseForgeClient};
use crate::sources::github::{self, GitHubClient};
use crate::sources::modrinth::{self, ModrinthClient};
use crate::sources::{
    CandidateFile, Ecosystem, Release, ReleaseAsset, ReleaseClient, SelectionContext,
    SourceClient, SourceProject,
};
use crate::{Error, Result};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info, warn};

/// Data fetched by a check, enough to apply the update offline
#[derive(Debug, Clone, PartialEq)]
pub enum CachedState {
    Modrinth {
        project: SourceProject,
        file: CandidateFile,
    },
    CurseForge {
        project: SourceProject,
        file: CandidateFile,
    },
    GitHub {
        release: Release,
        asset: ReleaseAsset,
    },
}

impl CachedState {
    /// Updater name this state belongs to
    pub fn source(&self) -> &'static str {
        match self {
            CachedState::Modrinth { .. } => "modrinth",
            CachedState::CurseForge { .. } => "curseforge",
            CachedState::GitHub { .. } => "github",
        }
    }

    /// The ecosystem project and file, for dependency resolution
    pub fn selected_file(&self) -> Option<(Ecosystem, &SourceProject, &CandidateFile)> {
        match self {
            CachedState::Modrinth { project, file } => Some((Ecosystem::Modrinth, project, file)),
            CachedState::CurseForge { project, file } => {
                Some((Ecosystem::CurseForge, project, file))
            }
            CachedState::GitHub { .. } => None,
        }
    }
}

/// Result of checking one record
#[derive(Debug, Default)]
pub struct UpdateCheck {
    pub available: bool,
    /// `old-file -> new-file`
    pub summary: String,
    pub cached: Option<CachedState>,
    pub error: Option<Error>,
}

impl UpdateCheck {
    fn up_to_date() -> Self {
        Self::default()
    }

    fn failed(error: Error) -> Self {
        Self {
            error: Some(error),
            ..Self::default()
        }
    }

    fn available(record: &ModRecord, new_filename: &str, cached: CachedState) -> Self {
        Self {
            available: true,
            summary: format!("{} -> {}", record.filename, new_filename),
            cached: Some(cached),
            error: None,
        }
    }
}

/// An update source, dispatched by ecosystem
pub enum Updater {
    Modrinth(Box<dyn SourceClient>),
    CurseForge(Box<dyn SourceClient>),
    GitHub(Box<dyn ReleaseClient>),
}

impl Updater {
    pub fn name(&self) -> &'static str {
        match self {
            Updater::Modrinth(_) => "modrinth",
            Updater::CurseForge(_) => "curseforge",
            Updater::GitHub(_) => "github",
        }
    }

    /// Metadata client of an ecosystem updater, used for dependency resolution
    pub fn source_client(&self) -> Option<&dyn SourceClient> {
        match self {
            Updater::Modrinth(client) | Updater::CurseForge(client) => Some(client.as_ref()),
            Updater::GitHub(_) => None,
        }
    }

    /// Decode this updater's `update.<name>` table
    pub fn parse_update(&self, table: toml::Table) -> Result<UpdateSource> {
        UpdateSource::parse(self.name(), table)
    }

    /// Check a batch of records routed to this updater, one result per record in order
    pub fn check_update(&self, records: &[&ModRecord], pack: &PackManifest) -> Result<Vec<UpdateCheck>> {
        match self {
            Updater::Modrinth(client) | Updater::CurseForge(client) => {
                let ctx = SelectionContext::from_pack(pack)?;
                Ok(check_projects(client.as_ref(), records, &ctx))
            }
            Updater::GitHub(client) => Ok(records
                .iter()
                .map(|r| check_release(client.as_ref(), r))
                .collect()),
        }
    }
}

/// Installed project and file id of a record for an ecosystem
fn installed_ids(ecosystem: Ecosystem, record: &ModRecord) -> Result<(String, String)> {
    let ids = match ecosystem {
        Ecosystem::Modrinth => record
            .modrinth()
            .map(|s| (s.project_id.clone(), s.version_id.clone())),
        Ecosystem::CurseForge => record
            .curseforge()
            .map(|s| (s.project_id.to_string(), s.file_id.to_string())),
    };
    ids.ok_or_else(|| {
        Error::Malformed(format!(
            "{} has no [update.{}] table",
            record.meta_path,
            ecosystem.name()
        ))
    })
}

/// Rebuild an error for each record of a failed batch
fn batch_error(error: &Error) -> Error {
    let message = error.to_string();
    match error {
        Error::NotFound(_) => Error::NotFound(message),
        Error::Unsupported(_) => Error::Unsupported(message),
        Error::Malformed(_) => Error::Malformed(message),
        Error::IntegrityViolation(_) => Error::IntegrityViolation(message),
        Error::InvalidOperation(_) => Error::InvalidOperation(message),
        _ => Error::ExternalFailure(message),
    }
}

fn check_projects(
    client: &dyn SourceClient,
    records: &[&ModRecord],
    ctx: &SelectionContext,
) -> Vec<UpdateCheck> {
    let ecosystem = client.ecosystem();
    let installed: Vec<Result<(String, String)>> =
        records.iter().map(|r| installed_ids(ecosystem, r)).collect();

    let mut ids: Vec<String> = installed
        .iter()
        .filter_map(|i| i.as_ref().ok().map(|(project, _)| project.clone()))
        .collect();
    ids.sort();
    ids.dedup();

    let projects: HashMap<String, SourceProject> = match client.projects(&ids, ctx) {
        Ok(projects) => projects.into_iter().map(|p| (p.id.clone(), p)).collect(),
        Err(e) => {
            warn!("Failed to fetch {} projects: {}", ecosystem, e);
            return records.iter().map(|_| UpdateCheck::failed(batch_error(&e))).collect();
        }
    };

    records
        .iter()
        .zip(installed)
        .map(|(record, ids)| {
            let (project_id, file_id) = match ids {
                Ok(ids) => ids,
                Err(e) => return UpdateCheck::failed(e),
            };
            let Some(project) = projects.get(&project_id) else {
                return UpdateCheck::failed(Error::NotFound(format!(
                    "{} project {} for {}",
                    ecosystem, project_id, record.name
                )));
            };

            if let Some(reason) = &project.listing_error {
                return UpdateCheck::failed(Error::ExternalFailure(format!(
                    "failed to get the latest version of {}: {}",
                    record.name, reason
                )));
            }

            match select_best_file(ecosystem, &project.files, ctx, &project.name) {
                None => UpdateCheck::failed(Error::NotFound(format!(
                    "no valid versions of {} for the configured game versions and loaders",
                    project.name
                ))),
                Some(best) if best.id == file_id => UpdateCheck::up_to_date(),
                Some(best) => {
                    debug!("{}: {} -> {}", record.slug, file_id, best.id);
                    let cached = match ecosystem {
                        Ecosystem::Modrinth => CachedState::Modrinth {
                            project: project.clone(),
                            file: best.clone(),
                        },
                        Ecosystem::CurseForge => CachedState::CurseForge {
                            project: project.clone(),
                            file: best.clone(),
                        },
                    };
                    UpdateCheck::available(record, &best.filename, cached)
                }
            }
        })
        .collect()
}

fn check_release(client: &dyn ReleaseClient, record: &ModRecord) -> UpdateCheck {
    let Some(source) = record.github() else {
        return UpdateCheck::failed(Error::Malformed(format!(
            "{} has no [update.github] table",
            record.meta_path
        )));
    };

    let branch = Some(source.branch.as_str()).filter(|b| !b.is_empty());
    let release = match client.latest_release(&source.slug, branch) {
        Ok(release) => release,
        Err(e) => return UpdateCheck::failed(e),
    };
    if release.tag == source.tag {
        return UpdateCheck::up_to_date();
    }

    let asset = match github::select_asset(&release, &source.regex) {
        Ok(asset) => asset.clone(),
        Err(e) => return UpdateCheck::failed(e),
    };
    let filename = asset.name.clone();
    UpdateCheck::available(record, &filename, CachedState::GitHub { release, asset })
}

/// Produce the updated record from a cached check result
pub fn apply_update(record: &ModRecord, state: &CachedState) -> Result<ModRecord> {
    if record.pin {
        return Err(Error::InvalidOperation(format!(
            "{} is pinned; unpin it before updating",
            record.name
        )));
    }
    if !record.update.contains_key(state.source()) {
        return Err(Error::InvalidOperation(format!(
            "{} is not managed by {}",
            record.name,
            state.source()
        )));
    }

    let mut updated = record.clone();
    match state {
        CachedState::Modrinth { project, file } => {
            let (format, value) = file
                .best_hash(&modrinth::HASH_PREFERENCE)
                .ok_or_else(|| {
                    Error::ExternalFailure(format!("file for {} has no valid hash", record.name))
                })?;
            let url = file.url.clone().ok_or_else(|| {
                Error::ExternalFailure(format!("file for {} has no download URL", record.name))
            })?;
            updated.filename = file.filename.clone();
            updated.download = Download::from_url(url, HashDigest { format, value });
            if let Some(UpdateSource::Modrinth(source)) = updated.update.get_mut("modrinth") {
                source.project_id = project.id.clone();
                source.version_id = file.id.clone();
            }
        }
        CachedState::CurseForge { project, file } => {
            let digest = curseforge::preferred_digest(file).ok_or_else(|| {
                Error::ExternalFailure(format!("file for {} has no valid hash", record.name))
            })?;
            let file_id = file.id.parse::<u32>().map_err(|_| {
                Error::Malformed(format!("invalid CurseForge file id '{}'", file.id))
            })?;
            updated.filename = file.filename.clone();
            updated.name = project.name.clone();
            updated.download = Download {
                url: None,
                hash_format: digest.format,
                hash: digest.value,
                mode: DownloadMode::curseforge(),
            };
            if let Some(UpdateSource::CurseForge(source)) = updated.update.get_mut("curseforge") {
                source.file_id = file_id;
            }
        }
        CachedState::GitHub { release, asset } => {
            updated.filename = asset.name.clone();
            updated.download = Download::from_url(
                asset.url.clone(),
                HashDigest {
                    format: "sha256".to_string(),
                    value: asset.sha256()?,
                },
            );
            if let Some(UpdateSource::GitHub(source)) = updated.update.get_mut("github") {
                source.tag = release.tag.clone();
            }
        }
    }
    Ok(updated)
}

/// Per-record result of an update run
#[derive(Debug)]
pub enum UpdateOutcome {
    Updated {
        slug: String,
        summary: String,
        record: ModRecord,
        state: CachedState,
    },
    UpToDate {
        slug: String,
    },
    SkippedPinned {
        slug: String,
    },
    Unmanaged {
        slug: String,
    },
    Failed {
        slug: String,
        error: Error,
    },
}

impl UpdateOutcome {
    pub fn slug(&self) -> &str {
        match self {
            UpdateOutcome::Updated { slug, .. }
            | UpdateOutcome::UpToDate { slug }
            | UpdateOutcome::SkippedPinned { slug }
            | UpdateOutcome::Unmanaged { slug }
            | UpdateOutcome::Failed { slug, .. } => slug,
        }
    }
}

#[derive(Debug, Default)]
pub struct UpdateReport {
    /// In slug order
    pub outcomes: Vec<UpdateOutcome>,
}

impl UpdateReport {
    pub fn updated(&self) -> impl Iterator<Item = &UpdateOutcome> {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, UpdateOutcome::Updated { .. }))
    }

    pub fn failed(&self) -> impl Iterator<Item = &UpdateOutcome> {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, UpdateOutcome::Failed { .. }))
    }
}

/// The enabled updaters, keyed by name
#[derive(Default)]
pub struct UpdaterRegistry {
    updaters: BTreeMap<&'static str, Updater>,
}

impl UpdaterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every built-in updater, configured from the user config
    pub fn from_config(config: &Config) -> Result<Self> {
        let sources = &config.sources;
        let mut registry = Self::new();
        registry.register(Updater::Modrinth(Box::new(ModrinthClient::new(
            sources.modrinth_url.clone(),
        )?)));
        registry.register(Updater::CurseForge(Box::new(CurseForgeClient::new(
            sources.curseforge_url.clone(),
            sources.curseforge_api_key.clone(),
        )?)));
        registry.register(Updater::GitHub(Box::new(GitHubClient::new(
            sources.github_url.clone(),
            sources.github_token.clone(),
        )?)));
        Ok(registry)
    }

    /// Add an updater, replacing any with the same name
    pub fn register(&mut self, updater: Updater) {
        self.updaters.insert(updater.name(), updater);
    }

    pub fn get(&self, name: &str) -> Option<&Updater> {
        self.updaters.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.updaters.keys().copied()
    }

    pub fn parse_update(&self, source: &str, table: toml::Table) -> Result<UpdateSource> {
        self.get(source)
            .ok_or_else(|| Error::Unsupported(format!("update source '{}'", source)))?
            .parse_update(table)
    }

    /// The updater for a record: the first key of its `update` table with a
    /// registered updater
    pub fn route(&self, record: &ModRecord) -> Option<&Updater> {
        record.update.keys().find_map(|source| self.get(source))
    }

    /// Check and apply updates for every record in the pack
    pub fn update_all(&self, pack: &PackManifest) -> Result<UpdateReport> {
        self.run(pack, pack.records().collect())
    }

    /// Check and apply the update for one record
    pub fn update_one(&self, pack: &PackManifest, slug: &str) -> Result<UpdateOutcome> {
        let record = pack
            .record(slug)
            .ok_or_else(|| Error::NotFound(format!("no mod named '{}' in the pack", slug)))?;
        let mut report = self.run(pack, vec![record])?;
        report
            .outcomes
            .pop()
            .ok_or_else(|| Error::NotFound(format!("no update result for '{}'", slug)))
    }

    fn run(&self, pack: &PackManifest, records: Vec<&ModRecord>) -> Result<UpdateReport> {
        let mut outcomes: Vec<Option<UpdateOutcome>> = Vec::with_capacity(records.len());
        let mut groups: BTreeMap<&'static str, Vec<usize>> = BTreeMap::new();

        for (i, record) in records.iter().enumerate() {
            let slug = record.slug.clone();
            if record.pin {
                info!("Skipping pinned mod: {}", record.slug);
                outcomes.push(Some(UpdateOutcome::SkippedPinned { slug }));
                continue;
            }
            match self.route(record) {
                Some(updater) => {
                    groups.entry(updater.name()).or_default().push(i);
                    outcomes.push(None);
                }
                None => {
                    warn!(
                        "{} has no known update source ({}); skipping",
                        record.name,
                        record.source_names().join(", ")
                    );
                    outcomes.push(Some(UpdateOutcome::Unmanaged { slug }));
                }
            }
        }

        for (name, indices) in groups {
            let Some(updater) = self.get(name) else {
                continue;
            };
            let batch: Vec<&ModRecord> = indices.iter().map(|&i| records[i]).collect();
            debug!("Checking {} records with {}", batch.len(), name);
            let checks = updater.check_update(&batch, pack)?;

            for ((&i, record), check) in indices.iter().zip(batch).zip(checks) {
                let slug = record.slug.clone();
                outcomes[i] = Some(match check {
                    UpdateCheck { error: Some(error), .. } => UpdateOutcome::Failed { slug, error },
                    UpdateCheck {
                        available: true,
                        summary,
                        cached: Some(state),
                        ..
                    } => match apply_update(record, &state) {
                        Ok(updated) => UpdateOutcome::Updated {
                            slug,
                            summary,
                            record: updated,
                            state,
                        },
                        Err(error) => UpdateOutcome::Failed { slug, error },
                    },
                    _ => UpdateOutcome::UpToDate { slug },
                });
            }
        }

        Ok(UpdateReport {
            outcomes: outcomes.into_iter().flatten().collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{CurseForgeSource, GitHubSource, ModrinthSource, Side};

    fn modrinth_record() -> ModRecord {
        let mut record = ModRecord::new(
            "mods",
            "sodium",
            "Sodium",
            "sodium-0.5.0.jar",
            Download::from_url(
                "https://cdn.modrinth.com/old.jar",
                HashDigest {
                    format: "sha1".into(),
                    value: "old".into(),
                },
            ),
        );
        record.update.insert(
            "modrinth".into(),
            UpdateSource::Modrinth(ModrinthSource {
                project_id: "AANobbMI".into(),
                version_id: "old-version".into(),
            }),
        );
        record
    }

    fn candidate(id: &str, filename: &str) -> CandidateFile {
        let mut hashes = BTreeMap::new();
        hashes.insert("sha1".to_string(), "new-sha1".to_string());
        hashes.insert("sha512".to_string(), "new-sha512".to_string());
        CandidateFile {
            id: id.into(),
            version_number: "0.5.3".into(),
            filename: filename.into(),
            url: Some(format!("https://cdn.modrinth.com/{}", filename)),
            hashes,
            game_versions: vec!["1.20.1".into()],
            loaders: vec!["fabric".into()],
            published: None,
            primary: true,
            dependencies: vec![],
        }
    }

    fn project(id: &str, name: &str) -> SourceProject {
        SourceProject {
            id: id.into(),
            slug: name.to_lowercase(),
            name: name.into(),
            kind: "mod".into(),
            side: Side::Client,
            files: vec![],
            listing_error: None,
        }
    }

    #[test]
    fn test_apply_modrinth() {
        let record = modrinth_record();
        let state = CachedState::Modrinth {
            project: project("AANobbMI", "Sodium"),
            file: candidate("new-version", "sodium-0.5.3.jar"),
        };

        let updated = apply_update(&record, &state).unwrap();
        assert_eq!(updated.filename, "sodium-0.5.3.jar");
        assert_eq!(updated.download.hash_format, "sha512");
        assert_eq!(updated.download.hash, "new-sha512");
        assert_eq!(updated.modrinth().unwrap().version_id, "new-version");
        // The input record is untouched
        assert_eq!(record.filename, "sodium-0.5.0.jar");
    }

    #[test]
    fn test_apply_rejects_pinned() {
        let mut record = modrinth_record();
        record.pin = true;
        let state = CachedState::Modrinth {
            project: project("AANobbMI", "Sodium"),
            file: candidate("new-version", "sodium-0.5.3.jar"),
        };
        assert!(matches!(
            apply_update(&record, &state),
            Err(Error::InvalidOperation(_))
        ));
    }

    #[test]
    fn test_apply_rejects_foreign_state() {
        let record = modrinth_record();
        let state = CachedState::GitHub {
            release: Release {
                tag: "v2".into(),
                branch: String::new(),
                assets: vec![],
            },
            asset: ReleaseAsset {
                name: "x.jar".into(),
                url: "https://example.com/x.jar".into(),
                digest: Some("sha256:ff".into()),
            },
        };
        assert!(matches!(
            apply_update(&record, &state),
            Err(Error::InvalidOperation(_))
        ));
    }

    #[test]
    fn test_apply_curseforge() {
        let mut record = modrinth_record();
        record.update.clear();
        record.update.insert(
            "curseforge".into(),
            UpdateSource::CurseForge(CurseForgeSource {
                project_id: 238222,
                file_id: 1,
            }),
        );
        let mut file = candidate("4600000", "jei-15.jar");
        file.hashes.clear();
        file.hashes.insert("md5".into(), "m".into());
        let state = CachedState::CurseForge {
            project: project("238222", "Just Enough Items"),
            file,
        };

        let updated = apply_update(&record, &state).unwrap();
        assert_eq!(updated.name, "Just Enough Items");
        assert_eq!(updated.download.mode, DownloadMode::curseforge());
        assert_eq!(updated.download.url, None);
        assert_eq!(updated.download.hash_format, "md5");
        assert_eq!(updated.curseforge().unwrap().file_id, 4600000);
    }

    #[test]
    fn test_apply_github() {
        let mut record = modrinth_record();
        record.update.clear();
        record.update.insert(
            "github".into(),
            UpdateSource::GitHub(GitHubSource {
                slug: "o/r".into(),
                tag: "v1".into(),
                branch: String::new(),
                regex: github::DEFAULT_ASSET_REGEX.into(),
            }),
        );
        let asset = ReleaseAsset {
            name: "r-2.0.jar".into(),
            url: "https://github.com/o/r/releases/download/v2/r-2.0.jar".into(),
            digest: Some("sha256:abcd".into()),
        };
        let state = CachedState::GitHub {
            release: Release {
                tag: "v2".into(),
                branch: "main".into(),
                assets: vec![asset.clone()],
            },
            asset,
        };

        let updated = apply_update(&record, &state).unwrap();
        assert_eq!(updated.filename, "r-2.0.jar");
        assert_eq!(updated.download.hash_format, "sha256");
        assert_eq!(updated.download.hash, "abcd");
        assert_eq!(updated.github().unwrap().tag, "v2");
    }

    #[test]
    fn test_batch_error_keeps_kind() {
        let e = batch_error(&Error::NotFound("projects".into()));
        assert_eq!(e.kind(), "not-found");
        let io = Error::from(std::io::Error::new(std::io::ErrorKind::Other, "reset"));
        assert_eq!(batch_error(&io).kind(), "external-failure");
    }

    #[test]
    fn test_registry_parse_update_unknown_source() {
        let registry = UpdaterRegistry::new();
        assert!(matches!(
            registry.parse_update("jenkins", toml::Table::new()),
            Err(Error::Unsupported(_))
        ));
    }
}
