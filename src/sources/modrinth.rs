//! Modrinth (v2 API) client
//!
//! Projects are fetched in one batch; each project's versions are then listed
//! with the pack's game versions and loaders as server-side filters and
//! normalized into [`CandidateFile`]s (one per version, its primary file).

use super::{
    api_url, http_client, send_json, CandidateFile, DependencyHandle, DependencyKind, Ecosystem,
    FileDependency, SelectionContext, SourceClient, SourceProject,
};
use crate::hash::HashDigest;
use crate::record::{slugify, Download, ModRecord, ModrinthSource, Side, UpdateSource};
use crate::selection::NON_MOD_LOADERS;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::{debug, warn};

const SERVICE: &str = "Modrinth";

/// Hash formats in the order a descriptor prefers them
pub const HASH_PREFERENCE: [&str; 4] = ["sha512", "sha256", "sha1", "murmur2"];

#[derive(Debug, Deserialize)]
struct ApiProject {
    id: String,
    slug: String,
    title: String,
    #[serde(default)]
    project_type: String,
    #[serde(default)]
    client_side: String,
    #[serde(default)]
    server_side: String,
}

#[derive(Debug, Deserialize)]
struct ApiVersion {
    id: String,
    project_id: String,
    #[serde(default)]
    version_number: String,
    date_published: Option<DateTime<Utc>>,
    #[serde(default)]
    game_versions: Vec<String>,
    #[serde(default)]
    loaders: Vec<String>,
    #[serde(default)]
    files: Vec<ApiFile>,
    #[serde(default)]
    dependencies: Vec<ApiDependency>,
}

#[derive(Debug, Deserialize)]
struct ApiFile {
    #[serde(default)]
    hashes: BTreeMap<String, String>,
    url: String,
    filename: String,
    #[serde(default)]
    primary: bool,
}

#[derive(Debug, Deserialize)]
struct ApiDependency {
    version_id: Option<String>,
    project_id: Option<String>,
    dependency_type: String,
}

pub struct ModrinthClient {
    base_url: String,
    client: reqwest::blocking::Client,
}

impl ModrinthClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        Ok(Self {
            base_url: base_url.into(),
            client: http_client()?,
        })
    }

    fn get_projects(&self, ids: &[String]) -> Result<Vec<ApiProject>> {
        let mut url = api_url(&self.base_url, "v2/projects")?;
        url.query_pairs_mut()
            .append_pair("ids", &serde_json::to_string(ids)?);
        send_json(self.client.get(url), SERVICE, "projects")
    }

    fn list_versions(&self, project_id: &str, ctx: &SelectionContext) -> Result<Vec<ApiVersion>> {
        let mut url = api_url(&self.base_url, &format!("v2/project/{}/version", project_id))?;
        {
            let mut query = url.query_pairs_mut();
            if !ctx.game_versions.is_empty() {
                query.append_pair("game_versions", &serde_json::to_string(&ctx.game_versions)?);
            }
            if !ctx.loaders.is_empty() {
                let mut loaders = ctx.loaders.clone();
                loaders.extend(NON_MOD_LOADERS.iter().map(|l| l.to_string()));
                query.append_pair("loaders", &serde_json::to_string(&loaders)?);
            }
        }
        send_json(
            self.client.get(url),
            SERVICE,
            &format!("versions of project {}", project_id),
        )
    }

    fn get_versions(&self, ids: &[String]) -> Result<Vec<ApiVersion>> {
        let mut url = api_url(&self.base_url, "v2/versions")?;
        url.query_pairs_mut()
            .append_pair("ids", &serde_json::to_string(ids)?);
        send_json(self.client.get(url), SERVICE, "versions")
    }
}

impl SourceClient for ModrinthClient {
    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::Modrinth
    }

    fn projects(&self, ids: &[String], ctx: &SelectionContext) -> Result<Vec<SourceProject>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let projects = self.get_projects(ids)?;

        let mut result = Vec::with_capacity(projects.len());
        for project in projects {
            let (files, listing_error) = match self.list_versions(&project.id, ctx) {
                Ok(versions) => (
                    versions.into_iter().filter_map(normalize_version).collect(),
                    None,
                ),
                Err(e) => {
                    warn!("Failed to list versions of {}: {}", project.title, e);
                    (Vec::new(), Some(e.to_string()))
                }
            };
            debug!("{} has {} candidate versions", project.title, files.len());
            result.push(SourceProject {
                side: side_from_requirements(&project.client_side, &project.server_side),
                id: project.id,
                slug: project.slug,
                name: project.title,
                kind: project.project_type,
                files,
                listing_error,
            });
        }
        Ok(result)
    }

    fn version_owners(&self, version_ids: &[String]) -> Result<Vec<String>> {
        if version_ids.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self
            .get_versions(version_ids)?
            .into_iter()
            .map(|v| v.project_id)
            .collect())
    }
}

fn normalize_version(version: ApiVersion) -> Option<CandidateFile> {
    let file_index = version
        .files
        .iter()
        .position(|f| f.primary)
        .or(if version.files.is_empty() { None } else { Some(0) })?;
    let file = version.files.into_iter().nth(file_index)?;

    let dependencies = version
        .dependencies
        .into_iter()
        .filter_map(|d| {
            let kind = match d.dependency_type.as_str() {
                "required" => DependencyKind::Required,
                "optional" => DependencyKind::Optional,
                "incompatible" => DependencyKind::Incompatible,
                "embedded" => DependencyKind::Embedded,
                _ => return None,
            };
            let handle = match (d.version_id, d.project_id) {
                (Some(version_id), _) => DependencyHandle::Version(version_id),
                (None, Some(project_id)) => DependencyHandle::Project(project_id),
                (None, None) => return None,
            };
            Some(FileDependency { kind, handle })
        })
        .collect();

    Some(CandidateFile {
        id: version.id,
        version_number: version.version_number,
        filename: file.filename,
        url: Some(file.url),
        hashes: file.hashes,
        game_versions: version.game_versions,
        loaders: version.loaders,
        published: version.date_published,
        primary: file.primary,
        dependencies,
    })
}

fn should_download_on(requirement: &str) -> bool {
    requirement == "required" || requirement == "optional"
}

/// Side from Modrinth's client/server requirement fields
pub fn side_from_requirements(client: &str, server: &str) -> Side {
    match (should_download_on(client), should_download_on(server)) {
        (true, false) => Side::Client,
        (false, true) => Side::Server,
        _ => Side::Both,
    }
}

fn loader_folder(loader: &str) -> Option<&'static str> {
    match loader {
        "quilt" | "fabric" | "forge" | "neoforge" | "liteloader" | "modloader" | "rift" => {
            Some("mods")
        }
        "bukkit" | "spigot" | "paper" | "purpur" | "sponge" | "velocity" | "waterfall"
        | "bungeecord" => Some("plugins"),
        "canvas" | "vanilla" | "minecraft" => Some("resourcepacks"),
        "iris" | "optifine" => Some("shaderpacks"),
        "datapack" => Some("datapacks"),
        _ => None,
    }
}

/// Destination folder for a project's file
pub fn project_folder(
    kind: &str,
    file_loaders: &[String],
    pack_loaders: &[String],
    default_folder: &str,
) -> String {
    match kind {
        "resourcepack" => return "resourcepacks".to_string(),
        "shader" => return "shaderpacks".to_string(),
        "datapack" => return "datapacks".to_string(),
        "plugin" => return "plugins".to_string(),
        _ => {}
    }

    // A loader the pack runs decides first, then any loader we know
    let preferred = file_loaders
        .iter()
        .filter(|l| pack_loaders.contains(l))
        .find_map(|l| loader_folder(l));
    preferred
        .or_else(|| file_loaders.iter().find_map(|l| loader_folder(l)))
        .map(str::to_string)
        .unwrap_or_else(|| default_folder.to_string())
}

/// Descriptor for a selected Modrinth file
pub fn new_record(
    project: &SourceProject,
    file: &CandidateFile,
    ctx: &SelectionContext,
    default_folder: &str,
) -> Result<ModRecord> {
    let (format, value) = file.best_hash(&HASH_PREFERENCE).ok_or_else(|| {
        Error::ExternalFailure(format!(
            "{} {} has no usable hash",
            project.name, file.version_number
        ))
    })?;
    let url = file.url.clone().ok_or_else(|| {
        Error::ExternalFailure(format!("{} {} has no download URL", project.name, file.filename))
    })?;

    let slug = if project.slug.is_empty() {
        slugify(&project.name)?
    } else {
        project.slug.clone()
    };
    let folder = project_folder(&project.kind, &file.loaders, &ctx.loaders, default_folder);

    let mut record = ModRecord::new(
        &folder,
        &slug,
        project.name.clone(),
        file.filename.clone(),
        Download::from_url(url, HashDigest { format, value }),
    );
    record.side = project.side;
    record.update.insert(
        "modrinth".to_string(),
        UpdateSource::Modrinth(ModrinthSource {
            project_id: project.id.clone(),
            version_id: file.id.clone(),
        }),
    );
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_side_from_requirements() {
        assert_eq!(side_from_requirements("required", "unsupported"), Side::Client);
        assert_eq!(side_from_requirements("unsupported", "optional"), Side::Server);
        assert_eq!(side_from_requirements("required", "required"), Side::Both);
        assert_eq!(side_from_requirements("unsupported", "unsupported"), Side::Both);
    }

    #[test]
    fn test_project_folder() {
        let pack = strings(&["quilt", "fabric"]);
        assert_eq!(project_folder("mod", &strings(&["fabric"]), &pack, "mods"), "mods");
        assert_eq!(
            project_folder("mod", &strings(&["paper", "fabric"]), &pack, "mods"),
            "mods"
        );
        assert_eq!(project_folder("mod", &strings(&["paper"]), &pack, "mods"), "plugins");
        assert_eq!(
            project_folder("shader", &strings(&["iris"]), &pack, "mods"),
            "shaderpacks"
        );
        assert_eq!(
            project_folder("resourcepack", &strings(&["minecraft"]), &pack, "mods"),
            "resourcepacks"
        );
        assert_eq!(project_folder("mod", &[], &pack, "content"), "content");
    }

    #[test]
    fn test_normalize_prefers_primary_file() {
        let version: ApiVersion = serde_json::from_str(
            r#"{
                "id": "v1",
                "project_id": "p1",
                "version_number": "1.0.0",
                "date_published": "2024-01-02T03:04:05Z",
                "game_versions": ["1.20.1"],
                "loaders": ["fabric"],
                "files": [
                    {"hashes": {"sha1": "a"}, "url": "https://x/sources.jar", "filename": "sources.jar", "primary": false},
                    {"hashes": {"sha1": "b", "sha512": "c"}, "url": "https://x/mod.jar", "filename": "mod.jar", "primary": true}
                ],
                "dependencies": [
                    {"version_id": null, "project_id": "P7dR8mSH", "dependency_type": "required"},
                    {"version_id": "dep-v", "project_id": "dep-p", "dependency_type": "optional"}
                ]
            }"#,
        )
        .unwrap();

        let file = normalize_version(version).unwrap();
        assert_eq!(file.filename, "mod.jar");
        assert_eq!(file.hashes.get("sha512").map(String::as_str), Some("c"));
        assert_eq!(
            file.required_dependencies().collect::<Vec<_>>(),
            vec![&DependencyHandle::Project("P7dR8mSH".to_string())]
        );
        assert_eq!(file.dependencies[1].handle, DependencyHandle::Version("dep-v".into()));
    }

    #[test]
    fn test_normalize_skips_versions_without_files() {
        let version: ApiVersion = serde_json::from_str(
            r#"{"id": "v1", "project_id": "p1", "version_number": "1", "files": []}"#,
        )
        .unwrap();
        assert!(normalize_version(version).is_none());
    }

    #[test]
    fn test_new_record() {
        let mut hashes = BTreeMap::new();
        hashes.insert("sha1".to_string(), "s1".to_string());
        hashes.insert("sha512".to_string(), "s512".to_string());
        let file = CandidateFile {
            id: "ver123".into(),
            version_number: "0.5.3".into(),
            filename: "sodium-fabric-0.5.3.jar".into(),
            url: Some("https://cdn.modrinth.com/sodium.jar".into()),
            hashes,
            game_versions: strings(&["1.20.1"]),
            loaders: strings(&["fabric"]),
            published: None,
            primary: true,
            dependencies: vec![],
        };
        let project = SourceProject {
            id: "AANobbMI".into(),
            slug: "sodium".into(),
            name: "Sodium".into(),
            kind: "mod".into(),
            side: Side::Client,
            files: vec![file.clone()],
            listing_error: None,
        };
        let ctx = SelectionContext {
            game_versions: strings(&["1.20.1"]),
            loaders: strings(&["fabric"]),
        };

        let record = new_record(&project, &file, &ctx, "mods").unwrap();
        assert_eq!(record.meta_path, "mods/sodium.pw.toml");
        assert_eq!(record.side, Side::Client);
        assert_eq!(record.download.hash_format, "sha512");
        assert_eq!(record.download.hash, "s512");
        assert_eq!(
            record.modrinth(),
            Some(&ModrinthSource {
                project_id: "AANobbMI".into(),
                version_id: "ver123".into()
            })
        );
    }
}
