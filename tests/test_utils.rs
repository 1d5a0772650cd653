//! Test utilities and helpers for packsmith integration tests.
//!
//! This module provides in-memory source clients, pack fixtures on disk, and
//! builders for the projects and files those clients serve.

#![allow(dead_code)]

use packsmith::record::{CurseForgeSource, GitHubSource, ModrinthSource};
use packsmith::sources::{
    CandidateFile, Ecosystem, FileDependency, Release, ReleaseAsset, ReleaseClient,
    SelectionContext, SourceClient, SourceProject,
};
use packsmith::{
    ContentIndex, Download, Error, HashDigest, ModRecord, PackManifest, Result, Side,
    UpdateSource,
};
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Minecraft version every fixture pack targets
pub const MC_VERSION: &str = "1.20.1";

// ============================================================================
// Candidate files and projects
// ============================================================================

/// Builder for a [`CandidateFile`] that suits a [`MC_VERSION`] pack
pub struct MockFile {
    file: CandidateFile,
}

impl MockFile {
    pub fn new(id: &str, filename: &str) -> Self {
        let mut hashes = BTreeMap::new();
        hashes.insert("sha1".to_string(), format!("{:0>40}", id));
        Self {
            file: CandidateFile {
                id: id.to_string(),
                version_number: "1.0.0".to_string(),
                filename: filename.to_string(),
                url: Some(format!("https://cdn.example.invalid/{}", filename)),
                hashes,
                game_versions: vec![MC_VERSION.to_string()],
                loaders: vec!["fabric".to_string()],
                published: None,
                primary: true,
                dependencies: Vec::new(),
            },
        }
    }

    pub fn game_versions(mut self, versions: &[&str]) -> Self {
        self.file.game_versions = versions.iter().map(|v| v.to_string()).collect();
        self
    }

    pub fn loaders(mut self, loaders: &[&str]) -> Self {
        self.file.loaders = loaders.iter().map(|l| l.to_string()).collect();
        self
    }

    pub fn depends_on(mut self, project_id: &str) -> Self {
        self.file
            .dependencies
            .push(FileDependency::required_project(project_id));
        self
    }

    pub fn depends_on_version(mut self, version_id: &str) -> Self {
        self.file
            .dependencies
            .push(FileDependency::required_version(version_id));
        self
    }

    pub fn build(self) -> CandidateFile {
        self.file
    }
}

pub fn project(id: &str, slug: &str, files: Vec<CandidateFile>) -> SourceProject {
    SourceProject {
        id: id.to_string(),
        slug: slug.to_string(),
        name: slug.to_string(),
        kind: "mod".to_string(),
        side: Side::Both,
        files,
        listing_error: None,
    }
}

/// A project with a single acceptable file `<id>-file` depending on `deps`
pub fn simple_project(id: &str, deps: &[&str]) -> SourceProject {
    let file = deps
        .iter()
        .fold(MockFile::new(&format!("{}-file", id), &format!("{}.jar", id)), |f, d| {
            f.depends_on(d)
        })
        .build();
    project(id, &id.to_lowercase(), vec![file])
}

// ============================================================================
// Mock clients
// ============================================================================

/// In-memory [`SourceClient`] serving a fixed set of projects
pub struct MockSourceClient {
    ecosystem: Ecosystem,
    projects: BTreeMap<String, SourceProject>,
    version_owners: BTreeMap<String, String>,
    failing: BTreeSet<String>,
    broken_listings: BTreeSet<String>,
    /// Every batch passed to `projects`, in call order
    pub requests: RefCell<Vec<Vec<String>>>,
}

impl MockSourceClient {
    pub fn new(ecosystem: Ecosystem) -> Self {
        Self {
            ecosystem,
            projects: BTreeMap::new(),
            version_owners: BTreeMap::new(),
            failing: BTreeSet::new(),
            broken_listings: BTreeSet::new(),
            requests: RefCell::new(Vec::new()),
        }
    }

    pub fn modrinth() -> Self {
        Self::new(Ecosystem::Modrinth)
    }

    pub fn with_project(mut self, project: SourceProject) -> Self {
        for file in &project.files {
            self.version_owners
                .insert(file.id.clone(), project.id.clone());
        }
        self.projects.insert(project.id.clone(), project);
        self
    }

    /// Any batch containing `id` fails as a whole
    pub fn failing_on(mut self, id: &str) -> Self {
        self.failing.insert(id.to_string());
        self
    }

    /// `id` is found but listing its files fails
    pub fn listing_fails_for(mut self, id: &str) -> Self {
        self.broken_listings.insert(id.to_string());
        self
    }

    pub fn request_count(&self) -> usize {
        self.requests.borrow().len()
    }
}

impl SourceClient for MockSourceClient {
    fn ecosystem(&self) -> Ecosystem {
        self.ecosystem
    }

    fn projects(&self, ids: &[String], _ctx: &SelectionContext) -> Result<Vec<SourceProject>> {
        self.requests.borrow_mut().push(ids.to_vec());
        if let Some(id) = ids.iter().find(|id| self.failing.contains(*id)) {
            return Err(Error::ExternalFailure(format!("mock failure fetching {}", id)));
        }

        Ok(ids
            .iter()
            .filter_map(|id| {
                self.projects
                    .get(id)
                    .or_else(|| self.projects.values().find(|p| &p.slug == id))
                    .cloned()
            })
            .map(|mut project| {
                if self.broken_listings.contains(&project.id) {
                    project.files.clear();
                    project.listing_error = Some("mock listing failure".to_string());
                }
                project
            })
            .collect())
    }

    fn version_owners(&self, version_ids: &[String]) -> Result<Vec<String>> {
        Ok(version_ids
            .iter()
            .filter_map(|id| self.version_owners.get(id).cloned())
            .collect())
    }
}

/// In-memory [`ReleaseClient`] with one release per repository
#[derive(Default)]
pub struct MockReleaseClient {
    releases: BTreeMap<String, Release>,
}

impl MockReleaseClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_release(mut self, slug: &str, tag: &str, assets: &[&str]) -> Self {
        let release = Release {
            tag: tag.to_string(),
            branch: "main".to_string(),
            assets: assets
                .iter()
                .map(|name| ReleaseAsset {
                    name: name.to_string(),
                    url: format!("https://github.invalid/{}/{}/{}", slug, tag, name),
                    digest: Some(format!("sha256:{:0>64}", tag.len())),
                })
                .collect(),
        };
        self.releases.insert(slug.to_string(), release);
        self
    }
}

impl ReleaseClient for MockReleaseClient {
    fn latest_release(&self, slug: &str, _branch: Option<&str>) -> Result<Release> {
        self.releases
            .get(slug)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("no releases for {}", slug)))
    }
}

// ============================================================================
// Records
// ============================================================================

fn digest(value: &str) -> HashDigest {
    HashDigest {
        format: "sha1".to_string(),
        value: format!("{:0>40}", value),
    }
}

pub fn modrinth_record(slug: &str, project_id: &str, version_id: &str) -> ModRecord {
    let mut record = ModRecord::new(
        "mods",
        slug,
        slug,
        format!("{}.jar", slug),
        Download::from_url(format!("https://cdn.example.invalid/{}.jar", slug), digest(version_id)),
    );
    record.update.insert(
        "modrinth".to_string(),
        UpdateSource::Modrinth(ModrinthSource {
            project_id: project_id.to_string(),
            version_id: version_id.to_string(),
        }),
    );
    record
}

pub fn curseforge_record(slug: &str, project_id: u32, file_id: u32) -> ModRecord {
    let mut record = ModRecord::new(
        "mods",
        slug,
        slug,
        format!("{}.jar", slug),
        Download::from_url(
            format!("https://edge.example.invalid/{}.jar", slug),
            digest(&file_id.to_string()),
        ),
    );
    record.update.insert(
        "curseforge".to_string(),
        UpdateSource::CurseForge(CurseForgeSource {
            project_id,
            file_id,
        }),
    );
    record
}

pub fn github_record(slug: &str, repo: &str, tag: &str) -> ModRecord {
    let mut record = ModRecord::new(
        "mods",
        slug,
        slug,
        format!("{}-{}.jar", slug, tag),
        Download::from_url(format!("https://github.invalid/{}", repo), digest(tag)),
    );
    record.update.insert(
        "github".to_string(),
        UpdateSource::GitHub(GitHubSource {
            slug: repo.to_string(),
            tag: tag.to_string(),
            branch: String::new(),
            regex: r"\.jar$".to_string(),
        }),
    );
    record
}

/// A record with no update source at all
pub fn manual_record(slug: &str) -> ModRecord {
    ModRecord::new(
        "mods",
        slug,
        slug,
        format!("{}.jar", slug),
        Download::from_url(format!("https://example.invalid/{}.jar", slug), digest(slug)),
    )
}

// ============================================================================
// Packs
// ============================================================================

/// In-memory manifest for a fabric (or other loader) pack
pub fn pack_with_loader(loader: Option<&str>) -> PackManifest {
    let mut pack = PackManifest::new("Test Pack", MC_VERSION, "sha256");
    if let Some(loader) = loader {
        pack.versions
            .insert(loader.to_string(), "0.15.0".to_string());
    }
    pack
}

pub fn pack_with_records(records: Vec<ModRecord>) -> PackManifest {
    let mut pack = pack_with_loader(Some("fabric"));
    for record in records {
        pack.insert_record(record);
    }
    pack
}

/// An isolated pack directory with its own config directory
pub struct TestPack {
    pub temp_dir: TempDir,
    pub root: PathBuf,
    pub config_dir: PathBuf,
}

impl TestPack {
    /// Create an empty directory (no pack.toml yet)
    pub fn empty() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let root = temp_dir.path().join("pack");
        let config_dir = temp_dir.path().join("config");
        fs::create_dir_all(&root).expect("Failed to create pack directory");
        fs::create_dir_all(&config_dir).expect("Failed to create config directory");

        Self {
            temp_dir,
            root,
            config_dir,
        }
    }

    /// Create a saved fabric pack holding `records`
    pub fn with_records(records: Vec<ModRecord>) -> Self {
        let test_pack = Self::empty();
        let mut pack = pack_with_loader(Some("fabric"));
        let mut index = ContentIndex::new(&test_pack.root, "index.toml", "sha256");
        for record in records {
            pack.write_record(&mut index, record)
                .expect("Failed to write record");
        }
        pack.save_with_index(&test_pack.root, &index)
            .expect("Failed to save pack");
        test_pack
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    pub fn write_file(&self, rel_path: &str, contents: &str) -> PathBuf {
        let path = self.root.join(rel_path);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent directory");
        }
        fs::write(&path, contents).expect("Failed to write file");
        path
    }

    pub fn read_file(&self, rel_path: &str) -> String {
        fs::read_to_string(self.root.join(rel_path)).expect("Failed to read file")
    }

    pub fn exists(&self, rel_path: &str) -> bool {
        self.root.join(rel_path).exists()
    }

    /// Load the manifest and every descriptor from disk
    pub fn load(&self) -> (PackManifest, ContentIndex) {
        let mut pack = PackManifest::load(&self.root).expect("Failed to load pack");
        let index = pack.open_index(&self.root).expect("Failed to open index");
        pack.load_records(&index).expect("Failed to load records");
        (pack, index)
    }
}
