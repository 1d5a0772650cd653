//! GitHub releases client
//!
//! A GitHub-hosted artifact is identified by `owner/repo`, an optional
//! branch, and a regex that picks exactly one asset out of a release.

use super::{api_url, http_client, send_json, Release, ReleaseAsset, ReleaseClient};
use crate::hash::HashDigest;
use crate::record::{slugify, Download, GitHubSource, ModRecord, UpdateSource};
use crate::{Error, Result};
use regex::Regex;
use serde::Deserialize;
use tracing::debug;

const SERVICE: &str = "GitHub";

/// Asset pattern recorded when none is given: any `.jar` that is not an
/// API, dev or sources build
pub const DEFAULT_ASSET_REGEX: &str = r"^.+(?<!-api|-dev|-dev-preshadow|-sources)\.jar$";

const EXCLUDED_JAR_SUFFIXES: [&str; 4] = ["-api.jar", "-dev.jar", "-dev-preshadow.jar", "-sources.jar"];

#[derive(Debug, Deserialize)]
struct ApiRelease {
    tag_name: String,
    #[serde(default)]
    target_commitish: String,
    #[serde(default)]
    assets: Vec<ApiAsset>,
}

#[derive(Debug, Deserialize)]
struct ApiAsset {
    name: String,
    browser_download_url: String,
    digest: Option<String>,
}

impl From<ApiRelease> for Release {
    fn from(r: ApiRelease) -> Self {
        Release {
            tag: r.tag_name,
            branch: r.target_commitish,
            assets: r
                .assets
                .into_iter()
                .map(|a| ReleaseAsset {
                    name: a.name,
                    url: a.browser_download_url,
                    digest: a.digest,
                })
                .collect(),
        }
    }
}

pub struct GitHubClient {
    base_url: String,
    token: Option<String>,
    client: reqwest::blocking::Client,
}

impl GitHubClient {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Result<Self> {
        Ok(Self {
            base_url: base_url.into(),
            token,
            client: http_client()?,
        })
    }
}

impl ReleaseClient for GitHubClient {
    fn latest_release(&self, slug: &str, branch: Option<&str>) -> Result<Release> {
        let url = api_url(&self.base_url, &format!("repos/{}/releases", slug))?;
        let mut request = self
            .client
            .get(url)
            .header("Accept", "application/vnd.github+json");
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let releases: Vec<ApiRelease> =
            send_json(request, SERVICE, &format!("releases of {}", slug))?;
        debug!("{} has {} releases", slug, releases.len());

        let release = match branch.filter(|b| !b.is_empty()) {
            Some(branch) => releases
                .into_iter()
                .find(|r| r.target_commitish == branch)
                .ok_or_else(|| {
                    Error::NotFound(format!("no release of {} for branch {}", slug, branch))
                })?,
            None => releases
                .into_iter()
                .next()
                .ok_or_else(|| Error::NotFound(format!("{} has no releases", slug)))?,
        };
        Ok(release.into())
    }
}

/// Accept `owner/repo` or a github.com URL
pub fn parse_slug(slug_or_url: &str) -> Result<String> {
    let trimmed = slug_or_url.trim().trim_end_matches('/');
    let path = ["https://github.com/", "http://github.com/", "https://www.github.com/"]
        .iter()
        .find_map(|prefix| trimmed.strip_prefix(prefix))
        .unwrap_or(trimmed);

    let mut parts = path.split('/');
    match (parts.next(), parts.next()) {
        (Some(owner), Some(repo)) if !owner.is_empty() && !repo.is_empty() => {
            Ok(format!("{}/{}", owner, repo.trim_end_matches(".git")))
        }
        _ => Err(Error::Malformed(format!(
            "'{}' is not a GitHub repository (expected owner/repo)",
            slug_or_url
        ))),
    }
}

fn asset_matches(pattern: &str, name: &str) -> Result<bool> {
    if pattern == DEFAULT_ASSET_REGEX {
        return Ok(name.ends_with(".jar")
            && name.len() > ".jar".len()
            && !EXCLUDED_JAR_SUFFIXES.iter().any(|s| name.ends_with(s)));
    }
    let regex = Regex::new(pattern)
        .map_err(|e| Error::Malformed(format!("invalid asset regex '{}': {}", pattern, e)))?;
    Ok(regex.is_match(name))
}

/// The single asset of `release` matching `pattern`
pub fn select_asset<'a>(release: &'a Release, pattern: &str) -> Result<&'a ReleaseAsset> {
    if release.assets.is_empty() {
        return Err(Error::NotFound(format!(
            "release {} doesn't have any assets attached",
            release.tag
        )));
    }

    let mut matching = Vec::new();
    for asset in &release.assets {
        if asset_matches(pattern, &asset.name)? {
            matching.push(asset);
        }
    }

    match matching.as_slice() {
        [] => Err(Error::NotFound(format!(
            "release {} doesn't have any assets matching {}",
            release.tag, pattern
        ))),
        [asset] => Ok(asset),
        many => Err(Error::InvalidOperation(format!(
            "release {} has more than one asset matching {}: {}",
            release.tag,
            pattern,
            many.iter().map(|a| a.name.as_str()).collect::<Vec<_>>().join(", ")
        ))),
    }
}

/// Descriptor for a release asset
pub fn new_record(
    slug: &str,
    release: &Release,
    branch: Option<&str>,
    pattern: &str,
    folder: &str,
) -> Result<ModRecord> {
    let asset = select_asset(release, pattern)?;
    let repo_name = slug.rsplit('/').next().unwrap_or(slug);

    let mut record = ModRecord::new(
        folder,
        &slugify(repo_name)?,
        repo_name,
        asset.name.clone(),
        Download::from_url(
            asset.url.clone(),
            HashDigest {
                format: "sha256".to_string(),
                value: asset.sha256()?,
            },
        ),
    );
    record.update.insert(
        "github".to_string(),
        UpdateSource::GitHub(GitHubSource {
            slug: slug.to_string(),
            tag: release.tag.clone(),
            branch: branch.unwrap_or_default().to_string(),
            regex: pattern.to_string(),
        }),
    );
    Ok(record)
}
