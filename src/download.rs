//! Artifact downloads for re-hashing and adding files by URL
//!
//! A record's artifact is located either by its `download.url` or, in
//! `metadata:<source>` mode, by asking the source for a download location.
//! Downloads are streamed through the hash engines; nothing is written to
//! disk.

use crate::config::Config;
use crate::hash::{HashDigest, HashRegistry, Hasher, ProgressCallback, REHASH_FORMATS};
use crate::record::{DownloadMode, ModRecord};
use crate::sources::curseforge::CurseForgeClient;
use crate::sources::http_client;
use crate::{Error, Result};
use std::io::Read;
use tracing::debug;

pub struct Downloader {
    client: reqwest::blocking::Client,
    curseforge: CurseForgeClient,
    hashes: HashRegistry,
}

impl Downloader {
    pub fn new(curseforge: CurseForgeClient) -> Result<Self> {
        Ok(Self {
            client: http_client()?,
            curseforge,
            hashes: HashRegistry::new(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(CurseForgeClient::new(
            config.sources.curseforge_url.clone(),
            config.sources.curseforge_api_key.clone(),
        )?)
    }

    /// Where the record's artifact can be fetched from
    pub fn resolve_url(&self, record: &ModRecord) -> Result<String> {
        match &record.download.mode {
            DownloadMode::Url => record.download.url.clone().ok_or_else(|| {
                Error::Malformed(format!("{} has no download URL", record.meta_path))
            }),
            DownloadMode::Metadata(source) if source == "curseforge" => {
                let ids = record.curseforge().ok_or_else(|| {
                    Error::Malformed(format!(
                        "{} uses metadata:curseforge but has no [update.curseforge] table",
                        record.meta_path
                    ))
                })?;
                match self.curseforge.download_url(ids.project_id, ids.file_id)? {
                    Some(url) => Ok(url),
                    None => {
                        let page = self.curseforge.website_url(ids.project_id, ids.file_id)?;
                        Err(Error::NotFound(format!(
                            "{} ({}) cannot be downloaded automatically; download it manually from {}",
                            record.name, record.filename, page
                        )))
                    }
                }
            }
            DownloadMode::Metadata(source) => Err(Error::Unsupported(format!(
                "download mode metadata:{}",
                source
            ))),
        }
    }

    /// Download the artifact, verify its recorded hash and hash it with `format`
    pub fn rehash(
        &self,
        record: &ModRecord,
        format: &str,
        progress: Option<ProgressCallback>,
    ) -> Result<HashDigest> {
        check_rehash_format(format)?;
        let url = self.resolve_url(record)?;
        debug!("Downloading {} from {}", record.filename, url);

        let existing = self.hashes.get_hasher(&record.download.hash_format)?;
        let wanted = self.hashes.get_hasher(format)?;
        let [computed, digest] = self.stream(&url, &record.filename, [existing, wanted], progress)?;

        if !computed.value.eq_ignore_ascii_case(&record.download.hash) {
            return Err(Error::IntegrityViolation(format!(
                "Checksum mismatch for {}!\nExpected: {}\nComputed: {}",
                record.filename, record.download.hash, computed.value
            )));
        }
        Ok(digest)
    }

    /// Download `url` and hash it with `format`, for files added by URL
    pub fn hash_url(
        &self,
        url: &str,
        format: &str,
        progress: Option<ProgressCallback>,
    ) -> Result<HashDigest> {
        check_rehash_format(format)?;
        let name = url.rsplit('/').next().unwrap_or(url);
        debug!("Downloading {} to hash it", url);
        let [digest] = self.stream(url, name, [self.hashes.get_hasher(format)?], progress)?;
        Ok(digest)
    }

    fn stream<const N: usize>(
        &self,
        url: &str,
        name: &str,
        mut hashers: [Hasher; N],
        progress: Option<ProgressCallback>,
    ) -> Result<[HashDigest; N]> {
        let mut response = self
            .client
            .get(url)
            .send()
            .map_err(|e| Error::ExternalFailure(format!("Failed to download {}: {}", name, e)))?;
        if !response.status().is_success() {
            return Err(Error::ExternalFailure(format!(
                "Download of {} failed: HTTP {}",
                name,
                response.status()
            )));
        }

        let total = response.content_length().unwrap_or(0);
        let mut buffer = vec![0; 8192];
        let mut bytes_processed: u64 = 0;

        loop {
            let bytes_read = response.read(&mut buffer)?;
            if bytes_read == 0 {
                break;
            }
            for hasher in hashers.iter_mut() {
                hasher.update(&buffer[..bytes_read]);
            }
            bytes_processed += bytes_read as u64;

            if let Some(ref cb) = progress {
                cb(name, bytes_processed, total);
            }
        }

        Ok(hashers.map(Hasher::finalize))
    }
}

/// Only cryptographic formats may be recorded by a rehash
pub fn check_rehash_format(format: &str) -> Result<()> {
    if REHASH_FORMATS.contains(&format) {
        Ok(())
    } else {
        Err(Error::Unsupported(format!(
            "hash format '{}' (choose one of {})",
            format,
            REHASH_FORMATS.join(", ")
        )))
    }
}

/// A copy of `record` carrying `digest` as its download hash
pub fn with_digest(record: &ModRecord, digest: HashDigest) -> ModRecord {
    let mut updated = record.clone();
    updated.download.hash_format = digest.format;
    updated.download.hash = digest.value;
    updated
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{CurseForgeSource, Download, UpdateSource};

    fn url_record(url: &str, digest: HashDigest) -> ModRecord {
        ModRecord::new("mods", "thing", "Thing", "thing.jar", Download::from_url(url, digest))
    }

    fn offline_downloader() -> Downloader {
        Downloader::new(CurseForgeClient::new("http://127.0.0.1:9", None).unwrap()).unwrap()
    }

    #[test]
    fn test_check_rehash_format() {
        assert!(check_rehash_format("sha512").is_ok());
        assert!(matches!(check_rehash_format("murmur2"), Err(Error::Unsupported(_))));
        assert!(matches!(check_rehash_format("md5"), Err(Error::Unsupported(_))));
    }

    #[test]
    fn test_resolve_url_mode() {
        let record = url_record(
            "https://example.com/thing.jar",
            HashDigest {
                format: "sha1".into(),
                value: "00".into(),
            },
        );
        assert_eq!(
            offline_downloader().resolve_url(&record).unwrap(),
            "https://example.com/thing.jar"
        );
    }

    #[test]
    fn test_resolve_unknown_metadata_source() {
        let mut record = url_record(
            "https://example.com/thing.jar",
            HashDigest {
                format: "sha1".into(),
                value: "00".into(),
            },
        );
        record.download.mode = DownloadMode::Metadata("jenkins".into());
        assert!(matches!(
            offline_downloader().resolve_url(&record),
            Err(Error::Unsupported(_))
        ));

        record.download.mode = DownloadMode::curseforge();
        assert!(matches!(
            offline_downloader().resolve_url(&record),
            Err(Error::Malformed(_))
        ));

        record.update.insert(
            "curseforge".into(),
            UpdateSource::CurseForge(CurseForgeSource {
                project_id: 1,
                file_id: 2,
            }),
        );
        // No API key configured
        assert!(matches!(
            offline_downloader().resolve_url(&record),
            Err(Error::ExternalFailure(_))
        ));
    }

    #[test]
    fn test_with_digest() {
        let record = url_record(
            "https://example.com/thing.jar",
            HashDigest {
                format: "sha1".into(),
                value: "00".into(),
            },
        );
        let updated = with_digest(
            &record,
            HashDigest {
                format: "sha512".into(),
                value: "ff".into(),
            },
        );
        assert_eq!(updated.download.hash_format, "sha512");
        assert_eq!(updated.download.hash, "ff");
        assert_eq!(updated.download.url, record.download.url);
    }
}
