//! Hash engines and checksum verification
//!
//! Every digest the pack stores goes through a [`HashRegistry`]: the index
//! hashes tracked files, descriptors record the hash of the artifact they
//! download, and CurseForge matches files by their Murmur2 fingerprint.
//!
//! # Examples
//!
//! ```no_run
//! use packsmith::HashRegistry;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let hashes = HashRegistry::new();
//!
//! let digest = hashes.hash_file("sha256", "mods/sodium.jar", None)?;
//! println!("{} = {}", digest.format, digest.value);
//!
//! hashes.verify_file("mods/sodium.jar", "sha256", &digest.value, None)?;
//! # Ok(())
//! # }
//! ```

use crate::{Error, Result};
use md5::Md5;
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha512};
use std::fs::{self, File};
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

/// Progress callback for hashing and scanning operations
///
/// Called with:
/// - `message`: Description of current operation (e.g., "Hashing mods/sodium.jar")
/// - `current`: Current progress (items or bytes processed)
/// - `total`: Total work (items or bytes)
pub type ProgressCallback = Arc<dyn Fn(&str, u64, u64) + Send + Sync>;

/// Hash formats in order of preference when matching files against a remote source
pub const PREFERRED_HASHES: [&str; 5] = ["murmur2", "md5", "sha1", "sha256", "sha512"];

/// Formats a descriptor may be rehashed to
pub const REHASH_FORMATS: [&str; 3] = ["sha1", "sha256", "sha512"];

/// A digest value together with the algorithm that produced it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashDigest {
    pub format: String,
    pub value: String,
}

/// Stateful hash engine returned by [`HashRegistry::get_hasher`]
pub enum Hasher {
    Sha1(Sha1),
    Sha256(Sha256),
    Sha512(Sha512),
    Md5(Md5),
    Murmur2(Murmur2Cf),
    /// Byte counter, only used to compare sizes; never persisted
    LengthBytes(u64),
}

impl Hasher {
    /// Canonical lowercase name of the algorithm
    pub fn name(&self) -> &'static str {
        match self {
            Hasher::Sha1(_) => "sha1",
            Hasher::Sha256(_) => "sha256",
            Hasher::Sha512(_) => "sha512",
            Hasher::Md5(_) => "md5",
            Hasher::Murmur2(_) => "murmur2",
            Hasher::LengthBytes(_) => "length-bytes",
        }
    }

    pub fn update(&mut self, data: &[u8]) {
        match self {
            Hasher::Sha1(h) => h.update(data),
            Hasher::Sha256(h) => h.update(data),
            Hasher::Sha512(h) => h.update(data),
            Hasher::Md5(h) => h.update(data),
            Hasher::Murmur2(h) => {
                h.update(data);
            }
            Hasher::LengthBytes(n) => *n += data.len() as u64,
        }
    }

    /// Consume the engine and render its digest as a string
    ///
    /// Cryptographic digests are lowercase hex; murmur2 and length-bytes are
    /// unsigned decimal.
    pub fn finalize(self) -> HashDigest {
        let format = self.name().to_string();
        let value = match self {
            Hasher::Sha1(h) => hex::encode(h.finalize()),
            Hasher::Sha256(h) => hex::encode(h.finalize()),
            Hasher::Sha512(h) => hex::encode(h.finalize()),
            Hasher::Md5(h) => hex::encode(h.finalize()),
            Hasher::Murmur2(h) => h.finish().to_string(),
            Hasher::LengthBytes(n) => n.to_string(),
        };
        HashDigest { format, value }
    }
}

/// CurseForge's fingerprint: Murmur2 (seed 1) over the input with
/// whitespace bytes removed
///
/// The filter drops tab, line feed, carriage return and space before hashing,
/// so the fingerprint of a text file is stable across line-ending conversions.
/// Bytes are buffered and the hash is computed in [`Murmur2Cf::finish`].
#[derive(Debug, Clone, Default)]
pub struct Murmur2Cf {
    buffer: Vec<u8>,
}

impl Murmur2Cf {
    const SEED: u32 = 1;

    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of bytes consumed, including filtered ones
    pub fn update(&mut self, data: &[u8]) -> usize {
        self.buffer
            .extend(data.iter().copied().filter(|b| !is_fingerprint_whitespace(*b)));
        data.len()
    }

    pub fn finish(&self) -> u32 {
        murmur2(&self.buffer, Self::SEED)
    }
}

fn is_fingerprint_whitespace(b: u8) -> bool {
    matches!(b, 9 | 10 | 13 | 32)
}

fn murmur2(data: &[u8], seed: u32) -> u32 {
    const M: u32 = 0x5bd1_e995;
    const R: u32 = 24;

    let mut h = seed ^ (data.len() as u32);

    let mut chunks = data.chunks_exact(4);
    for chunk in &mut chunks {
        let mut k = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        k = k.wrapping_mul(M);
        k ^= k >> R;
        k = k.wrapping_mul(M);

        h = h.wrapping_mul(M);
        h ^= k;
    }

    let tail = chunks.remainder();
    if tail.len() >= 3 {
        h ^= u32::from(tail[2]) << 16;
    }
    if tail.len() >= 2 {
        h ^= u32::from(tail[1]) << 8;
    }
    if !tail.is_empty() {
        h ^= u32::from(tail[0]);
        h = h.wrapping_mul(M);
    }

    h ^= h >> 13;
    h = h.wrapping_mul(M);
    h ^= h >> 15;
    h
}

/// Registry of the hash engines known to packsmith
///
/// Built once per invocation and passed by reference to whatever needs to
/// hash: the index refresh, descriptor writes, rehash and downloads.
#[derive(Debug, Clone, Default)]
pub struct HashRegistry;

impl HashRegistry {
    pub fn new() -> Self {
        Self
    }

    /// Names of every supported engine
    pub fn formats(&self) -> [&'static str; 6] {
        ["sha1", "sha256", "sha512", "md5", "murmur2", "length-bytes"]
    }

    pub fn supports(&self, name: &str) -> bool {
        self.get_hasher(name).is_ok()
    }

    /// Get a fresh engine for an algorithm name (case-insensitive)
    pub fn get_hasher(&self, name: &str) -> Result<Hasher> {
        match name.to_ascii_lowercase().as_str() {
            "sha1" => Ok(Hasher::Sha1(Sha1::new())),
            "sha256" => Ok(Hasher::Sha256(Sha256::new())),
            "sha512" => Ok(Hasher::Sha512(Sha512::new())),
            "md5" => Ok(Hasher::Md5(Md5::new())),
            "murmur2" => Ok(Hasher::Murmur2(Murmur2Cf::new())),
            "length-bytes" => Ok(Hasher::LengthBytes(0)),
            _ => Err(Error::Unsupported(format!("hash format '{}'", name))),
        }
    }

    pub fn hash_bytes(&self, name: &str, data: &[u8]) -> Result<HashDigest> {
        let mut hasher = self.get_hasher(name)?;
        hasher.update(data);
        Ok(hasher.finalize())
    }

    /// Hash a file by streaming it through the engine
    pub fn hash_file<P: AsRef<Path>>(
        &self,
        name: &str,
        path: P,
        progress: Option<ProgressCallback>,
    ) -> Result<HashDigest> {
        let path = path.as_ref();
        let mut hasher = self.get_hasher(name)?;

        let file_size = fs::metadata(path)?.len();
        let mut file = File::open(path)?;
        let mut buffer = vec![0; 8192];
        let mut bytes_processed: u64 = 0;

        loop {
            let bytes_read = file.read(&mut buffer)?;
            if bytes_read == 0 {
                break;
            }
            hasher.update(&buffer[..bytes_read]);
            bytes_processed += bytes_read as u64;

            if let Some(ref cb) = progress {
                cb("Hashing...", bytes_processed, file_size);
            }
        }

        Ok(hasher.finalize())
    }

    /// Check bytes against an expected digest (hex compared case-insensitively)
    pub fn verify_bytes(&self, data: &[u8], format: &str, expected: &str) -> Result<()> {
        if expected.is_empty() {
            return Err(Error::IntegrityViolation("Empty checksum".to_string()));
        }
        let computed = self.hash_bytes(format, data)?;
        check_digest(&computed, expected)
    }

    pub fn verify_file<P: AsRef<Path>>(
        &self,
        path: P,
        format: &str,
        expected: &str,
        progress: Option<ProgressCallback>,
    ) -> Result<()> {
        if expected.is_empty() {
            return Err(Error::IntegrityViolation("Empty checksum".to_string()));
        }
        let computed = self.hash_file(format, path, progress)?;
        check_digest(&computed, expected)
    }
}

fn check_digest(computed: &HashDigest, expected: &str) -> Result<()> {
    if computed.value.eq_ignore_ascii_case(expected) {
        Ok(())
    } else {
        Err(Error::IntegrityViolation(format!(
            "Checksum mismatch!\nExpected ({}): {}\nComputed: {}",
            computed.format, expected, computed.value
        )))
    }
}
