//! User configuration management
//!
//! Configuration is stored in TOML format at `~/.packsmith/config.toml`.
//! Pack-level settings live in `pack.toml` instead (see [`crate::PackManifest`]).
//!
//! # Examples
//!
//! ```no_run
//! use packsmith::Config;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load()?;
//!
//! println!("Modrinth API: {}", config.sources.modrinth_url);
//! println!("Resolver ceiling: {}", config.resolver.max_cycles);
//!
//! let mut stored = Config::load_file()?;
//! stored.set("index.meta_folder", "content")?;
//! stored.save()?;
//! # Ok(())
//! # }
//! ```

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// User configuration file (`~/.packsmith/config.toml`)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Remote source endpoints and credentials
    #[serde(default)]
    pub sources: SourcesConfig,

    /// Defaults for new packs and their index
    #[serde(default)]
    pub index: IndexConfig,

    /// Dependency resolver settings
    #[serde(default)]
    pub resolver: ResolverConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcesConfig {
    #[serde(default = "default_modrinth_url")]
    pub modrinth_url: String,

    #[serde(default = "default_curseforge_url")]
    pub curseforge_url: String,

    #[serde(default = "default_github_url")]
    pub github_url: String,

    /// CurseForge requires an API key for every request
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub curseforge_api_key: Option<String>,

    /// Optional token, raises the GitHub rate limit
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub github_token: Option<String>,
}

fn default_modrinth_url() -> String {
    "https://api.modrinth.com".to_string()
}

fn default_curseforge_url() -> String {
    "https://api.curseforge.com".to_string()
}

fn default_github_url() -> String {
    "https://api.github.com".to_string()
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            modrinth_url: default_modrinth_url(),
            curseforge_url: default_curseforge_url(),
            github_url: default_github_url(),
            curseforge_api_key: None,
            github_token: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Folder new descriptors are written to when a source gives no better hint
    #[serde(default = "default_meta_folder")]
    pub meta_folder: String,

    /// Hash format for newly created indexes
    #[serde(default = "default_hash_format")]
    pub hash_format: String,
}

fn default_meta_folder() -> String {
    "mods".to_string()
}

fn default_hash_format() -> String {
    "sha256".to_string()
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            meta_folder: default_meta_folder(),
            hash_format: default_hash_format(),
        }
    }
}

/// Dependency resolver settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Number of BFS cycles before resolution gives up (default: 20)
    #[serde(default = "default_max_cycles")]
    pub max_cycles: usize,
}

fn default_max_cycles() -> usize {
    crate::resolver::DEFAULT_MAX_CYCLES
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            max_cycles: default_max_cycles(),
        }
    }
}

impl Config {
    /// Get the default config file path
    ///
    /// Uses PACKSMITH_CONFIG_DIR if set, otherwise ~/.packsmith/config.toml
    pub fn default_path() -> Result<PathBuf> {
        // Check for custom config directory (useful for testing)
        if let Ok(config_dir) = std::env::var("PACKSMITH_CONFIG_DIR") {
            return Ok(PathBuf::from(config_dir).join("config.toml"));
        }

        let home = dirs::home_dir()
            .ok_or_else(|| Error::NotFound("Could not find home directory".to_string()))?;

        Ok(home.join(".packsmith").join("config.toml"))
    }

    /// Load config from file, or use defaults if it doesn't exist
    ///
    /// Environment variable overrides:
    /// - `CURSEFORGE_API_KEY`: Overrides `sources.curseforge_api_key`
    /// - `GITHUB_TOKEN`: Overrides `sources.github_token`
    /// - `PACKSMITH_CONFIG_DIR`: Overrides the config directory location
    pub fn load() -> Result<Self> {
        let mut config = Self::load_file()?;

        if let Ok(key) = std::env::var("CURSEFORGE_API_KEY") {
            if !key.is_empty() {
                config.sources.curseforge_api_key = Some(key);
            }
        }
        if let Ok(token) = std::env::var("GITHUB_TOKEN") {
            if !token.is_empty() {
                config.sources.github_token = Some(token);
            }
        }

        Ok(config)
    }

    /// Load the config file alone, without environment overrides
    pub fn load_file() -> Result<Self> {
        let path = Self::default_path()?;
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(&path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Keys accepted by [`Config::set`]
    pub const KEYS: [&'static str; 8] = [
        "sources.modrinth_url",
        "sources.curseforge_url",
        "sources.github_url",
        "sources.curseforge_api_key",
        "sources.github_token",
        "index.meta_folder",
        "index.hash_format",
        "resolver.max_cycles",
    ];

    /// Set one value by its dotted key; an empty value clears a credential
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let secret = |value: &str| Some(value.to_string()).filter(|v| !v.is_empty());
        match key {
            "sources.modrinth_url" => self.sources.modrinth_url = value.to_string(),
            "sources.curseforge_url" => self.sources.curseforge_url = value.to_string(),
            "sources.github_url" => self.sources.github_url = value.to_string(),
            "sources.curseforge_api_key" => self.sources.curseforge_api_key = secret(value),
            "sources.github_token" => self.sources.github_token = secret(value),
            "index.meta_folder" => self.index.meta_folder = value.to_string(),
            "index.hash_format" => self.index.hash_format = value.to_string(),
            "resolver.max_cycles" => {
                self.resolver.max_cycles = value.parse::<usize>().map_err(|_| {
                    Error::Malformed(format!("resolver.max_cycles must be a number, got '{}'", value))
                })?;
            }
            _ => {
                return Err(Error::NotFound(format!(
                    "unknown config key '{}' (available: {})",
                    key,
                    Self::KEYS.join(", ")
                )))
            }
        }
        Ok(())
    }

    /// Save config to file
    pub fn save(&self) -> Result<()> {
        let path = Self::default_path()?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        fs::write(&path, content)?;
        Ok(())
    }
}
