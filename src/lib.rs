//! packsmith - a declarative modpack manager
//!
//! A pack is a `pack.toml` manifest, an `index.toml` listing the hash of every
//! file the pack ships, and one `.pw.toml` descriptor per downloadable
//! artifact (mods, resource packs, shaders). packsmith keeps the three
//! consistent and talks to the source ecosystems the artifacts come from:
//!
//! - Content-addressed index with gitignore-style filtering
//! - Update checks and updates across Modrinth, CurseForge and GitHub releases
//! - Bounded dependency resolution with loader-aware file selection
//! - CurseForge's whitespace-insensitive Murmur2 fingerprint
//!
//! # Examples
//!
//! ```no_run
//! use packsmith::{HashRegistry, IgnoreRules, PackManifest, PACK_FILE_NAME};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut pack = PackManifest::load(".")?;
//! let mut index = pack.open_index(".")?;
//!
//! let rules = IgnoreRules::load(".")?;
//! let summary = index.refresh(&HashRegistry::new(), &rules, &[PACK_FILE_NAME], None)?;
//! pack.save_with_index(".", &index)?;
//!
//! println!("Indexed {} files", summary.indexed);
//! # Ok(())
//! # }
//! ```
//!
//! # Modules
//!
//! - [`hash`] - Hash engines, including CurseForge Murmur2
//! - [`index`] - The content index (`index.toml`)
//! - [`ignore`] - `.packwizignore` rules
//! - [`record`] - Per-artifact descriptors (`*.pw.toml`)
//! - [`manifest`] - The pack manifest (`pack.toml`)
//! - [`version`] - FlexVer version ordering
//! - [`selection`] - Best-file selection
//! - [`sources`] - Modrinth, CurseForge and GitHub clients
//! - [`updater`] - Update checking and application
//! - [`resolver`] - Dependency resolution
//! - [`download`] - Artifact downloads for re-hashing
//! - [`config`] - User configuration management
//! - [`error`] - Error types and result handling

pub mod config;
pub mod download;
pub mod error;
pub mod hash;
pub mod ignore;
pub mod index;
pub mod manifest;
pub mod record;
pub mod resolver;
pub mod selection;
pub mod sources;
pub mod updater;
pub mod version;

pub use config::Config;
pub use download::Downloader;
pub use error::{Error, Result};
pub use hash::{HashDigest, HashRegistry, Hasher, ProgressCallback};
pub use ignore::IgnoreRules;
pub use index::{ContentIndex, IndexEntry, IndexSlot, RefreshSummary, INDEX_FILE_NAME};
pub use manifest::{PackManifest, PACK_FILE_NAME};
pub use record::{Download, DownloadMode, ModOption, ModRecord, Side, UpdateSource};
pub use resolver::{DependencyResolver, ResolvedDependency, DEFAULT_MAX_CYCLES};
pub use selection::select_best_file;
pub use sources::{Ecosystem, SelectionContext, SourceClient};
pub use updater::{
    apply_update, CachedState, UpdateCheck, UpdateOutcome, UpdateReport, Updater, UpdaterRegistry,
};
pub use version::{compare_versions, sort_and_dedupe};
