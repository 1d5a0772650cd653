use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use tracing_subscriber::EnvFilter;

mod commands;

/// Packsmith - A declarative modpack manager
#[derive(Parser)]
#[command(name = "packsmith")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new modpack in the current directory
    Init {
        /// Modpack name (defaults to the directory name)
        #[arg(long)]
        name: Option<String>,

        /// Modpack author
        #[arg(long)]
        author: Option<String>,

        /// Modpack version
        #[arg(long)]
        version: Option<String>,

        /// Minecraft version (e.g., 1.20.1)
        #[arg(long)]
        mc_version: String,

        /// Mod loader (fabric, quilt, forge, neoforge or none)
        #[arg(long)]
        modloader: Option<String>,

        /// Mod loader version
        #[arg(long)]
        loader_version: Option<String>,

        /// Overwrite an existing pack.toml
        #[arg(long)]
        reinit: bool,
    },

    /// Add a mod from Modrinth, CurseForge or GitHub
    Add {
        #[command(subcommand)]
        source: AddSource,

        /// Don't install required dependencies
        #[arg(long, global = true)]
        no_deps: bool,
    },

    /// Rebuild the index from the files on disk
    Refresh,

    /// Update one mod, or all of them with --all
    Update {
        /// Mod to update (name of its .pw.toml file)
        name: Option<String>,

        /// Update every mod in the pack
        #[arg(short, long, conflicts_with = "name")]
        all: bool,
    },

    /// Pin a mod so updates skip it
    Pin {
        /// Mod name
        name: String,
    },

    /// Unpin a mod
    Unpin {
        /// Mod name
        name: String,
    },

    /// Remove a mod from the pack
    Remove {
        /// Mod name
        name: String,
    },

    /// Re-download every file and record it with another hash format
    Rehash {
        /// Hash format (sha1, sha256 or sha512)
        format: String,
    },

    /// List the mods in the pack
    List {
        /// Only show mods for this side (client, server or both)
        #[arg(short, long)]
        side: Option<String>,

        /// Show file names
        #[arg(short = 'v', long = "files")]
        files: bool,
    },

    /// Manage the extra Minecraft versions mods may target
    AcceptableVersions {
        #[command(subcommand)]
        action: Option<VersionsAction>,
    },

    /// Add a file by direct download link
    Url {
        #[command(subcommand)]
        action: UrlAction,
    },

    /// CurseForge utilities
    #[command(alias = "cf")]
    Curseforge {
        #[command(subcommand)]
        action: CurseforgeAction,
    },

    /// Move the pack to another game version
    Migrate {
        #[command(subcommand)]
        target: MigrateTarget,
    },

    /// Show or change the packsmith configuration
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },

    /// Generate shell completion scripts
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand)]
enum AddSource {
    /// Add a Modrinth project by id or slug
    #[command(alias = "mr")]
    Modrinth {
        /// Project id or slug
        project: String,
    },

    /// Add a CurseForge project by id, slug or URL
    #[command(alias = "cf", alias = "curse")]
    Curseforge {
        /// Project id, slug or curseforge.com URL (a file URL pins that file)
        project: String,
    },

    /// Add the latest release asset of a GitHub repository
    #[command(alias = "gh")]
    Github {
        /// owner/repo or repository URL
        repo: String,

        /// Only consider releases built from this branch
        #[arg(long)]
        branch: Option<String>,

        /// Regular expression selecting the release asset
        #[arg(long)]
        regex: Option<String>,
    },
}

#[derive(Subcommand)]
enum VersionsAction {
    /// Show the acceptable versions
    List,

    /// Replace the acceptable versions
    Set {
        /// Versions, e.g. 1.20 1.20.1
        #[arg(required = true)]
        versions: Vec<String>,
    },

    /// Accept another version
    Add {
        /// Version to add
        version: String,
    },

    /// Stop accepting a version
    Remove {
        /// Version to remove
        version: String,
    },
}

#[derive(Subcommand)]
enum UrlAction {
    /// Download a file and record it with its hash
    Add {
        /// Display name of the mod
        name: String,

        /// Direct download URL
        url: String,

        /// Add the file even when its host has a dedicated source
        #[arg(long)]
        force: bool,

        /// Descriptor name (defaults to the slugified mod name)
        #[arg(long)]
        meta_name: Option<String>,
    },
}

#[derive(Subcommand)]
enum CurseforgeAction {
    /// Replace unmanaged jars with descriptors by matching their fingerprints
    Detect,
}

#[derive(Subcommand)]
enum MigrateTarget {
    /// Change the Minecraft version
    Minecraft {
        /// New Minecraft version
        version: String,

        /// Update every mod afterwards
        #[arg(long)]
        update: bool,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show the current configuration
    Show,

    /// Set a configuration value (an empty value clears a token)
    Set {
        /// Key, e.g. sources.curseforge_api_key
        key: String,

        /// Value
        value: String,
    },
}

fn init_logging() {
    let filter = EnvFilter::try_from_env("PACKSMITH_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging();

    let result = match cli.command {
        Commands::Init {
            name,
            author,
            version,
            mc_version,
            modloader,
            loader_version,
            reinit,
        } => commands::init::run(
            name,
            author,
            version,
            mc_version,
            modloader,
            loader_version,
            reinit,
        ),
        Commands::Add { source, no_deps } => {
            let source = match source {
                AddSource::Modrinth { project } => commands::add::Source::Modrinth { project },
                AddSource::Curseforge { project } => commands::add::Source::CurseForge { project },
                AddSource::Github {
                    repo,
                    branch,
                    regex,
                } => commands::add::Source::GitHub {
                    repo,
                    branch,
                    regex,
                },
            };
            commands::add::run(source, no_deps)
        }
        Commands::Refresh => commands::refresh::run(),
        Commands::Update { name, all } => commands::update::run(name, all),
        Commands::Pin { name } => commands::pin::run(name, true),
        Commands::Unpin { name } => commands::pin::run(name, false),
        Commands::Remove { name } => commands::remove::run(name),
        Commands::Rehash { format } => commands::rehash::run(format),
        Commands::List { side, files } => commands::list::run(side, files),
        Commands::AcceptableVersions { action } => {
            let action = match action {
                None | Some(VersionsAction::List) => commands::acceptable_versions::Action::List,
                Some(VersionsAction::Set { versions }) => {
                    commands::acceptable_versions::Action::Set(versions)
                }
                Some(VersionsAction::Add { version }) => {
                    commands::acceptable_versions::Action::Add(version)
                }
                Some(VersionsAction::Remove { version }) => {
                    commands::acceptable_versions::Action::Remove(version)
                }
            };
            commands::acceptable_versions::run(action)
        }
        Commands::Url {
            action:
                UrlAction::Add {
                    name,
                    url,
                    force,
                    meta_name,
                },
        } => commands::url::add(name, url, force, meta_name),
        Commands::Curseforge {
            action: CurseforgeAction::Detect,
        } => commands::detect::run(),
        Commands::Migrate {
            target: MigrateTarget::Minecraft { version, update },
        } => commands::migrate::minecraft(version, update),
        Commands::Config { action } => {
            let action = match action {
                None | Some(ConfigAction::Show) => commands::config::Action::Show,
                Some(ConfigAction::Set { key, value }) => {
                    commands::config::Action::Set { key, value }
                }
            };
            commands::config::run(action)
        }
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "packsmith", &mut std::io::stdout());
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
