use anyhow::{anyhow, bail, Result};
use packsmith::sources::curseforge::{self, CurseForgeClient, ProjectRef};
use packsmith::sources::github::{self, GitHubClient, DEFAULT_ASSET_REGEX};
use packsmith::sources::modrinth::ModrinthClient;
use packsmith::sources::ReleaseClient;
use packsmith::sources::CandidateFile;
use packsmith::{select_best_file, Config, SelectionContext, SourceClient};
use std::env;

use super::{install_dependencies, LoadedPack};

pub enum Source {
    Modrinth {
        project: String,
    },
    CurseForge {
        project: String,
    },
    GitHub {
        repo: String,
        branch: Option<String>,
        regex: Option<String>,
    },
}

pub fn run(source: Source, no_deps: bool) -> Result<()> {
    let current_dir = env::current_dir()?;
    let config = Config::load()?;

    println!("Loading modpack...");
    let mut loaded = LoadedPack::open(&current_dir)?;

    let added = match source {
        Source::Modrinth { project } => {
            let client = ModrinthClient::new(config.sources.modrinth_url.clone())?;
            add_project(&mut loaded, &client, &config, &project, None, no_deps)?
        }
        Source::CurseForge { project } => {
            let client = CurseForgeClient::new(
                config.sources.curseforge_url.clone(),
                config.sources.curseforge_api_key.clone(),
            )?;
            let (handle, requested) = match curseforge::parse_project_ref(&project)? {
                ProjectRef::Id(id) => (id.to_string(), None),
                ProjectRef::Slug { slug, file_id } => {
                    println!("Looking up {} on CurseForge...", slug);
                    let id = client.project_id_for_slug(&slug)?;
                    let file = file_id.map(|file_id| client.file(id, file_id)).transpose()?;
                    (id.to_string(), file)
                }
            };
            add_project(&mut loaded, &client, &config, &handle, requested, no_deps)?
        }
        Source::GitHub {
            repo,
            branch,
            regex,
        } => {
            let client =
                GitHubClient::new(config.sources.github_url.clone(), config.sources.github_token.clone())?;
            add_release(&mut loaded, &client, &config, &repo, branch, regex)?
        }
    };

    if !added {
        return Ok(());
    }

    loaded.refresh(None)?;
    loaded.save()?;
    Ok(())
}

fn add_project(
    loaded: &mut LoadedPack,
    client: &dyn SourceClient,
    config: &Config,
    handle: &str,
    requested: Option<CandidateFile>,
    no_deps: bool,
) -> Result<bool> {
    let ecosystem = client.ecosystem();
    let installed = ecosystem.installed_handles(&loaded.pack);
    if installed.contains(handle) {
        println!("✓ {} is already in the pack", handle);
        return Ok(false);
    }

    let ctx = SelectionContext::from_pack(&loaded.pack)?;
    println!("Fetching {} from {}...", handle, ecosystem);
    let project = client
        .projects(&[handle.to_string()], &ctx)?
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("No {} project matches '{}'", ecosystem, handle))?;

    if installed.contains(&project.id) {
        println!("✓ {} is already in the pack", project.name);
        return Ok(false);
    }

    let file = match &requested {
        Some(file) => file,
        None => {
            if let Some(reason) = &project.listing_error {
                bail!("Failed to list the files of {}: {}", project.name, reason);
            }
            select_best_file(ecosystem, &project.files, &ctx, &project.name).ok_or_else(|| {
                anyhow!(
                    "{} is not available for the configured Minecraft version(s) or loader.\n\
                     Use 'packsmith acceptable-versions add <version>' to accept more versions.",
                    project.name
                )
            })?
        }
    };
    let record = ecosystem.new_record(&project, file, &ctx, &config.index.meta_folder)?;

    let dependencies = if no_deps {
        Vec::new()
    } else {
        install_dependencies(loaded, client, config, &project, file)?
    };

    println!("✓ Added {} ({})", record.name, record.filename);
    for dep in &dependencies {
        println!("  + {} (dependency)", dep);
    }
    loaded.pack.write_record(&mut loaded.index, record)?;
    Ok(true)
}

fn add_release(
    loaded: &mut LoadedPack,
    client: &dyn ReleaseClient,
    config: &Config,
    repo: &str,
    branch: Option<String>,
    regex: Option<String>,
) -> Result<bool> {
    let slug = github::parse_slug(repo)?;
    let already = loaded
        .pack
        .records()
        .any(|r| r.github().is_some_and(|g| g.slug.eq_ignore_ascii_case(&slug)));
    if already {
        println!("✓ {} is already in the pack", slug);
        return Ok(false);
    }

    println!("Fetching latest release of {}...", slug);
    let release = client.latest_release(&slug, branch.as_deref())?;
    let pattern = regex.as_deref().unwrap_or(DEFAULT_ASSET_REGEX);
    let record = github::new_record(
        &slug,
        &release,
        branch.as_deref(),
        pattern,
        &config.index.meta_folder,
    )?;

    if loaded.pack.record(&record.slug).is_some() {
        bail!(
            "A mod named '{}' already exists; remove it first with 'packsmith remove {}'",
            record.slug,
            record.slug
        );
    }

    println!("✓ Added {} from release {}", record.filename, release.tag);
    loaded.pack.write_record(&mut loaded.index, record)?;
    Ok(true)
}
