//! Dependency resolution for newly added or updated files
//!
//! Resolution is a bounded breadth-first walk over one ecosystem's API. Each
//! cycle takes every pending dependency handle, drops the ones the pack
//! already has (or that an earlier cycle resolved), fetches the remaining
//! projects in a single batch, selects the best file of each and queues that
//! file's own required dependencies for the next cycle.
//!
//! The walk is not exhaustive: if the queue is still non-empty after
//! `max_cycles` cycles the graph is treated as too deep and resolution fails.
//!
//! # Examples
//!
//! ```no_run
//! use packsmith::sources::modrinth::ModrinthClient;
//! use packsmith::{DependencyResolver, PackManifest};
//! # use packsmith::sources::CandidateFile;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! # let root_file: CandidateFile = unimplemented!();
//! let mut pack = PackManifest::load(".")?;
//! let index = pack.open_index(".")?;
//! pack.load_records(&index)?;
//!
//! let client = ModrinthClient::new("https://api.modrinth.com")?;
//! let resolver = DependencyResolver::new(&client);
//! for dep in resolver.resolve("AANobbMI", &root_file, &pack)? {
//!     println!("needs {} ({})", dep.project.name, dep.file.filename);
//! }
//! # Ok(())
//! # }
//! ```

use crate::manifest::PackManifest;
use crate::selection::select_best_file;
use crate::sources::{
    CandidateFile, DependencyHandle, Ecosystem, SelectionContext, SourceClient, SourceProject,
};
use crate::{Error, Result};
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

/// Cycles walked before the graph is considered too deep
pub const DEFAULT_MAX_CYCLES: usize = 20;

/// A project pulled in as a dependency, with the file selected for the pack
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedDependency {
    pub project: SourceProject,
    pub file: CandidateFile,
}

pub struct DependencyResolver<'a> {
    client: &'a dyn SourceClient,
    max_cycles: usize,
}

/// Handles that need no further work
struct Known {
    installed: BTreeSet<String>,
    resolved: BTreeSet<String>,
}

impl Known {
    fn contains(&self, handle: &str) -> bool {
        self.installed.contains(handle) || self.resolved.contains(handle)
    }

    fn contains_project(&self, project: &SourceProject) -> bool {
        self.contains(&project.id) || (!project.slug.is_empty() && self.contains(&project.slug))
    }

    fn mark(&mut self, project: &SourceProject) {
        self.resolved.insert(project.id.clone());
        if !project.slug.is_empty() {
            self.resolved.insert(project.slug.clone());
        }
    }
}

impl<'a> DependencyResolver<'a> {
    pub fn new(client: &'a dyn SourceClient) -> Self {
        Self::with_max_cycles(client, DEFAULT_MAX_CYCLES)
    }

    pub fn with_max_cycles(client: &'a dyn SourceClient, max_cycles: usize) -> Self {
        Self { client, max_cycles }
    }

    /// Find every project `root_file` needs that the pack does not have yet
    ///
    /// # Arguments
    ///
    /// * `root_project_id` - Project the root file belongs to; never resolved again
    /// * `root_file` - The newly selected file whose required dependencies seed the walk
    /// * `pack` - Supplies the installed records, game versions and loaders
    ///
    /// # Errors
    ///
    /// * Any error from the first batch fetch (the root file's own dependencies)
    /// * [`Error::IntegrityViolation`] when the queue is still non-empty after
    ///   the cycle ceiling
    pub fn resolve(
        &self,
        root_project_id: &str,
        root_file: &CandidateFile,
        pack: &PackManifest,
    ) -> Result<Vec<ResolvedDependency>> {
        let ecosystem = self.client.ecosystem();
        let ctx = SelectionContext::from_pack(pack)?;
        let mc_version = pack.mc_version()?.to_string();
        let is_quilt = pack.compatible_loaders().iter().any(|l| l == "quilt");
        let map_override =
            |handle: &str| ecosystem.map_dependency_override(handle, is_quilt, &mc_version);

        let mut known = Known {
            installed: ecosystem.installed_handles(pack),
            resolved: BTreeSet::new(),
        };
        known.installed.insert(root_project_id.to_string());

        let mut queue = pending_handles(root_file, &map_override);
        let mut resolved = Vec::new();
        let mut cycles = 0;

        if !queue.is_empty() {
            info!("Finding dependencies of {}...", root_file.filename);
        }

        while !queue.is_empty() && cycles < self.max_cycles {
            let first_cycle = cycles == 0;
            cycles += 1;

            let mut project_ids = Vec::new();
            let mut version_ids = Vec::new();
            for handle in queue.drain(..) {
                match handle {
                    DependencyHandle::Project(id) => project_ids.push(id),
                    DependencyHandle::Version(id) => version_ids.push(id),
                }
            }

            if !version_ids.is_empty() {
                match self.client.version_owners(&version_ids) {
                    Ok(owners) => project_ids.extend(owners.iter().map(|id| map_override(id))),
                    Err(e) if first_cycle => return Err(e),
                    Err(e) => warn!("Failed to look up dependency versions: {}", e),
                }
            }

            project_ids.retain(|id| !known.contains(id));
            project_ids.sort();
            project_ids.dedup();
            if project_ids.is_empty() {
                continue;
            }
            debug!("Dependency cycle {}: fetching {:?}", cycles, project_ids);

            let projects = match self.client.projects(&project_ids, &ctx) {
                Ok(projects) => projects,
                Err(e) if first_cycle => return Err(e),
                Err(e) => {
                    warn!("Failed to fetch dependencies {:?}: {}", project_ids, e);
                    continue;
                }
            };

            for project in projects {
                if known.contains_project(&project) {
                    continue;
                }
                known.mark(&project);

                if let Some(reason) = &project.listing_error {
                    if first_cycle {
                        return Err(Error::ExternalFailure(format!(
                            "failed to list files of dependency {}: {}",
                            project.name, reason
                        )));
                    }
                    warn!("Failed to list files of dependency {}: {}", project.name, reason);
                    continue;
                }

                let Some(file) = select_best_file(ecosystem, &project.files, &ctx, &project.name)
                else {
                    warn!(
                        "Dependency {} has no file for the configured game versions and loaders; skipping",
                        project.name
                    );
                    continue;
                };

                queue.extend(pending_handles(file, &map_override));
                let file = file.clone();
                resolved.push(ResolvedDependency { project, file });
            }
        }

        queue.retain(|handle| match handle {
            DependencyHandle::Project(id) => !known.contains(id),
            DependencyHandle::Version(_) => true,
        });
        if !queue.is_empty() {
            return Err(Error::IntegrityViolation(format!(
                "dependency graph too deep: still {} unresolved after {} cycles.\n\
                    Raise [resolver] max_cycles in ~/.packsmith/config.toml to walk further.",
                queue.len(),
                self.max_cycles
            )));
        }

        Ok(resolved)
    }

    pub fn ecosystem(&self) -> Ecosystem {
        self.client.ecosystem()
    }
}

fn pending_handles(
    file: &CandidateFile,
    map_override: &dyn Fn(&str) -> String,
) -> Vec<DependencyHandle> {
    file.required_dependencies()
        .map(|handle| match handle {
            DependencyHandle::Project(id) => DependencyHandle::Project(map_override(id)),
            DependencyHandle::Version(id) => DependencyHandle::Version(id.clone()),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::FileDependency;
    use std::collections::BTreeMap;

    fn file(deps: Vec<FileDependency>) -> CandidateFile {
        CandidateFile {
            id: "f".into(),
            version_number: "1".into(),
            filename: "root.jar".into(),
            url: None,
            hashes: BTreeMap::new(),
            game_versions: vec![],
            loaders: vec![],
            published: None,
            primary: true,
            dependencies: deps,
        }
    }

    #[test]
    fn test_pending_handles_applies_override() {
        let root = file(vec![
            FileDependency::required_project("P7dR8mSH"),
            FileDependency::required_version("abc"),
            FileDependency {
                kind: crate::sources::DependencyKind::Optional,
                handle: DependencyHandle::Project("optional".into()),
            },
        ]);
        let map = |h: &str| Ecosystem::Modrinth.map_dependency_override(h, true, "1.20.1");
        assert_eq!(
            pending_handles(&root, &map),
            vec![
                DependencyHandle::Project("qvIfYCYJ".into()),
                DependencyHandle::Version("abc".into()),
            ]
        );
    }
}
