//! Best-file selection
//!
//! Given every file a project offers, pick the one that suits the pack best.
//! Candidates that support none of the pack's game versions, or only loaders
//! the pack cannot run, are dropped first. The rest are ranked by the first
//! key that differs:
//!
//! 1. the most preferred supported game version,
//! 2. the most preferred loader ([`LOADER_PREFERENCE`]),
//! 3. a per-ecosystem tie-break: the higher file id on CurseForge and the
//!    newer publish date on Modrinth.
//!
//! Modrinth projects sometimes publish out of version order, so the Modrinth
//! ranking is also run with a leading version-number comparison; the date
//! winner is returned and a disagreement is logged.

use crate::sources::{CandidateFile, Ecosystem, SelectionContext};
use crate::version::{compare_versions, highest_slice_index};
use std::cmp::Ordering;
use tracing::warn;

/// Loaders in order of preference, most preferred first
pub const LOADER_PREFERENCE: [&str; 21] = [
    "quilt",
    "fabric",
    "neoforge",
    "forge",
    "liteloader",
    "modloader",
    "rift",
    "sponge",
    "purpur",
    "paper",
    "spigot",
    "bukkit",
    "velocity",
    "waterfall",
    "bungeecord",
    "canvas",
    "iris",
    "optifine",
    "vanilla",
    "datapack",
    "minecraft",
];

/// A key loader and the loaders that also run its content
const LOADER_COMPAT_GROUPS: [(&str, &[&str]); 4] = [
    ("fabric", &["quilt"]),
    ("forge", &["neoforge"]),
    ("bukkit", &["purpur", "paper", "spigot"]),
    ("bungeecord", &["waterfall"]),
];

/// Shader and resource pack "loaders", accepted whatever the pack runs
pub const NON_MOD_LOADERS: [&str; 5] = ["canvas", "iris", "optifine", "vanilla", "minecraft"];

/// Does the file support at least one of the pack's game versions and loaders?
pub fn is_acceptable(file: &CandidateFile, ctx: &SelectionContext) -> bool {
    if highest_slice_index(&ctx.game_versions, &file.game_versions).is_none() {
        return false;
    }
    if ctx.loaders.is_empty() || file.loaders.is_empty() {
        return true;
    }
    file.loaders
        .iter()
        .any(|l| ctx.loaders.contains(l) || NON_MOD_LOADERS.contains(&l.as_str()))
}

fn loader_rank(loaders: &[String], ignored: &[&str]) -> Option<usize> {
    loaders
        .iter()
        .filter(|l| !ignored.contains(&l.as_str()))
        .filter_map(|l| LOADER_PREFERENCE.iter().position(|p| p == l))
        .min()
}

/// Compare the loader lists of the current best and a candidate
///
/// `Greater` means the candidate's loaders are preferred. A list with no
/// ranked loader is neutral against anything.
pub fn compare_loader_lists(current: &[String], candidate: &[String]) -> Ordering {
    let mut ignored: Vec<&str> = Vec::new();
    for (key, group) in LOADER_COMPAT_GROUPS {
        if current.iter().any(|l| l == key) && candidate.iter().any(|l| l == key) {
            ignored.extend_from_slice(group);
        }
    }

    match (loader_rank(current, &ignored), loader_rank(candidate, &ignored)) {
        // Lower index is more preferred
        (Some(a), Some(b)) => a.cmp(&b),
        _ => Ordering::Equal,
    }
}

fn tie_break(ecosystem: Ecosystem, current: &CandidateFile, candidate: &CandidateFile) -> Ordering {
    match ecosystem {
        Ecosystem::CurseForge => {
            let a = current.id.parse::<u64>().unwrap_or(0);
            let b = candidate.id.parse::<u64>().unwrap_or(0);
            b.cmp(&a)
        }
        Ecosystem::Modrinth => match (current.published, candidate.published) {
            (Some(a), Some(b)) => b.cmp(&a),
            _ => Ordering::Equal,
        },
    }
}

fn find_latest<'a>(
    ecosystem: Ecosystem,
    files: &[&'a CandidateFile],
    ctx: &SelectionContext,
    use_version_number: bool,
) -> Option<&'a CandidateFile> {
    let (first, rest) = files.split_first()?;
    let mut best = *first;
    let mut best_game_version = highest_slice_index(&ctx.game_versions, &best.game_versions);

    for &candidate in rest {
        let game_version = highest_slice_index(&ctx.game_versions, &candidate.game_versions);

        let mut ordering = Ordering::Equal;
        if use_version_number {
            ordering = compare_versions(&candidate.version_number, &best.version_number);
        }
        if ordering == Ordering::Equal {
            ordering = game_version.cmp(&best_game_version);
        }
        if ordering == Ordering::Equal {
            ordering = compare_loader_lists(&best.loaders, &candidate.loaders);
        }
        if ordering == Ordering::Equal {
            ordering = tie_break(ecosystem, best, candidate);
        }

        if ordering == Ordering::Greater {
            best = candidate;
            best_game_version = game_version;
        }
    }
    Some(best)
}

/// Pick the best file for the pack, or `None` when nothing is acceptable
pub fn select_best_file<'a>(
    ecosystem: Ecosystem,
    files: &'a [CandidateFile],
    ctx: &SelectionContext,
    project_name: &str,
) -> Option<&'a CandidateFile> {
    let acceptable: Vec<&CandidateFile> = files.iter().filter(|f| is_acceptable(f, ctx)).collect();

    match ecosystem {
        Ecosystem::CurseForge => find_latest(ecosystem, &acceptable, ctx, false),
        Ecosystem::Modrinth => {
            let by_version = find_latest(ecosystem, &acceptable, ctx, true)?;
            let by_date = find_latest(ecosystem, &acceptable, ctx, false)?;
            if by_version.id != by_date.id {
                warn!(
                    "Modrinth versions for {} inconsistent between latest version number and newest release date ({} vs {})",
                    project_name, by_version.version_number, by_date.version_number
                );
            }
            Some(by_date)
        }
    }
}
