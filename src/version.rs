//! Version ordering for identifiers that are not valid semver
//!
//! Game and mod versions come in every shape ("1.20.1", "23w13a",
//! "0.5.0-beta.2+mc1.20", "1.19.4-pre1"), so ordering uses FlexVer rather than
//! the `semver` crate: a version is split into runs of digits and non-digits,
//! numeric runs compare as numbers, text runs compare codepoint-wise, a run
//! starting with `-` is a pre-release, and anything after `+` is ignored.
//!
//! # Examples
//!
//! ```
//! use packsmith::version::{compare_versions, sort_and_dedupe};
//! use std::cmp::Ordering;
//!
//! assert_eq!(compare_versions("1.19.2", "1.20.1"), Ordering::Less);
//! assert_eq!(compare_versions("1.20", "1.20-rc1"), Ordering::Greater);
//!
//! let mut versions = vec!["1.20.1".to_string(), "1.18".to_string(), "1.20.1".to_string()];
//! sort_and_dedupe(&mut versions);
//! assert_eq!(versions, vec!["1.18", "1.20.1"]);
//! ```

use std::cmp::Ordering;

#[derive(Debug, PartialEq, Eq)]
enum Component<'a> {
    Numeric(&'a str),
    Lexical(&'a str),
    PreRelease(&'a str),
}

fn decompose(version: &str) -> Vec<Component<'_>> {
    // Build metadata never takes part in ordering
    let version = match version.find('+') {
        Some(idx) => &version[..idx],
        None => version,
    };

    let mut components = Vec::new();
    let mut start = 0;
    let mut last_was_digit = None;

    for (idx, ch) in version.char_indices() {
        let is_digit = ch.is_ascii_digit();
        let run = &version[start..idx];
        let boundary = match last_was_digit {
            None => false,
            Some(prev) => prev != is_digit || (ch == '-' && !run.starts_with('-')),
        };
        if boundary && !run.is_empty() {
            components.push(classify(run));
            start = idx;
        }
        last_was_digit = Some(is_digit);
    }

    if start < version.len() {
        components.push(classify(&version[start..]));
    }
    components
}

fn classify(run: &str) -> Component<'_> {
    if run.len() > 1 && run.starts_with('-') {
        Component::PreRelease(run)
    } else if run.starts_with(|c: char| c.is_ascii_digit()) {
        Component::Numeric(run)
    } else {
        Component::Lexical(run)
    }
}

fn compare_lexical(a: &str, b: &str) -> Ordering {
    a.chars().cmp(b.chars())
}

fn compare_numeric(a: &str, b: &str) -> Ordering {
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

fn compare_components(a: Option<&Component<'_>>, b: Option<&Component<'_>>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        // A pre-release sorts below the absence of a run, anything else above it
        (Some(Component::PreRelease(_)), None) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (None, Some(other)) => compare_components(Some(other), None).reverse(),
        (Some(Component::Numeric(x)), Some(Component::Numeric(y))) => compare_numeric(x, y),
        (Some(x), Some(y)) => compare_lexical(component_text(x), component_text(y)),
    }
}

fn component_text<'a>(component: &Component<'a>) -> &'a str {
    match component {
        Component::Numeric(s) | Component::Lexical(s) | Component::PreRelease(s) => s,
    }
}

/// Compare two version strings with FlexVer ordering
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let left = decompose(a);
    let right = decompose(b);

    for i in 0..left.len().max(right.len()) {
        let ordering = compare_components(left.get(i), right.get(i));
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

/// `a < b` in FlexVer order
pub fn version_less(a: &str, b: &str) -> bool {
    compare_versions(a, b) == Ordering::Less
}

/// Sort ascending by FlexVer and drop exact duplicates
pub fn sort_and_dedupe(versions: &mut Vec<String>) {
    versions.sort_by(|a, b| compare_versions(a, b));
    versions.dedup();
}

/// Highest index in `haystack` of any value in `needles`
///
/// Used to rank candidates by how preferred their best supported game
/// version is; `None` means no overlap at all.
pub fn highest_slice_index<S: AsRef<str>, T: AsRef<str>>(
    haystack: &[S],
    needles: &[T],
) -> Option<usize> {
    needles
        .iter()
        .filter_map(|n| haystack.iter().position(|h| h.as_ref() == n.as_ref()))
        .max()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_order(a: &str, b: &str, expected: Ordering) {
        assert_eq!(compare_versions(a, b), expected, "{} vs {}", a, b);
        assert_eq!(compare_versions(b, a), expected.reverse(), "{} vs {}", b, a);
    }

    #[test]
    fn test_numeric_runs() {
        assert_order("1.19.2", "1.20.1", Ordering::Less);
        assert_order("1.9", "1.10", Ordering::Less);
        assert_order("1.0.0", "1.0.0", Ordering::Equal);
        assert_order("1.01", "1.1", Ordering::Equal);
    }

    #[test]
    fn test_missing_runs() {
        assert_order("1.20", "1.20.1", Ordering::Less);
        assert_order("1", "1.0", Ordering::Less);
    }

    #[test]
    fn test_pre_release() {
        assert_order("1.0.0-beta", "1.0.0", Ordering::Less);
        assert_order("1.19.4-pre1", "1.19.4", Ordering::Less);
        assert_order("1.0.0-alpha", "1.0.0-beta", Ordering::Less);
        // A bare hyphen is just text
        assert_order("1.0-", "1.0", Ordering::Greater);
    }

    #[test]
    fn test_build_metadata_ignored() {
        assert_order("1.0.0+build.1", "1.0.0+build.2", Ordering::Equal);
        assert_order("0.5.0+mc1.20", "0.5.1+mc1.19", Ordering::Less);
    }

    #[test]
    fn test_snapshots_are_lexical() {
        assert_order("23w13a", "23w14a", Ordering::Less);
        assert_order("1.20.1", "1.20.a", Ordering::Less);
    }

    #[test]
    fn test_sort_and_dedupe() {
        let mut versions = vec![
            "1.20.1".to_string(),
            "1.19.2".to_string(),
            "1.20.1".to_string(),
            "1.18".to_string(),
        ];
        sort_and_dedupe(&mut versions);
        assert_eq!(versions, vec!["1.18", "1.19.2", "1.20.1"]);
    }

    #[test]
    fn test_version_less_bounds() {
        assert!(version_less("1.19.1", "1.20.1"));
        assert!(version_less("1.20.1", "2.0.0"));
        assert!(!version_less("1.19.1", "1.19.1"));
    }

    #[test]
    fn test_highest_slice_index() {
        let supported = ["1.19.2", "1.20", "1.20.1"];
        assert_eq!(highest_slice_index(&supported, &["1.19.2", "1.20"]), Some(1));
        assert_eq!(highest_slice_index(&supported, &["1.20.1", "1.18"]), Some(2));
        assert_eq!(highest_slice_index(&supported, &["1.16.5"]), None);
        let empty: [&str; 0] = [];
        assert_eq!(highest_slice_index(&supported, &empty), None);
    }
}
