//! Gitignore-style filtering for the index refresh
//!
//! Rules come from a fixed default list plus the pack's `.packwizignore`.
//! Later rules win, `!` re-includes, a leading `/` anchors a pattern to the
//! pack root, a trailing `/` restricts it to directories, and a pattern
//! without any `/` matches a single path component at any depth.

use crate::Result;
use glob::{MatchOptions, Pattern};
use std::fs;
use std::path::Path;
use tracing::warn;

/// Name of the per-pack ignore file
pub const IGNORE_FILE_NAME: &str = ".packwizignore";

const DEFAULT_RULES: [&str; 8] = [
    ".git/**",
    ".gitattributes",
    ".gitignore",
    ".DS_Store",
    "/*.zip",
    "*.mrpack",
    "packwiz.exe",
    "packwiz",
];

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

#[derive(Debug, Clone)]
struct Rule {
    pattern: Pattern,
    negated: bool,
    dir_only: bool,
    anchored: bool,
    /// `dir/**`: only paths strictly below a matching directory
    contents_only: bool,
}

impl Rule {
    fn parse(line: &str) -> Option<std::result::Result<Rule, glob::PatternError>> {
        let line = line.trim_end();
        if line.is_empty() || line.starts_with('#') {
            return None;
        }

        let (negated, mut body) = match line.strip_prefix('!') {
            Some(rest) => (true, rest),
            None => (false, line),
        };

        let mut contents_only = false;
        if let Some(prefix) = body.strip_suffix("/**") {
            contents_only = true;
            body = prefix;
        }
        let dir_only = body.ends_with('/');
        let body = body.trim_end_matches('/');
        let anchored = body.starts_with('/') || body.contains('/') || contents_only;
        let body = body.trim_start_matches('/');
        if body.is_empty() {
            return None;
        }

        Some(Pattern::new(body).map(|pattern| Rule {
            pattern,
            negated,
            dir_only,
            anchored,
            contents_only,
        }))
    }

    /// Does this rule match `components` (a relative path) or any of its ancestors?
    fn matches(&self, components: &[&str], is_dir: bool) -> bool {
        let last = components.len().saturating_sub(1);
        (0..components.len()).any(|i| {
            let ancestor = i < last;
            if self.contents_only && !ancestor {
                return false;
            }
            if self.dir_only && !ancestor && !is_dir {
                return false;
            }
            if self.anchored {
                let prefix = components[..=i].join("/");
                self.pattern.matches_with(&prefix, MATCH_OPTIONS)
            } else {
                self.pattern.matches_with(components[i], MATCH_OPTIONS)
            }
        })
    }
}

/// Ordered set of ignore rules
#[derive(Debug, Clone)]
pub struct IgnoreRules {
    rules: Vec<Rule>,
}

impl IgnoreRules {
    /// The built-in rules with nothing from the pack
    pub fn defaults() -> Self {
        Self::from_lines(std::iter::empty())
    }

    /// Built-in rules followed by `lines`; unparseable patterns are skipped
    pub fn from_lines<'a, I: IntoIterator<Item = &'a str>>(lines: I) -> Self {
        let mut rules = Vec::new();
        for line in DEFAULT_RULES.iter().copied().chain(lines) {
            match Rule::parse(line) {
                Some(Ok(rule)) => rules.push(rule),
                Some(Err(e)) => warn!("Ignoring invalid ignore pattern '{}': {}", line, e),
                None => {}
            }
        }
        Self { rules }
    }

    /// Load the pack's ignore file, falling back to the defaults when absent
    pub fn load<P: AsRef<Path>>(pack_root: P) -> Result<Self> {
        let path = pack_root.as_ref().join(IGNORE_FILE_NAME);
        if !path.exists() {
            return Ok(Self::defaults());
        }
        let content = fs::read_to_string(&path)?;
        Ok(Self::from_lines(content.lines()))
    }

    /// Check a forward-slash path relative to the pack root
    pub fn is_ignored(&self, rel_path: &str, is_dir: bool) -> bool {
        let components: Vec<&str> = rel_path
            .split('/')
            .filter(|c| !c.is_empty() && *c != ".")
            .collect();
        if components.is_empty() {
            return false;
        }

        let mut ignored = false;
        for rule in &self.rules {
            if rule.matches(&components, is_dir) {
                ignored = !rule.negated;
            }
        }
        ignored
    }
}

impl Default for IgnoreRules {
    fn default() -> Self {
        Self::defaults()
    }
}
