//! `.gitignore` / `info/exclude` matching.
//!
//! Within one source, the last matching rule wins; a later source
//! (the worktree `.gitignore`) outranks an earlier one (`info/exclude`).
//! Supported syntax: blank lines and `#` comments, `!` negation,
//! trailing `/` directory-only rules, leading `/` anchoring, and
//! fnmatch-style wildcards via the `glob` crate.

use glob::{MatchOptions, Pattern};

use grit_store::Backend as _;
use crate::repo::Repository;

#[derive(Debug)]
struct Rule {
    pattern: Pattern,
    negated: bool,
    dir_only: bool,
    /// Anchored rules match the whole path; unanchored match any suffix
    /// component.
    anchored: bool,
}

/// An ordered ignore rule set.
#[derive(Debug, Default)]
pub struct IgnoreRules {
    rules: Vec<Rule>,
}

impl IgnoreRules {
    /// Parse rule sources in ascending precedence order.
    #[must_use]
    pub fn parse(sources: &[&[u8]]) -> Self {
        let mut rules = Vec::new();
        for source in sources {
            for line in String::from_utf8_lossy(source).lines() {
                let line = line.trim_end();
                if line.is_empty() || line.starts_with('#') {
                    continue;
                }
                let (negated, line) = match line.strip_prefix('!') {
                    Some(rest) => (true, rest),
                    None => (false, line),
                };
                let (dir_only, line) = match line.strip_suffix('/') {
                    Some(rest) => (true, rest),
                    None => (false, line),
                };
                // A slash anywhere but the end anchors the pattern.
                let anchored = line.contains('/');
                let line = line.strip_prefix('/').unwrap_or(line);
                if let Ok(pattern) = Pattern::new(line) {
                    rules.push(Rule {
                        pattern,
                        negated,
                        dir_only,
                        anchored,
                    });
                }
            }
        }
        Self { rules }
    }

    /// Load the repository's rules: `info/exclude` then the root
    /// `.gitignore` (higher precedence).
    #[must_use]
    pub fn load(repo: &Repository) -> Self {
        let mut sources: Vec<Vec<u8>> = Vec::new();
        if let Ok(Some(exclude)) = repo.backend().read_state_file("info/exclude") {
            sources.push(exclude);
        }
        if repo.has_workdir() {
            if let Ok(Some(gitignore)) = repo.backend().read_workdir_file(".gitignore") {
                sources.push(gitignore);
            }
        }
        let refs: Vec<&[u8]> = sources.iter().map(Vec::as_slice).collect();
        Self::parse(&refs)
    }

    /// Whether `path` is ignored. `is_dir` enables directory-only rules.
    #[must_use]
    pub fn is_ignored(&self, path: &str, is_dir: bool) -> bool {
        let options = MatchOptions {
            require_literal_separator: true,
            ..MatchOptions::new()
        };
        let mut ignored = false;
        for rule in &self.rules {
            if rule.dir_only && !is_dir {
                // A dir-only rule still covers files under a matching
                // directory.
                if !self.under_matching_dir(rule, path) {
                    continue;
                }
                ignored = !rule.negated;
                continue;
            }
            let matched = if rule.anchored {
                rule.pattern.matches_with(path, options)
            } else {
                // Unanchored: basename or any trailing component.
                let basename = path.rsplit('/').next().unwrap_or(path);
                rule.pattern.matches_with(basename, options)
                    || rule.pattern.matches_with(path, options)
            };
            if matched {
                ignored = !rule.negated;
            }
        }
        ignored
    }

    fn under_matching_dir(&self, rule: &Rule, path: &str) -> bool {
        let options = MatchOptions {
            require_literal_separator: true,
            ..MatchOptions::new()
        };
        let mut prefix = String::new();
        for component in path.split('/') {
            if !prefix.is_empty() {
                prefix.push('/');
            }
            prefix.push_str(component);
            if prefix == path {
                break; // The final component is the file itself.
            }
            let candidate = if rule.anchored {
                prefix.clone()
            } else {
                component.to_owned()
            };
            if rule.pattern.matches_with(&candidate, options) {
                return true;
            }
        }
        false
    }
}
