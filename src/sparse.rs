//! Sparse checkout patterns, glob and cone flavors.
//!
//! The pattern set lives in `info/sparse-checkout`, enabled by
//! `core.sparsecheckout`. In glob mode the file holds gitignore-style
//! include patterns (with `!` re-exclusion, last match wins); paths not
//! matched by any pattern stay out of the working tree. In cone mode
//! (`core.sparsecheckoutcone`) the listed directories are complete
//! subtrees and top-level files are always materialized.
//!
//! The checkout planner filters before emitting, so nothing outside the
//! pattern set ever reaches the working tree.

use glob::{MatchOptions, Pattern};

use grit_store::Backend as _;
use crate::errors::Result;
use crate::repo::Repository;

/// A parsed sparse-checkout specification.
#[derive(Debug)]
pub struct SparseSpec {
    cone: bool,
    /// Cone mode: directory prefixes. Glob mode: `(pattern, negated)`.
    dirs: Vec<String>,
    patterns: Vec<(Pattern, bool)>,
}

impl SparseSpec {
    /// Load the active spec, or `None` when sparse checkout is off.
    pub fn load(repo: &Repository) -> Result<Option<Self>> {
        let config = repo.config();
        if config.get_bool("core.sparsecheckout") != Some(true) {
            return Ok(None);
        }
        let Some(data) = repo.backend().read_state_file("info/sparse-checkout")? else {
            return Ok(None);
        };
        let cone = config.get_bool("core.sparsecheckoutcone") == Some(true);
        Ok(Some(Self::parse(&data, cone)))
    }

    /// Parse pattern file content.
    #[must_use]
    pub fn parse(data: &[u8], cone: bool) -> Self {
        let mut dirs = Vec::new();
        let mut patterns = Vec::new();
        for line in String::from_utf8_lossy(data).lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if cone {
                // Cone files contain `/dir/` (and bookkeeping `/*` and
                // `!/*/` lines, which reduce to the directory list).
                let trimmed = line
                    .trim_start_matches('!')
                    .trim_matches('/')
                    .trim_end_matches('*');
                if !trimmed.is_empty() {
                    let dir = trimmed.trim_end_matches('/').to_owned();
                    if !dirs.contains(&dir) {
                        dirs.push(dir);
                    }
                }
            } else {
                let (negated, rest) = match line.strip_prefix('!') {
                    Some(rest) => (true, rest),
                    None => (false, line),
                };
                let rest = rest.trim_start_matches('/').trim_end_matches('/');
                if let Ok(pattern) = Pattern::new(rest) {
                    patterns.push((pattern, negated));
                }
            }
        }
        Self {
            cone,
            dirs,
            patterns,
        }
    }

    /// Build a cone spec from directory names (the `sparse-checkout set`
    /// shape).
    #[must_use]
    pub fn cone_of(dirs: Vec<String>) -> Self {
        Self {
            cone: true,
            dirs,
            patterns: Vec::new(),
        }
    }

    /// Whether cone semantics are active.
    #[must_use]
    pub const fn is_cone(&self) -> bool {
        self.cone
    }

    /// Whether `path` belongs in the working tree.
    #[must_use]
    pub fn included(&self, path: &str) -> bool {
        if self.cone {
            // Top-level files always materialize in cone mode.
            if !path.contains('/') {
                return true;
            }
            return self.dirs.iter().any(|dir| {
                path.strip_prefix(dir.as_str())
                    .is_some_and(|rest| rest.starts_with('/'))
                    || path == dir
            });
        }
        let options = MatchOptions {
            require_literal_separator: false,
            ..MatchOptions::new()
        };
        let mut included = false;
        for (pattern, negated) in &self.patterns {
            let matched = pattern.matches_with(path, options)
                || path
                    .rsplit('/')
                    .next()
                    .is_some_and(|base| pattern.matches_with(base, options));
            if matched {
                included = !negated;
            }
        }
        included
    }

    /// Serialize back to file content.
    #[must_use]
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = String::new();
        if self.cone {
            out.push_str("/*\n!/*/\n");
            for dir in &self.dirs {
                out.push('/');
                out.push_str(dir);
                out.push_str("/\n");
            }
        } else {
            for (pattern, negated) in &self.patterns {
                if *negated {
                    out.push('!');
                }
                out.push_str(pattern.as_str());
                out.push('\n');
            }
        }
        out.into_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cone_includes_listed_subtrees_and_root_files() {
        let spec = SparseSpec::cone_of(vec!["src".into(), "docs/guide".into()]);
        assert!(spec.included("README.md"));
        assert!(spec.included("src/main.rs"));
        assert!(spec.included("src/deep/nested.rs"));
        assert!(spec.included("docs/guide/intro.md"));
        assert!(!spec.included("docs/other/skip.md"));
        assert!(!spec.included("tests/e2e.rs"));
    }

    #[test]
    fn cone_parse_reduces_bookkeeping_lines() {
        let spec = SparseSpec::parse(b"/*\n!/*/\n/src/\n/vendor/lib/\n", true);
        assert!(spec.included("src/a.rs"));
        assert!(spec.included("vendor/lib/x.c"));
        assert!(!spec.included("vendor/other/x.c"));
    }

    #[test]
    fn glob_mode_last_match_wins() {
        let spec = SparseSpec::parse(b"*.rs\n!tests_*.rs\n", false);
        assert!(spec.included("lib.rs"));
        assert!(spec.included("src/lib.rs"));
        assert!(!spec.included("tests_lib.rs"));
        assert!(!spec.included("README.md"));
    }

    #[test]
    fn serialize_roundtrip_cone() {
        let spec = SparseSpec::cone_of(vec!["src".into()]);
        let parsed = SparseSpec::parse(&spec.serialize(), true);
        assert!(parsed.included("src/x"));
        assert!(!parsed.included("other/x"));
    }
}
