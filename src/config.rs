//! Git configuration: INI parsing, typed lookup, and the cascade.
//!
//! Sections are `[name]` or `[name "subsection"]`; section and key names
//! are case-insensitive, subsections case-sensitive. Keys address values
//! as dotted paths: `core.autocrlf`, `remote.origin.url` (first segment
//! is the section, last the key, everything between the subsection).
//!
//! Parsing then serializing then parsing again yields the same values
//! (idempotent after one pass); comments are not preserved.

use std::fmt;

use crate::errors::{Error, ErrorKind, Result};

// ---------------------------------------------------------------------------
// Value coercion
// ---------------------------------------------------------------------------

/// `core.autocrlf` settings.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AutoCrlf {
    /// No conversion.
    #[default]
    False,
    /// CRLF in the worktree, LF in the repository.
    True,
    /// LF both places; only strip CR on the way in.
    Input,
}

/// `core.safecrlf` settings.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SafeCrlf {
    /// No reversibility check.
    #[default]
    False,
    /// Log a warning on irreversible conversion.
    Warn,
    /// Fail the operation on irreversible conversion.
    Fail,
}

/// `merge.conflictstyle` settings.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConflictStyle {
    /// Two-way markers.
    #[default]
    Merge,
    /// Markers including the base hunk.
    Diff3,
}

/// Interpret a git boolean: `true/on/yes/1` and `false/off/no/0` (any
/// case); a key present with no value means true.
#[must_use]
pub fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "on" | "yes" | "1" | "" => Some(true),
        "false" | "off" | "no" | "0" => Some(false),
        _ => None,
    }
}

/// Interpret a numeric value with optional `k`/`m`/`g` suffix (powers of
/// 1024).
#[must_use]
pub fn parse_int(value: &str) -> Option<i64> {
    let value = value.trim();
    let (digits, factor) = match value.to_ascii_lowercase().chars().last()? {
        'k' => (&value[..value.len() - 1], 1024),
        'm' => (&value[..value.len() - 1], 1024 * 1024),
        'g' => (&value[..value.len() - 1], 1024 * 1024 * 1024),
        _ => (value, 1),
    };
    digits.trim().parse::<i64>().ok().map(|n| n * factor)
}

// ---------------------------------------------------------------------------
// GitConfig
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq)]
struct Section {
    /// Lowercased section name.
    name: String,
    /// Subsection, case preserved.
    subsection: Option<String>,
    /// `(lowercased key, value)` pairs in file order.
    entries: Vec<(String, String)>,
}

/// One parsed configuration file.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GitConfig {
    sections: Vec<Section>,
}

/// Split a dotted key path into `(section, subsection, key)`.
fn split_key(path: &str) -> Option<(String, Option<String>, String)> {
    let mut parts: Vec<&str> = path.split('.').collect();
    if parts.len() < 2 {
        return None;
    }
    let key = parts.pop()?.to_ascii_lowercase();
    let section = parts.remove(0).to_ascii_lowercase();
    let subsection = if parts.is_empty() {
        None
    } else {
        Some(parts.join("."))
    };
    Some((section, subsection, key))
}

impl GitConfig {
    /// An empty configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse file bytes. Unparseable lines are skipped rather than fatal,
    /// matching git's tolerance for foreign config content.
    #[must_use]
    pub fn parse(data: &[u8]) -> Self {
        let text = String::from_utf8_lossy(data);
        let mut config = Self::new();
        let mut current: Option<Section> = None;
        for raw_line in text.lines() {
            let line = strip_comment(raw_line).trim();
            if line.is_empty() {
                continue;
            }
            if line.starts_with('[') && line.ends_with(']') {
                if let Some(section) = current.take() {
                    config.sections.push(section);
                }
                let inner = &line[1..line.len() - 1];
                let (name, subsection) = match inner.split_once(' ') {
                    Some((name, rest)) => {
                        let sub = rest.trim().trim_matches('"').replace("\\\"", "\"");
                        (name.to_ascii_lowercase(), Some(sub))
                    }
                    // `[section.sub]` legacy form: subsection after the dot.
                    None => match inner.split_once('.') {
                        Some((name, sub)) => {
                            (name.to_ascii_lowercase(), Some(sub.to_owned()))
                        }
                        None => (inner.to_ascii_lowercase(), None),
                    },
                };
                current = Some(Section {
                    name,
                    subsection,
                    entries: Vec::new(),
                });
                continue;
            }
            let Some(section) = current.as_mut() else {
                continue;
            };
            match line.split_once('=') {
                Some((key, value)) => section.entries.push((
                    key.trim().to_ascii_lowercase(),
                    unquote(value.trim()),
                )),
                // Bare key means boolean true.
                None => section
                    .entries
                    .push((line.to_ascii_lowercase(), String::new())),
            }
        }
        if let Some(section) = current {
            config.sections.push(section);
        }
        config
    }

    /// Serialize to file bytes.
    #[must_use]
    pub fn serialize(&self) -> Vec<u8> {
        self.to_string().into_bytes()
    }

    /// Last value for a dotted key, the one git honors.
    #[must_use]
    pub fn get(&self, path: &str) -> Option<&str> {
        let (section, subsection, key) = split_key(path)?;
        self.sections
            .iter()
            .filter(|s| s.name == section && s.subsection == subsection)
            .flat_map(|s| &s.entries)
            .filter(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
            .next_back()
    }

    /// Every value for a dotted key, in file order (`remote.*.fetch`).
    #[must_use]
    pub fn get_all(&self, path: &str) -> Vec<&str> {
        let Some((section, subsection, key)) = split_key(path) else {
            return Vec::new();
        };
        self.sections
            .iter()
            .filter(|s| s.name == section && s.subsection == subsection)
            .flat_map(|s| &s.entries)
            .filter(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
            .collect()
    }

    /// Boolean coercion with git's synonyms.
    #[must_use]
    pub fn get_bool(&self, path: &str) -> Option<bool> {
        self.get(path).and_then(parse_bool)
    }

    /// Numeric coercion with k/m/g suffixes.
    #[must_use]
    pub fn get_int(&self, path: &str) -> Option<i64> {
        self.get(path).and_then(parse_int)
    }

    /// Subsection names for a section (`remote` -> `["origin", ...]`).
    #[must_use]
    pub fn subsections(&self, section: &str) -> Vec<&str> {
        let section = section.to_ascii_lowercase();
        self.sections
            .iter()
            .filter(|s| s.name == section)
            .filter_map(|s| s.subsection.as_deref())
            .collect()
    }

    /// Set (replacing all previous values of) a dotted key.
    pub fn set(&mut self, path: &str, value: &str) -> Result<()> {
        let (name, subsection, key) = split_key(path).ok_or_else(|| {
            Error::new(ErrorKind::NotFound {
                kind: "config key",
                id: path.to_owned(),
            })
        })?;
        if let Some(section) = self
            .sections
            .iter_mut()
            .find(|s| s.name == name && s.subsection == subsection)
        {
            section.entries.retain(|(k, _)| *k != key);
            section.entries.push((key, value.to_owned()));
        } else {
            self.sections.push(Section {
                name,
                subsection,
                entries: vec![(key, value.to_owned())],
            });
        }
        Ok(())
    }

    /// Append an additional value for a key (multi-valued keys).
    pub fn add(&mut self, path: &str, value: &str) -> Result<()> {
        let (name, subsection, key) = split_key(path).ok_or_else(|| {
            Error::new(ErrorKind::NotFound {
                kind: "config key",
                id: path.to_owned(),
            })
        })?;
        if let Some(section) = self
            .sections
            .iter_mut()
            .find(|s| s.name == name && s.subsection == subsection)
        {
            section.entries.push((key, value.to_owned()));
        } else {
            self.sections.push(Section {
                name,
                subsection,
                entries: vec![(key, value.to_owned())],
            });
        }
        Ok(())
    }

    /// Remove all values of a key. Empty sections are dropped.
    pub fn unset(&mut self, path: &str) {
        if let Some((name, subsection, key)) = split_key(path) {
            for section in self
                .sections
                .iter_mut()
                .filter(|s| s.name == name && s.subsection == subsection)
            {
                section.entries.retain(|(k, _)| *k != key);
            }
            self.sections.retain(|s| !s.entries.is_empty());
        }
    }

    // -- typed accessors for the keys grit interprets --

    /// `core.autocrlf`.
    #[must_use]
    pub fn autocrlf(&self) -> AutoCrlf {
        match self.get("core.autocrlf") {
            Some("input") => AutoCrlf::Input,
            Some(value) => {
                if parse_bool(value) == Some(true) {
                    AutoCrlf::True
                } else {
                    AutoCrlf::False
                }
            }
            None => AutoCrlf::False,
        }
    }

    /// `core.safecrlf`.
    #[must_use]
    pub fn safecrlf(&self) -> SafeCrlf {
        match self.get("core.safecrlf") {
            Some("warn") => SafeCrlf::Warn,
            Some(value) if parse_bool(value) == Some(true) => SafeCrlf::Fail,
            _ => SafeCrlf::False,
        }
    }

    /// `merge.conflictstyle`.
    #[must_use]
    pub fn conflict_style(&self) -> ConflictStyle {
        match self.get("merge.conflictstyle") {
            Some("diff3") => ConflictStyle::Diff3,
            _ => ConflictStyle::Merge,
        }
    }

    /// `core.bare`, default false.
    #[must_use]
    pub fn bare(&self) -> bool {
        self.get_bool("core.bare").unwrap_or(false)
    }

    /// `core.filemode`, default true.
    #[must_use]
    pub fn filemode(&self) -> bool {
        self.get_bool("core.filemode").unwrap_or(true)
    }

    /// `core.symlinks`, default true.
    #[must_use]
    pub fn symlinks(&self) -> bool {
        self.get_bool("core.symlinks").unwrap_or(true)
    }

    /// `core.logallrefupdates`, default false for non-HEAD/branch refs.
    #[must_use]
    pub fn log_all_ref_updates(&self) -> bool {
        self.get_bool("core.logallrefupdates").unwrap_or(false)
    }

    /// `user.name` / `user.email` pair when both are set.
    #[must_use]
    pub fn user(&self) -> Option<(String, String)> {
        match (self.get("user.name"), self.get("user.email")) {
            (Some(name), Some(email)) => Some((name.to_owned(), email.to_owned())),
            _ => None,
        }
    }
}

impl fmt::Display for GitConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for section in &self.sections {
            match &section.subsection {
                Some(sub) => {
                    let escaped = sub.replace('"', "\\\"");
                    writeln!(f, "[{} \"{escaped}\"]", section.name)?;
                }
                None => writeln!(f, "[{}]", section.name)?,
            }
            for (key, value) in &section.entries {
                if value.is_empty() {
                    writeln!(f, "\t{key}")?;
                } else if needs_quoting(value) {
                    writeln!(f, "\t{key} = \"{}\"", value.replace('"', "\\\""))?;
                } else {
                    writeln!(f, "\t{key} = {value}")?;
                }
            }
        }
        Ok(())
    }
}

fn strip_comment(line: &str) -> &str {
    // Comments start at ; or # outside quotes.
    let mut in_quotes = false;
    for (i, c) in line.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            ';' | '#' if !in_quotes => return &line[..i],
            _ => {}
        }
    }
    line
}

fn unquote(value: &str) -> String {
    let value = value.trim();
    if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
        value[1..value.len() - 1]
            .replace("\\\"", "\"")
            .replace("\\\\", "\\")
    } else {
        value.to_owned()
    }
}

fn needs_quoting(value: &str) -> bool {
    value.starts_with(' ')
        || value.ends_with(' ')
        || value.contains('#')
        || value.contains(';')
        || value.contains('"')
}

// ---------------------------------------------------------------------------
// Cascade
// ---------------------------------------------------------------------------

/// The config cascade: system, then global, then worktree, then local;
/// later layers win.
#[derive(Clone, Debug, Default)]
pub struct ConfigCascade {
    layers: Vec<GitConfig>,
}

impl ConfigCascade {
    /// Build from layers in precedence order (lowest first).
    #[must_use]
    pub fn new(layers: Vec<GitConfig>) -> Self {
        Self { layers }
    }

    /// Highest-precedence value for a key.
    #[must_use]
    pub fn get(&self, path: &str) -> Option<&str> {
        self.layers.iter().rev().find_map(|layer| layer.get(path))
    }

    /// The merged view as a single [`GitConfig`] (used for typed
    /// accessors); later layers override.
    #[must_use]
    pub fn merged(&self) -> GitConfig {
        let mut out = GitConfig::new();
        for layer in &self.layers {
            for section in &layer.sections {
                for (key, value) in &section.entries {
                    let path = match &section.subsection {
                        Some(sub) => format!("{}.{sub}.{key}", section.name),
                        None => format!("{}.{key}", section.name),
                    };
                    // set() replaces; multi-valued keys within one layer
                    // are re-added to preserve them.
                    let _ = out.add(&path, value);
                }
            }
        }
        out
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
