//! Capability sets.
//!
//! v1 advertises capabilities after a NUL on the first ref line; v2 lists
//! them one per packet, possibly `key=value`. Both shapes parse into
//! [`CapabilitySet`]. Multi-valued keys (`symref`) keep every occurrence.

use std::fmt;

/// An ordered set of capability tokens.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CapabilitySet {
    entries: Vec<(String, Option<String>)>,
}

impl CapabilitySet {
    /// Empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a space-separated capability list (v1 style).
    #[must_use]
    pub fn parse_v1(raw: &[u8]) -> Self {
        let text = String::from_utf8_lossy(raw);
        let mut set = Self::new();
        for token in text.split(' ').filter(|t| !t.is_empty()) {
            set.push_token(token);
        }
        set
    }

    /// Add one token, splitting `key=value`.
    pub fn push_token(&mut self, token: &str) {
        match token.split_once('=') {
            Some((key, value)) => self
                .entries
                .push((key.to_owned(), Some(value.to_owned()))),
            None => self.entries.push((token.to_owned(), None)),
        }
    }

    /// Whether a capability is present (by key).
    #[must_use]
    pub fn has(&self, name: &str) -> bool {
        self.entries.iter().any(|(key, _)| key == name)
    }

    /// First value for a `key=value` capability.
    #[must_use]
    pub fn value(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(key, _)| key == name)
            .and_then(|(_, value)| value.as_deref())
    }

    /// All values for a multi-valued capability (e.g. `symref`).
    #[must_use]
    pub fn values(&self, name: &str) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|(key, _)| key == name)
            .filter_map(|(_, value)| value.as_deref())
            .collect()
    }

    /// `symref=HEAD:refs/heads/main` pairs as `(from, to)`.
    #[must_use]
    pub fn symrefs(&self) -> Vec<(String, String)> {
        self.values("symref")
            .into_iter()
            .filter_map(|v| {
                v.split_once(':')
                    .map(|(from, to)| (from.to_owned(), to.to_owned()))
            })
            .collect()
    }

    /// Iterate raw entries.
    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.entries
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_deref()))
    }

    /// True when no capabilities were advertised.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Display for CapabilitySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (key, value) in &self.entries {
            if !first {
                f.write_str(" ")?;
            }
            first = false;
            match value {
                Some(value) => write!(f, "{key}={value}")?,
                None => f.write_str(key)?,
            }
        }
        Ok(())
    }
}
