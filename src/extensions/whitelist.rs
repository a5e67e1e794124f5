//! Capability whitelist for extension `require` calls.
//!
//! A whitelist is a flat, ordered list of capability names loaded once per
//! process. An entry admits its own name and every sub-path below it, so
//! `fs` admits `fs/promises` but not `fsevents`.

/// Separator between a capability and its sub-resources.
pub const CAPABILITY_SEPARATOR: char = '/';

/// Whitelist shipped with the binary, used when no file is configured.
const DEFAULT_WHITELIST: &str = include_str!("../../resources/packages.txt");

/// Immutable set of whitelisted capability names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Whitelist {
    entries: Vec<String>,
}

impl Whitelist {
    /// Parse a whitelist from text, one entry per line.
    ///
    /// Blank lines and `#` comments are discarded; entries are trimmed.
    pub fn parse(text: &str) -> Self {
        let mut entries: Vec<String> = Vec::new();
        for line in text.lines() {
            let entry = line.trim();
            if entry.is_empty() || entry.starts_with('#') {
                continue;
            }
            if !entries.iter().any(|e| e == entry) {
                entries.push(entry.to_string());
            }
        }
        Self { entries }
    }

    /// The whitelist embedded in the binary.
    pub fn builtin() -> Self {
        Self::parse(DEFAULT_WHITELIST)
    }

    /// Build a whitelist from explicit entries.
    pub fn from_entries<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let text: Vec<String> = entries
            .into_iter()
            .map(|e| e.as_ref().to_string())
            .collect();
        Self::parse(&text.join("\n"))
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Check whether `requested` may be resolved.
    pub fn is_allowed(&self, requested: &str) -> bool {
        is_allowed(&self.entries, requested)
    }
}

/// True iff `requested` equals an entry or starts with `entry` followed by
/// [`CAPABILITY_SEPARATOR`].
pub fn is_allowed<S: AsRef<str>>(whitelist: &[S], requested: &str) -> bool {
    whitelist.iter().any(|entry| {
        let entry = entry.as_ref();
        match requested.strip_prefix(entry) {
            Some("") => true,
            Some(rest) => !entry.is_empty() && rest.starts_with(CAPABILITY_SEPARATOR),
            None => false,
        }
    })
}
