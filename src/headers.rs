//! HTTP headers handling
//!
//! This module provides the header collection used by both requests and
//! responses: insertion-ordered name/value pairs with case-insensitive
//! lookups and the wire-level combination rules for repeated headers.

use crate::MAX_HEADERS;
use std::fmt;

/// Ordered HTTP header collection
///
/// Headers are stored in insertion order and support:
/// - Case-insensitive header name lookups (original case is preserved)
/// - Multiple values for the same header name
/// - Replace-in-place semantics via [`Headers::set`]
/// - Wire-parsing combination semantics via [`Headers::append`]
#[derive(Debug, Clone, Default)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    /// Create a new empty headers collection
    pub fn new() -> Self {
        Headers {
            entries: Vec::new(),
        }
    }

    /// Insert a header unconditionally
    ///
    /// Always adds a new entry, even if one with the same name exists. The
    /// [`MAX_HEADERS`] cap applies here and in [`Headers::append`], bounding
    /// what the parse path will accumulate.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        if self.entries.len() >= MAX_HEADERS {
            // Silently ignore past the cap
            return;
        }
        self.entries.push((name.into(), value.into()));
    }

    /// Get the first value for a header (case-insensitive)
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Get the first value for a header, or a default if absent
    pub fn get_or<'a>(&'a self, name: &str, default: &'a str) -> &'a str {
        self.get(name).unwrap_or(default)
    }

    /// Replace the first matching entry in place, or add a new one
    ///
    /// The stored name keeps the case given here when a new entry is added;
    /// a replaced entry keeps its original name case. Unlike
    /// [`Headers::insert`], `set` is exempt from the header cap: it carries
    /// protocol-controlled headers and must never fail silently.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        if let Some(entry) = self
            .entries
            .iter_mut()
            .find(|(n, _)| n.eq_ignore_ascii_case(&name))
        {
            entry.1 = value;
        } else {
            self.entries.push((name, value));
        }
    }

    /// Set a header only if no matching entry exists yet
    ///
    /// Used for protocol-controlled headers so caller-supplied values win.
    /// Exempt from the header cap, like [`Headers::set`].
    pub fn set_default(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        if !self.contains(&name) {
            self.entries.push((name, value.into()));
        }
    }

    /// Append a parsed header token using wire combination rules
    ///
    /// - An empty `name` is a continuation line: the value is concatenated
    ///   onto the previous entry's value.
    /// - If `name` matches the previous entry's name case-insensitively, the
    ///   values are joined with `", "` (RFC combination for repeatable
    ///   headers) - except for `Set-Cookie`, whose values may themselves
    ///   contain commas and so stay as separate entries.
    /// - Otherwise a new entry is added.
    pub fn append(&mut self, name: &str, value: &str) {
        if name.is_empty() {
            if let Some((_, prev)) = self.entries.last_mut() {
                prev.push_str(value);
            }
            return;
        }

        if !name.eq_ignore_ascii_case("Set-Cookie") {
            if let Some((prev_name, prev_value)) = self.entries.last_mut() {
                if prev_name.eq_ignore_ascii_case(name) {
                    prev_value.push_str(", ");
                    prev_value.push_str(value);
                    return;
                }
            }
        }

        self.insert(name, value);
    }

    /// Get all values for a header (case-insensitive)
    pub fn get_all(&self, name: &str) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
            .collect()
    }

    /// Count how many times a header appears
    pub fn count(&self, name: &str) -> usize {
        self.entries
            .iter()
            .filter(|(n, _)| n.eq_ignore_ascii_case(name))
            .count()
    }

    /// Check if a header exists
    pub fn contains(&self, name: &str) -> bool {
        self.entries
            .iter()
            .any(|(n, _)| n.eq_ignore_ascii_case(name))
    }

    /// Remove all instances of a header (case-insensitive)
    pub fn remove(&mut self, name: &str) -> usize {
        let initial_len = self.entries.len();
        self.entries.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
        initial_len - self.entries.len()
    }

    /// Get the number of headers
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if there are no headers
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Clear all headers
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Iterate over all headers in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }
}

impl fmt::Display for Headers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, value) in &self.entries {
            writeln!(f, "{}: {}", name, value)?;
        }
        Ok(())
    }
}

impl FromIterator<(String, String)> for Headers {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        let mut headers = Headers::new();
        for (name, value) in iter {
            headers.insert(name, value);
        }
        headers
    }
}
