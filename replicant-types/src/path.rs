//! Slash-delimited routes into a structured value.
//!
//! An operation's path addresses the *container* (object or array) it
//! mutates, as a route from the value's root. Segments are escaped in the
//! JSON Pointer style (`~0` for `~`, `~1` for `/`) so keys containing
//! slashes survive a round trip.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A route from a value's root to a nested container.
///
/// The empty path addresses the root itself. Non-root paths are
/// `/`-prefixed, e.g. `/players/0/inventory`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OpPath(String);

impl OpPath {
    /// The path addressing the value root.
    #[must_use]
    pub fn root() -> Self {
        Self(String::new())
    }

    /// Builds a path from raw (unescaped) segments.
    pub fn from_segments<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut out = String::new();
        for seg in segments {
            out.push('/');
            out.push_str(&escape(seg.as_ref()));
        }
        Self(out)
    }

    /// Parses a path from its string form (already escaped).
    pub fn parse(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Whether this path addresses the root.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// The raw (escaped) string form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The decoded segments of this path, root-first.
    #[must_use]
    pub fn segments(&self) -> Vec<String> {
        if self.0.is_empty() {
            return Vec::new();
        }
        self.0
            .split('/')
            .skip(1) // leading slash
            .map(unescape)
            .collect()
    }

    /// Returns this path extended by one more (unescaped) segment.
    #[must_use]
    pub fn join(&self, segment: &str) -> Self {
        let mut out = self.0.clone();
        out.push('/');
        out.push_str(&escape(segment));
        Self(out)
    }
}

impl fmt::Display for OpPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            write!(f, "/")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

fn escape(segment: &str) -> String {
    segment.replace('~', "~0").replace('/', "~1")
}

fn unescape(segment: &str) -> String {
    segment.replace("~1", "/").replace("~0", "~")
}
