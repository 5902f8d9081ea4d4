//! Bounded, case-insensitive driver names

use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::constants::names::MAX_NAME_LEN;

/// Truncate `s` to at most `max` bytes without splitting a character
pub fn truncate_bounded(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Compare two names the way the registry does: case-insensitive, over the
/// bounded prefix only
pub fn names_match(a: &str, b: &str) -> bool {
    truncate_bounded(a, MAX_NAME_LEN).eq_ignore_ascii_case(truncate_bounded(b, MAX_NAME_LEN))
}

/// Name of a registered driver.
///
/// Stored truncated to [`MAX_NAME_LEN`] bytes. Equality and hashing ignore
/// ASCII case.
#[derive(Debug, Clone, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct DriverName(String);

impl DriverName {
    pub fn new(raw: &str) -> Self {
        Self(truncate_bounded(raw, MAX_NAME_LEN).to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether `other` names this driver
    pub fn matches(&self, other: &str) -> bool {
        names_match(&self.0, other)
    }
}

impl PartialEq for DriverName {
    fn eq(&self, other: &Self) -> bool {
        self.0.eq_ignore_ascii_case(&other.0)
    }
}

impl Hash for DriverName {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for b in self.0.bytes() {
            state.write_u8(b.to_ascii_lowercase());
        }
    }
}

impl fmt::Display for DriverName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DriverName {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for DriverName {
    fn from(s: String) -> Self {
        Self::new(&s)
    }
}

impl From<DriverName> for String {
    fn from(n: DriverName) -> Self {
        n.0
    }
}

impl AsRef<str> for DriverName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
