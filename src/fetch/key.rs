//! Deterministic cache keys.
//!
//! A key is a namespace followed by ordered parts, joined with `|`. `%` and
//! `|` inside any component are percent-escaped first, so two different
//! part lists can never produce the same key.

use std::borrow::Cow;
use std::fmt;

const SEPARATOR: char = '|';

/// Cache key derived from the identifying parameters of a request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new<I, S>(namespace: &str, parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut key = escape(namespace).into_owned();
        for part in parts {
            key.push(SEPARATOR);
            key.push_str(&escape(part.as_ref()));
        }
        Self(key)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<CacheKey> for String {
    fn from(key: CacheKey) -> Self {
        key.0
    }
}

/// Types that can name their own cache slot.
pub trait CacheKeyed {
    fn cache_key(&self) -> CacheKey;
}

fn escape(component: &str) -> Cow<'_, str> {
    if !component.contains(['%', SEPARATOR]) {
        return Cow::Borrowed(component);
    }
    // '%' first so the escapes themselves are not re-escaped
    Cow::Owned(component.replace('%', "%25").replace(SEPARATOR, "%7C"))
}
