//! Cache key derivation and invalidation patterns.
//!
//! Keys are `prefix + path [+ "?" + canonical query]`. The canonical query
//! drops empty values and sorts pairs by name then value, so equivalent
//! requests share an entry regardless of parameter order.

use std::fmt;

use url::form_urlencoded;

use crate::domain::readings::ReadingId;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn for_request(prefix: &str, path: &str, query: Option<&str>) -> Self {
        let canonical = query.map(canonical_query).unwrap_or_default();
        if canonical.is_empty() {
            Self(format!("{prefix}{path}"))
        } else {
            Self(format!("{prefix}{path}?{canonical}"))
        }
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

/// Glob pattern over cache keys: `*` matches any run, `?` any single character.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyPattern(String);

impl KeyPattern {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self(pattern.into())
    }

    /// Every view of a collection: list pages, filtered lists and item reads.
    pub fn collection(prefix: &str, path: &str) -> Self {
        Self(format!("{prefix}{path}*"))
    }

    /// Keys of a single item view, with or without a query string.
    pub fn item(prefix: &str, path: &str, id: ReadingId) -> [Self; 2] {
        [
            Self(format!("{prefix}{path}/{id}")),
            Self(format!("{prefix}{path}/{id}\\?*")),
        ]
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn matches(&self, key: &str) -> bool {
        glob_match(self.0.as_bytes(), key.as_bytes())
    }
}

impl fmt::Display for KeyPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub fn canonical_query(query: &str) -> String {
    let mut pairs: Vec<(String, String)> = form_urlencoded::parse(query.as_bytes())
        .filter(|(_, value)| !value.is_empty())
        .map(|(name, value)| (name.into_owned(), value.into_owned()))
        .collect();
    pairs.sort();

    let mut serializer = form_urlencoded::Serializer::new(String::new());
    for (name, value) in &pairs {
        serializer.append_pair(name, value);
    }
    serializer.finish()
}

/// Iterative glob matcher with single-star backtracking. `\` escapes the next byte.
fn glob_match(pattern: &[u8], text: &[u8]) -> bool {
    let (mut p, mut t) = (0, 0);
    let mut star: Option<(usize, usize)> = None;

    while t < text.len() {
        match pattern.get(p) {
            Some(b'*') => {
                star = Some((p, t));
                p += 1;
                continue;
            }
            Some(b'?') => {
                p += 1;
                t += 1;
                continue;
            }
            Some(b'\\') if pattern.get(p + 1) == Some(&text[t]) => {
                p += 2;
                t += 1;
                continue;
            }
            Some(&byte) if byte != b'\\' && byte == text[t] => {
                p += 1;
                t += 1;
                continue;
            }
            _ => {}
        }

        match star {
            Some((star_p, star_t)) => {
                p = star_p + 1;
                t = star_t + 1;
                star = Some((star_p, star_t + 1));
            }
            None => return false,
        }
    }

    pattern[p..].iter().all(|&byte| byte == b'*')
}
