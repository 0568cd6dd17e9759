//! Key expressions.
//!
//! A key expression is a `/`-separated path naming one resource
//! (`demo/example/session_move_test`) or, when it contains wildcard chunks,
//! a set of resources:
//!
//! - `*` matches exactly one chunk (`demo/*/test` matches `demo/a/test`).
//! - `**` matches zero or more chunks (`demo/**` matches `demo` and
//!   `demo/a/b`).
//!
//! Wildcards are only valid as whole chunks. Key expressions are kept in
//! canonical form: `**/**` collapses into `**` and `**/*` is written `*/**`,
//! so two expressions denoting the same set compare equal.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::{Error, Result};

const SINGLE_WILD: &str = "*";
const DOUBLE_WILD: &str = "**";
const FORBIDDEN_CHARS: [char; 3] = ['#', '?', '$'];

/// A validated, canonical key expression.
///
/// Cheap to clone and safe to share across threads.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyExpr(Arc<str>);

impl KeyExpr {
    // ---
    /// Validate `expr` as a canonical key expression.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidKeyExpr`] if `expr` is malformed or not in
    /// canonical form. Use [`KeyExpr::autocanonize`] to accept
    /// non-canonical input.
    pub fn new(expr: impl Into<String>) -> Result<Self> {
        let expr = expr.into();
        validate(&expr)?;
        if !is_canon(&expr) {
            return Err(Error::InvalidKeyExpr {
                expr,
                reason: "not in canonical form",
            });
        }
        Ok(Self(expr.into()))
    }

    /// Canonize `expr`, then validate it.
    pub fn autocanonize(expr: impl Into<String>) -> Result<Self> {
        let expr = canonize(&expr.into())?;
        Ok(Self(expr.into()))
    }

    /// The expression as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `true` if the expression contains a wildcard chunk.
    pub fn is_wild(&self) -> bool {
        self.chunks().any(|c| c == SINGLE_WILD || c == DOUBLE_WILD)
    }

    /// `true` if at least one key is matched by both expressions.
    pub fn intersects(&self, other: &KeyExpr) -> bool {
        let a: Vec<&str> = self.chunks().collect();
        let b: Vec<&str> = other.chunks().collect();
        intersect_chunks(&a, &b)
    }

    /// `true` if every key matched by `other` is also matched by `self`.
    pub fn includes(&self, other: &KeyExpr) -> bool {
        let a: Vec<&str> = self.chunks().collect();
        let b: Vec<&str> = other.chunks().collect();
        include_chunks(&a, &b)
    }

    /// Append `suffix` as new chunk(s): `self/suffix`.
    ///
    /// The result is canonized.
    pub fn join(&self, suffix: &str) -> Result<Self> {
        Self::autocanonize(format!("{}/{}", self.0, suffix))
    }

    /// Append `suffix` verbatim, without inserting a separator.
    ///
    /// The result must itself be a valid canonical expression.
    pub fn concat(&self, suffix: &str) -> Result<Self> {
        Self::new(format!("{}{}", self.0, suffix))
    }

    fn chunks(&self) -> std::str::Split<'_, char> {
        self.0.split('/')
    }
}

/// Canonize `expr` without constructing a [`KeyExpr`].
///
/// # Errors
///
/// Returns [`Error::InvalidKeyExpr`] if `expr` is malformed beyond what
/// canonization can repair.
pub fn canonize(expr: &str) -> Result<String> {
    validate(expr)?;

    let mut out: Vec<&str> = Vec::new();
    for chunk in expr.split('/') {
        match (chunk, out.last().copied()) {
            (DOUBLE_WILD, Some(DOUBLE_WILD)) => {}
            (SINGLE_WILD, Some(DOUBLE_WILD)) => {
                out.pop();
                out.push(SINGLE_WILD);
                out.push(DOUBLE_WILD);
            }
            _ => out.push(chunk),
        }
    }
    Ok(out.join("/"))
}

/// `true` if `expr` is a valid key expression already in canonical form.
pub fn is_canon(expr: &str) -> bool {
    if validate(expr).is_err() {
        return false;
    }
    let chunks: Vec<&str> = expr.split('/').collect();
    !chunks
        .windows(2)
        .any(|w| w[0] == DOUBLE_WILD && (w[1] == DOUBLE_WILD || w[1] == SINGLE_WILD))
}

fn validate(expr: &str) -> Result<()> {
    let reject = |reason| {
        Err(Error::InvalidKeyExpr {
            expr: expr.to_string(),
            reason,
        })
    };

    if expr.is_empty() {
        return reject("empty key expression");
    }
    if expr.starts_with('/') {
        return reject("leading `/`");
    }
    if expr.ends_with('/') {
        return reject("trailing `/`");
    }
    if expr.contains(FORBIDDEN_CHARS) {
        return reject("forbidden character (`#`, `?` or `$`)");
    }
    for chunk in expr.split('/') {
        if chunk.is_empty() {
            return reject("empty chunk");
        }
        if chunk.contains('*') && chunk != SINGLE_WILD && chunk != DOUBLE_WILD {
            return reject("wildcards must be whole chunks");
        }
    }
    Ok(())
}

fn chunk_intersects(a: &str, b: &str) -> bool {
    a == SINGLE_WILD || b == SINGLE_WILD || a == b
}

fn intersect_chunks(a: &[&str], b: &[&str]) -> bool {
    match (a.first().copied(), b.first().copied()) {
        (None, None) => true,
        (Some(DOUBLE_WILD), _) => {
            intersect_chunks(&a[1..], b) || (!b.is_empty() && intersect_chunks(a, &b[1..]))
        }
        (_, Some(DOUBLE_WILD)) => {
            intersect_chunks(a, &b[1..]) || (!a.is_empty() && intersect_chunks(&a[1..], b))
        }
        (Some(x), Some(y)) => chunk_intersects(x, y) && intersect_chunks(&a[1..], &b[1..]),
        _ => false,
    }
}

fn include_chunks(a: &[&str], b: &[&str]) -> bool {
    match (a.first().copied(), b.first().copied()) {
        (None, None) => true,
        (Some(DOUBLE_WILD), _) => {
            include_chunks(&a[1..], b) || (!b.is_empty() && include_chunks(a, &b[1..]))
        }
        // `**` on the included side spans any number of chunks; only a
        // `**` on the including side can cover that.
        (_, Some(DOUBLE_WILD)) => false,
        (Some(x), Some(y)) => (x == SINGLE_WILD || x == y) && include_chunks(&a[1..], &b[1..]),
        _ => false,
    }
}

/// Resolve anything convertible into a key expression, unifying the error.
pub(crate) fn resolve<K>(key_expr: K) -> Result<KeyExpr>
where
    K: TryInto<KeyExpr>,
    K::Error: Into<Error>,
{
    key_expr.try_into().map_err(Into::into)
}

impl fmt::Display for KeyExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for KeyExpr {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for KeyExpr {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<&str> for KeyExpr {
    type Error = Error;

    fn try_from(value: &str) -> Result<Self> {
        Self::new(value)
    }
}

impl TryFrom<String> for KeyExpr {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl TryFrom<&String> for KeyExpr {
    type Error = Error;

    fn try_from(value: &String) -> Result<Self> {
        Self::new(value.as_str())
    }
}

impl From<&KeyExpr> for KeyExpr {
    fn from(value: &KeyExpr) -> Self {
        value.clone()
    }
}

impl From<Infallible> for Error {
    fn from(never: Infallible) -> Self {
        match never {}
    }
}

impl Serialize for KeyExpr {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for KeyExpr {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        KeyExpr::new(s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    fn ke(s: &str) -> KeyExpr {
        KeyExpr::new(s).unwrap()
    }

    #[test]
    fn test_accepts_plain_key() {
        // ---
        let k = ke("demo/example/session_move_test");
        assert_eq!(k.as_str(), "demo/example/session_move_test");
        assert!(!k.is_wild());
    }

    #[test]
    fn test_rejects_malformed() {
        // ---
        for bad in ["", "/a", "a/", "a//b", "a/b*", "a/*b/c", "a/#", "a?x", "$a", "***"] {
            assert!(KeyExpr::new(bad).is_err(), "accepted {bad:?}");
        }
    }

    #[test]
    fn test_new_requires_canonical() {
        // ---
        assert!(KeyExpr::new("a/**/**").is_err());
        assert!(KeyExpr::new("a/**/*").is_err());
        assert!(KeyExpr::new("a/*/**").is_ok());
    }

    #[test]
    fn test_canonize() {
        // ---
        assert_eq!(canonize("a/**/**/b").unwrap(), "a/**/b");
        assert_eq!(canonize("a/**/*").unwrap(), "a/*/**");
        assert_eq!(canonize("**/*/**").unwrap(), "*/**");
        assert_eq!(canonize("a/**/*/*").unwrap(), "a/*/*/**");
        assert!(is_canon("a/*/**"));
        assert!(!is_canon("a/**/**"));
        assert!(!is_canon("a//b"));
    }

    #[test]
    fn test_single_wild_matches_one_chunk() {
        // ---
        assert!(ke("demo/*/test").intersects(&ke("demo/a/test")));
        assert!(!ke("demo/*/test").intersects(&ke("demo/test")));
        assert!(!ke("demo/*").intersects(&ke("demo/a/b")));
    }

    #[test]
    fn test_double_wild_matches_zero_or_more() {
        // ---
        let all = ke("demo/**");
        assert!(all.intersects(&ke("demo")));
        assert!(all.intersects(&ke("demo/a")));
        assert!(all.intersects(&ke("demo/a/b/c")));
        assert!(!all.intersects(&ke("other/a")));
        assert!(ke("**").intersects(&ke("x/y")));
        assert!(ke("a/**/z").intersects(&ke("a/b/c/z")));
        assert!(!ke("a/**/z").intersects(&ke("a/b/c")));
    }

    #[test]
    fn test_intersects_is_symmetric_between_wild_exprs() {
        // ---
        let a = ke("a/*/c/**");
        let b = ke("a/b/*");
        assert!(a.intersects(&b));
        assert!(b.intersects(&a));
        assert!(!ke("a/*/d").intersects(&ke("a/**/c")));
    }

    #[test]
    fn test_includes() {
        // ---
        assert!(ke("demo/**").includes(&ke("demo/a/b")));
        assert!(ke("demo/**").includes(&ke("demo/*/b")));
        assert!(ke("demo/*").includes(&ke("demo/a")));
        assert!(!ke("demo/a").includes(&ke("demo/*")));
        assert!(!ke("demo/*").includes(&ke("demo/**")));
        assert!(ke("**").includes(&ke("**")));
    }

    #[test]
    fn test_join_and_concat() {
        // ---
        let base = ke("demo/example");
        assert_eq!(base.join("a/b").unwrap().as_str(), "demo/example/a/b");
        assert_eq!(ke("a/**").join("**").unwrap().as_str(), "a/**");
        assert_eq!(base.concat("_x").unwrap().as_str(), "demo/example_x");
        assert!(base.concat("/").is_err());
    }

    #[test]
    fn test_serde_validates() {
        // ---
        let k: KeyExpr = serde_json::from_str("\"a/b\"").unwrap();
        assert_eq!(k, ke("a/b"));
        assert!(serde_json::from_str::<KeyExpr>("\"a//b\"").is_err());
    }
}
