use crate::error::{Result, WardenError};
use globset::{Glob, GlobMatcher};
use semver::VersionReq;
use std::collections::HashMap;
use std::sync::Mutex;

// ---------------------------------------------------------------------------
// GlobCache
// ---------------------------------------------------------------------------

/// Memoizing glob compiler, keyed by the exact pattern string. Entries are
/// immutable once inserted and never evicted; cardinality is bounded by the
/// number of distinct patterns in one org's configuration. Concurrent
/// compile-and-insert races are benign: compiled matchers for identical
/// input are interchangeable.
#[derive(Default)]
pub struct GlobCache {
    inner: Mutex<HashMap<String, GlobMatcher>>,
}

impl GlobCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn compile(&self, pattern: &str) -> Result<GlobMatcher> {
        if let Some(matcher) = self.inner.lock().unwrap().get(pattern) {
            return Ok(matcher.clone());
        }
        let matcher = Glob::new(pattern)
            .map_err(|err| WardenError::Pattern {
                pattern: pattern.to_string(),
                reason: err.to_string(),
            })?
            .compile_matcher();
        self.inner
            .lock()
            .unwrap()
            .insert(pattern.to_string(), matcher.clone());
        Ok(matcher)
    }
}

// ---------------------------------------------------------------------------
// SemverCache
// ---------------------------------------------------------------------------

/// Memoizing semver-requirement compiler, keyed by the exact expression
/// string. Accepts `v`-prefixed versions (`">= v1.0.4"`) the way action
/// refs are written.
#[derive(Default)]
pub struct SemverCache {
    inner: Mutex<HashMap<String, VersionReq>>,
}

impl SemverCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn compile(&self, expr: &str) -> Result<VersionReq> {
        if let Some(req) = self.inner.lock().unwrap().get(expr) {
            return Ok(req.clone());
        }
        let req = VersionReq::parse(&strip_v_prefixes(expr)).map_err(|err| WardenError::Pattern {
            pattern: expr.to_string(),
            reason: err.to_string(),
        })?;
        self.inner
            .lock()
            .unwrap()
            .insert(expr.to_string(), req.clone());
        Ok(req)
    }
}

/// Drop a standalone `v` that directly precedes a digit, so `">= v1.0.4"`
/// compiles as `">= 1.0.4"`.
fn strip_v_prefixes(expr: &str) -> String {
    let chars: Vec<char> = expr.chars().collect();
    let mut out = String::with_capacity(expr.len());
    for (i, &c) in chars.iter().enumerate() {
        if c == 'v' {
            let starts_token = i == 0 || !chars[i - 1].is_ascii_alphanumeric();
            let next_is_digit = chars.get(i + 1).is_some_and(|n| n.is_ascii_digit());
            if starts_token && next_is_digit {
                continue;
            }
        }
        out.push(c);
    }
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
