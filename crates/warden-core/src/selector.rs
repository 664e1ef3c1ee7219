use crate::cache::{GlobCache, SemverCache};
use crate::config::{ActionSelector, RepoSelector};
use crate::error::{Result, WardenError};
use crate::provider::RepoIntrospection;
use crate::types::{ActionUse, RepoId};
use crate::version::{resolve_release_version, Release, RepoHistory, VersionConstraint};
use std::collections::HashMap;
use std::sync::Mutex;

/// How deep `exclude` sub-selectors are followed.
pub const EXCLUDE_DEPTH: u32 = 3;

/// A language is significant when strictly above this many bytes, or when
/// it is the repository's single largest language by byte count.
pub const SIGNIFICANT_LANGUAGE_BYTES: u64 = 25_000;

// ---------------------------------------------------------------------------
// SelectorMatch
// ---------------------------------------------------------------------------

/// Decomposed selector outcome: callers distinguish "wrong action" from
/// "right action, wrong version" for error messaging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectorMatch {
    pub matched: bool,
    pub name_matched: bool,
    pub version_matched: bool,
}

impl SelectorMatch {
    fn miss() -> Self {
        Self { matched: false, name_matched: false, version_matched: false }
    }

    fn hit() -> Self {
        Self { matched: true, name_matched: true, version_matched: true }
    }

    fn version_mismatch() -> Self {
        Self { matched: false, name_matched: true, version_matched: false }
    }
}

// ---------------------------------------------------------------------------
// MatchContext
// ---------------------------------------------------------------------------

/// Shared state for one repository check: the process-wide pattern caches
/// plus per-check memoization of action-repo histories and releases.
pub struct MatchContext<'a> {
    introspection: &'a dyn RepoIntrospection,
    globs: &'a GlobCache,
    semvers: &'a SemverCache,
    histories: Mutex<HashMap<RepoId, RepoHistory>>,
    releases: Mutex<HashMap<RepoId, Vec<Release>>>,
}

impl<'a> MatchContext<'a> {
    pub fn new(
        introspection: &'a dyn RepoIntrospection,
        globs: &'a GlobCache,
        semvers: &'a SemverCache,
    ) -> Self {
        Self {
            introspection,
            globs,
            semvers,
            histories: Mutex::new(HashMap::new()),
            releases: Mutex::new(HashMap::new()),
        }
    }

    pub fn introspection(&self) -> &'a dyn RepoIntrospection {
        self.introspection
    }

    async fn history_for(&self, action: &str) -> Result<RepoHistory> {
        let repo = RepoId::from_action_name(action)
            .ok_or_else(|| WardenError::InvalidActionName(action.to_string()))?;
        if let Some(history) = self.histories.lock().unwrap().get(&repo) {
            return Ok(history.clone());
        }
        let history = self.introspection.repo_history(&repo).await?;
        self.histories.lock().unwrap().insert(repo, history.clone());
        Ok(history)
    }

    async fn releases_for(&self, action: &str) -> Result<Vec<Release>> {
        let repo = RepoId::from_action_name(action)
            .ok_or_else(|| WardenError::InvalidActionName(action.to_string()))?;
        if let Some(releases) = self.releases.lock().unwrap().get(&repo) {
            return Ok(releases.clone());
        }
        let releases = self.introspection.list_releases(&repo).await?;
        self.releases.lock().unwrap().insert(repo, releases.clone());
        Ok(releases)
    }

    // -----------------------------------------------------------------------
    // Action selector
    // -----------------------------------------------------------------------

    /// Match one action-use against an action selector per the tiered
    /// version scheme: literal equality, then a semver requirement against
    /// the resolved release version, then a commit/tag/branch constraint
    /// over the action repository's commit graph.
    pub async fn match_action(
        &self,
        selector: &ActionSelector,
        action_use: &ActionUse,
    ) -> Result<SelectorMatch> {
        if !selector.name.is_empty() {
            let glob = self.globs.compile(&selector.name)?;
            if !glob.is_match(&action_use.name) {
                return Ok(SelectorMatch::miss());
            }
        }
        if selector.version.is_empty() {
            return Ok(SelectorMatch::hit());
        }
        // Fast path for exact ref pins.
        if action_use.version_ref == selector.version {
            return Ok(SelectorMatch::hit());
        }

        match self.semvers.compile(&selector.version) {
            Ok(req) => {
                let releases = self.releases_for(&action_use.name).await?;
                match resolve_release_version(&action_use.name, &action_use.version_ref, &releases)
                {
                    Ok(version) if req.matches(&version) => Ok(SelectorMatch::hit()),
                    Ok(_) => Ok(SelectorMatch::version_mismatch()),
                    // Expected: no release targets the pinned ref. The
                    // literal fast path above already covered ref equality.
                    Err(WardenError::NoMatchingRelease { .. }) => {
                        Ok(SelectorMatch::version_mismatch())
                    }
                    Err(err) => Err(err),
                }
            }
            Err(_) => self.match_ref_constraint(selector, action_use).await,
        }
    }

    /// Non-semver constraint: resolve both sides against the action repo's
    /// history and walk the commit graph. Resolution misses degrade to
    /// "name matched, version did not".
    async fn match_ref_constraint(
        &self,
        selector: &ActionSelector,
        action_use: &ActionUse,
    ) -> Result<SelectorMatch> {
        let history = self.history_for(&action_use.name).await?;
        let constraint = match VersionConstraint::parse(&selector.version, &history) {
            Ok(constraint) => constraint,
            Err(WardenError::NoCorrespondingCommit(_)) => {
                return Ok(SelectorMatch::version_mismatch());
            }
            Err(err) => return Err(err),
        };
        let candidate = match history.resolve_ref(&action_use.version_ref) {
            Ok((version, _)) => version,
            Err(WardenError::NoCorrespondingCommit(_)) => {
                return Ok(SelectorMatch::version_mismatch());
            }
            Err(err) => return Err(err),
        };
        if constraint.matches(&candidate, &history) {
            Ok(SelectorMatch::hit())
        } else {
            Ok(SelectorMatch::version_mismatch())
        }
    }

    // -----------------------------------------------------------------------
    // Repo selector
    // -----------------------------------------------------------------------

    pub async fn match_repo(&self, selector: &RepoSelector, repo: &RepoId) -> Result<bool> {
        self.match_repo_at_depth(selector, repo, EXCLUDE_DEPTH).await
    }

    async fn match_repo_at_depth(
        &self,
        selector: &RepoSelector,
        repo: &RepoId,
        depth: u32,
    ) -> Result<bool> {
        if !selector.name.is_empty() {
            let glob = self.globs.compile(&selector.name)?;
            if !glob.is_match(&repo.name) {
                return Ok(false);
            }
        }
        if !selector.language.is_empty() {
            let languages = self.introspection.list_languages(repo).await?;
            let any_significant = selector
                .language
                .iter()
                .any(|want| language_significant(&languages, want));
            if !any_significant {
                return Ok(false);
            }
        }
        if depth > 0 {
            for exclusion in &selector.exclude {
                // Exclusion errors are swallowed, not propagated.
                match Box::pin(self.match_repo_at_depth(exclusion, repo, depth - 1)).await {
                    Ok(true) => return Ok(false),
                    Ok(false) => {}
                    Err(err) => {
                        tracing::debug!(%repo, %err, "ignoring exclusion selector error");
                    }
                }
            }
        }
        Ok(true)
    }
}

/// A requested language counts when it is strictly above the byte
/// threshold, or when it is the single largest language in the repository
/// (a small-but-primary language still selects the repo).
fn language_significant(languages: &[(String, u64)], want: &str) -> bool {
    let Some(bytes) = languages
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(want))
        .map(|(_, bytes)| *bytes)
    else {
        return false;
    };
    if bytes > SIGNIFICANT_LANGUAGE_BYTES {
        return true;
    }
    languages.iter().all(|(_, other)| *other <= bytes)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
