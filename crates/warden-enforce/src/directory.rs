use async_trait::async_trait;
use globset::{Glob, GlobMatcher};
use warden_core::error::{Result, WardenError};
use warden_core::types::RepoId;

// ---------------------------------------------------------------------------
// Installation directory
// ---------------------------------------------------------------------------

/// One installation of the bot, scoped to an organization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Installation {
    pub id: u64,
    pub org: String,
    pub suspended: bool,
}

#[async_trait]
pub trait InstallationDirectory: Send + Sync {
    async fn list_installations(&self) -> Result<Vec<Installation>>;

    /// Repositories accessible to one installation.
    async fn list_repositories(&self, installation: &Installation) -> Result<Vec<RepoId>>;

    /// Revoke the installation's access to a repository that failed the
    /// allow-list.
    async fn revoke_repository(&self, installation: &Installation, repo: &RepoId) -> Result<()>;
}

// ---------------------------------------------------------------------------
// Issue bookkeeping
// ---------------------------------------------------------------------------

#[async_trait]
pub trait IssueTracker: Send + Sync {
    /// Create, reopen, or comment on the tracking issue for a failing
    /// policy. Idempotent per polling interval.
    async fn ensure(&self, repo: &RepoId, policy: &str, body: &str) -> Result<()>;

    /// Close the tracking issue; a no-op when none is open.
    async fn close(&self, repo: &RepoId, policy: &str) -> Result<()>;
}

// ---------------------------------------------------------------------------
// Repository allow-list
// ---------------------------------------------------------------------------

/// Name globs limiting which repositories the bot operates on. An empty
/// list is fail-open: everything passes through unfiltered.
#[derive(Debug, Default)]
pub struct RepoAllowList {
    matchers: Vec<GlobMatcher>,
}

impl RepoAllowList {
    pub fn new(patterns: &[String]) -> Result<Self> {
        let mut matchers = Vec::with_capacity(patterns.len());
        for pattern in patterns {
            let matcher = Glob::new(pattern)
                .map_err(|err| WardenError::Pattern {
                    pattern: pattern.clone(),
                    reason: err.to_string(),
                })?
                .compile_matcher();
            matchers.push(matcher);
        }
        Ok(Self { matchers })
    }

    pub fn allows(&self, repo: &RepoId) -> bool {
        self.matchers.is_empty() || self.matchers.iter().any(|m| m.is_match(&repo.name))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
