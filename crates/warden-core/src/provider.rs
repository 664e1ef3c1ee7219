use crate::config::ActionConfig;
use crate::error::Result;
use crate::types::RepoId;
use crate::version::{Release, RepoHistory};
use crate::workflow::WorkflowFile;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Workflow runs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Queued,
    InProgress,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunConclusion {
    Success,
    Failure,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowRun {
    pub head_sha: String,
    pub status: RunStatus,
    #[serde(default)]
    pub conclusion: Option<RunConclusion>,
    pub created_at: DateTime<Utc>,
}

impl WorkflowRun {
    /// A run counts toward `must_pass` when it succeeded on the commit, or
    /// is still queued/in progress there (provisionally satisfying: wait,
    /// don't fail yet).
    pub fn satisfies_on(&self, head_sha: &str) -> bool {
        if self.head_sha != head_sha {
            return false;
        }
        match self.status {
            RunStatus::Completed => matches!(self.conclusion, Some(RunConclusion::Success)),
            RunStatus::Queued | RunStatus::InProgress => true,
        }
    }
}

// ---------------------------------------------------------------------------
// Collaborator traits
// ---------------------------------------------------------------------------

/// Layered config access. Config problems degrade to defaults inside the
/// fetcher; only transport-level enablement lookups can error.
#[async_trait]
pub trait ConfigFetcher: Send + Sync {
    /// The merged org → org-repo → repo action-policy configuration.
    async fn action_config(&self, repo: &RepoId) -> ActionConfig;

    /// Whether the bot is enabled for this repository at all.
    async fn is_bot_enabled(&self, repo: &RepoId) -> Result<bool>;

    /// Whether one named policy is enabled for this repository.
    async fn is_policy_enabled(&self, repo: &RepoId, policy: &str) -> Result<bool>;
}

/// Read-only repository introspection. Every method is a blocking platform
/// call behind the scenes and must return promptly on cancellation.
#[async_trait]
pub trait RepoIntrospection: Send + Sync {
    /// Workflow files under the fixed `.github/workflows/` convention.
    async fn list_workflow_files(&self, repo: &RepoId) -> Result<Vec<WorkflowFile>>;

    /// Languages with byte counts.
    async fn list_languages(&self, repo: &RepoId) -> Result<Vec<(String, u64)>>;

    /// Commit, tag, and branch lists for constraint resolution.
    async fn repo_history(&self, repo: &RepoId) -> Result<RepoHistory>;

    async fn list_releases(&self, repo: &RepoId) -> Result<Vec<Release>>;

    /// Run history for one workflow file, filtered by trigger event.
    async fn list_workflow_runs(
        &self,
        repo: &RepoId,
        workflow_filename: &str,
        event: &str,
    ) -> Result<Vec<WorkflowRun>>;

    async fn default_branch_head(&self, repo: &RepoId) -> Result<String>;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
