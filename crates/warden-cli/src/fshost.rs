//! Filesystem snapshot host: serves an `<org>/<repo>/` directory tree
//! through the same collaborator traits a live platform client would
//! implement, so policies can be evaluated against checked-out fixtures.
//!
//! Layout per organization directory:
//!
//! ```text
//! <root>/<org>/org.yml                installation metadata
//! <root>/<org>/warden.yml             org-level policy config
//! <root>/<org>/.config/warden.yml     fallback location for the above
//! <root>/<org>/<repo>/repo.yml        repository manifest (history, runs)
//! <root>/<org>/<repo>/warden.yml      repo-level override layer
//! <root>/<org>/<repo>/workflows/*.yml workflow files
//! ```

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use warden_core::config::{parse_or_default, ActionConfig, ActionConfigOverlay};
use warden_core::error::{Result, WardenError};
use warden_core::provider::{ConfigFetcher, RepoIntrospection, WorkflowRun};
use warden_core::types::RepoId;
use warden_core::version::{BranchRef, Commit, Release, RepoHistory, TagRef};
use warden_core::workflow::WorkflowFile;
use warden_enforce::directory::{Installation, InstallationDirectory, IssueTracker};
use warden_enforce::memo::OrgConfigMemo;

const ORG_CONFIG_LOCATIONS: [&str; 2] = ["warden.yml", ".config/warden.yml"];
const REVOKED_MARKER: &str = "REVOKED";

// ---------------------------------------------------------------------------
// Snapshot file formats
// ---------------------------------------------------------------------------

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct OrgMeta {
    #[serde(default)]
    installation_id: Option<u64>,
    #[serde(default)]
    suspended: bool,
    #[serde(default = "default_true")]
    bot_enabled: bool,
}

impl Default for OrgMeta {
    fn default() -> Self {
        Self {
            installation_id: None,
            suspended: false,
            bot_enabled: true,
        }
    }
}

/// Repo-level config layer: the override fields plus a local kill switch.
#[derive(Debug, Default, Deserialize)]
struct RepoOverlayFile {
    #[serde(default)]
    disabled: bool,
    #[serde(flatten)]
    overlay: ActionConfigOverlay,
}

#[derive(Debug, Default, Deserialize)]
struct RepoManifest {
    #[serde(default)]
    default_branch_head: Option<String>,
    #[serde(default)]
    languages: BTreeMap<String, u64>,
    #[serde(default)]
    commits: Vec<CommitEntry>,
    #[serde(default)]
    tags: Vec<RefEntry>,
    #[serde(default)]
    branches: Vec<RefEntry>,
    #[serde(default)]
    releases: Vec<ReleaseEntry>,
    #[serde(default)]
    workflow_runs: Vec<RunEntry>,
}

#[derive(Debug, Deserialize)]
struct CommitEntry {
    sha: String,
    #[serde(default)]
    parents: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RefEntry {
    name: String,
    sha: String,
}

#[derive(Debug, Deserialize)]
struct ReleaseEntry {
    tag: String,
    sha: String,
}

fn default_event() -> String {
    "push".to_string()
}

#[derive(Debug, Deserialize)]
struct RunEntry {
    workflow: String,
    #[serde(default = "default_event")]
    event: String,
    #[serde(flatten)]
    run: WorkflowRun,
}

// ---------------------------------------------------------------------------
// FsHost
// ---------------------------------------------------------------------------

pub struct FsHost {
    root: PathBuf,
    memo: Arc<OrgConfigMemo>,
}

impl FsHost {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            memo: Arc::new(OrgConfigMemo::new()),
        }
    }

    pub fn memo(&self) -> Arc<OrgConfigMemo> {
        Arc::clone(&self.memo)
    }

    fn repo_dir(&self, repo: &RepoId) -> PathBuf {
        self.root.join(&repo.owner).join(&repo.name)
    }

    fn read_opt(path: &Path) -> Option<String> {
        match fs::read_to_string(path) {
            Ok(text) => Some(text),
            Err(err) => {
                tracing::debug!(path = %path.display(), %err, "no readable file");
                None
            }
        }
    }

    /// Locate and read the org-level config, memoizing the location for
    /// the remainder of the installation pass. An empty memo entry records
    /// a probed-and-absent org.
    fn org_config_text(&self, org: &str) -> Option<String> {
        if let Some(location) = self.memo.get(org) {
            if location.is_empty() {
                return None;
            }
            return Self::read_opt(&self.root.join(org).join(&location));
        }
        for location in ORG_CONFIG_LOCATIONS {
            let path = self.root.join(org).join(location);
            if let Some(text) = Self::read_opt(&path) {
                self.memo.put(org, location);
                return Some(text);
            }
        }
        self.memo.put(org, "");
        None
    }

    fn org_meta(&self, org: &str) -> OrgMeta {
        parse_or_default(
            Self::read_opt(&self.root.join(org).join("org.yml")).as_deref(),
            "org metadata",
        )
    }

    fn repo_overlay(&self, repo: &RepoId) -> RepoOverlayFile {
        parse_or_default(
            Self::read_opt(&self.repo_dir(repo).join("warden.yml")).as_deref(),
            "repo config",
        )
    }

    fn manifest(&self, repo: &RepoId) -> RepoManifest {
        parse_or_default(
            Self::read_opt(&self.repo_dir(repo).join("repo.yml")).as_deref(),
            "repo manifest",
        )
    }
}

// ---------------------------------------------------------------------------
// ConfigFetcher
// ---------------------------------------------------------------------------

#[async_trait]
impl ConfigFetcher for FsHost {
    async fn action_config(&self, repo: &RepoId) -> ActionConfig {
        let org_layer: ActionConfigOverlay = parse_or_default(
            self.org_config_text(&repo.owner).as_deref(),
            "org action config",
        );
        let repo_layer = self.repo_overlay(repo).overlay;
        ActionConfig::resolve(&[org_layer, repo_layer])
    }

    async fn is_bot_enabled(&self, repo: &RepoId) -> Result<bool> {
        Ok(self.org_meta(&repo.owner).bot_enabled)
    }

    async fn is_policy_enabled(&self, repo: &RepoId, _policy: &str) -> Result<bool> {
        Ok(!self.repo_overlay(repo).disabled)
    }
}

// ---------------------------------------------------------------------------
// RepoIntrospection
// ---------------------------------------------------------------------------

#[async_trait]
impl RepoIntrospection for FsHost {
    async fn list_workflow_files(&self, repo: &RepoId) -> Result<Vec<WorkflowFile>> {
        let dir = self.repo_dir(repo).join("workflows");
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(_) => return Ok(Vec::new()),
        };
        let mut files = Vec::new();
        for entry in entries {
            let path = entry?.path();
            let is_yaml = path
                .extension()
                .is_some_and(|ext| ext == "yml" || ext == "yaml");
            if !is_yaml {
                continue;
            }
            let filename = match path.file_name().and_then(|n| n.to_str()) {
                Some(name) => name.to_string(),
                None => continue,
            };
            let content = fs::read_to_string(&path)?;
            files.push(WorkflowFile { filename, content });
        }
        files.sort_by(|a, b| a.filename.cmp(&b.filename));
        Ok(files)
    }

    async fn list_languages(&self, repo: &RepoId) -> Result<Vec<(String, u64)>> {
        Ok(self.manifest(repo).languages.into_iter().collect())
    }

    async fn repo_history(&self, repo: &RepoId) -> Result<RepoHistory> {
        let manifest = self.manifest(repo);
        Ok(RepoHistory {
            commits: manifest
                .commits
                .into_iter()
                .map(|c| Commit {
                    sha: c.sha,
                    parents: c.parents,
                })
                .collect(),
            tags: manifest
                .tags
                .into_iter()
                .map(|t| TagRef {
                    name: t.name,
                    sha: t.sha,
                })
                .collect(),
            branches: manifest
                .branches
                .into_iter()
                .map(|b| BranchRef {
                    name: b.name,
                    sha: b.sha,
                })
                .collect(),
        })
    }

    async fn list_releases(&self, repo: &RepoId) -> Result<Vec<Release>> {
        Ok(self
            .manifest(repo)
            .releases
            .into_iter()
            .map(|r| Release {
                tag: r.tag,
                sha: r.sha,
            })
            .collect())
    }

    async fn list_workflow_runs(
        &self,
        repo: &RepoId,
        workflow_filename: &str,
        event: &str,
    ) -> Result<Vec<WorkflowRun>> {
        Ok(self
            .manifest(repo)
            .workflow_runs
            .into_iter()
            .filter(|entry| entry.workflow == workflow_filename && entry.event == event)
            .map(|entry| entry.run)
            .collect())
    }

    async fn default_branch_head(&self, repo: &RepoId) -> Result<String> {
        self.manifest(repo)
            .default_branch_head
            .ok_or_else(|| WardenError::Api(format!("{repo}: manifest has no default_branch_head")))
    }
}

// ---------------------------------------------------------------------------
// InstallationDirectory
// ---------------------------------------------------------------------------

#[async_trait]
impl InstallationDirectory for FsHost {
    async fn list_installations(&self) -> Result<Vec<Installation>> {
        let mut orgs = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if !name.starts_with('.') {
                    orgs.push(name.to_string());
                }
            }
        }
        orgs.sort();
        Ok(orgs
            .into_iter()
            .enumerate()
            .map(|(idx, org)| {
                let meta = self.org_meta(&org);
                Installation {
                    id: meta.installation_id.unwrap_or(idx as u64 + 1),
                    org,
                    suspended: meta.suspended,
                }
            })
            .collect())
    }

    async fn list_repositories(&self, installation: &Installation) -> Result<Vec<RepoId>> {
        let org_dir = self.root.join(&installation.org);
        let mut repos = Vec::new();
        for entry in fs::read_dir(&org_dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = match entry.file_name().to_str() {
                Some(name) if !name.starts_with('.') => name.to_string(),
                _ => continue,
            };
            if entry.path().join(REVOKED_MARKER).exists() {
                continue;
            }
            repos.push(RepoId::new(&installation.org, name));
        }
        repos.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(repos)
    }

    async fn revoke_repository(&self, _installation: &Installation, repo: &RepoId) -> Result<()> {
        let marker = self.repo_dir(repo).join(REVOKED_MARKER);
        fs::write(&marker, "access revoked by allow-list\n")?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// IssueTracker
// ---------------------------------------------------------------------------

#[async_trait]
impl IssueTracker for FsHost {
    async fn ensure(&self, repo: &RepoId, policy: &str, body: &str) -> Result<()> {
        let dir = self.repo_dir(repo).join("issues");
        fs::create_dir_all(&dir)?;
        let path = dir.join(format!("warden-{policy}.md"));
        fs::write(&path, body)?;
        tracing::info!(%repo, policy, path = %path.display(), "tracking issue recorded");
        Ok(())
    }

    async fn close(&self, repo: &RepoId, policy: &str) -> Result<()> {
        let path = self
            .repo_dir(repo)
            .join("issues")
            .join(format!("warden-{policy}.md"));
        if path.exists() {
            fs::remove_file(&path)?;
            tracing::info!(%repo, policy, "tracking issue closed");
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
