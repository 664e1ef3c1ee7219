//! In-memory fake host used across module tests.

use crate::config::ActionConfig;
use crate::error::{Result, WardenError};
use crate::provider::{ConfigFetcher, RepoIntrospection, WorkflowRun};
use crate::types::{ActionUse, RepoId};
use crate::version::{BranchRef, Commit, Release, RepoHistory, TagRef};
use crate::workflow::WorkflowFile;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};

pub fn action_use(name: &str, version_ref: &str) -> ActionUse {
    ActionUse {
        name: name.to_string(),
        version_ref: version_ref.to_string(),
        workflow_filename: "ci.yml".to_string(),
        workflow_name: "CI".to_string(),
        trigger_events: vec!["push".to_string(), "pull_request".to_string()],
    }
}

fn repo_id(slug: &str) -> RepoId {
    let (owner, name) = slug.split_once('/').expect("owner/name slug");
    RepoId::new(owner, name)
}

#[derive(Default)]
pub struct FakeHost {
    pub configs: HashMap<RepoId, ActionConfig>,
    pub workflows: HashMap<RepoId, Vec<WorkflowFile>>,
    pub languages: HashMap<RepoId, Vec<(String, u64)>>,
    pub histories: HashMap<RepoId, RepoHistory>,
    pub releases: HashMap<RepoId, Vec<Release>>,
    pub runs: HashMap<(RepoId, String, String), Vec<WorkflowRun>>,
    pub heads: HashMap<RepoId, String>,
    pub failing: HashSet<RepoId>,
}

impl FakeHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_config(&mut self, slug: &str, config: ActionConfig) {
        self.configs.insert(repo_id(slug), config);
    }

    pub fn set_workflow(&mut self, slug: &str, filename: &str, content: &str) {
        self.workflows.entry(repo_id(slug)).or_default().push(WorkflowFile {
            filename: filename.to_string(),
            content: content.to_string(),
        });
    }

    pub fn set_languages(&mut self, slug: &str, languages: &[(&str, u64)]) {
        self.languages.insert(
            repo_id(slug),
            languages.iter().map(|(n, b)| (n.to_string(), *b)).collect(),
        );
    }

    pub fn add_linear_history(&mut self, slug: &str, shas: &[&str]) {
        let history = self.histories.entry(repo_id(slug)).or_default();
        let mut parent: Option<String> = None;
        for sha in shas {
            history.commits.push(Commit {
                sha: sha.to_string(),
                parents: parent.iter().cloned().collect(),
            });
            parent = Some(sha.to_string());
        }
    }

    pub fn tag(&mut self, slug: &str, name: &str, sha: &str) {
        self.histories.entry(repo_id(slug)).or_default().tags.push(TagRef {
            name: name.to_string(),
            sha: sha.to_string(),
        });
    }

    pub fn branch(&mut self, slug: &str, name: &str, sha: &str) {
        self.histories.entry(repo_id(slug)).or_default().branches.push(BranchRef {
            name: name.to_string(),
            sha: sha.to_string(),
        });
    }

    pub fn add_release(&mut self, slug: &str, tag: &str, sha: &str) {
        self.releases.entry(repo_id(slug)).or_default().push(Release {
            tag: tag.to_string(),
            sha: sha.to_string(),
        });
    }

    pub fn add_run(&mut self, slug: &str, filename: &str, event: &str, run: WorkflowRun) {
        self.runs
            .entry((repo_id(slug), filename.to_string(), event.to_string()))
            .or_default()
            .push(run);
    }

    pub fn set_head(&mut self, slug: &str, sha: &str) {
        self.heads.insert(repo_id(slug), sha.to_string());
    }

    pub fn fail_repo(&mut self, slug: &str) {
        self.failing.insert(repo_id(slug));
    }

    fn check_failing(&self, repo: &RepoId) -> Result<()> {
        if self.failing.contains(repo) {
            return Err(WardenError::Api(format!("injected failure for {repo}")));
        }
        Ok(())
    }
}

#[async_trait]
impl RepoIntrospection for FakeHost {
    async fn list_workflow_files(&self, repo: &RepoId) -> Result<Vec<WorkflowFile>> {
        self.check_failing(repo)?;
        Ok(self.workflows.get(repo).cloned().unwrap_or_default())
    }

    async fn list_languages(&self, repo: &RepoId) -> Result<Vec<(String, u64)>> {
        self.check_failing(repo)?;
        Ok(self.languages.get(repo).cloned().unwrap_or_default())
    }

    async fn repo_history(&self, repo: &RepoId) -> Result<RepoHistory> {
        self.check_failing(repo)?;
        Ok(self.histories.get(repo).cloned().unwrap_or_default())
    }

    async fn list_releases(&self, repo: &RepoId) -> Result<Vec<Release>> {
        self.check_failing(repo)?;
        Ok(self.releases.get(repo).cloned().unwrap_or_default())
    }

    async fn list_workflow_runs(
        &self,
        repo: &RepoId,
        workflow_filename: &str,
        event: &str,
    ) -> Result<Vec<WorkflowRun>> {
        self.check_failing(repo)?;
        let key = (repo.clone(), workflow_filename.to_string(), event.to_string());
        Ok(self.runs.get(&key).cloned().unwrap_or_default())
    }

    async fn default_branch_head(&self, repo: &RepoId) -> Result<String> {
        self.check_failing(repo)?;
        self.heads
            .get(repo)
            .cloned()
            .ok_or_else(|| WardenError::Api(format!("no default branch head for {repo}")))
    }
}

#[async_trait]
impl ConfigFetcher for FakeHost {
    async fn action_config(&self, repo: &RepoId) -> ActionConfig {
        let mut config = self.configs.get(repo).cloned().unwrap_or_default();
        config.link_groups();
        config
    }

    async fn is_bot_enabled(&self, _repo: &RepoId) -> Result<bool> {
        Ok(true)
    }

    async fn is_policy_enabled(&self, _repo: &RepoId, _policy: &str) -> Result<bool> {
        Ok(true)
    }
}
