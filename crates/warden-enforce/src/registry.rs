use async_trait::async_trait;
use std::sync::Arc;
use warden_core::config::EnforcementAction;
use warden_core::error::Result;
use warden_core::policy::{ActionPolicy, POLICY_NAME};
use warden_core::provider::{ConfigFetcher, RepoIntrospection};
use warden_core::types::RepoId;

// ---------------------------------------------------------------------------
// Policy trait
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyOutcome {
    pub passed: bool,
    pub explanation: String,
}

/// One compliance policy as seen by the orchestrator. Implementations close
/// over their own collaborators; the orchestrator calls the same operations
/// uniformly across the registered set.
#[async_trait]
pub trait Policy: Send + Sync {
    fn name(&self) -> &str;

    /// Whether this policy runs for the repository. Errors abort the
    /// repository's whole policy run.
    async fn is_enabled(&self, repo: &RepoId) -> Result<bool> {
        let _ = repo;
        Ok(true)
    }

    async fn check(&self, repo: &RepoId) -> Result<PolicyOutcome>;

    async fn fix(&self, repo: &RepoId) -> Result<()>;

    /// The configured enforcement action for this repository.
    async fn action(&self, repo: &RepoId) -> EnforcementAction;

    /// When true, a disabled repository/policy pair is skipped entirely:
    /// no check, no recorded result, no side effects.
    fn do_nothing_on_opt_out(&self) -> bool {
        false
    }
}

// ---------------------------------------------------------------------------
// PolicyRegistry
// ---------------------------------------------------------------------------

/// The closed set of policies evaluated per repository, in registration
/// order.
#[derive(Default)]
pub struct PolicyRegistry {
    policies: Vec<Box<dyn Policy>>,
}

impl PolicyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, policy: Box<dyn Policy>) {
        self.policies.push(policy);
    }

    pub fn policies(&self) -> &[Box<dyn Policy>] {
        &self.policies
    }
}

// ---------------------------------------------------------------------------
// ActionPolicyHandle
// ---------------------------------------------------------------------------

/// The action policy wired to its collaborators for registry use.
pub struct ActionPolicyHandle {
    policy: ActionPolicy,
    config: Arc<dyn ConfigFetcher>,
    introspection: Arc<dyn RepoIntrospection>,
    do_nothing_on_opt_out: bool,
}

impl ActionPolicyHandle {
    pub fn new(config: Arc<dyn ConfigFetcher>, introspection: Arc<dyn RepoIntrospection>) -> Self {
        Self {
            policy: ActionPolicy::new(),
            config,
            introspection,
            do_nothing_on_opt_out: false,
        }
    }

    pub fn with_do_nothing_on_opt_out(mut self, value: bool) -> Self {
        self.do_nothing_on_opt_out = value;
        self
    }
}

#[async_trait]
impl Policy for ActionPolicyHandle {
    fn name(&self) -> &str {
        POLICY_NAME
    }

    async fn is_enabled(&self, repo: &RepoId) -> Result<bool> {
        self.config.is_policy_enabled(repo, POLICY_NAME).await
    }

    async fn check(&self, repo: &RepoId) -> Result<PolicyOutcome> {
        let result = self
            .policy
            .check(repo, self.config.as_ref(), self.introspection.as_ref())
            .await?;
        Ok(PolicyOutcome {
            passed: result.passed,
            explanation: result.explanation,
        })
    }

    async fn fix(&self, repo: &RepoId) -> Result<()> {
        self.policy.fix(repo).await
    }

    async fn action(&self, repo: &RepoId) -> EnforcementAction {
        self.config.action_config(repo).await.action
    }

    fn do_nothing_on_opt_out(&self) -> bool {
        self.do_nothing_on_opt_out
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
