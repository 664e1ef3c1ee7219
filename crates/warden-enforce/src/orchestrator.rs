use crate::directory::{Installation, InstallationDirectory, IssueTracker, RepoAllowList};
use crate::memo::OrgConfigMemo;
use crate::registry::PolicyRegistry;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{watch, Semaphore};
use warden_core::config::EnforcementAction;
use warden_core::error::Result;
use warden_core::provider::ConfigFetcher;
use warden_core::types::RepoId;

/// Upper bound on installations processed concurrently.
pub const DEFAULT_CONCURRENT_INSTALLATIONS: usize = 5;

/// Resolves once `shutdown` is signaled. A dropped sender means no signal
/// can ever arrive, so the future pends forever rather than resolving.
async fn wait_shutdown(mut shutdown: watch::Receiver<bool>) {
    if shutdown.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Per-repository outcome of one policy run: policy name → passed.
pub type EnforceRepoResult = BTreeMap<String, bool>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PolicyTotals {
    pub total_failed: usize,
}

/// Run-level aggregate across all scanned repositories. Policies that
/// never failed have no entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EnforceAllResult {
    pub policies: BTreeMap<String, PolicyTotals>,
}

// ---------------------------------------------------------------------------
// Enforcer
// ---------------------------------------------------------------------------

pub struct Enforcer {
    registry: PolicyRegistry,
    directory: Arc<dyn InstallationDirectory>,
    issues: Arc<dyn IssueTracker>,
    config: Arc<dyn ConfigFetcher>,
    memo: Arc<OrgConfigMemo>,
    allow_list: RepoAllowList,
    max_concurrent_installations: usize,
    policy_filter: Option<String>,
}

impl Enforcer {
    pub fn new(
        registry: PolicyRegistry,
        directory: Arc<dyn InstallationDirectory>,
        issues: Arc<dyn IssueTracker>,
        config: Arc<dyn ConfigFetcher>,
        memo: Arc<OrgConfigMemo>,
    ) -> Self {
        Self {
            registry,
            directory,
            issues,
            config,
            memo,
            allow_list: RepoAllowList::default(),
            max_concurrent_installations: DEFAULT_CONCURRENT_INSTALLATIONS,
            policy_filter: None,
        }
    }

    pub fn with_allow_list(mut self, allow_list: RepoAllowList) -> Self {
        self.allow_list = allow_list;
        self
    }

    pub fn with_concurrency(mut self, max: usize) -> Self {
        self.max_concurrent_installations = max.max(1);
        self
    }

    /// Restrict evaluation to one named policy.
    pub fn with_policy_filter(mut self, policy: Option<String>) -> Self {
        self.policy_filter = policy;
        self
    }

    // -----------------------------------------------------------------------
    // Per-repository policy run
    // -----------------------------------------------------------------------

    /// Run the registered policy set against one repository. The first
    /// check/fix/issue error aborts the remaining policies for this
    /// repository and propagates.
    pub async fn run_policies(&self, repo: &RepoId) -> Result<EnforceRepoResult> {
        let bot_enabled = self.config.is_bot_enabled(repo).await?;
        let mut results = EnforceRepoResult::new();

        for policy in self.registry.policies() {
            let enabled = policy.is_enabled(repo).await?;
            if let Some(filter) = &self.policy_filter {
                if policy.name() != filter {
                    continue;
                }
            }
            if !(enabled && bot_enabled) && policy.do_nothing_on_opt_out() {
                tracing::debug!(%repo, policy = policy.name(), "opted out, skipping entirely");
                continue;
            }

            let outcome = policy.check(repo).await?;
            results.insert(policy.name().to_string(), outcome.passed);

            // Opted-out repositories are still evaluated and recorded, but
            // never acted on.
            if !(enabled && bot_enabled) {
                continue;
            }
            let action = policy.action(repo).await;
            if outcome.passed {
                if matches!(action, EnforcementAction::Issue | EnforcementAction::Fix) {
                    self.issues.close(repo, policy.name()).await?;
                }
                continue;
            }
            tracing::info!(%repo, policy = policy.name(), action = action.as_str(),
                "policy failed");
            match action {
                EnforcementAction::Log => {}
                EnforcementAction::Issue => {
                    self.issues.ensure(repo, policy.name(), &outcome.explanation).await?;
                }
                EnforcementAction::Fix => policy.fix(repo).await?,
            }
        }
        Ok(results)
    }

    // -----------------------------------------------------------------------
    // Installation fan-out
    // -----------------------------------------------------------------------

    /// One reconciliation pass over every installation. Installations run
    /// concurrently under the semaphore bound; repositories within an
    /// installation run sequentially. A failing installation is logged and
    /// contributes nothing to the aggregate.
    pub async fn enforce_all(self: &Arc<Self>) -> Result<EnforceAllResult> {
        // Sender held across the pass so the receiver never fires.
        let (_hold, never) = watch::channel(false);
        self.enforce_all_until(never).await
    }

    /// Like `enforce_all`, but once `shutdown` is signaled no further
    /// installation tasks start and in-flight installations are abandoned
    /// at their next await point.
    pub async fn enforce_all_until(
        self: &Arc<Self>,
        shutdown: watch::Receiver<bool>,
    ) -> Result<EnforceAllResult> {
        let installations = self.directory.list_installations().await?;
        let totals: Arc<Mutex<BTreeMap<String, usize>>> = Arc::new(Mutex::new(BTreeMap::new()));
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent_installations));

        let mut handles = Vec::new();
        for installation in installations {
            if *shutdown.borrow() {
                tracing::info!("shutdown observed, not starting further installations");
                break;
            }
            if installation.suspended {
                tracing::info!(org = %installation.org, "skipping suspended installation");
                continue;
            }
            let enforcer = Arc::clone(self);
            let semaphore = Arc::clone(&semaphore);
            let totals = Arc::clone(&totals);
            let shutdown = shutdown.clone();
            handles.push(tokio::spawn(async move {
                let org = installation.org.clone();
                tokio::select! {
                    _ = async {
                        let _permit = match semaphore.acquire().await {
                            Ok(permit) => permit,
                            Err(_) => return,
                        };
                        if let Err(err) =
                            enforcer.enforce_installation(&installation, &totals).await
                        {
                            tracing::error!(org = %installation.org, %err,
                                "dropping installation from this run");
                        }
                        enforcer.memo.clear(&installation.org);
                    } => {}
                    _ = wait_shutdown(shutdown) => {
                        tracing::info!(%org, "shutdown observed, abandoning installation");
                    }
                }
            }));
        }
        for handle in handles {
            if let Err(err) = handle.await {
                tracing::error!(%err, "installation task panicked");
            }
        }

        let totals = totals.lock().unwrap();
        let policies = totals
            .iter()
            .map(|(name, &total_failed)| (name.clone(), PolicyTotals { total_failed }))
            .collect();
        Ok(EnforceAllResult { policies })
    }

    async fn enforce_installation(
        &self,
        installation: &Installation,
        totals: &Mutex<BTreeMap<String, usize>>,
    ) -> Result<()> {
        let repos = self.directory.list_repositories(installation).await?;
        for repo in repos {
            if !self.allow_list.allows(&repo) {
                tracing::warn!(%repo, org = %installation.org,
                    "repository not in allow-list, revoking installation access");
                if let Err(err) = self.directory.revoke_repository(installation, &repo).await {
                    tracing::error!(%repo, %err, "revocation failed");
                }
                continue;
            }
            match self.run_policies(&repo).await {
                Ok(results) => {
                    let mut totals = totals.lock().unwrap();
                    for (policy, passed) in &results {
                        if !passed {
                            *totals.entry(policy.clone()).or_default() += 1;
                        }
                    }
                }
                Err(err) => {
                    tracing::error!(%repo, %err,
                        "policy run failed, continuing with next repository");
                }
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Reconciliation job
    // -----------------------------------------------------------------------

    /// Run `enforce_all` in a loop, sleeping `interval` between passes.
    /// Returns promptly once `shutdown` fires, including mid-sleep and
    /// mid-pass.
    pub async fn enforce_job(self: Arc<Self>, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        loop {
            if *shutdown.borrow() {
                return;
            }
            tokio::select! {
                result = self.enforce_all_until(shutdown.clone()) => match result {
                    Ok(result) => {
                        tracing::info!(failed_policies = result.policies.len(),
                            "reconciliation pass complete");
                    }
                    Err(err) => tracing::error!(%err, "reconciliation pass failed"),
                },
                _ = shutdown.changed() => {
                    tracing::info!("enforce loop shutting down mid-pass");
                    return;
                }
            }
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = shutdown.changed() => {
                    tracing::info!("enforce loop shutting down");
                    return;
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{Policy, PolicyOutcome};
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use warden_core::config::ActionConfig;
    use warden_core::error::WardenError;

    // -----------------------------------------------------------------------
    // Fakes
    // -----------------------------------------------------------------------

    #[derive(Default)]
    struct FakeDirectory {
        installations: Vec<Installation>,
        repos: Mutex<BTreeMap<u64, Vec<RepoId>>>,
        list_calls: Mutex<Vec<u64>>,
        revoked: Mutex<Vec<RepoId>>,
    }

    impl FakeDirectory {
        fn add(&mut self, id: u64, org: &str, suspended: bool, repos: &[&str]) {
            self.installations.push(Installation {
                id,
                org: org.to_string(),
                suspended,
            });
            self.repos.lock().unwrap().insert(
                id,
                repos.iter().map(|name| RepoId::new(org, *name)).collect(),
            );
        }
    }

    #[async_trait]
    impl InstallationDirectory for FakeDirectory {
        async fn list_installations(&self) -> Result<Vec<Installation>> {
            Ok(self.installations.clone())
        }

        async fn list_repositories(&self, installation: &Installation) -> Result<Vec<RepoId>> {
            self.list_calls.lock().unwrap().push(installation.id);
            if installation.org == "broken-org" {
                return Err(WardenError::Api("cannot list repositories".into()));
            }
            Ok(self
                .repos
                .lock()
                .unwrap()
                .get(&installation.id)
                .cloned()
                .unwrap_or_default())
        }

        async fn revoke_repository(
            &self,
            _installation: &Installation,
            repo: &RepoId,
        ) -> Result<()> {
            self.revoked.lock().unwrap().push(repo.clone());
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeIssues {
        ensured: Mutex<Vec<(RepoId, String)>>,
        closed: Mutex<Vec<(RepoId, String)>>,
    }

    #[async_trait]
    impl IssueTracker for FakeIssues {
        async fn ensure(&self, repo: &RepoId, policy: &str, _body: &str) -> Result<()> {
            self.ensured.lock().unwrap().push((repo.clone(), policy.to_string()));
            Ok(())
        }

        async fn close(&self, repo: &RepoId, policy: &str) -> Result<()> {
            self.closed.lock().unwrap().push((repo.clone(), policy.to_string()));
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeConfig {
        bot_disabled: HashSet<RepoId>,
    }

    #[async_trait]
    impl ConfigFetcher for FakeConfig {
        async fn action_config(&self, _repo: &RepoId) -> ActionConfig {
            ActionConfig::default()
        }

        async fn is_bot_enabled(&self, repo: &RepoId) -> Result<bool> {
            Ok(!self.bot_disabled.contains(repo))
        }

        async fn is_policy_enabled(&self, _repo: &RepoId, _policy: &str) -> Result<bool> {
            Ok(true)
        }
    }

    /// Fails on repositories whose name is listed; counts check calls.
    struct StubPolicy {
        name: &'static str,
        fail_on: Vec<&'static str>,
        action: EnforcementAction,
        do_nothing_on_opt_out: bool,
        checks: AtomicUsize,
    }

    impl StubPolicy {
        fn new(name: &'static str, fail_on: &[&'static str]) -> Self {
            Self {
                name,
                fail_on: fail_on.to_vec(),
                action: EnforcementAction::Log,
                do_nothing_on_opt_out: false,
                checks: AtomicUsize::new(0),
            }
        }

        fn with_action(mut self, action: EnforcementAction) -> Self {
            self.action = action;
            self
        }
    }

    #[async_trait]
    impl Policy for StubPolicy {
        fn name(&self) -> &str {
            self.name
        }

        async fn check(&self, repo: &RepoId) -> Result<PolicyOutcome> {
            self.checks.fetch_add(1, Ordering::SeqCst);
            let passed = !self.fail_on.contains(&repo.name.as_str());
            Ok(PolicyOutcome {
                passed,
                explanation: if passed { "OK".into() } else { "failed".into() },
            })
        }

        async fn fix(&self, _repo: &RepoId) -> Result<()> {
            Ok(())
        }

        async fn action(&self, _repo: &RepoId) -> EnforcementAction {
            self.action
        }

        fn do_nothing_on_opt_out(&self) -> bool {
            self.do_nothing_on_opt_out
        }
    }

    fn enforcer_with(registry: PolicyRegistry, directory: FakeDirectory) -> Arc<Enforcer> {
        Arc::new(Enforcer::new(
            registry,
            Arc::new(directory),
            Arc::new(FakeIssues::default()),
            Arc::new(FakeConfig::default()),
            Arc::new(OrgConfigMemo::new()),
        ))
    }

    // -----------------------------------------------------------------------
    // Scenarios
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn aggregate_counts_only_failing_policies() {
        let mut directory = FakeDirectory::default();
        directory.add(1, "acme", false, &["r1", "r2"]);
        let mut registry = PolicyRegistry::new();
        registry.register(Box::new(StubPolicy::new("P", &["r1", "r2"])));
        registry.register(Box::new(StubPolicy::new("Q", &[])));

        let enforcer = enforcer_with(registry, directory);
        let result = enforcer.enforce_all().await.unwrap();
        assert_eq!(result.policies.len(), 1);
        assert_eq!(result.policies["P"].total_failed, 2);
        assert!(!result.policies.contains_key("Q"));
    }

    #[tokio::test]
    async fn suspended_installation_skipped_entirely() {
        let mut directory = FakeDirectory::default();
        directory.add(1, "active", false, &["r1"]);
        directory.add(2, "dormant", true, &["r2"]);
        let directory = Arc::new(directory);
        let mut registry = PolicyRegistry::new();
        registry.register(Box::new(StubPolicy::new("P", &["r2"])));

        let enforcer = Arc::new(Enforcer::new(
            registry,
            directory.clone(),
            Arc::new(FakeIssues::default()),
            Arc::new(FakeConfig::default()),
            Arc::new(OrgConfigMemo::new()),
        ));
        let result = enforcer.enforce_all().await.unwrap();
        assert!(result.policies.is_empty(), "r2 was never evaluated");
        assert_eq!(*directory.list_calls.lock().unwrap(), vec![1]);
    }

    #[tokio::test]
    async fn failing_installation_is_isolated() {
        let mut directory = FakeDirectory::default();
        directory.add(1, "broken-org", false, &[]);
        directory.add(2, "acme", false, &["r1"]);
        let mut registry = PolicyRegistry::new();
        registry.register(Box::new(StubPolicy::new("P", &["r1"])));

        let enforcer = enforcer_with(registry, directory);
        let result = enforcer.enforce_all().await.unwrap();
        assert_eq!(result.policies["P"].total_failed, 1, "healthy installation still counted");
    }

    #[tokio::test]
    async fn allow_list_revokes_disallowed_repositories() {
        let mut directory = FakeDirectory::default();
        directory.add(1, "acme", false, &["auth-service", "website"]);
        let directory = Arc::new(directory);
        let mut registry = PolicyRegistry::new();
        registry.register(Box::new(StubPolicy::new("P", &["website"])));

        let enforcer = Arc::new(
            Enforcer::new(
                registry,
                directory.clone(),
                Arc::new(FakeIssues::default()),
                Arc::new(FakeConfig::default()),
                Arc::new(OrgConfigMemo::new()),
            )
            .with_allow_list(RepoAllowList::new(&["*-service".to_string()]).unwrap()),
        );
        let result = enforcer.enforce_all().await.unwrap();
        // website was revoked, not evaluated; auth-service passed P.
        assert!(result.policies.is_empty());
        assert_eq!(
            *directory.revoked.lock().unwrap(),
            vec![RepoId::new("acme", "website")]
        );
    }

    #[tokio::test]
    async fn issue_action_ensures_and_closes() {
        let mut directory = FakeDirectory::default();
        directory.add(1, "acme", false, &["bad", "good"]);
        let issues = Arc::new(FakeIssues::default());
        let mut registry = PolicyRegistry::new();
        registry.register(Box::new(
            StubPolicy::new("P", &["bad"]).with_action(EnforcementAction::Issue),
        ));

        let enforcer = Arc::new(Enforcer::new(
            registry,
            Arc::new(directory),
            issues.clone(),
            Arc::new(FakeConfig::default()),
            Arc::new(OrgConfigMemo::new()),
        ));
        enforcer.enforce_all().await.unwrap();
        assert_eq!(
            *issues.ensured.lock().unwrap(),
            vec![(RepoId::new("acme", "bad"), "P".to_string())]
        );
        assert_eq!(
            *issues.closed.lock().unwrap(),
            vec![(RepoId::new("acme", "good"), "P".to_string())]
        );
    }

    #[tokio::test]
    async fn policy_filter_limits_evaluation() {
        let mut directory = FakeDirectory::default();
        directory.add(1, "acme", false, &["r1"]);
        let mut registry = PolicyRegistry::new();
        registry.register(Box::new(StubPolicy::new("P", &["r1"])));
        registry.register(Box::new(StubPolicy::new("Q", &["r1"])));

        let enforcer = Arc::new(
            Enforcer::new(
                registry,
                Arc::new(directory),
                Arc::new(FakeIssues::default()),
                Arc::new(FakeConfig::default()),
                Arc::new(OrgConfigMemo::new()),
            )
            .with_policy_filter(Some("Q".to_string())),
        );
        let result = enforcer.enforce_all().await.unwrap();
        assert!(!result.policies.contains_key("P"));
        assert_eq!(result.policies["Q"].total_failed, 1);
    }

    #[tokio::test]
    async fn opt_out_skips_policy_without_side_effects() {
        let mut bot_disabled = HashSet::new();
        bot_disabled.insert(RepoId::new("acme", "r1"));
        let config = Arc::new(FakeConfig { bot_disabled });

        let mut directory = FakeDirectory::default();
        directory.add(1, "acme", false, &["r1"]);
        let issues = Arc::new(FakeIssues::default());
        let mut registry = PolicyRegistry::new();
        let mut policy = StubPolicy::new("P", &["r1"]).with_action(EnforcementAction::Issue);
        policy.do_nothing_on_opt_out = true;
        registry.register(Box::new(policy));

        let enforcer = Arc::new(Enforcer::new(
            registry,
            Arc::new(directory),
            issues.clone(),
            config,
            Arc::new(OrgConfigMemo::new()),
        ));
        let result = enforcer.enforce_all().await.unwrap();
        assert!(result.policies.is_empty(), "no result recorded for skipped policy");
        assert!(issues.ensured.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn opted_out_repo_is_recorded_but_not_acted_on() {
        let mut bot_disabled = HashSet::new();
        bot_disabled.insert(RepoId::new("acme", "r1"));
        let config = Arc::new(FakeConfig { bot_disabled });

        let mut directory = FakeDirectory::default();
        directory.add(1, "acme", false, &["r1"]);
        let issues = Arc::new(FakeIssues::default());
        let mut registry = PolicyRegistry::new();
        registry.register(Box::new(
            StubPolicy::new("P", &["r1"]).with_action(EnforcementAction::Issue),
        ));

        let enforcer = Arc::new(Enforcer::new(
            registry,
            Arc::new(directory),
            issues.clone(),
            config,
            Arc::new(OrgConfigMemo::new()),
        ));
        let result = enforcer.enforce_all().await.unwrap();
        assert_eq!(result.policies["P"].total_failed, 1, "failure still counted");
        assert!(issues.ensured.lock().unwrap().is_empty(), "no issue for opted-out repo");
    }

    #[tokio::test]
    async fn memo_cleared_after_installation() {
        let mut directory = FakeDirectory::default();
        directory.add(1, "acme", false, &["r1"]);
        let memo = Arc::new(OrgConfigMemo::new());
        memo.put("acme", "warden.yml");
        let mut registry = PolicyRegistry::new();
        registry.register(Box::new(StubPolicy::new("P", &[])));

        let enforcer = Arc::new(Enforcer::new(
            registry,
            Arc::new(directory),
            Arc::new(FakeIssues::default()),
            Arc::new(FakeConfig::default()),
            memo.clone(),
        ));
        enforcer.enforce_all().await.unwrap();
        assert_eq!(memo.get("acme"), None);
    }

    /// Directory whose repository listing never returns promptly.
    struct SlowDirectory {
        installations: Vec<Installation>,
    }

    #[async_trait]
    impl InstallationDirectory for SlowDirectory {
        async fn list_installations(&self) -> Result<Vec<Installation>> {
            Ok(self.installations.clone())
        }

        async fn list_repositories(&self, _installation: &Installation) -> Result<Vec<RepoId>> {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(Vec::new())
        }

        async fn revoke_repository(
            &self,
            _installation: &Installation,
            _repo: &RepoId,
        ) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn shutdown_interrupts_in_flight_pass() {
        let directory = SlowDirectory {
            installations: vec![Installation {
                id: 1,
                org: "acme".to_string(),
                suspended: false,
            }],
        };
        let enforcer = Arc::new(Enforcer::new(
            PolicyRegistry::new(),
            Arc::new(directory),
            Arc::new(FakeIssues::default()),
            Arc::new(FakeConfig::default()),
            Arc::new(OrgConfigMemo::new()),
        ));

        let (tx, rx) = watch::channel(false);
        let job = tokio::spawn(enforcer.enforce_job(Duration::from_secs(3600), rx));
        tokio::time::sleep(Duration::from_millis(100)).await;
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(2), job)
            .await
            .expect("job must exit while a pass is still in flight")
            .unwrap();
    }

    #[tokio::test]
    async fn signaled_shutdown_spawns_no_installation_tasks() {
        let mut directory = FakeDirectory::default();
        directory.add(1, "acme", false, &["r1"]);
        let directory = Arc::new(directory);
        let mut registry = PolicyRegistry::new();
        registry.register(Box::new(StubPolicy::new("P", &["r1"])));

        let enforcer = Arc::new(Enforcer::new(
            registry,
            directory.clone(),
            Arc::new(FakeIssues::default()),
            Arc::new(FakeConfig::default()),
            Arc::new(OrgConfigMemo::new()),
        ));
        let (_tx, rx) = watch::channel(true);
        let result = enforcer.enforce_all_until(rx).await.unwrap();
        assert!(result.policies.is_empty());
        assert!(directory.list_calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn enforce_job_exits_on_shutdown() {
        let directory = FakeDirectory::default();
        let registry = PolicyRegistry::new();
        let enforcer = enforcer_with(registry, directory);

        let (tx, rx) = watch::channel(false);
        let job = tokio::spawn(enforcer.enforce_job(Duration::from_secs(3600), rx));
        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), job)
            .await
            .expect("job must exit promptly on shutdown")
            .unwrap();
    }
}
