//! End-to-end runs of the enforcement loop over a filesystem snapshot.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use warden_cli::fshost::FsHost;
use warden_enforce::registry::ActionPolicyHandle;
use warden_enforce::{Enforcer, PolicyRegistry};

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn enforcer_for(root: &Path) -> Arc<Enforcer> {
    let host = Arc::new(FsHost::new(root));
    let memo = host.memo();
    let mut registry = PolicyRegistry::new();
    registry.register(Box::new(ActionPolicyHandle::new(
        host.clone(),
        host.clone(),
    )));
    Arc::new(Enforcer::new(registry, host.clone(), host.clone(), host, memo))
}

const CI_WORKFLOW: &str = "\
name: CI
on: [push, pull_request]
jobs:
  build:
    runs-on: ubuntu-latest
    steps:
      - uses: actions/checkout@v4
      - run: cargo test
";

#[tokio::test]
async fn deny_rule_fails_repository_and_files_issue() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "acme/warden.yml",
        "\
action: issue
groups:
  - name: security
    rules:
      - name: no-unvetted-actions
        method: deny
        priority: critical
        actions:
          - name: \"*\"
",
    );
    write(dir.path(), "acme/app/workflows/ci.yml", CI_WORKFLOW);
    write(dir.path(), "acme/app/repo.yml", "");

    let enforcer = enforcer_for(dir.path());
    let result = enforcer.enforce_all().await.unwrap();
    assert_eq!(result.policies["action"].total_failed, 1);

    let issue = dir.path().join("acme/app/issues/warden-action.md");
    let body = fs::read_to_string(&issue).unwrap();
    assert!(body.contains("denied by deny rule \"no-unvetted-actions\""));
}

#[tokio::test]
async fn allow_rule_shields_vetted_actions() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "acme/warden.yml",
        "\
groups:
  - name: security
    rules:
      - name: first-party-ok
        method: allow
        priority: high
        actions:
          - name: \"actions/*\"
      - name: no-unvetted-actions
        method: deny
        actions:
          - name: \"*\"
",
    );
    write(dir.path(), "acme/app/workflows/ci.yml", CI_WORKFLOW);
    write(dir.path(), "acme/app/repo.yml", "");

    let enforcer = enforcer_for(dir.path());
    let result = enforcer.enforce_all().await.unwrap();
    assert!(result.policies.is_empty(), "no failing policies expected");
}

#[tokio::test]
async fn missing_required_action_reports_add_fix() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "acme/warden.yml",
        "\
action: issue
groups:
  - name: supply-chain
    rules:
      - name: use-scanner
        method: require
        actions:
          - name: ossf/scanner
",
    );
    write(dir.path(), "acme/app/workflows/ci.yml", CI_WORKFLOW);
    write(dir.path(), "acme/app/repo.yml", "default_branch_head: abc123\n");

    let enforcer = enforcer_for(dir.path());
    let result = enforcer.enforce_all().await.unwrap();
    assert_eq!(result.policies["action"].total_failed, 1);

    let body =
        fs::read_to_string(dir.path().join("acme/app/issues/warden-action.md")).unwrap();
    assert!(body.contains("Rule \"use-scanner\" not satisfied"));
    assert!(body.contains("Add Action \"ossf/scanner\""));
}

#[tokio::test]
async fn repo_overlay_can_disable_the_policy() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "acme/warden.yml",
        "\
groups:
  - name: security
    rules:
      - name: no-unvetted-actions
        method: deny
        actions:
          - name: \"*\"
",
    );
    write(dir.path(), "acme/app/workflows/ci.yml", CI_WORKFLOW);
    write(dir.path(), "acme/app/repo.yml", "");
    // Repo opts out; handle is configured to skip entirely.
    write(dir.path(), "acme/app/warden.yml", "disabled: true\n");

    let host = Arc::new(FsHost::new(dir.path()));
    let memo = host.memo();
    let mut registry = PolicyRegistry::new();
    registry.register(Box::new(
        ActionPolicyHandle::new(host.clone(), host.clone()).with_do_nothing_on_opt_out(true),
    ));
    let enforcer = Arc::new(Enforcer::new(
        registry,
        host.clone(),
        host.clone(),
        host,
        memo,
    ));
    let result = enforcer.enforce_all().await.unwrap();
    assert!(result.policies.is_empty());
}

#[tokio::test]
async fn suspended_org_is_never_scanned() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "dormant/org.yml", "suspended: true\n");
    write(
        dir.path(),
        "dormant/warden.yml",
        "\
groups:
  - name: security
    rules:
      - name: no-unvetted-actions
        method: deny
        actions:
          - name: \"*\"
",
    );
    write(dir.path(), "dormant/app/workflows/ci.yml", CI_WORKFLOW);
    write(dir.path(), "dormant/app/repo.yml", "");

    let enforcer = enforcer_for(dir.path());
    let result = enforcer.enforce_all().await.unwrap();
    assert!(result.policies.is_empty());
}
