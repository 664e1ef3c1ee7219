use crate::cache::{GlobCache, SemverCache};
use crate::error::Result;
use crate::evaluate::{evaluate_denied, evaluate_require, sort_rules, StepDisplay};
use crate::provider::{ConfigFetcher, RepoIntrospection};
use crate::selector::MatchContext;
use crate::types::{RepoId, RuleMethod};
use crate::workflow::extract_action_uses;
use crate::config::Rule;
use serde::Serialize;
use std::collections::HashSet;

pub const POLICY_NAME: &str = "action";

/// Cap on workflow files considered per repository.
pub const MAX_WORKFLOW_FILES: usize = 50;

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedRule {
    pub rule: String,
    pub group: String,
    pub method: RuleMethod,
    pub explanation: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ActionDetails {
    pub failed_rules: Vec<FailedRule>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PolicyResult {
    pub passed: bool,
    pub explanation: String,
    pub details: ActionDetails,
}

impl PolicyResult {
    fn pass(explanation: impl Into<String>) -> Self {
        Self {
            passed: true,
            explanation: explanation.into(),
            details: ActionDetails::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// ActionPolicy
// ---------------------------------------------------------------------------

/// The GitHub Actions allow/deny/require policy. Holds only the shared
/// pattern caches; every check is a pure function of repository state and
/// configuration.
#[derive(Default)]
pub struct ActionPolicy {
    globs: GlobCache,
    semvers: SemverCache,
}

impl ActionPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn check(
        &self,
        repo: &RepoId,
        config: &dyn ConfigFetcher,
        introspection: &dyn RepoIntrospection,
    ) -> Result<PolicyResult> {
        let cfg = config.action_config(repo).await;
        if cfg.groups.is_empty() {
            return Ok(PolicyResult::pass("policy disabled: no rule groups configured"));
        }

        let files = introspection.list_workflow_files(repo).await?;
        if files.len() > MAX_WORKFLOW_FILES {
            tracing::debug!(%repo, total = files.len(), limit = MAX_WORKFLOW_FILES,
                "workflow file cap reached, extra files ignored");
        }
        let mut uses = Vec::new();
        for file in files.iter().take(MAX_WORKFLOW_FILES) {
            uses.extend(extract_action_uses(&file.filename, &file.content));
        }

        let ctx = MatchContext::new(introspection, &self.globs, &self.semvers);

        // Applicable rules: union over groups whose repo selectors match.
        let mut rules: Vec<Rule> = Vec::new();
        for group in &cfg.groups {
            let applies = match &group.repos {
                None => true,
                Some(selectors) => {
                    let mut any = false;
                    for selector in selectors {
                        if ctx.match_repo(selector, repo).await? {
                            any = true;
                            break;
                        }
                    }
                    any
                }
            };
            if applies {
                rules.extend(group.rules.iter().cloned());
            }
        }
        sort_rules(&mut rules);

        let mut failed: Vec<FailedRule> = Vec::new();
        let mut seen: HashSet<(String, String)> = HashSet::new();

        // Deny pass over every extracted action-use.
        for action_use in &uses {
            let outcome = evaluate_denied(&rules, action_use, &ctx).await;
            let Some(denying) = outcome.denying_rule else {
                continue;
            };
            let rule = &rules[denying];
            if !seen.insert(rule.identity()) {
                continue;
            }
            let trail: String = outcome
                .steps
                .iter()
                .map(|step| {
                    format!(
                        " -> {}",
                        StepDisplay { rule: &rules[step.rule_index], status: &step.status }
                    )
                })
                .collect();
            failed.push(FailedRule {
                rule: rule.name.clone(),
                group: rule.group.clone(),
                method: rule.method,
                explanation: format!(
                    "Action \"{}\" version \"{}\" hit rule \"{}\":{}",
                    action_use.name, action_use.version_ref, rule.name, trail
                ),
            });
        }

        // Require pass; the default branch head is resolved once, lazily,
        // the first time a must_pass rule needs it.
        let mut head_sha: Option<String> = None;
        for rule in rules.iter().filter(|r| r.method == RuleMethod::Require) {
            if rule.must_pass && head_sha.is_none() {
                match introspection.default_branch_head(repo).await {
                    Ok(sha) => head_sha = Some(sha),
                    Err(err) => {
                        tracing::error!(%repo, %err,
                            "cannot resolve default branch head, skipping require evaluation");
                        break;
                    }
                }
            }
            let outcome =
                evaluate_require(rule, &uses, repo, head_sha.as_deref().unwrap_or(""), &ctx).await;
            if outcome.satisfied || !seen.insert(rule.identity()) {
                continue;
            }
            let mut explanation = format!(
                "Rule \"{}\" not satisfied: -> {}/{} requisites met",
                rule.name, outcome.met, outcome.required
            );
            for fix in &outcome.fixes {
                explanation.push_str(&format!(" -> {fix}"));
            }
            failed.push(FailedRule {
                rule: rule.name.clone(),
                group: rule.group.clone(),
                method: rule.method,
                explanation,
            });
        }

        if failed.is_empty() {
            return Ok(PolicyResult::pass("OK"));
        }
        let explanation = failed
            .iter()
            .map(|f| f.explanation.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        Ok(PolicyResult {
            passed: false,
            explanation,
            details: ActionDetails { failed_rules: failed },
        })
    }

    /// Automated remediation is not implemented for action rules; the
    /// configured `fix` action degrades to a logged warning.
    pub async fn fix(&self, repo: &RepoId) -> Result<()> {
        tracing::warn!(%repo, "fix is not implemented for the action policy");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
