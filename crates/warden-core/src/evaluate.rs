use crate::config::Rule;
use crate::selector::MatchContext;
use crate::types::{ActionUse, RepoId, RuleMethod};
use std::fmt;

// ---------------------------------------------------------------------------
// Rule sorting
// ---------------------------------------------------------------------------

/// Order rules by priority tier (critical first), placing allow/require
/// ahead of deny within a tier so they get a chance to short-circuit
/// before deny rules are consulted at equal priority. Stable: ties keep
/// declaration order.
pub fn sort_rules(rules: &mut [Rule]) {
    rules.sort_by_key(|rule| (rule.priority, rule.method == RuleMethod::Deny));
}

// ---------------------------------------------------------------------------
// Deny evaluation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepStatus {
    Allowed,
    Denied,
    /// Name matched but version did not; carries the failing constraint for
    /// messaging.
    VersionMismatch { constraint: String },
    MissingAction,
    /// A matcher call failed. Recorded, but evaluation continues with the
    /// next rule.
    Error { message: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvalStep {
    /// Index into the sorted applicable-rule list.
    pub rule_index: usize,
    pub status: StepStatus,
}

pub struct StepDisplay<'a> {
    pub rule: &'a Rule,
    pub status: &'a StepStatus,
}

impl fmt::Display for StepDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            StepStatus::Allowed => {
                write!(f, "allowed by {} rule \"{}\"", self.rule.method.as_str(), self.rule.name)
            }
            StepStatus::Denied => write!(f, "denied by deny rule \"{}\"", self.rule.name),
            StepStatus::VersionMismatch { constraint } => write!(
                f,
                "version does not satisfy \"{}\" (rule \"{}\")",
                constraint, self.rule.name
            ),
            StepStatus::MissingAction => write!(f, "no match for rule \"{}\"", self.rule.name),
            StepStatus::Error { message } => {
                write!(f, "rule \"{}\" errored: {}", self.rule.name, message)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DenyOutcome {
    pub denied: bool,
    /// Index of the denying rule when `denied`.
    pub denying_rule: Option<usize>,
    pub steps: Vec<EvalStep>,
}

/// Walk the sorted applicable rules for one action-use. Evaluation is
/// resolved by the first rule whose status is allowed or denied; later
/// rules are never consulted for this use.
pub async fn evaluate_denied(
    rules: &[Rule],
    action_use: &ActionUse,
    ctx: &MatchContext<'_>,
) -> DenyOutcome {
    let mut steps = Vec::new();
    for (rule_index, rule) in rules.iter().enumerate() {
        let status = rule_step_status(rule, action_use, ctx).await;
        let denied = status == StepStatus::Denied;
        let terminal = denied || status == StepStatus::Allowed;
        steps.push(EvalStep { rule_index, status });
        if terminal {
            return DenyOutcome {
                denied,
                denying_rule: denied.then_some(rule_index),
                steps,
            };
        }
    }
    DenyOutcome { denied: false, denying_rule: None, steps }
}

async fn rule_step_status(
    rule: &Rule,
    action_use: &ActionUse,
    ctx: &MatchContext<'_>,
) -> StepStatus {
    // A rule without selectors matches everything.
    if rule.actions.is_empty() {
        return terminal_status(rule.method);
    }
    let mut version_mismatch: Option<String> = None;
    let mut error: Option<String> = None;
    for selector in &rule.actions {
        match ctx.match_action(selector, action_use).await {
            Ok(m) if m.matched => return terminal_status(rule.method),
            Ok(m) if m.name_matched => version_mismatch = Some(selector.version.clone()),
            Ok(_) => {}
            Err(err) => error = Some(err.to_string()),
        }
    }
    if let Some(constraint) = version_mismatch {
        StepStatus::VersionMismatch { constraint }
    } else if let Some(message) = error {
        StepStatus::Error { message }
    } else {
        StepStatus::MissingAction
    }
}

fn terminal_status(method: RuleMethod) -> StepStatus {
    match method {
        RuleMethod::Deny => StepStatus::Denied,
        RuleMethod::Allow | RuleMethod::Require => StepStatus::Allowed,
    }
}

// ---------------------------------------------------------------------------
// Require evaluation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FixSuggestion {
    /// The action is entirely missing.
    Add { action: String, version: String },
    /// Right action, wrong version.
    Update { action: String, version: String },
    /// Version matched but the workflow lacks the required triggers.
    Enable { action: String },
    /// Version and triggers match but runs are failing on head.
    Fix { action: String },
}

impl fmt::Display for FixSuggestion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FixSuggestion::Add { action, version } => {
                write!(f, "Add Action \"{action}\" with version satisfying \"{version}\"")
            }
            FixSuggestion::Update { action, version } => {
                write!(f, "Update Action \"{action}\" to a version satisfying \"{version}\"")
            }
            FixSuggestion::Enable { action } => {
                write!(f, "Enable Action \"{action}\" on push and pull_request")
            }
            FixSuggestion::Fix { action } => write!(f, "Fix failing Action \"{action}\""),
        }
    }
}

/// Per-selector observation ladder, most specific state wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum SelectorState {
    Missing,
    NameOnly,
    NeedsTriggers,
    Failing,
    Satisfied,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequireOutcome {
    pub satisfied: bool,
    pub required: usize,
    pub met: usize,
    pub fixes: Vec<FixSuggestion>,
}

/// Count how many of the rule's selectors find a satisfying action-use.
/// `require_all` requires every selector to be met; otherwise one
/// suffices. `must_pass` additionally requires push + pull_request
/// triggers and a green (or still pending) run on the default branch head.
/// Exactly one fix suggestion, the most specific applicable, is produced
/// per unmet selector.
pub async fn evaluate_require(
    rule: &Rule,
    uses: &[ActionUse],
    repo: &RepoId,
    head_sha: &str,
    ctx: &MatchContext<'_>,
) -> RequireOutcome {
    let required = if rule.require_all { rule.actions.len() } else { 1 };
    let mut met = 0;
    let mut fixes = Vec::new();

    for selector in &rule.actions {
        let mut state = SelectorState::Missing;
        for action_use in uses {
            let m = match ctx.match_action(selector, action_use).await {
                Ok(m) => m,
                Err(err) => {
                    tracing::warn!(%repo, action = %action_use.name, %err, "selector match failed");
                    continue;
                }
            };
            if !m.matched {
                if m.name_matched {
                    state = state.max(SelectorState::NameOnly);
                }
                continue;
            }
            if !rule.must_pass {
                state = SelectorState::Satisfied;
                break;
            }
            if !(action_use.has_trigger("push") && action_use.has_trigger("pull_request")) {
                state = state.max(SelectorState::NeedsTriggers);
                continue;
            }
            match workflow_green_on_head(action_use, repo, head_sha, ctx).await {
                Ok(true) => {
                    state = SelectorState::Satisfied;
                    break;
                }
                Ok(false) => state = state.max(SelectorState::Failing),
                Err(err) => {
                    tracing::warn!(%repo, workflow = %action_use.workflow_filename, %err,
                        "could not inspect workflow runs");
                }
            }
        }
        match state {
            SelectorState::Satisfied => met += 1,
            SelectorState::Missing => fixes.push(FixSuggestion::Add {
                action: selector.name.clone(),
                version: selector.version.clone(),
            }),
            SelectorState::NameOnly => fixes.push(FixSuggestion::Update {
                action: selector.name.clone(),
                version: selector.version.clone(),
            }),
            SelectorState::NeedsTriggers => {
                fixes.push(FixSuggestion::Enable { action: selector.name.clone() })
            }
            SelectorState::Failing => {
                fixes.push(FixSuggestion::Fix { action: selector.name.clone() })
            }
        }
    }

    RequireOutcome { satisfied: met >= required, required, met, fixes }
}

async fn workflow_green_on_head(
    action_use: &ActionUse,
    repo: &RepoId,
    head_sha: &str,
    ctx: &MatchContext<'_>,
) -> crate::error::Result<bool> {
    let runs = ctx
        .introspection()
        .list_workflow_runs(repo, &action_use.workflow_filename, "push")
        .await?;
    Ok(runs.iter().any(|run| run.satisfies_on(head_sha)))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
