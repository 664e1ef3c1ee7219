use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// RepoId
// ---------------------------------------------------------------------------

/// A repository on the hosting platform, identified by owner and name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepoId {
    pub owner: String,
    pub name: String,
}

impl RepoId {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }

    /// The repository implied by a `uses:` action name, e.g.
    /// `actions/checkout` or `github/codeql-action/analyze` → `github/codeql-action`.
    pub fn from_action_name(action: &str) -> Option<Self> {
        let mut parts = action.split('/');
        let owner = parts.next().filter(|s| !s.is_empty())?;
        let name = parts.next().filter(|s| !s.is_empty())?;
        Some(Self::new(owner, name))
    }
}

impl fmt::Display for RepoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

// ---------------------------------------------------------------------------
// ActionUse
// ---------------------------------------------------------------------------

/// One observed use of an external reusable action inside a workflow file.
/// Ephemeral: rebuilt from workflow contents on every check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionUse {
    /// `owner/repo` (optionally with a subdirectory path) from the `uses:` line.
    pub name: String,
    /// The raw ref after `@`: a tag, branch, or commit SHA.
    pub version_ref: String,
    pub workflow_filename: String,
    pub workflow_name: String,
    pub trigger_events: Vec<String>,
}

impl ActionUse {
    pub fn has_trigger(&self, event: &str) -> bool {
        self.trigger_events.iter().any(|e| e == event)
    }
}

// ---------------------------------------------------------------------------
// RuleMethod
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleMethod {
    Allow,
    Require,
    Deny,
}

impl RuleMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleMethod::Allow => "allow",
            RuleMethod::Require => "require",
            RuleMethod::Deny => "deny",
        }
    }
}

// ---------------------------------------------------------------------------
// Priority
// ---------------------------------------------------------------------------

/// Rule priority tier. Ordering is evaluation precedence: `Critical` sorts
/// first and wins ties against every lower tier.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Critical,
    High,
    #[default]
    Medium,
    Low,
}

impl Priority {
    pub fn tier(self) -> u8 {
        match self {
            Priority::Critical => 0,
            Priority::High => 1,
            Priority::Medium => 2,
            Priority::Low => 3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Critical => "critical",
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
