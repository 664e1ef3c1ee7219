use crate::types::{Priority, RuleMethod};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// EnforcementAction
// ---------------------------------------------------------------------------

/// What the bot does when a policy fails on a repository.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnforcementAction {
    #[default]
    Log,
    Issue,
    Fix,
}

impl EnforcementAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnforcementAction::Log => "log",
            EnforcementAction::Issue => "issue",
            EnforcementAction::Fix => "fix",
        }
    }
}

// ---------------------------------------------------------------------------
// Selectors
// ---------------------------------------------------------------------------

/// Selects external actions by name glob and version constraint.
/// An empty `version` matches any ref.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ActionSelector {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
}

/// Scopes a rule group to repositories by name glob and significant
/// languages. `exclude` sub-selectors are evaluated recursively up to a
/// fixed depth and reject the repository when any of them matches.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RepoSelector {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub language: Vec<String>,
    #[serde(default)]
    pub exclude: Vec<RepoSelector>,
}

// ---------------------------------------------------------------------------
// Rule / RuleGroup
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub name: String,
    pub method: RuleMethod,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub actions: Vec<ActionSelector>,
    #[serde(default)]
    pub must_pass: bool,
    #[serde(default)]
    pub require_all: bool,
    /// Owning group name, filled in at load time for display. Not part of
    /// the file format.
    #[serde(skip)]
    pub group: String,
}

impl Rule {
    /// Identity used to de-duplicate evaluation results when several
    /// action-uses or selectors reference the same rule.
    pub fn identity(&self) -> (String, String) {
        (self.group.clone(), self.name.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleGroup {
    pub name: String,
    /// `None` matches every repository; `Some` requires at least one
    /// selector to match.
    #[serde(default)]
    pub repos: Option<Vec<RepoSelector>>,
    #[serde(default)]
    pub rules: Vec<Rule>,
}

// ---------------------------------------------------------------------------
// ActionConfig (org-level action-policy file)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionConfig {
    #[serde(default)]
    pub action: EnforcementAction,
    #[serde(default)]
    pub groups: Vec<RuleGroup>,
}

/// One layer of the org → org-repo → repo override stack. Absent fields
/// pass the lower layer's value through untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActionConfigOverlay {
    #[serde(default)]
    pub action: Option<EnforcementAction>,
    #[serde(default)]
    pub groups: Option<Vec<RuleGroup>>,
}

impl ActionConfig {
    /// Merge override layers in order (earliest = lowest precedence) and
    /// link each rule back to its owning group.
    pub fn resolve(layers: &[ActionConfigOverlay]) -> ActionConfig {
        let mut cfg = ActionConfig::default();
        for layer in layers {
            if let Some(action) = layer.action {
                cfg.action = action;
            }
            if let Some(groups) = &layer.groups {
                cfg.groups = groups.clone();
            }
        }
        cfg.link_groups();
        cfg
    }

    /// Record the owning group name on each rule for display.
    pub fn link_groups(&mut self) {
        for group in &mut self.groups {
            for rule in &mut group.rules {
                rule.group = group.name.clone();
            }
        }
    }

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();
        let mut seen = std::collections::HashSet::new();
        for group in &self.groups {
            for rule in &group.rules {
                if !seen.insert((group.name.as_str(), rule.name.as_str())) {
                    warnings.push(ConfigWarning {
                        level: WarnLevel::Error,
                        message: format!(
                            "duplicate rule '{}' in group '{}'",
                            rule.name, group.name
                        ),
                    });
                }
                if rule.method == RuleMethod::Require && rule.actions.is_empty() {
                    warnings.push(ConfigWarning {
                        level: WarnLevel::Warning,
                        message: format!(
                            "require rule '{}' in group '{}' has no action selectors",
                            rule.name, group.name
                        ),
                    });
                }
                if rule.must_pass && rule.method != RuleMethod::Require {
                    warnings.push(ConfigWarning {
                        level: WarnLevel::Warning,
                        message: format!(
                            "must_pass on rule '{}' in group '{}' only applies to require rules",
                            rule.name, group.name
                        ),
                    });
                }
            }
        }
        warnings
    }
}

// ---------------------------------------------------------------------------
// Degrading parse
// ---------------------------------------------------------------------------

/// Parse YAML config, falling back to defaults on a missing or malformed
/// document. Config problems never become errors for the caller.
pub fn parse_or_default<T: Default + DeserializeOwned>(text: Option<&str>, what: &str) -> T {
    match text {
        None => T::default(),
        Some(text) => match serde_yaml::from_str(text) {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!(%what, %err, "malformed config, using defaults");
                T::default()
            }
        },
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
