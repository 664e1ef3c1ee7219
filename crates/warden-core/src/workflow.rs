use crate::types::ActionUse;
use serde::Deserialize;
use std::collections::BTreeMap;

// ---------------------------------------------------------------------------
// Workflow file model
// ---------------------------------------------------------------------------

/// A workflow definition file as fetched from the repository, under the
/// platform's fixed `.github/workflows/` convention.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowFile {
    pub filename: String,
    pub content: String,
}

/// Lenient model of a GitHub Actions workflow. Only the fields the action
/// policy reads; everything else is ignored.
#[derive(Debug, Deserialize)]
struct WorkflowDoc {
    #[serde(default)]
    name: Option<String>,
    /// `on:` may be a single event string, a sequence of events, or a map
    /// from event name to filters.
    #[serde(default)]
    on: Option<serde_yaml::Value>,
    #[serde(default)]
    jobs: BTreeMap<String, Job>,
}

#[derive(Debug, Deserialize)]
struct Job {
    #[serde(default)]
    steps: Vec<Step>,
}

#[derive(Debug, Deserialize)]
struct Step {
    #[serde(default)]
    uses: Option<String>,
}

fn trigger_events(value: &serde_yaml::Value) -> Vec<String> {
    match value {
        serde_yaml::Value::String(s) => vec![s.clone()],
        serde_yaml::Value::Sequence(seq) => seq
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        serde_yaml::Value::Mapping(map) => map
            .keys()
            .filter_map(|k| k.as_str().map(str::to_string))
            .collect(),
        _ => Vec::new(),
    }
}

// ---------------------------------------------------------------------------
// Action-use extraction
// ---------------------------------------------------------------------------

/// Extract every external `name@ref` action use from one workflow file.
/// Unparseable files and unrecognized `uses:` entries are skipped with a
/// warning, never an error.
pub fn extract_action_uses(filename: &str, content: &str) -> Vec<ActionUse> {
    let doc: WorkflowDoc = match serde_yaml::from_str(content) {
        Ok(doc) => doc,
        Err(err) => {
            tracing::warn!(%filename, %err, "skipping unparseable workflow file");
            return Vec::new();
        }
    };
    let workflow_name = doc.name.unwrap_or_else(|| filename.to_string());
    let events = doc.on.as_ref().map(trigger_events).unwrap_or_default();

    let mut uses = Vec::new();
    for job in doc.jobs.values() {
        for step in &job.steps {
            let Some(raw) = step.uses.as_deref() else {
                continue;
            };
            match classify_use(raw) {
                UseRef::External { name, version_ref } => uses.push(ActionUse {
                    name,
                    version_ref,
                    workflow_filename: filename.to_string(),
                    workflow_name: workflow_name.clone(),
                    trigger_events: events.clone(),
                }),
                UseRef::Local => {
                    tracing::debug!(%filename, uses = %raw, "skipping non-external uses entry")
                }
                UseRef::Malformed => {
                    tracing::warn!(%filename, uses = %raw, "skipping malformed uses entry")
                }
            }
        }
    }
    uses
}

/// Classification of one `uses:` entry. Local actions and docker images are
/// deliberately out of scope; anything else that is not `owner/repo@ref` is
/// malformed.
#[derive(Debug, PartialEq, Eq)]
enum UseRef {
    External { name: String, version_ref: String },
    Local,
    Malformed,
}

fn classify_use(raw: &str) -> UseRef {
    if raw.starts_with("./") || raw.starts_with("docker://") {
        return UseRef::Local;
    }
    let Some((name, version_ref)) = raw.split_once('@') else {
        return UseRef::Malformed;
    };
    if name.is_empty() || version_ref.is_empty() || !name.contains('/') {
        return UseRef::Malformed;
    }
    UseRef::External {
        name: name.to_string(),
        version_ref: version_ref.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
