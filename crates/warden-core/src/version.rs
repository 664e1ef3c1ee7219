use crate::error::{Result, WardenError};
use std::collections::{HashMap, HashSet, VecDeque};

// ---------------------------------------------------------------------------
// Ref kinds and comparators
// ---------------------------------------------------------------------------

/// What kind of ref a constraint's right-hand operand resolved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefKind {
    Commit,
    Tag,
    Branch,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Comparator {
    #[default]
    Eq,
    Gt,
    Ge,
    Lt,
    Le,
}

// ---------------------------------------------------------------------------
// Version
// ---------------------------------------------------------------------------

/// A resolved commit identity. Two versions are equal iff they name the
/// same commit, regardless of how they were written.
#[derive(Debug, Clone)]
pub struct Version {
    pub commit: String,
    /// The token the version was written as, kept for messages.
    pub display: String,
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.commit == other.commit
    }
}

impl Eq for Version {}

// ---------------------------------------------------------------------------
// Repo history snapshot
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    pub sha: String,
    pub parents: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagRef {
    pub name: String,
    pub sha: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchRef {
    pub name: String,
    pub sha: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Release {
    pub tag: String,
    pub sha: String,
}

/// The commit/tag/branch lists of one repository, fetched once per check.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepoHistory {
    pub commits: Vec<Commit>,
    pub tags: Vec<TagRef>,
    pub branches: Vec<BranchRef>,
}

impl RepoHistory {
    /// Resolve a versionish token to a canonical commit, classifying it as
    /// commit, then tag, then branch, in that order.
    pub fn resolve_ref(&self, token: &str) -> Result<(Version, RefKind)> {
        if let Some(commit) = self.commits.iter().find(|c| c.sha == token) {
            return Ok((
                Version {
                    commit: commit.sha.clone(),
                    display: token.to_string(),
                },
                RefKind::Commit,
            ));
        }
        if let Some(tag) = self.tags.iter().find(|t| t.name == token) {
            return Ok((
                Version {
                    commit: tag.sha.clone(),
                    display: token.to_string(),
                },
                RefKind::Tag,
            ));
        }
        if let Some(branch) = self.branches.iter().find(|b| b.name == token) {
            return Ok((
                Version {
                    commit: branch.sha.clone(),
                    display: token.to_string(),
                },
                RefKind::Branch,
            ));
        }
        Err(WardenError::NoCorrespondingCommit(token.to_string()))
    }

    pub fn commit_bears_tag(&self, sha: &str) -> bool {
        self.tags.iter().any(|t| t.sha == sha)
    }
}

// ---------------------------------------------------------------------------
// VersionConstraint
// ---------------------------------------------------------------------------

/// A comparison against a resolved ref: optional leading comparator
/// (default `=`) followed by a commit, tag, or branch token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionConstraint {
    pub op: Comparator,
    pub version: Version,
    pub kind: RefKind,
}

impl VersionConstraint {
    pub fn parse(text: &str, history: &RepoHistory) -> Result<Self> {
        let trimmed = text.trim();
        let (op, rest) = if let Some(rest) = trimmed.strip_prefix(">=") {
            (Comparator::Ge, rest)
        } else if let Some(rest) = trimmed.strip_prefix("<=") {
            (Comparator::Le, rest)
        } else if let Some(rest) = trimmed.strip_prefix('>') {
            (Comparator::Gt, rest)
        } else if let Some(rest) = trimmed.strip_prefix('<') {
            (Comparator::Lt, rest)
        } else if let Some(rest) = trimmed.strip_prefix('=') {
            (Comparator::Eq, rest)
        } else {
            (Comparator::Eq, trimmed)
        };
        let (version, kind) = history.resolve_ref(rest.trim())?;
        Ok(Self { op, version, kind })
    }

    /// Whether `candidate` satisfies the constraint. Equality compares
    /// commit IDs directly; ordering operators walk the commit graph from
    /// the constraint's commit toward dependents (`>`, `>=`) or ancestors
    /// (`<`, `<=`). When the operand was written as a tag, the matched
    /// commit must itself still bear some tag.
    pub fn matches(&self, candidate: &Version, history: &RepoHistory) -> bool {
        match self.op {
            Comparator::Eq => self.version.commit == candidate.commit,
            Comparator::Gt | Comparator::Ge | Comparator::Lt | Comparator::Le => {
                self.graph_search(candidate, history)
            }
        }
    }

    fn graph_search(&self, candidate: &Version, history: &RepoHistory) -> bool {
        if candidate.commit == self.version.commit {
            // Strict operators exclude the constraint's own commit.
            return matches!(self.op, Comparator::Ge | Comparator::Le);
        }

        // Successor edges follow "is parent of" for >/>=; predecessor edges
        // follow "has parent" for </<=.
        let forward = matches!(self.op, Comparator::Gt | Comparator::Ge);
        let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
        for commit in &history.commits {
            for parent in &commit.parents {
                if forward {
                    adjacency.entry(parent.as_str()).or_default().push(commit.sha.as_str());
                } else {
                    adjacency.entry(commit.sha.as_str()).or_default().push(parent.as_str());
                }
            }
        }

        let mut visited: HashSet<&str> = HashSet::new();
        let mut queue: VecDeque<&str> = VecDeque::new();
        visited.insert(self.version.commit.as_str());
        queue.push_back(self.version.commit.as_str());
        while let Some(sha) = queue.pop_front() {
            if sha == candidate.commit {
                return self.kind != RefKind::Tag || history.commit_bears_tag(sha);
            }
            for &next in adjacency.get(sha).into_iter().flatten() {
                if visited.insert(next) {
                    queue.push_back(next);
                }
            }
        }
        false
    }
}

// ---------------------------------------------------------------------------
// Release resolution
// ---------------------------------------------------------------------------

/// Resolve an action ref to a release version: a semver-looking ref parses
/// directly; otherwise the ref is treated as a commit and matched against
/// release-tag targets. `NoMatchingRelease` is an expected, non-fatal
/// outcome — callers fall back to ref-equality matching.
pub fn resolve_release_version(
    action: &str,
    git_ref: &str,
    releases: &[Release],
) -> Result<semver::Version> {
    if let Some(version) = parse_semver_lenient(git_ref) {
        return Ok(version);
    }
    let release = releases
        .iter()
        .find(|r| r.sha == git_ref)
        .ok_or_else(|| WardenError::NoMatchingRelease {
            action: action.to_string(),
            git_ref: git_ref.to_string(),
        })?;
    parse_semver_lenient(&release.tag).ok_or_else(|| WardenError::NoMatchingRelease {
        action: action.to_string(),
        git_ref: git_ref.to_string(),
    })
}

/// Parse `v1`, `v1.2`, or `v1.2.3` as a full semver version, zero-padding
/// missing components.
pub fn parse_semver_lenient(text: &str) -> Option<semver::Version> {
    let trimmed = text.trim().trim_start_matches('v');
    if !trimmed.chars().next()?.is_ascii_digit() {
        return None;
    }
    if let Ok(version) = semver::Version::parse(trimmed) {
        return Some(version);
    }
    let padded = match trimmed.matches('.').count() {
        0 => format!("{trimmed}.0.0"),
        1 => format!("{trimmed}.0"),
        _ => return None,
    };
    semver::Version::parse(&padded).ok()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
