use thiserror::Error;

#[derive(Debug, Error)]
pub enum WardenError {
    #[error("invalid pattern '{pattern}': {reason}")]
    Pattern { pattern: String, reason: String },

    #[error("no release of '{action}' targets ref '{git_ref}'")]
    NoMatchingRelease { action: String, git_ref: String },

    #[error("'{0}' matches no commit, tag, or branch")]
    NoCorrespondingCommit(String),

    #[error("action name '{0}' is not in owner/repo form")]
    InvalidActionName(String),

    #[error("api error: {0}")]
    Api(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, WardenError>;
