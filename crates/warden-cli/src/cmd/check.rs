use anyhow::{Context, Result};
use std::path::Path;
use warden_cli::fshost::FsHost;
use warden_cli::output::print_json;
use warden_core::policy::ActionPolicy;
use warden_core::types::RepoId;

/// Evaluate the action policy against one repository in the snapshot.
/// Exits 2 when the policy fails, so scripts can distinguish "policy
/// failed" from "could not evaluate".
pub fn run(root: &Path, slug: &str, json: bool) -> Result<()> {
    let (owner, name) = slug
        .split_once('/')
        .context("repository must be written as owner/name")?;
    let repo = RepoId::new(owner, name);
    let host = FsHost::new(root);

    let rt = tokio::runtime::Runtime::new()?;
    let result = rt.block_on(ActionPolicy::new().check(&repo, &host, &host))?;

    if json {
        print_json(&result)?;
    } else {
        println!("{}: {}", repo, if result.passed { "PASS" } else { "FAIL" });
        if !result.explanation.is_empty() {
            println!("{}", result.explanation);
        }
    }
    if !result.passed {
        std::process::exit(2);
    }
    Ok(())
}
