use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use warden_cli::fshost::FsHost;
use warden_cli::output::print_json;
use warden_enforce::directory::RepoAllowList;
use warden_enforce::registry::ActionPolicyHandle;
use warden_enforce::{Enforcer, PolicyRegistry};

pub fn run(
    root: &Path,
    interval_seconds: Option<u64>,
    policy: Option<String>,
    allow: &[String],
    json: bool,
) -> Result<()> {
    let host = Arc::new(FsHost::new(root));
    let memo = host.memo();

    let mut registry = PolicyRegistry::new();
    registry.register(Box::new(ActionPolicyHandle::new(
        host.clone(),
        host.clone(),
    )));

    let enforcer = Arc::new(
        Enforcer::new(registry, host.clone(), host.clone(), host, memo)
            .with_allow_list(RepoAllowList::new(allow)?)
            .with_policy_filter(policy),
    );

    let rt = tokio::runtime::Runtime::new()?;
    match interval_seconds {
        // Single reconciliation pass, report and exit.
        None => {
            let result = rt.block_on(enforcer.enforce_all())?;
            if json {
                print_json(&result)?;
            } else if result.policies.is_empty() {
                println!("all policies passing");
            } else {
                for (policy, totals) in &result.policies {
                    println!("{policy}: {} repositories failing", totals.total_failed);
                }
            }
        }
        // Polling loop until ctrl-c.
        Some(secs) => {
            rt.block_on(async move {
                let (shutdown_tx, shutdown_rx) = watch::channel(false);
                let job = tokio::spawn(
                    Arc::clone(&enforcer).enforce_job(Duration::from_secs(secs), shutdown_rx),
                );
                tokio::signal::ctrl_c().await?;
                let _ = shutdown_tx.send(true);
                job.await?;
                Ok::<_, anyhow::Error>(())
            })?;
        }
    }
    Ok(())
}
