use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use warden_cli::output::print_json;
use warden_core::config::{ActionConfig, ActionConfigOverlay, WarnLevel};

/// Parse a policy configuration file and report its validation warnings.
/// Exits 1 when any error-level finding is present.
pub fn run(file: &Path, json: bool) -> Result<()> {
    let text = fs::read_to_string(file)
        .with_context(|| format!("cannot read {}", file.display()))?;
    let overlay: ActionConfigOverlay =
        serde_yaml::from_str(&text).context("not a valid policy configuration")?;
    let cfg = ActionConfig::resolve(std::slice::from_ref(&overlay));
    let warnings = cfg.validate();

    if json {
        print_json(&warnings)?;
    } else if warnings.is_empty() {
        println!("{}: OK", file.display());
    } else {
        for warning in &warnings {
            let level = match warning.level {
                WarnLevel::Error => "error",
                WarnLevel::Warning => "warning",
            };
            println!("{level}: {}", warning.message);
        }
    }
    if warnings.iter().any(|w| w.level == WarnLevel::Error) {
        std::process::exit(1);
    }
    Ok(())
}
