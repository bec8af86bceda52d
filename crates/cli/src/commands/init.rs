use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use boxcut_core::config::PartitionPlan;

/// Write a starter plan file.
pub fn init_plan_command(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    if path.exists() {
        tracing::warn!(path = %path.display(), "overwriting existing plan");
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    let body = PartitionPlan::template().to_yaml_string()?;
    fs::write(path, body).with_context(|| format!("Failed to write plan {}", path.display()))?;

    println!("Wrote plan template to {}", path.display());
    Ok(())
}
