/*!
 * init-config: write a commented starting configuration
 */

use crate::config::HammerConfig;
use anyhow::{bail, Context, Result};
use std::fs;
use std::path::Path;

const HEADER: &str = "\
# dbhammer configuration
#
# max_seconds = 0 runs until a failure is observed.
# max_iterations = 0 disables the attempt limit.
# backend is \"sim\" or \"sqlite\"; for sqlite, target is the database path.

";

/// Write the default configuration to `path`
///
/// An existing file is only replaced when `force` is set.
pub fn write_default_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!(
            "{} already exists (use --force to overwrite)",
            path.display()
        );
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }

    let body = toml::to_string_pretty(&HammerConfig::default())
        .context("Failed to serialize default configuration")?;
    fs::write(path, format!("{}{}", HEADER, body))
        .with_context(|| format!("Failed to write {}", path.display()))?;

    Ok(())
}
