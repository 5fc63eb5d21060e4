//! CLI command for displaying the build order
//!
//! Implements the `bilt order` command.

use std::path::Path;

use anyhow::Result;

use crate::cli::output;
use crate::core::resolver::calculate_build_order;

/// Execute the order command
pub async fn execute(current_dir: &Path, repository: Option<&str>, config: Option<&Path>) -> Result<()> {
    let target = super::resolve_target(current_dir, repository)?;
    let manifest = super::load_manifest(&target, config)?;
    let packages = manifest.package_set()?;
    let order = calculate_build_order(&packages)?;

    let output = output::current();
    output.json(&order);
    for directory in &order {
        output.line(directory);
    }
    Ok(())
}
