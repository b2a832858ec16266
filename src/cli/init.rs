use super::context::Overrides;
use engage_core::{create_default_config, AppConfig, CoreError};
use std::path::PathBuf;
use std::process::ExitCode;

pub fn run(
    overrides: &Overrides,
    output: Option<PathBuf>,
    force: bool,
) -> Result<ExitCode, CoreError> {
    let path = output.unwrap_or_else(|| AppConfig::resolve_path(overrides.config.as_deref()));
    create_default_config(&path, force)?;

    println!("Wrote example configuration to {}", path.display());
    println!("Add your page scripts next to it, then run `engagerunner auth` to sign in.");
    Ok(ExitCode::SUCCESS)
}
