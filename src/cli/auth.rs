use super::context::{load_config, Overrides};
use engage_core::CoreError;
use platform_client::AuthLauncher;
use std::process::ExitCode;
use tracing::warn;

pub async fn run(overrides: &Overrides, profile: Option<&str>) -> Result<ExitCode, CoreError> {
    let config = load_config(overrides)?;
    let (name, profile) = config.resolve_profile(profile)?;
    if profile.chrome_profile_path.is_none() {
        warn!(
            "Profile '{}' has no chrome_profile_path; Chrome will use its default profile",
            name
        );
    }

    let launcher = AuthLauncher::new(
        config.browser.chrome_binary.clone(),
        config.browser.cdp_port,
    );
    println!(
        "Opening {} for profile '{}'. Sign in, then close the browser.",
        profile.source_url, name
    );
    let status = launcher.launch(&profile).await?;
    if !status.success() {
        warn!("Browser exited with {}", status);
    }

    Ok(ExitCode::SUCCESS)
}
