use engage_core::{BrowserError, Profile};
use std::process::ExitStatus;
use tokio::process::Command;
use tracing::info;

/// Opens a visible Chrome on the profile so the user can sign in by hand.
#[derive(Debug, Clone)]
pub struct AuthLauncher {
    chrome_binary: String,
    debug_port: u16,
}

impl AuthLauncher {
    pub fn new(chrome_binary: impl Into<String>, debug_port: u16) -> Self {
        Self {
            chrome_binary: chrome_binary.into(),
            debug_port,
        }
    }

    /// `chrome_profile_path` points at a profile directory inside Chrome's
    /// user data dir, so it is split into the two flags Chrome expects.
    pub fn command_args(&self, profile: &Profile) -> Vec<String> {
        let mut args = Vec::new();

        if let Some(path) = &profile.chrome_profile_path {
            match (path.parent(), path.file_name()) {
                (Some(parent), Some(name)) if !parent.as_os_str().is_empty() => {
                    args.push(format!("--user-data-dir={}", parent.display()));
                    args.push(format!("--profile-directory={}", name.to_string_lossy()));
                }
                _ => args.push(format!("--user-data-dir={}", path.display())),
            }
        }

        args.push(format!("--remote-debugging-port={}", self.debug_port));
        args.push("--no-first-run".to_string());
        args.push(profile.source_url.clone());
        args
    }

    /// Starts Chrome and waits for the user to close it.
    pub async fn launch(&self, profile: &Profile) -> Result<ExitStatus, BrowserError> {
        let args = self.command_args(profile);
        info!(binary = %self.chrome_binary, args = ?args, "Launching browser for sign-in");

        let mut child = Command::new(&self.chrome_binary)
            .args(&args)
            .spawn()
            .map_err(|e| BrowserError::LaunchFailed {
                command: self.chrome_binary.clone(),
                reason: e.to_string(),
            })?;

        let status = child.wait().await.map_err(|e| BrowserError::LaunchFailed {
            command: self.chrome_binary.clone(),
            reason: e.to_string(),
        })?;

        info!("Browser exited with {}", status);
        Ok(status)
    }
}
