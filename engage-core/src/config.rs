use crate::error::ConfigError;
use crate::types::{
    ActionSpec, ActionType, DiscoveryConfig, DiscoveryKind, ExtractionMode, Platform, Profile,
    ProfileScripts, Scenario, ScriptKind, UnparsedTimePolicy,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const CONFIG_ENV: &str = "ENGAGERUNNER_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "config.toml";

const LLM_KEY_VARS: [&str; 3] = ["LLM_API_KEY", "OPENROUTER_API_KEY", "OPENAI_API_KEY"];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub browser: BrowserConfig,
    #[serde(default)]
    pub safety: SafetyConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub defaults: DefaultsConfig,
    #[serde(default)]
    pub profiles: BTreeMap<String, Profile>,
    #[serde(default)]
    pub scenarios: BTreeMap<String, Scenario>,
    /// Directory script paths are resolved against.
    #[serde(skip)]
    base_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserConfig {
    #[serde(default = "default_cdp_port")]
    pub cdp_port: u16,
    #[serde(default = "default_chrome_binary")]
    pub chrome_binary: String,
    /// Wait after each navigation before running page scripts.
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
    #[serde(default)]
    pub headless: bool,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_mcp_command")]
    pub mcp_command: String,
    #[serde(default = "default_mcp_args")]
    pub mcp_args: Vec<String>,
}

fn default_cdp_port() -> u16 {
    9222
}

fn default_chrome_binary() -> String {
    "google-chrome".to_string()
}

fn default_settle_ms() -> u64 {
    2000
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_mcp_command() -> String {
    "npx".to_string()
}

fn default_mcp_args() -> Vec<String> {
    vec!["-y".to_string(), "@playwright/mcp".to_string()]
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            cdp_port: default_cdp_port(),
            chrome_binary: default_chrome_binary(),
            settle_ms: default_settle_ms(),
            headless: false,
            timeout_secs: default_timeout_secs(),
            mcp_command: default_mcp_command(),
            mcp_args: default_mcp_args(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetyConfig {
    #[serde(default = "default_actions_per_minute")]
    pub actions_per_minute: u32,
    #[serde(default = "default_min_delay")]
    pub min_delay_secs: f64,
    #[serde(default = "default_max_delay")]
    pub max_delay_secs: f64,
}

fn default_actions_per_minute() -> u32 {
    10
}

fn default_min_delay() -> f64 {
    2.0
}

fn default_max_delay() -> f64 {
    5.0
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            actions_per_minute: default_actions_per_minute(),
            min_delay_secs: default_min_delay(),
            max_delay_secs: default_max_delay(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Defaults to `~/.engagerunner/state.json` when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_llm_provider")]
    pub provider: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default)]
    pub fallback_models: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default = "default_llm_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

fn default_llm_provider() -> String {
    "openrouter".to_string()
}

fn default_llm_model() -> String {
    "anthropic/claude-sonnet-4".to_string()
}

fn default_llm_attempts() -> u32 {
    3
}

fn default_llm_timeout() -> u64 {
    60
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            model: default_llm_model(),
            fallback_models: Vec::new(),
            api_key: None,
            base_url: None,
            max_attempts: default_llm_attempts(),
            timeout_secs: default_llm_timeout(),
        }
    }
}

impl LlmConfig {
    /// `model` followed by `fallback_models`, in order.
    pub fn models(&self) -> Vec<String> {
        std::iter::once(self.model.clone())
            .chain(self.fallback_models.iter().cloned())
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,
    /// Used by `read`.
    #[serde(default = "default_max_comments")]
    pub max_comments: u32,
    /// Used by `list-posts`.
    #[serde(default = "default_max_posts")]
    pub max_posts: u32,
}

fn default_max_comments() -> u32 {
    20
}

fn default_max_posts() -> u32 {
    20
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            profile: None,
            max_comments: default_max_comments(),
            max_posts: default_max_posts(),
        }
    }
}

impl AppConfig {
    /// `--config` flag, then `ENGAGERUNNER_CONFIG`, then `./config.toml`.
    pub fn resolve_path(cli_path: Option<&Path>) -> PathBuf {
        if let Some(path) = cli_path {
            return path.to_path_buf();
        }
        match std::env::var(CONFIG_ENV) {
            Ok(path) if !path.trim().is_empty() => PathBuf::from(path),
            _ => PathBuf::from(DEFAULT_CONFIG_FILE),
        }
    }

    /// Reads the file if present. A missing file is not an error: the caller
    /// gets defaults with no profiles or scenarios.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .filter(|p| !p.as_os_str().is_empty());

        if !path.exists() {
            debug!("No configuration file at {}, using defaults", path.display());
            return Ok(Self {
                base_dir,
                ..Self::default()
            });
        }

        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;

        let mut config: AppConfig = toml::from_str(&content)?;
        config.base_dir = base_dir;
        info!(
            "Loaded configuration from {} ({} profiles, {} scenarios)",
            path.display(),
            config.profiles.len(),
            config.scenarios.len()
        );
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides_from(|key| std::env::var(key).ok())
    }

    /// Applies overrides from any key lookup; `apply_env_overrides` passes the
    /// process environment.
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(path) = get("ENGAGERUNNER_STATE_FILE") {
            self.ledger.state_file = Some(PathBuf::from(path));
        }

        if let Some(port) = get("ENGAGERUNNER_CDP_PORT") {
            self.browser.cdp_port = port.trim().parse().map_err(|_| ConfigError::InvalidValue {
                field: "ENGAGERUNNER_CDP_PORT".to_string(),
                value: port.clone(),
            })?;
        }

        if let Some(headless) = get("ENGAGERUNNER_HEADLESS") {
            self.browser.headless = match headless.trim().to_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        field: "ENGAGERUNNER_HEADLESS".to_string(),
                        value: headless,
                    })
                }
            };
        }

        if let Some(apm) = get("ENGAGERUNNER_ACTIONS_PER_MINUTE") {
            self.safety.actions_per_minute =
                apm.trim().parse().map_err(|_| ConfigError::InvalidValue {
                    field: "ENGAGERUNNER_ACTIONS_PER_MINUTE".to_string(),
                    value: apm.clone(),
                })?;
        }

        let file_key_missing = self
            .llm
            .api_key
            .as_deref()
            .map_or(true, |k| k.trim().is_empty());
        if file_key_missing {
            if let Some((var, key)) = LLM_KEY_VARS
                .iter()
                .find_map(|var| get(*var).map(|key| (*var, key)))
            {
                debug!("Using LLM API key from {}", var);
                self.llm.api_key = Some(key);
            }
        }

        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let safety = &self.safety;
        if safety.actions_per_minute == 0 {
            return Err(ConfigError::ValidationFailed {
                reason: "safety.actions_per_minute must be at least 1".to_string(),
            });
        }
        if safety.min_delay_secs < 0.0 || safety.max_delay_secs < 0.0 {
            return Err(ConfigError::ValidationFailed {
                reason: "safety delays must not be negative".to_string(),
            });
        }
        if !safety.min_delay_secs.is_finite() || !safety.max_delay_secs.is_finite() {
            return Err(ConfigError::ValidationFailed {
                reason: "safety delays must be finite".to_string(),
            });
        }
        if safety.min_delay_secs > safety.max_delay_secs {
            return Err(ConfigError::ValidationFailed {
                reason: format!(
                    "safety.min_delay_secs ({}) is greater than safety.max_delay_secs ({})",
                    safety.min_delay_secs, safety.max_delay_secs
                ),
            });
        }

        for (name, scenario) in &self.scenarios {
            if scenario.max_comments_per_post == 0 {
                return Err(ConfigError::ValidationFailed {
                    reason: format!("scenario '{}' has max_comments_per_post = 0", name),
                });
            }
            let needs_limit = matches!(
                scenario.discovery.method,
                DiscoveryKind::RecentDays | DiscoveryKind::RecentPosts
            );
            if needs_limit && scenario.discovery.limit == 0 {
                return Err(ConfigError::ValidationFailed {
                    reason: format!("scenario '{}' needs a discovery limit above 0", name),
                });
            }
        }

        if let Some(profile) = &self.defaults.profile {
            if !self.profiles.contains_key(profile) {
                return Err(ConfigError::UnknownProfile {
                    name: profile.clone(),
                });
            }
        }

        Ok(())
    }

    /// Picks the named profile, else `defaults.profile`, else the only
    /// profile. Script file references are read relative to the config file.
    pub fn resolve_profile(&self, name: Option<&str>) -> Result<(String, Profile), ConfigError> {
        let name = match name.or(self.defaults.profile.as_deref()) {
            Some(name) => name.to_string(),
            None if self.profiles.len() == 1 => {
                self.profiles.keys().next().cloned().unwrap_or_default()
            }
            None => {
                return Err(ConfigError::ValidationFailed {
                    reason: "no profile selected; pass --profile or set defaults.profile"
                        .to_string(),
                })
            }
        };

        let mut profile = self
            .profiles
            .get(&name)
            .cloned()
            .ok_or_else(|| ConfigError::UnknownProfile { name: name.clone() })?;

        for kind in [
            ScriptKind::ListPosts,
            ScriptKind::ListComments,
            ScriptKind::Like,
            ScriptKind::Heart,
        ] {
            let slot = profile.scripts.get_mut(kind);
            if let Some(value) = slot.take() {
                *slot = Some(self.load_script(&value)?);
            }
        }

        Ok((name, profile))
    }

    pub fn resolve_scenario(&self, name: &str) -> Result<Scenario, ConfigError> {
        self.scenarios
            .get(name)
            .cloned()
            .ok_or_else(|| ConfigError::UnknownScenario {
                name: name.to_string(),
            })
    }

    fn load_script(&self, value: &str) -> Result<String, ConfigError> {
        let trimmed = value.trim();
        if trimmed.contains('\n') || !trimmed.ends_with(".js") {
            return Ok(value.to_string());
        }

        let path = match &self.base_dir {
            Some(dir) if Path::new(trimmed).is_relative() => dir.join(trimmed),
            _ => PathBuf::from(trimmed),
        };
        if !path.exists() {
            return Err(ConfigError::FileNotFound {
                path: path.display().to_string(),
            });
        }
        std::fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })
    }

    /// Configuration written by `init`: one profile and one scenario.
    pub fn example() -> Self {
        let mut profiles = BTreeMap::new();
        profiles.insert(
            "youtube".to_string(),
            Profile {
                platform: Platform::Youtube,
                source_url: "https://www.youtube.com/@your-channel/videos".to_string(),
                chrome_profile_path: dirs::home_dir()
                    .map(|home| home.join(".config/google-chrome/Default")),
                extraction: ExtractionMode::Script,
                scripts: ProfileScripts {
                    list_posts: Some("scripts/list_posts.js".to_string()),
                    list_comments: Some("scripts/list_comments.js".to_string()),
                    like: Some("scripts/like.js".to_string()),
                    heart: Some("scripts/heart.js".to_string()),
                },
            },
        );

        let mut scenarios = BTreeMap::new();
        scenarios.insert(
            "like-recent".to_string(),
            Scenario {
                discovery: DiscoveryConfig {
                    method: DiscoveryKind::RecentDays,
                    limit: 7,
                    on_unparsed_time: UnparsedTimePolicy::Exclude,
                },
                actions: vec![ActionSpec {
                    kind: ActionType::Like,
                    template: None,
                }],
                max_comments_per_post: 10,
            },
        );

        Self {
            defaults: DefaultsConfig {
                profile: Some("youtube".to_string()),
                ..DefaultsConfig::default()
            },
            profiles,
            scenarios,
            ..Self::default()
        }
    }
}

/// Writes the example configuration to `path`, refusing to replace an
/// existing file unless `force` is set.
pub fn create_default_config(path: &Path, force: bool) -> Result<(), ConfigError> {
    if path.exists() && !force {
        return Err(ConfigError::AlreadyExists {
            path: path.display().to_string(),
        });
    }
    if path.exists() {
        warn!("Overwriting existing configuration at {}", path.display());
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|source| ConfigError::Io {
            path: parent.display().to_string(),
            source,
        })?;
    }

    let content = toml::to_string_pretty(&AppConfig::example())?;
    std::fs::write(path, content).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;

    info!("Wrote example configuration to {}", path.display());
    Ok(())
}
