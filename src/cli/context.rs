use chrono::{DateTime, Utc};
use engage_core::{
    AppConfig, ConfigError, ContentProvider, CoreError, ExtractionMode, Profile, RawRecord,
    ScriptKind,
};
use engage_ledger::ActionLedger;
use llm_interface::{LlmExtractor, ModelFallback, OpenAiCompatibleChat};
use platform_client::{CdpProbe, PlaywrightSession, ScriptedPlatform};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

/// Global flags that override the configuration file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub config: Option<PathBuf>,
    pub state_file: Option<PathBuf>,
    pub cdp_port: Option<u16>,
}

/// File, then environment, then flags; validated before returning.
pub fn load_config(overrides: &Overrides) -> Result<AppConfig, ConfigError> {
    let path = AppConfig::resolve_path(overrides.config.as_deref());
    let mut config = AppConfig::load(&path)?;
    config.apply_env_overrides()?;

    if let Some(state_file) = &overrides.state_file {
        config.ledger.state_file = Some(state_file.clone());
    }
    if let Some(port) = overrides.cdp_port {
        config.browser.cdp_port = port;
    }

    config.validate()?;
    Ok(config)
}

pub fn open_ledger(config: &AppConfig) -> ActionLedger {
    let path = config
        .ledger
        .state_file
        .clone()
        .unwrap_or_else(ActionLedger::default_path);
    ActionLedger::open(path)
}

/// Scripts needed to read content; none when a model does the reading.
pub fn content_scripts(profile: &Profile, wanted: &[ScriptKind]) -> Vec<ScriptKind> {
    match profile.extraction {
        ExtractionMode::Script => wanted.to_vec(),
        ExtractionMode::Llm => Vec::new(),
    }
}

pub fn require_scripts(
    name: &str,
    profile: &Profile,
    kinds: &[ScriptKind],
) -> Result<(), ConfigError> {
    for kind in kinds {
        if profile.scripts.get(*kind).is_none() {
            return Err(ConfigError::MissingScript {
                profile: name.to_string(),
                script: kind.as_str().to_string(),
            });
        }
    }
    Ok(())
}

/// Builds the chat client up front so a bad key fails before the browser
/// is touched.
pub fn prepare_chat(
    config: &AppConfig,
    profile: &Profile,
) -> Result<Option<OpenAiCompatibleChat>, CoreError> {
    match profile.extraction {
        ExtractionMode::Script => Ok(None),
        ExtractionMode::Llm => OpenAiCompatibleChat::from_config(&config.llm).map(Some),
    }
}

pub fn settle(config: &AppConfig) -> Duration {
    Duration::from_millis(config.browser.settle_ms)
}

pub async fn connect_browser(config: &AppConfig) -> Result<PlaywrightSession, CoreError> {
    let probe = CdpProbe::new(config.browser.cdp_port)?;
    let version = probe.check().await?;
    info!(
        browser = %version.browser,
        "Chrome is listening on port {}",
        probe.port()
    );
    Ok(PlaywrightSession::launch(&config.browser, &probe.endpoint()).await?)
}

pub type PageScripts<'a> = ScriptedPlatform<&'a PlaywrightSession>;

/// Where posts and comments are read from for a profile.
pub enum PageContent<'a> {
    Scripted(&'a PageScripts<'a>),
    Llm(LlmExtractor<&'a PlaywrightSession, OpenAiCompatibleChat>),
}

impl<'a> PageContent<'a> {
    pub fn new(
        config: &AppConfig,
        session: &'a PlaywrightSession,
        scripts: &'a PageScripts<'a>,
        chat: Option<OpenAiCompatibleChat>,
    ) -> Self {
        match chat {
            Some(chat) => PageContent::Llm(LlmExtractor::new(
                session,
                chat,
                ModelFallback::from_llm_config(&config.llm),
                settle(config),
            )),
            None => PageContent::Scripted(scripts),
        }
    }
}

impl ContentProvider for PageContent<'_> {
    async fn list_posts(
        &self,
        source: &str,
        max_count: usize,
        cutoff: Option<DateTime<Utc>>,
    ) -> Result<Vec<RawRecord>, CoreError> {
        match self {
            PageContent::Scripted(scripts) => scripts.list_posts(source, max_count, cutoff).await,
            PageContent::Llm(extractor) => extractor.list_posts(source, max_count, cutoff).await,
        }
    }

    async fn list_comments(
        &self,
        post_ref: &str,
        max_count: usize,
    ) -> Result<Vec<RawRecord>, CoreError> {
        match self {
            PageContent::Scripted(scripts) => scripts.list_comments(post_ref, max_count).await,
            PageContent::Llm(extractor) => extractor.list_comments(post_ref, max_count).await,
        }
    }
}
