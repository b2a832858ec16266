use crate::error::*;
use std::time::Duration;
use tracing::{error, info, warn};

pub trait ErrorExt {
    fn log_error(&self) -> &Self;
    fn log_warn(&self) -> &Self;
    fn is_retryable(&self) -> bool;
    fn retry_after(&self) -> Option<Duration>;
    fn user_friendly_message(&self) -> String;
    fn error_code(&self) -> String;
}

impl ErrorExt for CoreError {
    fn log_error(&self) -> &Self {
        error!("CoreError: {}", self);
        match self {
            CoreError::Ledger(e) => {
                error!("Ledger error details: {:?}", e);
            }
            CoreError::Provider(e) => {
                error!("Provider error details: {:?}", e);
            }
            CoreError::Browser(e) => {
                error!("Browser error details: {:?}", e);
            }
            CoreError::Llm(e) => {
                error!(details = ?e, "Model provider error");
            }
            CoreError::Config(e) => {
                error!(details = ?e, "Configuration error");
            }
            _ => {}
        }
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("CoreError (warning): {}", self);
        self
    }

    fn is_retryable(&self) -> bool {
        match self {
            CoreError::Browser(e) => e.is_retryable(),
            CoreError::Llm(e) => e.is_retryable(),
            CoreError::Network(_) => true,
            _ => false,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            CoreError::Llm(LlmError::RateLimitExceeded { retry_after, .. }) => {
                Some(Duration::from_secs(*retry_after))
            }
            _ if self.is_retryable() => Some(Duration::from_secs(5)),
            _ => None,
        }
    }

    fn user_friendly_message(&self) -> String {
        match self {
            CoreError::Ledger(e) => e.user_friendly_message(),
            CoreError::Provider(e) => e.user_friendly_message(),
            CoreError::Browser(e) => e.user_friendly_message(),
            CoreError::Llm(e) => e.user_friendly_message(),
            CoreError::Config(e) => e.user_friendly_message(),
            CoreError::Network(_) => {
                "Could not reach the network.".to_string()
            }
            _ => "Something went wrong; rerun with --verbose for details.".to_string(),
        }
    }

    fn error_code(&self) -> String {
        match self {
            CoreError::Ledger(_) => "LEDGER".to_string(),
            CoreError::Provider(_) => "PROVIDER".to_string(),
            CoreError::Browser(_) => "BROWSER".to_string(),
            CoreError::Llm(_) => "LLM".to_string(),
            CoreError::Config(_) => "CONFIG".to_string(),
            CoreError::Io(_) => "IO".to_string(),
            CoreError::Serialization(_) => "SERIALIZATION".to_string(),
            CoreError::Network(_) => "NETWORK".to_string(),
        }
    }
}

impl ErrorExt for LedgerError {
    fn log_error(&self) -> &Self {
        error!("LedgerError: {}", self);
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("LedgerError (warning): {}", self);
        self
    }

    fn is_retryable(&self) -> bool {
        false
    }

    fn retry_after(&self) -> Option<Duration> {
        None
    }

    fn user_friendly_message(&self) -> String {
        match self {
            LedgerError::CreateDir { path, .. } => format!(
                "Could not create the state directory for {}. Please check permissions.",
                path
            ),
            LedgerError::Write { path, .. } | LedgerError::Replace { path, .. } => format!(
                "Could not save engagement state to {}. Already-handled comments may be acted on again next run.",
                path
            ),
            LedgerError::Encode(_) => "Engagement state could not be encoded.".to_string(),
        }
    }

    fn error_code(&self) -> String {
        match self {
            LedgerError::CreateDir { .. } => "LEDGER_CREATE_DIR".to_string(),
            LedgerError::Write { .. } => "LEDGER_WRITE".to_string(),
            LedgerError::Replace { .. } => "LEDGER_REPLACE".to_string(),
            LedgerError::Encode(_) => "LEDGER_ENCODE".to_string(),
        }
    }
}

impl ErrorExt for ProviderError {
    fn log_error(&self) -> &Self {
        error!("ProviderError: {}", self);
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("ProviderError (warning): {}", self);
        self
    }

    fn is_retryable(&self) -> bool {
        false
    }

    fn retry_after(&self) -> Option<Duration> {
        None
    }

    fn user_friendly_message(&self) -> String {
        match self {
            ProviderError::MissingReference { .. } => {
                "A discovered item had no link and was skipped.".to_string()
            }
            ProviderError::MalformedRecord { .. } => {
                "A discovered item could not be read and was skipped.".to_string()
            }
            ProviderError::ScriptFailed { script, .. } => format!(
                "The '{}' page script failed. Check the script against the current page layout.",
                script
            ),
            ProviderError::UnexpectedResult { script, .. } => {
                format!("The '{}' page script returned an unexpected value.", script)
            }
            ProviderError::UnsupportedAction { action } => {
                format!("The '{}' action is not supported here.", action)
            }
        }
    }

    fn error_code(&self) -> String {
        match self {
            ProviderError::MissingReference { .. } => "PROVIDER_MISSING_REFERENCE".to_string(),
            ProviderError::MalformedRecord { .. } => "PROVIDER_MALFORMED_RECORD".to_string(),
            ProviderError::ScriptFailed { .. } => "PROVIDER_SCRIPT_FAILED".to_string(),
            ProviderError::UnexpectedResult { .. } => "PROVIDER_UNEXPECTED_RESULT".to_string(),
            ProviderError::UnsupportedAction { .. } => "PROVIDER_UNSUPPORTED_ACTION".to_string(),
        }
    }
}

impl ErrorExt for BrowserError {
    fn log_error(&self) -> &Self {
        error!("BrowserError: {}", self);
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("BrowserError (warning): {}", self);
        self
    }

    fn is_retryable(&self) -> bool {
        matches!(
            self,
            BrowserError::RequestTimeout | BrowserError::Transport { .. }
        )
    }

    fn retry_after(&self) -> Option<Duration> {
        if self.is_retryable() {
            Some(Duration::from_secs(2))
        } else {
            None
        }
    }

    fn user_friendly_message(&self) -> String {
        match self {
            BrowserError::NotReachable { port } => format!(
                "Chrome is not running with remote debugging. Start it with: google-chrome --remote-debugging-port={}",
                port
            ),
            BrowserError::LaunchFailed { command, .. } => {
                format!("Could not start '{}'. Is it installed and on PATH?", command)
            }
            BrowserError::RequestTimeout => {
                "The browser took too long to respond. Please try again.".to_string()
            }
            _ => "Browser automation error occurred. Please try again.".to_string(),
        }
    }

    fn error_code(&self) -> String {
        match self {
            BrowserError::NotReachable { .. } => "BROWSER_NOT_REACHABLE".to_string(),
            BrowserError::LaunchFailed { .. } => "BROWSER_LAUNCH_FAILED".to_string(),
            BrowserError::Transport { .. } => "BROWSER_TRANSPORT".to_string(),
            BrowserError::Session { .. } => "BROWSER_SESSION".to_string(),
            BrowserError::ToolFailed { .. } => "BROWSER_TOOL_FAILED".to_string(),
            BrowserError::RequestTimeout => "BROWSER_TIMEOUT".to_string(),
        }
    }
}

impl ErrorExt for LlmError {
    fn log_error(&self) -> &Self {
        error!("LlmError: {}", self);
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("LlmError (warning): {}", self);
        self
    }

    fn is_retryable(&self) -> bool {
        matches!(
            self,
            LlmError::RateLimitExceeded { .. }
                | LlmError::ServiceUnavailable { .. }
                | LlmError::RequestTimeout { .. }
                | LlmError::ModelNotAvailable { .. }
                | LlmError::InvalidResponseFormat { .. }
        )
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            LlmError::RateLimitExceeded { retry_after, .. } => {
                Some(Duration::from_secs(*retry_after))
            }
            _ if self.is_retryable() => Some(Duration::from_secs(10)),
            _ => None,
        }
    }

    fn user_friendly_message(&self) -> String {
        match self {
            LlmError::InvalidApiKey { provider } => format!(
                "The {} API key was rejected. Set llm.api_key or LLM_API_KEY.",
                provider
            ),
            LlmError::RateLimitExceeded {
                provider,
                retry_after,
            } => format!(
                "{} is rate limiting requests; retry in {} seconds.",
                provider, retry_after
            ),
            LlmError::ModelNotAvailable { model } => format!(
                "Model '{}' is not available; add another to llm.fallback_models.",
                model
            ),
            LlmError::ServiceUnavailable { provider, .. } => format!(
                "{} is unavailable right now.",
                provider
            ),
            LlmError::Exhausted { .. } => {
                "None of the configured models produced a usable answer.".to_string()
            }
            _ => "The language model request failed.".to_string(),
        }
    }

    fn error_code(&self) -> String {
        match self {
            LlmError::InvalidApiKey { .. } => "LLM_INVALID_API_KEY".to_string(),
            LlmError::RateLimitExceeded { .. } => "LLM_RATE_LIMIT".to_string(),
            LlmError::ModelNotAvailable { .. } => "LLM_MODEL_NOT_AVAILABLE".to_string(),
            LlmError::ServiceUnavailable { .. } => "LLM_SERVICE_UNAVAILABLE".to_string(),
            LlmError::RequestTimeout { .. } => "LLM_TIMEOUT".to_string(),
            LlmError::InvalidResponseFormat { .. } => "LLM_INVALID_RESPONSE".to_string(),
            LlmError::Exhausted { .. } => "LLM_EXHAUSTED".to_string(),
        }
    }
}

impl ErrorExt for ConfigError {
    fn log_error(&self) -> &Self {
        error!("ConfigError: {}", self);
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("ConfigError (warning): {}", self);
        self
    }

    fn is_retryable(&self) -> bool {
        false // Config errors need the user to fix the file or the invocation
    }

    fn retry_after(&self) -> Option<Duration> {
        None
    }

    fn user_friendly_message(&self) -> String {
        match self {
            ConfigError::FileNotFound { path } => {
                format!("Configuration file '{}' not found. Run 'engagerunner init' first.", path)
            }
            ConfigError::Io { path, .. } => format!(
                "Could not read or write '{}'. Please check the path and permissions.",
                path
            ),
            ConfigError::AlreadyExists { path } => format!(
                "Configuration file '{}' already exists. Use --force to overwrite it.",
                path
            ),
            ConfigError::InvalidValue { field, .. } => {
                format!("Invalid value for configuration field '{}'.", field)
            }
            ConfigError::UnknownProfile { name } => {
                format!("Profile '{}' is not defined in the configuration.", name)
            }
            ConfigError::UnknownScenario { name } => {
                format!("Scenario '{}' is not defined in the configuration.", name)
            }
            ConfigError::MissingScript { profile, script } => format!(
                "Profile '{}' needs a '{}' script under [profiles.{}.scripts].",
                profile, script, profile
            ),
            ConfigError::UnsupportedProvider { provider } => format!(
                "LLM provider '{}' is not supported. Use 'openrouter' or 'openai'.",
                provider
            ),
            ConfigError::ValidationFailed { reason } => {
                format!("Configuration is invalid: {}", reason)
            }
            ConfigError::Parse(_) | ConfigError::Encode(_) => {
                "The configuration file is not valid TOML.".to_string()
            }
        }
    }

    fn error_code(&self) -> String {
        match self {
            ConfigError::FileNotFound { .. } => "CONFIG_FILE_NOT_FOUND".to_string(),
            ConfigError::Io { .. } => "CONFIG_IO".to_string(),
            ConfigError::AlreadyExists { .. } => "CONFIG_ALREADY_EXISTS".to_string(),
            ConfigError::InvalidValue { .. } => "CONFIG_INVALID_VALUE".to_string(),
            ConfigError::UnknownProfile { .. } => "CONFIG_UNKNOWN_PROFILE".to_string(),
            ConfigError::UnknownScenario { .. } => "CONFIG_UNKNOWN_SCENARIO".to_string(),
            ConfigError::MissingScript { .. } => "CONFIG_MISSING_SCRIPT".to_string(),
            ConfigError::UnsupportedProvider { .. } => "CONFIG_UNSUPPORTED_PROVIDER".to_string(),
            ConfigError::ValidationFailed { .. } => "CONFIG_VALIDATION_FAILED".to_string(),
            ConfigError::Parse(_) => "CONFIG_PARSE_ERROR".to_string(),
            ConfigError::Encode(_) => "CONFIG_ENCODE_ERROR".to_string(),
        }
    }
}

/// Logs the error that ended a command, with its code and retry hint.
#[derive(Debug, Default)]
pub struct ErrorReporter;

impl ErrorReporter {
    pub fn new() -> Self {
        Self
    }

    pub fn report_error(&self, error: &CoreError) {
        error.log_error();
        info!("Error code: {}", error.error_code());
        info!("User message: {}", error.user_friendly_message());
        if let Some(retry_after) = error.retry_after() {
            info!("Error is retryable. Retry after: {:?}", retry_after);
        }
    }
}
