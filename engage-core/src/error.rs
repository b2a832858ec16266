use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Browser error: {0}")]
    Browser(#[from] BrowserError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
}

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Failed to create state directory {path}: {source}")]
    CreateDir {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write state file {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to replace state file {path}: {source}")]
    Replace {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to encode state: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Error, Debug, Clone)]
pub enum ProviderError {
    #[error("Record has no usable reference: {details}")]
    MissingReference { details: String },

    #[error("Malformed record: {details}")]
    MalformedRecord { details: String },

    #[error("Script '{script}' failed: {reason}")]
    ScriptFailed { script: String, reason: String },

    #[error("Unexpected script result from '{script}': {details}")]
    UnexpectedResult { script: String, details: String },

    #[error("Action '{action}' is not supported by this provider")]
    UnsupportedAction { action: String },
}

#[derive(Error, Debug, Clone)]
pub enum BrowserError {
    #[error("Browser not reachable on port {port}. Start Chrome with: google-chrome --remote-debugging-port={port}")]
    NotReachable { port: u16 },

    #[error("Failed to launch {command}: {reason}")]
    LaunchFailed { command: String, reason: String },

    #[error("Browser session transport error: {details}")]
    Transport { details: String },

    #[error("Browser session returned error {code}: {message}")]
    Session { code: i32, message: String },

    #[error("Browser tool '{tool}' failed: {message}")]
    ToolFailed { tool: String, message: String },

    #[error("Browser request timed out")]
    RequestTimeout,
}

#[derive(Error, Debug, Clone)]
pub enum LlmError {
    #[error("API key invalid or missing for {provider}")]
    InvalidApiKey { provider: String },

    #[error("Rate limit exceeded for {provider}. Retry after {retry_after} seconds")]
    RateLimitExceeded { provider: String, retry_after: u64 },

    #[error("Model not available: {model}")]
    ModelNotAvailable { model: String },

    #[error("Provider service unavailable: {provider} (status {status_code})")]
    ServiceUnavailable { provider: String, status_code: u16 },

    #[error("Request timeout for {provider}")]
    RequestTimeout { provider: String },

    #[error("Invalid response format from {model}: {details}")]
    InvalidResponseFormat { model: String, details: String },

    #[error("All models failed after {attempts} attempts: {last_error}")]
    Exhausted { attempts: u32, last_error: String },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },

    #[error("Failed to access configuration file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Configuration file already exists: {path}")]
    AlreadyExists { path: String },

    #[error("Invalid value for {field}: {value}")]
    InvalidValue { field: String, value: String },

    #[error("Profile '{name}' not found in config")]
    UnknownProfile { name: String },

    #[error("Scenario '{name}' not found in config")]
    UnknownScenario { name: String },

    #[error("Profile '{profile}' has no '{script}' script configured")]
    MissingScript { profile: String, script: String },

    #[error("Unsupported LLM provider: {provider}")]
    UnsupportedProvider { provider: String },

    #[error("Configuration validation failed: {reason}")]
    ValidationFailed { reason: String },

    #[error("Configuration parsing error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Configuration encoding error: {0}")]
    Encode(#[from] toml::ser::Error),
}
