use engage_core::{ErrorExt, LlmConfig, LlmError};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct FallbackConfig {
    /// Total attempts across all models.
    pub max_attempts: u32,
    /// Base delay for exponential backoff (in milliseconds)
    pub base_delay_ms: u64,
    /// Maximum delay between attempts (in milliseconds)
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
    /// Maximum jitter factor (0.0 to 1.0)
    pub jitter_factor: f64,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
            max_delay_ms: 10_000,
            backoff_multiplier: 2.0,
            jitter_factor: 0.1,
        }
    }
}

/// Exponential backoff for `attempt` (0-based), with jitter, capped.
pub fn calculate_delay(attempt: u32, config: &FallbackConfig) -> Duration {
    let max_delay = Duration::from_millis(config.max_delay_ms);

    let multiplier = config.backoff_multiplier.powi(attempt as i32);
    let delay_ms = (config.base_delay_ms as f64 * multiplier) as u64;
    let exponential_delay = Duration::from_millis(delay_ms.min(config.max_delay_ms));

    let jitter_range = (exponential_delay.as_millis() as f64 * config.jitter_factor) as u64;
    let jitter = fastrand::u64(0..=jitter_range);

    (exponential_delay + Duration::from_millis(jitter)).min(max_delay)
}

/// Tries an operation over an ordered list of models.
///
/// Attempt `n` uses the `n`-th model; once the list runs out the last model
/// is reused until `max_attempts` is spent. Errors that are not retryable
/// (bad credentials, for one) end the loop at once.
#[derive(Debug, Clone)]
pub struct ModelFallback {
    models: Vec<String>,
    config: FallbackConfig,
}

impl ModelFallback {
    pub fn new(models: Vec<String>, config: FallbackConfig) -> Self {
        Self { models, config }
    }

    pub fn from_llm_config(llm: &LlmConfig) -> Self {
        Self::new(
            llm.models(),
            FallbackConfig {
                max_attempts: llm.max_attempts,
                ..FallbackConfig::default()
            },
        )
    }

    fn model_for_attempt(&self, attempt: u32) -> Option<&str> {
        let last = self.models.len().checked_sub(1)?;
        let index = (attempt as usize).min(last);
        self.models.get(index).map(String::as_str)
    }

    pub async fn run<F, Fut, T>(&self, operation: F) -> Result<T, LlmError>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<T, LlmError>>,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let mut last_error: Option<LlmError> = None;

        for attempt in 0..max_attempts {
            let Some(model) = self.model_for_attempt(attempt) else {
                break;
            };

            if attempt > 0 {
                let delay = calculate_delay(attempt - 1, &self.config);
                debug!("Waiting {:?} before trying model {}", delay, model);
                sleep(delay).await;
            }

            match operation(model.to_string()).await {
                Ok(value) => {
                    if attempt > 0 {
                        debug!("Model {} succeeded on attempt {}", model, attempt + 1);
                    }
                    return Ok(value);
                }
                Err(e) if !e.is_retryable() => {
                    e.log_error();
                    return Err(e);
                }
                Err(e) => {
                    warn!("Model {} failed (attempt {}): {}", model, attempt + 1, e);
                    last_error = Some(e);
                }
            }
        }

        let attempts = if self.models.is_empty() { 0 } else { max_attempts };
        Err(LlmError::Exhausted {
            attempts,
            last_error: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no models configured".to_string()),
        })
    }
}
