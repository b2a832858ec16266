use chrono::{DateTime, Utc};
use engage_core::{
    ActionProvider, ActionTarget, ActionType, BrowserSession, ConfigError, ContentProvider,
    CoreError, ProfileScripts, ProviderError, RawRecord, ScriptKind,
};
use serde_json::{json, Value};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, warn};

/// Content and action provider driven by the user's page scripts.
///
/// Every script is a JavaScript function taking one JSON argument:
/// - `list_posts({ maxCount, cutoff })` returns an array of post records
/// - `list_comments({ maxCount })` returns an array of comment records
/// - `like` / `heart({ position, commentId })` returns `true` on success
pub struct ScriptedPlatform<S> {
    session: S,
    profile: String,
    scripts: ProfileScripts,
    settle: Duration,
    current_url: Mutex<Option<String>>,
}

impl<S: BrowserSession> ScriptedPlatform<S> {
    pub fn new(
        session: S,
        profile: impl Into<String>,
        scripts: ProfileScripts,
        settle: Duration,
    ) -> Self {
        Self {
            session,
            profile: profile.into(),
            scripts,
            settle,
            current_url: Mutex::new(None),
        }
    }

    pub fn session(&self) -> &S {
        &self.session
    }

    fn script(&self, kind: ScriptKind) -> Result<&str, CoreError> {
        self.scripts.get(kind).ok_or_else(|| {
            CoreError::from(ConfigError::MissingScript {
                profile: self.profile.clone(),
                script: kind.as_str().to_string(),
            })
        })
    }

    /// Navigates and waits for the page to settle.
    pub async fn open(&self, url: &str) -> Result<(), CoreError> {
        self.session.navigate(url).await?;
        if !self.settle.is_zero() {
            tokio::time::sleep(self.settle).await;
        }
        *self.current_url.lock().unwrap_or_else(|e| e.into_inner()) = Some(url.to_string());
        Ok(())
    }

    pub fn current_url(&self) -> Option<String> {
        self.current_url
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    async fn run_list_script(
        &self,
        kind: ScriptKind,
        arg: Value,
        max_count: usize,
    ) -> Result<Vec<RawRecord>, CoreError> {
        let script = self.script(kind)?;
        let result = self.session.evaluate(script, arg).await.map_err(|e| {
            CoreError::from(ProviderError::ScriptFailed {
                script: kind.as_str().to_string(),
                reason: e.to_string(),
            })
        })?;

        let items = match result {
            Value::Array(items) => items,
            other => {
                return Err(ProviderError::UnexpectedResult {
                    script: kind.as_str().to_string(),
                    details: format!("expected an array, got {}", other),
                }
                .into())
            }
        };

        // Non-objects become empty records so later items keep their page index.
        let records: Vec<RawRecord> = items
            .into_iter()
            .take(max_count)
            .enumerate()
            .map(|(i, item)| {
                RawRecord::from_value(item).unwrap_or_else(|e| {
                    warn!("Blanking {} item #{}: {}", kind.as_str(), i + 1, e);
                    RawRecord::new()
                })
            })
            .collect();

        debug!("{} returned {} records", kind.as_str(), records.len());
        Ok(records)
    }
}

impl<S: BrowserSession> ContentProvider for ScriptedPlatform<S> {
    async fn list_posts(
        &self,
        source: &str,
        max_count: usize,
        cutoff: Option<DateTime<Utc>>,
    ) -> Result<Vec<RawRecord>, CoreError> {
        self.open(source).await?;
        let arg = json!({
            "maxCount": max_count,
            "cutoff": cutoff.map(|c| c.to_rfc3339()),
        });
        self.run_list_script(ScriptKind::ListPosts, arg, max_count)
            .await
    }

    async fn list_comments(
        &self,
        post_ref: &str,
        max_count: usize,
    ) -> Result<Vec<RawRecord>, CoreError> {
        self.open(post_ref).await?;
        self.run_list_script(
            ScriptKind::ListComments,
            json!({ "maxCount": max_count }),
            max_count,
        )
        .await
    }
}

impl<S: BrowserSession> ActionProvider for ScriptedPlatform<S> {
    /// Runs against the page opened by the last `list_comments`.
    async fn apply_action(
        &self,
        action: ActionType,
        target: &ActionTarget,
    ) -> Result<bool, CoreError> {
        let kind = ScriptKind::for_action(action).ok_or_else(|| {
            CoreError::from(ProviderError::UnsupportedAction {
                action: action.to_string(),
            })
        })?;
        let script = self.script(kind)?;

        let arg = json!({
            "position": target.position,
            "commentId": target.comment_id,
        });
        let result = self.session.evaluate(script, arg).await?;

        let applied = result == Value::Bool(true);
        if !applied {
            debug!(
                "{} on comment #{} returned {}",
                action, target.position, result
            );
        }
        Ok(applied)
    }
}
