//! Seams between the orchestration core and the things that talk to a page.

use crate::error::CoreError;
use crate::types::{ActionTarget, ActionType, RawRecord};
use chrono::{DateTime, Utc};
use serde_json::Value;

/// Discovers posts and their comments as raw records.
#[allow(async_fn_in_trait)]
pub trait ContentProvider {
    /// `cutoff` is a hint; providers may ignore it and the caller filters again.
    async fn list_posts(
        &self,
        source: &str,
        max_count: usize,
        cutoff: Option<DateTime<Utc>>,
    ) -> Result<Vec<RawRecord>, CoreError>;

    async fn list_comments(
        &self,
        post_ref: &str,
        max_count: usize,
    ) -> Result<Vec<RawRecord>, CoreError>;
}

/// Applies one engagement action. `Ok(false)` means the action did not take
/// effect (element missing, button disabled) and is not an error.
#[allow(async_fn_in_trait)]
pub trait ActionProvider {
    async fn apply_action(
        &self,
        action: ActionType,
        target: &ActionTarget,
    ) -> Result<bool, CoreError>;
}

/// An attached browser tab. Shared by reference when one tab serves both
/// discovery and actions.
#[allow(async_fn_in_trait)]
pub trait BrowserSession {
    async fn navigate(&self, url: &str) -> Result<(), CoreError>;

    /// Runs `function_source` (a JavaScript function expression) in the page
    /// with `arg` as its only argument and returns its JSON result.
    async fn evaluate(&self, function_source: &str, arg: Value) -> Result<Value, CoreError>;
}

impl<T: ContentProvider + ?Sized> ContentProvider for &T {
    async fn list_posts(
        &self,
        source: &str,
        max_count: usize,
        cutoff: Option<DateTime<Utc>>,
    ) -> Result<Vec<RawRecord>, CoreError> {
        (**self).list_posts(source, max_count, cutoff).await
    }

    async fn list_comments(
        &self,
        post_ref: &str,
        max_count: usize,
    ) -> Result<Vec<RawRecord>, CoreError> {
        (**self).list_comments(post_ref, max_count).await
    }
}

impl<T: ActionProvider + ?Sized> ActionProvider for &T {
    async fn apply_action(
        &self,
        action: ActionType,
        target: &ActionTarget,
    ) -> Result<bool, CoreError> {
        (**self).apply_action(action, target).await
    }
}

impl<T: BrowserSession + ?Sized> BrowserSession for &T {
    async fn navigate(&self, url: &str) -> Result<(), CoreError> {
        (**self).navigate(url).await
    }

    async fn evaluate(&self, function_source: &str, arg: Value) -> Result<Value, CoreError> {
        (**self).evaluate(function_source, arg).await
    }
}
