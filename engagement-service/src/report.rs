use engage_core::ActionType;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status", content = "reason")]
pub enum ActionOutcome {
    Applied,
    WouldApply,
    Failed(String),
}

/// One dispatched (or, in a dry run, planned) action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionEvent {
    pub post_url: String,
    pub comment_id: String,
    pub author: String,
    pub position: usize,
    pub action: ActionType,
    pub outcome: ActionOutcome,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub dry_run: bool,
    pub posts_discovered: usize,
    pub posts_kept: usize,
    pub posts_visited: usize,
    pub posts_skipped: usize,
    pub comments_seen: usize,
    /// Acted on, or in a dry run, would have been acted on.
    pub comments_acted: usize,
    pub already_processed: usize,
    pub failed_actions: usize,
    pub replies_deferred: usize,
    pub persist_failures: usize,
    pub last_persist_error: Option<String>,
    pub discovery_error: Option<String>,
    pub events: Vec<ActionEvent>,
}

impl RunReport {
    pub fn new(dry_run: bool) -> Self {
        Self {
            dry_run,
            ..Self::default()
        }
    }

    pub fn record(&mut self, event: ActionEvent) {
        match &event.outcome {
            ActionOutcome::Applied | ActionOutcome::WouldApply => self.comments_acted += 1,
            ActionOutcome::Failed(_) => self.failed_actions += 1,
        }
        self.events.push(event);
    }

    pub fn record_persist_failure(&mut self, message: String) {
        self.persist_failures += 1;
        self.last_persist_error = Some(message);
    }

    pub fn has_persist_failures(&self) -> bool {
        self.persist_failures > 0
    }

    pub fn summary(&self) -> String {
        let verb = if self.dry_run { "would act on" } else { "acted on" };
        let mut summary = format!(
            "{} posts visited of {} kept ({} discovered); {} {} comments, {} already processed, {} failed",
            self.posts_visited,
            self.posts_kept,
            self.posts_discovered,
            verb,
            self.comments_acted,
            self.already_processed,
            self.failed_actions
        );
        if self.replies_deferred > 0 {
            summary.push_str(&format!(", {} replies not sent", self.replies_deferred));
        }
        if self.persist_failures > 0 {
            summary.push_str(&format!(
                ", {} ledger writes failed",
                self.persist_failures
            ));
        }
        summary
    }
}
