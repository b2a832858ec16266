use crate::discovery::{filter_posts, ingest_posts, plan_fetch};
use crate::report::{ActionEvent, ActionOutcome, RunReport};
use chrono::{DateTime, Utc};
use engage_core::{
    ActionProvider, ActionTarget, ActionType, Comment, ContentProvider, CoreError, ErrorExt,
    Platform, Post, RawRecord, Scenario,
};
use engage_ledger::{ActionLedger, RecordKind};
use platform_client::RateGovernor;
use std::collections::HashSet;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy)]
pub struct RunOptions {
    pub dry_run: bool,
    /// Reference instant for every relative timestamp in the run.
    pub reference_now: DateTime<Utc>,
}

impl RunOptions {
    pub fn now(dry_run: bool) -> Self {
        Self {
            dry_run,
            reference_now: Utc::now(),
        }
    }
}

/// Drives one scenario over a content source: discover, filter, fetch
/// comments, then dispatch each configured action through the governor and
/// the ledger.
pub struct EngagementOrchestrator<C, A> {
    content: C,
    actions: A,
    ledger: ActionLedger,
    governor: RateGovernor,
    platform: Platform,
}

impl<C: ContentProvider, A: ActionProvider> EngagementOrchestrator<C, A> {
    pub fn new(
        content: C,
        actions: A,
        ledger: ActionLedger,
        governor: RateGovernor,
        platform: Platform,
    ) -> Self {
        Self {
            content,
            actions,
            ledger,
            governor,
            platform,
        }
    }

    pub fn ledger(&self) -> &ActionLedger {
        &self.ledger
    }

    /// Lists posts from `source` without filtering.
    pub async fn fetch_posts(&self, source: &str, max_count: usize) -> Result<Vec<Post>, CoreError> {
        let raw = self.content.list_posts(source, max_count, None).await?;
        let (mut posts, _) = ingest_posts(&raw);
        posts.truncate(max_count);
        Ok(posts)
    }

    /// Lists and normalizes the comments of one post.
    pub async fn fetch_comments(
        &self,
        post_url: &str,
        max_count: usize,
        now: DateTime<Utc>,
    ) -> Result<Vec<Comment>, CoreError> {
        let raw = self.content.list_comments(post_url, max_count).await?;
        Ok(self.ingest_comments(&raw, max_count, post_url, now))
    }

    fn ingest_comments(
        &self,
        raw: &[RawRecord],
        max_count: usize,
        post_url: &str,
        now: DateTime<Utc>,
    ) -> Vec<Comment> {
        // Positions count every record so they keep matching the page.
        raw.iter()
            .take(max_count)
            .enumerate()
            .filter_map(|(index, record)| {
                match Comment::from_raw(record, index + 1, self.platform, now, post_url) {
                    Ok(comment) => Some(comment),
                    Err(e) => {
                        warn!("Skipping comment on {}: {}", post_url, e);
                        None
                    }
                }
            })
            .collect()
    }

    pub async fn run(&mut self, scenario: &Scenario, source: &str, options: RunOptions) -> RunReport {
        let mut report = RunReport::new(options.dry_run);
        let now = options.reference_now;
        let method = scenario.discovery.method();
        let plan = plan_fetch(&method, now);

        info!(
            "Discovering up to {} posts from {} ({:?})",
            plan.max_count, source, method
        );
        let raw_posts = match self
            .content
            .list_posts(source, plan.max_count, plan.cutoff)
            .await
        {
            Ok(raw) => raw,
            Err(e) => {
                e.log_error();
                report.discovery_error = Some(e.user_friendly_message());
                return report;
            }
        };
        report.posts_discovered = raw_posts.len();

        let (posts, skipped) = ingest_posts(&raw_posts);
        report.posts_skipped += skipped;

        let filtered = filter_posts(posts, &method, now);
        report.posts_kept = filtered.kept.len();
        info!(
            "Kept {} of {} posts ({} too old, {} with unreadable dates)",
            filtered.kept.len(),
            report.posts_discovered,
            filtered.too_old,
            filtered.unparsed
        );

        let per_post = scenario.max_comments_per_post as usize;
        // Comments a dry run would already have marked.
        let mut planned: HashSet<String> = HashSet::new();

        for post in &filtered.kept {
            let comments = match self.fetch_comments(&post.url, per_post, now).await {
                Ok(comments) => comments,
                Err(e) => {
                    e.log_warn();
                    warn!("Skipping post {}: comments could not be listed", post.url);
                    report.posts_skipped += 1;
                    continue;
                }
            };
            report.posts_visited += 1;
            report.comments_seen += comments.len();
            debug!("Post {} has {} comments to consider", post.url, comments.len());

            for spec in &scenario.actions {
                if spec.kind == ActionType::Reply {
                    debug!(
                        "Reply actions are not sent; {} comments left alone",
                        comments.len()
                    );
                    report.replies_deferred += comments.len();
                    continue;
                }

                for comment in &comments {
                    self.handle_comment(
                        spec.kind,
                        post,
                        comment,
                        options.dry_run,
                        &mut planned,
                        &mut report,
                    )
                    .await;
                }
            }

            if !options.dry_run {
                self.ledger.mark_processed(RecordKind::Video, &post.url);
                if let Err(e) = self.ledger.persist() {
                    e.log_error();
                    report.record_persist_failure(e.to_string());
                }
            }
        }

        info!("Run finished: {}", report.summary());
        report
    }

    async fn handle_comment(
        &mut self,
        action: ActionType,
        post: &Post,
        comment: &Comment,
        dry_run: bool,
        planned: &mut HashSet<String>,
        report: &mut RunReport,
    ) {
        if self.ledger.is_processed(RecordKind::Comment, &comment.id)
            || planned.contains(&comment.id)
        {
            debug!("Comment {} already processed", comment.id);
            report.already_processed += 1;
            return;
        }

        let event = |outcome| ActionEvent {
            post_url: post.url.clone(),
            comment_id: comment.id.clone(),
            author: comment.author.clone(),
            position: comment.position,
            action,
            outcome,
        };

        if dry_run {
            info!(
                "[dry run] would {} comment #{} by {}",
                action, comment.position, comment.author
            );
            planned.insert(comment.id.clone());
            report.record(event(ActionOutcome::WouldApply));
            return;
        }

        let receipt = self.governor.throttle().await;
        debug!("Throttled for {:?} before {}", receipt.total(), action);

        let target = ActionTarget {
            position: comment.position,
            comment_id: comment.id.clone(),
        };
        match self.actions.apply_action(action, &target).await {
            Ok(true) => {
                info!("{} comment #{} by {}", action, comment.position, comment.author);
                self.ledger.mark_processed(RecordKind::Comment, &comment.id);
                report.record(event(ActionOutcome::Applied));
                if let Err(e) = self.ledger.persist() {
                    e.log_error();
                    report.record_persist_failure(e.to_string());
                }
            }
            Ok(false) => {
                warn!(
                    "Could not {} comment #{} by {}",
                    action, comment.position, comment.author
                );
                report.record(event(ActionOutcome::Failed("action had no effect".to_string())));
            }
            Err(e) => {
                e.log_warn();
                report.record(event(ActionOutcome::Failed(e.to_string())));
            }
        }
    }
}
