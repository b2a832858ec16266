use crate::{ActionOutcome, EngagementOrchestrator, RunOptions};
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use engage_core::{
    ActionProvider, ActionSpec, ActionTarget, ActionType, BrowserError, BrowserSession,
    ContentProvider, CoreError, DiscoveryConfig, DiscoveryKind, Platform, ProfileScripts,
    ProviderError, RawRecord, Scenario, UnparsedTimePolicy,
};
use engage_ledger::{ActionLedger, RecordKind};
use platform_client::{GovernorConfig, RateGovernor, ScriptedPlatform};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Default)]
struct FakeContent {
    posts: Vec<RawRecord>,
    comments: HashMap<String, Vec<RawRecord>>,
    fail_discovery: bool,
    post_requests: Mutex<Vec<(usize, Option<DateTime<Utc>>)>>,
    comment_requests: Mutex<Vec<String>>,
}

impl FakeContent {
    fn with_post(mut self, url: &str, posted: &str, comment_ids: &[&str]) -> Self {
        self.posts.push(
            RawRecord::new()
                .with("url", url)
                .with("title", format!("Video {}", url))
                .with("posted", posted),
        );
        let comments = comment_ids
            .iter()
            .map(|id| {
                RawRecord::new()
                    .with("id", *id)
                    .with("author", format!("@{}", id))
                    .with("text", "nice video")
                    .with("timestamp", "1 hour ago")
            })
            .collect();
        self.comments.insert(url.to_string(), comments);
        self
    }
}

impl ContentProvider for FakeContent {
    async fn list_posts(
        &self,
        _source: &str,
        max_count: usize,
        cutoff: Option<DateTime<Utc>>,
    ) -> Result<Vec<RawRecord>, CoreError> {
        self.post_requests.lock().unwrap().push((max_count, cutoff));
        if self.fail_discovery {
            return Err(BrowserError::NotReachable { port: 9222 }.into());
        }
        Ok(self.posts.iter().take(max_count).cloned().collect())
    }

    async fn list_comments(
        &self,
        post_ref: &str,
        max_count: usize,
    ) -> Result<Vec<RawRecord>, CoreError> {
        self.comment_requests
            .lock()
            .unwrap()
            .push(post_ref.to_string());
        let comments = self.comments.get(post_ref).ok_or_else(|| {
            CoreError::from(ProviderError::ScriptFailed {
                script: "list_comments".to_string(),
                reason: "comment section did not load".to_string(),
            })
        })?;
        Ok(comments.iter().take(max_count).cloned().collect())
    }
}

/// Records every dispatched action; `refuse` answers false, `broken` errors.
#[derive(Default)]
struct FakeActions {
    calls: Mutex<Vec<(ActionType, usize, String)>>,
    refuse: HashSet<String>,
    broken: HashSet<String>,
}

impl FakeActions {
    fn calls(&self) -> Vec<(ActionType, usize, String)> {
        self.calls.lock().unwrap().clone()
    }
}

impl ActionProvider for FakeActions {
    async fn apply_action(
        &self,
        action: ActionType,
        target: &ActionTarget,
    ) -> Result<bool, CoreError> {
        self.calls
            .lock()
            .unwrap()
            .push((action, target.position, target.comment_id.clone()));
        if self.broken.contains(&target.comment_id) {
            return Err(BrowserError::RequestTimeout.into());
        }
        Ok(!self.refuse.contains(&target.comment_id))
    }
}

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
}

fn instant_governor() -> RateGovernor {
    RateGovernor::new(GovernorConfig {
        actions_per_minute: 1000,
        min_delay: Duration::ZERO,
        max_delay: Duration::ZERO,
    })
}

fn scenario(method: DiscoveryKind, limit: u32, actions: &[ActionType]) -> Scenario {
    Scenario {
        discovery: DiscoveryConfig {
            method,
            limit,
            on_unparsed_time: UnparsedTimePolicy::Exclude,
        },
        actions: actions
            .iter()
            .map(|kind| ActionSpec {
                kind: *kind,
                template: None,
            })
            .collect(),
        max_comments_per_post: 10,
    }
}

fn orchestrator<'a>(
    content: &'a FakeContent,
    actions: &'a FakeActions,
    ledger: ActionLedger,
) -> EngagementOrchestrator<&'a FakeContent, &'a FakeActions> {
    EngagementOrchestrator::new(content, actions, ledger, instant_governor(), Platform::Youtube)
}

fn real() -> RunOptions {
    RunOptions {
        dry_run: false,
        reference_now: now(),
    }
}

fn dry() -> RunOptions {
    RunOptions {
        dry_run: true,
        reference_now: now(),
    }
}

fn two_posts() -> FakeContent {
    FakeContent::default()
        .with_post("https://v.test/a", "1 day ago", &["a1", "a2"])
        .with_post("https://v.test/b", "3 days ago", &["b1", "b2"])
}

#[tokio::test]
async fn test_second_run_dispatches_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let state = dir.path().join("state.json");
    let content = two_posts();
    let like = scenario(DiscoveryKind::AllPosts, 0, &[ActionType::Like]);

    let first_actions = FakeActions::default();
    let mut first = orchestrator(&content, &first_actions, ActionLedger::open(&state));
    let report = first.run(&like, "https://v.test/channel", real()).await;
    assert_eq!(report.comments_acted, 4);
    assert_eq!(first_actions.calls().len(), 4);

    let second_actions = FakeActions::default();
    let mut second = orchestrator(&content, &second_actions, ActionLedger::open(&state));
    let report = second.run(&like, "https://v.test/channel", real()).await;
    assert!(second_actions.calls().is_empty());
    assert_eq!(report.comments_acted, 0);
    assert_eq!(report.already_processed, 4);
    // Posts are still visited; new comments arrive on old posts.
    assert_eq!(report.posts_visited, 2);
}

#[tokio::test]
async fn test_dry_run_has_no_side_effects() {
    let dir = tempfile::tempdir().unwrap();
    let state = dir.path().join("state.json");
    let content = two_posts();
    let actions = FakeActions::default();

    let mut orchestrator = orchestrator(&content, &actions, ActionLedger::open(&state));
    let report = orchestrator
        .run(
            &scenario(DiscoveryKind::AllPosts, 0, &[ActionType::Like]),
            "https://v.test/channel",
            dry(),
        )
        .await;

    assert!(report.dry_run);
    assert_eq!(report.comments_acted, 4);
    assert!(report
        .events
        .iter()
        .all(|e| e.outcome == ActionOutcome::WouldApply));
    assert!(actions.calls().is_empty());
    assert!(!state.exists());
    assert_eq!(orchestrator.ledger().processed_count(RecordKind::Comment), 0);
    assert_eq!(orchestrator.ledger().processed_count(RecordKind::Video), 0);
}

#[tokio::test]
async fn test_dry_run_mirrors_in_run_dedup() {
    let dir = tempfile::tempdir().unwrap();
    let content = two_posts();
    let both = scenario(
        DiscoveryKind::AllPosts,
        0,
        &[ActionType::Like, ActionType::Heart],
    );

    let actions = FakeActions::default();
    let mut planned = orchestrator(
        &content,
        &actions,
        ActionLedger::open(dir.path().join("dry.json")),
    );
    let dry_report = planned.run(&both, "https://v.test/channel", dry()).await;

    let mut executed = orchestrator(
        &content,
        &actions,
        ActionLedger::open(dir.path().join("real.json")),
    );
    let real_report = executed.run(&both, "https://v.test/channel", real()).await;

    assert_eq!(dry_report.comments_acted, real_report.comments_acted);
    assert_eq!(dry_report.already_processed, real_report.already_processed);
    // Hearts find every comment already liked.
    assert_eq!(real_report.comments_acted, 4);
    assert_eq!(real_report.already_processed, 4);
    assert!(actions.calls().iter().all(|(kind, _, _)| *kind == ActionType::Like));
}

#[tokio::test]
async fn test_heart_scenario_dispatches_hearts_by_position() {
    let dir = tempfile::tempdir().unwrap();
    let content = FakeContent::default().with_post("https://v.test/a", "1 day ago", &["x", "y"]);
    let actions = FakeActions::default();

    let mut orchestrator = orchestrator(
        &content,
        &actions,
        ActionLedger::open(dir.path().join("state.json")),
    );
    orchestrator
        .run(
            &scenario(DiscoveryKind::AllPosts, 0, &[ActionType::Heart]),
            "https://v.test/channel",
            real(),
        )
        .await;

    assert_eq!(
        actions.calls(),
        vec![
            (ActionType::Heart, 1, "x".to_string()),
            (ActionType::Heart, 2, "y".to_string()),
        ]
    );
}

#[tokio::test]
async fn test_recent_days_visits_only_recent_posts() {
    let dir = tempfile::tempdir().unwrap();
    let content = FakeContent::default()
        .with_post("https://v.test/new", "2 hours ago", &["n1"])
        .with_post("https://v.test/old", "400 days ago", &["o1"]);
    let actions = FakeActions::default();

    let mut orchestrator = orchestrator(
        &content,
        &actions,
        ActionLedger::open(dir.path().join("state.json")),
    );
    let report = orchestrator
        .run(
            &scenario(DiscoveryKind::RecentDays, 7, &[ActionType::Like]),
            "https://v.test/channel",
            real(),
        )
        .await;

    assert_eq!(report.posts_discovered, 2);
    assert_eq!(report.posts_kept, 1);
    assert_eq!(
        *content.comment_requests.lock().unwrap(),
        vec!["https://v.test/new".to_string()]
    );
    assert_eq!(
        *content.post_requests.lock().unwrap(),
        vec![(100, Some(now() - ChronoDuration::days(7)))]
    );
    assert_eq!(actions.calls().len(), 1);
}

#[tokio::test]
async fn test_unreadable_upload_time_follows_policy() {
    let dir = tempfile::tempdir().unwrap();
    let content = FakeContent::default().with_post("https://v.test/live", "Premiered", &["p1"]);
    let actions = FakeActions::default();
    let mut orchestrator = orchestrator(
        &content,
        &actions,
        ActionLedger::open(dir.path().join("state.json")),
    );

    let mut recent = scenario(DiscoveryKind::RecentDays, 7, &[ActionType::Like]);
    let report = orchestrator.run(&recent, "https://v.test/channel", dry()).await;
    assert_eq!(report.posts_kept, 0);

    recent.discovery.on_unparsed_time = UnparsedTimePolicy::Include;
    let report = orchestrator.run(&recent, "https://v.test/channel", dry()).await;
    assert_eq!(report.posts_kept, 1);
    assert_eq!(report.comments_acted, 1);
}

#[tokio::test]
async fn test_recent_posts_fetches_limit_and_truncates() {
    let dir = tempfile::tempdir().unwrap();
    let mut content = FakeContent::default();
    for i in 0..5 {
        content = content.with_post(&format!("https://v.test/{}", i), "1 day ago", &[]);
    }
    let actions = FakeActions::default();
    let mut orchestrator = orchestrator(
        &content,
        &actions,
        ActionLedger::open(dir.path().join("state.json")),
    );

    let report = orchestrator
        .run(
            &scenario(DiscoveryKind::RecentPosts, 2, &[ActionType::Like]),
            "https://v.test/channel",
            real(),
        )
        .await;

    assert_eq!(content.post_requests.lock().unwrap()[0].0, 2);
    assert_eq!(report.posts_visited, 2);
}

#[tokio::test]
async fn test_post_without_url_is_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let mut content = FakeContent::default().with_post("https://v.test/a", "1 day ago", &["a1"]);
    content
        .posts
        .insert(0, RawRecord::new().with("title", "members only"));
    let actions = FakeActions::default();
    let mut orchestrator = orchestrator(
        &content,
        &actions,
        ActionLedger::open(dir.path().join("state.json")),
    );

    let report = orchestrator
        .run(
            &scenario(DiscoveryKind::AllPosts, 0, &[ActionType::Like]),
            "https://v.test/channel",
            real(),
        )
        .await;

    assert_eq!(report.posts_discovered, 2);
    assert_eq!(report.posts_skipped, 1);
    assert_eq!(report.posts_visited, 1);
    assert_eq!(report.comments_acted, 1);
}

#[tokio::test]
async fn test_failed_actions_do_not_stop_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let content =
        FakeContent::default().with_post("https://v.test/a", "1 day ago", &["c1", "c2", "c3"]);
    let actions = FakeActions {
        refuse: HashSet::from(["c1".to_string()]),
        broken: HashSet::from(["c2".to_string()]),
        ..FakeActions::default()
    };
    let mut orchestrator = orchestrator(
        &content,
        &actions,
        ActionLedger::open(dir.path().join("state.json")),
    );

    let report = orchestrator
        .run(
            &scenario(DiscoveryKind::AllPosts, 0, &[ActionType::Like]),
            "https://v.test/channel",
            real(),
        )
        .await;

    assert_eq!(actions.calls().len(), 3);
    assert_eq!(report.comments_acted, 1);
    assert_eq!(report.failed_actions, 2);
    let ledger = orchestrator.ledger();
    assert!(!ledger.is_processed(RecordKind::Comment, "c1"));
    assert!(!ledger.is_processed(RecordKind::Comment, "c2"));
    assert!(ledger.is_processed(RecordKind::Comment, "c3"));
}

#[tokio::test]
async fn test_replies_are_recognized_but_not_sent() {
    let dir = tempfile::tempdir().unwrap();
    let content = FakeContent::default().with_post("https://v.test/a", "1 day ago", &["c1", "c2"]);
    let actions = FakeActions::default();
    let mut orchestrator = orchestrator(
        &content,
        &actions,
        ActionLedger::open(dir.path().join("state.json")),
    );

    let report = orchestrator
        .run(
            &scenario(
                DiscoveryKind::AllPosts,
                0,
                &[ActionType::Reply, ActionType::Like],
            ),
            "https://v.test/channel",
            real(),
        )
        .await;

    assert_eq!(report.replies_deferred, 2);
    assert_eq!(report.comments_acted, 2);
    assert!(actions
        .calls()
        .iter()
        .all(|(kind, _, _)| *kind == ActionType::Like));
}

#[tokio::test]
async fn test_discovery_failure_yields_empty_report() {
    let dir = tempfile::tempdir().unwrap();
    let content = FakeContent {
        fail_discovery: true,
        ..two_posts()
    };
    let actions = FakeActions::default();
    let mut orchestrator = orchestrator(
        &content,
        &actions,
        ActionLedger::open(dir.path().join("state.json")),
    );

    let report = orchestrator
        .run(
            &scenario(DiscoveryKind::AllPosts, 0, &[ActionType::Like]),
            "https://v.test/channel",
            real(),
        )
        .await;

    assert!(report.discovery_error.is_some());
    assert_eq!(report.posts_discovered, 0);
    assert_eq!(report.comments_acted, 0);
    assert!(actions.calls().is_empty());
}

#[tokio::test]
async fn test_comment_listing_failure_skips_post() {
    let dir = tempfile::tempdir().unwrap();
    let mut content = two_posts();
    content.comments.remove("https://v.test/a");
    let actions = FakeActions::default();
    let mut orchestrator = orchestrator(
        &content,
        &actions,
        ActionLedger::open(dir.path().join("state.json")),
    );

    let report = orchestrator
        .run(
            &scenario(DiscoveryKind::AllPosts, 0, &[ActionType::Like]),
            "https://v.test/channel",
            real(),
        )
        .await;

    assert_eq!(report.posts_skipped, 1);
    assert_eq!(report.posts_visited, 1);
    assert_eq!(report.comments_acted, 2);
    assert!(!orchestrator
        .ledger()
        .is_processed(RecordKind::Video, "https://v.test/a"));
    assert!(orchestrator
        .ledger()
        .is_processed(RecordKind::Video, "https://v.test/b"));
}

#[tokio::test]
async fn test_comments_capped_per_post() {
    let dir = tempfile::tempdir().unwrap();
    let content = FakeContent::default().with_post(
        "https://v.test/a",
        "1 day ago",
        &["c1", "c2", "c3", "c4", "c5"],
    );
    let actions = FakeActions::default();
    let mut orchestrator = orchestrator(
        &content,
        &actions,
        ActionLedger::open(dir.path().join("state.json")),
    );

    let mut capped = scenario(DiscoveryKind::AllPosts, 0, &[ActionType::Like]);
    capped.max_comments_per_post = 2;
    let report = orchestrator
        .run(&capped, "https://v.test/channel", real())
        .await;

    assert_eq!(report.comments_seen, 2);
    assert_eq!(actions.calls().len(), 2);
}

#[tokio::test]
async fn test_persist_failure_is_reported_not_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("blocker");
    std::fs::write(&blocker, "not a directory").unwrap();

    let content = two_posts();
    let actions = FakeActions::default();
    let mut orchestrator = orchestrator(
        &content,
        &actions,
        ActionLedger::open(blocker.join("state.json")),
    );

    let report = orchestrator
        .run(
            &scenario(
                DiscoveryKind::AllPosts,
                0,
                &[ActionType::Like, ActionType::Heart],
            ),
            "https://v.test/channel",
            real(),
        )
        .await;

    assert_eq!(report.comments_acted, 4);
    assert!(report.has_persist_failures());
    assert!(report.last_persist_error.is_some());
    // The in-memory ledger still prevents repeats within the run.
    assert_eq!(report.already_processed, 4);
    assert_eq!(actions.calls().len(), 4);
}

#[tokio::test]
async fn test_malformed_comment_keeps_page_positions() {
    let dir = tempfile::tempdir().unwrap();
    let mut content = FakeContent::default().with_post("https://v.test/a", "1 day ago", &["c2"]);
    content
        .comments
        .get_mut("https://v.test/a")
        .unwrap()
        .insert(0, RawRecord::new().with("likes", 3));
    let actions = FakeActions::default();
    let mut orchestrator = orchestrator(
        &content,
        &actions,
        ActionLedger::open(dir.path().join("state.json")),
    );

    orchestrator
        .run(
            &scenario(DiscoveryKind::AllPosts, 0, &[ActionType::Like]),
            "https://v.test/channel",
            real(),
        )
        .await;

    assert_eq!(actions.calls(), vec![(ActionType::Like, 2, "c2".to_string())]);
}

/// A browser tab whose scripts answer with canned JSON, keyed by source.
struct CannedPage {
    answers: HashMap<&'static str, Value>,
    evaluations: Mutex<Vec<(String, Value)>>,
}

impl CannedPage {
    fn new(answers: &[(&'static str, Value)]) -> Self {
        Self {
            answers: answers.iter().cloned().collect(),
            evaluations: Mutex::new(Vec::new()),
        }
    }

    fn calls_to(&self, script: &str) -> Vec<Value> {
        self.evaluations
            .lock()
            .unwrap()
            .iter()
            .filter(|(source, _)| source == script)
            .map(|(_, arg)| arg.clone())
            .collect()
    }
}

impl BrowserSession for CannedPage {
    async fn navigate(&self, _url: &str) -> Result<(), CoreError> {
        Ok(())
    }

    async fn evaluate(&self, function_source: &str, arg: Value) -> Result<Value, CoreError> {
        self.evaluations
            .lock()
            .unwrap()
            .push((function_source.to_string(), arg));
        self.answers.get(function_source).cloned().ok_or_else(|| {
            BrowserError::ToolFailed {
                tool: "browser_evaluate".to_string(),
                message: format!("no answer for {}", function_source),
            }
            .into()
        })
    }
}

#[tokio::test]
async fn test_scripted_page_positions_count_non_object_items() {
    let dir = tempfile::tempdir().unwrap();
    let page = CannedPage::new(&[
        (
            "LIST_POSTS",
            json!([{ "url": "https://v.test/a", "posted": "1 day ago" }]),
        ),
        (
            "LIST_COMMENTS",
            json!([
                null,
                { "id": "c2", "author": "@b", "text": "great" },
                { "id": "c3", "author": "@c", "text": "thanks" }
            ]),
        ),
        ("LIKE", json!(true)),
    ]);
    let scripts = ProfileScripts {
        list_posts: Some("LIST_POSTS".to_string()),
        list_comments: Some("LIST_COMMENTS".to_string()),
        like: Some("LIKE".to_string()),
        heart: None,
    };
    let platform = ScriptedPlatform::new(&page, "yt-main", scripts, Duration::ZERO);
    let mut orchestrator = EngagementOrchestrator::new(
        &platform,
        &platform,
        ActionLedger::open(dir.path().join("state.json")),
        instant_governor(),
        Platform::Youtube,
    );

    let report = orchestrator
        .run(
            &scenario(DiscoveryKind::AllPosts, 0, &[ActionType::Like]),
            "https://v.test/channel",
            real(),
        )
        .await;

    assert_eq!(report.comments_seen, 2);
    assert_eq!(
        page.calls_to("LIKE"),
        vec![
            json!({ "position": 2, "commentId": "c2" }),
            json!({ "position": 3, "commentId": "c3" }),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_action_ceiling_paces_real_runs_only() {
    let content = FakeContent::default().with_post("https://v.test/a", "1 day ago", &["a1", "a2"]);
    let one_per_minute = || {
        RateGovernor::new(GovernorConfig {
            actions_per_minute: 1,
            min_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        })
    };
    let like = scenario(DiscoveryKind::AllPosts, 0, &[ActionType::Like]);

    let dir = tempfile::tempdir().unwrap();
    let actions = FakeActions::default();
    let mut paced = EngagementOrchestrator::new(
        &content,
        &actions,
        ActionLedger::open(dir.path().join("real.json")),
        one_per_minute(),
        Platform::Youtube,
    );
    let start = tokio::time::Instant::now();
    let report = paced.run(&like, "https://v.test/channel", real()).await;
    assert_eq!(report.comments_acted, 2);
    assert!(start.elapsed() >= Duration::from_secs(60));

    let dry_actions = FakeActions::default();
    let mut planned = EngagementOrchestrator::new(
        &content,
        &dry_actions,
        ActionLedger::open(dir.path().join("dry.json")),
        one_per_minute(),
        Platform::Youtube,
    );
    let start = tokio::time::Instant::now();
    let report = planned.run(&like, "https://v.test/channel", dry()).await;
    assert_eq!(report.comments_acted, 2);
    assert_eq!(start.elapsed(), Duration::ZERO);
    assert!(dry_actions.calls().is_empty());
}
