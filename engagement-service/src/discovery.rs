use chrono::{DateTime, Duration, Utc};
use engage_core::time::parse_relative;
use engage_core::{DiscoveryMethod, Post, RawRecord, UnparsedTimePolicy};
use tracing::{debug, warn};

/// Fetch size for `recent_days`: how many posts meet the cutoff is unknown
/// until their phrases are parsed.
pub const RECENT_DAYS_BATCH: usize = 100;

/// Upper bound for `all_posts`.
pub const ALL_POSTS_CEILING: usize = 999;

/// What to ask the content provider for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchPlan {
    pub max_count: usize,
    pub cutoff: Option<DateTime<Utc>>,
}

pub fn plan_fetch(method: &DiscoveryMethod, now: DateTime<Utc>) -> FetchPlan {
    match *method {
        DiscoveryMethod::RecentDays { days, .. } => FetchPlan {
            max_count: RECENT_DAYS_BATCH,
            cutoff: cutoff_for(days, now),
        },
        DiscoveryMethod::RecentPosts { count } => FetchPlan {
            max_count: count as usize,
            cutoff: None,
        },
        DiscoveryMethod::AllPosts => FetchPlan {
            max_count: ALL_POSTS_CEILING,
            cutoff: None,
        },
    }
}

fn cutoff_for(days: u32, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    Duration::try_days(i64::from(days)).and_then(|span| now.checked_sub_signed(span))
}

/// Converts raw post records, dropping the ones without a usable url.
/// Returns the posts and how many records were skipped.
pub fn ingest_posts(raw: &[RawRecord]) -> (Vec<Post>, usize) {
    let mut skipped = 0;
    let posts = raw
        .iter()
        .filter_map(|record| match Post::from_raw(record) {
            Ok(post) => Some(post),
            Err(e) => {
                warn!("Skipping post: {}", e);
                skipped += 1;
                None
            }
        })
        .collect();
    (posts, skipped)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterOutcome {
    pub kept: Vec<Post>,
    pub too_old: usize,
    pub unparsed: usize,
}

/// Applies the method's selection after the fetch: day cutoff for
/// `recent_days`, truncation for `recent_posts`.
pub fn filter_posts(posts: Vec<Post>, method: &DiscoveryMethod, now: DateTime<Utc>) -> FilterOutcome {
    match *method {
        DiscoveryMethod::RecentDays { days, on_unparsed } => {
            filter_recent(posts, cutoff_for(days, now), on_unparsed, now)
        }
        DiscoveryMethod::RecentPosts { count } => {
            let mut kept = posts;
            kept.truncate(count as usize);
            FilterOutcome {
                kept,
                ..FilterOutcome::default()
            }
        }
        DiscoveryMethod::AllPosts => {
            let mut kept = posts;
            kept.truncate(ALL_POSTS_CEILING);
            FilterOutcome {
                kept,
                ..FilterOutcome::default()
            }
        }
    }
}

fn filter_recent(
    posts: Vec<Post>,
    cutoff: Option<DateTime<Utc>>,
    on_unparsed: UnparsedTimePolicy,
    now: DateTime<Utc>,
) -> FilterOutcome {
    let mut outcome = FilterOutcome::default();

    for post in posts {
        let posted_at = post
            .posted
            .as_deref()
            .and_then(|phrase| parse_relative(phrase, now));

        match (posted_at, cutoff) {
            (Some(at), Some(cutoff)) if at < cutoff => {
                debug!("Post {} is older than the cutoff", post.url);
                outcome.too_old += 1;
            }
            (Some(_), _) => outcome.kept.push(post),
            (None, _) => {
                outcome.unparsed += 1;
                match on_unparsed {
                    UnparsedTimePolicy::Include => {
                        warn!(
                            posted = post.posted.as_deref().unwrap_or(""),
                            "Keeping post {} with unreadable upload time", post.url
                        );
                        outcome.kept.push(post);
                    }
                    UnparsedTimePolicy::Exclude => {
                        warn!(
                            posted = post.posted.as_deref().unwrap_or(""),
                            "Dropping post {} with unreadable upload time", post.url
                        );
                    }
                }
            }
        }
    }

    outcome
}
