use engage_core::SafetyConfig;
use serde::Serialize;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tracing::debug;

pub const WINDOW: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct GovernorConfig {
    pub actions_per_minute: u32,
    pub min_delay: Duration,
    pub max_delay: Duration,
}

impl GovernorConfig {
    pub fn from_safety(safety: &SafetyConfig) -> Self {
        let min_delay = Duration::from_secs_f64(safety.min_delay_secs.max(0.0));
        let max_delay = Duration::from_secs_f64(safety.max_delay_secs.max(0.0));
        Self {
            actions_per_minute: safety.actions_per_minute.max(1),
            min_delay,
            max_delay: max_delay.max(min_delay),
        }
    }
}

impl Default for GovernorConfig {
    fn default() -> Self {
        Self {
            actions_per_minute: 10,
            min_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(5),
        }
    }
}

/// Action timestamps inside the trailing window, oldest first.
#[derive(Debug)]
pub struct WindowTracker {
    window_duration: Duration,
    timestamps: VecDeque<Instant>,
}

impl WindowTracker {
    pub fn new(window_duration: Duration) -> Self {
        Self {
            window_duration,
            timestamps: VecDeque::new(),
        }
    }

    pub fn evict(&mut self, now: Instant) {
        while let Some(oldest) = self.timestamps.front() {
            if now.saturating_duration_since(*oldest) >= self.window_duration {
                self.timestamps.pop_front();
            } else {
                break;
            }
        }
    }

    pub fn record(&mut self, at: Instant) {
        self.timestamps.push_back(at);
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    /// Time until the oldest entry leaves the window.
    pub fn until_oldest_expires(&self, now: Instant) -> Option<Duration> {
        self.timestamps
            .front()
            .map(|oldest| (*oldest + self.window_duration).saturating_duration_since(now))
    }
}

/// What one `throttle` call waited for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThrottleReceipt {
    pub ceiling_wait: Duration,
    pub jitter: Duration,
}

impl ThrottleReceipt {
    pub fn total(&self) -> Duration {
        self.ceiling_wait + self.jitter
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GovernorStatus {
    pub actions_in_window: u32,
    pub actions_per_minute: u32,
    pub remaining_in_window: u32,
    pub next_slot_in: Option<Duration>,
}

impl GovernorStatus {
    pub fn window_utilization_percentage(&self) -> f64 {
        (self.actions_in_window as f64 / self.actions_per_minute as f64) * 100.0
    }

    pub fn is_at_ceiling(&self) -> bool {
        self.remaining_in_window == 0
    }
}

/// Paces outgoing actions: at most `actions_per_minute` in any trailing
/// 60-second window, plus a random delay before every action.
///
/// The tracker lock is held for the whole throttle, so concurrent callers are
/// served one at a time in call order.
#[derive(Debug)]
pub struct RateGovernor {
    config: GovernorConfig,
    window_tracker: Mutex<WindowTracker>,
}

impl RateGovernor {
    pub fn new(config: GovernorConfig) -> Self {
        Self {
            config,
            window_tracker: Mutex::new(WindowTracker::new(WINDOW)),
        }
    }

    /// Suspends until an action may be taken, then records it.
    pub async fn throttle(&self) -> ThrottleReceipt {
        let mut tracker = self.window_tracker.lock().await;

        let now = Instant::now();
        tracker.evict(now);

        let mut ceiling_wait = Duration::ZERO;
        if tracker.len() >= self.config.actions_per_minute as usize {
            ceiling_wait = tracker.until_oldest_expires(now).unwrap_or_default();
            if !ceiling_wait.is_zero() {
                debug!(
                    "Action ceiling of {}/min reached, waiting {:?}",
                    self.config.actions_per_minute, ceiling_wait
                );
                sleep(ceiling_wait).await;
            }
        }

        let jitter = self.jitter();
        sleep(jitter).await;

        tracker.record(Instant::now());
        ThrottleReceipt {
            ceiling_wait,
            jitter,
        }
    }

    fn jitter(&self) -> Duration {
        let min_ms = self.config.min_delay.as_millis() as u64;
        let max_ms = self.config.max_delay.as_millis() as u64;
        let jitter_range = max_ms.saturating_sub(min_ms);
        Duration::from_millis(min_ms + fastrand::u64(0..=jitter_range))
    }

    pub async fn status(&self) -> GovernorStatus {
        let mut tracker = self.window_tracker.lock().await;
        let now = Instant::now();
        tracker.evict(now);

        let actions_in_window = tracker.len() as u32;
        let remaining_in_window = self
            .config
            .actions_per_minute
            .saturating_sub(actions_in_window);
        let next_slot_in = if remaining_in_window == 0 {
            tracker.until_oldest_expires(now)
        } else {
            None
        };

        GovernorStatus {
            actions_in_window,
            actions_per_minute: self.config.actions_per_minute,
            remaining_in_window,
            next_slot_in,
        }
    }
}
