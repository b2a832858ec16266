pub mod discovery;
pub mod orchestrator;
pub mod report;

#[cfg(test)]
mod tests;

pub use discovery::{filter_posts, plan_fetch, FetchPlan, FilterOutcome};
pub use orchestrator::{EngagementOrchestrator, RunOptions};
pub use report::{ActionEvent, ActionOutcome, RunReport};
