use super::context::{
    connect_browser, content_scripts, load_config, open_ledger, prepare_chat, require_scripts,
    settle, Overrides, PageContent,
};
use engage_core::{ActionType, CoreError, ScriptKind};
use engagement_service::{ActionOutcome, EngagementOrchestrator, RunOptions, RunReport};
use platform_client::{GovernorConfig, RateGovernor, ScriptedPlatform};
use std::process::ExitCode;
use tracing::{info, warn};

pub async fn run(
    overrides: &Overrides,
    scenario_name: &str,
    profile: Option<&str>,
    dry_run: bool,
) -> Result<ExitCode, CoreError> {
    let config = load_config(overrides)?;
    let (name, profile) = config.resolve_profile(profile)?;
    let scenario = config.resolve_scenario(scenario_name)?;

    let mut required = content_scripts(
        &profile,
        &[ScriptKind::ListPosts, ScriptKind::ListComments],
    );
    if !dry_run {
        required.extend(
            scenario
                .actions
                .iter()
                .filter_map(|spec| ScriptKind::for_action(spec.kind)),
        );
    }
    require_scripts(&name, &profile, &required)?;
    let chat = prepare_chat(&config, &profile)?;

    if scenario
        .actions
        .iter()
        .any(|spec| spec.kind == ActionType::Reply)
    {
        warn!("Scenario '{}' has reply actions; replies are not sent", scenario_name);
    }

    let ledger = open_ledger(&config);
    let session = connect_browser(&config).await?;
    let scripts = ScriptedPlatform::new(
        &session,
        name.as_str(),
        profile.scripts.clone(),
        settle(&config),
    );
    let content = PageContent::new(&config, &session, &scripts, chat);
    let mut orchestrator = EngagementOrchestrator::new(
        content,
        &scripts,
        ledger,
        RateGovernor::new(GovernorConfig::from_safety(&config.safety)),
        profile.platform,
    );

    info!(
        "Running scenario '{}' on profile '{}'{}",
        scenario_name,
        name,
        if dry_run { " (dry run)" } else { "" }
    );
    let report = orchestrator
        .run(&scenario, &profile.source_url, RunOptions::now(dry_run))
        .await;
    print_report(&report);

    if report.has_persist_failures() {
        eprintln!(
            "Ledger could not be saved to {}: {}",
            orchestrator.ledger().path().display(),
            report.last_persist_error.as_deref().unwrap_or("unknown error")
        );
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

fn print_report(report: &RunReport) {
    if let Some(error) = &report.discovery_error {
        println!("Discovery failed: {}", error);
    }

    for event in &report.events {
        let status = match &event.outcome {
            ActionOutcome::Applied => "done".to_string(),
            ActionOutcome::WouldApply => "would do".to_string(),
            ActionOutcome::Failed(reason) => format!("failed: {}", reason),
        };
        println!(
            "{:<6} #{} {} on {} ({})",
            event.action.to_string(),
            event.position,
            event.author,
            event.post_url,
            status
        );
    }

    println!();
    println!("{}", report.summary());
}
