use super::context::{
    connect_browser, content_scripts, load_config, open_ledger, prepare_chat, require_scripts,
    settle, Overrides, PageContent,
};
use chrono::Utc;
use engage_core::{CoreError, ScriptKind};
use engage_ledger::RecordKind;
use engagement_service::EngagementOrchestrator;
use platform_client::{GovernorConfig, RateGovernor, ScriptedPlatform};
use std::process::ExitCode;

pub async fn list_posts(
    overrides: &Overrides,
    profile: Option<&str>,
    max: Option<usize>,
) -> Result<ExitCode, CoreError> {
    let config = load_config(overrides)?;
    let (name, profile) = config.resolve_profile(profile)?;
    require_scripts(&name, &profile, &content_scripts(&profile, &[ScriptKind::ListPosts]))?;
    let chat = prepare_chat(&config, &profile)?;
    let max = max.unwrap_or(config.defaults.max_posts as usize);
    let ledger = open_ledger(&config);

    let session = connect_browser(&config).await?;
    let scripts = ScriptedPlatform::new(
        &session,
        name.as_str(),
        profile.scripts.clone(),
        settle(&config),
    );
    let content = PageContent::new(&config, &session, &scripts, chat);
    let orchestrator = EngagementOrchestrator::new(
        content,
        &scripts,
        ledger,
        RateGovernor::new(GovernorConfig::from_safety(&config.safety)),
        profile.platform,
    );

    let posts = orchestrator.fetch_posts(&profile.source_url, max).await?;
    if posts.is_empty() {
        println!("No posts found at {}", profile.source_url);
        return Ok(ExitCode::SUCCESS);
    }

    for (index, post) in posts.iter().enumerate() {
        let seen = if orchestrator
            .ledger()
            .is_processed(RecordKind::Video, &post.url)
        {
            "  [seen]"
        } else {
            ""
        };
        println!(
            "{:>3}. {}{}",
            index + 1,
            post.title.as_deref().unwrap_or("(untitled)"),
            seen
        );
        println!("     {}", post.url);
        println!(
            "     {} views, posted {}",
            post.views.as_deref().unwrap_or("?"),
            post.posted.as_deref().unwrap_or("?")
        );
    }
    Ok(ExitCode::SUCCESS)
}

pub async fn read(
    overrides: &Overrides,
    url: &str,
    profile: Option<&str>,
    max: Option<usize>,
) -> Result<ExitCode, CoreError> {
    let config = load_config(overrides)?;
    let (name, profile) = config.resolve_profile(profile)?;
    require_scripts(
        &name,
        &profile,
        &content_scripts(&profile, &[ScriptKind::ListComments]),
    )?;
    let chat = prepare_chat(&config, &profile)?;
    let max = max.unwrap_or(config.defaults.max_comments as usize);
    let ledger = open_ledger(&config);

    let session = connect_browser(&config).await?;
    let scripts = ScriptedPlatform::new(
        &session,
        name.as_str(),
        profile.scripts.clone(),
        settle(&config),
    );
    let content = PageContent::new(&config, &session, &scripts, chat);
    let orchestrator = EngagementOrchestrator::new(
        content,
        &scripts,
        ledger,
        RateGovernor::new(GovernorConfig::from_safety(&config.safety)),
        profile.platform,
    );

    let comments = orchestrator.fetch_comments(url, max, Utc::now()).await?;
    if comments.is_empty() {
        println!("No comments found on {}", url);
        return Ok(ExitCode::SUCCESS);
    }

    for comment in &comments {
        let mut header = format!(
            "#{} {} ({})",
            comment.position,
            comment.author,
            comment.timestamp.format("%Y-%m-%d %H:%M UTC")
        );
        if comment.reply_count > 0 {
            header.push_str(&format!(", {} replies", comment.reply_count));
        }
        if orchestrator
            .ledger()
            .is_processed(RecordKind::Comment, &comment.id)
        {
            header.push_str("  [processed]");
        }
        println!("{}", header);
        println!("    {}", comment.text);
    }
    Ok(ExitCode::SUCCESS)
}
