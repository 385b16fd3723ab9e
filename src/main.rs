//! graph-snippets - runs Microsoft Graph scenarios against the signed-in account.

#![deny(clippy::all)]

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use graph_snippets::auth::{RefreshTokenProvider, SessionStore, StaticTokenProvider, TokenProvider};
use graph_snippets::config::Config;
use graph_snippets::error::AppError;
use graph_snippets::graph::GraphClient;
use graph_snippets::stories::{self, Story};

/// Token handed in from outside, e.g. by `az account get-access-token`.
const ACCESS_TOKEN_VAR: &str = "GRAPH_ACCESS_TOKEN";

/// Run Microsoft Graph scenarios against the signed-in account.
#[derive(Parser, Debug)]
#[command(name = "graph-snippets", author, version, about, long_about = None)]
struct Cli {
    /// List the available stories and exit
    #[arg(long)]
    list: bool,

    /// Sign in with a device code before running stories
    #[arg(long, conflicts_with = "sign_out")]
    sign_in: bool,

    /// Forget the saved session
    #[arg(long)]
    sign_out: bool,

    /// Stories to run (default: all)
    #[arg(value_name = "STORY", value_parser = parse_story)]
    stories: Vec<Story>,
}

fn parse_story(name: &str) -> Result<Story, String> {
    name.parse()
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // .env is optional
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("Warning: Failed to load .env file: {}", e);
        }
    }

    let config = match Config::load() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    init_logging(&config.logging.level);
    info!("Starting {} v{}", config.app.name, env!("CARGO_PKG_VERSION"));

    match run(config, cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("{:#}", e);
            if let Some(app_error) = e.downcast_ref::<AppError>() {
                eprintln!("{}", app_error.user_message());
            }
            ExitCode::FAILURE
        }
    }
}

fn init_logging(default_level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .with_thread_ids(false)
        .init();
}

fn refresh_provider(config: &Config) -> Result<RefreshTokenProvider> {
    config
        .validate_oauth()
        .map_err(|e| AppError::Config(e.to_string()))?;
    let store = SessionStore::default_location().map_err(AppError::from)?;
    if !store.has_prior_session() {
        warn!(
            "No saved session at {}; run with --sign-in or set {}",
            store.path().display(),
            ACCESS_TOKEN_VAR
        );
    }
    let provider = RefreshTokenProvider::new(config, store).map_err(AppError::from)?;
    Ok(provider)
}

fn token_provider(config: &Config) -> Result<Arc<dyn TokenProvider>> {
    if let Ok(token) = std::env::var(ACCESS_TOKEN_VAR) {
        info!("Using access token from {}", ACCESS_TOKEN_VAR);
        return Ok(Arc::new(StaticTokenProvider::new(token)));
    }

    Ok(Arc::new(refresh_provider(config)?))
}

/// Device code sign-in. The user finishes it in a browser, possibly on another machine.
async fn sign_in(provider: &RefreshTokenProvider) -> Result<()> {
    let authorization = provider
        .start_device_sign_in()
        .await
        .map_err(AppError::from)?;
    eprintln!("{}", authorization.message);

    let record = provider
        .complete_device_sign_in(&authorization)
        .await
        .map_err(AppError::from)?;
    eprintln!(
        "Signed in as {}",
        record.user_email.as_deref().unwrap_or(&record.user_id)
    );
    Ok(())
}

/// Returns whether every story passed.
async fn run(config: Config, cli: Cli) -> Result<bool> {
    if cli.list {
        for story in Story::ALL {
            println!("{:<14} {}", story.group(), story.name());
        }
        return Ok(true);
    }

    let tokens: Arc<dyn TokenProvider> = if cli.sign_in {
        let provider = refresh_provider(&config)?;
        sign_in(&provider).await?;
        if cli.stories.is_empty() {
            return Ok(true);
        }
        Arc::new(provider)
    } else {
        token_provider(&config)?
    };

    if cli.sign_out {
        tokens.sign_out().await.map_err(AppError::from)?;
        info!("Signed out");
        if cli.stories.is_empty() {
            return Ok(true);
        }
    }

    if let Some(account) = tokens.current_account_id().await {
        info!("Signed in as {}", account);
    }

    let client = GraphClient::new(&config, Arc::clone(&tokens))
        .map_err(AppError::from)
        .context("Failed to create Graph client")?;

    let selected = if cli.stories.is_empty() {
        Story::ALL.to_vec()
    } else {
        cli.stories
    };

    let outcomes = stories::run_stories(&client, &selected).await;
    let passed = outcomes.iter().filter(|o| o.passed).count();
    info!("{} of {} stories passed", passed, selected.len());

    if outcomes
        .iter()
        .filter_map(|o| o.error.as_ref())
        .any(|e| e.requires_sign_out())
    {
        warn!("Saved session is no longer valid, signing out");
        tokens.sign_out().await.map_err(AppError::from)?;
    }

    Ok(passed == selected.len())
}
