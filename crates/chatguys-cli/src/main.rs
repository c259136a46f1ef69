use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod commands;
mod config;
mod history;
mod repl;
mod roles;

use chatguys_core::{ChatSession, HttpEndpoint};
use config::AppConfig;
use repl::ChatContext;

#[derive(Parser)]
#[command(name = "chatguys")]
#[command(version)]
#[command(about = "Talk to several LLM agents at once, routed by @mentions")]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Session name used for saved transcripts
    #[arg(short, long, global = true)]
    session: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start an interactive chat (the default)
    Chat,

    /// Send one line, print the replies and exit
    Ask {
        /// The message, with optional @mentions
        message: String,
    },

    /// List configured roles
    Roles,

    /// Initialize config directory, default config and role file
    Init,

    /// Show current configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr; RUST_LOG wins over --debug
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if cli.debug { "debug" } else { "warn" }));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command.unwrap_or(Commands::Chat) {
        Commands::Init => cmd_init().await,
        Commands::Config => cmd_config(&cli.config),
        Commands::Roles => cmd_roles(&cli.config),
        Commands::Ask { message } => cmd_ask(&cli.config, &message).await,
        Commands::Chat => cmd_chat(&cli.config, cli.session).await,
    }
}

async fn cmd_init() -> Result<()> {
    let config_dir = config::config_dir();
    tokio::fs::create_dir_all(&config_dir)
        .await
        .with_context(|| format!("Failed to create config dir: {}", config_dir.display()))?;

    let config_path = config_dir.join("config.toml");
    if config_path.exists() {
        warn!("Config already exists at {}", config_path.display());
    } else {
        let default_config = include_str!("../../../config/default.toml");
        tokio::fs::write(&config_path, default_config).await?;
        restrict_permissions(&config_path)?;
        info!("Created default config at {}", config_path.display());
    }

    let roles_dir = config_dir.join("roles");
    tokio::fs::create_dir_all(&roles_dir)
        .await
        .with_context(|| format!("Failed to create roles dir: {}", roles_dir.display()))?;
    let roles_path = roles_dir.join("roles.yaml");
    if roles_path.exists() {
        warn!("Role file already exists at {}", roles_path.display());
    } else {
        tokio::fs::write(&roles_path, include_str!("../../../config/roles.yaml")).await?;
        info!("Created role file at {}", roles_path.display());
    }

    println!("chatguys initialized at {}", config_dir.display());
    println!(
        "Set OPENAI_API_KEY (and PERPLEXITY_API_KEY / ANTHROPIC_API_KEY if you use those roles), \
         then edit {} to add your own roles.",
        roles_path.display()
    );
    Ok(())
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .with_context(|| format!("Failed to set permissions on {}", path.display()))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> Result<()> {
    Ok(())
}

fn cmd_config(config_path: &Option<PathBuf>) -> Result<()> {
    let cfg = AppConfig::load(config_path)?;
    println!("# {}", cfg.source.display());
    println!("# roles from {}", cfg.roles_dir().display());
    println!("{}", toml::to_string_pretty(&cfg.redacted())?);
    Ok(())
}

fn cmd_roles(config_path: &Option<PathBuf>) -> Result<()> {
    let cfg = AppConfig::load(config_path)?;
    let registry = roles::load_registry(&cfg)?;
    println!("{}", commands::format_roles(&registry.summaries()));
    Ok(())
}

fn build_session(cfg: &AppConfig) -> Result<ChatSession> {
    let registry = roles::load_registry(cfg)?;
    let endpoint =
        HttpEndpoint::new(cfg.session.attempt_timeout())?.with_max_retries(cfg.session.max_retries);
    Ok(
        ChatSession::new(registry, Arc::new(endpoint), cfg.session.dispatch_config())
            .with_marker(cfg.session.mention_marker),
    )
}

async fn cmd_ask(config_path: &Option<PathBuf>, message: &str) -> Result<()> {
    let cfg = AppConfig::load(config_path)?;
    let session = build_session(&cfg)?;

    let outcome = session.handle_line(message).await;
    if outcome.segments.is_empty() {
        return Err(anyhow!("Nothing to send: the message is empty"));
    }
    println!("{}", repl::render_outcome(&outcome));

    if outcome.replies().all(|e| e.is_error()) {
        return Err(anyhow!("No agent replied successfully"));
    }
    Ok(())
}

async fn cmd_chat(config_path: &Option<PathBuf>, session_name: Option<String>) -> Result<()> {
    let cfg = AppConfig::load(config_path)?;
    let session = build_session(&cfg)?;
    let session_name = session_name.unwrap_or_else(history::default_session_name);
    info!("Starting chat session '{}'", session_name);

    repl::run(ChatContext {
        session: Arc::new(session),
        config: cfg,
        session_name,
    })
    .await
}
