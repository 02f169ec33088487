//! sprintsync - Jira sprint and issue synchronization
//!
//! Main entry point for the sprintsync CLI.

use anyhow::Context;
use clap::{Args, Parser, Subcommand, ValueEnum};
use sprintsync::config::{validate_config_result, AppConfig, IntegrationSettings};
use sprintsync::integrations::build_http_client;
use sprintsync::report::{group_by_team, recent_by_team};
use sprintsync::store::{SprintStore, SqliteStore, StoreConfig};
use sprintsync::sync::{SyncKind, SyncOrchestrator, SyncOutcome, SyncRequest};
use sprintsync::SprintSyncError;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

/// sprintsync - Mirror Jira sprints and issues into a local store
#[derive(Parser, Debug)]
#[command(name = "sprintsync")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to config file (default: ~/.config/sprintsync/config.yaml)
    #[arg(short, long, env = "SPRINTSYNC_CONFIG")]
    config: Option<PathBuf>,

    /// Override the database path from the config file
    #[arg(long)]
    database: Option<PathBuf>,

    /// User whose integration settings are used
    #[arg(short, long, global = true, env = "SPRINTSYNC_USER", default_value = "default")]
    user: String,

    /// Print machine-readable JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write a default configuration file
    Init,

    /// Sync sprints and issues from Jira
    Sync {
        /// Which sprints to sync
        #[arg(value_enum)]
        target: SyncTarget,

        /// Sync even if this branch was synced moments ago
        #[arg(short, long)]
        force: bool,

        /// Comma-separated board ids for this run only
        #[arg(long)]
        board_ids: Option<String>,

        /// Board URL for this run only (wins over --board-ids)
        #[arg(long)]
        board_url: Option<String>,
    },

    /// Show each team's most recent sprints
    Report {
        /// Sprints per team (clamped to the configured bounds)
        #[arg(short = 'n', long)]
        per_team: Option<usize>,
    },

    /// Manage Jira integration settings
    #[command(subcommand)]
    Settings(SettingsCommands),

    /// Show connection status and store contents
    Status,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum SyncTarget {
    /// Active sprints
    Active,
    /// Recently closed sprints
    Closed,
    /// Every closed sprint
    ClosedAll,
    /// Active and recently closed sprints
    All,
}

impl From<SyncTarget> for SyncKind {
    fn from(target: SyncTarget) -> Self {
        match target {
            SyncTarget::Active => SyncKind::Active,
            SyncTarget::Closed => SyncKind::Closed,
            SyncTarget::ClosedAll => SyncKind::ClosedAll,
            SyncTarget::All => SyncKind::All,
        }
    }
}

#[derive(Subcommand, Debug)]
enum SettingsCommands {
    /// Show the stored settings (tokens masked)
    Show,

    /// Update the stored settings; omitted values are kept
    Set(SettingsArgs),

    /// Set or clear the admin base URL that overrides every user's URL
    AdminUrl {
        /// New admin base URL
        url: Option<String>,

        /// Remove the admin override
        #[arg(long, conflicts_with = "url")]
        clear: bool,
    },
}

#[derive(Args, Debug)]
struct SettingsArgs {
    /// Jira site URL
    #[arg(long, env = "SPRINTSYNC_JIRA_URL")]
    url: Option<String>,

    /// Account email (Cloud) or username (Data Center)
    #[arg(long)]
    email: Option<String>,

    /// API token or personal access token
    #[arg(long, env = "SPRINTSYNC_JIRA_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Authentication type (basic, bearer)
    #[arg(long)]
    auth_type: Option<String>,

    /// Deployment (cloud, datacenter)
    #[arg(long)]
    deployment: Option<String>,

    /// Comma-separated board ids or a board URL
    #[arg(long)]
    boards: Option<String>,

    /// Sprint custom field id (e.g., customfield_10020)
    #[arg(long)]
    sprint_field: Option<String>,

    /// OAuth access token
    #[arg(long, hide_env_values = true)]
    oauth_token: Option<String>,

    /// Atlassian cloud id for the OAuth token
    #[arg(long)]
    cloud_id: Option<String>,

    /// Per-request timeout in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,
}

impl From<SettingsArgs> for IntegrationSettings {
    fn from(args: SettingsArgs) -> Self {
        // A pasted board URL is stored as the id it names
        let board_ids = args.boards.map(|input| {
            match sprintsync::board::parse_board_input(&input) {
                Some(ids) => ids
                    .iter()
                    .map(|id| id.to_string())
                    .collect::<Vec<_>>()
                    .join(","),
                None => input,
            }
        });

        IntegrationSettings {
            base_url: args.url,
            user: args.email,
            token: args.token,
            auth_type: args.auth_type,
            deployment: args.deployment,
            board_ids,
            sprint_field_id: args.sprint_field,
            oauth_access_token: args.oauth_token,
            oauth_cloud_id: args.cloud_id,
            request_timeout_ms: args.timeout_ms,
        }
    }
}

fn main() {
    // Initialize logging
    if let Err(e) = sprintsync::logging::init() {
        eprintln!("Failed to initialize logging: {}", e);
    }

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        match e.downcast_ref::<SprintSyncError>() {
            Some(err) => eprintln!("Error: {}", err.user_message()),
            None => eprintln!("Error: {:#}", e),
        }
        process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    if let Commands::Init = cli.command {
        return handle_init_command(cli.config);
    }

    let mut config = match &cli.config {
        Some(path) => AppConfig::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => AppConfig::load_default()?,
    };
    if let Some(database) = cli.database {
        config.database = database;
    }
    validate_config_result(&config)?;

    let store = Arc::new(SqliteStore::open(StoreConfig::new(&config.database))?);

    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
    runtime.block_on(async move {
        match cli.command {
            Commands::Init => Ok(()),
            Commands::Sync {
                target,
                force,
                board_ids,
                board_url,
            } => {
                let request = SyncRequest {
                    kind: target.into(),
                    force,
                    board_ids,
                    board_url,
                };
                handle_sync_command(store, config, &cli.user, &request, cli.json).await
            }
            Commands::Report { per_team } => {
                handle_report_command(store.as_ref(), &config, per_team, cli.json).await
            }
            Commands::Settings(cmd) => {
                handle_settings_command(store.as_ref(), &cli.user, cmd, cli.json).await
            }
            Commands::Status => handle_status_command(store.as_ref(), &cli.user, cli.json).await,
        }
    })
}

fn handle_init_command(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let path = config_path.unwrap_or_else(AppConfig::default_path);
    if path.exists() {
        println!("Config already exists at {}", path.display());
        return Ok(());
    }

    AppConfig::new().save(&path)?;
    println!("Created {}", path.display());
    println!();
    println!("Next, store your Jira credentials:");
    println!("  sprintsync settings set --url https://<site>.atlassian.net --email <you> --token <api-token>");
    Ok(())
}

async fn handle_sync_command(
    store: Arc<SqliteStore>,
    config: AppConfig,
    user: &str,
    request: &SyncRequest,
    json: bool,
) -> anyhow::Result<()> {
    let http = build_http_client()?;
    let orchestrator = SyncOrchestrator::new(store, http, config);
    let outcome = orchestrator.run(user, request).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        match &outcome {
            SyncOutcome::Branch(result) => print_branch("sync", result),
            SyncOutcome::All(result) => {
                print_branch("active", &result.active);
                print_branch("closed", &result.closed);
            }
        }
    }

    if !outcome.success() {
        anyhow::bail!("sync finished with failures");
    }
    Ok(())
}

fn print_branch(label: &str, result: &sprintsync::sync::BranchResult) {
    if result.skipped {
        println!("{:>7}: skipped (synced recently, use --force)", label);
    } else if result.success {
        println!(
            "{:>7}: {} sprints, {} issues",
            label, result.count, result.issues
        );
    } else {
        println!(
            "{:>7}: failed: {}",
            label,
            result.error.as_deref().unwrap_or("unknown error")
        );
    }
}

async fn handle_report_command(
    store: &SqliteStore,
    config: &AppConfig,
    per_team: Option<usize>,
    json: bool,
) -> anyhow::Result<()> {
    let selected = recent_by_team(store, &config.report, per_team).await?;
    let groups = group_by_team(&selected);

    if json {
        println!("{}", serde_json::to_string_pretty(&groups)?);
        return Ok(());
    }

    if groups.is_empty() {
        println!("No sprints stored yet. Run 'sprintsync sync all' first.");
        return Ok(());
    }

    for group in groups {
        println!("{}", group.team);
        for sprint in group.sprints {
            let end = sprint
                .end_date
                .map(|d| d.format("%Y-%m-%d").to_string())
                .unwrap_or_else(|| "no end date".to_string());
            println!("  {:<32} {:<10} {}", sprint.name, sprint.status, end);
        }
    }
    Ok(())
}

async fn handle_settings_command(
    store: &SqliteStore,
    user: &str,
    cmd: SettingsCommands,
    json: bool,
) -> anyhow::Result<()> {
    match cmd {
        SettingsCommands::Show => {
            let settings = store.integration_settings(user).await?.redacted();
            let admin_url = store.admin_base_url().await?;
            if json {
                let value = serde_json::json!({
                    "user": user,
                    "settings": settings,
                    "admin_base_url": admin_url,
                });
                println!("{}", serde_json::to_string_pretty(&value)?);
            } else {
                println!("Settings for '{}':", user);
                print!("{}", serde_yaml::to_string(&settings)?);
                if let Some(url) = admin_url {
                    println!("admin_base_url (overrides base_url): {}", url);
                }
            }
        }
        SettingsCommands::Set(args) => {
            let mut settings = store.integration_settings(user).await?;
            settings.merge(args.into());
            store.save_integration_settings(user, &settings).await?;
            println!("Updated settings for '{}'", user);
        }
        SettingsCommands::AdminUrl { url, clear } => {
            if clear {
                store.set_admin_base_url(None).await?;
                println!("Cleared admin base URL");
            } else if let Some(url) = url {
                url::Url::parse(url.trim())
                    .with_context(|| format!("Invalid base URL: {}", url))?;
                store.set_admin_base_url(Some(url.trim())).await?;
                println!("Admin base URL set to {}", url.trim());
            } else {
                match store.admin_base_url().await? {
                    Some(url) => println!("{}", url),
                    None => println!("No admin base URL set"),
                }
            }
        }
    }
    Ok(())
}

async fn handle_status_command(store: &SqliteStore, user: &str, json: bool) -> anyhow::Result<()> {
    let connection = store.connection_status(user).await?;
    let stats = store.stats().await?;
    let mut last_syncs = Vec::new();
    for branch in ["active", "closed", "closed_all"] {
        last_syncs.push((branch, store.last_sync(user, branch).await?));
    }

    if json {
        let value = serde_json::json!({
            "user": user,
            "connection": connection,
            "sprints": stats.sprint_count,
            "issues": stats.issue_count,
            "last_sync": last_syncs
                .iter()
                .map(|(branch, at)| (branch.to_string(), serde_json::json!(at)))
                .collect::<serde_json::Map<_, _>>(),
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    match connection {
        Some(status) => {
            print!(
                "Connection: {} (checked {})",
                status.status,
                status.checked_at.format("%Y-%m-%d %H:%M:%S UTC")
            );
            match status.message {
                Some(message) => println!(": {}", message),
                None => println!(),
            }
        }
        None => println!("Connection: never checked"),
    }
    println!("Stored: {} sprints, {} issues", stats.sprint_count, stats.issue_count);
    for (branch, at) in last_syncs {
        let when = at
            .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
            .unwrap_or_else(|| "never".to_string());
        println!("Last {} sync: {}", branch, when);
    }
    Ok(())
}
