use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use group_season::api::{build_router, state::AppState};
use group_season::config::AppConfig;
use group_season::directory::StaticDirectory;
use group_season::engine::{CountdownMonitor, FinalizeOutcome, RetryPolicy, SeasonEngine};
use group_season::models::{
    GroupId, MatchSubmission, PlayerId, Season, SeasonEdit, SeasonScope, SeasonStatus,
};
use group_season::notify::build_notifier;
use group_season::parse_duration;
use group_season::storage::{FileStore, JsonlMatchLog, StorageConfig};

#[derive(Parser)]
#[command(name = "group-season")]
#[command(about = "Season lifecycle and rankings for recurring sports groups")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(long, default_value = "./config.toml")]
    config: String,

    /// Data directory path (overrides the config file)
    #[arg(long)]
    data_dir: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Output logs as JSON
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the API server
    Serve {
        /// Bind address
        #[arg(long)]
        host: Option<String>,

        /// Port number
        #[arg(long)]
        port: Option<u16>,

        /// Run a countdown monitor for every existing group
        #[arg(long)]
        watch_seasons: bool,
    },

    /// Create a group
    CreateGroup {
        #[arg(long)]
        name: String,

        #[arg(long)]
        owner: String,

        /// Group id (generated when omitted)
        #[arg(long)]
        id: Option<String>,

        /// Additional member (repeatable)
        #[arg(long = "member")]
        members: Vec<String>,
    },

    /// Start or restart a season
    StartSeason {
        #[arg(long)]
        group: String,

        /// "group" (player ranking) or "team"
        #[arg(long, default_value = "group")]
        scope: String,

        #[arg(long)]
        name: String,

        /// Start time (RFC 3339, defaults to now)
        #[arg(long)]
        start: Option<String>,

        /// End time (RFC 3339)
        #[arg(long, conflicts_with = "duration")]
        end: Option<String>,

        /// Season length (e.g. "7d", "36h")
        #[arg(long)]
        duration: Option<String>,
    },

    /// Edit the running season
    EditSeason {
        #[arg(long)]
        group: String,

        #[arg(long)]
        name: Option<String>,

        #[arg(long)]
        start: Option<String>,

        #[arg(long)]
        end: Option<String>,
    },

    /// Record a finished match from a JSON file
    RecordMatch {
        #[arg(long)]
        group: String,

        /// Match submission JSON
        #[arg(long)]
        file: PathBuf,
    },

    /// Finalize the season if its end time has passed
    Finalize {
        #[arg(long)]
        group: String,
    },

    /// Follow a group's countdown until the season ends
    Watch {
        #[arg(long)]
        group: String,
    },

    /// Print a group's season and leaderboards
    Show {
        #[arg(long)]
        group: String,
    },
}

fn load_config(cli: &Cli) -> Result<AppConfig> {
    let path = PathBuf::from(&cli.config);
    let mut config = if path.exists() {
        AppConfig::from_file(&path).with_context(|| format!("loading {}", cli.config))?
    } else {
        AppConfig::default()
    };

    if let Some(data_dir) = &cli.data_dir {
        config.data_dir = PathBuf::from(data_dir);
    }
    if let Some(level) = &cli.log_level {
        config.log_level = level.clone();
    }
    Ok(config)
}

fn build_engine(config: &AppConfig) -> Result<Arc<SeasonEngine>> {
    let storage = StorageConfig::new(config.data_dir.clone());
    let notifier = build_notifier(&config.notifications);
    tracing::info!("Using {} notifications", notifier.name());

    let mut engine = SeasonEngine::new(
        Arc::new(FileStore::new(storage.clone())),
        Arc::new(JsonlMatchLog::new(storage)),
        notifier,
    )
    .with_retry_policy(RetryPolicy::from(&config.retry));

    if let Some(length) = config.season.season_length() {
        engine = engine.with_season_length(length);
    }

    if let Some(path) = &config.directory_file {
        let directory = Arc::new(
            StaticDirectory::from_file(path)
                .with_context(|| format!("loading directory {:?}", path))?,
        );
        engine = engine.with_profiles(directory.clone()).with_teams(directory);
    }

    Ok(Arc::new(engine))
}

fn parse_time(value: Option<&str>) -> Result<Option<DateTime<Utc>>> {
    value
        .map(|s| {
            DateTime::parse_from_rfc3339(s)
                .map(|t| t.with_timezone(&Utc))
                .with_context(|| format!("invalid RFC 3339 time: {}", s))
        })
        .transpose()
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;

    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level));

    let registry = tracing_subscriber::registry().with(filter);
    if cli.json_logs {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    tracing::info!("Starting group-season v{}", env!("CARGO_PKG_VERSION"));

    let engine = build_engine(&config)?;

    match cli.command {
        Commands::Serve {
            host,
            port,
            watch_seasons,
        } => {
            let host = host.unwrap_or_else(|| config.server.host.clone());
            let port = port.unwrap_or(config.server.port);

            let mut monitors = Vec::new();
            if watch_seasons {
                for group_id in engine.store().list().await? {
                    let monitor = CountdownMonitor::new(engine.clone(), group_id.clone())
                        .with_tick(config.season.tick_interval())
                        .spawn()
                        .await;
                    match monitor {
                        Ok(handle) => monitors.push(handle),
                        Err(e) => tracing::warn!("Not watching group {}: {}", group_id, e),
                    }
                }
                tracing::info!("Watching {} groups", monitors.len());
            }

            let app = build_router(AppState::new(engine, config));
            let addr = format!("{}:{}", host, port);
            let listener = tokio::net::TcpListener::bind(&addr).await?;
            tracing::info!("Listening on http://{}", addr);
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = tokio::signal::ctrl_c().await;
                })
                .await?;

            for monitor in monitors {
                monitor.shutdown().await;
            }
        }
        Commands::CreateGroup {
            name,
            owner,
            id,
            members,
        } => {
            let doc = engine
                .create_group(
                    id.map(GroupId::from),
                    &name,
                    PlayerId::from(owner),
                    members.into_iter().map(PlayerId::from).collect(),
                )
                .await?;
            println!("Created group {} ({} members)", doc.id, doc.members.len());
        }
        Commands::StartSeason {
            group,
            scope,
            name,
            start,
            end,
            duration,
        } => {
            let scope: SeasonScope = scope.parse().map_err(anyhow::Error::msg)?;
            let start = parse_time(start.as_deref())?;
            let end = match (parse_time(end.as_deref())?, duration) {
                (Some(end), _) => Some(end),
                (None, Some(duration)) => {
                    let length = parse_duration(&duration)
                        .and_then(|d| chrono::Duration::from_std(d).ok())
                        .with_context(|| format!("invalid duration: {}", duration))?;
                    Some(Season::end_after(start.unwrap_or_else(Utc::now), length)?)
                }
                (None, None) => None,
            };

            let season = engine
                .start_season(&GroupId::from(group), scope, &name, start, end)
                .await?;
            println!(
                "Started {} season {:?}: {} -> {} ({:?})",
                season.scope, season.name, season.start_time, season.end_time, season.status
            );
        }
        Commands::EditSeason {
            group,
            name,
            start,
            end,
        } => {
            let edit = SeasonEdit {
                name,
                start_time: parse_time(start.as_deref())?,
                end_time: parse_time(end.as_deref())?,
            };
            let season = engine.edit_season(&GroupId::from(group), edit).await?;
            println!(
                "Season {:?} now runs {} -> {}",
                season.name, season.start_time, season.end_time
            );
        }
        Commands::RecordMatch { group, file } => {
            let contents = std::fs::read_to_string(&file)
                .with_context(|| format!("reading {:?}", file))?;
            let submission: MatchSubmission =
                serde_json::from_str(&contents).context("parsing match submission")?;
            let receipt = engine
                .record_match(&GroupId::from(group), submission)
                .await?;
            println!(
                "Recorded match {}: {}-{} ({} players credited)",
                receipt.match_id, receipt.score_a, receipt.score_b, receipt.players_credited
            );
            if !receipt.logged {
                eprintln!("Warning: rankings updated but the match log append failed");
            }
        }
        Commands::Finalize { group } => {
            match engine.finalize_season(&GroupId::from(group)).await? {
                FinalizeOutcome::Finalized(report) => {
                    match &report.champion {
                        Some(c) => println!(
                            "Season {:?} ended. Champion: {} ({} points)",
                            report.season_name, c.display_name, c.points
                        ),
                        None => println!("Season {:?} ended without a champion", report.season_name),
                    }
                    println!(
                        "Reset {} entries, notified {}/{}",
                        report.entries_reset,
                        report.notifications.delivered,
                        report.notifications.attempted
                    );
                }
                FinalizeOutcome::AlreadyEnded => println!("Season already ended"),
                FinalizeOutcome::NotExpired { remaining_seconds } => {
                    println!("Season still running, {}s left", remaining_seconds)
                }
            }
        }
        Commands::Watch { group } => {
            let handle = CountdownMonitor::new(engine.clone(), GroupId::from(group))
                .with_tick(config.season.tick_interval())
                .spawn()
                .await?;
            let mut rx = handle.subscribe();
            loop {
                let state = rx.borrow_and_update().clone();
                println!("{}", state.display());
                if state.status == Some(SeasonStatus::Ended) || state.status.is_none() {
                    break;
                }
                tokio::select! {
                    changed = rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                    _ = tokio::signal::ctrl_c() => break,
                }
            }
            handle.shutdown().await;
        }
        Commands::Show { group } => {
            let group_id = GroupId::from(group);
            let doc = engine.get_group(&group_id).await?;
            println!("{} ({})", doc.name, doc.id);
            match &doc.season {
                Some(season) => println!(
                    "Season {:?} [{} / {:?}] ends {}",
                    season.name, season.scope, season.status, season.end_time
                ),
                None => println!("No season"),
            }

            let board = engine.leaderboard(&group_id).await?;
            println!("\n=== Players ===");
            for row in &board.players {
                println!(
                    "{:>3}. {:<20} {:>6.1} pts  {} GP  {}W {}D {}L",
                    row.rank,
                    row.entry.display_name,
                    row.entry.points,
                    row.entry.games_played,
                    row.entry.wins,
                    row.entry.draws,
                    row.entry.losses
                );
            }
            if !board.teams.is_empty() {
                println!("\n=== Teams ===");
                for row in &board.teams {
                    println!(
                        "{:>3}. {:<20} {:>3} pts  GD {:+}  {}W {}D {}L",
                        row.rank,
                        row.entry.display_name,
                        row.entry.points,
                        row.entry.goal_diff,
                        row.entry.wins,
                        row.entry.draws,
                        row.entry.losses
                    );
                }
            }
        }
    }

    Ok(())
}
