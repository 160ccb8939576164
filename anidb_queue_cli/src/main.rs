use anidb_queue_cli::config::{ConfigManager, interactive_init};
use anidb_queue_cli::error::{exit_code, format_for_user};
use anidb_queue_cli::status::StatusReport;
use anidb_queue_cli::{paths, terminal};
use anidb_queue_core::commands::HashFile;
use anidb_queue_core::repositories::{VideoLocal, VideoRepository};
use anidb_queue_core::{
    CommandRequest, Database, EnqueueOutcome, Partition, PersistedQueue, Priority, QueueService,
    QueueStatus, Repositories,
};
use anyhow::{Context, Result, bail};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{Shell, generate};
use colored::Colorize;
use log::{info, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// How often `run` logs the live queue status
const STATUS_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Parser)]
#[command(name = "anidb-queue")]
#[command(author, version, about = "AniDB command queue - persisted, rate-limited AniDB jobs", long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Configuration file to use instead of the default
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Directory holding the queue database and images
    #[arg(long, global = true, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in and process queued commands until interrupted
    Run,

    /// Register local files and queue them for hashing
    Add {
        /// Files to register
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Queue a command given as JSON, e.g. '{"type":"GetEpisode","eid":5}'
    Enqueue {
        /// Tagged command payload
        json: String,

        /// Priority from 1 (most urgent) to 11
        #[arg(short, long)]
        priority: Option<u8>,
    },

    /// Show queue depths, parked failures and scheduled update times
    Status {
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Return parked failures to the queue
    Requeue {
        /// Only this partition (general, hasher or images)
        partition: Option<Partition>,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },

    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Interactively set up credentials and client registration
    Init {
        /// Overwrite existing credentials without asking
        #[arg(long)]
        force: bool,
    },
    /// Get a configuration value
    Get {
        /// Key in dot notation (e.g. anidb.client_name)
        key: String,
    },
    /// Set a configuration value
    Set {
        /// Key in dot notation (e.g. rate_limit.udp_short_delay_ms)
        key: String,
        value: String,
    },
    /// List all configuration values
    List,
    /// Show the configuration file path
    Path,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if cli.debug {
        env_logger::Builder::from_env(env_logger::Env::default())
            .filter_level(log::LevelFilter::Debug)
            .filter_module("anidb_queue_core", log::LevelFilter::Debug)
            .filter_module("anidb_queue_cli", log::LevelFilter::Debug)
            .format_timestamp_millis()
            .init();
        eprintln!("Debug logging enabled");
    } else {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    }
    terminal::configure_colors();

    let debug = cli.debug;
    if let Err(e) = dispatch(cli).await {
        eprintln!("{}", format_for_user(&e, debug));
        std::process::exit(exit_code(&e).code());
    }
}

async fn dispatch(cli: Cli) -> Result<()> {
    let mut manager = match cli.config {
        Some(path) => ConfigManager::with_path(path),
        None => ConfigManager::new(),
    };
    let data_dir = cli.data_dir.unwrap_or_else(paths::data_dir);

    match cli.command {
        Commands::Run => run(&manager, &data_dir).await,
        Commands::Add { files } => add(&data_dir, &files).await,
        Commands::Enqueue { json, priority } => enqueue(&data_dir, &json, priority).await,
        Commands::Status { json } => status(&data_dir, json).await,
        Commands::Requeue { partition } => requeue(&data_dir, partition).await,
        Commands::Config { command } => config(&mut manager, command),
        Commands::Completions { shell } => {
            generate(
                shell,
                &mut Cli::command(),
                "anidb-queue",
                &mut std::io::stdout(),
            );
            Ok(())
        }
    }
}

async fn open_database(data_dir: &Path) -> Result<Database> {
    let path = paths::database_path(data_dir);
    Database::new(&path)
        .await
        .with_context(|| format!("Failed to open queue database {}", path.display()))
}

async fn run(manager: &ConfigManager, data_dir: &Path) -> Result<()> {
    let config = manager.load()?;
    // Refuse to start without credentials rather than fail on the first command
    config
        .anidb
        .login_target()
        .context("AniDB credentials are not configured (run 'anidb-queue config init')")?;

    let service = QueueService::open(config, data_dir)
        .await
        .context("Failed to start the queue service")?;
    service.start().await?;
    match service.login(None).await {
        Ok(true) => info!("Logged in to AniDB"),
        Ok(false) => warn!("AniDB refused the login; commands will wait for a session"),
        Err(e) => warn!("Login failed: {e}"),
    }
    println!(
        "{} Processing queue in {} (Ctrl-C to stop)",
        "▶".green(),
        data_dir.display()
    );

    let mut ticker = tokio::time::interval(STATUS_INTERVAL);
    ticker.tick().await;
    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal.context("Failed to listen for Ctrl-C")?;
                break;
            }
            _ = ticker.tick() => match service.status().await {
                Ok(status) => log_status(&status),
                Err(e) => warn!("Failed to read queue status: {e}"),
            },
        }
    }

    println!("Stopping...");
    service.dispose().await?;
    println!("{}", "✓ Stopped".green());
    Ok(())
}

fn log_status(status: &QueueStatus) {
    for p in &status.partitions {
        info!(
            "{}: {} queued, {} failed, {}{}",
            p.partition,
            p.depth,
            p.failed,
            p.state,
            p.current
                .as_deref()
                .map(|c| format!(" ({c})"))
                .unwrap_or_default()
        );
    }
    if status.banned {
        warn!("AniDB ban in effect since {:?}", status.ban_time);
    }
}

async fn add(data_dir: &Path, files: &[PathBuf]) -> Result<()> {
    let database = open_database(data_dir).await?;
    let repos = Repositories::from_store(Arc::new(database.entity_store()));
    let queue = PersistedQueue::new(Arc::new(database.command_store()));

    let mut videos = repos.videos.videos().await?;
    for file in files {
        let path = file
            .canonicalize()
            .with_context(|| format!("Cannot add {}", file.display()))?;
        if !path.is_file() {
            bail!("{} is not a file", path.display());
        }

        let id = match videos.iter().find(|v| v.path == path) {
            Some(existing) => existing.id,
            None => {
                let id = videos.iter().map(|v| v.id).max().unwrap_or(0) + 1;
                let video = VideoLocal::new(id, path.clone());
                repos.videos.save_video(&video).await?;
                videos.push(video);
                id
            }
        };

        let request = CommandRequest::from(HashFile {
            video_id: id,
            force: false,
        });
        let outcome = queue.enqueue(&request, None).await?;
        print_outcome(&outcome, &request.key());
    }

    database.close().await;
    Ok(())
}

async fn enqueue(data_dir: &Path, json: &str, priority: Option<u8>) -> Result<()> {
    let request: CommandRequest =
        serde_json::from_str(json).context("Invalid command JSON")?;
    let priority = priority.map(Priority::new).transpose()?;

    let database = open_database(data_dir).await?;
    let queue = PersistedQueue::new(Arc::new(database.command_store()));
    let outcome = queue.enqueue(&request, priority).await?;
    print_outcome(&outcome, &request.key());
    database.close().await;
    Ok(())
}

fn print_outcome(outcome: &EnqueueOutcome, key: &str) {
    match outcome {
        EnqueueOutcome::Inserted(id) => println!("{} Queued #{id} {key}", "✓".green()),
        EnqueueOutcome::Existing(id) => {
            println!("{} Already queued as #{id} {key}", "•".yellow())
        }
    }
}

async fn status(data_dir: &Path, json: bool) -> Result<()> {
    let database = open_database(data_dir).await?;
    let report = StatusReport::collect(&database).await?;
    database.close().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", report.render());
    }
    Ok(())
}

async fn requeue(data_dir: &Path, partition: Option<Partition>) -> Result<()> {
    let database = open_database(data_dir).await?;
    let queue = PersistedQueue::new(Arc::new(database.command_store()));
    let count = queue.requeue_failed(partition).await?;
    database.close().await;

    println!("Requeued {count} command(s)");
    Ok(())
}

fn config(manager: &mut ConfigManager, command: ConfigCommand) -> Result<()> {
    match command {
        ConfigCommand::Init { force } => {
            if !terminal::is_interactive() {
                bail!("'config init' needs an interactive terminal; use 'config set' instead");
            }
            interactive_init(manager, force)
        }
        ConfigCommand::Get { key } => {
            println!("{}", manager.get(&key)?);
            Ok(())
        }
        ConfigCommand::Set { key, value } => {
            manager.set(&key, &value)?;
            println!("{} Set {key}", "✓".green());
            Ok(())
        }
        ConfigCommand::List => {
            for (key, value) in manager.list()? {
                println!("{} = {value}", key.cyan());
            }
            Ok(())
        }
        ConfigCommand::Path => {
            println!("{}", manager.config_path().display());
            Ok(())
        }
    }
}
