use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use pagewatch::capture::{ChromeRenderer, ScreenshotCapturer};
use pagewatch::config::Config;
use pagewatch::database::{Database, DatabaseImpl, initialize_database};
use pagewatch::diff::DiffEngine;
use pagewatch::monitoring::{CheckComponents, CheckExecutor, ExecutorSettings, HttpChecker, Scheduler};
use pagewatch::notifications::{LogMailer, NotificationTrigger};
use pagewatch::pages::PageService;
use pagewatch::pool::open_pool;
use pagewatch::retention::RetentionManager;
use pagewatch::storage::build_store;

#[derive(Parser)]
#[command(name = "pagewatch", version, about = "Webpage uptime and visual change monitor")]
struct Cli {
    /// Config file (defaults to $XDG_CONFIG_HOME/pagewatch/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the monitoring loop
    Run {
        /// Seconds between scan rounds
        #[arg(long)]
        interval: Option<u64>,
        /// HTTP probe timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,
        /// Exit after a single round
        #[arg(long)]
        once: bool,
    },
    /// Register a page and run its first check
    Add {
        #[arg(long)]
        owner: String,
        #[arg(long)]
        url: String,
        /// Contact address for the owner's alerts
        #[arg(long)]
        email: Option<String>,
    },
    /// Check a page now
    Check { id: i64 },
    /// Delete a page with its history and screenshots
    Remove {
        #[arg(long)]
        owner: String,
        id: i64,
    },
    /// List an owner's pages
    List {
        #[arg(long)]
        owner: String,
    },
    /// Print the effective configuration
    Config,
}

struct Runtime {
    database: Arc<dyn Database>,
    executor: Arc<CheckExecutor>,
    pages: PageService,
}

async fn build_runtime(config: &Config, probe_timeout: Duration) -> Result<Runtime> {
    let pool = open_pool(&config.database.path, config.database.max_connections)
        .await
        .with_context(|| format!("opening database {}", config.database.path))?;
    {
        let conn = pool.get().await?;
        initialize_database(&*conn).await?;
    }
    let database: Arc<dyn Database> = Arc::new(DatabaseImpl::new_from_pool(pool));

    let store = build_store(&config.storage).await?;

    let shots = &config.screenshots;
    let capturer = Arc::new(ScreenshotCapturer::new(
        Arc::new(ChromeRenderer::new(shots)),
        store.clone(),
        shots.clone(),
    ));
    let diff = Arc::new(DiffEngine::new(store.clone(), shots.jpeg_quality));
    let retention = Arc::new(RetentionManager::new(database.clone(), store.clone()));
    let notifications = Arc::new(NotificationTrigger::new(
        database.clone(),
        store.clone(),
        Arc::new(LogMailer),
        config.notifications.clone(),
    ));

    let executor = Arc::new(CheckExecutor::new(
        CheckComponents {
            checker: Arc::new(HttpChecker::new(probe_timeout)?),
            database: database.clone(),
            store: store.clone(),
            capturer: capturer.clone(),
            diff,
            retention,
            notifications,
        },
        ExecutorSettings {
            screenshot_timeout: Duration::from_millis(shots.capture_timeout_ms),
            max_screenshots_per_page: config.retention.max_screenshots_per_page,
        },
    ));
    let pages = PageService::new(database.clone(), store, executor.clone(), capturer);

    Ok(Runtime { database, executor, pages })
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let mut config = Config::from_config(cli.config.as_ref())?;
    config.apply_env_overrides();
    logger::init_from_config(&config.logging.level, &config.logging.format);

    let mut probe_timeout = config.scheduler.timeout_seconds;
    if let Command::Run { interval, timeout, once } = &cli.command {
        if let Some(interval) = interval {
            config.scheduler.interval_seconds = *interval;
        }
        if let Some(timeout) = timeout {
            probe_timeout = *timeout;
        }
        config.scheduler.run_once |= *once;
    }

    if let Command::Config = cli.command {
        println!("{config}");
        return Ok(());
    }

    let runtime = build_runtime(&config, Duration::from_secs(probe_timeout.max(1))).await?;

    match cli.command {
        Command::Run { .. } => {
            let scheduler = Scheduler::new(
                runtime.database.clone(),
                runtime.executor.clone(),
                Duration::from_secs(config.scheduler.interval_seconds.max(1)),
                config.scheduler.run_once,
            );
            let handle = scheduler.start();

            if !config.scheduler.run_once {
                tokio::signal::ctrl_c().await?;
                info!("Shutting down after the current round");
                handle.stop();
            }
            handle.join().await?;
        }
        Command::Add { owner, url, email } => {
            if let Some(email) = email {
                runtime.database.set_owner_email(&owner, &email).await?;
            }
            let registration = runtime.pages.register(&owner, &url).await?;
            let page = &registration.page;
            match &registration.first_check {
                Some(result) => {
                    println!("Registered page {} ({})", page.id, page.url);
                    println!("{}", serde_json::to_string_pretty(result)?);
                }
                None => println!("Already monitoring {} as page {}", page.url, page.id),
            }
        }
        Command::Check { id } => {
            let page = runtime.database.get_page(id).await?.ok_or_else(|| anyhow!("page {id} not found"))?;
            let result = runtime.executor.run_check(&page, false).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Command::Remove { owner, id } => {
            runtime.pages.delete_page(&owner, id).await?;
            println!("Removed page {id}");
        }
        Command::List { owner } => {
            for page in runtime.pages.pages(&owner).await? {
                let last = runtime.database.latest_result(page.id).await?;
                let status = match last {
                    Some(result) if result.is_up => "UP".to_string(),
                    Some(result) => format!("DOWN ({})", result.message),
                    None => "never checked".to_string(),
                };
                println!(
                    "{:>5} {} {} every {}m  {}",
                    page.id,
                    if page.is_pinned { "*" } else { " " },
                    page.url,
                    page.check_interval_minutes,
                    status
                );
            }
        }
        // Printed before the runtime is built
        Command::Config => {}
    }

    Ok(())
}
