//! Hospital registry fetcher CLI
//!
//! Runs a single fetch, the recurring scheduler, and schedule maintenance.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{Local, NaiveDateTime};
use clap::{Parser, Subcommand};
use hospital_fetcher::{
    config,
    error::Result,
    models::{Config, HistorySummary, Policy},
    pipeline,
    schedule::{ScheduleCommand, ScheduleDriver, Signal},
    storage::{DataStore, LocalStorage},
    utils::http::{HttpClient, ReqwestClient},
    utils::log as console,
};

/// Hospital registry fetcher
#[derive(Parser, Debug)]
#[command(
    name = "hospital-fetcher",
    version,
    about = "Fetches hospital registry files and keeps only real changes"
)]
struct Cli {
    /// Path to the TOML config file
    #[arg(short, long, default_value = "data/config.toml", global = true)]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch all active pages once
    Fetch {
        /// Only fetch these sources (repeatable)
        #[arg(long = "source")]
        sources: Vec<String>,
    },

    /// Run the scheduler until interrupted
    Run,

    /// Show or change the recurring schedule
    Schedule {
        #[command(subcommand)]
        action: ScheduleAction,
    },

    /// Show recent fetch runs
    History {
        /// Number of records to show
        #[arg(long, default_value_t = 10)]
        limit: usize,

        /// Show per-page statuses instead of run totals
        #[arg(long)]
        pages: bool,
    },

    /// List saved files
    Files,

    /// Validate the configuration file
    Validate,
}

#[derive(Subcommand, Debug)]
enum ScheduleAction {
    /// Print the current schedule and next run
    Show,
    /// Turn scheduled fetching on
    Enable,
    /// Turn scheduled fetching off
    Disable,
    /// Replace the recurrence policy
    Set {
        #[command(subcommand)]
        policy: PolicyArg,
    },
}

#[derive(Subcommand, Debug)]
enum PolicyArg {
    /// Every hour at the given minute
    Hourly {
        #[arg(long, default_value_t = 0)]
        minute: u32,
    },
    /// Every day at the given time
    Daily {
        #[arg(long, default_value_t = 0)]
        hour: u32,
        #[arg(long, default_value_t = 0)]
        minute: u32,
    },
    /// Every week on the given weekday (0 = Monday)
    Weekly {
        #[arg(long)]
        weekday: u32,
        #[arg(long, default_value_t = 0)]
        hour: u32,
        #[arg(long, default_value_t = 0)]
        minute: u32,
    },
    /// Every month on the given day (days after 28 run on the 28th)
    Monthly {
        #[arg(long)]
        day: u32,
        #[arg(long, default_value_t = 0)]
        hour: u32,
        #[arg(long, default_value_t = 0)]
        minute: u32,
    },
    /// Every N minutes
    Custom {
        #[arg(long)]
        interval: u32,
    },
}

impl From<PolicyArg> for Policy {
    fn from(arg: PolicyArg) -> Self {
        match arg {
            PolicyArg::Hourly { minute } => Policy::Hourly { minute },
            PolicyArg::Daily { hour, minute } => Policy::Daily { hour, minute },
            PolicyArg::Weekly {
                weekday,
                hour,
                minute,
            } => Policy::Weekly {
                weekday,
                hour,
                minute,
            },
            PolicyArg::Monthly { day, hour, minute } => Policy::Monthly { day, hour, minute },
            PolicyArg::Custom { interval } => Policy::Custom {
                interval_minutes: interval,
            },
        }
    }
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

fn now() -> NaiveDateTime {
    Local::now().naive_local()
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let (config, storage) = config::load_all(&cli.config)?;
    console::init(if cli.verbose {
        "debug"
    } else {
        config.logging.level.as_str()
    });
    log::debug!("Loaded configuration from {}", cli.config.display());

    let storage = Arc::new(storage);

    match cli.command {
        Command::Fetch { sources } => {
            let sources = config.active_sources(&sources);
            let client = build_client(&config)?;
            pipeline::run_fetch(&config, client, storage, &sources).await?;
        }

        Command::Run => run_scheduler(&config, storage).await?,

        Command::Schedule { action } => manage_schedule(&storage, action).await?,

        Command::History { limit, pages } => {
            if pages {
                show_page_statuses(storage.as_ref(), limit).await?;
            } else {
                show_history(storage.as_ref(), limit).await?;
            }
        }

        Command::Files => {
            let files = storage.list_datasets().await?;
            if files.is_empty() {
                console::info("No files saved yet.");
            }
            for file in files {
                let modified = file
                    .modified
                    .map(|m| m.format("%Y-%m-%d %H:%M:%S").to_string())
                    .unwrap_or_else(|| "-".to_string());
                console::sub_item(&format!(
                    "{:<28} {:>10} bytes  {}",
                    file.identity, file.size, modified
                ));
            }
        }

        Command::Validate => {
            for source in &config.sources {
                for page in &source.pages {
                    console::sub_item(&format!(
                        "{:<14} {:<8} {}",
                        page.key(&source.name),
                        if page.enabled { "enabled" } else { "disabled" },
                        page.url
                    ));
                }
            }
            let pages: usize = config.sources.iter().map(|s| s.pages.len()).sum();
            console::success(&format!(
                "Config OK: {} sources, {} pages, {} naming rules",
                config.sources.len(),
                pages,
                config.naming_rules.len()
            ));
        }
    }

    Ok(())
}

fn build_client(config: &Config) -> Result<Arc<dyn HttpClient>> {
    Ok(Arc::new(ReqwestClient::new(&config.fetcher)?))
}

/// Tick the schedule until Ctrl-C, fetching whenever a run is due.
///
/// Settings are re-read every tick so `schedule` commands from another
/// shell take effect without a restart.
async fn run_scheduler(config: &Config, storage: Arc<LocalStorage>) -> Result<()> {
    let client = build_client(config)?;
    let sources = config.active_sources(&[]);
    let settings = storage.load_schedule().await?;
    let mut driver = ScheduleDriver::new(&settings, now())?;

    console::header("Scheduler started");
    print_status(&driver);
    if !settings.enabled {
        console::warn("Schedule is disabled. Run `schedule enable` to start fetching.");
    }

    loop {
        let tick_time = now();
        match storage.load_schedule().await {
            Ok(settings) => {
                if driver.sync(&settings, tick_time)? {
                    console::info("Schedule settings changed");
                    print_status(&driver);
                }
            }
            Err(e) => log::warn!("Failed to reload schedule settings: {e}"),
        }

        if driver.tick(tick_time)? == Signal::Trigger {
            let result =
                pipeline::run_fetch(config, client.clone(), storage.clone(), &sources).await;
            if let Err(e) = result {
                log::error!("Scheduled fetch failed: {e}");
            }
            driver.dispatch(ScheduleCommand::RunFinished, now())?;
            print_status(&driver);
        }

        tokio::select! {
            _ = tokio::time::sleep(driver.poll_hint()) => {}
            _ = tokio::signal::ctrl_c() => {
                console::info("Stopping scheduler");
                return Ok(());
            }
        }
    }
}

async fn manage_schedule(storage: &LocalStorage, action: ScheduleAction) -> Result<()> {
    let mut settings = storage.load_schedule().await?;

    match action {
        ScheduleAction::Show => {
            let driver = ScheduleDriver::new(&settings, now())?;
            print_status(&driver);
            if let Some(updated) = settings.updated_at {
                console::sub_item(&format!("Last changed: {}", updated.format("%Y-%m-%d %H:%M")));
            }
            return Ok(());
        }
        ScheduleAction::Enable => settings.enabled = true,
        ScheduleAction::Disable => settings.enabled = false,
        ScheduleAction::Set { policy } => {
            let policy = Policy::from(policy);
            policy.validate()?;
            settings.policy = policy;
        }
    }

    storage.save_schedule(&settings).await?;
    let driver = ScheduleDriver::new(&settings, now())?;
    console::success("Schedule saved");
    print_status(&driver);
    Ok(())
}

fn print_status(driver: &ScheduleDriver) {
    let status = driver.status(now());
    console::sub_item(&format!(
        "Schedule: {} ({})",
        status.policy,
        if status.enabled { "enabled" } else { "disabled" }
    ));
    if let (Some(next), Some(remaining)) = (status.next_run, status.seconds_until_next) {
        console::sub_item(&format!(
            "Next run: {} (in {}m {}s)",
            next.format("%Y-%m-%d %H:%M"),
            remaining / 60,
            remaining % 60
        ));
    }
}

async fn show_history(storage: &dyn DataStore, limit: usize) -> Result<()> {
    let records = storage.load_attempts().await?;
    if records.is_empty() {
        console::info("No fetch history yet.");
        return Ok(());
    }

    for record in records.iter().rev().take(limit) {
        console::sub_item(&format!(
            "{}  pages {:>3}  links {:>3}  failed {:>3}",
            record.timestamp.format("%Y-%m-%d %H:%M:%S"),
            record.stats.total_attempts,
            record.stats.successful,
            record.stats.failed
        ));
    }

    let summary = HistorySummary::from_records(&records);
    console::summary(
        "History",
        &[
            ("Runs", summary.runs.to_string()),
            ("Pages checked", summary.totals.total_attempts.to_string()),
            ("Links found", summary.totals.successful.to_string()),
            (
                "Page success rate",
                format!("{:.1}%", summary.totals.success_rate() * 100.0),
            ),
        ],
    );
    Ok(())
}

async fn show_page_statuses(storage: &dyn DataStore, limit: usize) -> Result<()> {
    let records = storage.load_statuses().await?;
    if records.is_empty() {
        console::info("No page statuses recorded yet.");
        return Ok(());
    }
    for record in records.iter().rev().take(limit) {
        console::sub_item(&format!(
            "{}  {:<3} {:?}  {}{}",
            record.timestamp.format("%Y-%m-%d %H:%M:%S"),
            record.source,
            record.status,
            record.url,
            record
                .error
                .as_deref()
                .map(|e| format!("  ({e})"))
                .unwrap_or_default()
        ));
    }
    Ok(())
}
