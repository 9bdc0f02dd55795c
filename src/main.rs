//! # Contact Dedup CLI (`dedup`)
//!
//! Finds duplicate HubSpot contacts created in a date window and merges
//! them pairwise, keeping the most recently active record.
//!
//! ## Usage
//!
//! ```bash
//! dedup --config ./config/dedup.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `dedup scan` | Fetch, group and plan without merging |
//! | `dedup merge --yes` | Fetch, group, plan and execute the merges |
//! | `dedup lookup <phone>` | Find contacts stored under any spelling of a number |
//! | `dedup normalize <value>` | Print the normalized phone or email key |
//! | `dedup check` | Validate the config and the API token |
//!
//! ## Examples
//!
//! ```bash
//! # Review yesterday's duplicates
//! dedup scan
//!
//! # Review one week and write the groups to CSV
//! dedup scan --since 2025-08-01 --until 2025-08-07 --export
//!
//! # Merge one day's duplicates
//! dedup merge --date 2025-08-14 --yes
//! ```

use anyhow::{bail, Result};
use chrono::{Duration, NaiveDate, Utc};
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, Instrument};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use contact_dedup::config::{self, Config};
use contact_dedup::export;
use contact_dedup::hubspot::HubSpotClient;
use contact_dedup::models::DuplicateKind;
use contact_dedup::normalize::{normalize_email, normalize_phone};
use contact_dedup::progress::ProgressMode;
use contact_dedup::report;
use contact_dedup::run::{run_dedup, RunReport, RunRequest};
use contact_dedup::window::{parse_day, DateWindow};

/// Contact Dedup CLI: find and merge duplicate CRM contacts.
///
/// All commands except `normalize` read a TOML configuration file given by
/// `--config`. See `config/dedup.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "dedup",
    about = "Find and merge duplicate HubSpot contacts by phone and email",
    version,
    long_about = "Fetches the contacts created in a date window, groups them by normalized phone \
    number and by normalized email, and merges each duplicate group into its most recently \
    active contact. Groups of four or more contacts are reported for manual review."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/dedup.toml")]
    config: PathBuf,

    /// Increase log verbosity (-v info, -vv debug). Overrides RUST_LOG.
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Progress output on stderr. Defaults to `human` on a terminal.
    #[arg(long, global = true, value_enum)]
    progress: Option<ProgressMode>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch, group and plan without merging anything.
    Scan {
        #[command(flatten)]
        window: WindowArgs,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Fetch, group, plan and execute the merges.
    ///
    /// Merges cannot be undone from this tool. Run `dedup scan` first.
    Merge {
        #[command(flatten)]
        window: WindowArgs,

        #[command(flatten)]
        output: OutputArgs,

        /// Confirm that merges should be executed.
        #[arg(long)]
        yes: bool,
    },

    /// Find contacts stored under any common spelling of a phone number.
    Lookup {
        /// Phone number in any format, e.g. "+91 98765 43210".
        phone: String,
    },

    /// Print the normalized key of a phone number or email address.
    Normalize {
        value: String,

        /// Key type. Guessed from the value when omitted.
        #[arg(long, value_enum)]
        kind: Option<KindArg>,
    },

    /// Validate the configuration and check that the API token is set.
    Check,
}

/// Date window selection. Without flags the window is yesterday.
#[derive(Args)]
struct WindowArgs {
    /// Single day (YYYY-MM-DD).
    #[arg(long, conflicts_with_all = ["since", "until"])]
    date: Option<String>,

    /// First day of a range (YYYY-MM-DD).
    #[arg(long, requires = "until")]
    since: Option<String>,

    /// Last day of a range, inclusive (YYYY-MM-DD).
    #[arg(long, requires = "since")]
    until: Option<String>,
}

impl WindowArgs {
    fn resolve(&self, utc_offset_minutes: i32) -> Result<DateWindow> {
        match (&self.date, &self.since, &self.until) {
            (Some(day), None, None) => DateWindow::single_day(parse_day(day)?, utc_offset_minutes),
            (None, Some(since), Some(until)) => {
                DateWindow::for_days(parse_day(since)?, parse_day(until)?, utc_offset_minutes)
            }
            (None, None, None) => {
                DateWindow::single_day(yesterday(utc_offset_minutes)?, utc_offset_minutes)
            }
            _ => bail!("use either --date or --since with --until"),
        }
    }
}

fn yesterday(utc_offset_minutes: i32) -> Result<NaiveDate> {
    let today = (Utc::now() + Duration::minutes(i64::from(utc_offset_minutes))).date_naive();
    today
        .pred_opt()
        .ok_or_else(|| anyhow::anyhow!("no day before {}", today))
}

#[derive(Args)]
struct OutputArgs {
    /// Write the duplicate groups to CSV. Without a path, a timestamped
    /// file is created under `export.dir`.
    #[arg(long, num_args = 0..=1, value_name = "PATH")]
    export: Option<Option<PathBuf>>,

    /// Print the run report as JSON instead of the summary.
    #[arg(long)]
    json: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum KindArg {
    Phone,
    Email,
}

fn init_tracing(verbose: u8) {
    let env_filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("info"),
        _ => EnvFilter::new("debug"),
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    // Commands that don't require config
    if let Commands::Normalize { value, kind } = &cli.command {
        let kind = match kind {
            Some(KindArg::Phone) => DuplicateKind::Phone,
            Some(KindArg::Email) => DuplicateKind::Email,
            None if value.contains('@') => DuplicateKind::Email,
            None => DuplicateKind::Phone,
        };
        let key = match kind {
            DuplicateKind::Phone => normalize_phone(value),
            DuplicateKind::Email => normalize_email(value),
        };
        println!("{}", key.as_deref().unwrap_or("(none)"));
        return Ok(());
    }
    if let Commands::Merge { yes: false, .. } = &cli.command {
        bail!("refusing to merge without --yes; review the plan with `dedup scan` first");
    }

    let cfg = config::load_config(&cli.config)?;
    let progress = cli.progress.unwrap_or_else(ProgressMode::default_for_tty);

    match cli.command {
        Commands::Scan { window, output } => {
            run(&cfg, &window, &output, progress, true).await?;
        }
        Commands::Merge { window, output, .. } => {
            run(&cfg, &window, &output, progress, false).await?;
        }
        Commands::Lookup { phone } => {
            let Some(normalized) = normalize_phone(&phone) else {
                bail!("'{}' is not a valid 10-digit mobile number", phone);
            };
            let client = HubSpotClient::new(&cfg)?;
            let contacts = client.find_by_phone(&phone).await?;
            report::print_lookup(&phone, &normalized, &contacts);
        }
        Commands::Check => {
            println!("config ok: {}", cli.config.display());
            println!("  base url:   {}", cfg.crm.base_url);
            println!("  window:     {} (UTC{:+} min)", cfg.window.field, cfg.window.utc_offset_minutes);
            println!("  activity:   {}", cfg.activity.fields.join(", "));
            cfg.crm.token()?;
            println!("  token:      {} is set", cfg.crm.token_env);
            println!("ok");
        }
        // Handled above (before config loading)
        Commands::Normalize { .. } => unreachable!(),
    }

    Ok(())
}

async fn run(
    cfg: &Config,
    window: &WindowArgs,
    output: &OutputArgs,
    progress: ProgressMode,
    dry_run: bool,
) -> Result<()> {
    let window = window.resolve(cfg.window.utc_offset_minutes)?;
    let run_id = Uuid::new_v4();
    let reporter = progress.reporter();

    let client = HubSpotClient::new(cfg)?.with_reporter(Arc::clone(&reporter));
    let request = RunRequest::new(window, &cfg.merge, dry_run);

    let span = tracing::info_span!("run", run_id = %run_id, window = %window, dry_run);
    let report = run_dedup(&client, &client, &request, reporter.as_ref())
        .instrument(span)
        .await?;
    info!(run_id = %run_id, groups = report.outcomes.len(), "run finished");

    if output.json {
        report::print_json(&report)?;
    } else {
        report::print_summary(&report)?;
    }

    if let Some(path) = &output.export {
        export_groups(cfg, &report, path.clone(), output.json)?;
    }
    Ok(())
}

fn export_groups(cfg: &Config, report: &RunReport, path: Option<PathBuf>, quiet: bool) -> Result<()> {
    let path = path
        .unwrap_or_else(|| export::default_export_path(&cfg.export.dir, &report.window, Utc::now()));
    let rows = export::write_groups_csv(&path, report, &report.contacts)?;
    if quiet {
        eprintln!("exported {} rows to {}", rows, path.display());
    } else {
        println!("exported {} rows to {}", rows, path.display());
    }
    Ok(())
}
