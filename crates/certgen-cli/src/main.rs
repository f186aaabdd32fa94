use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use serde::Serialize;

use certgen::batch::BatchRequest;
use certgen::certificate::{IssueRequest, SharePlatform};
use certgen::config::{apply_env_overrides, load_config, validate_config, Config};
use certgen::model::JobStatus;
use certgen::{init_logging, CertgenApp, LogFormat};

#[derive(Parser, Debug)]
#[command(name = "certgen", version, about = "Issue and verify course completion certificates")]
struct Cli {
    /// Path to the JSON configuration file.
    #[arg(long, short, env = "CERTGEN_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Log output format (text or json). Logs go to stderr.
    #[arg(long, env = "CERTGEN_LOG_FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Submit a batch request read from a JSON file.
    Submit {
        file: PathBuf,
        /// Process the batch in this process and print the final status.
        #[arg(long)]
        wait: bool,
    },
    /// Show the full status of a batch job.
    Status { job_id: String },
    /// List batch jobs, newest first.
    List {
        #[arg(long)]
        status: Option<JobStatus>,
        #[arg(long)]
        limit: Option<u32>,
        #[arg(long)]
        page: Option<u32>,
    },
    /// Process queued batches until interrupted.
    Serve {
        /// Seconds between checks for unqueued jobs.
        #[arg(long, default_value_t = 5)]
        poll_secs: u64,
    },
    /// Delete finished batch jobs past the retention window once.
    Sweep,
    /// Single certificate commands.
    #[command(subcommand)]
    Cert(CertCommand),
}

#[derive(Subcommand, Debug)]
enum CertCommand {
    /// Issue one certificate from a JSON request file.
    Issue { file: PathBuf },
    Get { certificate_id: String },
    /// List a student's certificates.
    List { student_id: String },
    Revoke { certificate_id: String },
    Delete { certificate_id: String },
    /// Verify by access token.
    Verify { access_token: String },
    Stats,
    /// Print a share link and count the share.
    Share {
        certificate_id: String,
        platform: SharePlatform,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_format).context("initializing logging")?;

    let config = resolve_config(cli.config.as_deref())?;
    let app = CertgenApp::from_config(config).context("opening certgen")?;

    match cli.command {
        Command::Submit { file, wait } => submit(&app, &file, wait),
        Command::Status { job_id } => print_json(&app.orchestrator().status(&job_id)?),
        Command::List {
            status,
            limit,
            page,
        } => print_json(&app.orchestrator().list(status, limit, page)?),
        Command::Serve { poll_secs } => serve(&app, Duration::from_secs(poll_secs.max(1))),
        Command::Sweep => {
            let deleted = app.retention_sweeper().sweep_once(Utc::now())?;
            print_json(&serde_json::json!({ "deleted": deleted }))
        }
        Command::Cert(command) => cert(&app, command),
    }
}

fn resolve_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Ok(load_config(path)?),
        None => {
            let mut config = Config::default();
            apply_env_overrides(&mut config)?;
            validate_config(&config)?;
            Ok(config)
        }
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("parsing {}", path.display()))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn submit(app: &CertgenApp, file: &Path, wait: bool) -> Result<()> {
    let request: BatchRequest = read_json(file)?;

    if !wait {
        let (acceptance, _) = app.orchestrator().admit(request)?;
        return print_json(&acceptance);
    }

    let pool = app.start_workers()?;
    let acceptance = pool.submit(request)?;
    log::info!("Waiting for batch job {}", acceptance.job_id);

    while let Some(outcome) = pool.recv_outcome() {
        if outcome.job_id == acceptance.job_id {
            break;
        }
    }
    pool.shutdown();
    pool.wait();

    print_json(&app.orchestrator().status(&acceptance.job_id)?)
}

fn serve(app: &CertgenApp, poll_interval: Duration) -> Result<()> {
    let running = Arc::new(AtomicBool::new(true));
    let flag = Arc::clone(&running);
    ctrlc::set_handler(move || {
        flag.store(false, Ordering::SeqCst);
    })
    .context("installing Ctrl-C handler")?;

    let pool = app.start_workers()?;
    let sweeper = app
        .retention_sweeper()
        .spawn(Duration::from_secs(app.config().retention.sweep_interval_secs))?;

    pool.recover()?;
    log::info!("certgen serving; press Ctrl-C to stop");

    let mut last_poll = Instant::now();
    while running.load(Ordering::SeqCst) {
        if let Some(outcome) = pool.recv_outcome_timeout(Duration::from_millis(250)) {
            match outcome.error {
                Some(ref error) => log::error!("Batch job {} failed: {}", outcome.job_id, error),
                None => log::info!(
                    "Batch job {} finished: {} completed, {} failed",
                    outcome.job_id,
                    outcome.completed,
                    outcome.failed
                ),
            }
        }

        if last_poll.elapsed() >= poll_interval {
            last_poll = Instant::now();
            if let Err(e) = pool.recover() {
                log::error!("Failed to poll for unqueued jobs: {}", e);
            }
            log::debug!(
                "{} batch jobs queued, {} running",
                pool.queued_len(),
                pool.in_flight_count()
            );
        }
    }

    pool.shutdown();
    pool.wait();
    sweeper.stop();
    log::info!("certgen stopped");
    Ok(())
}

fn cert(app: &CertgenApp, command: CertCommand) -> Result<()> {
    let service = app.certificates();
    match command {
        CertCommand::Issue { file } => {
            let request: IssueRequest = read_json(&file)?;
            print_json(&service.issue(&request)?)
        }
        CertCommand::Get { certificate_id } => print_json(&service.get(&certificate_id)?),
        CertCommand::List { student_id } => print_json(&service.list_for_student(&student_id)?),
        CertCommand::Revoke { certificate_id } => print_json(&service.revoke(&certificate_id)?),
        CertCommand::Delete { certificate_id } => {
            service.delete(&certificate_id)?;
            print_json(&serde_json::json!({ "deleted": certificate_id }))
        }
        CertCommand::Verify { access_token } => {
            let result = service.verify(&access_token)?;
            print_json(&result)?;
            if !result.valid {
                bail!("certificate has been revoked");
            }
            Ok(())
        }
        CertCommand::Stats => print_json(&service.stats()?),
        CertCommand::Share {
            certificate_id,
            platform,
        } => {
            let url = service.record_share(&certificate_id, platform)?;
            print_json(&serde_json::json!({ "platform": platform, "url": url }))
        }
    }
}
