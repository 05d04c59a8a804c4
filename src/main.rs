use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use grading_watch::alert::{Notifier, SlackSink, StdoutSink, WebhookSink};
use grading_watch::config::{Config, ConfigOverrides, NotifierKind};
use grading_watch::output::json::render_json;
use grading_watch::output::table::{render_report_table, render_snapshot_tables};
use grading_watch::report::append_error_log;
use grading_watch::runner::{check_remote, Runner};
use grading_watch::snapshot::{AssignmentKey, SnapshotStore};
use grading_watch::submissions::CodePostFetcher;
use grading_watch::timeutil::Timestamp;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(Debug, Parser)]
#[command(
    name = "grading-watch",
    about = "Posts codePost grading progress to Slack"
)]
struct Cli {
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    #[arg(long = "data-dir", global = true)]
    data_dir: Option<String>,
    #[arg(long = "max-concurrent", global = true)]
    max_concurrent: Option<usize>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run one pass over every configured assignment.
    Run {
        /// Print messages instead of sending them and leave snapshots untouched.
        #[arg(long)]
        dry_run: bool,
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
        output: OutputFormat,
    },
    /// Check the config file, and optionally the platform and channels it names.
    Validate {
        #[arg(long)]
        remote: bool,
    },
    /// Print the stored snapshot of one assignment.
    Show {
        #[arg(long)]
        course: String,
        #[arg(long)]
        period: String,
        #[arg(long)]
        assignment: String,
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
        output: OutputFormat,
    },
    /// Write a config template (`--init`) or print the resolved config as JSON (default).
    Config {
        #[arg(long)]
        init: bool,
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(Config::default_path);
    if let Commands::Config { init: true, show } = &cli.command {
        Config::write_template(&config_path)?;
        println!("Wrote config template to {}", config_path.display());
        if !*show {
            return Ok(());
        }
    }

    let mut config = Config::load(&config_path)
        .with_context(|| format!("invalid configuration {}", config_path.display()))?;
    config.apply_overrides(ConfigOverrides {
        data_dir: cli.data_dir.clone(),
        max_concurrent: cli.max_concurrent,
        notifier_kind: match &cli.command {
            Commands::Run { dry_run: true, .. } => Some(NotifierKind::Stdout),
            _ => None,
        },
    });

    let result = dispatch(&cli.command, &config).await;
    if let Err(err) = &result {
        record_fatal(&config, err);
    }
    result
}

async fn dispatch(command: &Commands, config: &Config) -> Result<()> {
    match command {
        Commands::Run { dry_run, output } => run_pass(config, *dry_run, *output).await,
        Commands::Validate { remote } => validate(config, *remote).await,
        Commands::Show {
            course,
            period,
            assignment,
            output,
        } => show_snapshot(config, &AssignmentKey::new(course, period, assignment), *output),
        Commands::Config { .. } => {
            println!("{}", render_json(config)?);
            Ok(())
        }
    }
}

async fn run_pass(config: &Config, dry_run: bool, output: OutputFormat) -> Result<()> {
    let store = SnapshotStore::open(&config.resolved_data_dir())?;
    let fetcher = Arc::new(build_fetcher(config)?);
    let notifier = build_notifier(config)?;
    let mut runner = Runner::new(config, store, fetcher, notifier)?;
    if dry_run {
        info!("dry run: messages go to stdout and snapshots are not saved");
        runner = runner.without_persistence();
    }

    let report = runner.run_pass(Utc::now()).await;
    if let Some(path) = config.resolved_error_log() {
        if let Err(err) = append_error_log(&path, report.started_at, &report.errors()) {
            warn!("failed writing error log {}: {err}", path.display());
        }
    }

    match output {
        OutputFormat::Table => {
            println!("{}", render_report_table(&report));
            println!("{}", report.summary());
        }
        OutputFormat::Json => println!("{}", render_json(&report)?),
    }
    Ok(())
}

async fn validate(config: &Config, remote: bool) -> Result<()> {
    let assignments: usize = config.sources.iter().map(|c| c.assignments.len()).sum();
    println!(
        "Config OK: {} courses, {assignments} assignments, {} channels",
        config.sources.len(),
        config.channels.len()
    );
    if !remote {
        return Ok(());
    }

    let fetcher = build_fetcher(config)?;
    let notifier = build_notifier(config)?;
    let problems = check_remote(config, &fetcher, notifier.as_ref()).await;
    if problems.is_empty() {
        println!("Remote check OK");
        return Ok(());
    }
    for problem in &problems {
        println!("- {problem}");
    }
    bail!("remote validation found {} problem(s)", problems.len())
}

fn show_snapshot(config: &Config, key: &AssignmentKey, output: OutputFormat) -> Result<()> {
    let store = SnapshotStore::open(&config.resolved_data_dir())?;
    let snapshot = store
        .try_load(key)?
        .ok_or_else(|| anyhow!("no snapshot stored for {key} under {}", store.root().display()))?;
    match output {
        OutputFormat::Table => println!("{}", render_snapshot_tables(&snapshot)),
        OutputFormat::Json => println!("{}", render_json(&snapshot)?),
    }
    Ok(())
}

fn build_fetcher(config: &Config) -> Result<CodePostFetcher> {
    let platform = &config.platform;
    let api_key = read_secret(&platform.api_key_env)
        .ok_or_else(|| anyhow!("environment variable {} is not set", platform.api_key_env))?;
    Ok(CodePostFetcher::new(
        platform.base_url.clone(),
        api_key,
        platform.timeout_secs,
    )?)
}

fn build_notifier(config: &Config) -> Result<Arc<dyn Notifier>> {
    let notifier = &config.notifier;
    Ok(match notifier.kind {
        NotifierKind::Stdout => Arc::new(StdoutSink),
        NotifierKind::Slack => {
            let token = read_secret(&notifier.token_env)
                .ok_or_else(|| anyhow!("environment variable {} is not set", notifier.token_env))?;
            Arc::new(SlackSink::new(
                notifier.base_url.clone(),
                token,
                notifier.timeout_secs,
            )?)
        }
        NotifierKind::Webhook => {
            if notifier.webhook_url.trim().is_empty() {
                bail!("notifier.webhook_url is required for the webhook notifier");
            }
            Arc::new(WebhookSink::new(
                notifier.webhook_url.clone(),
                notifier.timeout_secs,
            )?)
        }
    })
}

fn read_secret(var: &str) -> Option<String> {
    std::env::var(var).ok().filter(|v| !v.trim().is_empty())
}

fn record_fatal(config: &Config, err: &anyhow::Error) {
    let Some(path) = config.resolved_error_log() else {
        return;
    };
    if let Err(log_err) = write_fatal(&path, err) {
        warn!("failed writing error log {}: {log_err}", path.display());
    }
}

fn write_fatal(path: &Path, err: &anyhow::Error) -> std::io::Result<()> {
    append_error_log(path, Timestamp::from_utc(Utc::now()), &[format!("{err:#}")])
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn every_subcommand_has_help() {
        let cmd = Cli::command();
        cmd.clone().debug_assert();
        for name in ["run", "validate", "show", "config"] {
            let sub = cmd.find_subcommand(name).unwrap();
            assert!(sub.get_about().is_some(), "{name} has no help line");
        }
    }

    #[test]
    fn config_without_flags_parses() {
        let cli = Cli::try_parse_from(["grading-watch", "config"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Config {
                init: false,
                show: false
            }
        ));
    }
}
