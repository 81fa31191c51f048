use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use gitfolder::config::LoggingConfig;
use gitfolder::health::CheckResult;
use gitfolder::{
    resolve_credential, BatchReport, CancelFlag, CommandResult, Config, GitClient, GitProcess,
    HealthCheck, RepoScanner, RepoState, RepoSynchronizer, SyncEngine,
};

#[derive(Parser)]
#[command(name = "gitfolder")]
#[command(about = "Commit, push and sync every git repository in a project tree")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (defaults to XDG config location)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Show changes and ahead/behind state of a repository
    Status {
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Print the state as JSON
        #[arg(long)]
        json: bool,
    },

    /// Stage all changes and commit
    Commit {
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Commit message (a blank placeholder is used when omitted)
        #[arg(short, long, default_value = "")]
        message: String,
    },

    /// Push HEAD to origin
    Push {
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// Fetch from origin
    Fetch {
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// Fetch, then pull if behind upstream
    Pull {
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// Commit, push and fetch one repository
    Sync {
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Commit message (a blank placeholder is used when omitted)
        #[arg(short, long, default_value = "")]
        message: String,
    },

    /// List repositories under a directory
    Scan {
        /// Directory to scan (defaults to scan.root)
        dir: Option<PathBuf>,

        /// Leave out the repository enclosing the directory
        #[arg(long)]
        no_enclosing: bool,
    },

    /// Commit and push every repository under a directory
    SyncAll {
        /// Directory to scan (defaults to scan.root)
        dir: Option<PathBuf>,

        /// Show what would be synchronized without changing anything
        #[arg(long)]
        dry_run: bool,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,

        /// Leave out the repository enclosing the directory
        #[arg(long)]
        no_enclosing: bool,
    },

    /// Write the commit log to the changelog file
    Changelog {
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// System health check and diagnostics
    Doctor,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = load_config(cli.config)?;
    init_logging(cli.verbose, &config.logging)?;
    info!("Starting gitfolder v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Status { path, json } => cmd_status(&path, json, &config).await,
        Commands::Commit { path, message } => cmd_commit(&path, &message, &config).await,
        Commands::Push { path } => cmd_push(&path, &config).await,
        Commands::Fetch { path } => cmd_fetch(&path, &config).await,
        Commands::Pull { path } => cmd_pull(&path, &config).await,
        Commands::Sync { path, message } => cmd_sync(&path, &message, &config).await,
        Commands::Scan { dir, no_enclosing } => cmd_scan(dir, !no_enclosing, &config),
        Commands::SyncAll {
            dir,
            dry_run,
            json,
            no_enclosing,
        } => cmd_sync_all(dir, dry_run, json, !no_enclosing, &config).await,
        Commands::Changelog { path } => cmd_changelog(&path, &config).await,
        Commands::Doctor => cmd_doctor(&config).await,
    }
}

/// Initialize logging from verbosity and the logging config; logs go to stderr
fn init_logging(verbose: bool, logging: &LoggingConfig) -> Result<()> {
    let level = if verbose { "debug" } else { logging.level.as_str() };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let layer = if logging.format == "full" {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(logging.color)
            .boxed()
    } else {
        fmt::layer()
            .compact()
            .with_writer(std::io::stderr)
            .with_ansi(logging.color)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .try_init()
        .context("Failed to initialize logging")?;

    Ok(())
}

/// Load configuration from specified path or default location
fn load_config(config_path: Option<PathBuf>) -> Result<Config> {
    match config_path {
        Some(path) => Config::load(&path),
        None => Config::load_or_default(),
    }
}

fn synchronizer(config: &Config) -> RepoSynchronizer {
    RepoSynchronizer::new(GitClient::new(GitProcess::from_config(&config.git)))
        .with_ssh_fallback(config.push.ssh_fallback)
}

/// Print a command's output; a failure becomes an error carrying git's diagnostic
fn finish(action: &str, path: &Path, result: &CommandResult) -> Result<()> {
    for line in result.stdout.lines().filter(|l| !l.trim().is_empty()) {
        println!("   {}", line);
    }

    if result.success() {
        println!("✅ {} succeeded: {}", action, path.display());
        Ok(())
    } else {
        println!("❌ {} failed: {}", action, path.display());
        bail!(
            "{} failed (exit {}): {}",
            action,
            result.exit_code,
            result.first_line()
        )
    }
}

async fn cmd_status(path: &Path, json: bool, config: &Config) -> Result<()> {
    let state = synchronizer(config).git().inspect(path).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&state)?);
        return Ok(());
    }
    if !state.is_root {
        bail!("Not a git repository: {}", path.display());
    }

    print_state(&state);
    for entry in &state.changed_files {
        println!("      {}", entry);
    }
    Ok(())
}

async fn cmd_commit(path: &Path, message: &str, config: &Config) -> Result<()> {
    let result = synchronizer(config).commit(path, message).await;
    finish("Commit", path, &result)
}

async fn cmd_push(path: &Path, config: &Config) -> Result<()> {
    let credential = resolve_credential(&config.credential)?;
    let result = synchronizer(config)
        .push(path, credential.as_ref().map(|c| c.expose()))
        .await;
    finish("Push", path, &result)
}

async fn cmd_fetch(path: &Path, config: &Config) -> Result<()> {
    let result = synchronizer(config).fetch(path).await;
    finish("Fetch", path, &result)
}

async fn cmd_pull(path: &Path, config: &Config) -> Result<()> {
    let result = synchronizer(config).fetch_pull(path).await;
    finish("Pull", path, &result)
}

async fn cmd_sync(path: &Path, message: &str, config: &Config) -> Result<()> {
    let credential = resolve_credential(&config.credential)?;
    let outcome = synchronizer(config)
        .commit_push_fetch(path, message, credential.as_ref().map(|c| c.expose()))
        .await;

    for (stage, result) in [
        ("Commit", &outcome.commit),
        ("Push", &outcome.push),
        ("Fetch", &outcome.fetch),
    ] {
        let icon = if result.success() { "✅" } else { "❌" };
        println!("{} {}: {}", icon, stage, result.first_line());
    }

    if !outcome.succeeded() {
        bail!("Sync failed at {:?}", outcome.failed_stage);
    }
    Ok(())
}

fn cmd_scan(dir: Option<PathBuf>, include_enclosing: bool, config: &Config) -> Result<()> {
    let dir = dir.unwrap_or_else(|| config.scan_root());
    let roots = RepoScanner::from_config(&config.scan).sync_roots(&dir, include_enclosing)?;

    println!("Repositories ({}):", roots.len());
    for root in &roots {
        println!("  📁 {}", root.display());
    }
    Ok(())
}

async fn cmd_sync_all(
    dir: Option<PathBuf>,
    dry_run: bool,
    json: bool,
    include_enclosing: bool,
    config: &Config,
) -> Result<()> {
    let dir = dir.unwrap_or_else(|| config.scan_root());
    let engine = SyncEngine::new(synchronizer(config), RepoScanner::from_config(&config.scan));
    let roots = engine.scanner().sync_roots(&dir, include_enclosing)?;

    if roots.is_empty() {
        println!("No git repositories found under {}", dir.display());
        return Ok(());
    }

    if dry_run {
        let states = engine.preview(&roots).await;
        if json {
            println!("{}", serde_json::to_string_pretty(&states)?);
        } else {
            print_preview(&states);
        }
        return Ok(());
    }

    let credential = resolve_credential(&config.credential)?;
    if credential.is_none() {
        println!(
            "⚠️  No push credential found (set {}); HTTPS pushes will fail",
            config.credential.env_var
        );
    }

    let cancel = CancelFlag::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            // the running git process is left to finish
            eprintln!("Stopping after the current repository...");
            ctrl_c.cancel();
        }
    });

    if !json {
        println!("🔄 Synchronizing {} repositories", roots.len());
    }
    let handle = engine.spawn_sync_all(
        roots,
        credential.map(|c| c.expose().to_string()),
        cancel,
    );
    let report = handle
        .wait(|update| {
            if !json {
                println!("   [{:>3.0}%] {}", update.fraction * 100.0, update.label);
            }
        })
        .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    if report.failed() > 0 {
        bail!("{} of {} repositories failed", report.failed(), report.processed);
    }
    Ok(())
}

async fn cmd_changelog(path: &Path, config: &Config) -> Result<()> {
    let written = synchronizer(config)
        .git()
        .generate_changelog(path, &config.changelog.file_name)
        .await?;
    println!("✅ Changelog written to {}", written.display());
    Ok(())
}

async fn cmd_doctor(config: &Config) -> Result<()> {
    let health = HealthCheck::run(config).await;
    print_health_report(&health);
    Ok(())
}

fn print_state(state: &RepoState) {
    println!("📁 {}", state.path.display());
    println!(
        "   Branch: {} -> {}",
        state.current_branch.as_deref().unwrap_or("(detached)"),
        state.upstream_ref.as_deref().unwrap_or("(no upstream)")
    );
    println!(
        "   📝 Changed files: {}   ⬆️  Ahead: {}   ⬇️  Behind: {}",
        state.changed_files.len(),
        state.ahead,
        state.behind
    );
}

fn print_preview(states: &[RepoState]) {
    println!("🔍 Dry run - nothing will be changed");
    println!();

    let mut to_commit = 0;
    let mut to_push = 0;
    for state in states {
        print_state(state);
        if state.has_uncommitted_changes {
            to_commit += 1;
        } else if state.is_ahead_of_upstream() {
            to_push += 1;
        }
    }

    println!("\n📈 Summary:");
    println!("   📝 Repositories to commit and push: {}", to_commit);
    println!("   ⬆️  Repositories to push: {}", to_push);
    println!(
        "   ✅ Up-to-date repositories: {}",
        states.len() - to_commit - to_push
    );
}

fn print_report(report: &BatchReport) {
    println!("\n🎉 Synchronization Complete!");
    println!("   ⏱️  Duration: {:.2}s", report.duration.as_secs_f64());
    print!("{}", report.render());
}

fn print_health_report(health: &HealthCheck) {
    fn print_check(name: &str, result: &CheckResult) {
        println!("{}:", name);
        let icon = if result.passed {
            if result.is_warning { "⚠️ " } else { "✅" }
        } else {
            "❌"
        };
        println!("  {} {}", icon, result.message);
        if let Some(details) = &result.details {
            for line in details.lines() {
                println!("     {}", line);
            }
        }
    }

    println!("🔍 gitfolder System Diagnostics");
    println!();

    for (name, result) in health.all_checks() {
        print_check(name, result);
        println!();
    }

    if health.all_passed() {
        println!("✅ All checks passed");
    } else {
        println!("❌ Some checks failed");
    }
}
