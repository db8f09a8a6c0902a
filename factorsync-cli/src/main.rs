//! factorsync CLI: fetch, status, and config commands.
//!
//! Commands:
//! - `fetch`: bring each code's factor file up to date through the terminal gateway
//! - `status`: report cached rows, date range and missing fields per code
//! - `init-config`: write the default TOML configuration

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use factorsync_core::{
    EscalationPolicy, FactorFetcher, FactorProvider, FactorStore, FetchConfig, GatewayProvider,
    LogProgress, Outcome, Roster, RunSummary,
};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Parser)]
#[command(
    name = "factorsync",
    about = "Incrementally fetch financial factor series into per-code CSV files"
)]
struct Cli {
    /// Log at debug level (overridden by RUST_LOG).
    #[arg(short, long, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch missing factors for every code and merge them into the cache files.
    Fetch {
        #[command(flatten)]
        target: TargetArgs,

        /// Terminal gateway base URL.
        #[arg(long)]
        gateway: Option<String>,

        /// Log and move on to the next code when a provider call still fails after retries.
        #[arg(long, default_value_t = false)]
        skip_on_exhausted: bool,
    },
    /// Report what is cached for each code. Makes no provider calls.
    Status {
        #[command(flatten)]
        target: TargetArgs,
    },
    /// Write the default configuration as TOML.
    InitConfig {
        /// Destination file. Prints to stdout when omitted.
        #[arg(long)]
        output: Option<PathBuf>,

        /// Overwrite an existing file.
        #[arg(long, default_value_t = false)]
        force: bool,
    },
}

#[derive(Args)]
struct TargetArgs {
    /// Codes to process (e.g., 600000.SH 000001.SZ). Defaults to the roster.
    codes: Vec<String>,

    /// Path to a TOML config file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Roster spreadsheet (.xlsx/.xls) or CSV to read codes from.
    #[arg(long)]
    roster: Option<PathBuf>,

    /// Roster column holding the codes.
    #[arg(long)]
    column: Option<String>,

    /// Directory holding one CSV per code.
    #[arg(long)]
    out_dir: Option<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Fetch {
            target,
            gateway,
            skip_on_exhausted,
        } => run_fetch(target, gateway, skip_on_exhausted),
        Commands::Status { target } => run_status(target),
        Commands::InitConfig { output, force } => run_init_config(output.as_deref(), force),
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default)),
        )
        .init();
}

fn load_config(target: &TargetArgs) -> Result<FetchConfig> {
    let mut config = match &target.config {
        Some(path) => FetchConfig::from_file(path)?,
        None => FetchConfig::default(),
    };
    if let Some(roster) = &target.roster {
        config.roster.path = roster.clone();
    }
    if let Some(column) = &target.column {
        config.roster.column = column.clone();
    }
    if let Some(dir) = &target.out_dir {
        config.output.dir = dir.clone();
    }
    Ok(config)
}

fn resolve_codes(target: &TargetArgs, config: &FetchConfig) -> Result<Vec<String>> {
    let roster = if target.codes.is_empty() {
        Roster::from_file(&config.roster.path, &config.roster.column)
            .with_context(|| "no codes given and the roster could not be read")?
    } else {
        Roster::from_codes(target.codes.iter().cloned())
    };

    if roster.is_empty() {
        bail!("no codes to process");
    }
    Ok(roster.codes().to_vec())
}

fn run_fetch(target: TargetArgs, gateway: Option<String>, skip_on_exhausted: bool) -> Result<()> {
    let mut config = load_config(&target)?;
    if let Some(url) = gateway {
        config.provider.base_url = url;
    }
    if skip_on_exhausted {
        config.retry.on_exhausted = EscalationPolicy::Skip;
    }
    config.validate()?;

    let codes = resolve_codes(&target, &config)?;
    std::fs::create_dir_all(&config.output.dir)
        .with_context(|| format!("failed to create {}", config.output.dir.display()))?;
    let store = FactorStore::new(&config.output.dir);

    let mut provider = GatewayProvider::new(&config.provider.base_url, config.provider.timeout())?;
    let summary = fetch_in_session(&mut provider, &store, &config, &codes)?;

    for (code, outcome) in &summary.failures {
        match outcome {
            Outcome::Rejected { group, status } => {
                warn!("{code}: group '{group}' returned {status}, will retry next run")
            }
            Outcome::Abandoned { group, reason } => {
                warn!("{code}: group '{group}' abandoned: {reason}")
            }
            Outcome::UpToDate | Outcome::Saved { .. } => {}
        }
    }

    Ok(())
}

/// Start the session, run the batch and stop the session, even when the batch halts.
fn fetch_in_session(
    provider: &mut dyn FactorProvider,
    store: &FactorStore,
    config: &FetchConfig,
    codes: &[String],
) -> Result<RunSummary> {
    provider
        .start()
        .with_context(|| format!("failed to start {} session", provider.name()))?;
    info!(
        "fetching {} field(s) in {} group(s) for {} code(s) via {}",
        config.all_fields().count(),
        config.groups.len(),
        codes.len(),
        provider.name()
    );

    let result = FactorFetcher::new(&*provider, store, config).run(codes, &LogProgress);
    provider.stop();
    Ok(result?)
}

fn run_status(target: TargetArgs) -> Result<()> {
    let config = load_config(&target)?;
    config.validate()?;
    let codes = resolve_codes(&target, &config)?;
    let store = FactorStore::new(&config.output.dir);

    println!("Cache: {}", store.dir().display());
    println!();

    let group_names: Vec<&str> = config.groups.iter().map(|g| g.name.as_str()).collect();
    println!(
        "{:<12} {:>6} {:<25} {}",
        "Code",
        "Rows",
        "Date Range",
        group_names.join(" / ")
    );
    println!("{}", "-".repeat(60));

    let mut complete = 0;
    for code in &codes {
        let status = store.status(code, &config.groups)?;
        if status.is_complete() {
            complete += 1;
        }
        let range = match (status.start_date, status.end_date) {
            (Some(s), Some(e)) => format!("{s} to {e}"),
            _ if status.cached => "(empty)".to_string(),
            _ => "(not cached)".to_string(),
        };
        let missing: Vec<String> = status
            .missing
            .iter()
            .map(|(_, n)| format!("{n} missing"))
            .collect();
        println!(
            "{:<12} {:>6} {:<25} {}",
            status.code,
            status.rows,
            range,
            missing.join(" / ")
        );
    }

    println!();
    println!("{complete}/{} code(s) complete", codes.len());
    Ok(())
}

fn run_init_config(output: Option<&Path>, force: bool) -> Result<()> {
    let text = FetchConfig::default().to_toml()?;
    match output {
        None => print!("{text}"),
        Some(path) => {
            if path.exists() && !force {
                bail!("{} already exists (pass --force to overwrite)", path.display());
            }
            std::fs::write(path, text)
                .with_context(|| format!("failed to write {}", path.display()))?;
            println!("Wrote {}", path.display());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use factorsync_core::{FetchRequest, ProviderError, ProviderReply};

    /// Records the session lifecycle; every fetch fails without a timeout.
    #[derive(Default)]
    struct FailingProvider {
        started: bool,
        stopped: bool,
    }

    impl FactorProvider for FailingProvider {
        fn name(&self) -> &str {
            "failing"
        }

        fn start(&mut self) -> Result<(), ProviderError> {
            self.started = true;
            Ok(())
        }

        fn stop(&mut self) {
            self.stopped = true;
        }

        fn fetch(&self, _request: &FetchRequest) -> Result<ProviderReply, ProviderError> {
            Err(ProviderError::Network("connection refused".into()))
        }
    }

    fn quiet_config(dir: &Path) -> FetchConfig {
        let mut config = FetchConfig::default();
        config.output.dir = dir.to_path_buf();
        config.retry.delay_secs = 0;
        config.retry.pace_secs = 0;
        config
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn fetch_accepts_codes_and_overrides() {
        let cli = Cli::parse_from([
            "factorsync",
            "fetch",
            "600000.SH",
            "000001.SZ",
            "--out-dir",
            "/tmp/factor",
            "--skip-on-exhausted",
        ]);
        match cli.command {
            Commands::Fetch {
                target,
                skip_on_exhausted,
                ..
            } => {
                assert_eq!(target.codes, vec!["600000.SH", "000001.SZ"]);
                assert!(skip_on_exhausted);
                let config = load_config(&target).unwrap();
                assert_eq!(config.output.dir, PathBuf::from("/tmp/factor"));
                assert_eq!(resolve_codes(&target, &config).unwrap().len(), 2);
            }
            _ => panic!("expected fetch"),
        }
    }

    #[test]
    fn roster_column_override_applies() {
        let cli = Cli::parse_from(["factorsync", "status", "--roster", "r.csv", "--column", "code"]);
        match cli.command {
            Commands::Status { target } => {
                let config = load_config(&target).unwrap();
                assert_eq!(config.roster.path, PathBuf::from("r.csv"));
                assert_eq!(config.roster.column, "code");
            }
            _ => panic!("expected status"),
        }
    }

    #[test]
    fn session_is_stopped_when_batch_halts() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = quiet_config(dir.path());
        let store = FactorStore::new(dir.path());
        let mut provider = FailingProvider::default();

        let codes = vec!["600000.SH".to_string()];
        let err = fetch_in_session(&mut provider, &store, &config, &codes).unwrap_err();

        assert!(err.to_string().contains("600000.SH"));
        assert!(provider.started);
        assert!(provider.stopped);
        assert!(!store.exists("600000.SH"));
    }

    #[test]
    fn session_is_stopped_after_skipped_failures() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut config = quiet_config(dir.path());
        config.retry.on_exhausted = EscalationPolicy::Skip;
        let store = FactorStore::new(dir.path());
        let mut provider = FailingProvider::default();

        let codes = vec!["600000.SH".to_string(), "000001.SZ".to_string()];
        let summary = fetch_in_session(&mut provider, &store, &config, &codes).unwrap();

        assert_eq!(summary.abandoned, 2);
        assert!(provider.stopped);
    }
}
