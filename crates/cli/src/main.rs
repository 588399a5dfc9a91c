// regmerge - duplicate patient reconciliation for a registry PG company

mod exit_codes;
mod reconcile;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use regmerge_config::{ConfigError, SecretSource, Settings};
use regmerge_recon::similarity::{match_score, name_matches};
use regmerge_recon::ReconError;

use exit_codes::{recon_exit_code, EXIT_CONFIG, EXIT_OUTPUT_WRITE, EXIT_SUCCESS, EXIT_USAGE};

#[derive(Parser)]
#[command(name = "regmerge")]
#[command(about = "Find and merge duplicate patient records in a registry")]
#[command(long_version = long_version())]
#[command(version)]
struct Cli {
    /// Settings file (default: <config dir>/regmerge/settings.toml)
    #[arg(long, global = true, env = "REGMERGE_CONFIG")]
    config: Option<PathBuf>,

    /// Debug logging
    #[arg(long, short = 'v', global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Warnings and errors only
    #[arg(long, short = 'q', global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile every duplicate group in a PG company
    #[command(after_help = "\
Examples:
  regmerge run --pg-company-id 4f1c --dry-run
  regmerge run --pg-company-id 4f1c --json --output merge-report.json
  regmerge run --pg-company-id 4f1c --threshold 90 --no-notify --parallel 4")]
    Run {
        /// PG company whose patients are compared
        #[arg(long)]
        pg_company_id: String,

        /// Override the name similarity threshold (0-100)
        #[arg(long, value_parser = clap::value_parser!(u8).range(0..=100))]
        threshold: Option<u8>,

        /// Skip RCM notifications after merging
        #[arg(long)]
        no_notify: bool,

        /// Process up to N groups concurrently
        #[arg(long, value_parser = clap::value_parser!(u64).range(1..=64))]
        parallel: Option<u64>,

        #[command(flatten)]
        report: ReportArgs,
    },

    /// Reconcile only the duplicate group containing one patient
    #[command(after_help = "\
Examples:
  regmerge single --pg-company-id 4f1c --patient-id 10233
  regmerge single --pg-company-id 4f1c --patient-id 10233 --dry-run --json")]
    Single {
        #[arg(long)]
        pg_company_id: String,

        #[arg(long)]
        patient_id: String,

        #[command(flatten)]
        report: ReportArgs,
    },

    /// Score two names the way duplicate detection does
    #[command(after_help = "\
Examples:
  regmerge score 'John Smith' 'Jonathan Smith'
  regmerge score 'Mary Jones' 'Mary Jonas' --threshold 90 --json")]
    Score {
        name_a: String,
        name_b: String,

        /// Threshold to compare against (default: settings, else 85)
        #[arg(long, value_parser = clap::value_parser!(u8).range(0..=100))]
        threshold: Option<u8>,

        #[arg(long)]
        json: bool,
    },

    /// Inspect settings
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Load and validate settings; report where each credential comes from
    Check {
        #[arg(long)]
        json: bool,
    },
}

/// Shared by `run` and `single`.
#[derive(Args, Clone)]
struct ReportArgs {
    /// Plan only: read everything, change nothing
    #[arg(long)]
    dry_run: bool,

    /// Print the JSON report to stdout
    #[arg(long)]
    json: bool,

    /// Write the JSON report to a file
    #[arg(long)]
    output: Option<PathBuf>,
}

fn long_version() -> &'static str {
    concat!(
        env!("CARGO_PKG_VERSION"),
        " (",
        env!("GIT_COMMIT_HASH"),
        ")"
    )
}

fn init_logging(verbose: bool, quiet: bool) {
    let mut builder = if verbose || quiet {
        let mut b = env_logger::Builder::new();
        b.filter_level(if verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Warn
        });
        b
    } else {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
    };
    builder.format_timestamp_secs().init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    let config = cli.config.as_deref();
    let result = match cli.command {
        Commands::Run {
            pg_company_id,
            threshold,
            no_notify,
            parallel,
            report,
        } => reconcile::cmd_run(
            config,
            &pg_company_id,
            reconcile::RunOverrides {
                threshold,
                no_notify,
                parallel: parallel.map(|p| p as usize),
                dry_run: report.dry_run,
            },
            &report.output_mode(),
        ),
        Commands::Single {
            pg_company_id,
            patient_id,
            report,
        } => reconcile::cmd_single(
            config,
            &pg_company_id,
            &patient_id,
            reconcile::RunOverrides {
                dry_run: report.dry_run,
                ..Default::default()
            },
            &report.output_mode(),
        ),
        Commands::Score {
            name_a,
            name_b,
            threshold,
            json,
        } => cmd_score(config, &name_a, &name_b, threshold, json),
        Commands::Config(ConfigCommands::Check { json }) => cmd_config_check(config, json),
    };

    match result {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError { code, message, hint }) => {
            if !message.is_empty() {
                eprintln!("error: {}", message);
            }
            if let Some(hint) = hint {
                eprintln!("hint:  {}", hint);
            }
            ExitCode::from(code)
        }
    }
}

impl ReportArgs {
    fn output_mode(&self) -> reconcile::OutputMode {
        reconcile::OutputMode {
            json: self.json,
            output: self.output.clone(),
        }
    }
}

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    pub fn args(msg: impl Into<String>) -> Self {
        Self { code: EXIT_USAGE, message: msg.into(), hint: None }
    }

    pub fn output(msg: impl Into<String>) -> Self {
        Self { code: EXIT_OUTPUT_WRITE, message: msg.into(), hint: None }
    }

    pub fn config(err: ConfigError) -> Self {
        let hint = match &err {
            ConfigError::NotFound(_) => Some("pass --config or create the settings file".to_string()),
            ConfigError::Missing(field) | ConfigError::Placeholder(field) => {
                Some(format!("set {field} in settings.toml or its REGMERGE_* environment variable"))
            }
            _ => None,
        };
        Self { code: EXIT_CONFIG, message: err.to_string(), hint }
    }

    /// Create error from a fatal engine error with the matching exit code.
    pub fn recon(err: ReconError) -> Self {
        let code = recon_exit_code(&err);
        let hint = match &err {
            ReconError::Auth { .. } => {
                Some("check registry.token or REGMERGE_API_TOKEN".to_string())
            }
            ReconError::FetchPatients { .. } => {
                Some("check registry.base_url and that the registry is reachable".to_string())
            }
            _ => None,
        };
        Self { code, message: err.to_string(), hint }
    }

    /// Add a hint to an existing error.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

// ============================================================================
// score
// ============================================================================

fn cmd_score(
    config: Option<&Path>,
    name_a: &str,
    name_b: &str,
    threshold: Option<u8>,
    json: bool,
) -> Result<(), CliError> {
    if name_a.trim().is_empty() || name_b.trim().is_empty() {
        return Err(CliError::args("both names must be non-empty"));
    }

    // Settings are optional here; an explicit --config must still load.
    let threshold = match threshold {
        Some(t) => t,
        None if config.is_some() => {
            Settings::load(config).map_err(CliError::config)?.recon.similarity_threshold
        }
        None => Settings::load(None)
            .map(|s| s.recon.similarity_threshold)
            .unwrap_or(regmerge_recon::ReconOptions::default().similarity_threshold),
    };

    let score = match_score(name_a, name_b);
    let matches = name_matches(score, threshold);

    if json {
        let out = serde_json::json!({
            "name_a": name_a,
            "name_b": name_b,
            "score": score,
            "threshold": threshold,
            "match": matches,
        });
        println!("{}", out);
    } else {
        println!(
            "{score} ({} at threshold {threshold})",
            if matches { "match" } else { "no match" }
        );
    }
    Ok(())
}

// ============================================================================
// config check
// ============================================================================

fn cmd_config_check(config: Option<&Path>, json: bool) -> Result<(), CliError> {
    let path = config
        .map(Path::to_path_buf)
        .unwrap_or_else(Settings::config_path);
    let settings = Settings::load(config).map_err(CliError::config)?;
    let validation = settings.validate();

    let secrets = [
        ("registry.token", settings.secret_source("registry.token")),
        ("documents.token", settings.secret_source("documents.token")),
        ("openai.key", settings.secret_source("openai.key")),
    ];

    if json {
        let sources: serde_json::Map<String, serde_json::Value> = secrets
            .iter()
            .map(|(field, source)| (field.to_string(), source.as_str().into()))
            .collect();
        let out = serde_json::json!({
            "path": path.display().to_string(),
            "exists": path.exists(),
            "secrets": sources,
            "valid": validation.is_ok(),
            "error": validation.as_ref().err().map(|e| e.to_string()),
        });
        println!("{}", out);
    } else {
        let state = if path.exists() { "" } else { " (not found, defaults)" };
        println!("settings: {}{}", path.display(), state);
        for (field, source) in &secrets {
            let marker = if *source == SecretSource::None { "missing" } else { "set" };
            println!("  {:<16} {:<8} {}", field, marker, source.as_str());
        }
        println!("  threshold        {}", settings.recon.similarity_threshold);
        println!("  notifications    {}", settings.recon.enable_notifications);
        if validation.is_ok() {
            println!("ok");
        }
    }

    validation.map_err(CliError::config)
}
