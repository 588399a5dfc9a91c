//! `regmerge run` / `regmerge single`: wire the HTTP clients to the engine
//! and report the outcome.

use std::path::{Path, PathBuf};
use std::time::Duration;

use regmerge_config::Settings;
use regmerge_recon::{
    reconcile_single, reconcile_with_cancel, CancelFlag, Collaborators, MergeOutcome, RunSummary,
};
use regmerge_registry_client::{
    AzureOpenAiConfig, AzureOpenAiExtractor, DocumentApiClient, PdfTextExtractor, RegistryClient,
};

use crate::exit_codes::EXIT_GROUP_ERRORS;
use crate::CliError;

/// Command-line overrides applied on top of the loaded settings.
#[derive(Debug, Default, Clone)]
pub struct RunOverrides {
    pub threshold: Option<u8>,
    pub no_notify: bool,
    pub parallel: Option<usize>,
    pub dry_run: bool,
}

pub struct OutputMode {
    pub json: bool,
    pub output: Option<PathBuf>,
}

/// Concrete collaborators built from settings.
struct Clients {
    registry: RegistryClient,
    documents: DocumentApiClient,
    text: PdfTextExtractor,
    identity: AzureOpenAiExtractor,
}

impl Clients {
    fn from_settings(settings: &Settings) -> Self {
        let timeout = Duration::from_secs(settings.recon.request_timeout_seconds);
        Self {
            registry: RegistryClient::new(
                &settings.registry.base_url,
                &settings.registry.token,
                timeout,
            ),
            documents: DocumentApiClient::new(
                &settings.documents.api_url,
                &settings.documents.token,
                timeout,
            ),
            text: PdfTextExtractor::new(settings.extract.ocr),
            identity: AzureOpenAiExtractor::new(
                AzureOpenAiConfig {
                    endpoint: settings.openai.endpoint.clone(),
                    api_key: settings.openai.key.clone(),
                    deployment: settings.openai.deployment.clone(),
                    api_version: settings.openai.api_version.clone(),
                },
                timeout,
            ),
        }
    }

    fn collaborators(&self) -> Collaborators<'_> {
        Collaborators {
            registry: &self.registry,
            documents: &self.documents,
            text: &self.text,
            identity: &self.identity,
            notifier: &self.registry,
        }
    }
}

fn prepare(config: Option<&Path>, overrides: &RunOverrides) -> Result<Settings, CliError> {
    let mut settings = Settings::load(config).map_err(CliError::config)?;

    if let Some(threshold) = overrides.threshold {
        settings.recon.similarity_threshold = threshold;
    }
    if overrides.no_notify {
        settings.recon.enable_notifications = false;
    }
    if let Some(parallel) = overrides.parallel {
        settings.recon.max_parallel_groups = parallel;
    }
    if overrides.dry_run {
        settings.recon.dry_run = true;
    }

    settings.validate().map_err(CliError::config)?;
    Ok(settings)
}

pub fn cmd_run(
    config: Option<&Path>,
    pg_company_id: &str,
    overrides: RunOverrides,
    mode: &OutputMode,
) -> Result<(), CliError> {
    let settings = prepare(config, &overrides)?;
    let clients = Clients::from_settings(&settings);

    let cancel = cancel_on_interrupt();

    let summary =
        reconcile_with_cancel(&clients.collaborators(), pg_company_id, &settings.recon, &cancel)
            .map_err(CliError::recon)?;

    let json = serde_json::to_string_pretty(&summary)
        .map_err(|e| CliError::output(format!("JSON serialization error: {e}")))?;
    emit(&json, mode)?;
    print_summary(&summary);

    if summary.has_errors() {
        return Err(CliError {
            code: EXIT_GROUP_ERRORS,
            message: format!(
                "{} error(s) across {} group(s); affected records were retained",
                summary.error_count,
                summary.outcomes.iter().filter(|o| o.has_errors()).count()
            ),
            hint: None,
        });
    }
    Ok(())
}

pub fn cmd_single(
    config: Option<&Path>,
    pg_company_id: &str,
    patient_id: &str,
    overrides: RunOverrides,
    mode: &OutputMode,
) -> Result<(), CliError> {
    let settings = prepare(config, &overrides)?;
    let clients = Clients::from_settings(&settings);

    let outcome = reconcile_single(
        &clients.collaborators(),
        pg_company_id,
        patient_id,
        &settings.recon,
    )
    .map_err(CliError::recon)?;

    let report = serde_json::json!({
        "pg_company_id": pg_company_id,
        "patient_id": patient_id,
        "dry_run": settings.recon.dry_run,
        "outcome": outcome,
    });
    let json = serde_json::to_string_pretty(&report)
        .map_err(|e| CliError::output(format!("JSON serialization error: {e}")))?;
    emit(&json, mode)?;

    match &outcome {
        Some(outcome) => {
            print_outcome(outcome);
            if outcome.has_errors() {
                return Err(CliError {
                    code: EXIT_GROUP_ERRORS,
                    message: format!("{} error(s) in the group", outcome.errors.len()),
                    hint: None,
                });
            }
        }
        None => eprintln!("patient {patient_id}: no duplicates found"),
    }
    Ok(())
}

/// Ctrl-C stops scheduling further groups; the group in flight finishes
/// and the partial report is still written.
fn cancel_on_interrupt() -> CancelFlag {
    let cancel = CancelFlag::new();
    let handler_flag = cancel.clone();
    let installed = ctrlc::set_handler(move || {
        eprintln!("interrupt: finishing the current group, then stopping");
        handler_flag.cancel();
    });
    if let Err(e) = installed {
        log::warn!("Ctrl-C handler not installed: {e}");
    }
    cancel
}

fn emit(json: &str, mode: &OutputMode) -> Result<(), CliError> {
    if let Some(ref path) = mode.output {
        std::fs::write(path, json).map_err(|e| {
            CliError::output(format!("cannot write {}: {e}", path.display()))
                .with_hint("the run itself completed; check the directory exists and is writable")
        })?;
        eprintln!("wrote {}", path.display());
    }
    if mode.json {
        println!("{json}");
    }
    Ok(())
}

// Human summary goes to stderr so stdout stays a single JSON value.
fn print_summary(summary: &RunSummary) {
    let verb = if summary.dry_run { "would delete" } else { "deleted" };
    eprintln!(
        "PG {}: {} records ({} excluded), {} duplicate groups, {} processed",
        summary.pg_company_id,
        summary.total_records,
        summary.excluded.len(),
        summary.groups_found,
        summary.groups_processed,
    );
    for outcome in &summary.outcomes {
        print_outcome(outcome);
    }
    eprintln!(
        "{} {} records, moved {} orders and {} notes; {} errors, {} warnings",
        verb,
        summary.records_deleted,
        summary.orders_moved,
        summary.notes_moved,
        summary.error_count,
        summary.warning_count,
    );
    if summary.cancelled {
        eprintln!("run cancelled before all groups were processed");
    }
}

fn print_outcome(outcome: &MergeOutcome) {
    eprintln!(
        "  group {}: keep {} ({}), merge [{}]{}",
        outcome.group_index,
        outcome.decision.primary_id,
        outcome.decision.method,
        outcome.decision.non_primary_ids.join(", "),
        if outcome.dry_run { " [dry run]" } else { "" },
    );
    if !outcome.retained_ids.is_empty() {
        eprintln!("    retained: {}", outcome.retained_ids.join(", "));
    }
    for issue in &outcome.errors {
        eprintln!("    error: {}: {}", issue.patient_id, issue.message);
    }
}
