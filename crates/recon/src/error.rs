use crate::collab::{CallError, FailureKind};

/// Fatal run-start failures. Per-record and per-group problems never
/// surface here; they land in the group's `MergeOutcome`.
#[derive(Debug, thiserror::Error)]
pub enum ReconError {
    /// TOML parse / deserialization error.
    #[error("config parse error: {0}")]
    ConfigParse(String),
    #[error("invalid options: {0}")]
    InvalidOptions(String),
    /// Credentials rejected while loading the PG's patients.
    #[error("registry rejected credentials for PG '{pg_company_id}': {source}")]
    Auth {
        pg_company_id: String,
        #[source]
        source: CallError,
    },
    /// Any other failure loading the PG's patients, after retries.
    #[error("cannot load patients for PG '{pg_company_id}': {source}")]
    FetchPatients {
        pg_company_id: String,
        #[source]
        source: CallError,
    },
    #[error("patient '{patient_id}' not found in PG '{pg_company_id}'")]
    TargetNotFound {
        pg_company_id: String,
        patient_id: String,
    },
}

impl ReconError {
    pub(crate) fn from_fetch_patients(pg_company_id: &str, source: CallError) -> Self {
        let pg_company_id = pg_company_id.to_string();
        match source.kind {
            FailureKind::Auth => Self::Auth { pg_company_id, source },
            _ => Self::FetchPatients { pg_company_id, source },
        }
    }
}
