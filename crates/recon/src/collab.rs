//! Collaborator contracts consumed by the engine.
//!
//! Implementations make exactly one attempt per call and classify their
//! failures; retries are applied by the engine through [`crate::retry`].

use crate::model::{ChildRecord, DocumentRef, IdentityCandidates, NotifyKind, PatientRecord};

/// How a collaborator call failed. Drives the retry decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Timeout, connection failure, 408/429/5xx. Retried.
    Transient,
    /// Credentials rejected. Never retried.
    Auth,
    /// Request rejected as malformed. Never retried.
    Validation,
    NotFound,
    /// Anything else that retrying will not fix.
    Permanent,
}

impl FailureKind {
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::Transient)
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transient => write!(f, "transient"),
            Self::Auth => write!(f, "auth"),
            Self::Validation => write!(f, "validation"),
            Self::NotFound => write!(f, "not found"),
            Self::Permanent => write!(f, "permanent"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind} failure: {message}")]
pub struct CallError {
    pub kind: FailureKind,
    pub message: String,
}

impl CallError {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Transient, message)
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Auth, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Validation, message)
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Permanent, message)
    }
}

/// Patient registry: reads and mutations.
pub trait Registry: Send + Sync {
    fn fetch_patients(&self, pg_company_id: &str) -> Result<Vec<PatientRecord>, CallError>;
    fn fetch_orders(&self, patient_id: &str) -> Result<Vec<ChildRecord>, CallError>;
    fn fetch_notes(&self, patient_id: &str) -> Result<Vec<ChildRecord>, CallError>;
    /// Persist `order` as given. Its `patient_id` is the new owner.
    fn update_order(&self, order: &ChildRecord) -> Result<(), CallError>;
    fn update_note(&self, note: &ChildRecord) -> Result<(), CallError>;
    fn delete_patient(&self, patient_id: &str) -> Result<(), CallError>;
}

pub trait DocumentStore: Send + Sync {
    fn fetch_document(&self, document: &DocumentRef) -> Result<Vec<u8>, CallError>;
}

/// Best-effort text extraction. Returns an empty string when nothing could
/// be read; any fallback strategy stays behind this boundary.
pub trait TextExtractor: Send + Sync {
    fn extract_text(&self, raw: &[u8]) -> String;
}

pub trait IdentityExtractor: Send + Sync {
    fn extract_identity_candidates(&self, text: &str) -> Result<IdentityCandidates, CallError>;
}

pub trait Notifier: Send + Sync {
    fn notify(&self, patient_id: &str, kind: NotifyKind) -> Result<(), CallError>;
}

/// Everything the engine talks to, borrowed for the length of a run.
#[derive(Clone, Copy)]
pub struct Collaborators<'a> {
    pub registry: &'a dyn Registry,
    pub documents: &'a dyn DocumentStore,
    pub text: &'a dyn TextExtractor,
    pub identity: &'a dyn IdentityExtractor,
    pub notifier: &'a dyn Notifier,
}
