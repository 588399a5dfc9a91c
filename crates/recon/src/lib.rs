//! `regmerge-recon`: duplicate patient reconciliation engine.
//!
//! Pure engine crate: talks to the registry, document pipeline and notifier
//! only through the collaborator traits in [`collab`]. No HTTP, no CLI.

pub mod collab;
pub mod config;
pub mod engine;
pub mod error;
pub mod evidence;
pub mod grouper;
pub mod migrate;
pub mod model;
pub mod resolver;
pub mod retry;
pub mod selector;
pub mod similarity;

pub use collab::{
    CallError, Collaborators, DocumentStore, FailureKind, IdentityExtractor, Notifier,
    Registry, TextExtractor,
};
pub use config::ReconOptions;
pub use engine::{reconcile, reconcile_single, reconcile_with_cancel, CancelFlag};
pub use error::ReconError;
pub use model::{
    ChildRecord, DocumentRef, IdentityCandidates, MergeDecision, MergeOutcome, NotifyKind,
    PatientRecord, ResolutionMethod, RunSummary,
};
pub use retry::RetryPolicy;
