//! HTTP-backed collaborators for the reconciliation engine.
//!
//! - [`RegistryClient`]: patient registry (patients, orders, notes) and
//!   post-merge notifications.
//! - [`DocumentApiClient`]: verification document bytes.
//! - [`PdfTextExtractor`]: PDF text with an OCR fallback.
//! - [`AzureOpenAiExtractor`]: MRN/DOB extraction from document text.
//!
//! All clients are blocking and make a single attempt per call.

pub mod documents;
pub mod extract;
pub mod http;
pub mod llm;
pub mod registry;

pub use documents::DocumentApiClient;
pub use extract::PdfTextExtractor;
pub use http::{classify_status, ClientError, HttpTransport};
pub use llm::{AzureOpenAiConfig, AzureOpenAiExtractor};
pub use registry::RegistryClient;
