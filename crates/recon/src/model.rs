use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::Serialize;

// ---------------------------------------------------------------------------
// Registry records
// ---------------------------------------------------------------------------

/// A patient record as read from the registry.
///
/// Never mutated during a run. Derived values (order count, verification
/// score) live on [`MemberScore`] instead.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatientRecord {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub dob: Option<NaiveDate>,
    pub mrn: Option<String>,
    pub company_id: Option<String>,
    pub pg_company_id: String,
    pub created_on: Option<NaiveDateTime>,
}

impl PatientRecord {
    /// First and last name joined by a single space.
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name.trim(), self.last_name.trim())
            .trim()
            .to_string()
    }

    /// Count of non-null identity fields (DOB, MRN, company id).
    pub fn completeness(&self) -> u8 {
        [
            self.dob.is_some(),
            present(&self.mrn),
            present(&self.company_id),
        ]
        .iter()
        .filter(|p| **p)
        .count() as u8
    }
}

fn present(value: &Option<String>) -> bool {
    value.as_deref().map_or(false, |v| !v.trim().is_empty())
}

/// Where the verification document behind an order can be fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentRef {
    pub name: String,
    pub url: Option<String>,
    pub document_id: Option<String>,
}

/// An Order or CCNote owned by a patient.
///
/// `fields` is the record exactly as the registry returned it; the engine
/// never inspects it and migration sends it back unchanged apart from the
/// owner.
#[derive(Debug, Clone, PartialEq)]
pub struct ChildRecord {
    pub id: String,
    pub patient_id: String,
    pub entity_type: Option<String>,
    pub document: Option<DocumentRef>,
    pub fields: serde_json::Map<String, serde_json::Value>,
}

impl ChildRecord {
    /// Discriminator of order rows that are really CC notes.
    pub const CC_NOTE_TYPE: &'static str = "CCNote";

    pub fn is_cc_note(&self) -> bool {
        self.entity_type.as_deref() == Some(Self::CC_NOTE_TYPE)
    }

    /// Copy of this record owned by `patient_id`.
    pub fn reassigned_to(&self, patient_id: &str) -> ChildRecord {
        ChildRecord {
            patient_id: patient_id.to_string(),
            ..self.clone()
        }
    }
}

/// Identity values pulled out of a clinical document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IdentityCandidates {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mrn: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dob: Option<NaiveDate>,
}

impl IdentityCandidates {
    pub fn is_empty(&self) -> bool {
        self.mrn.as_deref().map_or(true, |m| m.trim().is_empty()) && self.dob.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotifyKind {
    Deleted,
    Kept,
}

impl std::fmt::Display for NotifyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Deleted => write!(f, "deleted"),
            Self::Kept => write!(f, "kept"),
        }
    }
}

// ---------------------------------------------------------------------------
// Grouping + decisions
// ---------------------------------------------------------------------------

/// Connected component of the duplicate relation. Always two or more members.
#[derive(Debug, Clone)]
pub struct DuplicateGroup {
    pub index: usize,
    pub members: Vec<PatientRecord>,
}

impl DuplicateGroup {
    pub fn member_ids(&self) -> Vec<String> {
        self.members.iter().map(|m| m.id.clone()).collect()
    }

    pub fn contains(&self, patient_id: &str) -> bool {
        self.members.iter().any(|m| m.id == patient_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResolutionMethod {
    Exact,
    VerifiedByDocument,
    Unresolved,
}

impl std::fmt::Display for ResolutionMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Exact => write!(f, "exact"),
            Self::VerifiedByDocument => write!(f, "verified-by-document"),
            Self::Unresolved => write!(f, "unresolved"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MergeDecision {
    pub primary_id: String,
    pub non_primary_ids: Vec<String>,
    pub method: ResolutionMethod,
}

/// Per-member ranking inputs, as used by the selector.
#[derive(Debug, Clone, Serialize)]
pub struct MemberScore {
    pub patient_id: String,
    pub order_count: usize,
    pub completeness: u8,
    /// `None` = unscored.
    pub verification_score: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extracted: Option<IdentityCandidates>,
}

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    LoadOrders,
    Verification,
    FetchOrders,
    MoveOrder,
    FetchNotes,
    MoveNote,
    DeletePatient,
    Notify,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::LoadOrders => "load_orders",
            Self::Verification => "verification",
            Self::FetchOrders => "fetch_orders",
            Self::MoveOrder => "move_order",
            Self::FetchNotes => "fetch_notes",
            Self::MoveNote => "move_note",
            Self::DeletePatient => "delete_patient",
            Self::Notify => "notify",
        };
        write!(f, "{s}")
    }
}

/// A warning or error scoped to one group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupIssue {
    pub stage: Stage,
    pub patient_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_id: Option<String>,
    pub message: String,
}

impl GroupIssue {
    pub fn new(stage: Stage, patient_id: &str, message: impl Into<String>) -> Self {
        Self {
            stage,
            patient_id: patient_id.to_string(),
            record_id: None,
            message: message.into(),
        }
    }

    pub fn for_record(mut self, record_id: &str) -> Self {
        self.record_id = Some(record_id.to_string());
        self
    }
}

impl std::fmt::Display for GroupIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.record_id {
            Some(rid) => write!(f, "[{}] patient {} record {}: {}", self.stage, self.patient_id, rid, self.message),
            None => write!(f, "[{}] patient {}: {}", self.stage, self.patient_id, self.message),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationRecord {
    pub patient_id: String,
    pub kind: NotifyKind,
    pub ok: bool,
}

/// Terminal result for one duplicate group.
#[derive(Debug, Clone, Serialize)]
pub struct MergeOutcome {
    pub group_index: usize,
    pub member_ids: Vec<String>,
    pub decision: MergeDecision,
    pub members: Vec<MemberScore>,
    pub orders_moved: usize,
    pub notes_moved: usize,
    pub deleted_ids: Vec<String>,
    /// Non-primary records left in place because migration or deletion failed.
    pub retained_ids: Vec<String>,
    pub notifications: Vec<NotificationRecord>,
    pub warnings: Vec<GroupIssue>,
    pub errors: Vec<GroupIssue>,
    pub dry_run: bool,
}

impl MergeOutcome {
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Summary
// ---------------------------------------------------------------------------

/// A registry record left out of grouping because it failed validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExcludedRecord {
    pub patient_id: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunMeta {
    pub engine_version: String,
    pub started_at: String,
    pub finished_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub meta: RunMeta,
    pub pg_company_id: String,
    pub total_records: usize,
    pub excluded: Vec<ExcludedRecord>,
    pub groups_found: usize,
    pub groups_processed: usize,
    pub records_deleted: usize,
    pub orders_moved: usize,
    pub notes_moved: usize,
    pub error_count: usize,
    pub warning_count: usize,
    pub dry_run: bool,
    pub cancelled: bool,
    pub outcomes: Vec<MergeOutcome>,
}

impl RunSummary {
    pub fn has_errors(&self) -> bool {
        self.error_count > 0
    }
}

// ---------------------------------------------------------------------------
// Date parsing
// ---------------------------------------------------------------------------

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%m-%d-%Y", "%Y/%m/%d", "%m/%d/%y"];

/// Parse a date the way the registry and document extractor write them.
///
/// Accepts ISO dates (optionally with a time part) and US month-first forms.
pub fn parse_loose_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if let Some(dt) = parse_loose_datetime(value) {
        return Some(dt.date());
    }
    None
}

/// Parse a timestamp; a bare date becomes midnight.
pub fn parse_loose_datetime(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.naive_utc());
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, fmt) {
            return Some(dt);
        }
    }
    // "MM/DD/YYYY hh:mm:ss" and friends: keep the date part only
    let date_part = value.split_whitespace().next().unwrap_or(value);
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(date_part, fmt).ok())
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> PatientRecord {
        PatientRecord {
            id: "p1".into(),
            first_name: " John ".into(),
            last_name: "Smith".into(),
            dob: None,
            mrn: Some("  ".into()),
            company_id: Some("c1".into()),
            pg_company_id: "pg-1".into(),
            created_on: None,
        }
    }

    #[test]
    fn display_name_trims_components() {
        assert_eq!(record().display_name(), "John Smith");
    }

    #[test]
    fn completeness_ignores_blank_values() {
        let mut r = record();
        assert_eq!(r.completeness(), 1);
        r.dob = NaiveDate::from_ymd_opt(1950, 1, 1);
        r.mrn = Some("M1".into());
        assert_eq!(r.completeness(), 3);
    }

    #[test]
    fn parse_dates_in_registry_formats() {
        let expected = NaiveDate::from_ymd_opt(1950, 1, 31);
        assert_eq!(parse_loose_date("1950-01-31"), expected);
        assert_eq!(parse_loose_date("01/31/1950"), expected);
        assert_eq!(parse_loose_date("01-31-1950"), expected);
        assert_eq!(parse_loose_date("1950-01-31T00:00:00"), expected);
        assert_eq!(parse_loose_date("1950-01-31T08:15:00Z"), expected);
        assert_eq!(parse_loose_date("01/31/1950 12:00:00 AM"), expected);
        assert_eq!(parse_loose_date(""), None);
        assert_eq!(parse_loose_date("not a date"), None);
    }

    #[test]
    fn parse_datetime_keeps_time() {
        let dt = parse_loose_datetime("2024-03-05T10:11:12.5").unwrap();
        assert_eq!(dt.format("%H:%M:%S").to_string(), "10:11:12");
        let midnight = parse_loose_datetime("2024-03-05").unwrap();
        assert_eq!(midnight.format("%H:%M").to_string(), "00:00");
    }

    #[test]
    fn reassigned_keeps_field_bag() {
        let mut fields = serde_json::Map::new();
        fields.insert("patientId".into(), serde_json::json!("old"));
        fields.insert("status".into(), serde_json::json!("signed"));
        let child = ChildRecord {
            id: "o1".into(),
            patient_id: "old".into(),
            entity_type: Some("Order".into()),
            document: None,
            fields,
        };
        let moved = child.reassigned_to("new");
        assert_eq!(moved.patient_id, "new");
        assert_eq!(moved.fields, child.fields);
        assert!(!moved.is_cc_note());
    }

    #[test]
    fn resolution_method_wire_names() {
        assert_eq!(
            serde_json::to_value(ResolutionMethod::VerifiedByDocument).unwrap(),
            serde_json::json!("verified-by-document")
        );
        assert_eq!(ResolutionMethod::Unresolved.to_string(), "unresolved");
    }
}
