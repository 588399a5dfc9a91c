//! Registry HTTP client: patients, orders, CC notes, deletion and the RCM
//! notification endpoints.

use std::time::Duration;

use regmerge_recon::model::{parse_loose_date, parse_loose_datetime};
use regmerge_recon::{
    CallError, ChildRecord, DocumentRef, Notifier, NotifyKind, PatientRecord, Registry,
};
use reqwest::Method;
use serde_json::{Map, Value};

use crate::http::{ClientError, HttpTransport};

/// Registry API client (blocking, bearer auth).
#[derive(Clone)]
pub struct RegistryClient {
    http: HttpTransport,
    base_url: String,
    token: String,
}

impl RegistryClient {
    pub fn new(base_url: &str, token: &str, timeout: Duration) -> Self {
        Self {
            http: HttpTransport::new(timeout),
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn get_json(&self, path: &str) -> Result<Value, ClientError> {
        let request = self.http.client().get(self.url(path)).bearer_auth(&self.token);
        self.http.send_json(request)
    }

    fn put_json(&self, path: &str, body: &Value) -> Result<(), ClientError> {
        let request = self
            .http
            .client()
            .put(self.url(path))
            .bearer_auth(&self.token)
            .json(body);
        self.http.send(request)?;
        Ok(())
    }

    fn fetch_children(&self, path: &str) -> Result<Vec<ChildRecord>, CallError> {
        let json = self.get_json(path)?;
        let children = rows(&json)?
            .iter()
            .enumerate()
            .map(|(i, row)| {
                parse_child(row)
                    .ok_or_else(|| ClientError::Parse(format!("{path}: row {i} has no usable id")))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(children)
    }

    /// Call `path` with each method in turn, moving on only when the server
    /// answers 405 Method Not Allowed.
    fn call_with_methods(&self, path: &str, methods: &[Method]) -> Result<(), ClientError> {
        let mut last = ClientError::Rejected(format!("no HTTP method accepted by {path}"));
        for method in methods {
            let request = self
                .http
                .client()
                .request(method.clone(), self.url(path))
                .bearer_auth(&self.token);
            match self.http.send(request) {
                Ok(_) => {
                    log::debug!("{method} {path} ok");
                    return Ok(());
                }
                Err(ClientError::Http { status: 405, body }) => {
                    log::debug!("{method} {path} not allowed, trying next method");
                    last = ClientError::Http { status: 405, body };
                }
                Err(e) => return Err(e),
            }
        }
        Err(last)
    }
}

impl Registry for RegistryClient {
    fn fetch_patients(&self, pg_company_id: &str) -> Result<Vec<PatientRecord>, CallError> {
        let json = self.get_json(&format!("/api/Patient/company/pg/{pg_company_id}"))?;
        let patients: Vec<PatientRecord> = rows(&json)?.iter().map(parse_patient).collect();
        log::info!("fetched {} patients for PG {}", patients.len(), pg_company_id);
        Ok(patients)
    }

    fn fetch_orders(&self, patient_id: &str) -> Result<Vec<ChildRecord>, CallError> {
        self.fetch_children(&format!("/api/Order/patient/{patient_id}"))
    }

    fn fetch_notes(&self, patient_id: &str) -> Result<Vec<ChildRecord>, CallError> {
        self.fetch_children(&format!("/api/CCNotes/patient/{patient_id}"))
    }

    fn update_order(&self, order: &ChildRecord) -> Result<(), CallError> {
        self.put_json(&format!("/api/Order/{}", order.id), &child_body(order))?;
        Ok(())
    }

    fn update_note(&self, note: &ChildRecord) -> Result<(), CallError> {
        self.put_json(&format!("/api/CCNotes/{}", note.id), &child_body(note))?;
        Ok(())
    }

    fn delete_patient(&self, patient_id: &str) -> Result<(), CallError> {
        let request = self
            .http
            .client()
            .delete(self.url(&format!("/api/Patient/{patient_id}")))
            .bearer_auth(&self.token);
        self.http.send(request)?;
        Ok(())
    }
}

impl Notifier for RegistryClient {
    fn notify(&self, patient_id: &str, kind: NotifyKind) -> Result<(), CallError> {
        match kind {
            NotifyKind::Deleted => self.call_with_methods(
                &format!("/api/RCM/rcm/patient/{patient_id}"),
                &[Method::DELETE, Method::POST, Method::GET],
            )?,
            NotifyKind::Kept => self.call_with_methods(
                &format!("/api/RCM/cron-new-patient/{patient_id}"),
                &[Method::POST],
            )?,
        }
        log::info!("RCM notified: patient {patient_id} {kind}");
        Ok(())
    }
}

// ── Wire parsing ────────────────────────────────────────────────────

/// Top-level array, or an array under `value` / `data`. Any other shape is
/// a parse error, never an empty list.
fn rows(json: &Value) -> Result<&[Value], ClientError> {
    json.as_array()
        .or_else(|| json["value"].as_array())
        .or_else(|| json["data"].as_array())
        .map(Vec::as_slice)
        .ok_or_else(|| ClientError::Parse(format!("expected a list of rows, got {}", shape(json))))
}

fn shape(json: &Value) -> &'static str {
    match json {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// String or number field as a string. Blank strings become `None`.
fn text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Malformed patients are kept with empty fields so validation can list
/// them instead of silently dropping them.
fn parse_patient(json: &Value) -> PatientRecord {
    let info = &json["agencyInfo"];
    PatientRecord {
        id: text(&json["id"]).unwrap_or_default(),
        first_name: text(&info["patientFName"]).unwrap_or_default(),
        last_name: text(&info["patientLName"]).unwrap_or_default(),
        dob: text(&info["dob"]).and_then(|d| parse_loose_date(&d)),
        mrn: text(&info["medicalRecordNo"]),
        company_id: text(&info["companyId"]),
        pg_company_id: text(&info["pgcompanyID"]).unwrap_or_default(),
        created_on: text(&info["createdOn"]).and_then(|d| parse_loose_datetime(&d)),
    }
}

fn parse_child(json: &Value) -> Option<ChildRecord> {
    let fields = json.as_object()?.clone();
    let id = text(&json["id"])?;
    let document = text(&json["documentName"]).map(|name| DocumentRef {
        name,
        url: text(&json["orderUrl"]),
        document_id: text(&json["documentID"]),
    });
    Some(ChildRecord {
        id,
        patient_id: text(&json["patientId"]).unwrap_or_default(),
        entity_type: text(&json["entityType"]),
        document,
        fields,
    })
}

/// The stored record with only `patientId` replaced. Numeric ids stay numeric.
fn child_body(record: &ChildRecord) -> Value {
    let mut body: Map<String, Value> = record.fields.clone();
    let numeric = matches!(body.get("patientId"), Some(Value::Number(_)));
    let patient_id = match record.patient_id.parse::<i64>() {
        Ok(n) if numeric => Value::from(n),
        _ => Value::String(record.patient_id.clone()),
    };
    body.insert("patientId".into(), patient_id);
    Value::Object(body)
}
