use std::time::Duration;

use base64::Engine as _;
use regmerge_recon::{CallError, DocumentRef, DocumentStore};

use crate::http::{ClientError, HttpTransport};

/// Fetches verification documents: by URL first, then by document id
/// through the document API.
#[derive(Clone)]
pub struct DocumentApiClient {
    http: HttpTransport,
    api_url: String,
    token: String,
}

impl DocumentApiClient {
    pub fn new(api_url: &str, token: &str, timeout: Duration) -> Self {
        Self {
            http: HttpTransport::new(timeout),
            api_url: api_url.to_string(),
            token: token.to_string(),
        }
    }

    /// Raw bytes from a pre-signed document URL. No auth header.
    pub fn fetch_by_url(&self, url: &str) -> Result<Vec<u8>, ClientError> {
        let response = self.http.send(self.http.client().get(url))?;
        let bytes = response.bytes()?;
        Ok(bytes.to_vec())
    }

    /// `GET {api}?docId.id={id}` returning `{isSuccess, value: {documentBuffer}}`.
    pub fn fetch_by_id(&self, document_id: &str) -> Result<Vec<u8>, ClientError> {
        let request = self
            .http
            .client()
            .get(&self.api_url)
            .query(&[("docId.id", document_id)])
            .header("Accept", "application/json")
            .bearer_auth(&self.token);
        let json = self.http.send_json(request)?;

        if json["isSuccess"].as_bool() != Some(true) {
            return Err(ClientError::Rejected(format!(
                "document API reported failure for {document_id}"
            )));
        }
        let buffer = json["value"]["documentBuffer"]
            .as_str()
            .filter(|b| !b.is_empty())
            .ok_or_else(|| ClientError::Parse(format!("no documentBuffer for {document_id}")))?;

        base64::engine::general_purpose::STANDARD
            .decode(buffer)
            .map_err(|e| ClientError::Parse(format!("documentBuffer for {document_id}: {e}")))
    }
}

impl DocumentStore for DocumentApiClient {
    fn fetch_document(&self, document: &DocumentRef) -> Result<Vec<u8>, CallError> {
        let mut url_error = None;
        if let Some(url) = document.url.as_deref().filter(|u| !u.trim().is_empty()) {
            match self.fetch_by_url(url) {
                Ok(bytes) => return Ok(bytes),
                Err(e) => {
                    log::warn!("document '{}' by URL failed: {e}", document.name);
                    url_error = Some(e);
                }
            }
        }

        if let Some(id) = document.document_id.as_deref().filter(|d| !d.trim().is_empty()) {
            return Ok(self.fetch_by_id(id)?);
        }

        Err(match url_error {
            Some(e) => e.into(),
            None => CallError::new(
                regmerge_recon::FailureKind::NotFound,
                format!("document '{}' has neither URL nor id", document.name),
            ),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use regmerge_recon::FailureKind;

    fn doc(url: Option<String>, id: Option<&str>) -> DocumentRef {
        DocumentRef {
            name: "485 Plan".into(),
            url,
            document_id: id.map(Into::into),
        }
    }

    #[test]
    fn url_is_tried_first() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/files/485.pdf");
            then.status(200).body("%PDF-1.4 body");
        });
        let client = DocumentApiClient::new(&server.url("/doc"), "da", Duration::from_secs(5));

        let bytes = client
            .fetch_document(&doc(Some(server.url("/files/485.pdf")), Some("d1")))
            .unwrap();
        mock.assert();
        assert_eq!(bytes, b"%PDF-1.4 body");
    }

    #[test]
    fn falls_back_to_document_id() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/files/gone.pdf");
            then.status(404);
        });
        let api = server.mock(|when, then| {
            when.method(GET)
                .path("/doc")
                .query_param("docId.id", "d1")
                .header("authorization", "Bearer da");
            then.status(200).json_body(serde_json::json!({
                "isSuccess": true,
                "value": {"documentBuffer": "aGVsbG8="}
            }));
        });
        let client = DocumentApiClient::new(&server.url("/doc"), "da", Duration::from_secs(5));

        let bytes = client
            .fetch_document(&doc(Some(server.url("/files/gone.pdf")), Some("d1")))
            .unwrap();
        api.assert();
        assert_eq!(bytes, b"hello");
    }

    #[test]
    fn unsuccessful_document_api_is_an_error() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/doc");
            then.status(200)
                .json_body(serde_json::json!({"isSuccess": false, "value": null}));
        });
        let client = DocumentApiClient::new(&server.url("/doc"), "da", Duration::from_secs(5));

        let err = client.fetch_document(&doc(None, Some("d2"))).unwrap_err();
        assert_eq!(err.kind, FailureKind::Permanent);
    }

    #[test]
    fn reference_without_location_is_not_found() {
        let client = DocumentApiClient::new("http://127.0.0.1:9/doc", "da", Duration::from_secs(1));
        let err = client.fetch_document(&doc(None, None)).unwrap_err();
        assert_eq!(err.kind, FailureKind::NotFound);
    }
}
