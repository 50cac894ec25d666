//! The hosted document-conversion service.
//!
//! The pipeline only needs three remote operations, expressed as the
//! [`ConversionBackend`] trait:
//!
//! | Operation   | Input                       | Output |
//! |-------------|-----------------------------|--------|
//! | `render`    | product URL + render options | PDF    |
//! | `merge`     | ordered PDFs                | PDF    |
//! | `transcode` | PDF + target format         | DOCX   |
//!
//! [`ConvertApiBackend`] implements them against the ConvertAPI v2 JSON API.
//! Tests and embedders inject their own implementation through
//! [`crate::config::CollectionConfigBuilder::backend`].
//!
//! Every call is attempted once. Errors carry the backend's own message
//! and are never retried here.

use crate::config::RenderOptions;
use crate::error::BackendError;
use crate::output::DocumentFormat;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Extra seconds granted on top of the backend-side timeout before the HTTP
/// client gives up on a render call.
const RENDER_CLIENT_GRACE_SECS: u64 = 30;

/// Client timeout for merge and transcode calls.
const DOCUMENT_CALL_TIMEOUT_SECS: u64 = 300;

/// A single web page to render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderRequest {
    pub url: String,
    pub options: RenderOptions,
}

/// A document sent to the backend, with the file name it should carry.
#[derive(Clone, PartialEq, Eq)]
pub struct NamedDocument {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl std::fmt::Debug for NamedDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NamedDocument")
            .field("name", &self.name)
            .field("bytes", &format_args!("<{} bytes>", self.bytes.len()))
            .finish()
    }
}

/// The three remote operations the pipeline relies on.
#[async_trait]
pub trait ConversionBackend: Send + Sync {
    /// Render a live web page into a PDF.
    async fn render(&self, request: &RenderRequest) -> Result<Vec<u8>, BackendError>;

    /// Merge PDFs into one, preserving the given order.
    async fn merge(&self, documents: &[NamedDocument]) -> Result<Vec<u8>, BackendError>;

    /// Convert a PDF into `target`.
    async fn transcode(
        &self,
        document: &NamedDocument,
        target: DocumentFormat,
    ) -> Result<Vec<u8>, BackendError>;
}

// ── ConvertAPI ───────────────────────────────────────────────────────────

/// [`ConversionBackend`] backed by the ConvertAPI v2 REST API.
pub struct ConvertApiBackend {
    client: reqwest::Client,
    base_url: String,
    secret: String,
}

impl ConvertApiBackend {
    pub fn new(base_url: impl Into<String>, secret: impl Into<String>) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| BackendError::Http(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            secret: secret.into(),
        })
    }

    /// POST one conversion and return the first file of the response.
    async fn convert(
        &self,
        from: &str,
        to: &str,
        parameters: Vec<Parameter>,
        timeout_secs: u64,
    ) -> Result<Vec<u8>, BackendError> {
        let endpoint = format!("{}/convert/{}/to/{}", self.base_url, from, to);
        debug!("POST {} ({} parameters)", endpoint, parameters.len());

        let response = self
            .client
            .post(&endpoint)
            .bearer_auth(&self.secret)
            .timeout(Duration::from_secs(timeout_secs))
            .json(&ConvertRequest { parameters })
            .send()
            .await
            .map_err(|e| classify_transport_error(e, timeout_secs))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| classify_transport_error(e, timeout_secs))?;

        if !status.is_success() {
            return Err(BackendError::Status {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }

        decode_first_file(&body)
    }
}

#[async_trait]
impl ConversionBackend for ConvertApiBackend {
    async fn render(&self, request: &RenderRequest) -> Result<Vec<u8>, BackendError> {
        let timeout = request.options.timeout_secs
            + u64::from(request.options.settle_delay_secs)
            + RENDER_CLIENT_GRACE_SECS;
        self.convert("web", "pdf", render_parameters(request), timeout)
            .await
    }

    async fn merge(&self, documents: &[NamedDocument]) -> Result<Vec<u8>, BackendError> {
        let files = documents.iter().map(FileValue::from).collect();
        self.convert(
            "pdf",
            "merge",
            vec![Parameter::files("Files", files)],
            DOCUMENT_CALL_TIMEOUT_SECS,
        )
        .await
    }

    async fn transcode(
        &self,
        document: &NamedDocument,
        target: DocumentFormat,
    ) -> Result<Vec<u8>, BackendError> {
        self.convert(
            "pdf",
            target.extension(),
            vec![Parameter::file("File", FileValue::from(document))],
            DOCUMENT_CALL_TIMEOUT_SECS,
        )
        .await
    }
}

// ── Wire format ──────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct ConvertRequest {
    parameters: Vec<Parameter>,
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
struct Parameter {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    value: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    file_value: Option<FileValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    file_values: Option<Vec<FileValue>>,
}

impl Parameter {
    fn value(name: &str, value: impl Into<serde_json::Value>) -> Self {
        Self {
            name: name.to_string(),
            value: Some(value.into()),
            ..Default::default()
        }
    }

    fn file(name: &str, file: FileValue) -> Self {
        Self {
            name: name.to_string(),
            file_value: Some(file),
            ..Default::default()
        }
    }

    fn files(name: &str, files: Vec<FileValue>) -> Self {
        Self {
            name: name.to_string(),
            file_values: Some(files),
            ..Default::default()
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct FileValue {
    name: String,
    data: String,
}

impl From<&NamedDocument> for FileValue {
    fn from(doc: &NamedDocument) -> Self {
        Self {
            name: doc.name.clone(),
            data: STANDARD.encode(&doc.bytes),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ConvertResponse {
    #[serde(default)]
    files: Vec<ResponseFile>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ResponseFile {
    #[serde(default)]
    file_data: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ErrorResponse {
    message: String,
}

/// Web-to-PDF parameters for one render call.
fn render_parameters(request: &RenderRequest) -> Vec<Parameter> {
    let o = &request.options;
    let margin = o.margin_mm.to_string();
    vec![
        Parameter::value("Url", request.url.as_str()),
        Parameter::value("PageSize", o.page_size.as_str()),
        Parameter::value("MarginTop", margin.as_str()),
        Parameter::value("MarginBottom", margin.as_str()),
        Parameter::value("MarginLeft", margin.as_str()),
        Parameter::value("MarginRight", margin.as_str()),
        Parameter::value("LoadLazyContent", o.wait_for_dynamic_content),
        Parameter::value("ConversionDelay", o.settle_delay_secs),
        Parameter::value("Timeout", o.timeout_secs),
    ]
}

fn decode_first_file(body: &[u8]) -> Result<Vec<u8>, BackendError> {
    let parsed: ConvertResponse =
        serde_json::from_slice(body).map_err(|e| BackendError::Decode(e.to_string()))?;
    let data = parsed
        .files
        .into_iter()
        .find_map(|f| f.file_data)
        .ok_or(BackendError::EmptyResponse)?;
    let bytes = STANDARD
        .decode(data.as_bytes())
        .map_err(|e| BackendError::Decode(e.to_string()))?;
    if bytes.is_empty() {
        return Err(BackendError::EmptyResponse);
    }
    Ok(bytes)
}

/// Prefer the JSON `Message` field; fall back to the raw body.
fn error_message(body: &[u8]) -> String {
    match serde_json::from_slice::<ErrorResponse>(body) {
        Ok(e) => e.message,
        Err(_) => {
            let text = String::from_utf8_lossy(body);
            let text = text.trim();
            if text.is_empty() {
                "empty response body".to_string()
            } else {
                text.chars().take(300).collect()
            }
        }
    }
}

fn classify_transport_error(e: reqwest::Error, timeout_secs: u64) -> BackendError {
    if e.is_timeout() {
        BackendError::Timeout { secs: timeout_secs }
    } else {
        BackendError::Http(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn render_parameters_carry_every_option() {
        let req = RenderRequest {
            url: "https://shop.test/products/a".into(),
            options: RenderOptions::default(),
        };
        let body = serde_json::to_value(ConvertRequest {
            parameters: render_parameters(&req),
        })
        .unwrap();
        let params = body["Parameters"].as_array().unwrap();
        let get = |name: &str| {
            params
                .iter()
                .find(|p| p["Name"] == name)
                .map(|p| p["Value"].clone())
                .unwrap()
        };
        assert_eq!(get("Url"), json!("https://shop.test/products/a"));
        assert_eq!(get("PageSize"), json!("a4"));
        assert_eq!(get("MarginLeft"), json!("10"));
        assert_eq!(get("LoadLazyContent"), json!(true));
        assert_eq!(get("ConversionDelay"), json!(2));
        assert_eq!(get("Timeout"), json!(30));
    }

    #[test]
    fn file_parameters_are_base64() {
        let doc = NamedDocument {
            name: "001_a.pdf".into(),
            bytes: b"%PDF-1.7".to_vec(),
        };
        let v = serde_json::to_value(Parameter::files("Files", vec![FileValue::from(&doc)])).unwrap();
        assert_eq!(v["Name"], "Files");
        assert_eq!(v["FileValues"][0]["Name"], "001_a.pdf");
        assert_eq!(v["FileValues"][0]["Data"], STANDARD.encode(b"%PDF-1.7"));
        assert!(v.get("Value").is_none());
    }

    #[test]
    fn decode_response_file_data() {
        let body = json!({
            "ConversionCost": 1,
            "Files": [{
                "FileName": "merged.pdf",
                "FileExt": "pdf",
                "FileSize": 8,
                "FileData": STANDARD.encode(b"%PDF-1.7")
            }]
        });
        let bytes = decode_first_file(body.to_string().as_bytes()).unwrap();
        assert_eq!(bytes, b"%PDF-1.7");
    }

    #[test]
    fn decode_response_without_files_is_empty() {
        let err = decode_first_file(br#"{"Files":[]}"#).unwrap_err();
        assert!(matches!(err, BackendError::EmptyResponse));
    }

    #[test]
    fn error_message_prefers_json_message() {
        assert_eq!(
            error_message(br#"{"Code":4013,"Message":"Secret is invalid"}"#),
            "Secret is invalid"
        );
        assert_eq!(error_message(b"  Bad Gateway \n"), "Bad Gateway");
        assert_eq!(error_message(b""), "empty response body");
    }
}
