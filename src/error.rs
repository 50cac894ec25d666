//! Error types for the collection2doc library.
//!
//! Three error types cover three failure modes:
//!
//! * [`CollectionError`] — **Fatal**: the run cannot produce a document
//!   (listing page unreachable, no products found, every render failed,
//!   merge or transcode rejected). Returned as `Err(CollectionError)` from
//!   the top-level `run*` functions.
//!
//! * [`RenderError`] — **Non-fatal**: a single product page failed to render.
//!   Stored inside [`crate::output::RenderFailure`] so the run continues with
//!   the remaining products.
//!
//! * [`BackendError`] — what a [`crate::backend::ConversionBackend`] call
//!   returns. The pipeline wraps it into one of the two types above depending
//!   on which stage made the call.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the collection2doc library.
///
/// Per-product failures use [`RenderError`] and are stored in
/// [`crate::output::ConversionBatch`] rather than propagated here.
#[derive(Debug, Error)]
pub enum CollectionError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// The listing URL is not an absolute http(s) URL with a host.
    #[error("Invalid listing URL '{input}': {reason}")]
    InvalidUrl { input: String, reason: String },

    // ── Discovery errors ──────────────────────────────────────────────────
    /// The listing page could not be fetched or returned a non-2xx status.
    #[error("Failed to fetch listing page '{url}': {reason}\nCheck the URL and your internet connection.")]
    FetchFailed { url: String, reason: String },

    /// Fetching the listing page exceeded the configured timeout.
    #[error("Fetching '{url}' timed out after {secs}s\nIncrease --fetch-timeout.")]
    FetchTimeout { url: String, secs: u64 },

    /// The listing page was fetched but no product links were recognised.
    #[error("No product links found on '{url}'")]
    NoLinksFound { url: String },

    // ── Conversion errors ─────────────────────────────────────────────────
    /// Every render task failed; there is nothing to merge.
    #[error("All {total} product pages failed to render.\nFirst error: {first_error}")]
    NoArtifacts { total: usize, first_error: String },

    /// A successful render's file vanished or is empty before merging.
    #[error("Rendered document for product {index} is missing or empty: '{path}'")]
    MissingArtifact { index: usize, path: PathBuf },

    /// The backend rejected the merge request.
    #[error("Failed to merge {count} PDFs: {reason}")]
    MergeFailed { count: usize, reason: String },

    /// The backend rejected the PDF → target-format conversion.
    #[error("Failed to convert merged PDF to {target}: {reason}")]
    TranscodeFailed { target: String, reason: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// No backend was injected and no API secret was configured.
    #[error("Conversion backend is not configured.\n{hint}")]
    BackendNotConfigured { hint: String },

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the output document.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single product page.
///
/// The run continues unless ALL products fail.
#[derive(Debug, Clone, Error, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum RenderError {
    /// The pre-flight probe got a status other than 200.
    #[error("URL not accessible (status: {status})")]
    SourceStatus { status: u16 },

    /// The pre-flight probe could not reach the product page.
    #[error("URL not reachable: {detail}")]
    SourceUnreachable { detail: String },

    /// The backend rejected or failed the render call.
    #[error("render failed: {detail}")]
    Backend { detail: String },

    /// The backend did not answer in time.
    #[error("render timed out after {secs}s")]
    Timeout { secs: u64 },

    /// The rendered PDF could not be written to the run workspace.
    #[error("could not save rendered PDF: {detail}")]
    Io { detail: String },

    /// The render task panicked.
    #[error("render task aborted: {detail}")]
    TaskPanicked { detail: String },
}

/// Errors returned by a [`crate::backend::ConversionBackend`].
#[derive(Debug, Clone, Error)]
pub enum BackendError {
    /// Transport-level failure (DNS, TLS, connection reset).
    #[error("HTTP error: {0}")]
    Http(String),

    /// The backend answered with a non-success status.
    #[error("backend returned {status}: {message}")]
    Status { status: u16, message: String },

    /// The call exceeded the client timeout.
    #[error("backend call timed out after {secs}s")]
    Timeout { secs: u64 },

    /// The backend answered 2xx but returned no file.
    #[error("backend returned no file")]
    EmptyResponse,

    /// The response body could not be decoded.
    #[error("could not decode backend response: {0}")]
    Decode(String),
}

impl From<BackendError> for RenderError {
    fn from(e: BackendError) -> Self {
        match e {
            BackendError::Timeout { secs } => RenderError::Timeout { secs },
            other => RenderError::Backend {
                detail: other.to_string(),
            },
        }
    }
}
