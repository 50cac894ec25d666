//! Data model for a single collection run.
//!
//! Every type here is scoped to one run: links are discovered, turned into
//! tasks, rendered into artifacts that live in the run's temporary
//! workspace, and finally merged into a [`FinalArtifact`]. Nothing is shared
//! between concurrent runs.

use crate::error::{CollectionError, RenderError};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;
use url::Url;

// ── Discovery ────────────────────────────────────────────────────────────

/// Which heuristic produced a [`CandidateLink`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscoveryStrategy {
    /// Path marker or storefront query key matched.
    Pattern,
    /// Image-bearing link or product-ish container matched.
    Fallback,
}

/// An absolute URL believed to reference a single product page.
///
/// Identity is the normalized URL only: two links that differ just by
/// fragment, default port, or an empty vs `/` path compare equal, and the
/// strategy that found them does not take part in equality or ordering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateLink {
    pub url: Url,
    pub strategy: DiscoveryStrategy,
}

impl CandidateLink {
    pub fn new(url: Url, strategy: DiscoveryStrategy) -> Self {
        Self {
            url: normalize_url(url),
            strategy,
        }
    }

    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }
}

impl PartialEq for CandidateLink {
    fn eq(&self, other: &Self) -> bool {
        self.url.as_str() == other.url.as_str()
    }
}

impl Eq for CandidateLink {}

impl Hash for CandidateLink {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.url.as_str().hash(state);
    }
}

impl PartialOrd for CandidateLink {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for CandidateLink {
    fn cmp(&self, other: &Self) -> Ordering {
        self.url.as_str().cmp(other.url.as_str())
    }
}

impl fmt::Display for CandidateLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.url.as_str())
    }
}

/// Canonical form used for link identity.
///
/// `Url::parse` already lowercases the host, drops default ports and turns an
/// empty path into `/`; the fragment is the only part left to strip.
pub fn normalize_url(mut url: Url) -> Url {
    url.set_fragment(None);
    url
}

// ── Conversion ───────────────────────────────────────────────────────────

/// A candidate link paired with its 1-based sequence index.
///
/// The index is assigned once before dispatch and is the only key used to
/// restore order after the parallel render phase.
#[derive(Debug, Clone)]
pub struct ConversionTask {
    pub index: usize,
    pub link: CandidateLink,
}

/// A product page rendered to a PDF inside the run workspace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderedArtifact {
    pub index: usize,
    pub url: String,
    pub path: PathBuf,
    pub size_bytes: u64,
}

/// A product page that could not be rendered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderFailure {
    pub index: usize,
    pub url: String,
    pub error: RenderError,
}

impl fmt::Display for RenderFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Product {}: {}", self.index, self.error)
    }
}

/// Outcome of one [`ConversionTask`]: exactly one of the two variants.
#[derive(Debug, Clone)]
pub enum ConversionResult {
    Success(RenderedArtifact),
    Failure(RenderFailure),
}

impl ConversionResult {
    pub fn index(&self) -> usize {
        match self {
            ConversionResult::Success(a) => a.index,
            ConversionResult::Failure(f) => f.index,
        }
    }
}

/// Every [`ConversionResult`] of a run, partitioned into successes and
/// failures.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversionBatch {
    /// Number of tasks dispatched.
    pub total: usize,
    /// Successful renders; sorted by index once [`ConversionBatch::finish`] ran.
    pub successes: Vec<RenderedArtifact>,
    /// Failed renders, sorted by index once [`ConversionBatch::finish`] ran.
    pub failures: Vec<RenderFailure>,
}

impl ConversionBatch {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            successes: Vec::with_capacity(total),
            failures: Vec::new(),
        }
    }

    /// Record one outcome, in whatever order tasks complete.
    pub fn push(&mut self, result: ConversionResult) {
        match result {
            ConversionResult::Success(a) => self.successes.push(a),
            ConversionResult::Failure(f) => self.failures.push(f),
        }
    }

    /// Restore sequence order. Called exactly once, after the last task.
    pub fn finish(&mut self) {
        self.successes.sort_by_key(|a| a.index);
        self.failures.sort_by_key(|f| f.index);
    }

    /// Completed task count so far.
    pub fn completed(&self) -> usize {
        self.successes.len() + self.failures.len()
    }

    /// Fail with [`CollectionError::NoArtifacts`] when nothing rendered.
    pub fn ensure_any_success(&self) -> Result<(), CollectionError> {
        if !self.successes.is_empty() {
            return Ok(());
        }
        let first_error = self
            .failures
            .first()
            .map(|f| f.to_string())
            .unwrap_or_else(|| "no render tasks were dispatched".to_string());
        Err(CollectionError::NoArtifacts {
            total: self.total,
            first_error,
        })
    }

    /// Human-readable failure lines, capped at `limit` with a trailing
    /// `"... and N more"` line for the remainder.
    pub fn failure_preview(&self, limit: usize) -> Vec<String> {
        let mut lines: Vec<String> = self
            .failures
            .iter()
            .take(limit)
            .map(|f| f.to_string())
            .collect();
        if self.failures.len() > limit {
            lines.push(format!("... and {} more", self.failures.len() - limit));
        }
        lines
    }
}

// ── Output ───────────────────────────────────────────────────────────────

/// Document formats the pipeline produces.
///
/// Renders and merges are both PDF; DOCX is the only transcode target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    /// Native format of render and merge.
    Pdf,
    /// Word document produced by transcoding the merged PDF. (default)
    #[default]
    Docx,
}

impl DocumentFormat {
    pub fn extension(self) -> &'static str {
        match self {
            DocumentFormat::Pdf => "pdf",
            DocumentFormat::Docx => "docx",
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            DocumentFormat::Pdf => "application/pdf",
            DocumentFormat::Docx => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
        }
    }
}

impl fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// The merged, possibly transcoded document of a run.
#[derive(Clone, Serialize, Deserialize)]
pub struct FinalArtifact {
    #[serde(skip)]
    pub bytes: Vec<u8>,
    pub format: DocumentFormat,
}

impl fmt::Debug for FinalArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FinalArtifact")
            .field("bytes", &format_args!("<{} bytes>", self.bytes.len()))
            .field("format", &self.format)
            .finish()
    }
}

/// Timing and counts for a completed run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunStats {
    /// Unique candidate links found on the listing page.
    pub discovered: usize,
    /// Render tasks actually dispatched (after the product cap).
    pub dispatched: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub discovery_ms: u64,
    pub conversion_ms: u64,
    pub assembly_ms: u64,
    pub total_ms: u64,
}

/// Everything a successful run hands back to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunOutput {
    pub artifact: FinalArtifact,
    /// Every candidate link found, sorted.
    pub discovered: Vec<CandidateLink>,
    /// Links that were rendered, in sequence order.
    pub dispatched: Vec<CandidateLink>,
    /// Products that failed to render, sorted by index.
    pub failures: Vec<RenderFailure>,
    pub stats: RunStats,
    /// `{domain}_{collection}_products.{ext}`
    pub suggested_file_name: String,
}

/// Build a download file name from the listing URL.
///
/// `https://www.havnstore.com/collections/satisfy` with DOCX output becomes
/// `havnstore_satisfy_products.docx`.
pub fn suggested_file_name(listing: &Url, format: DocumentFormat) -> String {
    let host = listing.host_str().unwrap_or("listing");
    let host = host.strip_prefix("www.").unwrap_or(host);
    let domain = host.strip_suffix(".com").unwrap_or(host);
    let collection = listing
        .path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
        .unwrap_or("collection");
    format!("{}_{}_products.{}", domain, collection, format.extension())
}
