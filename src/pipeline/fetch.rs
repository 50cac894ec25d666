//! Listing-page fetching and charset decoding.
//!
//! Storefronts in Korea, Japan and China still serve EUC-KR, Shift_JIS or
//! GBK pages. Decoding as UTF-8 would mangle the product vocabulary the
//! fallback strategy looks for, so the raw bytes are kept until the
//! charset is known: BOM first, then the `Content-Type` header, then a
//! `<meta>` declaration near the top of the document, then UTF-8.
//!
//! The same [`PageFetcher`] also runs the pre-flight probe against each
//! product page before it is sent to the backend.

use crate::error::CollectionError;
use async_trait::async_trait;
use encoding_rs::{Encoding, UTF_8};
use once_cell::sync::Lazy;
use regex::bytes::Regex;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

/// How many leading bytes are searched for a `<meta>` charset declaration.
const META_SNIFF_LIMIT: usize = 1024;

/// A fetched listing page, still undecoded.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// URL after redirects.
    pub final_url: Url,
    /// Raw `Content-Type` header, if any.
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

/// Outcome of a pre-flight probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// The server answered with this status.
    Status(u16),
    /// The request never got a response.
    Unreachable(String),
}

/// Network access used by the link extractor and the pre-flight probe.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// GET a listing page. Non-2xx statuses are errors.
    async fn fetch(&self, url: &Url) -> Result<FetchedPage, CollectionError>;

    /// HEAD a product page and report the status.
    async fn probe(&self, url: &Url) -> ProbeOutcome;
}

/// reqwest-based [`PageFetcher`].
pub struct HttpFetcher {
    client: reqwest::Client,
    fetch_timeout_secs: u64,
    probe_timeout_secs: u64,
}

impl HttpFetcher {
    pub fn new(
        user_agent: &str,
        fetch_timeout_secs: u64,
        probe_timeout_secs: u64,
    ) -> Result<Self, CollectionError> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(|e| CollectionError::Internal(format!("HTTP client: {e}")))?;
        Ok(Self {
            client,
            fetch_timeout_secs,
            probe_timeout_secs,
        })
    }

    /// Timeouts (while connecting or reading the body) become
    /// `FetchTimeout`; everything else is `FetchFailed`.
    fn fetch_error(&self, url: &Url, e: reqwest::Error) -> CollectionError {
        if e.is_timeout() {
            CollectionError::FetchTimeout {
                url: url.to_string(),
                secs: self.fetch_timeout_secs,
            }
        } else {
            CollectionError::FetchFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &Url) -> Result<FetchedPage, CollectionError> {
        info!("Fetching listing page: {}", url);

        let response = self
            .client
            .get(url.clone())
            .timeout(Duration::from_secs(self.fetch_timeout_secs))
            .send()
            .await
            .map_err(|e| self.fetch_error(url, e))?;

        if !response.status().is_success() {
            return Err(CollectionError::FetchFailed {
                url: url.to_string(),
                reason: format!("HTTP {}", response.status()),
            });
        }

        let final_url = response.url().clone();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let body = response
            .bytes()
            .await
            .map_err(|e| self.fetch_error(url, e))?;

        debug!("Fetched {} bytes from {}", body.len(), final_url);

        Ok(FetchedPage {
            final_url,
            content_type,
            body: body.to_vec(),
        })
    }

    async fn probe(&self, url: &Url) -> ProbeOutcome {
        match self
            .client
            .head(url.clone())
            .timeout(Duration::from_secs(self.probe_timeout_secs))
            .send()
            .await
        {
            Ok(response) => ProbeOutcome::Status(response.status().as_u16()),
            Err(e) => ProbeOutcome::Unreachable(e.to_string()),
        }
    }
}

// ── Charset decoding ─────────────────────────────────────────────────────

static HEADER_CHARSET: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)charset\s*=\s*["']?([A-Za-z0-9._:-]+)"#).unwrap());

static META_CHARSET: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)<meta[^>]+charset\s*=\s*["']?\s*([A-Za-z0-9._:-]+)"#).unwrap()
});

/// Decode a fetched page to a `String`.
///
/// Returns the text and the encoding actually used.
pub fn decode_page(page: &FetchedPage) -> (String, &'static Encoding) {
    decode_html(&page.body, page.content_type.as_deref())
}

/// Decode HTML bytes, honouring BOM, header charset and `<meta>` charset in
/// that order. Unknown labels fall through to the next source.
pub fn decode_html(body: &[u8], content_type: Option<&str>) -> (String, &'static Encoding) {
    let encoding = Encoding::for_bom(body)
        .map(|(enc, _)| enc)
        .or_else(|| content_type.and_then(charset_from_header))
        .or_else(|| sniff_meta_charset(body))
        .unwrap_or(UTF_8);

    // `decode` strips a BOM if present and replaces malformed sequences.
    let (text, used, had_errors) = encoding.decode(body);
    if had_errors {
        debug!("Malformed {} sequences replaced while decoding", used.name());
    }
    (text.into_owned(), used)
}

fn charset_from_header(content_type: &str) -> Option<&'static Encoding> {
    HEADER_CHARSET
        .captures(content_type.as_bytes())
        .and_then(|c| c.get(1))
        .and_then(|m| Encoding::for_label(m.as_bytes()))
}

fn sniff_meta_charset(body: &[u8]) -> Option<&'static Encoding> {
    let head = &body[..body.len().min(META_SNIFF_LIMIT)];
    META_CHARSET
        .captures(head)
        .and_then(|c| c.get(1))
        .and_then(|m| Encoding::for_label(m.as_bytes()))
}
