//! Configuration types for a collection run.
//!
//! All run behaviour is controlled through [`CollectionConfig`], built via its
//! [`CollectionConfigBuilder`]. Collaborators (backend, page fetcher, progress
//! callback) and credentials are injected here; the library never reads
//! environment variables on its own.

use crate::backend::ConversionBackend;
use crate::error::CollectionError;
use crate::output::DocumentFormat;
use crate::patterns::ProductPatterns;
use crate::pipeline::fetch::PageFetcher;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Browser-like identity sent with every listing and probe request.
///
/// Many storefronts serve a bot wall or an empty shell to unknown agents.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

/// Default ConvertAPI endpoint.
pub const DEFAULT_API_BASE_URL: &str = "https://v2.convertapi.com";

/// Upper bound for the render permit pool.
pub const MAX_CONCURRENCY: usize = 64;

/// Configuration for one collection-to-document run.
///
/// # Example
/// ```rust
/// use collection2doc::{CollectionConfig, DocumentFormat};
///
/// let config = CollectionConfig::builder()
///     .max_products(25)
///     .concurrency(10)
///     .output_format(DocumentFormat::Pdf)
///     .api_secret("secret")
///     .build()
///     .unwrap();
/// assert_eq!(config.max_products, 25);
/// ```
#[derive(Clone)]
pub struct CollectionConfig {
    /// Maximum number of products rendered per run. Default: 100.
    ///
    /// Links beyond the cap are dropped from the end of the sorted list, so
    /// the same page always yields the same subset.
    pub max_products: usize,

    /// Size of the render permit pool. Range: 1–64. Default: 20.
    ///
    /// Bounds simultaneous outbound calls to the conversion backend no matter
    /// how many products were found. Lower it if the backend starts answering
    /// with quota or rate-limit errors.
    pub concurrency: usize,

    /// Final document format. Default: [`DocumentFormat::Docx`].
    pub output_format: DocumentFormat,

    /// Options forwarded to every render call.
    pub render: RenderOptions,

    /// Product-page signals for the link extractor.
    pub patterns: ProductPatterns,

    /// Listing-page fetch timeout in seconds. Default: 30.
    pub fetch_timeout_secs: u64,

    /// Pre-flight probe timeout in seconds. Default: 10.
    pub probe_timeout_secs: u64,

    /// Send a HEAD request to each product page before rendering. Default: true.
    ///
    /// A product page that is not reachable with status 200 is recorded as a
    /// failure without spending a backend call on it.
    pub preflight_check: bool,

    /// `User-Agent` header for listing fetches and probes.
    pub user_agent: String,

    /// Base URL of the ConvertAPI service.
    pub api_base_url: String,

    /// ConvertAPI secret. Used only when no `backend` is injected.
    pub api_secret: Option<String>,

    /// Pre-constructed backend. Takes precedence over `api_secret`.
    pub backend: Option<Arc<dyn ConversionBackend>>,

    /// Pre-constructed page fetcher. Default: reqwest-based `HttpFetcher`.
    pub fetcher: Option<Arc<dyn PageFetcher>>,

    /// Receives progress events. Only ever invoked from the orchestrating task.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            max_products: 100,
            concurrency: 20,
            output_format: DocumentFormat::default(),
            render: RenderOptions::default(),
            patterns: ProductPatterns::default(),
            fetch_timeout_secs: 30,
            probe_timeout_secs: 10,
            preflight_check: true,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            api_secret: None,
            backend: None,
            fetcher: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for CollectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectionConfig")
            .field("max_products", &self.max_products)
            .field("concurrency", &self.concurrency)
            .field("output_format", &self.output_format)
            .field("render", &self.render)
            .field("patterns", &self.patterns)
            .field("fetch_timeout_secs", &self.fetch_timeout_secs)
            .field("probe_timeout_secs", &self.probe_timeout_secs)
            .field("preflight_check", &self.preflight_check)
            .field("api_base_url", &self.api_base_url)
            .field("api_secret", &self.api_secret.as_ref().map(|_| "<redacted>"))
            .field("backend", &self.backend.as_ref().map(|_| "<dyn ConversionBackend>"))
            .field("fetcher", &self.fetcher.as_ref().map(|_| "<dyn PageFetcher>"))
            .finish()
    }
}

impl CollectionConfig {
    /// Create a new builder for `CollectionConfig`.
    pub fn builder() -> CollectionConfigBuilder {
        CollectionConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`CollectionConfig`].
#[derive(Debug)]
pub struct CollectionConfigBuilder {
    config: CollectionConfig,
}

impl CollectionConfigBuilder {
    pub fn max_products(mut self, n: usize) -> Self {
        self.config.max_products = n.max(1);
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.clamp(1, MAX_CONCURRENCY);
        self
    }

    pub fn output_format(mut self, format: DocumentFormat) -> Self {
        self.config.output_format = format;
        self
    }

    pub fn render(mut self, options: RenderOptions) -> Self {
        self.config.render = options;
        self
    }

    pub fn page_size(mut self, size: impl Into<String>) -> Self {
        self.config.render.page_size = size.into();
        self
    }

    pub fn margin_mm(mut self, mm: u32) -> Self {
        self.config.render.margin_mm = mm;
        self
    }

    pub fn wait_for_dynamic_content(mut self, v: bool) -> Self {
        self.config.render.wait_for_dynamic_content = v;
        self
    }

    pub fn settle_delay_secs(mut self, secs: u32) -> Self {
        self.config.render.settle_delay_secs = secs;
        self
    }

    pub fn render_timeout_secs(mut self, secs: u64) -> Self {
        self.config.render.timeout_secs = secs.max(1);
        self
    }

    pub fn patterns(mut self, patterns: ProductPatterns) -> Self {
        self.config.patterns = patterns;
        self
    }

    pub fn fetch_timeout_secs(mut self, secs: u64) -> Self {
        self.config.fetch_timeout_secs = secs.max(1);
        self
    }

    pub fn probe_timeout_secs(mut self, secs: u64) -> Self {
        self.config.probe_timeout_secs = secs.max(1);
        self
    }

    pub fn preflight_check(mut self, v: bool) -> Self {
        self.config.preflight_check = v;
        self
    }

    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.config.user_agent = ua.into();
        self
    }

    pub fn api_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.api_base_url = url.into();
        self
    }

    pub fn api_secret(mut self, secret: impl Into<String>) -> Self {
        self.config.api_secret = Some(secret.into());
        self
    }

    pub fn backend(mut self, backend: Arc<dyn ConversionBackend>) -> Self {
        self.config.backend = Some(backend);
        self
    }

    pub fn fetcher(mut self, fetcher: Arc<dyn PageFetcher>) -> Self {
        self.config.fetcher = Some(fetcher);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<CollectionConfig, CollectionError> {
        let c = &self.config;
        if c.max_products == 0 {
            return Err(CollectionError::InvalidConfig(
                "max_products must be ≥ 1".into(),
            ));
        }
        if c.concurrency == 0 || c.concurrency > MAX_CONCURRENCY {
            return Err(CollectionError::InvalidConfig(format!(
                "Concurrency must be 1–{}, got {}",
                MAX_CONCURRENCY, c.concurrency
            )));
        }
        if c.render.page_size.trim().is_empty() {
            return Err(CollectionError::InvalidConfig(
                "page_size must not be empty".into(),
            ));
        }
        if url::Url::parse(&c.api_base_url).is_err() {
            return Err(CollectionError::InvalidConfig(format!(
                "api_base_url is not a valid URL: '{}'",
                c.api_base_url
            )));
        }
        if c.patterns.path_markers.is_empty() && c.patterns.query_keys.is_empty() {
            return Err(CollectionError::InvalidConfig(
                "at least one path marker or query key is required".into(),
            ));
        }
        Ok(self.config)
    }
}

/// Options for the remote web-to-PDF render call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderOptions {
    /// Paper size name understood by the backend. Default: "a4".
    pub page_size: String,

    /// Margin on every side in millimetres. Default: 10.
    pub margin_mm: u32,

    /// Ask the backend to load lazy and client-rendered content. Default: true.
    pub wait_for_dynamic_content: bool,

    /// Seconds the backend waits after load before rasterising. Default: 2.
    ///
    /// There is no way to observe client-side rendering completion from
    /// here, so a fixed delay is the only option.
    pub settle_delay_secs: u32,

    /// Backend-side conversion timeout in seconds. Default: 30.
    pub timeout_secs: u64,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            page_size: "a4".to_string(),
            margin_mm: 10,
            wait_for_dynamic_content: true,
            settle_delay_secs: 2,
            timeout_secs: 30,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = CollectionConfig::default();
        assert_eq!(c.concurrency, 20);
        assert_eq!(c.output_format, DocumentFormat::Docx);
        assert_eq!(c.render.page_size, "a4");
        assert_eq!(c.render.margin_mm, 10);
        assert!(c.preflight_check);
    }

    #[test]
    fn builder_clamps() {
        let c = CollectionConfig::builder()
            .max_products(0)
            .concurrency(1000)
            .build()
            .unwrap();
        assert_eq!(c.max_products, 1);
        assert_eq!(c.concurrency, MAX_CONCURRENCY);
    }

    #[test]
    fn builder_rejects_bad_base_url() {
        let err = CollectionConfig::builder()
            .api_base_url("not a url")
            .build()
            .unwrap_err();
        assert!(matches!(err, CollectionError::InvalidConfig(_)));
    }

    #[test]
    fn builder_rejects_empty_patterns() {
        let err = CollectionConfig::builder()
            .patterns(ProductPatterns {
                path_markers: vec![],
                query_keys: vec![],
                vocabulary: vec!["product".into()],
            })
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("path marker"));
    }

    #[test]
    fn debug_redacts_secret() {
        let c = CollectionConfig::builder()
            .api_secret("sk-very-secret")
            .build()
            .unwrap();
        let dbg = format!("{c:?}");
        assert!(!dbg.contains("sk-very-secret"));
        assert!(dbg.contains("<redacted>"));
    }
}
