//! # collection2doc
//!
//! Turn an e-commerce collection page into a single PDF or Word document
//! with one section per product.
//!
//! ## Why this crate?
//!
//! Catalogue exports are usually screenshots pasted by hand. This crate
//! finds the product pages linked from a listing page, has a hosted
//! rendering service print each one as a browser would, and merges the
//! results in a stable order. Dozens of pages render in parallel while the
//! number of simultaneous backend calls stays fixed.
//!
//! ## Pipeline Overview
//!
//! ```text
//! listing URL
//!  │
//!  ├─ 1. Fetch     GET the listing page, decode its charset
//!  ├─ 2. Discover  pattern strategy, fallback strategy; sort + dedup
//!  ├─ 3. Render    web→PDF per product, bounded by a permit pool
//!  ├─ 4. Merge     every successful PDF in sequence order
//!  └─ 5. Transcode PDF→DOCX (optional)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use collection2doc::{run_to_file, CollectionConfig, DocumentFormat};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = CollectionConfig::builder()
//!         .api_secret(std::env::var("CONVERTAPI_SECRET")?)
//!         .output_format(DocumentFormat::Pdf)
//!         .max_products(20)
//!         .build()?;
//!     let output = run_to_file(
//!         "https://www.havnstore.com/collections/satisfy",
//!         "satisfy.pdf",
//!         &config,
//!     )
//!     .await?;
//!     eprintln!(
//!         "{}/{} products, {} failed",
//!         output.stats.succeeded, output.stats.dispatched, output.stats.failed
//!     );
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `collection2doc` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library to avoid pulling in CLI-only deps:
//! ```toml
//! collection2doc = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod backend;
pub mod config;
pub mod convert;
pub mod error;
pub mod output;
pub mod patterns;
pub mod pipeline;
pub mod progress;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use backend::{ConversionBackend, ConvertApiBackend, NamedDocument, RenderRequest};
pub use config::{CollectionConfig, CollectionConfigBuilder, RenderOptions};
pub use convert::{discover, run, run_sync, run_to_file};
pub use error::{BackendError, CollectionError, RenderError};
pub use output::{
    CandidateLink, ConversionBatch, DiscoveryStrategy, DocumentFormat, FinalArtifact,
    RenderFailure, RenderedArtifact, RunOutput, RunStats,
};
pub use patterns::ProductPatterns;
pub use pipeline::fetch::{FetchedPage, HttpFetcher, PageFetcher, ProbeOutcome};
pub use progress::{NoopProgressCallback, ProgressCallback, ProgressEvent, RunProgressCallback};
