//! Run entry points.
//!
//! ## Why one orchestrator?
//!
//! Extraction and assembly are strictly sequential and only the render stage
//! fans out. Keeping the whole run on one task means the progress callback,
//! the run workspace and the stage timings all have a single owner. The
//! workspace is a [`tempfile::TempDir`] held by [`run`], so rendered PDFs are
//! removed on success, on error and on panic alike.

use crate::backend::{ConversionBackend, ConvertApiBackend};
use crate::config::CollectionConfig;
use crate::error::CollectionError;
use crate::output::{suggested_file_name, CandidateLink, DocumentFormat, RunOutput, RunStats};
use crate::pipeline::fetch::{HttpFetcher, PageFetcher};
use crate::pipeline::{assemble, links, render};
use crate::progress::ProgressEvent;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};
use url::Url;

/// Convert every product linked from a listing page into one document.
///
/// This is the primary entry point for the library.
///
/// # Arguments
/// * `listing_url` — absolute http(s) URL of the collection page
/// * `config` — run configuration; must carry a backend or an API secret
///
/// # Returns
/// `Ok(RunOutput)` as soon as at least one product rendered. Products that
/// failed are listed in `output.failures`.
///
/// # Errors
/// Returns `Err(CollectionError)` only for fatal errors:
/// - invalid URL or missing backend (before any network I/O)
/// - listing page unreachable, or no product links on it
/// - every product failed to render
/// - merge or transcode rejected
pub async fn run(
    listing_url: impl AsRef<str>,
    config: &CollectionConfig,
) -> Result<RunOutput, CollectionError> {
    let total_start = Instant::now();
    let listing = parse_listing_url(listing_url.as_ref())?;
    info!("Starting run: {}", listing);

    // ── Step 1: Resolve collaborators ────────────────────────────────────
    let backend = resolve_backend(config)?;
    let fetcher = resolve_fetcher(config)?;

    if let Some(ref cb) = config.progress_callback {
        cb.on_run_start(listing.as_str());
    }

    // ── Step 2: Discover product links ───────────────────────────────────
    let discovery_start = Instant::now();
    let discovered = links::extract(&listing, fetcher.as_ref(), &config.patterns).await?;
    let discovery_ms = discovery_start.elapsed().as_millis() as u64;
    if discovered.is_empty() {
        return Err(CollectionError::NoLinksFound {
            url: listing.to_string(),
        });
    }
    let selected = discovered.len().min(config.max_products);
    if let Some(ref cb) = config.progress_callback {
        cb.on_links_discovered(discovered.len(), selected);
    }

    // ── Step 3: Render into a run-scoped workspace ───────────────────────
    let workspace = tempfile::Builder::new()
        .prefix("collection2doc-")
        .tempdir()
        .map_err(|e| CollectionError::Internal(format!("workspace: {e}")))?;
    debug!("Run workspace: {}", workspace.path().display());

    let conversion_start = Instant::now();
    let batch = render::convert_all(
        &discovered,
        config,
        workspace.path(),
        Arc::clone(&backend),
        Arc::clone(&fetcher),
    )
    .await?;
    let conversion_ms = conversion_start.elapsed().as_millis() as u64;

    // ── Step 4: Merge and transcode ──────────────────────────────────────
    if let Some(ref cb) = config.progress_callback {
        let msg = match config.output_format {
            DocumentFormat::Pdf => format!("Merging {} PDFs...", batch.successes.len()),
            target => format!(
                "Merging {} PDFs and converting to {}...",
                batch.successes.len(),
                target.extension().to_uppercase()
            ),
        };
        cb.on_notice(&ProgressEvent::new(batch.completed(), batch.total, msg));
    }
    let assembly_start = Instant::now();
    let artifact =
        assemble::assemble(&batch.successes, config.output_format, backend.as_ref()).await?;
    let assembly_ms = assembly_start.elapsed().as_millis() as u64;

    // ── Step 5: Stats ────────────────────────────────────────────────────
    let stats = RunStats {
        discovered: discovered.len(),
        dispatched: batch.total,
        succeeded: batch.successes.len(),
        failed: batch.failures.len(),
        discovery_ms,
        conversion_ms,
        assembly_ms,
        total_ms: total_start.elapsed().as_millis() as u64,
    };

    info!(
        "Run complete: {}/{} products, {} bytes of {}, {}ms total",
        stats.succeeded,
        stats.dispatched,
        artifact.bytes.len(),
        artifact.format,
        stats.total_ms
    );

    if let Some(ref cb) = config.progress_callback {
        cb.on_run_complete(stats.succeeded, stats.dispatched);
    }

    let dispatched: Vec<CandidateLink> = discovered.iter().take(batch.total).cloned().collect();
    Ok(RunOutput {
        suggested_file_name: suggested_file_name(&listing, artifact.format),
        artifact,
        discovered,
        dispatched,
        failures: batch.failures,
        stats,
    })
}

/// Run and write the final document directly to a file.
///
/// Uses atomic write (temp file + rename) to prevent partial files.
pub async fn run_to_file(
    listing_url: impl AsRef<str>,
    output_path: impl AsRef<Path>,
    config: &CollectionConfig,
) -> Result<RunOutput, CollectionError> {
    let output = run(listing_url, config).await?;
    let path = output_path.as_ref();
    let write_err = |e: std::io::Error| CollectionError::OutputWriteFailed {
        path: path.to_path_buf(),
        source: e,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }

    let tmp_path = path.with_extension(format!("{}.tmp", output.artifact.format.extension()));
    tokio::fs::write(&tmp_path, &output.artifact.bytes)
        .await
        .map_err(write_err)?;
    tokio::fs::rename(&tmp_path, path).await.map_err(write_err)?;

    info!("Wrote {}", path.display());
    Ok(output)
}

/// Synchronous wrapper around [`run`].
///
/// Creates a temporary tokio runtime internally.
pub fn run_sync(
    listing_url: impl AsRef<str>,
    config: &CollectionConfig,
) -> Result<RunOutput, CollectionError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| CollectionError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(run(listing_url, config))
}

/// Fetch a listing page and return its candidate product links.
///
/// Does not require a conversion backend or API secret. An empty list is a
/// valid result here.
pub async fn discover(
    listing_url: impl AsRef<str>,
    config: &CollectionConfig,
) -> Result<Vec<CandidateLink>, CollectionError> {
    let listing = parse_listing_url(listing_url.as_ref())?;
    let fetcher = resolve_fetcher(config)?;
    links::extract(&listing, fetcher.as_ref(), &config.patterns).await
}

// ── Internal helpers ─────────────────────────────────────────────────────

/// Accept only absolute http(s) URLs with a host.
pub fn parse_listing_url(input: &str) -> Result<Url, CollectionError> {
    let invalid = |reason: &str| CollectionError::InvalidUrl {
        input: input.to_string(),
        reason: reason.to_string(),
    };
    let url = Url::parse(input.trim()).map_err(|e| invalid(&e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid("scheme must be http or https"));
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(invalid("URL has no host"));
    }
    Ok(url)
}

/// Resolve the conversion backend, from most-specific to least-specific.
///
/// 1. **Pre-built backend** (`config.backend`) — used as-is. This is how
///    tests and embedders bring their own implementation.
/// 2. **API secret** (`config.api_secret`) — builds a [`ConvertApiBackend`]
///    against `config.api_base_url`.
///
/// There is no environment lookup here; the CLI maps `CONVERTAPI_SECRET`
/// onto the secret before the config is built.
fn resolve_backend(config: &CollectionConfig) -> Result<Arc<dyn ConversionBackend>, CollectionError> {
    if let Some(ref backend) = config.backend {
        return Ok(Arc::clone(backend));
    }

    match config.api_secret.as_deref().map(str::trim) {
        Some(secret) if !secret.is_empty() => {
            let backend = ConvertApiBackend::new(&config.api_base_url, secret)
                .map_err(|e| CollectionError::Internal(format!("backend client: {e}")))?;
            Ok(Arc::new(backend))
        }
        _ => Err(CollectionError::BackendNotConfigured {
            hint: "Set an API secret (--api-secret or CONVERTAPI_SECRET) or inject a backend \
                   with CollectionConfigBuilder::backend()."
                .to_string(),
        }),
    }
}

fn resolve_fetcher(config: &CollectionConfig) -> Result<Arc<dyn PageFetcher>, CollectionError> {
    if let Some(ref fetcher) = config.fetcher {
        return Ok(Arc::clone(fetcher));
    }
    let fetcher = HttpFetcher::new(
        &config.user_agent,
        config.fetch_timeout_secs,
        config.probe_timeout_secs,
    )?;
    Ok(Arc::new(fetcher))
}
