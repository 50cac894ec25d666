//! Bounded-concurrency rendering of product pages.
//!
//! ## Scheduling
//!
//! Every task is spawned onto a [`JoinSet`] up front, but each one must take
//! a permit from a shared [`Semaphore`] before it touches the network. The
//! permit pool, not the task count, bounds how many backend calls are in
//! flight at once.
//!
//! ## Ordering
//!
//! Tasks finish in arbitrary order. Each one sends its [`ConversionResult`]
//! over a channel that only the calling task drains, so progress callbacks
//! never run inside a worker. Order is restored exactly once, by sequence
//! index, in [`ConversionBatch::finish`].
//!
//! ## Failures
//!
//! A failed probe, backend error, write error or even a panic is recorded
//! against its own index and never disturbs the other tasks. The batch fails
//! only when nothing rendered.

use crate::backend::{ConversionBackend, RenderRequest};
use crate::config::{CollectionConfig, RenderOptions};
use crate::error::{CollectionError, RenderError};
use crate::output::{
    CandidateLink, ConversionBatch, ConversionResult, ConversionTask, RenderFailure,
    RenderedArtifact,
};
use crate::pipeline::fetch::{PageFetcher, ProbeOutcome};
use crate::progress::ProgressEvent;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use url::Url;

/// Failures listed individually before the "... and N more" summary.
pub const FAILURE_PREVIEW_LIMIT: usize = 10;

const MAX_SLUG_LEN: usize = 60;

static RE_UNSAFE_FILENAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^A-Za-z0-9._-]+").unwrap());

/// Everything a render task needs, shared by all tasks of a run.
struct TaskContext {
    backend: Arc<dyn ConversionBackend>,
    fetcher: Arc<dyn PageFetcher>,
    options: RenderOptions,
    workspace: PathBuf,
    preflight_check: bool,
}

/// Cap the sorted link list and assign 1-based sequence indices.
pub fn plan_tasks(links: &[CandidateLink], cap: usize) -> Vec<ConversionTask> {
    links
        .iter()
        .take(cap)
        .cloned()
        .enumerate()
        .map(|(i, link)| ConversionTask { index: i + 1, link })
        .collect()
}

/// Render every link (up to `config.max_products`) into `workspace`.
///
/// # Errors
/// [`CollectionError::NoArtifacts`] when every task failed. Individual
/// failures are returned inside the batch.
pub async fn convert_all(
    links: &[CandidateLink],
    config: &CollectionConfig,
    workspace: &Path,
    backend: Arc<dyn ConversionBackend>,
    fetcher: Arc<dyn PageFetcher>,
) -> Result<ConversionBatch, CollectionError> {
    let tasks = plan_tasks(links, config.max_products);
    let total = tasks.len();

    if links.len() > total {
        let msg = format!(
            "Found {} products; converting the first {} (max products limit)",
            links.len(),
            total
        );
        info!("{}", msg);
        if let Some(ref cb) = config.progress_callback {
            cb.on_notice(&ProgressEvent::new(0, total, msg));
        }
    }

    info!(
        "Rendering {} product pages with {} concurrent backend calls",
        total, config.concurrency
    );
    let start = Instant::now();

    let ctx = Arc::new(TaskContext {
        backend,
        fetcher,
        options: config.render.clone(),
        workspace: workspace.to_path_buf(),
        preflight_check: config.preflight_check,
    });
    // `build()` clamps this, but the fields are public.
    let permits = Arc::new(Semaphore::new(config.concurrency.max(1)));
    let (tx, mut rx) = mpsc::unbounded_channel::<ConversionResult>();
    let mut workers = JoinSet::new();
    let mut task_of: HashMap<tokio::task::Id, &ConversionTask> = HashMap::with_capacity(total);

    for planned in &tasks {
        let task = planned.clone();
        let ctx = Arc::clone(&ctx);
        let permits = Arc::clone(&permits);
        let tx = tx.clone();
        let handle = workers.spawn(async move {
            // The semaphore is never closed, so acquire only fails if it
            // was; in that case run unbounded rather than drop the task.
            let _permit = permits.acquire_owned().await.ok();
            let result = render_task(task, &ctx).await;
            let _ = tx.send(result);
        });
        task_of.insert(handle.id(), planned);
    }
    drop(tx);

    let mut batch = ConversionBatch::new(total);
    while let Some(result) = rx.recv().await {
        record(&mut batch, result, config);
    }

    // Every sender is gone, so every task has finished. A task that
    // panicked never sent a result; its join error carries its task id.
    let mut seen: HashSet<usize> = batch
        .successes
        .iter()
        .map(|a| a.index)
        .chain(batch.failures.iter().map(|f| f.index))
        .collect();
    while let Some(joined) = workers.join_next().await {
        let Err(e) = joined else { continue };
        warn!("Render task aborted: {}", e);
        let Some(task) = task_of.get(&e.id()) else { continue };
        if !seen.insert(task.index) {
            continue;
        }
        let failure = ConversionResult::Failure(RenderFailure {
            index: task.index,
            url: task.link.to_string(),
            error: RenderError::TaskPanicked {
                detail: e.to_string(),
            },
        });
        record(&mut batch, failure, config);
    }

    batch.finish();

    info!(
        "Rendered {}/{} product pages in {}ms",
        batch.successes.len(),
        total,
        start.elapsed().as_millis()
    );

    if !batch.failures.is_empty() {
        let preview = batch.failure_preview(FAILURE_PREVIEW_LIMIT);
        let msg = format!(
            "{} conversion failures:\n{}",
            batch.failures.len(),
            preview.join("\n")
        );
        if let Some(ref cb) = config.progress_callback {
            cb.on_notice(&ProgressEvent::new(batch.completed(), total, msg));
        }
    }

    batch.ensure_any_success()?;
    Ok(batch)
}

/// Append one outcome and report it. Runs on the draining task only.
fn record(batch: &mut ConversionBatch, result: ConversionResult, config: &CollectionConfig) {
    let index = result.index();
    let total = batch.total;
    let is_success = matches!(result, ConversionResult::Success(_));
    let message = match &result {
        ConversionResult::Success(_) => format!("Converted product {}/{}", index, total),
        ConversionResult::Failure(f) => {
            warn!("Product {} ({}) failed: {}", index, f.url, f.error);
            format!("Failed product {}/{}: {}", index, total, f.error)
        }
    };
    batch.push(result);

    if let Some(ref cb) = config.progress_callback {
        let event = ProgressEvent::new(batch.completed(), total, message).for_index(index);
        if is_success {
            cb.on_task_complete(&event);
        } else {
            cb.on_task_error(&event);
        }
    }
}

/// Probe, render and save one product page.
async fn render_task(task: ConversionTask, ctx: &TaskContext) -> ConversionResult {
    let index = task.index;
    let url = task.link.to_string();
    let fail = |error: RenderError| {
        ConversionResult::Failure(RenderFailure {
            index,
            url: url.clone(),
            error,
        })
    };

    if ctx.preflight_check {
        match ctx.fetcher.probe(&task.link.url).await {
            ProbeOutcome::Status(200) => {}
            ProbeOutcome::Status(status) => return fail(RenderError::SourceStatus { status }),
            ProbeOutcome::Unreachable(detail) => {
                return fail(RenderError::SourceUnreachable { detail })
            }
        }
    }

    let request = RenderRequest {
        url: url.clone(),
        options: ctx.options.clone(),
    };
    let bytes = match ctx.backend.render(&request).await {
        Ok(bytes) if bytes.is_empty() => {
            return fail(RenderError::Backend {
                detail: "backend returned an empty document".into(),
            })
        }
        Ok(bytes) => bytes,
        Err(e) => return fail(e.into()),
    };

    let path = ctx.workspace.join(artifact_file_name(index, &task.link.url));
    if let Err(e) = tokio::fs::write(&path, &bytes).await {
        return fail(RenderError::Io {
            detail: e.to_string(),
        });
    }
    debug!("Product {} → {} ({} bytes)", index, path.display(), bytes.len());

    ConversionResult::Success(RenderedArtifact {
        index,
        url,
        path,
        size_bytes: bytes.len() as u64,
    })
}

/// `{index:03}_{slug}.pdf`, where the slug is the last path segment.
pub fn artifact_file_name(index: usize, url: &Url) -> String {
    let last = url
        .path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
        .unwrap_or("");
    let slug = RE_UNSAFE_FILENAME.replace_all(last, "_");
    let slug: String = slug
        .trim_matches(|c: char| c == '_' || c == '.')
        .chars()
        .take(MAX_SLUG_LEN)
        .collect();
    let slug = if slug.is_empty() { "product".to_string() } else { slug };
    format!("{:03}_{}.pdf", index, slug)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::DiscoveryStrategy;

    fn links(n: usize) -> Vec<CandidateLink> {
        (1..=n)
            .map(|i| {
                CandidateLink::new(
                    Url::parse(&format!("https://shop.test/products/p{i:02}")).unwrap(),
                    DiscoveryStrategy::Pattern,
                )
            })
            .collect()
    }

    #[test]
    fn plan_assigns_one_based_indices() {
        let tasks = plan_tasks(&links(3), 10);
        let indices: Vec<usize> = tasks.iter().map(|t| t.index).collect();
        assert_eq!(indices, vec![1, 2, 3]);
    }

    #[test]
    fn plan_truncates_to_first_cap() {
        let tasks = plan_tasks(&links(5), 3);
        assert_eq!(tasks.len(), 3);
        assert_eq!(tasks[2].link.as_str(), "https://shop.test/products/p03");
    }

    #[test]
    fn file_name_uses_last_segment() {
        let url = Url::parse("https://shop.test/products/blue-shirt/").unwrap();
        assert_eq!(artifact_file_name(7, &url), "007_blue-shirt.pdf");
    }

    #[test]
    fn file_name_sanitises_non_ascii() {
        let url = Url::parse("https://shop.test/goods/상품 1").unwrap();
        let name = artifact_file_name(12, &url);
        assert!(name.starts_with("012_"));
        assert!(name.ends_with(".pdf"));
        assert!(name.chars().all(|c| c.is_ascii_alphanumeric() || "._-".contains(c)));
    }

    #[test]
    fn file_name_falls_back_for_query_only_urls() {
        let url = Url::parse("https://shop.test/?product_no=3").unwrap();
        assert_eq!(artifact_file_name(1, &url), "001_product.pdf");
    }
}
