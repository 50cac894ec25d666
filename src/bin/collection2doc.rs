//! CLI binary for collection2doc.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `CollectionConfig` and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use collection2doc::config::DEFAULT_API_BASE_URL;
use collection2doc::convert::parse_listing_url;
use collection2doc::output::suggested_file_name;
use collection2doc::pipeline::render::FAILURE_PREVIEW_LIMIT;
use collection2doc::{
    discover, run_to_file, CollectionConfig, DocumentFormat, ProgressCallback, ProgressEvent,
    RunProgressCallback,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: a live progress bar plus one log line per
/// product. Products complete out of order, so lines carry their index.
struct CliProgressCallback {
    bar: ProgressBar,
    /// Wall-clock start of the run, taken before discovery.
    started: Instant,
    /// Count of products that failed.
    errors: AtomicUsize,
}

impl CliProgressCallback {
    /// Spinner only until `on_links_discovered` tells us the total.
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(0);

        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Discovering");
        bar.set_message("Reading listing page…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            started: Instant::now(),
            errors: AtomicUsize::new(0),
        })
    }

    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} products  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Rendering");
        self.bar.reset_eta();
    }

    /// Stop the ticker and clear the bar when the run fails before
    /// `on_run_complete`.
    fn abandon(&self) {
        if !self.bar.is_finished() {
            self.bar.finish_and_clear();
        }
    }

    fn elapsed(&self) -> String {
        dim(&format!("{:.1}s", self.started.elapsed().as_secs_f64()))
    }
}

impl RunProgressCallback for CliProgressCallback {
    fn on_run_start(&self, listing_url: &str) {
        self.bar.set_message(listing_url.to_string());
    }

    fn on_links_discovered(&self, found: usize, selected: usize) {
        self.activate_bar(selected);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Found {found} products, converting {selected}…"))
        ));
    }

    fn on_task_complete(&self, event: &ProgressEvent) {
        self.bar.println(format!(
            "  {} Product {:>3}/{:<3}  {}",
            green("✓"),
            event.index.unwrap_or(event.completed),
            event.total,
            self.elapsed(),
        ));
        self.bar.set_position(event.completed as u64);
    }

    fn on_task_error(&self, event: &ProgressEvent) {
        self.errors.fetch_add(1, Ordering::SeqCst);

        // Keep long backend messages on one line.
        let msg: String = if event.message.chars().count() > 80 {
            let head: String = event.message.chars().take(79).collect();
            format!("{head}\u{2026}")
        } else {
            event.message.clone()
        };

        self.bar.println(format!(
            "  {} Product {:>3}/{:<3}  {}  {}",
            red("✗"),
            event.index.unwrap_or(event.completed),
            event.total,
            red(&msg),
            self.elapsed(),
        ));
        self.bar.set_position(event.completed as u64);
    }

    fn on_notice(&self, event: &ProgressEvent) {
        let mut lines = event.message.lines();
        if let Some(first) = lines.next() {
            self.bar.println(format!("{} {}", cyan("◆"), first));
        }
        for line in lines {
            self.bar.println(format!("    {}", dim(line)));
        }
        if event.message.starts_with("Merging") {
            self.bar.set_prefix("Assembling");
        }
    }

    fn on_run_complete(&self, succeeded: usize, total: usize) {
        let failed = total.saturating_sub(succeeded);
        self.bar.finish_and_clear();

        if failed == 0 {
            eprintln!(
                "{} {} products converted successfully",
                green("✔"),
                bold(&succeeded.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} products converted  ({} failed)",
                cyan("⚠"),
                bold(&succeeded.to_string()),
                total,
                red(&self.errors.load(Ordering::SeqCst).to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Word document named after the collection (havnstore_satisfy_products.docx)
  collection2doc https://www.havnstore.com/collections/satisfy

  # PDF to a chosen path
  collection2doc https://shop.example.com/collections/new --format pdf -o new.pdf

  # Only the first 20 products, 5 renders at a time
  collection2doc https://shop.example.com/collections/all --max-products 20 -c 5

  # List the product links that would be converted (no API secret needed)
  collection2doc --discover-only https://shop.example.com/collections/all

  # Give slow client-rendered pages more time
  collection2doc --settle-delay 5 --render-timeout 60 https://shop.example.kr/category/list.html?cate_no=42

DISCOVERY:
  Links are kept when they point to the same host and their path contains a
  product marker (/products/, /product/, /item/, /items/, /goods/, /shop/view)
  or their query carries a storefront key (product_no, goodsNo, branduid,
  itemId, item_id, productId, product_id, pid). If nothing matches, image
  links and links inside product-like containers are used instead.

ENVIRONMENT VARIABLES:
  CONVERTAPI_SECRET             ConvertAPI secret (same as --api-secret)
  COLLECTION2DOC_API_BASE_URL   Override the ConvertAPI endpoint
  COLLECTION2DOC_FORMAT         Default output format (pdf, docx)
  COLLECTION2DOC_CONCURRENCY    Default number of concurrent renders
  RUST_LOG                      Override the log filter

SETUP:
  1. Set API secret:  export CONVERTAPI_SECRET=...
  2. Convert:         collection2doc https://shop.example.com/collections/all
"#;

/// Convert every product on a collection page into one PDF or Word document.
#[derive(Parser, Debug)]
#[command(
    name = "collection2doc",
    version,
    about = "Convert every product on a collection page into one PDF or Word document",
    long_about = "Fetch an e-commerce collection page, discover its product links, render each \
product page to PDF through ConvertAPI, and merge the results in a stable order. The merged PDF \
can optionally be converted to a Word document.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Collection (listing) page URL.
    url: String,

    /// Write the document here instead of the suggested file name.
    #[arg(short, long, env = "COLLECTION2DOC_OUTPUT")]
    output: Option<PathBuf>,

    /// Output format.
    #[arg(long, env = "COLLECTION2DOC_FORMAT", value_enum, default_value = "docx")]
    format: FormatArg,

    /// Maximum number of products to convert.
    #[arg(long, env = "COLLECTION2DOC_MAX_PRODUCTS", default_value_t = 100,
          value_parser = clap::value_parser!(u32).range(1..))]
    max_products: u32,

    /// Number of concurrent render calls (1–64).
    #[arg(short, long, env = "COLLECTION2DOC_CONCURRENCY", default_value_t = 20,
          value_parser = clap::value_parser!(u32).range(1..=64))]
    concurrency: u32,

    /// Paper size passed to the renderer.
    #[arg(long, env = "COLLECTION2DOC_PAGE_SIZE", default_value = "a4")]
    page_size: String,

    /// Margin on every side, in millimetres.
    #[arg(long, env = "COLLECTION2DOC_MARGIN", default_value_t = 10)]
    margin: u32,

    /// Seconds to wait after page load before rendering.
    #[arg(long, env = "COLLECTION2DOC_SETTLE_DELAY", default_value_t = 2)]
    settle_delay: u32,

    /// Backend-side render timeout in seconds.
    #[arg(long, env = "COLLECTION2DOC_RENDER_TIMEOUT", default_value_t = 30)]
    render_timeout: u64,

    /// Do not ask the renderer to load lazy / client-rendered content.
    #[arg(long)]
    no_wait_dynamic: bool,

    /// Skip the HEAD check against each product page.
    #[arg(long)]
    no_preflight: bool,

    /// ConvertAPI secret.
    #[arg(long, env = "CONVERTAPI_SECRET", hide_env_values = true)]
    api_secret: Option<String>,

    /// ConvertAPI base URL.
    #[arg(long, env = "COLLECTION2DOC_API_BASE_URL", default_value = DEFAULT_API_BASE_URL)]
    api_base_url: String,

    /// Listing page fetch timeout in seconds.
    #[arg(long, env = "COLLECTION2DOC_FETCH_TIMEOUT", default_value_t = 30)]
    fetch_timeout: u64,

    /// Print the discovered product links and exit.
    #[arg(long)]
    discover_only: bool,

    /// Output structured JSON (RunOutput or the link list) on stdout.
    #[arg(long, env = "COLLECTION2DOC_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "COLLECTION2DOC_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "COLLECTION2DOC_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "COLLECTION2DOC_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum FormatArg {
    Pdf,
    Docx,
}

impl From<FormatArg> for DocumentFormat {
    fn from(v: FormatArg) -> Self {
        match v {
            FormatArg::Pdf => DocumentFormat::Pdf,
            FormatArg::Docx => DocumentFormat::Docx,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs when the progress bar is active;
    // the bar provides all the feedback that matters to the user.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !cli.discover_only;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let listing = parse_listing_url(&cli.url).context("Invalid listing URL")?;

    // ── Discover-only mode ───────────────────────────────────────────────
    if cli.discover_only {
        let config = build_config(&cli, None)?;
        let links = discover(listing.as_str(), &config)
            .await
            .context("Failed to discover product links")?;

        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&links).context("Failed to serialise links")?
            );
        } else {
            for link in &links {
                println!("{link}");
            }
            if !cli.quiet {
                let capped = links.len().min(cli.max_products as usize);
                eprintln!(
                    "{} product links found ({} would be converted)",
                    bold(&links.len().to_string()),
                    capped
                );
            }
        }
        return Ok(());
    }

    // ── Build config ─────────────────────────────────────────────────────
    let cli_progress = show_progress.then(CliProgressCallback::new_dynamic);
    let progress_cb: Option<ProgressCallback> = cli_progress
        .clone()
        .map(|cb| cb as Arc<dyn RunProgressCallback>);

    let config = build_config(&cli, progress_cb)?;
    let output_path = cli
        .output
        .clone()
        .unwrap_or_else(|| PathBuf::from(suggested_file_name(&listing, config.output_format)));

    // ── Run ──────────────────────────────────────────────────────────────
    let result = run_to_file(listing.as_str(), &output_path, &config).await;
    if let (Err(_), Some(cb)) = (&result, &cli_progress) {
        cb.abandon();
    }
    let output = result.context("Conversion failed")?;

    if cli.json {
        let json = serde_json::to_string_pretty(&output).context("Failed to serialise output")?;
        println!("{json}");
    }

    if cli.quiet {
        return Ok(());
    }

    // The progress callback already printed per-product lines and the
    // failure preview; without it, print the preview here.
    if !show_progress && !output.failures.is_empty() {
        eprintln!("{} conversion failures:", output.failures.len());
        for failure in output.failures.iter().take(FAILURE_PREVIEW_LIMIT) {
            eprintln!("  {failure}");
        }
        if output.failures.len() > FAILURE_PREVIEW_LIMIT {
            eprintln!(
                "  ... and {} more",
                output.failures.len() - FAILURE_PREVIEW_LIMIT
            );
        }
    }

    let stats = &output.stats;
    eprintln!(
        "{}  {}/{} products  {}ms  →  {}",
        if stats.failed == 0 {
            green("✔")
        } else {
            cyan("⚠")
        },
        stats.succeeded,
        stats.dispatched,
        stats.total_ms,
        bold(&output_path.display().to_string()),
    );
    if stats.discovered > stats.dispatched {
        eprintln!(
            "   {} more products were found but not converted (--max-products {})",
            dim(&(stats.discovered - stats.dispatched).to_string()),
            cli.max_products
        );
    }

    Ok(())
}

/// Map CLI args to `CollectionConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<CollectionConfig> {
    let mut builder = CollectionConfig::builder()
        .max_products(cli.max_products as usize)
        .concurrency(cli.concurrency as usize)
        .output_format(cli.format.into())
        .page_size(cli.page_size.clone())
        .margin_mm(cli.margin)
        .settle_delay_secs(cli.settle_delay)
        .render_timeout_secs(cli.render_timeout)
        .wait_for_dynamic_content(!cli.no_wait_dynamic)
        .preflight_check(!cli.no_preflight)
        .fetch_timeout_secs(cli.fetch_timeout)
        .api_base_url(cli.api_base_url.clone());

    if let Some(ref secret) = cli.api_secret {
        builder = builder.api_secret(secret.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn abandon_finishes_the_bar() {
        let cb = CliProgressCallback::new_dynamic();
        cb.on_links_discovered(3, 3);
        assert!(!cb.bar.is_finished());

        cb.abandon();
        assert!(cb.bar.is_finished());
        // A second call is harmless.
        cb.abandon();
    }

    #[test]
    fn completed_run_leaves_nothing_to_abandon() {
        let cb = CliProgressCallback::new_dynamic();
        cb.on_run_complete(2, 2);
        assert!(cb.bar.is_finished());
        cb.abandon();
    }
}
