//! Pipeline stages for listing-to-document conversion.
//!
//! Each submodule implements exactly one step and is testable on its own
//! with an injected fetcher or backend.
//!
//! ## Data Flow
//!
//! ```text
//! fetch ──▶ links ──▶ render ──▶ assemble
//! (listing)  (heuristic) (web→pdf)  (merge, pdf→docx)
//! ```
//!
//! 1. [`fetch`]    — GET the listing page, decode its charset; HEAD probes
//! 2. [`links`]    — pattern strategy, then fallback; sorted and deduplicated
//! 3. [`render`]   — bounded-concurrency remote renders into the run workspace;
//!    the only stage that runs tasks in parallel
//! 4. [`assemble`] — ordered merge of every successful render, then an
//!    optional transcode

pub mod assemble;
pub mod fetch;
pub mod links;
pub mod render;
