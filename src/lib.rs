// src/lib.rs
// Public library surface for the `digest` binary and integration tests.

pub mod annotate;
pub mod config;
pub mod ingest;
pub mod pipeline;
pub mod report;

// ---- Re-exports for stable public API ----
pub use crate::annotate::{AnnotateError, AnnotationClient, Annotator, Lang};
pub use crate::config::DigestConfig;
pub use crate::ingest::types::{FeedTransport, Item, Source};
pub use crate::pipeline::{run, AnnotatedItem, DigestError, DigestOutcome, PipelineOptions, RunStats};
