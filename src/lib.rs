//! # pagescribe
//!
//! Digitise scanned books: render PDF pages to images, then transcribe each
//! page image with a Vision Language Model (VLM) into a Markdown artifact
//! that records where it came from and what it cost.
//!
//! ## Why this crate?
//!
//! A book-length transcription is a long, paid, failure-prone batch job. A
//! provider hiccup on page 311 should not cost the first 310 pages, and the
//! operator should always know how much has been spent. Both stages therefore
//! run through one sequential [`BatchRunner`] that meters usage, writes each
//! output as soon as it exists, and on failure asks a [`FailureDecision`]
//! whether to skip the item or stop.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Range    validate the requested pages against the document
//!  ├─ 2. Plan     split the range into 5–25 page chunks (~20 calls)
//!  ├─ 3. Render   one pdfium / pdftoppm call per chunk → {stem}_pNNNN.png
//!  │
//! page images
//!  │
//!  ├─ 4. Encode     PNG → base64 ImageData
//!  ├─ 5. Recognize  one VLM call per image, instruction by page parity
//!  └─ 6. Artifact   provenance header + normalised body → {stem}.md
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pagescribe::{render_document, transcribe_images, AlwaysContinue, BatchConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = BatchConfig::builder()
//!         .image_dir("scans")
//!         .output_dir("transcripts")
//!         .on_failure(Arc::new(AlwaysContinue))
//!         .build()?;
//!
//!     let rendered = render_document("book.pdf", None, None, &config).await?;
//!     let report = transcribe_images(&rendered.outputs, &config).await?;
//!     eprintln!(
//!         "{} pages, {} in / {} out, ${:.4}",
//!         report.completed, report.totals.input_tokens, report.totals.output_tokens, report.cost_usd
//!     );
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pagescribe` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! pagescribe = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod artifact;
pub mod batch;
pub mod config;
pub mod convert;
pub mod error;
pub mod pipeline;
pub mod plan;
pub mod progress;
pub mod prompts;
pub mod range;
pub mod usage;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use artifact::{parse_artifact, Artifact, ArtifactHeader, ArtifactWriter};
pub use batch::{
    AbortAfter, AlwaysAbort, AlwaysContinue, BatchReport, BatchRunner, BatchState, Decision,
    FailureContext, FailureDecision, ItemFailure, Transcript, UnitOfWork, WorkOutput,
};
pub use config::{BatchConfig, BatchConfigBuilder, RendererBackend};
pub use convert::{
    render_document, render_document_with, resolve_provider, transcribe_images,
    transcribe_images_with,
};
pub use error::{ItemError, ScribeError};
pub use pipeline::recognize::{PageImage, Recognition, Recognizer, VisionRecognizer};
pub use pipeline::render::{PdfiumRenderer, PopplerRenderer, RenderOptions, Renderer};
pub use plan::ChunkPlan;
pub use progress::{BatchProgress, BatchProgressCallback, NoopProgressCallback, ProgressCallback};
pub use prompts::InstructionPolicy;
pub use range::PageRange;
pub use usage::{UsageRates, UsageRecord, UsageTotals};
