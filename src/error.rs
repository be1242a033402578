//! Error types for the pagescribe library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`ScribeError`] — **Fatal**: the run cannot proceed or was stopped
//!   (bad input file, invalid page range, nothing to do, user abort).
//!   Returned as `Err(ScribeError)` from the top-level entry points.
//!
//! * [`ItemError`] — **Recoverable**: a single work item failed (the renderer
//!   exited non-zero, the vision API rejected a request, an artifact could not
//!   be written). The batch runner hands it to the configured
//!   [`crate::batch::FailureDecision`], which either skips the item or turns
//!   the failure into [`ScribeError::BatchAborted`].

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the pagescribe library.
#[derive(Debug, Error)]
pub enum ScribeError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("Source file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    // ── Document errors ───────────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{path}' is corrupt: {detail}\nTry repairing with: qpdf --decrypt input.pdf output.pdf")]
    CorruptPdf { path: PathBuf, detail: String },

    /// PDF requires a password but none was provided.
    #[error("PDF '{path}' is encrypted and requires a password.\nProvide it with --password <PASSWORD>.")]
    PasswordRequired { path: PathBuf },

    /// A password was provided but it is wrong.
    #[error("Wrong password for PDF '{path}'")]
    WrongPassword { path: PathBuf },

    /// The renderer could not report how many pages the document has.
    #[error("Could not count the pages of '{path}': {detail}")]
    PageCountFailed { path: PathBuf, detail: String },

    // ── Batch errors ──────────────────────────────────────────────────────
    /// Requested page bounds are malformed or outside the document.
    #[error("Invalid page range (start={start:?}, end={end:?}, document has {total_pages} pages): {reason}")]
    InvalidRange {
        start: Option<i64>,
        end: Option<i64>,
        total_pages: usize,
        reason: String,
    },

    /// The batch was given zero items.
    #[error("Nothing to do: {0}")]
    NoWork(String),

    /// The operator chose to abort after an item failed.
    ///
    /// Items completed before the abort keep their outputs on disk. The
    /// token totals cover every call that returned, including one whose
    /// output could not be written.
    #[error(
        "Batch aborted after {completed}/{total} items: {elapsed_secs:.1}s elapsed, \
         {input_tokens} tokens in / {output_tokens} tokens out, ${cost_usd:.4} spent"
    )]
    BatchAborted {
        completed: usize,
        total: usize,
        elapsed_secs: f64,
        input_tokens: u64,
        output_tokens: u64,
        cost_usd: f64,
    },

    /// An artifact on disk does not start with a well-formed provenance header.
    #[error("Invalid artifact: {0}")]
    InvalidArtifact(String),

    // ── Provider errors ───────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Pdfium binding errors ─────────────────────────────────────────────
    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
You can:\n\
  • Set PDFIUM_LIB_PATH=/path/to/libpdfium to use an existing copy.\n\
  • Place libpdfium next to the working directory.\n\
  • Use the poppler backend instead: --backend poppler (needs pdftoppm/pdfinfo).\n"
    )]
    PdfiumBindingFailed(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A recoverable error for a single work item.
///
/// Both variants are handled identically by the batch runner: the failure is
/// reported together with the cumulative usage so far, then the configured
/// decision policy chooses between skipping the item and aborting the run.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
pub enum ItemError {
    /// The renderer or the recognition service failed for this item.
    ///
    /// `detail` carries the collaborator's own diagnostic text verbatim
    /// (e.g. the renderer's stderr).
    #[error("{item}: {detail}")]
    ExternalCall { item: String, detail: String },

    /// Reading an input image or writing an output file failed.
    #[error("Failed to access '{path}': {detail}")]
    Persistence { path: PathBuf, detail: String },
}

impl ItemError {
    pub fn external(item: impl Into<String>, detail: impl Into<String>) -> Self {
        ItemError::ExternalCall {
            item: item.into(),
            detail: detail.into(),
        }
    }

    pub fn persistence(path: impl Into<PathBuf>, detail: impl ToString) -> Self {
        ItemError::Persistence {
            path: path.into(),
            detail: detail.to_string(),
        }
    }

    /// `true` when the failure happened on the local filesystem rather than
    /// inside an external collaborator.
    pub fn is_persistence(&self) -> bool {
        matches!(self, ItemError::Persistence { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_aborted_display() {
        let e = ScribeError::BatchAborted {
            completed: 1,
            total: 3,
            elapsed_secs: 12.34,
            input_tokens: 1500,
            output_tokens: 800,
            cost_usd: 0.00047,
        };
        let msg = e.to_string();
        assert!(msg.contains("1/3"), "got: {msg}");
        assert!(msg.contains("12.3s"), "got: {msg}");
        assert!(msg.contains("$0.0005"), "got: {msg}");
    }

    #[test]
    fn invalid_range_display() {
        let e = ScribeError::InvalidRange {
            start: Some(10),
            end: Some(4),
            total_pages: 42,
            reason: "end is before start".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("42 pages"));
        assert!(msg.contains("end is before start"));
    }

    #[test]
    fn external_call_keeps_detail_verbatim() {
        let e = ItemError::external("pages 1-5", "Syntax Error: Couldn't read xref table");
        assert_eq!(
            e.to_string(),
            "pages 1-5: Syntax Error: Couldn't read xref table"
        );
        assert!(!e.is_persistence());
    }

    #[test]
    fn persistence_display() {
        let e = ItemError::persistence("/tmp/out/page_0001.md", "File exists (os error 17)");
        assert!(e.is_persistence());
        assert!(e.to_string().contains("page_0001.md"));
    }
}
