//! Pipeline stages for turning scanned documents into transcripts.
//!
//! Each submodule implements exactly one step, and the two stages that call
//! an external collaborator ([`render`] and [`recognize`]) expose it behind a
//! trait so the batch runner can drive either one, and tests can drive fakes.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ render ──▶ (page images on disk) ──▶ encode ──▶ recognize
//! (path)    (chunks)                             (base64)   (VLM → artifact)
//! ```
//!
//! 1. [`input`]  — validate the source PDF; discover page images
//! 2. [`render`] — rasterise one chunk of pages per call (pdfium or poppler)
//! 3. [`encode`] — base64-wrap each page image for the multimodal request
//! 4. [`recognize`] — one VLM call per image, instruction chosen by page parity

pub mod encode;
pub mod input;
pub mod recognize;
pub mod render;
