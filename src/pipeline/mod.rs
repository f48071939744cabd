//! Pipeline stages for invoice extraction.
//!
//! Each submodule implements one step. External tools (pdfium, tesseract,
//! ImageMagick, the chat endpoint) sit behind traits so every stage can be
//! tested with fakes.
//!
//! ## Data Flow
//!
//! ```text
//!            ┌─ Document ──▶ native text ──(absent)──▶ render p.1 ──▶ OCR ─┐
//! input ─────┤                                                             ├──▶ interpret ──▶ record
//!            └─ Image ──▶ OCR ──(no key field)──▶ enhance ──▶ OCR ─────────┘
//! ```
//!
//! 1. [`input`]      classify and validate the upload by extension
//! 2. [`document`]   pdfium text layer, first-page OCR fallback
//! 3. [`image_text`] OCR with one enhanced retry, gated by [`fields`]
//! 4. [`ocr`], [`enhance`] tesseract and image-transform adapters
//! 5. [`extract`]    dispatch by input kind
//! 6. [`interpret`]  model call with two-stage decode; the only stage with
//!    network I/O
//! 7. [`postprocess`] strip code fences from model content

pub mod document;
pub mod enhance;
pub mod extract;
pub mod fields;
pub mod image_text;
pub mod input;
pub mod interpret;
pub mod ocr;
pub mod postprocess;
