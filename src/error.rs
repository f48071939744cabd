//! Error types for the edgequake-invoice library.
//!
//! Failures fall into three groups, each with its own channel:
//!
//! * [`InvoiceError`] — **Fatal**: the document cannot be processed at all
//!   (missing file, unsupported extension, bad configuration). Returned as
//!   `Err(InvoiceError)` from the top-level `process*` functions.
//!
//! * Stage errors ([`OcrError`], [`EnhanceError`], [`DocumentError`],
//!   [`TransportError`]) — raised by external collaborators. The extractors
//!   swallow the first three and report "no text" instead; the interpreter
//!   turns the last one into an [`ExtractionError`].
//!
//! * [`ExtractionError`] — **Data**: the model call finished but its output
//!   could not be trusted. It carries the offending payload and is stored in
//!   [`crate::output::InvoiceOutcome::Failed`] so callers can show it.

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-invoice library.
#[derive(Debug, Error)]
pub enum InvoiceError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("Invoice file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// Extension is not one of the accepted upload formats.
    #[error("Unsupported format for '{path}'. Allowed: PDF, PNG, JPG, JPEG.")]
    UnsupportedFormat { path: PathBuf },

    /// The file has a `.pdf` extension but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the JSON result file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// OCR engine failure. Never escapes the recognizer adapter.
#[derive(Debug, Error)]
pub enum OcrError {
    #[error("failed to launch OCR engine '{binary}': {source}")]
    Spawn {
        binary: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("OCR engine exited with {status}: {stderr}")]
    ProcessFailed { status: String, stderr: String },
}

/// Image enhancement failure, reported explicitly instead of being inferred
/// from a corrupt output file.
#[derive(Debug, Error)]
pub enum EnhanceError {
    #[error("could not create temporary image: {0}")]
    TempFile(#[source] std::io::Error),

    #[error("image processing failed: {0}")]
    Image(#[from] image::ImageError),

    #[error("failed to launch image transform '{binary}': {source}")]
    Spawn {
        binary: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("image transform exited with {status}: {stderr}")]
    ProcessFailed { status: String, stderr: String },
}

/// Native PDF parsing or page rendering failure.
#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("Failed to bind to pdfium library: {0}")]
    Binding(String),

    #[error("PDF '{path}' could not be opened: {detail}")]
    Open { path: PathBuf, detail: String },

    #[error("PDF '{path}' has no pages")]
    NoPages { path: PathBuf },

    #[error("Rasterisation failed for '{path}': {detail}")]
    Render { path: PathBuf, detail: String },

    #[error("could not write page image '{path}': {detail}")]
    Write { path: PathBuf, detail: String },
}

/// The chat-completion request did not complete.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct TransportError {
    pub message: String,
    /// Timeouts, connection resets, HTTP 429 and 5xx are worth another try.
    pub retryable: bool,
}

impl TransportError {
    pub fn retryable(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: true,
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: false,
        }
    }
}

/// Why a model response was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The network/API call did not complete.
    TransportFailure,
    /// The response is not JSON or lacks `choices[0].message.content`.
    MalformedApiResponse,
    /// The envelope is fine but the content is not a JSON object.
    MalformedContent,
}

impl ErrorKind {
    fn message(self) -> &'static str {
        match self {
            ErrorKind::TransportFailure => "API request failed",
            ErrorKind::MalformedApiResponse => "Unexpected API response format",
            ErrorKind::MalformedContent => "JSON decoding failed",
        }
    }

    fn raw_field(self) -> &'static str {
        match self {
            ErrorKind::TransportFailure => "details",
            ErrorKind::MalformedApiResponse => "raw_response",
            ErrorKind::MalformedContent => "raw_content",
        }
    }
}

/// A rejected model response together with the payload that caused it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionError {
    pub kind: ErrorKind,
    /// Original transport payload, cleaned content, or transport error text,
    /// depending on `kind`.
    pub raw: String,
}

impl ExtractionError {
    pub fn new(kind: ErrorKind, raw: impl Into<String>) -> Self {
        Self {
            kind,
            raw: raw.into(),
        }
    }
}

impl fmt::Display for ExtractionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind.message())
    }
}

impl std::error::Error for ExtractionError {}

/// Serialises to the diagnostic object shown to users and written to disk,
/// e.g. `{"error": "JSON decoding failed", "raw_content": "{\"a\":"}`.
impl Serialize for ExtractionError {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(3))?;
        map.serialize_entry("error", self.kind.message())?;
        map.serialize_entry("kind", &self.kind)?;
        map.serialize_entry(self.kind.raw_field(), &self.raw)?;
        map.end()
    }
}
