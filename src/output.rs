//! Result types and the on-disk JSON record.

use crate::error::{ExtractionError, InvoiceError};
use crate::pipeline::input::InputKind;
use crate::pipeline::interpret::InterpretationResult;
use chrono::Local;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};
use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

/// What came out of one upload.
#[derive(Debug, Clone, PartialEq)]
pub enum InvoiceOutcome {
    /// Extraction produced no text, so the model was never called.
    NoText,
    /// The model returned a JSON object.
    Parsed(Map<String, Value>),
    /// The model call or its decode failed.
    Failed(ExtractionError),
}

/// `Parsed` is written as the record itself; the other variants as an
/// object with an `error` message.
impl Serialize for InvoiceOutcome {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            InvoiceOutcome::NoText => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("error", "No text could be extracted from the file")?;
                map.end()
            }
            InvoiceOutcome::Parsed(record) => record.serialize(serializer),
            InvoiceOutcome::Failed(e) => e.serialize(serializer),
        }
    }
}

impl InvoiceOutcome {
    pub fn is_parsed(&self) -> bool {
        matches!(self, InvoiceOutcome::Parsed(_))
    }

    /// Whether the outcome is written to the output directory.
    ///
    /// `NoText` is not: nothing was sent to the model.
    pub fn should_persist(&self) -> bool {
        !matches!(self, InvoiceOutcome::NoText)
    }

    /// Short label for logs and the CLI summary.
    pub fn label(&self) -> &'static str {
        match self {
            InvoiceOutcome::NoText => "no text",
            InvoiceOutcome::Parsed(_) => "parsed",
            InvoiceOutcome::Failed(_) => "failed",
        }
    }
}

impl From<InterpretationResult> for InvoiceOutcome {
    fn from(result: InterpretationResult) -> Self {
        match result {
            InterpretationResult::Record(map) => InvoiceOutcome::Parsed(map),
            InterpretationResult::Error(e) => InvoiceOutcome::Failed(e),
        }
    }
}

/// Complete result of processing one file.
#[derive(Debug, Clone, Serialize)]
pub struct InvoiceOutput {
    pub source: PathBuf,
    pub kind: InputKind,
    /// Characters of extracted text handed to the model.
    pub text_chars: usize,
    pub outcome: InvoiceOutcome,
    pub duration_ms: u64,
}

// ── Persistence ──────────────────────────────────────────────────────────

/// Write `outcome` as pretty JSON to `dir/invoice-YYYYmmdd-HHMMSS.json`.
///
/// A second result within the same second gets `-1`, `-2`, ... appended. The
/// file is written under a temporary name and renamed into place, so readers
/// never see a partial record.
pub fn persist(outcome: &InvoiceOutcome, dir: &Path) -> Result<PathBuf, InvoiceError> {
    let write_err = |path: &Path, source: std::io::Error| InvoiceError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    std::fs::create_dir_all(dir).map_err(|e| write_err(dir, e))?;

    let json = serde_json::to_string_pretty(outcome)
        .map_err(|e| InvoiceError::Internal(format!("serialising result: {e}")))?;

    let stamp = Local::now().format("%Y%m%d-%H%M%S").to_string();
    let mut tmp = tempfile::Builder::new()
        .prefix(".invoice-")
        .suffix(".json.tmp")
        .tempfile_in(dir)
        .map_err(|e| write_err(dir, e))?;
    std::io::Write::write_all(&mut tmp, json.as_bytes()).map_err(|e| write_err(tmp.path(), e))?;

    let mut n = 0u32;
    loop {
        let name = if n == 0 {
            format!("invoice-{stamp}.json")
        } else {
            format!("invoice-{stamp}-{n}.json")
        };
        let target = dir.join(name);
        // persist_noclobber fails instead of replacing an existing record.
        match tmp.persist_noclobber(&target) {
            Ok(_) => {
                debug!("Wrote {}", target.display());
                return Ok(target);
            }
            Err(e) if e.error.kind() == IoErrorKind::AlreadyExists => {
                tmp = e.file;
                n += 1;
            }
            Err(e) => return Err(write_err(&target, e.error)),
        }
    }
}
