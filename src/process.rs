//! Eager entry points: one upload in, one outcome out.
//!
//! ```text
//! path ──▶ resolve_input ──▶ Extractor (blocking pool) ──▶ text
//!                                                           │
//!                             empty ◀──────────────────────┤
//!                               │                           ▼
//!                            NoText                    Interpreter ──▶ Parsed | Failed
//! ```
//!
//! Use [`crate::stream::process_stream`] instead when outputs should be
//! consumed as each document finishes.

use crate::config::InvoiceConfig;
use crate::error::InvoiceError;
use crate::output::{persist, InvoiceOutcome, InvoiceOutput};
use crate::pipeline::extract::Extractor;
use crate::pipeline::input::{resolve_input, ExtractionInput};
use crate::pipeline::interpret::Interpreter;
use crate::progress::ProgressCallback;
use futures::stream::{self, StreamExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Extraction and interpretation wired together.
///
/// Built once and shared by every document of a batch. Cloning is cheap.
#[derive(Clone)]
pub struct Pipeline {
    extractor: Arc<Extractor>,
    interpreter: Interpreter,
    concurrency: usize,
    progress: Option<ProgressCallback>,
}

impl Pipeline {
    pub fn new(extractor: Extractor, interpreter: Interpreter) -> Self {
        Self {
            extractor: Arc::new(extractor),
            interpreter,
            concurrency: 1,
            progress: None,
        }
    }

    /// Production collaborators: pdfium, tesseract and the HTTP transport.
    ///
    /// # Errors
    /// [`InvoiceError::InvalidConfig`] when no endpoint is configured.
    pub fn from_config(config: &InvoiceConfig) -> Result<Self, InvoiceError> {
        Ok(Self {
            extractor: Arc::new(Extractor::from_config(config)),
            interpreter: Interpreter::from_config(config)?,
            concurrency: config.concurrency.max(1),
            progress: config.progress_callback.clone(),
        })
    }

    pub fn with_concurrency(mut self, n: usize) -> Self {
        self.concurrency = n.max(1);
        self
    }

    pub fn with_progress(mut self, cb: ProgressCallback) -> Self {
        self.progress = Some(cb);
        self
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Process one upload.
    ///
    /// # Errors
    /// Only input errors are fatal (missing file, unsupported extension, not
    /// a PDF). Extraction and model failures are reported in
    /// [`InvoiceOutput::outcome`].
    pub async fn process(&self, path: impl AsRef<Path>) -> Result<InvoiceOutput, InvoiceError> {
        let path = path.as_ref();
        if let Some(ref cb) = self.progress {
            cb.on_document_start(path);
        }

        let result = self.process_inner(path).await;

        if let Some(ref cb) = self.progress {
            match &result {
                Ok(output) => cb.on_document_complete(path, output.outcome.label()),
                Err(e) => cb.on_document_error(path, &e.to_string()),
            }
        }
        result
    }

    async fn process_inner(&self, path: &Path) -> Result<InvoiceOutput, InvoiceError> {
        let start = Instant::now();
        info!("Processing {}", path.display());

        let (input, text) = extract_with(&self.extractor, path).await?;
        let text_chars = text.chars().count();

        let outcome = if text.trim().is_empty() {
            warn!("No text extracted from {}", path.display());
            InvoiceOutcome::NoText
        } else {
            debug!("Extracted {} characters from {}", text_chars, path.display());
            InvoiceOutcome::from(self.interpreter.interpret(&text).await)
        };

        let duration_ms = start.elapsed().as_millis() as u64;
        info!(
            "{}: {} in {}ms",
            path.display(),
            outcome.label(),
            duration_ms
        );

        Ok(InvoiceOutput {
            source: input.path,
            kind: input.kind,
            text_chars,
            outcome,
            duration_ms,
        })
    }

    /// Process one upload and write its outcome into `dir`.
    ///
    /// Returns the path of the JSON record, or `None` for
    /// [`InvoiceOutcome::NoText`], which is never written.
    pub async fn process_to_dir(
        &self,
        path: impl AsRef<Path>,
        dir: &Path,
    ) -> Result<(InvoiceOutput, Option<PathBuf>), InvoiceError> {
        let output = self.process(path).await?;
        if !output.outcome.should_persist() {
            debug!("Not saving {}: no text", output.source.display());
            return Ok((output, None));
        }
        let written = persist(&output.outcome, dir)?;
        Ok((output, Some(written)))
    }

    /// Process independent uploads concurrently.
    ///
    /// Results arrive in completion order, each paired with its input path.
    pub async fn process_batch<P: AsRef<Path>>(
        &self,
        paths: &[P],
    ) -> Vec<(PathBuf, Result<InvoiceOutput, InvoiceError>)> {
        let total = paths.len();
        if let Some(ref cb) = self.progress {
            cb.on_batch_start(total);
        }

        let results: Vec<_> = stream::iter(paths.iter().map(|p| {
            let path = p.as_ref().to_path_buf();
            let pipeline = self.clone();
            async move {
                let result = pipeline.process(&path).await;
                (path, result)
            }
        }))
        .buffer_unordered(self.concurrency)
        .collect()
        .await;

        let parsed = results
            .iter()
            .filter(|(_, r)| matches!(r, Ok(o) if o.outcome.is_parsed()))
            .count();
        info!("Batch complete: {}/{} parsed", parsed, total);
        if let Some(ref cb) = self.progress {
            cb.on_batch_complete(total, parsed);
        }
        results
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("extractor", &self.extractor)
            .field("interpreter", &self.interpreter)
            .field("concurrency", &self.concurrency)
            .field("progress", &self.progress.as_ref().map(|_| "<dyn InvoiceProgressCallback>"))
            .finish()
    }
}

/// Resolve `path` and run the extractor on the blocking pool.
///
/// pdfium, tesseract and the raster transforms are all blocking work.
pub(crate) async fn extract_with(
    extractor: &Arc<Extractor>,
    path: &Path,
) -> Result<(ExtractionInput, String), InvoiceError> {
    let input = resolve_input(path)?;
    let extractor = Arc::clone(extractor);
    tokio::task::spawn_blocking(move || {
        let text = extractor.extract(&input);
        (input, text)
    })
    .await
    .map_err(|e| InvoiceError::Internal(format!("extraction task panicked: {e}")))
}

// ── Free functions ───────────────────────────────────────────────────────

/// Extract and interpret one invoice file.
///
/// This is the primary entry point for the library.
///
/// # Example
/// ```rust,no_run
/// use edgequake_invoice::{process, InvoiceConfig, InvoiceOutcome};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = InvoiceConfig::builder()
///     .endpoint(std::env::var("AZURE_OPENAI_ENDPOINT")?)
///     .api_key(std::env::var("AZURE_OPENAI_API_KEY")?)
///     .build()?;
/// let output = process("factura.pdf", &config).await?;
/// if let InvoiceOutcome::Parsed(record) = &output.outcome {
///     println!("{}", record["total"]);
/// }
/// # Ok(())
/// # }
/// ```
pub async fn process(
    path: impl AsRef<Path>,
    config: &InvoiceConfig,
) -> Result<InvoiceOutput, InvoiceError> {
    Pipeline::from_config(config)?.process(path).await
}

/// Process a file and write its outcome into `config.output_dir`.
///
/// Returns the output together with the path of the JSON record, if one was
/// written. See [`Pipeline::process_to_dir`].
pub async fn process_to_dir(
    path: impl AsRef<Path>,
    config: &InvoiceConfig,
) -> Result<(InvoiceOutput, Option<PathBuf>), InvoiceError> {
    Pipeline::from_config(config)?
        .process_to_dir(path, &config.output_dir)
        .await
}

/// Process several files with `config.concurrency` in flight.
pub async fn process_batch<P: AsRef<Path>>(
    paths: &[P],
    config: &InvoiceConfig,
) -> Result<Vec<(PathBuf, Result<InvoiceOutput, InvoiceError>)>, InvoiceError> {
    let pipeline = Pipeline::from_config(config)?;
    Ok(pipeline.process_batch(paths).await)
}

/// Synchronous wrapper around [`process`].
///
/// Creates a temporary tokio runtime internally.
pub fn process_sync(
    path: impl AsRef<Path>,
    config: &InvoiceConfig,
) -> Result<InvoiceOutput, InvoiceError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| InvoiceError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(process(path, config))
}

/// Text extraction only. Needs neither an endpoint nor an API key.
pub async fn extract_text(
    path: impl AsRef<Path>,
    config: &InvoiceConfig,
) -> Result<String, InvoiceError> {
    let extractor = Arc::new(Extractor::from_config(config));
    let (_, text) = extract_with(&extractor, path.as_ref()).await?;
    Ok(text)
}
