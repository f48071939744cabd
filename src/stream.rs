//! Streaming API: emit each document's output as soon as it is ready.
//!
//! Unlike [`crate::process::process_batch`], which returns only after every
//! document finishes, [`process_stream`] yields results through a `Stream`.
//! Documents run concurrently, so results arrive in completion order, each
//! tagged with its input path.

use crate::config::InvoiceConfig;
use crate::error::InvoiceError;
use crate::output::InvoiceOutput;
use crate::process::Pipeline;
use futures::stream::{self, StreamExt};
use std::path::PathBuf;
use std::pin::Pin;
use tokio_stream::Stream;
use tracing::info;

/// One streamed item: the input path and what became of it.
pub type StreamItem = (PathBuf, Result<InvoiceOutput, InvoiceError>);

/// A boxed stream of per-document results.
pub type InvoiceStream = Pin<Box<dyn Stream<Item = StreamItem> + Send>>;

/// Process `paths`, streaming outputs as they complete.
///
/// # Errors
/// Returns `Err` only when the pipeline cannot be built (no endpoint).
/// Per-document failures are yielded as items.
///
/// # Example
/// ```rust,no_run
/// use edgequake_invoice::{process_stream, InvoiceConfig};
/// use futures::StreamExt;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = InvoiceConfig::builder().endpoint("https://example/chat").build()?;
/// let mut results = process_stream(vec!["a.pdf".into(), "b.jpg".into()], &config)?;
/// while let Some((path, result)) = results.next().await {
///     match result {
///         Ok(out) => println!("{}: {}", path.display(), out.outcome.label()),
///         Err(e) => eprintln!("{}: {e}", path.display()),
///     }
/// }
/// # Ok(())
/// # }
/// ```
pub fn process_stream(
    paths: Vec<PathBuf>,
    config: &InvoiceConfig,
) -> Result<InvoiceStream, InvoiceError> {
    let pipeline = Pipeline::from_config(config)?;
    Ok(stream_with(pipeline, paths))
}

/// Stream `paths` through an already-built pipeline.
pub fn stream_with(pipeline: Pipeline, paths: Vec<PathBuf>) -> InvoiceStream {
    info!("Starting streaming run over {} documents", paths.len());
    let concurrency = pipeline.concurrency();

    let s = stream::iter(paths.into_iter().map(move |path| {
        let pipeline = pipeline.clone();
        async move {
            let result = pipeline.process(&path).await;
            (path, result)
        }
    }))
    .buffer_unordered(concurrency);

    Box::pin(s)
}
