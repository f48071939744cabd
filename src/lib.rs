//! # edgequake-invoice
//!
//! Turn invoice uploads (PDF, PNG, JPEG) into structured JSON records.
//!
//! Text is taken from the PDF text layer when there is one. Scanned PDFs and
//! images go through tesseract OCR; an image whose first pass mentions none of
//! the expected invoice fields is enhanced and read once more. The text is
//! then sent to an Azure OpenAI style chat endpoint and the reply is decoded
//! in two stages, so a malformed envelope and malformed content are reported
//! separately with the offending payload attached.
//!
//! ## Pipeline Overview
//!
//! ```text
//! upload
//!  │
//!  ├─ 1. Input      classify by extension, check PDF magic bytes
//!  ├─ 2. Extract    native text │ first-page OCR │ OCR + enhanced retry
//!  ├─ 3. Interpret  chat completion at temperature 0, retry on transport errors
//!  ├─ 4. Decode     envelope ▶ strip fences ▶ JSON object
//!  └─ 5. Output     Parsed record │ Failed diagnostic │ NoText
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_invoice::{process, InvoiceConfig, InvoiceOutcome};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = InvoiceConfig::builder()
//!         .endpoint(std::env::var("AZURE_OPENAI_ENDPOINT")?)
//!         .api_key(std::env::var("AZURE_OPENAI_API_KEY")?)
//!         .build()?;
//!     let output = process("factura.jpg", &config).await?;
//!     match output.outcome {
//!         InvoiceOutcome::Parsed(record) => println!("{}", serde_json::to_string_pretty(&record)?),
//!         InvoiceOutcome::Failed(e) => eprintln!("{e}: {}", e.raw),
//!         InvoiceOutcome::NoText => eprintln!("nothing readable"),
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## External Tools
//!
//! | Tool | Needed for | Configured by |
//! |------|------------|---------------|
//! | libpdfium | PDF text and rendering | `pdfium_library_path` |
//! | tesseract (+ `eng`, `spa` data) | OCR | `tesseract_path`, `languages` |
//! | ImageMagick | only with `EnhancerKind::ImageMagick` | `magick_path` |
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `invoice2json` binary (clap + anyhow + tracing-subscriber) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod process;
pub mod progress;
pub mod prompts;
pub mod stream;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{EnhancerKind, InvoiceConfig, InvoiceConfigBuilder, PageSegMode};
pub use error::{ErrorKind, ExtractionError, InvoiceError, TransportError};
pub use output::{persist, InvoiceOutcome, InvoiceOutput};
pub use pipeline::fields::FieldSet;
pub use pipeline::input::InputKind;
pub use pipeline::interpret::{ChatTransport, InterpretationResult, Interpreter};
pub use process::{
    extract_text, process, process_batch, process_sync, process_to_dir, Pipeline,
};
pub use progress::{InvoiceProgressCallback, NoopProgressCallback, ProgressCallback};
pub use stream::{process_stream, InvoiceStream};
