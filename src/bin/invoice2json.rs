//! CLI binary for edgequake-invoice.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `InvoiceConfig`, saves each result and prints it.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_invoice::{
    extract_text, persist, EnhancerKind, FieldSet, InvoiceConfig, InvoiceOutcome,
    InvoiceProgressCallback, PageSegMode, Pipeline, ProgressCallback,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Live progress bar plus one log line per finished document. Documents
/// complete out of order when several run at once.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<PathBuf, Instant>>,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} invoices  ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        bar.set_style(style);
        bar.set_prefix("Extracting");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
            errors: AtomicUsize::new(0),
        })
    }

    fn elapsed(&self, path: &Path) -> f64 {
        self.start_times
            .lock()
            .ok()
            .and_then(|mut m| m.remove(path))
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl InvoiceProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total_documents: usize) {
        self.bar.set_length(total_documents as u64);
    }

    fn on_document_start(&self, path: &Path) {
        if let Ok(mut m) = self.start_times.lock() {
            m.insert(path.to_path_buf(), Instant::now());
        }
        self.bar.set_message(file_name(path));
    }

    fn on_document_complete(&self, path: &Path, outcome: &str) {
        let secs = self.elapsed(path);
        let mark = if outcome == "parsed" {
            green("✓")
        } else {
            yellow("!")
        };
        self.bar.println(format!(
            "  {} {:<40}  {:<8}  {}",
            mark,
            file_name(path),
            outcome,
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_document_error(&self, path: &Path, error: &str) {
        let secs = self.elapsed(path);
        self.errors.fetch_add(1, Ordering::SeqCst);

        let first_line = error.lines().next().unwrap_or(error);
        self.bar.println(format!(
            "  {} {:<40}  {}  {}",
            red("✗"),
            file_name(path),
            red(first_line),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, total_documents: usize, parsed_count: usize) {
        self.bar.finish_and_clear();
        let errors = self.errors.load(Ordering::SeqCst);
        eprintln!(
            "{} {}/{} invoices parsed{}",
            if parsed_count == total_documents {
                green("✔")
            } else {
                yellow("⚠")
            },
            bold(&parsed_count.to_string()),
            total_documents,
            if errors > 0 {
                format!("  ({} rejected)", red(&errors.to_string()))
            } else {
                String::new()
            },
        );
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # One invoice, record printed and saved to ./json_output/
  invoice2json factura.pdf

  # Several uploads at once
  invoice2json scans/*.jpg --concurrency 8 -o results/

  # Just show the extracted text (no API key needed)
  invoice2json --extract-only receipt.png

  # Use ImageMagick for the enhanced OCR retry
  invoice2json --enhancer image-magick blurry.jpg

ENVIRONMENT VARIABLES:
  AZURE_OPENAI_ENDPOINT   Full chat-completions URL (deployment + api-version)
  AZURE_OPENAI_API_KEY    Value of the api-key header
  INVOICE_*               Fallback for every flag, e.g. INVOICE_CONCURRENCY=8
  RUST_LOG                Overrides the log filter

REQUIREMENTS:
  tesseract with the eng and spa language data, and libpdfium (found via
  --pdfium-path, the working directory, or the system library path).
"#;

/// Extract structured JSON from invoice PDFs and images.
#[derive(Parser, Debug)]
#[command(
    name = "invoice2json",
    version,
    about = "Extract structured JSON from invoice PDFs and images",
    long_about = "Reads invoice uploads (PDF, PNG, JPG, JPEG), extracts their text with the PDF \
text layer or tesseract OCR, and asks an Azure OpenAI chat deployment to return the invoice \
as JSON. Every result, including failures, is saved as a timestamped JSON file. Files \
with no extractable text are reported but not saved.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Invoice files: PDF, PNG, JPG or JPEG.
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Directory for the saved JSON results.
    #[arg(short, long, env = "INVOICE_OUTPUT_DIR", default_value = "json_output")]
    output_dir: PathBuf,

    /// Do not save results to disk.
    #[arg(long, env = "INVOICE_NO_SAVE")]
    no_save: bool,

    /// Chat-completions endpoint URL.
    #[arg(long, env = "AZURE_OPENAI_ENDPOINT", hide_env_values = true)]
    endpoint: Option<String>,

    /// API key sent in the `api-key` header.
    #[arg(long, env = "AZURE_OPENAI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Max tokens the model may return.
    #[arg(long, env = "INVOICE_MAX_TOKENS", default_value_t = 2000)]
    max_tokens: usize,

    /// Retries on transient API failures.
    #[arg(long, env = "INVOICE_MAX_RETRIES", default_value_t = 2)]
    max_retries: u32,

    /// Per-request API timeout in seconds.
    #[arg(long, env = "INVOICE_API_TIMEOUT", default_value_t = 60)]
    api_timeout: u64,

    /// Path to a text file containing a custom system prompt.
    #[arg(long, env = "INVOICE_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,

    /// tesseract binary.
    #[arg(long, env = "INVOICE_TESSERACT", default_value = "tesseract")]
    tesseract: PathBuf,

    /// OCR languages, comma separated.
    #[arg(long, env = "INVOICE_LANGUAGES", value_delimiter = ',', default_value = "eng,spa")]
    languages: Vec<String>,

    /// Tesseract page segmentation mode.
    #[arg(long, env = "INVOICE_PSM", value_enum, default_value = "single-block")]
    psm: PsmArg,

    /// Words that mark OCR text as an invoice, comma separated.
    #[arg(long, env = "INVOICE_KEY_FIELDS", value_delimiter = ',',
          default_value = "Factura,Fecha,Total,Cliente,Proveedor")]
    key_fields: Vec<String>,

    /// Enhancer for the OCR retry.
    #[arg(long, env = "INVOICE_ENHANCER", value_enum, default_value = "raster")]
    enhancer: EnhancerArg,

    /// ImageMagick binary (with --enhancer image-magick).
    #[arg(long, env = "INVOICE_MAGICK", default_value = "magick")]
    magick: PathBuf,

    /// Directory or file of an existing libpdfium.
    #[arg(long, env = "PDFIUM_LIB_PATH")]
    pdfium_path: Option<PathBuf>,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "INVOICE_PDF_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Number of invoices processed at once.
    #[arg(short, long, env = "INVOICE_CONCURRENCY", default_value_t = 4)]
    concurrency: usize,

    /// Print extracted text only; skip the model.
    #[arg(long)]
    extract_only: bool,

    /// Print the full InvoiceOutput (source, timings, outcome) as JSON.
    #[arg(long, env = "INVOICE_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "INVOICE_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "INVOICE_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "INVOICE_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum PsmArg {
    Auto,
    SingleColumn,
    SingleBlock,
    SparseText,
}

impl From<PsmArg> for PageSegMode {
    fn from(v: PsmArg) -> Self {
        match v {
            PsmArg::Auto => PageSegMode::Auto,
            PsmArg::SingleColumn => PageSegMode::SingleColumn,
            PsmArg::SingleBlock => PageSegMode::SingleBlock,
            PsmArg::SparseText => PageSegMode::SparseText,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum EnhancerArg {
    Raster,
    ImageMagick,
}

impl From<EnhancerArg> for EnhancerKind {
    fn from(v: EnhancerArg) -> Self {
        match v {
            EnhancerArg::Raster => EnhancerKind::Raster,
            EnhancerArg::ImageMagick => EnhancerKind::ImageMagick,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Library INFO logs are hidden while the progress bar is drawn.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !cli.extract_only;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn InvoiceProgressCallback>)
    } else {
        None
    };

    let config = build_config(&cli, progress_cb).await?;

    // ── Extract-only mode ────────────────────────────────────────────────
    if cli.extract_only {
        for input in &cli.inputs {
            let text = extract_text(input, &config)
                .await
                .with_context(|| format!("Extraction failed for {}", input.display()))?;
            if cli.inputs.len() > 1 {
                println!("{}", bold(&format!("── {} ──", input.display())));
            }
            if text.trim().is_empty() {
                eprintln!("{}", yellow("No text could be extracted"));
            } else {
                println!("{}", text.trim_end());
            }
        }
        return Ok(());
    }

    // ── Run pipeline ─────────────────────────────────────────────────────
    if config.endpoint.trim().is_empty() {
        anyhow::bail!(
            "No API endpoint configured.\n\
             Set AZURE_OPENAI_ENDPOINT (and AZURE_OPENAI_API_KEY) or pass --endpoint."
        );
    }

    let pipeline = Pipeline::from_config(&config).context("Invalid configuration")?;
    let results = pipeline.process_batch(&cli.inputs).await;

    let mut failures = 0usize;
    for (path, result) in results {
        let output = match result {
            Ok(output) => output,
            Err(e) => {
                failures += 1;
                eprintln!("{} {}: {}", red("error:"), path.display(), e);
                continue;
            }
        };

        if !output.outcome.is_parsed() {
            failures += 1;
        }

        let saved = if cli.no_save || !output.outcome.should_persist() {
            None
        } else {
            Some(persist(&output.outcome, &config.output_dir).context("Failed to save result")?)
        };

        if cli.quiet {
            continue;
        }

        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&output).context("Failed to serialise output")?
            );
        } else {
            print_outcome(&path, &output.outcome)?;
        }

        if let Some(saved) = saved {
            eprintln!("   {} {}", dim("saved →"), saved.display());
        }
    }

    if failures > 0 {
        std::process::exit(1);
    }
    Ok(())
}

/// Show a record in plain pretty JSON, a failure in red with its payload.
fn print_outcome(path: &Path, outcome: &InvoiceOutcome) -> Result<()> {
    let body = serde_json::to_string_pretty(outcome).context("Failed to serialise outcome")?;
    match outcome {
        InvoiceOutcome::Parsed(_) => {
            println!("{}", bold(&format!("── {} ──", path.display())));
            println!("{body}");
        }
        InvoiceOutcome::Failed(e) => {
            eprintln!("{} {}: {}", red("✘"), path.display(), red(&e.to_string()));
            println!("{body}");
        }
        InvoiceOutcome::NoText => {
            eprintln!(
                "{} {}: {}",
                yellow("⚠"),
                path.display(),
                "no text could be extracted"
            );
        }
    }
    Ok(())
}

/// Map CLI args to `InvoiceConfig`.
async fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<InvoiceConfig> {
    let system_prompt = if let Some(ref path) = cli.system_prompt {
        Some(
            tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read system prompt from {:?}", path))?,
        )
    } else {
        None
    };

    let mut builder = InvoiceConfig::builder()
        .endpoint(cli.endpoint.clone().unwrap_or_default())
        .api_key(cli.api_key.clone().unwrap_or_default())
        .max_tokens(cli.max_tokens)
        .max_retries(cli.max_retries)
        .api_timeout_secs(cli.api_timeout)
        .tesseract_path(&cli.tesseract)
        .languages(cli.languages.iter().map(|l| l.trim().to_string()))
        .page_seg_mode(cli.psm.into())
        .key_fields(FieldSet::new(cli.key_fields.iter().map(String::as_str)))
        .enhancer(cli.enhancer.into())
        .magick_path(&cli.magick)
        .concurrency(cli.concurrency)
        .output_dir(&cli.output_dir);

    if let Some(prompt) = system_prompt {
        builder = builder.system_prompt(prompt);
    }
    if let Some(ref path) = cli.pdfium_path {
        builder = builder.pdfium_library_path(path);
    }
    if let Some(ref pwd) = cli.password {
        builder = builder.password(pwd.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
