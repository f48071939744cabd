//! Configuration types for invoice extraction.
//!
//! Every knob lives in [`InvoiceConfig`], built via [`InvoiceConfigBuilder`].
//! The config is handed to the OCR adapter and the interpreter when they are
//! constructed; nothing reads process-wide state after that point.

use crate::error::InvoiceError;
use crate::pipeline::fields::FieldSet;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Configuration for the extraction pipeline and the interpreter.
///
/// # Example
/// ```rust
/// use edgequake_invoice::InvoiceConfig;
///
/// let config = InvoiceConfig::builder()
///     .endpoint("https://example.openai.azure.com/openai/deployments/gpt-4o/chat/completions?api-version=2024-06-01")
///     .api_key("secret")
///     .max_tokens(2000)
///     .build()
///     .unwrap();
/// assert_eq!(config.max_tokens, 2000);
/// ```
#[derive(Clone)]
pub struct InvoiceConfig {
    // ── Language model ───────────────────────────────────────────────────
    /// Full chat-completion URL, including deployment and api-version.
    pub endpoint: String,

    /// Value for the `api-key` request header.
    pub api_key: String,

    /// Maximum tokens the model may generate. Default: 2000.
    ///
    /// An invoice with many line items can need well over 1 000 tokens; a
    /// truncated reply shows up as `MalformedContent`.
    pub max_tokens: usize,

    /// Retries on a transient transport failure. Default: 2.
    ///
    /// Each delay is capped at [`crate::pipeline::interpret::MAX_BACKOFF_MS`].
    pub max_retries: u32,

    /// Initial retry delay in milliseconds, doubled per attempt. Default: 500.
    pub retry_backoff_ms: u64,

    /// Per-request timeout in seconds. Default: 60.
    pub api_timeout_secs: u64,

    /// Custom system prompt. If None, uses the built-in default.
    pub system_prompt: Option<String>,

    // ── OCR ──────────────────────────────────────────────────────────────
    /// Path or name of the tesseract binary. Default: `tesseract`.
    pub tesseract_path: PathBuf,

    /// Recognition languages, passed together. Default: `eng`, `spa`.
    pub languages: Vec<String>,

    /// Tesseract page segmentation mode. Default: single uniform block.
    pub page_seg_mode: PageSegMode,

    /// Aliases that mark OCR output as plausible invoice text.
    pub key_fields: FieldSet,

    // ── Enhancement ──────────────────────────────────────────────────────
    /// Which enhancer runs before the OCR retry. Default: in-process raster.
    pub enhancer: EnhancerKind,

    /// Path or name of the ImageMagick binary. Default: `magick`.
    pub magick_path: PathBuf,

    /// Upscale factor. Default: 3.
    pub enhance_scale: u32,

    /// Longest edge allowed after upscaling, in pixels. Default: 9000.
    pub enhance_max_dimension: u32,

    /// Brightness offset added after grayscale. Default: 20.
    pub enhance_brightness: i32,

    /// Contrast adjustment in percent. Default: 20.0.
    pub enhance_contrast: f32,

    /// Unsharp-mask sigma. Default: 1.0.
    pub enhance_sharpen_sigma: f32,

    // ── PDF ──────────────────────────────────────────────────────────────
    /// Directory or file of an existing libpdfium. If None, binds to a copy in
    /// the working directory, then to the system library.
    pub pdfium_library_path: Option<PathBuf>,

    /// Longest edge of the rendered first page in pixels. Default: 2000.
    pub max_rendered_pixels: u32,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    // ── Batch / output ───────────────────────────────────────────────────
    /// Number of documents processed at once in batch mode. Default: 4.
    pub concurrency: usize,

    /// Directory for `invoice-<timestamp>.json` result files. Default: `json_output`.
    pub output_dir: PathBuf,

    /// Optional per-document progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for InvoiceConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            api_key: String::new(),
            max_tokens: 2000,
            max_retries: 2,
            retry_backoff_ms: 500,
            api_timeout_secs: 60,
            system_prompt: None,
            tesseract_path: PathBuf::from("tesseract"),
            languages: vec!["eng".to_string(), "spa".to_string()],
            page_seg_mode: PageSegMode::default(),
            key_fields: FieldSet::invoice(),
            enhancer: EnhancerKind::default(),
            magick_path: PathBuf::from("magick"),
            enhance_scale: 3,
            enhance_max_dimension: 9000,
            enhance_brightness: 20,
            enhance_contrast: 20.0,
            enhance_sharpen_sigma: 1.0,
            pdfium_library_path: None,
            max_rendered_pixels: 2000,
            password: None,
            concurrency: 4,
            output_dir: PathBuf::from("json_output"),
            progress_callback: None,
        }
    }
}

impl fmt::Debug for InvoiceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InvoiceConfig")
            .field("endpoint", &self.endpoint)
            .field("api_key", &if self.api_key.is_empty() { "" } else { "<redacted>" })
            .field("max_tokens", &self.max_tokens)
            .field("max_retries", &self.max_retries)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("tesseract_path", &self.tesseract_path)
            .field("languages", &self.languages)
            .field("page_seg_mode", &self.page_seg_mode)
            .field("key_fields", &self.key_fields)
            .field("enhancer", &self.enhancer)
            .field("pdfium_library_path", &self.pdfium_library_path)
            .field("concurrency", &self.concurrency)
            .field("output_dir", &self.output_dir)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn InvoiceProgressCallback>"),
            )
            .finish()
    }
}

impl InvoiceConfig {
    /// Create a new builder for `InvoiceConfig`.
    pub fn builder() -> InvoiceConfigBuilder {
        InvoiceConfigBuilder {
            config: Self::default(),
        }
    }

    /// Tesseract `-l` argument, e.g. `eng+spa`.
    pub fn language_arg(&self) -> String {
        self.languages.join("+")
    }
}

/// Builder for [`InvoiceConfig`].
#[derive(Debug)]
pub struct InvoiceConfigBuilder {
    config: InvoiceConfig,
}

impl InvoiceConfigBuilder {
    pub fn endpoint(mut self, url: impl Into<String>) -> Self {
        self.config.endpoint = url.into();
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = key.into();
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn tesseract_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.tesseract_path = path.into();
        self
    }

    pub fn languages<I, S>(mut self, langs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.languages = langs.into_iter().map(Into::into).collect();
        self
    }

    pub fn page_seg_mode(mut self, mode: PageSegMode) -> Self {
        self.config.page_seg_mode = mode;
        self
    }

    pub fn key_fields(mut self, fields: FieldSet) -> Self {
        self.config.key_fields = fields;
        self
    }

    pub fn enhancer(mut self, kind: EnhancerKind) -> Self {
        self.config.enhancer = kind;
        self
    }

    pub fn magick_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.magick_path = path.into();
        self
    }

    pub fn enhance_scale(mut self, factor: u32) -> Self {
        self.config.enhance_scale = factor;
        self
    }

    pub fn enhance_max_dimension(mut self, px: u32) -> Self {
        self.config.enhance_max_dimension = px.max(100);
        self
    }

    pub fn pdfium_library_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_library_path = Some(path.into());
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = dir.into();
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    ///
    /// The endpoint is not required here: extraction alone works without a
    /// model, and [`crate::pipeline::interpret::HttpTransport::new`] rejects
    /// an empty endpoint when interpretation is actually requested.
    pub fn build(self) -> Result<InvoiceConfig, InvoiceError> {
        let c = &self.config;
        if c.enhance_scale == 0 {
            return Err(InvoiceError::InvalidConfig(
                "Enhancement scale must be ≥ 1".into(),
            ));
        }
        if c.languages.iter().all(|l| l.trim().is_empty()) {
            return Err(InvoiceError::InvalidConfig(
                "At least one OCR language is required".into(),
            ));
        }
        if c.max_tokens == 0 {
            return Err(InvoiceError::InvalidConfig("max_tokens must be ≥ 1".into()));
        }
        if c.concurrency == 0 {
            return Err(InvoiceError::InvalidConfig(
                "Concurrency must be ≥ 1".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Tesseract page segmentation modes (`--psm`).
///
/// Only the modes that make sense for whole invoices are exposed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PageSegMode {
    /// Fully automatic page segmentation, no OSD (3).
    Auto,
    /// A single column of text of variable sizes (4).
    SingleColumn,
    /// A single uniform block of text (6). (default)
    #[default]
    SingleBlock,
    /// Sparse text in no particular order (11).
    SparseText,
}

impl PageSegMode {
    /// Numeric value understood by tesseract.
    pub fn as_psm(self) -> u8 {
        match self {
            PageSegMode::Auto => 3,
            PageSegMode::SingleColumn => 4,
            PageSegMode::SingleBlock => 6,
            PageSegMode::SparseText => 11,
        }
    }
}

/// Image enhancer used before the second OCR pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EnhancerKind {
    /// In-process transform chain using the `image` crate. (default)
    #[default]
    Raster,
    /// External ImageMagick process.
    ImageMagick,
}
