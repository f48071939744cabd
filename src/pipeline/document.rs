//! Document text extraction: native text first, OCR of page one as fallback.
//!
//! The embedded text layer is read from every page. Only when it is empty
//! (a scan wrapped in a PDF) is the first page rasterised and handed to the
//! recognizer; later pages are not OCR'd.
//!
//! Any parse failure (corrupt or encrypted file) ends extraction with an
//! empty string, the same signal as "nothing readable".

use crate::config::InvoiceConfig;
use crate::error::DocumentError;
use crate::pipeline::enhance::scratch_png;
use crate::pipeline::ocr::Recognizer;
use image::ImageFormat;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Outcome of reading a document's embedded text layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NativeText {
    /// Non-blank text was found.
    Found(String),
    /// The document opened fine but carries no text (scanned pages).
    Absent,
}

impl NativeText {
    /// Classify raw parser output: whitespace-only counts as absent.
    pub fn from_raw(text: String) -> Self {
        if text.trim().is_empty() {
            NativeText::Absent
        } else {
            NativeText::Found(text)
        }
    }
}

/// Reads the embedded text layer of a document.
pub trait NativeTextSource: Send + Sync {
    fn parse(&self, path: &Path) -> Result<NativeText, DocumentError>;
}

/// Rasterises the first page of a document to a PNG at `out`.
pub trait PageRenderer: Send + Sync {
    fn render_first_page(&self, path: &Path, out: &Path) -> Result<(), DocumentError>;
}

// ── pdfium backend ───────────────────────────────────────────────────────────

/// Native text and rendering through pdfium.
///
/// A fresh binding is made per call: pdfium keeps thread-local state, and
/// extraction runs on the blocking pool where any thread may pick it up.
#[derive(Debug, Clone)]
pub struct PdfiumBackend {
    library_path: Option<PathBuf>,
    max_rendered_pixels: u32,
    password: Option<String>,
}

impl PdfiumBackend {
    pub fn new(
        library_path: Option<PathBuf>,
        max_rendered_pixels: u32,
        password: Option<String>,
    ) -> Self {
        Self {
            library_path,
            max_rendered_pixels,
            password,
        }
    }

    pub fn from_config(config: &InvoiceConfig) -> Self {
        Self::new(
            config.pdfium_library_path.clone(),
            config.max_rendered_pixels,
            config.password.clone(),
        )
    }

    fn bind(&self) -> Result<Pdfium, DocumentError> {
        let bindings = match &self.library_path {
            Some(p) if p.is_dir() => {
                Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(p))
            }
            Some(p) => Pdfium::bind_to_library(p),
            None => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
                .or_else(|_| Pdfium::bind_to_system_library()),
        }
        .map_err(|e| DocumentError::Binding(format!("{e:?}")))?;

        Ok(Pdfium::new(bindings))
    }

    fn open<'a>(&'a self, pdfium: &'a Pdfium, path: &Path) -> Result<PdfDocument<'a>, DocumentError> {
        pdfium
            .load_pdf_from_file(path, self.password.as_deref())
            .map_err(|e| DocumentError::Open {
                path: path.to_path_buf(),
                detail: format!("{e:?}"),
            })
    }
}

impl NativeTextSource for PdfiumBackend {
    fn parse(&self, path: &Path) -> Result<NativeText, DocumentError> {
        let pdfium = self.bind()?;
        let document = self.open(&pdfium, path)?;

        let mut parts = Vec::new();
        for (idx, page) in document.pages().iter().enumerate() {
            let text = page.text().map_err(|e| DocumentError::Open {
                path: path.to_path_buf(),
                detail: format!("page {}: {e:?}", idx + 1),
            })?;
            parts.push(text.all());
        }

        debug!("Native text: {} pages from {}", parts.len(), path.display());
        Ok(NativeText::from_raw(parts.join("\n")))
    }
}

impl PageRenderer for PdfiumBackend {
    fn render_first_page(&self, path: &Path, out: &Path) -> Result<(), DocumentError> {
        let pdfium = self.bind()?;
        let document = self.open(&pdfium, path)?;
        let pages = document.pages();

        if pages.len() == 0 {
            return Err(DocumentError::NoPages {
                path: path.to_path_buf(),
            });
        }

        let render_config = PdfRenderConfig::new()
            .set_target_width(self.max_rendered_pixels as i32)
            .set_maximum_height(self.max_rendered_pixels as i32);

        let page = pages.get(0).map_err(|e| DocumentError::Render {
            path: path.to_path_buf(),
            detail: format!("{e:?}"),
        })?;

        let bitmap = page
            .render_with_config(&render_config)
            .map_err(|e| DocumentError::Render {
                path: path.to_path_buf(),
                detail: format!("{e:?}"),
            })?;

        let image = bitmap.as_image();
        image
            .save_with_format(out, ImageFormat::Png)
            .map_err(|e| DocumentError::Write {
                path: out.to_path_buf(),
                detail: e.to_string(),
            })?;

        debug!(
            "Rendered page 1 of {} → {}x{} px",
            path.display(),
            image.width(),
            image.height()
        );
        Ok(())
    }
}

// ── Extractor ────────────────────────────────────────────────────────────────

/// Native-text-then-OCR extraction for paginated documents.
#[derive(Clone)]
pub struct DocumentExtractor {
    native: Arc<dyn NativeTextSource>,
    renderer: Arc<dyn PageRenderer>,
    recognizer: Recognizer,
}

impl DocumentExtractor {
    pub fn new(
        native: Arc<dyn NativeTextSource>,
        renderer: Arc<dyn PageRenderer>,
        recognizer: Recognizer,
    ) -> Self {
        Self {
            native,
            renderer,
            recognizer,
        }
    }

    pub fn from_config(config: &InvoiceConfig) -> Self {
        let backend = Arc::new(PdfiumBackend::from_config(config));
        Self::new(backend.clone(), backend, Recognizer::from_config(config))
    }

    /// Extract text from `path`. Empty string means nothing could be read.
    pub fn extract(&self, path: &Path) -> String {
        match self.native.parse(path) {
            Ok(NativeText::Found(text)) => {
                info!("Native text found in {} ({} chars)", path.display(), text.len());
                text
            }
            Ok(NativeText::Absent) => {
                debug!("No text layer in {}; running OCR on page 1", path.display());
                self.ocr_first_page(path)
            }
            Err(e) => {
                warn!("Could not parse {}: {}", path.display(), e);
                String::new()
            }
        }
    }

    fn ocr_first_page(&self, path: &Path) -> String {
        // Removed when `page` drops, on every path out of this function.
        let page = match scratch_png() {
            Ok(p) => p,
            Err(e) => {
                warn!("Could not allocate page image for {}: {}", path.display(), e);
                return String::new();
            }
        };

        if let Err(e) = self.renderer.render_first_page(path, &page) {
            warn!("Could not render page 1 of {}: {}", path.display(), e);
            return String::new();
        }

        self.recognizer.recognize(&page)
    }
}

impl std::fmt::Debug for DocumentExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentExtractor")
            .field("recognizer", &self.recognizer)
            .finish_non_exhaustive()
    }
}
