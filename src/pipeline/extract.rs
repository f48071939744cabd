//! Single entry point for text extraction: route by input kind.

use crate::config::InvoiceConfig;
use crate::pipeline::document::DocumentExtractor;
use crate::pipeline::image_text::ImageExtractor;
use crate::pipeline::input::{ExtractionInput, InputKind};

/// Dispatches documents and images to their extractors.
#[derive(Debug, Clone)]
pub struct Extractor {
    document: DocumentExtractor,
    image: ImageExtractor,
}

impl Extractor {
    pub fn new(document: DocumentExtractor, image: ImageExtractor) -> Self {
        Self { document, image }
    }

    /// pdfium, tesseract and the configured enhancer.
    pub fn from_config(config: &InvoiceConfig) -> Self {
        Self::new(
            DocumentExtractor::from_config(config),
            ImageExtractor::from_config(config),
        )
    }

    /// Extracted text; empty when every strategy failed.
    pub fn extract(&self, input: &ExtractionInput) -> String {
        match input.kind {
            InputKind::Document => self.document.extract(&input.path),
            InputKind::Image => self.image.extract(&input.path),
        }
    }
}
