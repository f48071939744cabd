//! Image text extraction: OCR, plausibility check, one enhanced retry.
//!
//! ```text
//! image ──▶ OCR ──▶ key field? ──yes──▶ done
//!                       │
//!                       no
//!                       ▼
//!                   enhance ──▶ OCR ──▶ done (whatever it says)
//! ```
//!
//! The retry happens at most once. Its output is final even if it still
//! misses every key field. When the enhancer itself fails the image yields
//! empty text.

use crate::config::InvoiceConfig;
use crate::pipeline::enhance::{self, ImageEnhancer};
use crate::pipeline::fields::{contains_key_field, FieldSet};
use crate::pipeline::ocr::Recognizer;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// OCR extraction for raster images.
#[derive(Clone)]
pub struct ImageExtractor {
    recognizer: Recognizer,
    enhancer: Arc<dyn ImageEnhancer>,
    fields: FieldSet,
}

impl ImageExtractor {
    pub fn new(recognizer: Recognizer, enhancer: Arc<dyn ImageEnhancer>, fields: FieldSet) -> Self {
        Self {
            recognizer,
            enhancer,
            fields,
        }
    }

    pub fn from_config(config: &InvoiceConfig) -> Self {
        Self::new(
            Recognizer::from_config(config),
            enhance::from_config(config),
            config.key_fields.clone(),
        )
    }

    /// Extract text from the image at `path`.
    pub fn extract(&self, path: &Path) -> String {
        let first = self.recognizer.recognize(path);
        if contains_key_field(&first, &self.fields) {
            debug!("First OCR pass of {} accepted", path.display());
            return first;
        }

        info!(
            "No key field in first OCR pass of {}; retrying on enhanced image",
            path.display()
        );

        // The enhanced copy is deleted when `enhanced` drops at the end of
        // this block, after the second pass has read it.
        match self.enhancer.enhance(path) {
            Ok(enhanced) => self.recognizer.recognize(&enhanced),
            Err(e) => {
                warn!(
                    "Enhancement of {} failed, no usable text: {}",
                    path.display(),
                    e
                );
                String::new()
            }
        }
    }
}

impl std::fmt::Debug for ImageExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageExtractor")
            .field("recognizer", &self.recognizer)
            .field("fields", &self.fields)
            .finish_non_exhaustive()
    }
}
