//! Optical recognition: run an OCR engine over a single image.
//!
//! The engine itself sits behind [`OcrEngine`] so the extractors can be driven
//! by a fake in tests. The production engine shells out to the `tesseract`
//! binary: one process per image, text read from stdout.
//!
//! [`Recognizer`] is what the extractors actually call. It pins the language
//! pair and segmentation mode and turns every engine failure into an empty
//! string. It never retries; the fallback policy belongs to the callers.

use crate::config::{InvoiceConfig, PageSegMode};
use crate::error::OcrError;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use tracing::{debug, warn};

/// An OCR engine that turns an image file into text.
pub trait OcrEngine: Send + Sync {
    fn recognize(
        &self,
        image: &Path,
        languages: &[String],
        mode: PageSegMode,
    ) -> Result<String, OcrError>;
}

/// Tesseract driven through its command-line interface.
#[derive(Debug, Clone)]
pub struct TesseractCli {
    binary: PathBuf,
}

impl TesseractCli {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Arguments after the binary: `<image> stdout -l eng+spa --psm 6`.
    pub fn args(image: &Path, languages: &[String], mode: PageSegMode) -> Vec<String> {
        vec![
            image.to_string_lossy().into_owned(),
            "stdout".to_string(),
            "-l".to_string(),
            languages.join("+"),
            "--psm".to_string(),
            mode.as_psm().to_string(),
        ]
    }
}

impl Default for TesseractCli {
    fn default() -> Self {
        Self::new("tesseract")
    }
}

impl OcrEngine for TesseractCli {
    fn recognize(
        &self,
        image: &Path,
        languages: &[String],
        mode: PageSegMode,
    ) -> Result<String, OcrError> {
        let output = Command::new(&self.binary)
            .args(Self::args(image, languages, mode))
            .output()
            .map_err(|source| OcrError::Spawn {
                binary: self.binary.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(OcrError::ProcessFailed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// OCR adapter with fixed language and segmentation settings.
#[derive(Clone)]
pub struct Recognizer {
    engine: Arc<dyn OcrEngine>,
    languages: Vec<String>,
    mode: PageSegMode,
}

impl Recognizer {
    pub fn new(engine: Arc<dyn OcrEngine>, languages: Vec<String>, mode: PageSegMode) -> Self {
        Self {
            engine,
            languages,
            mode,
        }
    }

    /// Tesseract at `config.tesseract_path` with the configured languages.
    pub fn from_config(config: &InvoiceConfig) -> Self {
        Self::new(
            Arc::new(TesseractCli::new(&config.tesseract_path)),
            config.languages.clone(),
            config.page_seg_mode,
        )
    }

    /// Recognise `image`; empty string when the engine fails.
    pub fn recognize(&self, image: &Path) -> String {
        match self.engine.recognize(image, &self.languages, self.mode) {
            Ok(text) => {
                debug!("OCR {} → {} chars", image.display(), text.len());
                text
            }
            Err(e) => {
                warn!("OCR failed for {}: {}", image.display(), e);
                String::new()
            }
        }
    }
}

impl std::fmt::Debug for Recognizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Recognizer")
            .field("engine", &"<dyn OcrEngine>")
            .field("languages", &self.languages)
            .field("mode", &self.mode)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Recording {
        calls: Mutex<Vec<(PathBuf, Vec<String>, PageSegMode)>>,
    }

    impl OcrEngine for Recording {
        fn recognize(
            &self,
            image: &Path,
            languages: &[String],
            mode: PageSegMode,
        ) -> Result<String, OcrError> {
            self.calls
                .lock()
                .unwrap()
                .push((image.to_path_buf(), languages.to_vec(), mode));
            Ok("Factura 1".into())
        }
    }

    struct Failing;

    impl OcrEngine for Failing {
        fn recognize(&self, _: &Path, _: &[String], _: PageSegMode) -> Result<String, OcrError> {
            Err(OcrError::ProcessFailed {
                status: "exit status: 1".into(),
                stderr: "Error opening data file".into(),
            })
        }
    }

    #[test]
    fn tesseract_args() {
        let langs = vec!["eng".to_string(), "spa".to_string()];
        let args = TesseractCli::args(Path::new("/tmp/a.png"), &langs, PageSegMode::SingleBlock);
        assert_eq!(args, ["/tmp/a.png", "stdout", "-l", "eng+spa", "--psm", "6"]);
    }

    #[test]
    fn recognizer_passes_fixed_configuration() {
        let engine = Arc::new(Recording {
            calls: Mutex::new(Vec::new()),
        });
        let rec = Recognizer::from_config(&InvoiceConfig::default());
        // swap in the recording engine, keep the configured languages/mode
        let rec = Recognizer::new(engine.clone(), rec.languages, rec.mode);

        assert_eq!(rec.recognize(Path::new("scan.png")), "Factura 1");

        let calls = engine.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].1, ["eng", "spa"]);
        assert_eq!(calls[0].2, PageSegMode::SingleBlock);
    }

    #[test]
    fn engine_failure_becomes_empty_text() {
        let rec = Recognizer::new(Arc::new(Failing), vec!["eng".into()], PageSegMode::Auto);
        assert_eq!(rec.recognize(Path::new("scan.png")), "");
    }

    #[test]
    fn missing_binary_is_a_spawn_error() {
        let engine = TesseractCli::new("/nonexistent/bin/tesseract-ocr");
        let err = engine
            .recognize(Path::new("scan.png"), &["eng".into()], PageSegMode::SingleBlock)
            .unwrap_err();
        assert!(matches!(err, OcrError::Spawn { .. }));

        let rec = Recognizer::new(Arc::new(engine), vec!["eng".into()], PageSegMode::SingleBlock);
        assert_eq!(rec.recognize(Path::new("scan.png")), "");
    }
}
