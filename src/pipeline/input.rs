//! Input resolution: validate an uploaded file and decide how to read it.
//!
//! The extension picks the route (PDFs go through native text extraction,
//! images straight to OCR). For `.pdf` files the magic bytes are checked too,
//! so a mislabelled upload fails here with a clear message instead of
//! surfacing later as "no text".

use crate::error::InvoiceError;
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;

/// How an input file is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputKind {
    /// Paginated document (PDF).
    Document,
    /// Raster image (PNG, JPEG).
    Image,
}

impl InputKind {
    /// Classify by lowercase file extension.
    pub fn from_path(path: &Path) -> Result<Self, InvoiceError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());

        match ext.as_deref() {
            Some("pdf") => Ok(InputKind::Document),
            Some("png" | "jpg" | "jpeg") => Ok(InputKind::Image),
            _ => Err(InvoiceError::UnsupportedFormat {
                path: path.to_path_buf(),
            }),
        }
    }
}

/// One upload, consumed once by [`crate::pipeline::extract::Extractor`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionInput {
    pub path: PathBuf,
    pub kind: InputKind,
}

impl ExtractionInput {
    pub fn new(path: impl Into<PathBuf>, kind: InputKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }
}

/// Validate a local file and classify it.
pub fn resolve_input(path: impl AsRef<Path>) -> Result<ExtractionInput, InvoiceError> {
    let path = path.as_ref().to_path_buf();

    if !path.exists() {
        return Err(InvoiceError::FileNotFound { path });
    }

    let kind = InputKind::from_path(&path)?;

    match std::fs::File::open(&path) {
        Ok(mut f) => {
            if kind == InputKind::Document {
                let mut magic = [0u8; 4];
                if f.read_exact(&mut magic).is_ok() && &magic != b"%PDF" {
                    return Err(InvoiceError::NotAPdf { path, magic });
                }
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(InvoiceError::PermissionDenied { path });
        }
        Err(_) => {
            return Err(InvoiceError::FileNotFound { path });
        }
    }

    debug!("Resolved {:?} input: {}", kind, path.display());
    Ok(ExtractionInput { path, kind })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_kind_from_extension() {
        assert_eq!(
            InputKind::from_path(Path::new("a/factura.pdf")).unwrap(),
            InputKind::Document
        );
        assert_eq!(
            InputKind::from_path(Path::new("scan.PNG")).unwrap(),
            InputKind::Image
        );
        assert_eq!(
            InputKind::from_path(Path::new("scan.Jpeg")).unwrap(),
            InputKind::Image
        );
        assert!(matches!(
            InputKind::from_path(Path::new("scan.tiff")),
            Err(InvoiceError::UnsupportedFormat { .. })
        ));
        assert!(InputKind::from_path(Path::new("noext")).is_err());
    }

    #[test]
    fn test_missing_file() {
        let err = resolve_input("/definitely/not/here.pdf").unwrap_err();
        assert!(matches!(err, InvoiceError::FileNotFound { .. }));
    }

    #[test]
    fn test_pdf_magic_checked() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fake.pdf");
        std::fs::File::create(&path)
            .unwrap()
            .write_all(b"GIF89a not a pdf")
            .unwrap();

        let err = resolve_input(&path).unwrap_err();
        assert!(matches!(err, InvoiceError::NotAPdf { magic, .. } if &magic == b"GIF8"));
    }

    #[test]
    fn test_valid_inputs() {
        let dir = tempfile::tempdir().unwrap();
        let pdf = dir.path().join("ok.pdf");
        std::fs::write(&pdf, b"%PDF-1.7\n").unwrap();
        let png = dir.path().join("ok.png");
        std::fs::write(&png, b"\x89PNG").unwrap();

        assert_eq!(resolve_input(&pdf).unwrap().kind, InputKind::Document);
        let img = resolve_input(&png).unwrap();
        assert_eq!(img, ExtractionInput::new(&png, InputKind::Image));
    }
}
