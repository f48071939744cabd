//! Image enhancement before the second OCR pass.
//!
//! Phone photos and low-DPI scans often come back from tesseract as noise.
//! Upscaling, dropping colour, lifting brightness/contrast and sharpening
//! edges is usually enough to get the headings recognised.
//!
//! Enhancers never touch the input file. They write a fresh `ocr_*.png` and
//! hand back a [`TempPath`]; the file disappears when the caller drops it,
//! whether the OCR that follows succeeded or not.

use crate::config::{EnhancerKind, InvoiceConfig};
use crate::error::EnhanceError;
use image::imageops::FilterType;
use image::{GenericImageView, ImageFormat};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use tempfile::TempPath;
use tracing::debug;

/// Produces an enhanced copy of an image in a scoped temporary file.
pub trait ImageEnhancer: Send + Sync {
    fn enhance(&self, src: &Path) -> Result<TempPath, EnhanceError>;
}

/// Build the enhancer selected in the config.
pub fn from_config(config: &InvoiceConfig) -> Arc<dyn ImageEnhancer> {
    match config.enhancer {
        EnhancerKind::Raster => Arc::new(RasterEnhancer::from_config(config)),
        EnhancerKind::ImageMagick => Arc::new(MagickEnhancer::new(&config.magick_path)),
    }
}

/// Fresh, empty `ocr_*.png` path that is removed on drop.
pub fn scratch_png() -> Result<TempPath, EnhanceError> {
    tempfile::Builder::new()
        .prefix("ocr_")
        .suffix(".png")
        .tempfile()
        .map(|f| f.into_temp_path())
        .map_err(EnhanceError::TempFile)
}

// ── In-process enhancer ──────────────────────────────────────────────────────

/// Transform chain implemented with the `image` crate.
#[derive(Debug, Clone)]
pub struct RasterEnhancer {
    pub scale: u32,
    pub max_dimension: u32,
    pub brightness: i32,
    pub contrast: f32,
    pub sharpen_sigma: f32,
}

impl Default for RasterEnhancer {
    fn default() -> Self {
        Self::from_config(&InvoiceConfig::default())
    }
}

impl RasterEnhancer {
    pub fn from_config(config: &InvoiceConfig) -> Self {
        Self {
            scale: config.enhance_scale.max(1),
            max_dimension: config.enhance_max_dimension,
            brightness: config.enhance_brightness,
            contrast: config.enhance_contrast,
            sharpen_sigma: config.enhance_sharpen_sigma,
        }
    }

    /// Target size after upscaling, longest edge capped at `max_dimension`.
    fn target_size(&self, width: u32, height: u32) -> (u32, u32) {
        let w = width.saturating_mul(self.scale);
        let h = height.saturating_mul(self.scale);
        let longest = w.max(h);
        if longest <= self.max_dimension || longest == 0 {
            return (w, h);
        }
        let ratio = self.max_dimension as f64 / longest as f64;
        (
            ((w as f64 * ratio).round() as u32).max(1),
            ((h as f64 * ratio).round() as u32).max(1),
        )
    }
}

impl ImageEnhancer for RasterEnhancer {
    fn enhance(&self, src: &Path) -> Result<TempPath, EnhanceError> {
        let img = image::open(src)?;
        let (w, h) = img.dimensions();
        let (tw, th) = self.target_size(w, h);

        let enhanced = img
            .resize_exact(tw, th, FilterType::CatmullRom)
            .grayscale()
            .brighten(self.brightness)
            .adjust_contrast(self.contrast)
            .unsharpen(self.sharpen_sigma, 0);

        let out = scratch_png()?;
        enhanced.save_with_format(&out, ImageFormat::Png)?;
        debug!(
            "Enhanced {} {}x{} → {}x{} at {}",
            src.display(),
            w,
            h,
            tw,
            th,
            out.display()
        );
        Ok(out)
    }
}

// ── ImageMagick enhancer ─────────────────────────────────────────────────────

/// Runs ImageMagick with a fixed argument chain, reporting exit status and
/// stderr instead of leaving a corrupt file behind.
#[derive(Debug, Clone)]
pub struct MagickEnhancer {
    binary: PathBuf,
}

impl MagickEnhancer {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    pub fn args(src: &Path, out: &Path) -> Vec<String> {
        let mut args = vec![src.to_string_lossy().into_owned()];
        args.extend(
            [
                "-resize",
                "300%",
                "-colorspace",
                "Gray",
                "-brightness-contrast",
                "20x20",
                "-sharpen",
                "0x1",
            ]
            .map(String::from),
        );
        args.push(out.to_string_lossy().into_owned());
        args
    }
}

impl ImageEnhancer for MagickEnhancer {
    fn enhance(&self, src: &Path) -> Result<TempPath, EnhanceError> {
        let out = scratch_png()?;
        let output = Command::new(&self.binary)
            .args(Self::args(src, &out))
            .output()
            .map_err(|source| EnhanceError::Spawn {
                binary: self.binary.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(EnhanceError::ProcessFailed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(out)
    }
}
