//! Image format handling
//!
//! Only PNG and JPEG take part in size-targeted compression. The format of an
//! input decides the format of its output; there is no conversion between them.

use crate::constants::SUPPORTED_EXTENSIONS;
use crate::error::{CompressionError, Result};
use serde::Serialize;
use std::fmt;
use std::path::Path;

/// Formats the optimizer can re-encode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ImageKind {
    /// PNG re-encoded through lossy palette quantization and oxipng
    Png,
    /// JPEG re-encoded at a quality setting
    Jpeg,
}

impl ImageKind {
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension.to_lowercase().as_str() {
            "png" => Some(ImageKind::Png),
            "jpg" | "jpeg" => Some(ImageKind::Jpeg),
            _ => None,
        }
    }

    /// Detects the format from a path's extension.
    ///
    /// Fails with `UnsupportedFormat` for anything that is not PNG or JPEG, so
    /// callers can reject an input before any encode is attempted.
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|ext| ext.to_str())
            .ok_or_else(|| {
                CompressionError::UnsupportedFormat(format!(
                    "{} has no file extension",
                    path.display()
                ))
            })?;

        Self::from_extension(ext).ok_or_else(|| {
            CompressionError::UnsupportedFormat(format!(
                "{} (only png, jpg and jpeg are supported)",
                ext
            ))
        })
    }

    /// Returns the canonical file extension for this format
    pub fn extension(&self) -> &'static str {
        match self {
            ImageKind::Png => "png",
            ImageKind::Jpeg => "jpg",
        }
    }
}

impl fmt::Display for ImageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ImageKind::Png => "PNG",
            ImageKind::Jpeg => "JPEG",
        };
        write!(f, "{}", name)
    }
}

/// Whether a path looks like an image the optimizer accepts
pub fn is_supported_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| SUPPORTED_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}
