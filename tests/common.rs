#![allow(dead_code)]

use image::{DynamicImage, ImageFormat, RgbImage};
use img_fit::encoder::{EncodeParams, Encoder, JpegParams, SourceImage};
use img_fit::{CompressionError, Result};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tempfile::TempDir;

/// Gradient with enough high-frequency noise that quality changes move the
/// encoded size.
pub fn noisy_image(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        let noise = (x.wrapping_mul(7919) ^ y.wrapping_mul(104_729)).wrapping_mul(31) % 97;
        image::Rgb([
            ((x * 255 / width.max(1)) as u8).wrapping_add(noise as u8),
            ((y * 255 / height.max(1)) as u8).wrapping_add((noise * 2) as u8),
            ((x ^ y) % 256) as u8,
        ])
    })
}

pub fn write_image(dir: &Path, name: &str, width: u32, height: u32) -> PathBuf {
    let path = dir.join(name);
    let format = ImageFormat::from_path(&path).unwrap();
    DynamicImage::ImageRgb8(noisy_image(width, height))
        .save_with_format(&path, format)
        .unwrap();
    path
}

pub fn write_bytes(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, bytes).unwrap();
    path
}

pub fn create_temp_directory() -> TempDir {
    TempDir::new().unwrap()
}

pub fn create_test_output_directory(temp_dir: &Path) -> PathBuf {
    let output_dir = temp_dir.join("output");
    std::fs::create_dir(&output_dir).unwrap();
    output_dir
}

/// Encoder double whose output size is a function of quality.
///
/// Output bytes start with the quality and an aggressive flag so tests can
/// check which setting produced a file.
pub struct SyntheticEncoder<F> {
    size: F,
    calls: Mutex<Vec<(u8, bool)>>,
}

impl<F> SyntheticEncoder<F>
where
    F: Fn(u8, bool) -> usize + Send + Sync,
{
    pub fn new(size: F) -> Self {
        Self {
            size,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<(u8, bool)> {
        self.calls.lock().unwrap().clone()
    }
}

impl<F> Encoder for SyntheticEncoder<F>
where
    F: Fn(u8, bool) -> usize + Send + Sync,
{
    fn encode(&self, source: &SourceImage, params: &EncodeParams) -> Result<Vec<u8>> {
        if source.bytes().starts_with(b"CORRUPT") {
            return Err(CompressionError::encode(params.quality(), "corrupt source"));
        }

        let aggressive = matches!(
            params,
            EncodeParams::Jpeg(JpegParams {
                strip_metadata: true,
                ..
            })
        );
        self.calls.lock().unwrap().push((params.quality(), aggressive));

        let mut bytes = vec![0u8; (self.size)(params.quality(), aggressive).max(2)];
        bytes[0] = params.quality();
        bytes[1] = aggressive as u8;
        Ok(bytes)
    }
}
