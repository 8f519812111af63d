use crate::constants::{
    LIBDEFLATER_MAX_LEVEL, MAX_OXIPNG_PRESET, MAX_QUALITY, MIN_QUALITY, PNG_COMPRESSION_LEVEL,
    PNG_EFFORT,
};
use crate::error::{CompressionError, Result};
use crate::formats::ImageKind;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat, RgbImage, RgbaImage};
use mozjpeg::{ColorSpace, Compress};
use oxipng::{Deflaters, Options, StripChunks};
use std::cell::OnceCell;
use std::fs;
use std::io::Cursor;
use std::path::Path;

const JPEG_SOI: [u8; 2] = [0xFF, 0xD8];

/// Source bytes of one input together with its detected format.
///
/// The decoded pixels are cached on first use, so a search that encodes the
/// same image many times only decodes it once.
pub struct SourceImage {
    bytes: Vec<u8>,
    kind: ImageKind,
    decoded: OnceCell<DynamicImage>,
}

impl SourceImage {
    pub fn new(bytes: Vec<u8>, kind: ImageKind) -> Self {
        Self {
            bytes,
            kind,
            decoded: OnceCell::new(),
        }
    }

    /// Reads a file and detects its format from the extension.
    ///
    /// The format check runs first so unsupported inputs are rejected without
    /// touching the file contents.
    pub fn open(path: &Path) -> Result<Self> {
        let kind = ImageKind::from_path(path)?;
        let bytes = fs::read(path)?;
        Ok(Self::new(bytes, kind))
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn kind(&self) -> ImageKind {
        self.kind
    }

    /// Size of the source file in bytes.
    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn decoded(&self) -> image::ImageResult<&DynamicImage> {
        if let Some(img) = self.decoded.get() {
            return Ok(img);
        }
        let format = match self.kind {
            ImageKind::Png => ImageFormat::Png,
            ImageKind::Jpeg => ImageFormat::Jpeg,
        };
        let img = image::load_from_memory_with_format(&self.bytes, format)?;
        Ok(self.decoded.get_or_init(|| img))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChromaSubsampling {
    /// 4:4:4, full chroma resolution
    Yuv444,
    /// 4:2:0, one chroma sample per 2x2 block
    Yuv420,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PngParams {
    pub quality: u8,
    pub compression_level: u8,
    pub effort: u8,
    pub palette: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JpegParams {
    pub quality: u8,
    /// mozjpeg instead of the baseline encoder
    pub advanced_encoder: bool,
    pub chroma_subsampling: ChromaSubsampling,
    pub strip_metadata: bool,
}

/// Format-specific parameters for a single encode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodeParams {
    Png(PngParams),
    Jpeg(JpegParams),
}

impl EncodeParams {
    /// Settings used by the quality-only pass and the binary search.
    pub fn standard(kind: ImageKind, quality: u8) -> Self {
        match kind {
            ImageKind::Png => EncodeParams::Png(PngParams {
                quality,
                compression_level: PNG_COMPRESSION_LEVEL,
                effort: PNG_EFFORT,
                palette: true,
            }),
            ImageKind::Jpeg => EncodeParams::Jpeg(JpegParams {
                quality,
                advanced_encoder: true,
                chroma_subsampling: ChromaSubsampling::Yuv444,
                strip_metadata: false,
            }),
        }
    }

    /// Settings used by the aggressive fallback. PNG has nothing left to give
    /// up beyond the lossy palette, so it keeps its standard settings.
    pub fn aggressive(kind: ImageKind, quality: u8) -> Self {
        match kind {
            ImageKind::Png => Self::standard(kind, quality),
            ImageKind::Jpeg => EncodeParams::Jpeg(JpegParams {
                quality,
                advanced_encoder: true,
                chroma_subsampling: ChromaSubsampling::Yuv420,
                strip_metadata: true,
            }),
        }
    }

    pub fn quality(&self) -> u8 {
        match self {
            EncodeParams::Png(p) => p.quality,
            EncodeParams::Jpeg(p) => p.quality,
        }
    }
}

/// Turns a source image into encoded bytes at a given setting.
///
/// Implementations must be deterministic: the same source and parameters
/// always produce the same bytes. The search relies on this to reproduce its
/// best attempt.
pub trait Encoder: Send + Sync {
    fn encode(&self, source: &SourceImage, params: &EncodeParams) -> Result<Vec<u8>>;
}

impl<E: Encoder + ?Sized> Encoder for &E {
    fn encode(&self, source: &SourceImage, params: &EncodeParams) -> Result<Vec<u8>> {
        (**self).encode(source, params)
    }
}

/// Production encoder: `image` decodes, `mozjpeg` writes JPEG, `imagequant`
/// and `oxipng` write PNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct CodecEncoder;

impl Encoder for CodecEncoder {
    fn encode(&self, source: &SourceImage, params: &EncodeParams) -> Result<Vec<u8>> {
        let quality = params.quality();
        if !(MIN_QUALITY..=MAX_QUALITY).contains(&quality) {
            return Err(CompressionError::encode(
                quality,
                format!("quality must be between {} and {}", MIN_QUALITY, MAX_QUALITY),
            ));
        }

        match params {
            EncodeParams::Png(p) => encode_png(source, p),
            EncodeParams::Jpeg(p) => encode_jpeg(source, p),
        }
    }
}

fn encode_png(source: &SourceImage, params: &PngParams) -> Result<Vec<u8>> {
    let img = source
        .decoded()
        .map_err(|e| CompressionError::encode(params.quality, e))?;

    let mut rgba = img.to_rgba8();
    if params.palette {
        quantize_palette(&mut rgba, params)?;
    }

    let mut raw = Vec::new();
    DynamicImage::ImageRgba8(rgba)
        .write_to(&mut Cursor::new(&mut raw), ImageFormat::Png)
        .map_err(|e| CompressionError::encode(params.quality, e))?;

    oxipng::optimize_from_memory(&raw, &oxipng_options(params))
        .map_err(|e| CompressionError::encode(params.quality, e))
}

fn oxipng_options(params: &PngParams) -> Options {
    // effort 0..=10 onto presets 0..=6, zlib levels 1..=9 onto libdeflate 1..=12
    let preset = (params.effort.min(PNG_EFFORT) as u32 * MAX_OXIPNG_PRESET as u32
        / PNG_EFFORT as u32) as u8;
    let level = (params.compression_level.clamp(1, 9) as u32 * LIBDEFLATER_MAX_LEVEL as u32 / 9)
        as u8;

    let mut options = Options::from_preset(preset);
    options.force = true;
    options.strip = StripChunks::Safe;
    options.deflate = Deflaters::Libdeflater { compression: level };
    options
}

/// libimagequant speed for an effort level: effort 10 is speed 1, the slowest.
pub fn quantizer_speed(effort: u8) -> i32 {
    (11 - effort.min(PNG_EFFORT) as i32).clamp(1, 10)
}

/// Remaps the image onto a palette of at most 256 colors chosen by
/// libimagequant, targeting `quality`. oxipng then stores the result as an
/// indexed PNG.
fn quantize_palette(image: &mut RgbaImage, params: &PngParams) -> Result<()> {
    let quality = params.quality;
    let fail = |e: imagequant::Error| CompressionError::encode(quality, e);
    let (width, height) = image.dimensions();

    let mut liq = imagequant::new();
    liq.set_speed(quantizer_speed(params.effort)).map_err(fail)?;
    liq.set_quality(0, quality).map_err(fail)?;

    let pixels: Vec<imagequant::RGBA> = image
        .pixels()
        .map(|p| imagequant::RGBA::new(p[0], p[1], p[2], p[3]))
        .collect();
    let mut img = liq
        .new_image(pixels, width as usize, height as usize, 0.0)
        .map_err(fail)?;

    let mut quantized = liq.quantize(&mut img).map_err(fail)?;
    quantized.set_dithering_level(1.0).map_err(fail)?;
    let (palette, indices) = quantized.remapped(&mut img).map_err(fail)?;

    for (pixel, index) in image.pixels_mut().zip(indices) {
        let color = palette[index as usize];
        pixel.0 = [color.r, color.g, color.b, color.a];
    }
    Ok(())
}

fn encode_jpeg(source: &SourceImage, params: &JpegParams) -> Result<Vec<u8>> {
    let img = source
        .decoded()
        .map_err(|e| CompressionError::encode(params.quality, e))?;
    let rgb = img.to_rgb8();

    let encoded = if params.advanced_encoder {
        encode_mozjpeg(&rgb, params)?
    } else {
        encode_baseline(&rgb, params)?
    };

    if params.strip_metadata || source.kind() != ImageKind::Jpeg {
        return Ok(encoded);
    }

    let segments = metadata_segments(source.bytes());
    Ok(splice_segments(encoded, &segments))
}

/// mozjpeg with its default max-compression profile: trellis quantization,
/// optimized Huffman tables and progressive scans.
fn encode_mozjpeg(rgb: &RgbImage, params: &JpegParams) -> Result<Vec<u8>> {
    let fail = |e: std::io::Error| CompressionError::encode(params.quality, e);
    let (width, height) = rgb.dimensions();

    let mut comp = Compress::new(ColorSpace::JCS_RGB);
    comp.set_size(width as usize, height as usize);
    comp.set_quality(params.quality as f32);
    match params.chroma_subsampling {
        ChromaSubsampling::Yuv444 => comp.set_chroma_sampling_pixel_sizes((1, 1), (1, 1)),
        ChromaSubsampling::Yuv420 => comp.set_chroma_sampling_pixel_sizes((2, 2), (2, 2)),
    }

    let mut started = comp.start_compress(Vec::new()).map_err(fail)?;
    started.write_scanlines(rgb.as_raw()).map_err(fail)?;
    started.finish().map_err(fail)
}

/// The `image` crate's baseline encoder, which only writes 4:4:4.
fn encode_baseline(rgb: &RgbImage, params: &JpegParams) -> Result<Vec<u8>> {
    if params.chroma_subsampling != ChromaSubsampling::Yuv444 {
        return Err(CompressionError::encode(
            params.quality,
            "chroma subsampling needs the advanced encoder",
        ));
    }

    let mut encoded = Vec::new();
    JpegEncoder::new_with_quality(&mut encoded, params.quality)
        .encode_image(rgb)
        .map_err(|e| CompressionError::encode(params.quality, e))?;
    Ok(encoded)
}

/// Collects the APP1 (EXIF/XMP), APP2 (ICC) and APP13 (IPTC) segments that
/// precede the first scan of a JPEG, marker and length bytes included.
pub fn metadata_segments(jpeg: &[u8]) -> Vec<&[u8]> {
    let mut segments = Vec::new();
    if !jpeg.starts_with(&JPEG_SOI) {
        return segments;
    }

    let mut pos = JPEG_SOI.len();
    while pos + 4 <= jpeg.len() {
        if jpeg[pos] != 0xFF {
            break;
        }
        let marker = jpeg[pos + 1];
        match marker {
            // fill byte
            0xFF => {
                pos += 1;
                continue;
            }
            // start of scan, end of image
            0xDA | 0xD9 => break,
            // markers without a length field
            0x01 | 0xD0..=0xD7 => {
                pos += 2;
                continue;
            }
            _ => {}
        }

        let len = u16::from_be_bytes([jpeg[pos + 2], jpeg[pos + 3]]) as usize;
        let end = pos + 2 + len;
        if len < 2 || end > jpeg.len() {
            break;
        }
        if matches!(marker, 0xE1 | 0xE2 | 0xED) {
            segments.push(&jpeg[pos..end]);
        }
        pos = end;
    }

    segments
}

/// Inserts segments right after SOI, or after a leading JFIF APP0 segment.
pub fn splice_segments(encoded: Vec<u8>, segments: &[&[u8]]) -> Vec<u8> {
    if segments.is_empty() || !encoded.starts_with(&JPEG_SOI) {
        return encoded;
    }

    let mut insert_at = JPEG_SOI.len();
    if encoded.len() >= 6 && encoded[2] == 0xFF && encoded[3] == 0xE0 {
        let app0_end = 4 + u16::from_be_bytes([encoded[4], encoded[5]]) as usize;
        if app0_end <= encoded.len() {
            insert_at = app0_end;
        }
    }

    let extra: usize = segments.iter().map(|s| s.len()).sum();
    let mut out = Vec::with_capacity(encoded.len() + extra);
    out.extend_from_slice(&encoded[..insert_at]);
    for segment in segments {
        out.extend_from_slice(segment);
    }
    out.extend_from_slice(&encoded[insert_at..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GenericImageView, Rgb};
    use std::collections::HashSet;

    fn noisy_rgb(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| {
            let noise = (x.wrapping_mul(7919) ^ y.wrapping_mul(104_729)) % 64;
            Rgb([
                ((x * 255 / width) as u8).wrapping_add(noise as u8),
                ((y * 255 / height) as u8).wrapping_add((noise / 2) as u8),
                ((x + y) % 256) as u8,
            ])
        })
    }

    fn encode_source(kind: ImageKind, img: &RgbImage) -> SourceImage {
        let mut bytes = Vec::new();
        let format = match kind {
            ImageKind::Png => ImageFormat::Png,
            ImageKind::Jpeg => ImageFormat::Jpeg,
        };
        DynamicImage::ImageRgb8(img.clone())
            .write_to(&mut Cursor::new(&mut bytes), format)
            .unwrap();
        SourceImage::new(bytes, kind)
    }

    fn exif_segment() -> Vec<u8> {
        let payload = b"Exif\0\0img-fit-test-marker";
        let len = (payload.len() + 2) as u16;
        let mut segment = vec![0xFF, 0xE1];
        segment.extend_from_slice(&len.to_be_bytes());
        segment.extend_from_slice(payload);
        segment
    }

    /// Per-component sampling bytes of the first SOF segment.
    fn frame_sampling(jpeg: &[u8]) -> Vec<u8> {
        let mut pos = 2;
        while pos + 4 <= jpeg.len() {
            let marker = jpeg[pos + 1];
            let len = u16::from_be_bytes([jpeg[pos + 2], jpeg[pos + 3]]) as usize;
            if matches!(marker, 0xC0..=0xC2) {
                let components = jpeg[pos + 9] as usize;
                return (0..components).map(|i| jpeg[pos + 11 + i * 3]).collect();
            }
            pos += 2 + len;
        }
        panic!("no SOF segment");
    }

    fn contains(haystack: &[u8], needle: &[u8]) -> bool {
        haystack.windows(needle.len()).any(|w| w == needle)
    }

    #[test]
    fn test_standard_and_aggressive_params() {
        let png = EncodeParams::standard(ImageKind::Png, 70);
        assert_eq!(
            png,
            EncodeParams::Png(PngParams {
                quality: 70,
                compression_level: 9,
                effort: 10,
                palette: true,
            })
        );
        assert_eq!(EncodeParams::aggressive(ImageKind::Png, 70), png);

        let jpeg = EncodeParams::aggressive(ImageKind::Jpeg, 30);
        assert_eq!(
            jpeg,
            EncodeParams::Jpeg(JpegParams {
                quality: 30,
                advanced_encoder: true,
                chroma_subsampling: ChromaSubsampling::Yuv420,
                strip_metadata: true,
            })
        );
        assert_eq!(jpeg.quality(), 30);
    }

    #[test]
    fn test_oxipng_options_use_maximum_settings() {
        let params = PngParams {
            quality: 80,
            compression_level: PNG_COMPRESSION_LEVEL,
            effort: PNG_EFFORT,
            palette: true,
        };
        let options = oxipng_options(&params);
        assert!(options.force);
        assert!(matches!(
            options.deflate,
            Deflaters::Libdeflater { compression: 12 }
        ));
    }

    #[test]
    fn test_quantizer_speed_follows_effort() {
        assert_eq!(quantizer_speed(PNG_EFFORT), 1);
        assert_eq!(quantizer_speed(1), 10);
        assert_eq!(quantizer_speed(0), 10);
        assert_eq!(quantizer_speed(5), 6);
    }

    #[test]
    fn test_png_palette_limits_colors() {
        let source = encode_source(ImageKind::Png, &noisy_rgb(64, 64));
        let bytes = CodecEncoder
            .encode(&source, &EncodeParams::standard(ImageKind::Png, 20))
            .unwrap();

        let decoded = image::load_from_memory_with_format(&bytes, ImageFormat::Png)
            .unwrap()
            .to_rgba8();
        let colors: HashSet<[u8; 4]> = decoded.pixels().map(|p| p.0).collect();
        assert!(colors.len() <= 256);
        assert!(colors.len() > 1);
    }

    #[test]
    fn test_png_without_palette_is_lossless() {
        let img = noisy_rgb(24, 24);
        let source = encode_source(ImageKind::Png, &img);
        let params = EncodeParams::Png(PngParams {
            quality: 50,
            compression_level: PNG_COMPRESSION_LEVEL,
            effort: PNG_EFFORT,
            palette: false,
        });
        let bytes = CodecEncoder.encode(&source, &params).unwrap();

        let decoded = image::load_from_memory_with_format(&bytes, ImageFormat::Png).unwrap();
        assert_eq!(decoded.to_rgb8(), img);
    }

    #[test]
    fn test_aggressive_jpeg_uses_420_sampling() {
        let source = encode_source(ImageKind::Jpeg, &noisy_rgb(64, 64));

        let aggressive = CodecEncoder
            .encode(&source, &EncodeParams::aggressive(ImageKind::Jpeg, 30))
            .unwrap();
        assert_eq!(frame_sampling(&aggressive), vec![0x22, 0x11, 0x11]);

        let standard = CodecEncoder
            .encode(&source, &EncodeParams::standard(ImageKind::Jpeg, 30))
            .unwrap();
        assert_eq!(frame_sampling(&standard), vec![0x11, 0x11, 0x11]);
    }

    #[test]
    fn test_advanced_encoder_beats_baseline() {
        let source = encode_source(ImageKind::Jpeg, &noisy_rgb(96, 96));
        let advanced = EncodeParams::standard(ImageKind::Jpeg, 75);
        let EncodeParams::Jpeg(mut baseline) = advanced else {
            unreachable!()
        };
        baseline.advanced_encoder = false;

        let small = CodecEncoder.encode(&source, &advanced).unwrap();
        let large = CodecEncoder
            .encode(&source, &EncodeParams::Jpeg(baseline))
            .unwrap();
        assert!(small.len() < large.len());
        assert!(image::load_from_memory_with_format(&small, ImageFormat::Jpeg).is_ok());
    }

    #[test]
    fn test_baseline_encoder_rejects_subsampling() {
        let source = encode_source(ImageKind::Jpeg, &noisy_rgb(8, 8));
        let params = EncodeParams::Jpeg(JpegParams {
            quality: 40,
            advanced_encoder: false,
            chroma_subsampling: ChromaSubsampling::Yuv420,
            strip_metadata: true,
        });
        assert!(matches!(
            CodecEncoder.encode(&source, &params),
            Err(CompressionError::Encode { quality: 40, .. })
        ));
    }

    #[test]
    fn test_codec_encoder_png_roundtrip_dimensions() {
        let source = encode_source(ImageKind::Png, &noisy_rgb(48, 32));
        let bytes = CodecEncoder
            .encode(&source, &EncodeParams::standard(ImageKind::Png, 60))
            .unwrap();

        let decoded = image::load_from_memory_with_format(&bytes, ImageFormat::Png).unwrap();
        assert_eq!(decoded.dimensions(), (48, 32));
    }

    #[test]
    fn test_codec_encoder_png_lower_quality_is_smaller() {
        let source = encode_source(ImageKind::Png, &noisy_rgb(64, 64));
        let high = CodecEncoder
            .encode(&source, &EncodeParams::standard(ImageKind::Png, 100))
            .unwrap();
        let low = CodecEncoder
            .encode(&source, &EncodeParams::standard(ImageKind::Png, 1))
            .unwrap();
        assert!(low.len() < high.len());
    }

    #[test]
    fn test_codec_encoder_jpeg_lower_quality_is_smaller() {
        let source = encode_source(ImageKind::Jpeg, &noisy_rgb(64, 64));
        let high = CodecEncoder
            .encode(&source, &EncodeParams::standard(ImageKind::Jpeg, 95))
            .unwrap();
        let low = CodecEncoder
            .encode(&source, &EncodeParams::standard(ImageKind::Jpeg, 10))
            .unwrap();
        assert!(low.len() < high.len());
        assert!(high.starts_with(&JPEG_SOI));
    }

    #[test]
    fn test_codec_encoder_is_deterministic() {
        let source = encode_source(ImageKind::Jpeg, &noisy_rgb(40, 40));
        let params = EncodeParams::standard(ImageKind::Jpeg, 75);
        let first = CodecEncoder.encode(&source, &params).unwrap();
        let second = CodecEncoder.encode(&source, &params).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_codec_encoder_rejects_invalid_quality() {
        let source = encode_source(ImageKind::Jpeg, &noisy_rgb(8, 8));
        let result = CodecEncoder.encode(&source, &EncodeParams::standard(ImageKind::Jpeg, 0));
        assert!(matches!(
            result,
            Err(CompressionError::Encode { quality: 0, .. })
        ));
    }

    #[test]
    fn test_codec_encoder_corrupt_source() {
        let source = SourceImage::new(b"definitely not a png".to_vec(), ImageKind::Png);
        let result = CodecEncoder.encode(&source, &EncodeParams::standard(ImageKind::Png, 80));
        assert!(matches!(result, Err(CompressionError::Encode { .. })));
    }

    #[test]
    fn test_metadata_kept_unless_stripped() {
        let plain = encode_source(ImageKind::Jpeg, &noisy_rgb(32, 32));
        let exif = exif_segment();
        let tagged = splice_segments(plain.bytes().to_vec(), &[exif.as_slice()]);
        let source = SourceImage::new(tagged, ImageKind::Jpeg);

        let kept = CodecEncoder
            .encode(&source, &EncodeParams::standard(ImageKind::Jpeg, 70))
            .unwrap();
        assert!(contains(&kept, &exif));

        let stripped = CodecEncoder
            .encode(&source, &EncodeParams::aggressive(ImageKind::Jpeg, 70))
            .unwrap();
        assert!(!contains(&stripped, b"img-fit-test-marker"));
    }

    #[test]
    fn test_metadata_segments_parsing() {
        let exif = exif_segment();
        let mut jpeg = vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x04, 0x4A, 0x46];
        jpeg.extend_from_slice(&exif);
        jpeg.extend_from_slice(&[0xFF, 0xDA, 0x00, 0x02, 0x12, 0x34]);

        let segments = metadata_segments(&jpeg);
        assert_eq!(segments, vec![exif.as_slice()]);

        assert!(metadata_segments(b"not a jpeg").is_empty());
    }

    #[test]
    fn test_splice_segments_after_app0() {
        let encoded = vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x04, 0xAA, 0xBB, 0xFF, 0xD9];
        let segment = [0xFF, 0xE2, 0x00, 0x03, 0x01];
        let out = splice_segments(encoded, &[&segment]);
        assert_eq!(
            out,
            vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x04, 0xAA, 0xBB, 0xFF, 0xE2, 0x00, 0x03, 0x01, 0xFF, 0xD9]
        );
    }

    #[test]
    fn test_source_image_open_unsupported() {
        let result = SourceImage::open(Path::new("picture.gif"));
        assert!(matches!(result, Err(CompressionError::UnsupportedFormat(_))));
    }
}
