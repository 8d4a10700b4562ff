//! # Image Loading
//!
//! Resolves an image `src` (a `data:` URL, a file path or bare base64) into
//! bytes the PDF writer can embed. JPEG passes through untouched as
//! DCTDecode. PNG is decoded, downsampled to the raster budget, then stored
//! as JPEG when opaque or as RGB with a separate alpha mask when not.

use base64::Engine;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{ColorType, GenericImageView};
use std::io::Cursor;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("Invalid data URL")]
    InvalidDataUrl,

    #[error("Base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Failed to read image file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unsupported image format (expected JPEG or PNG)")]
    Unsupported,

    #[error("Failed to decode image: {0}")]
    Decode(#[from] image::ImageError),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ImagePixels {
    /// Encoded JPEG, embedded with `/DCTDecode`.
    Jpeg { data: Vec<u8>, gray: bool },
    /// Raw RGB triples plus an optional 8-bit alpha plane.
    Rgb { rgb: Vec<u8>, alpha: Option<Vec<u8>> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoadedImage {
    pub pixels: ImagePixels,
    pub width: u32,
    pub height: u32,
}

/// Limits applied when an image has to be decoded.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RasterBudget {
    pub max_width: u32,
    pub max_height: u32,
    /// JPEG quality, 1..=100.
    pub quality: u8,
}

impl RasterBudget {
    /// Budget for a box of `width` x `height` card pixels at `scale`
    /// device pixels per card pixel, with quality given as 0.1..=1.0.
    pub fn for_box(width: f64, height: f64, scale: f64, quality: f64) -> Self {
        let px = |v: f64| (v * scale).ceil().clamp(1.0, 8192.0) as u32;
        Self {
            max_width: px(width),
            max_height: px(height),
            quality: (quality * 100.0).round().clamp(1.0, 100.0) as u8,
        }
    }
}

pub fn load_image(src: &str, budget: RasterBudget) -> Result<LoadedImage, ImageError> {
    decode_image_bytes(&read_source_bytes(src)?, budget)
}

fn read_source_bytes(src: &str) -> Result<Vec<u8>, ImageError> {
    let src = src.trim();
    if let Some(rest) = src.strip_prefix("data:") {
        let (header, payload) = rest.split_once(',').ok_or(ImageError::InvalidDataUrl)?;
        if !header.ends_with(";base64") {
            return Err(ImageError::InvalidDataUrl);
        }
        return Ok(base64::engine::general_purpose::STANDARD.decode(payload)?);
    }
    // Explicit path prefixes only; base64 text can contain '/'.
    if src.starts_with('/') || src.starts_with("./") || src.starts_with("../") {
        return Ok(std::fs::read(Path::new(src))?);
    }
    Ok(base64::engine::general_purpose::STANDARD.decode(src)?)
}

fn is_jpeg(data: &[u8]) -> bool {
    data.starts_with(&[0xFF, 0xD8])
}

fn is_png(data: &[u8]) -> bool {
    data.starts_with(&[0x89, 0x50, 0x4E, 0x47])
}

fn decode_image_bytes(data: &[u8], budget: RasterBudget) -> Result<LoadedImage, ImageError> {
    if is_jpeg(data) {
        let (width, height) = image::io::Reader::with_format(Cursor::new(data), image::ImageFormat::Jpeg)
            .into_dimensions()?;
        return Ok(LoadedImage {
            pixels: ImagePixels::Jpeg { data: data.to_vec(), gray: jpeg_is_gray(data) },
            width,
            height,
        });
    }
    if !is_png(data) {
        return Err(ImageError::Unsupported);
    }

    let mut img = image::load_from_memory_with_format(data, image::ImageFormat::Png)?;
    if img.width() > budget.max_width || img.height() > budget.max_height {
        // `resize` keeps the aspect ratio inside the bounds.
        img = img.resize(budget.max_width, budget.max_height, FilterType::Triangle);
    }
    let (width, height) = img.dimensions();
    let rgba = img.to_rgba8();

    let mut rgb = Vec::with_capacity((width * height * 3) as usize);
    let mut alpha = Vec::with_capacity((width * height) as usize);
    for pixel in rgba.pixels() {
        rgb.extend_from_slice(&pixel.0[..3]);
        alpha.push(pixel.0[3]);
    }

    if alpha.iter().any(|&a| a != 255) {
        return Ok(LoadedImage {
            pixels: ImagePixels::Rgb { rgb, alpha: Some(alpha) },
            width,
            height,
        });
    }

    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, budget.quality).encode(&rgb, width, height, ColorType::Rgb8)?;
    Ok(LoadedImage {
        pixels: ImagePixels::Jpeg { data: jpeg, gray: false },
        width,
        height,
    })
}

/// Component count from the first SOF marker; anything unreadable is RGB.
fn jpeg_is_gray(data: &[u8]) -> bool {
    let mut i = 2;
    while i + 3 < data.len() && data[i] == 0xFF {
        let marker = data[i + 1];
        if matches!(marker, 0xC0..=0xC3 | 0xC5..=0xC7 | 0xC9..=0xCB | 0xCD..=0xCF) {
            return data.get(i + 9) == Some(&1);
        }
        i += 2 + u16::from_be_bytes([data[i + 2], data[i + 3]]) as usize;
    }
    false
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::{ImageEncoder, Rgb, RgbImage, Rgba, RgbaImage};

    pub(crate) fn jpeg_data_url(width: u32, height: u32) -> String {
        let img = RgbImage::from_pixel(width, height, Rgb([200, 40, 40]));
        let mut buf = Vec::new();
        JpegEncoder::new_with_quality(&mut buf, 90)
            .encode(img.as_raw(), width, height, ColorType::Rgb8)
            .unwrap();
        format!("data:image/jpeg;base64,{}", base64::engine::general_purpose::STANDARD.encode(buf))
    }

    pub(crate) fn png_data_url(width: u32, height: u32, alpha: u8) -> String {
        let img = RgbaImage::from_pixel(width, height, Rgba([10, 120, 60, alpha]));
        let mut buf = Vec::new();
        image::codecs::png::PngEncoder::new(&mut buf)
            .write_image(img.as_raw(), width, height, ColorType::Rgba8)
            .unwrap();
        format!("data:image/png;base64,{}", base64::engine::general_purpose::STANDARD.encode(buf))
    }

    fn budget() -> RasterBudget {
        RasterBudget::for_box(100.0, 120.0, 2.0, 0.9)
    }

    #[test]
    fn test_budget_from_box() {
        let b = budget();
        assert_eq!((b.max_width, b.max_height, b.quality), (200, 240, 90));
    }

    #[test]
    fn test_jpeg_passes_through() {
        let src = jpeg_data_url(8, 4);
        let loaded = load_image(&src, budget()).unwrap();
        assert_eq!((loaded.width, loaded.height), (8, 4));
        match loaded.pixels {
            ImagePixels::Jpeg { data, gray } => {
                assert!(is_jpeg(&data));
                assert!(!gray);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_opaque_png_becomes_jpeg() {
        let loaded = load_image(&png_data_url(4, 4, 255), budget()).unwrap();
        assert!(matches!(loaded.pixels, ImagePixels::Jpeg { .. }));
    }

    #[test]
    fn test_transparent_png_keeps_alpha() {
        let loaded = load_image(&png_data_url(3, 2, 128), budget()).unwrap();
        match loaded.pixels {
            ImagePixels::Rgb { rgb, alpha } => {
                assert_eq!(rgb.len(), 3 * 2 * 3);
                assert_eq!(alpha.unwrap().len(), 6);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_large_png_downsampled() {
        let small = RasterBudget::for_box(10.0, 10.0, 1.0, 0.9);
        let loaded = load_image(&png_data_url(40, 20, 255), small).unwrap();
        assert_eq!((loaded.width, loaded.height), (10, 5));
    }

    #[test]
    fn test_bad_sources_rejected() {
        assert!(matches!(load_image("data:image/png,abc", budget()), Err(ImageError::InvalidDataUrl)));
        assert!(matches!(load_image("data:image/png;base64", budget()), Err(ImageError::InvalidDataUrl)));
        assert!(matches!(load_image("AAAAAAAA", budget()), Err(ImageError::Unsupported)));
        assert!(matches!(load_image("/nonexistent/photo.jpg", budget()), Err(ImageError::Io(_))));
    }
}
