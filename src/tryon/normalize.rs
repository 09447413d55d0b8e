use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, ImageReader};
use thiserror::Error;
use tracing::{debug, warn};

use crate::tryon::request::InlineImage;

pub const DEFAULT_MAX_DIMENSION: u32 = 2000;
pub const DEFAULT_JPEG_QUALITY: u8 = 95;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NormalizeOptions {
    pub max_dimension: u32,
    pub jpeg_quality: u8,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            max_dimension: DEFAULT_MAX_DIMENSION,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("image format not recognized")]
    UnknownFormat,
    #[error("image read failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("image decode failed: {0}")]
    Image(#[from] image::ImageError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Normalized {
    /// Both edges already within the limit; the caller keeps its bytes.
    Unchanged { width: u32, height: u32 },
    Resized {
        image: InlineImage,
        from: (u32, u32),
        to: (u32, u32),
    },
}

/// Target size that fits `(width, height)` inside `max_dimension`. The longer
/// edge lands exactly on the limit.
pub fn fit_within(width: u32, height: u32, max_dimension: u32) -> (u32, u32) {
    if width <= max_dimension && height <= max_dimension {
        return (width, height);
    }
    if width >= height {
        let scaled = (f64::from(height) * f64::from(max_dimension) / f64::from(width)).round();
        (max_dimension, (scaled as u32).max(1))
    } else {
        let scaled = (f64::from(width) * f64::from(max_dimension) / f64::from(height)).round();
        ((scaled as u32).max(1), max_dimension)
    }
}

pub fn normalize_image(
    image: &InlineImage,
    options: NormalizeOptions,
) -> Result<Normalized, NormalizeError> {
    let reader = ImageReader::new(Cursor::new(image.bytes.as_slice())).with_guessed_format()?;
    let format = reader.format().ok_or(NormalizeError::UnknownFormat)?;
    let (width, height) = reader.into_dimensions()?;

    let (target_w, target_h) = fit_within(width, height, options.max_dimension);
    if (target_w, target_h) == (width, height) {
        return Ok(Normalized::Unchanged { width, height });
    }

    let decoded = image::load_from_memory_with_format(image.bytes.as_slice(), format)?;
    let resized = decoded.resize_exact(target_w, target_h, FilterType::Lanczos3);
    let (bytes, mime) = encode(&resized, format, options.jpeg_quality)?;

    Ok(Normalized::Resized {
        image: InlineImage::new(mime, bytes),
        from: (width, height),
        to: (target_w, target_h),
    })
}

/// Normalizes `image`, handing back the original bytes if anything fails.
pub fn normalize_or_original(image: InlineImage, options: NormalizeOptions) -> InlineImage {
    match normalize_image(&image, options) {
        Ok(Normalized::Resized {
            image: resized,
            from,
            to,
        }) => {
            debug!(
                from_w = from.0,
                from_h = from.1,
                to_w = to.0,
                to_h = to.1,
                mime = %resized.mime,
                "downscaled image before submission"
            );
            resized
        }
        Ok(Normalized::Unchanged { .. }) => image,
        Err(error) => {
            warn!(
                error = %error,
                mime = %image.mime,
                "image normalization failed, submitting original bytes"
            );
            image
        }
    }
}

// JPEG stays lossy JPEG at the configured quality; everything else is written
// as PNG since the other enabled encoders are lossless or lack a quality knob.
fn encode(
    image: &DynamicImage,
    source: ImageFormat,
    jpeg_quality: u8,
) -> Result<(Vec<u8>, &'static str), NormalizeError> {
    let mut buf = Vec::new();
    if source == ImageFormat::Jpeg {
        let rgb = image.to_rgb8();
        let encoder = JpegEncoder::new_with_quality(&mut buf, jpeg_quality);
        rgb.write_with_encoder(encoder)?;
        return Ok((buf, ImageFormat::Jpeg.to_mime_type()));
    }
    image.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)?;
    Ok((buf, ImageFormat::Png.to_mime_type()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use pretty_assertions::assert_eq;

    fn encoded(width: u32, height: u32, format: ImageFormat) -> InlineImage {
        let img = RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x % 251) as u8, (y % 241) as u8, ((x + y) % 239) as u8])
        });
        let mut buf = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut buf), format)
            .expect("test image should encode");
        InlineImage::new(format.to_mime_type(), buf)
    }

    fn dimensions(image: &InlineImage) -> (u32, u32) {
        ImageReader::new(Cursor::new(image.bytes.as_slice()))
            .with_guessed_format()
            .expect("guess format")
            .into_dimensions()
            .expect("dimensions")
    }

    #[test]
    fn fit_within_keeps_small_images() {
        assert_eq!(fit_within(2000, 1500, 2000), (2000, 1500));
        assert_eq!(fit_within(10, 10, 2000), (10, 10));
    }

    #[test]
    fn fit_within_pins_longer_edge() {
        assert_eq!(fit_within(4000, 3000, 2000), (2000, 1500));
        assert_eq!(fit_within(3000, 4500, 2000), (1333, 2000));
        assert_eq!(fit_within(10000, 3, 2000), (2000, 1));
    }

    #[test]
    fn images_within_limit_are_byte_identical() {
        let original = encoded(64, 40, ImageFormat::Png);
        let out = normalize_image(
            &original,
            NormalizeOptions {
                max_dimension: 64,
                ..NormalizeOptions::default()
            },
        )
        .expect("normalize should succeed");
        assert_eq!(
            out,
            Normalized::Unchanged {
                width: 64,
                height: 40
            }
        );
        assert_eq!(
            normalize_or_original(
                original.clone(),
                NormalizeOptions {
                    max_dimension: 64,
                    ..NormalizeOptions::default()
                },
            ),
            original
        );
    }

    #[test]
    fn oversized_jpeg_is_downscaled_preserving_aspect() {
        let original = encoded(300, 180, ImageFormat::Jpeg);
        let out = normalize_image(
            &original,
            NormalizeOptions {
                max_dimension: 100,
                ..NormalizeOptions::default()
            },
        )
        .expect("normalize should succeed");

        let Normalized::Resized { image, from, to } = out else {
            panic!("expected a resized image");
        };
        assert_eq!(from, (300, 180));
        assert_eq!(to, (100, 60));
        assert_eq!(image.mime, "image/jpeg");
        let (w, h) = dimensions(&image);
        assert_eq!(w.max(h), 100);
        let aspect_in = 300.0 / 180.0;
        let aspect_out = f64::from(w) / f64::from(h);
        assert!((aspect_in - aspect_out).abs() < 0.02);
    }

    #[test]
    fn oversized_portrait_png_stays_png() {
        let original = encoded(50, 120, ImageFormat::Png);
        let out = normalize_image(
            &original,
            NormalizeOptions {
                max_dimension: 60,
                ..NormalizeOptions::default()
            },
        )
        .expect("normalize should succeed");
        let Normalized::Resized { image, .. } = out else {
            panic!("expected a resized image");
        };
        assert_eq!(image.mime, "image/png");
        assert_eq!(dimensions(&image), (25, 60));
    }

    #[test]
    fn garbage_bytes_fall_back_to_original() {
        let original = InlineImage::new("image/jpeg", b"definitely not an image".to_vec());
        assert!(normalize_image(&original, NormalizeOptions::default()).is_err());
        assert_eq!(
            normalize_or_original(original.clone(), NormalizeOptions::default()),
            original
        );
    }
}
