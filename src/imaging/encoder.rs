//! Lossless-or-lossy encoding of a rendered surface.
//!
//! The surface is encoded twice, as PNG and as JPEG, and the smaller
//! acceptable one is kept. Sizes are the lengths of the `data:` URLs each
//! form travels as, so base64 expansion and the media type count:
//!
//! | PNG URL length vs. JPEG URL length | Result |
//! |---|---|
//! | `png < jpeg * ratio` | PNG (keeps line art and screenshots exact) |
//! | otherwise | JPEG (photographic content) |
//!
//! With the default ratio of 2, a 100-byte PNG beats a 60-byte JPEG
//! (100 < 120), while a 300-byte PNG loses to it. The ratio and the JPEG
//! quality come from [`EncodePolicy`].
//!
//! JPEG has no alpha channel; the lossy form drops it.

use super::params::EncodePolicy;
use super::surface::Surface;
use crate::transport::data_url;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{DynamicImage, ExtendedColorType, ImageEncoder};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("nothing to encode: surface is empty")]
    EmptySurface,
    #[error("{format:?} encoding failed: {source}")]
    Codec {
        format: EncodedFormat,
        #[source]
        source: image::ImageError,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodedFormat {
    Png,
    Jpeg,
}

impl EncodedFormat {
    pub fn mime_type(self) -> &'static str {
        match self {
            EncodedFormat::Png => "image/png",
            EncodedFormat::Jpeg => "image/jpeg",
        }
    }
}

/// Compressed output of the encoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    pub format: EncodedFormat,
    pub bytes: Vec<u8>,
}

impl EncodedImage {
    /// The transport-friendly form used in responses and the cache.
    pub fn to_data_url(&self) -> String {
        data_url::encode(self.format.mime_type(), &self.bytes)
    }
}

/// The selection rule on its own, over `data:` URL lengths.
pub fn choose_format(lossless_len: usize, lossy_len: usize, lossless_ratio: f64) -> EncodedFormat {
    if (lossless_len as f64) < (lossy_len as f64) * lossless_ratio {
        EncodedFormat::Png
    } else {
        EncodedFormat::Jpeg
    }
}

fn data_url_len(format: EncodedFormat, bytes: &[u8]) -> usize {
    data_url::encoded_len(format.mime_type(), bytes.len())
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Encoder {
    policy: EncodePolicy,
}

impl Encoder {
    pub fn new(policy: EncodePolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> EncodePolicy {
        self.policy
    }

    pub fn encode(&self, surface: &Surface) -> Result<EncodedImage, EncodeError> {
        if surface.is_empty() {
            return Err(EncodeError::EmptySurface);
        }
        let png = self.encode_png(surface)?;
        let jpeg = self.encode_jpeg(surface)?;

        let format = choose_format(
            data_url_len(EncodedFormat::Png, &png),
            data_url_len(EncodedFormat::Jpeg, &jpeg),
            self.policy.lossless_ratio,
        );
        let bytes = match format {
            EncodedFormat::Png => png,
            EncodedFormat::Jpeg => jpeg,
        };
        Ok(EncodedImage { format, bytes })
    }

    fn encode_png(&self, surface: &Surface) -> Result<Vec<u8>, EncodeError> {
        let pixels = surface.pixels();
        let mut buf = Vec::new();
        PngEncoder::new(&mut buf)
            .write_image(
                pixels.as_raw(),
                pixels.width(),
                pixels.height(),
                ExtendedColorType::Rgba8,
            )
            .map_err(|source| EncodeError::Codec {
                format: EncodedFormat::Png,
                source,
            })?;
        Ok(buf)
    }

    fn encode_jpeg(&self, surface: &Surface) -> Result<Vec<u8>, EncodeError> {
        let rgb = DynamicImage::ImageRgba8(surface.pixels().clone()).into_rgb8();
        let mut buf = Vec::new();
        JpegEncoder::new_with_quality(&mut buf, self.policy.lossy_quality.value())
            .write_image(
                rgb.as_raw(),
                rgb.width(),
                rgb.height(),
                ExtendedColorType::Rgb8,
            )
            .map_err(|source| EncodeError::Codec {
                format: EncodedFormat::Jpeg,
                source,
            })?;
        Ok(buf)
    }
}
