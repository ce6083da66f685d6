use crate::transport::RawImage;
use image::{DynamicImage, ImageFormat};

/// Decode original bytes into pixels.
///
/// The format is sniffed from the bytes first; the reported media type is
/// only a fallback, since servers mislabel images often enough.
pub fn decode(raw: &RawImage) -> Result<DynamicImage, image::ImageError> {
    let format = image::guess_format(&raw.bytes).or_else(|sniff_err| {
        raw.content_type
            .as_deref()
            .map(|ct| ct.split(';').next().unwrap_or(ct).trim())
            .and_then(ImageFormat::from_mime_type)
            .ok_or(sniff_err)
    })?;
    image::load_from_memory_with_format(&raw.bytes, format)
}
