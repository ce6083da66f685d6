//! Resize collaborator.
//!
//! The controller does not care how pixels are scaled, only that decoded
//! pixels go in and a filled [`Surface`] comes out. [`LanczosResizer`] is the
//! production implementation; tests substitute recording or failing ones.

use super::calculations::calculate_target_dimensions;
use super::surface::Surface;
use crate::request::TransformParams;
use image::DynamicImage;
use image::imageops::FilterType;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ResizeError {
    #[error("source image has no pixels ({0}x{1})")]
    EmptySource(u32, u32),
    #[error("resize failed: {0}")]
    Failed(String),
}

/// Draws `source`, transformed per `params`, into `target`.
pub trait Resizer: Send + Sync {
    fn resize(
        &self,
        source: &DynamicImage,
        target: &mut Surface,
        params: &TransformParams,
    ) -> Result<(), ResizeError>;
}

/// Stretches the source to the computed target size with Lanczos3.
#[derive(Debug, Default, Clone, Copy)]
pub struct LanczosResizer;

impl LanczosResizer {
    pub fn new() -> Self {
        Self
    }
}

impl Resizer for LanczosResizer {
    fn resize(
        &self,
        source: &DynamicImage,
        target: &mut Surface,
        params: &TransformParams,
    ) -> Result<(), ResizeError> {
        let (src_w, src_h) = (source.width(), source.height());
        if src_w == 0 || src_h == 0 {
            return Err(ResizeError::EmptySource(src_w, src_h));
        }

        let (width, height) = calculate_target_dimensions((src_w, src_h), params);
        let pixels = if (width, height) == (src_w, src_h) {
            source.to_rgba8()
        } else {
            source
                .resize_exact(width, height, FilterType::Lanczos3)
                .into_rgba8()
        };
        target.draw(pixels);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbaImage;

    fn source(w: u32, h: u32) -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_fn(w, h, |x, y| {
            image::Rgba([(x % 256) as u8, (y % 256) as u8, 128, 255])
        }))
    }

    #[test]
    fn draws_at_computed_size() {
        let mut surface = Surface::new();
        let params = TransformParams {
            max_width: Some(50),
            ..Default::default()
        };
        LanczosResizer::new()
            .resize(&source(200, 100), &mut surface, &params)
            .unwrap();
        assert_eq!(surface.dimensions(), (50, 25));
    }

    #[test]
    fn same_size_copies_pixels() {
        let src = source(8, 4);
        let mut surface = Surface::new();
        LanczosResizer::new()
            .resize(&src, &mut surface, &TransformParams::default())
            .unwrap();
        assert_eq!(surface.pixels(), &src.to_rgba8());
    }

    #[test]
    fn explicit_size_stretches() {
        let mut surface = Surface::new();
        let params = TransformParams {
            width: Some(10),
            height: Some(40),
            ..Default::default()
        };
        LanczosResizer::new()
            .resize(&source(20, 20), &mut surface, &params)
            .unwrap();
        assert_eq!(surface.dimensions(), (10, 40));
    }

    #[test]
    fn empty_source_is_rejected() {
        let mut surface = Surface::new();
        let err = LanczosResizer::new()
            .resize(&source(0, 0), &mut surface, &TransformParams::default())
            .unwrap_err();
        assert!(matches!(err, ResizeError::EmptySource(0, 0)));
        assert!(surface.is_empty());
    }
}
