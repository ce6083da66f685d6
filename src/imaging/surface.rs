//! Render target for the resizer.

use image::RgbaImage;

/// Pixel buffer the resizer draws into and the encoder reads from.
///
/// A fresh surface is 0x0. [`release`](Surface::release) shrinks it back to
/// 0x0 and frees the backing buffer.
#[derive(Debug, Clone)]
pub struct Surface {
    pixels: RgbaImage,
}

impl Surface {
    pub fn new() -> Self {
        Self {
            pixels: RgbaImage::new(0, 0),
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.pixels.dimensions()
    }

    pub fn is_empty(&self) -> bool {
        let (w, h) = self.dimensions();
        w == 0 || h == 0
    }

    /// Replace the contents (and size) of the surface.
    pub fn draw(&mut self, pixels: RgbaImage) {
        self.pixels = pixels;
    }

    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }

    pub fn release(&mut self) {
        self.pixels = RgbaImage::new(0, 0);
    }
}

impl Default for Surface {
    fn default() -> Self {
        Self::new()
    }
}
