//! Parameter types for rendering.
//!
//! ## Types
//!
//! - [`Quality`]: Lossy encoding quality (1–100, default 90). Clamped on construction.
//! - [`EncodePolicy`]: Lossy quality plus the size ratio that decides between
//!   the lossless and the lossy encoding.

/// Quality setting for lossy image encoding (1-100).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quality(u8);

impl Quality {
    pub fn new(value: u8) -> Self {
        Self(value.clamp(1, 100))
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

impl Default for Quality {
    /// 0.9 on the 0–1 scale.
    fn default() -> Self {
        Self(90)
    }
}

/// How the encoder picks between its lossless and lossy output.
///
/// The lossless form wins when `lossless_len < lossy_len * lossless_ratio`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EncodePolicy {
    pub lossy_quality: Quality,
    pub lossless_ratio: f64,
}

impl Default for EncodePolicy {
    fn default() -> Self {
        Self {
            lossy_quality: Quality::default(),
            lossless_ratio: 2.0,
        }
    }
}
