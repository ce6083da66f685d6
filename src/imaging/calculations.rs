//! Pure calculation functions for output dimensions.
//!
//! All functions here are pure and testable without any I/O or images.

use crate::request::TransformParams;

/// Calculate the rendered size of an image from its source size and the
/// request's transform parameters.
///
/// Steps, in order:
/// 1. `scale` multiplies both edges.
/// 2. `max_width`, then `max_height`, shrink the result proportionally if it
///    exceeds them.
/// 3. Explicit `width` / `height` replace the corresponding edge outright,
///    without preserving aspect ratio.
///
/// Zero, negative and non-finite parameters are ignored. Edges are rounded
/// and never smaller than 1px.
///
/// # Examples
/// ```
/// # use image_loader::imaging::calculate_target_dimensions;
/// # use image_loader::TransformParams;
/// let params = TransformParams { max_width: Some(100), ..Default::default() };
/// // 400x300 clamped to 100px wide → 100x75
/// assert_eq!(calculate_target_dimensions((400, 300), &params), (100, 75));
/// ```
pub fn calculate_target_dimensions(source: (u32, u32), params: &TransformParams) -> (u32, u32) {
    let (mut width, mut height) = (source.0 as f64, source.1 as f64);

    if let Some(scale) = params.scale.filter(|s| s.is_finite() && *s > 0.0) {
        width *= scale;
        height *= scale;
    }

    if let Some(max_width) = positive(params.max_width)
        && width > max_width
    {
        let ratio = max_width / width;
        width *= ratio;
        height *= ratio;
    }

    if let Some(max_height) = positive(params.max_height)
        && height > max_height
    {
        let ratio = max_height / height;
        width *= ratio;
        height *= ratio;
    }

    if let Some(w) = positive(params.width) {
        width = w;
    }
    if let Some(h) = positive(params.height) {
        height = h;
    }

    (to_edge(width), to_edge(height))
}

fn positive(value: Option<u32>) -> Option<f64> {
    value.filter(|&v| v > 0).map(f64::from)
}

fn to_edge(value: f64) -> u32 {
    (value.round() as u32).max(1)
}
