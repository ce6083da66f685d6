//! Cache key derivation.
//!
//! The key is a SHA-256 digest over exactly the descriptor fields that change
//! the rendered bytes: the source locator and the transform parameters.
//! Priority, task id, the caching flag and the timestamp are left out, so the
//! same image requested by different tasks, at different priorities, shares
//! one entry. Freshness is checked separately against the stored timestamp.
//!
//! Each field is hashed with a tag byte and a presence marker so that, e.g.,
//! `width: 10` and `height: 10` never collide.

use crate::request::{RequestDescriptor, TransformParams};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Deterministic identifier of a rendered image, as a 64-char hex string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    /// Derive the key for a request. Pure and total.
    pub fn derive(descriptor: &RequestDescriptor) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(b"image\0");
        hasher.update((descriptor.source.len() as u64).to_le_bytes());
        hasher.update(descriptor.source.as_bytes());
        hash_transform(&mut hasher, &descriptor.transform);
        Self(format!("{:x}", hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn hash_transform(hasher: &mut Sha256, transform: &TransformParams) {
    // No scale and scale 1.0 render the same image.
    let scale = transform.scale.unwrap_or(1.0);
    // -0.0 and 0.0 compare equal but differ in bits.
    let scale = if scale == 0.0 { 0.0 } else { scale };
    hasher.update(b"s");
    hasher.update(scale.to_bits().to_le_bytes());

    for (tag, value) in [
        (b'w', transform.width),
        (b'h', transform.height),
        (b'W', transform.max_width),
        (b'H', transform.max_height),
    ] {
        hasher.update([tag]);
        match value {
            Some(v) => {
                hasher.update(b"\x01");
                hasher.update(v.to_le_bytes());
            }
            None => hasher.update(b"\x00"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(source: &str) -> RequestDescriptor {
        RequestDescriptor::new(source, "t1")
    }

    #[test]
    fn key_is_deterministic() {
        let d = descriptor("local:img1");
        let k1 = CacheKey::derive(&d);
        let k2 = CacheKey::derive(&d.clone());
        assert_eq!(k1, k2);
        assert_eq!(k1.as_str().len(), 64);
    }

    #[test]
    fn key_ignores_priority_task_and_cache_policy() {
        let a = descriptor("local:img1");
        let b = RequestDescriptor::new("local:img1", "another-task")
            .with_priority(0)
            .with_cache(Some(1234));
        assert_eq!(CacheKey::derive(&a), CacheKey::derive(&b));
    }

    #[test]
    fn key_varies_with_source() {
        assert_ne!(
            CacheKey::derive(&descriptor("local:img1")),
            CacheKey::derive(&descriptor("local:img2"))
        );
    }

    #[test]
    fn key_varies_with_transform() {
        let base = descriptor("local:img1");
        let sized = base.clone().with_transform(TransformParams {
            max_width: Some(120),
            ..Default::default()
        });
        assert_ne!(CacheKey::derive(&base), CacheKey::derive(&sized));
    }

    #[test]
    fn width_and_height_do_not_collide() {
        let w = descriptor("x").with_transform(TransformParams {
            width: Some(10),
            ..Default::default()
        });
        let h = descriptor("x").with_transform(TransformParams {
            height: Some(10),
            ..Default::default()
        });
        assert_ne!(CacheKey::derive(&w), CacheKey::derive(&h));
    }

    #[test]
    fn absent_scale_matches_unit_scale() {
        let none = descriptor("x");
        let one = descriptor("x").with_transform(TransformParams {
            scale: Some(1.0),
            ..Default::default()
        });
        assert_eq!(CacheKey::derive(&none), CacheKey::derive(&one));
    }
}
