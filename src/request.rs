//! Request descriptor types.
//!
//! A [`RequestDescriptor`] is the parsed form of the request message a client
//! sends to the loader. Field names on the wire follow the message format
//! (`url`, `cache`, `timestamp`, `taskId`, `maxWidth`, ...) so descriptors can
//! be deserialized straight from JSON.
//!
//! Descriptors are immutable once built: the controller only ever reads them.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Priority used when the request does not specify one. Lower is more urgent.
pub const DEFAULT_PRIORITY: i32 = 2;

/// Opaque identifier echoed back in every response for correlation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for TaskId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for TaskId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Transform parameters consumed by the resizer.
///
/// Applied in this order: `scale`, then the `max_width` / `max_height`
/// clamps, then explicit `width` / `height` overrides. See
/// [`calculate_target_dimensions`](crate::imaging::calculate_target_dimensions).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_height: Option<u32>,
}

/// Why a request cannot use the persistent cache.
///
/// This is a policy short-circuit, not a failure: the request simply behaves
/// as a cache miss.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CacheUnavailable {
    #[error("caching is disabled for this request")]
    Disabled,
    #[error("request carries no freshness timestamp")]
    MissingTimestamp,
}

/// An image request as received from a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestDescriptor {
    /// Source locator: a `data:` URI, a file path or URL, or an `http(s)` URL.
    #[serde(rename = "url")]
    pub source: String,
    #[serde(rename = "cache", default)]
    pub caching_enabled: bool,
    /// Freshness marker of the source. Zero counts as absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i32>,
    pub task_id: TaskId,
    #[serde(flatten)]
    pub transform: TransformParams,
}

impl RequestDescriptor {
    /// Descriptor for `source` with caching off and no transform.
    pub fn new(source: impl Into<String>, task_id: impl Into<TaskId>) -> Self {
        Self {
            source: source.into(),
            caching_enabled: false,
            timestamp: None,
            priority: None,
            task_id: task_id.into(),
            transform: TransformParams::default(),
        }
    }

    pub fn with_cache(mut self, timestamp: Option<i64>) -> Self {
        self.caching_enabled = true;
        self.timestamp = timestamp;
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_transform(mut self, transform: TransformParams) -> Self {
        self.transform = transform;
        self
    }

    pub fn priority(&self) -> i32 {
        self.priority.unwrap_or(DEFAULT_PRIORITY)
    }

    /// The timestamp, if present and non-zero.
    pub fn freshness(&self) -> Option<i64> {
        self.timestamp.filter(|&ts| ts != 0)
    }

    /// The timestamp to read and write the cache with, or why the cache must
    /// be bypassed.
    pub fn cache_access(&self) -> Result<i64, CacheUnavailable> {
        if !self.caching_enabled {
            return Err(CacheUnavailable::Disabled);
        }
        self.freshness().ok_or(CacheUnavailable::MissingTimestamp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_defaults_to_two() {
        let d = RequestDescriptor::new("a.png", "t1");
        assert_eq!(d.priority(), DEFAULT_PRIORITY);
        assert_eq!(d.with_priority(0).priority(), 0);
    }

    #[test]
    fn zero_timestamp_counts_as_absent() {
        let d = RequestDescriptor::new("a.png", "t1").with_cache(Some(0));
        assert_eq!(d.freshness(), None);
        assert_eq!(d.cache_access(), Err(CacheUnavailable::MissingTimestamp));
    }

    #[test]
    fn disabled_cache_wins_over_timestamp() {
        let mut d = RequestDescriptor::new("a.png", "t1");
        d.timestamp = Some(1000);
        assert_eq!(d.cache_access(), Err(CacheUnavailable::Disabled));
    }

    #[test]
    fn cache_access_returns_timestamp() {
        let d = RequestDescriptor::new("a.png", "t1").with_cache(Some(1000));
        assert_eq!(d.cache_access(), Ok(1000));
    }

    #[test]
    fn deserializes_request_message() {
        let json = r#"{
            "url": "https://example.com/a.jpg",
            "cache": true,
            "timestamp": 1000,
            "priority": 1,
            "taskId": "t7",
            "maxWidth": 120,
            "scale": 0.5
        }"#;
        let d: RequestDescriptor = serde_json::from_str(json).unwrap();
        assert_eq!(d.source, "https://example.com/a.jpg");
        assert!(d.caching_enabled);
        assert_eq!(d.timestamp, Some(1000));
        assert_eq!(d.priority(), 1);
        assert_eq!(d.task_id, TaskId::new("t7"));
        assert_eq!(d.transform.max_width, Some(120));
        assert_eq!(d.transform.scale, Some(0.5));
        assert_eq!(d.transform.width, None);
    }

    #[test]
    fn minimal_message_uses_defaults() {
        let d: RequestDescriptor = serde_json::from_str(r#"{"url":"x","taskId":"t"}"#).unwrap();
        assert!(!d.caching_enabled);
        assert_eq!(d.timestamp, None);
        assert_eq!(d.priority(), DEFAULT_PRIORITY);
        assert_eq!(d.transform, TransformParams::default());
    }
}
