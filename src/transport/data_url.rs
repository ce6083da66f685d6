//! `data:` URL codec (RFC 2397).
//!
//! Decoding backs the direct-load path for inline images; encoding produces
//! the transport-friendly string carried in responses and stored in the cache.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use thiserror::Error;

const DATA_URL_PREFIX: &str = "data:";
const DEFAULT_MEDIA_TYPE: &str = "text/plain;charset=US-ASCII";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DataUrlError {
    #[error("URL does not start with 'data:'")]
    MissingPrefix,
    #[error("missing comma in data URL")]
    MissingComma,
    #[error("invalid base64: {0}")]
    Base64(String),
    #[error("invalid percent-escape at byte {0}")]
    PercentEscape(usize),
}

/// A decoded `data:` URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataUrl {
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Case-insensitive prefix check. Compares bytes, so any locator is safe to
/// pass, including paths with multi-byte characters.
pub fn is_data_url(url: &str) -> bool {
    url.as_bytes()
        .get(..DATA_URL_PREFIX.len())
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case(DATA_URL_PREFIX.as_bytes()))
}

/// Decode a `data:` URL into its media type and payload.
pub fn decode(url: &str) -> Result<DataUrl, DataUrlError> {
    if !is_data_url(url) {
        return Err(DataUrlError::MissingPrefix);
    }
    let rest = url.get(DATA_URL_PREFIX.len()..).unwrap_or_default();
    let (metadata, data) = rest.split_once(',').ok_or(DataUrlError::MissingComma)?;

    let mut parts = metadata.split(';');
    let media_type = parts.next().unwrap_or("").trim();
    let mut is_base64 = false;
    let mut params = Vec::new();
    for param in parts.map(str::trim).filter(|p| !p.is_empty()) {
        if param.eq_ignore_ascii_case("base64") {
            is_base64 = true;
        } else {
            params.push(param);
        }
    }

    let content_type = if media_type.is_empty() {
        DEFAULT_MEDIA_TYPE.to_string()
    } else if params.is_empty() {
        media_type.to_string()
    } else {
        format!("{};{}", media_type, params.join(";"))
    };

    let bytes = if is_base64 {
        decode_base64(data)?
    } else {
        percent_decode(data)?
    };

    Ok(DataUrl {
        content_type,
        bytes,
    })
}

/// Length of the string [`encode`] would produce, without building it.
pub fn encoded_len(content_type: &str, byte_len: usize) -> usize {
    let payload = base64::encoded_len(byte_len, true).unwrap_or(usize::MAX);
    "data:;base64,"
        .len()
        .saturating_add(content_type.len())
        .saturating_add(payload)
}

/// Encode `bytes` as a base64 `data:` URL.
pub fn encode(content_type: &str, bytes: &[u8]) -> String {
    format!("data:{};base64,{}", content_type, BASE64.encode(bytes))
}

/// Base64 payloads may be wrapped; ASCII whitespace is ignored.
fn decode_base64(data: &str) -> Result<Vec<u8>, DataUrlError> {
    let cleaned: Vec<u8> = data
        .bytes()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    BASE64
        .decode(&cleaned)
        .map_err(|e| DataUrlError::Base64(e.to_string()))
}

fn percent_decode(input: &str) -> Result<Vec<u8>, DataUrlError> {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'%' {
            out.push(bytes[i]);
            i += 1;
            continue;
        }
        let hex = bytes
            .get(i + 1..i + 3)
            .and_then(|h| std::str::from_utf8(h).ok())
            .and_then(|h| u8::from_str_radix(h, 16).ok())
            .ok_or(DataUrlError::PercentEscape(i))?;
        out.push(hex);
        i += 3;
    }
    Ok(out)
}
