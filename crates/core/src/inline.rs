//! Decoding of legacy inline `data:` image payloads.

use base64::Engine;
use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD};

/// Content type assumed when a payload does not declare an image type.
pub const DEFAULT_CONTENT_TYPE: &str = "image/jpeg";

/// A decoded `data:<mime>;base64,<data>` payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InlinePayload {
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl InlinePayload {
    /// Decode a payload, defaulting the content type to `image/jpeg`.
    pub fn decode(raw: &str) -> crate::Result<Self> {
        Self::decode_with_default(raw, DEFAULT_CONTENT_TYPE)
    }

    /// Decode a payload, using `default_content_type` when the declared media
    /// type is missing or is not an `image/*` type.
    pub fn decode_with_default(raw: &str, default_content_type: &str) -> crate::Result<Self> {
        let rest = raw
            .strip_prefix("data:")
            .ok_or_else(|| crate::Error::InvalidInline("missing data: prefix".to_string()))?;

        let (header, data) = rest
            .split_once(',')
            .ok_or_else(|| crate::Error::InvalidInline("missing ',' separator".to_string()))?;

        let mut params = header.split(';');
        let media_type = params.next().unwrap_or_default().trim().to_ascii_lowercase();
        if !params.any(|p| p.trim().eq_ignore_ascii_case("base64")) {
            return Err(crate::Error::InvalidInline(
                "only base64 payloads are supported".to_string(),
            ));
        }

        let content_type = match media_type.strip_prefix("image/") {
            Some(subtype) if !subtype.is_empty() => media_type.clone(),
            _ => default_content_type.to_string(),
        };

        let cleaned: String = data.chars().filter(|c| !c.is_ascii_whitespace()).collect();
        if cleaned.is_empty() {
            return Err(crate::Error::InvalidInline("empty payload".to_string()));
        }
        let bytes = STANDARD
            .decode(&cleaned)
            .or_else(|_| STANDARD_NO_PAD.decode(&cleaned))
            .map_err(|e| crate::Error::InvalidInline(format!("base64 decode failed: {e}")))?;

        Ok(Self {
            content_type,
            bytes,
        })
    }

    /// File extension for this payload's content type.
    pub fn extension(&self) -> String {
        extension_for(&self.content_type)
    }
}

/// Map a content type to a file extension.
pub fn extension_for(content_type: &str) -> String {
    let lowered = content_type.to_ascii_lowercase();
    let essence = lowered.split(';').next().unwrap_or_default().trim();
    match essence {
        "image/jpeg" | "image/jpg" | "image/pjpeg" => "jpg".to_string(),
        "image/png" => "png".to_string(),
        "image/webp" => "webp".to_string(),
        "image/gif" => "gif".to_string(),
        other => {
            let subtype: String = other
                .split_once('/')
                .map(|(_, s)| s)
                .unwrap_or_default()
                .chars()
                .filter(|c| c.is_ascii_alphanumeric())
                .collect();
            if subtype.is_empty() {
                "bin".to_string()
            } else {
                subtype
            }
        }
    }
}
