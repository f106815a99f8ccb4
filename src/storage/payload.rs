use crate::error::StorageError;
use base64::{engine::general_purpose::STANDARD, Engine};
use bytes::Bytes;

/// Decoded image ready for upload
#[derive(Debug, Clone, PartialEq)]
pub struct ImagePayload {
    pub bytes: Bytes,
    pub extension: String,
    pub content_type: String,
}

impl ImagePayload {
    /// Decode a `data:image/<ext>;base64,<data>` URL or bare base64 text
    pub fn decode(text: &str) -> Result<Self, StorageError> {
        let text = text.trim();

        let (declared, encoded) = match text.strip_prefix("data:") {
            Some(rest) => {
                let (header, data) = rest.split_once(',').ok_or_else(|| StorageError::Decode {
                    details: "data URL has no payload".to_string(),
                })?;
                let mut parts = header.split(';');
                let mime = parts.next().unwrap_or_default();
                if !parts.any(|part| part.eq_ignore_ascii_case("base64")) {
                    return Err(StorageError::Decode {
                        details: "data URL is not base64 encoded".to_string(),
                    });
                }
                (Some(mime.to_ascii_lowercase()), data)
            }
            None => (None, text),
        };

        let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
        let bytes = STANDARD
            .decode(compact.as_bytes())
            .map_err(|e| StorageError::Decode {
                details: e.to_string(),
            })?;

        if bytes.is_empty() {
            return Err(StorageError::Decode {
                details: "image payload is empty".to_string(),
            });
        }

        let (extension, content_type) = match declared.as_deref().and_then(image_extension) {
            Some(extension) => (extension, declared.unwrap_or_default()),
            None => {
                let (extension, content_type) = sniff(&bytes);
                (extension.to_string(), content_type.to_string())
            }
        };

        Ok(Self {
            bytes: Bytes::from(bytes),
            extension,
            content_type,
        })
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Extension from an `image/<subtype>` MIME type, restricted to safe characters
fn image_extension(mime: &str) -> Option<String> {
    let subtype = mime.strip_prefix("image/")?;
    let subtype = subtype.split('+').next().unwrap_or(subtype);
    if subtype.is_empty() || !subtype.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(subtype.to_string())
}

fn sniff(bytes: &[u8]) -> (&'static str, &'static str) {
    if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        ("jpg", "image/jpeg")
    } else if bytes.starts_with(&[0x89, b'P', b'N', b'G']) {
        ("png", "image/png")
    } else if bytes.starts_with(b"GIF8") {
        ("gif", "image/gif")
    } else if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        ("webp", "image/webp")
    } else {
        ("bin", "application/octet-stream")
    }
}

/// Storage key of the form `<millis>-<owner>-<suffix>.<ext>`
pub fn build_key(owner: &str, extension: &str, now_millis: i64) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!(
        "{}-{}-{}.{}",
        now_millis,
        sanitize_owner(owner),
        &suffix[..8],
        extension
    )
}

fn sanitize_owner(owner: &str) -> String {
    let cleaned: String = owner
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .take(40)
        .collect();

    if cleaned.trim_matches('_').is_empty() {
        "anonymous".to_string()
    } else {
        cleaned
    }
}
