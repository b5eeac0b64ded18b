//! Attachment handling for outgoing batches
//!
//! Media payloads arrive either as raw bytes or in the serialized buffer form.
//! Both resolve to the same bytes here; the JSON copy of a message only ever
//! carries the sanitized file name and the correlation id.

use bytes::Bytes;

use crate::error::{Error, Result};
use crate::types::{MediaAttachment, MediaData, SerializedBuffer};

/// Used when sanitizing leaves nothing behind
pub const FALLBACK_FILE_NAME: &str = "attachment";

/// Binary part of an outgoing batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    /// `rabbitMqId` of the media, shared with the JSON copy of the message
    pub correlation_id: String,
    pub file_name: String,
    pub mime_type: String,
    pub data: Bytes,
}

/// Sanitize a file name for use in a multipart part.
///
/// Every character outside `[a-zA-Z0-9-_.]` becomes a hyphen, runs of hyphens
/// collapse to one, and leading/trailing hyphens are trimmed.
pub fn sanitize_file_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        let c = if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
            c
        } else {
            '-'
        };
        if c == '-' && out.ends_with('-') {
            continue;
        }
        out.push(c);
    }

    let trimmed = out.trim_matches('-');
    if trimmed.is_empty() {
        FALLBACK_FILE_NAME.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Resolve a payload to bytes
pub fn resolve_payload(data: &MediaData) -> Result<Bytes> {
    match data {
        MediaData::Raw(bytes) => Ok(bytes.clone()),
        MediaData::Serialized(buffer) => resolve_serialized(buffer),
    }
}

fn resolve_serialized(buffer: &SerializedBuffer) -> Result<Bytes> {
    if buffer.kind != "Buffer" {
        return Err(Error::Media(format!(
            "unsupported serialized payload type '{}'",
            buffer.kind
        )));
    }

    let bytes = buffer
        .data
        .iter()
        .enumerate()
        .map(|(i, v)| {
            u8::try_from(*v)
                .map_err(|_| Error::Media(format!("byte {} out of range at index {}", v, i)))
        })
        .collect::<Result<Vec<u8>>>()?;

    Ok(Bytes::from(bytes))
}

/// Split a media attachment into its binary part and its JSON-safe copy.
///
/// The copy has `data` removed and the sanitized file name set. The binary
/// part is `Err` when the payload cannot be resolved; the copy is returned
/// either way so the message still goes out.
pub fn split_attachment(media: &MediaAttachment) -> (MediaAttachment, Option<Result<Attachment>>) {
    let file_name = sanitize_file_name(&media.file_name);

    let part = media.data.as_ref().map(|data| {
        resolve_payload(data).map(|bytes| Attachment {
            correlation_id: media.rabbit_mq_id.clone(),
            file_name: file_name.clone(),
            mime_type: media.mime_type.clone(),
            data: bytes,
        })
    });

    let stripped = MediaAttachment {
        data: None,
        file_name,
        ..media.clone()
    };

    (stripped, part)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MediaKind;
    use test_case::test_case;

    #[test_case("test screenshot.png", "test-screenshot.png")]
    #[test_case("test@#$%^&*.png", "test-.png")]
    #[test_case("  leading spaces.png", "leading-spaces.png")]
    #[test_case("multiple   spaces.png", "multiple-spaces.png")]
    #[test_case("dots.in.name.png", "dots.in.name.png")]
    #[test_case("trailing!!", "trailing")]
    #[test_case("a--b__c.webm", "a-b__c.webm")]
    #[test_case("écran capturé.png", "cran-captur-.png")]
    #[test_case("@@@", FALLBACK_FILE_NAME)]
    fn test_sanitize_file_name(input: &str, expected: &str) {
        assert_eq!(sanitize_file_name(input), expected);
    }

    #[test]
    fn test_sanitize_is_idempotent() {
        for name in ["a b c.png", "--x--", "ok.png", "  ", "tab\tname.mp4"] {
            let once = sanitize_file_name(name);
            assert_eq!(sanitize_file_name(&once), once);
            assert!(!once.starts_with('-') && !once.ends_with('-'));
        }
    }

    #[test]
    fn test_raw_and_serialized_resolve_identically() {
        let raw = MediaData::from(vec![137u8, 80, 78, 71]);
        let serialized = MediaData::Serialized(SerializedBuffer::from_bytes(&[137, 80, 78, 71]));

        assert_eq!(resolve_payload(&raw).unwrap(), resolve_payload(&serialized).unwrap());
    }

    #[test]
    fn test_out_of_range_byte_is_rejected() {
        let bad = MediaData::Serialized(SerializedBuffer {
            kind: "Buffer".to_string(),
            data: vec![1, 256],
        });
        assert!(matches!(resolve_payload(&bad), Err(Error::Media(_))));
    }

    #[test]
    fn test_unknown_buffer_type_is_rejected() {
        let bad = MediaData::Serialized(SerializedBuffer {
            kind: "ArrayBuffer".to_string(),
            data: vec![1],
        });
        assert!(resolve_payload(&bad).is_err());
    }

    #[test]
    fn test_split_strips_payload() {
        let media = MediaAttachment::new(
            "m1",
            "my shot.png",
            "image/png",
            MediaKind::Image,
            vec![1u8, 2, 3],
        );
        let (stripped, part) = split_attachment(&media);

        assert!(stripped.data.is_none());
        assert_eq!(stripped.file_name, "my-shot.png");
        assert_eq!(stripped.rabbit_mq_id, "m1");

        let part = part.unwrap().unwrap();
        assert_eq!(part.correlation_id, "m1");
        assert_eq!(part.file_name, "my-shot.png");
        assert_eq!(part.data.as_ref(), &[1, 2, 3]);
    }

    #[test]
    fn test_split_without_payload() {
        let mut media =
            MediaAttachment::new("m2", "clip.webm", "video/webm", MediaKind::Video, vec![0u8]);
        media.data = None;
        let (stripped, part) = split_attachment(&media);
        assert!(part.is_none());
        assert_eq!(stripped.file_name, "clip.webm");
    }
}
