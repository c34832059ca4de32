//! Object keys for temporary chunks and assembled media
//!
//! - chunks: `temp/{study}/{participant}/{upload}/chunk_{index:06}.{ext}`
//! - final:  `{study}/{participant}/{item}_{timestamp}.{ext}`

use crate::error::{Error, Result};

pub const DEFAULT_EXTENSION: &str = "webm";

/// Directory holding every chunk of one upload session
pub fn chunk_prefix(study_id: &str, participant_id: &str, upload_session_id: &str) -> String {
    format!("temp/{study_id}/{participant_id}/{upload_session_id}")
}

pub fn chunk_key(study_id: &str, participant_id: &str, upload_session_id: &str, index: usize, ext: &str) -> String {
    format!(
        "{}/chunk_{:06}.{}",
        chunk_prefix(study_id, participant_id, upload_session_id),
        index,
        ext
    )
}

/// `timestamp` is milliseconds since the epoch
pub fn final_key(study_id: &str, participant_id: &str, item_id: &str, timestamp: i64, ext: &str) -> String {
    format!("{study_id}/{participant_id}/{item_id}_{timestamp}.{ext}")
}

/// File extension for a chunk's content type
pub fn extension_for(mime_type: &str) -> &'static str {
    let essence = mime_type.split(';').next().unwrap_or("").trim();
    match essence {
        "video/mp4" | "audio/mp4" => "mp4",
        "video/quicktime" => "mov",
        "audio/ogg" | "video/ogg" => "ogg",
        "audio/mpeg" => "mp3",
        "audio/wav" | "audio/x-wav" => "wav",
        _ => DEFAULT_EXTENSION,
    }
}

/// Ids become path segments, so they must not contain separators
pub fn validate_segment(name: &str, value: &str) -> Result<()> {
    let ok = !value.is_empty()
        && value != "."
        && value != ".."
        && !value.contains(['/', '\\'])
        && value.chars().all(|c| !c.is_control());
    if ok {
        Ok(())
    } else {
        Err(Error::Validation(format!("invalid {name}: {value:?}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_key_is_zero_padded() {
        assert_eq!(
            chunk_key("st", "p1", "up", 7, "webm"),
            "temp/st/p1/up/chunk_000007.webm"
        );
    }

    #[test]
    fn test_final_key_layout() {
        assert_eq!(final_key("st", "p1", "q3", 1700000000000, "mp4"), "st/p1/q3_1700000000000.mp4");
    }

    #[test]
    fn test_extension_ignores_codec_parameters() {
        assert_eq!(extension_for("video/webm;codecs=vp9,opus"), "webm");
        assert_eq!(extension_for("video/mp4"), "mp4");
        assert_eq!(extension_for(""), "webm");
    }

    #[test]
    fn test_segments_reject_traversal() {
        assert!(validate_segment("studyId", "study-1").is_ok());
        assert!(validate_segment("studyId", "..").is_err());
        assert!(validate_segment("studyId", "a/b").is_err());
        assert!(validate_segment("studyId", "").is_err());
    }
}
