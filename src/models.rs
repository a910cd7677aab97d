use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Direct stream URLs for a single item. `audio_url` is present when the
/// selected format ships video and audio as separate streams.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct VideoUrls {
    pub video_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_url: Option<String>,
}

/// Read-only metadata snapshot for a single video.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct VideoInfo {
    pub id: String,
    pub title: String,
    pub duration: u64,
    pub thumbnail: String,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub description: String,
    pub uploader: String,
    pub view_count: u64,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub upload_date: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct VideoFormat {
    pub format_id: String,
    pub ext: String,
    pub resolution: String,
    pub quality: String,
    pub filesize: u64,
    pub fps: f64,
    pub vcodec: String,
    pub acodec: String,
}

/// Available formats for a video, in the order yt-dlp reported them.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Formats {
    pub video_id: String,
    pub formats: Vec<VideoFormat>,
}

/// Result of a download-merge-upload round trip.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Uploaded {
    pub url: String,
    pub filename: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Video,
    Audio,
}

impl MediaType {
    /// Lenient parse: anything that is not "audio" counts as video.
    pub fn parse(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("audio") {
            Self::Audio
        } else {
            Self::Video
        }
    }

    /// Bucket folder for uploaded objects. "vidioe" matches the layout of
    /// the existing production bucket.
    pub fn folder(self) -> &'static str {
        match self {
            Self::Video => "vidioe",
            Self::Audio => "audio",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Video => "video",
            Self::Audio => "audio",
        }
    }
}

/// Uniform response envelope for every endpoint.
#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<Meta>,
}

#[derive(Debug, Serialize)]
pub struct ErrorInfo {
    pub code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct Meta {
    pub timestamp: i64,
    pub version: String,
}

impl<T: Serialize> Envelope<T> {
    pub fn ok(data: T, version: &str) -> Self {
        Self {
            success: true,
            message: None,
            data: Some(data),
            error: None,
            meta: Some(Meta {
                timestamp: Utc::now().timestamp(),
                version: version.to_string(),
            }),
        }
    }
}

impl Envelope<()> {
    pub fn failure(error: ErrorInfo) -> Self {
        Self {
            success: false,
            message: None,
            data: None,
            error: Some(error),
            meta: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_type_parse_is_lenient() {
        assert_eq!(MediaType::parse("audio"), MediaType::Audio);
        assert_eq!(MediaType::parse("AUDIO"), MediaType::Audio);
        assert_eq!(MediaType::parse("video"), MediaType::Video);
        assert_eq!(MediaType::parse("webm"), MediaType::Video);
        assert_eq!(MediaType::parse(""), MediaType::Video);
    }

    #[test]
    fn success_envelope_omits_error_fields() {
        let envelope = Envelope::ok(
            VideoUrls {
                video_url: "https://cdn/video.mp4".to_string(),
                audio_url: None,
            },
            "v1",
        );
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["data"]["video_url"], "https://cdn/video.mp4");
        assert!(json.get("error").is_none());
        assert!(json["data"].get("audio_url").is_none());
        assert_eq!(json["meta"]["version"], "v1");
    }

    #[test]
    fn failure_envelope_carries_code_and_details() {
        let envelope = Envelope::failure(ErrorInfo {
            code: "EXTRACTION_FAILED",
            message: "Failed to extract video info".to_string(),
            details: Some("ERROR: unsupported url".to_string()),
        });
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["error"]["code"], "EXTRACTION_FAILED");
        assert_eq!(json["error"]["details"], "ERROR: unsupported url");
        assert!(json.get("data").is_none());
    }
}
