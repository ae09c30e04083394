//! Analysis payloads
//!
//! The analysis description is produced by the server and passed through to
//! the view untouched. The accessors below only read the fields the server
//! is known to emit; none of them fail on an unexpected shape.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Opaque, read-only analysis description
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnalysisResult(Value);

/// Audio or subtitle stream found in the container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamInfo {
    #[serde(default)]
    pub index: Option<u32>,
    #[serde(default)]
    pub codec: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    /// Subtitle format as named by the server (`ass`, `subrip`, ...)
    #[serde(default)]
    pub format: Option<String>,
}

/// Subtitle file found next to the video
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalSubtitle {
    pub filename: String,
    #[serde(default)]
    pub language: Option<String>,
}

/// Basic facts about the uploaded file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoInfo {
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub hash: Option<String>,
}

/// Headline facts shown above the track lists
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoSummary {
    pub duration: Option<String>,
    pub resolution: Option<String>,
    pub file_size: Option<String>,
}

impl AnalysisResult {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    /// The payload exactly as received
    pub fn raw(&self) -> &Value {
        &self.0
    }

    pub fn into_raw(self) -> Value {
        self.0
    }

    /// Audio tracks (`audio_streams`, or `audio_tracks` in older servers)
    pub fn audio_tracks(&self) -> Vec<StreamInfo> {
        self.list_field(&["audio_streams", "audio_tracks"])
    }

    /// Embedded subtitle tracks (`subtitle_streams` or `subtitle_tracks`)
    pub fn subtitle_tracks(&self) -> Vec<StreamInfo> {
        self.list_field(&["subtitle_streams", "subtitle_tracks"])
    }

    pub fn external_subtitles(&self) -> Vec<ExternalSubtitle> {
        self.list_field(&["external_subtitles"])
    }

    pub fn video_info(&self) -> Option<VideoInfo> {
        self.0
            .get("video_info")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Top-level `duration`, `resolution` and `file_size`, as text
    pub fn summary(&self) -> VideoSummary {
        VideoSummary {
            duration: self.text_field("duration"),
            resolution: self.text_field("resolution"),
            file_size: self.text_field("file_size"),
        }
    }

    /// Server-side analysis failure reported inside the payload
    pub fn error(&self) -> Option<&str> {
        self.0.get("error").and_then(Value::as_str)
    }

    fn text_field(&self, key: &str) -> Option<String> {
        match self.0.get(key)? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    fn list_field<T: serde::de::DeserializeOwned>(&self, keys: &[&str]) -> Vec<T> {
        keys.iter()
            .find_map(|key| self.0.get(*key).and_then(Value::as_array))
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| serde_json::from_value(item.clone()).ok())
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Speech-recognition model offered by the server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WhisperModel {
    pub name: String,
    #[serde(default)]
    pub size: Option<String>,
    #[serde(default)]
    pub vram: Option<String>,
    #[serde(default)]
    pub quality: Option<String>,
    #[serde(default)]
    pub speed: Option<String>,
}

/// Model catalogue with the server's recommendation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WhisperModels {
    #[serde(default)]
    pub models: Vec<WhisperModel>,
    #[serde(default)]
    pub recommended: Option<String>,
    #[serde(default)]
    pub gpu_available: bool,
}

impl WhisperModels {
    /// Recommended model name, falling back to the first listed model
    pub fn default_choice(&self) -> Option<&str> {
        self.recommended
            .as_deref()
            .filter(|name| self.models.iter().any(|m| m.name == *name))
            .or_else(|| self.models.first().map(|m| m.name.as_str()))
    }
}

/// Subtitle rendering style offered by the server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubtitleStyle {
    pub name: String,
    #[serde(default)]
    pub filename: Option<String>,
}

/// Choices the server sends alongside the upload acknowledgement
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadExtras {
    #[serde(default)]
    pub whisper_models: Option<WhisperModels>,
    #[serde(default)]
    pub subtitle_styles: Vec<SubtitleStyle>,
}

impl UploadExtras {
    pub fn is_empty(&self) -> bool {
        self.whisper_models.is_none() && self.subtitle_styles.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_accessors_read_known_fields() {
        let analysis = AnalysisResult::new(json!({
            "audio_streams": [
                {"index": 1, "codec": "aac", "language": "jpn", "channels": 2},
                {"index": 2, "codec": "opus", "language": "eng"}
            ],
            "subtitle_streams": [{"index": 3, "codec": "ass", "language": "eng"}],
            "external_subtitles": [{"filename": "ep01.uk.srt", "language": "ukr"}],
            "video_info": {"filename": "ep01.mkv", "size": 524288000}
        }));

        let audio = analysis.audio_tracks();
        assert_eq!(audio.len(), 2);
        assert_eq!(audio[0].language.as_deref(), Some("jpn"));
        assert_eq!(analysis.subtitle_tracks().len(), 1);
        assert_eq!(analysis.external_subtitles()[0].filename, "ep01.uk.srt");
        assert_eq!(analysis.video_info().unwrap().size, Some(524_288_000));
        assert!(analysis.error().is_none());
    }

    #[test]
    fn test_accessors_tolerate_other_shapes() {
        let analysis = AnalysisResult::new(json!({
            "audio_tracks": [{"language": "jpn"}, "garbage"],
            "video_info": "not an object"
        }));
        assert_eq!(analysis.audio_tracks().len(), 1);
        assert!(analysis.subtitle_tracks().is_empty());
        assert!(analysis.video_info().is_none());

        let empty = AnalysisResult::new(Value::Null);
        assert!(empty.audio_tracks().is_empty());
    }

    #[test]
    fn test_subtitle_format_and_summary() {
        let analysis = AnalysisResult::new(json!({
            "duration": "00:23:40",
            "resolution": "1920x1080",
            "file_size": 524288000,
            "subtitle_streams": [{"index": 3, "language": "eng", "format": "ass"}]
        }));

        assert_eq!(analysis.subtitle_tracks()[0].format.as_deref(), Some("ass"));
        assert_eq!(
            analysis.summary(),
            VideoSummary {
                duration: Some("00:23:40".to_string()),
                resolution: Some("1920x1080".to_string()),
                file_size: Some("524288000".to_string()),
            }
        );
        assert_eq!(AnalysisResult::new(Value::Null).summary(), VideoSummary::default());
    }

    #[test]
    fn test_whisper_default_choice() {
        let models: WhisperModels = serde_json::from_value(json!({
            "models": [{"name": "base", "size": "74 MB"}, {"name": "large"}],
            "recommended": "large",
            "gpu_available": true
        }))
        .unwrap();
        assert_eq!(models.default_choice(), Some("large"));

        let unknown = WhisperModels {
            recommended: Some("huge".to_string()),
            ..models
        };
        assert_eq!(unknown.default_choice(), Some("base"));
    }
}
