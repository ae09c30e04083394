//! Response bodies of the JSON endpoints
//!
//! Two upload acknowledgement shapes exist in the wild: one carries
//! `session_id` directly, the other adds `success` and nests `analysis`.
//! `UploadResponse` accepts the union of both.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::analysis::{AnalysisResult, SubtitleStyle, UploadExtras, WhisperModels};
use crate::error::{TransportError, WorkflowError, WorkflowResult};

/// `POST /upload_video` response
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UploadResponse {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub analysis: Option<Value>,
    #[serde(default)]
    pub whisper_models: Option<WhisperModels>,
    #[serde(default)]
    pub subtitle_styles: Option<Vec<SubtitleStyle>>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Interpreted upload acknowledgement
#[derive(Debug, Clone, PartialEq)]
pub struct UploadAccepted {
    pub session_id: String,
    pub analysis: Option<AnalysisResult>,
    pub extras: UploadExtras,
}

impl UploadResponse {
    /// Apply the application-level rules to a decoded body
    pub fn into_accepted(self) -> WorkflowResult<UploadAccepted> {
        if let Some(error) = non_empty(self.error) {
            return Err(WorkflowError::Application(error));
        }
        if self.success == Some(false) {
            return Err(WorkflowError::Application("Upload was rejected by the server".to_string()));
        }
        let session_id = non_empty(self.session_id).ok_or_else(|| {
            TransportError::Malformed("upload response did not include a session_id".to_string())
        })?;

        Ok(UploadAccepted {
            session_id,
            analysis: self.analysis.filter(|v| !v.is_null()).map(AnalysisResult::new),
            extras: UploadExtras {
                whisper_models: self.whisper_models,
                subtitle_styles: self.subtitle_styles.unwrap_or_default(),
            },
        })
    }
}

/// `POST /analyze` response
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalyzeResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub analysis: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
}

impl AnalyzeResponse {
    pub fn into_analysis(self) -> WorkflowResult<AnalysisResult> {
        if !self.success {
            return Err(WorkflowError::Application(
                non_empty(self.error).unwrap_or_else(|| "Video analysis failed".to_string()),
            ));
        }
        if let Some(error) = non_empty(self.error) {
            return Err(WorkflowError::Application(error));
        }
        Ok(AnalysisResult::new(self.analysis.unwrap_or(Value::Null)))
    }
}

/// `POST /process` response
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
}

impl ProcessResponse {
    pub fn into_started(self) -> WorkflowResult<()> {
        if !self.success {
            return Err(WorkflowError::Application(
                non_empty(self.error).unwrap_or_else(|| "Failed to start processing".to_string()),
            ));
        }
        if let Some(error) = non_empty(self.error) {
            return Err(WorkflowError::Application(error));
        }
        Ok(())
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn upload(body: Value) -> WorkflowResult<UploadAccepted> {
        serde_json::from_value::<UploadResponse>(body).unwrap().into_accepted()
    }

    #[test]
    fn test_upload_flat_schema() {
        let accepted = upload(json!({"session_id": "s1"})).unwrap();
        assert_eq!(accepted.session_id, "s1");
        assert!(accepted.analysis.is_none());
        assert!(accepted.extras.is_empty());
    }

    #[test]
    fn test_upload_nested_schema() {
        let accepted = upload(json!({
            "success": true,
            "session_id": "s2",
            "analysis": {"audio_streams": []},
            "whisper_models": {"models": [{"name": "base"}], "recommended": "base"},
            "subtitle_styles": [{"name": "Default", "filename": "Default.ass"}]
        }))
        .unwrap();
        assert!(accepted.analysis.is_some());
        assert_eq!(accepted.extras.subtitle_styles.len(), 1);
    }

    #[test]
    fn test_upload_error_field_wins() {
        let err = upload(json!({"session_id": "s3", "error": "File too large"})).unwrap_err();
        assert!(matches!(err, WorkflowError::Application(msg) if msg == "File too large"));
    }

    #[test]
    fn test_upload_success_false() {
        assert!(matches!(
            upload(json!({"success": false, "session_id": "s4"})),
            Err(WorkflowError::Application(_))
        ));
    }

    #[test]
    fn test_upload_missing_session_is_malformed() {
        assert!(matches!(
            upload(json!({"analysis": {}})),
            Err(WorkflowError::Transport(TransportError::Malformed(_)))
        ));
        assert!(matches!(
            upload(json!({"session_id": ""})),
            Err(WorkflowError::Transport(TransportError::Malformed(_)))
        ));
    }

    #[test]
    fn test_analyze_rules() {
        let ok = AnalyzeResponse {
            success: true,
            analysis: Some(json!({"duration": "00:24:00"})),
            error: None,
        };
        assert_eq!(ok.into_analysis().unwrap().raw()["duration"], "00:24:00");

        let failed = AnalyzeResponse {
            success: false,
            analysis: None,
            error: None,
        };
        assert!(matches!(
            failed.into_analysis(),
            Err(WorkflowError::Application(msg)) if msg == "Video analysis failed"
        ));
    }

    #[test]
    fn test_process_rules() {
        assert!(ProcessResponse { success: true, error: None }.into_started().is_ok());
        let err = ProcessResponse {
            success: false,
            error: Some("Session not found".to_string()),
        }
        .into_started()
        .unwrap_err();
        assert_eq!(err.to_string(), "Session not found");
    }
}
