use serde::{Deserialize, Serialize};

use crate::models::{AnalysisResult, Detection, Origin, RecognitionResult};

/// One outbound JSON message: `{"type": ..., "data": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case")]
pub enum ServerMessage {
    Status(StatusPayload),
    RecognitionResult(RecognitionPayload),
    ExplanationResult(ExplanationPayload),
    Complete(CompletePayload),
    Error(ErrorPayload),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusPayload {
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognitionPayload {
    pub combined_text: String,
    pub confidence: f32,
    pub detections: Vec<Detection>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExplanationPayload {
    pub explanation: String,
    pub model: String,
}

/// Terminal payload. Also the response body of the single-shot endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletePayload {
    #[serde(flatten)]
    pub result: AnalysisResult,
    pub origin: Origin,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub message: String,
}

impl ServerMessage {
    pub fn processing() -> Self {
        ServerMessage::Status(StatusPayload {
            status: "processing".to_string(),
        })
    }

    pub fn recognition(result: &RecognitionResult) -> Self {
        ServerMessage::RecognitionResult(RecognitionPayload {
            combined_text: result.combined_text.clone(),
            confidence: result.confidence,
            detections: result.detections.clone(),
        })
    }

    pub fn explanation(explanation: impl Into<String>, model: impl Into<String>) -> Self {
        ServerMessage::ExplanationResult(ExplanationPayload {
            explanation: explanation.into(),
            model: model.into(),
        })
    }

    pub fn complete(result: AnalysisResult, origin: Origin) -> Self {
        ServerMessage::Complete(CompletePayload { result, origin })
    }

    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error(ErrorPayload {
            message: message.into(),
        })
    }

    /// The wire `type` tag.
    pub fn kind(&self) -> &'static str {
        match self {
            ServerMessage::Status(_) => "status",
            ServerMessage::RecognitionResult(_) => "recognition-result",
            ServerMessage::ExplanationResult(_) => "explanation-result",
            ServerMessage::Complete(_) => "complete",
            ServerMessage::Error(_) => "error",
        }
    }

    /// `complete` and `error` end a frame's message sequence.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ServerMessage::Complete(_) | ServerMessage::Error(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn wire_shape_is_type_plus_data() {
        let json = serde_json::to_value(ServerMessage::processing()).unwrap();
        assert_eq!(json, serde_json::json!({"type": "status", "data": {"status": "processing"}}));

        let json = serde_json::to_value(ServerMessage::error("Unable to decode image data")).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["data"]["message"], "Unable to decode image data");
    }

    #[test]
    fn kind_matches_serialized_tag() {
        let recognition = RecognitionResult::from_detections(vec![], 1);
        let messages = [
            ServerMessage::processing(),
            ServerMessage::recognition(&recognition),
            ServerMessage::explanation("text", "model"),
            ServerMessage::complete(
                crate::models::AnalysisResult::assemble(recognition.clone(), None, 2, Utc::now()),
                Origin::Computed,
            ),
            ServerMessage::error("boom"),
        ];
        for message in messages {
            let json = serde_json::to_value(&message).unwrap();
            assert_eq!(json["type"], message.kind());
        }
    }

    #[test]
    fn complete_flattens_result_beside_origin() {
        let recognition = RecognitionResult::from_detections(vec![], 1);
        let message = ServerMessage::complete(
            crate::models::AnalysisResult::assemble(recognition, None, 2, Utc::now()),
            Origin::Cache,
        );
        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["data"]["origin"], "cache");
        assert_eq!(json["data"]["combined_text"], "");
        assert_eq!(json["data"]["success"], true);

        let back: ServerMessage = serde_json::from_value(json).unwrap();
        assert!(back.is_terminal());
    }
}
