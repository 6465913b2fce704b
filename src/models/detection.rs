use serde::{Deserialize, Serialize};

/// Four corners in pixel space: top-left, top-right, bottom-right, bottom-left.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Quad(pub [[f32; 2]; 4]);

impl Quad {
    pub fn from_rect(left: f32, top: f32, width: f32, height: f32) -> Self {
        let right = left + width;
        let bottom = top + height;
        Quad([[left, top], [right, top], [right, bottom], [left, bottom]])
    }

    /// Scales corners per axis, e.g. to map a downscaled image back to the
    /// frame.
    pub fn scaled(&self, factor_x: f32, factor_y: f32) -> Self {
        let mut corners = self.0;
        for corner in corners.iter_mut() {
            corner[0] *= factor_x;
            corner[1] *= factor_y;
        }
        Quad(corners)
    }
}

/// One recognized text span.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub text: String,
    pub confidence: f32,
    pub bounding_box: Quad,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognitionResult {
    pub combined_text: String,
    pub confidence: f32,
    /// Detector scan order; never re-sorted.
    pub detections: Vec<Detection>,
    pub recognition_ms: u64,
}

impl RecognitionResult {
    /// Joins detection texts with newlines and averages their confidence.
    ///
    /// The average is an unweighted mean, so a one-character detection counts
    /// as much as a full line. An empty set has confidence 0.0.
    pub fn from_detections(detections: Vec<Detection>, recognition_ms: u64) -> Self {
        let combined_text = detections
            .iter()
            .map(|detection| detection.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");

        let confidence = if detections.is_empty() {
            0.0
        } else {
            let sum: f32 = detections.iter().map(|d| d.confidence).sum();
            round3(sum / detections.len() as f32)
        };

        Self {
            combined_text,
            confidence,
            detections,
            recognition_ms,
        }
    }

    pub fn has_text(&self) -> bool {
        !self.combined_text.trim().is_empty()
    }
}

fn round3(value: f32) -> f32 {
    (value * 1000.0).round() / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detection(text: &str, confidence: f32) -> Detection {
        Detection {
            text: text.into(),
            confidence,
            bounding_box: Quad::from_rect(0.0, 0.0, 10.0, 10.0),
        }
    }

    #[test]
    fn combines_text_in_scan_order() {
        let result = RecognitionResult::from_detections(
            vec![detection("x² + 5x + 6 = 0", 0.9), detection("(x+2)(x+3)", 0.7)],
            12,
        );
        assert_eq!(result.combined_text, "x² + 5x + 6 = 0\n(x+2)(x+3)");
        assert!((result.confidence - 0.8).abs() < 1e-6);
        assert_eq!(result.detections[0].text, "x² + 5x + 6 = 0");
    }

    #[test]
    fn empty_detections_have_zero_confidence() {
        let result = RecognitionResult::from_detections(vec![], 3);
        assert_eq!(result.combined_text, "");
        assert_eq!(result.confidence, 0.0);
        assert!(!result.has_text());
    }

    #[test]
    fn confidence_is_rounded_to_three_places() {
        let result = RecognitionResult::from_detections(
            vec![detection("a", 0.3333), detection("b", 0.3334), detection("c", 0.3335)],
            0,
        );
        assert_eq!(result.confidence, 0.333);
    }

    #[test]
    fn quad_corners_run_clockwise_from_top_left() {
        let quad = Quad::from_rect(10.0, 20.0, 30.0, 5.0);
        assert_eq!(quad.0, [[10.0, 20.0], [40.0, 20.0], [40.0, 25.0], [10.0, 25.0]]);
        assert_eq!(quad.scaled(2.0, 4.0).0[2], [80.0, 100.0]);
    }

    #[test]
    fn bounding_box_serializes_as_nested_arrays() {
        let json = serde_json::to_value(detection("hi", 0.5)).unwrap();
        assert_eq!(json["bounding_box"][1], serde_json::json!([10.0, 0.0]));
    }
}
