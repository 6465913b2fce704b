pub mod analysis;
pub mod detection;

pub use analysis::{AnalysisResult, Explanation, Origin};
pub use detection::{Detection, Quad, RecognitionResult};
