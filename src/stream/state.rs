use bytes::Bytes;

use crate::models::{AnalysisResult, Explanation, Origin, RecognitionResult};

/// Where a frame is in its pipeline pass. Each variant owns exactly the data
/// the next step needs.
#[derive(Debug)]
pub enum FrameStage {
    Idle,
    Receiving { frame: Bytes },
    CacheCheck { frame: Bytes },
    CacheHit { result: AnalysisResult },
    CacheMiss { frame: Bytes },
    Recognizing { frame: Bytes },
    Explaining { recognition: RecognitionResult },
    Caching {
        recognition: RecognitionResult,
        explanation: Option<Explanation>,
    },
    Delivering { result: AnalysisResult, origin: Origin },
}

/// Data-free mirror of [`FrameStage`], for logging and inspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageKind {
    Idle,
    Receiving,
    CacheCheck,
    CacheHit,
    CacheMiss,
    Recognizing,
    Explaining,
    Caching,
    Delivering,
}

impl FrameStage {
    pub fn kind(&self) -> StageKind {
        match self {
            FrameStage::Idle => StageKind::Idle,
            FrameStage::Receiving { .. } => StageKind::Receiving,
            FrameStage::CacheCheck { .. } => StageKind::CacheCheck,
            FrameStage::CacheHit { .. } => StageKind::CacheHit,
            FrameStage::CacheMiss { .. } => StageKind::CacheMiss,
            FrameStage::Recognizing { .. } => StageKind::Recognizing,
            FrameStage::Explaining { .. } => StageKind::Explaining,
            FrameStage::Caching { .. } => StageKind::Caching,
            FrameStage::Delivering { .. } => StageKind::Delivering,
        }
    }
}

impl StageKind {
    pub fn name(&self) -> &'static str {
        match self {
            StageKind::Idle => "idle",
            StageKind::Receiving => "receiving",
            StageKind::CacheCheck => "cache_check",
            StageKind::CacheHit => "cache_hit",
            StageKind::CacheMiss => "cache_miss",
            StageKind::Recognizing => "recognizing",
            StageKind::Explaining => "explaining",
            StageKind::Caching => "caching",
            StageKind::Delivering => "delivering",
        }
    }

    /// Legal successors in the frame state machine.
    pub fn can_advance_to(&self, next: StageKind) -> bool {
        use StageKind::*;
        matches!(
            (self, next),
            (Idle, Receiving)
                | (Receiving, CacheCheck)
                | (CacheCheck, CacheHit)
                | (CacheCheck, CacheMiss)
                | (CacheHit, Delivering)
                | (CacheMiss, Recognizing)
                | (Recognizing, Explaining)
                | (Recognizing, Caching)
                | (Explaining, Caching)
                | (Caching, Delivering)
                | (Delivering, Idle)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_hit_skips_recognition() {
        assert!(StageKind::CacheCheck.can_advance_to(StageKind::CacheHit));
        assert!(StageKind::CacheHit.can_advance_to(StageKind::Delivering));
        assert!(!StageKind::CacheHit.can_advance_to(StageKind::Recognizing));
    }

    #[test]
    fn empty_text_goes_straight_to_caching() {
        assert!(StageKind::Recognizing.can_advance_to(StageKind::Caching));
        assert!(!StageKind::Idle.can_advance_to(StageKind::Delivering));
    }

    #[test]
    fn names_are_snake_case() {
        assert_eq!(StageKind::CacheCheck.name(), "cache_check");
        assert_eq!(FrameStage::Idle.kind(), StageKind::Idle);
    }
}
