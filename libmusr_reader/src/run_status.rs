use super::error::ErrorCode;

/// Result of processing one run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RunOutcome {
    #[default]
    Decoded,
    Missing,
    Failed(ErrorCode),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunStatus {
    pub progress: f32,
    pub run_number: i32,
    pub outcome: RunOutcome,
}

impl RunStatus {
    pub fn new(progress: f32, run_number: i32, outcome: RunOutcome) -> Self {
        Self {
            progress,
            run_number,
            outcome,
        }
    }
}
