use serde::{Deserialize, Serialize};
use std::fmt;

/// Stages of one generation request.
///
/// ```text
/// RECEIVED → VALIDATED → RESOLVED → RENDERED → MATERIALIZED → QUALITY_CHECKED → COMPLETED
///     └──────────┴──────────┴──────────┴────────────┴────────────────┴──────→ FAILED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GenerationState {
    Received,
    Validated,
    Resolved,
    Rendered,
    Materialized,
    QualityChecked,
    Completed,
    Failed,
}

impl GenerationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            GenerationState::Received => "RECEIVED",
            GenerationState::Validated => "VALIDATED",
            GenerationState::Resolved => "RESOLVED",
            GenerationState::Rendered => "RENDERED",
            GenerationState::Materialized => "MATERIALIZED",
            GenerationState::QualityChecked => "QUALITY_CHECKED",
            GenerationState::Completed => "COMPLETED",
            GenerationState::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, GenerationState::Completed | GenerationState::Failed)
    }

    /// The only forward transition out of this state.
    pub fn next(&self) -> Option<GenerationState> {
        match self {
            GenerationState::Received => Some(GenerationState::Validated),
            GenerationState::Validated => Some(GenerationState::Resolved),
            GenerationState::Resolved => Some(GenerationState::Rendered),
            GenerationState::Rendered => Some(GenerationState::Materialized),
            GenerationState::Materialized => Some(GenerationState::QualityChecked),
            GenerationState::QualityChecked => Some(GenerationState::Completed),
            GenerationState::Completed | GenerationState::Failed => None,
        }
    }

    pub fn can_transition_to(&self, to: GenerationState) -> bool {
        if self.is_terminal() {
            return false;
        }
        to == GenerationState::Failed || self.next() == Some(to)
    }
}

impl fmt::Display for GenerationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tracks the current state and every state visited.
#[derive(Debug, Clone)]
pub struct PipelineState {
    current: GenerationState,
    history: Vec<GenerationState>,
}

impl Default for PipelineState {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineState {
    pub fn new() -> Self {
        Self {
            current: GenerationState::Received,
            history: vec![GenerationState::Received],
        }
    }

    pub fn current(&self) -> GenerationState {
        self.current
    }

    pub fn history(&self) -> &[GenerationState] {
        &self.history
    }

    /// Move to `to`; returns false (and stays put) for a transition the
    /// state machine does not allow.
    pub fn transition(&mut self, to: GenerationState) -> bool {
        if !self.current.can_transition_to(to) {
            return false;
        }
        self.current = to;
        self.history.push(to);
        true
    }

    pub fn fail(&mut self) {
        self.transition(GenerationState::Failed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_visits_every_stage() {
        let mut state = PipelineState::new();
        let mut next = state.current().next();
        while let Some(to) = next {
            assert!(state.transition(to));
            next = to.next();
        }
        assert_eq!(
            state.history(),
            &[
                GenerationState::Received,
                GenerationState::Validated,
                GenerationState::Resolved,
                GenerationState::Rendered,
                GenerationState::Materialized,
                GenerationState::QualityChecked,
                GenerationState::Completed,
            ]
        );
    }

    #[test]
    fn test_no_skipping() {
        let mut state = PipelineState::new();
        assert!(!state.transition(GenerationState::Rendered));
        assert_eq!(state.current(), GenerationState::Received);
    }

    #[test]
    fn test_failed_is_terminal() {
        let mut state = PipelineState::new();
        state.transition(GenerationState::Validated);
        state.fail();
        assert_eq!(state.current(), GenerationState::Failed);
        assert!(!state.transition(GenerationState::Resolved));
        assert!(!state.transition(GenerationState::Failed));
    }

    #[test]
    fn test_serializes_screaming_snake() {
        assert_eq!(
            serde_json::to_string(&GenerationState::QualityChecked).unwrap(),
            "\"QUALITY_CHECKED\""
        );
    }
}
