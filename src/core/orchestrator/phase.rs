use std::fmt;

/// Lifecycle of one turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TurnPhase {
    #[default]
    Idle,
    Dispatching,
    EmotionClassifying,
    PromptBuilding,
    Streaming,
    Finalizing,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidTransition {
    pub from: TurnPhase,
    pub to: TurnPhase,
}

impl fmt::Display for InvalidTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid turn transition {:?} -> {:?}", self.from, self.to)
    }
}

impl std::error::Error for InvalidTransition {}

impl TurnPhase {
    /// Whether a turn holds the single-flight guard.
    pub fn is_busy(self) -> bool {
        self != TurnPhase::Idle
    }

    pub fn can_transition_to(self, to: TurnPhase) -> bool {
        use TurnPhase::*;
        match (self, to) {
            (Idle, Dispatching) => true,
            (Dispatching, EmotionClassifying | PromptBuilding) => true,
            (EmotionClassifying, PromptBuilding) => true,
            (PromptBuilding, Streaming) => true,
            (Streaming, Finalizing) => true,
            (Finalizing, Idle) => true,
            (Failed, Idle) => true,
            (from, Failed) => from != Idle && from != Failed,
            _ => false,
        }
    }

    pub fn transition(self, to: TurnPhase) -> Result<TurnPhase, InvalidTransition> {
        if self.can_transition_to(to) {
            Ok(to)
        } else {
            Err(InvalidTransition { from: self, to })
        }
    }
}
