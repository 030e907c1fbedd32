//! Session worker lifecycle.
//!
//! - Starting -> Recording (device and recognizer acquired, `status` written)
//! - Starting -> Done (acquisition failed; `status` is never written)
//! - Recording -> Finalizing (cancelled, or failed mid-stream)
//! - Finalizing -> Done (`final` written, `status` removed)
//!
//! There is no Idle state: idle is the absence of a worker.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkerState {
    Starting,
    Recording,
    Finalizing,
    Done,
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerState::Starting => write!(f, "Starting"),
            WorkerState::Recording => write!(f, "Recording"),
            WorkerState::Finalizing => write!(f, "Finalizing"),
            WorkerState::Done => write!(f, "Done"),
        }
    }
}

impl WorkerState {
    pub fn can_transition_to(&self, target: &WorkerState) -> bool {
        matches!(
            (self, target),
            (WorkerState::Starting, WorkerState::Recording)
                | (WorkerState::Starting, WorkerState::Done)
                | (WorkerState::Recording, WorkerState::Finalizing)
                | (WorkerState::Finalizing, WorkerState::Done)
        )
    }

    pub fn is_terminal(&self) -> bool {
        *self == WorkerState::Done
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_display() {
        assert_eq!(WorkerState::Starting.to_string(), "Starting");
        assert_eq!(WorkerState::Recording.to_string(), "Recording");
        assert_eq!(WorkerState::Finalizing.to_string(), "Finalizing");
        assert_eq!(WorkerState::Done.to_string(), "Done");
    }

    #[test]
    fn test_valid_transitions() {
        assert!(WorkerState::Starting.can_transition_to(&WorkerState::Recording));
        assert!(WorkerState::Recording.can_transition_to(&WorkerState::Finalizing));
        assert!(WorkerState::Finalizing.can_transition_to(&WorkerState::Done));

        // Acquisition failure skips Recording entirely
        assert!(WorkerState::Starting.can_transition_to(&WorkerState::Done));
    }

    #[test]
    fn test_invalid_transitions() {
        assert!(!WorkerState::Starting.can_transition_to(&WorkerState::Finalizing));
        assert!(!WorkerState::Recording.can_transition_to(&WorkerState::Done));
        assert!(!WorkerState::Recording.can_transition_to(&WorkerState::Starting));
        assert!(!WorkerState::Finalizing.can_transition_to(&WorkerState::Recording));

        // Done is terminal
        for target in [
            WorkerState::Starting,
            WorkerState::Recording,
            WorkerState::Finalizing,
            WorkerState::Done,
        ] {
            assert!(!WorkerState::Done.can_transition_to(&target));
        }
        assert!(WorkerState::Done.is_terminal());
    }
}
