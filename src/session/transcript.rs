use crate::recognizer::HypothesisUpdate;

/// Result reported when a session heard nothing
pub const NO_SPEECH: &str = "no speech detected";

/// Tracks the best result of a session.
///
/// Last final wins; without any final the last partial is used, and without
/// either the [`NO_SPEECH`] sentinel.
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    last_partial: Option<String>,
    last_final: Option<String>,
    partials: usize,
    finals: usize,
}

impl Transcript {
    /// Record an update; returns the partial text to publish, if any
    pub fn apply(&mut self, update: HypothesisUpdate) -> Option<&str> {
        match update {
            HypothesisUpdate::Partial(text) => {
                self.partials += 1;
                self.last_partial = Some(text);
                self.last_partial.as_deref()
            }
            HypothesisUpdate::Final(text) => {
                self.finals += 1;
                self.last_final = Some(text);
                None
            }
            HypothesisUpdate::NoChange => None,
        }
    }

    pub fn authoritative(&self) -> String {
        self.last_final
            .as_deref()
            .or(self.last_partial.as_deref())
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .unwrap_or(NO_SPEECH)
            .to_string()
    }

    pub fn partials(&self) -> usize {
        self.partials
    }

    pub fn finals(&self) -> usize {
        self.finals
    }
}
