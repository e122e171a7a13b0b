use thiserror::Error;

/// Failure while loading a filter script. The whole script is unusable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyntaxError {
    #[error("unexpected character {ch:?} at position {position}")]
    UnexpectedChar { ch: char, position: usize },

    #[error("unexpected end of input at position {position} (string starting at {start})")]
    UnterminatedString { start: usize, position: usize },

    #[error("unexpected end of input at position {position}, expected ({})", .expected.join("|"))]
    UnexpectedEnd {
        expected: Vec<String>,
        position: usize,
    },

    #[error("unexpected {found} at position {position}, expected ({})", .expected.join("|"))]
    UnexpectedToken {
        expected: Vec<String>,
        found: String,
        position: usize,
    },
}

impl SyntaxError {
    pub fn position(&self) -> usize {
        match self {
            SyntaxError::UnexpectedChar { position, .. }
            | SyntaxError::UnterminatedString { position, .. }
            | SyntaxError::UnexpectedEnd { position, .. }
            | SyntaxError::UnexpectedToken { position, .. } => *position,
        }
    }
}

/// A tag or match type the evaluator does not implement. Only the current
/// message's evaluation is affected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error(":{tag} is not supported in {test} test")]
pub struct UnsupportedFeature {
    pub test: &'static str,
    pub tag: String,
}

impl UnsupportedFeature {
    pub(crate) fn new(test: &'static str, tag: impl Into<String>) -> Self {
        Self {
            test,
            tag: tag.into(),
        }
    }
}
