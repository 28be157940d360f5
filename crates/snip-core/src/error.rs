//! Error types for snippet invocation.

use crate::race::InvalidActionError;

/// Error returned by a single snippet invocation.
///
/// The dispatch loop logs these and moves on to the next call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SnippetError {
    #[error(transparent)]
    InvalidAction(#[from] InvalidActionError),
    #[error("{snippet}: missing argument `{name}`")]
    MissingArgument { snippet: String, name: &'static str },
}

impl SnippetError {
    pub fn missing(snippet: &str, name: &'static str) -> Self {
        Self::MissingArgument {
            snippet: snippet.to_string(),
            name,
        }
    }
}
