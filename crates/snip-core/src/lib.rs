//! Snip Core Library
//!
//! Runtime pieces of the page snippet library used by the content filter:
//! parsing snippet filters and scripts, dispatching calls to named snippets,
//! and coordinating races between competing matchers.
//!
//! # Modules
//!
//! - `race`: race sessions, winner quotas and loser cancellation
//! - `script`: snippet script parser
//! - `filter`: `#$#` snippet filter parser and host selection
//! - `registry`: snippet table, built-in snippets and the dispatch loop
//! - `error`: snippet invocation errors

pub mod error;
pub mod filter;
pub mod race;
pub mod registry;
pub mod script;

// Re-export commonly used types
pub use error::SnippetError;
pub use filter::{parse_snippet_filter, SnippetFilter, SnippetFilterSet};
pub use race::{InvalidActionError, Participant, RaceAction, RaceCoordinator, RaceTicket, WinOutcome};
pub use registry::{DispatchConfig, DispatchReport, Snippet, SnippetContext, SnippetRegistry};
pub use script::{parse_script, parse_scriptlet_call, SnippetCall};
