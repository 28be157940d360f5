//! Snippet Registry and Dispatch
//!
//! Maps snippet names to implementations and runs parsed calls in order.
//! A failing call is logged and recorded; it never stops the calls after it
//! unless [`DispatchConfig::stop_on_error`] is set.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::SnippetError;
use crate::race::RaceCoordinator;
use crate::script::{parse_script, SnippetCall};

/// State shared by the calls of one dispatch run.
pub struct SnippetContext<'a> {
    /// Race coordinator of the current page.
    pub races: &'a RaceCoordinator,
    /// Log every call before running it.
    pub debug: bool,
}

/// A named snippet implementation.
pub trait Snippet {
    fn run(&self, ctx: &mut SnippetContext<'_>, args: &[String]) -> Result<(), SnippetError>;
}

impl<F> Snippet for F
where
    F: Fn(&mut SnippetContext<'_>, &[String]) -> Result<(), SnippetError>,
{
    fn run(&self, ctx: &mut SnippetContext<'_>, args: &[String]) -> Result<(), SnippetError> {
        self(ctx, args)
    }
}

/// Dispatch settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DispatchConfig {
    /// Start every run in debug mode.
    pub debug: bool,
    /// Stop at the first failing call.
    pub stop_on_error: bool,
}

/// A call that did not run successfully.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchFailure {
    pub index: usize,
    pub name: String,
    pub message: String,
}

/// Result of a dispatch run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    /// Calls that ran to completion.
    pub executed: usize,
    pub failures: Vec<DispatchFailure>,
}

impl DispatchReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Name to snippet table.
#[derive(Default)]
pub struct SnippetRegistry {
    snippets: HashMap<String, Box<dyn Snippet>>,
}

impl SnippetRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the built-in `race`, `log` and `debug` snippets.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("race", race_snippet);
        registry.register("log", log_snippet);
        registry.register("debug", debug_snippet);
        registry
    }

    /// Register `snippet` under `name`, replacing any previous entry.
    pub fn register<S>(&mut self, name: &str, snippet: S)
    where
        S: Snippet + 'static,
    {
        self.snippets.insert(name.to_string(), Box::new(snippet));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.snippets.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.snippets.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Run `calls` in order against `races`.
    pub fn dispatch(
        &self,
        calls: &[SnippetCall],
        races: &RaceCoordinator,
        config: &DispatchConfig,
    ) -> DispatchReport {
        let mut ctx = SnippetContext {
            races,
            debug: config.debug,
        };
        let mut report = DispatchReport::default();

        for (index, call) in calls.iter().enumerate() {
            if ctx.debug {
                log::info!("snippet {}({})", call.name, call.args.join(", "));
            }

            let message = match self.snippets.get(&call.name) {
                Some(snippet) => match snippet.run(&mut ctx, &call.args) {
                    Ok(()) => {
                        report.executed += 1;
                        continue;
                    }
                    Err(e) => {
                        log::error!("snippet {} failed: {}", call.name, e);
                        e.to_string()
                    }
                },
                None => {
                    log::warn!("Unknown snippet: {}", call.name);
                    format!("Unknown snippet: {}", call.name)
                }
            };

            report.failures.push(DispatchFailure {
                index,
                name: call.name.clone(),
                message,
            });
            if config.stop_on_error {
                break;
            }
        }

        report
    }

    /// Parse `script` and dispatch the resulting calls.
    pub fn run_script(
        &self,
        script: &str,
        races: &RaceCoordinator,
        config: &DispatchConfig,
    ) -> DispatchReport {
        self.dispatch(&parse_script(script), races, config)
    }
}

// =============================================================================
// Built-in snippets
// =============================================================================

/// `race <start|end|finish|stop> [winners]`
fn race_snippet(ctx: &mut SnippetContext<'_>, args: &[String]) -> Result<(), SnippetError> {
    let action = args
        .first()
        .ok_or_else(|| SnippetError::missing("race", "action"))?;
    ctx.races.command(action, args.get(1).map(String::as_str))?;
    Ok(())
}

/// `log ...args`
fn log_snippet(_ctx: &mut SnippetContext<'_>, args: &[String]) -> Result<(), SnippetError> {
    log::info!("{}", args.join(" "));
    Ok(())
}

/// `debug`: log every following call of this run.
fn debug_snippet(ctx: &mut SnippetContext<'_>, _args: &[String]) -> Result<(), SnippetError> {
    ctx.debug = true;
    Ok(())
}
