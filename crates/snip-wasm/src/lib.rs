//! WebAssembly bindings for the snippet runtime

use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Once;

use log::{Level, LevelFilter, Log, Metadata, Record};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;

use snip_core::{DispatchConfig, DispatchReport, Participant, RaceCoordinator, SnippetRegistry};

// =============================================================================
// Console logging
// =============================================================================

struct ConsoleLogger;

impl Log for ConsoleLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let message = JsValue::from_str(&format!("[snippets] {}", record.args()));
        match record.level() {
            Level::Error => web_sys::console::error_1(&message),
            Level::Warn => web_sys::console::warn_1(&message),
            Level::Info => web_sys::console::info_1(&message),
            Level::Debug | Level::Trace => web_sys::console::debug_1(&message),
        }
    }

    fn flush(&self) {}
}

static LOGGER: ConsoleLogger = ConsoleLogger;
static LOGGER_INIT: Once = Once::new();
static LOGGER_INSTALLED: AtomicBool = AtomicBool::new(false);

fn init_logging(debug: bool) {
    LOGGER_INIT.call_once(|| {
        // Another logger may already be installed by the embedder.
        if log::set_logger(&LOGGER).is_ok() {
            LOGGER_INSTALLED.store(true, Ordering::Relaxed);
        }
    });
    // The embedder's logger keeps its own level.
    if LOGGER_INSTALLED.load(Ordering::Relaxed) {
        log::set_max_level(if debug { LevelFilter::Debug } else { LevelFilter::Info });
    }
}

// =============================================================================
// Race participants backed by JS functions
// =============================================================================

struct JsParticipant {
    name: String,
    lose: js_sys::Function,
}

impl Participant for JsParticipant {
    fn on_cancel(&self) {
        if let Err(e) = self.lose.call0(&JsValue::NULL) {
            log::error!("race loser {} threw: {:?}", self.name, e);
        }
    }
}

// =============================================================================
// Runtime
// =============================================================================

/// Snippet runtime for one page lifetime.
#[wasm_bindgen]
pub struct SnippetRuntime {
    races: RaceCoordinator,
    registry: SnippetRegistry,
    config: DispatchConfig,
}

#[wasm_bindgen]
impl SnippetRuntime {
    /// `config` is an optional `{ debug, stopOnError }` object.
    #[wasm_bindgen(constructor)]
    pub fn new(config: JsValue) -> SnippetRuntime {
        let config = read_config(&config);
        init_logging(config.debug);

        SnippetRuntime {
            races: RaceCoordinator::new(),
            registry: SnippetRegistry::with_builtins(),
            config,
        }
    }

    /// Run a snippet script. Returns `{ executed, failures }`.
    pub fn run(&self, script: &str) -> JsValue {
        let report = self.registry.run_script(script, &self.races, &self.config);
        report_to_js(&report)
    }

    /// `race(action, winners?)`. Throws on an unknown action.
    pub fn race(&self, action: &str, winners: Option<String>) -> Result<(), JsValue> {
        self.races
            .command(action, winners.as_deref())
            .map_err(|e| JsValue::from_str(&e.to_string()))
    }

    /// Register a loser callback with the current race and return its win callback.
    #[wasm_bindgen(js_name = raceWinner)]
    pub fn race_winner(&self, name: &str, lose: js_sys::Function) -> js_sys::Function {
        let participant = Rc::new(JsParticipant {
            name: name.to_string(),
            lose,
        });
        let ticket = self.races.register(name, participant);

        let win = Closure::wrap(Box::new(move || {
            ticket.win();
        }) as Box<dyn Fn()>);
        win.into_js_value().unchecked_into()
    }

    #[wasm_bindgen(js_name = isRacing)]
    pub fn is_racing(&self) -> bool {
        self.races.is_active()
    }
}

fn read_config(value: &JsValue) -> DispatchConfig {
    if value.is_undefined() || value.is_null() {
        return DispatchConfig::default();
    }

    let flag = |key: &str| {
        js_sys::Reflect::get(value, &key.into())
            .ok()
            .and_then(|value| value.as_bool())
            .unwrap_or(false)
    };

    DispatchConfig {
        debug: flag("debug"),
        stop_on_error: flag("stopOnError"),
    }
}

fn report_to_js(report: &DispatchReport) -> JsValue {
    let js_result = js_sys::Object::new();
    let _ = js_sys::Reflect::set(&js_result, &"executed".into(), &JsValue::from(report.executed as u32));

    let failures = js_sys::Array::new();
    for failure in &report.failures {
        let entry = js_sys::Object::new();
        let _ = js_sys::Reflect::set(&entry, &"index".into(), &JsValue::from(failure.index as u32));
        let _ = js_sys::Reflect::set(&entry, &"name".into(), &JsValue::from_str(&failure.name));
        let _ = js_sys::Reflect::set(&entry, &"message".into(), &JsValue::from_str(&failure.message));
        failures.push(&entry);
    }
    let _ = js_sys::Reflect::set(&js_result, &"failures".into(), &failures);

    js_result.into()
}
