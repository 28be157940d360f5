//! Race scenario replay.
//!
//! A scenario is a JSON list of steps run against a fresh coordinator with
//! recording participants:
//!
//! ```json
//! {"steps": [
//!   {"op": "start", "winners": "2"},
//!   {"op": "register", "name": "a"},
//!   {"op": "win", "name": "a"},
//!   {"op": "end"}
//! ]}
//! ```

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use snip_core::{Participant, RaceCoordinator, RaceTicket};

#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum Step {
    Start {
        #[serde(default)]
        winners: Option<String>,
    },
    End,
    Register {
        name: String,
    },
    Win {
        name: String,
    },
    Command {
        action: String,
        #[serde(default)]
        winners: Option<String>,
    },
}

/// One observable event, tagged with the step that caused it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TraceEvent {
    pub step: usize,
    pub event: String,
}

type Journal = Rc<RefCell<Vec<String>>>;

struct Recorder {
    name: String,
    journal: Journal,
}

impl Participant for Recorder {
    fn on_win(&self) {
        self.journal.borrow_mut().push(format!("won {}", self.name));
    }

    fn on_cancel(&self) {
        self.journal.borrow_mut().push(format!("cancelled {}", self.name));
    }
}

/// Replay `scenario` and return everything that happened, in order.
pub fn run_scenario(scenario: &Scenario) -> Vec<TraceEvent> {
    let races = RaceCoordinator::new();
    let journal = Journal::default();
    // Latest ticket per name; earlier ones stay bound to their own session.
    let mut tickets: HashMap<String, RaceTicket> = HashMap::new();
    let mut trace = Vec::new();

    for (step, op) in scenario.steps.iter().enumerate() {
        let mut events = Vec::new();
        match op {
            Step::Start { winners } => {
                races.start_with(winners.as_deref().unwrap_or("1"));
                events.push(format!("started, quota {}", races.remaining_winners().unwrap_or(0)));
            }
            Step::End => {
                let outcomes = races.end();
                events.push(format!("ended, replayed {:?}", outcomes));
            }
            Step::Register { name } => {
                let participant = Rc::new(Recorder {
                    name: name.clone(),
                    journal: Rc::clone(&journal),
                });
                let ticket = races.register(name, participant);
                let state = if ticket.is_bound() { "joined" } else { "no race" };
                events.push(format!("register {}: {}", name, state));
                tickets.insert(name.clone(), ticket);
            }
            Step::Win { name } => match tickets.get(name) {
                Some(ticket) => {
                    let outcome = ticket.win();
                    events.push(format!("win {}: {:?}", name, outcome));
                }
                None => events.push(format!("win {}: not registered", name)),
            },
            Step::Command { action, winners } => {
                match races.command(action, winners.as_deref()) {
                    Ok(()) => events.push(format!("command {}: ok", action)),
                    Err(e) => events.push(format!("command {}: {}", action, e)),
                }
            }
        }

        // Callbacks fire before the step's own summary is known.
        let mut step_events: Vec<String> = journal.borrow_mut().drain(..).collect();
        step_events.extend(events);

        trace.extend(step_events.into_iter().map(|event| TraceEvent { step, event }));
    }

    trace
}
