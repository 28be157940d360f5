//! Race Coordinator
//!
//! Competing snippet matchers register with the current race session and get
//! a [`RaceTicket`] back. Calling [`RaceTicket::win`] signals a match. While
//! the session is still current, wins are only recorded; they are adjudicated
//! once the session stops being current, either because [`RaceCoordinator::end`]
//! replays them or because a later [`RaceCoordinator::start`] superseded the
//! session and a stale ticket fires. When the winner quota is reached, every
//! participant that has not won is cancelled.
//!
//! Everything here is single-threaded: sessions are shared through `Rc` and
//! callbacks are always invoked with no internal borrow held, so a participant
//! may call back into the coordinator from `on_win` or `on_cancel`.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::mem;
use std::rc::Rc;
use std::str::FromStr;

// =============================================================================
// Commands
// =============================================================================

/// Error for a race command that is neither a start nor an end action.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid action: {0}")]
pub struct InvalidActionError(pub String);

/// Action accepted by the `race` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RaceAction {
    /// `start`
    Start,
    /// `end`, `finish` or `stop`
    End,
}

impl FromStr for RaceAction {
    type Err = InvalidActionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "start" => Ok(Self::Start),
            "end" | "finish" | "stop" => Ok(Self::End),
            _ => Err(InvalidActionError(s.to_string())),
        }
    }
}

/// Coerce a winner count argument the way page scripts do with `parseInt`.
///
/// Leading whitespace and a sign are accepted, trailing garbage is ignored.
/// Anything that does not yield a positive integer becomes 1.
pub fn parse_quota(text: &str) -> u32 {
    let trimmed = text.trim_start();
    let (negative, digits) = match trimmed.as_bytes().first() {
        Some(b'-') => (true, &trimmed[1..]),
        Some(b'+') => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };

    let end = digits
        .bytes()
        .position(|b| !b.is_ascii_digit())
        .unwrap_or(digits.len());
    if negative || end == 0 {
        return 1;
    }

    match digits[..end].parse::<u32>() {
        Ok(0) => 1,
        Ok(n) => n,
        // Only overflow can fail here, the slice is all digits.
        Err(_) => u32::MAX,
    }
}

// =============================================================================
// Participants
// =============================================================================

/// A matcher taking part in a race.
pub trait Participant {
    /// Called once when a win of this participant is counted.
    fn on_win(&self) {}

    /// Called when the race was decided without this participant.
    /// The participant is expected to stop its own matching work.
    fn on_cancel(&self);
}

/// What happened to a single [`RaceTicket::win`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WinOutcome {
    /// The ticket was issued while no race was running.
    Inert,
    /// The session is still current; the win was recorded for replay.
    Pending,
    /// The win was counted but the quota is not reached yet.
    Counted,
    /// The win reached the quota and the remaining participants were cancelled.
    Decided,
    /// The quota was already reached, or the participant is no longer
    /// registered (it already won or was cancelled).
    Ignored,
}

// =============================================================================
// Sessions
// =============================================================================

type SessionSlot = Rc<RefCell<Option<Rc<RaceSession>>>>;

struct Entry {
    id: u32,
    name: String,
    participant: Rc<dyn Participant>,
}

struct SessionState {
    remaining: u32,
    next_id: u32,
    participants: Vec<Entry>,
    pending_wins: Vec<u32>,
}

struct RaceSession {
    serial: u64,
    state: RefCell<SessionState>,
}

impl RaceSession {
    fn new(serial: u64, quota: u32) -> Self {
        Self {
            serial,
            state: RefCell::new(SessionState {
                remaining: quota,
                next_id: 0,
                participants: Vec::new(),
                pending_wins: Vec::new(),
            }),
        }
    }

    fn add(&self, name: &str, participant: Rc<dyn Participant>) -> u32 {
        let mut state = self.state.borrow_mut();
        let id = state.next_id;
        state.next_id += 1;
        state.participants.push(Entry {
            id,
            name: name.to_string(),
            participant,
        });
        id
    }

    /// Queue a win for replay. Each participant is queued at most once,
    /// in the order of its first win.
    fn record(&self, id: u32) {
        let mut state = self.state.borrow_mut();
        if !state.pending_wins.contains(&id) {
            state.pending_wins.push(id);
        }
    }

    /// Count a win for participant `id` and cancel the rest once the quota is met.
    fn settle(&self, id: u32) -> WinOutcome {
        let (winner, losers) = {
            let mut state = self.state.borrow_mut();
            if state.remaining < 1 {
                return WinOutcome::Ignored;
            }
            let pos = match state.participants.iter().position(|entry| entry.id == id) {
                Some(pos) => pos,
                None => return WinOutcome::Ignored,
            };

            let winner = state.participants.remove(pos);
            state.remaining -= 1;
            let losers = if state.remaining == 0 {
                Some(mem::take(&mut state.participants))
            } else {
                None
            };
            (winner, losers)
        };

        log::debug!("race #{}: {} won", self.serial, winner.name);
        winner.participant.on_win();

        match losers {
            Some(losers) => {
                for loser in losers {
                    log::debug!("race #{}: {} lost", self.serial, loser.name);
                    loser.participant.on_cancel();
                }
                WinOutcome::Decided
            }
            None => WinOutcome::Counted,
        }
    }
}

// =============================================================================
// Tickets
// =============================================================================

struct TicketBinding {
    id: u32,
    session: Rc<RaceSession>,
    current: SessionSlot,
}

/// The win callback handed to a participant at registration.
///
/// A ticket stays bound to the session that was current when it was issued,
/// even after another race has started.
#[derive(Clone)]
pub struct RaceTicket {
    name: Rc<str>,
    binding: Option<Rc<TicketBinding>>,
}

impl RaceTicket {
    fn inert(name: &str) -> Self {
        Self {
            name: Rc::from(name),
            binding: None,
        }
    }

    /// Participant name given at registration.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the ticket was issued by a running race.
    pub fn is_bound(&self) -> bool {
        self.binding.is_some()
    }

    /// Signal a match. Safe to call any number of times.
    pub fn win(&self) -> WinOutcome {
        let binding = match &self.binding {
            Some(binding) => binding,
            None => return WinOutcome::Inert,
        };

        let is_current = binding
            .current
            .borrow()
            .as_ref()
            .map_or(false, |current| Rc::ptr_eq(current, &binding.session));

        if is_current {
            log::debug!("race #{}: {} matched, pending", binding.session.serial, self.name);
            binding.session.record(binding.id);
            return WinOutcome::Pending;
        }

        let outcome = binding.session.settle(binding.id);
        if outcome == WinOutcome::Ignored {
            log::debug!("race #{}: late win of {} ignored", binding.session.serial, self.name);
        }
        outcome
    }
}

impl fmt::Debug for RaceTicket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = f.debug_struct("RaceTicket");
        out.field("name", &self.name);
        if let Some(binding) = &self.binding {
            out.field("session", &binding.session.serial);
            out.field("id", &binding.id);
        }
        out.finish()
    }
}

// =============================================================================
// Coordinator
// =============================================================================

/// Owns the current race session for one page lifetime.
pub struct RaceCoordinator {
    current: SessionSlot,
    serial: Cell<u64>,
}

impl Default for RaceCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl RaceCoordinator {
    pub fn new() -> Self {
        Self {
            current: Rc::new(RefCell::new(None)),
            serial: Cell::new(0),
        }
    }

    /// Whether a race session is currently running.
    pub fn is_active(&self) -> bool {
        self.current.borrow().is_some()
    }

    /// Winner quota left in the current session, if any.
    pub fn remaining_winners(&self) -> Option<u32> {
        self.current
            .borrow()
            .as_ref()
            .map(|session| session.state.borrow().remaining)
    }

    /// Start a fresh session, replacing the current one without carrying
    /// anything over. A zero quota is raised to 1.
    pub fn start(&self, quota: u32) {
        let quota = quota.max(1);
        let serial = self.serial.get() + 1;
        self.serial.set(serial);

        let previous = self
            .current
            .borrow_mut()
            .replace(Rc::new(RaceSession::new(serial, quota)));
        if let Some(previous) = previous {
            log::debug!("race #{} superseded", previous.serial);
        }
        log::debug!("race #{} started, {} winner(s)", serial, quota);
    }

    /// Start a session from a textual winner count. See [`parse_quota`].
    pub fn start_with(&self, winners: &str) {
        self.start(parse_quota(winners));
    }

    /// End the current session and replay its recorded wins in order.
    ///
    /// Returns the outcome of every replayed win. No-op without a session.
    pub fn end(&self) -> Vec<WinOutcome> {
        let session = match self.current.borrow_mut().take() {
            Some(session) => session,
            None => return Vec::new(),
        };

        let pending = mem::take(&mut session.state.borrow_mut().pending_wins);
        log::debug!("race #{} ended, replaying {} win(s)", session.serial, pending.len());

        pending.into_iter().map(|id| session.settle(id)).collect()
    }

    /// Run a textual `race` command: `start [winners]`, `end`, `finish` or `stop`.
    pub fn command(&self, action: &str, winners: Option<&str>) -> Result<(), InvalidActionError> {
        match action.parse::<RaceAction>()? {
            RaceAction::Start => self.start_with(winners.unwrap_or("1")),
            RaceAction::End => {
                self.end();
            }
        }
        Ok(())
    }

    /// Register a participant with the current session.
    ///
    /// Without a running race the returned ticket does nothing.
    pub fn register(&self, name: &str, participant: Rc<dyn Participant>) -> RaceTicket {
        let current = self.current.borrow();
        let session = match current.as_ref() {
            Some(session) => session,
            None => return RaceTicket::inert(name),
        };

        let id = session.add(name, participant);
        log::debug!("race #{}: {} joined", session.serial, name);

        RaceTicket {
            name: Rc::from(name),
            binding: Some(Rc::new(TicketBinding {
                id,
                session: Rc::clone(session),
                current: Rc::clone(&self.current),
            })),
        }
    }
}

impl fmt::Debug for RaceCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let current = self.current.borrow();
        let mut out = f.debug_struct("RaceCoordinator");
        match current.as_ref() {
            Some(session) => {
                let state = session.state.borrow();
                out.field("session", &session.serial)
                    .field("remaining", &state.remaining)
                    .field("participants", &state.participants.len())
                    .field("pending_wins", &state.pending_wins.len());
            }
            None => {
                out.field("session", &Option::<u64>::None);
            }
        }
        out.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    type Journal = Rc<RefCell<Vec<String>>>;

    struct Spy {
        name: &'static str,
        journal: Journal,
    }

    impl Participant for Spy {
        fn on_win(&self) {
            self.journal.borrow_mut().push(format!("win {}", self.name));
        }

        fn on_cancel(&self) {
            self.journal.borrow_mut().push(format!("cancel {}", self.name));
        }
    }

    fn spy(name: &'static str, journal: &Journal) -> Rc<dyn Participant> {
        Rc::new(Spy {
            name,
            journal: Rc::clone(journal),
        })
    }

    fn entries(journal: &Journal) -> Vec<String> {
        journal.borrow().clone()
    }

    #[test]
    fn ticket_without_race_is_inert() {
        let journal = Journal::default();
        let races = RaceCoordinator::new();

        let a = races.register("a", spy("a", &journal));
        assert!(!a.is_bound());
        assert_eq!(a.win(), WinOutcome::Inert);

        races.start(1);
        assert_eq!(a.win(), WinOutcome::Inert);
        assert!(entries(&journal).is_empty());
    }

    #[test]
    fn wins_in_current_session_stay_pending() {
        let journal = Journal::default();
        let races = RaceCoordinator::new();
        races.start(2);

        let a = races.register("a", spy("a", &journal));
        let b = races.register("b", spy("b", &journal));
        let _c = races.register("c", spy("c", &journal));

        assert_eq!(a.win(), WinOutcome::Pending);
        assert_eq!(b.win(), WinOutcome::Pending);
        assert!(entries(&journal).is_empty());
        assert_eq!(races.remaining_winners(), Some(2));
    }

    #[test]
    fn late_win_on_superseded_session_cancels_the_rest() {
        let journal = Journal::default();
        let races = RaceCoordinator::new();
        races.start(1);

        let a = races.register("a", spy("a", &journal));
        let b = races.register("b", spy("b", &journal));

        assert_eq!(a.win(), WinOutcome::Pending);
        races.start(1);
        assert_eq!(b.win(), WinOutcome::Decided);

        assert_eq!(entries(&journal), vec!["win b", "cancel a"]);

        // the stale session is decided, further wins change nothing
        assert_eq!(a.win(), WinOutcome::Ignored);
        assert_eq!(entries(&journal), vec!["win b", "cancel a"]);
        // and the new session was never touched
        assert_eq!(races.remaining_winners(), Some(1));
    }

    #[test]
    fn end_replays_pending_wins_in_order() {
        let journal = Journal::default();
        let races = RaceCoordinator::new();
        races.start(2);

        let a = races.register("a", spy("a", &journal));
        let b = races.register("b", spy("b", &journal));
        let _c = races.register("c", spy("c", &journal));

        b.win();
        a.win();
        b.win();

        let outcomes = races.end();
        assert_eq!(outcomes, vec![WinOutcome::Counted, WinOutcome::Decided]);
        assert_eq!(entries(&journal), vec!["win b", "win a", "cancel c"]);
        assert!(!races.is_active());
    }

    #[test]
    fn repeated_wins_are_replayed_once() {
        let journal = Journal::default();
        let races = RaceCoordinator::new();
        races.start(1);

        let a = races.register("a", spy("a", &journal));
        let _b = races.register("b", spy("b", &journal));

        for _ in 0..10_000 {
            assert_eq!(a.win(), WinOutcome::Pending);
        }

        assert_eq!(races.end(), vec![WinOutcome::Decided]);
        assert_eq!(entries(&journal), vec!["win a", "cancel b"]);
    }

    #[test]
    fn end_without_race_is_noop() {
        let races = RaceCoordinator::new();
        assert!(races.end().is_empty());
        assert!(races.command("stop", None).is_ok());
        assert!(!races.is_active());
    }

    #[test]
    fn quota_coercion() {
        assert_eq!(parse_quota("not-a-number"), 1);
        assert_eq!(parse_quota(""), 1);
        assert_eq!(parse_quota("0"), 1);
        assert_eq!(parse_quota("-3"), 1);
        assert_eq!(parse_quota("3"), 3);
        assert_eq!(parse_quota("  2px"), 2);
        assert_eq!(parse_quota("+4"), 4);
        assert_eq!(parse_quota("99999999999"), u32::MAX);

        let races = RaceCoordinator::new();
        races.start_with("not-a-number");
        assert_eq!(races.remaining_winners(), Some(1));
        races.start(0);
        assert_eq!(races.remaining_winners(), Some(1));
    }

    #[test]
    fn invalid_action_names_the_action() {
        let races = RaceCoordinator::new();
        let err = races.command("pause", None).unwrap_err();
        assert_eq!(err, InvalidActionError("pause".to_string()));
        assert!(err.to_string().contains("pause"));
        assert!(!races.is_active());
    }

    #[test]
    fn command_aliases() {
        let races = RaceCoordinator::new();
        for end in ["end", "finish", "stop"] {
            races.command("start", Some("3")).unwrap();
            assert_eq!(races.remaining_winners(), Some(3));
            races.command(end, None).unwrap();
            assert!(!races.is_active());
        }
    }

    #[test]
    fn start_discards_previous_state() {
        let journal = Journal::default();
        let races = RaceCoordinator::new();
        races.start(1);
        let a = races.register("a", spy("a", &journal));
        a.win();

        races.start(1);
        // the pending win belonged to the old session and is not replayed
        assert!(races.end().is_empty());
        assert!(entries(&journal).is_empty());
    }

    #[test]
    fn cancelled_participant_cannot_win() {
        let journal = Journal::default();
        let races = RaceCoordinator::new();
        races.start(1);
        let a = races.register("a", spy("a", &journal));
        let b = races.register("b", spy("b", &journal));
        races.end();

        assert_eq!(a.win(), WinOutcome::Decided);
        assert_eq!(b.win(), WinOutcome::Ignored);
        assert_eq!(entries(&journal), vec!["win a", "cancel b"]);
    }

    struct Restarter {
        races: Rc<RaceCoordinator>,
    }

    impl Participant for Restarter {
        fn on_cancel(&self) {
            self.races.start(1);
        }
    }

    #[test]
    fn callbacks_may_reenter_the_coordinator() {
        let journal = Journal::default();
        let races = Rc::new(RaceCoordinator::new());
        races.start(1);
        let a = races.register("a", spy("a", &journal));
        let _b = races.register(
            "b",
            Rc::new(Restarter {
                races: Rc::clone(&races),
            }),
        );
        a.win();

        assert_eq!(races.end(), vec![WinOutcome::Decided]);
        assert!(races.is_active());
    }
}
