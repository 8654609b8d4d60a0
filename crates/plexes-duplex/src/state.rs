//! Lifecycle states and their transition functions.
//!
//! Every state machine here is total: `next` returns the successor for a
//! legal transition and `None` for anything else, and callers treat `None`
//! as "someone else already got there".

use std::fmt;

use plexes_stream::{describe, Reason};

/// How a simplex or duplex stopped.
#[derive(Debug, Clone, Default)]
pub struct Stop {
    reason: Option<Reason>,
}

impl Stop {
    pub(crate) fn new(reason: Option<Reason>) -> Self {
        Self { reason }
    }

    /// Cause of the stop; `None` for a graceful close.
    pub fn reason(&self) -> Option<&Reason> {
        self.reason.as_ref()
    }

    /// True when the stop carries no reason.
    pub fn is_clean(&self) -> bool {
        self.reason.is_none()
    }
}

/// Start axis of a simplex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StartState {
    #[default]
    Idle,
    Starting,
    Started,
    /// `open` never completed: the simplex stopped before it ran, or it
    /// failed.
    Abandoned,
}

impl StartState {
    pub(crate) fn begin(self) -> Option<StartState> {
        match self {
            StartState::Idle => Some(StartState::Starting),
            _ => None,
        }
    }

    pub(crate) fn finish(self) -> Option<StartState> {
        match self {
            StartState::Starting => Some(StartState::Started),
            _ => None,
        }
    }

    pub(crate) fn abandon(self) -> Option<StartState> {
        match self {
            StartState::Starting => Some(StartState::Abandoned),
            _ => None,
        }
    }
}

/// Stop axis of a simplex.
#[derive(Debug, Clone, Default)]
pub enum Phase {
    #[default]
    Open,
    Closing,
    Closed,
    Erroring(Option<Reason>),
    Errored(Option<Reason>),
}

/// Events driving [`Phase`].
#[derive(Debug, Clone)]
pub(crate) enum Transition {
    BeginClose,
    FinishClose,
    BeginError(Option<Reason>),
    /// A close hook failed; the close turns into an error.
    Escalate(Reason),
    FinishError,
}

impl Phase {
    pub(crate) fn next(&self, transition: Transition) -> Option<Phase> {
        match (self, transition) {
            (Phase::Open, Transition::BeginClose) => Some(Phase::Closing),
            (Phase::Closing, Transition::FinishClose) => Some(Phase::Closed),
            (Phase::Open, Transition::BeginError(reason)) => Some(Phase::Erroring(reason)),
            (Phase::Closing, Transition::Escalate(reason)) => Some(Phase::Erroring(Some(reason))),
            (Phase::Erroring(reason), Transition::FinishError) => {
                Some(Phase::Errored(reason.clone()))
            }
            _ => None,
        }
    }

    /// Close was requested (and possibly completed).
    pub fn is_closing(&self) -> bool {
        matches!(self, Phase::Closing | Phase::Closed)
    }

    /// Error was raised (and possibly completed).
    pub fn is_erroring(&self) -> bool {
        matches!(self, Phase::Erroring(_) | Phase::Errored(_))
    }

    /// Terminal: no further transition is possible.
    pub fn is_stopped(&self) -> bool {
        matches!(self, Phase::Closed | Phase::Errored(_))
    }

    /// Reason carried by the error path, if any.
    pub fn reason(&self) -> Option<&Reason> {
        match self {
            Phase::Erroring(reason) | Phase::Errored(reason) => reason.as_ref(),
            _ => None,
        }
    }

    /// Outcome once terminal.
    pub fn stop(&self) -> Option<Stop> {
        match self {
            Phase::Closed => Some(Stop::new(None)),
            Phase::Errored(reason) => Some(Stop::new(reason.clone())),
            _ => None,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Open => f.write_str("open"),
            Phase::Closing => f.write_str("closing"),
            Phase::Closed => f.write_str("closed"),
            Phase::Erroring(reason) => write!(f, "erroring ({})", describe(reason.as_ref())),
            Phase::Errored(reason) => write!(f, "errored ({})", describe(reason.as_ref())),
        }
    }
}

/// Composite state of a duplex.
#[derive(Debug, Clone, Default)]
pub enum DuplexPhase {
    #[default]
    Open,
    Closing(Option<Reason>),
    Closed(Option<Reason>),
}

/// Events driving [`DuplexPhase`].
#[derive(Debug, Clone)]
pub(crate) enum DuplexTransition {
    Begin(Option<Reason>),
    /// The graceful path failed after it began; record why.
    Escalate(Reason),
    Finish,
}

impl DuplexPhase {
    pub(crate) fn next(&self, transition: DuplexTransition) -> Option<DuplexPhase> {
        match (self, transition) {
            (DuplexPhase::Open, DuplexTransition::Begin(reason)) => {
                Some(DuplexPhase::Closing(reason))
            }
            (DuplexPhase::Closing(None), DuplexTransition::Escalate(reason)) => {
                Some(DuplexPhase::Closing(Some(reason)))
            }
            (DuplexPhase::Closing(reason), DuplexTransition::Finish) => {
                Some(DuplexPhase::Closed(reason.clone()))
            }
            _ => None,
        }
    }

    /// `Some` once the composite started stopping.
    pub fn closing(&self) -> Option<Stop> {
        match self {
            DuplexPhase::Open => None,
            DuplexPhase::Closing(reason) | DuplexPhase::Closed(reason) => {
                Some(Stop::new(reason.clone()))
            }
        }
    }

    /// `Some` once the composite is terminal.
    pub fn closed(&self) -> Option<Stop> {
        match self {
            DuplexPhase::Closed(reason) => Some(Stop::new(reason.clone())),
            _ => None,
        }
    }
}

impl fmt::Display for DuplexPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DuplexPhase::Open => f.write_str("open"),
            DuplexPhase::Closing(None) => f.write_str("closing"),
            DuplexPhase::Closed(None) => f.write_str("closed"),
            DuplexPhase::Closing(Some(reason)) => write!(f, "closing ({reason})"),
            DuplexPhase::Closed(Some(reason)) => write!(f, "closed ({reason})"),
        }
    }
}

/// Apply `transition` through a watch channel; returns whether it applied.
///
/// `send_if_modified` runs the check and the write under one lock, so two
/// racing callers can never both win.
pub(crate) fn step<S, T>(
    state: &tokio::sync::watch::Sender<S>,
    transition: T,
    next: fn(&S, T) -> Option<S>,
) -> bool {
    state.send_if_modified(|current| match next(current, transition) {
        Some(successor) => {
            *current = successor;
            true
        }
        None => false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn close_and_error_are_mutually_terminal() {
        let closing = Phase::Open.next(Transition::BeginClose).unwrap();
        assert!(closing.next(Transition::BeginError(None)).is_none());

        let erroring = Phase::Open
            .next(Transition::BeginError(Some(Reason::msg("x"))))
            .unwrap();
        assert!(erroring.next(Transition::BeginClose).is_none());
        assert!(erroring.next(Transition::FinishClose).is_none());
    }

    #[test]
    fn failed_close_escalates_to_error() {
        let reason = Reason::msg("close hook failed");
        let phase = Phase::Closing
            .next(Transition::Escalate(reason.clone()))
            .unwrap()
            .next(Transition::FinishError)
            .unwrap();
        let stop = phase.stop().expect("errored phase should be terminal");
        assert!(Reason::ptr_eq(stop.reason().unwrap(), &reason));
        assert!(!phase.is_closing());
    }

    #[test]
    fn terminal_phases_reject_everything() {
        let terminals = [Phase::Closed, Phase::Errored(None)];
        for phase in terminals {
            assert!(phase.is_stopped());
            assert!(phase.next(Transition::BeginClose).is_none());
            assert!(phase.next(Transition::BeginError(None)).is_none());
            assert!(phase.next(Transition::FinishClose).is_none());
            assert!(phase.next(Transition::FinishError).is_none());
            assert!(phase
                .next(Transition::Escalate(Reason::msg("late")))
                .is_none());
        }
    }

    #[test]
    fn start_axis_is_one_shot() {
        let starting = StartState::Idle.begin().unwrap();
        assert!(starting.begin().is_none());
        assert_eq!(starting.finish(), Some(StartState::Started));
        assert!(StartState::Started.finish().is_none());
        assert!(StartState::Started.abandon().is_none());
    }

    #[test]
    fn abandoned_start_is_terminal() {
        let abandoned = StartState::Starting.abandon().unwrap();
        assert_eq!(abandoned, StartState::Abandoned);
        assert!(abandoned.begin().is_none());
        assert!(abandoned.finish().is_none());
        assert!(StartState::Idle.abandon().is_none());
    }

    #[test]
    fn duplex_phase_keeps_first_reason() {
        let first = Reason::msg("first");
        let phase = DuplexPhase::Open
            .next(DuplexTransition::Begin(Some(first.clone())))
            .unwrap();
        assert!(phase
            .next(DuplexTransition::Escalate(Reason::msg("second")))
            .is_none());
        let closed = phase.next(DuplexTransition::Finish).unwrap();
        let stop = closed.closed().unwrap();
        assert!(Reason::ptr_eq(stop.reason().unwrap(), &first));
    }

    #[test]
    fn phases_display_their_reason() {
        assert_eq!(Phase::Closed.to_string(), "closed");
        assert_eq!(
            Phase::Errored(Some(Reason::msg("boom"))).to_string(),
            "errored (boom)"
        );
        assert_eq!(Phase::Erroring(None).to_string(), "erroring (no reason)");
        assert_eq!(
            DuplexPhase::Closed(Some(Reason::msg("boom"))).to_string(),
            "closed (boom)"
        );
    }

    #[test]
    fn step_applies_once() {
        let (tx, _rx) = tokio::sync::watch::channel(Phase::Open);
        assert!(step(&tx, Transition::BeginClose, Phase::next));
        assert!(!step(&tx, Transition::BeginClose, Phase::next));
        assert!(step(&tx, Transition::FinishClose, Phase::next));
        assert!(tx.borrow().is_stopped());
    }
}
