//! Containment state machine
//!
//! Pure transition logic, no timers. Legal edges:
//! - `Stable → Retrying` on the first fault
//! - `Retrying → Stable` when the retry timer of the current epoch fires
//! - `Retrying → Terminal` on a fault during the retry window
//! - `Stable → Terminal` on a fault after the recovery was used
//!
//! `Terminal` has no outgoing edges.

use std::fmt::{self, Display, Formatter};

/// State of a containment boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ContainmentState {
    /// Rendering content normally
    #[default]
    Stable,
    /// Fault caught, one deferred re-render scheduled
    Retrying,
    /// Manual reload required
    Terminal,
}

impl Display for ContainmentState {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Stable => "stable",
            Self::Retrying => "retrying",
            Self::Terminal => "terminal",
        };
        f.write_str(s)
    }
}

/// Illegal edge in the containment machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("illegal containment transition {from} -> {to}")]
pub struct TransitionError {
    /// Source state
    pub from: ContainmentState,
    /// Rejected target
    pub to: ContainmentState,
}

/// States reachable from `from` in one step
#[must_use]
pub fn allowed_transitions(from: ContainmentState) -> Vec<ContainmentState> {
    use ContainmentState::{Retrying, Stable, Terminal};
    match from {
        Stable => vec![Retrying, Terminal],
        Retrying => vec![Stable, Terminal],
        Terminal => vec![],
    }
}

/// Validates a state transition
///
/// # Errors
/// [`TransitionError`] if `to` is not reachable from `from`
pub fn validate_transition(
    from: ContainmentState,
    to: ContainmentState,
) -> Result<(), TransitionError> {
    if allowed_transitions(from).contains(&to) {
        Ok(())
    } else {
        Err(TransitionError { from, to })
    }
}

/// Outcome of feeding a fault to the machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultOutcome {
    /// Entered `Retrying`; arm a timer for this epoch
    ScheduleRetry {
        /// Epoch the timer must present when it fires
        epoch: u64,
    },
    /// Entered `Terminal`
    Escalated,
    /// Already terminal, nothing changes
    Absorbed,
}

/// Containment transitions for one boundary lifetime
#[derive(Debug, Clone, Default)]
pub struct BoundaryMachine {
    state: ContainmentState,
    recovery_used: bool,
    epoch: u64,
    faults: u32,
}

impl BoundaryMachine {
    /// Fresh machine in `Stable`
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state
    #[inline]
    #[must_use]
    pub fn state(&self) -> ContainmentState {
        self.state
    }

    /// Whether the single auto-recovery has been spent
    #[inline]
    #[must_use]
    pub fn recovery_used(&self) -> bool {
        self.recovery_used
    }

    /// Epoch of the latest scheduled retry
    #[inline]
    #[must_use]
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Faults seen so far, including absorbed ones
    #[inline]
    #[must_use]
    pub fn fault_count(&self) -> u32 {
        self.faults
    }

    /// Feed a fault
    pub fn on_fault(&mut self) -> FaultOutcome {
        self.faults = self.faults.saturating_add(1);
        match self.state {
            ContainmentState::Stable if !self.recovery_used => {
                self.enter(ContainmentState::Retrying);
                self.epoch += 1;
                FaultOutcome::ScheduleRetry { epoch: self.epoch }
            }
            ContainmentState::Stable | ContainmentState::Retrying => {
                self.enter(ContainmentState::Terminal);
                FaultOutcome::Escalated
            }
            ContainmentState::Terminal => FaultOutcome::Absorbed,
        }
    }

    /// Feed a timer expiry; returns whether the machine moved
    ///
    /// Timers from an older epoch, or arriving outside `Retrying`, are
    /// ignored.
    pub fn on_timer(&mut self, epoch: u64) -> bool {
        if self.state != ContainmentState::Retrying || epoch != self.epoch {
            return false;
        }
        self.enter(ContainmentState::Stable);
        self.recovery_used = true;
        true
    }

    fn enter(&mut self, to: ContainmentState) {
        debug_assert!(
            validate_transition(self.state, to).is_ok(),
            "illegal transition {} -> {}",
            self.state,
            to
        );
        self.state = to;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn terminal_has_no_exits() {
        assert!(allowed_transitions(ContainmentState::Terminal).is_empty());
        for to in [
            ContainmentState::Stable,
            ContainmentState::Retrying,
            ContainmentState::Terminal,
        ] {
            assert!(validate_transition(ContainmentState::Terminal, to).is_err());
        }
    }

    #[test]
    fn stable_cannot_loop_to_itself() {
        let err = validate_transition(ContainmentState::Stable, ContainmentState::Stable)
            .unwrap_err();
        assert_eq!(err.from, ContainmentState::Stable);
    }

    #[test]
    fn single_recovery_then_terminal() {
        let mut m = BoundaryMachine::new();
        assert_eq!(m.on_fault(), FaultOutcome::ScheduleRetry { epoch: 1 });
        assert!(m.on_timer(1));
        assert_eq!(m.state(), ContainmentState::Stable);
        assert!(m.recovery_used());

        assert_eq!(m.on_fault(), FaultOutcome::Escalated);
        assert_eq!(m.state(), ContainmentState::Terminal);
        assert_eq!(m.on_fault(), FaultOutcome::Absorbed);
        assert_eq!(m.fault_count(), 3);
    }

    #[test]
    fn fault_during_retry_escalates() {
        let mut m = BoundaryMachine::new();
        m.on_fault();
        assert_eq!(m.on_fault(), FaultOutcome::Escalated);
        assert!(!m.on_timer(1));
        assert_eq!(m.state(), ContainmentState::Terminal);
    }

    #[test]
    fn stale_epoch_is_ignored() {
        let mut m = BoundaryMachine::new();
        m.on_fault();
        assert!(!m.on_timer(0));
        assert_eq!(m.state(), ContainmentState::Retrying);
        assert!(m.on_timer(m.epoch()));
    }
}
