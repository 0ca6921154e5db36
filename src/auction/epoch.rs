//! EpochPhaseTracker — authoritative phase state plus a smooth local
//! countdown.
//!
//! Only an authoritative ledger read can advance `epoch_id` or `phase`.
//! Between reads, a one-second tick decrements the countdown toward zero
//! and the state is marked interpolated. If the countdown hits zero before
//! the next read arrives, the display freezes there — the tracker never
//! guesses the next phase.

use tracing::{debug, info};

use super::types::{EpochPhase, EpochState};

/// An authoritative phase or epoch advance, reported exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseTransition {
    pub prev_epoch_id: Option<u64>,
    pub prev_phase: Option<EpochPhase>,
    pub epoch_id: u64,
    pub phase: EpochPhase,
}

#[derive(Debug, Default)]
pub struct EpochPhaseTracker {
    state: Option<EpochState>,
}

impl EpochPhaseTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply an authoritative read. Resets the local countdown to the
    /// server value and returns the transition when the phase or epoch
    /// actually moved.
    pub fn apply_authoritative(
        &mut self,
        epoch_id: u64,
        phase: EpochPhase,
        seconds_remaining: u64,
    ) -> Option<PhaseTransition> {
        let prev = self.state;
        self.state = Some(EpochState {
            epoch_id,
            phase,
            seconds_remaining,
            is_authoritative: true,
        });

        let moved = match prev {
            None => true,
            Some(p) => p.epoch_id != epoch_id || p.phase != phase,
        };
        if !moved {
            return None;
        }

        info!(
            "⏱️ Phase advance: epoch {} → {} phase {:?} → {:?} ({}s left)",
            prev.map(|p| p.epoch_id.to_string()).unwrap_or_else(|| "∅".into()),
            epoch_id,
            prev.map(|p| p.phase),
            phase,
            seconds_remaining,
        );
        Some(PhaseTransition {
            prev_epoch_id: prev.map(|p| p.epoch_id),
            prev_phase: prev.map(|p| p.phase),
            epoch_id,
            phase,
        })
    }

    /// One-second tick between authoritative reads. Decrements toward a
    /// floor of zero and marks the state interpolated. Never advances the
    /// phase locally.
    pub fn tick(&mut self) {
        if let Some(state) = &mut self.state {
            if state.seconds_remaining == 0 {
                debug!(
                    "⏱️ Countdown frozen at 0 (epoch {} phase {})",
                    state.epoch_id,
                    state.phase.as_str(),
                );
            } else {
                state.seconds_remaining -= 1;
            }
            state.is_authoritative = false;
        }
    }

    pub fn state(&self) -> Option<EpochState> {
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_read_is_a_transition() {
        let mut t = EpochPhaseTracker::new();
        let tr = t.apply_authoritative(5, EpochPhase::Commit, 120).unwrap();
        assert_eq!(tr.epoch_id, 5);
        assert_eq!(tr.prev_phase, None);
        assert!(t.state().unwrap().is_authoritative);
    }

    #[test]
    fn test_tick_decrements_and_marks_interpolated() {
        let mut t = EpochPhaseTracker::new();
        t.apply_authoritative(5, EpochPhase::Commit, 3);
        t.tick();
        let s = t.state().unwrap();
        assert_eq!(s.seconds_remaining, 2);
        assert!(!s.is_authoritative);
        assert_eq!(s.phase, EpochPhase::Commit);
    }

    #[test]
    fn test_countdown_freezes_at_zero_never_negative() {
        let mut t = EpochPhaseTracker::new();
        t.apply_authoritative(5, EpochPhase::Reveal, 2);
        for _ in 0..10 {
            t.tick();
        }
        let s = t.state().unwrap();
        assert_eq!(s.seconds_remaining, 0);
        // Phase never inferred locally — still Reveal after the freeze.
        assert_eq!(s.phase, EpochPhase::Reveal);
        assert_eq!(s.epoch_id, 5);
    }

    #[test]
    fn test_repeated_read_same_phase_is_not_a_transition() {
        let mut t = EpochPhaseTracker::new();
        t.apply_authoritative(5, EpochPhase::Settle, 60);
        assert!(t.apply_authoritative(5, EpochPhase::Settle, 55).is_none());
        // Countdown still resets to the server value.
        assert_eq!(t.state().unwrap().seconds_remaining, 55);
        assert!(t.state().unwrap().is_authoritative);
    }

    #[test]
    fn test_only_authoritative_reads_advance_phase() {
        let mut t = EpochPhaseTracker::new();
        t.apply_authoritative(5, EpochPhase::Commit, 1);
        t.tick();
        t.tick();
        assert_eq!(t.state().unwrap().phase, EpochPhase::Commit);

        let tr = t.apply_authoritative(5, EpochPhase::Reveal, 90).unwrap();
        assert_eq!(tr.prev_phase, Some(EpochPhase::Commit));
        assert_eq!(tr.phase, EpochPhase::Reveal);
    }

    #[test]
    fn test_epoch_rollover_is_a_transition() {
        let mut t = EpochPhaseTracker::new();
        t.apply_authoritative(5, EpochPhase::Closed, 0);
        let tr = t.apply_authoritative(6, EpochPhase::Commit, 300).unwrap();
        assert_eq!(tr.prev_epoch_id, Some(5));
        assert_eq!(tr.epoch_id, 6);
    }
}
