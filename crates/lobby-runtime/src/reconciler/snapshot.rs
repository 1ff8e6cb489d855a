//! Per-channel debounce state
//!
//! Idle -> CountingDown -> Reconciling -> Idle. A countdown is a deadline
//! plus a cancellation token; every observed change cancels the current
//! token and, at quorum, arms a fresh one. A pass starts only from a live
//! token whose deadline has passed.

use lobby_types::UserId;
use serde::Serialize;
use std::collections::BTreeSet;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Where a monitored channel is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueuePhase {
    Idle,
    CountingDown,
    Reconciling,
}

/// What an observation did to the snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation {
    /// A pass is in flight; the observation was dropped
    Ignored,
    /// Same member set as last seen; the countdown is untouched
    Unchanged,
    /// Below quorum; any countdown was cancelled
    BelowQuorum { occupants: usize },
    /// A countdown was armed (or re-armed)
    Armed { occupants: usize, restarted: bool },
}

#[derive(Debug)]
struct Countdown {
    deadline: Instant,
    token: CancellationToken,
}

/// Reconciler-private state for one queue channel
#[derive(Debug, Default)]
pub struct QueueSnapshot {
    last_seen: BTreeSet<UserId>,
    countdown: Option<Countdown>,
    reconciling: bool,
}

impl QueueSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> QueuePhase {
        if self.reconciling {
            QueuePhase::Reconciling
        } else if self.countdown.is_some() {
            QueuePhase::CountingDown
        } else {
            QueuePhase::Idle
        }
    }

    pub fn last_seen(&self) -> &BTreeSet<UserId> {
        &self.last_seen
    }

    pub fn is_reconciling(&self) -> bool {
        self.reconciling
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.countdown.as_ref().map(|c| c.deadline)
    }

    /// Token of the live countdown, if any
    pub fn countdown_token(&self) -> Option<CancellationToken> {
        self.countdown.as_ref().map(|c| c.token.clone())
    }

    fn cancel_countdown(&mut self) -> bool {
        match self.countdown.take() {
            Some(countdown) => {
                countdown.token.cancel();
                true
            }
            None => false,
        }
    }

    /// Record the live member set and update the countdown
    pub fn observe(
        &mut self,
        occupants: BTreeSet<UserId>,
        quorum: usize,
        debounce: Duration,
        now: Instant,
    ) -> Observation {
        if self.reconciling {
            return Observation::Ignored;
        }
        if occupants == self.last_seen {
            return Observation::Unchanged;
        }

        let count = occupants.len();
        self.last_seen = occupants;
        let restarted = self.cancel_countdown();

        if count < quorum {
            return Observation::BelowQuorum { occupants: count };
        }

        self.countdown = Some(Countdown {
            deadline: now + debounce,
            token: CancellationToken::new(),
        });
        Observation::Armed {
            occupants: count,
            restarted,
        }
    }

    pub fn is_due(&self, now: Instant) -> bool {
        !self.reconciling && self.deadline().is_some_and(|d| d <= now)
    }

    /// Consume a due countdown and enter Reconciling.
    ///
    /// Returns `None` if there is no live countdown.
    pub fn begin_pass(&mut self) -> Option<CancellationToken> {
        if self.reconciling {
            return None;
        }
        let countdown = self.countdown.take()?;
        if countdown.token.is_cancelled() {
            return None;
        }
        self.reconciling = true;
        Some(countdown.token)
    }

    /// Leave Reconciling. `settled` is the member set the pass acted on;
    /// `None` for a failed pass, which forgets the last seen set so the
    /// next observation re-arms.
    pub fn finish_pass(&mut self, settled: Option<BTreeSet<UserId>>) {
        self.reconciling = false;
        self.last_seen = settled.unwrap_or_default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const QUORUM: usize = 6;
    const DEBOUNCE: Duration = Duration::from_secs(5);

    fn members(n: u64) -> BTreeSet<UserId> {
        (1..=n).map(UserId).collect()
    }

    #[test]
    fn test_below_quorum_stays_idle() {
        let mut snap = QueueSnapshot::new();
        let obs = snap.observe(members(5), QUORUM, DEBOUNCE, Instant::now());
        assert_eq!(obs, Observation::BelowQuorum { occupants: 5 });
        assert_eq!(snap.phase(), QueuePhase::Idle);
    }

    #[test]
    fn test_quorum_arms_countdown() {
        let t0 = Instant::now();
        let mut snap = QueueSnapshot::new();
        let obs = snap.observe(members(6), QUORUM, DEBOUNCE, t0);

        assert_eq!(
            obs,
            Observation::Armed {
                occupants: 6,
                restarted: false
            }
        );
        assert_eq!(snap.phase(), QueuePhase::CountingDown);
        assert_eq!(snap.deadline(), Some(t0 + DEBOUNCE));
        assert!(!snap.is_due(t0 + Duration::from_millis(4999)));
        assert!(snap.is_due(t0 + DEBOUNCE));
    }

    #[test]
    fn test_change_restarts_and_cancels_previous_token() {
        let t0 = Instant::now();
        let mut snap = QueueSnapshot::new();
        snap.observe(members(6), QUORUM, DEBOUNCE, t0);
        let first = snap.countdown_token().unwrap();

        let t2 = t0 + Duration::from_secs(2);
        let obs = snap.observe(members(8), QUORUM, DEBOUNCE, t2);

        assert_eq!(
            obs,
            Observation::Armed {
                occupants: 8,
                restarted: true
            }
        );
        assert!(first.is_cancelled());
        assert!(!snap.countdown_token().unwrap().is_cancelled());
        assert_eq!(snap.deadline(), Some(t2 + DEBOUNCE));
    }

    #[test]
    fn test_same_member_set_does_not_restart() {
        let t0 = Instant::now();
        let mut snap = QueueSnapshot::new();
        snap.observe(members(7), QUORUM, DEBOUNCE, t0);

        let obs = snap.observe(members(7), QUORUM, DEBOUNCE, t0 + Duration::from_secs(3));

        assert_eq!(obs, Observation::Unchanged);
        assert_eq!(snap.deadline(), Some(t0 + DEBOUNCE));
    }

    #[test]
    fn test_drop_below_quorum_cancels() {
        let t0 = Instant::now();
        let mut snap = QueueSnapshot::new();
        snap.observe(members(6), QUORUM, DEBOUNCE, t0);
        let token = snap.countdown_token().unwrap();

        snap.observe(members(5), QUORUM, DEBOUNCE, t0 + Duration::from_secs(1));

        assert!(token.is_cancelled());
        assert_eq!(snap.phase(), QueuePhase::Idle);
        assert!(snap.begin_pass().is_none());
    }

    #[test]
    fn test_reconciling_ignores_observations() {
        let t0 = Instant::now();
        let mut snap = QueueSnapshot::new();
        snap.observe(members(8), QUORUM, DEBOUNCE, t0);
        assert!(snap.begin_pass().is_some());
        assert_eq!(snap.phase(), QueuePhase::Reconciling);

        let obs = snap.observe(members(9), QUORUM, DEBOUNCE, t0 + DEBOUNCE);
        assert_eq!(obs, Observation::Ignored);
        assert!(snap.begin_pass().is_none());

        snap.finish_pass(Some(members(2)));
        assert_eq!(snap.phase(), QueuePhase::Idle);
        assert_eq!(snap.last_seen(), &members(2));
    }

    #[test]
    fn test_failed_pass_rearms_on_same_occupants() {
        let t0 = Instant::now();
        let mut snap = QueueSnapshot::new();
        snap.observe(members(8), QUORUM, DEBOUNCE, t0);
        assert!(snap.begin_pass().is_some());

        snap.finish_pass(None);
        assert!(snap.last_seen().is_empty());

        let obs = snap.observe(members(8), QUORUM, DEBOUNCE, t0 + DEBOUNCE);
        assert_eq!(
            obs,
            Observation::Armed {
                occupants: 8,
                restarted: false
            }
        );
        assert_eq!(snap.phase(), QueuePhase::CountingDown);
    }
}
