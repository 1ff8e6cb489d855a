//! Invite Manager: pending invite lifecycle
//!
//! At most one invite is pending per invitee. Expiry is checked lazily on
//! every access and by the periodic sweep.

use chrono::{DateTime, Duration, Utc};
use lobby_types::{LobbyError, LobbyResult, PendingInvite, UserId};
use std::collections::HashMap;

/// Owns every pending invite, keyed by invitee
#[derive(Debug, Clone)]
pub struct InviteManager {
    pending: HashMap<UserId, PendingInvite>,
    ttl: Duration,
}

impl InviteManager {
    pub fn new(ttl: Duration) -> Self {
        Self {
            pending: HashMap::new(),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// The live invite for `invitee`, dropping it first if expired
    pub fn pending_for(&mut self, invitee: UserId, now: DateTime<Utc>) -> Option<&PendingInvite> {
        if self
            .pending
            .get(&invitee)
            .is_some_and(|i| i.is_expired(now, self.ttl))
        {
            self.pending.remove(&invitee);
        }
        self.pending.get(&invitee)
    }

    /// Record an invite. Fails if one is already pending for `invitee`.
    pub fn issue(&mut self, inviter: UserId, invitee: UserId, now: DateTime<Utc>) -> LobbyResult<()> {
        if self.pending_for(invitee, now).is_some() {
            return Err(LobbyError::InviteExists(invitee));
        }
        self.pending
            .insert(invitee, PendingInvite::new(inviter, invitee, now));
        Ok(())
    }

    /// Consume the invite for `invitee`, returning the inviter
    pub fn resolve(&mut self, invitee: UserId, now: DateTime<Utc>) -> LobbyResult<UserId> {
        let invite = self
            .pending
            .remove(&invitee)
            .ok_or(LobbyError::NoPendingInvite(invitee))?;
        if invite.is_expired(now, self.ttl) {
            return Err(LobbyError::InviteExpired(invitee));
        }
        Ok(invite.inviter)
    }

    /// Drop the invite for `invitee`, returning the inviter
    pub fn decline(&mut self, invitee: UserId) -> LobbyResult<UserId> {
        self.pending
            .remove(&invitee)
            .map(|i| i.inviter)
            .ok_or(LobbyError::NoPendingInvite(invitee))
    }

    /// Remove every expired invite, returning how many were dropped
    pub fn sweep(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.pending.len();
        let ttl = self.ttl;
        self.pending.retain(|_, invite| !invite.is_expired(now, ttl));
        before - self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> InviteManager {
        InviteManager::new(Duration::minutes(30))
    }

    #[test]
    fn test_issue_and_resolve() {
        let t0 = Utc::now();
        let mut invites = manager();
        invites.issue(UserId(1), UserId(2), t0).unwrap();

        assert_eq!(invites.resolve(UserId(2), t0).unwrap(), UserId(1));
        assert!(invites.is_empty());
    }

    #[test]
    fn test_second_invite_is_rejected() {
        let t0 = Utc::now();
        let mut invites = manager();
        invites.issue(UserId(1), UserId(2), t0).unwrap();

        let err = invites.issue(UserId(3), UserId(2), t0).unwrap_err();
        assert!(matches!(err, LobbyError::InviteExists(UserId(2))));
        assert_eq!(invites.pending_for(UserId(2), t0).unwrap().inviter, UserId(1));
    }

    #[test]
    fn test_expired_invite_can_be_replaced() {
        let t0 = Utc::now();
        let mut invites = manager();
        invites.issue(UserId(1), UserId(2), t0).unwrap();

        let later = t0 + Duration::minutes(31);
        invites.issue(UserId(3), UserId(2), later).unwrap();
        assert_eq!(invites.resolve(UserId(2), later).unwrap(), UserId(3));
    }

    #[test]
    fn test_resolve_after_ttl_fails_and_clears() {
        let t0 = Utc::now();
        let mut invites = manager();
        invites.issue(UserId(1), UserId(2), t0).unwrap();

        let err = invites
            .resolve(UserId(2), t0 + Duration::minutes(30) + Duration::seconds(1))
            .unwrap_err();
        assert!(matches!(err, LobbyError::InviteExpired(UserId(2))));

        let err = invites.resolve(UserId(2), t0).unwrap_err();
        assert!(matches!(err, LobbyError::NoPendingInvite(UserId(2))));
    }

    #[test]
    fn test_decline() {
        let t0 = Utc::now();
        let mut invites = manager();
        assert!(matches!(
            invites.decline(UserId(2)),
            Err(LobbyError::NoPendingInvite(UserId(2)))
        ));

        invites.issue(UserId(1), UserId(2), t0).unwrap();
        assert_eq!(invites.decline(UserId(2)).unwrap(), UserId(1));
        assert!(invites.is_empty());
    }

    #[test]
    fn test_sweep_drops_only_expired() {
        let t0 = Utc::now();
        let mut invites = manager();
        invites.issue(UserId(1), UserId(2), t0).unwrap();
        invites
            .issue(UserId(1), UserId(3), t0 + Duration::minutes(20))
            .unwrap();

        let dropped = invites.sweep(t0 + Duration::minutes(31));

        assert_eq!(dropped, 1);
        assert_eq!(invites.len(), 1);
        assert!(invites
            .pending_for(UserId(3), t0 + Duration::minutes(31))
            .is_some());
    }
}
