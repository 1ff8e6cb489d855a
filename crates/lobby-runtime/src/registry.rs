//! Party Registry: ownership of parties and the member index
//!
//! Parties are stored once, by [`PartyId`]. Every member identity indexes to
//! that id, so leadership changes never disturb lookups and all mutation goes
//! through one place.

use chrono::{DateTime, Duration, Utc};
use lobby_types::{LobbyError, LobbyResult, Party, PartyId, UserId};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Outcome of a member leaving
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeaveOutcome {
    /// The leader left; the whole party is gone
    Disbanded(Party),
    /// A follower left; the party remains
    Left(Party),
}

/// Owns every party and the member -> party index
#[derive(Debug, Default, Clone)]
pub struct PartyRegistry {
    parties: HashMap<PartyId, Party>,
    by_member: HashMap<UserId, PartyId>,
}

impl PartyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a registry from persisted parties.
    ///
    /// Malformed records are skipped; a user claimed by two records stays
    /// with the first.
    pub fn from_parties(parties: impl IntoIterator<Item = Party>) -> Self {
        let mut registry = Self::new();
        for mut party in parties {
            let mut seen = std::collections::HashSet::new();
            party.members.retain(|m| seen.insert(*m));
            party
                .members
                .retain(|m| !registry.by_member.contains_key(m));

            if !party.is_member(party.leader_id) {
                warn!(
                    party = %party.id,
                    leader = %party.leader_id,
                    "Skipping persisted party whose leader is not a member"
                );
                continue;
            }
            if !party.queued && !party.temp_channels.is_empty() {
                party.temp_channels.clear();
            }
            if registry.parties.contains_key(&party.id) {
                party.id = PartyId::generate();
            }
            registry.insert(party);
        }
        debug!(parties = registry.len(), "Party registry loaded");
        registry
    }

    fn insert(&mut self, party: Party) {
        for member in &party.members {
            self.by_member.insert(*member, party.id.clone());
        }
        self.parties.insert(party.id.clone(), party);
    }

    fn remove(&mut self, id: &PartyId) -> Option<Party> {
        let party = self.parties.remove(id)?;
        for member in &party.members {
            self.by_member.remove(member);
        }
        Some(party)
    }

    pub fn len(&self) -> usize {
        self.parties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parties.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Party> {
        self.parties.values()
    }

    /// The party `user` belongs to
    pub fn get(&self, user: UserId) -> Option<&Party> {
        self.by_member
            .get(&user)
            .and_then(|id| self.parties.get(id))
    }

    pub fn get_by_id(&self, id: &PartyId) -> Option<&Party> {
        self.parties.get(id)
    }

    pub fn get_by_id_mut(&mut self, id: &PartyId) -> Option<&mut Party> {
        self.parties.get_mut(id)
    }

    pub fn party_id_of(&self, user: UserId) -> Option<&PartyId> {
        self.by_member.get(&user)
    }

    pub fn is_in_party(&self, user: UserId) -> bool {
        self.by_member.contains_key(&user)
    }

    pub fn is_leader(&self, user: UserId) -> bool {
        self.get(user).is_some_and(|p| p.is_leader(user))
    }

    /// The party led by `leader`, or `NotLeader`
    pub fn led_by(&self, leader: UserId) -> LobbyResult<&Party> {
        self.get(leader)
            .filter(|p| p.is_leader(leader))
            .ok_or(LobbyError::NotLeader(leader))
    }

    fn led_by_mut(&mut self, leader: UserId) -> LobbyResult<&mut Party> {
        let id = self
            .by_member
            .get(&leader)
            .ok_or(LobbyError::NotLeader(leader))?;
        self.parties
            .get_mut(id)
            .filter(|p| p.is_leader(leader))
            .ok_or(LobbyError::NotLeader(leader))
    }

    /// Create a singleton party led by `leader`
    pub fn create(&mut self, leader: UserId, now: DateTime<Utc>) -> LobbyResult<&Party> {
        if self.is_in_party(leader) {
            return Err(LobbyError::AlreadyInParty(leader));
        }
        let party = Party::new(PartyId::generate(), leader, now);
        let id = party.id.clone();
        self.insert(party);
        debug!(party = %id, leader = %leader, "Party created");
        Ok(&self.parties[&id])
    }

    /// Add `user` to the party currently led by `leader`.
    ///
    /// Resolution is by leader identity: if `leader` no longer leads a party
    /// the request fails with `PartyGone`.
    pub fn join(&mut self, leader: UserId, user: UserId, now: DateTime<Utc>) -> LobbyResult<&Party> {
        if self.is_in_party(user) {
            return Err(LobbyError::AlreadyInParty(user));
        }
        let id = match self.led_by(leader) {
            Ok(party) => party.id.clone(),
            Err(_) => return Err(LobbyError::PartyGone(leader)),
        };
        let Some(party) = self.parties.get_mut(&id) else {
            return Err(LobbyError::PartyGone(leader));
        };
        party.add_member(user);
        party.touch(now);
        self.by_member.insert(user, id.clone());
        Ok(&self.parties[&id])
    }

    /// Leave the current party. A leader leaving disbands it.
    pub fn leave(&mut self, user: UserId, now: DateTime<Utc>) -> LobbyResult<LeaveOutcome> {
        let id = self
            .by_member
            .get(&user)
            .cloned()
            .ok_or(LobbyError::NotInParty(user))?;

        let is_leader = self.parties.get(&id).is_some_and(|p| p.is_leader(user));
        if is_leader {
            let party = self.remove(&id).ok_or(LobbyError::NotInParty(user))?;
            return Ok(LeaveOutcome::Disbanded(party));
        }

        let party = self
            .parties
            .get_mut(&id)
            .ok_or(LobbyError::NotInParty(user))?;
        party.remove_member(user);
        party.touch(now);
        let party = party.clone();
        self.by_member.remove(&user);
        Ok(LeaveOutcome::Left(party))
    }

    /// Remove `target` from the party led by `leader`
    pub fn kick(&mut self, leader: UserId, target: UserId, now: DateTime<Utc>) -> LobbyResult<&Party> {
        let party = self.led_by_mut(leader)?;
        if !party.is_member(target) {
            return Err(LobbyError::NotInParty(target));
        }
        if target == leader {
            return Err(LobbyError::SelfKick(leader));
        }
        party.remove_member(target);
        party.touch(now);
        let id = party.id.clone();
        self.by_member.remove(&target);
        Ok(&self.parties[&id])
    }

    /// Hand leadership of `leader`'s party to `target`
    pub fn promote(&mut self, leader: UserId, target: UserId, now: DateTime<Utc>) -> LobbyResult<&Party> {
        let party = self.led_by_mut(leader)?;
        if !party.is_member(target) {
            return Err(LobbyError::NotInParty(target));
        }
        party.leader_id = target;
        party.touch(now);
        Ok(&*party)
    }

    /// Remove the party led by `leader` and every member mapping
    pub fn disband(&mut self, leader: UserId) -> LobbyResult<Party> {
        let id = self.led_by(leader)?.id.clone();
        self.remove(&id).ok_or(LobbyError::NotLeader(leader))
    }

    /// Refresh activity on `user`'s party
    pub fn touch(&mut self, user: UserId, now: DateTime<Utc>) {
        if let Some(id) = self.by_member.get(&user) {
            if let Some(party) = self.parties.get_mut(id) {
                party.touch(now);
            }
        }
    }

    /// Remove every party idle for longer than `threshold`
    pub fn sweep_idle(&mut self, now: DateTime<Utc>, threshold: Duration) -> Vec<Party> {
        let idle: Vec<PartyId> = self
            .parties
            .values()
            .filter(|p| p.is_idle(now, threshold))
            .map(|p| p.id.clone())
            .collect();

        idle.iter().filter_map(|id| self.remove(id)).collect()
    }

    /// Every party, ordered by leader for stable output
    pub fn snapshot(&self) -> Vec<Party> {
        let mut parties: Vec<Party> = self.parties.values().cloned().collect();
        parties.sort_by_key(|p| p.leader_id);
        parties
    }

    /// Verify that the index and the parties agree
    pub fn is_consistent(&self) -> bool {
        let indexed: usize = self.parties.values().map(Party::len).sum();
        indexed == self.by_member.len()
            && self.parties.values().all(|party| {
                party.is_well_formed()
                    && party
                        .members
                        .iter()
                        .all(|m| self.by_member.get(m) == Some(&party.id))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    fn registry_with(leader: u64, members: &[u64]) -> PartyRegistry {
        let mut registry = PartyRegistry::new();
        registry.create(UserId(leader), now()).unwrap();
        for m in members {
            registry.join(UserId(leader), UserId(*m), now()).unwrap();
        }
        registry
    }

    #[test]
    fn test_create_party() {
        let mut registry = PartyRegistry::new();
        let party = registry.create(UserId(1), now()).unwrap();
        assert_eq!(party.members, vec![UserId(1)]);
        assert!(registry.is_leader(UserId(1)));

        let err = registry.create(UserId(1), now()).unwrap_err();
        assert!(matches!(err, LobbyError::AlreadyInParty(UserId(1))));
    }

    #[test]
    fn test_join_indexes_every_member() {
        let registry = registry_with(1, &[2, 3]);
        let id = registry.party_id_of(UserId(1)).unwrap();
        assert_eq!(registry.party_id_of(UserId(2)), Some(id));
        assert_eq!(registry.party_id_of(UserId(3)), Some(id));
        assert_eq!(
            registry.get(UserId(3)).unwrap().members,
            vec![UserId(1), UserId(2), UserId(3)]
        );
        assert!(registry.is_consistent());
    }

    #[test]
    fn test_join_unknown_leader_is_party_gone() {
        let mut registry = registry_with(1, &[2]);
        let err = registry.join(UserId(2), UserId(5), now()).unwrap_err();
        assert!(matches!(err, LobbyError::PartyGone(UserId(2))));

        let err = registry.join(UserId(9), UserId(5), now()).unwrap_err();
        assert!(matches!(err, LobbyError::PartyGone(UserId(9))));
    }

    #[test]
    fn test_leader_leave_disbands() {
        let mut registry = registry_with(1, &[2, 3]);
        let outcome = registry.leave(UserId(1), now()).unwrap();
        assert!(matches!(outcome, LeaveOutcome::Disbanded(_)));
        assert!(registry.is_empty());
        for u in [1, 2, 3] {
            assert!(!registry.is_in_party(UserId(u)));
        }
    }

    #[test]
    fn test_follower_leave_removes_only_self() {
        let mut registry = registry_with(1, &[2, 3]);
        let outcome = registry.leave(UserId(2), now()).unwrap();
        let LeaveOutcome::Left(party) = outcome else {
            panic!("follower leave must not disband");
        };
        assert_eq!(party.members, vec![UserId(1), UserId(3)]);
        assert!(!registry.is_in_party(UserId(2)));
        assert!(registry.is_in_party(UserId(3)));
        assert!(registry.is_consistent());
    }

    #[test]
    fn test_leave_without_party() {
        let mut registry = PartyRegistry::new();
        let err = registry.leave(UserId(4), now()).unwrap_err();
        assert!(matches!(err, LobbyError::NotInParty(UserId(4))));
    }

    #[test]
    fn test_kick_preconditions() {
        let mut registry = registry_with(1, &[2]);

        let err = registry.kick(UserId(2), UserId(1), now()).unwrap_err();
        assert!(matches!(err, LobbyError::NotLeader(UserId(2))));

        let err = registry.kick(UserId(1), UserId(7), now()).unwrap_err();
        assert!(matches!(err, LobbyError::NotInParty(UserId(7))));

        let err = registry.kick(UserId(1), UserId(1), now()).unwrap_err();
        assert!(matches!(err, LobbyError::SelfKick(UserId(1))));

        let party = registry.kick(UserId(1), UserId(2), now()).unwrap();
        assert_eq!(party.members, vec![UserId(1)]);
        assert!(!registry.is_in_party(UserId(2)));
    }

    #[test]
    fn test_promote_preserves_identity() {
        let mut registry = registry_with(1, &[2, 3]);
        let id = registry.party_id_of(UserId(1)).cloned().unwrap();

        let party = registry.promote(UserId(1), UserId(3), now()).unwrap();
        assert_eq!(party.leader_id, UserId(3));
        assert_eq!(party.id, id);

        assert!(registry.is_leader(UserId(3)));
        assert!(!registry.is_leader(UserId(1)));
        assert_eq!(registry.party_id_of(UserId(1)), Some(&id));

        let err = registry.promote(UserId(1), UserId(2), now()).unwrap_err();
        assert!(matches!(err, LobbyError::NotLeader(UserId(1))));
        let err = registry.promote(UserId(3), UserId(8), now()).unwrap_err();
        assert!(matches!(err, LobbyError::NotInParty(UserId(8))));
    }

    #[test]
    fn test_disband_requires_leader() {
        let mut registry = registry_with(1, &[2]);
        assert!(matches!(
            registry.disband(UserId(2)),
            Err(LobbyError::NotLeader(UserId(2)))
        ));
        let party = registry.disband(UserId(1)).unwrap();
        assert_eq!(party.members.len(), 2);
        assert!(registry.is_empty());
        assert!(!registry.is_in_party(UserId(2)));
    }

    #[test]
    fn test_sweep_idle() {
        let t0 = now();
        let mut registry = PartyRegistry::new();
        registry.create(UserId(1), t0).unwrap();
        registry.join(UserId(1), UserId(2), t0).unwrap();
        registry
            .create(UserId(5), t0 + Duration::seconds(300))
            .unwrap();

        let removed = registry.sweep_idle(t0 + Duration::seconds(601), Duration::seconds(600));

        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].leader_id, UserId(1));
        assert!(!registry.is_in_party(UserId(2)));
        assert!(registry.is_in_party(UserId(5)));
    }

    #[test]
    fn test_from_parties_repairs_records() {
        let t0 = now();
        let mut good = Party::new(PartyId::new("a"), UserId(1), t0);
        good.members = vec![UserId(1), UserId(2), UserId(2)];
        let mut orphan = Party::new(PartyId::new("b"), UserId(3), t0);
        orphan.members = vec![UserId(4)];
        let mut overlap = Party::new(PartyId::new("c"), UserId(6), t0);
        overlap.members = vec![UserId(6), UserId(2)];

        let registry = PartyRegistry::from_parties(vec![good, orphan, overlap]);

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get(UserId(1)).unwrap().members, vec![UserId(1), UserId(2)]);
        assert_eq!(registry.get(UserId(6)).unwrap().members, vec![UserId(6)]);
        assert!(!registry.is_in_party(UserId(4)));
        assert!(registry.is_consistent());
    }

    #[derive(Debug, Clone)]
    enum Op {
        Create(u64),
        Join(u64, u64),
        Leave(u64),
        Kick(u64, u64),
        Promote(u64, u64),
        Disband(u64),
    }

    fn op() -> impl Strategy<Value = Op> {
        let user = 0u64..8;
        prop_oneof![
            user.clone().prop_map(Op::Create),
            (user.clone(), user.clone()).prop_map(|(a, b)| Op::Join(a, b)),
            user.clone().prop_map(Op::Leave),
            (user.clone(), user.clone()).prop_map(|(a, b)| Op::Kick(a, b)),
            (user.clone(), user.clone()).prop_map(|(a, b)| Op::Promote(a, b)),
            user.prop_map(Op::Disband),
        ]
    }

    proptest! {
        #[test]
        fn prop_index_and_leadership_stay_consistent(ops in proptest::collection::vec(op(), 1..64)) {
            let mut registry = PartyRegistry::new();
            let t = now();
            for op in ops {
                let _ = match op {
                    Op::Create(u) => registry.create(UserId(u), t).map(|_| ()),
                    Op::Join(l, u) => registry.join(UserId(l), UserId(u), t).map(|_| ()),
                    Op::Leave(u) => registry.leave(UserId(u), t).map(|_| ()),
                    Op::Kick(l, u) => registry.kick(UserId(l), UserId(u), t).map(|_| ()),
                    Op::Promote(l, u) => registry.promote(UserId(l), UserId(u), t).map(|_| ()),
                    Op::Disband(l) => registry.disband(UserId(l)).map(|_| ()),
                };
                prop_assert!(registry.is_consistent());
            }
        }
    }
}
