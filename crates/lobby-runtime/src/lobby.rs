//! Lobby coordinator
//!
//! Owns the party registry and invite manager behind one async mutex and
//! exposes every party operation. Each mutation locks, applies, writes the
//! full registry snapshot through the store and releases, so snapshots are
//! never written out of order. Manual splits release the lock while they
//! talk to the platform.

use crate::clock::Clock;
use crate::config::{PartyConfig, QueueConfig, RuntimeConfig, SessionConfig};
use crate::gateway::{NotificationSink, PlatformGateway};
use crate::invites::InviteManager;
use crate::links::AccountLinks;
use crate::registry::{LeaveOutcome, PartyRegistry};
use crate::split::{
    assign_alternating, assign_halves, batches, execute_moves, notify_groups, SplitOutcome,
    SplitPolicy,
};
use crate::store::PartyStore;
use lobby_types::{
    ChannelId, LobbyError, LobbyResult, Party, PartyId, PlatformError, UserId,
};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

const SESSION_CODE_CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
const MIN_SPLIT_MEMBERS: usize = 2;

/// External services the lobby is wired to
#[derive(Clone)]
pub struct Collaborators {
    pub store: Arc<dyn PartyStore>,
    pub links: Arc<AccountLinks>,
    pub platform: Arc<dyn PlatformGateway>,
    pub notifier: Arc<dyn NotificationSink>,
    pub clock: Arc<dyn Clock>,
}

#[derive(Clone)]
struct LobbyState {
    parties: PartyRegistry,
    invites: InviteManager,
}

/// Party and invite lifecycle with write-through persistence
pub struct Lobby {
    party_config: PartyConfig,
    queue_config: QueueConfig,
    session_config: SessionConfig,
    policy: SplitPolicy,
    state: Mutex<LobbyState>,
    store: Arc<dyn PartyStore>,
    links: Arc<AccountLinks>,
    platform: Arc<dyn PlatformGateway>,
    notifier: Arc<dyn NotificationSink>,
    clock: Arc<dyn Clock>,
    rng: StdMutex<StdRng>,
}

impl Lobby {
    /// Rebuild the lobby from persisted parties
    pub async fn load(config: &RuntimeConfig, collaborators: Collaborators) -> LobbyResult<Self> {
        let parties = PartyRegistry::from_parties(collaborators.store.load_parties().await?);
        info!(parties = parties.len(), "Lobby loaded");

        let rng = match config.queue.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Ok(Self {
            party_config: config.party.clone(),
            queue_config: config.queue.clone(),
            session_config: config.session.clone(),
            policy: SplitPolicy::from_config(&config.queue),
            state: Mutex::new(LobbyState {
                parties,
                invites: InviteManager::new(config.party.invite_ttl()),
            }),
            store: collaborators.store,
            links: collaborators.links,
            platform: collaborators.platform,
            notifier: collaborators.notifier,
            clock: collaborators.clock,
            rng: StdMutex::new(rng),
        })
    }

    pub fn links(&self) -> &Arc<AccountLinks> {
        &self.links
    }

    /// Every party, ordered by leader
    pub async fn parties(&self) -> Vec<Party> {
        self.state.lock().await.parties.snapshot()
    }

    pub async fn pending_invites(&self) -> usize {
        self.state.lock().await.invites.len()
    }

    /// Whether the member index agrees with the parties
    pub async fn is_consistent(&self) -> bool {
        self.state.lock().await.parties.is_consistent()
    }

    async fn gate(&self, user: UserId) -> LobbyResult<()> {
        if self.party_config.require_linked_account {
            self.links.require(user).await?;
        }
        Ok(())
    }

    /// Write the registry through to the store. On failure `state` is
    /// restored to `before`, so callers never observe an unsaved change.
    async fn persist(&self, state: &mut LobbyState, before: LobbyState) -> LobbyResult<()> {
        if let Err(e) = self.store.save_parties(&state.parties.snapshot()).await {
            warn!(error = %e, "Failed to persist parties, change rolled back");
            *state = before;
            return Err(e.into());
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Party operations
    // ------------------------------------------------------------------

    pub async fn create_party(&self, leader: UserId) -> LobbyResult<Party> {
        self.gate(leader).await?;
        let mut state = self.state.lock().await;
        let before = state.clone();
        let party = state.parties.create(leader, self.clock.now())?.clone();
        self.persist(&mut state, before).await?;
        info!(party = %party.id, leader = %leader, "Party created");
        Ok(party)
    }

    /// Invite `invitee` into `inviter`'s party, creating a singleton party
    /// for a partyless inviter. Returns the inviter's party.
    pub async fn invite(&self, inviter: UserId, invitee: UserId) -> LobbyResult<Party> {
        self.gate(inviter).await?;
        if inviter == invitee {
            return Err(LobbyError::SelfInvite(inviter));
        }

        let mut state = self.state.lock().await;
        let before = state.clone();
        let now = self.clock.now();

        if state.parties.is_in_party(invitee) {
            return Err(LobbyError::AlreadyInParty(invitee));
        }
        if state.invites.pending_for(invitee, now).is_some() {
            return Err(LobbyError::InviteExists(invitee));
        }
        if state.parties.is_in_party(inviter) && !state.parties.is_leader(inviter) {
            return Err(LobbyError::NotLeader(inviter));
        }

        if !state.parties.is_in_party(inviter) {
            let party = state.parties.create(inviter, now)?;
            debug!(party = %party.id, leader = %inviter, "Implicit party created for invite");
        }
        state.invites.issue(inviter, invitee, now)?;
        state.parties.touch(inviter, now);
        let party = state.parties.led_by(inviter)?.clone();
        self.persist(&mut state, before).await?;

        info!(inviter = %inviter, invitee = %invitee, "Invite issued");
        Ok(party)
    }

    /// Accept the pending invite for `invitee`, returning the joined party
    pub async fn accept(&self, invitee: UserId) -> LobbyResult<Party> {
        self.gate(invitee).await?;
        let mut state = self.state.lock().await;
        let before = state.clone();
        let now = self.clock.now();

        if state.parties.is_in_party(invitee) {
            return Err(LobbyError::AlreadyInParty(invitee));
        }
        let inviter = state.invites.resolve(invitee, now)?;
        let party = state.parties.join(inviter, invitee, now)?.clone();
        self.persist(&mut state, before).await?;

        info!(party = %party.id, user = %invitee, "Invite accepted");
        Ok(party)
    }

    /// Drop the pending invite for `invitee`, returning the inviter
    pub async fn decline(&self, invitee: UserId) -> LobbyResult<UserId> {
        self.gate(invitee).await?;
        let inviter = self.state.lock().await.invites.decline(invitee)?;
        debug!(inviter = %inviter, invitee = %invitee, "Invite declined");
        Ok(inviter)
    }

    /// Leave the current party; a leader leaving disbands it
    pub async fn leave(&self, user: UserId) -> LobbyResult<LeaveOutcome> {
        self.gate(user).await?;
        let mut state = self.state.lock().await;
        let before = state.clone();
        let outcome = state.parties.leave(user, self.clock.now())?;
        self.persist(&mut state, before).await?;

        match &outcome {
            LeaveOutcome::Disbanded(party) => {
                info!(party = %party.id, leader = %user, "Leader left, party disbanded")
            }
            LeaveOutcome::Left(party) => info!(party = %party.id, user = %user, "Member left party"),
        }
        Ok(outcome)
    }

    pub async fn kick(&self, leader: UserId, target: UserId) -> LobbyResult<Party> {
        self.gate(leader).await?;
        let mut state = self.state.lock().await;
        let before = state.clone();
        let party = state.parties.kick(leader, target, self.clock.now())?.clone();
        self.persist(&mut state, before).await?;
        info!(party = %party.id, user = %target, "Member kicked");
        Ok(party)
    }

    pub async fn promote(&self, leader: UserId, target: UserId) -> LobbyResult<Party> {
        self.gate(leader).await?;
        let mut state = self.state.lock().await;
        let before = state.clone();
        let party = state.parties.promote(leader, target, self.clock.now())?.clone();
        self.persist(&mut state, before).await?;
        info!(party = %party.id, from = %leader, to = %target, "Leadership transferred");
        Ok(party)
    }

    pub async fn disband(&self, leader: UserId) -> LobbyResult<Party> {
        self.gate(leader).await?;
        let mut state = self.state.lock().await;
        let before = state.clone();
        let party = state.parties.disband(leader)?;
        self.persist(&mut state, before).await?;
        info!(party = %party.id, leader = %leader, "Party disbanded");
        Ok(party)
    }

    /// The caller's party
    pub async fn list(&self, user: UserId) -> LobbyResult<Party> {
        self.gate(user).await?;
        self.state
            .lock()
            .await
            .parties
            .get(user)
            .cloned()
            .ok_or(LobbyError::NotInParty(user))
    }

    pub async fn link(&self, user: UserId, name: &str) -> LobbyResult<()> {
        self.links.link(user, name).await
    }

    pub async fn unlink(&self, user: UserId) -> LobbyResult<String> {
        self.links.unlink(user).await
    }

    // ------------------------------------------------------------------
    // Sweeps
    // ------------------------------------------------------------------

    /// Remove parties idle past the threshold; persists if any were removed
    pub async fn sweep_idle_parties(&self) -> LobbyResult<Vec<Party>> {
        let mut state = self.state.lock().await;
        let before = state.clone();
        let removed = state
            .parties
            .sweep_idle(self.clock.now(), self.party_config.idle_timeout());
        if !removed.is_empty() {
            self.persist(&mut state, before).await?;
            for party in &removed {
                info!(party = %party.id, leader = %party.leader_id, "Idle party removed");
            }
        }
        Ok(removed)
    }

    /// Drop expired invites, returning how many were removed
    pub async fn sweep_invites(&self) -> usize {
        let dropped = self.state.lock().await.invites.sweep(self.clock.now());
        if dropped > 0 {
            debug!(dropped = dropped, "Expired invites dropped");
        }
        dropped
    }

    // ------------------------------------------------------------------
    // Manual splits
    // ------------------------------------------------------------------

    /// Move the leader's party members present in the queue channel into
    /// the policy's target pair
    pub async fn queue_party(&self, leader: UserId) -> LobbyResult<SplitOutcome> {
        let party = self.led_party(leader).await?;

        let allowed = vec![self.queue_config.small_move, self.queue_config.large_move];
        if !allowed.contains(&party.len()) {
            return Err(LobbyError::PartySizeInvalid {
                size: party.len(),
                allowed,
            });
        }

        let queue_channel = self.queue_channel()?;
        let occupants = self.platform.list_occupants(queue_channel).await?;
        let present = present_members(&party, &occupants);
        require_members(present.len())?;

        let targets = self.policy.targets_for(present.len());
        let shuffled = self.shuffled(present);
        let mut outcome = execute_moves(self.platform.as_ref(), &assign_alternating(&shuffled, targets)).await;
        outcome.notified = self.notify_moved(&outcome).await;

        self.update_party(&party.id, |p| p.queued = true).await?;
        info!(party = %party.id, moved = outcome.moved.len(), "Party queued");
        Ok(outcome)
    }

    /// Split the leader's present members across two new session channels
    pub async fn force_queue(&self, leader: UserId) -> LobbyResult<SplitOutcome> {
        let party = self.led_party(leader).await?;

        let queue_channel = self.queue_channel()?;
        let occupants = self.platform.list_occupants(queue_channel).await?;
        let present = present_members(&party, &occupants);
        require_members(present.len())?;

        let code = self.session_code();
        let category = self.session_config.temp_category;
        let red = self
            .platform
            .create_channel(&format!("red-{code}"), category)
            .await?;
        let green = match self
            .platform
            .create_channel(&format!("green-{code}"), category)
            .await
        {
            Ok(channel) => channel,
            Err(e) => {
                if let Err(cleanup) = self.platform.delete_channel(red).await {
                    warn!(channel = %red, error = %cleanup, "Failed to delete session channel");
                }
                return Err(e.into());
            }
        };

        let shuffled = self.shuffled(present);
        let mut outcome = execute_moves(self.platform.as_ref(), &assign_halves(&shuffled, [red, green])).await;
        outcome.notified = self.notify_moved(&outcome).await;

        self.update_party(&party.id, |p| {
            p.queued = true;
            p.temp_channels = vec![red, green];
        })
        .await?;
        info!(party = %party.id, code = %code, moved = outcome.moved.len(), "Session channels created");
        Ok(outcome)
    }

    /// Re-split a queued party's members found in the target or session
    /// channels into the large target pair
    pub async fn requeue(&self, leader: UserId) -> LobbyResult<SplitOutcome> {
        let party = self.led_party(leader).await?;
        if !party.queued {
            return Err(LobbyError::NotQueued(leader));
        }

        let mut channels = self.queue_config.fixed_targets().to_vec();
        channels.extend(party.temp_channels.iter().copied());
        let occupants = self.occupants_of(&channels).await;
        let present = present_members(&party, &occupants);
        require_members(present.len())?;

        let shuffled = self.shuffled(present);
        let targets = self.policy.large_targets();
        let mut outcome = execute_moves(self.platform.as_ref(), &assign_alternating(&shuffled, targets)).await;
        outcome.notified = self.notify_moved(&outcome).await;

        self.update_party(&party.id, |_| {}).await?;
        info!(party = %party.id, moved = outcome.moved.len(), "Party requeued");
        Ok(outcome)
    }

    /// Return session channel occupants to the lobby channel and delete the
    /// session channels
    pub async fn end_session(&self, leader: UserId) -> LobbyResult<SplitOutcome> {
        let party = self.led_party(leader).await?;
        let lobby_channel = self.session_config.lobby_channel;

        let mut outcome = SplitOutcome::default();
        for channel in &party.temp_channels {
            match self.platform.list_occupants(*channel).await {
                Ok(occupants) => {
                    let assignments: Vec<(UserId, ChannelId)> =
                        occupants.into_iter().map(|u| (u, lobby_channel)).collect();
                    let moved = execute_moves(self.platform.as_ref(), &assignments).await;
                    outcome.moved.extend(moved.moved);
                    outcome.failed.extend(moved.failed);
                }
                Err(e) => warn!(channel = %channel, error = %e, "Failed to read session channel"),
            }
            if let Err(e) = self.platform.delete_channel(*channel).await {
                warn!(channel = %channel, error = %e, "Failed to delete session channel");
            }
        }

        self.update_party(&party.id, Party::end_session).await?;
        info!(party = %party.id, returned = outcome.moved.len(), "Session ended");
        Ok(outcome)
    }

    async fn led_party(&self, leader: UserId) -> LobbyResult<Party> {
        self.gate(leader).await?;
        Ok(self.state.lock().await.parties.led_by(leader)?.clone())
    }

    fn queue_channel(&self) -> LobbyResult<ChannelId> {
        // Id 0 never names a real channel
        self.queue_config
            .primary_channel()
            .ok_or_else(|| PlatformError::ChannelNotFound(ChannelId(0)).into())
    }

    async fn occupants_of(&self, channels: &[ChannelId]) -> BTreeSet<UserId> {
        let mut occupants = BTreeSet::new();
        for channel in channels {
            match self.platform.list_occupants(*channel).await {
                Ok(found) => occupants.extend(found),
                Err(e) => debug!(channel = %channel, error = %e, "Skipping unreadable channel"),
            }
        }
        occupants
    }

    fn shuffled(&self, mut members: Vec<UserId>) -> Vec<UserId> {
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
        members.shuffle(&mut *rng);
        members
    }

    fn session_code(&self) -> String {
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
        (0..self.session_config.temp_name_len)
            .map(|_| SESSION_CODE_CHARSET[rng.gen_range(0..SESSION_CODE_CHARSET.len())] as char)
            .collect()
    }

    async fn notify_moved(&self, outcome: &SplitOutcome) -> Vec<String> {
        let moved: Vec<UserId> = outcome.moved.iter().map(|(u, _)| *u).collect();
        let names = self.links.names_for(&moved).await;
        let groups = batches(&names, self.queue_config.notify_batch_size);
        notify_groups(self.notifier.as_ref(), self.queue_config.notify_channel, &groups).await
    }

    /// Apply `f` to a party after a split, refresh its activity and persist
    async fn update_party<F>(&self, id: &PartyId, f: F) -> LobbyResult<()>
    where
        F: FnOnce(&mut Party) + Send,
    {
        let mut state = self.state.lock().await;
        let before = state.clone();
        let now = self.clock.now();
        match state.parties.get_by_id_mut(id) {
            Some(party) => {
                f(party);
                party.touch(now);
            }
            None => {
                warn!(party = %id, "Party disbanded during split");
                return Ok(());
            }
        }
        self.persist(&mut state, before).await
    }
}

fn present_members(party: &Party, occupants: &BTreeSet<UserId>) -> Vec<UserId> {
    party
        .members
        .iter()
        .copied()
        .filter(|m| occupants.contains(m))
        .collect()
}

fn require_members(present: usize) -> LobbyResult<()> {
    if present < MIN_SPLIT_MEMBERS {
        return Err(LobbyError::NotEnoughMembers {
            required: MIN_SPLIT_MEMBERS,
            present,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::sim::SimulatedPlatform;
    use crate::store::InMemoryStore;
    use chrono::Duration;
    use lobby_types::ErrorCategory;
    use std::collections::BTreeMap;

    const QUEUE: ChannelId = ChannelId(10);
    const NOTIFY: ChannelId = ChannelId(99);
    const CATEGORY: ChannelId = ChannelId(50);
    const LOBBY: ChannelId = ChannelId(60);

    struct Fixture {
        lobby: Lobby,
        store: Arc<InMemoryStore>,
        platform: Arc<SimulatedPlatform>,
        clock: Arc<ManualClock>,
    }

    fn config() -> RuntimeConfig {
        let mut config = RuntimeConfig::default();
        config.queue.channels = vec![QUEUE];
        config.queue.notify_channel = Some(NOTIFY);
        config.queue.rng_seed = Some(42);
        config.session.temp_category = CATEGORY;
        config.session.lobby_channel = LOBBY;
        config
    }

    /// Users 1..=20 are linked as `player<N>`
    async fn fixture_with(config: RuntimeConfig) -> Fixture {
        let links: BTreeMap<UserId, String> =
            (1..=20).map(|u| (UserId(u), format!("player{u}"))).collect();
        let store = Arc::new(InMemoryStore::with_data(Vec::new(), links));
        let platform = Arc::new(SimulatedPlatform::with_channels([
            QUEUE,
            ChannelId(1),
            ChannelId(2),
            ChannelId(3),
            ChannelId(4),
            LOBBY,
        ]));
        let clock = Arc::new(ManualClock::default());
        let links = Arc::new(AccountLinks::load(store.clone(), 4).await.unwrap());

        let lobby = Lobby::load(
            &config,
            Collaborators {
                store: store.clone(),
                links,
                platform: platform.clone(),
                notifier: platform.clone(),
                clock: clock.clone(),
            },
        )
        .await
        .unwrap();

        Fixture {
            lobby,
            store,
            platform,
            clock,
        }
    }

    async fn fixture() -> Fixture {
        fixture_with(config()).await
    }

    /// Leader 1 with members 2..=size
    async fn party_of(f: &Fixture, size: u64) {
        for u in 2..=size {
            f.lobby.invite(UserId(1), UserId(u)).await.unwrap();
            f.lobby.accept(UserId(u)).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_invite_creates_implicit_party_and_accept_joins() {
        let f = fixture().await;

        let party = f.lobby.invite(UserId(1), UserId(2)).await.unwrap();
        assert_eq!(party.members, vec![UserId(1)]);

        let party = f.lobby.accept(UserId(2)).await.unwrap();
        assert_eq!(party.members, vec![UserId(1), UserId(2)]);
        assert_eq!(f.store.saved_parties().await.len(), 1);
        assert!(f.lobby.is_consistent().await);
    }

    #[tokio::test]
    async fn test_invite_check_order() {
        let f = fixture().await;
        party_of(&f, 2).await;

        assert!(matches!(
            f.lobby.invite(UserId(1), UserId(1)).await,
            Err(LobbyError::SelfInvite(_))
        ));
        assert!(matches!(
            f.lobby.invite(UserId(1), UserId(2)).await,
            Err(LobbyError::AlreadyInParty(UserId(2)))
        ));

        f.lobby.invite(UserId(1), UserId(3)).await.unwrap();
        assert!(matches!(
            f.lobby.invite(UserId(1), UserId(3)).await,
            Err(LobbyError::InviteExists(UserId(3)))
        ));
        assert!(matches!(
            f.lobby.invite(UserId(2), UserId(4)).await,
            Err(LobbyError::NotLeader(UserId(2)))
        ));
    }

    #[tokio::test]
    async fn test_link_gate() {
        let f = fixture().await;
        let err = f.lobby.invite(UserId(50), UserId(1)).await.unwrap_err();
        assert!(matches!(err, LobbyError::NotLinked(UserId(50))));

        let mut open = config();
        open.party.require_linked_account = false;
        let f = fixture_with(open).await;
        f.lobby.create_party(UserId(50)).await.unwrap();
    }

    #[tokio::test]
    async fn test_accept_while_partied_keeps_invite() {
        let f = fixture().await;
        f.lobby.invite(UserId(1), UserId(2)).await.unwrap();
        f.lobby.create_party(UserId(2)).await.unwrap();

        let err = f.lobby.accept(UserId(2)).await.unwrap_err();
        assert!(matches!(err, LobbyError::AlreadyInParty(UserId(2))));
        assert_eq!(f.lobby.pending_invites().await, 1);

        // Once free again the same invite still resolves
        f.lobby.leave(UserId(2)).await.unwrap();
        let party = f.lobby.accept(UserId(2)).await.unwrap();
        assert_eq!(party.members, vec![UserId(1), UserId(2)]);
    }

    /// Party store whose writes can be switched off
    struct FlakyStore {
        fail_saves: std::sync::atomic::AtomicBool,
    }

    #[async_trait::async_trait]
    impl PartyStore for FlakyStore {
        async fn load_parties(&self) -> lobby_types::StoreResult<Vec<Party>> {
            Ok(Vec::new())
        }

        async fn save_parties(&self, _parties: &[Party]) -> lobby_types::StoreResult<()> {
            if self.fail_saves.load(std::sync::atomic::Ordering::SeqCst) {
                return Err(lobby_types::StoreError::Corrupt("disk full".to_string()));
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_failed_write_rolls_back() {
        let store = Arc::new(FlakyStore {
            fail_saves: std::sync::atomic::AtomicBool::new(false),
        });
        let platform = Arc::new(SimulatedPlatform::with_channels([QUEUE]));
        let mut open = config();
        open.party.require_linked_account = false;
        let links = Arc::new(
            AccountLinks::load(Arc::new(InMemoryStore::default()), 4)
                .await
                .unwrap(),
        );
        let lobby = Lobby::load(
            &open,
            Collaborators {
                store: store.clone(),
                links,
                platform: platform.clone(),
                notifier: platform,
                clock: Arc::new(ManualClock::default()),
            },
        )
        .await
        .unwrap();

        lobby.create_party(UserId(1)).await.unwrap();
        store
            .fail_saves
            .store(true, std::sync::atomic::Ordering::SeqCst);

        let err = lobby.invite(UserId(1), UserId(2)).await.unwrap_err();
        assert_eq!(err.category(), ErrorCategory::External);
        assert_eq!(lobby.pending_invites().await, 0);

        assert!(lobby.disband(UserId(1)).await.is_err());
        let parties = lobby.parties().await;
        assert_eq!(parties.len(), 1);
        assert_eq!(parties[0].leader_id, UserId(1));
        assert!(lobby.is_consistent().await);
    }

    #[tokio::test]
    async fn test_accept_after_disband_is_party_gone() {
        let f = fixture().await;
        f.lobby.invite(UserId(1), UserId(2)).await.unwrap();
        f.lobby.disband(UserId(1)).await.unwrap();

        let err = f.lobby.accept(UserId(2)).await.unwrap_err();
        assert!(matches!(err, LobbyError::PartyGone(UserId(1))));
        assert_eq!(err.category(), ErrorCategory::Race);
        assert!(matches!(
            f.lobby.accept(UserId(2)).await,
            Err(LobbyError::NoPendingInvite(_))
        ));
    }

    #[tokio::test]
    async fn test_accept_expired_invite() {
        let f = fixture().await;
        f.lobby.invite(UserId(1), UserId(2)).await.unwrap();
        f.clock.advance(Duration::minutes(31));

        assert!(matches!(
            f.lobby.accept(UserId(2)).await,
            Err(LobbyError::InviteExpired(_))
        ));
        assert_eq!(f.lobby.pending_invites().await, 0);
    }

    #[tokio::test]
    async fn test_leader_leave_disbands_follower_leave_does_not() {
        let f = fixture().await;
        party_of(&f, 3).await;

        let outcome = f.lobby.leave(UserId(3)).await.unwrap();
        assert!(matches!(outcome, LeaveOutcome::Left(ref p) if p.members == vec![UserId(1), UserId(2)]));

        let outcome = f.lobby.leave(UserId(1)).await.unwrap();
        assert!(matches!(outcome, LeaveOutcome::Disbanded(_)));
        assert!(matches!(
            f.lobby.list(UserId(2)).await,
            Err(LobbyError::NotInParty(_))
        ));
        assert!(f.store.saved_parties().await.is_empty());
    }

    #[tokio::test]
    async fn test_promote_then_old_leader_cannot_kick() {
        let f = fixture().await;
        party_of(&f, 3).await;

        let party = f.lobby.promote(UserId(1), UserId(2)).await.unwrap();
        assert_eq!(party.leader_id, UserId(2));
        assert!(matches!(
            f.lobby.kick(UserId(1), UserId(3)).await,
            Err(LobbyError::NotLeader(_))
        ));

        let party = f.lobby.kick(UserId(2), UserId(3)).await.unwrap();
        assert_eq!(party.members, vec![UserId(1), UserId(2)]);
        assert_eq!(f.lobby.list(UserId(1)).await.unwrap().leader_id, UserId(2));
    }

    #[tokio::test]
    async fn test_idle_sweep_removes_and_persists() {
        let f = fixture().await;
        party_of(&f, 2).await;
        let saves = f.store.party_saves();

        f.clock.advance(Duration::minutes(9));
        assert!(f.lobby.sweep_idle_parties().await.unwrap().is_empty());
        assert_eq!(f.store.party_saves(), saves);

        f.clock.advance(Duration::minutes(2));
        let removed = f.lobby.sweep_idle_parties().await.unwrap();
        assert_eq!(removed.len(), 1);
        assert!(f.lobby.parties().await.is_empty());
        assert_eq!(f.store.party_saves(), saves + 1);
    }

    #[tokio::test]
    async fn test_queue_party_requires_valid_size() {
        let f = fixture().await;
        party_of(&f, 5).await;

        let err = f.lobby.queue_party(UserId(1)).await.unwrap_err();
        assert!(matches!(err, LobbyError::PartySizeInvalid { size: 5, .. }));
    }

    #[tokio::test]
    async fn test_queue_party_moves_present_members() {
        let f = fixture().await;
        party_of(&f, 6).await;
        for u in 1..=6 {
            f.platform.join(UserId(u), QUEUE);
        }

        let outcome = f.lobby.queue_party(UserId(1)).await.unwrap();

        assert_eq!(outcome.moved.len(), 6);
        let small = config().queue.small_targets;
        assert_eq!(outcome.moved_to(small[0]).len(), 3);
        assert_eq!(outcome.moved_to(small[1]).len(), 3);
        // Six names in batches of four
        assert_eq!(outcome.notified.len(), 2);
        assert!(outcome.notified.iter().all(|t| t.starts_with("/p ")));
        assert_eq!(f.platform.messages().len(), 2);
        assert!(f.lobby.list(UserId(1)).await.unwrap().queued);
    }

    #[tokio::test]
    async fn test_queue_party_needs_two_present() {
        let f = fixture().await;
        party_of(&f, 6).await;
        f.platform.join(UserId(1), QUEUE);

        let err = f.lobby.queue_party(UserId(1)).await.unwrap_err();
        assert!(matches!(
            err,
            LobbyError::NotEnoughMembers {
                required: 2,
                present: 1
            }
        ));
    }

    #[tokio::test]
    async fn test_force_queue_then_end_session() {
        let f = fixture().await;
        party_of(&f, 4).await;
        for u in 1..=4 {
            f.platform.join(UserId(u), QUEUE);
        }

        let outcome = f.lobby.force_queue(UserId(1)).await.unwrap();
        let session = f.platform.channels_in(CATEGORY);
        assert_eq!(session.len(), 2);
        assert_eq!(outcome.moved.len(), 4);
        assert_eq!(outcome.moved_to(session[0]).len(), 2);

        let name = f.platform.channel_name(session[0]).unwrap();
        assert!(name.starts_with("red-") || name.starts_with("green-"));
        assert_eq!(name.split('-').nth(1).unwrap().len(), 6);

        let party = f.lobby.list(UserId(1)).await.unwrap();
        assert!(party.queued);
        assert_eq!(party.temp_channels.len(), 2);

        let ended = f.lobby.end_session(UserId(1)).await.unwrap();
        assert_eq!(ended.moved_to(LOBBY).len(), 4);
        assert!(f.platform.channels_in(CATEGORY).is_empty());
        let party = f.lobby.list(UserId(1)).await.unwrap();
        assert!(!party.queued);
        assert!(party.temp_channels.is_empty());
    }

    #[tokio::test]
    async fn test_requeue_requires_queued() {
        let f = fixture().await;
        party_of(&f, 2).await;
        assert!(matches!(
            f.lobby.requeue(UserId(1)).await,
            Err(LobbyError::NotQueued(_))
        ));
    }

    #[tokio::test]
    async fn test_requeue_gathers_from_target_channels() {
        let f = fixture().await;
        party_of(&f, 4).await;
        for u in 1..=4 {
            f.platform.join(UserId(u), QUEUE);
        }
        f.lobby.force_queue(UserId(1)).await.unwrap();

        let outcome = f.lobby.requeue(UserId(1)).await.unwrap();

        let large = config().queue.large_targets;
        assert_eq!(outcome.moved_to(large[0]).len(), 2);
        assert_eq!(outcome.moved_to(large[1]).len(), 2);
    }

    #[tokio::test]
    async fn test_split_without_queue_channel_fails() {
        let mut config = config();
        config.queue.channels.clear();
        let f = fixture_with(config).await;
        party_of(&f, 6).await;

        let err = f.lobby.queue_party(UserId(1)).await.unwrap_err();
        assert!(matches!(
            err,
            LobbyError::Platform(PlatformError::ChannelNotFound(_))
        ));
        assert_eq!(err.category(), ErrorCategory::External);
    }
}
