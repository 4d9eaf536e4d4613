//! Presence and lock state for one collaboration session.
//!
//! [`PresenceStore`] is the single source of truth for the roster and the
//! entity lock map. It is mutated only through [`PresenceStore::apply`] (for
//! inbound messages) and the local request helpers, all synchronous, so a
//! caller that holds it behind a lock never observes a half-applied message.
//!
//! # Lock claims
//!
//! Locks are announce-based and the first observed claim wins: `lock{E}` for
//! an unlocked `E` grants it to the sender, and a `lock` for an entity someone
//! already holds never changes the holder. If the local user is the holder it
//! answers the requester with `lock_failed`, and the requester yields.
//!
//! Two requests can cross on the wire, each requester having claimed `E`
//! before seeing the other's `lock`. Both holders then answer each other and
//! the smaller user id keeps the entity. Bystanders follow the answer that
//! names the smaller id, so every peer settles on the same holder. Message
//! timestamps take no part in this; peer clocks are not synchronized.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::time::Duration;

use collab_types::{LockFailed, Message, NodeId, Payload, PresenceAction, SyncSnapshot, UserId, UserInfo};
use sha2::{Digest, Sha256};

/// A present participant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    /// User identifier.
    pub id: UserId,
    /// Display name.
    pub name: String,
    /// Display color, derived from the id.
    pub color: String,
    /// Local receive time of the last message from this user (ms).
    pub last_seen: u64,
}

impl User {
    fn new(info: &UserInfo, now: u64) -> Self {
        Self {
            id: info.user_id.clone(),
            name: info.user_name.clone(),
            color: color_for(&info.user_id),
            last_seen: now,
        }
    }

    /// The user as a wire roster entry.
    pub fn info(&self) -> UserInfo {
        UserInfo {
            user_id: self.id.clone(),
            user_name: self.name.clone(),
            color: Some(self.color.clone()),
        }
    }

    /// Whether nothing has been heard from this user for longer than `idle_after`.
    pub fn is_idle(&self, now: u64, idle_after: Duration) -> bool {
        let threshold = u64::try_from(idle_after.as_millis()).unwrap_or(u64::MAX);
        now.saturating_sub(self.last_seen) > threshold
    }
}

/// A roster entry with the derived idle flag, for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserView {
    /// User identifier.
    pub id: UserId,
    /// Display name.
    pub name: String,
    /// Display color.
    pub color: String,
    /// Last activity (ms).
    pub last_seen: u64,
    /// Idle at the instant the view was taken.
    pub idle: bool,
    /// This is the local user.
    pub is_local: bool,
}

/// Derive a stable display color from a user id.
///
/// The hue comes from a SHA-256 of the id, so it survives reconnects and is
/// the same on every peer.
pub fn color_for(user_id: &UserId) -> String {
    let digest = Sha256::digest(user_id.as_str().as_bytes());
    let hue = u16::from_be_bytes([digest[0], digest[1]]) % 360;
    format!("hsl({hue}, 70%, 50%)")
}

/// The recorded holder of an entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockClaim {
    /// Holder of record.
    pub holder: UserId,
    /// Local time the claim was recorded (ms).
    pub since: u64,
    /// Users whose `lock` arrived while the local user held the entity.
    /// Empty unless the holder is local.
    pub contenders: BTreeSet<UserId>,
}

impl LockClaim {
    /// Create an uncontested claim.
    pub fn new(holder: UserId, since: u64) -> Self {
        Self {
            holder,
            since,
            contenders: BTreeSet::new(),
        }
    }
}

/// Result of a local lock request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockRequest {
    /// Recorded locally; the caller announces it.
    Granted,
    /// The local user already holds it.
    AlreadyHeld,
    /// Someone else holds it; nothing should be sent.
    HeldBy(UserId),
}

/// What a caller must do or report after a message was applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresenceEffect {
    /// A user became (or stayed) present.
    UserJoined {
        /// Who.
        user_id: UserId,
        /// They were absent before this message.
        newly_present: bool,
    },
    /// A user left; their locks were released.
    UserLeft {
        /// Who.
        user_id: UserId,
        /// Entities they held, now unlocked.
        released: Vec<NodeId>,
    },
    /// Send this `lock_failed` answer; the local user is the holder.
    AnswerLock(LockFailed),
    /// The entity the local user claimed was already held by someone else.
    LockDenied {
        /// The contested entity.
        node_id: NodeId,
        /// The holder of record.
        locked_by: UserId,
    },
    /// The local user's claim crossed another and the smaller id won.
    LockLost {
        /// The contested entity.
        node_id: NodeId,
        /// The new holder.
        locked_by: UserId,
    },
}

/// Roster and lock map for one session.
#[derive(Debug, Clone)]
pub struct PresenceStore {
    local: UserId,
    users: BTreeMap<UserId, User>,
    locks: HashMap<NodeId, LockClaim>,
}

impl PresenceStore {
    /// Create a store with the local user already present.
    pub fn new(local: &UserInfo, now: u64) -> Self {
        let mut users = BTreeMap::new();
        users.insert(local.user_id.clone(), User::new(local, now));
        Self {
            local: local.user_id.clone(),
            users,
            locks: HashMap::new(),
        }
    }

    /// The local user's id.
    pub fn local_id(&self) -> &UserId {
        &self.local
    }

    /// Apply one inbound message. `now` is the local receive time (ms).
    pub fn apply(&mut self, message: &Message, now: u64) -> Vec<PresenceEffect> {
        self.touch(&message.user_id, now);

        match &message.payload {
            Payload::UserPresence(presence) => match presence.action {
                PresenceAction::Joined => vec![self.join(&presence.user, now)],
                PresenceAction::Left => self.leave(&presence.user.user_id),
            },
            Payload::Sync(snapshot) => self.apply_snapshot(snapshot, now),
            Payload::Lock(lock) => self.observe_lock(&lock.node_id, &message.user_id, now),
            Payload::Unlock(unlock) => {
                self.release(&unlock.node_id);
                vec![]
            }
            Payload::LockFailed(failed) => self.observe_lock_failed(failed, now),
            Payload::NodeUpdate(_) | Payload::EdgeUpdate(_) | Payload::CursorMove(_) => vec![],
        }
    }

    /// Refresh a present user's last-seen time.
    pub fn touch(&mut self, user_id: &UserId, now: u64) {
        if let Some(user) = self.users.get_mut(user_id) {
            user.last_seen = user.last_seen.max(now);
        }
    }

    /// Insert or refresh a user.
    pub fn join(&mut self, info: &UserInfo, now: u64) -> PresenceEffect {
        let newly_present = match self.users.get_mut(&info.user_id) {
            Some(user) => {
                user.name = info.user_name.clone();
                user.last_seen = user.last_seen.max(now);
                false
            }
            None => {
                self.users.insert(info.user_id.clone(), User::new(info, now));
                true
            }
        };
        PresenceEffect::UserJoined {
            user_id: info.user_id.clone(),
            newly_present,
        }
    }

    /// Remove a user and every lock they hold. Repeating it is a no-op.
    pub fn leave(&mut self, user_id: &UserId) -> Vec<PresenceEffect> {
        if *user_id == self.local {
            return vec![];
        }

        let was_present = self.users.remove(user_id).is_some();
        let mut released: Vec<NodeId> = self
            .locks
            .iter()
            .filter(|(_, claim)| claim.holder == *user_id)
            .map(|(node, _)| node.clone())
            .collect();
        for node in &released {
            self.locks.remove(node);
        }
        released.sort();

        if !was_present && released.is_empty() {
            return vec![];
        }
        vec![PresenceEffect::UserLeft {
            user_id: user_id.clone(),
            released,
        }]
    }

    /// Record a `lock` announcement from `claimant`.
    ///
    /// An unlocked entity goes to the claimant. A held one keeps its holder;
    /// if that is the local user, the claimant is answered.
    pub fn observe_lock(&mut self, node_id: &NodeId, claimant: &UserId, now: u64) -> Vec<PresenceEffect> {
        let Some(claim) = self.locks.get_mut(node_id) else {
            self.locks
                .insert(node_id.clone(), LockClaim::new(claimant.clone(), now));
            return vec![];
        };

        if claim.holder == *claimant || claim.holder != self.local {
            return vec![];
        }

        claim.contenders.insert(claimant.clone());
        vec![PresenceEffect::AnswerLock(LockFailed {
            node_id: node_id.clone(),
            locked_by: self.local.clone(),
            to: Some(claimant.clone()),
            locked_at: Some(claim.since),
        })]
    }

    /// Record a `lock_failed` answer.
    ///
    /// Addressed to the local user while it holds the entity, the answer is
    /// obeyed unless the two claims crossed and the local id is smaller. An
    /// answer without an addressee is taken as meant for whoever claimed the
    /// entity. Bystanders switch from the addressee to the answering holder
    /// only when the holder's id is smaller, mirroring the addressee.
    pub fn observe_lock_failed(&mut self, failed: &LockFailed, now: u64) -> Vec<PresenceEffect> {
        let node_id = &failed.node_id;
        let holder = &failed.locked_by;
        if *holder == self.local {
            return vec![];
        }

        let held_locally = self.lock_holder(node_id) == Some(&self.local);
        let addressed_to_us = match &failed.to {
            Some(to) => *to == self.local,
            None => held_locally,
        };

        if addressed_to_us {
            if !held_locally {
                self.locks
                    .entry(node_id.clone())
                    .or_insert_with(|| LockClaim::new(holder.clone(), now));
                return vec![];
            }

            let crossed = self
                .locks
                .get(node_id)
                .is_some_and(|claim| claim.contenders.contains(holder));
            if crossed && self.local < *holder {
                return vec![];
            }

            self.locks
                .insert(node_id.clone(), LockClaim::new(holder.clone(), now));
            let (node_id, locked_by) = (node_id.clone(), holder.clone());
            return vec![if crossed {
                PresenceEffect::LockLost { node_id, locked_by }
            } else {
                PresenceEffect::LockDenied { node_id, locked_by }
            }];
        }

        let switch = match (self.locks.get(node_id), &failed.to) {
            (None, _) => true,
            (Some(claim), Some(to)) => {
                claim.holder == *to && claim.holder != self.local && *holder < *to
            }
            (Some(_), None) => false,
        };
        if switch {
            self.locks
                .insert(node_id.clone(), LockClaim::new(holder.clone(), now));
        }
        vec![]
    }

    /// Merge a snapshot into the roster and lock map.
    ///
    /// Users are only added: the responder may have built the snapshot before
    /// it heard someone we already know. Recorded locks keep their holder.
    /// Entities we have no record for take the snapshot's holder, and a
    /// remote lock the snapshot omits is dropped only when the responder
    /// lists its holder, meaning it saw the release we missed.
    pub fn apply_snapshot(&mut self, snapshot: &SyncSnapshot, now: u64) -> Vec<PresenceEffect> {
        let local = self.local.clone();
        let effects = snapshot
            .users
            .iter()
            .filter(|info| info.user_id != local)
            .map(|info| self.join(info, now))
            .collect();

        self.locks.retain(|node_id, claim| {
            claim.holder == local
                || snapshot.locks.contains_key(node_id)
                || !snapshot.users.iter().any(|u| u.user_id == claim.holder)
        });

        for (node_id, holder) in &snapshot.locks {
            if *holder != local {
                self.locks
                    .entry(node_id.clone())
                    .or_insert_with(|| LockClaim::new(holder.clone(), now));
            }
        }

        effects
    }

    /// Claim `node_id` for the local user, unless someone else holds it.
    pub fn claim_local(&mut self, node_id: &NodeId, at: u64) -> LockRequest {
        match self.locks.get(node_id) {
            Some(claim) if claim.holder == self.local => LockRequest::AlreadyHeld,
            Some(claim) => LockRequest::HeldBy(claim.holder.clone()),
            None => {
                self.locks
                    .insert(node_id.clone(), LockClaim::new(self.local.clone(), at));
                LockRequest::Granted
            }
        }
    }

    /// Remove the lock on `node_id`, whoever holds it.
    pub fn release(&mut self, node_id: &NodeId) -> Option<LockClaim> {
        self.locks.remove(node_id)
    }

    /// Whether `node_id` is held by someone other than the local user.
    pub fn is_locked_by_other(&self, node_id: &NodeId) -> bool {
        self.locks
            .get(node_id)
            .is_some_and(|claim| claim.holder != self.local)
    }

    /// The holder of `node_id`, if any.
    pub fn lock_holder(&self, node_id: &NodeId) -> Option<&UserId> {
        self.locks.get(node_id).map(|claim| &claim.holder)
    }

    /// The holder of `node_id` as a roster entry, if locked and present.
    pub fn lock_holder_user(&self, node_id: &NodeId) -> Option<&User> {
        self.lock_holder(node_id).and_then(|id| self.users.get(id))
    }

    /// The claim on `node_id`, if any.
    pub fn claim(&self, node_id: &NodeId) -> Option<&LockClaim> {
        self.locks.get(node_id)
    }

    /// All locks as node id to holder.
    pub fn locks(&self) -> BTreeMap<NodeId, UserId> {
        self.locks
            .iter()
            .map(|(node, claim)| (node.clone(), claim.holder.clone()))
            .collect()
    }

    /// Entities the local user holds, ordered by id.
    pub fn local_locks(&self) -> Vec<NodeId> {
        let mut held: Vec<NodeId> = self
            .locks
            .iter()
            .filter(|(_, claim)| claim.holder == self.local)
            .map(|(node, _)| node.clone())
            .collect();
        held.sort();
        held
    }

    /// Look up a present user.
    pub fn user(&self, user_id: &UserId) -> Option<&User> {
        self.users.get(user_id)
    }

    /// Whether the user is present.
    pub fn is_present(&self, user_id: &UserId) -> bool {
        self.users.contains_key(user_id)
    }

    /// Present users, ordered by id.
    pub fn users(&self) -> impl Iterator<Item = &User> {
        self.users.values()
    }

    /// Number of present users, local user included.
    pub fn len(&self) -> usize {
        self.users.len()
    }

    /// Always false: the local user is always present.
    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    /// Roster with idle flags computed for `now`.
    pub fn views(&self, now: u64, idle_after: Duration) -> Vec<UserView> {
        self.users
            .values()
            .map(|user| UserView {
                id: user.id.clone(),
                name: user.name.clone(),
                color: user.color.clone(),
                last_seen: user.last_seen,
                idle: user.is_idle(now, idle_after),
                is_local: user.id == self.local,
            })
            .collect()
    }

    /// Whether the local user should answer `joiner` with a snapshot.
    ///
    /// The present member with the smallest id (the joiner excluded) answers,
    /// so one join produces one snapshot.
    pub fn should_answer_join(&self, joiner: &UserId) -> bool {
        self.users.keys().find(|id| *id != joiner) == Some(&self.local)
    }

    /// The full roster and lock map.
    pub fn snapshot(&self) -> SyncSnapshot {
        SyncSnapshot {
            users: self.users.values().map(User::info).collect(),
            locks: self.locks(),
        }
    }

    /// Drop every remote user and every lock.
    pub fn reset(&mut self) {
        let local = self.local.clone();
        self.users.retain(|id, _| *id == local);
        self.locks.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use collab_types::{Lock, SessionId, Unlock, UserPresence};

    fn store(local: &str) -> PresenceStore {
        PresenceStore::new(&UserInfo::new(local, local.to_lowercase()), 1_000)
    }

    fn msg(from: &str, at: u64, payload: Payload) -> Message {
        Message::new(UserId::from(from), from, SessionId::from("room-1"), at, payload)
    }

    fn joined(user: &str, at: u64) -> Message {
        msg(
            user,
            at,
            Payload::UserPresence(UserPresence {
                action: PresenceAction::Joined,
                user: UserInfo::new(user, user.to_lowercase()),
            }),
        )
    }

    fn left(user: &str, at: u64) -> Message {
        msg(
            user,
            at,
            Payload::UserPresence(UserPresence {
                action: PresenceAction::Left,
                user: UserInfo::new(user, user.to_lowercase()),
            }),
        )
    }

    fn lock(from: &str, node: &str, at: u64) -> Message {
        msg(from, at, Payload::Lock(Lock { node_id: NodeId::from(node) }))
    }

    fn unlock(from: &str, node: &str, at: u64) -> Message {
        msg(from, at, Payload::Unlock(Unlock { node_id: NodeId::from(node) }))
    }

    fn n(node: &str) -> NodeId {
        NodeId::from(node)
    }

    fn u(user: &str) -> UserId {
        UserId::from(user)
    }

    // ===========================================
    // Roster
    // ===========================================

    #[test]
    fn local_user_is_present_immediately() {
        let store = store("A");
        assert!(store.is_present(&u("A")));
        assert_eq!(store.len(), 1);
        assert_eq!(store.local_id(), &u("A"));
    }

    #[test]
    fn joined_inserts_user() {
        let mut store = store("A");
        let effects = store.apply(&joined("B", 10), 2_000);

        assert_eq!(
            effects,
            vec![PresenceEffect::UserJoined {
                user_id: u("B"),
                newly_present: true
            }]
        );
        let b = store.user(&u("B")).unwrap();
        assert_eq!(b.name, "b");
        assert_eq!(b.last_seen, 2_000);
        assert_eq!(b.color, color_for(&u("B")));
    }

    #[test]
    fn repeated_join_is_not_new() {
        let mut store = store("A");
        store.apply(&joined("B", 10), 2_000);
        let effects = store.apply(&joined("B", 20), 3_000);

        assert_eq!(
            effects,
            vec![PresenceEffect::UserJoined {
                user_id: u("B"),
                newly_present: false
            }]
        );
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn left_removes_user_and_their_locks() {
        let mut store = store("A");
        store.apply(&joined("B", 10), 2_000);
        store.apply(&lock("B", "n1", 11), 2_001);
        store.apply(&lock("B", "n2", 12), 2_002);
        store.apply(&lock("A", "n3", 13), 2_003);

        let effects = store.apply(&left("B", 20), 3_000);

        assert_eq!(
            effects,
            vec![PresenceEffect::UserLeft {
                user_id: u("B"),
                released: vec![n("n1"), n("n2")]
            }]
        );
        assert!(!store.is_present(&u("B")));
        assert!(store.lock_holder(&n("n1")).is_none());
        assert!(store.lock_holder(&n("n2")).is_none());
        assert_eq!(store.lock_holder(&n("n3")), Some(&u("A")));
    }

    #[test]
    fn left_twice_equals_left_once() {
        let mut once = store("A");
        once.apply(&joined("B", 10), 2_000);
        once.apply(&lock("B", "n1", 11), 2_001);
        once.apply(&left("B", 20), 3_000);

        let mut twice = once.clone();
        let effects = twice.apply(&left("B", 20), 3_000);

        assert!(effects.is_empty());
        assert_eq!(once.locks(), twice.locks());
        assert_eq!(
            once.users().cloned().collect::<Vec<_>>(),
            twice.users().cloned().collect::<Vec<_>>()
        );
    }

    #[test]
    fn local_user_cannot_be_removed() {
        let mut store = store("A");
        assert!(store.apply(&left("A", 5), 2_000).is_empty());
        assert!(store.is_present(&u("A")));
    }

    #[test]
    fn any_message_refreshes_last_seen() {
        let mut store = store("A");
        store.apply(&joined("B", 10), 2_000);
        store.apply(&lock("B", "n1", 11), 9_000);
        assert_eq!(store.user(&u("B")).unwrap().last_seen, 9_000);
    }

    #[test]
    fn idle_is_derived_from_last_seen() {
        let mut store = store("A");
        store.apply(&joined("B", 10), 2_000);

        let views = store.views(2_000 + 61_000, Duration::from_secs(60));
        let b = views.iter().find(|v| v.id == u("B")).unwrap();
        assert!(b.idle);
        assert!(!b.is_local);

        let views = store.views(2_000 + 30_000, Duration::from_secs(60));
        assert!(views.iter().all(|v| !v.idle));
    }

    #[test]
    fn color_is_stable_and_well_formed() {
        let first = color_for(&u("alice"));
        assert_eq!(first, color_for(&u("alice")));
        assert!(first.starts_with("hsl("));
        assert!(first.ends_with(", 70%, 50%)"));
    }

    // ===========================================
    // Locks
    // ===========================================

    fn answer(holder: &str, to: Option<&str>, node: &str) -> Message {
        msg(
            holder,
            1,
            Payload::LockFailed(LockFailed {
                node_id: n(node),
                locked_by: u(holder),
                to: to.map(u),
                locked_at: None,
            }),
        )
    }

    #[test]
    fn lock_on_free_node_is_granted_to_sender() {
        let mut store = store("B");
        store.apply(&joined("A", 10), 2_000);
        store.apply(&lock("A", "n1", 11), 2_001);

        assert_eq!(store.lock_holder(&n("n1")), Some(&u("A")));
        assert!(store.is_locked_by_other(&n("n1")));
        assert_eq!(store.lock_holder_user(&n("n1")).unwrap().name, "a");
    }

    #[test]
    fn holder_answers_a_later_conflicting_lock() {
        let mut store = store("A");
        assert_eq!(store.claim_local(&n("n1"), 100), LockRequest::Granted);

        let effects = store.apply(&lock("B", "n1", 200), 3_000);

        assert_eq!(
            effects,
            vec![PresenceEffect::AnswerLock(LockFailed {
                node_id: n("n1"),
                locked_by: u("A"),
                to: Some(u("B")),
                locked_at: Some(100),
            })]
        );
        assert_eq!(store.lock_holder(&n("n1")), Some(&u("A")));
    }

    #[test]
    fn requester_with_a_slow_clock_does_not_take_the_lock() {
        let mut a = store("A");
        a.claim_local(&n("n1"), 10_000);

        // B's clock is far behind; its stamp says nothing about order.
        let effects = a.apply(&lock("B", "n1", 1_000), 60_000);

        assert!(matches!(effects.as_slice(), [PresenceEffect::AnswerLock(_)]));
        assert_eq!(a.lock_holder(&n("n1")), Some(&u("A")));

        let mut c = store("C");
        c.apply(&lock("A", "n1", 10_000), 11_000);
        assert!(c.apply(&lock("B", "n1", 1_000), 60_000).is_empty());
        assert_eq!(c.lock_holder(&n("n1")), Some(&u("A")));
    }

    #[test]
    fn bystander_keeps_first_holder_silently() {
        let mut store = store("C");
        store.apply(&lock("B", "n1", 200), 2_000);
        let effects = store.apply(&lock("A", "n1", 100), 2_001);

        assert!(effects.is_empty());
        assert_eq!(store.lock_holder(&n("n1")), Some(&u("B")));
    }

    #[test]
    fn uncontested_requester_always_yields() {
        // C already held n1 when B, unaware, asked for it.
        let mut b = store("B");
        b.claim_local(&n("n1"), 500);

        let effects = b.apply(&answer("C", Some("B"), "n1"), 3_000);

        assert_eq!(
            effects,
            vec![PresenceEffect::LockDenied {
                node_id: n("n1"),
                locked_by: u("C")
            }]
        );
        assert_eq!(b.lock_holder(&n("n1")), Some(&u("C")));
    }

    #[test]
    fn crossing_claims_go_to_the_smaller_id() {
        // Both claimed n1 before seeing the other's lock.
        let mut a = store("A");
        a.claim_local(&n("n1"), 900);
        let mut b = store("B");
        b.claim_local(&n("n1"), 100);

        assert!(matches!(
            a.apply(&lock("B", "n1", 100), 2_000).as_slice(),
            [PresenceEffect::AnswerLock(_)]
        ));
        assert!(matches!(
            b.apply(&lock("A", "n1", 900), 2_000).as_slice(),
            [PresenceEffect::AnswerLock(_)]
        ));

        assert!(a.apply(&answer("B", Some("A"), "n1"), 2_001).is_empty());
        assert_eq!(
            b.apply(&answer("A", Some("B"), "n1"), 2_001),
            vec![PresenceEffect::LockLost {
                node_id: n("n1"),
                locked_by: u("A")
            }]
        );

        assert_eq!(a.lock_holder(&n("n1")), Some(&u("A")));
        assert_eq!(b.lock_holder(&n("n1")), Some(&u("A")));
    }

    #[test]
    fn bystanders_converge_on_crossing_claims_in_any_order() {
        let crossing = [
            lock("B", "n1", 100),
            lock("A", "n1", 900),
            answer("B", Some("A"), "n1"),
            answer("A", Some("B"), "n1"),
        ];
        let orders: [[usize; 4]; 4] = [[0, 1, 2, 3], [1, 0, 3, 2], [0, 2, 1, 3], [1, 3, 0, 2]];

        for order in orders {
            let mut c = store("C");
            for i in order {
                c.apply(&crossing[i], 2_000);
            }
            assert_eq!(c.lock_holder(&n("n1")), Some(&u("A")), "order {order:?}");
        }
    }

    #[test]
    fn unaddressed_answer_goes_to_the_local_claimant() {
        let mut b = store("B");
        b.claim_local(&n("n1"), 10);

        let effects = b.apply(&answer("C", None, "n1"), 2_000);
        assert!(matches!(effects.as_slice(), [PresenceEffect::LockDenied { .. }]));
        assert_eq!(b.lock_holder(&n("n1")), Some(&u("C")));

        let mut d = store("D");
        d.apply(&lock("B", "n2", 1), 1_000);
        assert!(d.apply(&answer("A", None, "n2"), 2_000).is_empty());
        assert_eq!(d.lock_holder(&n("n2")), Some(&u("B")));
    }

    #[test]
    fn relocking_own_node_keeps_original_claim() {
        let mut store = store("C");
        store.apply(&lock("A", "n1", 100), 2_000);
        store.apply(&lock("A", "n1", 500), 2_500);
        assert_eq!(store.claim(&n("n1")).unwrap().since, 2_000);
    }

    #[test]
    fn unlock_removes_regardless_of_sender() {
        let mut store = store("C");
        store.apply(&lock("A", "n1", 100), 2_000);
        store.apply(&unlock("B", "n1", 101), 2_001);
        assert!(store.lock_holder(&n("n1")).is_none());
    }

    #[test]
    fn unlock_then_relock_is_granted() {
        let mut a = store("A");
        a.claim_local(&n("n2"), 100);
        a.release(&n("n2"));

        let effects = a.apply(&lock("B", "n2", 300), 3_000);
        assert!(effects.is_empty());
        assert_eq!(a.lock_holder(&n("n2")), Some(&u("B")));
    }

    #[test]
    fn lock_map_never_has_two_holders() {
        let mut store = store("Z");
        let sequence = [
            lock("A", "n1", 5),
            lock("B", "n1", 3),
            lock("C", "n1", 9),
            unlock("A", "n1", 10),
            lock("C", "n1", 11),
            lock("A", "n2", 12),
            lock("B", "n2", 12),
        ];
        for message in &sequence {
            store.apply(message, 1_000);
            // A functional map: one holder per key by construction.
            assert!(store.locks().len() <= 2);
        }
        assert_eq!(store.lock_holder(&n("n1")), Some(&u("C")));
        assert_eq!(store.lock_holder(&n("n2")), Some(&u("A")));
    }

    #[test]
    fn stale_lock_persists_until_left() {
        let mut store = store("C");
        store.apply(&joined("A", 1), 1_000);
        store.apply(&lock("A", "n1", 2), 1_001);

        // A vanished without unlock: still locked.
        store.apply(&lock("B", "n1", 50), 1_050);
        assert_eq!(store.lock_holder(&n("n1")), Some(&u("A")));

        store.apply(&left("A", 60), 1_060);
        assert!(store.lock_holder(&n("n1")).is_none());
    }

    #[test]
    fn local_request_respects_other_holder() {
        let mut store = store("B");
        store.apply(&lock("A", "n1", 10), 1_000);

        assert_eq!(store.claim_local(&n("n1"), 20), LockRequest::HeldBy(u("A")));
        assert_eq!(store.claim_local(&n("n2"), 20), LockRequest::Granted);
        assert_eq!(store.claim_local(&n("n2"), 30), LockRequest::AlreadyHeld);
        assert!(!store.is_locked_by_other(&n("n2")));
        assert_eq!(store.local_locks(), vec![n("n2")]);
    }

    // ===========================================
    // Snapshots
    // ===========================================

    fn sync_from(from: &str, users: &[&str], locks: &[(&str, &str)]) -> Message {
        let snapshot = SyncSnapshot {
            users: users
                .iter()
                .map(|id| UserInfo::new(*id, id.to_lowercase()))
                .collect(),
            locks: locks.iter().map(|(node, holder)| (n(node), u(holder))).collect(),
        };
        msg(from, 500, Payload::Sync(snapshot))
    }

    #[test]
    fn snapshot_adds_users_and_locks() {
        let mut store = store("C");
        let effects = store.apply(&sync_from("A", &["A", "B", "C"], &[("n1", "A")]), 2_000);

        assert!(effects.contains(&PresenceEffect::UserJoined {
            user_id: u("B"),
            newly_present: true
        }));
        assert!(store.is_present(&u("A")));
        assert!(store.is_present(&u("B")));
        assert_eq!(store.lock_holder(&n("n1")), Some(&u("A")));
    }

    #[test]
    fn snapshot_built_before_a_join_keeps_the_joiner() {
        let mut b = store("B");
        b.apply(&joined("C", 1), 1_000);
        b.apply(&lock("C", "n4", 2), 1_001);

        // A answered an earlier join before it heard C.
        let effects = b.apply(&sync_from("A", &["A", "B"], &[]), 2_000);

        assert!(effects
            .iter()
            .all(|e| !matches!(e, PresenceEffect::UserLeft { .. })));
        assert!(b.is_present(&u("C")));
        assert_eq!(b.lock_holder(&n("n4")), Some(&u("C")));
    }

    #[test]
    fn snapshot_drops_releases_we_missed() {
        let mut c = store("C");
        c.apply(&joined("A", 1), 1_000);
        c.apply(&lock("A", "n1", 2), 1_001);

        c.apply(&sync_from("A", &["A", "C"], &[]), 2_000);
        assert!(c.lock_holder(&n("n1")).is_none());
    }

    #[test]
    fn snapshot_never_overrides_recorded_holders() {
        let mut store = store("C");
        store.claim_local(&n("n1"), 10);
        store.apply(&lock("B", "n2", 11), 1_000);

        store.apply(&sync_from("A", &["A", "B"], &[("n1", "A"), ("n2", "A")]), 2_000);

        assert_eq!(store.lock_holder(&n("n1")), Some(&u("C")));
        assert_eq!(store.lock_holder(&n("n2")), Some(&u("B")));
    }

    #[test]
    fn smallest_present_member_answers_joins() {
        let mut a = store("A");
        a.apply(&joined("B", 1), 1_000);
        assert!(a.should_answer_join(&u("C")));

        let mut b = store("B");
        b.apply(&joined("A", 1), 1_000);
        assert!(!b.should_answer_join(&u("C")));
        // A is the joiner, so B is the smallest remaining member.
        assert!(b.should_answer_join(&u("A")));
    }

    #[test]
    fn snapshot_lists_everyone_with_colors() {
        let mut store = store("A");
        store.apply(&joined("B", 1), 1_000);
        store.claim_local(&n("n1"), 5);

        let snapshot = store.snapshot();
        assert_eq!(snapshot.users.len(), 2);
        assert!(snapshot.users.iter().all(|u| u.color.is_some()));
        assert_eq!(snapshot.locks.get(&n("n1")), Some(&u("A")));
    }

    #[test]
    fn reset_keeps_only_local_user() {
        let mut store = store("A");
        store.apply(&joined("B", 1), 1_000);
        store.claim_local(&n("n1"), 5);

        store.reset();
        assert_eq!(store.len(), 1);
        assert!(store.locks().is_empty());
    }
}
