//! The coordination store behind consumer-group membership.
//!
//! Group coordination needs a strongly consistent key/value service
//! with distributed locks and ephemeral sessions (ZooKeeper, Consul and
//! friends). Which one is a deployment choice, so the client only
//! depends on this contract; [`memory::MemoryStore`] implements it
//! in-process for tests and local development.
//!
//! Everything ephemeral hangs off a session: locks and keys written
//! under a session vanish when the session's TTL lapses without
//! renewal, which is what turns a crashed member's ownership into a
//! rebalance instead of a wedged group.

use std::fmt::Debug;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;

pub mod memory;

/// An ephemeral session token. Expiry releases all locks and ephemeral
/// keys held under it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(pub u64);

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Active,
    Expired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockStatus {
    Acquired,
    HeldByOther,
}

/// A change notification from a watch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    /// The store index of the newest change under the watched prefix.
    /// Pass it back as `from_index` to wait for the next change.
    pub index: u64,
}

/// Contract the consumer coordinator requires of a store.
#[async_trait]
pub trait CoordinationStore: Debug + Send + Sync + 'static {
    /// Open a session that must be renewed within `ttl`.
    async fn session_create(&self, ttl: Duration) -> Result<SessionId>;

    /// Extend the session's lease by its TTL.
    async fn session_renew(&self, session: SessionId) -> Result<SessionStatus>;

    /// Try to take the lock at `path` under a session. Does not block.
    async fn lock_acquire(&self, path: &str, session: SessionId) -> Result<LockStatus>;

    /// Give the lock back. Releasing a lock held by someone else is a
    /// coordination error.
    async fn lock_release(&self, path: &str, session: SessionId) -> Result<()>;

    /// Write a key; with a session the key is ephemeral and follows the
    /// session's lifetime.
    async fn kv_put(&self, path: &str, value: Bytes, session: Option<SessionId>) -> Result<()>;

    async fn kv_get(&self, path: &str) -> Result<Option<Bytes>>;

    async fn kv_delete(&self, path: &str) -> Result<()>;

    /// Keys under a prefix, sorted. The store has no real directories;
    /// a prefix scan is how member lists are read.
    async fn kv_list(&self, prefix: &str) -> Result<Vec<String>>;

    /// Long-poll until something under `prefix` changes past
    /// `from_index`. `from_index = 0` reports the current state
    /// immediately if the prefix has ever been written.
    async fn watch(&self, prefix: &str, from_index: u64) -> Result<WatchEvent>;
}

/// Key layout for one consumer group's coordination state.
pub mod paths {
    /// The group-wide leader lock; its holder computes assignments.
    pub fn leader(prefix: &str, group: &str) -> String {
        format!("{}/{}/leader", prefix, group)
    }

    /// Directory of ephemeral member registrations.
    pub fn members(prefix: &str, group: &str) -> String {
        format!("{}/{}/members/", prefix, group)
    }

    /// One member's registration key.
    pub fn member(prefix: &str, group: &str, member_id: &str) -> String {
        format!("{}/{}/members/{}", prefix, group, member_id)
    }

    /// Where a member's published assignment lives.
    pub fn assignment(prefix: &str, group: &str, member_id: &str) -> String {
        format!("{}/{}/assignments/{}", prefix, group, member_id)
    }

    /// Extract the member id back out of a members-directory key.
    pub fn member_id_of(members_dir: &str, key: &str) -> Option<String> {
        key.strip_prefix(members_dir).map(str::to_string)
    }

}
