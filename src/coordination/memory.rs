//! In-process coordination store.
//!
//! Implements the full [`CoordinationStore`] contract against local
//! state: single-writer lock table, session TTLs measured on the tokio
//! clock, and watches driven by a notification broadcast. Used by the
//! test suite and by single-process deployments that do not want an
//! external store.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;

use super::{CoordinationStore, LockStatus, SessionId, SessionStatus, WatchEvent};
use crate::error::{Error, Result};

#[derive(Debug)]
struct Session {
    ttl: Duration,
    expires_at: Instant,
}

#[derive(Debug)]
struct Entry {
    value: Bytes,
    session: Option<SessionId>,
}

#[derive(Debug, Default)]
struct State {
    sessions: HashMap<SessionId, Session>,
    locks: HashMap<String, SessionId>,
    kv: HashMap<String, Entry>,
    /// Last-change index per path, kept across deletes so watches see
    /// removals too.
    changes: HashMap<String, u64>,
    index: u64,
    next_session: u64,
}

impl State {
    fn touch(&mut self, path: &str) {
        self.index += 1;
        self.changes.insert(path.to_string(), self.index);
    }

    fn session_alive(&self, session: SessionId, now: Instant) -> bool {
        self.sessions
            .get(&session)
            .map(|s| s.expires_at > now)
            .unwrap_or(false)
    }

    /// Lazily reap expired sessions: their locks and ephemeral keys go
    /// away as one change.
    fn expire(&mut self, now: Instant) -> bool {
        let dead: Vec<SessionId> = self
            .sessions
            .iter()
            .filter(|(_, s)| s.expires_at <= now)
            .map(|(id, _)| *id)
            .collect();

        for session in dead.iter() {
            tracing::debug!("Session {} expired", session);
            self.sessions.remove(session);

            let held: Vec<String> = self
                .locks
                .iter()
                .filter(|(_, holder)| **holder == *session)
                .map(|(path, _)| path.clone())
                .collect();
            for path in held {
                self.locks.remove(&path);
                self.touch(&path);
            }

            let ephemeral: Vec<String> = self
                .kv
                .iter()
                .filter(|(_, entry)| entry.session == Some(*session))
                .map(|(path, _)| path.clone())
                .collect();
            for path in ephemeral {
                self.kv.remove(&path);
                self.touch(&path);
            }
        }

        !dead.is_empty()
    }

    fn latest_change_under(&self, prefix: &str) -> u64 {
        self.changes
            .iter()
            .filter(|(path, _)| path.starts_with(prefix))
            .map(|(_, index)| *index)
            .max()
            .unwrap_or(0)
    }
}

/// The in-process store. Cheap to clone; clones share state.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
    changed: Arc<Notify>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn with_state<R>(&self, f: impl FnOnce(&mut State) -> R) -> R {
        let mut state = self.state.lock().await;
        if state.expire(Instant::now()) {
            self.changed.notify_waiters();
        }
        f(&mut state)
    }
}

#[async_trait]
impl CoordinationStore for MemoryStore {
    async fn session_create(&self, ttl: Duration) -> Result<SessionId> {
        self.with_state(|state| {
            state.next_session += 1;
            let id = SessionId(state.next_session);
            state.sessions.insert(
                id,
                Session {
                    ttl,
                    expires_at: Instant::now() + ttl,
                },
            );
            tracing::debug!("Created {} with ttl {:?}", id, ttl);
            Ok(id)
        })
        .await
    }

    async fn session_renew(&self, session: SessionId) -> Result<SessionStatus> {
        self.with_state(|state| {
            let now = Instant::now();
            match state.sessions.get_mut(&session) {
                Some(s) if s.expires_at > now => {
                    s.expires_at = now + s.ttl;
                    Ok(SessionStatus::Active)
                }
                _ => Ok(SessionStatus::Expired),
            }
        })
        .await
    }

    async fn lock_acquire(&self, path: &str, session: SessionId) -> Result<LockStatus> {
        let (status, changed) = self
            .with_state(|state| {
                if !state.session_alive(session, Instant::now()) {
                    return Err(Error::LockLost);
                }
                match state.locks.get(path) {
                    Some(holder) if *holder == session => Ok((LockStatus::Acquired, false)),
                    Some(_) => Ok((LockStatus::HeldByOther, false)),
                    None => {
                        state.locks.insert(path.to_string(), session);
                        state.touch(path);
                        tracing::debug!("Lock {} acquired by {}", path, session);
                        Ok((LockStatus::Acquired, true))
                    }
                }
            })
            .await?;

        if changed {
            self.changed.notify_waiters();
        }
        Ok(status)
    }

    async fn lock_release(&self, path: &str, session: SessionId) -> Result<()> {
        self.with_state(|state| match state.locks.get(path) {
            Some(holder) if *holder == session => {
                state.locks.remove(path);
                state.touch(path);
                Ok(())
            }
            Some(_) => Err(Error::CoordinationError(format!(
                "lock {} held by another session",
                path
            ))),
            None => Ok(()),
        })
        .await?;

        self.changed.notify_waiters();
        Ok(())
    }

    async fn kv_put(&self, path: &str, value: Bytes, session: Option<SessionId>) -> Result<()> {
        self.with_state(|state| {
            if let Some(session) = session {
                if !state.session_alive(session, Instant::now()) {
                    return Err(Error::CoordinationError(format!(
                        "put under expired {}",
                        session
                    )));
                }
            }
            state.kv.insert(path.to_string(), Entry { value, session });
            state.touch(path);
            Ok(())
        })
        .await?;

        self.changed.notify_waiters();
        Ok(())
    }

    async fn kv_get(&self, path: &str) -> Result<Option<Bytes>> {
        self.with_state(|state| Ok(state.kv.get(path).map(|entry| entry.value.clone())))
            .await
    }

    async fn kv_delete(&self, path: &str) -> Result<()> {
        self.with_state(|state| {
            if state.kv.remove(path).is_some() {
                state.touch(path);
            }
            Ok(())
        })
        .await?;

        self.changed.notify_waiters();
        Ok(())
    }

    async fn kv_list(&self, prefix: &str) -> Result<Vec<String>> {
        self.with_state(|state| {
            let mut keys: Vec<String> = state
                .kv
                .keys()
                .filter(|path| path.starts_with(prefix))
                .cloned()
                .collect();
            keys.sort();
            Ok(keys)
        })
        .await
    }

    async fn watch(&self, prefix: &str, from_index: u64) -> Result<WatchEvent> {
        loop {
            // register interest before reading so a change between the
            // read and the await is not lost
            let notified = self.changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let latest = self
                .with_state(|state| state.latest_change_under(prefix))
                .await;
            if latest > from_index {
                return Ok(WatchEvent { index: latest });
            }

            notified.await;
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn lock_is_exclusive() {
        let store = MemoryStore::new();
        let ttl = Duration::from_secs(10);
        let s1 = store.session_create(ttl).await.unwrap();
        let s2 = store.session_create(ttl).await.unwrap();

        assert_eq!(
            store.lock_acquire("/g/leader", s1).await.unwrap(),
            LockStatus::Acquired
        );
        assert_eq!(
            store.lock_acquire("/g/leader", s2).await.unwrap(),
            LockStatus::HeldByOther
        );
        // reentrant for the holder
        assert_eq!(
            store.lock_acquire("/g/leader", s1).await.unwrap(),
            LockStatus::Acquired
        );

        store.lock_release("/g/leader", s1).await.unwrap();
        assert_eq!(
            store.lock_acquire("/g/leader", s2).await.unwrap(),
            LockStatus::Acquired
        );
    }

    #[tokio::test(start_paused = true)]
    async fn session_expiry_releases_everything() {
        let store = MemoryStore::new();
        let session = store.session_create(Duration::from_secs(10)).await.unwrap();

        store.lock_acquire("/g/leader", session).await.unwrap();
        store
            .kv_put("/g/members/m1", Bytes::from("m1"), Some(session))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(11)).await;

        assert_eq!(
            store.session_renew(session).await.unwrap(),
            SessionStatus::Expired
        );
        assert_eq!(store.kv_get("/g/members/m1").await.unwrap(), None);

        let other = store.session_create(Duration::from_secs(10)).await.unwrap();
        assert_eq!(
            store.lock_acquire("/g/leader", other).await.unwrap(),
            LockStatus::Acquired
        );
    }

    #[tokio::test(start_paused = true)]
    async fn renewal_keeps_the_session_alive() {
        let store = MemoryStore::new();
        let session = store.session_create(Duration::from_secs(10)).await.unwrap();

        for _ in 0..4 {
            tokio::time::advance(Duration::from_secs(5)).await;
            assert_eq!(
                store.session_renew(session).await.unwrap(),
                SessionStatus::Active
            );
        }
    }

    #[tokio::test]
    async fn list_is_sorted_and_scoped() {
        let store = MemoryStore::new();
        store
            .kv_put("/g/members/m2", Bytes::from("x"), None)
            .await
            .unwrap();
        store
            .kv_put("/g/members/m1", Bytes::from("x"), None)
            .await
            .unwrap();
        store
            .kv_put("/g/assignments/m1", Bytes::from("x"), None)
            .await
            .unwrap();

        assert_eq!(
            store.kv_list("/g/members/").await.unwrap(),
            vec![
                String::from("/g/members/m1"),
                String::from("/g/members/m2")
            ]
        );
    }

    #[tokio::test]
    async fn watch_sees_membership_changes() {
        let store = MemoryStore::new();
        store
            .kv_put("/g/members/m1", Bytes::from("m1"), None)
            .await
            .unwrap();

        let seen = store.watch("/g/members/", 0).await.unwrap();

        let watcher = {
            let store = store.clone();
            tokio::spawn(async move { store.watch("/g/members/", seen.index).await })
        };

        store
            .kv_put("/g/members/m2", Bytes::from("m2"), None)
            .await
            .unwrap();

        let event = watcher.await.unwrap().unwrap();
        assert!(event.index > seen.index);
    }

    #[tokio::test]
    async fn watch_does_not_fire_for_other_prefixes() {
        let store = MemoryStore::new();
        store
            .kv_put("/g/members/m1", Bytes::from("m1"), None)
            .await
            .unwrap();
        let seen = store.watch("/g/members/", 0).await.unwrap();

        store
            .kv_put("/other/members/m9", Bytes::from("x"), None)
            .await
            .unwrap();

        let waited = tokio::time::timeout(
            Duration::from_millis(50),
            store.watch("/g/members/", seen.index),
        )
        .await;
        assert!(waited.is_err());
    }
}
