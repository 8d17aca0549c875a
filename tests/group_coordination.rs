//! Group coordination against the in-process store: election,
//! assignment publication, and the partition-exclusivity invariant,
//! exercised exactly the way the group driver drives them.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use franz::prelude::*;

const PREFIX: &str = "/franz-test";
const GROUP: &str = "we";
const TTL: Duration = Duration::from_secs(10);

async fn register(store: &MemoryStore, member: &str) -> Result<SessionId> {
    let session = store.session_create(TTL).await?;
    store
        .kv_put(
            &paths::member(PREFIX, GROUP, member),
            Bytes::from(member.to_string()),
            Some(session),
        )
        .await?;
    Ok(session)
}

async fn member_ids(store: &MemoryStore) -> Result<Vec<String>> {
    let dir = paths::members(PREFIX, GROUP);
    Ok(store
        .kv_list(&dir)
        .await?
        .iter()
        .filter_map(|key| paths::member_id_of(&dir, key))
        .collect())
}

#[tokio::test]
async fn one_leader_assigns_and_everyone_reads() -> Result<()> {
    let store = Arc::new(MemoryStore::new());

    let s1 = register(&store, "m1").await?;
    let s2 = register(&store, "m2").await?;
    let s3 = register(&store, "m3").await?;

    // exactly one member wins the election
    let lock = paths::leader(PREFIX, GROUP);
    assert_eq!(store.lock_acquire(&lock, s1).await?, LockStatus::Acquired);
    assert_eq!(store.lock_acquire(&lock, s2).await?, LockStatus::HeldByOther);
    assert_eq!(store.lock_acquire(&lock, s3).await?, LockStatus::HeldByOther);

    // the leader reads the member list and publishes assignments
    let members = member_ids(&store).await?;
    assert_eq!(members, vec!["m1", "m2", "m3"]);

    let partitions = vec![0, 1, 2, 3];
    let assignments = assign(ROUND_ROBIN_STRATEGY, &members, &partitions)?;
    for (member, owned) in &assignments {
        let serialized = owned
            .iter()
            .map(i32::to_string)
            .collect::<Vec<_>>()
            .join(",");
        store
            .kv_put(
                &paths::assignment(PREFIX, GROUP, member),
                Bytes::from(serialized),
                Some(s1),
            )
            .await?;
    }

    // every member reads its own assignment back
    let mut union = HashSet::new();
    for member in &members {
        let raw = store
            .kv_get(&paths::assignment(PREFIX, GROUP, member))
            .await?
            .expect("assignment published");
        let owned: Vec<i32> = std::str::from_utf8(&raw)
            .unwrap()
            .split(',')
            .filter(|p| !p.is_empty())
            .map(|p| p.parse().unwrap())
            .collect();

        // exclusivity: nothing this member owns is owned elsewhere
        for partition in &owned {
            assert!(union.insert(*partition), "partition {} owned twice", partition);
        }
    }

    // completeness: the union is the full partition set
    let expected: HashSet<i32> = partitions.into_iter().collect();
    assert_eq!(union, expected);

    Ok(())
}

#[tokio::test]
async fn the_documented_rebalance_shape() -> Result<()> {
    // 3 members, 4 partitions: m1 gets {0,3}, m2 {1}, m3 {2}
    let members = vec![
        String::from("m1"),
        String::from("m2"),
        String::from("m3"),
    ];
    let assignments = round_robin(&members, &[0, 1, 2, 3]);

    assert_eq!(assignments.get("m1").unwrap(), &vec![0, 3]);
    assert_eq!(assignments.get("m2").unwrap(), &vec![1]);
    assert_eq!(assignments.get("m3").unwrap(), &vec![2]);
    Ok(())
}

#[tokio::test]
async fn a_member_leaving_wakes_the_watchers() -> Result<()> {
    let store = Arc::new(MemoryStore::new());

    let _s1 = register(&store, "m1").await?;
    let s2 = register(&store, "m2").await?;

    let dir = paths::members(PREFIX, GROUP);
    let seen = store.watch(&dir, 0).await?.index;

    // m2 departs gracefully
    store
        .kv_delete(&paths::member(PREFIX, GROUP, "m2"))
        .await?;
    drop(s2);

    let event = tokio::time::timeout(Duration::from_secs(1), store.watch(&dir, seen))
        .await
        .expect("watch must fire on departure")?;
    assert!(event.index > seen);

    assert_eq!(member_ids(&store).await?, vec!["m1"]);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn a_crashed_member_expires_out_of_the_group() -> Result<()> {
    let store = Arc::new(MemoryStore::new());

    let s1 = register(&store, "m1").await?;
    let _s2 = register(&store, "m2").await?;

    let lock = paths::leader(PREFIX, GROUP);
    assert_eq!(store.lock_acquire(&lock, s1).await?, LockStatus::Acquired);

    // m1 stops renewing; m2 keeps its session alive
    for _ in 0..3 {
        tokio::time::advance(Duration::from_secs(5)).await;
        store.session_renew(_s2).await?;
    }

    // m1's registration and lock are gone
    assert_eq!(member_ids(&store).await?, vec!["m2"]);
    assert_eq!(store.lock_acquire(&lock, _s2).await?, LockStatus::Acquired);

    Ok(())
}
