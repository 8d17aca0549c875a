mod testsupport;

use franz::prelude::*;

const CLIENT_ID: &str = "metadata integration test";

#[tokio::test]
async fn it_can_fetch_cluster_metadata() -> Result<()> {
    let (skip, brokers, topic) = testsupport::get_brokers_and_topic()?;
    if skip {
        return Ok(());
    }

    let addrs = brokers
        .iter()
        .map(|b| BrokerAddress::parse(b))
        .collect::<Result<Vec<_>>>()?;

    let metadata = ClusterMetadata::<TcpConnection>::new(
        ConnectionPool::new(),
        addrs,
        CLIENT_ID.to_string(),
        vec![topic.clone()],
    )
    .await?;

    assert!(!metadata.brokers.is_empty());
    let partitions = metadata.partitions_for_topic(&topic);
    assert!(!partitions.is_empty());

    // every partition resolves to a leader we can connect to
    for partition in partitions {
        let leader = metadata
            .get_leader_for_topic_partition(&topic, partition)
            .expect("metadata must name a leader");
        assert!(metadata.get_broker_by_id(leader).is_some());
        metadata.connection_for_leader(&topic, partition)?;
    }

    Ok(())
}

#[tokio::test]
async fn coordinator_discovery_answers() -> Result<()> {
    let (skip, brokers) = testsupport::get_brokers()?;
    if skip {
        return Ok(());
    }

    let addrs = brokers
        .iter()
        .map(|b| BrokerAddress::parse(b))
        .collect::<Result<Vec<_>>>()?;
    let conn = bootstrap(global_pool(), &addrs).await?;

    let response = find_coordinator(&conn, CLIENT_ID, "some-group").await?;
    if response.error_code == KafkaCode::None {
        assert!(!response.host.is_empty());
        assert!(response.port > 0);
    } else {
        // a fresh group's coordinator may still be electing
        assert_eq!(
            response.error_code,
            KafkaCode::ConsumerCoordinatorNotAvailable
        );
    }

    Ok(())
}
