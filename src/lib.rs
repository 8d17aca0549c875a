//! # Franz
//! Rust-native Kafka 0.8 protocol and client implementation.
//!
//! This crate speaks the Kafka binary protocol directly over TCP and
//! provides native producers and consumer groups on top of it; group
//! membership is coordinated through a pluggable strongly-consistent
//! store rather than the broker. Users benefit from Rust all the way
//! down: memory safety, safe concurrency, and low resource usage.
//!
//! ## Goals
//! - Easy to understand code
//! - Leverage best in class libraries such as Tokio and Nom to do the
//!   heavy lifting
//! - Provide a pure rust implementation of the Kafka 0.8 protocol
//! - Be a good building block for works based around Kafka
//!
//! ## Getting started
//!
//! ### Producer
//! A [`Producer`](prelude::Producer) sends messages to a topic. It is
//! batched: messages accumulate per leader broker until a linger bound
//! trips (count, bytes, or age), which is how latency and throughput
//! are traded against each other. Start with a
//! [`ProducerBuilder`](prelude::ProducerBuilder).
//!
//! ```no_run
//! # async fn example() -> franz::prelude::Result<()> {
//! use franz::prelude::*;
//!
//! let producer = ProducerBuilder::new(
//!     vec!["127.0.0.1:9092".to_string()],
//!     "my-topic".to_string(),
//! )
//! .await?
//! .required_acks(1)
//! .linger_ms(5)
//! .build();
//!
//! let (partition, offset) = producer
//!     .produce(ProduceMessage {
//!         key: Some(bytes::Bytes::from_static(b"Tester")),
//!         value: Some(bytes::Bytes::from_static(b"Value")),
//!         partition: None,
//!     })
//!     .await?;
//! # let _ = (partition, offset);
//! # Ok(())
//! # }
//! ```
//!
//! ### Consumer group
//! A [`ConsumerGroup`](prelude::ConsumerGroup) member owns a share of
//! the topic's partitions, negotiated with the other members through
//! the coordination store. Each owned partition gets a worker that
//! long-polls the partition leader and hands messages to your handler
//! in offset order; offsets are committed to the group's coordinator
//! broker automatically. Start with a
//! [`ConsumerGroupBuilder`](prelude::ConsumerGroupBuilder).
//!
//! ```no_run
//! # async fn example() -> franz::prelude::Result<()> {
//! use std::sync::Arc;
//! use franz::prelude::*;
//!
//! let store = Arc::new(MemoryStore::new());
//! let member = ConsumerGroupBuilder::new(
//!     vec!["127.0.0.1:9092".to_string()],
//!     "the-data-folks".to_string(),
//!     "my-topic".to_string(),
//!     store,
//!     Arc::new(|message: &ConsumeMessage| {
//!         println!("{:?}", message.value);
//!         HandlerDecision::Ack
//!     }),
//! )
//! .await?
//! .build();
//! # member.stop().await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Resources
//! - [Kafka Protocol Spec](https://kafka.apache.org/protocol.html)
//! - [A Guide to the Kafka Protocol](https://cwiki.apache.org/confluence/display/KAFKA/A+Guide+To+The+Kafka+Protocol)

mod assignor;
mod connection;
mod consumer;
mod consumer_builder;
mod consumer_group;
mod consumer_group_builder;
mod coordination;
mod encode;
mod error;
mod metadata;
mod network;
mod parser;
mod partitioner;
mod pool;
mod producer;
mod producer_builder;
mod protocol;
mod supervisor;
mod utils;

const DEFAULT_CLIENT_ID: &str = "franz";

pub mod prelude {
    //! Main export of the crate's structures and methods.
    //!
    //! The library breaks into three layers:
    //! - the managed clients ([`Producer`], [`ConsumerGroup`])
    //! - the connection plumbing ([`KafkaConnection`], [`ConnectionPool`],
    //!   [`ClusterMetadata`])
    //! - the raw protocol ([`protocol`] module and the free functions
    //!   such as [`produce`], [`fetch`], [`commit_offset`])
    //!
    //! Most applications only need the managed clients; the lower
    //! layers are exported for callers building their own machinery on
    //! the Kafka APIs directly.

    pub use crate::assignor::{assign, round_robin, ROUND_ROBIN_STRATEGY};
    pub use crate::connection::{KafkaConnection, ResponseSink, DEFAULT_REQUEST_TIMEOUT};
    pub use crate::consumer::{
        commit_offset, fetch, fetch_offset, list_offsets, ChannelHandler, ConsumeMessage,
        HandlerDecision, MessageHandler, OffsetResetPolicy, PartitionOffsets,
    };
    pub use crate::consumer_builder::{Consumer, ConsumerBuilder};
    pub use crate::consumer_group::{find_coordinator, heartbeat, join_group, ConsumerGroup};
    pub use crate::consumer_group_builder::ConsumerGroupBuilder;
    pub use crate::coordination::{
        memory::MemoryStore, paths, CoordinationStore, LockStatus, SessionId, SessionStatus,
        WatchEvent,
    };
    pub use crate::error::{Error, KafkaCode, Result};
    pub use crate::metadata::{ClusterMetadata, TopicPartitions};
    pub use crate::network::{tcp::TcpConnection, BrokerAddress, BrokerConnection};
    pub use crate::partitioner::{murmur2, Murmur2Partitioner, Partitioner};
    pub use crate::pool::{bootstrap, global_pool, ConnectionPool};
    pub use crate::producer::{produce, ProduceAck, ProduceMessage, Producer};
    pub use crate::producer_builder::ProducerBuilder;
    pub use crate::protocol::{Compression, Message, MessageSet, OffsetTime};
    pub use crate::supervisor::supervise;

    pub use bytes;

    pub mod encode {
        pub use crate::encode::*;
    }

    pub mod parser {
        pub use crate::parser::*;
    }

    pub mod protocol {
        pub use crate::protocol::*;
    }
}
