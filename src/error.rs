//! Error types for the crate.
use std::io::ErrorKind;

use bytes::Bytes;
use num_derive::FromPrimitive;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Error from the underlying socket.
    #[error("IoError {0:?}")]
    IoError(ErrorKind),

    /// The peer closed the connection while requests were still pending.
    #[error("Connection closed by broker")]
    ConnectionClosed,

    /// Error code returned in a Kafka response.
    #[error("Kafka error code {0:?}")]
    KafkaError(KafkaCode),

    /// A response could not be parsed.
    #[error("Failed parsing response bytes {0:?}")]
    ParsingError(Bytes),

    /// A value did not fit into its wire representation.
    #[error("Failed encoding request")]
    EncodingError,

    /// Bytes that should be UTF-8 were not.
    #[error("Failed decoding UTF8")]
    DecodingUtf8Error,

    /// A response arrived whose correlation id does not match the
    /// request at the head of the in-flight queue.
    #[error("Correlation mismatch, expected {expected} got {got}")]
    CorrelationMismatch { expected: i32, got: i32 },

    /// The request did not complete within its deadline.
    #[error("Request timed out")]
    TimedOut,

    /// The cluster metadata has no leader for the topic partition.
    #[error("No leader for topic {0} partition {1}")]
    NoLeaderForTopicPartition(String, i32),

    /// No connection is held for the given broker id.
    #[error("No connection for broker {0}")]
    NoConnectionForBroker(i32),

    /// The local metadata view is out of date and must be refreshed.
    #[error("Cluster metadata needs to be synced")]
    MetadataNeedsSync,

    /// No broker would return a coordinator for the group.
    #[error("No coordinator found for group {0}")]
    NoCoordinatorForGroup(String),

    /// The consumed offset is outside the broker's log range.
    #[error("Offset out of range, requested {requested} for partition {partition}")]
    OffsetOutOfRange { partition: i32, requested: i64 },

    /// Error from the coordination store.
    #[error("Coordination store error: {0}")]
    CoordinationError(String),

    /// The coordination-store session expired or the lock was taken.
    #[error("Coordination lock lost")]
    LockLost,

    /// The requested assignment strategy is not supported.
    #[error("Assignment strategy {0} not supported")]
    AssignmentStrategyNotSupported(String),

    /// The component is shutting down.
    #[error("Shutting down")]
    Shutdown,

    /// Invariant violation that is a bug in this crate.
    #[error("Internal error: {0}")]
    Internal(&'static str),
}

/// Error codes defined by the Kafka 0.8 protocol.
///
/// Numeric codes appear in responses; anything we do not recognize
/// surfaces as [`KafkaCode::Unknown`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, FromPrimitive)]
pub enum KafkaCode {
    /// -1: An unexpected server error, or a code this client does not know.
    #[default]
    Unknown = -1,
    /// 0: No error.
    None = 0,
    /// 1: The requested offset is outside the range of offsets
    /// maintained by the server for the given topic partition.
    OffsetOutOfRange = 1,
    /// 2: A message failed its CRC check.
    CorruptMessage = 2,
    /// 3: The topic or partition does not exist on this broker.
    UnknownTopicOrPartition = 3,
    /// 4: The requested fetch size is negative.
    InvalidFetchSize = 4,
    /// 5: There is no leader for this partition, leader election is
    /// in progress.
    LeaderNotAvailable = 5,
    /// 6: This broker is not the leader for the partition.
    NotLeaderForPartition = 6,
    /// 7: The request exceeded the user-specified time limit.
    RequestTimedOut = 7,
    /// 8: The broker is not available.
    BrokerNotAvailable = 8,
    /// 9: The replica is not available for the requested partition.
    ReplicaNotAvailable = 9,
    /// 10: The message is larger than the broker will accept.
    MessageSizeTooLarge = 10,
    /// 11: An internal broker error during controlled shutdown.
    StaleControllerEpoch = 11,
    /// 12: The committed metadata string is too large.
    OffsetMetadataTooLarge = 12,
    /// 14: The coordinator is still loading offsets.
    OffsetsLoadInProgress = 14,
    /// 15: The group coordinator is not yet available.
    ConsumerCoordinatorNotAvailable = 15,
    /// 16: This broker is not the coordinator for the group.
    NotCoordinatorForConsumer = 16,
    /// 22: The generation id in the request is stale.
    IllegalGeneration = 22,
    /// 25: The coordinator does not recognize the member id.
    UnknownMemberId = 25,
    /// 26: The session timeout is outside the allowed range.
    InvalidSessionTimeout = 26,
    /// 27: The group is rebalancing; members must rejoin.
    RebalanceInProgress = 27,
}

impl KafkaCode {
    /// Errors that mean the cached leader for a partition is stale and a
    /// metadata refresh plus retry is the right recovery.
    pub fn is_leader_error(self) -> bool {
        matches!(
            self,
            KafkaCode::NotLeaderForPartition
                | KafkaCode::LeaderNotAvailable
                | KafkaCode::UnknownTopicOrPartition
        )
    }
}

#[cfg(test)]
mod test {
    use num_traits::FromPrimitive;

    use super::*;

    #[test]
    fn codes_map_from_wire_values() {
        assert_eq!(KafkaCode::from_i16(0), Some(KafkaCode::None));
        assert_eq!(KafkaCode::from_i16(3), Some(KafkaCode::UnknownTopicOrPartition));
        assert_eq!(KafkaCode::from_i16(6), Some(KafkaCode::NotLeaderForPartition));
        assert_eq!(KafkaCode::from_i16(16), Some(KafkaCode::NotCoordinatorForConsumer));
        // unrecognized codes fall back to Unknown at the parse site
        assert_eq!(KafkaCode::from_i16(9999), None);
    }

    #[test]
    fn leader_errors() {
        assert!(KafkaCode::NotLeaderForPartition.is_leader_error());
        assert!(KafkaCode::LeaderNotAvailable.is_leader_error());
        assert!(KafkaCode::UnknownTopicOrPartition.is_leader_error());
        assert!(!KafkaCode::RequestTimedOut.is_leader_error());
        assert!(!KafkaCode::None.is_leader_error());
    }
}
