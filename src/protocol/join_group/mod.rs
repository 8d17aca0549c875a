//! Become a member of a group through the broker-native protocol.
//!
//! This client coordinates group membership through an external
//! coordination store; the native join-group API is carried as an
//! alternative coordinator surface. When a member first joins, its
//! member id is empty and the coordinator assigns one; a rejoining
//! member reuses the id from the previous generation.

pub mod request;
pub mod response;
