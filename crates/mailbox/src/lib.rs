//! Mailbox transport implementations for Drafthorse.
//!
//! The production transport is a Redis Streams consumer group: durable,
//! ordered, with per-entry pending tracking that survives consumer crashes.

pub mod redis_streams;

pub use redis_streams::{MailboxSettings, RedisMailbox};
