//! Context store implementations for Drafthorse.

pub mod in_memory;
pub mod noop;
pub mod redis_store;

pub use in_memory::InMemoryContextStore;
pub use noop::NullContextStore;
pub use redis_store::RedisContextStore;
