//! In-memory [`LockStore`](warden_lock::LockStore) for tests and
//! single-process use.
//!
//! Behaves like a single Redis instance for the lock protocol's purposes and
//! can be switched offline or slowed down to exercise failure handling.

mod store;

pub use store::MemoryLockStore;
