//! Async service wrappers shared by sessions.

mod local_store;

pub use local_store::LocalStore;
