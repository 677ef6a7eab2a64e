//! Session-scoped key/value storage.
//!
//! The backend keeps its records here as JSON strings. The in-memory variant
//! disappears with the process, which is the session lifetime the inbox demo
//! expects.

mod repository;

pub use repository::SessionStorage;
