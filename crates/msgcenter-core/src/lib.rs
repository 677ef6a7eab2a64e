//! # msgcenter-core
//!
//! Core logic for the message center inbox.
//!
//! This crate provides:
//! - Domain models (conversations, messages, participants)
//! - Configuration
//! - Session-scoped key/value storage (`SQLite`)
//! - The persistence backend contract and its session-storage implementation,
//!   with simulated latency and failure injection
//! - **Optimistic Store** - instant local mutations with per-conversation
//!   rollback, timeouts and toasts

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod backend;
pub mod config;
mod error;
pub mod model;
pub mod storage;
pub mod store;

pub use backend::{
    BackendError, BackendOperation, BackendResult, FailureInjector, MailBackend, SessionBackend,
    seed_conversations,
};
pub use config::{Config, SimulationConfig, StoreConfig};
pub use error::{Error, Result};
pub use model::{
    Attachment, AttachmentKind, Conversation, ConversationId, Message, MessageId, Participant,
};
pub use storage::SessionStorage;
pub use store::{
    Failure, OperationKind, OptimisticStore, Outcome, StoreError, StoreResult, Toast, ToastKind,
};
