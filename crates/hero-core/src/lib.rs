//! # Hero Core
//!
//! The collaborator interfaces the Hero framework is written against:
//!
//! - [`Gateway`]: the chat-platform connection (inbound events, outbound
//!   messages) together with the shared [`ConnectionMonitor`] that reports
//!   ready / disconnect / closed transitions.
//! - [`Store`]: persistence of per-extension settings and platform records,
//!   returning [`Lookup`] variants instead of "does not exist" errors.
//! - [`CacheBackend`]: namespaced key/value storage with optional TTL,
//!   usually accessed through the per-extension [`Cache`] handle.
//!
//! Nothing in this crate knows about extensions, cogs or commands; those live
//! in `hero-framework`.

pub mod cache;
pub mod connection;
pub mod error;
pub mod event;
pub mod gateway;
pub mod store;

pub use cache::{Cache, CacheBackend, MemoryCache};
pub use connection::{ConnectionMonitor, ConnectionState};
pub use error::{
    CacheError, CacheResult, GatewayError, GatewayResult, StoreError, StoreResult,
};
pub use event::{Author, GatewayEvent, MessagePayload, OutgoingMessage, names};
pub use gateway::{
    BoxedGateway, Dispatcher, EventSink, EventStream, Gateway, RecordingGateway,
};
pub use store::{
    GuildRecord, Lookup, MemoryStore, MessageRecord, Store, TextChannelRecord, UserRecord,
};
