//! Conclave — the group membership and chat engine behind a social network
//! for security researchers.
//!
//! The crate is UI- and transport-agnostic: it owns the group collection
//! (creation, public/private visibility with invite-code gating, role
//! promotion/demotion, member add/remove, append-only chat and post logs)
//! and talks to the outside world through three seams:
//!
//! - [`SnapshotStore`] — a blob store the full collection is flushed to
//! - [`Clock`] — the time source for timestamps and ordering
//! - [`UserDirectory`] — read-only display-name lookup for system messages
//!
//! All operations take the acting user's id explicitly; there is no ambient
//! "current user".

pub mod clock;
pub mod config;
pub mod directory;
pub mod errors;
pub mod models;
pub mod storage;
pub mod store;

pub use clock::{Clock, SystemClock};
pub use config::StoreConfig;
pub use directory::{StaticDirectory, UserDirectory};
pub use errors::{GroupError, GroupResult};
pub use models::{
    Appearance, Group, GroupCollection, GroupFilter, GroupUpdate, Message, MessageKind,
    NewMessage, Post, Theme, Visibility, SYSTEM_SENDER,
};
pub use storage::SnapshotStore;
pub use store::GroupStore;
