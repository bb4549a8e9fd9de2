//! # roofdesk-core
//!
//! Mailbox mirroring engine for the roofdesk dashboard.
//!
//! This crate provides:
//! - **Mailbox contract** - the [`MailboxService`] capability consumed from a remote protocol client
//! - **Field resolution** - best-effort sender/body/subject recovery from raw payloads
//! - **Local storage** - `SQLite` mirror of users, folders, messages and recipients
//! - **Read cache** - TTL key-value cache in front of list and detail reads
//! - **Job coordination** - per-key sync deduplication and a bounded background runner
//! - **Sync orchestration** - incremental/full folder sync with batching
//! - **Desk service** - list, detail, mark-read, sync-trigger and sender repair

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod cache;
pub mod config;
mod error;
pub mod jobs;
pub mod mailbox;
pub mod resolve;
pub mod service;
pub mod store;
pub mod sync;

pub use cache::{
    CacheError, DisabledKvStore, KvStore, ListSnapshot, MailCache, MemoryKvStore, SqliteKvStore,
};
pub use config::{
    CacheBackend, CacheConfig, DeskConfig, ResolverConfig, SyncConfig, UserProvisioning,
};
pub use error::{Error, Result};
pub use jobs::{BackgroundRunner, JobCoordinator, JobGuard, JobKey};
pub use mailbox::{
    Importance, MailboxAddress, MailboxError, MailboxService, MessageDetail, MessageSummary,
    WellKnownFolder,
};
pub use resolve::{BodySource, Resolution, ResolvedBody, ResolvedSender, Resolver, SenderSource};
pub use service::{
    DeskResources, ListQuery, MailDesk, MessagePage, SyncReport, SyncTarget, SyncTrigger,
};
pub use store::{
    FolderId, FolderRecord, MailStore, MessageId, MessageListItem, MessageRecord, ReadFlagPolicy,
    Recipient, RecipientKind, StoredMessage, UserId,
};
pub use sync::{FolderSyncResult, SyncAllReport, SyncOrchestrator, SyncOutcome};
