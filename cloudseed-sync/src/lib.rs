//! # cloudseed-sync
//!
//! Keeps local entities synchronized with a multi-writer remote record store.
//!
//! Writes go through [`save::save_record`], gated by a [`SyncConnection`]
//! that tracks offline and cooldown state. Failures are mapped by
//! [`classifier::classify`]; retryable ones are queued on the entity by
//! [`deferred::save_entity`] and replayed by [`deferred::sweep_pending`].
//! [`reload::reload`] pulls remote changes back in. [`CloudSync`] bundles all
//! of it behind one handle.

pub mod classifier;
pub mod client;
pub mod completion;
pub mod connection;
pub mod deferred;
pub mod doc_store;
pub mod document;
pub mod error;
pub mod memory;
pub mod query;
pub mod reload;
pub mod remote;
pub mod save;
pub mod version;

pub use classifier::{classify, RecoveryAction};
pub use client::CloudSync;
pub use completion::{write_completion, PendingWrite, WriteCompletion, WriteFailure};
pub use connection::{ConnectionSnapshot, ConnectionStatus, SyncConnection};
pub use deferred::{DeferredSavable, SaveOutcome, SweepReport};
pub use doc_store::DocumentStore;
pub use document::SyncedDocument;
pub use error::{ErrorKind, SyncError};
pub use memory::InMemoryStore;
pub use query::{Predicate, Query, QueryCursor, QueryPager, SortDescriptor};
pub use reload::ReloadOutcome;
pub use remote::{FetchResults, QueryPage, RemoteStore};
pub use save::{resolve_with, ConflictResolution, ConflictResolver, IgnoreConflicts, PreferNewer};
pub use version::{NewerRecord, SyncedEntity};
