//! Channel-to-channel message relay.
//!
//! New messages from a route's source chat are queued on a bounded
//! [`DispatchQueue`] and forwarded by a worker pool through the
//! [`SendPipeline`] (filters, reply linking, chunking, retry). Edits and
//! deletions follow the source → copy mapping kept in [`MappingStore`].
//! Routes live in a [`RouteTable`] persisted through a [`RouteStore`], and
//! are managed with the owner-scoped commands in [`admin`].

pub mod admin;
pub mod error;
pub mod job;
pub mod lifecycle;
#[cfg(feature = "metrics")]
pub mod metrics;
pub mod notify;
pub mod pipeline;
pub mod queue;
pub mod report;
pub mod retry;
pub mod routes;
pub mod service;
pub mod stats;
pub mod store;
pub mod store_file;
pub mod store_memory;
mod watchdog;
mod worker;
pub mod xref;

pub use {
    admin::{AdminCommand, Listing, ParseError},
    error::{Error, Result},
    job::ForwardJob,
    lifecycle::EditOutcome,
    notify::Notifier,
    pipeline::{SendOutcome, SendPipeline},
    queue::DispatchQueue,
    retry::{RetryError, RetryPolicy},
    routes::{Route, RouteEntry, RouteMap, RouteMutation, RouteTable},
    service::{Relay, RelayHandle},
    stats::RouteStats,
    store::RouteStore,
    store_file::FileRouteStore,
    store_memory::MemoryRouteStore,
    xref::{CopyRef, MappingStore, SourceRef},
};
