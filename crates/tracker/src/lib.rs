//! Issue-tracker infrastructure adapter.
//!
//! Implements [`reconciler::IssueTrackerGateway`] over a Jira-compatible REST
//! (v2) API using `reqwest`.
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`cache`] | [`MetadataCache`], TTL-bounded lookups owned by the client |
//! | [`client`] | [`TrackerClient`] and its [`TrackerConfig`] |
//! | [`wire`] | Request/response bodies and timestamp parsing |
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** Field names, endpoint paths, and the tracker's
//! timestamp format stay in this crate.

pub mod cache;
pub mod client;
pub mod wire;

pub use cache::MetadataCache;
pub use client::{TrackerClient, TrackerConfig};
