//! Case-system infrastructure adapter.
//!
//! Implements [`reconciler::CaseSystemGateway`] over the case system's REST
//! API using `reqwest`.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** This crate must not contain domain rules. Payload
//! shapes, memo names, and HTTP status handling live here; the
//! [`reconciler`] crate never sees them.
//!
//! Raw memo text is returned as stored (usually HTML). Flattening to plain
//! text is a content rule and happens in the engine.

pub mod client;
pub mod payload;

pub use client::{CaseSystemClient, CaseSystemConfig};
pub use payload::{PobLink, PobMemo, PobPayload};
