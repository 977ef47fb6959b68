//! Messaging infrastructure adapter.
//!
//! Implements [`reconciler::NotificationGateway`] by posting chat messages
//! through the messaging service (`POST {url}/{tenant}/slack`).

pub mod client;

pub use client::{NotifierClient, NotifierConfig, SlackRequest};
