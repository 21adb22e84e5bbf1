//! Lead Relay — bridges an inbound mailbox to the lead automation pipeline.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod extract;
pub mod mail;
pub mod resolver;
pub mod store;
pub mod watcher;
