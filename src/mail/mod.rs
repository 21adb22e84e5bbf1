//! Mailbox access — the message model and the IMAP transport.

pub mod imap;
pub mod message;

pub use imap::ImapSource;
pub use message::{Attachment, InboundMessage};
