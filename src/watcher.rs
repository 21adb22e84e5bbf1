//! Mailbox watcher — owns the mail connection and drives the
//! connect → poll → backoff state machine.
//!
//! Per-message problems (lookup failures, dispatch rejections, malformed
//! content) are logged and skipped; only connection-level errors move the
//! state machine. Reconnection is bounded — exhausting the attempt budget
//! is terminal.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use crate::dispatch::{DispatchContext, Dispatcher};
use crate::error::{Error, MailError};
use crate::extract;
use crate::mail::message::InboundMessage;
use crate::resolver::LeadResolver;

/// Connection lifecycle states. Exactly one message is processed at a
/// time while in `Polling`; there is no cross-message parallelism.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connected,
    Polling,
    Backoff,
    Exhausted,
}

/// Source of inbound mail. The IMAP implementation lives in
/// [`crate::mail::imap`]; tests inject scripted sources.
#[async_trait]
pub trait MailSource: Send {
    /// Authenticate and select the watched folder.
    async fn connect(&mut self) -> Result<(), MailError>;

    /// Fetch all unseen messages, marking each seen at fetch time.
    async fn fetch_unseen(&mut self) -> Result<Vec<InboundMessage>, MailError>;

    /// Tear the connection down. Always safe to call.
    async fn disconnect(&mut self);
}

/// Watcher tuning knobs.
#[derive(Debug, Clone)]
pub struct WatcherConfig {
    /// Idle pause between empty fetch cycles.
    pub poll_interval: Duration,
    /// Fixed delay before each reconnect attempt.
    pub backoff_delay: Duration,
    /// Consecutive connection failures tolerated before giving up.
    pub max_attempts: u32,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            backoff_delay: Duration::from_secs(5),
            max_attempts: 50,
        }
    }
}

/// Top-level driver: feeds each unseen message through
/// resolve → extract → dispatch, strictly one at a time.
pub struct MailboxWatcher<S> {
    source: S,
    resolver: LeadResolver,
    dispatcher: Arc<dyn Dispatcher>,
    config: WatcherConfig,
    state: ConnectionState,
    attempts: u32,
}

impl<S: MailSource> MailboxWatcher<S> {
    pub fn new(
        source: S,
        resolver: LeadResolver,
        dispatcher: Arc<dyn Dispatcher>,
        config: WatcherConfig,
    ) -> Self {
        Self {
            source,
            resolver,
            dispatcher,
            config,
            state: ConnectionState::Disconnected,
            attempts: 0,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Run the watch loop until the reconnect budget is exhausted.
    ///
    /// Only ever returns `Err` — a healthy watcher polls forever.
    pub async fn run(&mut self) -> Result<(), Error> {
        loop {
            match self.state {
                ConnectionState::Disconnected => match self.source.connect().await {
                    Ok(()) => {
                        info!("Mailbox connected");
                        self.state = ConnectionState::Connected;
                    }
                    Err(e) => {
                        warn!(error = %e, "Mailbox connection failed");
                        self.state = ConnectionState::Backoff;
                    }
                },

                ConnectionState::Connected => {
                    self.state = ConnectionState::Polling;
                    self.attempts = 0;
                }

                ConnectionState::Polling => match self.source.fetch_unseen().await {
                    Ok(messages) if messages.is_empty() => {
                        tokio::time::sleep(self.config.poll_interval).await;
                    }
                    Ok(messages) => {
                        debug!(count = messages.len(), "Fetched unseen messages");
                        for msg in messages {
                            self.process_message(msg).await;
                        }
                    }
                    Err(e) => {
                        error!(error = %e, "Fetch cycle failed, tearing connection down");
                        self.source.disconnect().await;
                        self.state = ConnectionState::Backoff;
                    }
                },

                ConnectionState::Backoff => {
                    self.attempts += 1;
                    if self.attempts >= self.config.max_attempts {
                        error!(
                            attempts = self.attempts,
                            "Reconnect attempts exhausted, stopping"
                        );
                        self.state = ConnectionState::Exhausted;
                    } else {
                        warn!(
                            attempt = self.attempts,
                            max = self.config.max_attempts,
                            delay_secs = self.config.backoff_delay.as_secs(),
                            "Backing off before reconnect"
                        );
                        tokio::time::sleep(self.config.backoff_delay).await;
                        self.state = ConnectionState::Disconnected;
                    }
                }

                ConnectionState::Exhausted => {
                    return Err(Error::ReconnectExhausted {
                        attempts: self.attempts,
                    });
                }
            }
        }
    }

    /// Run one message through resolve → extract → dispatch.
    ///
    /// Never escalates: every failure here is logged and the loop moves
    /// on. The mailbox item is already marked seen, so a failed message
    /// is consumed, not re-queued.
    async fn process_message(&self, msg: InboundMessage) {
        let uid = msg.uid.clone();

        let lead = match self.resolver.resolve(&msg.from_addr).await {
            Ok(Some(lead)) => lead,
            Ok(None) => {
                info!(uid = %uid, sender = %msg.from_addr, "No lead for sender, dropping message");
                return;
            }
            Err(e) => {
                warn!(uid = %uid, sender = %msg.from_addr, error = %e, "Lead lookup failed, skipping message");
                return;
            }
        };

        let Some(marker) = extract::extract_correlation_marker(&msg.html) else {
            debug!(uid = %uid, "No correlation marker, dropping message");
            return;
        };
        debug!(uid = %uid, marker = %marker, "Automation reply detected");

        let body = extract::extract_reply_body(&msg.text);
        let cod_lead = lead.cod_lead;
        let ctx = DispatchContext::new(&lead, msg, body);

        if let Err(e) = self.dispatcher.dispatch(ctx).await {
            error!(
                uid = %uid,
                cod_lead,
                error = %e,
                "Dispatch failed, message already consumed"
            );
        }
    }
}
