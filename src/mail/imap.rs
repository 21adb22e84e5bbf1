//! Raw IMAP-over-TLS mail source.
//!
//! The session is plain blocking socket I/O; the async [`MailSource`]
//! impl moves it in and out of `spawn_blocking`. One session is held for
//! the whole polling run and torn down wholesale on any error — the
//! watcher reconnects from scratch rather than repairing in place.

use std::io::{Read as IoRead, Write as IoWrite};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use tracing::{debug, warn};

use crate::config::MailConfig;
use crate::error::MailError;
use crate::mail::message::InboundMessage;
use crate::watcher::MailSource;

/// Socket read timeout. A poll cycle is short-lived command/response
/// traffic, never a long IDLE wait.
const READ_TIMEOUT: Duration = Duration::from_secs(30);

/// IMAP mail source holding at most one live session.
pub struct ImapSource {
    config: MailConfig,
    session: Option<ImapSession>,
}

impl ImapSource {
    pub fn new(config: MailConfig) -> Self {
        Self {
            config,
            session: None,
        }
    }
}

#[async_trait]
impl MailSource for ImapSource {
    async fn connect(&mut self) -> Result<(), MailError> {
        let config = self.config.clone();
        let session = tokio::task::spawn_blocking(move || ImapSession::open(&config))
            .await
            .map_err(|e| MailError::Protocol(format!("connect task panicked: {e}")))??;
        self.session = Some(session);
        Ok(())
    }

    async fn fetch_unseen(&mut self) -> Result<Vec<InboundMessage>, MailError> {
        let mut session = self.session.take().ok_or(MailError::Closed)?;
        let (session, outcome) = tokio::task::spawn_blocking(move || {
            let outcome = session.fetch_unseen();
            (session, outcome)
        })
        .await
        .map_err(|e| MailError::Protocol(format!("fetch task panicked: {e}")))?;

        match outcome {
            Ok(messages) => {
                self.session = Some(session);
                Ok(messages)
            }
            // Session is dropped here — rebuilt from scratch after backoff.
            Err(e) => Err(e),
        }
    }

    async fn disconnect(&mut self) {
        if let Some(mut session) = self.session.take() {
            let _ = tokio::task::spawn_blocking(move || session.logout()).await;
        }
    }
}

// ── Blocking session ────────────────────────────────────────────────

/// One authenticated IMAP session with the configured folder selected.
struct ImapSession {
    tls: rustls::StreamOwned<rustls::ClientConnection, TcpStream>,
    tag_counter: u32,
}

impl ImapSession {
    /// Connect, authenticate, and select the watched folder.
    fn open(config: &MailConfig) -> Result<Self, MailError> {
        let tcp = TcpStream::connect((&*config.host, config.port)).map_err(|e| {
            MailError::Connect {
                host: config.host.clone(),
                port: config.port,
                reason: e.to_string(),
            }
        })?;
        tcp.set_read_timeout(Some(READ_TIMEOUT))?;

        let mut root_store = rustls::RootCertStore::empty();
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let tls_config = Arc::new(
            rustls::ClientConfig::builder()
                .with_root_certificates(root_store)
                .with_no_client_auth(),
        );
        let server_name: rustls::pki_types::ServerName<'_> =
            rustls::pki_types::ServerName::try_from(config.host.clone())
                .map_err(|e| MailError::Tls(e.to_string()))?;
        let conn = rustls::ClientConnection::new(tls_config, server_name)
            .map_err(|e| MailError::Tls(e.to_string()))?;
        let tls = rustls::StreamOwned::new(conn, tcp);

        let mut session = Self { tls, tag_counter: 0 };

        let _greeting = session.read_line()?;

        let login = session.send_cmd(&format!(
            "LOGIN \"{}\" \"{}\"",
            config.user,
            config.password.expose_secret()
        ))?;
        if !tagged_ok(&login) {
            return Err(MailError::AuthFailed {
                user: config.user.clone(),
            });
        }

        let select = session.send_cmd(&format!("SELECT \"{}\"", config.folder))?;
        if !tagged_ok(&select) {
            return Err(MailError::Protocol(format!(
                "SELECT {} failed",
                config.folder
            )));
        }

        debug!(host = %config.host, folder = %config.folder, "IMAP session opened");
        Ok(session)
    }

    /// One fetch cycle: search unseen, fetch each, mark it seen at fetch
    /// time, parse. Per-message parse failures are logged and skipped;
    /// only transport/protocol problems error out.
    fn fetch_unseen(&mut self) -> Result<Vec<InboundMessage>, MailError> {
        let search = self.send_cmd("SEARCH UNSEEN")?;
        let uids = parse_search_response(&search);

        let mut messages = Vec::with_capacity(uids.len());
        for uid in &uids {
            let fetch = self.send_cmd(&format!("FETCH {uid} RFC822"))?;
            let raw = assemble_fetch_body(&fetch);

            // Mark seen before processing — the item is consumed from the
            // mailbox's perspective even if downstream dispatch fails.
            self.send_cmd(&format!("STORE {uid} +FLAGS (\\Seen)"))?;

            match InboundMessage::parse(uid, raw.as_bytes()) {
                Some(msg) => messages.push(msg),
                None => warn!(uid = %uid, "Unparseable message, skipping"),
            }
        }

        Ok(messages)
    }

    fn logout(&mut self) -> Result<(), MailError> {
        self.send_cmd("LOGOUT").map(|_| ())
    }

    /// Send one tagged command and collect lines through the tagged reply.
    fn send_cmd(&mut self, cmd: &str) -> Result<Vec<String>, MailError> {
        self.tag_counter += 1;
        let tag = format!("A{}", self.tag_counter);
        let full = format!("{tag} {cmd}\r\n");
        self.tls.write_all(full.as_bytes())?;
        self.tls.flush()?;

        let mut lines = Vec::new();
        loop {
            let line = self.read_line()?;
            let done = line.starts_with(&tag);
            lines.push(line);
            if done {
                return Ok(lines);
            }
        }
    }

    fn read_line(&mut self) -> Result<String, MailError> {
        let mut buf = Vec::new();
        loop {
            let mut byte = [0u8; 1];
            match self.tls.read(&mut byte) {
                Ok(0) => return Err(MailError::Closed),
                Ok(_) => {
                    buf.push(byte[0]);
                    if buf.ends_with(b"\r\n") {
                        return Ok(String::from_utf8_lossy(&buf).to_string());
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

// ── Response parsing helpers ────────────────────────────────────────

/// Whether the tagged completion line of a response reports OK.
fn tagged_ok(lines: &[String]) -> bool {
    lines.last().is_some_and(|l| l.contains("OK"))
}

/// Sequence numbers out of a `* SEARCH n1 n2 ...` response.
fn parse_search_response(lines: &[String]) -> Vec<String> {
    let mut uids = Vec::new();
    for line in lines {
        if line.starts_with("* SEARCH") {
            uids.extend(
                line.split_whitespace()
                    .skip(2)
                    .map(|s| s.trim().to_string()),
            );
        }
    }
    uids
}

/// Reassemble the literal body of a FETCH response: drop the untagged
/// size line, the closing paren line, and the tagged completion.
fn assemble_fetch_body(lines: &[String]) -> String {
    let inner: Vec<&String> = lines
        .iter()
        .skip(1)
        .take(lines.len().saturating_sub(2))
        .collect();
    let inner = match inner.last() {
        Some(last) if last.trim() == ")" => &inner[..inner.len() - 1],
        _ => &inner[..],
    };
    inner.iter().map(|s| s.as_str()).collect()
}
