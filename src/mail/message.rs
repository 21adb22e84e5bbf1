//! Inbound message model — an immutable snapshot of one mailbox item.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use mail_parser::MessageParser;
use uuid::Uuid;

use crate::extract;

/// Fixed zone every message timestamp is normalized to.
pub const LOCAL_TZ: Tz = chrono_tz::America::Sao_Paulo;

/// One file attached to an inbound message. Owned by the message it
/// belongs to; the bytes only leave it as multipart parts scoped to a
/// single upload call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub filename: String,
    pub content_type: String,
    pub payload: Vec<u8>,
}

/// A fetched mailbox item. Built once from the raw RFC822 bytes, never
/// mutated, and discarded after its pipeline run completes.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    /// Server-assigned sequence id from the fetch.
    pub uid: String,
    /// RFC 5322 Message-ID, or a generated one when the header is missing.
    pub message_id: String,
    pub from_addr: String,
    pub to_addr: String,
    pub subject: String,
    /// Message date, normalized to [`LOCAL_TZ`].
    pub date: DateTime<Tz>,
    /// Plain-text body (best-effort markup stripping when only HTML exists).
    pub text: String,
    /// HTML body, empty when the message has none.
    pub html: String,
    pub attachments: Vec<Attachment>,
}

impl InboundMessage {
    /// Parse raw RFC822 bytes into a message snapshot.
    ///
    /// Returns `None` for input mail-parser cannot make sense of; the
    /// caller logs and skips such items.
    pub fn parse(uid: &str, raw: &[u8]) -> Option<Self> {
        let parsed = MessageParser::default().parse(raw)?;

        let from_addr = first_address(parsed.from());
        let to_addr = first_address(parsed.to());
        let subject = parsed.subject().unwrap_or("(no subject)").to_string();

        let message_id = parsed
            .message_id()
            .map(|s| s.to_string())
            .unwrap_or_else(|| format!("gen-{}", Uuid::new_v4()));

        let date = parsed
            .date()
            .and_then(|d| DateTime::from_timestamp(d.to_timestamp(), 0))
            .unwrap_or_else(Utc::now)
            .with_timezone(&LOCAL_TZ);

        let html = parsed
            .body_html(0)
            .map(|h| h.to_string())
            .unwrap_or_default();

        let text = match parsed.body_text(0) {
            Some(t) => t.to_string(),
            None => extract::strip_markup(&html),
        };

        let attachments = extract::enumerate_attachments(&parsed);

        Some(Self {
            uid: uid.to_string(),
            message_id,
            from_addr,
            to_addr,
            subject,
            date,
            text,
            html,
            attachments,
        })
    }
}

/// First address in a From/To header, or `"unknown"`.
fn first_address(addr: Option<&mail_parser::Address>) -> String {
    addr.and_then(|a| a.first())
        .and_then(|a| a.address())
        .map(|s| s.to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    const SIMPLE: &[u8] = b"From: Alice <alice@example.com>\r\n\
        To: leads@company.com\r\n\
        Subject: Re: proposal\r\n\
        Date: Mon, 1 Jan 2024 10:00:00 +0000\r\n\
        Message-ID: <abc@example.com>\r\n\
        \r\n\
        Sounds good to me.\r\n";

    #[test]
    fn parse_reads_headers_and_body() {
        let msg = InboundMessage::parse("42", SIMPLE).unwrap();
        assert_eq!(msg.uid, "42");
        assert_eq!(msg.message_id, "abc@example.com");
        assert_eq!(msg.from_addr, "alice@example.com");
        assert_eq!(msg.to_addr, "leads@company.com");
        assert_eq!(msg.subject, "Re: proposal");
        assert!(msg.text.contains("Sounds good"));
        assert!(msg.attachments.is_empty());
    }

    #[test]
    fn parse_normalizes_date_to_local_zone() {
        let msg = InboundMessage::parse("1", SIMPLE).unwrap();
        // 10:00 UTC is 07:00 in America/Sao_Paulo.
        assert_eq!(msg.date.hour(), 7);
        assert_eq!(msg.date.timezone(), LOCAL_TZ);
    }

    #[test]
    fn parse_generates_message_id_when_missing() {
        let raw = b"From: a@b.com\r\nTo: c@d.com\r\nSubject: x\r\n\r\nhi";
        let msg = InboundMessage::parse("1", raw).unwrap();
        assert!(msg.message_id.starts_with("gen-"));
    }

    #[test]
    fn parse_defaults_missing_sender_to_unknown() {
        let raw = b"Subject: anonymous\r\n\r\nwho am I";
        let msg = InboundMessage::parse("1", raw).unwrap();
        assert_eq!(msg.from_addr, "unknown");
    }

    #[test]
    fn parse_collects_attachments_in_order() {
        let raw = b"From: a@b.com\r\n\
            To: c@d.com\r\n\
            Subject: two files\r\n\
            MIME-Version: 1.0\r\n\
            Content-Type: multipart/mixed; boundary=\"b1\"\r\n\
            \r\n\
            --b1\r\n\
            Content-Type: text/plain\r\n\
            \r\n\
            body\r\n\
            --b1\r\n\
            Content-Type: image/png; name=\"one.png\"\r\n\
            Content-Disposition: attachment; filename=\"one.png\"\r\n\
            \r\n\
            PNG1\r\n\
            --b1\r\n\
            Content-Type: image/png; name=\"two.png\"\r\n\
            Content-Disposition: attachment; filename=\"two.png\"\r\n\
            \r\n\
            PNG2\r\n\
            --b1--\r\n";
        let msg = InboundMessage::parse("7", raw).unwrap();
        let names: Vec<&str> = msg.attachments.iter().map(|a| a.filename.as_str()).collect();
        assert_eq!(names, vec!["one.png", "two.png"]);
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(InboundMessage::parse("1", b"").is_none());
    }
}
