//! Pure content extraction — reply-body isolation, correlation markers,
//! attachment enumeration. No I/O, no state.

use std::sync::LazyLock;

use mail_parser::MimeHeaders;
use regex::Regex;

use crate::mail::message::Attachment;

/// Reply-chain header fragment injected by the outbound relay. Everything
/// from its first occurrence onward is quoted history, not the reply.
const RELAY_REPLY_MARKER: &str = ".brevosend.com>";

/// Attribute signature of the hidden paragraph that carries the
/// correlation marker in automation-originated mail.
const MARKER_SIGNATURE: &str = "style=\"color:white;display:none\"";

/// Mail-client quote header ("On Mon, Jan 1, 2024 at 10:00 ...") plus
/// everything after it. `(?s)` so the quoted tail spans newlines.
static QUOTE_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)On \w{3}, \w+ \d{1,2}, \d{4} at \d{1,2}:\d{2}.*$").unwrap()
});

/// Isolate the freshly written reply from a raw text body.
///
/// Two rules, applied in order: truncate at the outbound-relay reply-chain
/// marker, then strip a trailing quote header and whatever follows it.
/// Idempotent — already-stripped text passes through unchanged.
pub fn extract_reply_body(raw: &str) -> String {
    let head = match raw.find(RELAY_REPLY_MARKER) {
        Some(idx) => &raw[..idx],
        None => raw,
    };
    QUOTE_HEADER.replace(head, "").into_owned()
}

/// Pull the correlation marker out of an HTML body.
///
/// Returns `None` when the hidden tag is absent — the normal case for
/// mail that did not originate from the automation system.
pub fn extract_correlation_marker(html: &str) -> Option<String> {
    let sig = html.find(MARKER_SIGNATURE)?;
    let open_end = html[sig..].find('>').map(|i| sig + i + 1)?;
    let close = html[open_end..].find("</p>").map(|i| open_end + i)?;
    let marker = html[open_end..close].trim();
    if marker.is_empty() {
        None
    } else {
        Some(marker.to_string())
    }
}

/// Enumerate the attachment parts of a parsed message, in order.
pub fn enumerate_attachments(parsed: &mail_parser::Message) -> Vec<Attachment> {
    parsed
        .attachments()
        .map(|part| {
            let filename = MimeHeaders::attachment_name(part)
                .unwrap_or("attachment")
                .to_string();
            let content_type = MimeHeaders::content_type(part)
                .map(|ct| match ct.subtype() {
                    Some(sub) => format!("{}/{sub}", ct.ctype()),
                    None => ct.ctype().to_string(),
                })
                .unwrap_or_else(|| "application/octet-stream".to_string());
            Attachment {
                filename,
                content_type,
                payload: part.contents().to_vec(),
            }
        })
        .collect()
}

/// Best-effort tag stripping for residual markup in extracted text.
///
/// Tolerates malformed markup — an unclosed tag just swallows the rest of
/// the input rather than failing.
pub fn strip_markup(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    for ch in html.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => out.push(ch),
            _ => {}
        }
    }
    out
}
