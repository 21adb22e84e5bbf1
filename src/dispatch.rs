//! Two-phase dispatch — automation webhook first, attachment upload second.
//!
//! Step 2 needs the correlation token step 1 returns, so the ordering is
//! strict: a rejected webhook call stops the message cold and no upload
//! is attempted. Failures past that point leave the message consumed —
//! it was already marked seen at fetch time.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use secrecy::ExposeSecret;
use serde::Deserialize;
use tracing::info;

use crate::config::{CrmConfig, WebhookConfig};
use crate::error::DispatchError;
use crate::mail::message::{Attachment, InboundMessage};
use crate::store::LeadRecord;

/// Upload category for lead attachments in the CRM.
const UPLOAD_CATEGORY: &str = "ANEXO_LEAD";

/// Per-message working state threaded through the pipeline stages.
///
/// Created fresh for each message and discarded with it; the correlation
/// token is absent until step 1 populates it via
/// [`DispatchContext::with_correlation_token`].
#[derive(Debug, Clone)]
pub struct DispatchContext {
    pub cod_lead: i64,
    /// Extracted reply body.
    pub message: String,
    pub from_addr: String,
    pub to_addr: String,
    pub subject: String,
    pub attachments: Vec<Attachment>,
    correlation_token: Option<String>,
}

impl DispatchContext {
    /// Build the context for one message, consuming the mailbox snapshot.
    pub fn new(lead: &LeadRecord, msg: InboundMessage, message: String) -> Self {
        Self {
            cod_lead: lead.cod_lead,
            message,
            from_addr: msg.from_addr,
            to_addr: msg.to_addr,
            subject: msg.subject,
            attachments: msg.attachments,
            correlation_token: None,
        }
    }

    /// Populate the correlation token returned by the webhook call.
    pub fn with_correlation_token(self, token: String) -> Self {
        Self {
            correlation_token: Some(token),
            ..self
        }
    }

    pub fn correlation_token(&self) -> Option<&str> {
        self.correlation_token.as_deref()
    }
}

/// Seam the watcher dispatches through, so the watch loop is testable
/// without the network.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    /// Run both pipeline steps for one message.
    async fn dispatch(&self, ctx: DispatchContext) -> Result<(), DispatchError>;
}

#[derive(Debug, Deserialize)]
struct WebhookResponse {
    message_id: String,
}

#[derive(Debug, Deserialize)]
struct SessionResponse {
    token: String,
}

/// The two dependent outbound calls for one message.
pub struct DispatchPipeline {
    webhook: WebhookConfig,
    crm: CrmConfig,
    client: reqwest::Client,
}

impl DispatchPipeline {
    pub fn new(webhook: WebhookConfig, crm: CrmConfig) -> Self {
        Self {
            webhook,
            crm,
            client: reqwest::Client::new(),
        }
    }

    /// Step 1 — relay the message to the automation endpoint.
    ///
    /// Returns the correlation token from the 200 response. Any other
    /// status is a hard stop for this message, surfaced with its body.
    pub async fn submit_to_automation(
        &self,
        ctx: &DispatchContext,
    ) -> Result<String, DispatchError> {
        let payload = serde_json::json!({
            "cod_lead": ctx.cod_lead,
            "message": ctx.message,
            "from_email": ctx.from_addr,
            "to_email": ctx.to_addr,
            "subject": ctx.subject,
            "incoming": true,
            "channel": "email",
        });

        let resp = self
            .client
            .post(&self.webhook.url)
            .bearer_auth(self.webhook.api_key.expose_secret())
            .json(&payload)
            .send()
            .await?;

        let status = resp.status().as_u16();
        let body = resp.text().await?;
        if status != 200 {
            return Err(DispatchError::WebhookRejected { status, body });
        }

        let parsed: WebhookResponse =
            serde_json::from_str(&body).map_err(|_| DispatchError::InvalidResponse(body))?;
        Ok(parsed.message_id)
    }

    /// Step 2a — obtain a session token with the service-account identity.
    ///
    /// Not retried here: a failure is reported upward and the message
    /// stays consumed.
    pub async fn authenticate(&self) -> Result<String, DispatchError> {
        let payload = serde_json::json!({
            "email": self.crm.service_email,
            "password": self.crm.service_password.expose_secret(),
        });

        let resp = self
            .client
            .post(format!("{}/login", self.crm.base_url))
            .json(&payload)
            .send()
            .await?;

        let status = resp.status().as_u16();
        let body = resp.text().await?;
        if status != 200 {
            return Err(DispatchError::AuthRejected { status, body });
        }

        let parsed: SessionResponse =
            serde_json::from_str(&body).map_err(|_| DispatchError::InvalidResponse(body))?;
        Ok(parsed.token)
    }

    /// Step 2b — one multipart upload carrying every attachment.
    ///
    /// The parts are built from the in-memory payloads and dropped with
    /// the request, whatever the outcome.
    pub async fn upload_attachments(
        &self,
        ctx: &DispatchContext,
        session_token: &str,
    ) -> Result<(), DispatchError> {
        let correlation = ctx
            .correlation_token()
            .ok_or(DispatchError::MissingCorrelationToken)?;

        let mut form = Form::new()
            .text("CodLead", ctx.cod_lead.to_string())
            .text("saveFile", "true")
            .text("tipo", UPLOAD_CATEGORY)
            .text("CodMensagem", correlation.to_string());

        for att in &ctx.attachments {
            let part = Part::bytes(att.payload.clone())
                .file_name(att.filename.clone())
                .mime_str(&att.content_type)?;
            form = form.part("files", part);
        }

        let resp = self
            .client
            .post(format!("{}/upload", self.crm.base_url))
            .header(
                reqwest::header::AUTHORIZATION,
                format!("Bearer {session_token}"),
            )
            .multipart(form)
            .send()
            .await?;

        let status = resp.status().as_u16();
        if status != 200 {
            let body = resp.text().await.unwrap_or_default();
            return Err(DispatchError::UploadRejected { status, body });
        }

        Ok(())
    }
}

#[async_trait]
impl Dispatcher for DispatchPipeline {
    async fn dispatch(&self, ctx: DispatchContext) -> Result<(), DispatchError> {
        let token = self.submit_to_automation(&ctx).await?;
        info!(cod_lead = ctx.cod_lead, token = %token, "Webhook accepted message");

        let ctx = ctx.with_correlation_token(token);
        if ctx.attachments.is_empty() {
            return Ok(());
        }

        let session = self.authenticate().await?;
        self.upload_attachments(&ctx, &session).await?;
        info!(
            cod_lead = ctx.cod_lead,
            count = ctx.attachments.len(),
            "Attachments uploaded"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mail::message::LOCAL_TZ;
    use chrono::Utc;
    use secrecy::SecretString;

    fn test_message(attachments: Vec<Attachment>) -> InboundMessage {
        InboundMessage {
            uid: "1".to_string(),
            message_id: "m1@example.com".to_string(),
            from_addr: "alice@example.com".to_string(),
            to_addr: "leads@company.com".to_string(),
            subject: "Re: proposal".to_string(),
            date: Utc::now().with_timezone(&LOCAL_TZ),
            text: "Hello".to_string(),
            html: String::new(),
            attachments,
        }
    }

    fn test_lead() -> LeadRecord {
        LeadRecord {
            cod_lead: 42,
            email: "alice@example.com".to_string(),
        }
    }

    fn test_pipeline(base: &str) -> DispatchPipeline {
        DispatchPipeline::new(
            WebhookConfig {
                url: format!("{base}/webhook"),
                api_key: SecretString::from("test-key".to_string()),
            },
            CrmConfig {
                base_url: base.to_string(),
                service_email: "svc@company.com".to_string(),
                service_password: SecretString::from("svc-pass".to_string()),
            },
        )
    }

    #[test]
    fn context_threads_message_fields() {
        let msg = test_message(vec![Attachment {
            filename: "a.pdf".to_string(),
            content_type: "application/pdf".to_string(),
            payload: vec![1, 2, 3],
        }]);
        let ctx = DispatchContext::new(&test_lead(), msg, "stripped body".to_string());

        assert_eq!(ctx.cod_lead, 42);
        assert_eq!(ctx.message, "stripped body");
        assert_eq!(ctx.from_addr, "alice@example.com");
        assert_eq!(ctx.to_addr, "leads@company.com");
        assert_eq!(ctx.attachments.len(), 1);
        assert_eq!(ctx.correlation_token(), None);
    }

    #[test]
    fn context_token_set_once_by_builder() {
        let ctx = DispatchContext::new(&test_lead(), test_message(vec![]), String::new());
        let ctx = ctx.with_correlation_token("M1".to_string());
        assert_eq!(ctx.correlation_token(), Some("M1"));
    }

    #[tokio::test]
    async fn upload_without_token_is_rejected_locally() {
        let pipeline = test_pipeline("http://127.0.0.1:1");
        let ctx = DispatchContext::new(&test_lead(), test_message(vec![]), String::new());

        let err = pipeline.upload_attachments(&ctx, "session").await.unwrap_err();
        assert!(matches!(err, DispatchError::MissingCorrelationToken));
    }

    #[tokio::test]
    async fn submit_transport_failure_is_transport_error() {
        // Nothing listens on port 1 — the connection is refused.
        let pipeline = test_pipeline("http://127.0.0.1:1");
        let ctx = DispatchContext::new(&test_lead(), test_message(vec![]), String::new());

        let err = pipeline.submit_to_automation(&ctx).await.unwrap_err();
        assert!(matches!(err, DispatchError::Transport(_)));
    }
}
