use std::{sync::Arc, time::Duration};

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use reqwest::Client;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::{AppConfig, EventInfo};
use crate::models::Registration;

const EMAIL_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone)]
pub struct Attachment {
    pub filename: String,
    pub content: Vec<u8>,
    pub content_type: String,
}

#[derive(Debug, Clone)]
pub struct OutboundEmail {
    pub to: String,
    pub subject: String,
    pub html: String,
    pub attachments: Vec<Attachment>,
}

/// Transactional email delivery. Implementations report failure through the
/// returned error; callers decide whether it matters.
#[async_trait]
pub trait Notifier: Send + Sync + 'static {
    async fn send(&self, email: OutboundEmail) -> Result<()>;
}

/// Sends `email` and swallows any failure after logging it. Returns whether
/// the provider accepted the message.
pub async fn deliver(notifier: &dyn Notifier, email: OutboundEmail, kind: &'static str) -> bool {
    let subject = email.subject.clone();
    match notifier.send(email).await {
        Ok(()) => {
            info!(kind, %subject, "email delivered");
            true
        }
        Err(err) => {
            warn!(kind, %subject, error = %format!("{err:#}"), "email delivery failed");
            false
        }
    }
}

pub fn build_notifier(config: &AppConfig) -> Result<Arc<dyn Notifier>> {
    match &config.email_api_key {
        Some(api_key) => Ok(Arc::new(HttpNotifier::new(
            config.email_api_url.clone(),
            api_key.clone(),
            config.email_from.clone(),
        )?)),
        None => {
            warn!("EMAIL_API_KEY not configured; outbound email is disabled");
            Ok(Arc::new(DisabledNotifier))
        }
    }
}

#[derive(Debug, Serialize)]
struct SendEmailBody<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    html: &'a str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    attachments: Vec<SendEmailAttachment>,
}

#[derive(Debug, Serialize)]
struct SendEmailAttachment {
    filename: String,
    content: String,
    content_type: String,
}

/// Resend-compatible JSON API client.
pub struct HttpNotifier {
    client: Client,
    endpoint: String,
    api_key: String,
    from: String,
}

impl HttpNotifier {
    pub fn new(endpoint: String, api_key: String, from: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(EMAIL_TIMEOUT)
            .build()
            .context("failed to build email HTTP client")?;
        Ok(Self {
            client,
            endpoint,
            api_key,
            from,
        })
    }
}

#[async_trait]
impl Notifier for HttpNotifier {
    async fn send(&self, email: OutboundEmail) -> Result<()> {
        let body = SendEmailBody {
            from: &self.from,
            to: &email.to,
            subject: &email.subject,
            html: &email.html,
            attachments: email
                .attachments
                .iter()
                .map(|attachment| SendEmailAttachment {
                    filename: attachment.filename.clone(),
                    content: BASE64.encode(&attachment.content),
                    content_type: attachment.content_type.clone(),
                })
                .collect(),
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .context("email provider request failed")?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let text = response.text().await.unwrap_or_default();
        Err(anyhow!("email provider rejected message (status={status}): {text}"))
    }
}

pub struct DisabledNotifier;

#[async_trait]
impl Notifier for DisabledNotifier {
    async fn send(&self, _email: OutboundEmail) -> Result<()> {
        bail!("email delivery is not configured")
    }
}

pub fn pending_email(registration: &Registration, event: &EventInfo) -> OutboundEmail {
    OutboundEmail {
        to: registration.email.clone(),
        subject: format!("Registration Received - {}", event.title()),
        html: pending_html(registration, event),
        attachments: Vec::new(),
    }
}

pub fn confirmation_email(
    registration: &Registration,
    event: &EventInfo,
    ticket: Attachment,
) -> OutboundEmail {
    OutboundEmail {
        to: registration.email.clone(),
        subject: format!("Registration Confirmed - {}", event.title()),
        html: confirmation_html(registration, event),
        attachments: vec![ticket],
    }
}

fn escape_html(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

fn pending_html(registration: &Registration, event: &EventInfo) -> String {
    let name = escape_html(&registration.name);
    let short_id = registration.short_id();
    let event_name = escape_html(&event.name);
    let tagline = escape_html(&event.tagline);

    format!(
        r#"<!DOCTYPE html>
<html>
<head>
  <meta charset="utf-8">
  <meta name="viewport" content="width=device-width, initial-scale=1.0">
</head>
<body style="margin: 0; padding: 0; background-color: #0a0a0a; font-family: 'Segoe UI', Tahoma, Geneva, Verdana, sans-serif;">
  <div style="max-width: 600px; margin: 0 auto; padding: 40px 20px;">
    <div style="background: linear-gradient(135deg, #1b263b 0%, #0d1b2a 100%); border-radius: 16px; padding: 40px 30px; border: 1px solid rgba(212, 175, 55, 0.3);">
      <h1 style="margin: 0 0 10px; font-size: 32px; color: #d4af37; text-align: center; letter-spacing: 4px;">{event_name}</h1>
      <p style="margin: 0 0 30px; color: #f4e4a6; font-size: 13px; text-align: center; letter-spacing: 2px;">{tagline}</p>
      <div style="text-align: center; margin-bottom: 25px;">
        <span style="display: inline-block; background: rgba(212, 175, 55, 0.2); color: #d4af37; padding: 8px 24px; border-radius: 20px; font-size: 14px;">PAYMENT VERIFICATION PENDING</span>
      </div>
      <p style="color: #fafafa; font-size: 16px; margin: 0 0 15px;">Dear <strong style="color: #d4af37;">{name}</strong>,</p>
      <p style="color: #ccc; font-size: 14px; line-height: 1.6; margin: 0 0 20px;">Thank you for registering for {event_name}! We have received your registration and payment details.</p>
      <div style="background: rgba(10, 10, 10, 0.5); border-radius: 8px; padding: 20px; margin-bottom: 20px;">
        <p style="margin: 0 0 8px; color: #888; font-size: 12px;">Registration ID</p>
        <p style="margin: 0; color: #d4af37; font-size: 16px; font-weight: 600;">{short_id}</p>
      </div>
      <p style="color: #ccc; font-size: 14px; line-height: 1.6; margin: 0 0 20px;">Our team is verifying your payment. You will receive your entry pass via email once verified.</p>
    </div>
  </div>
</body>
</html>
"#
    )
}

fn confirmation_html(registration: &Registration, event: &EventInfo) -> String {
    let name = escape_html(&registration.name);
    let short_id = registration.short_id();
    let event_name = escape_html(&event.name);
    let tagline = escape_html(&event.tagline);
    let date = escape_html(&event.date);
    let time = escape_html(&event.time);
    let venue = escape_html(&event.venue);
    let location = escape_html(&event.location);
    let title = escape_html(&event.title());

    format!(
        r#"<!DOCTYPE html>
<html>
<head>
  <meta charset="utf-8">
  <meta name="viewport" content="width=device-width, initial-scale=1.0">
</head>
<body style="margin: 0; padding: 0; background-color: #0a0a0a; font-family: 'Segoe UI', Tahoma, Geneva, Verdana, sans-serif;">
  <div style="max-width: 600px; margin: 0 auto; padding: 40px 20px;">
    <div style="background: linear-gradient(135deg, #1b263b 0%, #0d1b2a 100%); border-radius: 16px 16px 0 0; padding: 40px 30px; text-align: center; border: 1px solid rgba(212, 175, 55, 0.3); border-bottom: none;">
      <h1 style="margin: 0; font-size: 36px; font-weight: bold; color: #d4af37; letter-spacing: 4px;">{event_name}</h1>
      <p style="margin: 10px 0 0; color: #f4e4a6; font-size: 14px; letter-spacing: 2px;">{tagline}</p>
    </div>
    <div style="background: #1b263b; padding: 40px 30px; border: 1px solid rgba(212, 175, 55, 0.3); border-top: none; border-bottom: none;">
      <div style="text-align: center; margin-bottom: 30px;">
        <span style="display: inline-block; background: linear-gradient(135deg, #b8960c 0%, #d4af37 100%); color: #0d1b2a; padding: 8px 24px; border-radius: 20px; font-weight: 600; font-size: 14px;">REGISTRATION CONFIRMED</span>
      </div>
      <p style="color: #fafafa; font-size: 16px; line-height: 1.6; margin: 0 0 20px;">Dear <strong style="color: #d4af37;">{name}</strong>,</p>
      <p style="color: #ccc; font-size: 15px; line-height: 1.6; margin: 0 0 30px;">Congratulations! Your registration for {event_name} has been verified. Your entry pass is attached to this email.</p>
      <div style="background: rgba(10, 10, 10, 0.5); border-radius: 12px; padding: 25px; margin-bottom: 30px; border: 1px solid rgba(212, 175, 55, 0.2);">
        <h3 style="margin: 0 0 20px; color: #d4af37; font-size: 14px; letter-spacing: 1px;">EVENT DETAILS</h3>
        <table style="width: 100%; border-collapse: collapse;">
          <tr><td style="padding: 8px 0; color: #888; font-size: 13px;">Registration ID</td><td style="padding: 8px 0; color: #d4af37; font-size: 13px; text-align: right; font-weight: 600;">{short_id}</td></tr>
          <tr><td style="padding: 8px 0; color: #888; font-size: 13px;">Date</td><td style="padding: 8px 0; color: #fafafa; font-size: 13px; text-align: right;">{date}</td></tr>
          <tr><td style="padding: 8px 0; color: #888; font-size: 13px;">Time</td><td style="padding: 8px 0; color: #fafafa; font-size: 13px; text-align: right;">{time}</td></tr>
          <tr><td style="padding: 8px 0; color: #888; font-size: 13px;">Venue</td><td style="padding: 8px 0; color: #fafafa; font-size: 13px; text-align: right;">{venue}</td></tr>
        </table>
      </div>
      <div style="background: rgba(212, 175, 55, 0.1); border-radius: 8px; padding: 20px; border-left: 3px solid #d4af37;">
        <h4 style="margin: 0 0 10px; color: #d4af37; font-size: 14px;">Important Instructions</h4>
        <ul style="margin: 0; padding-left: 20px; color: #ccc; font-size: 13px; line-height: 1.8;">
          <li>Please carry a printed or digital copy of your entry pass</li>
          <li>Bring a valid photo ID for verification</li>
          <li>This pass is non-transferable</li>
        </ul>
      </div>
    </div>
    <div style="background: #0d1b2a; border-radius: 0 0 16px 16px; padding: 30px; text-align: center; border: 1px solid rgba(212, 175, 55, 0.3); border-top: none;">
      <p style="margin: 0 0 10px; color: #888; font-size: 12px;">{location}</p>
      <p style="margin: 0; color: #666; font-size: 11px;">&copy; {title}. All rights reserved.</p>
    </div>
  </div>
</body>
</html>
"#
    )
}
