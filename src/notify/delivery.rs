//! Notification transports.
//!
//! Defines the `NotificationDelivery` trait and its transports:
//!
//! | Transport | Type | Notes |
//! |-----------|------|-------|
//! | smtp | [`SmtpDelivery`] | `lettre`, one message to all recipients |
//! | webhook | [`WebhookDelivery`] | `reqwest` JSON POST, optional HMAC signature |
//! | log | [`LogDelivery`] | `tracing` event, for development |
//!
//! # Error Handling
//!
//! Transports make exactly one attempt. Any failure, including a non-2xx
//! webhook response, is returned as [`Error::DeliveryFailed`]; the dispatcher
//! never retries.

use super::context::Notification;
use crate::config::{NotifyRecipient, SmtpSettings, WebhookSettings};
use crate::{Error, Result};
use chrono::Utc;
use hmac::{Hmac, Mac};
use lettre::message::Mailbox;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use sha2::Sha256;

/// Delivery collaborator of the dispatcher.
pub trait NotificationDelivery: Send + Sync {
    /// Delivers a rendered notification.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DeliveryFailed`] if the transport rejects or cannot
    /// reach its destination.
    fn deliver(&self, notification: &Notification) -> Result<()>;

    /// Short transport name used in logs and metrics.
    fn transport_name(&self) -> &'static str;
}

/// Emits notifications as `tracing` events.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogDelivery;

impl NotificationDelivery for LogDelivery {
    fn deliver(&self, notification: &Notification) -> Result<()> {
        tracing::info!(
            subject = %notification.subject,
            body = %notification.body,
            "Error notification"
        );
        Ok(())
    }

    fn transport_name(&self) -> &'static str {
        "log"
    }
}

/// Sends notifications as plain-text email.
pub struct SmtpDelivery {
    transport: SmtpTransport,
    from: Mailbox,
    recipients: Vec<Mailbox>,
}

impl SmtpDelivery {
    /// Creates an SMTP transport. No connection is opened until the first send.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the host is missing or an address
    /// does not parse.
    pub fn new(settings: &SmtpSettings, recipients: &[NotifyRecipient]) -> Result<Self> {
        let host = settings
            .host
            .as_deref()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| Error::InvalidInput("SMTP host is not configured".to_string()))?;
        let from_raw = settings.from.as_deref().unwrap_or_default();
        let from: Mailbox = from_raw
            .parse()
            .map_err(|e| Error::InvalidInput(format!("invalid SMTP from '{from_raw}': {e}")))?;
        let recipients = recipients
            .iter()
            .map(NotifyRecipient::mailbox)
            .collect::<Result<Vec<_>>>()?;

        let builder = if settings.starttls {
            SmtpTransport::starttls_relay(host).map_err(|e| {
                Error::InvalidInput(format!("invalid SMTP relay '{host}': {e}"))
            })?
        } else {
            SmtpTransport::builder_dangerous(host)
        };
        let mut builder = builder.port(settings.port).timeout(Some(settings.timeout));
        if let Some(username) = &settings.username {
            let password = settings
                .password
                .as_ref()
                .map(|p| p.expose_secret().to_string())
                .unwrap_or_default();
            builder = builder.credentials(Credentials::new(username.clone(), password));
        }

        Ok(Self {
            transport: builder.build(),
            from,
            recipients,
        })
    }

    /// Builds the email, or `None` when there is nobody to send it to.
    fn build_message(&self, notification: &Notification) -> Result<Option<Message>> {
        if self.recipients.is_empty() {
            return Ok(None);
        }

        let mut builder = Message::builder()
            .from(self.from.clone())
            .subject(notification.subject.clone())
            .header(ContentType::TEXT_PLAIN);
        for recipient in &self.recipients {
            builder = builder.to(recipient.clone());
        }

        builder
            .body(notification.body.clone())
            .map(Some)
            .map_err(|e| Error::DeliveryFailed {
                transport: "smtp",
                cause: format!("failed to build message: {e}"),
            })
    }
}

impl NotificationDelivery for SmtpDelivery {
    fn deliver(&self, notification: &Notification) -> Result<()> {
        let Some(message) = self.build_message(notification)? else {
            tracing::warn!(subject = %notification.subject, "No notify recipients configured, skipping email");
            return Ok(());
        };

        self.transport
            .send(&message)
            .map(|_| ())
            .map_err(|e| Error::DeliveryFailed {
                transport: "smtp",
                cause: e.to_string(),
            })
    }

    fn transport_name(&self) -> &'static str {
        "smtp"
    }
}

/// JSON body posted by [`WebhookDelivery`].
#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    delivery_id: String,
    subject: &'a str,
    body: &'a str,
    recipients: &'a [NotifyRecipient],
    sent_at: String,
}

/// Posts notifications to an HTTP endpoint.
pub struct WebhookDelivery {
    /// HTTP client with connection pooling.
    client: reqwest::blocking::Client,
    url: String,
    secret: Option<SecretString>,
    recipients: Vec<NotifyRecipient>,
}

impl WebhookDelivery {
    /// Creates a webhook transport.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if no URL is configured or the HTTP
    /// client cannot be built with the configured timeout.
    pub fn new(settings: &WebhookSettings, recipients: &[NotifyRecipient]) -> Result<Self> {
        let url = settings
            .url
            .clone()
            .filter(|u| !u.is_empty())
            .ok_or_else(|| Error::InvalidInput("webhook URL is not configured".to_string()))?;

        let client = reqwest::blocking::Client::builder()
            .user_agent(format!("jserrorlog/{}", env!("CARGO_PKG_VERSION")))
            .timeout(settings.timeout)
            .build()
            .map_err(|e| Error::InvalidInput(format!("cannot build webhook client: {e}")))?;

        Ok(Self {
            client,
            url,
            secret: settings.secret.clone(),
            recipients: recipients.to_vec(),
        })
    }
}

impl NotificationDelivery for WebhookDelivery {
    fn deliver(&self, notification: &Notification) -> Result<()> {
        let failed = |cause: String| Error::DeliveryFailed {
            transport: "webhook",
            cause,
        };

        let payload = WebhookPayload {
            delivery_id: uuid::Uuid::new_v4().to_string(),
            subject: &notification.subject,
            body: &notification.body,
            recipients: &self.recipients,
            sent_at: Utc::now().to_rfc3339(),
        };
        let json = serde_json::to_string(&payload)
            .map_err(|e| failed(format!("failed to encode payload: {e}")))?;

        let mut request = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .header("X-Jserrorlog-Delivery-Id", &payload.delivery_id);
        if let Some(secret) = &self.secret {
            request = request.header(
                "X-Jserrorlog-Signature",
                compute_signature(secret.expose_secret(), &json)?,
            );
        }

        let response = request
            .body(json)
            .send()
            .map_err(|e| failed(format!("HTTP request failed: {e}")))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(failed(format!("HTTP {} response", status.as_u16())))
        }
    }

    fn transport_name(&self) -> &'static str {
        "webhook"
    }
}

/// Computes the `sha256=<hex>` HMAC-SHA256 signature of a payload.
///
/// # Errors
///
/// Returns [`Error::DeliveryFailed`] if the key is rejected.
pub fn compute_signature(secret: &str, payload: &str) -> Result<String> {
    type HmacSha256 = Hmac<Sha256>;

    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|e| Error::DeliveryFailed {
            transport: "webhook",
            cause: format!("invalid signing key: {e}"),
        })?;
    mac.update(payload.as_bytes());

    Ok(format!("sha256={}", hex::encode(mac.finalize().into_bytes())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::TcpListener;
    use std::thread;
    use std::time::Duration;

    /// Accepts one HTTP request, answers with `status`, and returns the
    /// lowercased header block and the body.
    fn serve_once(status: &'static str) -> (String, thread::JoinHandle<(String, String)>) {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("local addr");

        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().expect("accept");
            let mut reader = BufReader::new(stream.try_clone().expect("clone stream"));

            let mut head = String::new();
            let mut content_length = 0;
            loop {
                let mut line = String::new();
                reader.read_line(&mut line).expect("read header");
                if line == "\r\n" || line.is_empty() {
                    break;
                }
                let lower = line.to_ascii_lowercase();
                if let Some(value) = lower.strip_prefix("content-length:") {
                    content_length = value.trim().parse().expect("content length");
                }
                head.push_str(&lower);
            }

            let mut body = vec![0; content_length];
            reader.read_exact(&mut body).expect("read body");
            write!(
                stream,
                "HTTP/1.1 {status}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
            )
            .expect("respond");

            (head, String::from_utf8_lossy(&body).into_owned())
        });

        (format!("http://{addr}/hook"), handle)
    }

    fn webhook(url: String, secret: Option<&str>) -> WebhookDelivery {
        let settings = WebhookSettings {
            url: Some(url),
            secret: secret.map(SecretString::from),
            timeout: Duration::from_secs(5),
        };
        WebhookDelivery::new(&settings, &[NotifyRecipient::new("Admin", "admin@example.com")])
            .expect("webhook delivery")
    }

    #[test]
    fn test_log_delivery() {
        let notification = Notification::new("[jserrorlog] JS_ERROR: boom", "## boom\n");
        LogDelivery.deliver(&notification).expect("log delivery never fails");
        assert_eq!(LogDelivery.transport_name(), "log");
    }

    #[test]
    fn test_signature_format() {
        let a = compute_signature("secret", r#"{"a":1}"#).expect("sign");
        let b = compute_signature("secret", r#"{"a":1}"#).expect("sign");
        let c = compute_signature("other", r#"{"a":1}"#).expect("sign");

        assert!(a.starts_with("sha256="));
        assert_eq!(a.len(), "sha256=".len() + 64);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_webhook_posts_signed_json() {
        let (url, server) = serve_once("200 OK");
        let delivery = webhook(url, Some("hook-secret"));

        delivery
            .deliver(&Notification::new("JS_ERROR: Err A", "## Err A\n"))
            .expect("deliver");
        let (head, body) = server.join().expect("server thread");

        let payload: serde_json::Value = serde_json::from_str(&body).expect("json body");
        assert_eq!(payload["subject"], "JS_ERROR: Err A");
        assert_eq!(payload["body"], "## Err A\n");
        assert_eq!(payload["recipients"][0]["address"], "admin@example.com");
        assert!(payload["delivery_id"].as_str().is_some_and(|id| id.len() == 36));

        let expected = compute_signature("hook-secret", &body).expect("sign");
        assert!(
            head.contains(&format!("x-jserrorlog-signature: {expected}")),
            "{head}"
        );
    }

    #[test]
    fn test_webhook_non_success_fails() {
        let (url, server) = serve_once("500 Internal Server Error");
        let delivery = webhook(url, None);

        let err = delivery
            .deliver(&Notification::new("s", "b"))
            .expect_err("500 is a failure");
        server.join().expect("server thread");

        assert!(matches!(
            err,
            Error::DeliveryFailed {
                transport: "webhook",
                ref cause
            } if cause.contains("500")
        ));
    }

    #[test]
    fn test_webhook_honors_timeout() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let url = format!("http://{}/hook", listener.local_addr().expect("local addr"));
        let server = thread::spawn(move || {
            // Accept and never answer.
            let (stream, _) = listener.accept().expect("accept");
            thread::sleep(Duration::from_secs(3));
            drop(stream);
        });

        let settings = WebhookSettings {
            url: Some(url),
            secret: None,
            timeout: Duration::from_millis(200),
        };
        let delivery = WebhookDelivery::new(&settings, &[]).expect("webhook delivery");

        let start = std::time::Instant::now();
        let err = delivery
            .deliver(&Notification::new("s", "b"))
            .expect_err("timed out");
        assert!(start.elapsed() < Duration::from_secs(2));
        assert!(matches!(err, Error::DeliveryFailed { transport: "webhook", .. }));
        server.join().expect("server thread");
    }

    #[test]
    fn test_webhook_requires_url() {
        let result = WebhookDelivery::new(&WebhookSettings::default(), &[]);
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    fn smtp_settings() -> SmtpSettings {
        SmtpSettings {
            host: Some("smtp.example.com".to_string()),
            from: Some("jserrorlog@example.com".to_string()),
            ..SmtpSettings::default()
        }
    }

    #[test]
    fn test_smtp_message_addresses_all_recipients() {
        let delivery = SmtpDelivery::new(
            &smtp_settings(),
            &[
                NotifyRecipient::new("Admin", "admin@example.com"),
                NotifyRecipient::new("", "ops@example.com"),
            ],
        )
        .expect("smtp delivery");

        let message = delivery
            .build_message(&Notification::new("[jserrorlog] JS_ERROR: boom", "## boom\n"))
            .expect("build")
            .expect("has recipients");
        let raw = String::from_utf8(message.formatted()).expect("utf8");

        assert!(raw.contains("admin@example.com"));
        assert!(raw.contains("ops@example.com"));
        assert!(raw.contains("Subject: [jserrorlog] JS_ERROR: boom"));
        assert!(raw.contains("## boom"));
    }

    #[test]
    fn test_smtp_without_recipients_is_noop() {
        let delivery = SmtpDelivery::new(&smtp_settings(), &[]).expect("smtp delivery");
        delivery
            .deliver(&Notification::new("s", "b"))
            .expect("nothing to send");
    }

    #[test]
    fn test_smtp_rejects_bad_from() {
        let settings = SmtpSettings {
            from: Some("not an address".to_string()),
            ..smtp_settings()
        };
        assert!(matches!(
            SmtpDelivery::new(&settings, &[]),
            Err(Error::InvalidInput(_))
        ));
    }
}
