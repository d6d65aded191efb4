//! Transactional email.
//!
//! Uses SMTP via lettre for delivery with Askama text + HTML templates.

use askama::Template;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{MultiPart, SinglePart, header::ContentType},
    transport::smtp::{Error as SmtpError, authentication::Credentials},
};
use secrecy::ExposeSecret;
use thiserror::Error;

use crate::config::EmailConfig;
use crate::services::orders::{Mailer, TrackingEmail};

/// HTML template for the shipping notification.
#[derive(Template)]
#[template(path = "email/tracking.html")]
struct TrackingEmailHtml<'a> {
    greeting: &'a str,
    product_summary: &'a str,
    tracking_number: &'a str,
    tracking_url: &'a str,
    order_id: &'a str,
}

/// Plain text template for the shipping notification.
#[derive(Template)]
#[template(path = "email/tracking.txt")]
struct TrackingEmailText<'a> {
    greeting: &'a str,
    product_summary: &'a str,
    tracking_number: &'a str,
    tracking_url: &'a str,
    order_id: &'a str,
}

/// Errors that can occur when sending email.
#[derive(Debug, Error)]
pub enum EmailError {
    /// SMTP transport error.
    #[error("SMTP error: {0}")]
    Smtp(#[from] SmtpError),

    /// Failed to build email message.
    #[error("Failed to build message: {0}")]
    MessageBuild(#[from] lettre::error::Error),

    /// Invalid email address.
    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    /// Template rendering error.
    #[error("Template error: {0}")]
    Template(#[from] askama::Error),
}

/// Subject line of the shipping notification.
pub const TRACKING_SUBJECT: &str = "Your Roastery order has shipped";

/// "Hi Ada," or a generic greeting when no name is known.
#[must_use]
pub fn greeting(first_name: Option<&str>) -> String {
    match first_name.map(str::trim).filter(|name| !name.is_empty()) {
        Some(name) => format!("Hi {name},"),
        None => "Hi there,".to_owned(),
    }
}

/// Render the text and HTML bodies of a shipping notification.
///
/// # Errors
///
/// Returns [`EmailError::Template`] if rendering fails.
pub fn render_tracking(email: &TrackingEmail) -> Result<(String, String), EmailError> {
    let greeting = greeting(email.first_name.as_deref());
    let text = TrackingEmailText {
        greeting: &greeting,
        product_summary: &email.product_summary,
        tracking_number: &email.tracking_number,
        tracking_url: &email.tracking_url,
        order_id: email.order_id.as_str(),
    }
    .render()?;
    let html = TrackingEmailHtml {
        greeting: &greeting,
        product_summary: &email.product_summary,
        tracking_number: &email.tracking_number,
        tracking_url: &email.tracking_url,
        order_id: email.order_id.as_str(),
    }
    .render()?;
    Ok((text, html))
}

/// Email service for sending transactional emails.
#[derive(Clone)]
pub struct EmailService {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from_address: String,
}

impl EmailService {
    /// Create a new email service from configuration.
    ///
    /// # Errors
    ///
    /// Returns error if the relay host is invalid.
    pub fn new(config: &EmailConfig) -> Result<Self, SmtpError> {
        let credentials = Credentials::new(
            config.smtp_username.clone(),
            config.smtp_password.expose_secret().to_string(),
        );

        let mailer = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)?
            .port(config.smtp_port)
            .credentials(credentials)
            .build();

        Ok(Self {
            mailer,
            from_address: config.from_address.clone(),
        })
    }

    /// Send a multipart email with both plain text and HTML versions.
    async fn send_multipart_email(
        &self,
        to: &str,
        subject: &str,
        text_body: String,
        html_body: String,
    ) -> Result<(), EmailError> {
        let email = Message::builder()
            .from(
                self.from_address
                    .parse()
                    .map_err(|_| EmailError::InvalidAddress(self.from_address.clone()))?,
            )
            .to(to
                .parse()
                .map_err(|_| EmailError::InvalidAddress(to.to_string()))?)
            .subject(subject)
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(text_body),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(html_body),
                    ),
            )?;

        self.mailer.send(email).await?;

        tracing::info!(to = %to, subject = %subject, "Email sent successfully");
        Ok(())
    }
}

impl Mailer for EmailService {
    async fn send_tracking_email(&self, email: &TrackingEmail) -> Result<(), EmailError> {
        let (text, html) = render_tracking(email)?;
        self.send_multipart_email(email.to.as_str(), TRACKING_SUBJECT, text, html)
            .await
    }
}
