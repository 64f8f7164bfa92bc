//! Outbound notification mail over SMTP.
//!
//! Bodies are rendered from the Askama templates in `templates/email/` and
//! sent as `multipart/alternative` with a plain-text and an HTML part.

use crate::models::{
    media::Attachment,
    message::{Message, MessageKind},
    settings::SiteSettings,
};
use askama::Template;
use async_trait::async_trait;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Tokio1Executor,
    message::{Mailbox, MultiPart, SinglePart, header::ContentType},
    transport::smtp::{Error as SmtpError, authentication::Credentials},
};
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum MailError {
    #[error("SMTP error: {0}")]
    Smtp(#[from] SmtpError),
    #[error("failed to build message: {0}")]
    MessageBuild(#[from] lettre::error::Error),
    #[error("invalid email address: {0}")]
    InvalidAddress(String),
    #[error("template error: {0}")]
    Template(#[from] askama::Error),
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingMail {
    pub to: String,
    pub subject: String,
    pub html: String,
    pub text: String,
    pub reply_to: Option<String>,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    /// Deliver `mail` and return the Message-ID it was sent with.
    async fn send(&self, mail: OutgoingMail) -> Result<String, MailError>;
}

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<SecretString>,
    pub from: String,
    pub from_name: String,
}

#[derive(Clone)]
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    domain: String,
}

fn parse_mailbox(address: &str) -> Result<Mailbox, MailError> {
    address
        .parse()
        .map_err(|_| MailError::InvalidAddress(address.to_string()))
}

impl SmtpMailer {
    pub fn new(config: &SmtpConfig) -> Result<Self, MailError> {
        let mut builder =
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)?.port(config.port);
        if let (Some(user), Some(pass)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(
                user.clone(),
                pass.expose_secret().to_string(),
            ));
        }

        let address = parse_mailbox(&config.from)?;
        let domain = address.email.domain().to_string();
        let from = Mailbox::new(Some(config.from_name.clone()), address.email);

        Ok(Self {
            transport: builder.build(),
            from,
            domain,
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, mail: OutgoingMail) -> Result<String, MailError> {
        let message_id = format!("<{}@{}>", Uuid::new_v4(), self.domain);
        let mut builder = lettre::Message::builder()
            .from(self.from.clone())
            .to(parse_mailbox(&mail.to)?)
            .subject(mail.subject.as_str())
            .message_id(Some(message_id.clone()));
        if let Some(reply_to) = &mail.reply_to {
            builder = builder.reply_to(parse_mailbox(reply_to)?);
        }
        let email = builder.multipart(
            MultiPart::alternative()
                .singlepart(
                    SinglePart::builder()
                        .header(ContentType::TEXT_PLAIN)
                        .body(mail.text),
                )
                .singlepart(
                    SinglePart::builder()
                        .header(ContentType::TEXT_HTML)
                        .body(mail.html),
                ),
        )?;

        self.transport.send(email).await?;
        info!(to = %mail.to, subject = %mail.subject, "email sent");
        Ok(message_id)
    }
}

fn kind_label(kind: MessageKind) -> &'static str {
    match kind {
        MessageKind::Inquiry => "Upit",
        MessageKind::Order => "Porudžbina",
        MessageKind::Support => "Podrška",
        MessageKind::Other => "Ostalo",
    }
}

/// Values shared by every contact-message template.
struct MailContext<'a> {
    first_name: &'a str,
    name: &'a str,
    email: &'a str,
    phone: &'a str,
    company: Option<&'a str>,
    position: Option<&'a str>,
    kind: &'static str,
    subject: &'a str,
    content: &'a str,
    attachments: &'a [Attachment],
    id: Uuid,
    date: String,
    company_phone: &'a str,
    company_email: &'a str,
}

impl<'a> MailContext<'a> {
    fn new(message: &'a Message, settings: &'a SiteSettings) -> Self {
        let sender = &message.sender;
        Self {
            first_name: sender.first_name(),
            name: &sender.name,
            email: &sender.email,
            phone: &sender.phone,
            company: sender.company.as_deref(),
            position: sender.position.as_deref(),
            kind: kind_label(message.kind),
            subject: &message.subject,
            content: &message.content,
            attachments: &message.attachments,
            id: message.id,
            date: message.created_at.format("%d.%m.%Y. %H:%M").to_string(),
            company_phone: &settings.company_phone,
            company_email: &settings.company_email,
        }
    }
}

#[derive(Template)]
#[template(path = "email/company_notification.html")]
struct CompanyNotificationHtml<'a> {
    mail: &'a MailContext<'a>,
}

#[derive(Template)]
#[template(path = "email/company_notification.txt")]
struct CompanyNotificationText<'a> {
    mail: &'a MailContext<'a>,
}

#[derive(Template)]
#[template(path = "email/sender_confirmation.html")]
struct SenderConfirmationHtml<'a> {
    mail: &'a MailContext<'a>,
}

#[derive(Template)]
#[template(path = "email/sender_confirmation.txt")]
struct SenderConfirmationText<'a> {
    mail: &'a MailContext<'a>,
}

#[derive(Template)]
#[template(path = "email/reply.html")]
struct ReplyHtml<'a> {
    mail: &'a MailContext<'a>,
    reply: &'a str,
}

#[derive(Template)]
#[template(path = "email/reply.txt")]
struct ReplyText<'a> {
    mail: &'a MailContext<'a>,
    reply: &'a str,
}

/// Notification to the company inbox about a new contact message.
pub fn company_notification(message: &Message, settings: &SiteSettings) -> Result<OutgoingMail, MailError> {
    let mail = MailContext::new(message, settings);
    Ok(OutgoingMail {
        to: settings.company_email.clone(),
        subject: format!("Nova poruka: {}", message.subject),
        html: CompanyNotificationHtml { mail: &mail }.render()?,
        text: CompanyNotificationText { mail: &mail }.render()?,
        reply_to: Some(message.sender.email.clone()),
    })
}

/// Acknowledgement sent back to whoever submitted the form.
pub fn sender_confirmation(message: &Message, settings: &SiteSettings) -> Result<OutgoingMail, MailError> {
    let mail = MailContext::new(message, settings);
    Ok(OutgoingMail {
        to: message.sender.email.clone(),
        subject: "Potvrda - Poruka uspešno poslata - Nissal".into(),
        html: SenderConfirmationHtml { mail: &mail }.render()?,
        text: SenderConfirmationText { mail: &mail }.render()?,
        reply_to: None,
    })
}

/// Staff reply to a contact message, quoting the original.
pub fn reply(message: &Message, content: &str, settings: &SiteSettings) -> Result<OutgoingMail, MailError> {
    let mail = MailContext::new(message, settings);
    Ok(OutgoingMail {
        to: message.sender.email.clone(),
        subject: format!("Re: {}", message.subject),
        html: ReplyHtml { mail: &mail, reply: content }.render()?,
        text: ReplyText { mail: &mail, reply: content }.render()?,
        reply_to: Some(settings.company_email.clone()),
    })
}
