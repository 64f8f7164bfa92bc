//! Contact-form intake and the admin inbox.

use super::{
    Pagination, ServiceError, ServiceResult, SortOrder, like_pattern,
    mail_service::{self, MailError, Mailer, OutgoingMail},
    media::{ATTACHMENTS_FOLDER, MediaStore, UploadOptions, UploadedFile, delete_soft},
    page_window, search_document,
    settings_service::SettingsStore,
    side_effect::{Outcome, SideEffect},
};
use crate::models::{
    media::{Attachment, ResourceType},
    message::{Message, MessageKind, MessageMetadata, MessageStatus, Priority, Reply, Sender},
    settings::{SiteSettings, looks_like_email},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{QueryBuilder, Sqlite, SqlitePool, types::Json};
use std::{collections::BTreeMap, sync::Arc};
use tracing::{info, instrument};
use uuid::Uuid;

pub const DEFAULT_LIMIT: u32 = 10;

/// Public contact form. Everything is optional at the type level so a
/// missing field produces the form's own error message.
#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct ContactForm {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub company: Option<String>,
    pub position: Option<String>,
    pub inquiry_type: Option<String>,
    pub subject: Option<String>,
    pub message: Option<String>,
}

fn required(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn optional(value: Option<String>) -> Option<String> {
    required(&value)
}

/// Request details recorded with a submission.
#[derive(Debug, Clone, Default)]
pub struct ClientInfo {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum MessageSort {
    #[default]
    CreatedAt,
    UpdatedAt,
    Status,
    Priority,
    Subject,
}

impl MessageSort {
    fn column(self) -> &'static str {
        match self {
            MessageSort::CreatedAt => "created_at",
            MessageSort::UpdatedAt => "updated_at",
            MessageSort::Status => "status",
            MessageSort::Priority => {
                "CASE priority WHEN 'low' THEN 0 WHEN 'medium' THEN 1 WHEN 'high' THEN 2 ELSE 3 END"
            }
            MessageSort::Subject => "json_extract(search_doc, '$.subject')",
        }
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct MessageFilter {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub status: Option<MessageStatus>,
    #[serde(rename = "type")]
    pub kind: Option<MessageKind>,
    pub priority: Option<Priority>,
    pub search: Option<String>,
    pub sort_by: Option<MessageSort>,
    pub sort_order: Option<SortOrder>,
}

#[derive(Serialize, Debug)]
pub struct MessagePage {
    pub messages: Vec<Message>,
    pub pagination: Pagination,
}

#[derive(Serialize, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MessageStats {
    pub total_messages: i64,
    pub new_messages: i64,
    pub today_messages: i64,
    pub status_stats: BTreeMap<String, i64>,
    pub type_stats: BTreeMap<String, i64>,
    pub priority_stats: BTreeMap<String, i64>,
}

#[derive(Clone)]
pub struct MessageService {
    db: Arc<SqlitePool>,
    media: Arc<dyn MediaStore>,
    mailer: Option<Arc<dyn Mailer>>,
    settings: SettingsStore<SiteSettings>,
}

impl MessageService {
    pub fn new(
        db: Arc<SqlitePool>,
        media: Arc<dyn MediaStore>,
        mailer: Option<Arc<dyn Mailer>>,
        settings: SettingsStore<SiteSettings>,
    ) -> Self {
        Self {
            db,
            media,
            mailer,
            settings,
        }
    }

    /// Send a rendered mail; a render failure is recorded like a send failure.
    async fn send_mail(&self, action: &str, mail: Result<OutgoingMail, MailError>) -> (SideEffect, bool) {
        let mail = match mail {
            Ok(mail) => mail,
            Err(err) => return (SideEffect::failed(action, err), false),
        };
        match &self.mailer {
            None => (SideEffect::skipped(action, "mail relay is not configured"), false),
            Some(mailer) => {
                let result = mailer.send(mail).await;
                (SideEffect::from_result(action, &result), result.is_ok())
            }
        }
    }

    async fn store_attachment(&self, file: &UploadedFile) -> Result<Attachment, super::media::MediaError> {
        let resource_type = ResourceType::for_mime(&file.content_type);
        let options = UploadOptions::new(ATTACHMENTS_FOLDER, resource_type, file);
        let asset = self.media.upload(file.data.clone(), options).await?;
        Ok(Attachment {
            filename: file.filename.clone(),
            url: asset.url,
            public_id: asset.public_id,
            size: file.data.len() as u64,
            mime_type: file.content_type.clone(),
            resource_type,
        })
    }

    /// Accept a contact form. The attachment upload and both mails are
    /// best-effort; the message is stored regardless.
    #[instrument(skip_all)]
    pub async fn submit(
        &self,
        form: ContactForm,
        attachment: Option<UploadedFile>,
        client: ClientInfo,
    ) -> ServiceResult<Outcome<Message>> {
        let (
            Some(first_name),
            Some(last_name),
            Some(email),
            Some(phone),
            Some(inquiry_type),
            Some(subject),
            Some(content),
        ) = (
            required(&form.first_name),
            required(&form.last_name),
            required(&form.email),
            required(&form.phone),
            required(&form.inquiry_type),
            required(&form.subject),
            required(&form.message),
        )
        else {
            return Err(ServiceError::validation("All required fields must be filled"));
        };

        let kind: MessageKind = serde_json::from_value(serde_json::Value::String(inquiry_type))
            .map_err(|_| ServiceError::validation("Invalid inquiry type"))?;
        let mut errors = Vec::new();
        if !looks_like_email(&email) {
            errors.push("Please provide a valid email");
        }
        if subject.chars().count() > 200 {
            errors.push("Subject cannot exceed 200 characters");
        }
        if content.chars().count() > 2000 {
            errors.push("Message cannot exceed 2000 characters");
        }
        if !errors.is_empty() {
            return Err(ServiceError::validation_details("Validation failed", errors));
        }
        if let Some(file) = &attachment {
            file.validate()?;
        }

        let mut effects = Vec::new();
        let mut attachments = Vec::new();
        if let Some(file) = &attachment {
            let result = self.store_attachment(file).await;
            effects.push(SideEffect::from_result(
                format!("media.upload:{}", file.filename),
                &result,
            ));
            attachments.extend(result.ok());
        }

        let now = Utc::now();
        let message = Message {
            id: Uuid::new_v4(),
            kind,
            sender: Sender {
                name: format!("{first_name} {last_name}"),
                email: email.to_lowercase(),
                phone,
                company: optional(form.company),
                position: optional(form.position),
            },
            subject,
            content,
            status: MessageStatus::New,
            priority: Priority::default(),
            assigned_to: None,
            replies: Vec::new(),
            attachments,
            metadata: MessageMetadata {
                ip_address: client.ip_address,
                user_agent: client.user_agent,
                source: "website".into(),
            },
            resolved_at: None,
            created_at: now,
            updated_at: now,
        };

        if let Err(err) = self.insert(&message).await {
            for a in &message.attachments {
                delete_soft(&*self.media, &a.public_id, a.resource_type).await;
            }
            return Err(err);
        }
        info!(id = %message.id, kind = ?message.kind, "contact message received");

        // The message is stored; without settings neither mail can be addressed.
        let settings = match self.settings.get_current().await {
            Ok(current) => current.document,
            Err(err) => {
                effects.push(SideEffect::failed("mail.notify_company", &err));
                effects.push(SideEffect::failed("mail.confirm_sender", &err));
                return Ok(Outcome::with_effects(message, effects));
            }
        };
        if settings.notifications.email_on_new_contact {
            let mail = mail_service::company_notification(&message, &settings);
            effects.push(self.send_mail("mail.notify_company", mail).await.0);
        } else {
            effects.push(SideEffect::skipped(
                "mail.notify_company",
                "new-contact notifications are disabled",
            ));
        }
        let mail = mail_service::sender_confirmation(&message, &settings);
        effects.push(self.send_mail("mail.confirm_sender", mail).await.0);

        Ok(Outcome::with_effects(message, effects))
    }

    pub async fn list(&self, filter: MessageFilter) -> ServiceResult<MessagePage> {
        let (page, limit, offset) = page_window(filter.page, filter.limit, DEFAULT_LIMIT);

        let build = |select: &str| {
            let mut qb = QueryBuilder::<Sqlite>::new(select);
            qb.push(" FROM messages WHERE 1 = 1");
            if let Some(status) = filter.status {
                qb.push(" AND status = ").push_bind(status);
            }
            if let Some(kind) = filter.kind {
                qb.push(" AND kind = ").push_bind(kind);
            }
            if let Some(priority) = filter.priority {
                qb.push(" AND priority = ").push_bind(priority);
            }
            if let Some(search) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
                let pattern = like_pattern(search);
                qb.push(" AND (");
                for (i, path) in ["$.sender.name", "$.sender.email", "$.subject", "$.content"]
                    .into_iter()
                    .enumerate()
                {
                    if i > 0 {
                        qb.push(" OR ");
                    }
                    qb.push("json_extract(search_doc, '")
                        .push(path)
                        .push("') LIKE ")
                        .push_bind(pattern.clone())
                        .push(r" ESCAPE '\'");
                }
                qb.push(")");
            }
            qb
        };

        let total: i64 = build("SELECT COUNT(*)")
            .build_query_scalar()
            .fetch_one(&*self.db)
            .await?;

        let order = filter.sort_order.unwrap_or_default().as_sql();
        let mut qb = build("SELECT data");
        qb.push(" ORDER BY ")
            .push(filter.sort_by.unwrap_or_default().column())
            .push(" ")
            .push(order)
            .push(", created_at DESC LIMIT ")
            .push_bind(limit as i64)
            .push(" OFFSET ")
            .push_bind(offset);
        let rows: Vec<Json<Message>> = qb.build_query_scalar().fetch_all(&*self.db).await?;

        Ok(MessagePage {
            messages: rows.into_iter().map(|Json(m)| m).collect(),
            pagination: Pagination::new(page, limit, total as u64),
        })
    }

    async fn insert(&self, message: &Message) -> ServiceResult<()> {
        sqlx::query(
            "INSERT INTO messages (id, kind, status, priority, data, search_doc, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(message.id)
        .bind(message.kind)
        .bind(message.status)
        .bind(message.priority)
        .bind(Json(message))
        .bind(Json(search_document(message)?))
        .bind(message.created_at)
        .bind(message.updated_at)
        .execute(&*self.db)
        .await?;
        Ok(())
    }

    async fn load(&self, id: Uuid) -> ServiceResult<Message> {
        let row: Option<Json<Message>> = sqlx::query_scalar("SELECT data FROM messages WHERE id = ?")
            .bind(id)
            .fetch_optional(&*self.db)
            .await?;
        row.map(|Json(m)| m)
            .ok_or_else(|| ServiceError::not_found("Message not found"))
    }

    async fn persist(&self, message: &mut Message) -> ServiceResult<()> {
        message.updated_at = Utc::now();
        sqlx::query(
            "UPDATE messages SET kind = ?, status = ?, priority = ?, data = ?, search_doc = ?, updated_at = ? WHERE id = ?",
        )
        .bind(message.kind)
        .bind(message.status)
        .bind(message.priority)
        .bind(Json(&*message))
        .bind(Json(search_document(&*message)?))
        .bind(message.updated_at)
        .bind(message.id)
        .execute(&*self.db)
        .await?;
        Ok(())
    }

    /// Fetch one message; opening a new message marks it read.
    pub async fn get(&self, id: Uuid) -> ServiceResult<Message> {
        let mut message = self.load(id).await?;
        if message.status == MessageStatus::New {
            message.transition(MessageStatus::Read, Utc::now());
            self.persist(&mut message).await?;
        }
        Ok(message)
    }

    pub async fn update_status(&self, id: Uuid, status: MessageStatus) -> ServiceResult<Message> {
        let mut message = self.load(id).await?;
        message.transition(status, Utc::now());
        self.persist(&mut message).await?;
        info!(%id, ?status, "message status changed");
        Ok(message)
    }

    /// Append a staff reply and mail it to the sender. The reply is kept
    /// even when the mail cannot be sent; `emailSent` records the result.
    #[instrument(skip(self, content))]
    pub async fn reply(&self, id: Uuid, content: Option<String>, actor: Uuid) -> ServiceResult<Outcome<Message>> {
        let content = required(&content)
            .ok_or_else(|| ServiceError::validation("Reply content is required"))?;
        let mut message = self.load(id).await?;

        let now = Utc::now();
        message.replies.push(Reply {
            content: content.clone(),
            sent_by: actor,
            sent_at: now,
            email_sent: false,
            email_sent_at: None,
        });
        message.transition(MessageStatus::Replied, now);
        message.assigned_to = Some(actor);
        self.persist(&mut message).await?;

        let (effect, sent) = match self.settings.get_current().await {
            Ok(current) => {
                let mail = mail_service::reply(&message, &content, &current.document);
                self.send_mail("mail.reply", mail).await
            }
            Err(err) => (SideEffect::failed("mail.reply", &err), false),
        };
        if sent {
            if let Some(reply) = message.replies.last_mut() {
                reply.email_sent = true;
                reply.email_sent_at = Some(Utc::now());
            }
            self.persist(&mut message).await?;
        }
        Ok(Outcome::with_effects(message, vec![effect]))
    }

    pub async fn delete(&self, id: Uuid) -> ServiceResult<Outcome<()>> {
        let message = self.load(id).await?;
        let mut effects = Vec::with_capacity(message.attachments.len());
        for attachment in &message.attachments {
            effects.push(delete_soft(&*self.media, &attachment.public_id, attachment.resource_type).await);
        }
        sqlx::query("DELETE FROM messages WHERE id = ?")
            .bind(id)
            .execute(&*self.db)
            .await?;
        info!(%id, "message deleted");
        Ok(Outcome::with_effects((), effects))
    }

    async fn counts_by(&self, column: &str) -> ServiceResult<BTreeMap<String, i64>> {
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT ");
        qb.push(column)
            .push(", COUNT(*) FROM messages GROUP BY ")
            .push(column);
        let rows: Vec<(String, i64)> = qb.build_query_as().fetch_all(&*self.db).await?;
        Ok(rows.into_iter().collect())
    }

    pub async fn stats(&self) -> ServiceResult<MessageStats> {
        let start_of_day: DateTime<Utc> = Utc::now()
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .unwrap_or_default()
            .and_utc();
        let (total, new, today): (i64, i64, i64) = sqlx::query_as(
            "SELECT COUNT(*),
                    COALESCE(SUM(status = 'new'), 0),
                    COALESCE(SUM(created_at >= ?), 0)
             FROM messages",
        )
        .bind(start_of_day)
        .fetch_one(&*self.db)
        .await?;

        Ok(MessageStats {
            total_messages: total,
            new_messages: new,
            today_messages: today,
            status_stats: self.counts_by("status").await?,
            type_stats: self.counts_by("kind").await?,
            priority_stats: self.counts_by("priority").await?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{
        db::test_pool,
        mail_service::testing::RecordingMailer,
        media::testing::MemoryMediaStore,
    };
    use bytes::Bytes;

    struct Fixture {
        db: Arc<SqlitePool>,
        svc: MessageService,
        mailer: Arc<RecordingMailer>,
        media: Arc<MemoryMediaStore>,
    }

    async fn fixture(mailer: RecordingMailer, media: MemoryMediaStore) -> Fixture {
        let db = test_pool().await;
        let mailer = Arc::new(mailer);
        let media = Arc::new(media);
        let svc = MessageService::new(
            db.clone(),
            media.clone(),
            Some(mailer.clone() as Arc<dyn Mailer>),
            SettingsStore::new(db.clone()),
        );
        Fixture { db, svc, mailer, media }
    }

    fn form() -> ContactForm {
        ContactForm {
            first_name: Some("Petar".into()),
            last_name: Some("Petrović".into()),
            email: Some("Petar@Example.com".into()),
            phone: Some("+381601234567".into()),
            company: Some("  ".into()),
            position: None,
            inquiry_type: Some("inquiry".into()),
            subject: Some("Ponuda".into()),
            message: Some("Zanima me cena.".into()),
        }
    }

    fn txt() -> UploadedFile {
        UploadedFile {
            field: "attachment".into(),
            filename: "spec.txt".into(),
            content_type: "text/plain".into(),
            data: Bytes::from_static(b"specifikacija"),
        }
    }

    #[tokio::test]
    async fn submit_stores_message_and_sends_both_mails() {
        let f = fixture(RecordingMailer::default(), MemoryMediaStore::default()).await;
        let outcome = f
            .svc
            .submit(form(), Some(txt()), ClientInfo::default())
            .await
            .unwrap();
        let message = outcome.value;
        assert_eq!(message.status, MessageStatus::New);
        assert_eq!(message.sender.name, "Petar Petrović");
        assert_eq!(message.sender.email, "petar@example.com");
        assert_eq!(message.sender.company, None);
        assert_eq!(message.attachments.len(), 1);
        assert_eq!(message.attachments[0].resource_type, ResourceType::Raw);
        assert_eq!(f.media.len(), 1);

        let sent = f.mailer.sent.lock().unwrap();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].to, SiteSettings::default().company_email);
        assert_eq!(sent[1].to, "petar@example.com");
    }

    #[tokio::test]
    async fn submit_survives_mail_and_upload_failures() {
        let mailer = RecordingMailer {
            fail: true,
            ..Default::default()
        };
        let f = fixture(mailer, MemoryMediaStore::failing()).await;
        let outcome = f
            .svc
            .submit(form(), Some(txt()), ClientInfo::default())
            .await
            .unwrap();
        assert!(outcome.value.attachments.is_empty());
        assert_eq!(outcome.side_effects.len(), 3);
        assert!(outcome.side_effects.iter().all(SideEffect::is_failed));
        assert_eq!(f.svc.list(MessageFilter::default()).await.unwrap().pagination.total, 1);
    }

    #[tokio::test]
    async fn submit_keeps_message_when_settings_are_unreadable() {
        let f = fixture(RecordingMailer::default(), MemoryMediaStore::default()).await;
        sqlx::query("DROP TABLE settings").execute(&*f.db).await.unwrap();

        let outcome = f
            .svc
            .submit(form(), None, ClientInfo::default())
            .await
            .unwrap();
        assert_eq!(outcome.side_effects.len(), 2);
        assert!(outcome.side_effects.iter().all(SideEffect::is_failed));
        assert!(f.mailer.sent.lock().unwrap().is_empty());
        assert_eq!(f.svc.get(outcome.value.id).await.unwrap().subject, "Ponuda");
    }

    #[tokio::test]
    async fn submit_requires_all_fields() {
        let f = fixture(RecordingMailer::default(), MemoryMediaStore::default()).await;
        let mut incomplete = form();
        incomplete.phone = None;
        let err = f
            .svc
            .submit(incomplete, None, ClientInfo::default())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "All required fields must be filled");

        let mut bad_type = form();
        bad_type.inquiry_type = Some("spam".into());
        assert!(f.svc.submit(bad_type, None, ClientInfo::default()).await.is_err());
        assert!(f.mailer.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn get_marks_new_messages_read() {
        let f = fixture(RecordingMailer::default(), MemoryMediaStore::default()).await;
        let id = f.svc.submit(form(), None, ClientInfo::default()).await.unwrap().value.id;
        assert_eq!(f.svc.get(id).await.unwrap().status, MessageStatus::Read);

        let resolved = f.svc.update_status(id, MessageStatus::Resolved).await.unwrap();
        let stamped = resolved.resolved_at.unwrap();
        let again = f.svc.update_status(id, MessageStatus::Resolved).await.unwrap();
        assert_eq!(again.resolved_at, Some(stamped));
        assert!(f.svc.get(Uuid::new_v4()).await.is_err());
    }

    #[tokio::test]
    async fn reply_records_mail_result() {
        let f = fixture(RecordingMailer::default(), MemoryMediaStore::default()).await;
        let id = f.svc.submit(form(), None, ClientInfo::default()).await.unwrap().value.id;
        let actor = Uuid::new_v4();

        assert!(f.svc.reply(id, Some("  ".into()), actor).await.is_err());
        let message = f.svc.reply(id, Some("Cena je 100 RSD.".into()), actor).await.unwrap().value;
        assert_eq!(message.status, MessageStatus::Replied);
        assert_eq!(message.assigned_to, Some(actor));
        assert!(message.replies[0].email_sent);
        assert_eq!(f.mailer.sent.lock().unwrap().last().unwrap().subject, "Re: Ponuda");
    }

    #[tokio::test]
    async fn list_filters_and_stats() {
        let f = fixture(RecordingMailer::default(), MemoryMediaStore::default()).await;
        let first = f.svc.submit(form(), None, ClientInfo::default()).await.unwrap().value;
        let mut order = form();
        order.inquiry_type = Some("order".into());
        order.subject = Some("Porudžbina 50%".into());
        f.svc.submit(order, None, ClientInfo::default()).await.unwrap();
        f.svc.update_status(first.id, MessageStatus::Archived).await.unwrap();

        let orders = f
            .svc
            .list(MessageFilter {
                kind: Some(MessageKind::Order),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(orders.messages.len(), 1);

        let searched = f
            .svc
            .list(MessageFilter {
                search: Some("50%".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(searched.pagination.total, 1);

        for term in ["PORUDŽBINA", "porudžbina", "Porudžbina"] {
            let found = f
                .svc
                .list(MessageFilter {
                    search: Some(term.into()),
                    ..Default::default()
                })
                .await
                .unwrap();
            assert_eq!(found.pagination.total, 1, "{term}");
        }
        let by_sender = f
            .svc
            .list(MessageFilter {
                search: Some("PETROVIĆ".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(by_sender.pagination.total, 2);

        let stats = f.svc.stats().await.unwrap();
        assert_eq!(stats.total_messages, 2);
        assert_eq!(stats.new_messages, 1);
        assert_eq!(stats.today_messages, 2);
        assert_eq!(stats.status_stats.get("archived"), Some(&1));
        assert_eq!(stats.type_stats.get("order"), Some(&1));
    }

    #[tokio::test]
    async fn delete_removes_attachments_softly() {
        let f = fixture(RecordingMailer::default(), MemoryMediaStore::default()).await;
        let id = f
            .svc
            .submit(form(), Some(txt()), ClientInfo::default())
            .await
            .unwrap()
            .value
            .id;
        let outcome = f.svc.delete(id).await.unwrap();
        assert_eq!(outcome.side_effects.len(), 1);
        assert_eq!(f.media.len(), 0);
        assert!(f.svc.get(id).await.is_err());
    }
}
