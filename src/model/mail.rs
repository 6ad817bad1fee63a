//! The parsed mail record handed to receivers.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::mime::MessagePart;
use crate::sanitize::StringSanitizer;

use super::Attachment;

/// A fully parsed inbound message, populated by the command executors while
/// a client session runs and published to receivers after a successful DATA.
///
/// The `body` is the final representation shown to a viewer: the HTML body
/// when present, otherwise the text body, otherwise the decoded single-part
/// body.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MailItem {
    pub id: Uuid,
    pub date_sent: String,
    pub from_address: String,
    pub to_addresses: Vec<String>,
    pub subject: String,
    pub x_mailer: String,
    pub mime_version: String,
    pub body: String,
    pub content_type: String,
    pub boundary: String,
    pub transfer_encoding: String,
    pub attachments: Vec<Attachment>,

    #[serde(skip)]
    pub inline_attachments: Vec<Attachment>,
    #[serde(skip)]
    pub text_body: String,
    #[serde(skip)]
    pub html_body: String,
    #[serde(skip)]
    pub message: MessagePart,
    #[serde(skip)]
    pub created_at: DateTime<Utc>,
    #[serde(skip)]
    pub updated_at: DateTime<Utc>,
}

impl MailItem {
    /// Creates an empty mail record with a fresh id. Workers build one of
    /// these per transaction; RSET replaces the current record with a new
    /// empty one.
    pub fn empty() -> Self {
        let now = Utc::now();

        Self {
            id: Uuid::new_v4(),
            date_sent: String::new(),
            from_address: String::new(),
            to_addresses: Vec::new(),
            subject: String::new(),
            x_mailer: String::new(),
            mime_version: String::new(),
            body: String::new(),
            content_type: String::new(),
            boundary: String::new(),
            transfer_encoding: String::new(),
            attachments: Vec::new(),
            inline_attachments: Vec::new(),
            text_body: String::new(),
            html_body: String::new(),
            message: MessagePart::default(),
            created_at: now,
            updated_at: now,
        }
    }

    /// True when no executor has recorded anything on this item yet.
    pub fn is_empty(&self) -> bool {
        self.from_address.is_empty()
            && self.to_addresses.is_empty()
            && self.subject.is_empty()
            && self.body.is_empty()
            && self.attachments.is_empty()
    }

    /// Scrubs every user-controlled string through the sanitizer.
    pub fn sanitize(&mut self, sanitizer: &dyn StringSanitizer) {
        self.subject = sanitizer.sanitize(&self.subject);
        self.x_mailer = sanitizer.sanitize(&self.x_mailer);
        self.body = sanitizer.sanitize(&self.body);

        for attachment in self
            .attachments
            .iter_mut()
            .chain(self.inline_attachments.iter_mut())
        {
            attachment.sanitize(sanitizer);
        }
    }
}

impl Default for MailItem {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sanitize::XssSanitizer;

    #[test]
    fn empty_items_get_distinct_ids() {
        let a = MailItem::empty();
        let b = MailItem::empty();
        assert_ne!(a.id, b.id);
        assert!(a.is_empty());
    }

    #[test]
    fn sanitize_covers_subject_and_body() {
        let mut mail = MailItem::empty();
        mail.subject = "hi <script>x</script>".to_string();
        mail.body = "<script>steal()</script>ok".to_string();

        mail.sanitize(&XssSanitizer);

        assert_eq!(mail.subject, "hi ");
        assert_eq!(mail.body, "ok");
    }

    #[test]
    fn serializes_with_camel_case_keys() {
        let mail = MailItem::empty();
        let json = serde_json::to_value(&mail).unwrap();

        assert!(json.get("fromAddress").is_some());
        assert!(json.get("toAddresses").is_some());
        assert!(json.get("transferEncoding").is_some());
    }
}
