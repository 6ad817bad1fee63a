//! Attachments: MIME subparts that were not chosen as the message body.

use serde::Serialize;
use uuid::Uuid;

use crate::mime::MessagePart;
use crate::sanitize::StringSanitizer;

/// Parsed header block of an attachment part.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentHeader {
    pub content_type: String,
    pub mime_version: String,
    pub content_transfer_encoding: String,
    pub content_disposition: String,
    pub file_name: String,
    #[serde(skip)]
    pub body: String,
}

impl AttachmentHeader {
    /// Lifts the relevant headers out of a message part.
    pub fn from_part(part: &MessagePart) -> Self {
        Self {
            content_type: part.content_type().to_string(),
            mime_version: part.header("MIME-Version").to_string(),
            content_transfer_encoding: part.header("Content-Transfer-Encoding").to_string(),
            content_disposition: part.content_disposition().to_string(),
            file_name: part.filename(),
            body: part.body().to_string(),
        }
    }
}

/// Content embedded in the mail data that is not the body. Contents are kept
/// exactly as received; decoding is the viewer's concern.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub id: Uuid,
    pub mail_id: Uuid,
    pub file_name: String,
    pub content_type: String,
    pub contents: String,
    pub headers: AttachmentHeader,
}

impl Attachment {
    pub fn from_part(part: &MessagePart, mail_id: Uuid) -> Self {
        let headers = AttachmentHeader::from_part(part);

        Self {
            id: Uuid::new_v4(),
            mail_id,
            file_name: headers.file_name.clone(),
            content_type: headers.content_type.clone(),
            contents: part.body().to_string(),
            headers,
        }
    }

    /// Heuristic used by viewers to decide whether contents can be rendered
    /// directly from base64: length (ignoring whitespace) is a multiple of
    /// four and every character is in the base64 alphabet, with at most two
    /// trailing padding characters.
    pub fn is_content_base64(&self) -> bool {
        let compact: String = self
            .contents
            .chars()
            .filter(|c| !matches!(c, ' ' | '\n' | '\r' | '\t'))
            .collect();

        if compact.is_empty() || compact.len() % 4 != 0 {
            return false;
        }

        let padding = compact.chars().rev().take_while(|&c| c == '=').count();
        if padding > 2 {
            return false;
        }

        compact[..compact.len() - padding]
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '/')
    }

    pub fn sanitize(&mut self, sanitizer: &dyn StringSanitizer) {
        self.file_name = sanitizer.sanitize(&self.file_name);
        self.headers.file_name = self.file_name.clone();
    }
}
