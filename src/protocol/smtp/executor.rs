//! Command executors: each validates its own contract against the current
//! mail item and answers the client. Commands may arrive in any order; an
//! executor checks only what it needs, so RCPT without MAIL is fine and RSET
//! can always start the transaction over.

use tracing::debug;

use crate::mime::{self, datetime, MessagePart};
use crate::model::{Attachment, MailItem};
use crate::sanitize::StringSanitizer;

use super::address;
use super::command::{command_value, is_valid_command, Command};
use super::error::SmtpError;
use super::writer::Writer;

/// Null return path: a valid MAIL FROM with no sender (RFC 5321 §3.6.3,
/// used for bounces).
const NULL_RETURN_PATH: &str = "<>";

/// Runs a non-DATA command. DATA and QUIT are driven by the worker loop
/// because they change what happens on the wire next.
pub async fn execute(
    command: Command,
    input: &str,
    mail: &mut MailItem,
    writer: &mut Writer,
    sanitizer: &dyn StringSanitizer,
) -> Result<(), SmtpError> {
    match command {
        Command::Helo => helo(input, writer).await,
        Command::Mail => mail_from(input, mail, writer, sanitizer).await,
        Command::Rcpt => rcpt_to(input, mail, writer, sanitizer).await,
        Command::Rset => rset(input, mail, writer).await,
        Command::Noop => noop(input, writer).await,
        Command::Data | Command::Quit => Ok(()),
    }
}

async fn helo(input: &str, writer: &mut Writer) -> Result<(), SmtpError> {
    let lowered = input.to_lowercase();
    if !lowered.starts_with("helo") && !lowered.starts_with("ehlo") {
        return Err(SmtpError::InvalidCommand("HELO".to_string()));
    }

    if input.split_whitespace().count() < 2 {
        return Err(SmtpError::InvalidCommandFormat("HELO".to_string()));
    }

    writer.send_helo_response().await
}

async fn mail_from(
    input: &str,
    mail: &mut MailItem,
    writer: &mut Writer,
    sanitizer: &dyn StringSanitizer,
) -> Result<(), SmtpError> {
    is_valid_command(input, "MAIL FROM")?;
    let value = command_value(input, "MAIL FROM")?;

    set_from_address(&value, mail, sanitizer)?;
    writer.send_ok().await
}

async fn rcpt_to(
    input: &str,
    mail: &mut MailItem,
    writer: &mut Writer,
    sanitizer: &dyn StringSanitizer,
) -> Result<(), SmtpError> {
    is_valid_command(input, "RCPT TO")?;
    let value = command_value(input, "RCPT TO")?;

    add_to_address(&value, mail, sanitizer)?;
    writer.send_ok().await
}

async fn rset(input: &str, mail: &mut MailItem, writer: &mut Writer) -> Result<(), SmtpError> {
    if input.trim().to_lowercase() != "rset" {
        return Err(SmtpError::InvalidCommand("RSET".to_string()));
    }

    *mail = MailItem::empty();
    writer.send_ok().await
}

async fn noop(input: &str, writer: &mut Writer) -> Result<(), SmtpError> {
    is_valid_command(input, "NOOP")?;

    debug!("NOOP command received");
    writer.send_ok().await
}

/// Records the sender. `<>` passes through as the null return path and is
/// stored as an empty address; anything else must be a parseable mailbox.
pub fn set_from_address(
    value: &str,
    mail: &mut MailItem,
    sanitizer: &dyn StringSanitizer,
) -> Result<(), SmtpError> {
    if value == NULL_RETURN_PATH {
        mail.from_address = String::new();
        return Ok(());
    }

    let parsed = address::parse_mailbox(value)?;
    let sanitized = sanitizer.sanitize(&parsed);

    if !address::is_valid_email(&sanitized) {
        return Err(SmtpError::InvalidEmail(sanitized));
    }

    mail.from_address = sanitized;
    Ok(())
}

/// Appends one recipient. Repeated RCPT TO commands accumulate in order.
pub fn add_to_address(
    value: &str,
    mail: &mut MailItem,
    sanitizer: &dyn StringSanitizer,
) -> Result<(), SmtpError> {
    let parsed = address::parse_mailbox(value)?;
    let sanitized = sanitizer.sanitize(&parsed);

    if !address::is_valid_email(&sanitized) {
        return Err(SmtpError::InvalidEmail(sanitized));
    }

    mail.to_addresses.push(sanitized);
    Ok(())
}

/// Processes a complete DATA payload and answers 250 on success. The 354
/// prompt and the payload read happen in the worker before this runs;
/// failures are answered by the worker with a 554.
pub async fn execute_data(
    raw_block: &str,
    mail: &mut MailItem,
    writer: &mut Writer,
    sanitizer: &dyn StringSanitizer,
) -> Result<(), SmtpError> {
    apply_data(raw_block, mail, sanitizer)?;

    debug!(subject = %mail.subject, content_type = %mail.content_type, "Message parsed");
    writer.send_ok().await
}

/// Parses the payload into the part tree, chooses bodies, classifies
/// attachments, decodes, and sanitizes — everything except wire responses.
pub fn apply_data(
    raw_block: &str,
    mail: &mut MailItem,
    sanitizer: &dyn StringSanitizer,
) -> Result<(), SmtpError> {
    let unstuffed = unstuff_dots(raw_block);

    mail.message = MessagePart::parse(&unstuffed).map_err(SmtpError::Mime)?;

    mail.subject = subject_of(&mail.message);
    mail.date_sent = datetime::parse_date_header(mail.message.header("Date"));
    mail.content_type = mail.message.header("Content-Type").to_string();
    mail.transfer_encoding = mail.message.header("Content-Transfer-Encoding").to_string();
    mail.x_mailer = mail.message.header("X-Mailer").to_string();
    mail.mime_version = mail.message.header("MIME-Version").to_string();
    mail.boundary = mail.message.boundary();

    if mail.message.parts().is_empty() {
        mail.body = mail.message.body().to_string();
    } else {
        let message = mail.message.clone();
        for part in message.parts() {
            record_message_part(part, mail);
        }

        mail.body = if mail.html_body.is_empty() {
            mail.text_body.clone()
        } else {
            mail.html_body.clone()
        };
    }

    mail.body = mime::decode_body(&mail.body, &mail.content_type, &mail.transfer_encoding)
        .map_err(SmtpError::Mime)?;

    mail.sanitize(sanitizer);
    Ok(())
}

/// Walks the part tree. The first non-attachment `text/plain` leaf becomes
/// the text body, the first non-attachment `text/html` leaf the HTML body;
/// multipart nodes recurse and every other leaf is an attachment, inline
/// unless its disposition says otherwise.
fn record_message_part(part: &MessagePart, mail: &mut MailItem) {
    let content_type = part.content_type().to_lowercase();

    if content_type.starts_with("text/plain") && mail.text_body.is_empty() && !part.is_attachment()
    {
        mail.text_body = part.body().to_string();
    } else if content_type.starts_with("text/html")
        && mail.html_body.is_empty()
        && !part.is_attachment()
    {
        mail.html_body = part.body().to_string();
    } else if part.is_multipart() {
        for child in part.parts() {
            record_message_part(child, mail);
        }
    } else {
        let attachment = Attachment::from_part(part, mail.id);

        if part.is_attachment() {
            mail.attachments.push(attachment);
        } else {
            mail.inline_attachments.push(attachment);
        }
    }
}

fn subject_of(message: &MessagePart) -> String {
    let subject = message.header("Subject");

    if subject.is_empty() {
        "(No Subject)".to_string()
    } else {
        subject.to_string()
    }
}

/// Reverses SMTP dot stuffing: a payload line that starts with a dot had a
/// dot prepended by the client, which comes off here.
fn unstuff_dots(block: &str) -> String {
    block
        .split("\r\n")
        .map(|line| line.strip_prefix('.').unwrap_or(line))
        .collect::<Vec<_>>()
        .join("\r\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sanitize::XssSanitizer;

    fn sanitizer() -> XssSanitizer {
        XssSanitizer
    }

    #[test]
    fn from_address_accepts_null_return_path() {
        let mut mail = MailItem::empty();
        set_from_address("<>", &mut mail, &sanitizer()).unwrap();
        assert_eq!(mail.from_address, "");
    }

    #[test]
    fn from_address_rejects_invalid_addresses() {
        let mut mail = MailItem::empty();
        let result = set_from_address("<not-an-email>", &mut mail, &sanitizer());
        assert!(matches!(result, Err(SmtpError::InvalidEmail(_))));
    }

    #[test]
    fn recipients_accumulate_in_order() {
        let mut mail = MailItem::empty();
        add_to_address("<first@example.com>", &mut mail, &sanitizer()).unwrap();
        add_to_address("<second@example.com>", &mut mail, &sanitizer()).unwrap();

        assert_eq!(
            mail.to_addresses,
            vec!["first@example.com", "second@example.com"]
        );
    }

    #[test]
    fn apply_data_single_part_plain_text() {
        let mut mail = MailItem::empty();
        apply_data("Subject: hi\r\n\r\nhello\r\n", &mut mail, &sanitizer()).unwrap();

        assert_eq!(mail.subject, "hi");
        assert_eq!(mail.body, "hello<br />");
        assert!(mail.attachments.is_empty());
    }

    #[test]
    fn apply_data_defaults_subject() {
        let mut mail = MailItem::empty();
        apply_data("From: a@x\r\n\r\nbody\r\n", &mut mail, &sanitizer()).unwrap();

        assert_eq!(mail.subject, "(No Subject)");
    }

    #[test]
    fn apply_data_decodes_base64_body() {
        let raw = concat!(
            "Subject: encoded\r\n",
            "Content-Type: text/plain; charset=utf-8\r\n",
            "Content-Transfer-Encoding: base64\r\n",
            "\r\n",
            "aMOpbGxvIHdvcmxkCg==\r\n",
        );

        let mut mail = MailItem::empty();
        apply_data(raw, &mut mail, &sanitizer()).unwrap();

        assert_eq!(mail.body, "héllo world<br />");
        assert_eq!(mail.transfer_encoding, "base64");
    }

    #[test]
    fn apply_data_classifies_attachments_and_inline_parts() {
        let raw = concat!(
            "Subject: mixed\r\n",
            "Content-Type: multipart/mixed; boundary=\"b1\"\r\n",
            "\r\n",
            "--b1\r\n",
            "Content-Type: text/plain\r\n",
            "\r\n",
            "the message\r\n",
            "--b1\r\n",
            "Content-Type: image/png\r\n",
            "Content-Disposition: inline\r\n",
            "\r\n",
            "aW1hZ2U=\r\n",
            "--b1\r\n",
            "Content-Type: text/plain\r\n",
            "Content-Disposition: attachment; filename=\"x.txt\"\r\n",
            "\r\n",
            "file contents\r\n",
            "--b1--\r\n",
        );

        let mut mail = MailItem::empty();
        apply_data(raw, &mut mail, &sanitizer()).unwrap();

        assert_eq!(mail.text_body, "the message");
        assert_eq!(mail.body, "the message");
        assert_eq!(mail.attachments.len(), 1);
        assert_eq!(mail.attachments[0].file_name, "x.txt");
        assert_eq!(mail.inline_attachments.len(), 1);
        assert_eq!(mail.inline_attachments[0].content_type, "image/png");
    }

    #[test]
    fn apply_data_prefers_html_body() {
        let raw = concat!(
            "Subject: alt\r\n",
            "Content-Type: multipart/alternative; boundary=alt\r\n",
            "\r\n",
            "--alt\r\n",
            "Content-Type: text/plain\r\n",
            "\r\n",
            "plain version\r\n",
            "--alt\r\n",
            "Content-Type: text/html\r\n",
            "\r\n",
            "<p>html version</p>\r\n",
            "--alt--\r\n",
        );

        let mut mail = MailItem::empty();
        apply_data(raw, &mut mail, &sanitizer()).unwrap();

        assert_eq!(mail.text_body, "plain version");
        assert_eq!(mail.html_body, "<p>html version</p>");
        assert_eq!(mail.body, "<p>html version</p>");
    }

    #[test]
    fn apply_data_unstuffs_leading_dots() {
        let raw = "Subject: dots\r\n\r\nfirst\r\n..second starts with a dot\r\n";

        let mut mail = MailItem::empty();
        apply_data(raw, &mut mail, &sanitizer()).unwrap();

        assert!(mail.body.contains(".second starts with a dot"));
        assert!(!mail.body.contains("..second"));
    }

    #[test]
    fn apply_data_rejects_bad_base64() {
        let raw = concat!(
            "Subject: broken\r\n",
            "Content-Transfer-Encoding: base64\r\n",
            "\r\n",
            "!!! definitely not base64 !!!\r\n",
        );

        let mut mail = MailItem::empty();
        let result = apply_data(raw, &mut mail, &sanitizer());

        assert!(matches!(result, Err(SmtpError::Mime(_))));
        assert!(!result.unwrap_err().is_terminal());
    }
}
