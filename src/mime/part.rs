//! Recursive message-part tree built from a raw DATA payload.
//!
//! A received message is a header block, a blank line, then a body. When the
//! content type is `multipart/*` the body is itself a sequence of parts
//! delimited by `--boundary` markers, each with its own header block, and
//! parts may nest (e.g. `multipart/alternative` inside `multipart/mixed`).

use std::collections::HashMap;

use super::MimeError;

/// One node of the message tree. Leaves carry a body; multipart nodes carry
/// child parts.
#[derive(Debug, Clone, Default)]
pub struct MessagePart {
    headers: HashMap<String, String>,
    body: String,
    parts: Vec<MessagePart>,
}

impl MessagePart {
    /// Parses a complete DATA payload into a part tree.
    ///
    /// The top level must contain a header section and a body section
    /// separated by a blank line.
    pub fn parse(contents: &str) -> Result<Self, MimeError> {
        let (header_block, body) = contents
            .split_once("\r\n\r\n")
            .ok_or(MimeError::MissingBodySection)?;

        Ok(Self::build(header_block, body))
    }

    /// Parses one chunk between boundary markers. Chunks without a blank
    /// line are treated as all headers with an empty body.
    fn parse_chunk(chunk: &str) -> Self {
        match chunk.split_once("\r\n\r\n") {
            Some((header_block, body)) => Self::build(header_block, body),
            None => Self::build(chunk, ""),
        }
    }

    fn build(header_block: &str, body: &str) -> Self {
        let headers = parse_headers(header_block);

        let mut part = MessagePart {
            headers,
            body: body.to_string(),
            parts: Vec::new(),
        };

        if part.is_multipart() {
            let boundary = part.boundary();
            if !boundary.is_empty() {
                part.parts = split_on_boundary(body, &boundary)
                    .into_iter()
                    .map(|chunk| Self::parse_chunk(&chunk))
                    .collect();
            }
        }

        part
    }

    /// Returns a header value by case-insensitive name, or the empty string.
    pub fn header(&self, name: &str) -> &str {
        self.headers
            .get(&name.to_lowercase())
            .map(String::as_str)
            .unwrap_or("")
    }

    /// The media type portion of the Content-Type header, without parameters.
    pub fn content_type(&self) -> &str {
        self.header("Content-Type")
            .split(';')
            .next()
            .unwrap_or("")
            .trim()
    }

    /// The disposition token of the Content-Disposition header, without
    /// parameters.
    pub fn content_disposition(&self) -> &str {
        self.header("Content-Disposition")
            .split(';')
            .next()
            .unwrap_or("")
            .trim()
    }

    /// The multipart boundary parameter, or the empty string.
    pub fn boundary(&self) -> String {
        header_param(self.header("Content-Type"), "boundary").unwrap_or_default()
    }

    /// Attachment filename: `filename=` from Content-Disposition wins, with
    /// `name=` from Content-Type as the fallback.
    pub fn filename(&self) -> String {
        header_param(self.header("Content-Disposition"), "filename")
            .or_else(|| header_param(self.header("Content-Type"), "name"))
            .unwrap_or_default()
    }

    pub fn is_multipart(&self) -> bool {
        self.content_type().to_lowercase().starts_with("multipart")
    }

    /// A part is an attachment when its disposition says so; anything else
    /// with a disposition (e.g. `inline`) is an inline attachment.
    pub fn is_attachment(&self) -> bool {
        self.header("Content-Disposition")
            .to_lowercase()
            .contains("attachment")
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn parts(&self) -> &[MessagePart] {
        &self.parts
    }
}

/// Unfolds continuation lines, then splits the block into `name: value`
/// pairs keyed by lowercased name. The first occurrence of a header wins.
fn parse_headers(block: &str) -> HashMap<String, String> {
    let mut headers = HashMap::new();

    for line in unfold_headers(block) {
        if let Some((name, value)) = line.split_once(':') {
            let key = name.trim().to_lowercase();
            if key.is_empty() {
                continue;
            }
            headers.entry(key).or_insert_with(|| value.trim().to_string());
        }
    }

    headers
}

/// Joins folded header lines: a line starting with whitespace belongs to the
/// previous header.
fn unfold_headers(block: &str) -> Vec<String> {
    let mut lines: Vec<String> = Vec::new();

    for raw in block.split("\r\n") {
        if raw.starts_with(' ') || raw.starts_with('\t') {
            if let Some(previous) = lines.last_mut() {
                previous.push(' ');
                previous.push_str(raw.trim_start());
                continue;
            }
        }
        lines.push(raw.to_string());
    }

    lines
}

/// Extracts a `name=value` parameter from a structured header value,
/// stripping surrounding quotes.
fn header_param(header_value: &str, name: &str) -> Option<String> {
    for segment in header_value.split(';').skip(1) {
        let Some((key, value)) = segment.split_once('=') else {
            continue;
        };
        if key.trim().to_lowercase() == name {
            return Some(value.trim().trim_matches('"').to_string());
        }
    }

    None
}

/// Splits a multipart body into its chunks. The preamble before the first
/// marker and everything after the closing `--boundary--` are discarded.
fn split_on_boundary(body: &str, boundary: &str) -> Vec<String> {
    let marker = format!("--{boundary}");
    let mut chunks = Vec::new();

    for piece in body.split(marker.as_str()).skip(1) {
        if piece.starts_with("--") {
            break;
        }

        let chunk = piece
            .strip_prefix("\r\n")
            .unwrap_or(piece)
            .trim_end_matches("\r\n");

        if !chunk.trim().is_empty() {
            chunks.push(chunk.to_string());
        }
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_message() {
        let part = MessagePart::parse("Subject: hi\r\nFrom: a@x\r\n\r\nhello\r\n").unwrap();

        assert_eq!(part.header("Subject"), "hi");
        assert_eq!(part.header("subject"), "hi");
        assert_eq!(part.body(), "hello\r\n");
        assert!(part.parts().is_empty());
    }

    #[test]
    fn missing_blank_line_is_an_error() {
        assert!(MessagePart::parse("Subject: hi\r\nno body separator").is_err());
    }

    #[test]
    fn unfolds_continuation_lines() {
        let part = MessagePart::parse(
            "Subject: a very\r\n long subject\r\n\r\nbody",
        )
        .unwrap();

        assert_eq!(part.header("Subject"), "a very long subject");
    }

    #[test]
    fn splits_multipart_body() {
        let raw = concat!(
            "Content-Type: multipart/mixed; boundary=\"xyz\"\r\n",
            "\r\n",
            "preamble to ignore\r\n",
            "--xyz\r\n",
            "Content-Type: text/plain\r\n",
            "\r\n",
            "first part\r\n",
            "--xyz\r\n",
            "Content-Type: text/html\r\n",
            "\r\n",
            "<p>second part</p>\r\n",
            "--xyz--\r\n",
        );

        let part = MessagePart::parse(raw).unwrap();

        assert!(part.is_multipart());
        assert_eq!(part.boundary(), "xyz");
        assert_eq!(part.parts().len(), 2);
        assert_eq!(part.parts()[0].content_type(), "text/plain");
        assert_eq!(part.parts()[0].body(), "first part");
        assert_eq!(part.parts()[1].content_type(), "text/html");
        assert_eq!(part.parts()[1].body(), "<p>second part</p>");
    }

    #[test]
    fn nested_multipart_recurses() {
        let raw = concat!(
            "Content-Type: multipart/mixed; boundary=outer\r\n",
            "\r\n",
            "--outer\r\n",
            "Content-Type: multipart/alternative; boundary=inner\r\n",
            "\r\n",
            "--inner\r\n",
            "Content-Type: text/plain\r\n",
            "\r\n",
            "plain\r\n",
            "--inner\r\n",
            "Content-Type: text/html\r\n",
            "\r\n",
            "<b>html</b>\r\n",
            "--inner--\r\n",
            "--outer--\r\n",
        );

        let part = MessagePart::parse(raw).unwrap();

        assert_eq!(part.parts().len(), 1);
        let alternative = &part.parts()[0];
        assert!(alternative.is_multipart());
        assert_eq!(alternative.parts().len(), 2);
        assert_eq!(alternative.parts()[1].body(), "<b>html</b>");
    }

    #[test]
    fn filename_prefers_content_disposition() {
        let raw = concat!(
            "Content-Type: application/pdf; name=\"typed.pdf\"\r\n",
            "Content-Disposition: attachment; filename=\"report.pdf\"\r\n",
            "\r\n",
            "%PDF-",
        );

        let part = MessagePart::parse(raw).unwrap();
        assert_eq!(part.filename(), "report.pdf");
        assert!(part.is_attachment());
    }

    #[test]
    fn filename_falls_back_to_content_type_name() {
        let raw = concat!(
            "Content-Type: application/pdf; name=\"typed.pdf\"\r\n",
            "Content-Disposition: inline\r\n",
            "\r\n",
            "%PDF-",
        );

        let part = MessagePart::parse(raw).unwrap();
        assert_eq!(part.filename(), "typed.pdf");
        assert!(!part.is_attachment());
    }
}
