pub mod datetime;
pub mod encoding;
pub mod part;

pub use part::MessagePart;

use thiserror::Error;

/// Errors raised while assembling or decoding a received message.
#[derive(Debug, Error)]
pub enum MimeError {
    #[error("expected message content to contain a header section and a body section")]
    MissingBodySection,

    #[error("base64 decode error: {0}")]
    Base64Decode(#[from] base64::DecodeError),

    #[error("invalid encoding: {0}")]
    InvalidEncoding(String),

    #[error("UTF-8 decode error: {0}")]
    Utf8Decode(#[from] std::string::FromUtf8Error),
}

/// Decodes a message body according to its declared transfer encoding, then
/// applies the plain-text newline conversion used by mail viewers.
///
/// `base64` and `quoted-printable` are decoded; any other declared encoding
/// passes the body through untouched. A missing content type is treated as
/// `text/plain` per RFC 5322.
pub fn decode_body(
    body: &str,
    content_type: &str,
    transfer_encoding: &str,
) -> Result<String, MimeError> {
    let decoded = match transfer_encoding.trim().to_lowercase().as_str() {
        "base64" => {
            let bytes = encoding::decode_base64(body)?;
            String::from_utf8(bytes)?
        }
        "quoted-printable" => encoding::decode_quoted_printable(body)?,
        _ => body.to_string(),
    };

    let effective_type = if content_type.trim().is_empty() {
        "text/plain"
    } else {
        content_type
    };

    if effective_type.contains("text/plain") {
        Ok(decoded.replace("\r\n", "\n").replace('\n', "<br />"))
    } else {
        Ok(decoded)
    }
}
