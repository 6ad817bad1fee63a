//! Transfer-encoding decoders for message bodies and attachments.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use super::MimeError;

/// Decodes Base64 data as found in a `Content-Transfer-Encoding: base64` part.
///
/// Whitespace is stripped first; encoders are allowed to wrap lines at 76
/// columns.
pub fn decode_base64(data: &str) -> Result<Vec<u8>, MimeError> {
    let compact: String = data.chars().filter(|c| !c.is_whitespace()).collect();
    STANDARD.decode(compact.as_bytes()).map_err(Into::into)
}

/// Decodes Quoted-Printable text (RFC 2045).
pub fn decode_quoted_printable(text: &str) -> Result<String, MimeError> {
    let mut result = Vec::new();
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch != '=' {
            result.push(ch as u8);
            continue;
        }

        // Soft line break: "=\r\n" or "=\n" joins two lines
        if chars.peek() == Some(&'\r') {
            chars.next();
            if chars.peek() == Some(&'\n') {
                chars.next();
                continue;
            }
            return Err(MimeError::InvalidEncoding(
                "bare carriage return after soft break".to_string(),
            ));
        }
        if chars.peek() == Some(&'\n') {
            chars.next();
            continue;
        }

        let hex: String = chars.by_ref().take(2).collect();
        if hex.len() != 2 {
            return Err(MimeError::InvalidEncoding(
                "incomplete escape sequence".to_string(),
            ));
        }

        let byte = u8::from_str_radix(&hex, 16)
            .map_err(|e| MimeError::InvalidEncoding(format!("invalid hex escape: {e}")))?;
        result.push(byte);
    }

    String::from_utf8(result).map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base64_decodes() {
        assert_eq!(decode_base64("SGVsbG8sIFdvcmxkIQ==").unwrap(), b"Hello, World!");
    }

    #[test]
    fn base64_tolerates_line_wrapping() {
        assert_eq!(decode_base64("SGVs\r\nbG8=").unwrap(), b"Hello");
    }

    #[test]
    fn quoted_printable_plain_text_untouched() {
        assert_eq!(decode_quoted_printable("Hello, World!").unwrap(), "Hello, World!");
    }

    #[test]
    fn quoted_printable_decodes_escapes() {
        assert_eq!(decode_quoted_printable("H=C3=A9llo").unwrap(), "Héllo");
    }

    #[test]
    fn quoted_printable_soft_line_break() {
        assert_eq!(decode_quoted_printable("Hello=\r\nWorld").unwrap(), "HelloWorld");
    }

    #[test]
    fn quoted_printable_incomplete_escape_is_an_error() {
        assert!(decode_quoted_printable("broken=4").is_err());
    }
}
