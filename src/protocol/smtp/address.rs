//! Mailbox parsing for MAIL FROM and RCPT TO arguments.

use super::error::SmtpError;

/// Extracts the bare address from a mailbox argument. Accepts the
/// angle-bracket form (`<a@x>`), the display-name form (`Name <a@x>`), and a
/// bare `a@x`.
pub fn parse_mailbox(value: &str) -> Result<String, SmtpError> {
    let trimmed = value.trim();

    let address = match (trimmed.rfind('<'), trimmed.rfind('>')) {
        (Some(open), Some(close)) if open < close => trimmed[open + 1..close].trim(),
        (None, None) => trimmed,
        _ => return Err(SmtpError::InvalidEmail(value.to_string())),
    };

    if is_valid_email(address) {
        Ok(address.to_string())
    } else {
        Err(SmtpError::InvalidEmail(value.to_string()))
    }
}

/// Syntactic mailbox check: one `@`, a non-empty local part and domain, no
/// whitespace or angle brackets.
pub fn is_valid_email(address: &str) -> bool {
    let Some((local, domain)) = address.split_once('@') else {
        return false;
    };

    !local.is_empty()
        && !domain.is_empty()
        && !domain.contains('@')
        && !address
            .chars()
            .any(|c| c.is_whitespace() || c == '<' || c == '>')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_angle_bracket_form() {
        assert_eq!(parse_mailbox("<a@x>").unwrap(), "a@x");
    }

    #[test]
    fn parses_display_name_form() {
        assert_eq!(parse_mailbox("Adam P <adam@example.com>").unwrap(), "adam@example.com");
    }

    #[test]
    fn parses_bare_address() {
        assert_eq!(parse_mailbox("adam@example.com").unwrap(), "adam@example.com");
    }

    #[test]
    fn short_domains_are_accepted() {
        assert_eq!(parse_mailbox("<a@x>").unwrap(), "a@x");
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_mailbox("not-an-email").is_err());
        assert!(parse_mailbox("<@>").is_err());
        assert!(parse_mailbox("<a@>").is_err());
        assert!(parse_mailbox("<@x>").is_err());
        assert!(parse_mailbox("a@b@c").is_err());
        assert!(parse_mailbox(">backwards<").is_err());
    }
}
