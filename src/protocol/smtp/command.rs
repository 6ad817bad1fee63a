//! Classification of client input into protocol commands.

use std::fmt;

use super::error::SmtpError;

/// The commands this server speaks. Dispatch is a single exhaustive match in
/// the worker loop, so adding a variant forces every site to handle it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Helo,
    Mail,
    Rcpt,
    Data,
    Rset,
    Noop,
    Quit,
}

/// Prefix table in match order. More than one prefix can map to the same
/// command: clients open with either `HELO` or `EHLO`, and some legacy
/// senders still use `SEND` in place of `MAIL`.
const COMMAND_PREFIXES: &[(&str, Command)] = &[
    ("helo", Command::Helo),
    ("ehlo", Command::Helo),
    ("rcpt to", Command::Rcpt),
    ("mail from", Command::Mail),
    ("send", Command::Mail),
    ("rset", Command::Rset),
    ("quit", Command::Quit),
    ("data", Command::Data),
    ("noop", Command::Noop),
];

impl Command {
    /// Picks the command whose prefix starts the input, case-insensitively.
    pub fn classify(input: &str) -> Result<Command, SmtpError> {
        let lowered = input.to_lowercase();

        COMMAND_PREFIXES
            .iter()
            .find(|(prefix, _)| lowered.starts_with(prefix))
            .map(|&(_, command)| command)
            .ok_or_else(|| SmtpError::InvalidCommand(input.to_string()))
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Command::Helo => "HELO",
            Command::Mail => "MAIL FROM",
            Command::Rcpt => "RCPT TO",
            Command::Data => "DATA",
            Command::Rset => "RSET",
            Command::Noop => "NOOP",
            Command::Quit => "QUIT",
        };
        f.write_str(name)
    }
}

/// Errors unless the input starts with the expected command, ignoring case.
pub fn is_valid_command(input: &str, expected: &str) -> Result<(), SmtpError> {
    if input.to_lowercase().starts_with(&expected.to_lowercase()) {
        Ok(())
    } else {
        Err(SmtpError::InvalidCommand(expected.to_string()))
    }
}

/// Splits `COMMAND:value` on the first delimiter and returns the trimmed
/// right-hand side.
pub fn command_value(input: &str, command: &str) -> Result<String, SmtpError> {
    match input.split_once(':') {
        Some((_, value)) => Ok(value.trim().to_string()),
        None => Err(SmtpError::InvalidCommandFormat(command.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_by_case_insensitive_prefix() {
        assert_eq!(Command::classify("HELO test.local").unwrap(), Command::Helo);
        assert_eq!(Command::classify("ehlo test.local").unwrap(), Command::Helo);
        assert_eq!(Command::classify("MAIL FROM:<a@x>").unwrap(), Command::Mail);
        assert_eq!(Command::classify("rcpt to:<b@y>").unwrap(), Command::Rcpt);
        assert_eq!(Command::classify("DATA").unwrap(), Command::Data);
        assert_eq!(Command::classify("RsEt").unwrap(), Command::Rset);
        assert_eq!(Command::classify("noop").unwrap(), Command::Noop);
        assert_eq!(Command::classify("QUIT").unwrap(), Command::Quit);
    }

    #[test]
    fn prefix_matching_is_forgiving_about_trailing_junk() {
        // Prefix semantics accept sloppy client lines like this one.
        assert_eq!(Command::classify("DATATATA").unwrap(), Command::Data);
    }

    #[test]
    fn unknown_input_is_an_error() {
        assert!(Command::classify("BDAT 42").is_err());
        assert!(Command::classify("").is_err());
    }

    #[test]
    fn valid_command_check_is_a_prefix_check() {
        assert!(is_valid_command("MAIL FROM:<a@x>", "MAIL FROM").is_ok());
        assert!(is_valid_command("mail from:<a@x>", "MAIL FROM").is_ok());
        assert!(is_valid_command("SEND <a@x>", "MAIL FROM").is_err());
    }

    #[test]
    fn command_value_splits_on_first_colon() {
        assert_eq!(
            command_value("MAIL FROM: <a@x> ", "MAIL FROM").unwrap(),
            "<a@x>"
        );
        assert!(command_value("MAIL FROM <a@x>", "MAIL FROM").is_err());
    }
}
