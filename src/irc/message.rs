//! IRC wire-line codec.
//!
//! Parses raw server lines into [`IrcMessage`] values and builds the small set
//! of outgoing command lines the client sends. Parsing never fails loudly: a
//! line that does not carry a command simply yields `None`.

use std::fmt;

/// A single parsed IRC line.
///
/// Grammar: `[":" prefix SPACE] command [SPACE param]* [SPACE ":" trailing]`.
/// Absent parts are represented by empty strings / an empty `params` list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IrcMessage {
    pub prefix: String,
    pub command: String,
    pub params: Vec<String>,
    pub trailing: String,
}

impl IrcMessage {
    /// Parse one raw line (with or without its CRLF terminator).
    ///
    /// Returns `None` for blank lines, for a prefix with nothing after it, and
    /// for lines whose command/params region is empty.
    pub fn parse(raw: &str) -> Option<IrcMessage> {
        let mut rest = raw.trim();
        if rest.is_empty() {
            return None;
        }

        let mut prefix = String::new();
        if let Some(stripped) = rest.strip_prefix(':') {
            let space = stripped.find(' ')?;
            prefix = stripped[..space].to_string();
            rest = stripped[space + 1..].trim();
        }

        let mut trailing = String::new();
        if let Some(idx) = rest.find(" :") {
            trailing = rest[idx + 2..].to_string();
            rest = &rest[..idx];
        }

        let mut tokens = rest.split(' ').filter(|t| !t.is_empty());
        let command = tokens.next()?.to_string();
        let params = tokens.map(str::to_string).collect();

        Some(IrcMessage {
            prefix,
            command,
            params,
            trailing,
        })
    }

    /// Nickname portion of the prefix (`nick!user@host` -> `nick`).
    pub fn sender_nick(&self) -> &str {
        match self.prefix.find('!') {
            Some(idx) => &self.prefix[..idx],
            None => &self.prefix,
        }
    }

    pub fn is_privmsg(&self) -> bool {
        self.command.eq_ignore_ascii_case("PRIVMSG")
    }

    pub fn is_ping(&self) -> bool {
        self.command.eq_ignore_ascii_case("PING")
    }

    /// True when the command is made only of decimal digits.
    pub fn is_numeric_reply(&self) -> bool {
        !self.command.is_empty() && self.command.bytes().all(|b| b.is_ascii_digit())
    }

    /// Numeric reply code, if the command is one.
    pub fn numeric_code(&self) -> Option<u16> {
        if self.is_numeric_reply() {
            self.command.parse().ok()
        } else {
            None
        }
    }

    /// Token a PONG must echo back: trailing text, else the first param.
    pub fn ping_token(&self) -> &str {
        self.trailing_or_first_param()
    }

    /// Trailing text if non-blank, else the first param. JOIN and NICK put
    /// their argument in either place depending on the server.
    pub fn trailing_or_first_param(&self) -> &str {
        if !self.trailing.trim().is_empty() {
            &self.trailing
        } else {
            self.params.first().map(String::as_str).unwrap_or("")
        }
    }
}

impl fmt::Display for IrcMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.prefix.is_empty() {
            write!(f, ":{} ", self.prefix)?;
        }
        f.write_str(&self.command)?;
        for param in &self.params {
            write!(f, " {}", param)?;
        }
        if !self.trailing.is_empty() {
            write!(f, " :{}", self.trailing)?;
        }
        Ok(())
    }
}

// Outgoing command lines. Arguments are interpolated as-is; callers must not
// pass CR or LF.

pub const DEFAULT_QUIT_REASON: &str = "Leaving";

pub fn nick(nickname: &str) -> String {
    format!("NICK {}\r\n", nickname)
}

pub fn user(username: &str, realname: &str) -> String {
    format!("USER {} 0 * :{}\r\n", username, realname)
}

pub fn join(channel: &str) -> String {
    format!("JOIN {}\r\n", channel)
}

pub fn privmsg(target: &str, text: &str) -> String {
    format!("PRIVMSG {} :{}\r\n", target, text)
}

pub fn pong(token: &str) -> String {
    format!("PONG :{}\r\n", token)
}

pub fn quit(reason: Option<&str>) -> String {
    format!("QUIT :{}\r\n", reason.unwrap_or(DEFAULT_QUIT_REASON))
}

pub fn list() -> String {
    "LIST\r\n".to_string()
}
