//! User slash-command parser.
//!
//! Turns `/command args...` input lines into [`ParsedCommand`] values for the
//! event handler. Anything not starting with `/` is chat text, not a command.

use thiserror::Error;

/// Port used when `/connect` names a host without one.
pub const DEFAULT_PORT: u16 = 6667;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedCommand {
    /// `/connect [host[:port]] [nick]`; missing parts fall back to config.
    Connect {
        host: Option<String>,
        port: Option<u16>,
        nick: Option<String>,
    },
    Disconnect,
    Join { channel: String },
    Msg { target: String, text: String },
    List,
    Raw { line: String },
    Save,
    Help,
    Quit { reason: Option<String> },
}

/// Why an input line starting with `/` was not accepted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("Unknown command: /{0} (try /help)")]
    Unknown(String),

    #[error("Usage: {0}")]
    Usage(&'static str),
}

pub const HELP: &[&str] = &[
    "/connect [host[:port]] [nick]  connect (defaults from config)",
    "/disconnect                    close the connection",
    "/join <channel>                join a channel",
    "/msg <target> <text>           send a private message",
    "/list                          list channels on the server",
    "/raw <line>                    send a raw IRC line (alias /quote)",
    "/save                          save server settings to the config file",
    "/quit [reason]                 disconnect and exit",
];

/// Parse a slash-command line.
///
/// Returns `None` when the line is not a command at all. Command names are
/// case-insensitive.
pub fn parse_command(input: &str) -> Option<Result<ParsedCommand, CommandError>> {
    let input = input.trim();
    let body = input.strip_prefix('/')?;

    let (cmd, rest) = match body.split_once(' ') {
        Some((cmd, rest)) => (cmd.to_lowercase(), rest.trim()),
        None => (body.to_lowercase(), ""),
    };
    let mut args = rest.split_whitespace();

    let parsed = match cmd.as_str() {
        "connect" | "server" => {
            let (host, port) = match args.next() {
                Some(addr) => match parse_host_port(addr) {
                    Some((host, port)) => (Some(host), port),
                    None => return Some(Err(CommandError::Usage("/connect [host[:port]] [nick]"))),
                },
                None => (None, None),
            };
            let nick = args.next().map(str::to_string);
            ParsedCommand::Connect { host, port, nick }
        }
        "disconnect" | "dc" => ParsedCommand::Disconnect,
        "join" | "j" => match args.next() {
            Some(channel) => ParsedCommand::Join {
                channel: channel.to_string(),
            },
            None => return Some(Err(CommandError::Usage("/join <channel>"))),
        },
        "msg" | "query" => {
            let (target, text) = rest.split_once(' ').unwrap_or((rest, ""));
            let text = text.trim();
            if target.is_empty() || text.is_empty() {
                return Some(Err(CommandError::Usage("/msg <target> <text>")));
            }
            ParsedCommand::Msg {
                target: target.to_string(),
                text: text.to_string(),
            }
        }
        "list" => ParsedCommand::List,
        "raw" | "quote" => {
            if rest.is_empty() {
                return Some(Err(CommandError::Usage("/raw <line>")));
            }
            ParsedCommand::Raw { line: rest.to_string() }
        }
        "save" => ParsedCommand::Save,
        "help" | "h" => ParsedCommand::Help,
        "quit" | "exit" => ParsedCommand::Quit {
            reason: (!rest.is_empty()).then(|| rest.to_string()),
        },
        _ => return Some(Err(CommandError::Unknown(cmd))),
    };
    Some(Ok(parsed))
}

/// Split `host[:port]`. Returns `None` for an empty host or a bad port.
fn parse_host_port(addr: &str) -> Option<(String, Option<u16>)> {
    match addr.rsplit_once(':') {
        Some((host, port)) => {
            if host.is_empty() {
                return None;
            }
            let port = port.parse::<u16>().ok().filter(|p| *p != 0)?;
            Some((host.to_string(), Some(port)))
        }
        None if addr.is_empty() => None,
        None => Some((addr.to_string(), None)),
    }
}
