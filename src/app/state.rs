use chrono::Local;

use crate::config::AppConfig;
use crate::irc::ConnectionState;

/// Server the user last asked to connect to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerTarget {
    pub host: String,
    pub port: u16,
}

#[derive(Debug)]
pub struct AppState {
    pub config: AppConfig,
    pub nickname: String,
    pub connection: ConnectionState,
    pub server: Option<ServerTarget>,
    /// Where plain text goes: the channel most recently joined.
    pub current_channel: Option<String>,
    /// Lines waiting to be printed by the main loop.
    pub output: Vec<String>,
    pub pending_bell: bool,
    pub should_quit: bool,
}

impl AppState {
    pub fn new(config: AppConfig) -> Self {
        Self {
            nickname: config.server.nickname.clone(),
            config,
            connection: ConnectionState::Disconnected,
            server: None,
            current_channel: None,
            output: Vec::new(),
            pending_bell: false,
            should_quit: false,
        }
    }

    pub fn push(&mut self, line: String) {
        self.output.push(line);
    }

    pub fn system_message(&mut self, text: impl AsRef<str>) {
        self.push(format!("*** {}", text.as_ref()));
    }

    pub fn error_message(&mut self, text: impl AsRef<str>) {
        self.push(format!("!!! {}", text.as_ref()));
    }

    /// `[HH:MM:SS] <nick> text`, with the target shown when it is not the
    /// current channel.
    pub fn chat_message(&mut self, target: Option<&str>, nick: &str, text: &str) {
        let ts = Local::now().format("%H:%M:%S");
        match target {
            Some(target) if self.current_channel.as_deref() != Some(target) => {
                self.push(format!("[{}] [{}] <{}> {}", ts, target, nick, text))
            }
            _ => self.push(format!("[{}] <{}> {}", ts, nick, text)),
        }
    }

    pub fn private_message(&mut self, nick: &str, text: &str) {
        self.push(format!("[{}] *{}* {}", Local::now().format("%H:%M:%S"), nick, text));
    }

    pub fn take_output(&mut self) -> Vec<String> {
        std::mem::take(&mut self.output)
    }

    pub fn take_bell(&mut self) -> bool {
        std::mem::take(&mut self.pending_bell)
    }

    pub fn is_connected(&self) -> bool {
        self.connection == ConnectionState::Connected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_prefixes() {
        let mut state = AppState::new(AppConfig::default());
        state.system_message("hello");
        state.error_message(String::from("boom"));
        assert_eq!(state.take_output(), vec!["*** hello", "!!! boom"]);
        assert!(state.output.is_empty());
    }

    #[test]
    fn test_chat_message_target_tag() {
        let mut state = AppState::new(AppConfig::default());
        state.current_channel = Some("#rust".into());
        state.chat_message(Some("#rust"), "ferris", "hi");
        state.chat_message(Some("#tokio"), "ferris", "yo");
        state.chat_message(None, "ferris", "psst");

        let out = state.take_output();
        assert!(out[0].starts_with('[') && out[0].ends_with("] <ferris> hi"));
        assert!(out[1].ends_with("] [#tokio] <ferris> yo"));
        assert!(out[2].ends_with("] <ferris> psst"));
        assert_eq!(out[0].find(']'), Some(9));
    }
}
