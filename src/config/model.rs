//! Configuration data model.
//!
//! All structs derive `Serialize`/`Deserialize` for TOML persistence.
//! Every field has a default, so a partial or missing file still loads.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::nickname::generate_nickname;
use crate::irc::{ClientSettings, ConnectionSettings, TaggedReplies};

/// Root application configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub motd: MotdConfig,
    #[serde(default)]
    pub behavior: BehaviorConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    pub fn client_settings(&self) -> ClientSettings {
        ClientSettings {
            connection: self.connection.settings(),
            tagged_replies: self.motd.tagged_replies.clone(),
        }
    }
}

/// Server to connect to and what to do once registered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_nickname")]
    pub nickname: String,
    /// Joined automatically after registration.
    #[serde(default)]
    pub channels: Vec<String>,
    #[serde(default)]
    pub auto_connect: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            nickname: default_nickname(),
            channels: Vec::new(),
            auto_connect: false,
        }
    }
}

/// Socket timeouts and the QUIT reason.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_io_timeout")]
    pub read_timeout_secs: u64,
    #[serde(default = "default_io_timeout")]
    pub write_timeout_secs: u64,
    #[serde(default = "default_quit_message")]
    pub quit_message: String,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout(),
            read_timeout_secs: default_io_timeout(),
            write_timeout_secs: default_io_timeout(),
            quit_message: default_quit_message(),
        }
    }
}

impl ConnectionConfig {
    /// Zero timeouts are bumped to one second.
    pub fn settings(&self) -> ConnectionSettings {
        let secs = |value: u64| Duration::from_secs(value.max(1));
        ConnectionSettings {
            connect_timeout: secs(self.connect_timeout_secs),
            read_timeout: secs(self.read_timeout_secs),
            write_timeout: secs(self.write_timeout_secs),
            quit_message: Some(self.quit_message.clone()),
        }
    }
}

/// Which untagged sub-400 replies go into the server message block.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MotdConfig {
    #[serde(default)]
    pub tagged_replies: TaggedReplies,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BehaviorConfig {
    #[serde(default = "default_true")]
    pub bell_on_mention: bool,
    /// Print our own outgoing messages.
    #[serde(default = "default_true")]
    pub echo_own_messages: bool,
}

impl Default for BehaviorConfig {
    fn default() -> Self {
        Self {
            bell_on_mention: true,
            echo_own_messages: true,
        }
    }
}

/// Chat transcript settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            log_dir: default_log_dir(),
        }
    }
}

fn default_host() -> String {
    "irc.libera.chat".to_string()
}
fn default_port() -> u16 {
    6667
}
fn default_nickname() -> String {
    generate_nickname()
}
fn default_true() -> bool {
    true
}
fn default_connect_timeout() -> u64 {
    10
}
fn default_io_timeout() -> u64 {
    30
}
fn default_quit_message() -> String {
    crate::irc::message::DEFAULT_QUIT_REASON.to_string()
}
fn default_log_dir() -> String {
    "~/.local/share/ircline/logs".to_string()
}
