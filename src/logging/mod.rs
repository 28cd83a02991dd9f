//! Chat transcript logging to disk.
//!
//! When enabled, chat and membership lines are appended to daily files named
//! `<target>_<date>.log` in the configured directory (default
//! `~/.local/share/ircline/logs/`).

use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::config::LoggingConfig;
use crate::irc::{ClientEvent, MembershipChange};

pub struct ChatLogger {
    enabled: bool,
    log_dir: PathBuf,
    file_handles: HashMap<String, fs::File>,
}

impl ChatLogger {
    pub fn new(config: &LoggingConfig) -> Self {
        Self {
            enabled: config.enabled,
            log_dir: expand_home(&config.log_dir),
            file_handles: HashMap::new(),
        }
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    /// Log an inbound event. Private messages addressed to `own_nick` go to
    /// the sender's file.
    pub fn record(&mut self, event: &ClientEvent, own_nick: &str) {
        if !self.enabled {
            return;
        }
        match event {
            ClientEvent::Chat { from, target, text } => {
                let file = if target.eq_ignore_ascii_case(own_nick) { from } else { target };
                self.write(file, &format!("<{}> {}", from, text));
            }
            ClientEvent::Membership(change) => {
                let channel = match change {
                    MembershipChange::Joined { channel, .. } | MembershipChange::Parted { channel, .. } => {
                        channel.as_str()
                    }
                    _ => "server",
                };
                self.write(channel, &format!("*** {}", change));
            }
            ClientEvent::Error(error) => self.write("server", &format!("!!! {}", error)),
            _ => {}
        }
    }

    /// Log a message we sent ourselves.
    pub fn record_outgoing(&mut self, target: &str, own_nick: &str, text: &str) {
        if self.enabled {
            self.write(target, &format!("<{}> {}", own_nick, text));
        }
    }

    fn write(&mut self, target: &str, line: &str) {
        let safe_target: String = target
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' || c == '.' { c } else { '_' })
            .collect();
        let now = chrono::Local::now();
        let filename = format!("{}_{}.log", safe_target, now.format("%Y-%m-%d"));

        if !self.file_handles.contains_key(&filename) {
            match self.open(&filename) {
                Ok(file) => {
                    self.file_handles.insert(filename.clone(), file);
                }
                Err(e) => {
                    warn!("Cannot open transcript {}: {}", filename, e);
                    return;
                }
            }
        }
        if let Some(handle) = self.file_handles.get_mut(&filename) {
            if let Err(e) = writeln!(handle, "[{}] {}", now.format("%H:%M:%S"), line) {
                warn!("Cannot write transcript {}: {}", filename, e);
            }
        }
    }

    fn open(&self, filename: &str) -> std::io::Result<fs::File> {
        fs::create_dir_all(&self.log_dir)?;
        OpenOptions::new().create(true).append(true).open(self.log_dir.join(filename))
    }
}

/// Expand a leading `~/` to the home directory.
fn expand_home(dir: &str) -> PathBuf {
    match (dir.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(dir),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn logger(dir: &Path, enabled: bool) -> ChatLogger {
        ChatLogger::new(&LoggingConfig {
            enabled,
            log_dir: dir.to_string_lossy().into_owned(),
        })
    }

    fn read_log(dir: &Path, target: &str) -> String {
        let date = chrono::Local::now().format("%Y-%m-%d");
        fs::read_to_string(dir.join(format!("{}_{}.log", target, date))).unwrap()
    }

    #[test]
    fn test_channel_and_query_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut log = logger(dir.path(), true);

        log.record(
            &ClientEvent::Chat {
                from: "ferris".into(),
                target: "#rust".into(),
                text: "hi all".into(),
            },
            "crab",
        );
        log.record_outgoing("#rust", "crab", "hello");
        log.record(
            &ClientEvent::Chat {
                from: "ferris".into(),
                target: "crab".into(),
                text: "psst".into(),
            },
            "crab",
        );
        log.record(
            &ClientEvent::Membership(MembershipChange::Joined {
                nick: "corro".into(),
                channel: "#rust".into(),
            }),
            "crab",
        );

        let channel = read_log(dir.path(), "_rust");
        let lines: Vec<&str> = channel.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].ends_with("] <ferris> hi all"));
        assert!(lines[1].ends_with("] <crab> hello"));
        assert!(lines[2].ends_with("] *** [+] corro joined #rust"));
        assert!(lines[0].starts_with('['));

        assert!(read_log(dir.path(), "ferris").ends_with("] <ferris> psst\n"));
    }

    #[test]
    fn test_disabled_logger_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let mut log = logger(dir.path(), false);
        log.record_outgoing("#rust", "crab", "hello");
        log.record(&ClientEvent::Error("boom".into()), "crab");
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_expand_home() {
        assert_eq!(expand_home("/var/log/irc"), PathBuf::from("/var/log/irc"));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_home("~/logs"), home.join("logs"));
        }
    }
}
