//! Numeric reply aggregation.
//!
//! Servers report login banners, MOTD text and channel listings as long runs
//! of numeric replies that are individually uninteresting. [`ReplyAggregator`]
//! folds that stream into a handful of discrete [`ReplyFact`]s:
//!
//! - the welcome/MOTD block (001 or 375 through 376) as one [`ServerMessageBlock`]
//! - a LIST response (322 entries through 323) as one ordered `Vec<ChannelInfo>`
//! - single-shot facts for 001 (registered), 332 (topic) and 366 (join confirmed)
//!
//! The aggregator is a plain value. Whoever owns it feeds messages in order and
//! calls [`ReplyAggregator::reset`] when the connection goes away, which drops
//! any half-collected block or listing.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::message::IrcMessage;

pub const RPL_WELCOME: u16 = 1;
pub const RPL_LUSERCLIENT: u16 = 251;
pub const RPL_LUSERME: u16 = 255;
pub const RPL_LIST: u16 = 322;
pub const RPL_LISTEND: u16 = 323;
pub const RPL_TOPIC: u16 = 332;
pub const RPL_NAMREPLY: u16 = 353;
pub const RPL_ENDOFNAMES: u16 = 366;
pub const RPL_MOTD: u16 = 372;
pub const RPL_MOTDSTART: u16 = 375;
pub const RPL_ENDOFMOTD: u16 = 376;

/// First error numeric; nothing at or above it is folded into the MOTD block.
const FIRST_ERROR_CODE: u16 = 400;

/// One entry of a LIST response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelInfo {
    pub name: String,
    pub user_count: u32,
    pub topic: String,
}

/// The welcome/MOTD announcement, one line per contributing reply.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ServerMessageBlock {
    pub lines: Vec<String>,
}

impl ServerMessageBlock {
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// Higher-level facts reconstructed from numeric replies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyFact {
    /// 001: registration accepted under `nick`.
    Registered { nick: String },
    /// 376: the collected welcome/MOTD block.
    ServerMessages(ServerMessageBlock),
    /// 323: the collected LIST response, in arrival order.
    ChannelList(Vec<ChannelInfo>),
    /// 332: topic announced for a channel.
    Topic { channel: String, topic: String },
    /// 366: end of NAMES, i.e. the join has completed.
    JoinConfirmed { channel: String },
}

/// Which sub-400 replies without dedicated handling get folded into the
/// MOTD block (as `[NNN] text`) while it is being collected.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaggedReplies {
    #[default]
    All,
    Only(BTreeSet<u16>),
    None,
}

impl TaggedReplies {
    fn allows(&self, code: u16) -> bool {
        match self {
            TaggedReplies::All => true,
            TaggedReplies::Only(codes) => codes.contains(&code),
            TaggedReplies::None => false,
        }
    }
}

#[derive(Debug, Default)]
enum MotdState {
    #[default]
    Idle,
    Collecting(Vec<String>),
}

/// Folds numeric replies into [`ReplyFact`]s.
#[derive(Debug, Default)]
pub struct ReplyAggregator {
    motd: MotdState,
    channels: Vec<ChannelInfo>,
    tagged: TaggedReplies,
}

impl ReplyAggregator {
    pub fn new(tagged: TaggedReplies) -> Self {
        Self {
            motd: MotdState::Idle,
            channels: Vec::new(),
            tagged,
        }
    }

    pub fn is_collecting_motd(&self) -> bool {
        matches!(self.motd, MotdState::Collecting(_))
    }

    pub fn pending_channels(&self) -> usize {
        self.channels.len()
    }

    /// Drop the LIST buffer. Called before a new LIST request goes out.
    pub fn clear_channel_list(&mut self) {
        self.channels.clear();
    }

    /// Discard everything half-collected. Nothing is emitted.
    pub fn reset(&mut self) {
        self.motd = MotdState::Idle;
        self.channels.clear();
    }

    /// Feed one message. Non-numeric messages are ignored.
    pub fn handle(&mut self, message: &IrcMessage) -> Vec<ReplyFact> {
        let Some(code) = message.numeric_code() else {
            return Vec::new();
        };
        let text = message.trailing.as_str();
        let mut facts = Vec::new();

        match code {
            RPL_WELCOME => {
                self.motd = MotdState::Collecting(Vec::new());
                self.push_motd_line(text);
                if let Some(nick) = message.params.first() {
                    facts.push(ReplyFact::Registered { nick: nick.clone() });
                }
            }
            RPL_MOTDSTART => {
                if !self.is_collecting_motd() {
                    self.motd = MotdState::Collecting(Vec::new());
                }
                self.push_motd_line(text);
            }
            2..=5 | RPL_LUSERCLIENT..=RPL_LUSERME | RPL_MOTD => {
                self.push_motd_line(text);
            }
            RPL_ENDOFMOTD => {
                self.push_motd_line(text);
                if let MotdState::Collecting(lines) = std::mem::take(&mut self.motd) {
                    if !lines.is_empty() {
                        facts.push(ReplyFact::ServerMessages(ServerMessageBlock { lines }));
                    }
                }
            }
            RPL_LIST => {
                if message.params.len() >= 3 {
                    self.channels.push(ChannelInfo {
                        name: message.params[1].clone(),
                        user_count: message.params[2].parse().unwrap_or(0),
                        topic: message.trailing.clone(),
                    });
                }
            }
            RPL_LISTEND => {
                facts.push(ReplyFact::ChannelList(std::mem::take(&mut self.channels)));
            }
            RPL_TOPIC => {
                if message.params.len() >= 2 {
                    facts.push(ReplyFact::Topic {
                        channel: message.params[1].clone(),
                        topic: message.trailing.clone(),
                    });
                }
            }
            RPL_NAMREPLY => {}
            RPL_ENDOFNAMES => {
                if message.params.len() >= 2 {
                    facts.push(ReplyFact::JoinConfirmed {
                        channel: message.params[1].clone(),
                    });
                }
            }
            other if other < FIRST_ERROR_CODE && self.tagged.allows(other) => {
                if !text.trim().is_empty() {
                    let tagged = format!("[{:03}] {}", other, text);
                    self.push_motd_line(&tagged);
                }
            }
            _ => {}
        }

        facts
    }

    fn push_motd_line(&mut self, text: &str) {
        if let MotdState::Collecting(lines) = &mut self.motd {
            if !text.trim().is_empty() {
                lines.push(text.to_string());
            }
        }
    }
}
