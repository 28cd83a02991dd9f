//! Client facade.
//!
//! [`IrcClient`] is what the rest of the application talks to. It owns a
//! [`ConnectionManager`] and a dispatch task; the dispatch task owns the
//! [`ReplyAggregator`] and turns raw link events into [`ClientEvent`]s.
//!
//! Must be created inside a Tokio runtime.

use std::fmt;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tracing::debug;

use super::connection::{ConnectionError, ConnectionManager, ConnectionSettings, ConnectionState, LinkEvent};
use super::message::{self, IrcMessage};
use super::numeric::{ChannelInfo, ReplyAggregator, ReplyFact, ServerMessageBlock, TaggedReplies};

#[derive(Debug, Clone, Default)]
pub struct ClientSettings {
    pub connection: ConnectionSettings,
    pub tagged_replies: TaggedReplies,
}

/// Someone joining, leaving, quitting or renaming.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MembershipChange {
    Joined { nick: String, channel: String },
    Parted { nick: String, channel: String },
    Quit { nick: String, reason: String },
    NickChanged { old: String, new: String },
}

impl fmt::Display for MembershipChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MembershipChange::Joined { nick, channel } => write!(f, "[+] {} joined {}", nick, channel),
            MembershipChange::Parted { nick, channel } => write!(f, "[-] {} left {}", nick, channel),
            MembershipChange::Quit { nick, reason } => write!(f, "[-] {} quit ({})", nick, reason),
            MembershipChange::NickChanged { old, new } => write!(f, "[*] {} is now known as {}", old, new),
        }
    }
}

/// Everything the client reports to the application, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    StateChanged(ConnectionState),
    Error(String),
    Chat { from: String, target: String, text: String },
    Membership(MembershipChange),
    /// The server accepted registration under `nick`.
    Registered { nick: String },
    ServerMessages(ServerMessageBlock),
    ChannelList(Vec<ChannelInfo>),
    Topic { channel: String, topic: String },
    JoinConfirmed { channel: String },
}

enum Control {
    ClearChannelList,
}

pub struct IrcClient {
    connection: ConnectionManager,
    control: mpsc::UnboundedSender<Control>,
    nickname: Arc<watch::Sender<String>>,
}

impl IrcClient {
    pub fn new(settings: ClientSettings, events: mpsc::UnboundedSender<ClientEvent>) -> Self {
        let (link_tx, link_rx) = mpsc::unbounded_channel();
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (nickname, _) = watch::channel(String::new());
        let nickname = Arc::new(nickname);

        let dispatcher = Dispatcher {
            aggregator: ReplyAggregator::new(settings.tagged_replies),
            nickname: Arc::clone(&nickname),
            events,
        };
        tokio::spawn(dispatcher.run(link_rx, control_rx));

        Self {
            connection: ConnectionManager::new(settings.connection, link_tx),
            control: control_tx,
            nickname,
        }
    }

    pub async fn connect(&self, server: &str, port: u16, nickname: &str) -> Result<(), ConnectionError> {
        self.nickname.send_replace(nickname.to_string());
        self.connection.connect(server, port, nickname).await
    }

    pub async fn disconnect(&self) {
        self.connection.disconnect().await;
    }

    pub async fn quit(&self, reason: Option<&str>) {
        self.connection.disconnect_with_reason(reason).await;
    }

    /// Join `channel`, adding a leading `#` if missing. Returns the name sent.
    pub async fn join_channel(&self, channel: &str) -> Result<String, ConnectionError> {
        let name = normalize_channel(channel);
        self.connection.send(&message::join(&name)).await?;
        Ok(name)
    }

    pub async fn send_message(&self, target: &str, text: &str) -> Result<(), ConnectionError> {
        self.connection.send(&message::privmsg(target, text)).await
    }

    /// Start a fresh LIST; the result arrives as [`ClientEvent::ChannelList`].
    pub async fn request_channel_list(&self) -> Result<(), ConnectionError> {
        // The dispatcher drains control messages before link events, so the
        // clear lands before any reply to this LIST.
        let _ = self.control.send(Control::ClearChannelList);
        self.connection.send(&message::list()).await
    }

    /// Send a user-typed command line as-is.
    pub async fn send_raw(&self, line: &str) -> Result<(), ConnectionError> {
        let line = line.trim_end_matches(['\r', '\n']);
        self.connection.send(&format!("{}\r\n", line)).await
    }

    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.connection.subscribe_state()
    }

    /// Current nickname: the one asked for, updated by 001 and our own NICKs.
    pub fn nickname(&self) -> String {
        self.nickname.borrow().clone()
    }
}

pub fn normalize_channel(channel: &str) -> String {
    let channel = channel.trim();
    if channel.starts_with('#') {
        channel.to_string()
    } else {
        format!("#{}", channel)
    }
}

struct Dispatcher {
    aggregator: ReplyAggregator,
    nickname: Arc<watch::Sender<String>>,
    events: mpsc::UnboundedSender<ClientEvent>,
}

impl Dispatcher {
    async fn run(
        mut self,
        mut link_rx: mpsc::UnboundedReceiver<LinkEvent>,
        mut control_rx: mpsc::UnboundedReceiver<Control>,
    ) {
        loop {
            tokio::select! {
                biased;
                Some(control) = control_rx.recv() => match control {
                    Control::ClearChannelList => self.aggregator.clear_channel_list(),
                },
                event = link_rx.recv() => {
                    let Some(event) = event else { break };
                    for out in self.translate(event) {
                        if self.events.send(out).is_err() {
                            debug!("Event receiver dropped; stopping dispatcher");
                            return;
                        }
                    }
                }
            }
        }
        debug!("Connection manager gone; stopping dispatcher");
    }

    fn translate(&mut self, event: LinkEvent) -> Vec<ClientEvent> {
        match event {
            LinkEvent::State(state) => {
                if state != ConnectionState::Connected {
                    self.aggregator.reset();
                }
                vec![ClientEvent::StateChanged(state)]
            }
            LinkEvent::Error(error) => vec![ClientEvent::Error(error)],
            LinkEvent::Message(msg) => self.translate_message(&msg),
        }
    }

    fn translate_message(&mut self, msg: &IrcMessage) -> Vec<ClientEvent> {
        if msg.is_numeric_reply() {
            return self
                .aggregator
                .handle(msg)
                .into_iter()
                .map(|fact| self.fact_event(fact))
                .collect();
        }

        let nick = msg.sender_nick().to_string();
        let change = match msg.command.to_ascii_uppercase().as_str() {
            "PRIVMSG" => {
                return vec![ClientEvent::Chat {
                    from: nick,
                    target: msg.params.first().cloned().unwrap_or_default(),
                    text: msg.trailing.clone(),
                }];
            }
            "JOIN" => MembershipChange::Joined {
                nick,
                channel: msg.trailing_or_first_param().to_string(),
            },
            "PART" => MembershipChange::Parted {
                nick,
                channel: msg.params.first().cloned().unwrap_or_default(),
            },
            "QUIT" => MembershipChange::Quit {
                nick,
                reason: msg.trailing.clone(),
            },
            "NICK" => {
                let new = msg.trailing_or_first_param().to_string();
                let is_self = *self.nickname.borrow() == nick;
                if is_self {
                    self.nickname.send_replace(new.clone());
                }
                MembershipChange::NickChanged { old: nick, new }
            }
            _ => return Vec::new(),
        };
        vec![ClientEvent::Membership(change)]
    }

    fn fact_event(&self, fact: ReplyFact) -> ClientEvent {
        match fact {
            ReplyFact::Registered { nick } => {
                self.nickname.send_replace(nick.clone());
                ClientEvent::Registered { nick }
            }
            ReplyFact::ServerMessages(block) => ClientEvent::ServerMessages(block),
            ReplyFact::ChannelList(channels) => ClientEvent::ChannelList(channels),
            ReplyFact::Topic { channel, topic } => ClientEvent::Topic { channel, topic },
            ReplyFact::JoinConfirmed { channel } => ClientEvent::JoinConfirmed { channel },
        }
    }
}
