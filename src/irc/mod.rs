//! IRC protocol layer: wire codec, numeric aggregation, connection management,
//! the client facade and the slash-command parser.

pub mod client;
pub mod commands;
pub mod connection;
pub mod message;
pub mod numeric;

pub use client::{ClientEvent, ClientSettings, IrcClient, MembershipChange};
pub use connection::{ConnectionError, ConnectionSettings, ConnectionState};
pub use message::IrcMessage;
pub use numeric::{ChannelInfo, ServerMessageBlock, TaggedReplies};
