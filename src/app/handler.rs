use crate::app::action::Action;
use crate::app::event::AppEvent;
use crate::app::mention::is_mentioned;
use crate::app::state::{AppState, ServerTarget};
use crate::irc::client::normalize_channel;
use crate::irc::commands::{self, ParsedCommand};
use crate::irc::{ChannelInfo, ClientEvent, ConnectionState, MembershipChange, ServerMessageBlock};

/// Update `state` for one event and return the side effects to perform.
pub fn handle_event(state: &mut AppState, event: AppEvent) -> Vec<Action> {
    match event {
        AppEvent::Input(line) => handle_input(state, &line),
        AppEvent::InputClosed => {
            state.should_quit = true;
            vec![Action::Quit { reason: None }]
        }
        AppEvent::Irc(event) => handle_client_event(state, event),
    }
}

/// Connect to the configured server, as a bare `/connect` would.
pub fn auto_connect(state: &mut AppState) -> Vec<Action> {
    handle_command(
        state,
        ParsedCommand::Connect {
            host: None,
            port: None,
            nick: None,
        },
    )
}

fn handle_input(state: &mut AppState, line: &str) -> Vec<Action> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.trim().is_empty() {
        return vec![];
    }
    match commands::parse_command(line) {
        None => send_to_current_channel(state, line),
        Some(Err(e)) => {
            state.error_message(e.to_string());
            vec![]
        }
        Some(Ok(cmd)) => handle_command(state, cmd),
    }
}

fn send_to_current_channel(state: &mut AppState, text: &str) -> Vec<Action> {
    let Some(channel) = state.current_channel.clone() else {
        state.error_message("Not in a channel; use /join <channel> or /msg <target> <text>");
        return vec![];
    };
    if !state.is_connected() {
        state.error_message("Not connected; use /connect");
        return vec![];
    }
    if state.config.behavior.echo_own_messages {
        let nick = state.nickname.clone();
        state.chat_message(Some(&channel), &nick, text);
    }
    vec![Action::SendMessage {
        target: channel,
        text: text.to_string(),
    }]
}

fn handle_command(state: &mut AppState, cmd: ParsedCommand) -> Vec<Action> {
    match cmd {
        ParsedCommand::Connect { host, port, nick } => {
            let host = host.unwrap_or_else(|| state.config.server.host.clone());
            let port = port.unwrap_or(state.config.server.port);
            let nick = nick.unwrap_or_else(|| state.nickname.clone());
            state.nickname = nick.clone();
            state.server = Some(ServerTarget {
                host: host.clone(),
                port,
            });
            state.current_channel = None;
            state.system_message(format!("Connecting to {}:{} as {}...", host, port, nick));
            vec![Action::Connect { host, port, nick }]
        }
        ParsedCommand::Disconnect => {
            state.current_channel = None;
            vec![Action::Disconnect]
        }
        ParsedCommand::Join { channel } => {
            state.current_channel = Some(normalize_channel(&channel));
            vec![Action::Join { channel }]
        }
        ParsedCommand::Msg { target, text } => {
            if state.config.behavior.echo_own_messages {
                let nick = state.nickname.clone();
                state.chat_message(Some(&target), &nick, &text);
            }
            vec![Action::SendMessage { target, text }]
        }
        ParsedCommand::List => {
            state.system_message("Requesting channel list...");
            vec![Action::ListChannels]
        }
        ParsedCommand::Raw { line } => vec![Action::Raw { line }],
        ParsedCommand::Save => {
            if let Some(server) = state.server.clone() {
                state.config.server.host = server.host;
                state.config.server.port = server.port;
            }
            state.config.server.nickname = state.nickname.clone();
            vec![Action::SaveConfig]
        }
        ParsedCommand::Help => {
            state.system_message("Commands:");
            for line in commands::HELP {
                state.push(format!("    {}", line));
            }
            state.push("    Anything else is sent to the current channel.".to_string());
            vec![]
        }
        ParsedCommand::Quit { reason } => {
            state.should_quit = true;
            vec![Action::Quit { reason }]
        }
    }
}

fn handle_client_event(state: &mut AppState, event: ClientEvent) -> Vec<Action> {
    match event {
        ClientEvent::StateChanged(new_state) => {
            let previous = std::mem::replace(&mut state.connection, new_state);
            match new_state {
                ConnectionState::Connected => state.system_message("Connected; registering..."),
                ConnectionState::Disconnected if previous != ConnectionState::Disconnected => {
                    state.current_channel = None;
                    state.system_message("Disconnected.");
                }
                ConnectionState::Error => state.current_channel = None,
                _ => {}
            }
            vec![]
        }
        ClientEvent::Error(error) => {
            state.error_message(error);
            vec![]
        }
        ClientEvent::Chat { from, target, text } => {
            let to_us = target.eq_ignore_ascii_case(&state.nickname);
            if to_us {
                state.private_message(&from, &text);
            } else {
                state.chat_message(Some(&target), &from, &text);
            }
            if state.config.behavior.bell_on_mention && (to_us || is_mentioned(&text, &state.nickname)) {
                state.pending_bell = true;
            }
            vec![]
        }
        ClientEvent::Membership(change) => {
            match &change {
                MembershipChange::Joined { nick, channel } if nick.eq_ignore_ascii_case(&state.nickname) => {
                    state.current_channel = Some(channel.clone());
                }
                MembershipChange::Parted { nick, channel }
                    if nick.eq_ignore_ascii_case(&state.nickname)
                        && state.current_channel.as_deref() == Some(channel.as_str()) =>
                {
                    state.current_channel = None;
                }
                MembershipChange::NickChanged { old, new } if old.eq_ignore_ascii_case(&state.nickname) => {
                    state.nickname = new.clone();
                }
                _ => {}
            }
            state.system_message(change.to_string());
            vec![]
        }
        ClientEvent::Registered { nick } => {
            state.nickname = nick.clone();
            state.system_message(format!("Registered as {}", nick));
            state
                .config
                .server
                .channels
                .iter()
                .map(|channel| Action::Join {
                    channel: channel.clone(),
                })
                .collect()
        }
        ClientEvent::ServerMessages(block) => {
            render_server_messages(state, &block);
            vec![]
        }
        ClientEvent::ChannelList(channels) => {
            render_channel_list(state, &channels);
            vec![]
        }
        ClientEvent::Topic { channel, topic } => {
            state.system_message(format!("Topic for {}: {}", channel, topic));
            vec![]
        }
        ClientEvent::JoinConfirmed { channel } => {
            state.system_message(format!("Now talking in {}", channel));
            vec![]
        }
    }
}

fn render_server_messages(state: &mut AppState, block: &ServerMessageBlock) {
    state.system_message(format!("Server messages ({} lines):", block.len()));
    for line in &block.lines {
        state.push(format!("    {}", line));
    }
}

fn render_channel_list(state: &mut AppState, channels: &[ChannelInfo]) {
    state.system_message(format!("Channel list ({} channels):", channels.len()));
    for channel in channels {
        if channel.topic.is_empty() {
            state.push(format!("    {} ({} users)", channel.name, channel.user_count));
        } else {
            state.push(format!("    {} ({} users) {}", channel.name, channel.user_count, channel.topic));
        }
    }
}
