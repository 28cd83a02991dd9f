/// Side effects requested by the handler and carried out by the main loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Connect { host: String, port: u16, nick: String },
    Disconnect,
    Join { channel: String },
    SendMessage { target: String, text: String },
    ListChannels,
    Raw { line: String },
    SaveConfig,
    Quit { reason: Option<String> },
}
