use crate::irc::ClientEvent;

#[derive(Debug)]
pub enum AppEvent {
    /// One line typed by the user.
    Input(String),
    /// Standard input reached end of file.
    InputClosed,
    /// Something reported by the IRC client.
    Irc(ClientEvent),
}
