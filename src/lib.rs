//! ircline: a small IRC client core with a line-oriented terminal front end.

pub mod app;
pub mod config;
pub mod irc;
pub mod logging;
