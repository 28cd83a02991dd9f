use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ircline::app::action::Action;
use ircline::app::event::AppEvent;
use ircline::app::handler;
use ircline::app::state::AppState;
use ircline::config::{self, AppConfig};
use ircline::irc::{ClientEvent, IrcClient};
use ircline::logging::ChatLogger;

#[derive(Parser, Debug)]
#[command(name = "ircline", version)]
#[command(about = "Line-oriented IRC client")]
struct Cli {
    /// Config file (default: <config dir>/ircline/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Server host, overrides the config
    #[arg(short, long)]
    server: Option<String>,

    #[arg(short, long)]
    port: Option<u16>,

    #[arg(short, long)]
    nick: Option<String>,

    /// Do not connect on startup even if the config says so
    #[arg(long)]
    no_connect: bool,

    /// Debug logging on stderr
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "ircline=debug" } else { "ircline=info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| default_filter.into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_target(false).with_writer(io::stderr))
        .init();

    let config_path = cli.config.clone().unwrap_or_else(config::config_path);
    let mut cfg = config::load_config(&config_path)?;
    info!("ircline v{} using {}", env!("CARGO_PKG_VERSION"), config_path.display());

    // Naming a server on the command line means "connect to it now".
    let mut auto_connect = cfg.server.auto_connect || cli.server.is_some();
    if let Some(host) = cli.server {
        cfg.server.host = host;
    }
    if let Some(port) = cli.port {
        cfg.server.port = port;
    }
    if let Some(nick) = cli.nick {
        cfg.server.nickname = nick;
    }
    if cli.no_connect {
        auto_connect = false;
    }

    if let Err(e) = run_app(cfg, config_path, auto_connect).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
    Ok(())
}

async fn run_app(cfg: AppConfig, config_path: PathBuf, auto_connect: bool) -> Result<()> {
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<AppEvent>();
    let (client_tx, mut client_rx) = mpsc::unbounded_channel::<ClientEvent>();

    let client = IrcClient::new(cfg.client_settings(), client_tx);
    let mut chat_logger = ChatLogger::new(&cfg.logging);
    if cfg.logging.enabled {
        info!("Writing transcripts to {}", chat_logger.log_dir().display());
    }
    let mut state = AppState::new(cfg);

    // Client events into the app loop
    let irc_tx = event_tx.clone();
    tokio::spawn(async move {
        while let Some(event) = client_rx.recv().await {
            if irc_tx.send(AppEvent::Irc(event)).is_err() {
                break;
            }
        }
    });

    // Standard input, one line at a time
    let input_tx = event_tx;
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if input_tx.send(AppEvent::Input(line)).is_err() {
                        break;
                    }
                }
                Ok(None) => {
                    let _ = input_tx.send(AppEvent::InputClosed);
                    break;
                }
                Err(e) => {
                    warn!("Failed to read standard input: {}", e);
                    let _ = input_tx.send(AppEvent::InputClosed);
                    break;
                }
            }
        }
    });

    state.system_message("Welcome to ircline. Type /help for commands.");
    let mut actions = if auto_connect {
        handler::auto_connect(&mut state)
    } else {
        state.system_message("Not connected. Use /connect [host[:port]] [nick].");
        Vec::new()
    };

    loop {
        render(&mut state)?;
        for action in actions.drain(..) {
            execute(&client, &mut state, &mut chat_logger, &config_path, action).await;
            render(&mut state)?;
        }
        if state.should_quit {
            break;
        }

        let Some(event) = event_rx.recv().await else { break };
        if let AppEvent::Irc(ref event) = event {
            chat_logger.record(event, &state.nickname);
        }
        actions = handler::handle_event(&mut state, event);
    }

    debug!("Leaving main loop");
    Ok(())
}

async fn execute(
    client: &IrcClient,
    state: &mut AppState,
    chat_logger: &mut ChatLogger,
    config_path: &Path,
    action: Action,
) {
    match action {
        Action::Connect { host, port, nick } => {
            // Failures also arrive as a client error event.
            if let Err(e) = client.connect(&host, port, &nick).await {
                debug!("Connect failed: {}", e);
            }
        }
        Action::Disconnect => client.disconnect().await,
        Action::Join { channel } => {
            if let Err(e) = client.join_channel(&channel).await {
                state.error_message(format!("Join failed: {}", e));
            }
        }
        Action::SendMessage { target, text } => match client.send_message(&target, &text).await {
            Ok(()) => chat_logger.record_outgoing(&target, &state.nickname, &text),
            Err(e) => state.error_message(format!("Send failed: {}", e)),
        },
        Action::ListChannels => {
            if let Err(e) = client.request_channel_list().await {
                state.error_message(format!("List failed: {}", e));
            }
        }
        Action::Raw { line } => {
            if let Err(e) = client.send_raw(&line).await {
                state.error_message(format!("Send failed: {}", e));
            }
        }
        Action::SaveConfig => match config::save_config(&state.config, config_path)
            .with_context(|| "Could not save settings")
        {
            Ok(()) => state.system_message(format!("Saved settings to {}", config_path.display())),
            Err(e) => state.error_message(format!("{:#}", e)),
        },
        Action::Quit { reason } => client.quit(reason.as_deref()).await,
    }
}

/// Print pending lines to stdout, ringing the bell first if asked.
fn render(state: &mut AppState) -> Result<()> {
    let lines = state.take_output();
    let bell = state.take_bell();
    if lines.is_empty() && !bell {
        return Ok(());
    }
    let mut out = io::stdout().lock();
    if bell {
        write!(out, "\x07")?;
    }
    for line in lines {
        writeln!(out, "{}", line)?;
    }
    out.flush()?;
    Ok(())
}
