//! TCP connection lifecycle.
//!
//! [`ConnectionManager`] owns at most one live link to an IRC server: the
//! socket halves, the single background receive task, and the shutdown signal
//! for that task. Connect and disconnect are serialized by one async lock, so
//! overlapping `connect` calls can never leave two live sockets behind.
//!
//! Everything the link observes is reported as a [`LinkEvent`] on the channel
//! handed to [`ConnectionManager::new`], strictly in the order it happened.
//! PINGs are answered inside the receive task before they are forwarded.

use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, trace, warn};

use super::message::{self, IrcMessage};

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(30);

/// Longest inbound line kept, terminator included. Longer lines are dropped.
pub const MAX_LINE_BYTES: usize = 8192;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

/// Timeouts and teardown text for one manager.
#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    pub connect_timeout: Duration,
    /// How long one read waits before the loop simply tries again.
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    /// Reason sent with QUIT on an explicit disconnect.
    pub quit_message: Option<String>,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            quit_message: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("Connection to {addr} failed: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("Connection to {addr} timed out after {secs}s", secs = .timeout.as_secs())]
    ConnectTimeout { addr: String, timeout: Duration },

    #[error("Not connected to a server")]
    NotConnected,

    #[error("Send failed: {0}")]
    Write(#[source] io::Error),

    #[error("Send timed out after {secs}s", secs = .0.as_secs())]
    WriteTimeout(Duration),
}

/// What the link reports upward.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    State(ConnectionState),
    Message(IrcMessage),
    Error(String),
}

type SharedWriter = Arc<Mutex<OwnedWriteHalf>>;

/// A fully set up connection. Dropping it also fires the shutdown signal.
struct LiveLink {
    generation: u64,
    writer: SharedWriter,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

enum Link {
    Idle,
    Live(LiveLink),
}

enum Teardown {
    /// Caller asked to disconnect: send QUIT (with this reason, else the
    /// configured one), end in `Disconnected`.
    Requested(Option<String>),
    /// The server ended the stream: end in `Disconnected`, no error event.
    Closed,
    /// The link broke underneath us: report why, end in `Error`.
    Lost(String),
}

enum LoopExit {
    Shutdown,
    PeerClosed,
    Failed(String),
}

struct Inner {
    settings: ConnectionSettings,
    /// Serializes connect/disconnect/teardown sequences.
    lifecycle: Mutex<()>,
    link: Mutex<Link>,
    state: watch::Sender<ConnectionState>,
    events: mpsc::UnboundedSender<LinkEvent>,
    next_generation: AtomicU64,
}

/// Cheap to clone; all clones drive the same link.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

impl ConnectionManager {
    pub fn new(settings: ConnectionSettings, events: mpsc::UnboundedSender<LinkEvent>) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            inner: Arc::new(Inner {
                settings,
                lifecycle: Mutex::new(()),
                link: Mutex::new(Link::Idle),
                state,
                events,
                next_generation: AtomicU64::new(0),
            }),
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    /// Open a new link, replacing any live one, and register as `nickname`.
    ///
    /// Failures close whatever was opened, move the state to `Error`, emit an
    /// error event, and are returned. There is no automatic retry.
    pub async fn connect(&self, server: &str, port: u16, nickname: &str) -> Result<(), ConnectionError> {
        let _guard = self.inner.lifecycle.lock().await;

        if let Some(live) = self.take_link(None).await {
            info!(generation = live.generation, "Replacing live connection");
            self.close_link(live, Teardown::Requested(None)).await;
        }

        self.set_state(ConnectionState::Connecting);
        info!(server, port, nickname, "Connecting");

        let (reader, writer) = match self.open(server, port, nickname).await {
            Ok(halves) => halves,
            Err(e) => {
                warn!(server, port, error = %e, "Connection failed");
                self.report_error(e.to_string());
                self.set_state(ConnectionState::Error);
                return Err(e);
            }
        };

        let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed) + 1;
        let writer = Arc::new(Mutex::new(writer));
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        // Holding the link lock across the state change makes a `send` that
        // reacts to `Connected` wait for the stored link.
        let mut link = self.inner.link.lock().await;
        self.set_state(ConnectionState::Connected);
        let task = tokio::spawn(self.clone().receive_loop(
            generation,
            reader,
            Arc::clone(&writer),
            shutdown_rx,
        ));
        *link = Link::Live(LiveLink {
            generation,
            writer,
            shutdown: shutdown_tx,
            task,
        });
        drop(link);

        info!(server, port, generation, "Connected");
        Ok(())
    }

    /// Close the live link, if any. Safe to call repeatedly.
    pub async fn disconnect(&self) {
        self.disconnect_with_reason(None).await;
    }

    /// Like [`disconnect`](Self::disconnect) with an explicit QUIT reason.
    pub async fn disconnect_with_reason(&self, reason: Option<&str>) {
        let _guard = self.inner.lifecycle.lock().await;
        match self.take_link(None).await {
            Some(live) => {
                self.close_link(live, Teardown::Requested(reason.map(str::to_string)))
                    .await
            }
            None => {
                if self.state() != ConnectionState::Disconnected {
                    self.set_state(ConnectionState::Disconnected);
                }
            }
        }
    }

    /// Write one raw line (the caller supplies the CRLF).
    ///
    /// A failed write also tears the link down before the error is returned.
    pub async fn send(&self, line: &str) -> Result<(), ConnectionError> {
        let (generation, writer) = {
            let link = self.inner.link.lock().await;
            match &*link {
                Link::Live(live) => (live.generation, Arc::clone(&live.writer)),
                Link::Idle => return Err(ConnectionError::NotConnected),
            }
        };

        let result = {
            let mut w = writer.lock().await;
            write_line(&mut w, line, self.inner.settings.write_timeout).await
        };

        match &result {
            Ok(()) => debug!(generation, ">> {}", line.trim_end()),
            Err(e) => {
                warn!(generation, error = %e, "Send failed; dropping connection");
                self.end_link(generation, Teardown::Lost(e.to_string())).await;
            }
        }
        result
    }

    async fn open(
        &self,
        server: &str,
        port: u16,
        nickname: &str,
    ) -> Result<(BufReader<OwnedReadHalf>, OwnedWriteHalf), ConnectionError> {
        let settings = &self.inner.settings;
        let addr = format!("{}:{}", server, port);

        let stream = match timeout(settings.connect_timeout, TcpStream::connect((server, port))).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(source)) => return Err(ConnectionError::Connect { addr, source }),
            Err(_) => {
                return Err(ConnectionError::ConnectTimeout {
                    addr,
                    timeout: settings.connect_timeout,
                })
            }
        };

        let (read_half, mut write_half) = stream.into_split();
        write_line(&mut write_half, &message::nick(nickname), settings.write_timeout).await?;
        write_line(&mut write_half, &message::user(nickname, nickname), settings.write_timeout).await?;

        Ok((BufReader::new(read_half), write_half))
    }

    async fn take_link(&self, generation: Option<u64>) -> Option<LiveLink> {
        let mut link = self.inner.link.lock().await;
        let matches = match (&*link, generation) {
            (Link::Live(live), Some(g)) => live.generation == g,
            (Link::Live(_), None) => true,
            (Link::Idle, _) => false,
        };
        if !matches {
            return None;
        }
        match std::mem::replace(&mut *link, Link::Idle) {
            Link::Live(live) => Some(live),
            Link::Idle => None,
        }
    }

    /// Tear down link `generation` if it is still the live one.
    async fn end_link(&self, generation: u64, cause: Teardown) {
        let _guard = self.inner.lifecycle.lock().await;
        if let Some(live) = self.take_link(Some(generation)).await {
            match &cause {
                Teardown::Lost(reason) => warn!(generation, %reason, "Connection lost"),
                _ => info!(generation, "Connection closed by server"),
            }
            self.close_link(live, cause).await;
        }
    }

    /// Close every resource of a link already removed from `self.link`.
    /// Individual close failures are logged and never propagated.
    async fn close_link(&self, live: LiveLink, cause: Teardown) {
        let LiveLink {
            generation,
            writer,
            shutdown,
            task,
        } = live;

        if let Teardown::Requested(reason) = &cause {
            let reason = reason.as_deref().or(self.inner.settings.quit_message.as_deref());
            let quit = message::quit(reason);
            let mut w = writer.lock().await;
            if let Err(e) = write_line(&mut w, &quit, self.inner.settings.write_timeout).await {
                debug!(generation, error = %e, "QUIT not delivered");
            }
        }

        // The loop may already be gone; a closed receiver is fine.
        let _ = shutdown.send(());
        drop(task);

        {
            let mut w = writer.lock().await;
            if let Err(e) = w.shutdown().await {
                debug!(generation, error = %e, "Writer shutdown failed");
            }
        }

        match cause {
            Teardown::Requested(_) | Teardown::Closed => {
                info!(generation, "Disconnected");
                self.set_state(ConnectionState::Disconnected);
            }
            Teardown::Lost(reason) => {
                self.report_error(reason);
                self.set_state(ConnectionState::Error);
            }
        }
    }

    async fn receive_loop(
        self,
        generation: u64,
        mut reader: BufReader<OwnedReadHalf>,
        writer: SharedWriter,
        mut shutdown: oneshot::Receiver<()>,
    ) {
        let settings = self.inner.settings.clone();
        let mut buf: Vec<u8> = Vec::with_capacity(512);
        // Set while the rest of an over-long line is being thrown away.
        let mut discarding = false;

        let exit = loop {
            // read_until keeps partial bytes in `buf` when the timeout fires,
            // so a retry continues the same line. `buf` never exceeds the cap,
            // so the remaining allowance is at least one byte.
            let mut limited = (&mut reader).take((MAX_LINE_BYTES - buf.len()) as u64);
            let read = tokio::select! {
                biased;
                _ = &mut shutdown => break LoopExit::Shutdown,
                read = timeout(settings.read_timeout, limited.read_until(b'\n', &mut buf)) => read,
            };

            match read {
                Err(_) => {
                    trace!(generation, "Read timed out; still waiting");
                    continue;
                }
                Ok(Ok(0)) => break LoopExit::PeerClosed,
                Ok(Ok(_)) => {}
                Ok(Err(e)) => break LoopExit::Failed(format!("Receive error: {}", e)),
            }

            if buf.last() != Some(&b'\n') {
                // Either the allowance ran out or the stream ended mid-line;
                // the next read tells the two apart.
                if buf.len() >= MAX_LINE_BYTES {
                    if !discarding {
                        trace!(generation, limit = MAX_LINE_BYTES, "Dropping oversized line");
                    }
                    discarding = true;
                    buf.clear();
                }
                continue;
            }
            if discarding {
                discarding = false;
                buf.clear();
                continue;
            }

            let line = String::from_utf8_lossy(&buf).into_owned();
            buf.clear();
            trace!(generation, "<< {}", line.trim_end());

            let Some(msg) = IrcMessage::parse(&line) else {
                trace!(generation, "Skipping unparsable line");
                continue;
            };

            if msg.is_ping() {
                let pong = message::pong(msg.ping_token());
                let mut w = writer.lock().await;
                if let Err(e) = write_line(&mut w, &pong, settings.write_timeout).await {
                    break LoopExit::Failed(format!("PONG failed: {}", e));
                }
            }

            if self.inner.events.send(LinkEvent::Message(msg)).is_err() {
                break LoopExit::Shutdown;
            }
        };

        match exit {
            LoopExit::Shutdown => debug!(generation, "Receive loop stopped"),
            LoopExit::PeerClosed => self.end_link(generation, Teardown::Closed).await,
            LoopExit::Failed(reason) => self.end_link(generation, Teardown::Lost(reason)).await,
        }
    }

    fn set_state(&self, state: ConnectionState) {
        self.inner.state.send_replace(state);
        let _ = self.inner.events.send(LinkEvent::State(state));
    }

    fn report_error(&self, error: String) {
        let _ = self.inner.events.send(LinkEvent::Error(error));
    }
}

async fn write_line(writer: &mut OwnedWriteHalf, line: &str, limit: Duration) -> Result<(), ConnectionError> {
    let write = async {
        writer.write_all(line.as_bytes()).await?;
        writer.flush().await
    };
    match timeout(limit, write).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(ConnectionError::Write(e)),
        Err(_) => Err(ConnectionError::WriteTimeout(limit)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncBufRead, AsyncReadExt};
    use tokio::net::TcpListener;

    const STEP: Duration = Duration::from_secs(5);

    fn manager() -> (ConnectionManager, mpsc::UnboundedReceiver<LinkEvent>) {
        manager_with(ConnectionSettings::default())
    }

    fn manager_with(settings: ConnectionSettings) -> (ConnectionManager, mpsc::UnboundedReceiver<LinkEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ConnectionManager::new(settings, tx), rx)
    }

    async fn listener() -> (TcpListener, u16) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        (listener, port)
    }

    async fn next_line<R: AsyncBufRead + Unpin>(reader: &mut R) -> String {
        let mut line = String::new();
        timeout(STEP, reader.read_line(&mut line)).await.unwrap().unwrap();
        line
    }

    async fn next_event(events: &mut mpsc::UnboundedReceiver<LinkEvent>) -> LinkEvent {
        timeout(STEP, events.recv()).await.unwrap().unwrap()
    }

    /// Skip state/error events until a message arrives.
    async fn next_message(events: &mut mpsc::UnboundedReceiver<LinkEvent>) -> IrcMessage {
        loop {
            if let LinkEvent::Message(msg) = next_event(events).await {
                return msg;
            }
        }
    }

    #[tokio::test]
    async fn test_connect_registers_and_reports_connected() {
        let (listener, port) = listener().await;
        let (manager, mut events) = manager();

        manager.connect("127.0.0.1", port, "crab").await.unwrap();
        assert_eq!(manager.state(), ConnectionState::Connected);
        assert_eq!(next_event(&mut events).await, LinkEvent::State(ConnectionState::Connecting));
        assert_eq!(next_event(&mut events).await, LinkEvent::State(ConnectionState::Connected));

        let (stream, _) = listener.accept().await.unwrap();
        let mut server = BufReader::new(stream);
        assert_eq!(next_line(&mut server).await, "NICK crab\r\n");
        assert_eq!(next_line(&mut server).await, "USER crab 0 * :crab\r\n");
    }

    #[tokio::test]
    async fn test_ping_is_answered_before_it_is_forwarded() {
        let (listener, port) = listener().await;
        let (manager, mut events) = manager();
        manager.connect("127.0.0.1", port, "crab").await.unwrap();

        let (stream, _) = listener.accept().await.unwrap();
        let (read_half, mut write_half) = stream.into_split();
        let mut server = BufReader::new(read_half);
        next_line(&mut server).await;
        next_line(&mut server).await;

        write_half.write_all(b"PING :irc.example.org\r\n").await.unwrap();

        let forwarded = next_message(&mut events).await;
        assert!(forwarded.is_ping());
        // The PONG was flushed before the event went out, so it is already here.
        assert_eq!(next_line(&mut server).await, "PONG :irc.example.org\r\n");

        write_half.write_all(b":a!b@c PRIVMSG #x :after\r\n").await.unwrap();
        let next = next_message(&mut events).await;
        assert!(next.is_privmsg());
        assert_eq!(next.trailing, "after");
    }

    #[tokio::test]
    async fn test_garbage_lines_are_skipped() {
        let (listener, port) = listener().await;
        let (manager, mut events) = manager();
        manager.connect("127.0.0.1", port, "crab").await.unwrap();

        let (mut stream, _) = listener.accept().await.unwrap();
        stream
            .write_all(b"\r\n   \r\n:lonelyprefix\r\n:srv 372 crab :- motd\r\n")
            .await
            .unwrap();

        let msg = next_message(&mut events).await;
        assert_eq!(msg.numeric_code(), Some(372));
    }

    #[tokio::test]
    async fn test_send_when_idle_is_rejected() {
        let (manager, _events) = manager();
        let err = manager.send(&message::list()).await.unwrap_err();
        assert!(matches!(err, ConnectionError::NotConnected));
    }

    #[tokio::test]
    async fn test_refused_connect_reports_error() {
        let (listener, port) = listener().await;
        drop(listener);
        let (manager, mut events) = manager();

        let err = manager.connect("127.0.0.1", port, "crab").await.unwrap_err();
        assert!(matches!(err, ConnectionError::Connect { .. }));
        assert_eq!(manager.state(), ConnectionState::Error);

        assert_eq!(next_event(&mut events).await, LinkEvent::State(ConnectionState::Connecting));
        assert!(matches!(next_event(&mut events).await, LinkEvent::Error(_)));
        assert_eq!(next_event(&mut events).await, LinkEvent::State(ConnectionState::Error));
        assert!(matches!(
            manager.send("LIST\r\n").await,
            Err(ConnectionError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_disconnect_sends_quit_and_is_idempotent() {
        let (listener, port) = listener().await;
        let (tx, _rx) = mpsc::unbounded_channel();
        let settings = ConnectionSettings {
            quit_message: Some("see you".to_string()),
            ..ConnectionSettings::default()
        };
        let manager = ConnectionManager::new(settings, tx);
        manager.connect("127.0.0.1", port, "crab").await.unwrap();
        let (mut stream, _) = listener.accept().await.unwrap();

        manager.disconnect().await;
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        manager.disconnect().await;
        assert_eq!(manager.state(), ConnectionState::Disconnected);

        let mut received = String::new();
        timeout(STEP, stream.read_to_string(&mut received)).await.unwrap().unwrap();
        assert_eq!(received, "NICK crab\r\nUSER crab 0 * :crab\r\nQUIT :see you\r\n");

        assert!(matches!(
            manager.send(&message::list()).await,
            Err(ConnectionError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_explicit_quit_reason_overrides_setting() {
        let (listener, port) = listener().await;
        let (manager, _events) = manager();
        manager.connect("127.0.0.1", port, "crab").await.unwrap();
        let (mut stream, _) = listener.accept().await.unwrap();

        manager.disconnect_with_reason(Some("gone fishing")).await;

        let mut received = String::new();
        timeout(STEP, stream.read_to_string(&mut received)).await.unwrap().unwrap();
        assert!(received.ends_with("QUIT :gone fishing\r\n"));
    }

    #[tokio::test]
    async fn test_server_close_ends_disconnected() {
        let (listener, port) = listener().await;
        let (manager, mut events) = manager();
        manager.connect("127.0.0.1", port, "crab").await.unwrap();

        // Read registration first so the close is a clean FIN, not a reset.
        let (stream, _) = listener.accept().await.unwrap();
        let mut server = BufReader::new(stream);
        next_line(&mut server).await;
        next_line(&mut server).await;
        drop(server);

        let mut states = Vec::new();
        while states.last() != Some(&ConnectionState::Disconnected) {
            match next_event(&mut events).await {
                LinkEvent::State(state) => states.push(state),
                LinkEvent::Error(e) => panic!("unexpected error event: {}", e),
                LinkEvent::Message(_) => {}
            }
        }
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert_eq!(
            states,
            vec![
                ConnectionState::Connecting,
                ConnectionState::Connected,
                ConnectionState::Disconnected
            ]
        );
        assert!(matches!(
            manager.send(&message::list()).await,
            Err(ConnectionError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_read_timeout_keeps_partial_line() {
        let (listener, port) = listener().await;
        let (manager, mut events) = manager_with(ConnectionSettings {
            read_timeout: Duration::from_millis(100),
            ..ConnectionSettings::default()
        });
        manager.connect("127.0.0.1", port, "crab").await.unwrap();

        let (mut stream, _) = listener.accept().await.unwrap();
        stream.write_all(b":a!b@c PRIV").await.unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;
        stream.write_all(b"MSG #x :hello\r\n").await.unwrap();

        let msg = next_message(&mut events).await;
        assert!(msg.is_privmsg());
        assert_eq!(msg.trailing, "hello");
        assert_eq!(manager.state(), ConnectionState::Connected);
    }

    #[tokio::test]
    async fn test_oversized_line_is_dropped() {
        let (listener, port) = listener().await;
        let (manager, mut events) = manager();
        manager.connect("127.0.0.1", port, "crab").await.unwrap();

        let (mut stream, _) = listener.accept().await.unwrap();
        let mut flood = b":a!b@c PRIVMSG #x :".to_vec();
        flood.resize(3 * MAX_LINE_BYTES, b'a');
        flood.extend_from_slice(b"\r\n:srv 372 crab :- motd\r\n");
        stream.write_all(&flood).await.unwrap();

        let msg = next_message(&mut events).await;
        assert_eq!(msg.numeric_code(), Some(372));
        assert_eq!(msg.trailing, "- motd");
        assert_eq!(manager.state(), ConnectionState::Connected);
    }

    #[tokio::test]
    async fn test_failed_send_tears_down_with_error() {
        let (listener, port) = listener().await;
        let (manager, mut events) = manager_with(ConnectionSettings {
            write_timeout: Duration::from_millis(300),
            ..ConnectionSettings::default()
        });
        manager.connect("127.0.0.1", port, "crab").await.unwrap();

        // The server never reads, so a large enough line fills both socket
        // buffers and the write times out.
        let (_stream, _) = listener.accept().await.unwrap();
        let mut line = "a".repeat(64 * 1024 * 1024);
        line.push_str("\r\n");
        let err = manager.send(&line).await.unwrap_err();
        assert!(matches!(err, ConnectionError::WriteTimeout(_)));
        assert_eq!(manager.state(), ConnectionState::Error);

        let mut errors = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let LinkEvent::Error(reason) = event {
                errors.push(reason);
            }
        }
        assert_eq!(errors, vec![err.to_string()]);
        assert!(matches!(
            manager.send(&message::list()).await,
            Err(ConnectionError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_send_right_after_connected_reaches_link() {
        let (listener, port) = listener().await;
        let (manager, _events) = manager();
        let mut state = manager.subscribe_state();

        let sender = manager.clone();
        let waiter = tokio::spawn(async move {
            state.wait_for(|s| *s == ConnectionState::Connected).await.unwrap();
            sender.send(&message::list()).await
        });

        manager.connect("127.0.0.1", port, "crab").await.unwrap();
        timeout(STEP, waiter).await.unwrap().unwrap().unwrap();

        let (stream, _) = listener.accept().await.unwrap();
        let mut server = BufReader::new(stream);
        next_line(&mut server).await;
        next_line(&mut server).await;
        assert_eq!(next_line(&mut server).await, "LIST\r\n");
    }

    #[tokio::test]
    async fn test_overlapping_connects_leave_one_live_link() {
        let (listener, port) = listener().await;
        let (manager, mut events) = manager();

        let (first, second) = tokio::join!(
            manager.connect("127.0.0.1", port, "one"),
            manager.connect("127.0.0.1", port, "two"),
        );
        first.unwrap();
        second.unwrap();
        assert_eq!(manager.state(), ConnectionState::Connected);

        // Backlog order matches connect order: the first accepted socket is
        // the one that was replaced.
        let (mut replaced, _) = listener.accept().await.unwrap();
        let (survivor, _) = listener.accept().await.unwrap();

        let mut received = String::new();
        timeout(STEP, replaced.read_to_string(&mut received)).await.unwrap().unwrap();
        assert_eq!(received, "NICK one\r\nUSER one 0 * :one\r\nQUIT :Leaving\r\n");

        let (read_half, mut write_half) = survivor.into_split();
        let mut server = BufReader::new(read_half);
        let nick_line = next_line(&mut server).await;
        next_line(&mut server).await;
        write_half.write_all(b"PING :still-here\r\n").await.unwrap();
        assert_eq!(next_line(&mut server).await, "PONG :still-here\r\n");
        assert_eq!(manager.state(), ConnectionState::Connected);

        let mut connected = 0;
        let mut disconnected = 0;
        while let Ok(event) = events.try_recv() {
            match event {
                LinkEvent::State(ConnectionState::Connected) => connected += 1,
                LinkEvent::State(ConnectionState::Disconnected) => disconnected += 1,
                LinkEvent::Error(e) => panic!("unexpected error event: {}", e),
                _ => {}
            }
        }
        assert_eq!(connected, 2);
        assert_eq!(disconnected, 1);
        assert_eq!(nick_line, "NICK two\r\n");
    }
}
