//! The connection engine: socket lifecycle, I/O loop, and public API.
//!
//! One engine instance owns at most one live connection. The I/O loop
//! runs on a spawned task; everything the consumer calls (connect,
//! disconnect, sends) may come from any other task. Shared mutable
//! state is limited to the outgoing queue, the current nick, the
//! lifecycle flags, and the reconnect bookkeeping — session state never
//! leaves the I/O task except as [`Event`]s.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::net::{lookup_host, TcpStream};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio_util::codec::Framed;
use tracing::{debug, warn};

use crate::command::{self, Action};
use crate::error::EngineError;
use crate::event::Event;
use crate::line::LineCodec;
use crate::message::ParsedLine;
use crate::reconnect::{backoff_delay, ReconnectPolicy, ReconnectState};
use crate::session::SessionState;

/// How long the I/O loop waits for readability before re-checking the
/// stop flag and the outgoing queue.
const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Realname sent in the USER registration line.
const DEFAULT_REALNAME: &str = "ircflow user";

/// Connection lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Phase {
    /// No connection and no task running.
    Idle = 0,
    /// Resolving and connecting.
    Connecting = 1,
    /// Socket up, registration sent.
    Registered = 2,
    /// Teardown requested, waiting for the I/O loop to exit.
    Closing = 3,
}

impl Phase {
    fn from_u8(value: u8) -> Phase {
        match value {
            1 => Phase::Connecting,
            2 => Phase::Registered,
            3 => Phase::Closing,
            _ => Phase::Idle,
        }
    }
}

/// Where to connect; retained for reconnects. The nick is not stored
/// here: the current-nick field already tracks the last-known value,
/// renames included.
#[derive(Debug, Clone)]
struct Target {
    host: String,
    port: u16,
    password: Option<String>,
}

struct Inner {
    events: UnboundedSender<Event>,
    /// Outgoing wire lines; drained as one batch per loop iteration.
    out_queue: Mutex<Vec<String>>,
    /// Current nickname; read by senders, written on self-rename.
    nick: Mutex<String>,
    /// Teardown requested. Observed after the drain phase so a
    /// just-queued QUIT still goes out.
    stop: AtomicBool,
    /// Socket live (from successful connect until loop exit).
    connected: AtomicBool,
    phase: AtomicU8,
    /// Last-known connect target, for the reconnect timer.
    target: Mutex<Option<Target>>,
    policy: ReconnectPolicy,
    reconnect: Mutex<ReconnectState>,
    io_task: Mutex<Option<JoinHandle<()>>>,
}

/// An IRC client engine bound to a single server connection.
///
/// Created with [`IrcEngine::new`], which also hands back the event
/// receiver. Events arrive in protocol order; the sending side never
/// blocks on the consumer.
pub struct IrcEngine {
    inner: Arc<Inner>,
}

impl IrcEngine {
    /// Create an engine and the receiving end of its event stream.
    pub fn new(policy: ReconnectPolicy) -> (IrcEngine, UnboundedReceiver<Event>) {
        let (events, rx) = mpsc::unbounded_channel();
        let inner = Arc::new(Inner {
            events,
            out_queue: Mutex::new(Vec::new()),
            nick: Mutex::new(String::new()),
            stop: AtomicBool::new(false),
            connected: AtomicBool::new(false),
            phase: AtomicU8::new(Phase::Idle as u8),
            target: Mutex::new(None),
            policy,
            reconnect: Mutex::new(ReconnectState::default()),
            io_task: Mutex::new(None),
        });
        (IrcEngine { inner }, rx)
    }

    /// Connect to a server, tearing down any previous connection first.
    ///
    /// Safe to call while connected: the previous I/O loop is stopped
    /// and awaited before the new one starts, so two loops never race
    /// on the same state. Failures surface through the event stream as
    /// a log line plus `Disconnected`, and feed the reconnect policy.
    pub async fn connect(&self, host: &str, port: u16, nick: &str, password: Option<&str>) {
        {
            // A fresh connect request resets the backoff series and
            // cancels any timer armed for the previous connection.
            let mut rc = self.inner.reconnect.lock();
            rc.cancel_timer();
            rc.attempts = 0;
            rc.user_initiated = false;
        }
        self.shutdown_io().await;

        *self.inner.nick.lock() = nick.to_string();
        let target = Target {
            host: host.to_string(),
            port,
            password: password.map(str::to_string),
        };
        *self.inner.target.lock() = Some(target.clone());
        Inner::spawn_io(&self.inner, target);
    }

    /// Disconnect and wait for the I/O loop to exit.
    ///
    /// Cancels any armed reconnect timer and suppresses automatic
    /// reconnection until the next [`connect`](Self::connect). When
    /// this returns, no further events will arrive.
    pub async fn disconnect(&self) {
        {
            let mut rc = self.inner.reconnect.lock();
            rc.user_initiated = true;
            rc.cancel_timer();
        }
        let was_active = self.shutdown_io().await;
        if was_active {
            self.inner.log("Disconnected.");
        }
    }

    /// Whether a socket is currently live.
    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> Phase {
        Phase::from_u8(self.inner.phase.load(Ordering::SeqCst))
    }

    /// The nickname currently in effect (tracks server-side renames).
    pub fn current_nick(&self) -> String {
        self.inner.nick.lock().clone()
    }

    /// Queue a protocol line for transmission; the codec appends CRLF.
    pub fn send_raw(&self, line: &str) {
        self.inner.enqueue(line.to_string());
    }

    /// Ask the server for WHOIS information; the completed aggregate
    /// arrives as [`Event::Whois`].
    pub fn request_whois(&self, nick: &str) {
        self.send_raw(&format!("WHOIS {}", nick));
    }

    /// Handle one line of user input: slash commands per the command
    /// table, anything else sent verbatim.
    pub async fn handle_user_input(&self, input: &str) {
        match command::dispatch(input) {
            None => {}
            Some(Action::Send(line)) => self.send_raw(&line),
            Some(Action::SendWithEcho { line, target, text }) => {
                self.send_raw(&line);
                let nick = self.current_nick();
                let _ = self.inner.events.send(Event::Echo { target, nick, text });
            }
            Some(Action::Quit { line }) => {
                self.send_raw(&line);
                self.inner.log("Sent QUIT; disconnecting.");
                self.disconnect().await;
            }
            Some(Action::Usage(hint)) => {
                self.inner.log(&format!("[Client] Usage: {}", hint));
            }
        }
    }

    /// Signal the loop to stop and wait for it. Returns whether a live
    /// loop was actually stopped.
    async fn shutdown_io(&self) -> bool {
        self.inner.stop.store(true, Ordering::SeqCst);
        let handle = self.inner.io_task.lock().take();
        let mut was_active = false;
        if let Some(handle) = handle {
            if !handle.is_finished() {
                was_active = true;
                self.inner.phase.store(Phase::Closing as u8, Ordering::SeqCst);
            }
            let _ = handle.await;
        }
        self.inner.stop.store(false, Ordering::SeqCst);
        was_active
    }
}

impl Inner {
    fn log(&self, message: &str) {
        let _ = self.events.send(Event::Log(message.to_string()));
    }

    fn enqueue(&self, line: String) {
        self.out_queue.lock().push(line);
    }

    fn spawn_io(inner: &Arc<Inner>, target: Target) {
        inner.stop.store(false, Ordering::SeqCst);
        inner.phase.store(Phase::Connecting as u8, Ordering::SeqCst);
        let this = Arc::clone(inner);
        let handle = tokio::spawn(async move {
            this.run_connection(target).await;
        });
        *inner.io_task.lock() = Some(handle);
    }

    /// One connection from resolve to teardown. Every error is caught
    /// here; the task never unwinds.
    async fn run_connection(self: Arc<Self>, target: Target) {
        self.log(&format!("Connecting to {}:{}...", target.host, target.port));
        if let Err(e) = self.drive(&target).await {
            self.log(&e.to_string());
        }
        self.connected.store(false, Ordering::SeqCst);
        self.phase.store(Phase::Idle as u8, Ordering::SeqCst);
        let _ = self.events.send(Event::Disconnected);
        Inner::maybe_schedule_reconnect(&self, target);
    }

    async fn drive(&self, target: &Target) -> Result<(), EngineError> {
        let stream = self.establish(target).await?;
        self.log(&format!("Connected to {}:{}", target.host, target.port));
        if let Err(e) = enable_keepalive(&stream) {
            warn!("failed to enable TCP keepalive: {}", e);
        }
        self.connected.store(true, Ordering::SeqCst);
        self.phase.store(Phase::Registered as u8, Ordering::SeqCst);

        {
            let nick = self.nick.lock().clone();
            if !nick.is_empty() {
                if let Some(password) = &target.password {
                    self.enqueue(format!("PASS {}", password));
                }
                self.enqueue(format!("NICK {}", nick));
                self.enqueue(format!("USER {} 0 * :{}", nick, DEFAULT_REALNAME));
            }
        }

        let mut framed = Framed::new(stream, LineCodec::new());
        let mut session = SessionState::default();
        self.io_loop(&mut framed, &mut session).await
    }

    /// Resolve the host and try each candidate address in order.
    async fn establish(&self, target: &Target) -> Result<TcpStream, EngineError> {
        let resolve_err = || EngineError::Resolve {
            host: target.host.clone(),
            port: target.port,
        };
        let addrs: Vec<SocketAddr> = lookup_host((target.host.as_str(), target.port))
            .await
            .map_err(|e| {
                debug!(host = %target.host, "resolve failed: {}", e);
                resolve_err()
            })?
            .collect();
        if addrs.is_empty() {
            return Err(resolve_err());
        }

        for addr in addrs {
            match TcpStream::connect(addr).await {
                Ok(stream) => return Ok(stream),
                Err(e) => debug!(%addr, "connect failed: {}", e),
            }
        }
        Err(EngineError::Connect {
            host: target.host.clone(),
            port: target.port,
        })
    }

    async fn io_loop(
        &self,
        framed: &mut Framed<TcpStream, LineCodec>,
        session: &mut SessionState,
    ) -> Result<(), EngineError> {
        loop {
            // Writes happen only here, as one batch per iteration.
            let batch = std::mem::take(&mut *self.out_queue.lock());
            for line in batch {
                debug!(line = %line, "send");
                framed.send(line).await?;
            }

            // Checked after the drain so a queued QUIT still goes out.
            if self.stop.load(Ordering::SeqCst) {
                return Ok(());
            }

            let read = tokio::time::timeout(POLL_INTERVAL, framed.next()).await;
            match read {
                // Idle poll; loop around to re-check flag and queue.
                Err(_elapsed) => continue,
                Ok(None) => {
                    self.log("Server closed connection.");
                    return Ok(());
                }
                Ok(Some(Err(e))) => return Err(EngineError::Io(e)),
                Ok(Some(Ok(line))) => self.handle_line(framed, session, line).await?,
            }
        }
    }

    async fn handle_line(
        &self,
        framed: &mut Framed<TcpStream, LineCodec>,
        session: &mut SessionState,
        line: String,
    ) -> Result<(), EngineError> {
        let msg = match ParsedLine::parse(&line) {
            Ok(msg) => msg,
            Err(e) => {
                warn!(line = %line, "dropping malformed line: {}", e);
                return Ok(());
            }
        };

        // Keepalive is answered inline and never surfaced as an event.
        if msg.command == "PING" {
            let payload = msg.trailing.or_else(|| msg.param(0)).unwrap_or("");
            framed.send(format!("PONG :{}", payload)).await?;
            debug!(payload = %payload, "answered PING");
            return Ok(());
        }

        let _ = self.events.send(Event::RawLine(line.clone()));

        let current_nick = self.nick.lock().clone();
        if let Some(event) = session.apply(&msg, &current_nick) {
            match &event {
                Event::NickChange { new, is_self: true, .. } => {
                    *self.nick.lock() = new.clone();
                }
                Event::Welcome { registered: true, .. } => {
                    // Successful registration ends the backoff series.
                    self.reconnect.lock().attempts = 0;
                }
                _ => {}
            }
            let _ = self.events.send(event);
        }
        Ok(())
    }

    /// Arm the reconnect timer after an unexpected disconnect.
    fn maybe_schedule_reconnect(inner: &Arc<Inner>, target: Target) {
        // A raised stop flag means deliberate teardown (disconnect, or
        // a fresh connect replacing this loop).
        if inner.stop.load(Ordering::SeqCst) {
            return;
        }

        let mut rc = inner.reconnect.lock();
        if rc.user_initiated {
            return;
        }
        if !inner.policy.attempt_allowed(rc.attempts) {
            if inner.policy.enabled {
                inner.log("Reconnect: maximum attempts reached; giving up.");
            } else {
                debug!("auto-reconnect disabled");
            }
            return;
        }

        let delay = backoff_delay(rc.attempts);
        rc.attempts += 1;
        let attempt = rc.attempts;
        let armed_epoch = rc.epoch;
        inner.log(&format!(
            "Reconnecting in {}s (attempt {})...",
            delay.as_secs(),
            attempt
        ));

        let this = Arc::clone(inner);
        rc.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            {
                // A disconnect or fresh connect in the meantime bumps
                // the epoch; a stale timer must not fire.
                let mut rc = this.reconnect.lock();
                if rc.user_initiated || rc.epoch != armed_epoch {
                    return;
                }
                rc.timer = None;
            }
            Inner::spawn_io(&this, target);
        }));
    }
}

fn enable_keepalive(stream: &TcpStream) -> std::io::Result<()> {
    use socket2::{SockRef, TcpKeepalive};

    let sock = SockRef::from(stream);
    let keepalive = TcpKeepalive::new()
        .with_time(Duration::from_secs(120))
        .with_interval(Duration::from_secs(30));
    sock.set_tcp_keepalive(&keepalive)
}
