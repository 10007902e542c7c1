//! The lifecycle of one TCP connection to the coordination server:
//! handshake, keepalive, timeout, and frame dispatch.

use crate::codec::frame::{Frame, HandshakeFrame, KeepAliveFrame};
use crate::codec::parser::Codec;
use crate::crypto::Block;
use crate::peer::PeerTable;
use crate::session::sink::SessionSink;
use bytes::BytesMut;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

/// How often the timeout task checks for inactivity.
const TIMEOUT_CHECK_INTERVAL: Duration = Duration::from_secs(5);
/// A session with no decoded frame and no successful write in this long is
/// presumed dead.
const SESSION_TIMEOUT: Duration = Duration::from_secs(30);
/// Initial read buffer capacity; grows as needed for larger `Data` frames.
const READ_BUF_CAPACITY: usize = 4096;

/// `{Initialize, Connecting, Connected, Reconnect}` plus a terminal `Closed`
/// state: "reject writes after close" (`send_data` returning `Closed`) is
/// then a plain state check instead of a side channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Initialize,
    Connecting,
    Connected,
    Reconnect,
    Closed,
}

/// Errors `ControlSession` operations can fail with.
#[derive(Debug)]
pub enum SessionError {
    ConnectFailed(String),
    HandshakeFailed(String),
    NotConnected,
    Closed,
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionError::ConnectFailed(e) => write!(f, "connect failed: {}", e),
            SessionError::HandshakeFailed(e) => write!(f, "handshake failed: {}", e),
            SessionError::NotConnected => "session is not connected".fmt(f),
            SessionError::Closed => "session is closed".fmt(f),
        }
    }
}

impl std::error::Error for SessionError {}

#[derive(Clone)]
pub struct ControlSessionConfig {
    pub server_addr: String,
    pub identity: String,
    pub keepalive_interval: Duration,
}

struct WriteRequest {
    frame: Frame,
    done: oneshot::Sender<crate::Result<()>>,
}

/// One TCP connection's lifecycle. Owned by a `ReconnectSupervisor`, or used
/// standalone for tests.
pub struct ControlSession {
    cfg: ControlSessionConfig,
    crypto: Arc<dyn Block>,
    peers: Arc<PeerTable>,
    sink: Arc<dyn SessionSink>,
    state: Mutex<SessionState>,
    writer_tx: Mutex<Option<mpsc::Sender<WriteRequest>>>,
    last_active_epoch_s: AtomicU64,
    closed_fired: AtomicBool,
    cancel: CancellationToken,
}

impl ControlSession {
    pub fn new(cfg: ControlSessionConfig, crypto: Arc<dyn Block>, peers: Arc<PeerTable>, sink: Arc<dyn SessionSink>) -> Arc<Self> {
        Arc::new(Self {
            cfg,
            crypto,
            peers,
            sink,
            state: Mutex::new(SessionState::Initialize),
            writer_tx: Mutex::new(None),
            last_active_epoch_s: AtomicU64::new(0),
            closed_fired: AtomicBool::new(false),
            cancel: CancellationToken::new(),
        })
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock().unwrap()
    }

    /// A token that becomes cancelled when this session closes, for callers
    /// that want to `await` the close rather than poll `state()`.
    pub fn closed_signal(&self) -> CancellationToken {
        self.cancel.clone()
    }

    fn set_state(&self, s: SessionState) {
        *self.state.lock().unwrap() = s;
    }

    fn touch_last_active(&self) {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        self.last_active_epoch_s.store(now, Ordering::Relaxed);
    }

    fn seconds_since_last_active(&self) -> u64 {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        now.saturating_sub(self.last_active_epoch_s.load(Ordering::Relaxed))
    }

    /// Connects, performs the handshake, and — on success — spawns the
    /// reader, keepalive, and timeout tasks and transitions to `Connected`.
    /// Any failure transitions to `Closed` and returns an error; this
    /// function's completion is the readiness signal callers await.
    pub async fn start(self: &Arc<Self>) -> crate::Result<()> {
        self.set_state(SessionState::Connecting);

        let mut stream = TcpStream::connect(&self.cfg.server_addr)
            .await
            .map_err(|e| SessionError::ConnectFailed(e.to_string()))?;

        let handshake = Frame::Handshake(HandshakeFrame {
            identity: self.cfg.identity.clone(),
        });
        let encoded = Codec::encode(handshake, self.crypto.as_ref())?;
        stream
            .write_all(&encoded)
            .await
            .map_err(|e| SessionError::HandshakeFailed(e.to_string()))?;

        let mut buf = BytesMut::with_capacity(READ_BUF_CAPACITY);
        let reply = loop {
            let n = stream
                .read_buf(&mut buf)
                .await
                .map_err(|e| SessionError::HandshakeFailed(e.to_string()))?;
            if n == 0 {
                return Err(SessionError::HandshakeFailed("connection closed before reply".into()).into());
            }
            match Codec::decode(&buf, self.crypto.as_ref()) {
                Ok((Frame::HandshakeReply(reply), consumed)) => {
                    let _ = buf.split_to(consumed);
                    break reply;
                }
                Ok((_, consumed)) => {
                    let _ = buf.split_to(consumed);
                }
                Err(e) => {
                    let retryable = matches!(
                        e.downcast_ref::<crate::codec::FrameError>(),
                        Some(crate::codec::FrameError::TooShort)
                    );
                    if !retryable {
                        return Err(SessionError::HandshakeFailed(e.to_string()).into());
                    }
                }
            }
        };

        self.touch_last_active();
        self.peers.rewrite(reply.peer_details.clone());
        self.sink.on_handshake_reply(&reply);

        let (writer_tx, writer_rx) = mpsc::channel(128);
        *self.writer_tx.lock().unwrap() = Some(writer_tx);

        let (read_half, write_half) = stream.into_split();
        self.spawn_writer(write_half, writer_rx);
        self.spawn_reader(read_half, buf);
        self.spawn_keepalive();
        self.spawn_timeout();

        self.set_state(SessionState::Connected);
        Ok(())
    }

    fn spawn_writer(
        self: &Arc<Self>,
        mut write_half: tokio::net::tcp::OwnedWriteHalf,
        mut rx: mpsc::Receiver<WriteRequest>,
    ) {
        let this = self.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = this.cancel.cancelled() => break,
                    req = rx.recv() => {
                        let Some(req) = req else { break };
                        let result = match Codec::encode(req.frame, this.crypto.as_ref()) {
                            Ok(bytes) => write_half
                                .write_all(&bytes)
                                .await
                                .map_err(|e| -> crate::Error { Box::new(e) }),
                            Err(e) => Err(e),
                        };
                        if result.is_ok() {
                            this.touch_last_active();
                        }
                        let _ = req.done.send(result);
                    }
                }
            }
        });
    }

    fn spawn_reader(self: &Arc<Self>, mut read_half: tokio::net::tcp::OwnedReadHalf, mut buf: BytesMut) {
        let this = self.clone();
        tokio::spawn(async move {
            loop {
                loop {
                    match Codec::decode(&buf, this.crypto.as_ref()) {
                        Ok((frame, consumed)) => {
                            this.touch_last_active();
                            let _ = buf.split_to(consumed);
                            this.handle_frame(frame);
                        }
                        Err(e) => {
                            let retryable = matches!(
                                e.downcast_ref::<crate::codec::FrameError>(),
                                Some(crate::codec::FrameError::TooShort)
                            );
                            if retryable {
                                break;
                            }
                            tracing::error!("control session fatal decode error: {}", e);
                            this.close().await;
                            return;
                        }
                    }
                }

                tokio::select! {
                    _ = this.cancel.cancelled() => return,
                    n = read_half.read_buf(&mut buf) => {
                        match n {
                            Ok(0) => {
                                tracing::info!("control session socket closed by peer");
                                this.close().await;
                                return;
                            }
                            Ok(_) => {}
                            Err(e) => {
                                tracing::error!("control session read error: {}", e);
                                this.close().await;
                                return;
                            }
                        }
                    }
                }
            }
        });
    }

    fn handle_frame(&self, frame: Frame) {
        match frame {
            Frame::Data(data) => self.sink.on_data_frame(&data),
            Frame::KeepAlive(ref keepalive) => {
                if !keepalive.peer_details.is_empty() {
                    self.peers.upsert(keepalive.peer_details.clone());
                }
                self.sink.on_keep_alive(keepalive);
            }
            Frame::HandshakeReply(ref reply) => {
                self.peers.rewrite(reply.peer_details.clone());
                self.sink.on_handshake_reply(reply);
            }
            Frame::Handshake(_) | Frame::ProbeIpv6(_) | Frame::ProbeHolePunch(_) => {
                tracing::debug!("control session ignoring unexpected frame kind");
            }
        }
    }

    fn spawn_keepalive(self: &Arc<Self>) {
        let this = self.clone();
        let interval = self.cfg.keepalive_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = this.cancel.cancelled() => return,
                    _ = ticker.tick() => {
                        let adv = this.peers.self_advertisement();
                        let frame = Frame::KeepAlive(KeepAliveFrame {
                            identity: this.cfg.identity.clone(),
                            ipv6: adv.ipv6,
                            port: adv.udp_port,
                            stun_ip: adv.stun_ip,
                            stun_port: adv.stun_port,
                            peer_details: vec![],
                        });
                        if let Err(e) = this.write_frame(frame).await {
                            tracing::warn!("keepalive send failed: {}", e);
                        }
                    }
                }
            }
        });
    }

    fn spawn_timeout(self: &Arc<Self>) {
        let this = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(TIMEOUT_CHECK_INTERVAL);
            loop {
                tokio::select! {
                    _ = this.cancel.cancelled() => return,
                    _ = ticker.tick() => {
                        if this.seconds_since_last_active() > SESSION_TIMEOUT.as_secs() {
                            tracing::warn!("control session timed out, closing");
                            this.close().await;
                            return;
                        }
                    }
                }
            }
        });
    }

    /// Wraps `packet` as a `Data` frame and writes it. Fails with
    /// `NotConnected` if the session is not `Connected`, or `Closed` if the
    /// session has been shut down.
    pub async fn send_data(&self, packet: Vec<u8>) -> crate::Result<()> {
        match self.state() {
            SessionState::Connected => {}
            SessionState::Closed => return Err(SessionError::Closed.into()),
            _ => return Err(SessionError::NotConnected.into()),
        }
        self.write_frame(Frame::Data(crate::codec::frame::DataFrame { payload: packet }))
            .await
    }

    async fn write_frame(&self, frame: Frame) -> crate::Result<()> {
        let tx = {
            let guard = self.writer_tx.lock().unwrap();
            guard.clone()
        };
        let Some(tx) = tx else {
            return Err(SessionError::Closed.into());
        };
        let (done_tx, done_rx) = oneshot::channel();
        if tx.send(WriteRequest { frame, done: done_tx }).await.is_err() {
            return Err(SessionError::Closed.into());
        }
        done_rx.await.map_err(|_| SessionError::Closed)?
    }

    /// Idempotent. Cancels all owned tasks and fires `on_closed` exactly once.
    pub async fn close(&self) {
        if self.state() == SessionState::Closed {
            return;
        }
        self.set_state(SessionState::Closed);
        self.cancel.cancel();
        *self.writer_tx.lock().unwrap() = None;
        if !self.closed_fired.swap(true, Ordering::SeqCst) {
            self.sink.on_closed();
        }
    }
}
