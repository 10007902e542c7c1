//! Owns at most one `ControlSession` at a time and reconnects it on failure,
//! expressed as an explicit supervisor rather than a retrying closure.

use crate::crypto::Block;
use crate::peer::PeerTable;
use crate::session::control::{ControlSession, ControlSessionConfig};
use crate::session::sink::SessionSink;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Delay between a session closing and the next connect attempt.
const RECONNECT_BACKOFF: Duration = Duration::from_secs(3);

/// Drives one logical connection to the server across any number of
/// underlying `ControlSession`s, reconnecting after every failure until
/// told to stop.
pub struct ReconnectSupervisor {
    cfg: ControlSessionConfig,
    crypto: Arc<dyn Block>,
    peers: Arc<PeerTable>,
    sink: Arc<dyn SessionSink>,
    current: Mutex<Option<Arc<ControlSession>>>,
    reconnecting: AtomicBool,
    stopped: CancellationToken,
}

impl ReconnectSupervisor {
    pub fn new(
        cfg: ControlSessionConfig,
        crypto: Arc<dyn Block>,
        peers: Arc<PeerTable>,
        sink: Arc<dyn SessionSink>,
    ) -> Arc<Self> {
        Arc::new(Self {
            cfg,
            crypto,
            peers,
            sink,
            current: Mutex::new(None),
            reconnecting: AtomicBool::new(false),
            stopped: CancellationToken::new(),
        })
    }

    /// Connects the first session and spawns the background task that
    /// reconnects on every subsequent failure. Returns once the first
    /// connection attempt succeeds or permanently fails.
    pub async fn run(self: &Arc<Self>) -> crate::Result<()> {
        self.connect_once().await?;

        let this = self.clone();
        tokio::spawn(async move {
            this.reconnect_loop().await;
        });
        Ok(())
    }

    async fn connect_once(self: &Arc<Self>) -> crate::Result<()> {
        let session = ControlSession::new(
            self.cfg.clone(),
            self.crypto.clone(),
            self.peers.clone(),
            self.sink.clone(),
        );
        session.start().await?;
        *self.current.lock().unwrap() = Some(session);
        Ok(())
    }

    async fn reconnect_loop(self: &Arc<Self>) {
        loop {
            tokio::select! {
                _ = self.stopped.cancelled() => return,
                _ = self.wait_for_current_close() => {}
            }
            if self.stopped.is_cancelled() {
                return;
            }

            // Guards against two close notifications racing into two
            // concurrent reconnect attempts for the same logical connection.
            if self.reconnecting.swap(true, Ordering::SeqCst) {
                continue;
            }

            tokio::time::sleep(RECONNECT_BACKOFF).await;
            loop {
                if self.stopped.is_cancelled() {
                    self.reconnecting.store(false, Ordering::SeqCst);
                    return;
                }
                match self.connect_once().await {
                    Ok(()) => break,
                    Err(e) => {
                        tracing::warn!("reconnect attempt failed: {}", e);
                        tokio::time::sleep(RECONNECT_BACKOFF).await;
                    }
                }
            }
            self.reconnecting.store(false, Ordering::SeqCst);
        }
    }

    async fn wait_for_current_close(&self) {
        let session = self.current.lock().unwrap().clone();
        match session {
            Some(session) => session.closed_signal().cancelled().await,
            None => tokio::time::sleep(Duration::from_millis(500)).await,
        }
    }

    /// Sends an outbound IP packet over the currently active session, if any.
    pub async fn send_data(&self, packet: Vec<u8>) -> crate::Result<()> {
        let session = self.current.lock().unwrap().clone();
        match session {
            Some(session) => session.send_data(packet).await,
            None => Err(crate::session::control::SessionError::NotConnected.into()),
        }
    }

    /// Stops the reconnect loop and closes the active session.
    pub async fn shutdown(&self) {
        self.stopped.cancel();
        let session = self.current.lock().unwrap().clone();
        if let Some(session) = session {
            session.close().await;
        }
    }
}
