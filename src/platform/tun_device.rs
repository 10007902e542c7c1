//! The abstract virtual-interface boundary and its concrete OS-backed
//! implementation: one task owns the `tun::AsyncDevice` outright and
//! multiplexes reads, writes, and address changes over channels, so no
//! lock is ever held across an I/O suspension.

use crate::route::NetworkSettings;
use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot, Mutex};
use tun::AbstractDevice;

const READ_BUFFER_SIZE: usize = 2048;
const CHANNEL_CAPACITY: usize = 256;

/// The boundary the core depends on instead of a concrete TUN/TAP binding.
/// `read_packet`/`write_packet` may be called concurrently from different
/// tasks; implementations must serialize access to the underlying device
/// themselves.
#[async_trait]
pub trait TunDevice: Send + Sync {
    async fn read_packet(&self) -> crate::Result<Vec<u8>>;
    async fn write_packet(&self, packet: &[u8]) -> crate::Result<()>;
    async fn apply_network_settings(&self, settings: &NetworkSettings) -> crate::Result<()>;
}

/// Initial interface parameters, known before the first `HandshakeReply`.
#[derive(Clone)]
pub struct TunConfig {
    pub mtu: u16,
}

/// Sent to the device task to set the interface address/netmask; everything
/// else in `apply_network_settings` (the OS route table) doesn't touch the
/// device and runs outside this channel.
struct SetAddress {
    local_ip: String,
    mask: String,
    done: oneshot::Sender<crate::Result<()>>,
}

/// Owns the `tun::AsyncDevice` for the lifetime of the interface. Runs as a
/// single background task `select!`ing between a device read, an outbound
/// packet off `write_rx`, and an address change off `command_rx` — never
/// more than one of the three touches the device at a time, and none of
/// them blocks the others' channels.
struct DeviceTask {
    dev: tun::AsyncDevice,
    inbound_tx: mpsc::Sender<Vec<u8>>,
    write_rx: mpsc::Receiver<Vec<u8>>,
    command_rx: mpsc::Receiver<SetAddress>,
}

impl DeviceTask {
    async fn run(mut self) {
        let mut buf = vec![0u8; READ_BUFFER_SIZE];
        loop {
            tokio::select! {
                n = self.dev.read(&mut buf) => {
                    match n {
                        Ok(n) => {
                            if self.inbound_tx.send(buf[..n].to_vec()).await.is_err() {
                                return;
                            }
                        }
                        Err(e) => tracing::error!("tun device read error: {}", e),
                    }
                }
                packet = self.write_rx.recv() => {
                    match packet {
                        Some(packet) => {
                            if let Err(e) = self.dev.write_all(&packet).await {
                                tracing::warn!("tun device write error: {}", e);
                            }
                        }
                        None => return,
                    }
                }
                cmd = self.command_rx.recv() => {
                    match cmd {
                        Some(SetAddress { local_ip, mask, done }) => {
                            let result = self.apply_address(&local_ip, &mask);
                            let _ = done.send(result);
                        }
                        None => return,
                    }
                }
            }
        }
    }

    fn apply_address(&mut self, local_ip: &str, mask: &str) -> crate::Result<()> {
        self.dev.set_address(local_ip.parse()?)?;
        self.dev.set_netmask(mask.parse()?)?;
        Ok(())
    }
}

/// Adapter over the `tun` crate's async device. Holds no lock around the
/// device itself — `DeviceTask` owns it — only a `Mutex` around the inbound
/// receiver, which serializes nothing but repeated calls to `read_packet`
/// from its single caller (the tun-reader loop).
pub struct SystemTunDevice {
    inbound_rx: Mutex<mpsc::Receiver<Vec<u8>>>,
    write_tx: mpsc::Sender<Vec<u8>>,
    command_tx: mpsc::Sender<SetAddress>,
    sys_route: super::sys_route::SysRoute,
    interface_index: Option<i32>,
}

impl SystemTunDevice {
    /// Creates and brings up the interface with no address assigned yet,
    /// and spawns the task that owns it; the first `apply_network_settings`
    /// call assigns an address.
    pub fn create(cfg: TunConfig) -> crate::Result<Self> {
        let mut config = tun::Configuration::default();
        config.mtu(cfg.mtu).up();

        #[cfg(target_os = "linux")]
        config.platform_config(|platform| {
            platform.ensure_root_privileges(true);
        });

        let dev = tun::create_as_async(&config).map_err(|e| -> crate::Error { Box::new(e) })?;

        #[cfg(target_os = "windows")]
        let interface_index = dev.tun_index().ok();
        #[cfg(not(target_os = "windows"))]
        let interface_index: Option<i32> = None;

        let (inbound_tx, inbound_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (write_tx, write_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (command_tx, command_rx) = mpsc::channel(CHANNEL_CAPACITY);

        let task = DeviceTask {
            dev,
            inbound_tx,
            write_rx,
            command_rx,
        };
        tokio::spawn(task.run());

        Ok(Self {
            inbound_rx: Mutex::new(inbound_rx),
            write_tx,
            command_tx,
            sys_route: super::sys_route::SysRoute::new(),
            interface_index,
        })
    }
}

#[async_trait]
impl TunDevice for SystemTunDevice {
    async fn read_packet(&self) -> crate::Result<Vec<u8>> {
        let mut rx = self.inbound_rx.lock().await;
        rx.recv().await.ok_or_else(|| "tun device task exited".into())
    }

    async fn write_packet(&self, packet: &[u8]) -> crate::Result<()> {
        self.write_tx
            .send(packet.to_vec())
            .await
            .map_err(|_| "tun device task exited".into())
    }

    async fn apply_network_settings(&self, settings: &NetworkSettings) -> crate::Result<()> {
        let (done_tx, done_rx) = oneshot::channel();
        self.command_tx
            .send(SetAddress {
                local_ip: settings.local_ip.clone(),
                mask: settings.mask.clone(),
                done: done_tx,
            })
            .await
            .map_err(|_| "tun device task exited")?;
        done_rx.await.map_err(|_| "tun device task exited")??;

        let cidrs: Vec<String> = settings.cidrs.iter().cloned().collect();
        self.sys_route.add(&cidrs, &settings.gateway, self.interface_index)?;
        Ok(())
    }
}
