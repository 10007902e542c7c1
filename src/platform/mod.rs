//! Host integration the core depends on through narrow interfaces instead of
//! owning directly: the virtual network interface and the OS route table.

pub mod http_probe;
pub mod sys_route;
pub mod tun_device;

pub use http_probe::HttpIpv6Probe;
pub use sys_route::SysRoute;
pub use tun_device::{SystemTunDevice, TunConfig, TunDevice};
