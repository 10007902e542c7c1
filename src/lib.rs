pub mod client;
pub mod codec;
pub mod config;
pub mod crypto;
pub mod discovery;
pub mod dispatch;
pub mod p2p;
pub mod peer;
pub mod platform;
pub mod route;
pub mod session;
pub mod stats;

pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Result<T> = std::result::Result<T, Error>;

