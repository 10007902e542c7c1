//! The TCP control channel: one session's lifecycle plus the supervisor that
//! keeps a logical connection alive across reconnects.

pub mod control;
pub mod sink;
pub mod supervisor;

pub use control::{ControlSession, ControlSessionConfig, SessionError, SessionState};
pub use sink::SessionSink;
pub use supervisor::ReconnectSupervisor;
