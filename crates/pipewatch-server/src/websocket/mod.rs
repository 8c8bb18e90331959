//! `WebSocket` gateway.
//!
//! Each upgraded socket becomes one hub connection backed by a
//! [`pipewatch_hub::ChannelTransport`]: a writer task drains the channel into
//! the socket while the session loop reads client frames.

pub mod session;

pub use session::{PING, PONG, run_ws_session};
