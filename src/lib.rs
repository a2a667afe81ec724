//! Async client engine connecting bot agents to a simulation host.
//!
//! Kickoff speaks the host's length-prefixed binary protocol over a local TCP
//! socket and turns it into typed messages, listener callbacks and agent
//! runtimes.
//!
//! # Features
//!
//! - **Framed protocol**: typed envelopes and a `tokio-util` codec
//! - **Connection**: connect with retry, handshake, broadcast to listeners,
//!   orderly disconnect
//! - **Agents**: bots with one worker per car, hiveminds and scripts,
//!   initialized once the session is known
//! - **Latest wins**: slow agents always act on the newest packet
//!
//! # Quick Start
//!
//! Agents read `RLBOT_AGENT_ID` and `RLBOT_SERVER_PORT` from the
//! environment; see [`ClientConfig`].
//!
//! ## Example (match host)
//!
//! ```rust,no_run
//! use kickoff::{ClientConfig, Connection};
//! use kickoff::types::GamePacket;
//! use std::sync::Arc;
//!
//! struct Scoreboard;
//!
//! #[async_trait::async_trait]
//! impl kickoff::Listener for Scoreboard {
//!     async fn on_game_packet(&self, packet: &Arc<GamePacket>) -> anyhow::Result<()> {
//!         println!("frame {}", packet.frame_num());
//!         Ok(())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let connection = Connection::new(ClientConfig::from_env()?);
//!     connection.subscribe(Arc::new(Scoreboard));
//!     connection.connect_as_match_host(false, false).await?;
//!     connection.start_match_from_path("match.toml").await?;
//!     connection.run().await?;
//!     Ok(())
//! }
//! ```

// Core types and error handling
pub mod config;
mod error;
#[cfg_attr(any(test, feature = "benchmark"), path = "test_utils.rs")]
#[cfg(any(test, feature = "benchmark"))]
pub mod test_utils;
pub mod types;

// Wire protocol and connection
pub mod connection;
pub mod listener;
pub mod protocol;

// Agent runtimes
pub mod agents;

// Core exports
pub use config::{ClientConfig, ConfigOverrides};
pub use error::*;

// Connection exports
pub use connection::{Connection, ConnectionState, ReceiveOutcome};
pub use listener::Listener;
pub use protocol::{Envelope, FrameCodec, MessageKind};

// Agent exports
pub use agents::{
    AgentRunner, AgentRuntime, Bot, BotManager, Hivemind, HivemindManager, Script, ScriptManager,
};
