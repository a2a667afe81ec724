//! Agent runtimes.
//!
//! An [`AgentRunner`] connects to the host, waits for the match
//! configuration, field info and controllable team info, initializes its
//! runtime once all three have arrived and then feeds it the latest game
//! packet. Three runtimes are provided:
//!
//! - [`BotManager`]: one [`Bot`] per controlled car, each on its own task
//! - [`HivemindManager`]: one [`Hivemind`] deciding for every controlled car
//! - [`ScriptManager`]: one car-less [`Script`]
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use kickoff::agents::{AgentRunner, Bot, BotContext, BotManager};
//! use kickoff::types::{BallPrediction, ControllerState, GamePacket};
//! use kickoff::ClientConfig;
//!
//! struct FullThrottle;
//!
//! #[async_trait]
//! impl Bot for FullThrottle {
//!     async fn get_output(
//!         &mut self,
//!         _packet: &GamePacket,
//!         _ball_prediction: Option<&BallPrediction>,
//!     ) -> anyhow::Result<Option<ControllerState>> {
//!         Ok(Some(ControllerState { throttle: 1.0, ..Default::default() }))
//!     }
//! }
//!
//! # async fn example() -> anyhow::Result<()> {
//! let factory = |_ctx: BotContext| -> anyhow::Result<FullThrottle> { Ok(FullThrottle) };
//! let runner = AgentRunner::new(ClientConfig::from_env()?, BotManager::new(factory))?;
//! runner.run(false, false).await?;
//! # Ok(())
//! # }
//! ```

mod bot;
mod hivemind;
mod mailbox;
mod runner;
mod script;
mod session;

pub use bot::{Bot, BotContext, BotFactory, BotManager};
pub use hivemind::{Hivemind, HivemindContext, HivemindFactory, HivemindManager};
pub use mailbox::{MailboxReceiver, MailboxSender, mailbox};
pub use runner::AgentRunner;
pub use script::{Script, ScriptContext, ScriptFactory, ScriptManager};
pub use session::{AgentContext, AgentRuntime, SessionInfo, Tick};
