//! Drives an agent runtime from a host connection.

use std::sync::Arc;
use tracing::{error, info};

use super::session::{AgentContext, AgentRuntime, AgentSession};
use crate::config::ClientConfig;
use crate::connection::{Connection, ReceiveOutcome};
use crate::listener::Listener;
use crate::Result;

/// Connects an [`AgentRuntime`] to the host and runs it until the session
/// ends.
///
/// The loop prefers draining queued messages over processing stale ticks:
/// it blocks for input only while no tick is ready, and hands the latest
/// packet to the runtime once the socket has nothing more to read.
pub struct AgentRunner<R: AgentRuntime> {
    connection: Connection,
    session: Arc<AgentSession<R>>,
    agent_id: String,
    outlive_matches: bool,
}

impl<R: AgentRuntime> AgentRunner<R> {
    /// Create a runner. Fails if the configuration has no agent id.
    pub fn new(config: ClientConfig, runtime: R) -> Result<Self> {
        let agent_id = config.require_agent_id()?.to_owned();
        let connection = Connection::new(config);
        let context = AgentContext { connection: connection.clone(), agent_id: agent_id.clone() };
        let session = Arc::new(AgentSession::new(runtime, context));
        connection.subscribe(session.clone() as Arc<dyn Listener>);
        Ok(Self { connection, session, agent_id, outlive_matches: false })
    }

    /// Keep the connection open when a match ends. By default the host
    /// closes agent connections between matches.
    pub fn outlive_matches(mut self, outlive: bool) -> Self {
        self.outlive_matches = outlive;
        self
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    /// Whether the runtime has been initialized for the current session.
    pub async fn is_initialized(&self) -> bool {
        self.session.is_initialized().await
    }

    /// Connect, run the session and retire the runtime.
    ///
    /// The runtime is retired however the loop ends. Returns the error that
    /// ended the loop, if any.
    pub async fn run(&self, wants_ball_prediction: bool, wants_comms: bool) -> Result<()> {
        self.connection
            .connect(&self.agent_id, wants_ball_prediction, wants_comms, self.outlive_matches)
            .await?;

        let result = self.run_loop().await;
        if let Err(e) = &result {
            error!(agent_id = %self.agent_id, error = %e, "Agent session ended with an error");
        } else {
            info!(agent_id = %self.agent_id, "Agent session ended");
        }

        self.session.retire().await;
        result
    }

    async fn run_loop(&self) -> Result<()> {
        let _guard = self.connection.begin_running()?;
        loop {
            let blocking = !self.session.has_ready_tick().await;
            match self.connection.receive_next(blocking).await? {
                ReceiveOutcome::Terminated => return Ok(()),
                ReceiveOutcome::MoreAvailable => continue,
                ReceiveOutcome::NoMessage => self.session.process_latest().await,
            }
        }
    }
}

impl<R: AgentRuntime> std::fmt::Debug for AgentRunner<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentRunner")
            .field("agent_id", &self.agent_id)
            .field("outlive_matches", &self.outlive_matches)
            .field("connection", &self.connection)
            .finish()
    }
}
