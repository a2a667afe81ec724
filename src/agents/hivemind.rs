//! One decision step controlling every car of the team.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{error, info, warn};

use super::session::{AgentContext, AgentRuntime, SessionInfo, Tick};
use crate::connection::Connection;
use crate::types::{
    BallPrediction, ControllerState, FieldInfo, GamePacket, MatchComm, MatchConfiguration,
    PlayerInput, PlayerLoadout, SetLoadout,
};

/// Decision logic for several cars at once.
#[async_trait]
pub trait Hivemind: Send + 'static {
    /// Loadouts per index, applied once during initialization.
    fn initial_loadouts(&self) -> BTreeMap<u32, Option<PlayerLoadout>> {
        BTreeMap::new()
    }

    /// Controls per index. Indices mapped to `None` get nothing sent.
    async fn get_outputs(
        &mut self,
        packet: &GamePacket,
        ball_prediction: Option<&BallPrediction>,
    ) -> anyhow::Result<BTreeMap<u32, Option<ControllerState>>>;

    async fn on_match_comm(&mut self, _comm: &MatchComm) -> anyhow::Result<()> {
        Ok(())
    }

    async fn on_retire(&mut self) {}
}

#[derive(Debug, Clone)]
pub struct HivemindContext {
    pub connection: Connection,
    pub indices: Vec<u32>,
    pub team: u32,
    pub names: HashMap<u32, String>,
    pub agent_id: String,
    pub match_config: Arc<MatchConfiguration>,
    pub field_info: Arc<FieldInfo>,
}

pub trait HivemindFactory: Send + 'static {
    fn create(&self, context: HivemindContext) -> anyhow::Result<Box<dyn Hivemind>>;
}

impl<F, H> HivemindFactory for F
where
    F: Fn(HivemindContext) -> anyhow::Result<H> + Send + 'static,
    H: Hivemind,
{
    fn create(&self, context: HivemindContext) -> anyhow::Result<Box<dyn Hivemind>> {
        Ok(Box::new(self(context)?))
    }
}

/// Runs a hivemind inline on the receive loop.
pub struct HivemindManager<F> {
    factory: F,
    hivemind: Option<Box<dyn Hivemind>>,
    connection: Option<Connection>,
    agent_id: String,
    team: u32,
}

impl<F: HivemindFactory> HivemindManager<F> {
    pub fn new(factory: F) -> Self {
        Self { factory, hivemind: None, connection: None, agent_id: String::new(), team: 0 }
    }
}

impl<F> std::fmt::Debug for HivemindManager<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HivemindManager")
            .field("agent_id", &self.agent_id)
            .field("team", &self.team)
            .field("initialized", &self.hivemind.is_some())
            .finish()
    }
}

#[async_trait]
impl<F: HivemindFactory> AgentRuntime for HivemindManager<F> {
    async fn initialize(
        &mut self,
        session: &SessionInfo,
        context: &AgentContext,
    ) -> anyhow::Result<()> {
        let team = session.team_info.team;
        let indices: Vec<u32> = session.team_info.indices().collect();

        let mut names = HashMap::with_capacity(indices.len());
        for &index in &indices {
            let name = session
                .match_config
                .bot_name(index)
                .ok_or_else(|| anyhow::anyhow!("player {} is not a custom bot", index))?;
            names.insert(index, name.to_owned());
        }

        let hivemind = self.factory.create(HivemindContext {
            connection: context.connection.clone(),
            indices: indices.clone(),
            team,
            names,
            agent_id: context.agent_id.clone(),
            match_config: session.match_config.clone(),
            field_info: session.field_info.clone(),
        })?;

        for (index, loadout) in hivemind.initial_loadouts() {
            if let Some(loadout) = loadout {
                context.connection.send_set_loadout(SetLoadout { index, loadout }).await?;
            }
        }

        info!(agent_id = %context.agent_id, team, ?indices, "Started hivemind");
        self.hivemind = Some(hivemind);
        self.connection = Some(context.connection.clone());
        self.agent_id = context.agent_id.clone();
        self.team = team;
        Ok(())
    }

    async fn process_tick(&mut self, tick: Tick) {
        let (Some(hivemind), Some(connection)) = (self.hivemind.as_mut(), self.connection.as_ref())
        else {
            return;
        };

        let outputs = match hivemind.get_outputs(&tick.packet, tick.ball_prediction()).await {
            Ok(outputs) => outputs,
            Err(e) => {
                error!(
                    agent_id = %self.agent_id,
                    team = self.team,
                    error = ?e,
                    "Hivemind encountered an error while processing game packet"
                );
                return;
            }
        };

        for (player_index, controller_state) in outputs {
            let Some(controller_state) = controller_state else {
                continue;
            };
            let input = PlayerInput { player_index, controller_state };
            if let Err(e) = connection.send_player_input(input).await {
                warn!(
                    agent_id = %self.agent_id,
                    player_index,
                    error = %e,
                    "Failed to send player input"
                );
            }
        }
    }

    async fn on_match_comm(&mut self, comm: &MatchComm) {
        let Some(hivemind) = self.hivemind.as_mut() else {
            return;
        };
        if let Err(e) = hivemind.on_match_comm(comm).await {
            error!(
                agent_id = %self.agent_id,
                team = self.team,
                error = ?e,
                "Hivemind encountered an error while processing match comms"
            );
        }
    }

    async fn retire(&mut self) {
        if let Some(hivemind) = self.hivemind.as_mut() {
            hivemind.on_retire().await;
        }
    }
}
