//! Session bootstrap: collects the session-defining messages, gates agent
//! initialization on all three, and holds the latest tick.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use crate::connection::Connection;
use crate::listener::Listener;
use crate::types::{
    BallPrediction, ControllableTeamInfo, FieldInfo, GamePacket, MatchComm, MatchConfiguration,
};

/// The three messages that define a session.
#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub match_config: Arc<MatchConfiguration>,
    pub field_info: Arc<FieldInfo>,
    pub team_info: Arc<ControllableTeamInfo>,
}

/// Most recent simulation state handed to an agent.
#[derive(Debug, Clone)]
pub struct Tick {
    pub packet: Arc<GamePacket>,
    pub ball_prediction: Option<Arc<BallPrediction>>,
}

impl Tick {
    pub fn ball_prediction(&self) -> Option<&BallPrediction> {
        self.ball_prediction.as_deref()
    }
}

/// What every runtime gets to talk to the host.
#[derive(Debug, Clone)]
pub struct AgentContext {
    pub connection: Connection,
    pub agent_id: String,
}

/// An agent runtime driven by [`AgentRunner`](super::AgentRunner).
///
/// `initialize` runs once, after the whole session is known. Per-tick and
/// match-comm failures are handled inside the runtime; only initialization
/// failures are reported back.
#[async_trait]
pub trait AgentRuntime: Send + 'static {
    async fn initialize(
        &mut self,
        session: &SessionInfo,
        context: &AgentContext,
    ) -> anyhow::Result<()>;

    async fn process_tick(&mut self, tick: Tick);

    async fn on_match_comm(&mut self, comm: &MatchComm);

    async fn retire(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum InitPhase {
    #[default]
    Waiting,
    Initialized,
    /// Initialization failed. Never retried.
    Failed,
}

/// Session state, free of any I/O.
#[derive(Debug, Default)]
pub(crate) struct SessionBootstrap {
    match_config: Option<Arc<MatchConfiguration>>,
    field_info: Option<Arc<FieldInfo>>,
    team_info: Option<Arc<ControllableTeamInfo>>,
    phase: InitPhase,
    latest_packet: Option<Arc<GamePacket>>,
    latest_prediction: Option<Arc<BallPrediction>>,
}

/// Store `value` unless the slot is already filled. First arrival wins.
fn set_once<T>(slot: &mut Option<Arc<T>>, value: &Arc<T>, what: &str) {
    if slot.is_some() {
        debug!(what, "Ignoring repeated session message");
    } else {
        info!(what, "Received session message");
        *slot = Some(value.clone());
    }
}

impl SessionBootstrap {
    pub(crate) fn set_match_config(&mut self, config: &Arc<MatchConfiguration>) {
        set_once(&mut self.match_config, config, "match config");
    }

    pub(crate) fn set_field_info(&mut self, field_info: &Arc<FieldInfo>) {
        set_once(&mut self.field_info, field_info, "field info");
    }

    pub(crate) fn set_team_info(&mut self, team_info: &Arc<ControllableTeamInfo>) {
        set_once(&mut self.team_info, team_info, "team info");
    }

    pub(crate) fn set_packet(&mut self, packet: &Arc<GamePacket>) {
        self.latest_packet = Some(packet.clone());
    }

    pub(crate) fn set_prediction(&mut self, prediction: &Arc<BallPrediction>) {
        self.latest_prediction = Some(prediction.clone());
    }

    /// The complete session, if initialization is due.
    pub(crate) fn pending_initialization(&self) -> Option<SessionInfo> {
        if self.phase != InitPhase::Waiting {
            return None;
        }
        Some(SessionInfo {
            match_config: self.match_config.clone()?,
            field_info: self.field_info.clone()?,
            team_info: self.team_info.clone()?,
        })
    }

    pub(crate) fn mark_initialized(&mut self) {
        self.phase = InitPhase::Initialized;
    }

    pub(crate) fn mark_failed(&mut self) {
        self.phase = InitPhase::Failed;
    }

    pub(crate) fn is_initialized(&self) -> bool {
        self.phase == InitPhase::Initialized
    }

    pub(crate) fn has_ready_tick(&self) -> bool {
        self.is_initialized() && self.latest_packet.is_some()
    }

    /// Take the pending tick. Before initialization the packet stays held.
    pub(crate) fn take_tick(&mut self) -> Option<Tick> {
        if !self.is_initialized() {
            return None;
        }
        let packet = self.latest_packet.take()?;
        Some(Tick { packet, ball_prediction: self.latest_prediction.clone() })
    }
}

struct SessionState<R> {
    bootstrap: SessionBootstrap,
    runtime: R,
}

/// Listener that feeds a runtime from incoming messages.
pub(crate) struct AgentSession<R> {
    state: Mutex<SessionState<R>>,
    context: AgentContext,
}

impl<R: AgentRuntime> AgentSession<R> {
    pub(crate) fn new(runtime: R, context: AgentContext) -> Self {
        Self {
            state: Mutex::new(SessionState { bootstrap: SessionBootstrap::default(), runtime }),
            context,
        }
    }

    pub(crate) async fn is_initialized(&self) -> bool {
        self.state.lock().await.bootstrap.is_initialized()
    }

    pub(crate) async fn has_ready_tick(&self) -> bool {
        self.state.lock().await.bootstrap.has_ready_tick()
    }

    /// Hand the latest tick to the runtime, if one is ready.
    pub(crate) async fn process_latest(&self) {
        let mut state = self.state.lock().await;
        if let Some(tick) = state.bootstrap.take_tick() {
            state.runtime.process_tick(tick).await;
        }
    }

    pub(crate) async fn retire(&self) {
        let mut state = self.state.lock().await;
        info!(agent_id = %self.context.agent_id, "Retiring agent");
        state.runtime.retire().await;
    }

    async fn try_initialize(&self, state: &mut SessionState<R>) -> anyhow::Result<()> {
        let Some(session) = state.bootstrap.pending_initialization() else {
            return Ok(());
        };

        let agent_id = &self.context.agent_id;
        info!(%agent_id, "Initializing agent");
        match state.runtime.initialize(&session, &self.context).await {
            Ok(()) => {
                state.bootstrap.mark_initialized();
                self.context.connection.send_init_complete().await?;
                info!(%agent_id, "Agent initialized");
            }
            Err(e) => {
                state.bootstrap.mark_failed();
                error!(%agent_id, error = ?e, "Failed to initialize agent");
            }
        }
        Ok(())
    }
}

#[async_trait]
impl<R: AgentRuntime> Listener for AgentSession<R> {
    async fn on_game_packet(&self, packet: &Arc<GamePacket>) -> anyhow::Result<()> {
        self.state.lock().await.bootstrap.set_packet(packet);
        Ok(())
    }

    async fn on_ball_prediction(&self, prediction: &Arc<BallPrediction>) -> anyhow::Result<()> {
        self.state.lock().await.bootstrap.set_prediction(prediction);
        Ok(())
    }

    async fn on_match_config(&self, config: &Arc<MatchConfiguration>) -> anyhow::Result<()> {
        let mut state = self.state.lock().await;
        state.bootstrap.set_match_config(config);
        self.try_initialize(&mut state).await
    }

    async fn on_field_info(&self, field_info: &Arc<FieldInfo>) -> anyhow::Result<()> {
        let mut state = self.state.lock().await;
        state.bootstrap.set_field_info(field_info);
        self.try_initialize(&mut state).await
    }

    async fn on_controllable_team_info(
        &self,
        team_info: &Arc<ControllableTeamInfo>,
    ) -> anyhow::Result<()> {
        let mut state = self.state.lock().await;
        state.bootstrap.set_team_info(team_info);
        self.try_initialize(&mut state).await
    }

    async fn on_match_comms(&self, comm: &MatchComm) -> anyhow::Result<()> {
        let mut state = self.state.lock().await;
        if state.bootstrap.is_initialized() {
            state.runtime.on_match_comm(comm).await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{match_config, packet, team_info};

    fn session_parts() -> (Arc<MatchConfiguration>, Arc<FieldInfo>, Arc<ControllableTeamInfo>) {
        (
            Arc::new(match_config(&["Atba", "Other"])),
            Arc::new(FieldInfo::default()),
            Arc::new(team_info(0, &[0])),
        )
    }

    #[test]
    fn initialization_due_only_when_all_three_arrived() {
        let (config, field, team) = session_parts();
        let mut bootstrap = SessionBootstrap::default();

        bootstrap.set_field_info(&field);
        assert!(bootstrap.pending_initialization().is_none());
        bootstrap.set_team_info(&team);
        assert!(bootstrap.pending_initialization().is_none());
        bootstrap.set_match_config(&config);

        let session = bootstrap.pending_initialization().unwrap();
        assert!(Arc::ptr_eq(&session.team_info, &team));
    }

    #[test]
    fn first_arrival_wins() {
        let (config, field, team) = session_parts();
        let mut bootstrap = SessionBootstrap::default();
        bootstrap.set_match_config(&config);
        bootstrap.set_match_config(&Arc::new(match_config(&["Late"])));
        bootstrap.set_field_info(&field);
        bootstrap.set_team_info(&team);

        let session = bootstrap.pending_initialization().unwrap();
        assert_eq!(session.match_config.bot_name(0), Some("Atba"));
    }

    #[test]
    fn failed_initialization_is_never_due_again() {
        let (config, field, team) = session_parts();
        let mut bootstrap = SessionBootstrap::default();
        bootstrap.set_match_config(&config);
        bootstrap.set_field_info(&field);
        bootstrap.set_team_info(&team);
        bootstrap.mark_failed();

        bootstrap.set_team_info(&team);
        assert!(bootstrap.pending_initialization().is_none());
        assert!(!bootstrap.is_initialized());
    }

    #[test]
    fn packet_before_initialization_is_held_not_dropped() {
        let mut bootstrap = SessionBootstrap::default();
        bootstrap.set_packet(&packet(1));
        bootstrap.set_packet(&packet(2));

        assert!(!bootstrap.has_ready_tick());
        assert!(bootstrap.take_tick().is_none());

        bootstrap.mark_initialized();
        assert!(bootstrap.has_ready_tick());
        let tick = bootstrap.take_tick().unwrap();
        assert_eq!(tick.packet.frame_num(), 2);
        assert!(tick.ball_prediction.is_none());
        assert!(!bootstrap.has_ready_tick());
    }

    #[test]
    fn prediction_persists_across_ticks() {
        let mut bootstrap = SessionBootstrap::default();
        bootstrap.mark_initialized();
        bootstrap.set_prediction(&Arc::new(BallPrediction::default()));

        bootstrap.set_packet(&packet(1));
        assert!(bootstrap.take_tick().unwrap().ball_prediction.is_some());
        bootstrap.set_packet(&packet(2));
        assert!(bootstrap.take_tick().unwrap().ball_prediction.is_some());
    }
}
