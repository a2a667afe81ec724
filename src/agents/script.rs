//! Car-less observer agents.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{error, info};

use super::session::{AgentContext, AgentRuntime, SessionInfo, Tick};
use crate::connection::Connection;
use crate::types::{BallPrediction, FieldInfo, GamePacket, MatchComm, MatchConfiguration};

/// Observer logic. Scripts control no car but may render, set game state
/// or send match comms through their connection.
#[async_trait]
pub trait Script: Send + 'static {
    async fn process(
        &mut self,
        packet: &GamePacket,
        ball_prediction: Option<&BallPrediction>,
    ) -> anyhow::Result<()>;

    async fn on_match_comm(&mut self, _comm: &MatchComm) -> anyhow::Result<()> {
        Ok(())
    }

    async fn on_retire(&mut self) {}
}

#[derive(Debug, Clone)]
pub struct ScriptContext {
    pub connection: Connection,
    pub index: u32,
    pub name: String,
    pub agent_id: String,
    pub match_config: Arc<MatchConfiguration>,
    pub field_info: Arc<FieldInfo>,
}

pub trait ScriptFactory: Send + 'static {
    fn create(&self, context: ScriptContext) -> anyhow::Result<Box<dyn Script>>;
}

impl<F, S> ScriptFactory for F
where
    F: Fn(ScriptContext) -> anyhow::Result<S> + Send + 'static,
    S: Script,
{
    fn create(&self, context: ScriptContext) -> anyhow::Result<Box<dyn Script>> {
        Ok(Box::new(self(context)?))
    }
}

/// Runs a script inline on the receive loop. Script errors are logged and
/// never end the session.
pub struct ScriptManager<F> {
    factory: F,
    script: Option<Box<dyn Script>>,
    name: String,
}

impl<F: ScriptFactory> ScriptManager<F> {
    pub fn new(factory: F) -> Self {
        Self { factory, script: None, name: String::new() }
    }
}

impl<F> std::fmt::Debug for ScriptManager<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptManager")
            .field("name", &self.name)
            .field("initialized", &self.script.is_some())
            .finish()
    }
}

#[async_trait]
impl<F: ScriptFactory> AgentRuntime for ScriptManager<F> {
    async fn initialize(
        &mut self,
        session: &SessionInfo,
        context: &AgentContext,
    ) -> anyhow::Result<()> {
        let index = session
            .team_info
            .indices()
            .next()
            .ok_or_else(|| anyhow::anyhow!("no controllable script index in team info"))?;
        let name = session
            .match_config
            .script_name(index)
            .ok_or_else(|| anyhow::anyhow!("no script configuration at index {}", index))?
            .to_owned();

        let script = self.factory.create(ScriptContext {
            connection: context.connection.clone(),
            index,
            name: name.clone(),
            agent_id: context.agent_id.clone(),
            match_config: session.match_config.clone(),
            field_info: session.field_info.clone(),
        })?;

        info!(script = %name, index, "Started script");
        self.script = Some(script);
        self.name = name;
        Ok(())
    }

    async fn process_tick(&mut self, tick: Tick) {
        let Some(script) = self.script.as_mut() else {
            return;
        };
        if let Err(e) = script.process(&tick.packet, tick.ball_prediction()).await {
            error!(
                script = %self.name,
                error = ?e,
                "Script encountered an error while processing game packet"
            );
        }
    }

    async fn on_match_comm(&mut self, comm: &MatchComm) {
        let Some(script) = self.script.as_mut() else {
            return;
        };
        if let Err(e) = script.on_match_comm(comm).await {
            error!(
                script = %self.name,
                error = ?e,
                "Script encountered an error while processing match comms"
            );
        }
    }

    async fn retire(&mut self) {
        if let Some(script) = self.script.as_mut() {
            script.on_retire().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::AgentRunner;
    use crate::protocol::Envelope;
    use crate::test_utils::{FakeHost, match_config, packet, session_messages, team_info};
    use crate::types::{Color, RenderGroup, RenderType, Vector3};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Draws a marker each frame; fails on odd frames.
    struct Marker {
        connection: Connection,
        frames: Arc<Mutex<Vec<u32>>>,
    }

    #[async_trait]
    impl Script for Marker {
        async fn process(
            &mut self,
            packet: &GamePacket,
            _ball_prediction: Option<&BallPrediction>,
        ) -> anyhow::Result<()> {
            let frame = packet.frame_num();
            self.frames.lock().unwrap().push(frame);
            if frame % 2 == 1 {
                anyhow::bail!("odd frame {}", frame);
            }
            let marker = RenderType::String3D {
                text: format!("frame {}", frame),
                anchor: Vector3::default(),
                scale: 1.0,
                foreground: Color::BLUE,
            };
            self.connection
                .send_render_group(RenderGroup { id: frame as i32, render_messages: vec![marker] })
                .await?;
            Ok(())
        }
    }

    #[tokio::test]
    async fn script_errors_do_not_end_the_session() {
        let host = FakeHost::bind().await;
        let frames = Arc::new(Mutex::new(Vec::new()));
        let seen = frames.clone();
        let factory = move |ctx: ScriptContext| -> anyhow::Result<Marker> {
            assert_eq!(ctx.name, "Observer");
            Ok(Marker { connection: ctx.connection, frames: seen.clone() })
        };
        let config = host.config(Some("test/observer"));
        let runner = AgentRunner::new(config, ScriptManager::new(factory)).unwrap();

        let run = tokio::spawn(async move { runner.run(false, false).await });
        let mut session = host.accept().await;
        session.expect_handshake().await;

        for message in session_messages(match_config(&[]), team_info(0, &[0])) {
            session.send(message).await;
        }
        assert_eq!(session.recv().await, Envelope::InitComplete);

        for frame in 1..=4 {
            session.send(Envelope::GamePacket(packet(frame))).await;
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        let mut groups = Vec::new();
        while let Some(envelope) = session.try_recv(Duration::from_millis(200)).await {
            match envelope {
                Envelope::RenderGroup(group) => groups.push(group.id),
                Envelope::PlayerInput(_) => panic!("scripts never send player input"),
                other => panic!("unexpected {:?}", other.kind()),
            }
        }
        assert_eq!(groups, vec![2, 4]);

        session.send(Envelope::DisconnectSignal).await;
        run.await.unwrap().unwrap();
        assert_eq!(*frames.lock().unwrap(), vec![1, 2, 3, 4]);
    }
}
