//! One worker task per controlled car.

use async_trait::async_trait;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::mailbox::{MailboxReceiver, MailboxSender, mailbox};
use super::session::{AgentContext, AgentRuntime, SessionInfo, Tick};
use crate::connection::Connection;
use crate::types::{
    BallPrediction, ControllerState, FieldInfo, GamePacket, MatchComm, MatchConfiguration,
    PlayerInput, PlayerLoadout, SetLoadout,
};

/// How long `retire` waits for workers to finish their last step.
const RETIRE_GRACE: Duration = Duration::from_secs(5);

/// Decision logic for a single car.
#[async_trait]
pub trait Bot: Send + 'static {
    /// Loadout applied once during initialization.
    fn initial_loadout(&self) -> Option<PlayerLoadout> {
        None
    }

    /// Decide the controls for one tick. `None` sends nothing.
    async fn get_output(
        &mut self,
        packet: &GamePacket,
        ball_prediction: Option<&BallPrediction>,
    ) -> anyhow::Result<Option<ControllerState>>;

    async fn on_match_comm(&mut self, _comm: &MatchComm) -> anyhow::Result<()> {
        Ok(())
    }

    /// Runs once when the worker stops, for any reason.
    async fn on_retire(&mut self) {}
}

/// Everything a bot is created with.
#[derive(Debug, Clone)]
pub struct BotContext {
    pub connection: Connection,
    pub index: u32,
    pub team: u32,
    pub name: String,
    pub agent_id: String,
    pub match_config: Arc<MatchConfiguration>,
    pub field_info: Arc<FieldInfo>,
}

/// Creates one bot per controlled index.
pub trait BotFactory: Send + 'static {
    fn create(&self, context: BotContext) -> anyhow::Result<Box<dyn Bot>>;
}

impl<F, B> BotFactory for F
where
    F: Fn(BotContext) -> anyhow::Result<B> + Send + 'static,
    B: Bot,
{
    fn create(&self, context: BotContext) -> anyhow::Result<Box<dyn Bot>> {
        Ok(Box::new(self(context)?))
    }
}

type SharedBot = Arc<Mutex<Box<dyn Bot>>>;

struct BotWorker {
    name: String,
    index: u32,
    bot: SharedBot,
    running: Arc<AtomicBool>,
    mailbox: MailboxSender<Tick>,
    handle: JoinHandle<()>,
}

/// Runs each controlled car's bot on its own task, fed by a latest-wins
/// mailbox. A failing bot stops only its own worker.
pub struct BotManager<F> {
    factory: F,
    workers: Vec<BotWorker>,
}

impl<F: BotFactory> BotManager<F> {
    pub fn new(factory: F) -> Self {
        Self { factory, workers: Vec::new() }
    }

    /// Indices of workers still running.
    pub fn running_indices(&self) -> Vec<u32> {
        self.workers.iter().filter(|w| w.running.load(Ordering::SeqCst)).map(|w| w.index).collect()
    }
}

impl<F> std::fmt::Debug for BotManager<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BotManager")
            .field("bots", &self.workers.iter().map(|w| (w.index, &w.name)).collect::<Vec<_>>())
            .finish()
    }
}

struct WorkerTask {
    name: String,
    index: u32,
    bot: SharedBot,
    running: Arc<AtomicBool>,
    mailbox: MailboxReceiver<Tick>,
    connection: Connection,
}

async fn bot_loop(mut task: WorkerTask) {
    debug!(bot = %task.name, index = task.index, "Bot worker started");

    while task.running.load(Ordering::SeqCst) {
        let Some(tick) = task.mailbox.take().await else {
            break;
        };
        if !task.running.load(Ordering::SeqCst) {
            break;
        }

        let step = AssertUnwindSafe(async {
            let mut bot = task.bot.lock().await;
            bot.get_output(&tick.packet, tick.ball_prediction()).await
        });
        let output = match step.catch_unwind().await {
            Ok(output) => output,
            Err(panic) => {
                error!(
                    bot = %task.name,
                    index = task.index,
                    panic = panic_message(panic.as_ref()),
                    "Bot panicked while processing game packet"
                );
                break;
            }
        };

        match output {
            Ok(Some(controller_state)) => {
                let input = PlayerInput { player_index: task.index, controller_state };
                if let Err(e) = task.connection.send_player_input(input).await {
                    warn!(
                        bot = %task.name,
                        index = task.index,
                        error = %e,
                        "Failed to send player input"
                    );
                }
            }
            Ok(None) => {}
            Err(e) => {
                error!(
                    bot = %task.name,
                    index = task.index,
                    error = ?e,
                    "Bot encountered an error while processing game packet"
                );
                break;
            }
        }
    }

    task.running.store(false, Ordering::SeqCst);
    task.bot.lock().await.on_retire().await;
    debug!(bot = %task.name, index = task.index, "Bot worker stopped");
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

#[async_trait]
impl<F: BotFactory> AgentRuntime for BotManager<F> {
    async fn initialize(
        &mut self,
        session: &SessionInfo,
        context: &AgentContext,
    ) -> anyhow::Result<()> {
        let team = session.team_info.team;

        let mut created = Vec::new();
        for index in session.team_info.indices() {
            let name = session
                .match_config
                .bot_name(index)
                .ok_or_else(|| anyhow::anyhow!("player {} is not a custom bot", index))?
                .to_owned();

            let bot = self.factory.create(BotContext {
                connection: context.connection.clone(),
                index,
                team,
                name: name.clone(),
                agent_id: context.agent_id.clone(),
                match_config: session.match_config.clone(),
                field_info: session.field_info.clone(),
            })?;
            created.push((index, name, bot));
        }

        // Workers only start once every bot was created
        let mut loadouts = Vec::new();
        for (index, name, bot) in created {
            if let Some(loadout) = bot.initial_loadout() {
                loadouts.push(SetLoadout { index, loadout });
            }

            let bot: SharedBot = Arc::new(Mutex::new(bot));
            let running = Arc::new(AtomicBool::new(true));
            let (tx, rx) = mailbox();
            let handle = tokio::spawn(bot_loop(WorkerTask {
                name: name.clone(),
                index,
                bot: bot.clone(),
                running: running.clone(),
                mailbox: rx,
                connection: context.connection.clone(),
            }));

            info!(bot = %name, index, team, "Started bot");
            self.workers.push(BotWorker { name, index, bot, running, mailbox: tx, handle });
        }

        for set_loadout in loadouts {
            context.connection.send_set_loadout(set_loadout).await?;
        }
        Ok(())
    }

    async fn process_tick(&mut self, tick: Tick) {
        for worker in &self.workers {
            if worker.running.load(Ordering::SeqCst) {
                worker.mailbox.put(tick.clone());
            }
        }
    }

    async fn on_match_comm(&mut self, comm: &MatchComm) {
        for worker in &self.workers {
            // A stopped bot has already retired
            if !worker.running.load(Ordering::SeqCst) {
                continue;
            }
            if let Err(e) = worker.bot.lock().await.on_match_comm(comm).await {
                error!(
                    bot = %worker.name,
                    index = worker.index,
                    error = ?e,
                    "Bot encountered an error while processing match comms"
                );
            }
        }
    }

    async fn retire(&mut self) {
        let workers = std::mem::take(&mut self.workers);
        let mut handles = Vec::with_capacity(workers.len());
        for worker in workers {
            worker.running.store(false, Ordering::SeqCst);
            // Dropping the sender closes the mailbox and wakes a blocked worker
            drop(worker.mailbox);
            handles.push(worker.handle);
        }

        let joined = tokio::time::timeout(RETIRE_GRACE, async {
            for handle in handles {
                if let Err(e) = handle.await {
                    error!(error = %e, "Bot worker panicked");
                }
            }
        });
        if joined.await.is_err() {
            warn!("Bot workers did not stop within {:?}", RETIRE_GRACE);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::AgentRunner;
    use crate::protocol::Envelope;
    use crate::test_utils::{FakeHost, match_config, packet, session_messages, team_info};
    use std::sync::Mutex as StdMutex;

    /// Throttle follows the frame number; fails on a chosen frame.
    struct FrameBot {
        index: u32,
        fail_on_frame: Option<u32>,
        seen: Arc<StdMutex<Vec<(u32, u32)>>>,
        retired: Arc<AtomicBool>,
        comms: Arc<StdMutex<Vec<u32>>>,
    }

    #[async_trait]
    impl Bot for FrameBot {
        fn initial_loadout(&self) -> Option<PlayerLoadout> {
            Some(PlayerLoadout { car_id: 23 + self.index, ..Default::default() })
        }

        async fn get_output(
            &mut self,
            packet: &GamePacket,
            _ball_prediction: Option<&BallPrediction>,
        ) -> anyhow::Result<Option<ControllerState>> {
            let frame = packet.frame_num();
            self.seen.lock().unwrap().push((self.index, frame));
            if self.fail_on_frame == Some(frame) {
                anyhow::bail!("bot {} cannot handle frame {}", self.index, frame);
            }
            Ok(Some(ControllerState { throttle: frame as f32, ..Default::default() }))
        }

        async fn on_match_comm(&mut self, _comm: &MatchComm) -> anyhow::Result<()> {
            self.comms.lock().unwrap().push(self.index);
            if self.fail_on_frame.is_some() {
                anyhow::bail!("comm handler broken");
            }
            Ok(())
        }

        async fn on_retire(&mut self) {
            self.retired.store(true, Ordering::SeqCst);
        }
    }

    #[derive(Clone, Default)]
    struct Recorder {
        seen: Arc<StdMutex<Vec<(u32, u32)>>>,
        comms: Arc<StdMutex<Vec<u32>>>,
    }

    fn factory(
        recorder: &Recorder,
        failing_index: u32,
        fail_on_frame: u32,
    ) -> (impl BotFactory, Vec<Arc<AtomicBool>>) {
        let retired: Vec<_> = (0..2).map(|_| Arc::new(AtomicBool::new(false))).collect();
        let flags = retired.clone();
        let seen = recorder.seen.clone();
        let comms = recorder.comms.clone();
        let factory = move |ctx: BotContext| -> anyhow::Result<FrameBot> {
            Ok(FrameBot {
                index: ctx.index,
                fail_on_frame: (ctx.index == failing_index).then_some(fail_on_frame),
                seen: seen.clone(),
                retired: flags[ctx.index as usize].clone(),
                comms: comms.clone(),
            })
        };
        (factory, retired)
    }

    #[tokio::test]
    async fn failing_bot_stops_only_its_own_worker() {
        let _ = tracing_subscriber::fmt::try_init();
        let host = FakeHost::bind().await;
        let recorder = Recorder::default();
        let (factory, retired) = factory(&recorder, 1, 1);
        let runner =
            AgentRunner::new(host.config(Some("test/pair")), BotManager::new(factory)).unwrap();

        let run = tokio::spawn(async move { runner.run(false, true).await });
        let mut session = host.accept().await;
        session.expect_handshake().await;

        for message in session_messages(match_config(&["Left", "Right"]), team_info(0, &[0, 1])) {
            session.send(message).await;
        }

        let mut loadouts = Vec::new();
        loop {
            match session.recv().await {
                Envelope::SetLoadout(set) => loadouts.push((set.index, set.loadout.car_id)),
                Envelope::InitComplete => break,
                other => panic!("unexpected {:?}", other.kind()),
            }
        }
        loadouts.sort();
        assert_eq!(loadouts, vec![(0, 23), (1, 24)]);

        // Bot 1's comm handler fails without affecting bot 0
        session.send(Envelope::MatchComm(MatchComm { index: 4, ..Default::default() })).await;

        // Frame 1 kills bot 1; bot 0 keeps answering
        session.send(Envelope::GamePacket(packet(1))).await;
        let first = session.recv().await;
        assert!(matches!(first, Envelope::PlayerInput(PlayerInput { player_index: 0, .. })));

        for frame in 2..=4 {
            tokio::time::sleep(Duration::from_millis(30)).await;
            session.send(Envelope::GamePacket(packet(frame))).await;
            match session.recv().await {
                Envelope::PlayerInput(input) => {
                    assert_eq!(input.player_index, 0);
                    assert_eq!(input.controller_state.throttle, frame as f32);
                }
                other => panic!("unexpected {:?}", other.kind()),
            }
        }
        assert!(retired[1].load(Ordering::SeqCst));
        assert!(!retired[0].load(Ordering::SeqCst));

        // Stopped bots get no more comms
        session
            .send(Envelope::MatchComm(MatchComm { index: 5, team: 1, ..Default::default() }))
            .await;
        session.send(Envelope::DisconnectSignal).await;

        run.await.unwrap().unwrap();
        assert_eq!(*recorder.comms.lock().unwrap(), vec![0, 1, 0]);
        assert!(retired[0].load(Ordering::SeqCst), "retire must stop remaining workers");

        let seen = recorder.seen.lock().unwrap();
        assert_eq!(seen.iter().filter(|(index, _)| *index == 1).count(), 1);
    }

    #[tokio::test]
    async fn factory_failure_means_no_ready_signal() {
        let host = FakeHost::bind().await;
        let factory =
            |_ctx: BotContext| -> anyhow::Result<FrameBot> { anyhow::bail!("no model file") };
        let runner =
            AgentRunner::new(host.config(Some("test/broken")), BotManager::new(factory)).unwrap();

        let run = tokio::spawn(async move { runner.run(false, false).await });
        let mut session = host.accept().await;
        session.expect_handshake().await;

        for message in session_messages(match_config(&["Solo"]), team_info(0, &[0])) {
            session.send(message).await;
        }
        // Repeated session messages do not retry initialization
        for message in session_messages(match_config(&["Solo"]), team_info(0, &[0])) {
            session.send(message).await;
        }
        session.send(Envelope::GamePacket(packet(1))).await;

        assert!(session.try_recv(Duration::from_millis(300)).await.is_none());

        session.send(Envelope::DisconnectSignal).await;
        run.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn non_custom_bot_index_fails_initialization() {
        let recorder = Recorder::default();
        let (factory, _) = factory(&recorder, 9, 0);
        let mut manager = BotManager::new(factory);

        let mut config = match_config(&["Only"]);
        config.player_configurations[0].variety = crate::types::PlayerClass::Human;
        let session = SessionInfo {
            match_config: Arc::new(config),
            field_info: Arc::new(FieldInfo::default()),
            team_info: Arc::new(team_info(0, &[0])),
        };
        let context = AgentContext {
            connection: Connection::new(crate::ClientConfig::default()),
            agent_id: "test/human".to_string(),
        };

        let err = manager.initialize(&session, &context).await.unwrap_err();
        assert!(err.to_string().contains("not a custom bot"));
        assert!(manager.running_indices().is_empty());
    }

    #[tokio::test]
    async fn retire_wakes_blocked_workers() {
        let recorder = Recorder::default();
        let (factory, retired) = factory(&recorder, 9, 0);
        let mut manager = BotManager::new(factory);

        // Not connected: loadouts cannot be sent, so spawn workers by hand
        let bot = factory_bot(&recorder, &retired[0]);
        let running = Arc::new(AtomicBool::new(true));
        let (tx, rx) = mailbox();
        let shared: SharedBot = Arc::new(Mutex::new(bot));
        let handle = tokio::spawn(bot_loop(WorkerTask {
            name: "Idle".to_string(),
            index: 0,
            bot: shared.clone(),
            running: running.clone(),
            mailbox: rx,
            connection: Connection::new(crate::ClientConfig::default()),
        }));
        manager.workers.push(BotWorker {
            name: "Idle".to_string(),
            index: 0,
            bot: shared,
            running,
            mailbox: tx,
            handle,
        });

        tokio::time::timeout(Duration::from_secs(1), manager.retire()).await.unwrap();
        assert!(retired[0].load(Ordering::SeqCst));
        assert!(manager.running_indices().is_empty());
    }

    struct PanickingBot {
        retired: Arc<AtomicBool>,
    }

    #[async_trait]
    impl Bot for PanickingBot {
        async fn get_output(
            &mut self,
            packet: &GamePacket,
            _ball_prediction: Option<&BallPrediction>,
        ) -> anyhow::Result<Option<ControllerState>> {
            let throttles: Vec<f32> = Vec::new();
            let throttle = throttles[packet.frame_num() as usize];
            Ok(Some(ControllerState { throttle, ..Default::default() }))
        }

        async fn on_match_comm(&mut self, _comm: &MatchComm) -> anyhow::Result<()> {
            panic!("stopped bot received a comm");
        }

        async fn on_retire(&mut self) {
            self.retired.store(true, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn panicking_bot_stops_its_worker_and_retires() {
        let recorder = Recorder::default();
        let (factory, _) = factory(&recorder, 9, 0);
        let mut manager = BotManager::new(factory);

        let retired = Arc::new(AtomicBool::new(false));
        let bot: Box<dyn Bot> = Box::new(PanickingBot { retired: retired.clone() });
        let running = Arc::new(AtomicBool::new(true));
        let (tx, rx) = mailbox();
        let shared: SharedBot = Arc::new(Mutex::new(bot));
        let handle = tokio::spawn(bot_loop(WorkerTask {
            name: "Fragile".to_string(),
            index: 0,
            bot: shared.clone(),
            running: running.clone(),
            mailbox: rx,
            connection: Connection::new(crate::ClientConfig::default()),
        }));

        tx.put(Tick { packet: packet(1), ball_prediction: None });
        tokio::time::timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();
        assert!(!running.load(Ordering::SeqCst));
        assert!(retired.load(Ordering::SeqCst));

        // The stopped worker is skipped by comms and ticks
        manager.workers.push(BotWorker {
            name: "Fragile".to_string(),
            index: 0,
            bot: shared,
            running,
            mailbox: tx,
            handle: tokio::spawn(async {}),
        });
        assert!(manager.running_indices().is_empty());
        manager.on_match_comm(&MatchComm::default()).await;
        manager.retire().await;
    }

    fn factory_bot(recorder: &Recorder, retired: &Arc<AtomicBool>) -> Box<dyn Bot> {
        Box::new(FrameBot {
            index: 0,
            fail_on_frame: None,
            seen: recorder.seen.clone(),
            retired: retired.clone(),
            comms: recorder.comms.clone(),
        })
    }
}
