//! Listener registry and message dispatch.
//!
//! Every decoded [`Envelope`] is broadcast to the registered listeners in
//! registration order: first `on_any_message` on every listener, then the
//! callback matching the envelope's kind. A disconnect signal, an empty
//! payload or an unknown kind notifies `on_disconnect` instead and ends the
//! run loop.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, error, warn};

use crate::protocol::{Envelope, MessageKind};
use crate::types::{
    BallPrediction, ControllableTeamInfo, FieldInfo, GamePacket, MatchComm, MatchConfiguration,
    RenderingStatus,
};
use crate::{KickoffError, Result};

/// Observer of connection events.
///
/// Every callback defaults to a no-op. Returning an error aborts dispatch
/// of the current message and ends the run loop, so implementations that
/// want to survive their own failures must handle them locally.
#[async_trait]
pub trait Listener: Send + Sync + 'static {
    async fn on_connect(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn on_disconnect(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn on_any_message(&self, _envelope: &Envelope) -> anyhow::Result<()> {
        Ok(())
    }

    async fn on_game_packet(&self, _packet: &Arc<GamePacket>) -> anyhow::Result<()> {
        Ok(())
    }

    async fn on_field_info(&self, _field_info: &Arc<FieldInfo>) -> anyhow::Result<()> {
        Ok(())
    }

    async fn on_match_config(&self, _config: &Arc<MatchConfiguration>) -> anyhow::Result<()> {
        Ok(())
    }

    async fn on_match_comms(&self, _comm: &MatchComm) -> anyhow::Result<()> {
        Ok(())
    }

    async fn on_ball_prediction(&self, _prediction: &Arc<BallPrediction>) -> anyhow::Result<()> {
        Ok(())
    }

    async fn on_controllable_team_info(
        &self,
        _team_info: &Arc<ControllableTeamInfo>,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    async fn on_rendering_status(&self, _status: &RenderingStatus) -> anyhow::Result<()> {
        Ok(())
    }
}

/// What the run loop should do after a message was dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DispatchOutcome {
    Continue,
    Disconnect,
}

/// Ordered listener registry.
#[derive(Default)]
pub(crate) struct Dispatcher {
    listeners: RwLock<Vec<Arc<dyn Listener>>>,
    /// Armed on connect, cleared by the first disconnect notification.
    connected: AtomicBool,
}

impl Dispatcher {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<Arc<dyn Listener>>> {
        self.listeners.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<Arc<dyn Listener>>> {
        self.listeners.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Listeners at the time of the call. Dispatch iterates the snapshot so
    /// callbacks can (un)subscribe without deadlocking.
    fn snapshot(&self) -> Vec<Arc<dyn Listener>> {
        self.read().clone()
    }

    pub(crate) fn subscribe(&self, listener: Arc<dyn Listener>) {
        let mut listeners = self.write();
        listeners.push(listener);
        debug!(count = listeners.len(), "Listener subscribed");
    }

    /// Remove a listener by identity. Returns whether it was registered.
    pub(crate) fn unsubscribe(&self, listener: &Arc<dyn Listener>) -> bool {
        let mut listeners = self.write();
        match listeners.iter().position(|l| Arc::ptr_eq(l, listener)) {
            Some(index) => {
                listeners.remove(index);
                debug!(count = listeners.len(), "Listener unsubscribed");
                true
            }
            None => false,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.read().len()
    }

    /// Broadcast one envelope.
    pub(crate) async fn dispatch(&self, envelope: &Envelope) -> Result<DispatchOutcome> {
        let kind = envelope.kind();
        let listeners = self.snapshot();

        for listener in &listeners {
            listener.on_any_message(envelope).await.map_err(|e| KickoffError::dispatch(kind, e))?;
        }

        match envelope {
            Envelope::DisconnectSignal | Envelope::None | Envelope::Unknown(_) => {
                if let Envelope::Unknown(tag) = envelope {
                    warn!(tag, "Received message of unknown kind, disconnecting");
                } else {
                    debug!(%kind, "Host requested disconnect");
                }
                self.notify_disconnect().await?;
                return Ok(DispatchOutcome::Disconnect);
            }
            Envelope::GamePacket(packet) => {
                for listener in &listeners {
                    listener
                        .on_game_packet(packet)
                        .await
                        .map_err(|e| KickoffError::dispatch(kind, e))?;
                }
            }
            Envelope::FieldInfo(field_info) => {
                for listener in &listeners {
                    listener
                        .on_field_info(field_info)
                        .await
                        .map_err(|e| KickoffError::dispatch(kind, e))?;
                }
            }
            Envelope::MatchConfig(config) | Envelope::MatchConfiguration(config) => {
                for listener in &listeners {
                    listener
                        .on_match_config(config)
                        .await
                        .map_err(|e| KickoffError::dispatch(kind, e))?;
                }
            }
            Envelope::MatchComm(comm) => {
                for listener in &listeners {
                    listener
                        .on_match_comms(comm)
                        .await
                        .map_err(|e| KickoffError::dispatch(kind, e))?;
                }
            }
            Envelope::BallPrediction(prediction) => {
                for listener in &listeners {
                    listener
                        .on_ball_prediction(prediction)
                        .await
                        .map_err(|e| KickoffError::dispatch(kind, e))?;
                }
            }
            Envelope::ControllableTeamInfo(team_info) => {
                for listener in &listeners {
                    listener
                        .on_controllable_team_info(team_info)
                        .await
                        .map_err(|e| KickoffError::dispatch(kind, e))?;
                }
            }
            Envelope::RenderingStatus(status) => {
                for listener in &listeners {
                    listener
                        .on_rendering_status(status)
                        .await
                        .map_err(|e| KickoffError::dispatch(kind, e))?;
                }
            }
            Envelope::ConnectionSettings(_)
            | Envelope::InitComplete
            | Envelope::SetLoadout(_)
            | Envelope::PlayerInput(_)
            | Envelope::DesiredGameState(_)
            | Envelope::RenderGroup(_)
            | Envelope::RemoveRenderGroup(_)
            | Envelope::StopCommand(_)
            | Envelope::StartCommand(_) => {
                warn!(%kind, "Received client-to-host message kind from host, ignoring");
            }
        }

        Ok(DispatchOutcome::Continue)
    }

    /// Notify every listener of a new connection and arm the disconnect
    /// notification.
    pub(crate) async fn notify_connect(&self) -> Result<()> {
        self.connected.store(true, Ordering::SeqCst);
        for listener in self.snapshot() {
            listener
                .on_connect()
                .await
                .map_err(|e| KickoffError::dispatch(MessageKind::ConnectionSettings, e))?;
        }
        Ok(())
    }

    /// Notify every listener that the connection ended.
    ///
    /// Runs at most once per connection. Every listener is notified even if
    /// an earlier one fails; the first failure is returned.
    pub(crate) async fn notify_disconnect(&self) -> Result<()> {
        if !self.connected.swap(false, Ordering::SeqCst) {
            return Ok(());
        }

        let mut first_error = None;
        for listener in self.snapshot() {
            if let Err(e) = listener.on_disconnect().await {
                error!(error = %e, "Listener failed while handling disconnect");
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(KickoffError::dispatch(MessageKind::DisconnectSignal, e)),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Records every callback as "<name>:<event>".
    struct Recorder {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
        fail_on_packet: bool,
    }

    impl Recorder {
        fn new(name: &'static str, log: &Arc<Mutex<Vec<String>>>) -> Arc<Self> {
            Arc::new(Self { name, log: log.clone(), fail_on_packet: false })
        }

        fn push(&self, event: &str) {
            self.log.lock().unwrap().push(format!("{}:{}", self.name, event));
        }
    }

    #[async_trait]
    impl Listener for Recorder {
        async fn on_connect(&self) -> anyhow::Result<()> {
            self.push("connect");
            Ok(())
        }

        async fn on_disconnect(&self) -> anyhow::Result<()> {
            self.push("disconnect");
            Ok(())
        }

        async fn on_any_message(&self, envelope: &Envelope) -> anyhow::Result<()> {
            self.push(&format!("any({})", envelope.kind()));
            Ok(())
        }

        async fn on_game_packet(&self, _packet: &Arc<GamePacket>) -> anyhow::Result<()> {
            self.push("packet");
            if self.fail_on_packet {
                anyhow::bail!("decision exploded");
            }
            Ok(())
        }

        async fn on_match_config(&self, _config: &Arc<MatchConfiguration>) -> anyhow::Result<()> {
            self.push("config");
            Ok(())
        }
    }

    fn events(log: &Arc<Mutex<Vec<String>>>) -> Vec<String> {
        log.lock().unwrap().drain(..).collect()
    }

    #[tokio::test]
    async fn any_message_runs_for_all_before_specific_callbacks() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let dispatcher = Dispatcher::new();
        dispatcher.subscribe(Recorder::new("a", &log));
        dispatcher.subscribe(Recorder::new("b", &log));

        let outcome = dispatcher
            .dispatch(&Envelope::GamePacket(Arc::new(GamePacket::default())))
            .await
            .unwrap();

        assert_eq!(outcome, DispatchOutcome::Continue);
        assert_eq!(
            events(&log),
            vec!["a:any(GamePacket)", "b:any(GamePacket)", "a:packet", "b:packet"]
        );
    }

    #[tokio::test]
    async fn both_match_config_kinds_reach_on_match_config() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let dispatcher = Dispatcher::new();
        dispatcher.subscribe(Recorder::new("a", &log));

        let config = Arc::new(MatchConfiguration::default());
        dispatcher.dispatch(&Envelope::MatchConfig(config.clone())).await.unwrap();
        dispatcher.dispatch(&Envelope::MatchConfiguration(config)).await.unwrap();

        let events = events(&log);
        assert_eq!(events.iter().filter(|e| *e == "a:config").count(), 2);
    }

    #[tokio::test]
    async fn disconnect_kinds_notify_once_per_connection() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let dispatcher = Dispatcher::new();
        dispatcher.subscribe(Recorder::new("a", &log));
        dispatcher.notify_connect().await.unwrap();

        for envelope in [Envelope::DisconnectSignal, Envelope::None, Envelope::Unknown(99)] {
            let outcome = dispatcher.dispatch(&envelope).await.unwrap();
            assert_eq!(outcome, DispatchOutcome::Disconnect);
        }

        let disconnects = events(&log).into_iter().filter(|e| e == "a:disconnect").count();
        assert_eq!(disconnects, 1);

        dispatcher.notify_connect().await.unwrap();
        dispatcher.notify_disconnect().await.unwrap();
        assert_eq!(events(&log), vec!["a:connect", "a:disconnect"]);
    }

    #[tokio::test]
    async fn listener_error_aborts_the_frame() {
        let _ = tracing_subscriber::fmt::try_init();
        let log = Arc::new(Mutex::new(Vec::new()));
        let dispatcher = Dispatcher::new();
        dispatcher.subscribe(Arc::new(Recorder {
            name: "bad",
            log: log.clone(),
            fail_on_packet: true,
        }));
        dispatcher.subscribe(Recorder::new("good", &log));

        let err = dispatcher
            .dispatch(&Envelope::GamePacket(Arc::new(GamePacket::default())))
            .await
            .unwrap_err();

        assert!(matches!(err, KickoffError::Dispatch { kind: MessageKind::GamePacket, .. }));
        assert!(!events(&log).contains(&"good:packet".to_string()));
    }

    #[tokio::test]
    async fn unsubscribe_by_identity() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let dispatcher = Dispatcher::new();
        let a: Arc<dyn Listener> = Recorder::new("a", &log);
        let b: Arc<dyn Listener> = Recorder::new("b", &log);
        dispatcher.subscribe(a.clone());
        dispatcher.subscribe(b.clone());

        assert!(dispatcher.unsubscribe(&a));
        assert!(!dispatcher.unsubscribe(&a));
        assert_eq!(dispatcher.len(), 1);

        dispatcher.dispatch(&Envelope::InitComplete).await.unwrap();
        assert_eq!(events(&log), vec!["b:any(InitComplete)"]);
    }

    /// Subscribes another listener from inside a callback.
    struct Spawner {
        dispatcher: Arc<Dispatcher>,
        log: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Listener for Spawner {
        async fn on_match_config(&self, _config: &Arc<MatchConfiguration>) -> anyhow::Result<()> {
            self.dispatcher.subscribe(Recorder::new("late", &self.log));
            Ok(())
        }
    }

    #[tokio::test]
    async fn subscribing_during_dispatch_applies_to_next_frame() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let dispatcher = Arc::new(Dispatcher::new());
        let spawner = Spawner { dispatcher: dispatcher.clone(), log: log.clone() };
        dispatcher.subscribe(Arc::new(spawner));

        let config = Arc::new(MatchConfiguration::default());
        dispatcher.dispatch(&Envelope::MatchConfig(config.clone())).await.unwrap();
        assert!(events(&log).is_empty());

        dispatcher.dispatch(&Envelope::MatchConfig(config)).await.unwrap();
        assert_eq!(events(&log), vec!["late:any(MatchConfig)", "late:config"]);
    }
}
