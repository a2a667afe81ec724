//! Connection to the simulation host.
//!
//! A [`Connection`] owns the single TCP stream to the host, runs the
//! connect-with-retry handshake, decodes incoming frames and broadcasts them
//! to the registered [`Listener`]s, and serializes outgoing frames from any
//! number of tasks.
//!
//! ```text
//! Disconnected -> Connecting -> Connected -> Running -> Disconnecting -> Disconnected
//! ```
//!
//! `Connection` is a cheap handle; clones share the same stream.
//!
//! ```rust,no_run
//! use kickoff::{ClientConfig, Connection};
//!
//! # async fn example() -> kickoff::Result<()> {
//! let connection = Connection::new(ClientConfig::from_env()?);
//! connection.connect_as_match_host(false, false).await?;
//! let handle = connection.run_in_background()?;
//!
//! connection.stop_match(false).await?;
//! connection.disconnect().await?;
//! handle.await.ok();
//! # Ok(())
//! # }
//! ```

use futures::{FutureExt, SinkExt, Stream, StreamExt};
use std::net::Ipv4Addr;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_stream::wrappers::WatchStream;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::config::ClientConfig;
use crate::listener::{DispatchOutcome, Dispatcher, Listener};
use crate::protocol::{Envelope, FrameCodec};
use crate::types::{
    ConnectionSettings, DesiredGameState, MatchComm, MatchConfiguration, PlayerInput,
    RemoveRenderGroup, RenderGroup, SetLoadout, StartCommand, StopCommand,
};
use crate::{KickoffError, Result};


/// Pause between connection attempts.
const CONNECT_RETRY_INTERVAL: Duration = Duration::from_millis(100);

/// Time spent retrying before the first warning. Doubles after each warning.
const FIRST_CONNECT_WARNING: Duration = Duration::from_secs(10);

/// How long `disconnect` waits for the run loop before force-stopping it.
pub const DISCONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    /// Stream established, handshake not yet sent.
    Connected,
    /// Handshake sent, messages flowing.
    Running,
    Disconnecting,
}

/// Result of handling one incoming message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiveOutcome {
    /// The host ended the session or the loop was stopped.
    Terminated,
    /// Nothing was available to read.
    NoMessage,
    /// A message was dispatched and more may be queued.
    MoreAvailable,
}

type Reader = FramedRead<OwnedReadHalf, FrameCodec>;
type Writer = FramedWrite<OwnedWriteHalf, FrameCodec>;

struct Inner {
    config: ClientConfig,
    reader: tokio::sync::Mutex<Option<Reader>>,
    /// Held for the whole write of one frame.
    writer: tokio::sync::Mutex<Option<Writer>>,
    state: watch::Sender<ConnectionState>,
    running: watch::Sender<bool>,
    /// Replaced each time a loop starts.
    cancel: Mutex<CancellationToken>,
    dispatcher: Dispatcher,
}

impl Drop for Inner {
    fn drop(&mut self) {
        debug!("Dropping connection");
        self.cancel.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).cancel();
    }
}

/// Handle to the host connection.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<Inner>,
}

/// Marks a message loop as active until dropped.
pub(crate) struct RunningGuard {
    inner: Arc<Inner>,
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.inner.running.send_replace(false);
        debug!("Message loop stopped");
    }
}

impl Connection {
    pub fn new(config: ClientConfig) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let (running, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                config,
                reader: tokio::sync::Mutex::new(None),
                writer: tokio::sync::Mutex::new(None),
                state,
                running,
                cancel: Mutex::new(CancellationToken::new()),
                dispatcher: Dispatcher::new(),
            }),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    /// Stream of state changes, starting with the current state.
    pub fn state_updates(&self) -> impl Stream<Item = ConnectionState> + 'static {
        WatchStream::new(self.inner.state.subscribe())
    }

    pub fn is_connected(&self) -> bool {
        matches!(
            self.state(),
            ConnectionState::Connected | ConnectionState::Running | ConnectionState::Disconnecting
        )
    }

    /// Whether a message loop is currently active.
    pub fn is_running(&self) -> bool {
        *self.inner.running.borrow()
    }

    /// Stop the active message loop. A blocked read is interrupted.
    pub fn stop_running(&self) {
        debug!("Stopping message loop");
        self.cancel_token().cancel();
    }

    pub fn subscribe(&self, listener: Arc<dyn Listener>) {
        self.inner.dispatcher.subscribe(listener);
    }

    pub fn unsubscribe(&self, listener: &Arc<dyn Listener>) -> bool {
        self.inner.dispatcher.unsubscribe(listener)
    }

    fn cancel_token(&self) -> CancellationToken {
        self.inner.cancel.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).clone()
    }

    /// Connect to the host and send the handshake.
    ///
    /// Retries every 100ms until the configured timeout. Calling this while
    /// a connection exists is a no-op.
    pub async fn connect(
        &self,
        agent_id: &str,
        wants_ball_predictions: bool,
        wants_comms: bool,
        outlive_matches: bool,
    ) -> Result<()> {
        let claimed = self.inner.state.send_if_modified(|state| {
            if *state == ConnectionState::Disconnected {
                *state = ConnectionState::Connecting;
                true
            } else {
                false
            }
        });
        if !claimed {
            debug!(state = ?self.state(), "Already connected, ignoring connect");
            return Ok(());
        }

        let settings = ConnectionSettings {
            agent_id: agent_id.to_owned(),
            wants_ball_predictions,
            wants_comms,
            close_between_matches: !outlive_matches,
        };

        if let Err(e) = self.open(settings).await {
            self.close_stream().await;
            return Err(e);
        }
        self.inner.dispatcher.notify_connect().await
    }

    /// Connect as a match host: no agent id, kept alive between matches.
    pub async fn connect_as_match_host(
        &self,
        wants_ball_predictions: bool,
        wants_comms: bool,
    ) -> Result<()> {
        self.connect("", wants_ball_predictions, wants_comms, true).await
    }

    async fn open(&self, settings: ConnectionSettings) -> Result<()> {
        let port = self.inner.config.port;
        let stream = self.establish(port).await?;
        stream.set_nodelay(true)?;
        let local_port = stream.local_addr().map(|addr| addr.port()).ok();

        let (read, write) = stream.into_split();
        *self.inner.reader.lock().await = Some(FramedRead::new(read, FrameCodec::new()));
        *self.inner.writer.lock().await = Some(FramedWrite::new(write, FrameCodec::new()));
        self.inner.state.send_replace(ConnectionState::Connected);
        info!(port, ?local_port, agent_id = %settings.agent_id, "Connected to host");

        self.send(Envelope::ConnectionSettings(settings)).await?;
        self.inner.state.send_replace(ConnectionState::Running);
        Ok(())
    }

    async fn establish(&self, port: u16) -> Result<TcpStream> {
        let timeout = self.inner.config.connection_timeout;
        let started = Instant::now();
        let mut next_warning = FIRST_CONNECT_WARNING;

        loop {
            match TcpStream::connect((Ipv4Addr::LOCALHOST, port)).await {
                Ok(stream) => return Ok(stream),
                Err(e) => {
                    trace!(port, error = %e, "Connection attempt failed");
                    let elapsed = started.elapsed();
                    if elapsed >= timeout {
                        return Err(KickoffError::ConnectionTimeout { port, duration: timeout });
                    }
                    if elapsed >= next_warning {
                        next_warning *= 2;
                        warn!(port, ?elapsed, "Failing to connect to host, trying again");
                    }
                    tokio::time::sleep(CONNECT_RETRY_INTERVAL).await;
                }
            }
        }
    }

    /// Read and dispatch at most one message.
    ///
    /// Without `blocking`, returns [`ReceiveOutcome::NoMessage`] when no
    /// complete frame can be read right away. Read, decode and listener
    /// failures close the connection and are returned as errors.
    pub async fn receive_next(&self, blocking: bool) -> Result<ReceiveOutcome> {
        let cancel = self.cancel_token();
        if cancel.is_cancelled() {
            return Ok(ReceiveOutcome::Terminated);
        }

        let next = {
            let mut guard = self.inner.reader.lock().await;
            let reader = guard.as_mut().ok_or(KickoffError::NotConnected)?;

            if blocking || FrameCodec::has_complete_frame(reader.read_buffer()) {
                tokio::select! {
                    _ = cancel.cancelled() => return Ok(ReceiveOutcome::Terminated),
                    next = reader.next() => next,
                }
            } else {
                match reader.next().now_or_never() {
                    Some(next) => next,
                    None => return Ok(ReceiveOutcome::NoMessage),
                }
            }
        };

        let envelope = match next {
            Some(Ok(envelope)) => envelope,
            Some(Err(e)) if e.is_poll_timeout() => return Ok(ReceiveOutcome::NoMessage),
            Some(Err(e)) => {
                error!(error = %e, "Failed to read message from host");
                self.fail().await;
                return Err(e);
            }
            None if self.state() == ConnectionState::Disconnecting => {
                debug!("Host closed the stream after disconnect request");
                return Ok(ReceiveOutcome::Terminated);
            }
            None => {
                error!("Host closed the stream unexpectedly");
                self.fail().await;
                return Err(KickoffError::ConnectionClosed);
            }
        };

        let kind = envelope.kind();
        trace!(%kind, "Received message");

        match self.inner.dispatcher.dispatch(&envelope).await {
            Ok(DispatchOutcome::Continue) => Ok(ReceiveOutcome::MoreAvailable),
            Ok(DispatchOutcome::Disconnect) => {
                self.close_stream().await;
                Ok(ReceiveOutcome::Terminated)
            }
            Err(e) => {
                error!(%kind, error = %e, "Unexpected error while handling message");
                self.fail().await;
                Err(e)
            }
        }
    }

    /// Mark a message loop as active. Fails if one already is.
    pub(crate) fn begin_running(&self) -> Result<RunningGuard> {
        if !self.is_connected() {
            return Err(KickoffError::NotConnected);
        }

        let started = self.inner.running.send_if_modified(|running| {
            if *running {
                false
            } else {
                *running = true;
                true
            }
        });
        if !started {
            return Err(KickoffError::AlreadyRunning);
        }

        *self.inner.cancel.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) =
            CancellationToken::new();
        debug!("Message loop started");
        Ok(RunningGuard { inner: self.inner.clone() })
    }

    /// Handle incoming messages until the session terminates.
    pub async fn run(&self) -> Result<()> {
        let guard = self.begin_running()?;
        self.run_loop(guard).await
    }

    /// Like [`run`](Self::run), on a spawned task.
    ///
    /// Connection and loop checks happen before this returns.
    pub fn run_in_background(&self) -> Result<JoinHandle<Result<()>>> {
        let guard = self.begin_running()?;
        let connection = self.clone();
        Ok(tokio::spawn(async move { connection.run_loop(guard).await }))
    }

    async fn run_loop(&self, _guard: RunningGuard) -> Result<()> {
        loop {
            if self.receive_next(true).await? == ReceiveOutcome::Terminated {
                return Ok(());
            }
        }
    }

    /// Send the disconnect signal and tear the connection down.
    ///
    /// Waits up to five seconds for the message loop to end, then stops it.
    /// The stream is always closed and listeners notified.
    pub async fn disconnect(&self) -> Result<()> {
        let claimed = self.inner.state.send_if_modified(|state| {
            if matches!(state, ConnectionState::Connected | ConnectionState::Running) {
                *state = ConnectionState::Disconnecting;
                true
            } else {
                false
            }
        });
        if !claimed {
            warn!("Asked to disconnect but was already disconnected");
            return Ok(());
        }

        if let Err(e) = self.send(Envelope::DisconnectSignal).await {
            warn!(error = %e, "Failed to send disconnect signal");
        }

        let mut running = self.inner.running.subscribe();
        let stopped =
            tokio::time::timeout(DISCONNECT_TIMEOUT, running.wait_for(|running| !*running))
                .await
                .is_ok();
        if !stopped {
            error!("Host is not responding to the disconnect request");
            self.stop_running();
        }

        self.close_stream().await;
        info!("Disconnected from host");
        self.inner.dispatcher.notify_disconnect().await
    }

    /// Drop both stream halves. Safe to call more than once.
    async fn close_stream(&self) {
        let reader = self.inner.reader.lock().await.take();
        let writer = self.inner.writer.lock().await.take();
        drop(reader);
        if let Some(mut writer) = writer {
            if let Err(e) = SinkExt::<Envelope>::close(&mut writer).await {
                debug!(error = %e, "Error while closing stream");
            }
        }
        self.inner.state.send_replace(ConnectionState::Disconnected);
    }

    /// Tear down after a fatal read or dispatch error.
    async fn fail(&self) {
        self.close_stream().await;
        if let Err(e) = self.inner.dispatcher.notify_disconnect().await {
            error!(error = %e, "Listener failed during disconnect notification");
        }
    }

    /// Send one message to the host.
    ///
    /// Frames from concurrent callers are never interleaved. A message too
    /// large for one frame is dropped and reported; the connection stays
    /// usable.
    pub async fn send(&self, envelope: Envelope) -> Result<()> {
        let kind = envelope.kind();
        let mut guard = self.inner.writer.lock().await;
        let writer = guard.as_mut().ok_or(KickoffError::NotConnected)?;

        match writer.send(envelope).await {
            Ok(()) => {
                trace!(%kind, "Sent message");
                Ok(())
            }
            Err(e @ KickoffError::EncodingTooLarge { .. }) => {
                error!(%kind, error = %e, "Dropping message that does not fit in one frame");
                Err(e)
            }
            Err(e) => {
                error!(%kind, error = %e, "Failed to send message");
                Err(e)
            }
        }
    }

    /// Signal the host that this agent finished initializing.
    pub async fn send_init_complete(&self) -> Result<()> {
        self.send(Envelope::InitComplete).await
    }

    pub async fn send_set_loadout(&self, set_loadout: SetLoadout) -> Result<()> {
        self.send(Envelope::SetLoadout(set_loadout)).await
    }

    pub async fn send_match_comm(&self, comm: MatchComm) -> Result<()> {
        self.send(Envelope::MatchComm(comm)).await
    }

    pub async fn send_player_input(&self, input: PlayerInput) -> Result<()> {
        self.send(Envelope::PlayerInput(input)).await
    }

    pub async fn send_game_state(&self, state: DesiredGameState) -> Result<()> {
        self.send(Envelope::DesiredGameState(state)).await
    }

    pub async fn send_render_group(&self, group: RenderGroup) -> Result<()> {
        self.send(Envelope::RenderGroup(group)).await
    }

    pub async fn send_remove_render_group(&self, id: i32) -> Result<()> {
        self.send(Envelope::RemoveRenderGroup(RemoveRenderGroup { id })).await
    }

    /// Ask the host to stop the current match, optionally shutting itself down.
    pub async fn stop_match(&self, shutdown_server: bool) -> Result<()> {
        self.send(Envelope::StopCommand(StopCommand { shutdown_server })).await
    }

    /// Start a match from a configuration, then signal init-complete.
    pub async fn start_match(&self, config: MatchConfiguration) -> Result<()> {
        self.send(Envelope::MatchConfiguration(Arc::new(config))).await?;
        info!("Starting match");
        self.send_init_complete().await
    }

    /// Start a match from a configuration file the host reads itself.
    pub async fn start_match_from_path<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let metadata =
            std::fs::metadata(path).map_err(|e| KickoffError::file_error(path.to_path_buf(), e))?;
        if !metadata.is_file() {
            return Err(KickoffError::file_error(
                path.to_path_buf(),
                std::io::Error::other("match config path is not a file (maybe a directory?)"),
            ));
        }

        let config_path = path.to_string_lossy().into_owned();
        self.send(Envelope::StartCommand(StartCommand { config_path })).await?;
        info!(path = %path.display(), "Starting match");
        self.send_init_complete().await
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("port", &self.inner.config.port)
            .field("state", &self.state())
            .field("running", &self.is_running())
            .field("listeners", &self.inner.dispatcher.len())
            .finish()
    }
}
