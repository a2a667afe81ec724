//! Test utilities: a scripted simulation host on a loopback socket and
//! session fixtures. Also compiled for benchmarks.

use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::Framed;

use crate::config::ClientConfig;
use crate::protocol::{Envelope, FrameCodec};
use crate::types::{
    BallInfo, BallPrediction, BoostPadState, ConnectionSettings, ControllableInfo,
    ControllableTeamInfo, CustomBot, FieldInfo, GameInfo, GamePacket, MatchConfiguration, Physics,
    PlayerClass, PlayerConfiguration, PlayerInfo, PredictionSlice, ScriptConfiguration, Vector3,
};

/// How long helpers wait for the client before failing the test.
pub const HOST_WAIT: Duration = Duration::from_secs(5);

/// Listening side of a fake host.
pub struct FakeHost {
    listener: TcpListener,
    port: u16,
}

impl FakeHost {
    pub async fn bind() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind loopback listener");
        let port = listener.local_addr().expect("listener address").port();
        Self { listener, port }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Client configuration pointing at this host.
    pub fn config(&self, agent_id: Option<&str>) -> ClientConfig {
        let config = ClientConfig::default()
            .with_port(self.port)
            .with_connection_timeout(Duration::from_secs(5));
        match agent_id {
            Some(id) => config.with_agent_id(id),
            None => config,
        }
    }

    pub async fn accept(&self) -> HostSession {
        let (stream, _) = tokio::time::timeout(HOST_WAIT, self.listener.accept())
            .await
            .expect("client did not connect in time")
            .expect("accept client");
        stream.set_nodelay(true).expect("disable Nagle on host stream");
        HostSession { framed: Framed::new(stream, FrameCodec::new()) }
    }
}

/// One accepted client.
pub struct HostSession {
    framed: Framed<TcpStream, FrameCodec>,
}

impl HostSession {
    pub async fn recv(&mut self) -> Envelope {
        tokio::time::timeout(HOST_WAIT, self.framed.next())
            .await
            .expect("client sent nothing in time")
            .expect("client closed the stream")
            .expect("client sent a malformed frame")
    }

    /// Next message, or `None` if nothing arrives within `wait` or the
    /// client closed the stream.
    pub async fn try_recv(&mut self, wait: Duration) -> Option<Envelope> {
        match tokio::time::timeout(wait, self.framed.next()).await {
            Ok(Some(Ok(envelope))) => Some(envelope),
            _ => None,
        }
    }

    /// Wait until the client closes its side of the stream.
    pub async fn expect_closed(&mut self) {
        loop {
            match tokio::time::timeout(HOST_WAIT, self.framed.next())
                .await
                .expect("client did not close the stream in time")
            {
                None | Some(Err(_)) => return,
                Some(Ok(_)) => continue,
            }
        }
    }

    pub async fn send(&mut self, envelope: Envelope) {
        self.framed.send(envelope).await.expect("send to client");
    }

    /// Write bytes directly, bypassing the codec.
    pub async fn send_raw(&mut self, bytes: &[u8]) {
        let stream = self.framed.get_mut();
        stream.write_all(bytes).await.expect("raw write to client");
        stream.flush().await.expect("flush raw write");
    }

    pub async fn expect_handshake(&mut self) -> ConnectionSettings {
        match self.recv().await {
            Envelope::ConnectionSettings(settings) => settings,
            other => panic!("expected connection settings, got {:?}", other.kind()),
        }
    }

    /// Drop the stream from the host side.
    pub fn close(self) {
        drop(self.framed);
    }
}

/// Match with one custom bot per name, alternating teams.
pub fn match_config(bot_names: &[&str]) -> MatchConfiguration {
    MatchConfiguration {
        game_map_upk: "Stadium_P".to_string(),
        player_configurations: bot_names
            .iter()
            .enumerate()
            .map(|(i, name)| PlayerConfiguration {
                variety: PlayerClass::CustomBot(CustomBot {
                    name: name.to_string(),
                    agent_id: format!("test/{}", name),
                    loadout: None,
                }),
                team: (i % 2) as u32,
                player_id: i as u32 + 1,
            })
            .collect(),
        script_configurations: vec![ScriptConfiguration {
            name: "Observer".to_string(),
            agent_id: "test/observer".to_string(),
        }],
        ..Default::default()
    }
}

pub fn team_info(team: u32, indices: &[u32]) -> ControllableTeamInfo {
    ControllableTeamInfo {
        team,
        controllables: indices
            .iter()
            .map(|&index| ControllableInfo { index, identifier: index as i32 + 1 })
            .collect(),
    }
}

pub fn packet(frame_num: u32) -> Arc<GamePacket> {
    Arc::new(GamePacket {
        game_info: GameInfo { frame_num, is_round_active: true, ..Default::default() },
        ..Default::default()
    })
}

/// The three session-defining messages.
pub fn session_messages(config: MatchConfiguration, team: ControllableTeamInfo) -> [Envelope; 3] {
    [
        Envelope::MatchConfig(Arc::new(config)),
        Envelope::FieldInfo(Arc::new(FieldInfo::default())),
        Envelope::ControllableTeamInfo(Arc::new(team)),
    ]
}

/// A packet sized like a full 3v3 match.
pub fn full_packet(frame_num: u32) -> GamePacket {
    let players = (0..6)
        .map(|i| PlayerInfo {
            name: format!("Player {}", i),
            team: i % 2,
            physics: Physics {
                location: Vector3 { x: i as f32 * 100.0, y: -2000.0, z: 17.0 },
                ..Default::default()
            },
            boost: 33.0,
            is_demolished: false,
            has_wheel_contact: true,
        })
        .collect();
    GamePacket {
        game_info: GameInfo { frame_num, is_round_active: true, ..Default::default() },
        players,
        balls: vec![BallInfo::default()],
        boost_pad_states: vec![BoostPadState { is_active: true, timer: 0.0 }; 34],
    }
}

/// Six seconds of ball path at 120 slices per second.
pub fn full_prediction() -> BallPrediction {
    BallPrediction {
        slices: (0..720)
            .map(|i| PredictionSlice {
                game_seconds: i as f32 / 120.0,
                physics: Physics::default(),
            })
            .collect(),
    }
}
