//! Payloads sent by agents to the host

use bytes::{Bytes, BytesMut};

use super::math::{Color, Rotator, Vector3};
use super::wire::{WireData, wire_struct};
use crate::{KickoffError, Result};

/// First message on every connection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionSettings {
    /// Empty for connections that only start or observe matches.
    pub agent_id: String,
    pub wants_ball_predictions: bool,
    pub wants_comms: bool,
    pub close_between_matches: bool,
}

/// Controller inputs for one car. Axes are in `[-1, 1]`, throttle included.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ControllerState {
    pub throttle: f32,
    pub steer: f32,
    pub pitch: f32,
    pub yaw: f32,
    pub roll: f32,
    pub jump: bool,
    pub boost: bool,
    pub handbrake: bool,
    pub use_item: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PlayerInput {
    pub player_index: u32,
    pub controller_state: ControllerState,
}

/// Cosmetic item ids for a car.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlayerLoadout {
    pub team_color_id: u32,
    pub custom_color_id: u32,
    pub car_id: u32,
    pub decal_id: u32,
    pub wheels_id: u32,
    pub boost_id: u32,
    pub antenna_id: u32,
    pub hat_id: u32,
    pub paint_finish_id: u32,
    pub custom_finish_id: u32,
    pub engine_audio_id: u32,
    pub trails_id: u32,
    pub goal_explosion_id: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SetLoadout {
    pub index: u32,
    pub loadout: PlayerLoadout,
}

/// A message between agents, relayed by the host.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MatchComm {
    /// Index of the sender.
    pub index: u32,
    pub team: u32,
    pub team_only: bool,
    /// Shown in quick chat when present.
    pub display: Option<String>,
    pub content: Bytes,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RenderType {
    Line3D { start: Vector3, end: Vector3, color: Color },
    PolyLine3D { points: Vec<Vector3>, color: Color },
    String2D { text: String, x: f32, y: f32, scale: f32, foreground: Color },
    String3D { text: String, anchor: Vector3, scale: f32, foreground: Color },
}

impl WireData for RenderType {
    fn write(&self, buf: &mut BytesMut) {
        match self {
            RenderType::Line3D { start, end, color } => {
                0u8.write(buf);
                start.write(buf);
                end.write(buf);
                color.write(buf);
            }
            RenderType::PolyLine3D { points, color } => {
                1u8.write(buf);
                points.write(buf);
                color.write(buf);
            }
            RenderType::String2D { text, x, y, scale, foreground } => {
                2u8.write(buf);
                text.write(buf);
                x.write(buf);
                y.write(buf);
                scale.write(buf);
                foreground.write(buf);
            }
            RenderType::String3D { text, anchor, scale, foreground } => {
                3u8.write(buf);
                text.write(buf);
                anchor.write(buf);
                scale.write(buf);
                foreground.write(buf);
            }
        }
    }

    fn read(buf: &mut Bytes) -> Result<Self> {
        match u8::read(buf)? {
            0 => Ok(RenderType::Line3D {
                start: WireData::read(buf)?,
                end: WireData::read(buf)?,
                color: WireData::read(buf)?,
            }),
            1 => Ok(RenderType::PolyLine3D {
                points: WireData::read(buf)?,
                color: WireData::read(buf)?,
            }),
            2 => Ok(RenderType::String2D {
                text: WireData::read(buf)?,
                x: WireData::read(buf)?,
                y: WireData::read(buf)?,
                scale: WireData::read(buf)?,
                foreground: WireData::read(buf)?,
            }),
            3 => Ok(RenderType::String3D {
                text: WireData::read(buf)?,
                anchor: WireData::read(buf)?,
                scale: WireData::read(buf)?,
                foreground: WireData::read(buf)?,
            }),
            other => Err(KickoffError::parse("RenderType", format!("unknown variant {}", other))),
        }
    }
}

/// A set of debug render items. Reusing an id replaces the previous group.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderGroup {
    pub id: i32,
    pub render_messages: Vec<RenderType>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RemoveRenderGroup {
    pub id: i32,
}

/// State-setting physics. `None` fields are left unchanged by the host.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DesiredPhysics {
    pub location: Option<Vector3>,
    pub rotation: Option<Rotator>,
    pub velocity: Option<Vector3>,
    pub angular_velocity: Option<Vector3>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DesiredBallState {
    pub physics: DesiredPhysics,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DesiredCarState {
    pub physics: Option<DesiredPhysics>,
    pub boost_amount: Option<f32>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DesiredGameInfo {
    pub world_gravity_z: Option<f32>,
    pub game_speed: Option<f32>,
    pub paused: Option<bool>,
}

/// A state-setting request. Only legal when state setting is enabled for the match.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DesiredGameState {
    pub ball_states: Vec<DesiredBallState>,
    pub car_states: Vec<DesiredCarState>,
    pub game_info: Option<DesiredGameInfo>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StopCommand {
    pub shutdown_server: bool,
}

/// Start a match from a configuration file readable by the host.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StartCommand {
    pub config_path: String,
}

wire_struct!(ConnectionSettings {
    agent_id,
    wants_ball_predictions,
    wants_comms,
    close_between_matches,
});
wire_struct!(ControllerState {
    throttle,
    steer,
    pitch,
    yaw,
    roll,
    jump,
    boost,
    handbrake,
    use_item,
});
wire_struct!(PlayerInput { player_index, controller_state });
wire_struct!(PlayerLoadout {
    team_color_id,
    custom_color_id,
    car_id,
    decal_id,
    wheels_id,
    boost_id,
    antenna_id,
    hat_id,
    paint_finish_id,
    custom_finish_id,
    engine_audio_id,
    trails_id,
    goal_explosion_id,
});
wire_struct!(SetLoadout { index, loadout });
wire_struct!(MatchComm { index, team, team_only, display, content });
wire_struct!(RenderGroup { id, render_messages });
wire_struct!(RemoveRenderGroup { id });
wire_struct!(DesiredPhysics { location, rotation, velocity, angular_velocity });
wire_struct!(DesiredBallState { physics });
wire_struct!(DesiredCarState { physics, boost_amount });
wire_struct!(DesiredGameInfo { world_gravity_z, game_speed, paused });
wire_struct!(DesiredGameState { ball_states, car_states, game_info });
wire_struct!(StopCommand { shutdown_server });
wire_struct!(StartCommand { config_path });
