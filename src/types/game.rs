//! Simulation state payloads sent by the host

use super::math::{Rotator, Vector3};
use super::wire::wire_struct;

/// Rigid-body state of a car or ball.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Physics {
    pub location: Vector3,
    pub rotation: Rotator,
    pub velocity: Vector3,
    pub angular_velocity: Vector3,
}

/// Per-player state within a [`GamePacket`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlayerInfo {
    pub name: String,
    pub team: u32,
    pub physics: Physics,
    pub boost: f32,
    pub is_demolished: bool,
    pub has_wheel_contact: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BallInfo {
    pub physics: Physics,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BoostPadState {
    pub is_active: bool,
    pub timer: f32,
}

/// Match clock and flow.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GameInfo {
    pub seconds_elapsed: f32,
    pub game_time_remaining: f32,
    pub frame_num: u32,
    pub is_overtime: bool,
    pub is_round_active: bool,
}

/// The dynamic simulation state, sent once per host tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GamePacket {
    pub game_info: GameInfo,
    pub players: Vec<PlayerInfo>,
    pub balls: Vec<BallInfo>,
    pub boost_pad_states: Vec<BoostPadState>,
}

impl GamePacket {
    /// The simulation frame this packet describes.
    pub fn frame_num(&self) -> u32 {
        self.game_info.frame_num
    }
}

/// One predicted future ball state.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PredictionSlice {
    pub game_seconds: f32,
    pub physics: Physics,
}

/// Predicted ball path over the next few seconds.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BallPrediction {
    pub slices: Vec<PredictionSlice>,
}

impl BallPrediction {
    /// First slice at or after `game_seconds`.
    pub fn slice_at(&self, game_seconds: f32) -> Option<&PredictionSlice> {
        self.slices.iter().find(|slice| slice.game_seconds >= game_seconds)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BoostPad {
    pub location: Vector3,
    pub is_full_boost: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GoalInfo {
    pub team_num: u32,
    pub location: Vector3,
    pub direction: Vector3,
    pub width: f32,
    pub height: f32,
}

/// Static arena layout, sent once per session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldInfo {
    pub boost_pads: Vec<BoostPad>,
    pub goals: Vec<GoalInfo>,
}

/// Whether debug rendering is currently allowed for an agent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderingStatus {
    pub index: u32,
    pub is_bot: bool,
    pub status: bool,
}

wire_struct!(Physics { location, rotation, velocity, angular_velocity });
wire_struct!(PlayerInfo { name, team, physics, boost, is_demolished, has_wheel_contact });
wire_struct!(BallInfo { physics });
wire_struct!(BoostPadState { is_active, timer });
wire_struct!(GameInfo {
    seconds_elapsed,
    game_time_remaining,
    frame_num,
    is_overtime,
    is_round_active
});
wire_struct!(GamePacket { game_info, players, balls, boost_pad_states });
wire_struct!(PredictionSlice { game_seconds, physics });
wire_struct!(BallPrediction { slices });
wire_struct!(BoostPad { location, is_full_boost });
wire_struct!(GoalInfo { team_num, location, direction, width, height });
wire_struct!(FieldInfo { boost_pads, goals });
wire_struct!(RenderingStatus { index, is_bot, status });
