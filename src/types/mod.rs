//! Typed message payloads.
//!
//! Every payload type implements [`WireData`], a little-endian binary
//! encoding used inside the length-prefixed frames of
//! [`crate::protocol::FrameCodec`].
//!
//! ## Layout
//!
//! - [`game`]: per-tick simulation state ([`GamePacket`], [`BallPrediction`])
//!   and static arena data ([`FieldInfo`])
//! - [`match_settings`]: session-defining messages ([`MatchConfiguration`],
//!   [`ControllableTeamInfo`])
//! - [`commands`]: everything an agent sends ([`PlayerInput`],
//!   [`RenderGroup`], [`DesiredGameState`], ...)
//!
//! ## Usage Example
//!
//! ```rust
//! use bytes::BytesMut;
//! use kickoff::types::{ControllerState, PlayerInput, WireData};
//!
//! let input = PlayerInput {
//!     player_index: 0,
//!     controller_state: ControllerState { throttle: 1.0, boost: true, ..Default::default() },
//! };
//!
//! let mut buf = BytesMut::new();
//! input.write(&mut buf);
//! let decoded = PlayerInput::read(&mut buf.freeze()).unwrap();
//! assert_eq!(decoded, input);
//! ```

pub mod commands;
pub mod game;
pub mod match_settings;
mod math;
mod wire;

pub use commands::{
    ConnectionSettings, ControllerState, DesiredBallState, DesiredCarState, DesiredGameInfo,
    DesiredGameState, DesiredPhysics, MatchComm, PlayerInput, PlayerLoadout, RemoveRenderGroup,
    RenderGroup, RenderType, SetLoadout, StartCommand, StopCommand,
};
pub use game::{
    BallInfo, BallPrediction, BoostPad, BoostPadState, FieldInfo, GameInfo, GamePacket, GoalInfo,
    Physics, PlayerInfo, PredictionSlice, RenderingStatus,
};
pub use match_settings::{
    ControllableInfo, ControllableTeamInfo, CustomBot, MatchConfiguration, PlayerClass,
    PlayerConfiguration, ScriptConfiguration,
};
pub use math::{Color, Rotator, Vector3};
pub use wire::WireData;
