//! Typed message envelope and its payload encoding

use bytes::{Buf, Bytes, BytesMut};
use std::fmt;
use std::sync::Arc;

use crate::Result;
use crate::types::{
    BallPrediction, ConnectionSettings, ControllableTeamInfo, DesiredGameState, FieldInfo,
    GamePacket, MatchComm, MatchConfiguration, PlayerInput, RemoveRenderGroup, RenderGroup,
    RenderingStatus, SetLoadout, StartCommand, StopCommand, WireData,
};

/// Message kind discriminant, written as the first payload byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageKind {
    ConnectionSettings = 1,
    InitComplete = 2,
    SetLoadout = 3,
    MatchComm = 4,
    PlayerInput = 5,
    DesiredGameState = 6,
    RenderGroup = 7,
    RemoveRenderGroup = 8,
    StopCommand = 9,
    StartCommand = 10,
    /// Outbound: a match configuration used to start a match.
    MatchConfiguration = 11,
    DisconnectSignal = 12,
    GamePacket = 13,
    FieldInfo = 14,
    /// Inbound: the configuration of the session being joined.
    MatchConfig = 15,
    BallPrediction = 16,
    ControllableTeamInfo = 17,
    RenderingStatus = 18,
    /// Empty payload.
    None = 0,
    /// A kind byte this client does not know.
    Unknown = 255,
}

impl MessageKind {
    /// Whether receiving this kind ends the session.
    pub fn is_disconnect(self) -> bool {
        matches!(self, MessageKind::DisconnectSignal | MessageKind::None | MessageKind::Unknown)
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// One complete message exchanged with the host.
///
/// Large session and tick payloads are reference counted so listeners and
/// agent workers can hold on to them without copying.
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    ConnectionSettings(ConnectionSettings),
    InitComplete,
    SetLoadout(SetLoadout),
    MatchComm(MatchComm),
    PlayerInput(PlayerInput),
    DesiredGameState(DesiredGameState),
    RenderGroup(RenderGroup),
    RemoveRenderGroup(RemoveRenderGroup),
    StopCommand(StopCommand),
    StartCommand(StartCommand),
    MatchConfiguration(Arc<MatchConfiguration>),
    DisconnectSignal,
    GamePacket(Arc<GamePacket>),
    FieldInfo(Arc<FieldInfo>),
    MatchConfig(Arc<MatchConfiguration>),
    BallPrediction(Arc<BallPrediction>),
    ControllableTeamInfo(Arc<ControllableTeamInfo>),
    RenderingStatus(RenderingStatus),
    /// Empty payload, no kind present.
    None,
    /// Unrecognized kind byte. The body is not interpreted.
    ///
    /// Produced only by decoding. Encoding one with an assigned tag would
    /// put a different kind on the wire.
    Unknown(u8),
}

impl Envelope {
    pub fn kind(&self) -> MessageKind {
        match self {
            Envelope::ConnectionSettings(_) => MessageKind::ConnectionSettings,
            Envelope::InitComplete => MessageKind::InitComplete,
            Envelope::SetLoadout(_) => MessageKind::SetLoadout,
            Envelope::MatchComm(_) => MessageKind::MatchComm,
            Envelope::PlayerInput(_) => MessageKind::PlayerInput,
            Envelope::DesiredGameState(_) => MessageKind::DesiredGameState,
            Envelope::RenderGroup(_) => MessageKind::RenderGroup,
            Envelope::RemoveRenderGroup(_) => MessageKind::RemoveRenderGroup,
            Envelope::StopCommand(_) => MessageKind::StopCommand,
            Envelope::StartCommand(_) => MessageKind::StartCommand,
            Envelope::MatchConfiguration(_) => MessageKind::MatchConfiguration,
            Envelope::DisconnectSignal => MessageKind::DisconnectSignal,
            Envelope::GamePacket(_) => MessageKind::GamePacket,
            Envelope::FieldInfo(_) => MessageKind::FieldInfo,
            Envelope::MatchConfig(_) => MessageKind::MatchConfig,
            Envelope::BallPrediction(_) => MessageKind::BallPrediction,
            Envelope::ControllableTeamInfo(_) => MessageKind::ControllableTeamInfo,
            Envelope::RenderingStatus(_) => MessageKind::RenderingStatus,
            Envelope::None => MessageKind::None,
            Envelope::Unknown(_) => MessageKind::Unknown,
        }
    }

    /// Write the kind byte and body.
    pub fn encode_payload(&self, buf: &mut BytesMut) {
        match self {
            Envelope::None => return,
            Envelope::Unknown(tag) => {
                debug_assert!(
                    *tag > MessageKind::RenderingStatus as u8,
                    "tag {} belongs to a known kind",
                    tag
                );
                tag.write(buf);
                return;
            }
            _ => (self.kind() as u8).write(buf),
        }

        match self {
            Envelope::ConnectionSettings(m) => m.write(buf),
            Envelope::SetLoadout(m) => m.write(buf),
            Envelope::MatchComm(m) => m.write(buf),
            Envelope::PlayerInput(m) => m.write(buf),
            Envelope::DesiredGameState(m) => m.write(buf),
            Envelope::RenderGroup(m) => m.write(buf),
            Envelope::RemoveRenderGroup(m) => m.write(buf),
            Envelope::StopCommand(m) => m.write(buf),
            Envelope::StartCommand(m) => m.write(buf),
            Envelope::MatchConfiguration(m) | Envelope::MatchConfig(m) => m.write(buf),
            Envelope::GamePacket(m) => m.write(buf),
            Envelope::FieldInfo(m) => m.write(buf),
            Envelope::BallPrediction(m) => m.write(buf),
            Envelope::ControllableTeamInfo(m) => m.write(buf),
            Envelope::RenderingStatus(m) => m.write(buf),
            Envelope::InitComplete
            | Envelope::DisconnectSignal
            | Envelope::None
            | Envelope::Unknown(_) => {}
        }
    }

    /// Parse a complete payload. Trailing bytes after a known body are
    /// tolerated so newer hosts can append fields.
    pub fn decode_payload(mut payload: Bytes) -> Result<Self> {
        if !payload.has_remaining() {
            return Ok(Envelope::None);
        }

        let buf = &mut payload;
        let envelope = match u8::read(buf)? {
            1 => Envelope::ConnectionSettings(WireData::read(buf)?),
            2 => Envelope::InitComplete,
            3 => Envelope::SetLoadout(WireData::read(buf)?),
            4 => Envelope::MatchComm(WireData::read(buf)?),
            5 => Envelope::PlayerInput(WireData::read(buf)?),
            6 => Envelope::DesiredGameState(WireData::read(buf)?),
            7 => Envelope::RenderGroup(WireData::read(buf)?),
            8 => Envelope::RemoveRenderGroup(WireData::read(buf)?),
            9 => Envelope::StopCommand(WireData::read(buf)?),
            10 => Envelope::StartCommand(WireData::read(buf)?),
            11 => Envelope::MatchConfiguration(Arc::new(WireData::read(buf)?)),
            12 => Envelope::DisconnectSignal,
            13 => Envelope::GamePacket(Arc::new(WireData::read(buf)?)),
            14 => Envelope::FieldInfo(Arc::new(WireData::read(buf)?)),
            15 => Envelope::MatchConfig(Arc::new(WireData::read(buf)?)),
            16 => Envelope::BallPrediction(Arc::new(WireData::read(buf)?)),
            17 => Envelope::ControllableTeamInfo(Arc::new(WireData::read(buf)?)),
            18 => Envelope::RenderingStatus(WireData::read(buf)?),
            other => Envelope::Unknown(other),
        };
        Ok(envelope)
    }
}
