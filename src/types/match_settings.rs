//! Session-defining payloads: match configuration and controllable agents

use bytes::{Bytes, BytesMut};

use super::commands::PlayerLoadout;
use super::wire::{WireData, wire_struct};
use crate::{KickoffError, Result};

/// A bot run by an external agent process.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CustomBot {
    pub name: String,
    pub agent_id: String,
    pub loadout: Option<PlayerLoadout>,
}

/// Who drives a car.
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerClass {
    Human,
    Psyonix { skill: u8 },
    CustomBot(CustomBot),
}

impl PlayerClass {
    pub fn as_custom_bot(&self) -> Option<&CustomBot> {
        match self {
            PlayerClass::CustomBot(bot) => Some(bot),
            _ => None,
        }
    }
}

impl WireData for PlayerClass {
    fn write(&self, buf: &mut BytesMut) {
        match self {
            PlayerClass::Human => 0u8.write(buf),
            PlayerClass::Psyonix { skill } => {
                1u8.write(buf);
                skill.write(buf);
            }
            PlayerClass::CustomBot(bot) => {
                2u8.write(buf);
                bot.write(buf);
            }
        }
    }

    fn read(buf: &mut Bytes) -> Result<Self> {
        match u8::read(buf)? {
            0 => Ok(PlayerClass::Human),
            1 => Ok(PlayerClass::Psyonix { skill: u8::read(buf)? }),
            2 => Ok(PlayerClass::CustomBot(CustomBot::read(buf)?)),
            other => Err(KickoffError::parse("PlayerClass", format!("unknown variant {}", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlayerConfiguration {
    pub variety: PlayerClass,
    pub team: u32,
    pub player_id: u32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScriptConfiguration {
    pub name: String,
    pub agent_id: String,
}

/// The configuration of the current or upcoming match.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MatchConfiguration {
    pub game_map_upk: String,
    pub player_configurations: Vec<PlayerConfiguration>,
    pub script_configurations: Vec<ScriptConfiguration>,
    pub enable_rendering: bool,
    pub enable_state_setting: bool,
    pub auto_start_agents: bool,
}

impl MatchConfiguration {
    /// Name of the custom bot at `index`, if that player is a custom bot.
    pub fn bot_name(&self, index: u32) -> Option<&str> {
        self.player_configurations
            .get(index as usize)
            .and_then(|player| player.variety.as_custom_bot())
            .map(|bot| bot.name.as_str())
    }

    /// Name of the script at `index`.
    pub fn script_name(&self, index: u32) -> Option<&str> {
        self.script_configurations.get(index as usize).map(|script| script.name.as_str())
    }
}

/// One agent this process is allowed to control.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ControllableInfo {
    pub index: u32,
    pub identifier: i32,
}

/// The team and agent indices controlled by this connection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ControllableTeamInfo {
    pub team: u32,
    pub controllables: Vec<ControllableInfo>,
}

impl ControllableTeamInfo {
    pub fn indices(&self) -> impl Iterator<Item = u32> + '_ {
        self.controllables.iter().map(|c| c.index)
    }
}

wire_struct!(CustomBot { name, agent_id, loadout });
wire_struct!(PlayerConfiguration { variety, team, player_id });
wire_struct!(ScriptConfiguration { name, agent_id });
wire_struct!(MatchConfiguration {
    game_map_upk,
    player_configurations,
    script_configurations,
    enable_rendering,
    enable_state_setting,
    auto_start_agents,
});
wire_struct!(ControllableInfo { index, identifier });
wire_struct!(ControllableTeamInfo { team, controllables });

#[cfg(test)]
mod tests {
    use super::*;

    fn custom_bot(name: &str) -> PlayerConfiguration {
        PlayerConfiguration {
            variety: PlayerClass::CustomBot(CustomBot {
                name: name.to_string(),
                agent_id: "test/bot".to_string(),
                loadout: None,
            }),
            team: 0,
            player_id: 1,
        }
    }

    #[test]
    fn bot_name_lookup() {
        let config = MatchConfiguration {
            player_configurations: vec![
                custom_bot("Atba"),
                PlayerConfiguration { variety: PlayerClass::Human, team: 1, player_id: 2 },
            ],
            ..Default::default()
        };

        assert_eq!(config.bot_name(0), Some("Atba"));
        assert_eq!(config.bot_name(1), None, "humans have no bot name");
        assert_eq!(config.bot_name(7), None);
    }

    #[test]
    fn unknown_player_class_is_rejected() {
        let mut buf = Bytes::from_static(&[9]);
        assert!(PlayerClass::read(&mut buf).is_err());
    }
}
