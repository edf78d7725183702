//! Line protocol message definitions
//! These are the wire types for client-server communication.
//!
//! Every message is one text line of `:`-separated fields. Repeated records
//! (players, objects) are `;`-separated sub-records of `,`-separated fields.

use std::fmt;
use std::str::FromStr;

use crate::game::theme::Theme;
use crate::game::MatchPhase;

/// Disguise sentinel used when a player wears nothing
pub const NO_DISGUISE: &str = "NONE";

/// Wire decoding failures
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProtocolError {
    #[error("empty message")]
    Empty,

    #[error("unknown command: {0}")]
    UnknownCommand(String),

    #[error("{command} is missing field `{field}`")]
    MissingField {
        command: &'static str,
        field: &'static str,
    },

    #[error("field `{field}` is not a finite number: {value:?}")]
    InvalidNumber { field: &'static str, value: String },

    #[error("field `{field}` is not a boolean: {value:?}")]
    InvalidBool { field: &'static str, value: String },

    #[error("health out of range: {0}")]
    HealthOutOfRange(String),

    #[error("{record} record has {found} fields, expected {expected}")]
    FieldCount {
        record: &'static str,
        expected: usize,
        found: usize,
    },

    #[error(transparent)]
    Theme(#[from] crate::game::theme::UnknownTheme),
}

/// Messages sent from client to server
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMsg {
    /// Enter the lobby under a display name
    Join { name: String },

    /// Vote for the theme of the next match
    SelectTheme { theme: Theme },

    /// Start the match now
    RequestStart,

    /// Move to an absolute position
    Move { x: f64, y: f64 },

    /// Fire a ray from an origin along a direction
    ShootRay {
        origin_x: f64,
        origin_y: f64,
        dir_x: f64,
        dir_y: f64,
    },

    /// Ask for a fresh random disguise
    ChangeDisguise,

    Chat { text: String },

    /// Close the connection
    Leave,
}

impl FromStr for ClientMsg {
    type Err = ProtocolError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        if line.is_empty() {
            return Err(ProtocolError::Empty);
        }

        let (command, rest) = match line.split_once(':') {
            Some((command, rest)) => (command, Some(rest)),
            None => (line, None),
        };

        match command {
            "JOIN" => {
                let name = rest.map(str::trim).filter(|n| !n.is_empty());
                Ok(ClientMsg::Join {
                    name: name.unwrap_or("Player").to_string(),
                })
            }
            "SELECT_MAP" => {
                let tag = rest.ok_or(ProtocolError::MissingField {
                    command: "SELECT_MAP",
                    field: "theme",
                })?;
                Ok(ClientMsg::SelectTheme { theme: tag.parse()? })
            }
            "START_GAME" => Ok(ClientMsg::RequestStart),
            "MOVE" => {
                let mut fields = Fields::new("MOVE", rest);
                Ok(ClientMsg::Move {
                    x: fields.number("x")?,
                    y: fields.number("y")?,
                })
            }
            "SHOOT_RAY" => {
                let mut fields = Fields::new("SHOOT_RAY", rest);
                Ok(ClientMsg::ShootRay {
                    origin_x: fields.number("originX")?,
                    origin_y: fields.number("originY")?,
                    dir_x: fields.number("dirX")?,
                    dir_y: fields.number("dirY")?,
                })
            }
            "CHANGE_DISGUISE" => Ok(ClientMsg::ChangeDisguise),
            "CHAT" => {
                let text = rest.ok_or(ProtocolError::MissingField {
                    command: "CHAT",
                    field: "text",
                })?;
                Ok(ClientMsg::Chat {
                    text: text.to_string(),
                })
            }
            "LEAVE" | "DISCONNECT" => Ok(ClientMsg::Leave),
            other => Err(ProtocolError::UnknownCommand(other.to_string())),
        }
    }
}

/// Positional field reader over the `:`-separated tail of a command
struct Fields<'a> {
    command: &'static str,
    parts: std::str::Split<'a, char>,
}

impl<'a> Fields<'a> {
    fn new(command: &'static str, rest: Option<&'a str>) -> Self {
        // An absent tail yields no fields at all
        let parts = rest.unwrap_or_default().split(':');
        Self { command, parts }
    }

    fn number(&mut self, field: &'static str) -> Result<f64, ProtocolError> {
        let raw = self
            .parts
            .next()
            .filter(|s| !s.is_empty())
            .ok_or(ProtocolError::MissingField {
                command: self.command,
                field,
            })?;
        parse_number(field, raw)
    }
}

fn parse_number(field: &'static str, raw: &str) -> Result<f64, ProtocolError> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| ProtocolError::InvalidNumber {
            field,
            value: raw.to_string(),
        })
}

fn parse_bool(field: &'static str, raw: &str) -> Result<bool, ProtocolError> {
    match raw {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(ProtocolError::InvalidBool {
            field,
            value: raw.to_string(),
        }),
    }
}

/// Writes a coordinate in its canonical two-decimal form
struct Coord(f64);

impl fmt::Display for Coord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

/// Player record as carried in GAME_STATE
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerRecord {
    pub id: String,
    pub name: String,
    pub is_seeker: bool,
    pub alive: bool,
    pub health: u8,
    pub x: f64,
    pub y: f64,
    pub disguise: Option<String>,
}

impl PlayerRecord {
    const FIELDS: usize = 8;
}

impl fmt::Display for PlayerRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{},{},{},{},{},{},{}",
            self.id,
            self.name,
            self.is_seeker,
            self.alive,
            self.health,
            Coord(self.x),
            Coord(self.y),
            self.disguise.as_deref().unwrap_or(NO_DISGUISE)
        )
    }
}

impl FromStr for PlayerRecord {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(',').collect();
        if parts.len() != Self::FIELDS {
            return Err(ProtocolError::FieldCount {
                record: "player",
                expected: Self::FIELDS,
                found: parts.len(),
            });
        }

        let health = parts[4]
            .parse::<u8>()
            .ok()
            .filter(|h| *h <= 100)
            .ok_or_else(|| ProtocolError::HealthOutOfRange(parts[4].to_string()))?;

        Ok(Self {
            id: parts[0].to_string(),
            name: parts[1].to_string(),
            is_seeker: parse_bool("isSeeker", parts[2])?,
            alive: parse_bool("alive", parts[3])?,
            health,
            x: parse_number("x", parts[5])?,
            y: parse_number("y", parts[6])?,
            disguise: match parts[7] {
                NO_DISGUISE => None,
                other => Some(other.to_string()),
            },
        })
    }
}

/// Concealment object record as carried in INITIAL_MAP and GAME_STATE
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectRecord {
    pub id: String,
    pub kind: String,
    pub x: f64,
    pub y: f64,
}

impl ObjectRecord {
    const FIELDS: usize = 4;
}

impl fmt::Display for ObjectRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{},{}", self.id, self.kind, Coord(self.x), Coord(self.y))
    }
}

impl FromStr for ObjectRecord {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(',').collect();
        if parts.len() != Self::FIELDS {
            return Err(ProtocolError::FieldCount {
                record: "object",
                expected: Self::FIELDS,
                found: parts.len(),
            });
        }
        Ok(Self {
            id: parts[0].to_string(),
            kind: parts[1].to_string(),
            x: parse_number("x", parts[2])?,
            y: parse_number("y", parts[3])?,
        })
    }
}

/// Decodes a `;`-separated list of records, empty input is an empty list
#[cfg(test)]
pub fn decode_records<T: FromStr<Err = ProtocolError>>(s: &str) -> Result<Vec<T>, ProtocolError> {
    s.split(';')
        .filter(|part| !part.is_empty())
        .map(str::parse)
        .collect()
}

/// Role announced privately to each participant at match start
#[derive(Debug, Clone, PartialEq)]
pub enum RoleAssignment {
    Seeker { x: f64, y: f64 },
    Hider { disguise: String, x: f64, y: f64 },
}

/// What a seeker shot landed on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitKind {
    Player,
    Object,
}

/// Round outcome
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchOutcome {
    SeekerWin { seeker_name: String },
    HidersWin,
}

/// Messages sent from server to client
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMsg {
    Joined { id: String },
    PlayerList { names: Vec<String> },
    ThemeSelections { selections: Vec<(String, Theme)> },
    AllSelected,
    Countdown { seconds: u64 },
    MatchStart {
        seeker_id: String,
        hide_duration_ms: u64,
        theme: Theme,
    },
    InitialObjects { objects: Vec<ObjectRecord> },
    Role(RoleAssignment),
    PhasePlaying,
    FullState {
        phase: MatchPhase,
        players: Vec<PlayerRecord>,
        objects: Vec<ObjectRecord>,
    },
    PlayerMoved { id: String, x: f64, y: f64 },
    Trajectory {
        start_x: f64,
        start_y: f64,
        end_x: f64,
        end_y: f64,
    },
    Hit {
        kind: HitKind,
        id: String,
        x: f64,
        y: f64,
    },
    PlayerEliminated { id: String, name: String },
    WrongShot { shooter_id: String, health: u8 },
    SeekerEliminated { id: String },
    DisguiseChanged { id: String, disguise: String },
    MatchEnd(MatchOutcome),
    MatchReset,
    System { text: String },
    Chat { from: String, text: String },
}

fn write_records<T: fmt::Display>(f: &mut fmt::Formatter<'_>, records: &[T]) -> fmt::Result {
    for (i, record) in records.iter().enumerate() {
        if i > 0 {
            f.write_str(";")?;
        }
        write!(f, "{record}")?;
    }
    Ok(())
}

impl fmt::Display for ServerMsg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerMsg::Joined { id } => write!(f, "JOINED:{id}"),
            ServerMsg::PlayerList { names } => write!(f, "PLAYER_LIST:{}", names.join(",")),
            ServerMsg::ThemeSelections { selections } => {
                f.write_str("MAP_SELECTIONS")?;
                for (name, theme) in selections {
                    write!(f, ":{name}:{theme}")?;
                }
                Ok(())
            }
            ServerMsg::AllSelected => f.write_str("ALL_SELECTED"),
            ServerMsg::Countdown { seconds } => write!(f, "COUNTDOWN:{seconds}"),
            ServerMsg::MatchStart {
                seeker_id,
                hide_duration_ms,
                theme,
            } => write!(f, "GAME_START:{seeker_id}:{hide_duration_ms}:{theme}"),
            ServerMsg::InitialObjects { objects } => {
                f.write_str("INITIAL_MAP:")?;
                write_records(f, objects)
            }
            ServerMsg::Role(RoleAssignment::Seeker { x, y }) => {
                write!(f, "ROLE:SEEKER:{}:{}", Coord(*x), Coord(*y))
            }
            ServerMsg::Role(RoleAssignment::Hider { disguise, x, y }) => {
                write!(f, "ROLE:HIDER:{disguise}:{}:{}", Coord(*x), Coord(*y))
            }
            ServerMsg::PhasePlaying => f.write_str("GAME_PLAYING"),
            ServerMsg::FullState {
                phase,
                players,
                objects,
            } => {
                write!(f, "GAME_STATE:{}:", phase.as_str())?;
                write_records(f, players)?;
                f.write_str(":")?;
                write_records(f, objects)
            }
            ServerMsg::PlayerMoved { id, x, y } => {
                write!(f, "PLAYER_MOVE:{id}:{}:{}", Coord(*x), Coord(*y))
            }
            ServerMsg::Trajectory {
                start_x,
                start_y,
                end_x,
                end_y,
            } => write!(
                f,
                "BULLET:{}:{}:{}:{}",
                Coord(*start_x),
                Coord(*start_y),
                Coord(*end_x),
                Coord(*end_y)
            ),
            ServerMsg::Hit { kind, id, x, y } => {
                let kind = match kind {
                    HitKind::Player => "PLAYER",
                    HitKind::Object => "OBJECT",
                };
                write!(f, "HIT:{kind}:{id}:{}:{}", Coord(*x), Coord(*y))
            }
            ServerMsg::PlayerEliminated { id, name } => write!(f, "PLAYER_HIT:{id}:{name}"),
            ServerMsg::WrongShot { shooter_id, health } => {
                write!(f, "WRONG_SHOT:{shooter_id}:{health}")
            }
            ServerMsg::SeekerEliminated { id } => write!(f, "SEEKER_DIED:{id}"),
            ServerMsg::DisguiseChanged { id, disguise } => {
                write!(f, "DISGUISE_CHANGE:{id}:{disguise}")
            }
            ServerMsg::MatchEnd(MatchOutcome::SeekerWin { seeker_name }) => {
                write!(f, "GAME_END:SEEKER_WIN:{seeker_name}")
            }
            ServerMsg::MatchEnd(MatchOutcome::HidersWin) => f.write_str("GAME_END:HIDERS_WIN"),
            ServerMsg::MatchReset => f.write_str("GAME_RESET"),
            ServerMsg::System { text } => write!(f, "SYSTEM:{text}"),
            ServerMsg::Chat { from, text } => write!(f, "CHAT:{from}: {text}"),
        }
    }
}

/// Makes a display name safe to embed in delimited records
pub fn sanitize_name(raw: &str) -> String {
    let cleaned: String = raw
        .trim()
        .chars()
        .map(|c| match c {
            ':' | ',' | ';' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    if cleaned.is_empty() {
        "Player".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_inbound_commands() {
        assert_eq!(
            "JOIN:alice".parse::<ClientMsg>().unwrap(),
            ClientMsg::Join {
                name: "alice".into()
            }
        );
        assert_eq!(
            "JOIN".parse::<ClientMsg>().unwrap(),
            ClientMsg::Join {
                name: "Player".into()
            }
        );
        assert_eq!(
            "SELECT_MAP:city".parse::<ClientMsg>().unwrap(),
            ClientMsg::SelectTheme { theme: Theme::City }
        );
        assert_eq!(
            "MOVE:120.5:300".parse::<ClientMsg>().unwrap(),
            ClientMsg::Move { x: 120.5, y: 300.0 }
        );
        assert_eq!(
            "SHOOT_RAY:1000:600:1:0".parse::<ClientMsg>().unwrap(),
            ClientMsg::ShootRay {
                origin_x: 1000.0,
                origin_y: 600.0,
                dir_x: 1.0,
                dir_y: 0.0
            }
        );
        assert_eq!("LEAVE".parse::<ClientMsg>().unwrap(), ClientMsg::Leave);
        assert_eq!("DISCONNECT".parse::<ClientMsg>().unwrap(), ClientMsg::Leave);
    }

    #[test]
    fn chat_keeps_colons() {
        assert_eq!(
            "CHAT:look: behind you".parse::<ClientMsg>().unwrap(),
            ClientMsg::Chat {
                text: "look: behind you".into()
            }
        );
    }

    #[test]
    fn rejects_malformed_inbound_lines() {
        assert_eq!("".parse::<ClientMsg>(), Err(ProtocolError::Empty));
        assert!(matches!(
            "MOVE:12".parse::<ClientMsg>(),
            Err(ProtocolError::MissingField { field: "y", .. })
        ));
        assert!(matches!(
            "MOVE".parse::<ClientMsg>(),
            Err(ProtocolError::MissingField { field: "x", .. })
        ));
        assert!(matches!(
            "SHOOT_RAY:1:2:abc:4".parse::<ClientMsg>(),
            Err(ProtocolError::InvalidNumber { field: "dirX", .. })
        ));
        assert!(matches!(
            "MOVE:NaN:4".parse::<ClientMsg>(),
            Err(ProtocolError::InvalidNumber { .. })
        ));
        assert!(matches!(
            "SELECT_MAP:MOON".parse::<ClientMsg>(),
            Err(ProtocolError::Theme(_))
        ));
        assert!(matches!(
            "FLY:1:2".parse::<ClientMsg>(),
            Err(ProtocolError::UnknownCommand(_))
        ));
    }

    #[test]
    fn player_record_round_trips() {
        for raw in [
            "PLAYER_1a2b3c4d,alice,false,true,100,350.25,410.00,CHAIR",
            "PLAYER_deadbeef,bob,true,true,90,1000.00,600.00,NONE",
            "PLAYER_00000000,carol,false,false,0,55.50,1149.99,NONE",
        ] {
            let record: PlayerRecord = raw.parse().unwrap();
            assert_eq!(record.to_string(), raw);
        }

        let seeker: PlayerRecord = "P,bob,true,true,90,1.00,2.00,NONE".parse().unwrap();
        assert!(seeker.is_seeker);
        assert_eq!(seeker.disguise, None);
    }

    #[test]
    fn malformed_player_records_fail_whole() {
        assert!(matches!(
            "P,alice,false,true,100,350.25,410.00".parse::<PlayerRecord>(),
            Err(ProtocolError::FieldCount { found: 7, .. })
        ));
        assert!(matches!(
            "P,alice,maybe,true,100,1.00,2.00,NONE".parse::<PlayerRecord>(),
            Err(ProtocolError::InvalidBool { .. })
        ));
        assert!(matches!(
            "P,alice,false,true,101,1.00,2.00,NONE".parse::<PlayerRecord>(),
            Err(ProtocolError::HealthOutOfRange(_))
        ));
        assert!(matches!(
            "P,alice,false,true,-5,1.00,2.00,NONE".parse::<PlayerRecord>(),
            Err(ProtocolError::HealthOutOfRange(_))
        ));
        assert!(matches!(
            "P,alice,false,true,50,x,2.00,NONE".parse::<PlayerRecord>(),
            Err(ProtocolError::InvalidNumber { field: "x", .. })
        ));
    }

    #[test]
    fn object_record_round_trips_and_validates() {
        let raw = "OBJ_3,TIRE,812.00,95.50";
        let record: ObjectRecord = raw.parse().unwrap();
        assert_eq!(record.kind, "TIRE");
        assert_eq!(record.to_string(), raw);

        assert!("OBJ_3,TIRE,812.00".parse::<ObjectRecord>().is_err());
        assert!(decode_records::<ObjectRecord>("OBJ_1,CON,1.00,2.00;OBJ_2,BOX").is_err());
        assert_eq!(decode_records::<ObjectRecord>("").unwrap(), vec![]);
    }

    #[test]
    fn encodes_outbound_messages() {
        let state = ServerMsg::FullState {
            phase: MatchPhase::Playing,
            players: vec![
                "A,alice,false,true,50,10.00,20.00,TABLE".parse().unwrap(),
                "B,bob,true,true,100,1000.00,600.00,NONE".parse().unwrap(),
            ],
            objects: vec!["OBJ_0,CHAIR,100.00,200.00".parse().unwrap()],
        };
        assert_eq!(
            state.to_string(),
            "GAME_STATE:PLAYING:A,alice,false,true,50,10.00,20.00,TABLE;\
             B,bob,true,true,100,1000.00,600.00,NONE:OBJ_0,CHAIR,100.00,200.00"
        );

        let selections = ServerMsg::ThemeSelections {
            selections: vec![("alice".into(), Theme::City), ("bob".into(), Theme::School)],
        };
        assert_eq!(selections.to_string(), "MAP_SELECTIONS:alice:CITY:bob:SCHOOL");

        assert_eq!(
            ServerMsg::MatchEnd(MatchOutcome::SeekerWin {
                seeker_name: "bob".into()
            })
            .to_string(),
            "GAME_END:SEEKER_WIN:bob"
        );
        assert_eq!(
            ServerMsg::Role(RoleAssignment::Hider {
                disguise: "TIRE".into(),
                x: 300.0,
                y: 200.5
            })
            .to_string(),
            "ROLE:HIDER:TIRE:300.00:200.50"
        );
        assert_eq!(
            ServerMsg::MatchStart {
                seeker_id: "PLAYER_1".into(),
                hide_duration_ms: 20000,
                theme: Theme::School
            }
            .to_string(),
            "GAME_START:PLAYER_1:20000:SCHOOL"
        );
    }

    #[test]
    fn sanitizes_names() {
        assert_eq!(sanitize_name("  a:b,c;d "), "a_b_c_d");
        assert_eq!(sanitize_name("   "), "Player");
    }
}
