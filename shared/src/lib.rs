use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const ARENA_WIDTH: f32 = 800.0;
pub const ARENA_HEIGHT: f32 = 600.0;
pub const BALL_RADIUS: f32 = 10.0;
pub const PADDLE_LENGTH: f32 = 100.0;
pub const PADDLE_MARGIN: f32 = 20.0;
pub const PADDLE_SPEED: f32 = 300.0;
pub const BALL_SPEED_X: f32 = 250.0;
pub const BALL_MAX_ANGLE_SPEED: f32 = 260.0;
pub const COUNTDOWN_SECS: u32 = 3;
pub const PHYSICS_HZ: u32 = 60;
pub const RENDER_HZ: u32 = 30;
pub const WAITING_SLOT_TIMEOUT_SECS: u64 = 300;

/// How a game is created and matched, selected by the `mode` query
/// parameter at connect time.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GameMode {
    Local,
    Ai,
    Remote,
    Friend,
    Tournament,
}

impl GameMode {
    /// Networked modes need a verified identity before a session exists.
    pub fn requires_auth(&self) -> bool {
        matches!(self, GameMode::Remote | GameMode::Friend | GameMode::Tournament)
    }
}

impl fmt::Display for GameMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            GameMode::Local => "local",
            GameMode::Ai => "ai",
            GameMode::Remote => "remote",
            GameMode::Friend => "friend",
            GameMode::Tournament => "tournament",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for GameMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "local" => Ok(GameMode::Local),
            "ai" => Ok(GameMode::Ai),
            "remote" => Ok(GameMode::Remote),
            "friend" => Ok(GameMode::Friend),
            "tournament" => Ok(GameMode::Tournament),
            other => Err(format!("unknown game mode '{}'", other)),
        }
    }
}

/// Identity attached to a connection. Not persisted anywhere.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PlayerInfo {
    pub user_id: String,
    pub username: String,
}

impl PlayerInfo {
    /// Synthetic identity for non-networked participants (local/AI play).
    pub fn local() -> Self {
        Self {
            user_id: "local".to_string(),
            username: "local".to_string(),
        }
    }

    pub fn is_local(&self) -> bool {
        self.user_id == "local"
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum InputAction {
    Up,
    Down,
    Stop,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy)]
pub struct PlayerInput {
    pub player: u8,
    pub action: InputAction,
}

/// Frames sent by clients. Unknown `type` values deserialize to `Unknown`
/// and are ignored without error (forward-compatible).
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(tag = "type")]
pub enum ClientFrame {
    #[serde(rename = "playerInput")]
    PlayerInput { data: PlayerInput },
    #[serde(rename = "startGame")]
    StartGame {
        mode: GameMode,
        #[serde(default)]
        player: Option<PlayerInfo>,
    },
    #[serde(rename = "nextGame")]
    NextGame { mode: GameMode },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy)]
#[serde(rename_all = "camelCase")]
pub struct BallSnapshot {
    pub x: f32,
    pub y: f32,
    pub speed_x: f32,
    pub speed_y: f32,
    pub radius: f32,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy)]
#[serde(rename_all = "camelCase")]
pub struct PaddleSnapshot {
    pub cy: f32,
    pub length: f32,
    pub side: PaddleSide,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PaddleSide {
    Left,
    Right,
}

/// Render-rate snapshot of one game's mutable state.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct StateSnapshot {
    pub ball: BallSnapshot,
    pub paddles: Vec<PaddleSnapshot>,
    pub score: [u32; 2],
    pub countdown: u32,
}

/// Full geometry for (re)initialization after a reset or restart.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct SetupSnapshot {
    pub width: f32,
    pub height: f32,
    pub ball_radius: f32,
    pub paddle_length: f32,
    #[serde(flatten)]
    pub state: StateSnapshot,
}

/// Frames sent by the server.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(tag = "type")]
pub enum ServerFrame {
    #[serde(rename = "waiting")]
    #[serde(rename_all = "camelCase")]
    Waiting {
        message: String,
        game_mode: GameMode,
        player_number: u8,
    },
    #[serde(rename = "ready")]
    #[serde(rename_all = "camelCase")]
    Ready {
        message: String,
        game_mode: GameMode,
        player_number: u8,
    },
    #[serde(rename = "gameState")]
    GameState { data: StateSnapshot },
    #[serde(rename = "gameSetup")]
    GameSetup { data: SetupSnapshot },
    #[serde(rename = "playerLeft")]
    PlayerLeft { message: String },
    #[serde(rename = "error")]
    Error { message: String, timestamp: u64 },
}
