//! WebSocket protocol message definitions
//! These are the wire types for client-server communication

use serde::{Deserialize, Serialize};

/// Stable participant identifier (humans share it with their connection)
pub type ParticipantId = u32;

/// Augment catalog identifier
pub type AugmentId = u8;

/// Match phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Lobby, participants may join
    Waiting,
    /// Pre-game accuracy roulette or draft
    AccuracySelection,
    /// Elimination round in progress
    Round,
    /// Survivors of a round pick augments
    Augment,
}

impl Phase {
    /// Integer code used by the matchmaking callback
    pub fn code(self) -> i32 {
        match self {
            Phase::Waiting => 0,
            Phase::AccuracySelection => 1,
            Phase::Round => 2,
            Phase::Augment => 3,
        }
    }
}

/// Aim input: which way accuracy is drifting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AimTrend {
    Decreasing,
    #[default]
    Steady,
    Increasing,
}

impl AimTrend {
    pub const ALL: [AimTrend; 3] = [AimTrend::Decreasing, AimTrend::Steady, AimTrend::Increasing];

    pub fn delta(self) -> i32 {
        match self {
            AimTrend::Decreasing => -1,
            AimTrend::Steady => 0,
            AimTrend::Increasing => 1,
        }
    }
}

/// Consumable items
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    /// Temporary speed multiplier
    Adrenaline,
    /// Restores crafting energy
    Battery,
    /// Negates the next hit
    Shield,
    /// Re-rolls accuracy and range
    Reroll,
}

/// Why a participant died
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeathCause {
    Shot,
    Bankrupt,
    Admin,
}

/// Participant stat carried by `StatChanged`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stat {
    Accuracy,
    Range,
    ReloadTime,
    Speed,
    Energy,
}

/// Messages sent from client to server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMsg {
    /// Request to join the room
    Join {
        #[serde(default)]
        nickname: Option<String>,
    },

    /// Leave the room
    Leave,

    /// Host starts the match
    StartGame,

    /// Host adds a bot while waiting
    AddBot,

    /// Accuracy roulette spin / draft pick (`None` takes the first free slot)
    PickAccuracy {
        #[serde(default)]
        index: Option<usize>,
    },

    /// Movement direction, 0 = idle, 1..=8 clockwise from north
    Move { direction: u8 },

    /// Aim steadiness input
    Aim { trend: AimTrend },

    /// Lock-on target
    Target { target_id: Option<ParticipantId> },

    /// Fire at a participant
    Shoot { target_id: ParticipantId },

    /// Pick one of the offered augments
    ChooseAugment { index: usize },

    /// Start crafting an item
    Craft,

    /// Consume the held item
    UseItem,

    /// Ping for latency measurement
    Ping {
        /// Client timestamp
        t: u64,
    },
}

/// Messages sent from server to client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMsg {
    /// Welcome message after connection
    Welcome {
        participant_id: ParticipantId,
        room_id: String,
        server_time: u64,
    },

    /// Full room view, sent to a participant after joining
    RoomState {
        phase: Phase,
        round: u32,
        host_id: Option<ParticipantId>,
        participants: Vec<ParticipantInfo>,
    },

    /// Participant joined the room
    Joined { participant: ParticipantInfo },

    /// Participant left the room
    Left { participant_id: ParticipantId },

    HostChanged { host_id: Option<ParticipantId> },

    PhaseChanged { phase: Phase, round: u32, bet: u64 },

    /// Shared accuracy pool for this match
    AccuracyPool { values: Vec<u32>, draft: bool },

    /// Draft turn with the slots still unclaimed
    AccuracyTurn {
        participant_id: ParticipantId,
        remaining: Vec<AccuracySlot>,
    },

    AccuracyAssigned {
        participant_id: ParticipantId,
        accuracy: u32,
    },

    RoundStarted {
        round: u32,
        bet: u64,
        participants: Vec<ParticipantInfo>,
    },

    Moved {
        participant_id: ParticipantId,
        direction: u8,
        x: f32,
        y: f32,
    },

    TargetChanged {
        participant_id: ParticipantId,
        target_id: Option<ParticipantId>,
    },

    ShotFired {
        shooter_id: ParticipantId,
        target_id: ParticipantId,
        hit: bool,
        /// Shooter reload time remaining after the shot
        cooldown: f32,
    },

    BalanceChanged {
        participant_id: ParticipantId,
        balance: u64,
    },

    PrizePool { amount: u64 },

    PrizeAwarded {
        participant_id: ParticipantId,
        amount: u64,
    },

    Died {
        participant_id: ParticipantId,
        cause: DeathCause,
    },

    /// Personal augment offer, always three slots (`None` pads)
    AugmentOffer { options: Vec<Option<AugmentInfo>> },

    AugmentChosen {
        participant_id: ParticipantId,
        augment_id: AugmentId,
    },

    StatChanged {
        participant_id: ParticipantId,
        stat: Stat,
        value: f32,
    },

    CraftingChanged {
        participant_id: ParticipantId,
        crafting: bool,
    },

    ItemAcquired {
        participant_id: ParticipantId,
        item: ItemKind,
    },

    ItemUsed {
        participant_id: ParticipantId,
        item: ItemKind,
    },

    ShieldConsumed { participant_id: ParticipantId },

    /// Match has ended
    MatchEnded {
        winners: Vec<ParticipantId>,
        standings: Vec<Standing>,
    },

    /// Error message
    Error { code: String, message: String },

    /// Pong response
    Pong {
        /// Echo back client timestamp
        t: u64,
    },
}

/// Public view of a participant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticipantInfo {
    pub participant_id: ParticipantId,
    pub nickname: String,
    pub is_bot: bool,
    pub accuracy: u32,
    pub range: f32,
    pub reload_time: f32,
    pub balance: u64,
    pub alive: bool,
    pub x: f32,
    pub y: f32,
    pub augments: Vec<AugmentId>,
    pub item: Option<ItemKind>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccuracySlot {
    pub index: usize,
    pub value: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AugmentInfo {
    pub augment_id: AugmentId,
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Standing {
    pub participant_id: ParticipantId,
    pub nickname: String,
    pub balance: u64,
}

/// Wire codec errors
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("binary frame is not UTF-8")]
    NotUtf8,
}

/// Encode an outbound message into a frame payload
pub fn encode(msg: &ServerMsg) -> Result<String, ProtocolError> {
    Ok(serde_json::to_string(msg)?)
}

/// Decode an inbound text frame
pub fn decode(text: &str) -> Result<ClientMsg, ProtocolError> {
    Ok(serde_json::from_str(text)?)
}

/// Decode an inbound binary frame carrying the same JSON payload
pub fn decode_bytes(bytes: &[u8]) -> Result<ClientMsg, ProtocolError> {
    let text = std::str::from_utf8(bytes).map_err(|_| ProtocolError::NotUtf8)?;
    decode(text)
}
