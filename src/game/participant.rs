//! Authoritative participant record (humans and bots)

use rand::Rng;
use std::f32::consts::FRAC_1_SQRT_2;
use std::time::Duration;

use crate::ws::protocol::{AugmentId, ItemKind, ParticipantId, ParticipantInfo};

use super::combat::CombatSystem;

/// Half the side length of the square arena
pub const ARENA_HALF: f32 = 500.0;

pub const MIN_ACCURACY: u32 = 1;
pub const MAX_ACCURACY: u32 = 100;
pub const MIN_RANGE: f32 = 50.0;
pub const MIN_RELOAD: f32 = 0.5;
pub const BASE_SPEED: f32 = 120.0;
pub const MAX_ENERGY: u32 = 100;
pub const MAX_NICKNAME_LEN: usize = 16;

/// Movement direction, 0 = idle then clockwise from north
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Idle,
    North,
    NorthEast,
    East,
    SouthEast,
    South,
    SouthWest,
    West,
    NorthWest,
}

impl Direction {
    pub const ALL: [Direction; 9] = [
        Direction::Idle,
        Direction::North,
        Direction::NorthEast,
        Direction::East,
        Direction::SouthEast,
        Direction::South,
        Direction::SouthWest,
        Direction::West,
        Direction::NorthWest,
    ];

    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.get(code as usize).copied()
    }

    pub fn code(self) -> u8 {
        self as u8
    }

    /// Precomputed unit vector (y grows northwards)
    pub fn unit_vector(self) -> (f32, f32) {
        const D: f32 = FRAC_1_SQRT_2;
        match self {
            Direction::Idle => (0.0, 0.0),
            Direction::North => (0.0, 1.0),
            Direction::NorthEast => (D, D),
            Direction::East => (1.0, 0.0),
            Direction::SouthEast => (D, -D),
            Direction::South => (0.0, -1.0),
            Direction::SouthWest => (-D, -D),
            Direction::West => (-1.0, 0.0),
            Direction::NorthWest => (-D, D),
        }
    }
}

/// Autonomous decision-making capability attached to bot participants
#[derive(Debug, Clone)]
pub struct BotController {
    /// How often the driver asks for a decision
    pub think_interval: Duration,
    /// Delay window before answering accuracy/augment prompts (ms)
    pub reaction_ms: (u64, u64),
}

impl Default for BotController {
    fn default() -> Self {
        Self {
            think_interval: Duration::from_millis(700),
            reaction_ms: (200, 800),
        }
    }
}

/// Participant state in a room (authoritative)
#[derive(Debug, Clone)]
pub struct Participant {
    pub id: ParticipantId,
    pub nickname: String,

    // Combat
    pub accuracy: u32,
    pub range: f32,
    pub reload_total: f32,
    pub reload_remaining: f32,

    // Movement
    pub direction: Direction,
    pub x: f32,
    pub y: f32,
    pub speed: f32,
    pub base_speed: f32,

    // Economy and survival
    pub balance: u64,
    pub alive: bool,
    pub target: Option<ParticipantId>,

    // Progression
    pub augments: Vec<AugmentId>,
    pub double_money: bool,
    pub item: Option<ItemKind>,
    pub crafting: bool,
    pub craft_remaining: f32,
    pub energy: u32,
    pub shielded: bool,
    pub speed_boost_remaining: f32,

    pub controller: Option<BotController>,
}

impl Participant {
    pub fn new<R: Rng>(
        id: ParticipantId,
        nickname: String,
        controller: Option<BotController>,
        starting_balance: u64,
        rng: &mut R,
    ) -> Self {
        let mut participant = Self {
            id,
            nickname,
            accuracy: 50,
            range: 300.0,
            reload_total: 2.0,
            reload_remaining: 0.0,
            direction: Direction::Idle,
            x: 0.0,
            y: 0.0,
            speed: BASE_SPEED,
            base_speed: BASE_SPEED,
            balance: starting_balance,
            alive: true,
            target: None,
            augments: Vec::new(),
            double_money: false,
            item: None,
            crafting: false,
            craft_remaining: 0.0,
            energy: MAX_ENERGY,
            shielded: false,
            speed_boost_remaining: 0.0,
            controller,
        };
        participant.reset_for_match(starting_balance, rng);
        participant
    }

    /// Full re-roll used on join and on every return to the lobby
    pub fn reset_for_match<R: Rng>(&mut self, starting_balance: u64, rng: &mut R) {
        self.accuracy = rng.gen_range(30..=70);
        self.range = rng.gen_range(250.0..=350.0);
        self.reload_total = rng.gen_range(1.5..=2.5);
        self.base_speed = BASE_SPEED;
        self.balance = starting_balance;
        self.augments.clear();
        self.double_money = false;
        self.item = None;
        self.energy = MAX_ENERGY;
        self.reset_for_round(rng);
    }

    /// Round-scoped reset; keeps accuracy, augments and balance
    pub fn reset_for_round<R: Rng>(&mut self, rng: &mut R) {
        let (x, y) = spawn_position(rng);
        self.x = x;
        self.y = y;
        self.direction = Direction::Idle;
        self.speed = self.base_speed;
        self.speed_boost_remaining = 0.0;
        self.reload_remaining = 0.0;
        self.crafting = false;
        self.craft_remaining = 0.0;
        self.shielded = false;
        self.target = None;
        self.alive = !self.is_bankrupt();
    }

    pub fn is_bot(&self) -> bool {
        self.controller.is_some()
    }

    pub fn is_bankrupt(&self) -> bool {
        self.balance == 0
    }

    pub fn can_fire(&self) -> bool {
        self.alive && self.reload_remaining <= 0.0 && !self.crafting
    }

    /// Take up to `amount`, returning what was actually taken.
    /// Bankruptcy kills immediately.
    pub fn withdraw(&mut self, amount: u64) -> u64 {
        let taken = CombatSystem::clamp_withdrawal(self.balance, amount);
        self.balance -= taken;
        if self.is_bankrupt() {
            self.alive = false;
        }
        taken
    }

    pub fn deposit(&mut self, amount: u64) {
        self.balance = self.balance.saturating_add(amount);
    }

    /// Shift accuracy and clamp to [1, 100]; returns true when it changed
    pub fn adjust_accuracy(&mut self, delta: i32) -> bool {
        let before = self.accuracy;
        self.set_accuracy(self.accuracy as i64 + delta as i64);
        before != self.accuracy
    }

    pub fn set_accuracy(&mut self, value: i64) {
        self.accuracy = value.clamp(MIN_ACCURACY as i64, MAX_ACCURACY as i64) as u32;
    }

    pub fn adjust_range(&mut self, delta: f32) {
        self.range = (self.range + delta).max(MIN_RANGE);
    }

    pub fn adjust_reload(&mut self, delta: f32) {
        self.reload_total = (self.reload_total + delta).max(MIN_RELOAD);
        self.reload_remaining = self.reload_remaining.min(self.reload_total);
    }

    pub fn info(&self) -> ParticipantInfo {
        ParticipantInfo {
            participant_id: self.id,
            nickname: self.nickname.clone(),
            is_bot: self.is_bot(),
            accuracy: self.accuracy,
            range: self.range,
            reload_time: self.reload_total,
            balance: self.balance,
            alive: self.alive,
            x: self.x,
            y: self.y,
            augments: self.augments.clone(),
            item: self.item,
        }
    }
}

/// Random spawn point inside the arena, away from the walls
pub fn spawn_position<R: Rng>(rng: &mut R) -> (f32, f32) {
    let margin = ARENA_HALF * 0.8;
    (rng.gen_range(-margin..=margin), rng.gen_range(-margin..=margin))
}

/// Trim and bound a requested nickname
pub fn sanitize_nickname(requested: Option<&str>, id: ParticipantId) -> String {
    let trimmed: String = requested
        .unwrap_or_default()
        .trim()
        .chars()
        .filter(|c| !c.is_control())
        .take(MAX_NICKNAME_LEN)
        .collect();
    if trimmed.is_empty() {
        format!("Player {}", id)
    } else {
        trimmed
    }
}
