//! Room session: the authoritative match state machine
//!
//! Only the dispatcher worker touches a `Session`, so every method here runs
//! serialized with respect to every other command. Broadcasts go out through
//! the [`Outbox`] while the command is still executing.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

use crate::config::{AccuracyMode, GameRules};
use crate::matchmaking::PhaseReporter;
use crate::ws::protocol::{
    AccuracySlot, AimTrend, AugmentId, DeathCause, ParticipantId, ParticipantInfo, Phase,
    ServerMsg, Stat, Standing,
};

use super::augment;
use super::bot;
use super::combat::CombatSystem;
use super::command::{Command, CommandSender, Rejection};
use super::item;
use super::outbox::{IdAllocator, Outbox};
use super::participant::{sanitize_nickname, BotController, Direction, Participant};
use super::physics::PhysicsSystem;

/// Bounds for generated accuracy pool entries
pub const ACCURACY_POOL_MIN: u32 = 20;
pub const ACCURACY_POOL_MAX: u32 = 80;
pub const MIN_PARTICIPANTS_TO_START: usize = 2;

/// Shared accuracy pool and, in draft mode, the pick order
#[derive(Debug, Clone)]
struct AccuracySelection {
    pool: Vec<u32>,
    claimed: Vec<bool>,
    turn_order: Vec<ParticipantId>,
    turn: usize,
}

impl AccuracySelection {
    fn remaining(&self) -> Vec<AccuracySlot> {
        self.pool
            .iter()
            .zip(&self.claimed)
            .enumerate()
            .filter(|(_, (_, claimed))| !**claimed)
            .map(|(index, (value, _))| AccuracySlot {
                index,
                value: *value,
            })
            .collect()
    }
}

/// Read-only view published after every command
#[derive(Debug, Clone, Serialize)]
pub struct RoomStatus {
    pub room_id: String,
    pub phase: Phase,
    pub round: u32,
    pub bet: u64,
    pub prize_pool: u64,
    pub host_id: Option<ParticipantId>,
    pub participants: Vec<ParticipantInfo>,
}

pub struct Session {
    room_id: String,
    rules: GameRules,
    phase: Phase,
    round: u32,
    bet: u64,
    prize_pool: u64,
    host: Option<ParticipantId>,
    participants: HashMap<ParticipantId, Participant>,
    join_order: Vec<ParticipantId>,
    /// Participants done with the current gated action
    completed: HashSet<ParticipantId>,
    offers: HashMap<ParticipantId, Vec<Option<AugmentId>>>,
    accuracy: Option<AccuracySelection>,
    bots_added: u32,
    rng: ChaCha8Rng,
    outbox: Outbox,
    commands: CommandSender,
    reporter: PhaseReporter,
    ids: IdAllocator,
}

impl Session {
    pub fn new(
        room_id: String,
        rules: GameRules,
        outbox: Outbox,
        commands: CommandSender,
        reporter: PhaseReporter,
        ids: IdAllocator,
        seed: u64,
    ) -> Self {
        Self {
            room_id,
            rules,
            phase: Phase::Waiting,
            round: 0,
            bet: 0,
            prize_pool: 0,
            host: None,
            participants: HashMap::new(),
            join_order: Vec::new(),
            completed: HashSet::new(),
            offers: HashMap::new(),
            accuracy: None,
            bots_added: 0,
            rng: ChaCha8Rng::seed_from_u64(seed),
            outbox,
            commands,
            reporter,
            ids,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn round(&self) -> u32 {
        self.round
    }

    pub fn prize_pool(&self) -> u64 {
        self.prize_pool
    }

    pub fn host(&self) -> Option<ParticipantId> {
        self.host
    }

    pub fn participant(&self, id: ParticipantId) -> Option<&Participant> {
        self.participants.get(&id)
    }

    pub fn status(&self) -> RoomStatus {
        RoomStatus {
            room_id: self.room_id.clone(),
            phase: self.phase,
            round: self.round,
            bet: self.bet,
            prize_pool: self.prize_pool,
            host_id: self.host,
            participants: self.infos(),
        }
    }

    /// Apply one command
    pub fn execute(&mut self, command: Command) -> Result<(), Rejection> {
        match command {
            Command::Join { id, nickname } => self.join(id, nickname),
            Command::Leave { id } => self.leave(id),
            Command::StartGame { id } => self.start_game(id),
            Command::AddBot { id } => self.add_bot(id),
            Command::PickAccuracy { id, index } => self.pick_accuracy(id, index),
            Command::Move { id, direction } => self.move_participant(id, direction),
            Command::Aim { id, trend } => self.aim(id, trend),
            Command::SetTarget { id, target } => self.set_target(id, target),
            Command::Shoot { shooter, target } => self.shoot(shooter, target),
            Command::ChooseAugment { id, index } => self.choose_augment(id, index),
            Command::Craft { id } => self.craft(id),
            Command::UseItem { id } => self.use_item(id),
            Command::AdvanceSimulation { dt } => self.advance_simulation(dt),
            Command::CollectBets => self.collect_bets(),
            Command::BotThink { id } => self.bot_think(id),
            Command::AdminKill { id } => self.admin_kill(id),
            #[cfg(test)]
            Command::Panic => panic!("command panicked on purpose"),
        }
    }

    // ------------------------------------------------------------------
    // Membership
    // ------------------------------------------------------------------

    fn join(&mut self, id: ParticipantId, nickname: Option<String>) -> Result<(), Rejection> {
        let result = self.try_join(id, nickname);
        if let Err(rejection) = &result {
            self.outbox.send_to(
                id,
                ServerMsg::Error {
                    code: "join_rejected".to_string(),
                    message: rejection.to_string(),
                },
            );
        }
        result
    }

    fn try_join(&mut self, id: ParticipantId, nickname: Option<String>) -> Result<(), Rejection> {
        if self.participants.contains_key(&id) {
            return Err(Rejection::AlreadyJoined);
        }
        if self.phase != Phase::Waiting {
            return Err(Rejection::WrongPhase(self.phase));
        }
        if self.participants.len() >= self.rules.max_participants {
            return Err(Rejection::RoomFull);
        }

        let nickname = sanitize_nickname(nickname.as_deref(), id);
        let participant = Participant::new(
            id,
            nickname,
            None,
            self.rules.starting_balance,
            &mut self.rng,
        );
        let info = participant.info();
        self.participants.insert(id, participant);
        self.join_order.push(id);

        info!(
            room_id = %self.room_id,
            participant_id = id,
            participant_count = self.participants.len(),
            "Participant joined"
        );

        self.broadcast(ServerMsg::Joined { participant: info });
        if self.host.is_none() {
            self.host = Some(id);
            self.broadcast(ServerMsg::HostChanged { host_id: self.host });
        }
        self.outbox.send_to(
            id,
            ServerMsg::RoomState {
                phase: self.phase,
                round: self.round,
                host_id: self.host,
                participants: self.infos(),
            },
        );
        Ok(())
    }

    fn add_bot(&mut self, requester: ParticipantId) -> Result<(), Rejection> {
        self.require_host(requester)?;
        if self.phase != Phase::Waiting {
            return Err(Rejection::WrongPhase(self.phase));
        }
        if self.participants.len() >= self.rules.max_participants {
            return Err(Rejection::RoomFull);
        }

        let id = self.ids.next();
        self.bots_added += 1;
        let controller = BotController::default();
        let participant = Participant::new(
            id,
            format!("Bot {}", self.bots_added),
            Some(controller.clone()),
            self.rules.starting_balance,
            &mut self.rng,
        );
        let info = participant.info();
        self.participants.insert(id, participant);
        self.join_order.push(id);

        let inbox = self.outbox.register(id);
        bot::spawn_driver(id, &controller, inbox, self.commands.clone(), self.rng.gen());

        info!(room_id = %self.room_id, participant_id = id, "Bot added");
        self.broadcast(ServerMsg::Joined { participant: info });
        Ok(())
    }

    fn leave(&mut self, id: ParticipantId) -> Result<(), Rejection> {
        let was_draft_turn = self.current_draft_turn() == Some(id);
        self.remove_participant(id)
            .ok_or(Rejection::UnknownParticipant(id))?;

        info!(room_id = %self.room_id, participant_id = id, "Participant left");

        if self.host == Some(id) {
            self.host = self.first_human();
            self.broadcast(ServerMsg::HostChanged { host_id: self.host });
        }

        if self.first_human().is_none() {
            if self.phase == Phase::Waiting {
                self.remove_bots();
            } else {
                self.end_match();
            }
            return Ok(());
        }

        match self.phase {
            Phase::Waiting => {}
            // No one left to play against
            Phase::AccuracySelection | Phase::Augment if self.solvent_ids().len() <= 1 => {
                self.end_match()
            }
            Phase::AccuracySelection => self.advance_accuracy_selection(was_draft_turn),
            Phase::Round => self.check_round_end(),
            Phase::Augment => self.check_augment_complete(),
        }
        Ok(())
    }

    fn remove_participant(&mut self, id: ParticipantId) -> Option<Participant> {
        let removed = self.participants.remove(&id)?;
        self.join_order.retain(|other| *other != id);
        self.completed.remove(&id);
        self.offers.remove(&id);
        self.clear_targets_on(id);
        if removed.is_bot() {
            self.outbox.unregister(id);
        }
        self.broadcast(ServerMsg::Left { participant_id: id });
        Some(removed)
    }

    fn remove_bots(&mut self) {
        let bots: Vec<ParticipantId> = self
            .join_order
            .iter()
            .copied()
            .filter(|id| self.participants.get(id).is_some_and(Participant::is_bot))
            .collect();
        for id in bots {
            self.remove_participant(id);
        }
    }

    // ------------------------------------------------------------------
    // Accuracy selection
    // ------------------------------------------------------------------

    fn start_game(&mut self, requester: ParticipantId) -> Result<(), Rejection> {
        self.require_host(requester)?;
        if self.phase != Phase::Waiting {
            return Err(Rejection::WrongPhase(self.phase));
        }
        if self.participants.len() < MIN_PARTICIPANTS_TO_START {
            return Err(Rejection::NotEnoughParticipants);
        }

        self.round = 0;
        self.prize_pool = 0;
        self.completed.clear();
        self.offers.clear();

        let pool: Vec<u32> = (0..self.participants.len())
            .map(|_| self.rng.gen_range(ACCURACY_POOL_MIN..=ACCURACY_POOL_MAX))
            .collect();
        let draft = self.rules.accuracy_mode == AccuracyMode::Draft;
        self.accuracy = Some(AccuracySelection {
            claimed: vec![false; pool.len()],
            pool: pool.clone(),
            turn_order: self.join_order.clone(),
            turn: 0,
        });

        info!(room_id = %self.room_id, participants = self.participants.len(), "Match starting");
        self.set_phase(Phase::AccuracySelection);
        self.broadcast(ServerMsg::AccuracyPool {
            values: pool,
            draft,
        });
        if draft {
            self.announce_draft_turn();
        }
        Ok(())
    }

    fn pick_accuracy(&mut self, id: ParticipantId, index: Option<usize>) -> Result<(), Rejection> {
        if self.phase != Phase::AccuracySelection {
            return Err(Rejection::WrongPhase(self.phase));
        }
        if !self.participants.contains_key(&id) {
            return Err(Rejection::UnknownParticipant(id));
        }
        if self.completed.contains(&id) {
            return Err(Rejection::AlreadyDone);
        }
        if self.rules.accuracy_mode == AccuracyMode::Draft && self.current_draft_turn() != Some(id) {
            return Err(Rejection::NotYourTurn);
        }

        let selection = self
            .accuracy
            .as_mut()
            .ok_or(Rejection::WrongPhase(self.phase))?;
        if selection.pool.is_empty() {
            return Err(Rejection::InvalidIndex(index.unwrap_or(0)));
        }

        let value = match self.rules.accuracy_mode {
            AccuracyMode::Roulette => selection.pool[self.rng.gen_range(0..selection.pool.len())],
            AccuracyMode::Draft => {
                let slot = match index {
                    Some(slot) => slot,
                    None => selection
                        .claimed
                        .iter()
                        .position(|claimed| !claimed)
                        .ok_or(Rejection::InvalidIndex(0))?,
                };
                if slot >= selection.pool.len() || selection.claimed[slot] {
                    return Err(Rejection::InvalidIndex(slot));
                }
                selection.claimed[slot] = true;
                selection.turn += 1;
                selection.pool[slot]
            }
        };

        if let Some(participant) = self.participants.get_mut(&id) {
            participant.set_accuracy(value as i64);
        }
        self.completed.insert(id);
        debug!(participant_id = id, accuracy = value, "Accuracy assigned");
        self.broadcast(ServerMsg::AccuracyAssigned {
            participant_id: id,
            accuracy: value,
        });

        self.advance_accuracy_selection(true);
        Ok(())
    }

    /// Start the first round once everyone has an accuracy, otherwise hand
    /// the draft to the next participant.
    fn advance_accuracy_selection(&mut self, announce_turn: bool) {
        if self.phase != Phase::AccuracySelection {
            return;
        }
        let everyone_assigned = self
            .participants
            .keys()
            .all(|id| self.completed.contains(id));
        if everyone_assigned {
            self.start_round(1);
        } else if announce_turn && self.rules.accuracy_mode == AccuracyMode::Draft {
            self.announce_draft_turn();
        }
    }

    /// Whose draft pick it is, skipping anyone who left or already picked
    fn current_draft_turn(&mut self) -> Option<ParticipantId> {
        if self.phase != Phase::AccuracySelection || self.rules.accuracy_mode != AccuracyMode::Draft {
            return None;
        }
        let selection = self.accuracy.as_mut()?;
        while let Some(id) = selection.turn_order.get(selection.turn) {
            if self.participants.contains_key(id) && !self.completed.contains(id) {
                return Some(*id);
            }
            selection.turn += 1;
        }
        None
    }

    fn announce_draft_turn(&mut self) {
        let Some(id) = self.current_draft_turn() else {
            return;
        };
        let remaining = self
            .accuracy
            .as_ref()
            .map(AccuracySelection::remaining)
            .unwrap_or_default();
        self.broadcast(ServerMsg::AccuracyTurn {
            participant_id: id,
            remaining,
        });
    }

    // ------------------------------------------------------------------
    // Rounds
    // ------------------------------------------------------------------

    fn start_round(&mut self, round: u32) {
        self.round = round;
        self.bet = CombatSystem::bet_for_round(round);
        self.completed.clear();
        self.offers.clear();
        self.accuracy = None;
        for participant in self.participants.values_mut() {
            participant.reset_for_round(&mut self.rng);
        }

        info!(room_id = %self.room_id, round, bet = self.bet, "Round started");
        self.set_phase(Phase::Round);
        self.broadcast(ServerMsg::RoundStarted {
            round,
            bet: self.bet,
            participants: self.infos(),
        });
        self.check_round_end();
    }

    /// End the round when at most one participant is left standing
    fn check_round_end(&mut self) {
        if self.phase != Phase::Round {
            return;
        }
        let survivors: Vec<ParticipantId> = self
            .join_order
            .iter()
            .copied()
            .filter(|id| self.participants.get(id).is_some_and(|p| p.alive))
            .collect();
        if survivors.len() > 1 {
            return;
        }

        let (share, _paid) = CombatSystem::split_prize(self.prize_pool, survivors.len());
        if !survivors.is_empty() {
            // Remainder of the split is dropped
            self.prize_pool = 0;
            for id in &survivors {
                let Some(participant) = self.participants.get_mut(id) else {
                    continue;
                };
                participant.deposit(share);
                let balance = participant.balance;
                self.broadcast(ServerMsg::PrizeAwarded {
                    participant_id: *id,
                    amount: share,
                });
                self.broadcast(ServerMsg::BalanceChanged {
                    participant_id: *id,
                    balance,
                });
            }
            self.broadcast(ServerMsg::PrizePool { amount: 0 });
        }

        info!(
            room_id = %self.room_id,
            round = self.round,
            survivors = survivors.len(),
            share,
            "Round ended"
        );

        if self.match_over() {
            self.end_match();
        } else {
            self.enter_augment();
        }
    }

    fn match_over(&self) -> bool {
        self.round >= self.rules.max_rounds || self.solvent_ids().len() <= 1
    }

    fn enter_augment(&mut self) {
        self.completed.clear();
        self.offers.clear();

        let eligible = self.solvent_ids();
        if eligible.is_empty() {
            self.start_round(self.round + 1);
            return;
        }

        self.set_phase(Phase::Augment);
        for id in eligible {
            let Some(participant) = self.participants.get(&id) else {
                continue;
            };
            let options = augment::generate_options(&participant.augments, &mut self.rng);
            let offer = options
                .iter()
                .map(|slot| slot.and_then(augment::lookup).map(|def| def.info()))
                .collect();
            if options.iter().all(Option::is_none) {
                // Catalog exhausted, nothing to wait for
                self.completed.insert(id);
            } else {
                self.offers.insert(id, options);
            }
            self.outbox.send_to(id, ServerMsg::AugmentOffer { options: offer });
        }
        self.check_augment_complete();
    }

    fn choose_augment(&mut self, id: ParticipantId, index: usize) -> Result<(), Rejection> {
        if self.phase != Phase::Augment {
            return Err(Rejection::WrongPhase(self.phase));
        }
        let participant = self
            .participants
            .get(&id)
            .ok_or(Rejection::UnknownParticipant(id))?;
        if participant.is_bankrupt() {
            return Err(Rejection::Bankrupt);
        }
        if self.completed.contains(&id) {
            return Err(Rejection::AlreadyDone);
        }
        let offer = self.offers.get(&id).ok_or(Rejection::AlreadyDone)?;
        let augment_id = offer
            .get(index)
            .copied()
            .flatten()
            .ok_or(Rejection::InvalidIndex(index))?;
        let def = augment::lookup(augment_id).ok_or(Rejection::InvalidIndex(index))?;

        self.offers.remove(&id);
        let Some(participant) = self.participants.get_mut(&id) else {
            return Err(Rejection::UnknownParticipant(id));
        };
        let changed = augment::apply(participant, def);
        self.completed.insert(id);

        debug!(participant_id = id, augment_id, "Augment chosen");
        self.broadcast(ServerMsg::AugmentChosen {
            participant_id: id,
            augment_id,
        });
        self.broadcast_stats(id, changed);

        self.check_augment_complete();
        Ok(())
    }

    fn check_augment_complete(&mut self) {
        if self.phase != Phase::Augment {
            return;
        }
        if self
            .solvent_ids()
            .iter()
            .all(|id| self.completed.contains(id))
        {
            self.start_round(self.round + 1);
        }
    }

    /// Announce winners, drop bots and return everyone to the lobby
    fn end_match(&mut self) {
        let mut standings: Vec<Standing> = self
            .join_order
            .iter()
            .filter_map(|id| self.participants.get(id))
            .map(|p| Standing {
                participant_id: p.id,
                nickname: p.nickname.clone(),
                balance: p.balance,
            })
            .collect();
        standings.sort_by(|a, b| b.balance.cmp(&a.balance));

        let best = standings
            .iter()
            .map(|s| s.balance)
            .filter(|balance| *balance > 0)
            .max();
        let winners: Vec<ParticipantId> = standings
            .iter()
            .filter(|s| Some(s.balance) == best)
            .map(|s| s.participant_id)
            .collect();

        info!(room_id = %self.room_id, ?winners, round = self.round, "Match ended");
        self.broadcast(ServerMsg::MatchEnded { winners, standings });

        self.remove_bots();
        for participant in self.participants.values_mut() {
            participant.reset_for_match(self.rules.starting_balance, &mut self.rng);
        }
        self.round = 0;
        self.bet = 0;
        self.prize_pool = 0;
        self.completed.clear();
        self.offers.clear();
        self.accuracy = None;
        self.set_phase(Phase::Waiting);
    }

    // ------------------------------------------------------------------
    // Combat and economy
    // ------------------------------------------------------------------

    fn shoot(&mut self, shooter_id: ParticipantId, target_id: ParticipantId) -> Result<(), Rejection> {
        if self.phase != Phase::Round {
            return Err(Rejection::WrongPhase(self.phase));
        }
        if shooter_id == target_id {
            return Err(Rejection::InvalidTarget);
        }
        let shooter = self
            .participants
            .get(&shooter_id)
            .ok_or(Rejection::UnknownParticipant(shooter_id))?;
        if !shooter.alive {
            return Err(Rejection::NotAlive);
        }
        if shooter.crafting {
            return Err(Rejection::Crafting);
        }
        if shooter.reload_remaining > 0.0 {
            return Err(Rejection::Reloading);
        }
        let target = self
            .participants
            .get(&target_id)
            .ok_or(Rejection::InvalidTarget)?;
        if !target.alive {
            // Died some other way; only the round-end check is owed
            self.check_round_end();
            return Err(Rejection::TargetDead);
        }

        let hit = CombatSystem::roll_hit(shooter.accuracy, &mut self.rng);
        let double_money = shooter.double_money;
        let Some(shooter) = self.participants.get_mut(&shooter_id) else {
            return Err(Rejection::UnknownParticipant(shooter_id));
        };
        shooter.reload_remaining = shooter.reload_total;
        shooter.target = Some(target_id);
        let cooldown = shooter.reload_remaining;

        self.broadcast(ServerMsg::ShotFired {
            shooter_id,
            target_id,
            hit,
            cooldown,
        });
        if !hit {
            return Ok(());
        }

        let Some(target) = self.participants.get_mut(&target_id) else {
            return Ok(());
        };
        if target.shielded {
            target.shielded = false;
            self.broadcast(ServerMsg::ShieldConsumed {
                participant_id: target_id,
            });
            return Ok(());
        }

        let payout = CombatSystem::hit_payout(self.bet, double_money);
        let taken = target.withdraw(payout);
        let target_balance = target.balance;
        let shooter_balance = match self.participants.get_mut(&shooter_id) {
            Some(shooter) => {
                shooter.deposit(taken);
                shooter.balance
            }
            None => 0,
        };
        self.broadcast(ServerMsg::BalanceChanged {
            participant_id: target_id,
            balance: target_balance,
        });
        self.broadcast(ServerMsg::BalanceChanged {
            participant_id: shooter_id,
            balance: shooter_balance,
        });

        info!(shooter_id, target_id, taken, "Participant shot down");
        self.kill(target_id, DeathCause::Shot);
        self.check_round_end();
        Ok(())
    }

    /// Mark dead and announce
    fn kill(&mut self, id: ParticipantId, cause: DeathCause) {
        if let Some(participant) = self.participants.get_mut(&id) {
            participant.alive = false;
            participant.direction = Direction::Idle;
            participant.crafting = false;
            participant.craft_remaining = 0.0;
        }
        self.clear_targets_on(id);
        self.broadcast(ServerMsg::Died {
            participant_id: id,
            cause,
        });
    }

    fn clear_targets_on(&mut self, id: ParticipantId) {
        for participant in self.participants.values_mut() {
            if participant.target == Some(id) {
                participant.target = None;
            }
        }
    }

    fn collect_bets(&mut self) -> Result<(), Rejection> {
        if self.phase != Phase::Round {
            return Err(Rejection::WrongPhase(self.phase));
        }

        let payers: Vec<ParticipantId> = self
            .join_order
            .iter()
            .copied()
            .filter(|id| self.participants.get(id).is_some_and(|p| p.alive))
            .collect();
        for id in payers {
            let Some(participant) = self.participants.get_mut(&id) else {
                continue;
            };
            let taken = participant.withdraw(self.bet);
            let balance = participant.balance;
            let bankrupt = participant.is_bankrupt();
            self.prize_pool += taken;
            if taken > 0 {
                self.broadcast(ServerMsg::BalanceChanged {
                    participant_id: id,
                    balance,
                });
            }
            if bankrupt {
                info!(participant_id = id, "Participant went bankrupt");
                self.kill(id, DeathCause::Bankrupt);
            }
        }

        self.broadcast(ServerMsg::PrizePool {
            amount: self.prize_pool,
        });
        self.check_round_end();
        Ok(())
    }

    fn admin_kill(&mut self, id: ParticipantId) -> Result<(), Rejection> {
        if self.phase != Phase::Round {
            return Err(Rejection::WrongPhase(self.phase));
        }
        let participant = self
            .participants
            .get(&id)
            .ok_or(Rejection::UnknownParticipant(id))?;
        if !participant.alive {
            return Err(Rejection::NotAlive);
        }
        info!(participant_id = id, "Admin kill");
        self.kill(id, DeathCause::Admin);
        self.check_round_end();
        Ok(())
    }

    // ------------------------------------------------------------------
    // Movement, aim and items
    // ------------------------------------------------------------------

    fn alive_in_round(&mut self, id: ParticipantId) -> Result<&mut Participant, Rejection> {
        if self.phase != Phase::Round {
            return Err(Rejection::WrongPhase(self.phase));
        }
        let participant = self
            .participants
            .get_mut(&id)
            .ok_or(Rejection::UnknownParticipant(id))?;
        if !participant.alive {
            return Err(Rejection::NotAlive);
        }
        Ok(participant)
    }

    fn move_participant(&mut self, id: ParticipantId, code: u8) -> Result<(), Rejection> {
        let direction = Direction::from_code(code).ok_or(Rejection::InvalidDirection(code))?;
        let participant = self.alive_in_round(id)?;
        participant.direction = direction;
        let (x, y) = (participant.x, participant.y);
        self.broadcast(ServerMsg::Moved {
            participant_id: id,
            direction: code,
            x,
            y,
        });
        Ok(())
    }

    fn aim(&mut self, id: ParticipantId, trend: AimTrend) -> Result<(), Rejection> {
        let participant = self.alive_in_round(id)?;
        if participant.adjust_accuracy(trend.delta()) {
            let accuracy = participant.accuracy as f32;
            self.broadcast(ServerMsg::StatChanged {
                participant_id: id,
                stat: Stat::Accuracy,
                value: accuracy,
            });
        }
        Ok(())
    }

    fn set_target(&mut self, id: ParticipantId, target: Option<ParticipantId>) -> Result<(), Rejection> {
        if let Some(target) = target {
            if target == id || !self.participants.contains_key(&target) {
                return Err(Rejection::InvalidTarget);
            }
        }
        let participant = self
            .participants
            .get_mut(&id)
            .ok_or(Rejection::UnknownParticipant(id))?;
        participant.target = target;
        self.broadcast(ServerMsg::TargetChanged {
            participant_id: id,
            target_id: target,
        });
        Ok(())
    }

    fn craft(&mut self, id: ParticipantId) -> Result<(), Rejection> {
        let participant = self.alive_in_round(id)?;
        item::start_craft(participant)?;
        let energy = participant.energy as f32;
        self.broadcast(ServerMsg::StatChanged {
            participant_id: id,
            stat: Stat::Energy,
            value: energy,
        });
        self.broadcast(ServerMsg::CraftingChanged {
            participant_id: id,
            crafting: true,
        });
        Ok(())
    }

    fn use_item(&mut self, id: ParticipantId) -> Result<(), Rejection> {
        if self.phase != Phase::Round {
            return Err(Rejection::WrongPhase(self.phase));
        }
        let Some(participant) = self.participants.get_mut(&id) else {
            return Err(Rejection::UnknownParticipant(id));
        };
        if !participant.alive {
            return Err(Rejection::NotAlive);
        }
        let used = item::take_item(participant)?;
        let changed = item::apply(participant, used, &mut self.rng);

        self.broadcast(ServerMsg::ItemUsed {
            participant_id: id,
            item: used,
        });
        self.broadcast_stats(id, changed);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Periodic work
    // ------------------------------------------------------------------

    /// One batched simulation step: movement, reload, crafting, item timers
    fn advance_simulation(&mut self, dt: f32) -> Result<(), Rejection> {
        if !dt.is_finite() || dt < 0.0 {
            return Err(Rejection::InvalidStep(dt));
        }
        if self.phase != Phase::Round {
            return Ok(());
        }

        let mut events = Vec::new();
        for participant in self.participants.values_mut() {
            if !participant.alive {
                continue;
            }

            let (x, y) = PhysicsSystem::integrate(
                participant.x,
                participant.y,
                participant.direction,
                participant.speed,
                dt,
            );
            participant.x = x;
            participant.y = y;
            participant.reload_remaining = PhysicsSystem::decay(participant.reload_remaining, dt);

            if participant.crafting {
                let before = participant.craft_remaining;
                participant.craft_remaining = PhysicsSystem::decay(before, dt);
                if participant.craft_remaining <= 0.0 {
                    let crafted = item::finish_craft(participant, &mut self.rng);
                    events.push(ServerMsg::CraftingChanged {
                        participant_id: participant.id,
                        crafting: false,
                    });
                    events.push(ServerMsg::ItemAcquired {
                        participant_id: participant.id,
                        item: crafted,
                    });
                }
            }

            let before = participant.speed_boost_remaining;
            participant.speed_boost_remaining = PhysicsSystem::decay(before, dt);
            if PhysicsSystem::expired(before, participant.speed_boost_remaining) {
                participant.speed = participant.base_speed;
                events.push(ServerMsg::StatChanged {
                    participant_id: participant.id,
                    stat: Stat::Speed,
                    value: participant.speed,
                });
            }
        }

        for event in events {
            self.broadcast(event);
        }
        Ok(())
    }

    fn bot_think(&mut self, id: ParticipantId) -> Result<(), Rejection> {
        let bot = self
            .participants
            .get(&id)
            .ok_or(Rejection::UnknownParticipant(id))?;
        if !bot.is_bot() {
            return Err(Rejection::NotABot);
        }
        if self.phase != Phase::Round || !bot.alive {
            return Ok(());
        }

        let decision = bot::decide(bot, self.participants.values(), &mut self.rng);

        // Queued like a human's packets
        self.commands.submit(Command::Aim {
            id,
            trend: decision.trend,
        });
        self.commands.submit(Command::Move {
            id,
            direction: decision.direction.code(),
        });
        if let Some(target) = decision.target {
            self.commands.submit(Command::Shoot {
                shooter: id,
                target,
            });
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    fn set_phase(&mut self, phase: Phase) {
        debug!(room_id = %self.room_id, from = ?self.phase, to = ?phase, "Phase transition");
        self.phase = phase;
        self.reporter.report(phase);
        self.broadcast(ServerMsg::PhaseChanged {
            phase,
            round: self.round,
            bet: self.bet,
        });
    }

    fn require_host(&self, id: ParticipantId) -> Result<(), Rejection> {
        if !self.participants.contains_key(&id) {
            return Err(Rejection::UnknownParticipant(id));
        }
        if self.host != Some(id) {
            return Err(Rejection::NotHost);
        }
        Ok(())
    }

    fn first_human(&self) -> Option<ParticipantId> {
        self.join_order
            .iter()
            .copied()
            .find(|id| self.participants.get(id).is_some_and(|p| !p.is_bot()))
    }

    fn solvent_ids(&self) -> Vec<ParticipantId> {
        self.join_order
            .iter()
            .copied()
            .filter(|id| self.participants.get(id).is_some_and(|p| !p.is_bankrupt()))
            .collect()
    }

    fn infos(&self) -> Vec<ParticipantInfo> {
        self.join_order
            .iter()
            .filter_map(|id| self.participants.get(id))
            .map(Participant::info)
            .collect()
    }

    fn broadcast(&self, msg: ServerMsg) {
        self.outbox.broadcast(msg);
    }

    fn broadcast_stats(&self, id: ParticipantId, changed: Vec<(Stat, f32)>) {
        for (stat, value) in changed {
            self.broadcast(ServerMsg::StatChanged {
                participant_id: id,
                stat,
                value,
            });
        }
    }

    #[cfg(test)]
    pub(crate) fn participant_mut(&mut self, id: ParticipantId) -> Option<&mut Participant> {
        self.participants.get_mut(&id)
    }

    #[cfg(test)]
    pub(crate) fn force_phase_for_test(&mut self, phase: Phase) {
        self.phase = phase;
    }

    #[cfg(test)]
    pub(crate) fn set_prize_pool_for_test(&mut self, amount: u64) {
        self.prize_pool = amount;
    }

    #[cfg(test)]
    pub(crate) fn offer(&self, id: ParticipantId) -> Option<&Vec<Option<AugmentId>>> {
        self.offers.get(&id)
    }
}
