//! Bot decision-making and the per-bot driver task
//!
//! A bot is an ordinary participant with a [`BotController`]. Its driver
//! reads the same server messages a socket would, and everything it does
//! goes back through the command queue.

use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tracing::debug;

use crate::ws::protocol::{AimTrend, ParticipantId, ServerMsg};

use super::command::{Command, CommandSender};
use super::participant::{BotController, Direction, Participant};
use super::physics::PhysicsSystem;

/// What a bot wants to do this think
#[derive(Debug, Clone, PartialEq)]
pub struct BotDecision {
    pub trend: AimTrend,
    pub direction: Direction,
    pub target: Option<ParticipantId>,
}

/// Re-roll aim and movement, and pick a shot if the weapon is ready.
///
/// The target is drawn uniformly from living opponents inside the bot's range.
pub fn decide<'a, R: Rng>(
    bot: &Participant,
    others: impl IntoIterator<Item = &'a Participant>,
    rng: &mut R,
) -> BotDecision {
    let trend = AimTrend::ALL.choose(rng).copied().unwrap_or_default();
    let direction = Direction::ALL.choose(rng).copied().unwrap_or_default();

    let target = if bot.can_fire() {
        let in_range: Vec<ParticipantId> = others
            .into_iter()
            .filter(|other| other.id != bot.id && other.alive)
            .filter(|other| PhysicsSystem::within_range(bot.x, bot.y, other.x, other.y, bot.range))
            .map(|other| other.id)
            .collect();
        in_range.choose(rng).copied()
    } else {
        None
    };

    BotDecision {
        trend,
        direction,
        target,
    }
}

/// Answer prompts addressed to the bot
pub fn react(id: ParticipantId, msg: &ServerMsg) -> Option<Command> {
    match msg {
        ServerMsg::AccuracyPool { draft: false, .. } => {
            Some(Command::PickAccuracy { id, index: None })
        }
        ServerMsg::AccuracyTurn {
            participant_id,
            remaining,
        } if *participant_id == id => {
            let first = remaining.first()?;
            Some(Command::PickAccuracy {
                id,
                index: Some(first.index),
            })
        }
        ServerMsg::AugmentOffer { options } => {
            let index = options.iter().position(Option::is_some)?;
            Some(Command::ChooseAugment { id, index })
        }
        _ => None,
    }
}

/// Spawn the task that drives one bot until its inbox closes
pub fn spawn_driver(
    id: ParticipantId,
    controller: &BotController,
    inbox: mpsc::UnboundedReceiver<ServerMsg>,
    commands: CommandSender,
    seed: u64,
) -> JoinHandle<()> {
    let think_interval = controller.think_interval;
    let reaction_ms = controller.reaction_ms;
    tokio::spawn(drive(id, think_interval, reaction_ms, inbox, commands, seed))
}

async fn drive(
    id: ParticipantId,
    think_interval: Duration,
    reaction_ms: (u64, u64),
    mut inbox: mpsc::UnboundedReceiver<ServerMsg>,
    commands: CommandSender,
    seed: u64,
) {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut think = interval(think_interval);
    think.set_missed_tick_behavior(MissedTickBehavior::Skip);

    debug!(participant_id = id, "Bot driver started");

    loop {
        tokio::select! {
            msg = inbox.recv() => {
                let Some(msg) = msg else {
                    break;
                };
                if let Some(command) = react(id, &msg) {
                    let (low, high) = reaction_ms;
                    let delay = rng.gen_range(low..=high.max(low));
                    sleep(Duration::from_millis(delay)).await;
                    if !commands.submit(command) {
                        break;
                    }
                }
            }
            _ = think.tick() => {
                if !commands.submit(Command::BotThink { id }) {
                    break;
                }
            }
        }
    }

    debug!(participant_id = id, "Bot driver stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::command::channel;
    use crate::ws::protocol::{AccuracySlot, AugmentInfo};

    fn bot_at(id: ParticipantId, x: f32, y: f32) -> Participant {
        let mut rng = ChaCha8Rng::seed_from_u64(id as u64);
        let mut p = Participant::new(id, format!("Bot {}", id), Some(BotController::default()), 200, &mut rng);
        p.x = x;
        p.y = y;
        p.range = 300.0;
        p
    }

    #[test]
    fn shoots_only_within_range() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let me = bot_at(1, 0.0, 0.0);
        let near = bot_at(2, 0.0, 100.0);
        let far = bot_at(3, 450.0, 0.0);
        for _ in 0..50 {
            let decision = decide(&me, [&me, &near, &far], &mut rng);
            assert_eq!(decision.target, Some(2));
        }
    }

    #[test]
    fn spreads_shots_across_targets_in_range() {
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let me = bot_at(1, 0.0, 0.0);
        let a = bot_at(2, 0.0, 100.0);
        let b = bot_at(3, 100.0, 0.0);
        let picked: std::collections::HashSet<_> = (0..100)
            .filter_map(|_| decide(&me, [&a, &b], &mut rng).target)
            .collect();
        assert_eq!(picked.len(), 2);
    }

    #[test]
    fn holds_fire_while_busy_or_alone() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let me = bot_at(1, 0.0, 0.0);
        let near = bot_at(2, 0.0, 50.0);

        let mut reloading = me.clone();
        reloading.reload_remaining = 1.0;
        assert_eq!(decide(&reloading, [&near], &mut rng).target, None);

        let mut crafting = me.clone();
        crafting.crafting = true;
        assert_eq!(decide(&crafting, [&near], &mut rng).target, None);

        let mut dead = near.clone();
        dead.alive = false;
        assert_eq!(decide(&me, [&dead], &mut rng).target, None);
    }

    #[test]
    fn reacts_only_to_its_own_prompts() {
        let turn = |participant_id| ServerMsg::AccuracyTurn {
            participant_id,
            remaining: vec![
                AccuracySlot { index: 0, value: 40 },
                AccuracySlot { index: 2, value: 75 },
            ],
        };
        assert_eq!(
            react(5, &turn(5)),
            Some(Command::PickAccuracy { id: 5, index: Some(0) })
        );
        assert_eq!(react(5, &turn(6)), None);
        assert_eq!(
            react(5, &ServerMsg::AccuracyPool { values: vec![30], draft: false }),
            Some(Command::PickAccuracy { id: 5, index: None })
        );
        assert_eq!(
            react(5, &ServerMsg::AccuracyPool { values: vec![30], draft: true }),
            None
        );
    }

    #[test]
    fn picks_the_first_real_augment() {
        let info = AugmentInfo {
            augment_id: 3,
            name: "Quick Draw".into(),
            description: String::new(),
        };
        let offer = ServerMsg::AugmentOffer {
            options: vec![None, Some(info), None],
        };
        assert_eq!(react(9, &offer), Some(Command::ChooseAugment { id: 9, index: 1 }));
        let empty = ServerMsg::AugmentOffer {
            options: vec![None, None, None],
        };
        assert_eq!(react(9, &empty), None);
    }

    #[tokio::test(start_paused = true)]
    async fn driver_thinks_and_answers_prompts() {
        let (commands, mut rx) = channel();
        let (tx, inbox) = mpsc::unbounded_channel();
        let handle = spawn_driver(4, &BotController::default(), inbox, commands, 1);

        // First interval tick fires immediately
        assert_eq!(rx.recv().await, Some(Command::BotThink { id: 4 }));

        tx.send(ServerMsg::AccuracyPool { values: vec![50], draft: false })
            .unwrap();
        let mut answered = false;
        for _ in 0..4 {
            match rx.recv().await {
                Some(Command::PickAccuracy { id: 4, index: None }) => {
                    answered = true;
                    break;
                }
                Some(Command::BotThink { id: 4 }) => {}
                other => panic!("unexpected command {:?}", other),
            }
        }
        assert!(answered);

        drop(tx);
        handle.await.unwrap();
    }
}
