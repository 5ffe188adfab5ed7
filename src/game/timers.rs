//! Periodic clocks feeding the command queue

use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{info, warn};

use crate::util::time::{tick_delta, tick_duration, SIMULATION_TPS};

use super::command::{Command, CommandSender};

/// Submit one batched simulation step per tick until the queue closes.
///
/// Late ticks are skipped rather than replayed, so a stalled worker never
/// receives a burst of catch-up steps.
pub async fn run_simulation_clock(commands: CommandSender) {
    info!(tps = SIMULATION_TPS, "Simulation clock started");

    let dt = tick_delta();
    let mut ticks = interval(tick_duration());
    ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticks.tick().await;
        if !commands.submit(Command::AdvanceSimulation { dt }) {
            warn!("Command queue closed, stopping simulation clock");
            break;
        }
    }
}

/// Submit a betting deduction every `every`
pub async fn run_betting_clock(commands: CommandSender, every: Duration) {
    info!(interval_secs = every.as_secs(), "Betting clock started");

    let mut ticks = interval(every);
    ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // Skip the immediate first tick
    ticks.tick().await;

    loop {
        ticks.tick().await;
        if !commands.submit(Command::CollectBets) {
            warn!("Command queue closed, stopping betting clock");
            break;
        }
    }
}
