//! Combat and economy resolution - hit rolls, payouts, prize split

use rand::Rng;

/// Betting amount per round, indexed by round number - 1
pub const BET_SCHEDULE: [u64; 5] = [10, 20, 30, 50, 80];

/// Combat system for hit rolls and money movement
pub struct CombatSystem;

impl CombatSystem {
    /// Bet for a round; rounds past the schedule repeat the last entry
    pub fn bet_for_round(round: u32) -> u64 {
        let idx = (round.max(1) as usize - 1).min(BET_SCHEDULE.len() - 1);
        BET_SCHEDULE[idx]
    }

    /// Roll a uniform draw in [0, 100); hit if it lands below accuracy
    pub fn roll_hit<R: Rng>(accuracy: u32, rng: &mut R) -> bool {
        let draw: u32 = rng.gen_range(0..100);
        draw < accuracy
    }

    /// Money the shooter takes from the target on a hit
    pub fn hit_payout(bet: u64, double_money: bool) -> u64 {
        if double_money {
            bet.saturating_mul(2)
        } else {
            bet
        }
    }

    /// Amount that can actually leave a balance
    pub fn clamp_withdrawal(balance: u64, amount: u64) -> u64 {
        amount.min(balance)
    }

    /// Even split of the pool among survivors.
    /// Returns (share per survivor, amount paid out); remainder is dropped.
    pub fn split_prize(pool: u64, survivors: usize) -> (u64, u64) {
        if survivors == 0 {
            return (0, 0);
        }
        let share = pool / survivors as u64;
        (share, share * survivors as u64)
    }
}
