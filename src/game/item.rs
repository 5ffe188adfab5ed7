//! Consumable items: crafting and effects

use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;

use crate::ws::protocol::{ItemKind, Stat};

use super::participant::{Participant, MAX_ENERGY};

pub const CRAFT_ENERGY_COST: u32 = 40;
pub const CRAFT_SECONDS: f32 = 3.0;
pub const ADRENALINE_MULTIPLIER: f32 = 1.5;
pub const ADRENALINE_SECONDS: f32 = 5.0;
pub const BATTERY_ENERGY: u32 = 50;
pub const REROLL_ACCURACY: (u32, u32) = (30, 90);
pub const REROLL_RANGE: (f32, f32) = (200.0, 400.0);

/// Item drop weights for finished crafts
const DROP_TABLE: [(ItemKind, u32); 4] = [
    (ItemKind::Adrenaline, 30),
    (ItemKind::Battery, 30),
    (ItemKind::Shield, 20),
    (ItemKind::Reroll, 20),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ItemError {
    #[error("already crafting")]
    AlreadyCrafting,
    #[error("item slot is full")]
    SlotFull,
    #[error("not enough energy")]
    NotEnoughEnergy,
    #[error("no item held")]
    NoItem,
}

/// Pay the energy cost and start the craft countdown
pub fn start_craft(participant: &mut Participant) -> Result<(), ItemError> {
    if participant.crafting {
        return Err(ItemError::AlreadyCrafting);
    }
    if participant.item.is_some() {
        return Err(ItemError::SlotFull);
    }
    if participant.energy < CRAFT_ENERGY_COST {
        return Err(ItemError::NotEnoughEnergy);
    }
    participant.energy -= CRAFT_ENERGY_COST;
    participant.crafting = true;
    participant.craft_remaining = CRAFT_SECONDS;
    Ok(())
}

/// Weighted roll over the drop table
pub fn roll_item<R: Rng>(rng: &mut R) -> ItemKind {
    match WeightedIndex::new(DROP_TABLE.iter().map(|(_, weight)| *weight)) {
        Ok(dist) => DROP_TABLE[dist.sample(rng)].0,
        Err(_) => ItemKind::Battery,
    }
}

/// Finish a craft, filling the item slot
pub fn finish_craft<R: Rng>(participant: &mut Participant, rng: &mut R) -> ItemKind {
    let item = roll_item(rng);
    participant.crafting = false;
    participant.craft_remaining = 0.0;
    participant.item = Some(item);
    item
}

/// Empty the item slot
pub fn take_item(participant: &mut Participant) -> Result<ItemKind, ItemError> {
    participant.item.take().ok_or(ItemError::NoItem)
}

/// Apply an item's effect. Returns the stats that changed.
pub fn apply<R: Rng>(participant: &mut Participant, item: ItemKind, rng: &mut R) -> Vec<(Stat, f32)> {
    match item {
        ItemKind::Adrenaline => {
            participant.speed = participant.base_speed * ADRENALINE_MULTIPLIER;
            participant.speed_boost_remaining = ADRENALINE_SECONDS;
            vec![(Stat::Speed, participant.speed)]
        }
        ItemKind::Battery => {
            participant.energy = (participant.energy + BATTERY_ENERGY).min(MAX_ENERGY);
            vec![(Stat::Energy, participant.energy as f32)]
        }
        ItemKind::Shield => {
            participant.shielded = true;
            Vec::new()
        }
        ItemKind::Reroll => {
            participant.set_accuracy(rng.gen_range(REROLL_ACCURACY.0..=REROLL_ACCURACY.1) as i64);
            participant.range = rng.gen_range(REROLL_RANGE.0..=REROLL_RANGE.1);
            vec![
                (Stat::Accuracy, participant.accuracy as f32),
                (Stat::Range, participant.range),
            ]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn participant() -> Participant {
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        Participant::new(1, "p".into(), None, 200, &mut rng)
    }

    #[test]
    fn crafting_costs_energy_once() {
        let mut p = participant();
        start_craft(&mut p).unwrap();
        assert!(p.crafting);
        assert_eq!(p.energy, MAX_ENERGY - CRAFT_ENERGY_COST);
        assert_eq!(start_craft(&mut p), Err(ItemError::AlreadyCrafting));
        assert_eq!(p.energy, MAX_ENERGY - CRAFT_ENERGY_COST);
    }

    #[test]
    fn crafting_needs_energy_and_a_free_slot() {
        let mut p = participant();
        p.energy = CRAFT_ENERGY_COST - 1;
        assert_eq!(start_craft(&mut p), Err(ItemError::NotEnoughEnergy));

        p.energy = MAX_ENERGY;
        p.item = Some(ItemKind::Shield);
        assert_eq!(start_craft(&mut p), Err(ItemError::SlotFull));
        assert!(!p.crafting);
    }

    #[test]
    fn finishing_fills_the_slot() {
        let mut rng = ChaCha8Rng::seed_from_u64(8);
        let mut p = participant();
        start_craft(&mut p).unwrap();
        let item = finish_craft(&mut p, &mut rng);
        assert_eq!(p.item, Some(item));
        assert!(!p.crafting);
        assert_eq!(take_item(&mut p), Ok(item));
        assert_eq!(take_item(&mut p), Err(ItemError::NoItem));
    }

    #[test]
    fn item_effects() {
        let mut rng = ChaCha8Rng::seed_from_u64(8);
        let mut p = participant();

        apply(&mut p, ItemKind::Adrenaline, &mut rng);
        assert_eq!(p.speed, p.base_speed * ADRENALINE_MULTIPLIER);
        assert_eq!(p.speed_boost_remaining, ADRENALINE_SECONDS);

        p.energy = 80;
        apply(&mut p, ItemKind::Battery, &mut rng);
        assert_eq!(p.energy, MAX_ENERGY);

        apply(&mut p, ItemKind::Shield, &mut rng);
        assert!(p.shielded);

        for _ in 0..50 {
            apply(&mut p, ItemKind::Reroll, &mut rng);
            assert!((REROLL_ACCURACY.0..=REROLL_ACCURACY.1).contains(&p.accuracy));
            assert!(p.range >= REROLL_RANGE.0 && p.range <= REROLL_RANGE.1);
        }
    }

    #[test]
    fn every_item_can_drop() {
        let mut rng = ChaCha8Rng::seed_from_u64(21);
        let mut seen = std::collections::HashSet::new();
        for _ in 0..200 {
            seen.insert(roll_item(&mut rng));
        }
        assert_eq!(seen.len(), DROP_TABLE.len());
    }
}
