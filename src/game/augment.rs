//! Augment catalog, weighted option generation and effect application

use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;

use crate::ws::protocol::{AugmentId, AugmentInfo, Stat};

use super::participant::Participant;

/// Number of options offered per augment phase
pub const OFFER_SIZE: usize = 3;

/// What an augment does once chosen
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AugmentEffect {
    Accuracy(i32),
    Range(f32),
    Reload(f32),
    Speed(f32),
    /// Hit payouts are doubled
    DoubleMoney,
}

#[derive(Debug, Clone, Copy)]
pub struct AugmentDef {
    pub id: AugmentId,
    pub name: &'static str,
    pub description: &'static str,
    pub effect: AugmentEffect,
    pub weight: u32,
}

impl AugmentDef {
    pub fn info(&self) -> AugmentInfo {
        AugmentInfo {
            augment_id: self.id,
            name: self.name.to_string(),
            description: self.description.to_string(),
        }
    }
}

pub const CATALOG: [AugmentDef; 8] = [
    AugmentDef {
        id: 1,
        name: "Steady Hands",
        description: "+10 accuracy",
        effect: AugmentEffect::Accuracy(10),
        weight: 30,
    },
    AugmentDef {
        id: 2,
        name: "Eagle Eye",
        description: "+100 range",
        effect: AugmentEffect::Range(100.0),
        weight: 25,
    },
    AugmentDef {
        id: 3,
        name: "Quick Draw",
        description: "-0.4s reload",
        effect: AugmentEffect::Reload(-0.4),
        weight: 25,
    },
    AugmentDef {
        id: 4,
        name: "Double Down",
        description: "Hits pay out twice the bet",
        effect: AugmentEffect::DoubleMoney,
        weight: 10,
    },
    AugmentDef {
        id: 5,
        name: "Marksman",
        description: "+20 accuracy",
        effect: AugmentEffect::Accuracy(20),
        weight: 10,
    },
    AugmentDef {
        id: 6,
        name: "Long Barrel",
        description: "+200 range",
        effect: AugmentEffect::Range(200.0),
        weight: 10,
    },
    AugmentDef {
        id: 7,
        name: "Hair Trigger",
        description: "-0.8s reload",
        effect: AugmentEffect::Reload(-0.8),
        weight: 8,
    },
    AugmentDef {
        id: 8,
        name: "Fleet Foot",
        description: "+30 movement speed",
        effect: AugmentEffect::Speed(30.0),
        weight: 15,
    },
];

pub fn lookup(id: AugmentId) -> Option<&'static AugmentDef> {
    CATALOG.iter().find(|def| def.id == id)
}

/// Draw up to three distinct augments the participant does not own.
///
/// Sampling is weighted and without replacement: after each pick the chosen
/// entry leaves the pool and the weights are re-normalised. Missing slots
/// are padded with `None`, so the result always has `OFFER_SIZE` entries.
pub fn generate_options<R: Rng>(owned: &[AugmentId], rng: &mut R) -> Vec<Option<AugmentId>> {
    let mut pool: Vec<&AugmentDef> = CATALOG.iter().filter(|def| !owned.contains(&def.id)).collect();
    let mut options = Vec::with_capacity(OFFER_SIZE);

    while options.len() < OFFER_SIZE && !pool.is_empty() {
        let Ok(dist) = WeightedIndex::new(pool.iter().map(|def| def.weight)) else {
            break;
        };
        let picked = pool.swap_remove(dist.sample(rng));
        options.push(Some(picked.id));
    }

    options.resize(OFFER_SIZE, None);
    options
}

/// Apply an augment to a participant and record it.
/// Returns the stats whose values changed, for broadcasting.
pub fn apply(participant: &mut Participant, def: &AugmentDef) -> Vec<(Stat, f32)> {
    participant.augments.push(def.id);

    match def.effect {
        AugmentEffect::Accuracy(delta) => {
            if participant.adjust_accuracy(delta) {
                vec![(Stat::Accuracy, participant.accuracy as f32)]
            } else {
                Vec::new()
            }
        }
        AugmentEffect::Range(delta) => {
            participant.adjust_range(delta);
            vec![(Stat::Range, participant.range)]
        }
        AugmentEffect::Reload(delta) => {
            participant.adjust_reload(delta);
            vec![(Stat::ReloadTime, participant.reload_total)]
        }
        AugmentEffect::Speed(delta) => {
            participant.base_speed += delta;
            participant.speed += delta;
            vec![(Stat::Speed, participant.speed)]
        }
        AugmentEffect::DoubleMoney => {
            participant.double_money = true;
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use std::collections::HashSet;

    #[test]
    fn catalog_ids_are_unique_and_weighted() {
        let ids: HashSet<_> = CATALOG.iter().map(|def| def.id).collect();
        assert_eq!(ids.len(), CATALOG.len());
        assert!(!ids.contains(&0));
        assert!(CATALOG.iter().all(|def| def.weight > 0));
    }

    #[test]
    fn options_skip_owned_and_never_repeat() {
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let owned = [1, 4, 6];
        for _ in 0..500 {
            let options = generate_options(&owned, &mut rng);
            assert_eq!(options.len(), OFFER_SIZE);
            let ids: Vec<_> = options.iter().flatten().copied().collect();
            assert_eq!(ids.len(), OFFER_SIZE);
            assert!(ids.iter().all(|id| !owned.contains(id)));
            let distinct: HashSet<_> = ids.iter().collect();
            assert_eq!(distinct.len(), ids.len());
        }
    }

    #[test]
    fn single_remaining_augment_is_padded() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let owned: Vec<AugmentId> = CATALOG.iter().map(|d| d.id).filter(|id| *id != 5).collect();
        let options = generate_options(&owned, &mut rng);
        assert_eq!(options, vec![Some(5), None, None]);
    }

    #[test]
    fn exhausted_catalog_offers_nothing() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let owned: Vec<AugmentId> = CATALOG.iter().map(|d| d.id).collect();
        assert_eq!(generate_options(&owned, &mut rng), vec![None, None, None]);
    }

    #[test]
    fn heavier_augments_show_up_more_often() {
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let mut first_slot = [0u32; 9];
        for _ in 0..4000 {
            if let Some(Some(id)) = generate_options(&[], &mut rng).first() {
                first_slot[*id as usize] += 1;
            }
        }
        // weight 30 vs weight 8
        assert!(first_slot[1] > first_slot[7] * 2);
    }

    #[test]
    fn apply_records_and_changes_stats() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut p = Participant::new(1, "p".into(), None, 200, &mut rng);
        p.accuracy = 95;

        let changed = apply(&mut p, lookup(5).unwrap());
        assert_eq!(p.accuracy, 100);
        assert_eq!(changed, vec![(Stat::Accuracy, 100.0)]);

        let changed = apply(&mut p, lookup(4).unwrap());
        assert!(changed.is_empty());
        assert!(p.double_money);
        assert_eq!(p.augments, vec![5, 4]);
    }
}
