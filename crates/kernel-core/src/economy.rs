//! Pool economy: splits a finite pool among agents' requests.
//!
//! Both strategies are pure functions of `(pool, wanted, rng)`. The caller owns
//! the seeded RNG stream, so the same seed and the same requests always yield
//! the same grants.

use std::collections::BTreeMap;

use contracts::AllocationStrategy;
use rand::Rng;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvariantBreach {
    #[error("agent {agent_id} was granted {granted} but wanted only {wanted}")]
    GrantExceedsWant {
        agent_id: String,
        granted: u64,
        wanted: u64,
    },
    #[error("granted {granted} units out of a pool of {pool}")]
    OverAllocated { granted: u64, pool: u64 },
    #[error("remaining pool {remaining} != pool {pool} - granted {granted}")]
    RemainingMismatch {
        pool: u64,
        granted: u64,
        remaining: u64,
    },
    #[error("grant for unknown agent {0}")]
    UnknownGrantee(String),
    #[error("proportional allocation did not converge within {passes} passes")]
    NonConvergent { passes: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Allocation {
    pub granted: BTreeMap<String, u64>,
    pub remaining_pool: u64,
}

impl Allocation {
    /// Saturates at `u64::MAX`; anything that large is already over any pool.
    pub fn total_granted(&self) -> u64 {
        let total = self.granted.values().map(|granted| u128::from(*granted)).sum::<u128>();
        u64::try_from(total).unwrap_or(u64::MAX)
    }

    pub fn granted_to(&self, agent_id: &str) -> u64 {
        self.granted.get(agent_id).copied().unwrap_or(0)
    }

    /// Check the conservation invariants against the inputs that produced this allocation.
    pub fn verify(&self, pool: u64, wanted: &BTreeMap<String, u64>) -> Result<(), InvariantBreach> {
        for (agent_id, granted) in &self.granted {
            let want = wanted
                .get(agent_id)
                .copied()
                .ok_or_else(|| InvariantBreach::UnknownGrantee(agent_id.clone()))?;
            if *granted > want {
                return Err(InvariantBreach::GrantExceedsWant {
                    agent_id: agent_id.clone(),
                    granted: *granted,
                    wanted: want,
                });
            }
        }
        let granted = self.total_granted();
        if granted > pool {
            return Err(InvariantBreach::OverAllocated { granted, pool });
        }
        if pool - granted != self.remaining_pool {
            return Err(InvariantBreach::RemainingMismatch {
                pool,
                granted,
                remaining: self.remaining_pool,
            });
        }
        Ok(())
    }
}

/// Run `strategy` and verify the result before handing it back.
pub fn allocate<R: Rng + ?Sized>(
    strategy: AllocationStrategy,
    pool: u64,
    wanted: &BTreeMap<String, u64>,
    rng: &mut R,
) -> Result<Allocation, InvariantBreach> {
    let allocation = match strategy {
        AllocationStrategy::Stochastic => assign_stochastic(pool, wanted, rng),
        AllocationStrategy::Proportional => assign_proportional(pool, wanted, rng)?,
    };
    allocation.verify(pool, wanted)?;
    Ok(allocation)
}

/// Hand out the pool one unit at a time, each to a uniformly drawn agent with unmet want.
pub fn assign_stochastic<R: Rng + ?Sized>(
    pool: u64,
    wanted: &BTreeMap<String, u64>,
    rng: &mut R,
) -> Allocation {
    let agent_ids = wanted.keys().cloned().collect::<Vec<_>>();
    let mut open_want = wanted.values().copied().collect::<Vec<_>>();
    let mut granted = vec![0_u64; agent_ids.len()];
    let mut remaining = pool;

    while remaining > 0 {
        let eligible = open_want
            .iter()
            .enumerate()
            .filter(|(_, want)| **want > 0)
            .map(|(idx, _)| idx)
            .collect::<Vec<_>>();
        if eligible.is_empty() {
            break;
        }
        let pick = eligible[rng.gen_range(0..eligible.len())];
        open_want[pick] -= 1;
        granted[pick] += 1;
        remaining -= 1;
    }

    Allocation {
        granted: agent_ids.into_iter().zip(granted).collect(),
        remaining_pool: remaining,
    }
}

/// Ration the pool proportionally to each agent's want.
///
/// Without scarcity everyone gets exactly what they asked for. Under scarcity
/// each pass grants `floor(remaining * want / total_want)`; the fractional
/// leftovers go one unit at a time to agents that were rounded down, drawn
/// with probability proportional to their open want, at most one extra unit per
/// agent per pass.
pub fn assign_proportional<R: Rng + ?Sized>(
    pool: u64,
    wanted: &BTreeMap<String, u64>,
    rng: &mut R,
) -> Result<Allocation, InvariantBreach> {
    let agent_ids = wanted.keys().cloned().collect::<Vec<_>>();
    let mut open_want = wanted.values().copied().collect::<Vec<_>>();
    let mut granted = vec![0_u64; agent_ids.len()];
    let mut remaining = pool;
    let max_passes = agent_ids.len() + 1;
    let mut passes = 0_usize;

    loop {
        // Requests are unbounded u64s, so their sum is taken in u128.
        let total_want = open_want.iter().map(|want| u128::from(*want)).sum::<u128>();
        if total_want == 0 || remaining == 0 {
            break;
        }
        if total_want <= u128::from(remaining) {
            for (idx, want) in open_want.iter_mut().enumerate() {
                granted[idx] += *want;
                remaining -= *want;
                *want = 0;
            }
            break;
        }

        passes += 1;
        if passes > max_passes {
            return Err(InvariantBreach::NonConvergent { passes: max_passes });
        }

        let pass_pool = remaining;
        let mut rounded_down = vec![false; agent_ids.len()];
        for idx in 0..agent_ids.len() {
            let want = open_want[idx];
            if want == 0 {
                continue;
            }
            let scaled = u128::from(pass_pool) * u128::from(want);
            let divisor = total_want;
            let floor = u64::try_from(scaled / divisor).unwrap_or(u64::MAX);
            let share = floor.min(want);
            rounded_down[idx] = share < want && scaled % divisor != 0;
            granted[idx] += share;
            open_want[idx] -= share;
            remaining -= share;
        }

        if remaining == 0 {
            break;
        }

        let still_wanting = open_want.iter().filter(|want| **want > 0).count() as u64;
        if remaining > still_wanting {
            continue;
        }

        let mut candidates = (0..agent_ids.len())
            .filter(|idx| rounded_down[*idx] && open_want[*idx] > 0)
            .collect::<Vec<_>>();
        while remaining > 0 && !candidates.is_empty() {
            let weights = candidates
                .iter()
                .map(|idx| open_want[*idx])
                .collect::<Vec<_>>();
            let total_weight = weights.iter().map(|weight| u128::from(*weight)).sum::<u128>();
            let roll = rng.gen_range(0..total_weight);
            let Some(slot) = pick_weighted_index(roll, &weights) else {
                break;
            };
            let idx = candidates.remove(slot);
            granted[idx] += 1;
            open_want[idx] -= 1;
            remaining -= 1;
        }
    }

    Ok(Allocation {
        granted: agent_ids.into_iter().zip(granted).collect(),
        remaining_pool: remaining,
    })
}

/// Map `roll` in `0..sum(weights)` onto the index owning that slice of the total.
fn pick_weighted_index(roll: u128, weights: &[u64]) -> Option<usize> {
    let total = weights.iter().map(|weight| u128::from(*weight)).sum::<u128>();
    if total == 0 {
        return None;
    }
    let mut cursor = roll % total;
    for (idx, weight) in weights.iter().enumerate() {
        let weight = u128::from(*weight);
        if weight == 0 {
            continue;
        }
        if cursor < weight {
            return Some(idx);
        }
        cursor -= weight;
    }
    Some(weights.len() - 1)
}
