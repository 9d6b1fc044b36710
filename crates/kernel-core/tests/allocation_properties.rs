use std::collections::BTreeMap;

use contracts::AllocationStrategy;
use kernel_core::economy::{allocate, Allocation};
use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;

fn wanted_map(wants: &[u64]) -> BTreeMap<String, u64> {
    wants
        .iter()
        .enumerate()
        .map(|(idx, want)| (format!("agent_{idx:02}"), *want))
        .collect()
}

fn strategy_for(proportional: bool) -> AllocationStrategy {
    if proportional {
        AllocationStrategy::Proportional
    } else {
        AllocationStrategy::Stochastic
    }
}

fn run(
    strategy: AllocationStrategy,
    pool: u64,
    wanted: &BTreeMap<String, u64>,
    seed: u64,
) -> Result<Allocation, TestCaseError> {
    let mut rng = StdRng::seed_from_u64(seed);
    allocate(strategy, pool, wanted, &mut rng).map_err(|err| TestCaseError::fail(err.to_string()))
}

proptest! {
    #[test]
    fn property_grants_stay_within_want_and_pool(
        seed in any::<u64>(),
        pool in 0_u64..400,
        wants in prop::collection::vec(0_u64..120, 1..9),
        proportional in any::<bool>(),
    ) {
        let wanted = wanted_map(&wants);
        let allocation = run(strategy_for(proportional), pool, &wanted, seed)?;
        prop_assert!(allocation.total_granted() <= pool);
        prop_assert_eq!(allocation.remaining_pool, pool - allocation.total_granted());
        for (agent_id, want) in &wanted {
            prop_assert!(allocation.granted_to(agent_id) <= *want);
        }
    }

    #[test]
    fn property_pool_is_exhausted_exactly_under_scarcity(
        seed in any::<u64>(),
        pool in 0_u64..400,
        wants in prop::collection::vec(0_u64..120, 1..9),
        proportional in any::<bool>(),
    ) {
        let wanted = wanted_map(&wants);
        let total_want = wants.iter().sum::<u64>();
        let allocation = run(strategy_for(proportional), pool, &wanted, seed)?;
        if total_want >= pool {
            prop_assert_eq!(allocation.remaining_pool, 0);
        } else {
            prop_assert_eq!(allocation.total_granted(), total_want);
            prop_assert_eq!(&allocation.granted, &wanted);
        }
    }

    #[test]
    fn property_proportional_shares_within_one_unit_of_ideal(
        seed in any::<u64>(),
        pool in 1_u64..400,
        wants in prop::collection::vec(1_u64..120, 2..9),
    ) {
        let total_want = wants.iter().sum::<u64>();
        prop_assume!(total_want > pool);
        let wanted = wanted_map(&wants);
        let allocation = run(AllocationStrategy::Proportional, pool, &wanted, seed)?;
        for (agent_id, want) in &wanted {
            let ideal = pool * want / total_want;
            let granted = allocation.granted_to(agent_id);
            prop_assert!(granted >= ideal, "{} got {} below ideal {}", agent_id, granted, ideal);
            prop_assert!(granted <= ideal + 1, "{} got {} above ideal {}", agent_id, granted, ideal);
        }
    }

    #[test]
    fn property_same_seed_same_allocation(
        seed in any::<u64>(),
        pool in 0_u64..200,
        wants in prop::collection::vec(0_u64..80, 1..7),
        proportional in any::<bool>(),
    ) {
        let wanted = wanted_map(&wants);
        let strategy = strategy_for(proportional);
        let first = run(strategy, pool, &wanted, seed)?;
        let second = run(strategy, pool, &wanted, seed)?;
        prop_assert_eq!(first, second);
    }
}
