//! Random swap workloads for benches, property tests and the CLI.
//!
//! Builds a funded pool fixture with liquidity spread over several ranges
//! and drives it with random exact-input and exact-output swaps.

use crate::core::currency::Currency;
use crate::core::pool_key::PoolKey;
use crate::core::state::{MemoryState, StateDb};
use crate::core::vault;
use crate::math::{MathError, Q96};
use crate::pool::error::PoolError;
use crate::pool::manager::PoolManager;
use crate::pool::params::{ModifyLiquidityParams, SwapParams};
use crate::simulation::net_out;
use crate::simulation::scenario::{Scenario, Step};
use alloy_primitives::{Address, U256};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub const TOKEN_A: Address = Address::new([0x0a; 20]);
pub const TOKEN_B: Address = Address::new([0x0b; 20]);
pub const LIQUIDITY_PROVIDER: Address = Address::new([0x1f; 20]);
pub const TRADER: Address = Address::new([0x7e; 20]);

/// Balance given to each fixture account in each currency.
const FIXTURE_FUNDING: u128 = 1_000_000_000_000_000_000_000_000_000;

/// Configuration for a random swap workload.
#[derive(Debug, Clone)]
pub struct SwapWorkloadConfig {
    /// Number of swaps to generate.
    pub swaps: usize,
    /// Smallest absolute swap amount.
    pub min_amount: u64,
    /// Largest absolute swap amount.
    pub max_amount: u64,
    /// Share of swaps that are exact output.
    pub exact_output_ratio: f64,
    /// Seed for reproducible workloads; random when `None`.
    pub seed: Option<u64>,
}

impl Default for SwapWorkloadConfig {
    fn default() -> Self {
        Self {
            swaps: 100,
            min_amount: 1_000,
            max_amount: 1_000_000_000_000_000,
            exact_output_ratio: 0.25,
            seed: None,
        }
    }
}

/// Outcome counters of a workload run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkloadReport {
    pub executed: usize,
    pub failed: usize,
    pub ticks_crossed: u64,
}

/// Generate random unbounded swaps.
pub fn generate_swaps(config: &SwapWorkloadConfig) -> Vec<SwapParams> {
    let mut rng = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let low = config.min_amount.max(1);
    let high = config.max_amount.max(low);
    let ratio = config.exact_output_ratio.clamp(0.0, 1.0);

    (0..config.swaps)
        .map(|_| {
            let zero_for_one = rng.gen_bool(0.5);
            let amount = i128::from(rng.gen_range(low..=high));
            let amount = if rng.gen_bool(ratio) { -amount } else { amount };
            SwapParams::unbounded(zero_for_one, amount)
        })
        .collect()
}

/// The fixture pool: `TOKEN_A`/`TOKEN_B`, 0.3% fee, spacing 60.
pub fn fixture_key() -> PoolKey {
    PoolKey::sorted(Currency::new(TOKEN_A), Currency::new(TOKEN_B), 3_000, 60)
}

/// A pool at price 1 with `liquidity` in each of `ranges`, and a funded
/// trader.
pub fn pool_fixture(
    liquidity: u128,
    ranges: &[(i32, i32)],
) -> Result<(MemoryState, PoolManager, PoolKey), PoolError> {
    let mut host = MemoryState::new();
    let mut manager = PoolManager::new();
    let key = fixture_key();
    for account in [LIQUIDITY_PROVIDER, TRADER] {
        for currency in [key.currency0, key.currency1] {
            vault::mint(&mut host, currency, account, U256::from(FIXTURE_FUNDING))?;
        }
    }
    manager.initialize(key, Q96)?;

    let delta = i128::try_from(liquidity).map_err(|_| MathError::Overflow)?;
    manager.lock(&mut host, LIQUIDITY_PROVIDER, |m, h| {
        for &(lower, upper) in ranges {
            m.modify_liquidity(&key, &ModifyLiquidityParams::new(lower, upper, delta))?;
        }
        net_out(m, h, LIQUIDITY_PROVIDER, &key)
    })?;
    Ok((host, manager, key))
}

/// Execute each swap in its own settled lock as `trader`.
pub fn run_swaps(
    host: &mut dyn StateDb,
    manager: &mut PoolManager,
    key: &PoolKey,
    trader: Address,
    swaps: &[SwapParams],
) -> WorkloadReport {
    let mut report = WorkloadReport::default();
    for params in swaps {
        let outcome = manager.lock(host, trader, |m, h| {
            let result = m.swap_detailed(key, params)?;
            net_out(m, h, trader, key)?;
            Ok(result)
        });
        match outcome {
            Ok(result) => {
                report.executed += 1;
                report.ticks_crossed += u64::from(result.ticks_crossed);
            }
            Err(_) => report.failed += 1,
        }
    }
    report
}

/// A scenario setting up the fixture pool followed by random swaps.
pub fn generate_scenario(config: &SwapWorkloadConfig) -> Scenario {
    let key = fixture_key();
    let mut steps = Vec::with_capacity(config.swaps + 8);
    steps.push(Step::Initialize {
        pool: key,
        tick: Some(0),
        sqrt_price_x96: None,
    });
    for account in [LIQUIDITY_PROVIDER, TRADER] {
        for currency in [key.currency0, key.currency1] {
            steps.push(Step::Fund {
                account,
                currency,
                amount: FIXTURE_FUNDING.to_string(),
            });
        }
    }
    for (lower, upper) in [(-600, 600), (-6_000, 6_000), (-60_000, 60_000)] {
        steps.push(Step::ModifyLiquidity {
            caller: LIQUIDITY_PROVIDER,
            pool: key,
            tick_lower: lower,
            tick_upper: upper,
            liquidity_delta: "1000000000000000000000".to_string(),
            salt: Default::default(),
        });
    }
    steps.extend(generate_swaps(config).into_iter().map(|params| Step::Swap {
        caller: TRADER,
        pool: key,
        zero_for_one: params.zero_for_one,
        amount_specified: params.amount_specified.to_string(),
        sqrt_price_limit_x96: None,
    }));
    Scenario { block: 0, steps }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::scenario::ScenarioRunner;

    #[test]
    fn test_generate_swaps_respects_config() {
        let config = SwapWorkloadConfig {
            swaps: 50,
            min_amount: 10,
            max_amount: 20,
            exact_output_ratio: 0.0,
            seed: Some(7),
        };
        let swaps = generate_swaps(&config);
        assert_eq!(swaps.len(), 50);
        assert!(swaps
            .iter()
            .all(|s| (10..=20).contains(&s.amount_specified)));
        // seeded workloads are reproducible
        assert_eq!(swaps, generate_swaps(&config));
    }

    #[test]
    fn test_random_swaps_against_fixture() {
        let (mut host, mut manager, key) =
            pool_fixture(1_000_000_000_000_000_000, &[(-600, 600), (-6_000, 6_000)]).unwrap();
        let swaps = generate_swaps(&SwapWorkloadConfig {
            swaps: 40,
            seed: Some(42),
            ..Default::default()
        });
        let report = run_swaps(&mut host, &mut manager, &key, TRADER, &swaps);
        assert_eq!(report.executed + report.failed, 40);
        assert_eq!(report.failed, 0);
        assert!(!manager.is_locked());
    }

    #[test]
    fn test_generated_scenario_runs() {
        let scenario = generate_scenario(&SwapWorkloadConfig {
            swaps: 10,
            seed: Some(1),
            ..Default::default()
        });
        let json = scenario.to_json().unwrap();
        let parsed = Scenario::from_json(&json).unwrap();
        let report = ScenarioRunner::run(&parsed);
        assert_eq!(report.failures(), 0);
        assert_eq!(report.pools.len(), 1);
    }
}
