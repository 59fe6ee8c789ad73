//! Self-repaying debt example.
//!
//! Deposits yield-bearing collateral into the alchemist, mints synthetic
//! debt against it, stakes the synthetic in the transmuter, and lets
//! harvested yield both repay the debt and convert the stake.

use alloy_primitives::{Address, U256};
use dex_engine::core::currency::Currency;
use dex_engine::core::state::{MemoryState, StateDb};
use dex_engine::core::vault;
use dex_engine::pool::manager::PoolManager;
use dex_engine::synthetics::alchemist::{Alchemist, AlchemistError};
use dex_engine::synthetics::transmuter::Transmuter;

const E18: u128 = 1_000_000_000_000_000_000;

fn fmt_e18(value: U256) -> String {
    let whole = value / U256::from(E18);
    let frac = (value % U256::from(E18)) / U256::from(10_000_000_000_000_000u64);
    format!("{}.{:02}", whole, frac)
}

fn main() -> Result<(), AlchemistError> {
    println!("╔══════════════════════════════════════════╗");
    println!("║  dex-engine: Synthetic Loop Example      ║");
    println!("╚══════════════════════════════════════════╝\n");

    let yv_dai = Address::repeat_byte(0x1d);
    let al_usd = Address::repeat_byte(0xa1);
    let dai = Currency::new(Address::repeat_byte(0xda));
    let alice = Address::repeat_byte(0x0a);

    let mut host = MemoryState::new();
    let pools = PoolManager::new();
    let mut alchemist = Alchemist::new();
    let mut transmuter = Transmuter::new();

    vault::mint(&mut host, Currency::new(yv_dai), alice, U256::from(1_000 * E18))?;
    // 0.1% of collateral per block
    alchemist.add_yield_token(yv_dai, dai, U256::from(E18 / 1_000))?;
    alchemist.add_synthetic_token(al_usd, dai, U256::from(1_000_000 * E18))?;
    transmuter.initialize_transmuter(al_usd, dai)?;

    // --- Borrow ---
    println!("━━━ Borrow ━━━\n");
    alchemist.deposit(&mut host, alice, yv_dai, U256::from(1_000 * E18))?;
    let max = alchemist.get_max_mintable(&host, &pools, alice, yv_dai)?;
    alchemist.mint(&mut host, &pools, alice, yv_dai, al_usd, max)?;
    println!("  Collateral:  {} yvDAI", fmt_e18(U256::from(1_000 * E18)));
    println!("  Minted:      {} alUSD", fmt_e18(max));
    println!(
        "  LTV:         {}%",
        alchemist.get_ltv(&host, &pools, alice, yv_dai)?
    );
    if let Some(blocks) = alchemist.get_time_to_repayment(&host, alice, yv_dai) {
        println!("  Repaid in:   {} blocks\n", blocks);
    }

    // --- Stake ---
    println!("━━━ Stake ━━━\n");
    transmuter.stake(&mut host, alice, al_usd, max)?;
    println!("  Staked:      {} alUSD\n", fmt_e18(max));

    // --- Harvest ---
    println!("━━━ Harvest after 300 blocks ━━━\n");
    host.advance_blocks(300);
    // any touch of the account harvests; top up collateral by one unit
    vault::mint(&mut host, Currency::new(yv_dai), alice, U256::from(E18))?;
    alchemist.deposit(&mut host, alice, yv_dai, U256::from(E18))?;
    let flushed = alchemist.flush_yield(&mut transmuter, al_usd)?;
    // the yield source delivers the harvested underlying to the transmuter
    vault::mint(&mut host, dai, transmuter.address(), flushed)?;

    if let Some(account) = alchemist.get_account(&host, alice, yv_dai) {
        println!("  Block:       {}", host.block_number());
        println!("  Debt left:   {} alUSD", fmt_e18(account.debt));
    }
    println!("  Flushed:     {} DAI", fmt_e18(flushed));
    println!(
        "  Claimable:   {} DAI\n",
        fmt_e18(transmuter.get_claimable(alice, al_usd))
    );

    // --- Claim ---
    println!("━━━ Claim ━━━\n");
    let paid = transmuter.claim(&mut host, alice, al_usd)?;
    println!("  Claimed:     {} DAI", fmt_e18(paid));
    if let Some(stake) = transmuter.get_stake(alice, al_usd) {
        println!("  Still staked: {} alUSD", fmt_e18(stake.staked_amount));
    }
    println!(
        "  DAI balance: {}",
        fmt_e18(vault::balance_of(&host, dai, alice))
    );

    Ok(())
}
