//! Flash accounting walkthrough.
//!
//! Borrows from a pool, round-trips the loan through two swaps, and settles
//! everything at the end of one lock. Then shows a lock that fails to repay
//! and is rolled back.

use alloy_primitives::{Address, U256};
use dex_engine::core::currency::Currency;
use dex_engine::core::pool_key::PoolKey;
use dex_engine::core::state::MemoryState;
use dex_engine::core::vault;
use dex_engine::math::Q96;
use dex_engine::pool::error::PoolError;
use dex_engine::pool::manager::PoolManager;
use dex_engine::pool::params::{FlashParams, ModifyLiquidityParams, SwapParams};
use dex_engine::simulation::net_out;

const E18: u128 = 1_000_000_000_000_000_000;

fn main() -> Result<(), PoolError> {
    println!("╔══════════════════════════════════════════╗");
    println!("║  dex-engine: Flash Swap Example          ║");
    println!("╚══════════════════════════════════════════╝\n");

    let usdc = Currency::new(Address::repeat_byte(0xa0));
    let weth = Currency::new(Address::repeat_byte(0xc0));
    let lp = Address::repeat_byte(0x11);
    let trader = Address::repeat_byte(0x22);

    let mut host = MemoryState::new();
    for account in [lp, trader] {
        for currency in [usdc, weth] {
            vault::mint(&mut host, currency, account, U256::from(1_000_000 * E18))?;
        }
    }

    let mut manager = PoolManager::new();
    let key = PoolKey::sorted(usdc, weth, 3_000, 60);
    manager.initialize(key, Q96)?;

    // --- Liquidity ---
    println!("━━━ Liquidity ━━━\n");
    let (deposit, _) = manager.lock(&mut host, lp, |m, h| {
        let params = ModifyLiquidityParams::new(-6_000, 6_000, 1_000 * E18 as i128);
        let out = m.modify_liquidity(&key, &params)?;
        net_out(m, h, lp, &key)?;
        Ok(out)
    })?;
    println!("  Pool:      {}", key);
    println!("  Deposited: {} / {}", deposit.amount0, deposit.amount1);
    println!(
        "  Liquidity: {}\n",
        manager.get_pool(&key).map_or(0, |p| p.liquidity())
    );

    // --- Flash loan round trip ---
    println!("━━━ Flash Loan Round Trip ━━━\n");
    let borrowed = 10 * E18;
    let owed = manager.lock(&mut host, trader, |m, h| {
        let owed = m.flash(
            h,
            &key,
            &FlashParams {
                amount0: U256::ZERO,
                amount1: U256::from(borrowed),
                recipient: trader,
            },
        )?;
        println!("  Flash owed:        {}", owed);

        let there = m.swap(&key, &SwapParams::unbounded(false, borrowed as i128))?;
        println!("  Swap 1 -> 0 delta: {}", there);
        let back = m.swap(&key, &SwapParams::unbounded(true, -there.amount0))?;
        println!("  Swap 0 -> 1 delta: {}", back);
        println!(
            "  Open deltas:       {} / {}",
            m.get_delta(trader, key.currency0),
            m.get_delta(trader, key.currency1)
        );

        net_out(m, h, trader, &key)?;
        Ok(owed)
    })?;
    println!("  Settled. Flash fee: {}", owed.amount1 - borrowed as i128);
    if let Some(pool) = manager.get_pool(&key) {
        println!("  Price after:       {:.6}", pool.price());
        println!("  Fee growth:        {:?}\n", pool.fee_growth_global());
    }

    // --- Unpaid loan ---
    println!("━━━ Unpaid Loan ━━━\n");
    let before = manager.get_pool(&key).cloned();
    let err = manager
        .lock(&mut host, trader, |m, h| {
            m.flash(
                h,
                &key,
                &FlashParams {
                    amount0: U256::from(E18),
                    amount1: U256::ZERO,
                    recipient: trader,
                },
            )
        })
        .err();
    match err {
        Some(e) => println!("  Lock rejected: {}", e),
        None => println!("  Lock unexpectedly settled"),
    }
    println!(
        "  Pool unchanged: {}",
        manager.get_pool(&key).cloned() == before
    );
    println!("  Locked:         {}", manager.is_locked());

    Ok(())
}
