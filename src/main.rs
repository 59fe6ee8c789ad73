//! dex-engine CLI
//!
//! Run pool and synthetic scenarios from the command line.
//!
//! # Usage
//!
//! ```bash
//! # Run a scenario file
//! dex-engine run --input scenario.json
//!
//! # Output the report as JSON
//! dex-engine run --input scenario.json --format json
//!
//! # Compute a pool id
//! dex-engine pool-id --currency0 native --currency1 0x...01 --fee 3000 --tick-spacing 60
//!
//! # Generate a random swap scenario
//! dex-engine generate --swaps 200 --output swaps.json
//! ```

use dex_engine::core::currency::Currency;
use dex_engine::core::pool_key::{tick_spacing_for_fee, PoolKey};
use dex_engine::pool::state::Pool;
use dex_engine::simulation::scenario::{Scenario, ScenarioReport, ScenarioRunner};
use dex_engine::simulation::stress_test::{generate_scenario, SwapWorkloadConfig};
use std::fs;
use std::process;

fn print_usage() {
    eprintln!(
        r#"dex-engine: concentrated-liquidity pools, synthetic debt and transmutation

USAGE:
    dex-engine <COMMAND> [OPTIONS]

COMMANDS:
    run         Execute a JSON scenario against an in-memory host
    pool-id     Print the id and encoding of a pool key
    generate    Generate a random swap scenario (for testing)
    help        Show this message

OPTIONS (run):
    --input <FILE>      Path to JSON scenario file
    --format <FORMAT>   Output format: text (default) or json

OPTIONS (pool-id):
    --currency0 <ADDR>      First currency ('native' or an address)
    --currency1 <ADDR>      Second currency
    --fee <PIPS>            Fee in hundredths of a basis point (default: 3000)
    --tick-spacing <N>      Tick spacing (default: the fee tier's)

OPTIONS (generate):
    --swaps <N>         Number of random swaps (default: 100)
    --seed <N>          RNG seed for a reproducible scenario
    --output <FILE>     Write to file instead of stdout

Set RUST_LOG=debug to trace every operation.

EXAMPLES:
    dex-engine run --input scenario.json
    dex-engine run --input scenario.json --format json
    dex-engine pool-id --currency0 native --currency1 0x00000000000000000000000000000000000000aa
    dex-engine generate --swaps 50 --seed 7 --output test.json"#
    );
}

/// Value following a flag, or exit.
fn flag_value(args: &[String], i: usize, what: &str) -> String {
    args.get(i).cloned().unwrap_or_else(|| {
        eprintln!("{} requires {}", args[i - 1], what);
        process::exit(1);
    })
}

fn load_scenario(path: &str) -> Scenario {
    let content = fs::read_to_string(path).unwrap_or_else(|e| {
        eprintln!("Error reading file '{}': {}", path, e);
        process::exit(1);
    });

    Scenario::from_json(&content).unwrap_or_else(|e| {
        eprintln!("Error parsing scenario: {}", e);
        eprintln!("Expected format:");
        eprintln!(
            r#"{{
  "block": 0,
  "steps": [
    {{ "op": "initialize",
       "pool": {{ "currency0": "0x..", "currency1": "0x..", "fee": 3000, "tick_spacing": 60 }} }},
    {{ "op": "fund", "account": "0x..", "currency": "0x..", "amount": "1000000" }}
  ]
}}"#
        );
        process::exit(1);
    })
}

fn print_report(report: &ScenarioReport) {
    println!("Scenario Report");
    println!("═══════════════");
    for step in &report.steps {
        let mark = if step.ok { "ok " } else { "ERR" };
        println!("  [{}] #{:<3} {:<22} {}", mark, step.index, step.op, step.detail);
    }
    println!();
    println!("Final block:  {}", report.block);
    println!("Steps:        {} ({} failed)", report.steps.len(), report.failures());

    for pool in &report.pools {
        println!();
        println!("Pool {}", pool.id);
        println!("  Key:          {}", pool.key);
        println!("  Price:        {:.6}", pool.price);
        println!("  Tick:         {}", pool.tick);
        println!("  SqrtPriceX96: {}", pool.sqrt_price_x96);
        println!("  Liquidity:    {}", pool.liquidity);
        println!(
            "  Ticks/positions: {}/{}",
            pool.initialized_ticks, pool.positions
        );
    }
}

fn cmd_run(args: &[String]) {
    let mut input_path = None;
    let mut format = "text".to_string();
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--input" => {
                i += 1;
                input_path = Some(flag_value(args, i, "a file path"));
            }
            "--format" => {
                i += 1;
                format = flag_value(args, i, "'text' or 'json'");
            }
            _ => {
                eprintln!("Unknown option: {}", args[i]);
                process::exit(1);
            }
        }
        i += 1;
    }

    let path = input_path.unwrap_or_else(|| {
        eprintln!("Error: --input <FILE> is required");
        process::exit(1);
    });

    let scenario = load_scenario(&path);
    let report = ScenarioRunner::run(&scenario);

    if format == "json" {
        match serde_json::to_string_pretty(&report) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("Error serializing report: {}", e);
                process::exit(1);
            }
        }
    } else {
        print_report(&report);
    }
}

fn parse_currency(value: &str) -> Currency {
    value.parse().unwrap_or_else(|e| {
        eprintln!("Invalid currency '{}': {}", value, e);
        process::exit(1);
    })
}

fn cmd_pool_id(args: &[String]) {
    let mut currency0 = None;
    let mut currency1 = None;
    let mut fee = 3_000u32;
    let mut tick_spacing = None;
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--currency0" => {
                i += 1;
                currency0 = Some(parse_currency(&flag_value(args, i, "a currency")));
            }
            "--currency1" => {
                i += 1;
                currency1 = Some(parse_currency(&flag_value(args, i, "a currency")));
            }
            "--fee" => {
                i += 1;
                fee = flag_value(args, i, "a number").parse().unwrap_or_else(|_| {
                    eprintln!("--fee requires a number");
                    process::exit(1);
                });
            }
            "--tick-spacing" => {
                i += 1;
                tick_spacing = Some(flag_value(args, i, "a number").parse().unwrap_or_else(|_| {
                    eprintln!("--tick-spacing requires a number");
                    process::exit(1);
                }));
            }
            _ => {
                eprintln!("Unknown option: {}", args[i]);
                process::exit(1);
            }
        }
        i += 1;
    }

    let (Some(a), Some(b)) = (currency0, currency1) else {
        eprintln!("Error: --currency0 and --currency1 are required");
        process::exit(1);
    };
    let tick_spacing = tick_spacing.or_else(|| tick_spacing_for_fee(fee)).unwrap_or_else(|| {
        eprintln!("Error: fee {} is not a standard tier; pass --tick-spacing", fee);
        process::exit(1);
    });

    let key = PoolKey::sorted(a, b, fee, tick_spacing);
    if let Err(e) = Pool::new(key, dex_engine::math::Q96) {
        eprintln!("Warning: {}", e);
    }
    let encoded: String = key.encode().iter().map(|b| format!("{:02x}", b)).collect();
    println!("Key:      {}", key);
    println!("Encoded:  0x{}", encoded);
    println!("Pool id:  {}", key.id());
}

fn cmd_generate(args: &[String]) {
    let mut config = SwapWorkloadConfig::default();
    let mut output_path: Option<String> = None;
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--swaps" => {
                i += 1;
                config.swaps = flag_value(args, i, "a number").parse().unwrap_or_else(|_| {
                    eprintln!("--swaps requires a number");
                    process::exit(1);
                });
            }
            "--seed" => {
                i += 1;
                config.seed = Some(flag_value(args, i, "a number").parse().unwrap_or_else(|_| {
                    eprintln!("--seed requires a number");
                    process::exit(1);
                }));
            }
            "--output" => {
                i += 1;
                output_path = Some(flag_value(args, i, "a file path"));
            }
            _ => {
                eprintln!("Unknown option: {}", args[i]);
                process::exit(1);
            }
        }
        i += 1;
    }

    let scenario = generate_scenario(&config);
    let json = scenario.to_json().unwrap_or_else(|e| {
        eprintln!("Error serializing scenario: {}", e);
        process::exit(1);
    });

    if let Some(path) = output_path {
        fs::write(&path, &json).unwrap_or_else(|e| {
            eprintln!("Error writing to '{}': {}", path, e);
            process::exit(1);
        });
        eprintln!(
            "Generated scenario with {} steps ({} swaps) → {}",
            scenario.steps.len(),
            config.swaps,
            path
        );
    } else {
        println!("{}", json);
    }
}

fn main() {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        print_usage();
        process::exit(1);
    }

    let command = args[1].as_str();
    let rest = &args[2..];

    match command {
        "run" => cmd_run(rest),
        "pool-id" => cmd_pool_id(rest),
        "generate" => cmd_generate(rest),
        "help" | "--help" | "-h" => print_usage(),
        _ => {
            eprintln!("Unknown command: {}", command);
            print_usage();
            process::exit(1);
        }
    }
}
