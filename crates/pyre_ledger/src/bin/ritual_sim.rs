//! # Ritual Simulator
//!
//! Stands up an engine from a genesis file, funds a crowd of simulated
//! actors, and runs seeded sacrifices and conversions over many ticks.
//! Prints outcome histograms and checks conservation at the end.
//!
//! ```text
//! ritual_sim [genesis.toml] [--actors N] [--ticks N] [--seed N]
//! RUST_LOG=pyre_ledger=debug ritual_sim
//! ```

use std::collections::BTreeMap;
use std::process::ExitCode;

use pyre_ledger::{GenesisConfig, LedgerError, RitualEngine, SecureSeed};
use pyre_shared::{ActorId, KindId, KindRole, Rarity, Role};
use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Used when no genesis file is given.
const DEFAULT_GENESIS: &str = r#"
owner = "0x00000000000000000000000000000000000000a0"
executor = "0x00000000000000000000000000000000000000e0"
min_interval = 3
conversion_ratio = 5

[[kinds]]
role = "INPUT_KEY"
kind = 1

[[kinds]]
role = "CONVERSION_SOURCE"
kind = 2

[[kinds]]
role = "CONVERSION_TARGET"
kind = 1

[[reward_pool]]
outcome = 30
weight = 70

[[reward_pool]]
outcome = 31
weight = 25
tier = "Rare"

[[reward_pool]]
outcome = 100
weight = 5
tier = "Legendary"

[[tier_amounts]]
tier = "Common"
amount = 3

[[supply_caps]]
kind = 100
max = 50

[[roles]]
role = "SHOP_MINTER"
actor = "0x00000000000000000000000000000000000000b0"
"#;

struct SimOptions {
    genesis: Option<String>,
    actors: u8,
    ticks: u64,
    seed: u64,
}

fn parse_args() -> Result<SimOptions, String> {
    let mut options = SimOptions {
        genesis: None,
        actors: 32,
        ticks: 500,
        seed: 0x5EED,
    };

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        let mut value = |name: &str| {
            args.next()
                .ok_or_else(|| format!("{name} needs a value"))
        };
        match arg.as_str() {
            "--actors" => options.actors = value("--actors")?.parse().map_err(|e| format!("--actors: {e}"))?,
            "--ticks" => options.ticks = value("--ticks")?.parse().map_err(|e| format!("--ticks: {e}"))?,
            "--seed" => options.seed = value("--seed")?.parse().map_err(|e| format!("--seed: {e}"))?,
            other if other.starts_with("--") => return Err(format!("unknown option {other}")),
            path => options.genesis = Some(path.to_string()),
        }
    }
    Ok(options)
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .init();
}

fn error_name(err: &LedgerError) -> &'static str {
    match err {
        LedgerError::Unauthorized { .. } => "Unauthorized",
        LedgerError::InsufficientBalance { .. } => "InsufficientBalance",
        LedgerError::SupplyExceeded { .. } => "SupplyExceeded",
        LedgerError::Paused(_) => "Paused",
        LedgerError::CooldownActive { .. } => "CooldownActive",
        LedgerError::EmptyPool => "EmptyPool",
        LedgerError::InvalidConfig(_) => "InvalidConfig",
        LedgerError::InvalidAmount { .. } => "InvalidAmount",
        LedgerError::ArithmeticOverflow => "ArithmeticOverflow",
        LedgerError::Journal(_) => "Journal",
    }
}

#[derive(Default)]
struct Tally {
    completed: u64,
    rejected: BTreeMap<&'static str, u64>,
    /// Shop drips the ledger refused, e.g. at a supply cap.
    drip_refused: BTreeMap<&'static str, u64>,
    by_outcome: BTreeMap<KindId, u64>,
    by_tier: BTreeMap<Rarity, u64>,
}

#[allow(clippy::cast_precision_loss)]
fn percent(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

fn run(options: &SimOptions) -> Result<bool, LedgerError> {
    let genesis = match &options.genesis {
        Some(path) => GenesisConfig::from_file(path)?,
        None => GenesisConfig::from_toml_str(DEFAULT_GENESIS)?,
    };
    simulate(&genesis, options)
}

fn simulate(genesis: &GenesisConfig, options: &SimOptions) -> Result<bool, LedgerError> {
    let mut rng = ChaCha20Rng::seed_from_u64(options.seed);
    let engine = RitualEngine::genesis(genesis, SecureSeed::generate(&mut rng))?;

    let funder = match genesis.roles.iter().find(|g| g.role == Role::SHOP_MINTER) {
        Some(grant) => grant.actor,
        None => {
            engine.grant_role(genesis.owner, Role::SHOP_MINTER, genesis.owner)?;
            genesis.owner
        }
    };

    let snapshot = engine.config_snapshot();
    let key = snapshot.kinds.get(&KindRole::InputKey).copied();
    let source = snapshot.kinds.get(&KindRole::ConversionSource).copied();
    let ratio = snapshot.conversion_ratio.unwrap_or(1);
    let max_batch = ratio.saturating_mul(2);

    let actors: Vec<ActorId> = (1..=options.actors).map(ActorId::repeat_byte).collect();

    println!("Actors: {}  Ticks: {}  Seed: {:#x}", actors.len(), options.ticks, options.seed);
    println!();

    let mut tally = Tally::default();
    let mut beacon = [0u8; 32];

    for tick in 1..=options.ticks {
        engine.set_tick(tick);
        if tick % 16 == 1 {
            rng.fill_bytes(&mut beacon);
            engine.update_entropy_salt(&beacon);
        }

        for &actor in &actors {
            // Shop drip: a key or a handful of capsules now and then.
            let mut drips = Vec::new();
            if rng.gen_ratio(1, 4) {
                if let Some(kind) = key {
                    drips.push(engine.mint(funder, actor, kind, 1));
                }
            }
            if rng.gen_ratio(1, 4) {
                if let Some(kind) = source {
                    drips.push(engine.mint(funder, actor, kind, rng.gen_range(1..=max_batch)));
                }
            }
            for err in drips.into_iter().filter_map(Result::err) {
                *tally.drip_refused.entry(error_name(&err)).or_insert(0) += 1;
            }

            let result = if rng.gen_ratio(1, 3) {
                engine.convert(actor, rng.gen_range(1..=max_batch))
            } else {
                engine.sacrifice(actor, 1)
            };

            match result {
                Ok(outcome) => {
                    tally.completed += 1;
                    if let Some(tier) = outcome.tier {
                        *tally.by_outcome.entry(outcome.output_kind).or_insert(0) += 1;
                        *tally.by_tier.entry(tier).or_insert(0) += 1;
                    }
                }
                Err(err) => *tally.rejected.entry(error_name(&err)).or_insert(0) += 1,
            }
        }
    }

    let mut events: BTreeMap<String, u64> = BTreeMap::new();
    for event in engine.drain_events() {
        let name = format!("{:?}", event.event_type());
        *events.entry(name).or_insert(0) += 1;
    }

    let sacrifices: u64 = tally.by_outcome.values().sum();
    println!("┌─ RITUALS ─────────────────────────────────────────────");
    println!("│ Completed:   {}", tally.completed);
    for (name, count) in &tally.rejected {
        println!("│ Rejected:    {count:>8}  {name}");
    }
    for (name, count) in &tally.drip_refused {
        println!("│ Drip refused:{count:>8}  {name}");
    }
    println!("├─ SACRIFICE OUTCOMES ──────────────────────────────────");
    for (kind, count) in &tally.by_outcome {
        println!("│ kind {kind:>6}: {count:>8}  ({:.2}%)", percent(*count, sacrifices));
    }
    println!("├─ TIERS ───────────────────────────────────────────────");
    for (tier, count) in &tally.by_tier {
        let name = format!("{tier:?}");
        println!("│ {name:<10}: {count:>8}  ({:.2}%)", percent(*count, sacrifices));
    }
    println!("├─ EVENTS ──────────────────────────────────────────────");
    for (name, count) in &events {
        println!("│ {name:<20}: {count}");
    }
    println!("└───────────────────────────────────────────────────────");
    println!();

    let balanced = engine.conservation_holds();
    if balanced {
        println!("Conservation: OK (final nonce {})", engine.nonce());
    } else {
        println!("Conservation: VIOLATED");
    }
    Ok(balanced)
}

fn main() -> ExitCode {
    init_logging();

    println!("╔═══════════════════════════════════════════════════════╗");
    println!("║              PYRE RITUAL SIMULATOR                    ║");
    println!("╚═══════════════════════════════════════════════════════╝");
    println!();

    let options = match parse_args() {
        Ok(options) => options,
        Err(message) => {
            eprintln!("Error: {message}");
            eprintln!("Usage: ritual_sim [genesis.toml] [--actors N] [--ticks N] [--seed N]");
            return ExitCode::FAILURE;
        }
    };

    match run(&options) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            eprintln!("Error: {err}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pyre_ledger::SupplyCap;

    fn options() -> SimOptions {
        SimOptions {
            genesis: None,
            actors: 4,
            ticks: 40,
            seed: 7,
        }
    }

    #[test]
    fn test_default_genesis_balances() {
        let genesis = GenesisConfig::from_toml_str(DEFAULT_GENESIS).unwrap();
        assert!(simulate(&genesis, &options()).unwrap());
    }

    #[test]
    fn test_extreme_ratio_and_key_cap_do_not_abort() {
        let mut genesis = GenesisConfig::from_toml_str(DEFAULT_GENESIS).unwrap();
        genesis.conversion_ratio = Some(u64::MAX);
        genesis.supply_caps.push(SupplyCap { kind: 1, max: 3 });

        assert!(simulate(&genesis, &options()).unwrap());
    }
}
