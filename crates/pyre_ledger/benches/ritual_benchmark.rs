//! Benchmark for reward selection and full rituals.
//!
//! Run with: cargo bench --package pyre_ledger --bench ritual_benchmark

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use pyre_ledger::{
    GenesisConfig, KindMapping, RewardEntry, RewardPool, RewardSelector, RitualEngine, RoleGrant,
    SecureSeed,
};
use pyre_shared::{ActorId, KindRole, Rarity, Role};

const KEY: u32 = 1;

fn create_test_pool() -> RewardPool {
    RewardPool::new(vec![
        RewardEntry::new(30, 70, Rarity::Common),
        RewardEntry::new(31, 20, Rarity::Uncommon),
        RewardEntry::new(32, 8, Rarity::Rare),
        RewardEntry::new(100, 2, Rarity::Legendary),
        RewardEntry::new(101, 0, Rarity::Mythic),
    ])
    .unwrap()
}

fn create_test_engine() -> (RitualEngine, ActorId) {
    let shop = ActorId::repeat_byte(0x5B);
    let mut genesis = GenesisConfig::new(ActorId::repeat_byte(0xA0), ActorId::repeat_byte(0xE0));
    genesis.kinds = vec![KindMapping {
        role: KindRole::InputKey,
        kind: KEY,
    }];
    genesis.reward_pool = create_test_pool().entries().to_vec();
    genesis.roles = vec![RoleGrant {
        role: Role::SHOP_MINTER,
        actor: shop,
    }];
    (RitualEngine::genesis(&genesis, SecureSeed::test_seed()).unwrap(), shop)
}

fn benchmark_single_selection(c: &mut Criterion) {
    let pool = create_test_pool();
    let mut selector = RewardSelector::new(SecureSeed::test_seed());
    let actor = ActorId::repeat_byte(1);

    c.bench_function("single_selection", |b| {
        b.iter(|| black_box(selector.select(black_box(&pool), black_box(actor))));
    });
}

fn benchmark_selection_throughput(c: &mut Criterion) {
    let pool = create_test_pool();
    let mut selector = RewardSelector::new(SecureSeed::test_seed());
    let actors: Vec<ActorId> = (0..=255u8).map(ActorId::repeat_byte).collect();

    let mut group = c.benchmark_group("selection_throughput");
    group.throughput(Throughput::Elements(100_000));
    group.bench_function("100k_selections", |b| {
        b.iter(|| {
            for i in 0..100_000usize {
                black_box(selector.select(&pool, actors[i % actors.len()]).ok());
            }
        });
    });
    group.finish();
}

fn benchmark_full_sacrifice(c: &mut Criterion) {
    let (engine, shop) = create_test_engine();
    let player = ActorId::repeat_byte(1);

    c.bench_function("mint_then_sacrifice", |b| {
        b.iter(|| {
            engine.mint(shop, player, KEY, 1).unwrap();
            black_box(engine.sacrifice(player, 1).unwrap());
            engine.drain_events();
        });
    });
}

fn benchmark_preflight(c: &mut Criterion) {
    let (engine, shop) = create_test_engine();
    let player = ActorId::repeat_byte(1);
    engine.mint(shop, player, KEY, 1).unwrap();

    c.bench_function("preflight_sacrifice", |b| {
        b.iter(|| black_box(engine.preflight(player, pyre_shared::RitualKind::Sacrifice, 1)));
    });
}

criterion_group!(
    benches,
    benchmark_single_selection,
    benchmark_selection_throughput,
    benchmark_full_sacrifice,
    benchmark_preflight,
);
criterion_main!(benches);
