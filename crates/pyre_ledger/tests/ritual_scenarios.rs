//! End-to-end ritual scenarios against a genesis-built engine.

use pyre_ledger::{
    GenesisConfig, KindMapping, LedgerError, RewardEntry, RitualEngine, RoleGrant, SecureSeed,
};
use pyre_shared::{ActorId, KindId, KindRole, LedgerEvent, PauseFlag, Rarity, RitualKind, Role};

const KEY: KindId = 1;
const CAPSULE: KindId = 2;
const REWARD_A: KindId = 30;
const REWARD_B: KindId = 31;

fn owner() -> ActorId {
    ActorId::repeat_byte(0xA0)
}

fn executor() -> ActorId {
    ActorId::repeat_byte(0xE0)
}

fn shop() -> ActorId {
    ActorId::repeat_byte(0x5B)
}

fn player() -> ActorId {
    ActorId::repeat_byte(0x01)
}

fn genesis() -> GenesisConfig {
    let mut genesis = GenesisConfig::new(owner(), executor());
    genesis.conversion_ratio = Some(5);
    genesis.kinds = vec![
        KindMapping {
            role: KindRole::InputKey,
            kind: KEY,
        },
        KindMapping {
            role: KindRole::ConversionSource,
            kind: CAPSULE,
        },
        KindMapping {
            role: KindRole::ConversionTarget,
            kind: KEY,
        },
    ];
    genesis.reward_pool = vec![
        RewardEntry::new(REWARD_A, 100, Rarity::Common),
        RewardEntry::new(REWARD_B, 0, Rarity::Mythic),
    ];
    genesis.roles = vec![RoleGrant {
        role: Role::SHOP_MINTER,
        actor: shop(),
    }];
    genesis
}

fn engine() -> RitualEngine {
    RitualEngine::genesis(&genesis(), SecureSeed::test_seed()).unwrap()
}

#[test]
fn test_convert_five_capsules_at_five_to_one() {
    let engine = engine();
    engine.mint(shop(), player(), CAPSULE, 5).unwrap();

    let outcome = engine.convert(player(), 5).unwrap();

    assert_eq!(outcome.ritual, RitualKind::Conversion);
    assert_eq!(outcome.output_amount, 1);
    assert_eq!(engine.balance_of(player(), CAPSULE), 0);
    assert_eq!(engine.balance_of(player(), KEY), 1);
    assert_eq!(engine.supply_of(CAPSULE).current, 0);
    assert_eq!(engine.supply_of(KEY).current, 1);
    assert!(engine.conservation_holds());
}

#[test]
fn test_sacrifice_without_keys_is_insufficient_balance() {
    let engine = engine();

    let err = engine.sacrifice(player(), 1).unwrap_err();

    assert!(matches!(
        err,
        LedgerError::InsufficientBalance {
            kind: KEY,
            required: 1,
            available: 0,
            ..
        }
    ));
    assert_eq!(engine.nonce(), 0);
    assert!(engine.cooldown_status(player()).last_operation.is_none());
}

#[test]
fn test_zero_weight_entry_never_selected() {
    let engine = engine();
    engine.mint(shop(), player(), KEY, 1000).unwrap();

    for _ in 0..1000 {
        let outcome = engine.sacrifice(player(), 1).unwrap();
        assert_eq!(outcome.output_kind, REWARD_A);
    }
    assert_eq!(engine.balance_of(player(), REWARD_A), 1000);
    assert_eq!(engine.balance_of(player(), REWARD_B), 0);
    assert_eq!(engine.supply_of(REWARD_B).minted, 0);
}

#[test]
fn test_mint_failure_restores_burn_exactly() {
    let engine = engine();
    engine.set_max_supply(owner(), REWARD_A, 1).unwrap();
    engine.mint(shop(), player(), KEY, 3).unwrap();
    engine.sacrifice(player(), 1).unwrap();

    let key_supply = engine.supply_of(KEY);
    let reward_supply = engine.supply_of(REWARD_A);

    let err = engine.sacrifice(player(), 1).unwrap_err();
    assert!(matches!(err, LedgerError::SupplyExceeded { kind: REWARD_A, .. }));

    assert_eq!(engine.balance_of(player(), KEY), 2);
    assert_eq!(engine.supply_of(KEY), key_supply);
    assert_eq!(engine.supply_of(REWARD_A), reward_supply);
    assert!(engine.conservation_holds());
}

#[test]
fn test_non_admin_cannot_touch_policy() {
    let engine = engine();
    let intruder = player();

    assert!(matches!(
        engine.set_kind_mapping(intruder, KindRole::InputKey, 99),
        Err(LedgerError::Unauthorized { .. })
    ));
    assert!(matches!(
        engine.set_reward_pool(intruder, vec![RewardEntry::new(99, 1, Rarity::Mythic)]),
        Err(LedgerError::Unauthorized { .. })
    ));
    assert!(matches!(
        engine.set_pause(intruder, PauseFlag::Global, true),
        Err(LedgerError::Unauthorized { .. })
    ));
    assert!(matches!(
        engine.grant_role(intruder, Role::LEDGER_ADMIN, intruder),
        Err(LedgerError::Unauthorized { .. })
    ));
    assert!(matches!(
        engine.mint(intruder, intruder, REWARD_B, 1),
        Err(LedgerError::Unauthorized { .. })
    ));
    assert!(matches!(
        engine.set_min_interval(intruder, 3),
        Err(LedgerError::Unauthorized { .. })
    ));
    assert!(matches!(
        engine.revoke_role(intruder, &Role::SHOP_MINTER, shop()),
        Err(LedgerError::Unauthorized { .. })
    ));
    assert!(matches!(
        engine.set_conversion_ratio(intruder, 1),
        Err(LedgerError::Unauthorized { .. })
    ));
    assert!(matches!(
        engine.set_tier_amount(intruder, Rarity::Common, 9),
        Err(LedgerError::Unauthorized { .. })
    ));
    assert!(matches!(
        engine.set_max_supply(intruder, REWARD_A, 1),
        Err(LedgerError::Unauthorized { .. })
    ));

    assert!(engine.drain_events().is_empty());
    assert_eq!(engine.config_snapshot().version, 5);
    assert_eq!(engine.config_snapshot().conversion_ratio, Some(5));
    assert_eq!(engine.min_interval(), 0);
    assert!(engine.has_role(&Role::SHOP_MINTER, shop()));
    assert_eq!(engine.supply_of(REWARD_A).max, 0);
}

#[test]
fn test_shop_cannot_burn_on_behalf() {
    let engine = engine();
    engine.mint(shop(), player(), CAPSULE, 5).unwrap();

    assert!(matches!(
        engine.burn(shop(), player(), CAPSULE, 1),
        Err(LedgerError::Unauthorized { .. })
    ));
    engine.burn(player(), player(), CAPSULE, 1).unwrap();
    assert_eq!(engine.balance_of(player(), CAPSULE), 4);
}

#[test]
fn test_cooldown_between_rituals() {
    let engine = engine();
    engine.set_min_interval(owner(), 10).unwrap();
    engine.mint(shop(), player(), KEY, 3).unwrap();

    engine.set_tick(100);
    engine.sacrifice(player(), 1).unwrap();

    engine.set_tick(105);
    assert_eq!(
        engine.sacrifice(player(), 1).unwrap_err(),
        LedgerError::CooldownActive {
            actor: player(),
            remaining: 5
        }
    );
    assert_eq!(engine.balance_of(player(), KEY), 2);

    engine.set_tick(110);
    engine.sacrifice(player(), 1).unwrap();
    assert_eq!(engine.cooldown_status(player()).last_operation, Some(110));
}

#[test]
fn test_zero_interval_allows_back_to_back() {
    let engine = engine();
    engine.mint(shop(), player(), KEY, 2).unwrap();

    engine.sacrifice(player(), 1).unwrap();
    engine.sacrifice(player(), 1).unwrap();
    assert_eq!(engine.balance_of(player(), REWARD_A), 2);
}

#[test]
fn test_pause_categories_are_independent() {
    let engine = engine();
    engine.mint(shop(), player(), KEY, 1).unwrap();
    engine.mint(shop(), player(), CAPSULE, 5).unwrap();

    engine.set_pause(owner(), PauseFlag::Sacrifices, true).unwrap();
    assert_eq!(
        engine.sacrifice(player(), 1).unwrap_err(),
        LedgerError::Paused(PauseFlag::Sacrifices)
    );
    engine.convert(player(), 5).unwrap();

    engine.set_pause(owner(), PauseFlag::Global, true).unwrap();
    assert_eq!(
        engine.convert(player(), 5).unwrap_err(),
        LedgerError::Paused(PauseFlag::Global)
    );
    assert!(engine.pause_status().global);
}

#[test]
fn test_remap_input_key_leaves_balances_alone() {
    let engine = engine();
    engine.mint(shop(), player(), KEY, 2).unwrap();

    engine.set_kind_mapping(owner(), KindRole::InputKey, 7).unwrap();

    assert_eq!(engine.balance_of(player(), KEY), 2);
    assert!(matches!(
        engine.sacrifice(player(), 1),
        Err(LedgerError::InsufficientBalance { kind: 7, .. })
    ));
}

#[test]
fn test_empty_pool_rejected_at_admin_call() {
    let engine = engine();
    let before = engine.config_snapshot();

    assert_eq!(
        engine
            .set_reward_pool(owner(), vec![RewardEntry::new(REWARD_A, 0, Rarity::Common)])
            .unwrap_err(),
        LedgerError::EmptyPool
    );
    assert_eq!(engine.config_snapshot(), before);
}

#[test]
fn test_tier_amount_scales_sacrifice_output() {
    let engine = engine();
    engine.set_tier_amount(owner(), Rarity::Common, 4).unwrap();
    engine.mint(shop(), player(), KEY, 1).unwrap();

    let outcome = engine.sacrifice(player(), 1).unwrap();
    assert_eq!(outcome.tier, Some(Rarity::Common));
    assert_eq!(outcome.output_amount, 4);
    assert_eq!(engine.balance_of(player(), REWARD_A), 4);
}

#[test]
fn test_completed_ritual_event_fields() {
    let engine = engine();
    engine.mint(shop(), player(), CAPSULE, 12).unwrap();
    engine.drain_events();
    engine.set_tick(9);

    engine.convert(player(), 12).unwrap();

    let events = engine.drain_events();
    assert_eq!(
        events,
        vec![LedgerEvent::RitualCompleted {
            actor: player(),
            ritual: RitualKind::Conversion,
            input_kind: CAPSULE,
            input_amount: 12,
            output_kind: KEY,
            output_amount: 2,
            tier: None,
            nonce: None,
            tick: 9,
        }]
    );
}
