//! Property tests: conservation and caps hold under arbitrary call sequences.

use proptest::prelude::*;
use pyre_ledger::{GenesisConfig, KindMapping, RewardEntry, RitualEngine, RoleGrant, SecureSeed, SupplyCap};
use pyre_shared::{ActorId, KindId, KindRole, Rarity, Role};

const KEY: KindId = 1;
const CAPSULE: KindId = 2;
const REWARDS: [KindId; 3] = [30, 31, 32];
const REWARD_CAP: u64 = 40;

#[derive(Clone, Debug)]
enum Call {
    Mint { actor: u8, kind: KindId, amount: u64 },
    Burn { actor: u8, kind: KindId, amount: u64 },
    Sacrifice { actor: u8, amount: u64 },
    Convert { actor: u8, amount: u64 },
    Tick,
}

fn kind() -> impl Strategy<Value = KindId> {
    prop_oneof![Just(KEY), Just(CAPSULE)]
}

fn call() -> impl Strategy<Value = Call> {
    prop_oneof![
        (1u8..5, kind(), 0u64..20).prop_map(|(actor, kind, amount)| Call::Mint { actor, kind, amount }),
        (1u8..5, kind(), 0u64..20).prop_map(|(actor, kind, amount)| Call::Burn { actor, kind, amount }),
        (1u8..5, 0u64..3).prop_map(|(actor, amount)| Call::Sacrifice { actor, amount }),
        (1u8..5, 0u64..15).prop_map(|(actor, amount)| Call::Convert { actor, amount }),
        Just(Call::Tick),
    ]
}

fn shop() -> ActorId {
    ActorId::repeat_byte(0x5B)
}

fn engine() -> RitualEngine {
    let mut genesis = GenesisConfig::new(ActorId::repeat_byte(0xA0), ActorId::repeat_byte(0xE0));
    genesis.min_interval = 1;
    genesis.conversion_ratio = Some(4);
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
        RewardEntry::new(REWARDS[0], 60, Rarity::Common),
        RewardEntry::new(REWARDS[1], 30, Rarity::Rare),
        RewardEntry::new(REWARDS[2], 10, Rarity::Legendary),
    ];
    genesis.supply_caps = REWARDS
        .iter()
        .map(|&kind| SupplyCap { kind, max: REWARD_CAP })
        .collect();
    genesis.roles = vec![RoleGrant {
        role: Role::SHOP_MINTER,
        actor: shop(),
    }];
    RitualEngine::genesis(&genesis, SecureSeed::test_seed()).unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_conservation_and_caps_hold(calls in prop::collection::vec(call(), 1..120)) {
        let engine = engine();

        for call in calls {
            let before_keys = engine.supply_of(KEY);
            let result = match call {
                Call::Mint { actor, kind, amount } => {
                    engine.mint(shop(), ActorId::repeat_byte(actor), kind, amount)
                }
                Call::Burn { actor, kind, amount } => {
                    let owner = ActorId::repeat_byte(actor);
                    engine.burn(owner, owner, kind, amount)
                }
                Call::Sacrifice { actor, amount } => {
                    engine.sacrifice(ActorId::repeat_byte(actor), amount).map(|_| ())
                }
                Call::Convert { actor, amount } => {
                    engine.convert(ActorId::repeat_byte(actor), amount).map(|_| ())
                }
                Call::Tick => {
                    engine.advance_tick();
                    Ok(())
                }
            };

            if result.is_err() {
                // Failed calls never move key supply.
                prop_assert_eq!(engine.supply_of(KEY), before_keys);
            }
            prop_assert!(engine.conservation_holds());
            for kind in REWARDS {
                prop_assert!(engine.supply_of(kind).current <= REWARD_CAP);
            }
        }
    }

    #[test]
    fn prop_conversion_output_is_floor_division(capsules in 4u64..1000) {
        let engine = engine();
        let player = ActorId::repeat_byte(1);
        engine.mint(shop(), player, CAPSULE, capsules).unwrap();

        let outcome = engine.convert(player, capsules).unwrap();

        prop_assert_eq!(outcome.output_amount, capsules / 4);
        prop_assert_eq!(engine.balance_of(player, CAPSULE), 0);
        prop_assert_eq!(engine.balance_of(player, KEY), capsules / 4);
    }
}
