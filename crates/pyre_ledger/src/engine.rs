//! # Ritual Engine
//!
//! The processor tying every component together. A ritual is:
//!
//! 1. **Preflight**: pause, cooldown, kind resolution, balance
//! 2. **Burn** the input from the actor, acting as the executor identity
//! 3. **Resolve** the outcome (fixed ratio, or weighted selection)
//! 4. **Mint** the output. Failure restores the burn exactly
//! 5. **Record** the cooldown, journal, emit `RitualCompleted`
//!
//! ## Locking
//!
//! ```text
//! policy (RwLock) -> vault (RwLock) -> cooldowns (RwLock) -> events (Mutex)
//! ```
//!
//! Always acquired in that order. Every mutation of the vault holds its
//! write lock from first check to last write, so rituals are serialized.
//! Views and [`RitualEngine::preflight`] take read locks only.
//!
//! ## Regions
//!
//! State splits into the [`LedgerRegion`] (balances, supply, cooldowns,
//! nonce) and the [`PolicyRegion`] (configuration, roles, pause, interval).
//! Replacing the processor logic means `into_regions` on the old engine and
//! `from_regions` on the new one. [`RitualEngine::upgrade`] swaps the
//! executor identity in place. Neither path resets the ledger region.
//!
//! ## Journal
//!
//! With a journal attached, every change to either region is appended
//! before the call returns, and a failed append undoes the change. A
//! restart through [`RitualEngine::with_journal`] replays both regions on
//! top of the same genesis, so pauses, revokes and remaps survive it.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock};
use pyre_shared::{
    ActorId, KindId, KindRole, LedgerEvent, PauseFlag, Rarity, RitualKind, Role, Tick,
};
use serde::{Deserialize, Serialize};

use crate::access::{AccessRegistry, RoleChange};
use crate::config::{ConfigChange, ConfigManager, ConfigSnapshot, GenesisConfig};
use crate::error::{LedgerError, LedgerResult};
use crate::journal::{JournalOp, RitualJournal};
use crate::ledger::{BalanceEntry, LedgerAction, SupplyRecord, TokenLedger};
use crate::limiter::{CooldownStatus, CooldownTable, PauseState};
use crate::selector::{EntropySalt, RewardEntry, RewardPool, RewardSelector, SecureSeed};

/// Result of a completed ritual.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RitualOutcome {
    /// Actor who performed it.
    pub actor: ActorId,
    /// Sacrifice or conversion.
    pub ritual: RitualKind,
    /// Kind burned.
    pub input_kind: KindId,
    /// Amount burned.
    pub input_amount: u64,
    /// Kind minted.
    pub output_kind: KindId,
    /// Amount minted.
    pub output_amount: u64,
    /// Tier of the selected outcome, for sacrifices.
    pub tier: Option<Rarity>,
    /// Nonce consumed, for sacrifices.
    pub nonce: Option<u64>,
    /// Tick recorded as the actor's last operation.
    pub tick: Tick,
}

/// What a ritual will do, resolved from the current configuration.
#[derive(Debug)]
enum RitualPlan<'a> {
    /// Fixed-ratio conversion. The remainder of `input / ratio` is burned.
    Deterministic {
        source: KindId,
        target: KindId,
        ratio: u64,
    },
    /// Weighted selection from the pool.
    Randomized { input: KindId, pool: &'a RewardPool },
}

impl<'a> RitualPlan<'a> {
    fn resolve(config: &'a ConfigManager, ritual: RitualKind, amount: u64) -> LedgerResult<Self> {
        if amount == 0 {
            return Err(LedgerError::InvalidAmount {
                amount,
                reason: "ritual input must be positive".to_string(),
            });
        }

        match ritual {
            RitualKind::Conversion => {
                let source = config.resolve(KindRole::ConversionSource)?;
                let target = config.resolve(KindRole::ConversionTarget)?;
                let ratio = config.conversion_ratio()?;
                if amount < ratio {
                    return Err(LedgerError::InvalidAmount {
                        amount,
                        reason: format!("below conversion ratio {ratio}"),
                    });
                }
                Ok(Self::Deterministic {
                    source,
                    target,
                    ratio,
                })
            }
            RitualKind::Sacrifice => Ok(Self::Randomized {
                input: config.resolve(KindRole::InputKey)?,
                pool: config.reward_pool()?,
            }),
        }
    }

    const fn input_kind(&self) -> KindId {
        match self {
            Self::Deterministic { source, .. } => *source,
            Self::Randomized { input, .. } => *input,
        }
    }

    /// Every (actor, kind) cell the ritual can touch.
    fn cells(&self, actor: ActorId) -> Vec<(ActorId, KindId)> {
        match self {
            Self::Deterministic { source, target, .. } => vec![(actor, *source), (actor, *target)],
            Self::Randomized { input, pool } => std::iter::once(*input)
                .chain(pool.selectable().map(|e| e.outcome))
                .map(|kind| (actor, kind))
                .collect(),
        }
    }
}

/// Balances, supply, cooldowns and selector nonce.
///
/// Never reinitialized by an upgrade.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerRegion {
    /// Non-zero balances.
    pub balances: Vec<BalanceEntry>,
    /// Supply record per kind.
    pub supplies: BTreeMap<KindId, SupplyRecord>,
    /// Last ritual tick per actor.
    pub cooldowns: CooldownTable,
    /// Next selector nonce.
    pub nonce: u64,
}

/// Configuration, roles, pause flags and cooldown interval.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyRegion {
    /// Kind mapping, pool, ratio, tier amounts.
    pub config: ConfigManager,
    /// Role registry with its audit log.
    pub access: AccessRegistry,
    /// Pause flags.
    pub pause: PauseState,
    /// Minimum ticks between rituals of one actor.
    pub min_interval: Tick,
}

struct PolicyState {
    region: PolicyRegion,
    executor: ActorId,
}

struct Vault {
    ledger: TokenLedger,
    selector: RewardSelector,
    journal: Option<RitualJournal>,
}

impl Vault {
    fn append_journal(&self, ops: &[JournalOp]) -> LedgerResult<()> {
        match &self.journal {
            Some(journal) => journal.append(ops).map(|_| ()),
            None => Ok(()),
        }
    }
}

/// The ritual engine.
pub struct RitualEngine {
    policy: RwLock<PolicyState>,
    vault: RwLock<Vault>,
    cooldowns: RwLock<CooldownTable>,
    events: Mutex<Vec<LedgerEvent>>,
    tick: AtomicU64,
}

impl std::fmt::Debug for RitualEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RitualEngine")
            .field("executor", &self.executor())
            .field("tick", &self.current_tick())
            .field("nonce", &self.nonce())
            .finish_non_exhaustive()
    }
}

impl RitualEngine {
    // ------------------------------------------------------------------
    // Construction
    // ------------------------------------------------------------------

    /// Builds an engine from a genesis file.
    ///
    /// The executor is granted `RITUAL_EXECUTOR` by the owner.
    ///
    /// # Errors
    ///
    /// `InvalidConfig`, `EmptyPool` or `Unauthorized` if the genesis
    /// values are rejected by the component that owns them.
    pub fn genesis(genesis: &GenesisConfig, seed: SecureSeed) -> LedgerResult<Self> {
        let owner = genesis.owner;
        let mut access = AccessRegistry::new(owner);
        access.grant(owner, Role::RITUAL_EXECUTOR, genesis.executor)?;
        for grant in &genesis.roles {
            access.grant(owner, grant.role.clone(), grant.actor)?;
        }

        let mut config = ConfigManager::new();
        for mapping in &genesis.kinds {
            config.set_kind_mapping(mapping.role, mapping.kind)?;
        }
        if let Some(ratio) = genesis.conversion_ratio {
            config.set_conversion_ratio(ratio)?;
        }
        if !genesis.reward_pool.is_empty() {
            config.set_reward_pool(genesis.reward_pool.clone())?;
        }
        for tier in &genesis.tier_amounts {
            config.set_tier_amount(tier.tier, tier.amount)?;
        }

        let mut ledger = TokenLedger::new();
        for cap in &genesis.supply_caps {
            ledger.set_max_supply(cap.kind, cap.max)?;
        }

        let policy = PolicyRegion {
            config,
            access,
            pause: genesis.pause,
            min_interval: genesis.min_interval,
        };
        tracing::info!(%owner, executor = %genesis.executor, "ritual engine genesis");
        Ok(Self::assemble(
            policy,
            genesis.executor,
            ledger,
            CooldownTable::new(),
            RewardSelector::new(seed),
        ))
    }

    /// Builds an engine from genesis and replays the journal at `path`.
    ///
    /// Every later ledger or policy mutation is appended to the same
    /// journal. Pass the same genesis on every restart: the journal only
    /// holds changes made after it.
    ///
    /// # Errors
    ///
    /// Genesis errors, or `Journal` if the file is unreadable or a
    /// committed operation cannot be applied.
    pub fn with_journal(
        genesis: &GenesisConfig,
        seed: SecureSeed,
        path: impl AsRef<Path>,
    ) -> LedgerResult<Self> {
        let engine = Self::genesis(genesis, seed)?;
        let journal = RitualJournal::open(path)?;
        let ops = journal.recover()?;

        {
            let mut policy = engine.policy.write();
            let mut vault = engine.vault.write();
            let mut cooldowns = engine.cooldowns.write();
            for op in &ops {
                Self::replay(&mut policy, &mut vault, &mut cooldowns, op)?;
            }
            vault.journal = Some(journal);
        }
        tracing::info!(replayed = ops.len(), "journal replayed");
        engine.warn_if_unauthorized_executor();
        Ok(engine)
    }

    fn replay(
        policy: &mut PolicyState,
        vault: &mut Vault,
        cooldowns: &mut CooldownTable,
        op: &JournalOp,
    ) -> LedgerResult<()> {
        let region = &mut policy.region;
        let applied = match op {
            JournalOp::Mint { owner, kind, amount } => vault.ledger.apply_mint(*owner, *kind, *amount),
            JournalOp::Burn { owner, kind, amount } => vault.ledger.apply_burn(*owner, *kind, *amount),
            JournalOp::Cooldown { actor, tick } => {
                cooldowns.record(*actor, *tick);
                Ok(())
            }
            JournalOp::Nonce { value } => {
                vault.selector.advance_nonce_to(*value);
                Ok(())
            }
            JournalOp::SupplyCap { kind, max } => vault.ledger.set_max_supply(*kind, *max).map(|_| ()),
            JournalOp::Pause { flag, paused } => {
                region.pause.set(*flag, *paused);
                Ok(())
            }
            JournalOp::MinInterval { interval } => {
                region.min_interval = *interval;
                Ok(())
            }
            JournalOp::RoleGranted { by, role, actor } => region.access.grant(*by, role.clone(), *actor).map(|_| ()),
            JournalOp::RoleRevoked { by, role, actor } => region.access.revoke(*by, role, *actor).map(|_| ()),
            JournalOp::KindMapping { role, kind } => region.config.set_kind_mapping(*role, *kind).map(|_| ()),
            JournalOp::ConversionRatio { ratio } => region.config.set_conversion_ratio(*ratio).map(|_| ()),
            JournalOp::TierAmount { tier, amount } => region.config.set_tier_amount(*tier, *amount).map(|_| ()),
            JournalOp::RewardPool { entries } => region.config.set_reward_pool(entries.clone()).map(|_| ()),
            JournalOp::Executor { executor } => {
                policy.executor = *executor;
                Ok(())
            }
        };
        applied.map_err(|e| LedgerError::Journal(format!("replay of {op:?} failed: {e}")))
    }

    /// Rebuilds an engine around persisted regions.
    ///
    /// `executor` is the identity of the new processor. It is not granted
    /// anything; grants live in the policy region.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` if the ledger region violates conservation or a cap.
    pub fn from_regions(
        ledger: LedgerRegion,
        policy: PolicyRegion,
        executor: ActorId,
        seed: SecureSeed,
    ) -> LedgerResult<Self> {
        let token_ledger = TokenLedger::from_parts(&ledger.balances, &ledger.supplies)?;
        let engine = Self::assemble(
            policy,
            executor,
            token_ledger,
            ledger.cooldowns,
            RewardSelector::resume(seed, ledger.nonce),
        );
        engine.warn_if_unauthorized_executor();
        Ok(engine)
    }

    fn assemble(
        policy: PolicyRegion,
        executor: ActorId,
        ledger: TokenLedger,
        cooldowns: CooldownTable,
        selector: RewardSelector,
    ) -> Self {
        Self {
            policy: RwLock::new(PolicyState {
                region: policy,
                executor,
            }),
            vault: RwLock::new(Vault {
                ledger,
                selector,
                journal: None,
            }),
            cooldowns: RwLock::new(cooldowns),
            events: Mutex::new(Vec::new()),
            tick: AtomicU64::new(0),
        }
    }

    /// Splits the engine into its persisted regions.
    #[must_use]
    pub fn into_regions(self) -> (LedgerRegion, PolicyRegion) {
        let policy = self.policy.into_inner().region;
        let vault = self.vault.into_inner();
        let ledger = LedgerRegion {
            balances: vault.ledger.balance_entries(),
            supplies: vault.ledger.supply_records().clone(),
            cooldowns: self.cooldowns.into_inner(),
            nonce: vault.selector.nonce(),
        };
        (ledger, policy)
    }

    /// Replaces the executor identity, keeping both regions.
    ///
    /// Does not grant or revoke anything. Until an admin grants
    /// `RITUAL_EXECUTOR` to `new_executor`, rituals fail `Unauthorized`.
    ///
    /// # Errors
    ///
    /// `Unauthorized` if `caller` is not an admin, or `Journal`.
    pub fn upgrade(&self, caller: ActorId, new_executor: ActorId) -> LedgerResult<ActorId> {
        let prior = {
            let mut policy = self.policy.write();
            policy.region.access.require_admin(caller, "upgrade the processor")?;
            let prior = std::mem::replace(&mut policy.executor, new_executor);
            self.journal_policy(&mut policy, JournalOp::Executor { executor: new_executor }, |p| {
                p.executor = prior;
            })?;
            self.emit(LedgerEvent::ExecutorUpgraded {
                prior,
                new: new_executor,
            });
            prior
        };
        tracing::info!(%prior, new = %new_executor, by = %caller, "processor upgraded");
        self.warn_if_unauthorized_executor();
        Ok(prior)
    }

    fn warn_if_unauthorized_executor(&self) {
        let policy = self.policy.read();
        if !policy
            .region
            .access
            .has_role(&Role::RITUAL_EXECUTOR, policy.executor)
        {
            tracing::warn!(executor = %policy.executor, "processor identity lacks RITUAL_EXECUTOR");
        }
        let stale = policy.region.access.stale_executors(policy.executor);
        if !stale.is_empty() {
            tracing::warn!(?stale, "executor grants outlived their processor");
        }
    }

    // ------------------------------------------------------------------
    // Clock and entropy
    // ------------------------------------------------------------------

    /// Current tick.
    #[must_use]
    pub fn current_tick(&self) -> Tick {
        self.tick.load(Ordering::SeqCst)
    }

    /// Sets the current tick.
    pub fn set_tick(&self, tick: Tick) {
        self.tick.store(tick, Ordering::SeqCst);
    }

    /// Advances the tick by one, returning the new value.
    pub fn advance_tick(&self) -> Tick {
        self.tick.fetch_add(1, Ordering::SeqCst).wrapping_add(1)
    }

    /// Mixes a fresh external beacon (e.g. a block hash) into selection.
    pub fn update_entropy_salt(&self, beacon: &[u8; 32]) {
        self.vault
            .write()
            .selector
            .update_salt(EntropySalt::from_beacon(beacon));
    }

    /// Replaces the selector secret.
    ///
    /// # Errors
    ///
    /// `Unauthorized` if `caller` is not an admin.
    pub fn rotate_secret(&self, caller: ActorId, secret: &[u8; 32]) -> LedgerResult<()> {
        let policy = self.policy.read();
        policy.region.access.require_admin(caller, "rotate the selector secret")?;
        self.vault.write().selector.rotate_secret(secret);
        tracing::info!(by = %caller, "selector secret rotated");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Rituals
    // ------------------------------------------------------------------

    /// Burns `input_amount` of the input key for a weighted reward.
    ///
    /// # Errors
    ///
    /// Any [`LedgerError`]. State is unchanged on error, except that a
    /// nonce consumed by selection stays consumed.
    pub fn sacrifice(&self, actor: ActorId, input_amount: u64) -> LedgerResult<RitualOutcome> {
        self.perform(actor, RitualKind::Sacrifice, input_amount)
    }

    /// Burns `input_amount` of the conversion source for
    /// `input_amount / ratio` of the target. The remainder is not refunded.
    ///
    /// # Errors
    ///
    /// Any [`LedgerError`]. State is unchanged on error.
    pub fn convert(&self, actor: ActorId, input_amount: u64) -> LedgerResult<RitualOutcome> {
        self.perform(actor, RitualKind::Conversion, input_amount)
    }

    /// Checks whether a ritual would pass its preconditions right now.
    ///
    /// Read locks only; nothing is written.
    ///
    /// # Errors
    ///
    /// The error the ritual itself would fail with before burning.
    pub fn preflight(&self, actor: ActorId, ritual: RitualKind, input_amount: u64) -> LedgerResult<()> {
        let now = self.current_tick();
        let policy = self.policy.read();
        let vault = self.vault.read();
        let cooldowns = self.cooldowns.read();
        let result = Self::check_preconditions(&policy, &vault.ledger, &cooldowns, actor, ritual, input_amount, now)
            .map(|_| ());
        tracing::debug!(%actor, %ritual, input_amount, ok = result.is_ok(), "preflight");
        result
    }

    fn check_preconditions<'p>(
        policy: &'p PolicyState,
        ledger: &TokenLedger,
        cooldowns: &CooldownTable,
        actor: ActorId,
        ritual: RitualKind,
        amount: u64,
        now: Tick,
    ) -> LedgerResult<RitualPlan<'p>> {
        let region = &policy.region;
        region.pause.check(ritual)?;
        let plan = RitualPlan::resolve(&region.config, ritual, amount)?;
        cooldowns.check(actor, now, region.min_interval)?;

        TokenLedger::authorize(&region.access, policy.executor, actor, LedgerAction::BurnFrom)?;
        ledger.check_burn(actor, plan.input_kind(), amount)?;
        if let RitualPlan::Deterministic { target, ratio, .. } = plan {
            TokenLedger::authorize(&region.access, policy.executor, actor, LedgerAction::Mint)?;
            ledger.check_mint(actor, target, amount / ratio)?;
        }
        Ok(plan)
    }

    fn perform(&self, actor: ActorId, ritual: RitualKind, amount: u64) -> LedgerResult<RitualOutcome> {
        let now = self.current_tick();
        let policy = self.policy.read();
        let mut guard = self.vault.write();
        let vault = &mut *guard;

        let plan = {
            let cooldowns = self.cooldowns.read();
            Self::check_preconditions(&policy, &vault.ledger, &cooldowns, actor, ritual, amount, now)
        };
        let plan = match plan {
            Ok(plan) => plan,
            Err(err) => {
                tracing::warn!(%actor, %ritual, amount, error = %err, "ritual rejected");
                return Err(err);
            }
        };

        let input_kind = plan.input_kind();
        let checkpoint = vault.ledger.checkpoint(&plan.cells(actor));
        vault.ledger.apply_burn(actor, input_kind, amount)?;

        let mut consumed_nonce = None;
        let resolved = match plan {
            RitualPlan::Deterministic { target, ratio, .. } => Ok((target, amount / ratio, None)),
            RitualPlan::Randomized { pool, .. } => {
                vault.selector.set_tick(now);
                vault.selector.select(pool, actor).map(|selection| {
                    consumed_nonce = Some(selection.nonce);
                    let output = policy.region.config.tier_amount(selection.tier);
                    (selection.outcome, output, Some(selection.tier))
                })
            }
        };

        let minted = resolved.and_then(|(output_kind, output_amount, tier)| {
            TokenLedger::authorize(&policy.region.access, policy.executor, actor, LedgerAction::Mint)?;
            vault.ledger.check_mint(actor, output_kind, output_amount)?;
            vault.ledger.apply_mint(actor, output_kind, output_amount)?;
            Ok((output_kind, output_amount, tier))
        });

        let (output_kind, output_amount, tier) = match minted {
            Ok(minted) => minted,
            Err(err) => {
                vault.ledger.restore(&checkpoint);
                if let Some(nonce) = consumed_nonce {
                    if let Err(journal_err) = vault.append_journal(&[JournalOp::Nonce { value: nonce.wrapping_add(1) }]) {
                        tracing::error!(error = %journal_err, nonce, "failed to journal consumed nonce");
                    }
                }
                tracing::warn!(%actor, %ritual, amount, error = %err, "ritual rolled back");
                self.emit(LedgerEvent::RitualRolledBack {
                    actor,
                    ritual,
                    input_kind,
                    input_amount: amount,
                    nonce: consumed_nonce,
                    reason: err.to_string(),
                });
                return Err(err);
            }
        };

        let mut cooldowns = self.cooldowns.write();
        let previous = cooldowns.record(actor, now);

        let mut ops = vec![
            JournalOp::Burn {
                owner: actor,
                kind: input_kind,
                amount,
            },
            JournalOp::Mint {
                owner: actor,
                kind: output_kind,
                amount: output_amount,
            },
            JournalOp::Cooldown { actor, tick: now },
        ];
        if let Some(nonce) = consumed_nonce {
            ops.push(JournalOp::Nonce { value: nonce.wrapping_add(1) });
        }
        if let Err(err) = vault.append_journal(&ops) {
            vault.ledger.restore(&checkpoint);
            cooldowns.unrecord(actor, previous);
            tracing::error!(%actor, %ritual, error = %err, "ritual not journaled, rolled back");
            return Err(err);
        }

        let outcome = RitualOutcome {
            actor,
            ritual,
            input_kind,
            input_amount: amount,
            output_kind,
            output_amount,
            tier,
            nonce: consumed_nonce,
            tick: now,
        };
        tracing::info!(
            %actor,
            %ritual,
            input_kind,
            input_amount = amount,
            output_kind,
            output_amount,
            ?tier,
            tick = now,
            "ritual completed"
        );
        self.emit(LedgerEvent::RitualCompleted {
            actor,
            ritual,
            input_kind,
            input_amount: amount,
            output_kind,
            output_amount,
            tier,
            nonce: consumed_nonce,
            tick: now,
        });
        Ok(outcome)
    }

    // ------------------------------------------------------------------
    // Ledger passthrough
    // ------------------------------------------------------------------

    /// Mints outside a ritual. `caller` needs a minting role.
    ///
    /// # Errors
    ///
    /// `Unauthorized`, `InvalidAmount`, `SupplyExceeded`,
    /// `ArithmeticOverflow` or `Journal`.
    pub fn mint(&self, caller: ActorId, to: ActorId, kind: KindId, amount: u64) -> LedgerResult<()> {
        let policy = self.policy.read();
        let mut guard = self.vault.write();
        let vault = &mut *guard;

        let checkpoint = vault.ledger.checkpoint(&[(to, kind)]);
        vault.ledger.mint(&policy.region.access, caller, to, kind, amount)?;
        if let Err(err) = vault.append_journal(&[JournalOp::Mint { owner: to, kind, amount }]) {
            vault.ledger.restore(&checkpoint);
            return Err(err);
        }

        tracing::info!(%caller, %to, kind, amount, "minted");
        self.emit(LedgerEvent::Minted {
            caller,
            owner: to,
            kind,
            amount,
        });
        Ok(())
    }

    /// Burns outside a ritual. Owners burn their own tokens freely.
    ///
    /// # Errors
    ///
    /// `Unauthorized`, `InvalidAmount`, `InsufficientBalance` or `Journal`.
    pub fn burn(&self, caller: ActorId, owner: ActorId, kind: KindId, amount: u64) -> LedgerResult<()> {
        let policy = self.policy.read();
        let mut guard = self.vault.write();
        let vault = &mut *guard;

        let checkpoint = vault.ledger.checkpoint(&[(owner, kind)]);
        vault.ledger.burn(&policy.region.access, caller, owner, kind, amount)?;
        if let Err(err) = vault.append_journal(&[JournalOp::Burn { owner, kind, amount }]) {
            vault.ledger.restore(&checkpoint);
            return Err(err);
        }

        tracing::info!(%caller, %owner, kind, amount, "burned");
        self.emit(LedgerEvent::Burned {
            caller,
            owner,
            kind,
            amount,
        });
        Ok(())
    }

    // ------------------------------------------------------------------
    // Admin
    // ------------------------------------------------------------------

    /// Journals a policy change made under `policy`, running `undo` if the
    /// append fails.
    fn journal_policy(
        &self,
        policy: &mut PolicyState,
        op: JournalOp,
        undo: impl FnOnce(&mut PolicyState),
    ) -> LedgerResult<()> {
        if let Err(err) = self.vault.read().append_journal(&[op]) {
            undo(policy);
            tracing::error!(error = %err, "policy change not journaled, rolled back");
            return Err(err);
        }
        Ok(())
    }

    fn configure(
        &self,
        caller: ActorId,
        action: &str,
        op: JournalOp,
        change: impl FnOnce(&mut ConfigManager) -> LedgerResult<ConfigChange>,
    ) -> LedgerResult<ConfigChange> {
        let mut policy = self.policy.write();
        policy.region.access.require_admin(caller, action)?;
        let saved = policy.region.config.clone();
        let change = change(&mut policy.region.config)?;
        self.journal_policy(&mut policy, op, |p| p.region.config = saved)?;
        self.emit(LedgerEvent::ConfigChanged {
            version: change.version,
            key: change.key.clone(),
            prior: change.prior.clone(),
            new: change.new.clone(),
            by: caller,
        });
        Ok(change)
    }

    /// Maps a semantic role onto a kind id. Balances are untouched.
    ///
    /// # Errors
    ///
    /// `Unauthorized`, `InvalidConfig` or `Journal`.
    pub fn set_kind_mapping(&self, caller: ActorId, role: KindRole, kind: KindId) -> LedgerResult<ConfigChange> {
        let op = JournalOp::KindMapping { role, kind };
        self.configure(caller, "set kind mapping", op, |config| config.set_kind_mapping(role, kind))
    }

    /// Replaces the reward pool.
    ///
    /// # Errors
    ///
    /// `Unauthorized`, `EmptyPool` or `Journal`.
    pub fn set_reward_pool(&self, caller: ActorId, entries: Vec<RewardEntry>) -> LedgerResult<ConfigChange> {
        let op = JournalOp::RewardPool {
            entries: entries.clone(),
        };
        self.configure(caller, "set reward pool", op, |config| config.set_reward_pool(entries))
    }

    /// Replaces the conversion ratio.
    ///
    /// # Errors
    ///
    /// `Unauthorized`, `InvalidConfig` or `Journal`.
    pub fn set_conversion_ratio(&self, caller: ActorId, ratio: u64) -> LedgerResult<ConfigChange> {
        let op = JournalOp::ConversionRatio { ratio };
        self.configure(caller, "set conversion ratio", op, |config| config.set_conversion_ratio(ratio))
    }

    /// Sets the output amount for a tier.
    ///
    /// # Errors
    ///
    /// `Unauthorized`, `InvalidConfig` or `Journal`.
    pub fn set_tier_amount(&self, caller: ActorId, tier: Rarity, amount: u64) -> LedgerResult<ConfigChange> {
        let op = JournalOp::TierAmount { tier, amount };
        self.configure(caller, "set tier amount", op, |config| config.set_tier_amount(tier, amount))
    }

    /// Sets one pause flag, returning its prior value.
    ///
    /// # Errors
    ///
    /// `Unauthorized` or `Journal`.
    pub fn set_pause(&self, caller: ActorId, flag: PauseFlag, paused: bool) -> LedgerResult<bool> {
        let mut policy = self.policy.write();
        policy.region.access.require_admin(caller, "toggle pause")?;
        let prior = policy.region.pause.set(flag, paused);
        if prior != paused {
            self.journal_policy(&mut policy, JournalOp::Pause { flag, paused }, |p| {
                p.region.pause.set(flag, prior);
            })?;
            tracing::info!(%flag, paused, by = %caller, "pause changed");
            self.emit(LedgerEvent::PauseChanged {
                flag,
                paused,
                by: caller,
            });
        }
        Ok(prior)
    }

    /// Replaces the cooldown interval, returning the prior one.
    ///
    /// # Errors
    ///
    /// `Unauthorized` or `Journal`.
    pub fn set_min_interval(&self, caller: ActorId, interval: Tick) -> LedgerResult<Tick> {
        let mut policy = self.policy.write();
        policy.region.access.require_admin(caller, "set cooldown interval")?;
        let prior = std::mem::replace(&mut policy.region.min_interval, interval);
        self.journal_policy(&mut policy, JournalOp::MinInterval { interval }, |p| {
            p.region.min_interval = prior;
        })?;
        tracing::info!(prior, new = interval, by = %caller, "cooldown interval changed");
        self.emit(LedgerEvent::MinIntervalChanged {
            prior,
            new: interval,
            by: caller,
        });
        Ok(prior)
    }

    /// Replaces the supply cap of `kind`, returning the prior cap.
    ///
    /// # Errors
    ///
    /// `Unauthorized`, `InvalidConfig` if below current supply, or `Journal`.
    pub fn set_max_supply(&self, caller: ActorId, kind: KindId, max: u64) -> LedgerResult<u64> {
        let policy = self.policy.read();
        policy.region.access.require_admin(caller, "set supply cap")?;

        let mut vault = self.vault.write();
        let prior = vault.ledger.set_max_supply(kind, max)?;
        if let Err(err) = vault.append_journal(&[JournalOp::SupplyCap { kind, max }]) {
            vault.ledger.set_max_supply(kind, prior)?;
            return Err(err);
        }

        tracing::info!(kind, prior, new = max, by = %caller, "supply cap changed");
        self.emit(LedgerEvent::SupplyCapChanged {
            kind,
            prior,
            new: max,
            by: caller,
        });
        Ok(prior)
    }

    /// Grants a role. Returns `true` if anything changed.
    ///
    /// # Errors
    ///
    /// `Unauthorized` or `Journal`.
    pub fn grant_role(&self, caller: ActorId, role: Role, actor: ActorId) -> LedgerResult<bool> {
        let mut policy = self.policy.write();
        let saved = policy.region.access.clone();
        let changed = policy.region.access.grant(caller, role.clone(), actor)?;
        if changed {
            let op = JournalOp::RoleGranted {
                by: caller,
                role: role.clone(),
                actor,
            };
            self.journal_policy(&mut policy, op, |p| p.region.access = saved)?;
            self.emit(LedgerEvent::RoleGranted {
                role,
                actor,
                by: caller,
            });
        }
        Ok(changed)
    }

    /// Revokes a role. Returns `true` if anything changed.
    ///
    /// # Errors
    ///
    /// `Unauthorized` or `Journal`.
    pub fn revoke_role(&self, caller: ActorId, role: &Role, actor: ActorId) -> LedgerResult<bool> {
        let mut policy = self.policy.write();
        let saved = policy.region.access.clone();
        let changed = policy.region.access.revoke(caller, role, actor)?;
        if changed {
            let op = JournalOp::RoleRevoked {
                by: caller,
                role: role.clone(),
                actor,
            };
            self.journal_policy(&mut policy, op, |p| p.region.access = saved)?;
            self.emit(LedgerEvent::RoleRevoked {
                role: role.clone(),
                actor,
                by: caller,
            });
        }
        Ok(changed)
    }

    // ------------------------------------------------------------------
    // Views
    // ------------------------------------------------------------------

    /// Balance of `owner` in `kind`.
    #[must_use]
    pub fn balance_of(&self, owner: ActorId, kind: KindId) -> u64 {
        self.vault.read().ledger.balance_of(owner, kind)
    }

    /// Supply record of `kind`.
    #[must_use]
    pub fn supply_of(&self, kind: KindId) -> SupplyRecord {
        self.vault.read().ledger.supply_of(kind)
    }

    /// Copy of the current configuration.
    #[must_use]
    pub fn config_snapshot(&self) -> ConfigSnapshot {
        self.policy.read().region.config.snapshot()
    }

    /// Current pause flags.
    #[must_use]
    pub fn pause_status(&self) -> PauseState {
        self.policy.read().region.pause
    }

    /// Current cooldown interval.
    #[must_use]
    pub fn min_interval(&self) -> Tick {
        self.policy.read().region.min_interval
    }

    /// Cooldown state of `actor` at the current tick.
    #[must_use]
    pub fn cooldown_status(&self, actor: ActorId) -> CooldownStatus {
        let min_interval = self.min_interval();
        self.cooldowns
            .read()
            .status(actor, self.current_tick(), min_interval)
    }

    /// Whether `actor` holds `role`.
    #[must_use]
    pub fn has_role(&self, role: &Role, actor: ActorId) -> bool {
        self.policy.read().region.access.has_role(role, actor)
    }

    /// Whether `actor` may administer the engine.
    #[must_use]
    pub fn is_admin(&self, actor: ActorId) -> bool {
        self.policy.read().region.access.is_admin(actor)
    }

    /// Role grant and revoke history.
    #[must_use]
    pub fn role_audit_log(&self) -> Vec<RoleChange> {
        self.policy.read().region.access.audit_log().to_vec()
    }

    /// Current processor identity.
    #[must_use]
    pub fn executor(&self) -> ActorId {
        self.policy.read().executor
    }

    /// Executor grants held by anyone but the current processor.
    #[must_use]
    pub fn stale_executors(&self) -> Vec<ActorId> {
        let policy = self.policy.read();
        policy.region.access.stale_executors(policy.executor)
    }

    /// Next selector nonce.
    #[must_use]
    pub fn nonce(&self) -> u64 {
        self.vault.read().selector.nonce()
    }

    /// Returns true if every kind's books balance.
    #[must_use]
    pub fn conservation_holds(&self) -> bool {
        self.vault.read().ledger.conservation_holds()
    }

    /// Takes every buffered event, oldest first.
    pub fn drain_events(&self) -> Vec<LedgerEvent> {
        std::mem::take(&mut *self.events.lock())
    }

    fn emit(&self, event: LedgerEvent) {
        self.events.lock().push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pyre_shared::ConfigValue;

    const KEY: KindId = 1;
    const CAPSULE: KindId = 2;
    const REWARD_A: KindId = 30;
    const REWARD_B: KindId = 100;

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

    fn engine() -> RitualEngine {
        let mut genesis = GenesisConfig::new(owner(), executor());
        genesis.conversion_ratio = Some(5);
        genesis.kinds = vec![
            crate::config::KindMapping {
                role: KindRole::InputKey,
                kind: KEY,
            },
            crate::config::KindMapping {
                role: KindRole::ConversionSource,
                kind: CAPSULE,
            },
            crate::config::KindMapping {
                role: KindRole::ConversionTarget,
                kind: KEY,
            },
        ];
        genesis.reward_pool = vec![
            RewardEntry::new(REWARD_A, 70, Rarity::Common),
            RewardEntry::new(REWARD_B, 30, Rarity::Legendary),
        ];
        genesis.roles = vec![crate::config::RoleGrant {
            role: Role::SHOP_MINTER,
            actor: shop(),
        }];
        RitualEngine::genesis(&genesis, SecureSeed::test_seed()).unwrap()
    }

    #[test]
    fn test_engine_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<RitualEngine>();
    }

    #[test]
    fn test_genesis_grants_executor() {
        let engine = engine();
        assert!(engine.has_role(&Role::RITUAL_EXECUTOR, executor()));
        assert!(engine.is_admin(owner()));
        assert!(engine.stale_executors().is_empty());
        assert!(engine.drain_events().is_empty());
    }

    #[test]
    fn test_conversion_is_lossy() {
        let engine = engine();
        engine.mint(shop(), player(), CAPSULE, 7).unwrap();

        let outcome = engine.convert(player(), 7).unwrap();
        assert_eq!(outcome.output_kind, KEY);
        assert_eq!(outcome.output_amount, 1);
        assert_eq!(engine.balance_of(player(), CAPSULE), 0);
        assert_eq!(engine.supply_of(CAPSULE).burned, 7);
        assert!(engine.conservation_holds());
    }

    #[test]
    fn test_conversion_below_ratio_changes_nothing() {
        let engine = engine();
        engine.mint(shop(), player(), CAPSULE, 4).unwrap();

        let err = engine.convert(player(), 4).unwrap_err();
        assert!(matches!(err, LedgerError::InvalidAmount { amount: 4, .. }));
        assert_eq!(engine.balance_of(player(), CAPSULE), 4);
        assert!(engine.cooldown_status(player()).last_operation.is_none());
    }

    #[test]
    fn test_sacrifice_consumes_nonce_and_emits_event() {
        let engine = engine();
        engine.mint(shop(), player(), KEY, 1).unwrap();
        engine.drain_events();

        let outcome = engine.sacrifice(player(), 1).unwrap();
        assert_eq!(outcome.nonce, Some(0));
        assert_eq!(engine.nonce(), 1);
        assert!(matches!(outcome.output_kind, REWARD_A | REWARD_B));
        assert_eq!(engine.balance_of(player(), outcome.output_kind), 1);

        let events = engine.drain_events();
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], LedgerEvent::RitualCompleted { nonce: Some(0), .. }));
    }

    #[test]
    fn test_rolled_back_sacrifice_keeps_nonce_consumed() {
        let engine = engine();
        engine.set_max_supply(owner(), REWARD_A, 1).unwrap();
        engine.set_max_supply(owner(), REWARD_B, 1).unwrap();
        engine.mint(shop(), player(), REWARD_A, 1).unwrap();
        engine.mint(shop(), player(), REWARD_B, 1).unwrap();
        engine.mint(shop(), player(), KEY, 1).unwrap();
        engine.drain_events();

        let err = engine.sacrifice(player(), 1).unwrap_err();
        assert!(matches!(err, LedgerError::SupplyExceeded { .. }));
        assert_eq!(engine.balance_of(player(), KEY), 1);
        assert_eq!(engine.supply_of(KEY).burned, 0);
        assert_eq!(engine.nonce(), 1);
        assert!(engine.conservation_holds());

        let events = engine.drain_events();
        assert!(matches!(
            events.as_slice(),
            [LedgerEvent::RitualRolledBack { nonce: Some(0), .. }]
        ));
    }

    #[test]
    fn test_config_change_event_carries_prior_value() {
        let engine = engine();
        engine.set_conversion_ratio(owner(), 10).unwrap();

        let events = engine.drain_events();
        assert!(matches!(
            &events[..],
            [LedgerEvent::ConfigChanged {
                prior: ConfigValue::Ratio(5),
                new: ConfigValue::Ratio(10),
                ..
            }]
        ));
        assert!(engine.set_conversion_ratio(player(), 3).is_err());
        assert_eq!(engine.config_snapshot().conversion_ratio, Some(10));
    }

    #[test]
    fn test_preflight_reports_without_writing() {
        let engine = engine();
        assert!(matches!(
            engine.preflight(player(), RitualKind::Sacrifice, 1),
            Err(LedgerError::InsufficientBalance { .. })
        ));
        engine.mint(shop(), player(), KEY, 1).unwrap();
        assert!(engine.preflight(player(), RitualKind::Sacrifice, 1).is_ok());
        assert_eq!(engine.nonce(), 0);
        assert_eq!(engine.balance_of(player(), KEY), 1);
    }

    #[test]
    fn test_tick_controls() {
        let engine = engine();
        assert_eq!(engine.advance_tick(), 1);
        engine.set_tick(40);
        assert_eq!(engine.current_tick(), 40);
    }
}
