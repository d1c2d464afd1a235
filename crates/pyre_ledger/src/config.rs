//! # Configuration Manager
//!
//! Holds the mutable policy that gives the ledger its meaning:
//!
//! - which kind id plays which [`KindRole`]
//! - the reward pool for randomized rituals
//! - the conversion ratio
//! - per-tier output amounts
//!
//! Nothing here touches balances. Remapping `INPUT_KEY` from kind 1 to
//! kind 7 leaves every holder of kind 1 exactly where they were.
//!
//! ## Change Records
//!
//! Every setter replaces one value atomically, bumps the version, and
//! returns a [`ConfigChange`] carrying the prior and new values. Invalid
//! values are rejected by the setter itself, so a bad admin call fails
//! immediately instead of breaking the next ritual.
//!
//! ## Genesis File
//!
//! ```toml
//! owner = "0x00000000000000000000000000000000000000a0"
//! executor = "0x00000000000000000000000000000000000000e0"
//! min_interval = 10
//! conversion_ratio = 5
//!
//! [[kinds]]
//! role = "INPUT_KEY"
//! kind = 1
//!
//! [[reward_pool]]
//! outcome = 30
//! weight = 70
//! tier = "Common"
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use pyre_shared::{ActorId, ConfigValue, KindId, KindRole, Rarity, Role, Tick, DEFAULT_MIN_INTERVAL, DEFAULT_TIER_AMOUNT};
use serde::{Deserialize, Serialize};

use crate::error::{LedgerError, LedgerResult};
use crate::limiter::PauseState;
use crate::selector::{RewardEntry, RewardPool};

/// Record of one configuration change.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigChange {
    /// Version after the change.
    pub version: u64,
    /// Which value changed.
    pub key: String,
    /// Value before.
    pub prior: ConfigValue,
    /// Value after.
    pub new: ConfigValue,
}

/// Read-only copy of the current configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigSnapshot {
    /// Version, bumped on every change.
    pub version: u64,
    /// Role -> kind id.
    pub kinds: BTreeMap<KindRole, KindId>,
    /// Reward pool entries, if configured.
    pub reward_pool: Option<Vec<RewardEntry>>,
    /// Conversion ratio, if configured.
    pub conversion_ratio: Option<u64>,
    /// Tier -> output amount overrides.
    pub tier_amounts: BTreeMap<Rarity, u64>,
}

/// The configuration manager.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigManager {
    kinds: BTreeMap<KindRole, KindId>,
    reward_pool: Option<RewardPool>,
    conversion_ratio: Option<u64>,
    tier_amounts: BTreeMap<Rarity, u64>,
    version: u64,
}

impl ConfigManager {
    /// Creates an empty configuration at version 0.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current version.
    #[must_use]
    pub const fn version(&self) -> u64 {
        self.version
    }

    fn bump(&mut self, key: String, prior: ConfigValue, new: ConfigValue) -> ConfigChange {
        self.version += 1;
        tracing::info!(version = self.version, %key, ?prior, ?new, "configuration changed");
        ConfigChange {
            version: self.version,
            key,
            prior,
            new,
        }
    }

    /// Maps `role` onto `kind`.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` if the mapping would make conversion source and
    /// target the same kind.
    pub fn set_kind_mapping(&mut self, role: KindRole, kind: KindId) -> LedgerResult<ConfigChange> {
        let counterpart = match role {
            KindRole::ConversionSource => Some(KindRole::ConversionTarget),
            KindRole::ConversionTarget => Some(KindRole::ConversionSource),
            KindRole::InputKey => None,
        };
        if let Some(other) = counterpart {
            if self.kinds.get(&other) == Some(&kind) {
                return Err(LedgerError::InvalidConfig(format!(
                    "{role} and {other} cannot both be kind {kind}"
                )));
            }
        }

        let prior = self
            .kinds
            .insert(role, kind)
            .map_or(ConfigValue::Unset, ConfigValue::Kind);
        Ok(self.bump(format!("kind.{role}"), prior, ConfigValue::Kind(kind)))
    }

    /// Replaces the whole reward pool.
    ///
    /// # Errors
    ///
    /// `EmptyPool` if no entry has a non-zero weight.
    pub fn set_reward_pool(&mut self, entries: Vec<RewardEntry>) -> LedgerResult<ConfigChange> {
        let pool = RewardPool::new(entries)?;
        let new = pool.to_config_value();
        let prior = self
            .reward_pool
            .replace(pool)
            .map_or(ConfigValue::Unset, |p| p.to_config_value());
        Ok(self.bump("reward_pool".to_string(), prior, new))
    }

    /// Sets how many source units buy one target unit.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` if `ratio` is zero.
    pub fn set_conversion_ratio(&mut self, ratio: u64) -> LedgerResult<ConfigChange> {
        if ratio == 0 {
            return Err(LedgerError::InvalidConfig(
                "conversion ratio must be at least 1".to_string(),
            ));
        }
        let prior = self
            .conversion_ratio
            .replace(ratio)
            .map_or(ConfigValue::Unset, ConfigValue::Ratio);
        Ok(self.bump("conversion_ratio".to_string(), prior, ConfigValue::Ratio(ratio)))
    }

    /// Sets the output amount for outcomes of `tier`.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` if `amount` is zero.
    pub fn set_tier_amount(&mut self, tier: Rarity, amount: u64) -> LedgerResult<ConfigChange> {
        if amount == 0 {
            return Err(LedgerError::InvalidConfig(format!(
                "output amount for {tier:?} must be at least 1"
            )));
        }
        let prior = self
            .tier_amounts
            .insert(tier, amount)
            .map_or(ConfigValue::Unset, ConfigValue::Amount);
        Ok(self.bump(format!("tier_amount.{tier:?}"), prior, ConfigValue::Amount(amount)))
    }

    /// Resolves `role` to its current kind id.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` if the role is unmapped.
    pub fn resolve(&self, role: KindRole) -> LedgerResult<KindId> {
        self.kinds
            .get(&role)
            .copied()
            .ok_or_else(|| LedgerError::InvalidConfig(format!("{role} is not mapped to a kind")))
    }

    /// Current conversion ratio.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` if never set.
    pub fn conversion_ratio(&self) -> LedgerResult<u64> {
        self.conversion_ratio
            .ok_or_else(|| LedgerError::InvalidConfig("conversion ratio is not set".to_string()))
    }

    /// Current reward pool.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` if never set.
    pub fn reward_pool(&self) -> LedgerResult<&RewardPool> {
        self.reward_pool
            .as_ref()
            .ok_or_else(|| LedgerError::InvalidConfig("reward pool is not set".to_string()))
    }

    /// Output amount for `tier`.
    #[must_use]
    pub fn tier_amount(&self, tier: Rarity) -> u64 {
        self.tier_amounts
            .get(&tier)
            .copied()
            .unwrap_or(DEFAULT_TIER_AMOUNT)
    }

    /// Copies out the whole configuration.
    #[must_use]
    pub fn snapshot(&self) -> ConfigSnapshot {
        ConfigSnapshot {
            version: self.version,
            kinds: self.kinds.clone(),
            reward_pool: self.reward_pool.as_ref().map(|p| p.entries().to_vec()),
            conversion_ratio: self.conversion_ratio,
            tier_amounts: self.tier_amounts.clone(),
        }
    }
}

// ============================================================================
// Genesis file
// ============================================================================

/// One `[[kinds]]` row.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KindMapping {
    /// Semantic role.
    pub role: KindRole,
    /// Kind id.
    pub kind: KindId,
}

/// One `[[tier_amounts]]` row.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierAmount {
    /// Tier.
    pub tier: Rarity,
    /// Output amount.
    pub amount: u64,
}

/// One `[[supply_caps]]` row.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupplyCap {
    /// Kind id.
    pub kind: KindId,
    /// Cap. Zero means unlimited.
    pub max: u64,
}

/// One `[[roles]]` row.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleGrant {
    /// Role name.
    pub role: Role,
    /// Holder.
    pub actor: ActorId,
}

const fn default_min_interval() -> Tick {
    DEFAULT_MIN_INTERVAL
}

/// Everything needed to stand up a fresh engine.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisConfig {
    /// Genesis owner; always an admin.
    pub owner: ActorId,
    /// Processor identity. Granted `RITUAL_EXECUTOR` at genesis.
    pub executor: ActorId,
    /// Cooldown between rituals of one actor.
    #[serde(default = "default_min_interval")]
    pub min_interval: Tick,
    /// Conversion ratio.
    #[serde(default)]
    pub conversion_ratio: Option<u64>,
    /// Initial pause flags.
    #[serde(default)]
    pub pause: PauseState,
    /// Role -> kind mapping.
    #[serde(default)]
    pub kinds: Vec<KindMapping>,
    /// Reward pool. Left unset when empty.
    #[serde(default)]
    pub reward_pool: Vec<RewardEntry>,
    /// Tier amount overrides.
    #[serde(default)]
    pub tier_amounts: Vec<TierAmount>,
    /// Supply caps.
    #[serde(default)]
    pub supply_caps: Vec<SupplyCap>,
    /// Extra role grants beyond the executor.
    #[serde(default)]
    pub roles: Vec<RoleGrant>,
}

impl GenesisConfig {
    /// Minimal genesis: an owner, a processor, nothing configured.
    #[must_use]
    pub fn new(owner: ActorId, executor: ActorId) -> Self {
        Self {
            owner,
            executor,
            min_interval: DEFAULT_MIN_INTERVAL,
            conversion_ratio: None,
            pause: PauseState::default(),
            kinds: Vec::new(),
            reward_pool: Vec::new(),
            tier_amounts: Vec::new(),
            supply_caps: Vec::new(),
            roles: Vec::new(),
        }
    }

    /// Parses a genesis file.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` with the parser message.
    pub fn from_toml_str(source: &str) -> LedgerResult<Self> {
        toml::from_str(source).map_err(|e| LedgerError::InvalidConfig(format!("genesis parse failed: {e}")))
    }

    /// Reads and parses a genesis file from disk.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> LedgerResult<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .map_err(|e| LedgerError::InvalidConfig(format!("cannot read {}: {e}", path.display())))?;
        Self::from_toml_str(&source)
    }
}
