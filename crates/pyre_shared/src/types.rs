//! Identifier and vocabulary types shared by the ledger and its adapters.

use std::borrow::Cow;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Address of an actor (player wallet, processor contract, admin key).
pub type ActorId = alloy_primitives::Address;

/// Numeric identifier of a fungible token kind.
///
/// Kind ids carry no meaning on their own. The configuration maps a
/// [`KindRole`] onto an id, and that mapping may change after deployment.
pub type KindId = u32;

/// Discrete unit of time used for cooldown comparisons.
pub type Tick = u64;

/// A named permission bucket.
///
/// The well-known roles are associated constants; any other name is a
/// valid role too, it just grants nothing inside the ledger itself.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Role(Cow<'static, str>);

impl Role {
    /// May grant and revoke roles and change policy.
    pub const LEDGER_ADMIN: Self = Self(Cow::Borrowed("LEDGER_ADMIN"));
    /// The processor identity. May mint, and burn on behalf of an owner.
    pub const RITUAL_EXECUTOR: Self = Self(Cow::Borrowed("RITUAL_EXECUTOR"));
    /// External shop module. May mint only.
    pub const SHOP_MINTER: Self = Self(Cow::Borrowed("SHOP_MINTER"));

    /// Creates a role from an arbitrary name.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self(Cow::Owned(name.into()))
    }

    /// Returns the role name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Semantic meaning of a token kind, resolved through configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum KindRole {
    /// Kind burned by a randomized sacrifice ("key").
    InputKey,
    /// Kind burned by a deterministic conversion ("cap").
    ///
    /// Config files may also name it `INPUT_CAP`.
    #[serde(alias = "INPUT_CAP")]
    ConversionSource,
    /// Kind minted by a deterministic conversion.
    ConversionTarget,
}

impl KindRole {
    /// All roles, in declaration order.
    pub const ALL: [Self; 3] = [Self::InputKey, Self::ConversionSource, Self::ConversionTarget];

    /// Canonical upper-case name, as used in config files.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InputKey => "INPUT_KEY",
            Self::ConversionSource => "CONVERSION_SOURCE",
            Self::ConversionTarget => "CONVERSION_TARGET",
        }
    }
}

impl fmt::Display for KindRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The two ritual flavours.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum RitualKind {
    /// Burn keys, roll the reward pool.
    Sacrifice = 0,
    /// Burn the conversion source, receive the target at a fixed ratio.
    Conversion = 1,
}

impl RitualKind {
    /// The category pause flag that halts this ritual.
    #[must_use]
    pub const fn pause_flag(self) -> PauseFlag {
        match self {
            Self::Sacrifice => PauseFlag::Sacrifices,
            Self::Conversion => PauseFlag::Conversions,
        }
    }
}

impl fmt::Display for RitualKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sacrifice => f.write_str("sacrifice"),
            Self::Conversion => f.write_str("conversion"),
        }
    }
}

/// Independently toggleable pause switches.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PauseFlag {
    /// Halts every ritual.
    Global,
    /// Halts randomized sacrifices only.
    Sacrifices,
    /// Halts deterministic conversions only.
    Conversions,
}

impl fmt::Display for PauseFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Global => f.write_str("global"),
            Self::Sacrifices => f.write_str("sacrifices"),
            Self::Conversions => f.write_str("conversions"),
        }
    }
}

/// Rarity tier of a reward pool outcome.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Rarity {
    /// Ash and other consolation tokens.
    Common = 0,
    /// Fragments.
    Uncommon = 1,
    /// Shards and plain cosmetics.
    Rare = 2,
    /// Animated cosmetics.
    Epic = 3,
    /// Artifacts.
    Legendary = 4,
    /// One-off artifacts.
    Mythic = 5,
}

impl Rarity {
    /// Converts from u8, saturating at [`Rarity::Mythic`].
    #[inline]
    #[must_use]
    pub const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Common,
            1 => Self::Uncommon,
            2 => Self::Rare,
            3 => Self::Epic,
            4 => Self::Legendary,
            _ => Self::Mythic,
        }
    }
}
