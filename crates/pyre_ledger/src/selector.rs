//! # Weighted Reward Selector
//!
//! Picks one outcome from a weighted reward pool.
//!
//! ## Algorithm
//!
//! 1. Derive a 64-bit digest from the actor, the engine nonce and the tick
//!    with SipHash-2-4, keyed by the server secret mixed with an external salt
//! 2. Map the digest onto `[0, total_weight)` by multiply-shift
//! 3. Walk the pool in stored order, accumulating weights, and return the
//!    first entry whose running sum exceeds the roll
//!
//! Weight-0 entries never advance the running sum, so they can never be
//! returned. A pool whose weights sum to zero cannot be constructed.
//!
//! ## Security Model
//!
//! The salt is public (it normally comes from an external beacon such as a
//! block hash) and changes over time. The secret is not. The nonce
//! increments on every selection, so an actor cannot replay an outcome
//! inside one tick even with identical inputs.
//!
//! ```text
//! Actor knows:           Engine adds:           Result:
//! ┌─────────────────┐    ┌─────────────────┐    ┌─────────────────┐
//! │ Salt            │ +  │ Server secret   │ =  │ Unpredictable   │
//! │ Own address     │    │ Engine nonce    │    │ Cannot pre-     │
//! │ Current tick    │    │                 │    │ compute rolls   │
//! └─────────────────┘    └─────────────────┘    └─────────────────┘
//! ```

use std::collections::BTreeMap;
use std::hash::Hasher;

use pyre_shared::{ActorId, ConfigValue, KindId, Rarity, Tick, GENESIS_NONCE};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use siphasher::sip128::{Hasher128, SipHasher24};

use crate::error::{LedgerError, LedgerResult};

#[inline]
fn read_u64(bytes: &[u8], at: usize) -> u64 {
    let mut word = [0u8; 8];
    word.copy_from_slice(&bytes[at..at + 8]);
    u64::from_le_bytes(word)
}

/// External entropy mixed into every selection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EntropySalt {
    /// Lower 64 bits.
    pub low: u64,
    /// Upper 64 bits.
    pub high: u64,
}

impl EntropySalt {
    /// Takes the first 128 bits of a 256-bit beacon value (e.g. a block hash).
    #[must_use]
    pub fn from_beacon(beacon: &[u8; 32]) -> Self {
        Self {
            low: read_u64(beacon, 0),
            high: read_u64(beacon, 8),
        }
    }

    /// Creates a test salt (NOT FOR PRODUCTION).
    #[must_use]
    pub const fn test_salt() -> Self {
        Self {
            low: 0xDEAD_BEEF_CAFE_BABE,
            high: 0x1337_C0DE_DEAD_F00D,
        }
    }
}

/// Server-side secret plus the current tick.
#[derive(Clone)]
pub struct SecureSeed {
    /// 256-bit secret. Never logged.
    secret: [u64; 4],
    /// Current tick.
    tick: Tick,
}

impl SecureSeed {
    /// Creates a seed from 32 secret bytes.
    #[must_use]
    pub fn new(secret: &[u8; 32]) -> Self {
        Self {
            secret: [
                read_u64(secret, 0),
                read_u64(secret, 8),
                read_u64(secret, 16),
                read_u64(secret, 24),
            ],
            tick: 0,
        }
    }

    /// Draws a fresh secret from `rng`.
    ///
    /// Pass a CSPRNG in production.
    pub fn generate<R: RngCore>(rng: &mut R) -> Self {
        let mut secret = [0u8; 32];
        rng.fill_bytes(&mut secret);
        Self::new(&secret)
    }

    /// Creates a test seed (NOT FOR PRODUCTION).
    #[must_use]
    pub const fn test_seed() -> Self {
        Self {
            secret: [
                0x1234_5678_9ABC_DEF0,
                0xFEDC_BA98_7654_3210,
                0xAAAA_BBBB_CCCC_DDDD,
                0x1111_2222_3333_4444,
            ],
            tick: 0,
        }
    }

    /// Sets the tick.
    pub fn set_tick(&mut self, tick: Tick) {
        self.tick = tick;
    }

    /// Gets the tick.
    #[must_use]
    pub const fn tick(&self) -> Tick {
        self.tick
    }

    /// Mixes secret, salt, tick and nonce into a SipHash key pair.
    #[inline]
    #[must_use]
    pub fn derive_keys(&self, salt: EntropySalt, nonce: u64) -> (u64, u64) {
        let k1 = salt.low.wrapping_add(self.secret[0]).rotate_left(13) ^ self.secret[1] ^ self.tick;
        let k2 = salt.high.wrapping_add(self.secret[2]).rotate_left(17) ^ self.secret[3] ^ nonce;
        (k1, k2)
    }
}

impl Default for SecureSeed {
    fn default() -> Self {
        Self::test_seed()
    }
}

impl std::fmt::Debug for SecureSeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecureSeed")
            .field("secret", &"[REDACTED]")
            .field("tick", &self.tick)
            .finish()
    }
}

const fn default_tier() -> Rarity {
    Rarity::Common
}

/// One possible outcome of a randomized ritual.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardEntry {
    /// Kind minted if this entry is selected.
    pub outcome: KindId,
    /// Relative weight. Zero keeps the entry listed but disabled.
    pub weight: u32,
    /// Tier, which decides the minted amount.
    #[serde(default = "default_tier")]
    pub tier: Rarity,
}

impl RewardEntry {
    /// Creates an entry.
    #[inline]
    #[must_use]
    pub const fn new(outcome: KindId, weight: u32, tier: Rarity) -> Self {
        Self {
            outcome,
            weight,
            tier,
        }
    }
}

/// Ordered, weighted list of outcomes.
///
/// Always holds at least one entry with non-zero weight.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<RewardEntry>", into = "Vec<RewardEntry>")]
pub struct RewardPool {
    entries: Vec<RewardEntry>,
    /// Sum of all weights, recomputed on construction.
    total_weight: u64,
}

impl RewardPool {
    /// Builds a pool, rejecting one with nothing selectable.
    ///
    /// # Errors
    ///
    /// `EmptyPool` if there are no entries or all weights are zero.
    pub fn new(entries: Vec<RewardEntry>) -> LedgerResult<Self> {
        let total_weight: u64 = entries.iter().map(|e| u64::from(e.weight)).sum();
        if total_weight == 0 {
            return Err(LedgerError::EmptyPool);
        }
        Ok(Self {
            entries,
            total_weight,
        })
    }

    /// Returns the entries in stored order.
    #[must_use]
    pub fn entries(&self) -> &[RewardEntry] {
        &self.entries
    }

    /// Returns the sum of weights.
    #[inline]
    #[must_use]
    pub const fn total_weight(&self) -> u64 {
        self.total_weight
    }

    /// Entries that can actually be selected.
    pub fn selectable(&self) -> impl Iterator<Item = &RewardEntry> {
        self.entries.iter().filter(|e| e.weight > 0)
    }

    /// Returns the entry owning `roll`, for `roll < total_weight`.
    #[must_use]
    pub fn pick(&self, roll: u64) -> Option<&RewardEntry> {
        let mut cumulative = 0u64;
        for entry in &self.entries {
            cumulative += u64::from(entry.weight);
            if roll < cumulative {
                return Some(entry);
            }
        }
        None
    }

    /// Renders the pool for a change record.
    #[must_use]
    pub fn to_config_value(&self) -> ConfigValue {
        ConfigValue::Pool(
            self.entries
                .iter()
                .map(|e| (e.outcome, e.weight, e.tier))
                .collect(),
        )
    }
}

impl TryFrom<Vec<RewardEntry>> for RewardPool {
    type Error = LedgerError;

    fn try_from(entries: Vec<RewardEntry>) -> Result<Self, Self::Error> {
        Self::new(entries)
    }
}

impl From<RewardPool> for Vec<RewardEntry> {
    fn from(pool: RewardPool) -> Self {
        pool.entries
    }
}

/// Result of one selection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Selection {
    /// Kind selected.
    pub outcome: KindId,
    /// Tier of the selected entry.
    pub tier: Rarity,
    /// Nonce consumed.
    pub nonce: u64,
    /// Roll in `[0, total_weight)`.
    pub roll: u64,
}

/// The selector.
#[derive(Debug)]
pub struct RewardSelector {
    /// Server secret and tick.
    seed: SecureSeed,
    /// Current external salt.
    salt: EntropySalt,
    /// Next nonce to hand out. Monotonic.
    nonce: u64,
}

impl RewardSelector {
    /// Creates a selector starting at the genesis nonce.
    #[must_use]
    pub fn new(seed: SecureSeed) -> Self {
        Self {
            seed,
            salt: EntropySalt::default(),
            nonce: GENESIS_NONCE,
        }
    }

    /// Resumes from a persisted nonce.
    #[must_use]
    pub fn resume(seed: SecureSeed, nonce: u64) -> Self {
        Self {
            seed,
            salt: EntropySalt::default(),
            nonce,
        }
    }

    /// Next nonce that will be consumed.
    #[must_use]
    pub const fn nonce(&self) -> u64 {
        self.nonce
    }

    /// Raises the nonce to at least `nonce`. Never lowers it.
    pub(crate) fn advance_nonce_to(&mut self, nonce: u64) {
        self.nonce = self.nonce.max(nonce);
    }

    /// Replaces the external salt.
    pub fn update_salt(&mut self, salt: EntropySalt) {
        self.salt = salt;
    }

    /// Updates the tick mixed into the key.
    pub fn set_tick(&mut self, tick: Tick) {
        self.seed.set_tick(tick);
    }

    /// Replaces the server secret. The nonce carries on.
    pub fn rotate_secret(&mut self, secret: &[u8; 32]) {
        let tick = self.seed.tick();
        self.seed = SecureSeed::new(secret);
        self.seed.set_tick(tick);
    }

    /// Selects an outcome for `actor`, consuming one nonce.
    ///
    /// # Errors
    ///
    /// `EmptyPool` if the walk finds nothing. A validly constructed pool
    /// always yields an entry.
    pub fn select(&mut self, pool: &RewardPool, actor: ActorId) -> LedgerResult<Selection> {
        let nonce = self.nonce;
        self.nonce = self.nonce.wrapping_add(1);

        let digest = self.digest(actor, nonce);
        let roll = Self::scale(digest, pool.total_weight());
        let entry = pool.pick(roll).ok_or(LedgerError::EmptyPool)?;

        Ok(Selection {
            outcome: entry.outcome,
            tier: entry.tier,
            nonce,
            roll,
        })
    }

    /// SipHash-2-4 digest of actor, nonce and tick.
    fn digest(&self, actor: ActorId, nonce: u64) -> u64 {
        let (k1, k2) = self.seed.derive_keys(self.salt, nonce);
        let mut hasher = SipHasher24::new_with_keys(k1, k2);
        hasher.write(actor.as_slice());
        hasher.write_u64(nonce);
        hasher.write_u64(self.seed.tick());

        let result = hasher.finish128();
        result.h1 ^ result.h2
    }

    /// Maps a uniform 64-bit value onto `[0, bound)`.
    #[inline]
    fn scale(value: u64, bound: u64) -> u64 {
        // Top 64 bits of the 128-bit product are always below `bound`.
        ((u128::from(value) * u128::from(bound)) >> 64) as u64
    }
}

/// Outcome histogram, for offline verification of a pool.
#[derive(Clone, Debug, Default)]
pub struct SelectionStatistics {
    /// Total selections recorded.
    pub total: u64,
    /// Count per outcome kind.
    pub by_outcome: BTreeMap<KindId, u64>,
    /// Count per tier.
    pub by_tier: BTreeMap<Rarity, u64>,
}

impl SelectionStatistics {
    /// Creates empty statistics.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one selection.
    pub fn record(&mut self, selection: &Selection) {
        self.total += 1;
        *self.by_outcome.entry(selection.outcome).or_insert(0) += 1;
        *self.by_tier.entry(selection.tier).or_insert(0) += 1;
    }

    /// Share of `outcome` among all selections, in percent.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn percent(&self, outcome: KindId) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        let hits = self.by_outcome.get(&outcome).copied().unwrap_or(0);
        (hits as f64 / self.total as f64) * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    const ASH: KindId = 30;
    const COSMETIC_A: KindId = 100;
    const COSMETIC_B: KindId = 101;

    fn actor() -> ActorId {
        ActorId::repeat_byte(0x42)
    }

    fn mixed_pool() -> RewardPool {
        RewardPool::new(vec![
            RewardEntry::new(ASH, 70, Rarity::Common),
            RewardEntry::new(COSMETIC_A, 30, Rarity::Rare),
        ])
        .unwrap()
    }

    #[test]
    fn test_empty_and_zero_weight_pools_rejected() {
        assert_eq!(RewardPool::new(vec![]), Err(LedgerError::EmptyPool));
        assert_eq!(
            RewardPool::new(vec![
                RewardEntry::new(COSMETIC_A, 0, Rarity::Rare),
                RewardEntry::new(COSMETIC_B, 0, Rarity::Epic),
            ]),
            Err(LedgerError::EmptyPool)
        );
    }

    #[test]
    fn test_total_weight_matches_entries() {
        let pool = mixed_pool();
        assert_eq!(pool.total_weight(), 100);
        assert_eq!(pool.selectable().count(), 2);
    }

    #[test]
    fn test_zero_weight_outcome_never_selected() {
        let pool = RewardPool::new(vec![
            RewardEntry::new(COSMETIC_A, 100, Rarity::Rare),
            RewardEntry::new(COSMETIC_B, 0, Rarity::Epic),
        ])
        .unwrap();
        let mut selector = RewardSelector::new(SecureSeed::test_seed());
        selector.update_salt(EntropySalt::test_salt());

        for _ in 0..1000 {
            let selection = selector.select(&pool, actor()).unwrap();
            assert_eq!(selection.outcome, COSMETIC_A);
        }
    }

    #[test]
    fn test_leading_zero_weight_entry_is_skipped() {
        let pool = RewardPool::new(vec![
            RewardEntry::new(COSMETIC_B, 0, Rarity::Epic),
            RewardEntry::new(ASH, 1, Rarity::Common),
        ])
        .unwrap();
        assert_eq!(pool.pick(0).map(|e| e.outcome), Some(ASH));
        assert!(pool.pick(1).is_none());
    }

    #[test]
    fn test_pick_walks_in_stored_order() {
        let pool = mixed_pool();
        assert_eq!(pool.pick(0).map(|e| e.outcome), Some(ASH));
        assert_eq!(pool.pick(69).map(|e| e.outcome), Some(ASH));
        assert_eq!(pool.pick(70).map(|e| e.outcome), Some(COSMETIC_A));
        assert_eq!(pool.pick(99).map(|e| e.outcome), Some(COSMETIC_A));
    }

    #[test]
    fn test_nonce_increments_every_selection() {
        let pool = mixed_pool();
        let mut selector = RewardSelector::new(SecureSeed::test_seed());
        let first = selector.select(&pool, actor()).unwrap();
        let second = selector.select(&pool, actor()).unwrap();

        assert_eq!(first.nonce, GENESIS_NONCE);
        assert_eq!(second.nonce, GENESIS_NONCE + 1);
        assert_eq!(selector.nonce(), GENESIS_NONCE + 2);
    }

    #[test]
    fn test_deterministic_given_seed_salt_and_nonce() {
        let pool = mixed_pool();
        let mut a = RewardSelector::resume(SecureSeed::test_seed(), 40);
        let mut b = RewardSelector::resume(SecureSeed::test_seed(), 40);
        a.update_salt(EntropySalt::test_salt());
        b.update_salt(EntropySalt::test_salt());

        for _ in 0..50 {
            assert_eq!(a.select(&pool, actor()).unwrap(), b.select(&pool, actor()).unwrap());
        }
    }

    #[test]
    fn test_rolls_vary_with_nonce() {
        let pool = RewardPool::new(vec![RewardEntry::new(ASH, u32::MAX, Rarity::Common)]).unwrap();
        let mut selector = RewardSelector::new(SecureSeed::test_seed());

        let first = selector.select(&pool, actor()).unwrap().roll;
        let varied = (0..100).any(|_| selector.select(&pool, actor()).unwrap().roll != first);
        assert!(varied, "rolls should change as the nonce advances");
    }

    #[test]
    fn test_different_secrets_give_different_rolls() {
        let pool = RewardPool::new(vec![RewardEntry::new(ASH, u32::MAX, Rarity::Common)]).unwrap();
        let mut a = RewardSelector::new(SecureSeed::new(&[0u8; 32]));
        let mut b = RewardSelector::new(SecureSeed::new(&[1u8; 32]));

        let different = (0..100)
            .filter(|_| a.select(&pool, actor()).unwrap().roll != b.select(&pool, actor()).unwrap().roll)
            .count();
        assert!(different > 90, "only {different}/100 rolls differed");
    }

    #[test]
    fn test_distribution_follows_weights() {
        let pool = mixed_pool();
        let mut selector = RewardSelector::new(SecureSeed::generate(&mut ChaCha20Rng::seed_from_u64(7)));
        selector.update_salt(EntropySalt::test_salt());

        let mut stats = SelectionStatistics::new();
        for _ in 0..20_000 {
            stats.record(&selector.select(&pool, actor()).unwrap());
        }

        let ash = stats.percent(ASH);
        assert!((65.0..75.0).contains(&ash), "ash share was {ash:.2}%");
        assert_eq!(stats.total, 20_000);
        assert_eq!(stats.by_tier.values().sum::<u64>(), 20_000);
    }

    #[test]
    fn test_rotate_secret_keeps_nonce() {
        let pool = mixed_pool();
        let mut selector = RewardSelector::new(SecureSeed::test_seed());
        selector.select(&pool, actor()).unwrap();
        selector.rotate_secret(&[9u8; 32]);
        assert_eq!(selector.nonce(), GENESIS_NONCE + 1);
    }

    #[test]
    fn test_secret_is_redacted_in_debug() {
        let seed = SecureSeed::new(&[42u8; 32]);
        let debug = format!("{seed:?}");
        assert!(debug.contains("REDACTED"));
        assert!(!debug.contains("2a2a"));
    }

    #[test]
    fn test_salt_from_beacon() {
        let mut beacon = [0u8; 32];
        beacon[0] = 1;
        beacon[8] = 2;
        let salt = EntropySalt::from_beacon(&beacon);
        assert_eq!(salt, EntropySalt { low: 1, high: 2 });
    }
}
