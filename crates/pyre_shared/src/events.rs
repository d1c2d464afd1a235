//! Ledger events emitted to adapters.
//!
//! Every state transition that an operator might need to audit later
//! produces exactly one event. Adapters drain them from the engine and
//! forward them wherever they keep their audit trail.

use serde::{Deserialize, Serialize};

use crate::types::{ActorId, KindId, PauseFlag, Rarity, RitualKind, Role, Tick};

/// Event type discriminator
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    /// Ritual ran to completion
    RitualCompleted = 0,
    /// Ritual burned its input but was unwound
    RitualRolledBack = 1,
    /// Privileged mint outside a ritual
    Minted = 2,
    /// Burn outside a ritual
    Burned = 3,
    /// Configuration value replaced
    ConfigChanged = 4,
    /// Role granted
    RoleGranted = 5,
    /// Role revoked
    RoleRevoked = 6,
    /// Pause flag toggled
    PauseChanged = 7,
    /// Cooldown interval replaced
    MinIntervalChanged = 8,
    /// Supply cap replaced
    SupplyCapChanged = 9,
    /// Processor identity replaced
    ExecutorUpgraded = 10,
}

/// A configuration value as recorded in a change event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigValue {
    /// Nothing was configured.
    Unset,
    /// A token kind id.
    Kind(KindId),
    /// Conversion ratio (input units per output unit).
    Ratio(u64),
    /// Output amount for a tier.
    Amount(u64),
    /// Reward pool entries as (outcome, weight, tier).
    Pool(Vec<(KindId, u32, Rarity)>),
}

/// Events produced by the ledger.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerEvent {
    /// A ritual completed.
    RitualCompleted {
        /// Actor who performed the ritual
        actor: ActorId,
        /// Sacrifice or conversion
        ritual: RitualKind,
        /// Kind burned
        input_kind: KindId,
        /// Amount burned
        input_amount: u64,
        /// Kind minted
        output_kind: KindId,
        /// Amount minted
        output_amount: u64,
        /// Tier of the selected outcome (randomized rituals only)
        tier: Option<Rarity>,
        /// Selector nonce consumed (randomized rituals only)
        nonce: Option<u64>,
        /// Tick the ritual was recorded at
        tick: Tick,
    },

    /// A ritual was unwound after its burn.
    RitualRolledBack {
        /// Actor who attempted the ritual
        actor: ActorId,
        /// Sacrifice or conversion
        ritual: RitualKind,
        /// Kind that was restored
        input_kind: KindId,
        /// Amount that was restored
        input_amount: u64,
        /// Selector nonce consumed, if selection already ran
        nonce: Option<u64>,
        /// Why the ritual was unwound
        reason: String,
    },

    /// Tokens minted through the privileged passthrough.
    Minted {
        /// Role holder who minted
        caller: ActorId,
        /// Receiver
        owner: ActorId,
        /// Kind minted
        kind: KindId,
        /// Amount minted
        amount: u64,
    },

    /// Tokens burned through the passthrough.
    Burned {
        /// Owner or role holder who burned
        caller: ActorId,
        /// Owner debited
        owner: ActorId,
        /// Kind burned
        kind: KindId,
        /// Amount burned
        amount: u64,
    },

    /// A configuration value was replaced.
    ConfigChanged {
        /// Config version after the change
        version: u64,
        /// Which value changed (e.g. `kind.INPUT_KEY`, `reward_pool`)
        key: String,
        /// Value before
        prior: ConfigValue,
        /// Value after
        new: ConfigValue,
        /// Admin who made the change
        by: ActorId,
    },

    /// A role was granted.
    RoleGranted {
        /// Role name
        role: Role,
        /// Actor receiving the role
        actor: ActorId,
        /// Admin who granted it
        by: ActorId,
    },

    /// A role was revoked.
    RoleRevoked {
        /// Role name
        role: Role,
        /// Actor losing the role
        actor: ActorId,
        /// Admin who revoked it
        by: ActorId,
    },

    /// A pause flag was toggled.
    PauseChanged {
        /// Flag
        flag: PauseFlag,
        /// New value
        paused: bool,
        /// Admin who toggled it
        by: ActorId,
    },

    /// The cooldown interval was replaced.
    MinIntervalChanged {
        /// Interval before
        prior: Tick,
        /// Interval after
        new: Tick,
        /// Admin who changed it
        by: ActorId,
    },

    /// A supply cap was replaced.
    SupplyCapChanged {
        /// Kind
        kind: KindId,
        /// Cap before (0 = unlimited)
        prior: u64,
        /// Cap after (0 = unlimited)
        new: u64,
        /// Admin who changed it
        by: ActorId,
    },

    /// The processor identity changed.
    ExecutorUpgraded {
        /// Identity before
        prior: ActorId,
        /// Identity after
        new: ActorId,
    },
}

impl LedgerEvent {
    /// Returns the event type
    #[must_use]
    pub const fn event_type(&self) -> EventType {
        match self {
            Self::RitualCompleted { .. } => EventType::RitualCompleted,
            Self::RitualRolledBack { .. } => EventType::RitualRolledBack,
            Self::Minted { .. } => EventType::Minted,
            Self::Burned { .. } => EventType::Burned,
            Self::ConfigChanged { .. } => EventType::ConfigChanged,
            Self::RoleGranted { .. } => EventType::RoleGranted,
            Self::RoleRevoked { .. } => EventType::RoleRevoked,
            Self::PauseChanged { .. } => EventType::PauseChanged,
            Self::MinIntervalChanged { .. } => EventType::MinIntervalChanged,
            Self::SupplyCapChanged { .. } => EventType::SupplyCapChanged,
            Self::ExecutorUpgraded { .. } => EventType::ExecutorUpgraded,
        }
    }

    /// Returns the actor whose holdings this event touched, if any.
    #[must_use]
    pub fn subject(&self) -> Option<ActorId> {
        match self {
            Self::RitualCompleted { actor, .. } | Self::RitualRolledBack { actor, .. } => Some(*actor),
            Self::Minted { owner, .. } | Self::Burned { owner, .. } => Some(*owner),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_and_subject() {
        let actor = ActorId::repeat_byte(7);
        let event = LedgerEvent::RitualCompleted {
            actor,
            ritual: RitualKind::Conversion,
            input_kind: 2,
            input_amount: 5,
            output_kind: 1,
            output_amount: 1,
            tier: None,
            nonce: None,
            tick: 10,
        };
        assert_eq!(event.event_type(), EventType::RitualCompleted);
        assert_eq!(event.subject(), Some(actor));

        let pause = LedgerEvent::PauseChanged {
            flag: PauseFlag::Global,
            paused: true,
            by: actor,
        };
        assert_eq!(pause.event_type(), EventType::PauseChanged);
        assert_eq!(pause.subject(), None);
    }
}
