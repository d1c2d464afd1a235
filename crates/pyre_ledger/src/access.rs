//! # Access Control Registry
//!
//! Maps role names to the actors allowed to act under them.
//!
//! ## Upgrade Hazard
//!
//! The processor's own identity changes whenever its logic is replaced.
//! The new identity has to be granted `RITUAL_EXECUTOR`, and the old one
//! has to be revoked. These are two separate admin calls. No
//! other operation grants or revokes anything as a side effect, and both
//! calls land in the audit log. [`AccessRegistry::stale_executors`] lists
//! executor grants that outlived their processor.

use std::collections::{BTreeMap, BTreeSet};

use pyre_shared::{ActorId, Role};
use serde::{Deserialize, Serialize};

use crate::error::{LedgerError, LedgerResult};

/// One audited grant or revoke.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleChange {
    /// Role affected.
    pub role: Role,
    /// Actor affected.
    pub actor: ActorId,
    /// Admin who made the change.
    pub by: ActorId,
    /// `true` for a grant, `false` for a revoke.
    pub granted: bool,
}

/// Role registry.
///
/// The genesis owner is always an admin, whether or not it holds
/// `LEDGER_ADMIN` explicitly.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessRegistry {
    /// Genesis owner.
    owner: ActorId,
    /// Role name -> holders.
    roles: BTreeMap<Role, BTreeSet<ActorId>>,
    /// Every effective grant and revoke, in order.
    audit: Vec<RoleChange>,
}

impl AccessRegistry {
    /// Creates a registry whose only admin is `owner`.
    #[must_use]
    pub fn new(owner: ActorId) -> Self {
        Self {
            owner,
            roles: BTreeMap::new(),
            audit: Vec::new(),
        }
    }

    /// Returns the genesis owner.
    #[must_use]
    pub const fn owner(&self) -> ActorId {
        self.owner
    }

    /// Checks whether `actor` holds `role`.
    #[must_use]
    pub fn has_role(&self, role: &Role, actor: ActorId) -> bool {
        self.roles.get(role).is_some_and(|holders| holders.contains(&actor))
    }

    /// Checks whether `actor` holds any of `roles`.
    #[must_use]
    pub fn has_any(&self, roles: &[Role], actor: ActorId) -> bool {
        roles.iter().any(|role| self.has_role(role, actor))
    }

    /// Checks whether `actor` may administer the ledger.
    #[must_use]
    pub fn is_admin(&self, actor: ActorId) -> bool {
        actor == self.owner || self.has_role(&Role::LEDGER_ADMIN, actor)
    }

    /// Fails with `Unauthorized` unless `actor` is an admin.
    ///
    /// # Errors
    ///
    /// `LedgerError::Unauthorized` naming `action`.
    pub fn require_admin(&self, actor: ActorId, action: &str) -> LedgerResult<()> {
        if self.is_admin(actor) {
            Ok(())
        } else {
            Err(LedgerError::unauthorized(actor, action))
        }
    }

    /// Grants `role` to `actor`.
    ///
    /// Returns `true` if the grant changed anything. Re-granting a held role
    /// is accepted and not audited.
    ///
    /// # Errors
    ///
    /// `Unauthorized` if `caller` is not an admin.
    pub fn grant(&mut self, caller: ActorId, role: Role, actor: ActorId) -> LedgerResult<bool> {
        self.require_admin(caller, &format!("grant {role}"))?;

        let inserted = self.roles.entry(role.clone()).or_default().insert(actor);
        if inserted {
            tracing::info!(%role, %actor, by = %caller, "role granted");
            self.audit.push(RoleChange {
                role,
                actor,
                by: caller,
                granted: true,
            });
        }
        Ok(inserted)
    }

    /// Revokes `role` from `actor`.
    ///
    /// Returns `true` if the revoke changed anything.
    ///
    /// # Errors
    ///
    /// `Unauthorized` if `caller` is not an admin.
    pub fn revoke(&mut self, caller: ActorId, role: &Role, actor: ActorId) -> LedgerResult<bool> {
        self.require_admin(caller, &format!("revoke {role}"))?;

        let Some(holders) = self.roles.get_mut(role) else {
            return Ok(false);
        };
        let removed = holders.remove(&actor);
        if holders.is_empty() {
            self.roles.remove(role);
        }
        if removed {
            tracing::info!(%role, %actor, by = %caller, "role revoked");
            self.audit.push(RoleChange {
                role: role.clone(),
                actor,
                by: caller,
                granted: false,
            });
        }
        Ok(removed)
    }

    /// Returns every holder of `role`.
    #[must_use]
    pub fn holders(&self, role: &Role) -> Vec<ActorId> {
        self.roles
            .get(role)
            .map(|holders| holders.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Executor grants held by anyone other than `current`.
    ///
    /// Non-empty after an upgrade means the old processor was never revoked.
    #[must_use]
    pub fn stale_executors(&self, current: ActorId) -> Vec<ActorId> {
        self.holders(&Role::RITUAL_EXECUTOR)
            .into_iter()
            .filter(|actor| *actor != current)
            .collect()
    }

    /// Returns the audit log.
    #[must_use]
    pub fn audit_log(&self) -> &[RoleChange] {
        &self.audit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owner() -> ActorId {
        ActorId::repeat_byte(0xA0)
    }

    #[test]
    fn test_owner_is_admin_at_genesis() {
        let registry = AccessRegistry::new(owner());
        assert!(registry.is_admin(owner()));
        assert!(!registry.is_admin(ActorId::repeat_byte(1)));
    }

    #[test]
    fn test_grant_and_revoke_are_audited() {
        let mut registry = AccessRegistry::new(owner());
        let executor = ActorId::repeat_byte(2);

        assert!(registry.grant(owner(), Role::RITUAL_EXECUTOR, executor).unwrap());
        assert!(registry.has_role(&Role::RITUAL_EXECUTOR, executor));
        // Second grant is a no-op.
        assert!(!registry.grant(owner(), Role::RITUAL_EXECUTOR, executor).unwrap());

        assert!(registry.revoke(owner(), &Role::RITUAL_EXECUTOR, executor).unwrap());
        assert!(!registry.has_role(&Role::RITUAL_EXECUTOR, executor));

        let log = registry.audit_log();
        assert_eq!(log.len(), 2);
        assert!(log[0].granted);
        assert!(!log[1].granted);
        assert_eq!(log[1].by, owner());
    }

    #[test]
    fn test_non_admin_cannot_grant() {
        let mut registry = AccessRegistry::new(owner());
        let intruder = ActorId::repeat_byte(9);

        let err = registry
            .grant(intruder, Role::LEDGER_ADMIN, intruder)
            .unwrap_err();
        assert!(matches!(err, LedgerError::Unauthorized { .. }));
        assert!(!registry.is_admin(intruder));
        assert!(registry.audit_log().is_empty());
    }

    #[test]
    fn test_delegated_admin_can_grant() {
        let mut registry = AccessRegistry::new(owner());
        let ops = ActorId::repeat_byte(3);
        registry.grant(owner(), Role::LEDGER_ADMIN, ops).unwrap();

        let shop = ActorId::repeat_byte(4);
        assert!(registry.grant(ops, Role::SHOP_MINTER, shop).unwrap());
        assert_eq!(registry.holders(&Role::SHOP_MINTER), vec![shop]);
    }

    #[test]
    fn test_stale_executors_after_identity_change() {
        let mut registry = AccessRegistry::new(owner());
        let old = ActorId::repeat_byte(5);
        let new = ActorId::repeat_byte(6);

        registry.grant(owner(), Role::RITUAL_EXECUTOR, old).unwrap();
        registry.grant(owner(), Role::RITUAL_EXECUTOR, new).unwrap();
        assert_eq!(registry.stale_executors(new), vec![old]);

        registry.revoke(owner(), &Role::RITUAL_EXECUTOR, old).unwrap();
        assert!(registry.stale_executors(new).is_empty());
    }
}
