// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! DpidGuard: the static allowlist `ConnectionServer` consults before a
//! freshly-seen DPID is allowed to finish session establishment.
//!
//! Grounded on `config.rs`'s `DpidCheckerConfig` (`AR`/`DR` lists); role
//! classes are informational metadata a caller may use to branch
//! behavior, not an enforcement mechanism of their own.

use crate::config::{DpidCheckerConfig, DpidRoleClass};
use parking_lot::RwLock;
use std::collections::HashMap;

/// Allowlist of known switch DPIDs. Mutable at runtime: `MastershipController`
/// de-allowlists a switch that insists on an `equal` role (spec §4.7 /
/// §7's "role equal refusal" error policy) via [`DpidGuard::deny`].
#[derive(Debug, Default)]
pub struct DpidGuard {
    roles: RwLock<HashMap<u64, DpidRoleClass>>,
}

impl DpidGuard {
    pub fn new(config: &DpidCheckerConfig) -> Self {
        let mut roles = HashMap::new();
        for dpid in &config.access {
            roles.insert(*dpid, DpidRoleClass::Access);
        }
        for dpid in &config.distribution {
            roles.insert(*dpid, DpidRoleClass::Distribution);
        }
        DpidGuard { roles: RwLock::new(roles) }
    }

    /// Empty allowlists mean "accept everything" — the checker is opt-in,
    /// matching the config default of no `AR`/`DR` entries.
    pub fn is_open(&self) -> bool {
        self.roles.read().is_empty()
    }

    pub fn is_allowed(&self, dpid: u64) -> bool {
        self.is_open() || self.roles.read().contains_key(&dpid)
    }

    pub fn role_of(&self, dpid: u64) -> Option<DpidRoleClass> {
        self.roles.read().get(&dpid).copied()
    }

    /// Removes `dpid` from the allowlist. A no-op when the guard is open
    /// (nothing was ever added, so there is nothing to remove) since an
    /// open guard's "allow everything" behavior does not depend on the map.
    pub fn deny(&self, dpid: u64) {
        self.roles.write().remove(&dpid);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_allowlist_accepts_anything() {
        let guard = DpidGuard::new(&DpidCheckerConfig::default());
        assert!(guard.is_allowed(0xdead_beef));
    }

    #[test]
    fn nonempty_allowlist_rejects_unknown_dpid() {
        let config = DpidCheckerConfig { access: vec![1, 2], ..Default::default() };
        let guard = DpidGuard::new(&config);
        assert!(guard.is_allowed(1));
        assert!(!guard.is_allowed(3));
        assert_eq!(guard.role_of(1), Some(DpidRoleClass::Access));
    }
}
