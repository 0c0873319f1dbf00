//! Role and grantable permissions.
//!
//! Permissions come in two flavours:
//!
//! - **Role permissions** attach to roles and gate commands outright.
//!   `Root` implies every other role permission and is expanded to the full
//!   set when a role is created.
//! - **Grantable permissions** are delegated account-to-account via
//!   `GrantPermission` and let the grantee act on the grantor's behalf.
//!
//! Both sets persist in the world state as ASCII bitstrings ('0'/'1' per
//! permission, indexed by enum discriminant), so the variant order below is
//! part of the storage format.

use serde::{Deserialize, Serialize};

/// Permissions held through roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum RolePermission {
    AppendRole = 0,
    CreateRole,
    DetachRole,
    AddAssetQty,
    SubtractAssetQty,
    AddDomainAssetQty,
    SubtractDomainAssetQty,
    AddPeer,
    RemovePeer,
    AddSignatory,
    RemoveSignatory,
    SetQuorum,
    CreateAccount,
    CreateAsset,
    CreateDomain,
    SetDetail,
    Transfer,
    Receive,
    /// Permission to grant `AddMySignatory`.
    GrantAddMySignatory,
    /// Permission to grant `RemoveMySignatory`.
    GrantRemoveMySignatory,
    /// Permission to grant `SetMyQuorum`.
    GrantSetMyQuorum,
    /// Permission to grant `SetMyAccountDetail`.
    GrantSetMyAccountDetail,
    /// Permission to grant `TransferMyAssets`.
    GrantTransferMyAssets,
    /// Implies all other permissions.
    Root,
}

impl RolePermission {
    /// Every role permission, in bitstring order.
    pub const ALL: [RolePermission; 24] = [
        RolePermission::AppendRole,
        RolePermission::CreateRole,
        RolePermission::DetachRole,
        RolePermission::AddAssetQty,
        RolePermission::SubtractAssetQty,
        RolePermission::AddDomainAssetQty,
        RolePermission::SubtractDomainAssetQty,
        RolePermission::AddPeer,
        RolePermission::RemovePeer,
        RolePermission::AddSignatory,
        RolePermission::RemoveSignatory,
        RolePermission::SetQuorum,
        RolePermission::CreateAccount,
        RolePermission::CreateAsset,
        RolePermission::CreateDomain,
        RolePermission::SetDetail,
        RolePermission::Transfer,
        RolePermission::Receive,
        RolePermission::GrantAddMySignatory,
        RolePermission::GrantRemoveMySignatory,
        RolePermission::GrantSetMyQuorum,
        RolePermission::GrantSetMyAccountDetail,
        RolePermission::GrantTransferMyAssets,
        RolePermission::Root,
    ];

    /// Number of role permissions (bitstring width).
    pub const COUNT: usize = Self::ALL.len();
}

/// Permissions delegated account-to-account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum GrantablePermission {
    AddMySignatory = 0,
    RemoveMySignatory,
    SetMyQuorum,
    SetMyAccountDetail,
    TransferMyAssets,
}

impl GrantablePermission {
    /// Every grantable permission, in bitstring order.
    pub const ALL: [GrantablePermission; 5] = [
        GrantablePermission::AddMySignatory,
        GrantablePermission::RemoveMySignatory,
        GrantablePermission::SetMyQuorum,
        GrantablePermission::SetMyAccountDetail,
        GrantablePermission::TransferMyAssets,
    ];

    /// Number of grantable permissions (bitstring width).
    pub const COUNT: usize = Self::ALL.len();
}

/// The role permission required to grant (or revoke) a grantable permission.
pub fn permission_for(grantable: GrantablePermission) -> RolePermission {
    match grantable {
        GrantablePermission::AddMySignatory => RolePermission::GrantAddMySignatory,
        GrantablePermission::RemoveMySignatory => RolePermission::GrantRemoveMySignatory,
        GrantablePermission::SetMyQuorum => RolePermission::GrantSetMyQuorum,
        GrantablePermission::SetMyAccountDetail => RolePermission::GrantSetMyAccountDetail,
        GrantablePermission::TransferMyAssets => RolePermission::GrantTransferMyAssets,
    }
}

/// A set of role permissions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RolePermissionSet(u32);

impl RolePermissionSet {
    /// The empty set.
    pub fn empty() -> Self {
        Self(0)
    }

    /// Every permission set.
    pub fn all() -> Self {
        Self((1u32 << RolePermission::COUNT) - 1)
    }

    /// Build from a list of permissions, expanding `Root` to the full set.
    pub fn from_permissions(perms: &[RolePermission]) -> Self {
        let mut set = Self::empty();
        for &p in perms {
            set.set(p);
        }
        if set.is_set(RolePermission::Root) {
            set = Self::all();
        }
        set
    }

    pub fn set(&mut self, perm: RolePermission) {
        self.0 |= 1 << perm as u8;
    }

    pub fn unset(&mut self, perm: RolePermission) {
        self.0 &= !(1 << perm as u8);
    }

    /// Membership test. `Root` membership does not short-circuit here; use
    /// [`check`] for the command-gating semantics.
    pub fn is_set(&self, perm: RolePermission) -> bool {
        self.0 & (1 << perm as u8) != 0
    }

    /// `self ⊆ other` (bitwise).
    pub fn is_subset_of(&self, other: &RolePermissionSet) -> bool {
        self.0 & !other.0 == 0
    }

    /// Union in place.
    pub fn union_with(&mut self, other: &RolePermissionSet) {
        self.0 |= other.0;
    }

    /// ASCII '0'/'1' bitstring, one character per permission in enum order.
    pub fn to_bitstring(&self) -> String {
        (0..RolePermission::COUNT)
            .map(|i| if self.0 & (1 << i) != 0 { '1' } else { '0' })
            .collect()
    }

    /// Parse a bitstring produced by [`to_bitstring`]. Shorter strings leave
    /// the missing tail unset, so sets survive permission additions.
    pub fn from_bitstring(s: &str) -> Option<Self> {
        let mut bits = 0u32;
        for (i, c) in s.chars().enumerate() {
            if i >= RolePermission::COUNT {
                return None;
            }
            match c {
                '1' => bits |= 1 << i,
                '0' => {}
                _ => return None,
            }
        }
        Some(Self(bits))
    }
}

/// A set of grantable permissions on a (grantor, grantee) edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GrantablePermissionSet(u8);

impl GrantablePermissionSet {
    pub fn empty() -> Self {
        Self(0)
    }

    pub fn set(&mut self, perm: GrantablePermission) {
        self.0 |= 1 << perm as u8;
    }

    pub fn unset(&mut self, perm: GrantablePermission) {
        self.0 &= !(1 << perm as u8);
    }

    pub fn is_set(&self, perm: GrantablePermission) -> bool {
        self.0 & (1 << perm as u8) != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// ASCII '0'/'1' bitstring, one character per permission in enum order.
    pub fn to_bitstring(&self) -> String {
        (0..GrantablePermission::COUNT)
            .map(|i| if self.0 & (1 << i) != 0 { '1' } else { '0' })
            .collect()
    }

    /// Parse a bitstring produced by [`to_bitstring`].
    pub fn from_bitstring(s: &str) -> Option<Self> {
        let mut bits = 0u8;
        for (i, c) in s.chars().enumerate() {
            if i >= GrantablePermission::COUNT {
                return None;
            }
            match c {
                '1' => bits |= 1 << i,
                '0' => {}
                _ => return None,
            }
        }
        Some(Self(bits))
    }
}

/// Role check: passes when the set holds `required` or `Root`.
pub fn check(role_set: &RolePermissionSet, required: RolePermission) -> bool {
    role_set.is_set(required) || role_set.is_set(RolePermission::Root)
}

/// Grantable check: the role check passes, or the grant edge carries
/// `grant_req`.
pub fn check_grantable(
    role_set: &RolePermissionSet,
    grant_set: &GrantablePermissionSet,
    role_req: RolePermission,
    grant_req: GrantablePermission,
) -> bool {
    check(role_set, role_req) || grant_set.is_set(grant_req)
}

/// Domain-scoped check: passes when the creator holds `any_domain_req`, or
/// the domains match and the creator holds `same_domain_req`.
pub fn check_domain(
    target_domain: &str,
    creator_domain: &str,
    role_set: &RolePermissionSet,
    same_domain_req: RolePermission,
    any_domain_req: RolePermission,
) -> bool {
    if check(role_set, any_domain_req) {
        return true;
    }
    target_domain == creator_domain && check(role_set, same_domain_req)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_expands_to_all() {
        let set = RolePermissionSet::from_permissions(&[RolePermission::Root]);
        for p in RolePermission::ALL {
            assert!(set.is_set(p), "{p:?} missing after Root expansion");
        }
    }

    #[test]
    fn root_satisfies_any_check() {
        let mut set = RolePermissionSet::empty();
        set.set(RolePermission::Root);
        assert!(check(&set, RolePermission::Transfer));
        assert!(check(&set, RolePermission::RemovePeer));
    }

    #[test]
    fn bitstring_round_trip() {
        let mut set = RolePermissionSet::empty();
        set.set(RolePermission::Transfer);
        set.set(RolePermission::Receive);
        set.set(RolePermission::AddAssetQty);

        let s = set.to_bitstring();
        assert_eq!(s.len(), RolePermission::COUNT);
        assert_eq!(RolePermissionSet::from_bitstring(&s), Some(set));
    }

    #[test]
    fn subset_semantics() {
        let small = RolePermissionSet::from_permissions(&[RolePermission::Transfer]);
        let big = RolePermissionSet::from_permissions(&[
            RolePermission::Transfer,
            RolePermission::Receive,
        ]);
        assert!(small.is_subset_of(&big));
        assert!(!big.is_subset_of(&small));
        assert!(small.is_subset_of(&RolePermissionSet::all()));
    }

    #[test]
    fn grantable_check_accepts_either_path() {
        let roles = RolePermissionSet::from_permissions(&[RolePermission::Transfer]);
        let mut grants = GrantablePermissionSet::empty();

        // No grant, no role permission for the grantable path.
        assert!(!check_grantable(
            &RolePermissionSet::empty(),
            &grants,
            RolePermission::Transfer,
            GrantablePermission::TransferMyAssets,
        ));

        // Role path.
        assert!(check_grantable(
            &roles,
            &grants,
            RolePermission::Transfer,
            GrantablePermission::TransferMyAssets,
        ));

        // Grant path.
        grants.set(GrantablePermission::TransferMyAssets);
        assert!(check_grantable(
            &RolePermissionSet::empty(),
            &grants,
            RolePermission::Transfer,
            GrantablePermission::TransferMyAssets,
        ));
    }

    #[test]
    fn domain_check() {
        let same = RolePermissionSet::from_permissions(&[RolePermission::AddAssetQty]);
        let any = RolePermissionSet::from_permissions(&[RolePermission::AddDomainAssetQty]);

        assert!(check_domain(
            "test",
            "test",
            &same,
            RolePermission::AddAssetQty,
            RolePermission::AddDomainAssetQty
        ));
        assert!(!check_domain(
            "other",
            "test",
            &same,
            RolePermission::AddAssetQty,
            RolePermission::AddDomainAssetQty
        ));
        assert!(check_domain(
            "other",
            "test",
            &any,
            RolePermission::AddAssetQty,
            RolePermission::AddDomainAssetQty
        ));
    }

    #[test]
    fn grant_then_revoke_is_noop() {
        let mut grants = GrantablePermissionSet::empty();
        let before = grants.to_bitstring();
        grants.set(GrantablePermission::SetMyQuorum);
        grants.unset(GrantablePermission::SetMyQuorum);
        assert_eq!(grants.to_bitstring(), before);
    }

    #[test]
    fn permission_for_mapping_is_total() {
        for g in GrantablePermission::ALL {
            // Must not panic and must map into the grant-enabling block.
            let _ = permission_for(g);
        }
    }
}
