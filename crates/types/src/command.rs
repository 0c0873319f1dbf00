//! Ledger commands.
//!
//! A command is the smallest unit of world-state mutation. The executor is a
//! total function over this enum; adding a variant without an executor arm is
//! a compile error.

use crate::{AccountId, Amount, AssetId, DomainId, PublicKey, RoleName};
use crate::permissions::{GrantablePermission, RolePermission};
use serde::{Deserialize, Serialize};

/// A peer joining or described in the network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerRecord {
    /// Peer identity key.
    pub pubkey: PublicKey,
    /// Network address, `host:port`.
    pub address: String,
    /// Optional TLS certificate (PEM).
    pub tls_certificate: Option<String>,
}

/// All command variants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    AddAssetQuantity {
        asset_id: AssetId,
        amount: Amount,
    },
    SubtractAssetQuantity {
        asset_id: AssetId,
        amount: Amount,
    },
    TransferAsset {
        src_account_id: AccountId,
        dest_account_id: AccountId,
        asset_id: AssetId,
        amount: Amount,
        description: String,
    },
    AddPeer {
        peer: PeerRecord,
    },
    RemovePeer {
        pubkey: PublicKey,
    },
    AddSignatory {
        account_id: AccountId,
        pubkey: PublicKey,
    },
    RemoveSignatory {
        account_id: AccountId,
        pubkey: PublicKey,
    },
    SetQuorum {
        account_id: AccountId,
        quorum: u32,
    },
    SetAccountDetail {
        account_id: AccountId,
        key: String,
        value: String,
    },
    CompareAndSetAccountDetail {
        account_id: AccountId,
        key: String,
        value: String,
        old_value: Option<String>,
        check_empty: bool,
    },
    CreateAccount {
        account_name: String,
        domain_id: DomainId,
        pubkey: PublicKey,
    },
    CreateAsset {
        asset_name: String,
        domain_id: DomainId,
        precision: u8,
    },
    CreateDomain {
        domain_id: DomainId,
        default_role: RoleName,
    },
    CreateRole {
        role_name: RoleName,
        permissions: Vec<RolePermission>,
    },
    AppendRole {
        account_id: AccountId,
        role_name: RoleName,
    },
    DetachRole {
        account_id: AccountId,
        role_name: RoleName,
    },
    GrantPermission {
        account_id: AccountId,
        permission: GrantablePermission,
    },
    RevokePermission {
        account_id: AccountId,
        permission: GrantablePermission,
    },
    SetSettingValue {
        key: String,
        value: String,
    },
    CallEngine {
        caller: AccountId,
        callee: Option<String>,
        input: Vec<u8>,
    },
}

impl Command {
    /// Short variant name for error descriptions and telemetry.
    pub fn kind(&self) -> &'static str {
        match self {
            Command::AddAssetQuantity { .. } => "AddAssetQuantity",
            Command::SubtractAssetQuantity { .. } => "SubtractAssetQuantity",
            Command::TransferAsset { .. } => "TransferAsset",
            Command::AddPeer { .. } => "AddPeer",
            Command::RemovePeer { .. } => "RemovePeer",
            Command::AddSignatory { .. } => "AddSignatory",
            Command::RemoveSignatory { .. } => "RemoveSignatory",
            Command::SetQuorum { .. } => "SetQuorum",
            Command::SetAccountDetail { .. } => "SetAccountDetail",
            Command::CompareAndSetAccountDetail { .. } => "CompareAndSetAccountDetail",
            Command::CreateAccount { .. } => "CreateAccount",
            Command::CreateAsset { .. } => "CreateAsset",
            Command::CreateDomain { .. } => "CreateDomain",
            Command::CreateRole { .. } => "CreateRole",
            Command::AppendRole { .. } => "AppendRole",
            Command::DetachRole { .. } => "DetachRole",
            Command::GrantPermission { .. } => "GrantPermission",
            Command::RevokePermission { .. } => "RevokePermission",
            Command::SetSettingValue { .. } => "SetSettingValue",
            Command::CallEngine { .. } => "CallEngine",
        }
    }
}
