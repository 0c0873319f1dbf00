//! World-state key layout.
//!
//! Keys are `/`-delimited path strings. The exact templates are part of the
//! storage format: iteration uses prefix scans over them, and a replayed
//! chain must reproduce them byte-for-byte.
//!
//! ```text
//! peer/address/<pubkey>                                   → address
//! peer/tls/<pubkey>                                       → certificate
//! peers/count                                             → u64
//! account/<domain>/<name>                                 → "" (existence marker)
//! account/<domain>/<name>/quorum                          → u64
//! account/<domain>/<name>/signatories/<pubkey>            → ""
//! account/<domain>/<name>/roles/<role>                    → ""
//! account/<domain>/<name>/assets/<asset>                  → amount string
//! account/<domain>/<name>/assets_count                    → u64
//! account/<domain>/<name>/details/<writer>/<key>          → value
//! account/<domain>/<name>/details_count                   → u64
//! account/<domain>/<name>/grants/<grantor account id>     → bitstring
//! asset/<domain>/<name>                                   → precision (u64)
//! domain/<id>                                             → default role
//! role/<name>                                             → bitstring
//! settings/<key>                                          → value
//! signatories_unique/<pubkey>                             → u64 holder count
//! domains_count                                           → u64
//! ```
//!
//! Public keys appear in lowercase hex. Account tokens inside other keys use
//! the `name@domain` form; asset tokens use `name#domain`.

use ledger_types::{AccountId, AssetId, PublicKey};

/// Total peer count.
pub const PEERS_COUNT: &str = "peers/count";

/// Height of the last block applied to the world state.
pub const WSV_HEIGHT: &str = "wsv/height";

/// Hash of the last block applied to the world state.
pub const WSV_TOP_HASH: &str = "wsv/top_hash";

/// Total domain count.
pub const DOMAINS_COUNT: &str = "domains_count";

/// Setting key bounding transfer description length.
pub const MAX_DESCRIPTION_SIZE_KEY: &str = "MaxDescriptionSize";

/// Writer id recorded for details set by transactions without a creator.
pub const GENESIS_WRITER: &str = "genesis";

pub fn peer_address(pubkey: &PublicKey) -> String {
    format!("peer/address/{}", pubkey.to_hex())
}

/// Prefix of every peer address entry.
pub const PEER_ADDRESS_PREFIX: &str = "peer/address/";

pub fn peer_tls(pubkey: &PublicKey) -> String {
    format!("peer/tls/{}", pubkey.to_hex())
}

pub fn account(id: &AccountId) -> String {
    format!("account/{}/{}", id.domain, id.name)
}

pub fn account_quorum(id: &AccountId) -> String {
    format!("account/{}/{}/quorum", id.domain, id.name)
}

pub fn account_signatory(id: &AccountId, pubkey: &PublicKey) -> String {
    format!(
        "account/{}/{}/signatories/{}",
        id.domain,
        id.name,
        pubkey.to_hex()
    )
}

pub fn account_signatories_prefix(id: &AccountId) -> String {
    format!("account/{}/{}/signatories/", id.domain, id.name)
}

pub fn account_role(id: &AccountId, role: &str) -> String {
    format!("account/{}/{}/roles/{}", id.domain, id.name, role)
}

pub fn account_roles_prefix(id: &AccountId) -> String {
    format!("account/{}/{}/roles/", id.domain, id.name)
}

pub fn account_asset(id: &AccountId, asset: &AssetId) -> String {
    format!("account/{}/{}/assets/{}", id.domain, id.name, asset)
}

pub fn account_assets_count(id: &AccountId) -> String {
    format!("account/{}/{}/assets_count", id.domain, id.name)
}

pub fn account_detail(id: &AccountId, writer: &str, key: &str) -> String {
    format!(
        "account/{}/{}/details/{}/{}",
        id.domain, id.name, writer, key
    )
}

pub fn account_details_count(id: &AccountId) -> String {
    format!("account/{}/{}/details_count", id.domain, id.name)
}

/// The grant edge held by `grantee`, keyed by the granting account.
pub fn account_grant(grantee: &AccountId, grantor: &AccountId) -> String {
    format!("account/{}/{}/grants/{}", grantee.domain, grantee.name, grantor)
}

pub fn asset(id: &AssetId) -> String {
    format!("asset/{}/{}", id.domain, id.name)
}

pub fn domain(id: &str) -> String {
    format!("domain/{id}")
}

pub fn role(name: &str) -> String {
    format!("role/{name}")
}

pub fn setting(key: &str) -> String {
    format!("settings/{key}")
}

pub fn signatory_unique(pubkey: &PublicKey) -> String {
    format!("signatories_unique/{}", pubkey.to_hex())
}
