//! Command executor.
//!
//! Applies commands to the world state under a single transactional cursor.
//! Each command either applies completely or returns a typed error, in which
//! case the caller rolls back to the enclosing savepoint.
//!
//! With `do_validation` off (genesis and trusted replay) permission checks
//! are skipped, but the referential checks that later reads depend on still
//! run.

use crate::cursor::{Cursor, ExistencePolicy, KvError};
use crate::error::{CommandError, ErrorCode, StorageError, TransactionError};
use crate::keys;
use crate::storage::{KvBackend, ScanControl};
use ledger_types::{
    check, check_domain, check_grantable, permission_for, AccountId, Amount, AssetId, Command,
    GrantablePermissionSet, PeerRecord, PublicKey, RolePermission, RolePermissionSet, Transaction,
};
use tracing::debug;

/// Savepoint name wrapping each transaction.
const TX_SAVEPOINT: &str = "tx";

/// Executes commands against the world state.
///
/// Owns the transaction cursor; exactly one executor is active per backend
/// at a time.
pub struct CommandExecutor<'a> {
    cursor: Cursor<'a>,
}

impl<'a> CommandExecutor<'a> {
    /// Begin a transaction on the backend.
    pub fn new(backend: &'a dyn KvBackend) -> Self {
        Self {
            cursor: Cursor::begin(backend),
        }
    }

    /// Borrow the underlying cursor (read paths, tests).
    pub fn cursor(&self) -> &Cursor<'a> {
        &self.cursor
    }

    /// Commit everything applied so far.
    pub fn commit(self) -> Result<(), StorageError> {
        self.cursor.commit()
    }

    /// Discard everything applied so far.
    pub fn rollback(self) {
        self.cursor.rollback()
    }

    /// Apply one transaction under a savepoint. On any command failure the
    /// savepoint is rolled back and the error surfaces with the failing
    /// command's index.
    pub fn apply_transaction(
        &mut self,
        tx: &Transaction,
        do_validation: bool,
    ) -> Result<(), TransactionError> {
        self.cursor.savepoint(TX_SAVEPOINT);
        let creator = tx.payload().creator_account_id.as_ref();

        for (index, command) in tx.payload().commands.iter().enumerate() {
            if let Err(error) = self.execute(command, creator, do_validation) {
                debug!(tx_hash = %tx.hash(), index, %error, "transaction rolled back");
                self.cursor
                    .rollback_to_savepoint(TX_SAVEPOINT)
                    .expect("savepoint opened above");
                let _ = self.cursor.release_savepoint(TX_SAVEPOINT);
                return Err(TransactionError {
                    command_index: index,
                    error,
                });
            }
        }

        self.cursor
            .release_savepoint(TX_SAVEPOINT)
            .expect("savepoint opened above");
        Ok(())
    }

    /// Apply a whole block: every transaction in order, then the chain tip
    /// markers. Any transaction failure aborts the block.
    pub fn apply_block(
        &mut self,
        block: &ledger_types::Block,
        do_validation: bool,
    ) -> Result<(), TransactionError> {
        for tx in block.transactions() {
            self.apply_transaction(tx, do_validation)?;
        }
        self.cursor.put_u64(keys::WSV_HEIGHT, block.height().0);
        self.cursor
            .put_str(keys::WSV_TOP_HASH, &block.hash().to_hex());
        Ok(())
    }

    /// Apply one command.
    pub fn execute(
        &mut self,
        command: &Command,
        creator: Option<&AccountId>,
        do_validation: bool,
    ) -> Result<(), CommandError> {
        let kind = command.kind();

        // Resolve creator permissions once per command.
        let creator_permissions = if do_validation {
            let creator = creator.ok_or_else(|| {
                CommandError::new(kind, ErrorCode::NoAccount, "transaction has no creator")
            })?;
            self.account_permissions(kind, creator)?
        } else {
            RolePermissionSet::empty()
        };

        match command {
            Command::AddAssetQuantity { asset_id, amount } => self.add_asset_quantity(
                kind,
                creator,
                asset_id,
                amount,
                do_validation,
                &creator_permissions,
            ),
            Command::SubtractAssetQuantity { asset_id, amount } => self.subtract_asset_quantity(
                kind,
                creator,
                asset_id,
                amount,
                do_validation,
                &creator_permissions,
            ),
            Command::TransferAsset {
                src_account_id,
                dest_account_id,
                asset_id,
                amount,
                description,
            } => self.transfer_asset(
                kind,
                creator,
                src_account_id,
                dest_account_id,
                asset_id,
                amount,
                description,
                do_validation,
                &creator_permissions,
            ),
            Command::AddPeer { peer } => {
                self.add_peer(kind, peer, do_validation, &creator_permissions)
            }
            Command::RemovePeer { pubkey } => {
                self.remove_peer(kind, pubkey, do_validation, &creator_permissions)
            }
            Command::AddSignatory { account_id, pubkey } => self.add_signatory(
                kind,
                creator,
                account_id,
                pubkey,
                do_validation,
                &creator_permissions,
            ),
            Command::RemoveSignatory { account_id, pubkey } => self.remove_signatory(
                kind,
                creator,
                account_id,
                pubkey,
                do_validation,
                &creator_permissions,
            ),
            Command::SetQuorum { account_id, quorum } => self.set_quorum(
                kind,
                creator,
                account_id,
                *quorum,
                do_validation,
                &creator_permissions,
            ),
            Command::SetAccountDetail {
                account_id,
                key,
                value,
            } => self.set_account_detail(
                kind,
                creator,
                account_id,
                key,
                value,
                do_validation,
                &creator_permissions,
            ),
            Command::CompareAndSetAccountDetail {
                account_id,
                key,
                value,
                old_value,
                check_empty,
            } => self.compare_and_set_account_detail(
                kind,
                creator,
                account_id,
                key,
                value,
                old_value.as_deref(),
                *check_empty,
                do_validation,
                &creator_permissions,
            ),
            Command::CreateAccount {
                account_name,
                domain_id,
                pubkey,
            } => self.create_account(
                kind,
                account_name,
                domain_id.as_str(),
                pubkey,
                do_validation,
                &creator_permissions,
            ),
            Command::CreateAsset {
                asset_name,
                domain_id,
                precision,
            } => self.create_asset(
                kind,
                asset_name,
                domain_id.as_str(),
                *precision,
                do_validation,
                &creator_permissions,
            ),
            Command::CreateDomain {
                domain_id,
                default_role,
            } => self.create_domain(
                kind,
                domain_id.as_str(),
                default_role.as_str(),
                do_validation,
                &creator_permissions,
            ),
            Command::CreateRole {
                role_name,
                permissions,
            } => self.create_role(
                kind,
                role_name.as_str(),
                permissions,
                do_validation,
                &creator_permissions,
            ),
            Command::AppendRole {
                account_id,
                role_name,
            } => self.append_role(
                kind,
                account_id,
                role_name.as_str(),
                do_validation,
                &creator_permissions,
            ),
            Command::DetachRole {
                account_id,
                role_name,
            } => self.detach_role(
                kind,
                account_id,
                role_name.as_str(),
                do_validation,
                &creator_permissions,
            ),
            Command::GrantPermission {
                account_id,
                permission,
            } => self.grant_permission(
                kind,
                creator,
                account_id,
                *permission,
                do_validation,
                &creator_permissions,
            ),
            Command::RevokePermission {
                account_id,
                permission,
            } => self.revoke_permission(
                kind,
                creator,
                account_id,
                *permission,
                do_validation,
                &creator_permissions,
            ),
            Command::SetSettingValue { key, value } => {
                self.cursor.put_str(&keys::setting(key), value);
                Ok(())
            }
            Command::CallEngine { .. } => Err(CommandError::new(
                kind,
                ErrorCode::NoImplementation,
                "Not implemented",
            )),
        }
    }

    // ── asset commands ─────────────────────────────────────────────────────

    #[allow(clippy::too_many_arguments)]
    fn add_asset_quantity(
        &mut self,
        kind: &'static str,
        creator: Option<&AccountId>,
        asset_id: &AssetId,
        amount: &Amount,
        do_validation: bool,
        creator_permissions: &RolePermissionSet,
    ) -> Result<(), CommandError> {
        let creator = require_creator(kind, creator)?;
        if do_validation
            && !check_domain(
                asset_id.domain.as_str(),
                creator.domain.as_str(),
                creator_permissions,
                RolePermission::AddAssetQty,
                RolePermission::AddDomainAssetQty,
            )
        {
            return Err(no_permissions(kind));
        }

        let precision = self.asset_precision(kind, asset_id)?;
        let balance_key = keys::account_asset(creator, asset_id);
        let (balance, newly_held) = self.read_balance(kind, &balance_key, precision)?;

        let result = balance
            .checked_add(amount)
            .and_then(|sum| sum.with_precision(precision))
            .filter(|sum| amount.precision() <= precision)
            .ok_or_else(|| {
                CommandError::new(
                    kind,
                    ErrorCode::InvalidAssetAmount,
                    format!("Invalid asset {asset_id} amount"),
                )
            })?;

        self.cursor
            .put_str(&balance_key, &result.to_canonical_string());
        if newly_held {
            self.bump_count(kind, &keys::account_assets_count(creator), 1)?;
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn subtract_asset_quantity(
        &mut self,
        kind: &'static str,
        creator: Option<&AccountId>,
        asset_id: &AssetId,
        amount: &Amount,
        do_validation: bool,
        creator_permissions: &RolePermissionSet,
    ) -> Result<(), CommandError> {
        let creator = require_creator(kind, creator)?;
        if do_validation
            && !check_domain(
                asset_id.domain.as_str(),
                creator.domain.as_str(),
                creator_permissions,
                RolePermission::SubtractAssetQty,
                RolePermission::SubtractDomainAssetQty,
            )
        {
            return Err(no_permissions(kind));
        }

        let precision = self.asset_precision(kind, asset_id)?;
        if amount.precision() > precision {
            return Err(CommandError::new(
                kind,
                ErrorCode::InvalidAmount,
                format!(
                    "Invalid precision of asset {asset_id}: expected at most {precision}, got {}",
                    amount.precision()
                ),
            ));
        }

        let balance_key = keys::account_asset(creator, asset_id);
        let (balance, _) = self.read_balance(kind, &balance_key, precision)?;

        let result = balance.checked_sub(amount).ok_or_else(|| {
            CommandError::new(
                kind,
                ErrorCode::InvalidAmount,
                format!("Invalid subtraction of asset {asset_id}"),
            )
        })?;

        self.cursor
            .put_str(&balance_key, &result.to_canonical_string());
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn transfer_asset(
        &mut self,
        kind: &'static str,
        creator: Option<&AccountId>,
        src: &AccountId,
        dest: &AccountId,
        asset_id: &AssetId,
        amount: &Amount,
        description: &str,
        do_validation: bool,
        creator_permissions: &RolePermissionSet,
    ) -> Result<(), CommandError> {
        self.check_account_exists(kind, dest)?;
        self.check_account_exists(kind, src)?;

        if do_validation {
            let creator = require_creator(kind, creator)?;

            let dest_permissions = self.account_permissions(kind, dest)?;
            if !check(&dest_permissions, RolePermission::Receive) {
                return Err(no_permissions(kind));
            }

            if creator != src {
                let grants = self.grant_set(kind, creator, src)?;
                if !check_grantable(
                    creator_permissions,
                    &grants,
                    RolePermission::Transfer,
                    ledger_types::GrantablePermission::TransferMyAssets,
                ) {
                    return Err(no_permissions(kind));
                }
            } else if !check(creator_permissions, RolePermission::Transfer) {
                return Err(no_permissions(kind));
            }

            self.get_checked(kind, &keys::asset(asset_id), ExistencePolicy::MustExist)?;

            if let Some(max) = self
                .cursor
                .get_u64(&keys::setting(keys::MAX_DESCRIPTION_SIZE_KEY))
                .map_err(|e| system_error(kind, e))?
            {
                if description.len() as u64 > max {
                    return Err(CommandError::new(
                        kind,
                        ErrorCode::InvalidFieldSize,
                        "Too big description",
                    ));
                }
            }
        }

        let src_key = keys::account_asset(src, asset_id);
        let src_stored = self
            .cursor
            .get_str(&src_key)
            .map_err(|e| system_error(kind, e))?
            .ok_or_else(|| {
                CommandError::new(kind, ErrorCode::NotEnoughAssets, "Not enough assets")
            })?;
        let src_balance = parse_amount(kind, &src_key, &src_stored)?;

        let src_result = src_balance.checked_sub(amount).ok_or_else(|| {
            CommandError::new(kind, ErrorCode::NotEnoughAssets, "Not enough assets")
        })?;

        let dest_key = keys::account_asset(dest, asset_id);
        let (dest_balance, newly_held) =
            self.read_balance(kind, &dest_key, src_balance.precision())?;
        let dest_result = dest_balance.checked_add(amount).ok_or_else(|| {
            CommandError::new(kind, ErrorCode::IncorrectBalance, "Incorrect balance")
        })?;

        self.cursor
            .put_str(&src_key, &src_result.to_canonical_string());
        self.cursor
            .put_str(&dest_key, &dest_result.to_canonical_string());
        if newly_held {
            self.bump_count(kind, &keys::account_assets_count(dest), 1)?;
        }
        Ok(())
    }

    // ── peer commands ──────────────────────────────────────────────────────

    fn add_peer(
        &mut self,
        kind: &'static str,
        peer: &PeerRecord,
        do_validation: bool,
        creator_permissions: &RolePermissionSet,
    ) -> Result<(), CommandError> {
        if do_validation && !check(creator_permissions, RolePermission::AddPeer) {
            return Err(no_permissions(kind));
        }

        let address_key = keys::peer_address(&peer.pubkey);
        self.get_checked(kind, &address_key, ExistencePolicy::MustNotExist)?;

        let count = self
            .cursor
            .get_u64(keys::PEERS_COUNT)
            .map_err(|e| system_error(kind, e))?
            .unwrap_or(0);
        self.cursor.put_u64(keys::PEERS_COUNT, count + 1);

        self.cursor.put_str(&address_key, &peer.address);
        if let Some(cert) = &peer.tls_certificate {
            self.cursor.put_str(&keys::peer_tls(&peer.pubkey), cert);
        }
        Ok(())
    }

    fn remove_peer(
        &mut self,
        kind: &'static str,
        pubkey: &PublicKey,
        do_validation: bool,
        creator_permissions: &RolePermissionSet,
    ) -> Result<(), CommandError> {
        if pubkey.as_bytes().iter().all(|&b| b == 0) {
            return Err(CommandError::new(
                kind,
                ErrorCode::PublicKeyIsEmpty,
                "Pubkey empty",
            ));
        }
        if do_validation && !check(creator_permissions, RolePermission::RemovePeer) {
            return Err(no_permissions(kind));
        }

        let address_key = keys::peer_address(pubkey);
        self.get_checked(kind, &address_key, ExistencePolicy::MustExist)?;

        let count = self
            .cursor
            .get_u64(keys::PEERS_COUNT)
            .map_err(|e| system_error(kind, e))?
            .ok_or_else(|| {
                CommandError::new(kind, ErrorCode::NoSuchEntity, "peer count missing")
            })?;
        if count == 1 {
            return Err(CommandError::new(
                kind,
                ErrorCode::PeersCountIsNotEnough,
                format!("Can not remove last peer {pubkey}"),
            ));
        }
        self.cursor.put_u64(keys::PEERS_COUNT, count - 1);

        self.cursor.delete(&address_key);
        self.cursor.delete(&keys::peer_tls(pubkey));
        Ok(())
    }

    // ── signatory commands ─────────────────────────────────────────────────

    #[allow(clippy::too_many_arguments)]
    fn add_signatory(
        &mut self,
        kind: &'static str,
        creator: Option<&AccountId>,
        account_id: &AccountId,
        pubkey: &PublicKey,
        do_validation: bool,
        creator_permissions: &RolePermissionSet,
    ) -> Result<(), CommandError> {
        if do_validation {
            let creator = require_creator(kind, creator)?;
            if creator == account_id {
                if !check(creator_permissions, RolePermission::AddSignatory) {
                    return Err(no_permissions(kind));
                }
            } else {
                let grants = self.grant_set(kind, creator, account_id)?;
                if !check_grantable(
                    creator_permissions,
                    &grants,
                    RolePermission::Root,
                    ledger_types::GrantablePermission::AddMySignatory,
                ) {
                    return Err(no_permissions(kind));
                }
            }
        }

        self.check_account_exists(kind, account_id)?;

        let signatory_key = keys::account_signatory(account_id, pubkey);
        self.get_checked(kind, &signatory_key, ExistencePolicy::MustNotExist)?;
        self.cursor.put_str(&signatory_key, "");
        self.bump_count(kind, &keys::signatory_unique(pubkey), 1)?;
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn remove_signatory(
        &mut self,
        kind: &'static str,
        creator: Option<&AccountId>,
        account_id: &AccountId,
        pubkey: &PublicKey,
        do_validation: bool,
        creator_permissions: &RolePermissionSet,
    ) -> Result<(), CommandError> {
        if do_validation {
            let creator = require_creator(kind, creator)?;

            let quorum = self
                .cursor
                .get_u64(&keys::account_quorum(account_id))
                .map_err(|e| system_error(kind, e))?
                .ok_or_else(|| {
                    CommandError::new(kind, ErrorCode::NoAccount, format!("no account {account_id}"))
                })?;

            if creator == account_id {
                if !check(creator_permissions, RolePermission::RemoveSignatory) {
                    return Err(no_permissions(kind));
                }
            } else {
                let grants = self.grant_set(kind, creator, account_id)?;
                if !check_grantable(
                    creator_permissions,
                    &grants,
                    RolePermission::Root,
                    ledger_types::GrantablePermission::RemoveMySignatory,
                ) {
                    return Err(no_permissions(kind));
                }
            }

            if self
                .cursor
                .get(&keys::account_signatory(account_id, pubkey))
                .map_err(|e| system_error(kind, e))?
                .is_none()
            {
                return Err(CommandError::new(
                    kind,
                    ErrorCode::NoSignatory,
                    format!("no signatory {pubkey} on {account_id}"),
                ));
            }

            let signatories = self
                .cursor
                .count_prefix(&keys::account_signatories_prefix(account_id))
                .map_err(|e| system_error(kind, e))?;
            if signatories <= quorum {
                return Err(CommandError::new(
                    kind,
                    ErrorCode::CountNotEnough,
                    format!(
                        "Remove signatory {pubkey} for account {account_id} with quorum {quorum} failed"
                    ),
                ));
            }
        }

        self.cursor
            .delete(&keys::account_signatory(account_id, pubkey));
        self.drop_count(kind, &keys::signatory_unique(pubkey))?;
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn set_quorum(
        &mut self,
        kind: &'static str,
        creator: Option<&AccountId>,
        account_id: &AccountId,
        quorum: u32,
        do_validation: bool,
        creator_permissions: &RolePermissionSet,
    ) -> Result<(), CommandError> {
        if do_validation {
            let creator = require_creator(kind, creator)?;
            self.check_account_exists(kind, account_id)?;

            let granted = if creator == account_id {
                GrantablePermissionSet::empty()
            } else {
                self.grant_set(kind, creator, account_id)?
            };
            if !check_grantable(
                creator_permissions,
                &granted,
                RolePermission::SetQuorum,
                ledger_types::GrantablePermission::SetMyQuorum,
            ) {
                return Err(no_permissions(kind));
            }
        }

        if quorum == 0 {
            return Err(CommandError::new(
                kind,
                ErrorCode::InvalidAmount,
                "Quorum must be positive",
            ));
        }

        let signatories = self
            .cursor
            .count_prefix(&keys::account_signatories_prefix(account_id))
            .map_err(|e| system_error(kind, e))?;
        if quorum as u64 > signatories {
            return Err(CommandError::new(
                kind,
                ErrorCode::CountNotEnough,
                "Quorum value more than signatories",
            ));
        }

        self.cursor
            .put_u64(&keys::account_quorum(account_id), quorum as u64);
        Ok(())
    }

    // ── account detail commands ────────────────────────────────────────────

    #[allow(clippy::too_many_arguments)]
    fn set_account_detail(
        &mut self,
        kind: &'static str,
        creator: Option<&AccountId>,
        account_id: &AccountId,
        key: &str,
        value: &str,
        do_validation: bool,
        creator_permissions: &RolePermissionSet,
    ) -> Result<(), CommandError> {
        if do_validation {
            let creator = require_creator(kind, creator)?;
            if creator != account_id {
                let grants = self.grant_set(kind, creator, account_id)?;
                if !check_grantable(
                    creator_permissions,
                    &grants,
                    RolePermission::SetDetail,
                    ledger_types::GrantablePermission::SetMyAccountDetail,
                ) {
                    return Err(no_permissions(kind));
                }
            }
            self.check_account_exists(kind, account_id)?;
        }

        let writer = writer_id(creator);
        let detail_key = keys::account_detail(account_id, &writer, key);
        let previous = self
            .cursor
            .get(&detail_key)
            .map_err(|e| system_error(kind, e))?;

        self.cursor.put_str(&detail_key, value);
        if previous.is_none() {
            self.bump_count(kind, &keys::account_details_count(account_id), 1)?;
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn compare_and_set_account_detail(
        &mut self,
        kind: &'static str,
        creator: Option<&AccountId>,
        account_id: &AccountId,
        key: &str,
        value: &str,
        old_value: Option<&str>,
        check_empty: bool,
        do_validation: bool,
        creator_permissions: &RolePermissionSet,
    ) -> Result<(), CommandError> {
        if do_validation {
            let creator = require_creator(kind, creator)?;
            if creator != account_id {
                let grants = self.grant_set(kind, creator, account_id)?;
                if !check_grantable(
                    creator_permissions,
                    &grants,
                    RolePermission::SetDetail,
                    ledger_types::GrantablePermission::SetMyAccountDetail,
                ) {
                    return Err(no_permissions(kind));
                }
            }
        }

        self.check_account_exists(kind, account_id)?;

        let writer = writer_id(creator);
        let detail_key = keys::account_detail(account_id, &writer, key);
        let stored = self
            .cursor
            .get_str(&detail_key)
            .map_err(|e| system_error(kind, e))?;

        let values_equal = matches!((old_value, &stored), (Some(old), Some(cur)) if old == cur);
        let both_absent = if check_empty {
            old_value.is_none() && stored.is_none()
        } else {
            stored.is_none()
        };

        if !(values_equal || both_absent) {
            return Err(CommandError::new(
                kind,
                ErrorCode::IncorrectOldValue,
                "Old value incorrect",
            ));
        }

        self.cursor.put_str(&detail_key, value);
        if stored.is_none() {
            self.bump_count(kind, &keys::account_details_count(account_id), 1)?;
        }
        Ok(())
    }

    // ── entity creation commands ───────────────────────────────────────────

    fn create_account(
        &mut self,
        kind: &'static str,
        account_name: &str,
        domain_id: &str,
        pubkey: &PublicKey,
        do_validation: bool,
        creator_permissions: &RolePermissionSet,
    ) -> Result<(), CommandError> {
        if do_validation && !check(creator_permissions, RolePermission::CreateAccount) {
            return Err(no_permissions(kind));
        }

        let default_role = self
            .cursor
            .get_str(&keys::domain(domain_id))
            .map_err(|e| system_error(kind, e))?
            .ok_or_else(|| {
                CommandError::new(kind, ErrorCode::NoSuchEntity, format!("no domain {domain_id}"))
            })?;

        let role_permissions = self.role_permissions(kind, &default_role)?;
        if do_validation && !role_permissions.is_subset_of(creator_permissions) {
            return Err(no_permissions(kind));
        }

        let account_id = AccountId::new(account_name, domain_id);
        if do_validation {
            self.get_checked(kind, &keys::account(&account_id), ExistencePolicy::MustNotExist)?;
        }

        self.cursor.put_str(&keys::account(&account_id), "");
        self.cursor
            .put_str(&keys::account_role(&account_id, &default_role), "");
        self.cursor
            .put_str(&keys::account_signatory(&account_id, pubkey), "");
        self.cursor.put_u64(&keys::account_quorum(&account_id), 1);
        self.bump_count(kind, &keys::signatory_unique(pubkey), 1)?;
        Ok(())
    }

    fn create_asset(
        &mut self,
        kind: &'static str,
        asset_name: &str,
        domain_id: &str,
        precision: u8,
        do_validation: bool,
        creator_permissions: &RolePermissionSet,
    ) -> Result<(), CommandError> {
        let asset_id = AssetId::new(asset_name, domain_id);
        if do_validation {
            if !check(creator_permissions, RolePermission::CreateAsset) {
                return Err(no_permissions(kind));
            }
            self.get_checked(kind, &keys::asset(&asset_id), ExistencePolicy::MustNotExist)?;
            self.get_checked(kind, &keys::domain(domain_id), ExistencePolicy::MustExist)?;
        }

        self.cursor.put_u64(&keys::asset(&asset_id), precision as u64);
        Ok(())
    }

    fn create_domain(
        &mut self,
        kind: &'static str,
        domain_id: &str,
        default_role: &str,
        do_validation: bool,
        creator_permissions: &RolePermissionSet,
    ) -> Result<(), CommandError> {
        if do_validation {
            if !check(creator_permissions, RolePermission::CreateDomain) {
                return Err(no_permissions(kind));
            }
            self.get_checked(kind, &keys::domain(domain_id), ExistencePolicy::MustNotExist)?;
            self.get_checked(kind, &keys::role(default_role), ExistencePolicy::MustExist)?;
        }

        let count = self
            .cursor
            .get_u64(keys::DOMAINS_COUNT)
            .map_err(|e| system_error(kind, e))?
            .unwrap_or(0);
        self.cursor.put_u64(keys::DOMAINS_COUNT, count + 1);

        self.cursor.put_str(&keys::domain(domain_id), default_role);
        Ok(())
    }

    fn create_role(
        &mut self,
        kind: &'static str,
        role_name: &str,
        permissions: &[RolePermission],
        do_validation: bool,
        creator_permissions: &RolePermissionSet,
    ) -> Result<(), CommandError> {
        let role_permissions = RolePermissionSet::from_permissions(permissions);

        if do_validation {
            if !check(creator_permissions, RolePermission::CreateRole) {
                return Err(no_permissions(kind));
            }
            if !role_permissions.is_subset_of(creator_permissions) {
                return Err(no_permissions(kind));
            }
        }

        let role_key = keys::role(role_name);
        if self
            .cursor
            .get(&role_key)
            .map_err(|e| system_error(kind, e))?
            .is_some()
        {
            return Err(CommandError::new(
                kind,
                ErrorCode::RoleAlreadyExists,
                "Already exists",
            ));
        }

        self.cursor
            .put_str(&role_key, &role_permissions.to_bitstring());
        Ok(())
    }

    // ── role attachment commands ───────────────────────────────────────────

    fn append_role(
        &mut self,
        kind: &'static str,
        account_id: &AccountId,
        role_name: &str,
        do_validation: bool,
        creator_permissions: &RolePermissionSet,
    ) -> Result<(), CommandError> {
        if do_validation {
            if !check(creator_permissions, RolePermission::AppendRole) {
                return Err(no_permissions(kind));
            }
            let role_permissions = self.role_permissions(kind, role_name)?;
            if !role_permissions.is_subset_of(creator_permissions) {
                return Err(no_permissions(kind));
            }
        }

        self.check_account_exists(kind, account_id)?;
        let mapping_key = keys::account_role(account_id, role_name);
        self.get_checked(kind, &mapping_key, ExistencePolicy::MustNotExist)?;
        self.cursor.put_str(&mapping_key, "");
        Ok(())
    }

    fn detach_role(
        &mut self,
        kind: &'static str,
        account_id: &AccountId,
        role_name: &str,
        do_validation: bool,
        creator_permissions: &RolePermissionSet,
    ) -> Result<(), CommandError> {
        if do_validation && !check(creator_permissions, RolePermission::DetachRole) {
            return Err(no_permissions(kind));
        }

        self.get_checked(kind, &keys::role(role_name), ExistencePolicy::MustExist)?;

        let mapping_key = keys::account_role(account_id, role_name);
        if do_validation {
            self.get_checked(kind, &mapping_key, ExistencePolicy::MustExist)?;
        }
        self.cursor.delete(&mapping_key);
        Ok(())
    }

    // ── grant commands ─────────────────────────────────────────────────────

    #[allow(clippy::too_many_arguments)]
    fn grant_permission(
        &mut self,
        kind: &'static str,
        creator: Option<&AccountId>,
        grantee: &AccountId,
        permission: ledger_types::GrantablePermission,
        do_validation: bool,
        creator_permissions: &RolePermissionSet,
    ) -> Result<(), CommandError> {
        let creator = require_creator(kind, creator)?;

        if do_validation {
            if !check(creator_permissions, permission_for(permission)) {
                return Err(no_permissions(kind));
            }
            self.check_account_exists(kind, grantee)?;
        }

        let mut granted = self.grant_set(kind, grantee, creator)?;
        if granted.is_set(permission) {
            return Err(CommandError::new(
                kind,
                ErrorCode::PermissionIsAlreadySet,
                "Permission is already set",
            ));
        }
        granted.set(permission);
        self.cursor.put_str(
            &keys::account_grant(grantee, creator),
            &granted.to_bitstring(),
        );
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn revoke_permission(
        &mut self,
        kind: &'static str,
        creator: Option<&AccountId>,
        grantee: &AccountId,
        permission: ledger_types::GrantablePermission,
        do_validation: bool,
        creator_permissions: &RolePermissionSet,
    ) -> Result<(), CommandError> {
        let creator = require_creator(kind, creator)?;

        if do_validation {
            if !check(creator_permissions, permission_for(permission)) {
                return Err(no_permissions(kind));
            }
            self.check_account_exists(kind, grantee)?;
        }

        let mut granted = self.grant_set(kind, grantee, creator)?;
        if !granted.is_set(permission) {
            return Err(CommandError::new(
                kind,
                ErrorCode::NoPermissions,
                "Permission not set",
            ));
        }
        granted.unset(permission);
        self.cursor.put_str(
            &keys::account_grant(grantee, creator),
            &granted.to_bitstring(),
        );
        Ok(())
    }

    // ── shared helpers ─────────────────────────────────────────────────────

    /// Union of the role permission sets attached to an account.
    fn account_permissions(
        &self,
        kind: &'static str,
        account_id: &AccountId,
    ) -> Result<RolePermissionSet, CommandError> {
        if self
            .cursor
            .get(&keys::account(account_id))
            .map_err(|e| system_error(kind, e))?
            .is_none()
        {
            return Err(CommandError::new(
                kind,
                ErrorCode::NoAccount,
                format!("no account {account_id}"),
            ));
        }

        let prefix = keys::account_roles_prefix(account_id);
        let mut role_names = Vec::new();
        self.cursor
            .enumerate(&prefix, |key, _| {
                role_names.push(key[prefix.len()..].to_string());
                ScanControl::Continue
            })
            .map_err(|e| system_error(kind, e))?;

        let mut permissions = RolePermissionSet::empty();
        for role in &role_names {
            permissions.union_with(&self.role_permissions(kind, role)?);
        }
        Ok(permissions)
    }

    /// Read a role's permission bitstring.
    fn role_permissions(
        &self,
        kind: &'static str,
        role: &str,
    ) -> Result<RolePermissionSet, CommandError> {
        let key = keys::role(role);
        let bitstring = self
            .cursor
            .get_str(&key)
            .map_err(|e| system_error(kind, e))?
            .ok_or_else(|| {
                CommandError::new(kind, ErrorCode::NoSuchEntity, format!("no role {role}"))
            })?;
        RolePermissionSet::from_bitstring(&bitstring).ok_or_else(|| {
            CommandError::new(
                kind,
                ErrorCode::SystemError,
                format!("corrupt bitstring for role {role}"),
            )
        })
    }

    /// Read the grant edge held by `grantee` from `grantor`.
    fn grant_set(
        &self,
        kind: &'static str,
        grantee: &AccountId,
        grantor: &AccountId,
    ) -> Result<GrantablePermissionSet, CommandError> {
        let key = keys::account_grant(grantee, grantor);
        match self
            .cursor
            .get_str(&key)
            .map_err(|e| system_error(kind, e))?
        {
            None => Ok(GrantablePermissionSet::empty()),
            Some(bitstring) => GrantablePermissionSet::from_bitstring(&bitstring).ok_or_else(|| {
                CommandError::new(
                    kind,
                    ErrorCode::SystemError,
                    format!("corrupt grant bitstring at {key}"),
                )
            }),
        }
    }

    /// Asset precision, or an error if the asset does not exist.
    fn asset_precision(&self, kind: &'static str, asset_id: &AssetId) -> Result<u8, CommandError> {
        let precision = self
            .cursor
            .get_u64(&keys::asset(asset_id))
            .map_err(|e| system_error(kind, e))?
            .ok_or_else(|| {
                CommandError::new(kind, ErrorCode::NoSuchEntity, format!("no asset {asset_id}"))
            })?;
        u8::try_from(precision).map_err(|_| {
            CommandError::new(
                kind,
                ErrorCode::SystemError,
                format!("corrupt precision for {asset_id}"),
            )
        })
    }

    /// Current balance at a key, defaulting to zero. The second value is
    /// whether the asset was not previously held.
    fn read_balance(
        &self,
        kind: &'static str,
        key: &str,
        precision: u8,
    ) -> Result<(Amount, bool), CommandError> {
        match self
            .cursor
            .get_str(key)
            .map_err(|e| system_error(kind, e))?
        {
            None => Ok((Amount::zero(precision), true)),
            Some(stored) => Ok((parse_amount(kind, key, &stored)?, false)),
        }
    }

    fn check_account_exists(
        &self,
        kind: &'static str,
        account_id: &AccountId,
    ) -> Result<(), CommandError> {
        if self
            .cursor
            .get(&keys::account(account_id))
            .map_err(|e| system_error(kind, e))?
            .is_none()
        {
            return Err(CommandError::new(
                kind,
                ErrorCode::NoAccount,
                format!("no account {account_id}"),
            ));
        }
        Ok(())
    }

    fn get_checked(
        &self,
        kind: &'static str,
        key: &str,
        policy: ExistencePolicy,
    ) -> Result<Option<Vec<u8>>, CommandError> {
        self.cursor.get_checked(key, policy).map_err(|e| match e {
            KvError::NotFound(key) => {
                CommandError::new(kind, ErrorCode::NoSuchEntity, format!("not found: {key}"))
            }
            KvError::AlreadyExists(key) => CommandError::new(
                kind,
                ErrorCode::EntityAlreadyExists,
                format!("already exists: {key}"),
            ),
            KvError::Storage(e) => system_error(kind, e),
        })
    }

    /// Increment a decimal counter key.
    fn bump_count(&mut self, kind: &'static str, key: &str, by: u64) -> Result<(), CommandError> {
        let count = self
            .cursor
            .get_u64(key)
            .map_err(|e| system_error(kind, e))?
            .unwrap_or(0);
        self.cursor.put_u64(key, count + by);
        Ok(())
    }

    /// Decrement a decimal counter key, deleting it at zero.
    fn drop_count(&mut self, kind: &'static str, key: &str) -> Result<(), CommandError> {
        let count = self
            .cursor
            .get_u64(key)
            .map_err(|e| system_error(kind, e))?
            .unwrap_or(0);
        if count <= 1 {
            self.cursor.delete(key);
        } else {
            self.cursor.put_u64(key, count - 1);
        }
        Ok(())
    }
}

/// Writer id for account details: the creator, or `genesis` when absent.
fn writer_id(creator: Option<&AccountId>) -> String {
    creator
        .map(|id| id.to_string())
        .unwrap_or_else(|| keys::GENESIS_WRITER.to_string())
}

fn require_creator<'c>(
    kind: &'static str,
    creator: Option<&'c AccountId>,
) -> Result<&'c AccountId, CommandError> {
    creator.ok_or_else(|| {
        CommandError::new(kind, ErrorCode::NoAccount, "transaction has no creator")
    })
}

fn no_permissions(kind: &'static str) -> CommandError {
    CommandError::new(kind, ErrorCode::NoPermissions, "Not enough permissions")
}

fn system_error(kind: &'static str, error: StorageError) -> CommandError {
    CommandError::new(kind, ErrorCode::SystemError, error.to_string())
}

fn parse_amount(kind: &'static str, key: &str, stored: &str) -> Result<Amount, CommandError> {
    Amount::parse(stored).ok_or_else(|| {
        CommandError::new(
            kind,
            ErrorCode::SystemError,
            format!("corrupt amount at {key}"),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryBackend;
    use ledger_types::test_utils::test_keypair;
    use ledger_types::{DomainId, GrantablePermission, RoleName};

    fn admin() -> AccountId {
        AccountId::new("admin", "test")
    }

    fn bob() -> AccountId {
        AccountId::new("bob", "test")
    }

    fn coin() -> AssetId {
        AssetId::new("coin", "test")
    }

    /// Seed a world state the way a genesis block would: an `admin` role
    /// with every permission, a `user` default role, the `test` domain,
    /// `admin@test`, and the `coin#test` asset.
    fn genesis(backend: &MemoryBackend) {
        let mut executor = CommandExecutor::new(backend);
        let commands = vec![
            Command::CreateRole {
                role_name: RoleName::new("admin"),
                permissions: vec![RolePermission::Root],
            },
            Command::CreateRole {
                role_name: RoleName::new("user"),
                permissions: vec![RolePermission::Receive, RolePermission::Transfer],
            },
            Command::CreateDomain {
                domain_id: DomainId::new("test"),
                default_role: RoleName::new("user"),
            },
            Command::CreateAccount {
                account_name: "admin".into(),
                domain_id: DomainId::new("test"),
                pubkey: test_keypair(1).public_key(),
            },
            Command::AppendRole {
                account_id: admin(),
                role_name: RoleName::new("admin"),
            },
            Command::CreateAsset {
                asset_name: "coin".into(),
                domain_id: DomainId::new("test"),
                precision: 2,
            },
            Command::AddPeer {
                peer: ledger_types::test_utils::test_peer(10),
            },
        ];
        for command in &commands {
            executor.execute(command, None, false).expect("genesis command");
        }
        executor.commit().unwrap();
    }

    fn run(backend: &MemoryBackend, command: Command, creator: &AccountId) -> Result<(), CommandError> {
        let mut executor = CommandExecutor::new(backend);
        let result = executor.execute(&command, Some(creator), true);
        if result.is_ok() {
            executor.commit().unwrap();
        } else {
            executor.rollback();
        }
        result
    }

    fn balance(backend: &MemoryBackend, account: &AccountId, asset: &AssetId) -> Option<String> {
        backend
            .get(&keys::account_asset(account, asset))
            .unwrap()
            .map(|v| String::from_utf8(v).unwrap())
    }

    #[test]
    fn created_account_has_quorum_one_and_default_role() {
        let backend = MemoryBackend::new();
        genesis(&backend);

        run(
            &backend,
            Command::CreateAccount {
                account_name: "bob".into(),
                domain_id: DomainId::new("test"),
                pubkey: test_keypair(2).public_key(),
            },
            &admin(),
        )
        .unwrap();

        assert_eq!(
            backend.get("account/test/bob/quorum").unwrap(),
            Some(b"1".to_vec())
        );
        assert_eq!(
            backend.get("account/test/bob/roles/user").unwrap(),
            Some(b"".to_vec())
        );
        assert_eq!(
            backend.get("account/test/bob").unwrap(),
            Some(b"".to_vec())
        );
    }

    #[test]
    fn add_then_transfer_keeps_conservation() {
        let backend = MemoryBackend::new();
        genesis(&backend);
        run(
            &backend,
            Command::CreateAccount {
                account_name: "bob".into(),
                domain_id: DomainId::new("test"),
                pubkey: test_keypair(2).public_key(),
            },
            &admin(),
        )
        .unwrap();

        run(
            &backend,
            Command::AddAssetQuantity {
                asset_id: coin(),
                amount: Amount::parse("10.50").unwrap(),
            },
            &admin(),
        )
        .unwrap();
        assert_eq!(balance(&backend, &admin(), &coin()), Some("10.50".into()));

        run(
            &backend,
            Command::TransferAsset {
                src_account_id: admin(),
                dest_account_id: bob(),
                asset_id: coin(),
                amount: Amount::parse("3.25").unwrap(),
                description: String::new(),
            },
            &admin(),
        )
        .unwrap();

        assert_eq!(balance(&backend, &admin(), &coin()), Some("7.25".into()));
        assert_eq!(balance(&backend, &bob(), &coin()), Some("3.25".into()));
        assert_eq!(
            backend.get("account/test/admin/assets_count").unwrap(),
            Some(b"1".to_vec())
        );
        assert_eq!(
            backend.get("account/test/bob/assets_count").unwrap(),
            Some(b"1".to_vec())
        );
    }

    #[test]
    fn transfer_without_funds_fails() {
        let backend = MemoryBackend::new();
        genesis(&backend);
        run(
            &backend,
            Command::CreateAccount {
                account_name: "bob".into(),
                domain_id: DomainId::new("test"),
                pubkey: test_keypair(2).public_key(),
            },
            &admin(),
        )
        .unwrap();

        let err = run(
            &backend,
            Command::TransferAsset {
                src_account_id: admin(),
                dest_account_id: bob(),
                asset_id: coin(),
                amount: Amount::parse("1.00").unwrap(),
                description: String::new(),
            },
            &admin(),
        )
        .unwrap_err();
        assert_eq!(err.code, ErrorCode::NotEnoughAssets);
    }

    #[test]
    fn removing_last_peer_fails() {
        let backend = MemoryBackend::new();
        genesis(&backend);

        let err = run(
            &backend,
            Command::RemovePeer {
                pubkey: ledger_types::test_utils::test_peer(10).pubkey,
            },
            &admin(),
        )
        .unwrap_err();
        assert_eq!(err.code, ErrorCode::PeersCountIsNotEnough);

        // With a second peer the removal goes through.
        run(
            &backend,
            Command::AddPeer {
                peer: ledger_types::test_utils::test_peer(11),
            },
            &admin(),
        )
        .unwrap();
        run(
            &backend,
            Command::RemovePeer {
                pubkey: ledger_types::test_utils::test_peer(10).pubkey,
            },
            &admin(),
        )
        .unwrap();
        assert_eq!(
            backend.get(keys::PEERS_COUNT).unwrap(),
            Some(b"1".to_vec())
        );
    }

    #[test]
    fn signatory_removal_respects_quorum() {
        let backend = MemoryBackend::new();
        genesis(&backend);

        let second_key = test_keypair(3).public_key();
        run(
            &backend,
            Command::AddSignatory {
                account_id: admin(),
                pubkey: second_key,
            },
            &admin(),
        )
        .unwrap();
        run(
            &backend,
            Command::SetQuorum {
                account_id: admin(),
                quorum: 2,
            },
            &admin(),
        )
        .unwrap();

        // Removing either key would leave 1 < quorum 2.
        let err = run(
            &backend,
            Command::RemoveSignatory {
                account_id: admin(),
                pubkey: second_key,
            },
            &admin(),
        )
        .unwrap_err();
        assert_eq!(err.code, ErrorCode::CountNotEnough);
    }

    #[test]
    fn quorum_above_signatory_count_is_rejected() {
        let backend = MemoryBackend::new();
        genesis(&backend);

        let err = run(
            &backend,
            Command::SetQuorum {
                account_id: admin(),
                quorum: 5,
            },
            &admin(),
        )
        .unwrap_err();
        assert_eq!(err.code, ErrorCode::CountNotEnough);
    }

    #[test]
    fn default_role_escalation_is_blocked() {
        let backend = MemoryBackend::new();
        genesis(&backend);
        run(
            &backend,
            Command::CreateAccount {
                account_name: "bob".into(),
                domain_id: DomainId::new("test"),
                pubkey: test_keypair(2).public_key(),
            },
            &admin(),
        )
        .unwrap();
        // Give bob permission to create accounts but nothing else; the
        // default role carries Transfer which bob lacks.
        run(
            &backend,
            Command::CreateRole {
                role_name: RoleName::new("registrar"),
                permissions: vec![RolePermission::CreateAccount, RolePermission::Receive],
            },
            &admin(),
        )
        .unwrap();
        run(
            &backend,
            Command::AppendRole {
                account_id: bob(),
                role_name: RoleName::new("registrar"),
            },
            &admin(),
        )
        .unwrap();
        run(
            &backend,
            Command::DetachRole {
                account_id: bob(),
                role_name: RoleName::new("user"),
            },
            &admin(),
        )
        .unwrap();

        let err = run(
            &backend,
            Command::CreateAccount {
                account_name: "carol".into(),
                domain_id: DomainId::new("test"),
                pubkey: test_keypair(4).public_key(),
            },
            &bob(),
        )
        .unwrap_err();
        assert_eq!(err.code, ErrorCode::NoPermissions);
    }

    #[test]
    fn grant_enables_acting_on_anothers_account() {
        let backend = MemoryBackend::new();
        genesis(&backend);
        run(
            &backend,
            Command::CreateAccount {
                account_name: "bob".into(),
                domain_id: DomainId::new("test"),
                pubkey: test_keypair(2).public_key(),
            },
            &admin(),
        )
        .unwrap();

        // Without a grant bob cannot write admin's details.
        let err = run(
            &backend,
            Command::SetAccountDetail {
                account_id: admin(),
                key: "nickname".into(),
                value: "root".into(),
            },
            &bob(),
        )
        .unwrap_err();
        assert_eq!(err.code, ErrorCode::NoPermissions);

        // admin grants bob SetMyAccountDetail.
        run(
            &backend,
            Command::GrantPermission {
                account_id: bob(),
                permission: GrantablePermission::SetMyAccountDetail,
            },
            &admin(),
        )
        .unwrap();

        run(
            &backend,
            Command::SetAccountDetail {
                account_id: admin(),
                key: "nickname".into(),
                value: "root".into(),
            },
            &bob(),
        )
        .unwrap();
        assert_eq!(
            backend
                .get("account/test/admin/details/bob@test/nickname")
                .unwrap(),
            Some(b"root".to_vec())
        );
        assert_eq!(
            backend.get("account/test/admin/details_count").unwrap(),
            Some(b"1".to_vec())
        );
    }

    #[test]
    fn double_grant_and_blind_revoke_fail() {
        let backend = MemoryBackend::new();
        genesis(&backend);
        run(
            &backend,
            Command::CreateAccount {
                account_name: "bob".into(),
                domain_id: DomainId::new("test"),
                pubkey: test_keypair(2).public_key(),
            },
            &admin(),
        )
        .unwrap();

        let grant = Command::GrantPermission {
            account_id: bob(),
            permission: GrantablePermission::SetMyQuorum,
        };
        run(&backend, grant.clone(), &admin()).unwrap();
        let err = run(&backend, grant, &admin()).unwrap_err();
        assert_eq!(err.code, ErrorCode::PermissionIsAlreadySet);

        // Grant then revoke leaves the bitstring empty again.
        run(
            &backend,
            Command::RevokePermission {
                account_id: bob(),
                permission: GrantablePermission::SetMyQuorum,
            },
            &admin(),
        )
        .unwrap();
        let err = run(
            &backend,
            Command::RevokePermission {
                account_id: bob(),
                permission: GrantablePermission::SetMyQuorum,
            },
            &admin(),
        )
        .unwrap_err();
        assert_eq!(err.code, ErrorCode::NoPermissions);
    }

    #[test]
    fn compare_and_set_matches_set_when_old_value_current() {
        let backend = MemoryBackend::new();
        genesis(&backend);

        run(
            &backend,
            Command::SetAccountDetail {
                account_id: admin(),
                key: "color".into(),
                value: "red".into(),
            },
            &admin(),
        )
        .unwrap();

        // CAS with the current value behaves like a plain set.
        run(
            &backend,
            Command::CompareAndSetAccountDetail {
                account_id: admin(),
                key: "color".into(),
                value: "blue".into(),
                old_value: Some("red".into()),
                check_empty: false,
            },
            &admin(),
        )
        .unwrap();
        assert_eq!(
            backend
                .get("account/test/admin/details/admin@test/color")
                .unwrap(),
            Some(b"blue".to_vec())
        );

        // Stale expectation fails.
        let err = run(
            &backend,
            Command::CompareAndSetAccountDetail {
                account_id: admin(),
                key: "color".into(),
                value: "green".into(),
                old_value: Some("red".into()),
                check_empty: false,
            },
            &admin(),
        )
        .unwrap_err();
        assert_eq!(err.code, ErrorCode::IncorrectOldValue);
    }

    #[test]
    fn compare_and_set_check_empty_semantics() {
        let backend = MemoryBackend::new();
        genesis(&backend);

        // check_empty with no old value only succeeds while the slot is empty.
        run(
            &backend,
            Command::CompareAndSetAccountDetail {
                account_id: admin(),
                key: "slot".into(),
                value: "first".into(),
                old_value: None,
                check_empty: true,
            },
            &admin(),
        )
        .unwrap();

        let err = run(
            &backend,
            Command::CompareAndSetAccountDetail {
                account_id: admin(),
                key: "slot".into(),
                value: "second".into(),
                old_value: None,
                check_empty: true,
            },
            &admin(),
        )
        .unwrap_err();
        assert_eq!(err.code, ErrorCode::IncorrectOldValue);
    }

    #[test]
    fn genesis_details_attributed_to_genesis_writer() {
        let backend = MemoryBackend::new();
        genesis(&backend);

        let mut executor = CommandExecutor::new(&backend);
        executor
            .execute(
                &Command::SetAccountDetail {
                    account_id: admin(),
                    key: "origin".into(),
                    value: "seed".into(),
                },
                None,
                false,
            )
            .unwrap();
        executor.commit().unwrap();

        assert_eq!(
            backend
                .get("account/test/admin/details/genesis/origin")
                .unwrap(),
            Some(b"seed".to_vec())
        );
    }

    #[test]
    fn transfer_description_size_is_bounded() {
        let backend = MemoryBackend::new();
        genesis(&backend);
        run(
            &backend,
            Command::CreateAccount {
                account_name: "bob".into(),
                domain_id: DomainId::new("test"),
                pubkey: test_keypair(2).public_key(),
            },
            &admin(),
        )
        .unwrap();
        run(
            &backend,
            Command::AddAssetQuantity {
                asset_id: coin(),
                amount: Amount::parse("5.00").unwrap(),
            },
            &admin(),
        )
        .unwrap();
        run(
            &backend,
            Command::SetSettingValue {
                key: keys::MAX_DESCRIPTION_SIZE_KEY.into(),
                value: "4".into(),
            },
            &admin(),
        )
        .unwrap();

        let err = run(
            &backend,
            Command::TransferAsset {
                src_account_id: admin(),
                dest_account_id: bob(),
                asset_id: coin(),
                amount: Amount::parse("1.00").unwrap(),
                description: "way too long".into(),
            },
            &admin(),
        )
        .unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidFieldSize);

        run(
            &backend,
            Command::TransferAsset {
                src_account_id: admin(),
                dest_account_id: bob(),
                asset_id: coin(),
                amount: Amount::parse("1.00").unwrap(),
                description: "rent".into(),
            },
            &admin(),
        )
        .unwrap();
    }

    #[test]
    fn subtract_asset_checks_precision() {
        let backend = MemoryBackend::new();
        genesis(&backend);
        run(
            &backend,
            Command::AddAssetQuantity {
                asset_id: coin(),
                amount: Amount::parse("5.00").unwrap(),
            },
            &admin(),
        )
        .unwrap();

        let err = run(
            &backend,
            Command::SubtractAssetQuantity {
                asset_id: coin(),
                amount: Amount::parse("1.000").unwrap(),
            },
            &admin(),
        )
        .unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidAmount);

        run(
            &backend,
            Command::SubtractAssetQuantity {
                asset_id: coin(),
                amount: Amount::parse("1.25").unwrap(),
            },
            &admin(),
        )
        .unwrap();
        assert_eq!(balance(&backend, &admin(), &coin()), Some("3.75".into()));
    }

    #[test]
    fn call_engine_is_reserved() {
        let backend = MemoryBackend::new();
        genesis(&backend);

        let err = run(
            &backend,
            Command::CallEngine {
                caller: admin(),
                callee: None,
                input: vec![],
            },
            &admin(),
        )
        .unwrap_err();
        assert_eq!(err.code, ErrorCode::NoImplementation);
    }

    #[test]
    fn failed_transaction_rolls_back_to_savepoint() {
        let backend = MemoryBackend::new();
        genesis(&backend);

        let keypair = test_keypair(1);
        let mut tx = ledger_types::Transaction::new(ledger_types::TransactionPayload {
            creator_account_id: Some(admin()),
            commands: vec![
                Command::AddAssetQuantity {
                    asset_id: coin(),
                    amount: Amount::parse("9.00").unwrap(),
                },
                // Fails: no such asset.
                Command::AddAssetQuantity {
                    asset_id: AssetId::new("ghost", "test"),
                    amount: Amount::parse("1.00").unwrap(),
                },
            ],
            quorum: 1,
            created_ms: 1,
        });
        tx.sign(&keypair);

        let mut executor = CommandExecutor::new(&backend);
        let err = executor.apply_transaction(&tx, true).unwrap_err();
        assert_eq!(err.command_index, 1);
        assert_eq!(err.error.code, ErrorCode::NoSuchEntity);

        // The partial write from command 0 is gone.
        assert_eq!(
            executor
                .cursor()
                .get(&keys::account_asset(&admin(), &coin()))
                .unwrap(),
            None
        );
    }

    #[test]
    fn create_role_rejects_duplicates_and_escalation() {
        let backend = MemoryBackend::new();
        genesis(&backend);
        run(
            &backend,
            Command::CreateAccount {
                account_name: "bob".into(),
                domain_id: DomainId::new("test"),
                pubkey: test_keypair(2).public_key(),
            },
            &admin(),
        )
        .unwrap();

        let err = run(
            &backend,
            Command::CreateRole {
                role_name: RoleName::new("admin"),
                permissions: vec![RolePermission::Transfer],
            },
            &admin(),
        )
        .unwrap_err();
        assert_eq!(err.code, ErrorCode::RoleAlreadyExists);

        // bob (user role) cannot mint a role with permissions he lacks.
        run(
            &backend,
            Command::CreateRole {
                role_name: RoleName::new("sneaky"),
                permissions: vec![RolePermission::AddPeer],
            },
            &bob(),
        )
        .map(|_| ())
        .unwrap_err();
    }

    #[test]
    fn domain_creation_tracks_count() {
        let backend = MemoryBackend::new();
        genesis(&backend);

        run(
            &backend,
            Command::CreateDomain {
                domain_id: DomainId::new("market"),
                default_role: RoleName::new("user"),
            },
            &admin(),
        )
        .unwrap();
        assert_eq!(
            backend.get(keys::DOMAINS_COUNT).unwrap(),
            Some(b"2".to_vec())
        );

        let err = run(
            &backend,
            Command::CreateDomain {
                domain_id: DomainId::new("market"),
                default_role: RoleName::new("user"),
            },
            &admin(),
        )
        .unwrap_err();
        assert_eq!(err.code, ErrorCode::EntityAlreadyExists);
    }
}
