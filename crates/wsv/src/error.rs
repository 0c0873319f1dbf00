//! Error types for world-state access and command execution.

use thiserror::Error;

/// Storage-level failure (backend I/O, corrupt value).
#[derive(Debug, Error)]
pub enum StorageError {
    /// Backend reported an error.
    #[error("database error: {0}")]
    Database(String),

    /// A stored value failed to decode.
    #[error("corrupt value at {key}: {reason}")]
    CorruptValue { key: String, reason: String },
}

/// Stable error codes surfaced in RPC statuses.
///
/// The numbering is part of the external contract and never reshuffles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ErrorCode {
    Exception = 1,
    NoPermissions = 2,
    NoAccount = 3,
    InvalidAssetAmount = 4,
    NotEnoughAssets = 5,
    IncorrectOldValue = 6,
    PermissionIsAlreadySet = 7,
    PeersCountIsNotEnough = 8,
    InvalidAmount = 9,
    IncorrectBalance = 10,
    InvalidFieldSize = 11,
    PublicKeyIsEmpty = 12,
    CountNotEnough = 13,
    NoImplementation = 14,
    NoSignatory = 15,
    RoleAlreadyExists = 16,
    NoSuchEntity = 17,
    EntityAlreadyExists = 18,
    SystemError = 19,
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", *self as u32)
    }
}

/// A failed command: stable code plus a human-readable description naming
/// the command.
#[derive(Debug, Clone, Error)]
#[error("command {command}: {description} (code {code})")]
pub struct CommandError {
    /// Command variant name.
    pub command: &'static str,
    /// Stable error code.
    pub code: ErrorCode,
    /// Human-readable description.
    pub description: String,
}

impl CommandError {
    pub fn new(command: &'static str, code: ErrorCode, description: impl Into<String>) -> Self {
        Self {
            command,
            code,
            description: description.into(),
        }
    }
}

/// A failed transaction: the index of the failed command and its error.
#[derive(Debug, Clone, Error)]
#[error("command #{command_index} failed: {error}")]
pub struct TransactionError {
    /// Index of the failed command within the transaction.
    pub command_index: usize,
    /// The command failure.
    pub error: CommandError,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(ErrorCode::Exception as u32, 1);
        assert_eq!(ErrorCode::NoPermissions as u32, 2);
        assert_eq!(ErrorCode::NoAccount as u32, 3);
        assert_eq!(ErrorCode::InvalidAssetAmount as u32, 4);
        assert_eq!(ErrorCode::NotEnoughAssets as u32, 5);
    }

    #[test]
    fn display_names_command_and_code() {
        let err = CommandError::new("TransferAsset", ErrorCode::NotEnoughAssets, "Not enough assets");
        let s = err.to_string();
        assert!(s.contains("TransferAsset"));
        assert!(s.contains("code 5"));
    }
}
