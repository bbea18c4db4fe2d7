use crate::hash::ItemHash;
use serde_json::{json, Value};

/// MessageStatus is the lifecycle state of a known item_hash. Exactly one
/// status row exists per hash (see `db::messages`). Transitions are
/// monotone except FORGOTTEN (terminal) and REMOVING -> {REMOVED, PROCESSED}.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "sqlx-support", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx-support", sqlx(type_name = "message_status", rename_all = "lowercase"))]
pub enum MessageStatus {
    Pending,
    Processed,
    Rejected,
    Forgotten,
    Removing,
    Removed,
}

/// Stable error codes surfaced to API consumers. Values match the
/// originating node's `ErrorCode` enum exactly, so downstream tooling that
/// already understands those codes keeps working unmodified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[repr(i32)]
pub enum ErrorCode {
    InternalError = -1,
    InvalidFormat = 0,
    InvalidSignature = 1,
    PermissionDenied = 2,
    ContentUnavailable = 3,
    FileUnavailable = 4,
    BalanceInsufficient = 5,
    PostAmendNoTarget = 100,
    PostAmendTargetNotFound = 101,
    PostAmendAmend = 102,
    StoreRefNotFound = 200,
    StoreUpdateUpdate = 201,
    VmRefNotFound = 300,
    VmVolumeNotFound = 301,
    VmAmendNotAllowed = 302,
    VmUpdateUpdate = 303,
    VmVolumeTooSmall = 304,
    ForgetNoTarget = 500,
    ForgetTargetNotFound = 501,
    ForgetForget = 502,
    ForgetNotAllowed = 503,
    MaxRetriesExceeded = 600,
}

impl ErrorCode {
    pub fn as_i32(self) -> i32 {
        self as i32
    }
}

/// The outcome of trying to process a message, mirroring every exception
/// the Python reference implementation's content handlers can raise. Each
/// variant knows its stable `error_code` and how to render `details()` for
/// the REJECTED row, without ever leaking an internal message/backtrace.
#[derive(Debug, thiserror::Error)]
pub enum MessageProcessingError {
    #[error("unexpected internal error: {0}")]
    Internal(String),

    #[error("message is not properly formatted: {0}")]
    InvalidMessageFormat(String),

    #[error("signature does not match the expected value")]
    InvalidSignature,

    #[error("sender is not authorized to perform this operation")]
    PermissionDenied(String),

    #[error("message content is not available: {0}")]
    ContentUnavailable(ItemHash),

    #[error("referenced file is not available: {0}")]
    FileUnavailable(ItemHash),

    #[error("insufficient balance: have {balance}, need {required}")]
    BalanceInsufficient {
        balance: rust_decimal::Decimal,
        required: rust_decimal::Decimal,
    },

    #[error("amend post does not specify a ref")]
    NoAmendTarget,

    #[error("amend target {0} could not be found")]
    AmendTargetNotFound(ItemHash),

    #[error("cannot amend an amend")]
    CannotAmendAmend,

    #[error("store ref {0} could not be found")]
    StoreRefNotFound(ItemHash),

    #[error("update trees on STORE messages are not supported")]
    StoreCannotUpdateStoreWithRef,

    #[error("program/instance ref {0} could not be found")]
    VmRefNotFound(ItemHash),

    #[error("one or more volumes could not be found: {0:?}")]
    VmVolumeNotFound(Vec<ItemHash>),

    #[error("target program does not allow amends")]
    VmUpdateNotAllowed,

    #[error("cannot amend an amend")]
    VmCannotUpdateUpdate,

    #[error("volume {volume_name} is smaller than its parent {parent_ref}")]
    VmVolumeTooSmall {
        volume_name: String,
        volume_size: u64,
        parent_ref: ItemHash,
        parent_file: ItemHash,
        parent_size: u64,
    },

    #[error("forget message does not specify anything to forget")]
    NoForgetTarget,

    #[error("forget target could not be found")]
    ForgetTargetNotFound {
        target_hash: Option<ItemHash>,
        aggregate_key: Option<String>,
    },

    #[error("cannot forget a forget message ({0})")]
    CannotForgetForgetMessage(ItemHash),

    #[error("file {file_hash} is referenced by live volume of {vm_hash} and cannot be forgotten")]
    ForgetNotAllowed {
        file_hash: ItemHash,
        vm_hash: ItemHash,
    },

    #[error("message exceeded the maximum retry count")]
    MaxRetriesExceeded,
}

impl MessageProcessingError {
    pub fn error_code(&self) -> ErrorCode {
        use MessageProcessingError::*;
        match self {
            Internal(_) => ErrorCode::InternalError,
            InvalidMessageFormat(_) => ErrorCode::InvalidFormat,
            InvalidSignature => ErrorCode::InvalidSignature,
            PermissionDenied(_) => ErrorCode::PermissionDenied,
            ContentUnavailable(_) => ErrorCode::ContentUnavailable,
            FileUnavailable(_) => ErrorCode::FileUnavailable,
            BalanceInsufficient { .. } => ErrorCode::BalanceInsufficient,
            NoAmendTarget => ErrorCode::PostAmendNoTarget,
            AmendTargetNotFound(_) => ErrorCode::PostAmendTargetNotFound,
            CannotAmendAmend => ErrorCode::PostAmendAmend,
            StoreRefNotFound(_) => ErrorCode::StoreRefNotFound,
            StoreCannotUpdateStoreWithRef => ErrorCode::StoreUpdateUpdate,
            VmRefNotFound(_) => ErrorCode::VmRefNotFound,
            VmVolumeNotFound(_) => ErrorCode::VmVolumeNotFound,
            VmUpdateNotAllowed => ErrorCode::VmAmendNotAllowed,
            VmCannotUpdateUpdate => ErrorCode::VmUpdateUpdate,
            VmVolumeTooSmall { .. } => ErrorCode::VmVolumeTooSmall,
            NoForgetTarget => ErrorCode::ForgetNoTarget,
            ForgetTargetNotFound { .. } => ErrorCode::ForgetTargetNotFound,
            CannotForgetForgetMessage(_) => ErrorCode::ForgetForget,
            ForgetNotAllowed { .. } => ErrorCode::ForgetNotAllowed,
            MaxRetriesExceeded => ErrorCode::MaxRetriesExceeded,
        }
    }

    /// Whether this failure should be retried (pending row kept, `retries`
    /// bumped) rather than immediately rejected.
    pub fn is_retryable(&self) -> bool {
        use MessageProcessingError::*;
        matches!(
            self,
            Internal(_)
                | ContentUnavailable(_)
                | FileUnavailable(_)
                | AmendTargetNotFound(_)
                | StoreRefNotFound(_)
                | VmRefNotFound(_)
                | VmVolumeNotFound(_)
                | BalanceInsufficient { .. }
                | ForgetTargetNotFound { .. }
        )
    }

    /// Structured detail payload for the REJECTED row. Built only from
    /// typed fields on the error -- never from a formatted error chain --
    /// so internal details never leak to API consumers.
    pub fn details(&self) -> Option<Value> {
        use MessageProcessingError::*;
        match self {
            InvalidMessageFormat(msg) => Some(json!({"errors": [msg]})),
            PermissionDenied(msg) => Some(json!({"errors": [msg]})),
            ContentUnavailable(hash) | FileUnavailable(hash) => {
                Some(json!({"errors": [{"message": hash.to_string()}]}))
            }
            BalanceInsufficient { balance, required } => Some(json!({
                "errors": [{"balance": balance.to_string(), "required_balance": required.to_string()}]
            })),
            VmVolumeNotFound(hashes) => Some(json!({
                "errors": hashes.iter().map(|h| h.to_string()).collect::<Vec<_>>()
            })),
            VmVolumeTooSmall {
                volume_name,
                volume_size,
                parent_ref,
                parent_file,
                parent_size,
            } => Some(json!({
                "errors": [{
                    "volume_name": volume_name,
                    "parent_ref": parent_ref.to_string(),
                    "parent_file": parent_file.to_string(),
                    "parent_size": parent_size,
                    "volume_size": volume_size,
                }]
            })),
            ForgetTargetNotFound {
                target_hash,
                aggregate_key,
            } => {
                let mut errors = Vec::new();
                if let Some(hash) = target_hash {
                    errors.push(json!({"message": hash.to_string()}));
                }
                if let Some(key) = aggregate_key {
                    errors.push(json!({"aggregate": key}));
                }
                Some(json!({"errors": errors}))
            }
            CannotForgetForgetMessage(hash) => {
                Some(json!({"errors": [{"message": hash.to_string()}]}))
            }
            ForgetNotAllowed {
                file_hash,
                vm_hash,
            } => Some(json!({
                "errors": [{"file": file_hash.to_string(), "vm": vm_hash.to_string()}]
            })),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_match_reference_values() {
        assert_eq!(ErrorCode::InternalError.as_i32(), -1);
        assert_eq!(ErrorCode::InvalidFormat.as_i32(), 0);
        assert_eq!(ErrorCode::BalanceInsufficient.as_i32(), 5);
        assert_eq!(ErrorCode::PostAmendAmend.as_i32(), 102);
        assert_eq!(ErrorCode::VmVolumeTooSmall.as_i32(), 304);
        assert_eq!(ErrorCode::ForgetForget.as_i32(), 502);
        assert_eq!(ErrorCode::MaxRetriesExceeded.as_i32(), 600);
    }

    #[test]
    fn retryable_classification() {
        assert!(MessageProcessingError::ContentUnavailable(ItemHash::new("h")).is_retryable());
        assert!(!MessageProcessingError::InvalidSignature.is_retryable());
        assert!(!MessageProcessingError::CannotAmendAmend.is_retryable());
    }
}
