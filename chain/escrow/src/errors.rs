//! Ledger error types
//!
//! Every component owns a `thiserror` enum; `LedgerError` folds them together
//! and classifies each failure into one of the taxonomy categories. Any error
//! aborts the whole enclosing operation.

use thiserror::Error;
use types::errors::AmountError;
use types::ids::{Address, DepositId};

/// Taxonomy bucket of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Bad address, amount, recipient list, or amount mismatch
    Validation,
    /// Already used, not found, or a time lock has not elapsed
    State,
    /// Adapter not whitelisted or not backed by code
    Trust,
    /// Adapter call produced no yield / no underlying, or a transfer failed
    Integration,
    /// An active index disagrees with the record map
    Consistency,
    /// Caller lacks the required identity or re-entered an entry point
    Authorization,
}

/// Record store errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Deposit not found: {id}")]
    NotFound { id: DepositId },

    #[error("Deposit already used: {id}")]
    AlreadyUsed { id: DepositId },

    #[error("Consistency fault: deposit {id} missing from {index} index")]
    ConsistencyFault { id: DepositId, index: &'static str },

    #[error("Empty record batch")]
    EmptyBatch,

    #[error("Record for deposit batch has zero yield amount")]
    ZeroAmount,

    #[error("Record for deposit batch names the zero address")]
    ZeroAddress,

    #[error("Record amount {amount} exceeds the record width")]
    AmountOutOfRange { amount: u128 },

    #[error("Deposit id counter exhausted")]
    IdsExhausted,
}

/// Adapter registry errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Zero address supplied for {field}")]
    ZeroAddress { field: &'static str },

    #[error("Delegate not whitelisted: {delegate}")]
    DelegateNotWhitelisted { delegate: Address },

    #[error("Delegate has no code: {delegate}")]
    DelegateHasNoCode { delegate: Address },

    #[error("No adapter route configured for asset {asset}")]
    MissingRoute { asset: Address },
}

/// Emergency withdrawal timelock errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EmergencyError {
    #[error("Emergency withdrawal already pending for {asset}")]
    RequestPending { asset: Address },

    #[error("No emergency withdrawal requested for {asset}")]
    NoPendingRequest { asset: Address },

    #[error("Emergency withdrawal already executed for {asset}")]
    AlreadyExecuted { asset: Address },

    #[error("Emergency withdrawal delay not elapsed: available at {available_at}")]
    DelayNotElapsed { available_at: i64 },

    #[error("Insufficient balance for {asset}: requested {requested}, available {available}")]
    InsufficientBalance {
        asset: Address,
        requested: u128,
        available: u128,
    },

    #[error("Withdrawal would touch reserved funds of {asset}: requested {requested}, unreserved {available}")]
    ExceedsUnreserved {
        asset: Address,
        requested: u128,
        available: u128,
    },

    #[error("Emergency withdrawal amount must be positive")]
    InvalidAmount,
}

/// Configuration errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid {name}: {value}s outside 0..={max}s")]
    InvalidDelay {
        name: &'static str,
        value: i64,
        max: i64,
    },

    #[error("Allocation cap must be positive")]
    InvalidAllocationCap,

    #[error("Config parse error: {0}")]
    Parse(String),
}

/// Failure reported by a yield adapter.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AdapterError {
    #[error("Adapter does not support asset {asset}")]
    Unsupported { asset: Address },

    #[error("Adapter call failed: {reason}")]
    Failed { reason: String },
}

/// Failure reported by the host's asset-transfer primitive.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransferError {
    #[error("Insufficient {asset} balance for {holder}: required {required}, available {available}")]
    InsufficientBalance {
        asset: Address,
        holder: Address,
        required: u128,
        available: u128,
    },

    #[error("Transfer rejected: {reason}")]
    Rejected { reason: String },
}

/// Top-level ledger error
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Emergency withdrawal error: {0}")]
    Emergency(#[from] EmergencyError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Adapter error: {0}")]
    Adapter(#[from] AdapterError),

    #[error("Transfer error: {0}")]
    Transfer(#[from] TransferError),

    #[error("Amount error: {0}")]
    Amount(#[from] AmountError),

    #[error("Unauthorized: caller is not admin")]
    Unauthorized,

    #[error("Reentrancy detected in {entry_point}")]
    Reentrancy { entry_point: &'static str },

    #[error("Amount must be positive")]
    InvalidAmount,

    #[error("Zero address supplied for {field}")]
    ZeroAddress { field: &'static str },

    #[error("Allocation list is empty")]
    EmptyAllocations,

    #[error("Too many allocations: {count} exceeds cap {max}")]
    TooManyAllocations { count: usize, max: usize },

    #[error("Allocation sum {actual} does not match deposit amount {expected}")]
    AmountMismatch { expected: u128, actual: u128 },

    #[error("Yield share for recipient {recipient} rounds down to zero")]
    ZeroYieldShare { recipient: Address },

    #[error("Caller is not entitled to deposit {id}")]
    InvalidRecipient { id: DepositId },

    #[error("Recovery of deposit {id} not available until {available_at}")]
    RecoveryNotAvailable { id: DepositId, available_at: i64 },

    #[error("Adapter produced no yield asset in custody")]
    NoYieldReceived,

    #[error("Adapter routed yield to depositor {depositor} instead of custody")]
    YieldMisrouted { depositor: Address },

    #[error("Redeem of deposit {id} produced no underlying asset")]
    RedeemFailed { id: DepositId },

    #[error("Redeem of deposit {id} took {taken} of the yield asset, record holds {allowed}")]
    RedeemOverdrawn {
        id: DepositId,
        allowed: u128,
        taken: u128,
    },

    #[error("Host transaction depth is {actual}, expected {expected}")]
    HostTransactionLost { expected: usize, actual: usize },

    #[error("No probe resolved an underlying asset for {asset}")]
    UnderlyingUnresolved { asset: Address },

    #[error("Probes disagree on the underlying asset for {asset}")]
    UnderlyingAmbiguous { asset: Address },
}

impl LedgerError {
    /// Taxonomy bucket of this error.
    pub fn category(&self) -> ErrorCategory {
        match self {
            LedgerError::Store(err) => match err {
                StoreError::NotFound { .. } | StoreError::AlreadyUsed { .. } => ErrorCategory::State,
                StoreError::ConsistencyFault { .. } => ErrorCategory::Consistency,
                StoreError::IdsExhausted => ErrorCategory::State,
                StoreError::EmptyBatch
                | StoreError::ZeroAmount
                | StoreError::ZeroAddress
                | StoreError::AmountOutOfRange { .. } => ErrorCategory::Validation,
            },
            LedgerError::Registry(err) => match err {
                RegistryError::ZeroAddress { .. } => ErrorCategory::Validation,
                RegistryError::MissingRoute { .. } => ErrorCategory::State,
                RegistryError::DelegateNotWhitelisted { .. }
                | RegistryError::DelegateHasNoCode { .. } => ErrorCategory::Trust,
            },
            LedgerError::Emergency(err) => match err {
                EmergencyError::InvalidAmount => ErrorCategory::Validation,
                _ => ErrorCategory::State,
            },
            LedgerError::Config(_) => ErrorCategory::Validation,
            LedgerError::Adapter(_) | LedgerError::Transfer(_) => ErrorCategory::Integration,
            LedgerError::Amount(_) => ErrorCategory::Validation,
            LedgerError::Unauthorized | LedgerError::Reentrancy { .. } => {
                ErrorCategory::Authorization
            }
            LedgerError::InvalidAmount
            | LedgerError::ZeroAddress { .. }
            | LedgerError::EmptyAllocations
            | LedgerError::TooManyAllocations { .. }
            | LedgerError::AmountMismatch { .. }
            | LedgerError::ZeroYieldShare { .. } => ErrorCategory::Validation,
            LedgerError::InvalidRecipient { .. } => ErrorCategory::Authorization,
            LedgerError::RecoveryNotAvailable { .. } => ErrorCategory::State,
            LedgerError::NoYieldReceived
            | LedgerError::YieldMisrouted { .. }
            | LedgerError::RedeemFailed { .. }
            | LedgerError::RedeemOverdrawn { .. }
            | LedgerError::UnderlyingUnresolved { .. }
            | LedgerError::UnderlyingAmbiguous { .. } => ErrorCategory::Integration,
            LedgerError::HostTransactionLost { .. } => ErrorCategory::Consistency,
        }
    }

    /// True for faults that indicate corrupted ledger state.
    pub fn is_consistency_fault(&self) -> bool {
        self.category() == ErrorCategory::Consistency
    }
}
