//! Ledger events
//!
//! Events are immutable records emitted by successful ledger operations.
//! Recipient identities are carried as a SHA-256 hash of the address so the
//! log can be shared with indexers without exposing who is owed what.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use types::ids::{Address, DepositId};
use uuid::Uuid;

use crate::store::Finalization;

/// Hash of a recipient address as it appears in events.
pub fn hash_recipient(recipient: &Address) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(recipient.as_bytes());
    hasher.finalize().into()
}

/// One deposit record created
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deposited {
    pub deposit_id: DepositId,
    pub depositor: Address,
    pub recipient_hash: [u8; 32],
    pub yield_asset: Address,
    pub underlying_asset: Address,
    pub yield_amount: u128,
    pub deposit_time: i64,
}

/// Record paid out to its intended recipient
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claimed {
    pub deposit_id: DepositId,
    pub recipient_hash: [u8; 32],
    pub yield_asset: Address,
    pub amount: u128,
}

/// Record returned to its depositor, either as the yield asset or redeemed
/// back to the underlying asset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recovered {
    pub deposit_id: DepositId,
    pub depositor: Address,
    pub asset: Address,
    pub amount: u128,
    pub finalization: Finalization,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmergencyWithdrawRequested {
    pub asset: Address,
    pub amount: u128,
    pub available_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmergencyWithdrawExecuted {
    pub asset: Address,
    pub amount: u128,
    pub recipient: Address,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmergencyWithdrawCancelled {
    pub asset: Address,
    pub amount: u128,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LendingDelegateSet {
    pub previous: Option<Address>,
    pub delegate: Address,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LendingTargetSet {
    pub previous: Option<Address>,
    pub target: Address,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenConfigSet {
    pub asset: Address,
    pub delegate: Address,
    pub target: Address,
    pub asset_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegateWhitelistUpdated {
    pub delegate: Address,
    pub allowed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WhitelistModeSet {
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryDelaySet {
    pub previous: i64,
    pub delay_secs: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmergencyWithdrawDelaySet {
    pub previous: i64,
    pub delay_secs: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminTransferred {
    pub previous: Address,
    pub admin: Address,
}

/// Enum wrapper for all ledger events, enabling uniform handling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerEvent {
    Deposited(Deposited),
    Claimed(Claimed),
    Recovered(Recovered),
    EmergencyWithdrawRequested(EmergencyWithdrawRequested),
    EmergencyWithdrawExecuted(EmergencyWithdrawExecuted),
    EmergencyWithdrawCancelled(EmergencyWithdrawCancelled),
    LendingDelegateSet(LendingDelegateSet),
    LendingTargetSet(LendingTargetSet),
    TokenConfigSet(TokenConfigSet),
    DelegateWhitelistUpdated(DelegateWhitelistUpdated),
    WhitelistModeSet(WhitelistModeSet),
    RecoveryDelaySet(RecoveryDelaySet),
    EmergencyWithdrawDelaySet(EmergencyWithdrawDelaySet),
    AdminTransferred(AdminTransferred),
}

impl LedgerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            LedgerEvent::Deposited(_) => "Deposited",
            LedgerEvent::Claimed(_) => "Claimed",
            LedgerEvent::Recovered(_) => "Recovered",
            LedgerEvent::EmergencyWithdrawRequested(_) => "EmergencyWithdrawRequested",
            LedgerEvent::EmergencyWithdrawExecuted(_) => "EmergencyWithdrawExecuted",
            LedgerEvent::EmergencyWithdrawCancelled(_) => "EmergencyWithdrawCancelled",
            LedgerEvent::LendingDelegateSet(_) => "LendingDelegateSet",
            LedgerEvent::LendingTargetSet(_) => "LendingTargetSet",
            LedgerEvent::TokenConfigSet(_) => "TokenConfigSet",
            LedgerEvent::DelegateWhitelistUpdated(_) => "DelegateWhitelistUpdated",
            LedgerEvent::WhitelistModeSet(_) => "WhitelistModeSet",
            LedgerEvent::RecoveryDelaySet(_) => "RecoveryDelaySet",
            LedgerEvent::EmergencyWithdrawDelaySet(_) => "EmergencyWithdrawDelaySet",
            LedgerEvent::AdminTransferred(_) => "AdminTransferred",
        }
    }
}

/// Published event envelope.
///
/// `tx_id` is shared by every event of one operation; consumers deduplicate
/// on `(tx_id, log_index)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    pub tx_id: Uuid,
    pub log_index: u32,
    pub emitted_at: DateTime<Utc>,
    pub event: LedgerEvent,
}
