//! Yield adapter interface
//!
//! An adapter converts an underlying asset into a yield-bearing asset and
//! back. Adapters are external code: they act on the host's balances
//! through an [`AssetBank`] but never see ledger state or the host's
//! transaction controls, and the ledger never trusts their declared return
//! values. Amounts received are measured from custody balance deltas.

use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use types::ids::Address;

use crate::errors::AdapterError;
use crate::host::AssetBank;

/// Conversion of underlying into the yield-bearing asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupplyRequest {
    pub underlying: Address,
    pub amount: u128,
    /// Yield target (e.g. the lending pool) from the adapter route
    pub target: Address,
    pub asset_key: String,
    /// Holder the yield asset must be delivered to
    pub custody: Address,
    /// Originating depositor
    pub caller: Address,
}

/// Redemption of the yield-bearing asset back into underlying.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedeemRequest {
    pub underlying: Address,
    pub yield_asset: Address,
    pub amount: u128,
    pub target: Address,
    pub asset_key: String,
    /// Holder of the yield asset and receiver of the underlying
    pub custody: Address,
}

/// Externally supplied conversion logic between underlying and yield assets.
pub trait YieldAdapter: Debug + Send + Sync {
    /// Yield-bearing asset produced for `underlying` at `target`.
    fn yield_asset(&self, underlying: &Address, target: &Address) -> Result<Address, AdapterError>;

    /// Convert custody's underlying into the yield asset.
    ///
    /// Returns the amount the adapter claims to have delivered.
    fn supply(&self, bank: &mut dyn AssetBank, request: &SupplyRequest) -> Result<u128, AdapterError>;

    /// Convert custody's yield asset back into underlying.
    ///
    /// Returns the amount the adapter claims to have delivered.
    fn redeem(&self, bank: &mut dyn AssetBank, request: &RedeemRequest) -> Result<u128, AdapterError>;

    /// Side-effect-free estimate of the underlying value of `amount` of
    /// `yield_asset`.
    fn estimate_underlying(
        &self,
        bank: &dyn AssetBank,
        yield_asset: &Address,
        amount: u128,
        target: &Address,
    ) -> Result<u128, AdapterError>;
}
