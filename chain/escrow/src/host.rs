//! Host: the execution environment the ledger runs inside
//!
//! The host supplies everything the ledger treats as an external
//! collaborator:
//! - the trusted asset-transfer primitive and balance queries
//! - code lookup for adapter delegates
//! - metadata probes against yield-bearing assets
//! - atomic transactions (begin / commit / rollback)
//!
//! The ledger opens exactly one host transaction per mutating operation.
//! Adapters only ever see the [`AssetBank`] half of the host, so they can
//! move balances but never end or discard a transaction.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use types::ids::Address;

use crate::adapter::YieldAdapter;
use crate::errors::TransferError;

/// Metadata query a yield-bearing asset may answer with its underlying asset.
///
/// This is a closed set: underlying discovery never guesses beyond it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnderlyingProbe {
    /// Lending-pool receipt tokens exposing `UNDERLYING_ASSET_ADDRESS`
    AaveUnderlyingAsset,
    /// Money-market tokens exposing `underlying`
    CompoundUnderlying,
    /// Tokenized vaults exposing `asset`
    Erc4626Asset,
}

impl UnderlyingProbe {
    /// Every probe, in the order they are tried.
    pub const ALL: [UnderlyingProbe; 3] = [
        UnderlyingProbe::AaveUnderlyingAsset,
        UnderlyingProbe::CompoundUnderlying,
        UnderlyingProbe::Erc4626Asset,
    ];
}

/// Balance queries and the asset-transfer primitive.
///
/// This is the only view of the host handed to yield adapters.
pub trait AssetBank {
    /// Balance of `holder` in `asset`.
    fn balance_of(&self, asset: &Address, holder: &Address) -> u128;

    /// Move `amount` of `asset` from `from` to `to`.
    fn transfer(
        &mut self,
        asset: &Address,
        from: &Address,
        to: &Address,
        amount: u128,
    ) -> Result<(), TransferError>;
}

/// Execution environment of the ledger.
pub trait Host: AssetBank {
    /// Adapter code deployed at `delegate`, if any.
    fn adapter_at(&self, delegate: &Address) -> Option<Arc<dyn YieldAdapter>>;

    /// Answer of `asset` to a metadata probe. `None` when the asset does not
    /// implement it.
    fn probe_underlying(&self, asset: &Address, probe: UnderlyingProbe) -> Option<Address>;

    /// Open a transaction.
    fn begin(&mut self);

    /// Make the innermost transaction's effects permanent.
    fn commit(&mut self);

    /// Discard the innermost transaction's effects.
    fn rollback(&mut self);

    /// Number of transactions currently open.
    fn open_transactions(&self) -> usize;
}
