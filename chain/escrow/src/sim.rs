//! In-memory host and simulated lending pool
//!
//! `MemoryHost` keeps balances in a map and implements transactions with a
//! stack of balance snapshots. `SimLendingPool` behaves like a 1:1 lending
//! market with an optional supply fee, and can be configured to misbehave
//! for adversarial testing: misroute yield, pay nothing on redeem, or pull
//! more than asked on redeem.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use types::ids::Address;
use types::numeric::mul_div_floor;

use crate::adapter::{RedeemRequest, SupplyRequest, YieldAdapter};
use crate::errors::{AdapterError, TransferError};
use crate::host::{AssetBank, Host, UnderlyingProbe};

type BalanceMap = HashMap<(Address, Address), u128>;

/// Host backed by in-process maps.
#[derive(Debug, Default)]
pub struct MemoryHost {
    /// (asset, holder) -> balance
    balances: BalanceMap,
    /// Adapter code by delegate address
    code: HashMap<Address, Arc<dyn YieldAdapter>>,
    /// (asset, probe) -> underlying answer
    probes: HashMap<(Address, UnderlyingProbe), Address>,
    /// Holders whose incoming transfers are rejected
    frozen: HashSet<Address>,
    /// Balance snapshots for open transactions
    checkpoints: Vec<BalanceMap>,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Credit `amount` of `asset` to `holder` out of thin air.
    pub fn mint(&mut self, asset: Address, holder: Address, amount: u128) {
        let balance = self.balances.entry((asset, holder)).or_insert(0);
        *balance = balance.saturating_add(amount);
    }

    /// Deploy adapter code at `delegate`.
    pub fn deploy(&mut self, delegate: Address, adapter: Arc<dyn YieldAdapter>) {
        self.code.insert(delegate, adapter);
    }

    /// Remove the code at `delegate`.
    pub fn undeploy(&mut self, delegate: &Address) {
        self.code.remove(delegate);
    }

    /// Make `asset` answer `probe` with `underlying`.
    pub fn set_probe(&mut self, asset: Address, probe: UnderlyingProbe, underlying: Address) {
        self.probes.insert((asset, probe), underlying);
    }

    /// Reject all transfers into `holder`.
    pub fn freeze(&mut self, holder: Address) {
        self.frozen.insert(holder);
    }

    pub fn unfreeze(&mut self, holder: &Address) {
        self.frozen.remove(holder);
    }
}

impl AssetBank for MemoryHost {
    fn balance_of(&self, asset: &Address, holder: &Address) -> u128 {
        self.balances.get(&(*asset, *holder)).copied().unwrap_or(0)
    }

    fn transfer(
        &mut self,
        asset: &Address,
        from: &Address,
        to: &Address,
        amount: u128,
    ) -> Result<(), TransferError> {
        if self.frozen.contains(to) {
            return Err(TransferError::Rejected {
                reason: format!("receiver {} is frozen", to),
            });
        }

        let available = self.balance_of(asset, from);
        if available < amount {
            return Err(TransferError::InsufficientBalance {
                asset: *asset,
                holder: *from,
                required: amount,
                available,
            });
        }

        let receiver = self.balance_of(asset, to);
        if from != to {
            let credited = receiver
                .checked_add(amount)
                .ok_or_else(|| TransferError::Rejected {
                    reason: "balance overflow".to_string(),
                })?;
            self.balances.insert((*asset, *from), available - amount);
            self.balances.insert((*asset, *to), credited);
        }
        Ok(())
    }
}

impl Host for MemoryHost {
    fn adapter_at(&self, delegate: &Address) -> Option<Arc<dyn YieldAdapter>> {
        self.code.get(delegate).cloned()
    }

    fn probe_underlying(&self, asset: &Address, probe: UnderlyingProbe) -> Option<Address> {
        self.probes.get(&(*asset, probe)).copied()
    }

    fn begin(&mut self) {
        self.checkpoints.push(self.balances.clone());
    }

    fn commit(&mut self) {
        self.checkpoints.pop();
    }

    fn rollback(&mut self) {
        if let Some(snapshot) = self.checkpoints.pop() {
            self.balances = snapshot;
        }
    }

    fn open_transactions(&self) -> usize {
        self.checkpoints.len()
    }
}

/// Basis-point denominator
const BPS: u128 = 10_000;

/// Simulated 1:1 lending market.
///
/// Underlying supplied is moved into the pool account and the same amount
/// of the market's yield asset (minus `fee_bps`) is paid out of the pool's
/// reserves. The pool account must be pre-funded with yield-asset and
/// underlying reserves.
#[derive(Debug, Clone)]
pub struct SimLendingPool {
    pool: Address,
    /// underlying -> yield asset
    markets: HashMap<Address, Address>,
    fee_bps: u32,
    misroute: bool,
    redeem_pays: bool,
    overdraw: bool,
}

impl SimLendingPool {
    pub fn new(pool: Address) -> Self {
        Self {
            pool,
            markets: HashMap::new(),
            fee_bps: 0,
            misroute: false,
            redeem_pays: true,
            overdraw: false,
        }
    }

    pub fn with_market(mut self, underlying: Address, yield_asset: Address) -> Self {
        self.markets.insert(underlying, yield_asset);
        self
    }

    /// Charge a supply fee in basis points.
    pub fn with_fee_bps(mut self, fee_bps: u32) -> Self {
        self.fee_bps = fee_bps.min(BPS as u32);
        self
    }

    /// Deliver minted yield to the depositor instead of custody.
    pub fn misrouting(mut self) -> Self {
        self.misroute = true;
        self
    }

    /// Take the yield asset on redeem but pay out nothing.
    pub fn with_broken_redeem(mut self) -> Self {
        self.redeem_pays = false;
        self
    }

    /// Pull the whole custody balance of the yield asset on redeem, paying
    /// out underlying for all of it.
    pub fn overdrawing(mut self) -> Self {
        self.overdraw = true;
        self
    }

    pub fn pool(&self) -> Address {
        self.pool
    }

    fn check_target(&self, target: &Address) -> Result<(), AdapterError> {
        if *target != self.pool {
            return Err(AdapterError::Failed {
                reason: format!("unknown target {}", target),
            });
        }
        Ok(())
    }

    fn underlying_of(&self, yield_asset: &Address) -> Option<Address> {
        self.markets
            .iter()
            .find(|(_, y)| *y == yield_asset)
            .map(|(u, _)| *u)
    }
}

fn adapter_failure(err: TransferError) -> AdapterError {
    AdapterError::Failed {
        reason: err.to_string(),
    }
}

impl YieldAdapter for SimLendingPool {
    fn yield_asset(&self, underlying: &Address, target: &Address) -> Result<Address, AdapterError> {
        self.check_target(target)?;
        self.markets
            .get(underlying)
            .copied()
            .ok_or(AdapterError::Unsupported { asset: *underlying })
    }

    fn supply(&self, bank: &mut dyn AssetBank, request: &SupplyRequest) -> Result<u128, AdapterError> {
        let yield_asset = self.yield_asset(&request.underlying, &request.target)?;

        bank.transfer(&request.underlying, &request.custody, &self.pool, request.amount)
            .map_err(adapter_failure)?;

        let fee = mul_div_floor(request.amount, self.fee_bps as u128, BPS).map_err(|e| {
            AdapterError::Failed {
                reason: e.to_string(),
            }
        })?;
        let minted = request.amount - fee;
        let receiver = if self.misroute {
            request.caller
        } else {
            request.custody
        };

        bank.transfer(&yield_asset, &self.pool, &receiver, minted)
            .map_err(adapter_failure)?;

        // Declares the gross amount; the ledger measures what actually arrived.
        Ok(request.amount)
    }

    fn redeem(&self, bank: &mut dyn AssetBank, request: &RedeemRequest) -> Result<u128, AdapterError> {
        self.check_target(&request.target)?;

        let pulled = if self.overdraw {
            bank.balance_of(&request.yield_asset, &request.custody)
        } else {
            request.amount
        };
        bank.transfer(&request.yield_asset, &request.custody, &self.pool, pulled)
            .map_err(adapter_failure)?;

        if self.redeem_pays {
            bank.transfer(&request.underlying, &self.pool, &request.custody, pulled)
                .map_err(adapter_failure)?;
        }
        Ok(request.amount)
    }

    fn estimate_underlying(
        &self,
        _bank: &dyn AssetBank,
        yield_asset: &Address,
        amount: u128,
        target: &Address,
    ) -> Result<u128, AdapterError> {
        self.check_target(target)?;
        self.underlying_of(yield_asset)
            .map(|_| amount)
            .ok_or(AdapterError::Unsupported { asset: *yield_asset })
    }
}
