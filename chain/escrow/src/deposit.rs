//! Deposit Engine
//!
//! Accepts an asset from a depositor, converts it to the yield-bearing asset
//! through the routed adapter (or takes the yield asset directly), measures
//! what actually arrived in custody and splits it into one record per
//! recipient.
//!
//! Splitting: every recipient but the last gets `floor(received * share /
//! amount)`; the last recipient absorbs the remainder, so shares always sum
//! to the measured amount exactly.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, info};
use types::errors::AmountError;
use types::ids::{Address, DepositId};
use types::numeric::{checked_sum, mul_div_floor};

use crate::adapter::SupplyRequest;
use crate::errors::LedgerError;
use crate::events::{hash_recipient, Deposited, LedgerEvent};
use crate::host::{AssetBank, Host, UnderlyingProbe};
use crate::security::EntryPoint;
use crate::store::NewRecord;
use crate::vault::EscrowVault;

/// Portion of a deposit owed to one recipient, in deposit units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    pub recipient: Address,
    pub amount: u128,
}

impl Allocation {
    pub fn new(recipient: Address, amount: u128) -> Self {
        Self { recipient, amount }
    }
}

/// Check a deposit's allocation list against the deposited `amount`.
pub fn validate_allocations(
    amount: u128,
    allocations: &[Allocation],
    max_allocations: usize,
) -> Result<(), LedgerError> {
    if amount == 0 {
        return Err(LedgerError::InvalidAmount);
    }
    if allocations.is_empty() {
        return Err(LedgerError::EmptyAllocations);
    }
    if allocations.len() > max_allocations {
        return Err(LedgerError::TooManyAllocations {
            count: allocations.len(),
            max: max_allocations,
        });
    }
    for allocation in allocations {
        if allocation.amount == 0 {
            return Err(LedgerError::InvalidAmount);
        }
        if allocation.recipient.is_zero() {
            return Err(LedgerError::ZeroAddress { field: "recipient" });
        }
    }

    let total = checked_sum(allocations.iter().map(|a| a.amount))?;
    if total != amount {
        return Err(LedgerError::AmountMismatch {
            expected: amount,
            actual: total,
        });
    }
    Ok(())
}

/// Split `received` proportionally to each allocation's share of `amount`.
///
/// The returned shares sum to `received`. A share of zero is rejected.
pub fn split_yield(
    received: u128,
    amount: u128,
    allocations: &[Allocation],
) -> Result<Vec<u128>, LedgerError> {
    let Some((last, head)) = allocations.split_last() else {
        return Err(LedgerError::EmptyAllocations);
    };

    let mut shares = Vec::with_capacity(allocations.len());
    let mut distributed: u128 = 0;
    for allocation in head {
        let share = mul_div_floor(received, allocation.amount, amount)?;
        if share == 0 {
            return Err(LedgerError::ZeroYieldShare {
                recipient: allocation.recipient,
            });
        }
        distributed = distributed
            .checked_add(share)
            .ok_or(AmountError::Overflow)?;
        shares.push(share);
    }

    let remainder = received
        .checked_sub(distributed)
        .ok_or(AmountError::Overflow)?;
    if remainder == 0 {
        return Err(LedgerError::ZeroYieldShare {
            recipient: last.recipient,
        });
    }
    shares.push(remainder);
    Ok(shares)
}

impl<H: Host> EscrowVault<H> {
    /// Deposit `amount` of `underlying`, convert it through the routed
    /// adapter and escrow the yield for `allocations`.
    ///
    /// Returns the new record ids in allocation order.
    pub fn deposit(
        &mut self,
        caller: &Address,
        underlying: Address,
        amount: u128,
        allocations: &[Allocation],
        now: i64,
    ) -> Result<Vec<DepositId>, LedgerError> {
        self.atomic(EntryPoint::Deposit, |vault| {
            if caller.is_zero() {
                return Err(LedgerError::ZeroAddress { field: "depositor" });
            }
            if underlying.is_zero() {
                return Err(LedgerError::ZeroAddress { field: "underlying" });
            }
            validate_allocations(amount, allocations, vault.config.max_allocations)?;

            let (route, adapter) = vault.registry.resolve_adapter(&vault.host, &underlying)?;
            let custody = vault.custody;

            vault.host.transfer(&underlying, caller, &custody, amount)?;

            let yield_asset = adapter.yield_asset(&underlying, &route.target)?;
            let custody_before = vault.host.balance_of(&yield_asset, &custody);
            let depositor_before = vault.host.balance_of(&yield_asset, caller);

            let request = SupplyRequest {
                underlying,
                amount,
                target: route.target,
                asset_key: route.asset_key.clone(),
                custody,
                caller: *caller,
            };
            let declared = adapter.supply(&mut vault.host, &request)?;

            let custody_after = vault.host.balance_of(&yield_asset, &custody);
            let depositor_after = vault.host.balance_of(&yield_asset, caller);

            if depositor_after > depositor_before {
                return Err(LedgerError::YieldMisrouted { depositor: *caller });
            }
            let received = custody_after.saturating_sub(custody_before);
            if received == 0 {
                return Err(LedgerError::NoYieldReceived);
            }
            if declared != received {
                debug!(
                    declared,
                    received,
                    delegate = %route.delegate,
                    "adapter declared amount differs from measured yield"
                );
            }

            vault.escrow(*caller, underlying, yield_asset, amount, received, allocations, now)
        })
    }

    /// Deposit `amount` of an already yield-bearing asset and escrow it for
    /// `allocations`. The underlying asset is discovered by probing.
    pub fn deposit_with_yield_asset(
        &mut self,
        caller: &Address,
        yield_asset: Address,
        amount: u128,
        allocations: &[Allocation],
        now: i64,
    ) -> Result<Vec<DepositId>, LedgerError> {
        self.atomic(EntryPoint::DepositWithYieldAsset, |vault| {
            if caller.is_zero() {
                return Err(LedgerError::ZeroAddress { field: "depositor" });
            }
            if yield_asset.is_zero() {
                return Err(LedgerError::ZeroAddress { field: "yield_asset" });
            }
            validate_allocations(amount, allocations, vault.config.max_allocations)?;

            let underlying = vault.resolve_underlying(&yield_asset)?;
            let custody = vault.custody;

            let before = vault.host.balance_of(&yield_asset, &custody);
            vault.host.transfer(&yield_asset, caller, &custody, amount)?;
            let after = vault.host.balance_of(&yield_asset, &custody);

            let received = after.saturating_sub(before);
            if received == 0 {
                return Err(LedgerError::NoYieldReceived);
            }

            vault.escrow(*caller, underlying, yield_asset, amount, received, allocations, now)
        })
    }

    /// Underlying asset of `yield_asset` according to the metadata probes.
    ///
    /// Exactly one distinct non-zero answer is accepted.
    pub fn resolve_underlying(&self, yield_asset: &Address) -> Result<Address, LedgerError> {
        let answers: BTreeSet<Address> = UnderlyingProbe::ALL
            .iter()
            .filter_map(|probe| self.host.probe_underlying(yield_asset, *probe))
            .filter(|underlying| !underlying.is_zero())
            .collect();

        let mut answers = answers.into_iter();
        match (answers.next(), answers.next()) {
            (Some(underlying), None) => Ok(underlying),
            (None, _) => Err(LedgerError::UnderlyingUnresolved {
                asset: *yield_asset,
            }),
            (Some(_), Some(_)) => Err(LedgerError::UnderlyingAmbiguous {
                asset: *yield_asset,
            }),
        }
    }

    /// Split `received` and write one record per allocation.
    #[allow(clippy::too_many_arguments)]
    fn escrow(
        &mut self,
        depositor: Address,
        underlying: Address,
        yield_asset: Address,
        amount: u128,
        received: u128,
        allocations: &[Allocation],
        now: i64,
    ) -> Result<Vec<DepositId>, LedgerError> {
        let shares = split_yield(received, amount, allocations)?;

        let batch: Vec<NewRecord> = allocations
            .iter()
            .zip(&shares)
            .map(|(allocation, share)| NewRecord {
                depositor,
                intended_recipient: allocation.recipient,
                deposit_time: now,
                yield_amount: *share,
                yield_asset,
                underlying_asset: underlying,
            })
            .collect();

        let ids = self.store.insert_batch(batch)?;

        for ((id, allocation), share) in ids.iter().zip(allocations).zip(&shares) {
            self.emit(LedgerEvent::Deposited(Deposited {
                deposit_id: *id,
                depositor,
                recipient_hash: hash_recipient(&allocation.recipient),
                yield_asset,
                underlying_asset: underlying,
                yield_amount: *share,
                deposit_time: now,
            }));
        }

        info!(
            %depositor,
            %yield_asset,
            amount,
            received,
            records = ids.len(),
            "deposit escrowed"
        );
        Ok(ids)
    }
}
