//! Emergency Withdrawal Timelock
//!
//! Two-phase, per-asset drain of custody balances: request, wait out the
//! delay, execute. Execution never touches funds still owed to active
//! deposit records.
//!
//! Per-asset slot lifecycle:
//! `None → Requested → Executed` or `Requested → (cancel) → None`

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::warn;
use types::ids::Address;

use crate::errors::{EmergencyError, LedgerError};
use crate::events::{
    EmergencyWithdrawCancelled, EmergencyWithdrawExecuted, EmergencyWithdrawRequested, LedgerEvent,
};
use crate::host::{AssetBank, Host};
use crate::security::EntryPoint;
use crate::vault::EscrowVault;

/// Emergency withdrawal slot for one asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmergencyWithdrawRequest {
    pub amount: u128,
    pub request_time: i64,
    pub executed: bool,
}

impl EmergencyWithdrawRequest {
    pub fn is_pending(&self) -> bool {
        !self.executed
    }
}

/// Per-asset request slots.
#[derive(Debug, Clone, Default)]
pub struct EmergencyTimelock {
    slots: HashMap<Address, EmergencyWithdrawRequest>,
}

impl EmergencyTimelock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a request for `asset`.
    ///
    /// `amount == 0` requests the whole current `balance`. Returns the
    /// effective requested amount. An executed slot may be replaced by a
    /// new request.
    pub fn request(
        &mut self,
        asset: Address,
        amount: u128,
        balance: u128,
        now: i64,
    ) -> Result<u128, EmergencyError> {
        if self.slots.get(&asset).map_or(false, |r| r.is_pending()) {
            return Err(EmergencyError::RequestPending { asset });
        }

        let effective = if amount == 0 { balance } else { amount };
        if effective == 0 {
            return Err(EmergencyError::InvalidAmount);
        }
        if effective > balance {
            return Err(EmergencyError::InsufficientBalance {
                asset,
                requested: effective,
                available: balance,
            });
        }

        self.slots.insert(
            asset,
            EmergencyWithdrawRequest {
                amount: effective,
                request_time: now,
                executed: false,
            },
        );
        Ok(effective)
    }

    /// Execute the pending request for `asset`.
    ///
    /// `reserved` is the amount still owed to active records. Fails rather
    /// than shrinking the withdrawal when the unreserved balance cannot
    /// cover the request. Returns the amount to transfer.
    pub fn execute(
        &mut self,
        asset: Address,
        now: i64,
        delay_secs: i64,
        balance: u128,
        reserved: u128,
    ) -> Result<u128, EmergencyError> {
        let request = self
            .slots
            .get_mut(&asset)
            .ok_or(EmergencyError::NoPendingRequest { asset })?;

        if request.executed {
            return Err(EmergencyError::AlreadyExecuted { asset });
        }

        let available_at = request.request_time.saturating_add(delay_secs);
        if now < available_at {
            return Err(EmergencyError::DelayNotElapsed { available_at });
        }

        let unreserved = balance.saturating_sub(reserved);
        let transferable = request.amount.min(unreserved);
        if transferable < request.amount {
            return Err(EmergencyError::ExceedsUnreserved {
                asset,
                requested: request.amount,
                available: unreserved,
            });
        }

        request.executed = true;
        Ok(transferable)
    }

    /// Cancel the pending request for `asset`, returning its slot to empty.
    pub fn cancel(&mut self, asset: Address) -> Result<EmergencyWithdrawRequest, EmergencyError> {
        match self.slots.get(&asset) {
            None => Err(EmergencyError::NoPendingRequest { asset }),
            Some(request) if request.executed => Err(EmergencyError::AlreadyExecuted { asset }),
            Some(_) => self
                .slots
                .remove(&asset)
                .ok_or(EmergencyError::NoPendingRequest { asset }),
        }
    }

    pub fn get(&self, asset: &Address) -> Option<&EmergencyWithdrawRequest> {
        self.slots.get(asset)
    }
}

impl<H: Host> EscrowVault<H> {
    /// Open an emergency withdrawal of `amount` of `asset` from custody.
    /// `amount == 0` requests the full current balance. Admin-only.
    ///
    /// Returns the time the request becomes executable.
    pub fn request_emergency_withdraw(
        &mut self,
        caller: &Address,
        asset: Address,
        amount: u128,
        now: i64,
    ) -> Result<i64, LedgerError> {
        self.atomic(EntryPoint::RequestEmergencyWithdraw, |vault| {
            vault.ensure_admin(caller)?;
            if asset.is_zero() {
                return Err(LedgerError::ZeroAddress { field: "asset" });
            }
            let balance = vault.host.balance_of(&asset, &vault.custody);
            let requested = vault.timelock.request(asset, amount, balance, now)?;
            let available_at = now.saturating_add(vault.config.emergency_withdraw_delay_secs);

            vault.emit(LedgerEvent::EmergencyWithdrawRequested(EmergencyWithdrawRequested {
                asset,
                amount: requested,
                available_at,
            }));
            warn!(%asset, amount = requested, available_at, "emergency withdrawal requested");
            Ok(available_at)
        })
    }

    /// Execute the pending emergency withdrawal for `asset`, paying the
    /// calling admin. Funds owed to active records are never touched.
    /// Admin-only.
    pub fn execute_emergency_withdraw(
        &mut self,
        caller: &Address,
        asset: Address,
        now: i64,
    ) -> Result<u128, LedgerError> {
        self.atomic(EntryPoint::ExecuteEmergencyWithdraw, |vault| {
            vault.ensure_admin(caller)?;
            let custody = vault.custody;
            let balance = vault.host.balance_of(&asset, &custody);
            let reserved = vault.store.reserved(&asset);
            let amount = vault.timelock.execute(
                asset,
                now,
                vault.config.emergency_withdraw_delay_secs,
                balance,
                reserved,
            )?;

            vault.host.transfer(&asset, &custody, caller, amount)?;

            vault.emit(LedgerEvent::EmergencyWithdrawExecuted(EmergencyWithdrawExecuted {
                asset,
                amount,
                recipient: *caller,
            }));
            warn!(%asset, amount, reserved, recipient = %caller, "emergency withdrawal executed");
            Ok(amount)
        })
    }

    /// Cancel the pending emergency withdrawal for `asset`. Admin-only.
    pub fn cancel_emergency_withdraw(
        &mut self,
        caller: &Address,
        asset: Address,
        now: i64,
    ) -> Result<(), LedgerError> {
        self.atomic(EntryPoint::CancelEmergencyWithdraw, |vault| {
            vault.ensure_admin(caller)?;
            let cancelled = vault.timelock.cancel(asset)?;

            vault.emit(LedgerEvent::EmergencyWithdrawCancelled(EmergencyWithdrawCancelled {
                asset,
                amount: cancelled.amount,
            }));
            warn!(%asset, amount = cancelled.amount, now, "emergency withdrawal cancelled");
            Ok(())
        })
    }

    /// Current emergency withdrawal slot for `asset`.
    pub fn emergency_request(&self, asset: &Address) -> Option<&EmergencyWithdrawRequest> {
        self.timelock.get(asset)
    }
}
