//! Claim / Recover
//!
//! Each active record is finalized exactly once, either by its recipient
//! (claim) or by its depositor after the recovery delay (recover, optionally
//! redeemed back to the underlying asset). State is checked first, the
//! record is finalized, and only then are assets moved out of custody.

use tracing::{info, warn};
use types::ids::{Address, DepositId};

use crate::adapter::RedeemRequest;
use crate::errors::LedgerError;
use crate::events::{hash_recipient, Claimed, LedgerEvent, Recovered};
use crate::host::{AssetBank, Host};
use crate::security::EntryPoint;
use crate::store::{DepositRecord, Finalization};
use crate::vault::EscrowVault;

impl<H: Host> EscrowVault<H> {
    /// Pay record `id` out to its intended recipient.
    ///
    /// Returns the amount of the yield asset transferred.
    pub fn claim(&mut self, id: DepositId, caller: &Address, now: i64) -> Result<u128, LedgerError> {
        self.atomic(EntryPoint::Claim, |vault| {
            let record = vault.active_record(id)?;
            if record.intended_recipient != *caller {
                return Err(LedgerError::InvalidRecipient { id });
            }

            let record = vault.store.mark_used(id, Finalization::Claimed)?;
            let custody = vault.custody;
            vault
                .host
                .transfer(&record.yield_asset, &custody, caller, record.yield_amount)?;

            vault.emit(LedgerEvent::Claimed(Claimed {
                deposit_id: id,
                recipient_hash: hash_recipient(caller),
                yield_asset: record.yield_asset,
                amount: record.yield_amount,
            }));
            info!(deposit_id = %id, amount = record.yield_amount, now, "deposit claimed");
            Ok(record.yield_amount)
        })
    }

    /// Return record `id` to its depositor in the yield asset once the
    /// recovery delay has passed.
    pub fn recover(&mut self, id: DepositId, caller: &Address, now: i64) -> Result<u128, LedgerError> {
        self.atomic(EntryPoint::Recover, |vault| {
            vault.ensure_recoverable(id, caller, now)?;

            let record = vault.store.mark_used(id, Finalization::Recovered)?;
            let custody = vault.custody;
            vault
                .host
                .transfer(&record.yield_asset, &custody, caller, record.yield_amount)?;

            vault.emit(LedgerEvent::Recovered(Recovered {
                deposit_id: id,
                depositor: *caller,
                asset: record.yield_asset,
                amount: record.yield_amount,
                finalization: Finalization::Recovered,
            }));
            info!(deposit_id = %id, amount = record.yield_amount, "deposit recovered");
            Ok(record.yield_amount)
        })
    }

    /// Return record `id` to its depositor redeemed back into the underlying
    /// asset once the recovery delay has passed.
    ///
    /// Returns the amount of underlying measured in custody after the
    /// redeem and transferred to the depositor. The redeem may take at most
    /// the record's own yield amount out of custody.
    pub fn recover_as_underlying(
        &mut self,
        id: DepositId,
        caller: &Address,
        now: i64,
    ) -> Result<u128, LedgerError> {
        self.atomic(EntryPoint::RecoverAsUnderlying, |vault| {
            vault.ensure_recoverable(id, caller, now)?;

            let record = vault
                .store
                .mark_used(id, Finalization::RecoveredAsUnderlying)?;
            let (route, adapter) = vault
                .registry
                .resolve_adapter(&vault.host, &record.underlying_asset)?;
            let custody = vault.custody;

            let before = vault.host.balance_of(&record.underlying_asset, &custody);
            let yield_before = vault.host.balance_of(&record.yield_asset, &custody);
            let request = RedeemRequest {
                underlying: record.underlying_asset,
                yield_asset: record.yield_asset,
                amount: record.yield_amount,
                target: route.target,
                asset_key: route.asset_key.clone(),
                custody,
            };
            adapter.redeem(&mut vault.host, &request)?;
            let after = vault.host.balance_of(&record.underlying_asset, &custody);
            let yield_after = vault.host.balance_of(&record.yield_asset, &custody);

            // Other records' shares of the yield asset must stay in custody.
            let taken = yield_before.saturating_sub(yield_after);
            if taken > record.yield_amount {
                warn!(deposit_id = %id, allowed = record.yield_amount, taken, "redeem overdrew custody");
                return Err(LedgerError::RedeemOverdrawn {
                    id,
                    allowed: record.yield_amount,
                    taken,
                });
            }

            let redeemed = after.saturating_sub(before);
            if redeemed == 0 {
                return Err(LedgerError::RedeemFailed { id });
            }
            vault
                .host
                .transfer(&record.underlying_asset, &custody, caller, redeemed)?;

            vault.emit(LedgerEvent::Recovered(Recovered {
                deposit_id: id,
                depositor: *caller,
                asset: record.underlying_asset,
                amount: redeemed,
                finalization: Finalization::RecoveredAsUnderlying,
            }));
            info!(
                deposit_id = %id,
                yield_amount = record.yield_amount,
                redeemed,
                "deposit recovered as underlying"
            );
            Ok(redeemed)
        })
    }

    /// Preconditions shared by both recover paths.
    fn ensure_recoverable(
        &self,
        id: DepositId,
        caller: &Address,
        now: i64,
    ) -> Result<DepositRecord, LedgerError> {
        let record = self.active_record(id)?;
        if record.depositor != *caller {
            return Err(LedgerError::InvalidRecipient { id });
        }
        let available_at = record
            .deposit_time
            .saturating_add(self.config.recovery_delay_secs);
        if now < available_at {
            return Err(LedgerError::RecoveryNotAvailable { id, available_at });
        }
        Ok(record)
    }
}
