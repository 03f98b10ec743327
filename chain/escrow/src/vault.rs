//! Escrow Vault: the ledger façade
//!
//! Owns every ledger component plus the host it runs inside:
//! - Record store (deposit records and active indices)
//! - Adapter registry (routes, whitelist)
//! - Emergency withdrawal timelock
//! - Admin configuration, access control, in-flight guard
//!
//! Deposit, claim/recover and emergency operations live in their own modules
//! as further `impl` blocks on [`EscrowVault`]. Every mutating entry point
//! runs through [`EscrowVault::atomic`], so a failure anywhere rolls back
//! records, indices, host balances, configuration and buffered events.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};
use types::ids::{Address, DepositId};
use uuid::Uuid;

use crate::config::{validate_delay, LedgerConfig};
use crate::emergency::EmergencyTimelock;
use crate::errors::{LedgerError, StoreError};
use crate::events::{
    AdminTransferred, DelegateWhitelistUpdated, EmergencyWithdrawDelaySet, EventRecord,
    LedgerEvent, LendingDelegateSet, LendingTargetSet, RecoveryDelaySet, TokenConfigSet,
    WhitelistModeSet,
};
use crate::host::Host;
use crate::registry::{AdapterRegistry, AdapterRoute};
use crate::security::{AccessControl, EntryPoint, ReentrancyGuard};
use crate::store::{DepositRecord, RecordStore};

/// Recipient-facing view of an active record.
///
/// `depositor` and `deposit_time` are only filled in when the caller is the
/// recipient being queried.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimableDeposit {
    pub id: DepositId,
    pub depositor: Option<Address>,
    pub deposit_time: Option<i64>,
    pub yield_amount: u128,
    pub yield_asset: Address,
    pub underlying_asset: Address,
}

/// Small component state restored wholesale when an operation fails.
struct Snapshot {
    registry: AdapterRegistry,
    timelock: EmergencyTimelock,
    config: LedgerConfig,
    access_control: AccessControl,
}

/// Yield escrow custody ledger.
///
/// All assets are held by the `custody` account at the host. The vault
/// tracks who is owed what out of that balance.
#[derive(Debug)]
pub struct EscrowVault<H: Host> {
    pub(crate) custody: Address,
    pub(crate) host: H,
    pub(crate) store: RecordStore,
    pub(crate) registry: AdapterRegistry,
    pub(crate) timelock: EmergencyTimelock,
    pub(crate) config: LedgerConfig,
    access_control: AccessControl,
    reentrancy_guard: ReentrancyGuard,
    /// Events of the operation in flight
    pending: Vec<LedgerEvent>,
    /// Published events log (append-only)
    events: Vec<EventRecord>,
}

impl<H: Host> EscrowVault<H> {
    /// Create a vault administered by `admin` holding funds in `custody`.
    pub fn new(
        admin: Address,
        custody: Address,
        host: H,
        config: LedgerConfig,
    ) -> Result<Self, LedgerError> {
        if admin.is_zero() {
            return Err(LedgerError::ZeroAddress { field: "admin" });
        }
        if custody.is_zero() {
            return Err(LedgerError::ZeroAddress { field: "custody" });
        }
        config.validate()?;

        Ok(Self {
            custody,
            host,
            store: RecordStore::new(),
            registry: AdapterRegistry::new(config.whitelist_enabled),
            timelock: EmergencyTimelock::new(),
            config,
            access_control: AccessControl::new(admin),
            reentrancy_guard: ReentrancyGuard::new(),
            pending: Vec::new(),
            events: Vec::new(),
        })
    }

    // ───────────────────────── Transactions ─────────────────────────

    /// Run `body` as one atomic operation under `entry`'s in-flight guard.
    ///
    /// On success the host transaction and store journal are committed and
    /// buffered events are published. On failure every component is
    /// restored and buffered events are dropped. The guard is released
    /// either way.
    ///
    /// The body must leave exactly the transaction opened here on the host.
    /// Anything else is a `HostTransactionLost` fault and every transaction
    /// above the entry depth is rolled back.
    pub(crate) fn atomic<T, F>(&mut self, entry: EntryPoint, body: F) -> Result<T, LedgerError>
    where
        F: FnOnce(&mut Self) -> Result<T, LedgerError>,
    {
        if !self.reentrancy_guard.acquire(entry) {
            return Err(LedgerError::Reentrancy {
                entry_point: entry.name(),
            });
        }

        let snapshot = self.snapshot();
        let pending_mark = self.pending.len();
        let depth = self.host.open_transactions();
        self.host.begin();
        self.store.begin();

        let result = body(self).and_then(|value| {
            let actual = self.host.open_transactions();
            if actual != depth + 1 {
                return Err(LedgerError::HostTransactionLost {
                    expected: depth + 1,
                    actual,
                });
            }
            Ok(value)
        });

        match &result {
            Ok(_) => {
                self.store.commit();
                self.host.commit();
                self.publish();
            }
            Err(err) => {
                self.store.rollback();
                while self.host.open_transactions() > depth {
                    self.host.rollback();
                }
                self.restore(snapshot);
                self.pending.truncate(pending_mark);
                if err.is_consistency_fault() {
                    error!(entry_point = %entry, error = %err, "ledger consistency fault, operation aborted");
                } else {
                    debug!(entry_point = %entry, error = %err, category = ?err.category(), "operation rolled back");
                }
            }
        }

        self.reentrancy_guard.release(entry);
        result
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot {
            registry: self.registry.clone(),
            timelock: self.timelock.clone(),
            config: self.config.clone(),
            access_control: self.access_control.clone(),
        }
    }

    fn restore(&mut self, snapshot: Snapshot) {
        self.registry = snapshot.registry;
        self.timelock = snapshot.timelock;
        self.config = snapshot.config;
        self.access_control = snapshot.access_control;
    }

    /// Buffer an event for the operation in flight.
    pub(crate) fn emit(&mut self, event: LedgerEvent) {
        self.pending.push(event);
    }

    fn publish(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        let tx_id = Uuid::now_v7();
        let emitted_at = Utc::now();
        for (log_index, event) in self.pending.drain(..).enumerate() {
            self.events.push(EventRecord {
                tx_id,
                log_index: log_index as u32,
                emitted_at,
                event,
            });
        }
    }

    pub(crate) fn ensure_admin(&self, caller: &Address) -> Result<(), LedgerError> {
        if !self.access_control.is_admin(caller) {
            return Err(LedgerError::Unauthorized);
        }
        Ok(())
    }

    /// Record `id` if it can still be finalized.
    ///
    /// Runs before any entitlement check so a finalized record always
    /// reports `AlreadyUsed`.
    pub(crate) fn active_record(&self, id: DepositId) -> Result<DepositRecord, LedgerError> {
        let record = self
            .store
            .history(id)
            .ok_or(StoreError::NotFound { id })?;
        if record.used {
            return Err(StoreError::AlreadyUsed { id }.into());
        }
        if record.yield_amount == 0 {
            return Err(StoreError::NotFound { id }.into());
        }
        Ok(record.clone())
    }

    // ───────────────────────── Admin Configuration ─────────────────────────

    /// Set the default adapter delegate. Admin-only.
    pub fn set_lending_delegate(
        &mut self,
        caller: &Address,
        delegate: Address,
    ) -> Result<(), LedgerError> {
        self.atomic(EntryPoint::Configure, |vault| {
            vault.ensure_admin(caller)?;
            let previous = vault.registry.set_default_delegate(&vault.host, delegate)?;
            vault.emit(LedgerEvent::LendingDelegateSet(LendingDelegateSet {
                previous,
                delegate,
            }));
            Ok(())
        })
    }

    /// Set the default yield target. Admin-only.
    pub fn set_lending_target(&mut self, caller: &Address, target: Address) -> Result<(), LedgerError> {
        self.atomic(EntryPoint::Configure, |vault| {
            vault.ensure_admin(caller)?;
            let previous = vault.registry.set_default_target(target)?;
            vault.emit(LedgerEvent::LendingTargetSet(LendingTargetSet { previous, target }));
            Ok(())
        })
    }

    /// Route `asset` through its own delegate and target. Admin-only.
    pub fn set_token_config(
        &mut self,
        caller: &Address,
        asset: Address,
        delegate: Address,
        target: Address,
        asset_key: impl Into<String>,
    ) -> Result<(), LedgerError> {
        let asset_key = asset_key.into();
        self.atomic(EntryPoint::Configure, |vault| {
            vault.ensure_admin(caller)?;
            let route = AdapterRoute {
                delegate,
                target,
                asset_key: asset_key.clone(),
            };
            vault.registry.set_token_config(&vault.host, asset, route)?;
            vault.emit(LedgerEvent::TokenConfigSet(TokenConfigSet {
                asset,
                delegate,
                target,
                asset_key,
            }));
            Ok(())
        })
    }

    /// Allow or disallow an adapter delegate. Admin-only.
    pub fn set_delegate_whitelist(
        &mut self,
        caller: &Address,
        delegate: Address,
        allowed: bool,
    ) -> Result<(), LedgerError> {
        self.atomic(EntryPoint::Configure, |vault| {
            vault.ensure_admin(caller)?;
            vault.registry.set_whitelisted(delegate, allowed)?;
            vault.emit(LedgerEvent::DelegateWhitelistUpdated(DelegateWhitelistUpdated {
                delegate,
                allowed,
            }));
            Ok(())
        })
    }

    /// Turn delegate whitelisting on or off. Admin-only.
    pub fn set_whitelist_enabled(&mut self, caller: &Address, enabled: bool) -> Result<(), LedgerError> {
        self.atomic(EntryPoint::Configure, |vault| {
            vault.ensure_admin(caller)?;
            vault.registry.set_whitelist_enabled(enabled);
            vault.config.whitelist_enabled = enabled;
            vault.emit(LedgerEvent::WhitelistModeSet(WhitelistModeSet { enabled }));
            Ok(())
        })
    }

    /// Change the recovery delay. Takes effect immediately, including for
    /// existing records. Admin-only.
    pub fn set_recovery_delay(&mut self, caller: &Address, delay_secs: i64) -> Result<(), LedgerError> {
        self.atomic(EntryPoint::Configure, |vault| {
            vault.ensure_admin(caller)?;
            let delay_secs = validate_delay("recovery_delay", delay_secs)?;
            let previous = std::mem::replace(&mut vault.config.recovery_delay_secs, delay_secs);
            warn!(previous, delay_secs, "recovery delay changed");
            vault.emit(LedgerEvent::RecoveryDelaySet(RecoveryDelaySet {
                previous,
                delay_secs,
            }));
            Ok(())
        })
    }

    /// Change the emergency withdrawal delay. Takes effect immediately,
    /// including for pending requests. Admin-only.
    pub fn set_emergency_withdraw_delay(
        &mut self,
        caller: &Address,
        delay_secs: i64,
    ) -> Result<(), LedgerError> {
        self.atomic(EntryPoint::Configure, |vault| {
            vault.ensure_admin(caller)?;
            let delay_secs = validate_delay("emergency_withdraw_delay", delay_secs)?;
            let previous =
                std::mem::replace(&mut vault.config.emergency_withdraw_delay_secs, delay_secs);
            warn!(previous, delay_secs, "emergency withdraw delay changed");
            vault.emit(LedgerEvent::EmergencyWithdrawDelaySet(EmergencyWithdrawDelaySet {
                previous,
                delay_secs,
            }));
            Ok(())
        })
    }

    /// Hand administration to `new_admin`. Admin-only.
    pub fn transfer_admin(&mut self, caller: &Address, new_admin: Address) -> Result<(), LedgerError> {
        self.atomic(EntryPoint::Configure, |vault| {
            vault.ensure_admin(caller)?;
            if new_admin.is_zero() {
                return Err(LedgerError::ZeroAddress { field: "admin" });
            }
            let previous = *vault.access_control.admin();
            if !vault.access_control.transfer_admin(caller, new_admin) {
                return Err(LedgerError::Unauthorized);
            }
            warn!(%previous, admin = %new_admin, "admin transferred");
            vault.emit(LedgerEvent::AdminTransferred(AdminTransferred {
                previous,
                admin: new_admin,
            }));
            Ok(())
        })
    }

    // ───────────────────────── Queries ─────────────────────────

    /// Active record by id; finalized and unknown ids read as absent.
    pub fn get_deposit(&self, id: DepositId) -> Option<&DepositRecord> {
        self.store.get(id)
    }

    /// Record by id in whatever state it is in.
    pub fn deposit_history(&self, id: DepositId) -> Option<&DepositRecord> {
        self.store.history(id)
    }

    /// Active records owed to `recipient`.
    ///
    /// Depositor identity and deposit time are withheld unless `caller` is
    /// `recipient`.
    pub fn get_claimable_deposits(
        &self,
        recipient: &Address,
        caller: &Address,
    ) -> Vec<ClaimableDeposit> {
        let disclose = !recipient.is_zero() && recipient == caller;
        self.store
            .list_active_by_recipient(recipient)
            .into_iter()
            .filter_map(|id| self.store.get(id))
            .map(|record| ClaimableDeposit {
                id: record.id,
                depositor: disclose.then_some(record.depositor),
                deposit_time: disclose.then_some(record.deposit_time),
                yield_amount: record.yield_amount,
                yield_asset: record.yield_asset,
                underlying_asset: record.underlying_asset,
            })
            .collect()
    }

    pub fn list_active_by_depositor(&self, depositor: &Address) -> Vec<DepositId> {
        self.store.list_active_by_depositor(depositor)
    }

    pub fn list_active_by_recipient(&self, recipient: &Address) -> Vec<DepositId> {
        self.store.list_active_by_recipient(recipient)
    }

    /// Amount of `asset` in custody owed to active records.
    pub fn reserved_balance(&self, asset: &Address) -> u128 {
        self.store.reserved(asset)
    }

    /// Estimated underlying value of an active record.
    pub fn try_underlying_amount(&self, id: DepositId) -> Result<u128, LedgerError> {
        let record = self.store.get(id).ok_or(StoreError::NotFound { id })?;
        let (route, adapter) = self
            .registry
            .resolve_adapter(&self.host, &record.underlying_asset)?;
        let estimate = adapter.estimate_underlying(
            &self.host,
            &record.yield_asset,
            record.yield_amount,
            &route.target,
        )?;
        Ok(estimate)
    }

    /// Estimated underlying value of an active record, or 0 when it cannot
    /// be computed.
    pub fn get_underlying_amount(&self, id: DepositId) -> u128 {
        self.try_underlying_amount(id).unwrap_or(0)
    }

    /// Same as [`get_underlying_amount`](Self::get_underlying_amount), but
    /// failures are logged.
    pub fn get_underlying_amount_logged(&self, id: DepositId) -> u128 {
        match self.try_underlying_amount(id) {
            Ok(amount) => amount,
            Err(err) => {
                warn!(deposit_id = %id, error = %err, "underlying estimate unavailable");
                0
            }
        }
    }

    pub fn recovery_delay(&self) -> i64 {
        self.config.recovery_delay_secs
    }

    pub fn emergency_withdraw_delay(&self) -> i64 {
        self.config.emergency_withdraw_delay_secs
    }

    pub fn route_for(&self, asset: &Address) -> Option<AdapterRoute> {
        self.registry.route_for(asset)
    }

    pub fn is_delegate_whitelisted(&self, delegate: &Address) -> bool {
        self.registry.is_whitelisted(delegate)
    }

    pub fn whitelist_enabled(&self) -> bool {
        self.registry.whitelist_enabled()
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn admin(&self) -> &Address {
        self.access_control.admin()
    }

    pub fn custody(&self) -> &Address {
        &self.custody
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    /// Mutable host access for the environment driver (minting, deploying
    /// adapter code). Not a ledger operation.
    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    /// Check both active indices against the record store.
    pub fn verify_indices(&self) -> Result<(), LedgerError> {
        self.store.verify_indices().map_err(|err| {
            error!(error = %err, "active index check failed");
            LedgerError::from(err)
        })
    }

    pub fn events(&self) -> &[EventRecord] {
        &self.events
    }

    /// Take every published event, leaving the log empty.
    pub fn drain_events(&mut self) -> Vec<EventRecord> {
        std::mem::take(&mut self.events)
    }
}
