//! Shared security primitives for the ledger
//!
//! Provides the per-entry-point in-flight guard and administrator access
//! control used by every mutating operation.

use std::collections::HashSet;
use std::fmt;
use types::ids::Address;

/// Mutating entry points protected by the in-flight guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryPoint {
    Deposit,
    DepositWithYieldAsset,
    Claim,
    Recover,
    RecoverAsUnderlying,
    Configure,
    RequestEmergencyWithdraw,
    ExecuteEmergencyWithdraw,
    CancelEmergencyWithdraw,
}

impl EntryPoint {
    pub fn name(&self) -> &'static str {
        match self {
            EntryPoint::Deposit => "deposit",
            EntryPoint::DepositWithYieldAsset => "deposit_with_yield_asset",
            EntryPoint::Claim => "claim",
            EntryPoint::Recover => "recover",
            EntryPoint::RecoverAsUnderlying => "recover_as_underlying",
            EntryPoint::Configure => "configure",
            EntryPoint::RequestEmergencyWithdraw => "request_emergency_withdraw",
            EntryPoint::ExecuteEmergencyWithdraw => "execute_emergency_withdraw",
            EntryPoint::CancelEmergencyWithdraw => "cancel_emergency_withdraw",
        }
    }
}

impl fmt::Display for EntryPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Reentrancy guard preventing nested calls into the same entry point.
///
/// An operation acquires the guard for its entry point before touching
/// state and releases it once its effects are committed or rolled back. A
/// nested call into an entry point that is still in flight fails.
#[derive(Debug, Clone, Default)]
pub struct ReentrancyGuard {
    in_flight: HashSet<EntryPoint>,
}

impl ReentrancyGuard {
    /// Create a new unlocked guard.
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the guard for `entry`. Returns `false` if it is already held
    /// (reentrancy attempt).
    pub fn acquire(&mut self, entry: EntryPoint) -> bool {
        self.in_flight.insert(entry)
    }

    /// Release the guard for `entry`.
    pub fn release(&mut self, entry: EntryPoint) {
        self.in_flight.remove(&entry);
    }

    /// Check if `entry` is currently in flight.
    pub fn is_locked(&self, entry: EntryPoint) -> bool {
        self.in_flight.contains(&entry)
    }

    /// True when no entry point is in flight.
    pub fn is_idle(&self) -> bool {
        self.in_flight.is_empty()
    }
}

/// Administrator access control.
#[derive(Debug, Clone)]
pub struct AccessControl {
    admin: Address,
}

impl AccessControl {
    /// Create access control with an initial admin.
    pub fn new(admin: Address) -> Self {
        Self { admin }
    }

    /// Check if a caller is admin.
    pub fn is_admin(&self, caller: &Address) -> bool {
        !caller.is_zero() && *caller == self.admin
    }

    /// Transfer admin to a new address. Fails for a non-admin caller or a
    /// null new admin.
    pub fn transfer_admin(&mut self, current_admin: &Address, new_admin: Address) -> bool {
        if !self.is_admin(current_admin) || new_admin.is_zero() {
            return false;
        }
        self.admin = new_admin;
        true
    }

    /// Get the current admin.
    pub fn admin(&self) -> &Address {
        &self.admin
    }
}
