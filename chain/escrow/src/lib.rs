//! Yield Escrow Custody Ledger
//!
//! This crate implements the escrow layer: depositors hand an asset to the
//! ledger, it is converted into a yield-bearing asset by an external
//! adapter, and the result is held in custody split across recipients until
//! each share is claimed by its recipient or recovered by its depositor.
//!
//! # Modules
//! - `vault`: `EscrowVault` façade, atomic operation wrapper, admin configuration, queries
//! - `deposit`: Allocation validation, proportional splitting, deposit entry points
//! - `claim`: Claim and recover state machine
//! - `emergency`: Time-locked emergency withdrawal of unreserved custody balances
//! - `store`: Deposit records and active indices
//! - `registry`: Adapter routes, delegate whitelist, trust checks
//! - `host`, `adapter`: Execution environment and yield adapter interfaces
//! - `sim`: In-memory host and lending pool
//! - `config`, `events`, `errors`, `security`
//!
//! # Version
//! v0.1.0

pub mod adapter;
pub mod claim;
pub mod config;
pub mod deposit;
pub mod emergency;
pub mod errors;
pub mod events;
pub mod host;
pub mod registry;
pub mod security;
pub mod sim;
pub mod store;
pub mod vault;

pub use config::LedgerConfig;
pub use deposit::Allocation;
pub use errors::LedgerError;
pub use vault::EscrowVault;

/// Ledger event ABI version, frozen after release
pub const LEDGER_ABI_VERSION: &str = "1.0.0";
