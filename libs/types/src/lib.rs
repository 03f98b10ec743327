//! Types library for the yield escrow custody ledger
//!
//! This library provides the identifier and amount types shared by the
//! ledger crate and anything that consumes its events.
//!
//! # Version
//! v1.0.0
//!
//! # Modules
//! - `ids`: Identifiers (Address, DepositId)
//! - `numeric`: Base-unit amount arithmetic with 256-bit intermediates
//! - `errors`: Parse and arithmetic errors

// Public modules
pub mod ids;
pub mod numeric;
pub mod errors;

// Library version constant
pub const LIB_VERSION: &str = "1.0.0";

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::ids::*;
    pub use crate::numeric::*;
    pub use crate::errors::*;
}
