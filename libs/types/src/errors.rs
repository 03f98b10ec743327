//! Error types for identifier parsing and amount arithmetic

use thiserror::Error;

/// Failure to parse an `Address` from its text form.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressParseError {
    #[error("Address must start with 0x: {input}")]
    MissingPrefix { input: String },

    #[error("Address must be 40 hex characters, got {len}")]
    InvalidLength { len: usize },

    #[error("Address contains non-hex characters: {input}")]
    InvalidHex { input: String },
}

/// Arithmetic failures on base-unit amounts.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AmountError {
    #[error("Arithmetic overflow")]
    Overflow,

    #[error("Division by zero")]
    DivisionByZero,

    #[error("Amount {amount} exceeds the record width limit {max}")]
    OutOfRange { amount: u128, max: u128 },
}
