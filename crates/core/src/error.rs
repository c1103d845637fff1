//! Engine error types.
//!
//! Every failure rejects the whole operation; nothing is retried internally
//! and no partial state is committed.

use alloy::primitives::{Address, U256};
use kresko_chain::{CustodyError, OracleError, RebaseError};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KreskoError {
    // Input validation
    #[error("amount must be greater than zero")]
    ZeroAmount,

    #[error("asset {0} not found")]
    AssetNotFound(Address),

    #[error("asset {0} is disabled")]
    AssetDisabled(Address),

    #[error("asset {0} already exists")]
    AssetExists(Address),

    #[error("index {index} does not address {asset} (list length {len})")]
    IndexOutOfBounds {
        asset: Address,
        index: usize,
        len: usize,
    },

    #[error("amount {amount} exceeds position {available} of {asset}")]
    AmountExceedsPosition {
        asset: Address,
        amount: U256,
        available: U256,
    },

    #[error("account already holds the maximum of {max} positions")]
    TooManyPositions { max: usize },

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("invalid rebase: {0}")]
    InvalidRebase(#[from] RebaseError),

    // Economic floors
    #[error("position of {amount} {asset} is below the dust floor {minimum}")]
    AmountBelowDust {
        asset: Address,
        amount: U256,
        minimum: U256,
    },

    #[error("debt value {value} is below the minimum debt value {minimum}")]
    DebtBelowMinimum { value: U256, minimum: U256 },

    // Solvency
    #[error("collateral value {collateral_value} is below the required {required}")]
    InsufficientCollateral {
        collateral_value: U256,
        required: U256,
    },

    #[error("market for {0} is closed")]
    MarketClosed(Address),

    #[error("supply of {asset} would reach {new_supply}, above the limit {limit}")]
    SupplyLimitExceeded {
        asset: Address,
        new_supply: U256,
        limit: U256,
    },

    // Oracle
    #[error("price for {asset} is {age_secs}s old")]
    StalePrice { asset: Address, age_secs: u64 },

    #[error("invalid price for {0}")]
    InvalidPrice(Address),

    #[error("oracle error: {0}")]
    Oracle(#[from] OracleError),

    // Liquidation
    #[error("account is not liquidatable")]
    NotLiquidatable,

    #[error("nothing to seize")]
    NothingToSeize,

    #[error("seized amount {seized} exceeds the deposit {deposit}")]
    SeizeUnderflow { seized: U256, deposit: U256 },

    #[error("accounts cannot liquidate themselves")]
    SelfLiquidation,

    // Arithmetic
    #[error("arithmetic overflow")]
    MathOverflow,

    #[error("division by zero")]
    DivisionByZero,

    // Custody
    #[error("custody error: {0}")]
    Custody(#[from] CustodyError),
}

pub type Result<T> = std::result::Result<T, KreskoError>;
