//! Kresko external collaborator layer.
//!
//! This crate provides the boundary the engine talks to:
//! - Oracle price feeds (8-decimal USD prices, market status, market prices)
//! - Token custody with atomic batch settlement and rebasing balances
//! - Rebase records shared by custody and accounting
//! - Timestamp sources

pub mod clock;
pub mod custody;
pub mod oracle;
pub mod rebase;

pub use clock::{Clock, ManualClock, SystemClock};
pub use custody::{CustodyError, TokenCustody, TokenOp, TokenVault};
pub use oracle::{InMemoryOracle, OracleError, PriceData, PriceOracle, PRICE_DECIMALS};
pub use rebase::{Rebase, RebaseError, Rounding, WAD};
