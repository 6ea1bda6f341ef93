//! Child and token budgets for recursive exploration.
//!
//! A [`BudgetStore`] bounds how many children an exploration tree may spawn
//! and how many tokens it may spend. All reservations are processed by one
//! worker task per store, so concurrent callers can never over-allocate:
//! ten tasks each asking for one child against a cap of five are granted
//! exactly five between them.
//!
//! Children do not get their own store; they draw from the parent's.

pub mod error;
pub mod state;
pub mod store;

pub use error::{BudgetError, BudgetResult};
pub use state::{BudgetState, Reservation};
pub use store::BudgetStore;
