//! Data models for backend resources.
//!
//! - `Profile`: the signed-in user's profile
//! - `BillPreferences`: reminder settings for recurring bills
//! - `Goal`: savings goals
//! - `BankTransaction`: transactions imported from linked bank accounts

pub mod account;
pub mod transaction;

pub use account::{BillPreferences, Goal, Profile};
pub use transaction::{BankTransaction, CategorizedTransaction};
