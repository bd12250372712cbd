//! Fundamental types for the Keel treasury engine.
//!
//! This crate defines the core types shared across every other crate in the workspace:
//! addresses, amounts, timestamps and clocks, operation identifiers, the in-memory
//! asset book standing in for the external token, and the shared error taxonomy.

pub mod address;
pub mod amount;
pub mod asset;
pub mod error;
pub mod hash;
pub mod time;

pub use address::Address;
pub use amount::Amount;
pub use asset::TokenBook;
pub use error::{AddressError, AssetError, ErrorKind};
pub use hash::OperationId;
pub use time::{Clock, SystemClock, Timestamp, SECONDS_PER_DAY, SECONDS_PER_YEAR};
