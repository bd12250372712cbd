//! Nullable infrastructure for deterministic testing.
//!
//! Every external dependency of the scheduler and the substrate (clock, gas
//! oracle, operation source, registry dispatch, mesh/reward collaborator) sits
//! behind a trait. This crate provides implementations that:
//! - Return deterministic values
//! - Can be controlled programmatically
//! - Record what they were asked to do
//! - Never touch the network
//!
//! Usage: swap real implementations for nullables in tests.

pub mod clock;
pub mod collaborator;
pub mod dispatcher;
pub mod oracle;
pub mod source;

pub use clock::NullClock;
pub use collaborator::{CollaboratorCall, NullCollaborator};
pub use dispatcher::NullDispatcher;
pub use oracle::NullGasOracle;
pub use source::NullSource;
