//! Off-chain operation scheduler.
//!
//! Discovers candidate operations, queues them by priority, gates each on its
//! type's execution rule (enabled flag, minimum spacing, gas ceiling) and
//! dispatches the survivors to the operation registry. Failed dispatches are
//! retried with priority decay and exponential backoff; after the last
//! attempt they become permanent failures in the execution history.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod history;
pub mod oracle;
pub mod queue;
pub mod retry;
pub mod rules;
pub mod scheduler;
pub mod shutdown;
pub mod source;

pub use config::{GovernanceAddresses, SchedulerConfig};
pub use dispatch::{Execution, OperationDispatcher, RegistryDispatcher};
pub use error::{ConfigError, DispatchError, OracleError, SchedulerError};
pub use history::{ExecutionHistory, ExecutionRecord};
pub use oracle::{FixedGasOracle, GasOracle, RpcGasOracle};
pub use queue::{OperationQueue, QueueStatus, QueuedOperation};
pub use retry::{RetryOutcome, RetryPolicy, RetryState};
pub use rules::{ExecutionRule, RuleOverride, RuleSet, GWEI};
pub use scheduler::{Gate, OperationScheduler, SchedulerStatus, TickReport};
pub use shutdown::ShutdownController;
pub use source::{Candidate, ChannelSource, OperationSource};
