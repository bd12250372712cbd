//! The operation scheduler: a monitoring loop that fills the queue and an
//! execution loop that drains it, sharing one lock.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use keel_governance::OperationType;
use keel_types::{Clock, ErrorKind, OperationId, Timestamp};
use keel_utils::time::format_interval;
use keel_utils::StatsCounter;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::config::SchedulerConfig;
use crate::dispatch::OperationDispatcher;
use crate::error::{DispatchError, OracleError, SchedulerError};
use crate::history::{ExecutionHistory, ExecutionRecord};
use crate::oracle::GasOracle;
use crate::queue::{OperationQueue, QueueStatus, QueuedOperation};
use crate::retry::{RetryOutcome, RetryPolicy, RetryState};
use crate::rules::RuleSet;
use crate::shutdown::ShutdownController;
use crate::source::{Candidate, OperationSource};

/// Timeout for loop tasks to finish once shutdown is signalled.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

const COUNTERS: &[&str] = &[
    "enqueued",
    "duplicates",
    "rejected",
    "dispatched",
    "succeeded",
    "deferred",
    "retried",
    "failed",
];

/// Why an item was or was not dispatched this tick.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Gate {
    Ready,
    Disabled,
    BackingOff { until: Timestamp },
    TooSoon { wait_secs: u64 },
    GasTooHigh { price: u128, ceiling: u128 },
    OracleUnavailable(String),
}

/// What one execution tick did.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct TickReport {
    pub taken: usize,
    pub succeeded: usize,
    pub deferred: usize,
    pub retried: usize,
    pub failed: usize,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SchedulerStatus {
    pub running: bool,
    pub queue_length: usize,
    pub in_flight: usize,
    pub history_size: usize,
    pub execution_interval_ms: u64,
    pub counters: BTreeMap<&'static str, u64>,
}

enum Outcome {
    Succeeded,
    Retried,
    Failed,
}

#[derive(Default)]
struct State {
    queue: OperationQueue,
    /// Taken by the current execution tick, not yet resolved.
    in_flight: HashSet<OperationId>,
    history: ExecutionHistory,
    last_success: HashMap<OperationType, Timestamp>,
    nonce: u64,
}

struct Core {
    config: SchedulerConfig,
    rules: RuleSet,
    retry: RetryPolicy,
    state: Mutex<State>,
    source: Arc<dyn OperationSource>,
    oracle: Arc<dyn GasOracle>,
    dispatcher: Arc<dyn OperationDispatcher>,
    clock: Arc<dyn Clock>,
    stats: StatsCounter,
    running: AtomicBool,
}

/// Queues, gates, dispatches and retries privileged operations.
///
/// Queue and history live in memory behind a single async mutex. The
/// monitoring and execution loops are independent tasks; the lock is never
/// held across a dispatch, so a slow execution does not stall monitoring.
pub struct OperationScheduler {
    core: Arc<Core>,
    shutdown: ShutdownController,
    handles: Vec<JoinHandle<()>>,
}

impl OperationScheduler {
    pub fn new(
        config: SchedulerConfig,
        source: Arc<dyn OperationSource>,
        oracle: Arc<dyn GasOracle>,
        dispatcher: Arc<dyn OperationDispatcher>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, SchedulerError> {
        let rules = config.rule_set()?;
        let retry = config.retry_policy();
        Ok(Self {
            core: Arc::new(Core {
                config,
                rules,
                retry,
                state: Mutex::new(State::default()),
                source,
                oracle,
                dispatcher,
                clock,
                stats: StatsCounter::new(COUNTERS),
                running: AtomicBool::new(false),
            }),
            shutdown: ShutdownController::new(),
            handles: Vec::new(),
        })
    }

    /// Validate the configuration and spawn the monitoring, execution and
    /// status loops.
    pub fn start(&mut self) -> Result<(), SchedulerError> {
        if self.core.running.swap(true, Ordering::SeqCst) {
            return Err(SchedulerError::AlreadyRunning);
        }
        let addresses = match self.core.config.validate() {
            Ok(addresses) => addresses,
            Err(e) => {
                self.core.running.store(false, Ordering::SeqCst);
                tracing::error!(error = %e, "scheduler configuration invalid");
                return Err(e.into());
            }
        };

        let config = &self.core.config;
        tracing::info!(
            safe = %addresses.safe,
            safe_manager = %addresses.safe_manager,
            execution_interval = %format_interval(config.execution_interval()),
            monitor_interval = %format_interval(config.monitor_interval()),
            max_batch_size = config.max_batch_size,
            max_attempts = config.max_attempts,
            "operation scheduler starting"
        );
        tracing::warn!("operation queue and execution history are held in memory only and are lost on restart");

        let monitor = self.spawn_loop("monitor", config.monitor_interval(), |core| async move {
            if let Err(e) = core.monitor_tick().await {
                tracing::warn!(error = %e, "monitoring tick failed");
            }
        });
        let execute = self.spawn_loop("execute", config.execution_interval(), |core| async move {
            core.execute_tick().await;
        });
        let status = self.spawn_loop("status", config.status_interval(), |core| async move {
            core.log_status().await;
        });
        self.handles.extend([monitor, execute, status]);
        Ok(())
    }

    fn spawn_loop<F, Fut>(&self, name: &'static str, period: Duration, tick: F) -> JoinHandle<()>
    where
        F: Fn(Arc<Core>) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let core = Arc::clone(&self.core);
        let mut shutdown_rx = self.shutdown.subscribe();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.recv() => {
                        tracing::info!(task = name, "scheduler loop shutting down");
                        break;
                    }
                    _ = interval.tick() => {
                        tick(Arc::clone(&core)).await;
                    }
                }
            }
        })
    }

    /// Signal every loop and wait for them to finish. In-flight dispatches
    /// complete first.
    pub async fn stop(&mut self) -> Result<(), SchedulerError> {
        if !self.core.running.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        tracing::info!("operation scheduler stopping");
        self.shutdown.shutdown();

        let handles: Vec<JoinHandle<()>> = self.handles.drain(..).collect();
        let wait_all = async {
            for handle in handles {
                let _ = handle.await;
            }
        };
        if tokio::time::timeout(SHUTDOWN_TIMEOUT, wait_all).await.is_err() {
            tracing::warn!("scheduler loops did not stop in time");
            return Err(SchedulerError::ShutdownTimeout);
        }

        let status = self.core.status().await;
        tracing::info!(
            queue_length = status.queue_length,
            history_size = status.history_size,
            "operation scheduler stopped"
        );
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.core.running.load(Ordering::SeqCst)
    }

    /// Poll the source once and queue what it returned.
    pub async fn monitor_tick(&self) -> Result<usize, SchedulerError> {
        self.core.monitor_tick().await
    }

    /// Run one execution pass over the queue.
    pub async fn execute_tick(&self) -> TickReport {
        self.core.execute_tick().await
    }

    /// Queue one candidate directly. `None` if it was a duplicate or malformed.
    pub async fn enqueue(&self, candidate: Candidate) -> Option<OperationId> {
        let now = self.core.clock.now();
        let mut state = self.core.state.lock().await;
        self.core.admit(&mut state, candidate, now)
    }

    pub async fn status(&self) -> SchedulerStatus {
        self.core.status().await
    }

    pub async fn queue_status(&self) -> QueueStatus {
        self.core.state.lock().await.queue.status()
    }

    pub async fn history(&self, id: &OperationId) -> Option<ExecutionRecord> {
        self.core.state.lock().await.history.get(id).cloned()
    }

    pub async fn history_len(&self) -> usize {
        self.core.state.lock().await.history.len()
    }

    pub async fn failures(&self) -> Vec<ExecutionRecord> {
        self.core.state.lock().await.history.failures().cloned().collect()
    }
}

impl Core {
    async fn monitor_tick(&self) -> Result<usize, SchedulerError> {
        let candidates = self.source.poll().await?;
        if candidates.is_empty() {
            return Ok(0);
        }
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        let seen = candidates.len();
        let added = candidates
            .into_iter()
            .filter_map(|c| self.admit(&mut state, c, now))
            .count();
        tracing::debug!(seen, added, queue_length = state.queue.len(), "monitoring tick");
        Ok(added)
    }

    fn admit(&self, state: &mut State, candidate: Candidate, now: Timestamp) -> Option<OperationId> {
        let op_type = candidate.kind.op_type();
        if let Err(e) = candidate.kind.validate() {
            tracing::warn!(%op_type, error = %e, "rejecting malformed candidate");
            self.stats.increment("rejected");
            return None;
        }

        let observed_at = candidate.observed_at.unwrap_or(now);
        let (origin, nonce): (&[u8], u64) = match candidate.nonce {
            Some(nonce) => (b"source", nonce),
            None => {
                state.nonce += 1;
                (b"local", state.nonce)
            }
        };
        let id = OperationId::derive(&[
            op_type.as_str().as_bytes(),
            &observed_at.as_secs().to_le_bytes(),
            origin,
            &nonce.to_le_bytes(),
        ]);
        if state.queue.contains(&id) || state.in_flight.contains(&id) || state.history.get(&id).is_some() {
            tracing::debug!(id = %id.short(), %op_type, "duplicate candidate skipped");
            self.stats.increment("duplicates");
            return None;
        }

        let priority = candidate
            .priority
            .unwrap_or_else(|| self.rules.rule_for(op_type).priority);
        let description = candidate
            .description
            .unwrap_or_else(|| candidate.kind.describe());
        let op = QueuedOperation {
            id,
            kind: candidate.kind,
            target: candidate.target,
            description,
            enqueued_at: now,
            retry: RetryState::fresh(priority, now),
            registry_id: None,
        };
        let priority = op.priority();
        state.queue.push(op);
        self.stats.increment("enqueued");
        tracing::info!(id = %id.short(), %op_type, priority, "operation queued");
        Some(id)
    }

    async fn execute_tick(&self) -> TickReport {
        let batch = {
            let mut state = self.state.lock().await;
            let batch = state.queue.pop_batch(self.config.max_batch_size);
            for op in &batch {
                state.in_flight.insert(op.id);
            }
            batch
        };
        let mut report = TickReport {
            taken: batch.len(),
            ..Default::default()
        };
        if batch.is_empty() {
            return report;
        }
        tracing::info!(batch = batch.len(), "processing operation queue");

        // One oracle query per tick, made only if some item needs it.
        let mut gas_price = None;
        for op in batch {
            let now = self.clock.now();
            let gate = self.gate(&op, now, &mut gas_price).await;
            if gate != Gate::Ready {
                tracing::debug!(id = %op.id.short(), op_type = %op.op_type(), ?gate, "operation deferred");
                self.requeue(op).await;
                self.stats.increment("deferred");
                report.deferred += 1;
                continue;
            }
            match self.dispatch(op).await {
                Outcome::Succeeded => report.succeeded += 1,
                Outcome::Retried => report.retried += 1,
                Outcome::Failed => report.failed += 1,
            }
        }

        tracing::info!(
            succeeded = report.succeeded,
            taken = report.taken,
            deferred = report.deferred,
            retried = report.retried,
            failed = report.failed,
            "batch execution finished"
        );
        report
    }

    async fn gate(
        &self,
        op: &QueuedOperation,
        now: Timestamp,
        gas_price: &mut Option<Result<u128, OracleError>>,
    ) -> Gate {
        let op_type = op.op_type();
        let rule = self.rules.rule_for(op_type);
        if !rule.enabled {
            return Gate::Disabled;
        }
        if !op.retry.is_eligible(now) {
            return Gate::BackingOff {
                until: op.retry.next_eligible_at,
            };
        }
        let last_success = self.state.lock().await.last_success.get(&op_type).copied();
        if let Some(wait_secs) = rule.wait_remaining(last_success, now) {
            return Gate::TooSoon { wait_secs };
        }
        let Some(ceiling) = rule.max_gas_price_wei() else {
            return Gate::Ready;
        };
        let price = match gas_price {
            Some(cached) => cached.clone(),
            None => {
                let fetched = self.oracle.gas_price().await;
                if let Err(e) = &fetched {
                    tracing::warn!(error = %e, "gas price unavailable, deferring gas-limited operations");
                }
                *gas_price = Some(fetched.clone());
                fetched
            }
        };
        match price {
            Ok(price) if price > ceiling => Gate::GasTooHigh { price, ceiling },
            Ok(_) => Gate::Ready,
            Err(e) => Gate::OracleUnavailable(e.to_string()),
        }
    }

    async fn requeue(&self, op: QueuedOperation) {
        let mut state = self.state.lock().await;
        state.in_flight.remove(&op.id);
        state.queue.push(op);
    }

    async fn dispatch(&self, mut op: QueuedOperation) -> Outcome {
        self.stats.increment("dispatched");
        tracing::info!(
            id = %op.id.short(),
            op_type = %op.op_type(),
            attempt = op.retry.attempts + 1,
            "executing operation"
        );

        let registry_id = match op.registry_id {
            Some(id) => id,
            None => match self.dispatcher.propose(&op).await {
                Ok(id) => {
                    tracing::info!(id = %op.id.short(), registry_id = %id.short(), "operation proposed");
                    op.registry_id = Some(id);
                    id
                }
                Err(e) => return self.fail(op, e).await,
            },
        };

        match self.dispatcher.execute(&registry_id).await {
            Ok(execution) => self.succeed(op, execution.gas_used).await,
            Err(e) if e.kind == ErrorKind::AlreadyExecuted => {
                tracing::info!(id = %op.id.short(), "operation already executed, counting as success");
                self.succeed(op, 0).await
            }
            Err(e) => self.fail(op, e).await,
        }
    }

    async fn succeed(&self, op: QueuedOperation, gas_used: u64) -> Outcome {
        let now = self.clock.now();
        let op_type = op.op_type();
        let mut state = self.state.lock().await;
        state.in_flight.remove(&op.id);
        state.last_success.insert(op_type, now);
        state.history.record(ExecutionRecord {
            id: op.id,
            op_type,
            success: true,
            timestamp: now,
            gas_used,
            attempts: op.retry.attempts + 1,
            error: None,
            registry_id: op.registry_id,
        });
        self.stats.increment("succeeded");
        tracing::info!(id = %op.id.short(), %op_type, gas_used, "operation executed");
        Outcome::Succeeded
    }

    async fn fail(&self, mut op: QueuedOperation, error: DispatchError) -> Outcome {
        let now = self.clock.now();
        let op_type = op.op_type();
        match self.retry.after_error(op.retry, error.kind, now) {
            RetryOutcome::Retry(next) => {
                tracing::warn!(
                    id = %op.id.short(),
                    %op_type,
                    error = %error,
                    kind = error.kind.as_str(),
                    attempt = next.attempts,
                    max_attempts = self.retry.max_attempts,
                    priority = next.priority,
                    next_eligible_at = %next.next_eligible_at,
                    "operation failed, requeued"
                );
                op.retry = next;
                self.requeue(op).await;
                self.stats.increment("retried");
                Outcome::Retried
            }
            RetryOutcome::Exhausted { attempts } => {
                tracing::error!(
                    id = %op.id.short(),
                    %op_type,
                    error = %error,
                    kind = error.kind.as_str(),
                    attempts,
                    "operation permanently failed"
                );
                let mut state = self.state.lock().await;
                state.in_flight.remove(&op.id);
                state.history.record(ExecutionRecord {
                    id: op.id,
                    op_type,
                    success: false,
                    timestamp: now,
                    gas_used: 0,
                    attempts,
                    error: Some(error.to_string()),
                    registry_id: op.registry_id,
                });
                self.stats.increment("failed");
                Outcome::Failed
            }
        }
    }

    async fn status(&self) -> SchedulerStatus {
        let state = self.state.lock().await;
        SchedulerStatus {
            running: self.running.load(Ordering::SeqCst),
            queue_length: state.queue.len(),
            in_flight: state.in_flight.len(),
            history_size: state.history.len(),
            execution_interval_ms: self.config.execution_interval_ms,
            counters: self.stats.snapshot(),
        }
    }

    async fn log_status(&self) {
        let status = self.status().await;
        let queue = self.state.lock().await.queue.status();
        tracing::info!(
            running = status.running,
            queue_length = status.queue_length,
            in_flight = status.in_flight,
            history_size = status.history_size,
            succeeded = status.counters.get("succeeded").copied().unwrap_or(0),
            failed = status.counters.get("failed").copied().unwrap_or(0),
            by_type = ?queue.by_type,
            by_priority = ?queue.by_priority,
            "scheduler status"
        );
    }
}
