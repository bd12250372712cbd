//! Scheduler tests against nullables and an in-process substrate.

use std::sync::Arc;
use std::time::Duration;

use keel_governance::{
    MeshClaim, OperationKind, OperationRegistry, OperationStatus, StakeDeposit, StakeWithdraw,
    Substrate,
};
use keel_nullables::{NullClock, NullCollaborator, NullDispatcher, NullGasOracle, NullSource};
use keel_scheduler::{
    Candidate, DispatchError, OperationScheduler, RegistryDispatcher, SchedulerConfig,
};
use keel_stake::StakeLedger;
use keel_treasury::TreasuryGuard;
use keel_types::{Address, Amount, ErrorKind, TokenBook};

const SAFE: Address = Address::repeat(0x5a);
const REGISTRY: Address = Address::repeat(0x6e);
const LEDGER: Address = Address::repeat(0x5e);
const MESH: Address = Address::repeat(0x33);
const START: u64 = 1_700_000_000;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn config() -> SchedulerConfig {
    SchedulerConfig {
        safe_address: Some(SAFE),
        safe_manager_address: Some(REGISTRY),
        retry_backoff_ms: 30_000,
        ..Default::default()
    }
}

struct Harness {
    scheduler: OperationScheduler,
    clock: Arc<NullClock>,
    source: Arc<NullSource>,
    oracle: Arc<NullGasOracle>,
    dispatcher: Arc<NullDispatcher>,
}

fn harness_with(config: SchedulerConfig, dispatcher: NullDispatcher) -> Harness {
    let clock = Arc::new(NullClock::new(START));
    let source = Arc::new(NullSource::new());
    let oracle = Arc::new(NullGasOracle::gwei(1));
    let dispatcher = Arc::new(dispatcher);
    let scheduler = OperationScheduler::new(
        config,
        source.clone(),
        oracle.clone(),
        dispatcher.clone(),
        clock.clone(),
    )
    .expect("valid config");
    Harness {
        scheduler,
        clock,
        source,
        oracle,
        dispatcher,
    }
}

fn harness() -> Harness {
    harness_with(config(), NullDispatcher::new())
}

fn claim(mesh: &str) -> Candidate {
    Candidate::new(
        OperationKind::MeshClaim(MeshClaim {
            mesh_id: mesh.into(),
            auto_swap: 0,
        }),
        MESH,
    )
}

fn withdraw() -> Candidate {
    Candidate::new(
        OperationKind::StakeWithdraw(StakeWithdraw { early: false }),
        LEDGER,
    )
}

fn stake(tokens: u128, term_days: u64) -> Candidate {
    Candidate::new(
        OperationKind::Stake(StakeDeposit {
            amount: Amount::tokens(tokens),
            term_days,
        }),
        LEDGER,
    )
}

fn substrate(registry_funds: u128) -> Substrate {
    let mut tokens = TokenBook::new();
    tokens.mint(&REGISTRY, Amount::tokens(registry_funds)).unwrap();
    Substrate::new(
        tokens,
        StakeLedger::new(LEDGER, Address::repeat(0xfd), SAFE, 1_000),
        TreasuryGuard::new(Address::repeat(0x7e), Address::repeat(0x0a), SAFE),
        OperationRegistry::new(REGISTRY, SAFE),
        Box::new(NullCollaborator::new()),
    )
}

// ---------------------------------------------------------------------------
// Monitoring and execution
// ---------------------------------------------------------------------------

#[tokio::test]
async fn monitored_candidates_are_executed_highest_priority_first() {
    let h = harness();
    h.source.push_batch(vec![withdraw(), claim("E1N1")]);

    assert_eq!(h.scheduler.monitor_tick().await.unwrap(), 2);
    let queue = h.scheduler.queue_status().await;
    assert_eq!(queue.total, 2);
    assert_eq!(queue.by_priority[&8], 1);
    assert_eq!(queue.by_priority[&7], 1);

    let report = h.scheduler.execute_tick().await;
    assert_eq!(report.succeeded, 2);
    let proposed: Vec<_> = h.dispatcher.proposals().into_iter().map(|(_, t)| t).collect();
    assert_eq!(
        proposed,
        vec![
            keel_governance::OperationType::MeshClaim,
            keel_governance::OperationType::StakeWithdraw
        ]
    );
    assert_eq!(h.scheduler.history_len().await, 2);
    assert_eq!(h.scheduler.status().await.queue_length, 0);
}

#[tokio::test]
async fn empty_poll_adds_nothing() {
    let h = harness();
    assert_eq!(h.scheduler.monitor_tick().await.unwrap(), 0);
    assert_eq!(h.scheduler.execute_tick().await.taken, 0);
}

#[tokio::test]
async fn batch_size_caps_each_tick() {
    let config = SchedulerConfig {
        max_batch_size: 2,
        ..config()
    };
    let h = harness_with(config, NullDispatcher::new());
    h.source.push_batch(vec![claim("A"), withdraw(), stake(1, 1)]);
    h.scheduler.monitor_tick().await.unwrap();

    assert_eq!(h.scheduler.execute_tick().await.taken, 2);
    assert_eq!(h.scheduler.status().await.queue_length, 1);
}

#[tokio::test]
async fn oracle_outage_defers_until_it_recovers() {
    let h = harness();
    h.scheduler.enqueue(claim("E1N1")).await.unwrap();
    h.scheduler.enqueue(claim("E2N2")).await.unwrap();
    h.oracle.set_unavailable(true);

    let report = h.scheduler.execute_tick().await;
    assert_eq!(report.deferred, 2);
    // Queried once for the whole tick.
    assert_eq!(h.oracle.queries(), 1);
    assert_eq!(h.scheduler.history_len().await, 0);
    assert!(h.dispatcher.proposals().is_empty());

    h.oracle.set_unavailable(false);
    assert_eq!(h.scheduler.execute_tick().await.succeeded, 1);
}

#[tokio::test]
async fn already_executed_counts_as_success() {
    let h = harness();
    h.dispatcher.fail_next_execution_with(DispatchError::new(
        ErrorKind::AlreadyExecuted,
        "operation already executed",
    ));
    let id = h.scheduler.enqueue(withdraw()).await.unwrap();

    assert_eq!(h.scheduler.execute_tick().await.succeeded, 1);
    let record = h.scheduler.history(&id).await.unwrap();
    assert!(record.success);
    assert_eq!(record.gas_used, 0);
}

#[tokio::test]
async fn retries_decay_priority_and_end_in_permanent_failure() {
    let h = harness();
    h.dispatcher.fail_next_executions(3, "execution reverted");
    let id = h.scheduler.enqueue(claim("E1N1")).await.unwrap();

    assert_eq!(h.scheduler.execute_tick().await.retried, 1);
    assert_eq!(h.scheduler.queue_status().await.by_priority[&7], 1);

    h.clock.advance(30);
    assert_eq!(h.scheduler.execute_tick().await.retried, 1);
    assert_eq!(h.scheduler.queue_status().await.by_priority[&6], 1);

    h.clock.advance(60);
    assert_eq!(h.scheduler.execute_tick().await.failed, 1);

    let failures = h.scheduler.failures().await;
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].id, id);
    assert_eq!(failures[0].attempts, 3);
    assert_eq!(h.dispatcher.proposals().len(), 1);
    assert_eq!(h.dispatcher.executions().len(), 3);
    assert_eq!(h.scheduler.status().await.counters["failed"], 1);
}

#[tokio::test]
async fn failed_proposal_is_retried_as_a_proposal() {
    let h = harness();
    h.dispatcher.fail_next_proposal("rpc unavailable");
    h.scheduler.enqueue(withdraw()).await.unwrap();

    assert_eq!(h.scheduler.execute_tick().await.retried, 1);
    assert!(h.dispatcher.proposals().is_empty());

    h.clock.advance(30);
    assert_eq!(h.scheduler.execute_tick().await.succeeded, 1);
    assert_eq!(h.dispatcher.proposals().len(), 1);
}

#[tokio::test]
async fn disabled_rule_holds_items_in_the_queue() {
    let mut config = config();
    config.rules.insert(
        "MESH_CLAIM".into(),
        keel_scheduler::RuleOverride {
            enabled: Some(false),
            ..Default::default()
        },
    );
    let h = harness_with(config, NullDispatcher::new());
    h.scheduler.enqueue(claim("E1N1")).await.unwrap();

    assert_eq!(h.scheduler.execute_tick().await.deferred, 1);
    assert_eq!(h.scheduler.status().await.queue_length, 1);
}

// ---------------------------------------------------------------------------
// Against the in-process registry
// ---------------------------------------------------------------------------

#[tokio::test]
async fn registry_dispatch_stakes_through_the_ledger() {
    let clock = Arc::new(NullClock::new(START));
    let shared = Arc::new(tokio::sync::Mutex::new(substrate(1_000)));
    let dispatcher = Arc::new(RegistryDispatcher::new(shared.clone(), SAFE, clock.clone()));
    let scheduler = OperationScheduler::new(
        config(),
        Arc::new(NullSource::new()),
        Arc::new(NullGasOracle::gwei(1)),
        dispatcher,
        clock.clone(),
    )
    .unwrap();

    let id = scheduler.enqueue(stake(100, 30)).await.unwrap();
    assert_eq!(scheduler.execute_tick().await.succeeded, 1);

    let record = scheduler.history(&id).await.unwrap();
    let registry_id = record.registry_id.expect("proposed");
    let substrate = shared.lock().await;
    let op = substrate.registry().operation(&registry_id).unwrap();
    assert_eq!(op.status(), OperationStatus::Executed);
    assert_eq!(op.description, "Stake 100000000000000000000 tokens for 30 days");
    assert_eq!(op.proposer, SAFE);
    assert!(substrate.ledger().position(&REGISTRY).is_some());
    assert_eq!(substrate.tokens().balance_of(&REGISTRY), Amount::tokens(900));
}

#[tokio::test]
async fn reverted_execution_is_retried_without_reproposing() {
    let clock = Arc::new(NullClock::new(START));
    let shared = Arc::new(tokio::sync::Mutex::new(substrate(10)));
    let dispatcher = Arc::new(RegistryDispatcher::new(shared.clone(), SAFE, clock.clone()));
    let scheduler = OperationScheduler::new(
        config(),
        Arc::new(NullSource::new()),
        Arc::new(NullGasOracle::gwei(1)),
        dispatcher,
        clock.clone(),
    )
    .unwrap();

    let id = scheduler.enqueue(stake(100, 30)).await.unwrap();
    assert_eq!(scheduler.execute_tick().await.retried, 1);
    {
        let substrate = shared.lock().await;
        assert_eq!(substrate.registry().operation_count(), 1);
        assert_eq!(substrate.registry().pending_operations().len(), 1);
    }

    shared
        .lock()
        .await
        .tokens_mut()
        .mint(&REGISTRY, Amount::tokens(100))
        .unwrap();
    clock.advance(30);
    assert_eq!(scheduler.execute_tick().await.succeeded, 1);

    let substrate = shared.lock().await;
    assert_eq!(substrate.registry().operation_count(), 1);
    assert!(substrate.registry().pending_operations().is_empty());
    assert_eq!(scheduler.history(&id).await.unwrap().attempts, 2);
}

#[tokio::test]
async fn non_safe_dispatcher_fails_permanently_without_moving_funds() {
    let clock = Arc::new(NullClock::new(START));
    let shared = Arc::new(tokio::sync::Mutex::new(substrate(1_000)));
    let stranger = Address::repeat(0x99);
    let dispatcher = Arc::new(RegistryDispatcher::new(shared.clone(), stranger, clock.clone()));
    let scheduler = OperationScheduler::new(
        config(),
        Arc::new(NullSource::new()),
        Arc::new(NullGasOracle::gwei(1)),
        dispatcher,
        clock.clone(),
    )
    .unwrap();

    let id = scheduler.enqueue(stake(100, 30)).await.unwrap();
    assert_eq!(scheduler.execute_tick().await.failed, 1);

    let record = scheduler.history(&id).await.unwrap();
    assert!(!record.success);
    assert_eq!(record.attempts, 1);
    assert!(record.error.unwrap().contains("Only Safe"));

    let substrate = shared.lock().await;
    assert_eq!(substrate.registry().pending_operations().len(), 1);
    assert!(substrate.ledger().position(&REGISTRY).is_none());
    assert_eq!(substrate.tokens().balance_of(&REGISTRY), Amount::tokens(1_000));
}

#[tokio::test]
async fn validation_failure_is_not_retried() {
    let h = harness();
    h.dispatcher
        .fail_next_execution_with(DispatchError::new(ErrorKind::Validation, "bad target"));
    h.scheduler.enqueue(withdraw()).await.unwrap();

    let report = h.scheduler.execute_tick().await;
    assert_eq!(report.failed, 1);
    assert_eq!(report.retried, 0);
    assert_eq!(h.scheduler.failures().await[0].attempts, 1);
    assert_eq!(h.scheduler.status().await.queue_length, 0);
}

// ---------------------------------------------------------------------------
// Loops
// ---------------------------------------------------------------------------

#[tokio::test]
async fn loops_run_until_stopped() {
    let config = SchedulerConfig {
        monitor_interval_ms: 20,
        execution_interval_ms: 30,
        status_interval_ms: 50,
        ..config()
    };
    let mut h = harness_with(config, NullDispatcher::new());
    h.source.push_batch(vec![claim("E1N1")]);

    h.scheduler.start().unwrap();
    assert!(h.scheduler.is_running());
    assert!(matches!(
        h.scheduler.start(),
        Err(keel_scheduler::SchedulerError::AlreadyRunning)
    ));

    let mut executed = false;
    for _ in 0..50 {
        tokio::time::sleep(Duration::from_millis(20)).await;
        if h.scheduler.history_len().await == 1 {
            executed = true;
            break;
        }
    }
    assert!(executed, "loops never executed the queued claim");

    h.scheduler.stop().await.unwrap();
    assert!(!h.scheduler.is_running());
    assert!(!h.scheduler.status().await.running);
    // Stopping twice is harmless.
    h.scheduler.stop().await.unwrap();
}

#[tokio::test]
async fn slow_dispatch_does_not_block_monitoring() {
    let h = harness_with(
        config(),
        NullDispatcher::with_latency(Duration::from_millis(300)),
    );
    let scheduler = Arc::new(h.scheduler);
    scheduler.enqueue(claim("E1N1")).await.unwrap();

    let executing = {
        let scheduler = Arc::clone(&scheduler);
        tokio::spawn(async move { scheduler.execute_tick().await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    h.source.push_batch(vec![withdraw()]);
    let added = tokio::time::timeout(Duration::from_millis(100), scheduler.monitor_tick())
        .await
        .expect("monitoring blocked by execution")
        .unwrap();
    assert_eq!(added, 1);
    assert_eq!(scheduler.status().await.in_flight, 1);

    assert_eq!(executing.await.unwrap().succeeded, 1);
}
