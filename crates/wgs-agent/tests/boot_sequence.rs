//! Boot sequence integration tests
//!
//! Drives the full sequencer against in-memory collaborators on tokio's
//! paused clock.

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wgs_agent::{BootError, BootOutcome, Collaborators, RunningSystem, Sequencer, Signals};
use wgs_core::config::SupervisorConfig;
use wgs_core::error::{StoreError, TunnelError};
use wgs_core::LinkState;

use common::{
    test_config, Association, CountingWorkload, ErrorLog, FakeTunnel, FixedClock, MemoryStore,
    ScriptedLink,
};

struct Harness {
    store: Arc<MemoryStore>,
    link: Arc<ScriptedLink>,
    workload: Arc<CountingWorkload>,
    sequencer: Sequencer<FakeTunnel>,
}

fn harness(
    config: SupervisorConfig,
    store: MemoryStore,
    link: ScriptedLink,
    tunnel: FakeTunnel,
    clock_reachable: bool,
) -> Harness {
    let store = Arc::new(store);
    let link = Arc::new(link);
    let workload = Arc::new(CountingWorkload::default());
    let sequencer = Sequencer::new(
        config,
        Collaborators {
            settings: store.clone(),
            link: link.clone(),
            tunnel,
            workload: workload.clone(),
            clock: Arc::new(FixedClock {
                reachable: clock_reachable,
            }),
        },
    );
    Harness {
        store,
        link,
        workload,
        sequencer,
    }
}

fn expect_running<C>(outcome: BootOutcome<C>) -> RunningSystem<C> {
    match outcome {
        BootOutcome::Running(system) => system,
        BootOutcome::Halted(error) => panic!("boot halted: {}", error),
        BootOutcome::Cancelled => panic!("boot cancelled"),
    }
}

fn expect_halted<C>(outcome: BootOutcome<C>) -> BootError {
    match outcome {
        BootOutcome::Halted(error) => error,
        BootOutcome::Running(_) => panic!("boot unexpectedly reached steady state"),
        BootOutcome::Cancelled => panic!("boot cancelled"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_boot_reaches_steady_state() {
    let h = harness(
        test_config(),
        MemoryStore::default(),
        ScriptedLink::new([Association::Accept]),
        FakeTunnel::up_after(3),
        true,
    );

    let system = expect_running(h.sequencer.run(CancellationToken::new()).await);

    assert_eq!(system.session.endpoint(), "peer.example.net:51820");
    assert_eq!(system.board.snapshot(), Signals::LINK_UP);
    assert_eq!(h.store.inits.load(Ordering::SeqCst), 1);
    assert_eq!(h.store.erases.load(Ordering::SeqCst), 0);
    assert_eq!(h.link.configures.load(Ordering::SeqCst), 1);
    assert_eq!(h.link.connects.load(Ordering::SeqCst), 1);

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(h.workload.starts(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_link_recovers_within_retry_budget() {
    let h = harness(
        test_config(),
        MemoryStore::default(),
        ScriptedLink::new([
            Association::Reject,
            Association::Reject,
            Association::Reject,
            Association::Accept,
        ]),
        FakeTunnel::up_after(1),
        true,
    );

    let system = expect_running(h.sequencer.run(CancellationToken::new()).await);
    assert_eq!(system.board.snapshot(), Signals::LINK_UP);
    assert_eq!(h.link.connects.load(Ordering::SeqCst), 4);
}

#[tokio::test(start_paused = true)]
async fn test_link_exhaustion_halts_before_workload() {
    let h = harness(
        test_config(),
        MemoryStore::default(),
        ScriptedLink::new([]),
        FakeTunnel::up_after(1),
        true,
    );

    let error = expect_halted(h.sequencer.run(CancellationToken::new()).await);
    assert!(matches!(error, BootError::LinkFailed { retries: 3, .. }));
    // First attempt plus three retries
    assert_eq!(h.link.connects.load(Ordering::SeqCst), 4);

    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(h.workload.starts(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_tunnel_failure_halts_but_workload_keeps_cycling() {
    let h = harness(
        test_config(),
        MemoryStore::default(),
        ScriptedLink::new([Association::Accept]),
        FakeTunnel::refusing(),
        true,
    );

    let error = expect_halted(h.sequencer.run(CancellationToken::new()).await);
    assert!(matches!(error, BootError::Tunnel(TunnelError::Connect(_))));

    // Default cadence: 30 s run + 5 s pad + 1 s drain
    tokio::time::sleep(Duration::from_secs(80)).await;
    assert_eq!(h.workload.starts(), 3);
    assert_eq!(h.workload.stops.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn test_invalid_tunnel_config_halts() {
    let mut config = test_config();
    config.tunnel.peer_public_key = String::new();
    let h = harness(
        config,
        MemoryStore::default(),
        ScriptedLink::new([Association::Accept]),
        FakeTunnel::up_after(1),
        true,
    );

    let error = expect_halted(h.sequencer.run(CancellationToken::new()).await);
    assert!(matches!(error, BootError::Tunnel(TunnelError::Config(_))));
}

#[tokio::test(start_paused = true)]
async fn test_full_settings_store_is_erased_once() {
    let h = harness(
        test_config(),
        MemoryStore::failing_once(StoreError::Exhausted),
        ScriptedLink::new([Association::Accept]),
        FakeTunnel::up_after(1),
        true,
    );

    expect_running(h.sequencer.run(CancellationToken::new()).await);
    assert_eq!(h.store.erases.load(Ordering::SeqCst), 1);
    assert_eq!(h.store.inits.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn test_unusable_settings_store_halts_before_link() {
    let h = harness(
        test_config(),
        MemoryStore::broken(),
        ScriptedLink::new([Association::Accept]),
        FakeTunnel::up_after(1),
        true,
    );

    let error = expect_halted(h.sequencer.run(CancellationToken::new()).await);
    assert!(matches!(error, BootError::Settings(StoreError::Io(_))));
    assert_eq!(h.store.erases.load(Ordering::SeqCst), 0);
    assert_eq!(h.link.configures.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_time_sync_failure_is_not_fatal() {
    let h = harness(
        test_config(),
        MemoryStore::default(),
        ScriptedLink::new([Association::Accept]),
        FakeTunnel::up_after(1),
        false,
    );

    expect_running(h.sequencer.run(CancellationToken::new()).await);
}

#[tokio::test(start_paused = true)]
async fn test_bounded_peer_wait_times_out() {
    let mut config = test_config();
    config.peer_wait.max_wait = Some(Duration::from_secs(30));
    let h = harness(
        config,
        MemoryStore::default(),
        ScriptedLink::new([Association::Accept]),
        FakeTunnel::never_up(),
        true,
    );

    let error = expect_halted(h.sequencer.run(CancellationToken::new()).await);
    assert!(matches!(error, BootError::PeerTimeout(d) if d == Duration::from_secs(30)));
}

#[tokio::test(start_paused = true)]
async fn test_halt_is_left_to_the_caller_to_report() {
    let errors = ErrorLog::default();
    let _guard = tracing_subscriber::registry()
        .with(errors.clone())
        .set_default();

    let mut config = test_config();
    config.peer_wait.max_wait = Some(Duration::from_secs(5));
    let h = harness(
        config,
        MemoryStore::default(),
        ScriptedLink::new([Association::Accept]),
        FakeTunnel::never_up(),
        true,
    );

    let error = expect_halted(h.sequencer.run(CancellationToken::new()).await);
    assert!(matches!(error, BootError::PeerTimeout(_)));
    assert_eq!(errors.count_from("wgs_agent::sequencer"), 0);

    // A report from the caller is still recorded
    tracing::error!(target: "wgs_agent::sequencer", "reported by caller");
    assert_eq!(errors.count_from("wgs_agent::sequencer"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_during_peer_wait() {
    let h = harness(
        test_config(),
        MemoryStore::default(),
        ScriptedLink::new([Association::Accept]),
        FakeTunnel::never_up(),
        true,
    );
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(600)).await;
        trigger.cancel();
    });

    let outcome = h.sequencer.run(cancel).await;
    assert!(matches!(outcome, BootOutcome::Cancelled));
}

#[tokio::test(start_paused = true)]
async fn test_link_supervisor_keeps_running_after_boot() {
    let h = harness(
        test_config(),
        MemoryStore::default(),
        ScriptedLink::new([Association::Accept]),
        FakeTunnel::up_after(1),
        true,
    );
    let cancel = CancellationToken::new();

    let system = expect_running(h.sequencer.run(cancel.clone()).await);
    assert!(!system.link_task.is_finished());

    cancel.cancel();
    assert_eq!(system.link_task.await.unwrap(), LinkState::Connected);
}
