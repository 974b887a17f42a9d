use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use tkstress_core::{
    AuthFuture, Authenticator, Catalog, Error, Event, HarnessConfig, LoadHarness, Scenario,
    ScenarioError, Session, StopSignal,
};

struct StaticAuth {
    allow: bool,
    logins: AtomicU32,
}

impl StaticAuth {
    fn new(allow: bool) -> Arc<Self> {
        Arc::new(Self {
            allow,
            logins: AtomicU32::new(0),
        })
    }
}

impl Authenticator for StaticAuth {
    fn login<'a>(&'a self, session: &'a Session) -> AuthFuture<'a> {
        Box::pin(async move {
            self.logins.fetch_add(1, Ordering::SeqCst);
            if self.allow {
                session.authenticate("test-token", "test-user");
            }
            self.allow
        })
    }
}

fn fixed_latency_catalog(latency: Duration) -> Catalog {
    let mut catalog = Catalog::new();
    catalog.register(Scenario::new("steady", move |_session| async move {
        tokio::time::sleep(latency).await;
        Ok(())
    }));
    catalog
}

fn config(total: u64, concurrency: u64) -> HarnessConfig {
    HarnessConfig {
        total,
        concurrency,
        start_interval: Duration::from_millis(1),
        timeout: Duration::from_secs(10),
        progress_every: 10,
    }
}

#[tokio::test]
async fn forty_units_over_four_workers_all_succeed() -> anyhow::Result<()> {
    let harness = LoadHarness::new(
        fixed_latency_catalog(Duration::from_millis(10)),
        StaticAuth::new(true),
        config(40, 4),
    );

    let summary = harness.run(Arc::new(StopSignal::new())).await?;

    assert_eq!(summary.total_count, 40);
    assert_eq!(summary.success_count, 40);
    assert_eq!(summary.fail_count, 0);
    assert_eq!(summary.error_rate, 0.0);
    // Fixed 10ms sleep per unit: p90 sits at the sleep plus scheduling
    // slack, comfortably under 100ms on any test machine.
    assert!(summary.p90_response_ms >= 10.0, "p90 {}", summary.p90_response_ms);
    assert!(summary.p90_response_ms < 100.0, "p90 {}", summary.p90_response_ms);
    assert!(summary.qps > 0.0);
    Ok(())
}

#[tokio::test]
async fn always_failing_scenario_still_yields_a_summary() -> anyhow::Result<()> {
    let mut catalog = Catalog::new();
    catalog.register(Scenario::new("doomed", |_session| async {
        Err(ScenarioError::status(502, "bad gateway"))
    }));

    let harness = LoadHarness::new(catalog, StaticAuth::new(true), config(25, 5));
    let summary = harness.run(Arc::new(StopSignal::new())).await?;

    assert_eq!(summary.total_count, 25);
    assert_eq!(summary.fail_count, 25);
    assert_eq!(summary.error_rate, 1.0);
    assert!(!summary.errors.is_empty());
    Ok(())
}

#[tokio::test]
async fn login_failure_is_fatal_with_zero_work_done() {
    let auth = StaticAuth::new(false);
    let harness = LoadHarness::new(
        fixed_latency_catalog(Duration::from_millis(1)),
        auth.clone(),
        config(10, 2),
    );

    let result = harness.run(Arc::new(StopSignal::new())).await;
    assert!(matches!(result, Err(Error::Auth)));
    assert_eq!(auth.logins.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn empty_catalog_is_fatal_before_login() {
    let auth = StaticAuth::new(true);
    let harness = LoadHarness::new(Catalog::new(), auth.clone(), config(10, 2));

    let result = harness.run(Arc::new(StopSignal::new())).await;
    assert!(matches!(result, Err(Error::EmptyCatalog)));
    assert_eq!(auth.logins.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn stop_signal_cuts_the_run_short() -> anyhow::Result<()> {
    let stop = Arc::new(StopSignal::new());
    let harness = LoadHarness::new(
        fixed_latency_catalog(Duration::from_millis(20)),
        StaticAuth::new(true),
        config(10_000, 4),
    );

    let stopper = {
        let stop = stop.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(150)).await;
            stop.stop();
        })
    };

    let summary = harness.run(stop).await?;
    stopper.await?;

    // Interrupted well before the work source drained, yet the run
    // still completed with a consistent partial summary.
    assert!(summary.total_count > 0);
    assert!(summary.total_count < 10_000);
    assert_eq!(summary.total_count, summary.success_count + summary.fail_count);
    Ok(())
}

#[tokio::test]
async fn observer_sees_stages_progress_and_completion() -> anyhow::Result<()> {
    let events: Arc<Mutex<Vec<Event>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();

    let harness = LoadHarness::new(
        fixed_latency_catalog(Duration::from_millis(1)),
        StaticAuth::new(true),
        config(20, 2),
    )
    .with_observer(Arc::new(move |event| {
        sink.lock().unwrap_or_else(|p| p.into_inner()).push(event);
    }));

    harness.run(Arc::new(StopSignal::new())).await?;

    let events = events.lock().unwrap_or_else(|p| p.into_inner());
    let stages: Vec<String> = events
        .iter()
        .filter_map(|e| match e {
            Event::Stage { message } => Some(message.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(
        stages,
        vec!["authenticating", "dispatching", "draining", "completed"]
    );

    let reached_full_progress = events.iter().any(|e| {
        matches!(e, Event::Progress { completed, total, .. } if completed == total && *total == 20)
    });
    assert!(reached_full_progress, "no 100% progress event seen");

    match events.last() {
        Some(Event::Complete { summary }) => assert_eq!(summary.total_count, 20),
        other => panic!("unexpected trailing event: {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn mixed_catalog_splits_by_weight() -> anyhow::Result<()> {
    let mut catalog = Catalog::new();
    catalog.register_weighted(
        Scenario::new("heavy", |_session| async { Ok(()) }),
        70.0,
    );
    catalog.register_weighted(
        Scenario::new("light", |_session| async {
            Err(ScenarioError::other("light always fails"))
        }),
        30.0,
    );

    let harness = LoadHarness::new(catalog, StaticAuth::new(true), config(1_000, 8));
    let summary = harness.run(Arc::new(StopSignal::new())).await?;

    assert_eq!(summary.total_count, 1_000);
    // Failures mirror selections of the light scenario.
    assert!(
        (250..=350).contains(&summary.fail_count),
        "fail_count {}",
        summary.fail_count
    );
    assert_eq!(summary.success_count + summary.fail_count, 1_000);
    Ok(())
}
