use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use rand::SeedableRng;
use rand::rngs::SmallRng;
use tokio::sync::Notify;

use crate::error::{Error, Result};
use crate::executor::{self, ErrorKind, Outcome};
use crate::progress::{Event, ObserverFn};
use crate::scenario::Catalog;
use crate::select::select;
use crate::session::{Authenticator, Session};
use crate::stats::{ResultAggregator, StatsSummary};

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum Phase {
    Idle,
    Authenticating,
    Dispatching,
    Draining,
    Completed,
}

/// Cooperative cancellation flag shared by the driver and its workers.
///
/// `stop` is idempotent and wakes anything parked in [`StopSignal::wait`];
/// workers poll [`StopSignal::is_stopped`] once per claimed unit, so the
/// signal is observed within one iteration.
#[derive(Debug, Default)]
pub struct StopSignal {
    stopped: AtomicBool,
    notify: Notify,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    pub async fn wait(&self) {
        while !self.is_stopped() {
            self.notify.notified().await;
        }
    }
}

#[derive(Debug, Clone)]
pub struct HarnessConfig {
    /// Units of work to dispatch in total.
    pub total: u64,
    /// Fixed worker pool size.
    pub concurrency: u64,
    /// Ramp stagger between worker starts; this paces pool spin-up,
    /// not individual requests.
    pub start_interval: Duration,
    /// Bound on the drain wait once the work source is exhausted.
    pub timeout: Duration,
    /// Emit a progress event every N completions (and always at 100%).
    pub progress_every: u64,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            total: 100,
            concurrency: 10,
            start_interval: Duration::from_millis(100),
            timeout: Duration::from_secs(30),
            progress_every: 10,
        }
    }
}

/// Bounded-concurrency load driver.
///
/// A fixed pool of workers claims units from a shared atomic counter
/// (each decrement delivers exactly one unit), runs a weighted-random
/// scenario per unit, and pushes every outcome into the shared
/// aggregator. Scenario failures never abort the run; only a login
/// failure, an empty catalog, or a fault in the dispatch machinery
/// itself is fatal.
pub struct LoadHarness {
    catalog: Arc<Catalog>,
    auth: Arc<dyn Authenticator>,
    session: Arc<Session>,
    config: HarnessConfig,
    observer: Option<ObserverFn>,
}

impl LoadHarness {
    pub fn new(catalog: Catalog, auth: Arc<dyn Authenticator>, config: HarnessConfig) -> Self {
        Self {
            catalog: Arc::new(catalog),
            auth,
            session: Arc::new(Session::new()),
            config,
            observer: None,
        }
    }

    pub fn with_observer(mut self, observer: ObserverFn) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn session(&self) -> Arc<Session> {
        self.session.clone()
    }

    /// Runs the full load cycle and always yields a summary on `Ok`,
    /// even when every scenario failed; judging the error rate is the
    /// caller's policy decision.
    pub async fn run(&self, stop: Arc<StopSignal>) -> Result<StatsSummary> {
        if self.catalog.is_empty() || self.catalog.total_weight() <= 0.0 {
            return Err(Error::EmptyCatalog);
        }

        self.stage(Phase::Authenticating);
        if !self.auth.login(&self.session).await {
            self.emit(Event::Error {
                scenario: String::new(),
                detail: "login failed".to_string(),
            });
            self.stage(Phase::Completed);
            return Err(Error::Auth);
        }
        tracing::info!(user_id = ?self.session.user_id(), "login succeeded");

        let stats = Arc::new(ResultAggregator::new());
        let remaining = Arc::new(AtomicU64::new(self.config.total));

        self.stage(Phase::Dispatching);
        tracing::info!(
            total = self.config.total,
            concurrency = self.config.concurrency,
            "starting workers"
        );

        let mut handles = Vec::with_capacity(self.config.concurrency as usize);
        for worker_id in 0..self.config.concurrency {
            let catalog = self.catalog.clone();
            let session = self.session.clone();
            let stats = stats.clone();
            let remaining = remaining.clone();
            let stop = stop.clone();
            let observer = self.observer.clone();
            let total = self.config.total;
            let progress_every = self.config.progress_every.max(1);
            let ramp = self.config.start_interval.saturating_mul(worker_id as u32);

            handles.push(tokio::spawn(async move {
                // Staggered start avoids a connection spike at t=0.
                if !ramp.is_zero() {
                    tokio::time::sleep(ramp).await;
                }

                let mut rng = SmallRng::from_rng(&mut rand::rng());
                while !stop.is_stopped() {
                    // Claim exactly one unit; underflow means the source
                    // is exhausted.
                    let claimed = remaining
                        .fetch_update(Ordering::AcqRel, Ordering::Acquire, |v| v.checked_sub(1));
                    if claimed.is_err() {
                        break;
                    }

                    let scenario = match select(&catalog, &mut rng) {
                        Ok(s) => s,
                        Err(_) => break,
                    };

                    let record = executor::execute(&scenario, session.clone()).await;
                    if let Some(observer) = &observer {
                        match &record.outcome {
                            Outcome::Success { latency } => observer(Event::Log {
                                scenario: scenario.name().to_string(),
                                latency_ms: latency.as_secs_f64() * 1000.0,
                            }),
                            Outcome::Failure {
                                kind: ErrorKind::Http(status),
                                detail,
                                ..
                            } => observer(Event::ApiError {
                                scenario: scenario.name().to_string(),
                                status: *status,
                                detail: detail.clone(),
                            }),
                            Outcome::Failure { detail, .. } => observer(Event::Error {
                                scenario: scenario.name().to_string(),
                                detail: detail.clone(),
                            }),
                        }
                    }
                    stats.record(&record);

                    let completed = stats.total_count();
                    if completed % progress_every == 0 || completed == total {
                        if let Some(observer) = &observer {
                            observer(Event::Progress {
                                completed,
                                total,
                                percent: (completed as f64 / total as f64) * 100.0,
                            });
                        }
                        tracing::debug!(completed, total, "progress");
                    }
                }
            }));
        }

        self.stage(Phase::Draining);
        let aborts: Vec<_> = handles.iter().map(|h| h.abort_handle()).collect();
        let drain = async {
            let mut dispatch_error: Option<String> = None;
            for h in handles {
                match h.await {
                    Ok(()) => {}
                    Err(err) if err.is_cancelled() => {}
                    Err(err) => dispatch_error = Some(err.to_string()),
                }
            }
            dispatch_error
        };

        match tokio::time::timeout(self.config.timeout, drain).await {
            Ok(None) => {}
            Ok(Some(detail)) => {
                self.emit(Event::Error {
                    scenario: String::new(),
                    detail: detail.clone(),
                });
                return Err(Error::Dispatch(detail));
            }
            Err(_) => {
                // Bounded drain: give up on stragglers, keep the stats
                // collected so far.
                tracing::warn!(timeout = ?self.config.timeout, "drain timed out, aborting workers");
                stop.stop();
                for abort in aborts {
                    abort.abort();
                }
            }
        }

        stats.complete();
        let summary = stats.summary();
        self.stage(Phase::Completed);
        self.emit(Event::Complete {
            summary: summary.clone(),
        });

        Ok(summary)
    }

    fn stage(&self, phase: Phase) {
        tracing::info!(%phase, "stage");
        self.emit(Event::Stage {
            message: phase.to_string(),
        });
    }

    fn emit(&self, event: Event) {
        if let Some(observer) = &self.observer {
            observer(event);
        }
    }
}
