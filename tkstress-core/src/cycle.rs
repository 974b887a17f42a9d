use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use tokio::time::MissedTickBehavior;

use crate::error::{Error, Result};
use crate::executor;
use crate::harness::StopSignal;
use crate::health::{HealthRecord, HealthSink};
use crate::scenario::{Catalog, Scenario};
use crate::session::{Authenticator, Session};

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum CyclePhase {
    Stopped,
    LoggingIn,
    Ready,
    ExecutingScenario,
    AwaitingTick,
}

#[derive(Debug, Clone)]
pub struct CycleConfig {
    /// Time between scenario executions.
    pub interval: Duration,
    /// Credential lease age at which a refresh is attempted.
    pub refresh_after: Duration,
    /// Liveness file; `None` disables the health sink.
    pub health_path: Option<std::path::PathBuf>,
    /// Invalidate the session when the cycle wraps, so the next pass
    /// re-authenticates from scratch (clean-session policy).
    pub relogin_on_wrap: bool,
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            refresh_after: Duration::from_secs(15 * 60),
            health_path: None,
            relogin_on_wrap: true,
        }
    }
}

/// Drives one session through the catalog in registration order, one
/// scenario per timer tick.
///
/// Single-threaded by design: the tick is the only suspension point and
/// overdue ticks are skipped, not queued, so at most one scenario is
/// ever in flight. All per-tick failures (login, refresh, scenario,
/// health write) are logged and survived; the next tick retries.
pub struct CycleRunner {
    scenarios: Vec<Arc<Scenario>>,
    auth: Arc<dyn Authenticator>,
    session: Arc<Session>,
    sink: Option<HealthSink>,
    config: CycleConfig,
    index: usize,
    last_login: Option<Instant>,
    last_refresh: Option<SystemTime>,
    phase: CyclePhase,
}

impl CycleRunner {
    pub fn new(catalog: &Catalog, auth: Arc<dyn Authenticator>, config: CycleConfig) -> Result<Self> {
        if catalog.is_empty() {
            return Err(Error::EmptyCatalog);
        }

        Ok(Self {
            scenarios: catalog.scenarios().cloned().collect(),
            auth,
            session: Arc::new(Session::new()),
            sink: config.health_path.as_ref().map(HealthSink::new),
            config,
            index: 0,
            last_login: None,
            last_refresh: None,
            phase: CyclePhase::Stopped,
        })
    }

    pub fn cycle_index(&self) -> usize {
        self.index
    }

    pub fn phase(&self) -> CyclePhase {
        self.phase
    }

    pub fn session(&self) -> Arc<Session> {
        self.session.clone()
    }

    /// One full cycle step: ensure credentials, execute the scenario at
    /// the current index, report liveness, advance the index.
    ///
    /// Public so the state machine is drivable without a timer.
    pub async fn tick(&mut self) {
        if !self.ensure_credentials().await {
            return;
        }

        self.phase = CyclePhase::ExecutingScenario;
        let scenario = self.scenarios[self.index].clone();
        tracing::info!(
            scenario = scenario.name(),
            position = self.index + 1,
            of = self.scenarios.len(),
            "executing scenario"
        );

        let record = executor::execute(&scenario, self.session.clone()).await;
        match &record.outcome {
            executor::Outcome::Success { latency } => {
                tracing::info!(scenario = scenario.name(), ?latency, "scenario completed");
            }
            executor::Outcome::Failure { kind, detail, .. } => {
                tracing::error!(scenario = scenario.name(), %kind, %detail, "scenario failed");
            }
        }

        if let Some(sink) = &self.sink {
            let result = sink.write(&HealthRecord {
                last_execution: record.started_at,
                last_scenario: scenario.name().to_string(),
                last_refresh: self.last_refresh,
            });
            if let Err(err) = result {
                tracing::warn!(path = %sink.path().display(), %err, "health sink write failed");
            }
        }

        self.index = (self.index + 1) % self.scenarios.len();
        if self.index == 0 && self.config.relogin_on_wrap {
            tracing::info!("cycle complete, invalidating session for a clean next pass");
            self.session.invalidate();
        }

        self.phase = CyclePhase::AwaitingTick;
    }

    /// Timer loop; returns when the stop signal fires. The initial
    /// login failing is fatal (nothing would ever run otherwise);
    /// everything after that point retries on the next tick.
    pub async fn run(&mut self, stop: Arc<StopSignal>) -> Result<()> {
        self.phase = CyclePhase::LoggingIn;
        if !self.login().await {
            self.phase = CyclePhase::Stopped;
            return Err(Error::Auth);
        }
        self.phase = CyclePhase::Ready;

        let mut interval = tokio::time::interval(self.config.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = stop.wait() => break,
                _ = interval.tick() => self.tick().await,
            }
        }

        tracing::info!("cycle runner stopping");
        self.session.invalidate();
        self.phase = CyclePhase::Stopped;
        Ok(())
    }

    /// Logs in when the session is cold, refreshes when the lease is
    /// old. Returns false when no valid session could be obtained; the
    /// tick is skipped and the next one retries.
    async fn ensure_credentials(&mut self) -> bool {
        if !self.session.is_authenticated() {
            self.phase = CyclePhase::LoggingIn;
            if !self.login().await {
                tracing::error!("login failed, skipping tick");
                return false;
            }
            self.phase = CyclePhase::Ready;
            return true;
        }

        let lease_age = self.last_login.map(|at| at.elapsed());
        if lease_age.is_some_and(|age| age >= self.config.refresh_after) {
            tracing::info!(?lease_age, "credential lease old, refreshing");
            if self.auth.refresh(&self.session).await {
                self.last_login = Some(Instant::now());
                self.last_refresh = Some(SystemTime::now());
            } else {
                // Not fatal: the current token may still be good.
                tracing::warn!("credential refresh failed, retrying next tick");
            }
        }

        true
    }

    async fn login(&mut self) -> bool {
        if self.auth.login(&self.session).await {
            self.last_login = Some(Instant::now());
            self.last_refresh = Some(SystemTime::now());
            tracing::info!(user_id = ?self.session.user_id(), "logged in");
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::Scenario;
    use crate::session::AuthFuture;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CountingAuth {
        logins: AtomicU32,
        refreshes: AtomicU32,
        allow: bool,
    }

    impl CountingAuth {
        fn new(allow: bool) -> Arc<Self> {
            Arc::new(Self {
                logins: AtomicU32::new(0),
                refreshes: AtomicU32::new(0),
                allow,
            })
        }
    }

    impl Authenticator for CountingAuth {
        fn login<'a>(&'a self, session: &'a Session) -> AuthFuture<'a> {
            Box::pin(async move {
                self.logins.fetch_add(1, Ordering::SeqCst);
                if self.allow {
                    session.authenticate("tok", "uid");
                }
                self.allow
            })
        }

        fn refresh<'a>(&'a self, _session: &'a Session) -> AuthFuture<'a> {
            Box::pin(async move {
                self.refreshes.fetch_add(1, Ordering::SeqCst);
                self.allow
            })
        }
    }

    fn recording_catalog(names: &[&str], log: Arc<Mutex<Vec<String>>>) -> Catalog {
        let mut catalog = Catalog::new();
        for name in names {
            let log = log.clone();
            let owned = name.to_string();
            catalog.register(Scenario::new(name, move |_session| {
                let log = log.clone();
                let owned = owned.clone();
                async move {
                    log.lock().unwrap_or_else(|p| p.into_inner()).push(owned);
                    Ok(())
                }
            }));
        }
        catalog
    }

    #[tokio::test]
    async fn seven_ticks_over_three_scenarios_wrap_twice() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let catalog = recording_catalog(&["a", "b", "c"], log.clone());
        let auth = CountingAuth::new(true);
        let mut runner = match CycleRunner::new(&catalog, auth, CycleConfig::default()) {
            Ok(r) => r,
            Err(err) => panic!("runner construction failed: {err}"),
        };

        for _ in 0..7 {
            runner.tick().await;
        }

        let executed = log.lock().unwrap_or_else(|p| p.into_inner()).clone();
        assert_eq!(executed, vec!["a", "b", "c", "a", "b", "c", "a"]);
        assert_eq!(runner.cycle_index(), 1);
        assert_eq!(runner.phase(), CyclePhase::AwaitingTick);
    }

    #[tokio::test]
    async fn wrap_invalidates_session_and_next_tick_relogs() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let catalog = recording_catalog(&["a", "b"], log);
        let auth = CountingAuth::new(true);
        let mut runner = match CycleRunner::new(&catalog, auth.clone(), CycleConfig::default()) {
            Ok(r) => r,
            Err(err) => panic!("runner construction failed: {err}"),
        };

        runner.tick().await; // login + a
        runner.tick().await; // b, wrap -> invalidate
        assert!(!runner.session().is_authenticated());
        assert_eq!(auth.logins.load(Ordering::SeqCst), 1);

        runner.tick().await; // relogin + a
        assert!(runner.session().is_authenticated());
        assert_eq!(auth.logins.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn old_lease_triggers_a_refresh_on_the_next_tick() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let catalog = recording_catalog(&["a", "b"], log);
        let auth = CountingAuth::new(true);
        let config = CycleConfig {
            refresh_after: Duration::ZERO,
            relogin_on_wrap: false,
            ..CycleConfig::default()
        };
        let mut runner = match CycleRunner::new(&catalog, auth.clone(), config) {
            Ok(r) => r,
            Err(err) => panic!("runner construction failed: {err}"),
        };

        runner.tick().await; // cold session: login, no refresh yet
        assert_eq!(auth.logins.load(Ordering::SeqCst), 1);
        assert_eq!(auth.refreshes.load(Ordering::SeqCst), 0);
        let lease_stamp = runner.last_refresh;
        assert!(lease_stamp.is_some());

        runner.tick().await; // lease is past refresh_after
        assert_eq!(auth.logins.load(Ordering::SeqCst), 1);
        assert_eq!(auth.refreshes.load(Ordering::SeqCst), 1);
        assert!(runner.last_refresh >= lease_stamp);

        runner.tick().await;
        assert_eq!(auth.refreshes.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failed_refresh_keeps_the_session_and_retries_next_tick() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let catalog = recording_catalog(&["a", "b"], log.clone());
        let auth = Arc::new(CountingAuth {
            logins: AtomicU32::new(0),
            refreshes: AtomicU32::new(0),
            allow: true,
        });

        struct FlakyRefresh(Arc<CountingAuth>);
        impl Authenticator for FlakyRefresh {
            fn login<'a>(&'a self, session: &'a Session) -> AuthFuture<'a> {
                self.0.login(session)
            }
            fn refresh<'a>(&'a self, _session: &'a Session) -> AuthFuture<'a> {
                Box::pin(async move {
                    self.0.refreshes.fetch_add(1, Ordering::SeqCst);
                    false
                })
            }
        }

        let config = CycleConfig {
            refresh_after: Duration::ZERO,
            relogin_on_wrap: false,
            ..CycleConfig::default()
        };
        let inner = auth.clone();
        let mut runner = match CycleRunner::new(&catalog, Arc::new(FlakyRefresh(inner)), config) {
            Ok(r) => r,
            Err(err) => panic!("runner construction failed: {err}"),
        };

        runner.tick().await; // login
        runner.tick().await; // refresh fails, tick still runs
        runner.tick().await; // refresh retried

        assert_eq!(auth.refreshes.load(Ordering::SeqCst), 2);
        assert!(runner.session().is_authenticated());
        assert_eq!(log.lock().unwrap_or_else(|p| p.into_inner()).len(), 3);
    }

    #[tokio::test]
    async fn failed_login_skips_tick_without_advancing() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let catalog = recording_catalog(&["a", "b", "c"], log.clone());
        let auth = CountingAuth::new(false);
        let mut runner = match CycleRunner::new(&catalog, auth, CycleConfig::default()) {
            Ok(r) => r,
            Err(err) => panic!("runner construction failed: {err}"),
        };

        runner.tick().await;
        runner.tick().await;

        assert!(log.lock().unwrap_or_else(|p| p.into_inner()).is_empty());
        assert_eq!(runner.cycle_index(), 0);
    }

    #[test]
    fn empty_catalog_is_rejected() {
        let catalog = Catalog::new();
        let auth = CountingAuth::new(true);
        assert!(matches!(
            CycleRunner::new(&catalog, auth, CycleConfig::default()),
            Err(Error::EmptyCatalog)
        ));
    }
}
