use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::session::Session;

/// Weight applied to scenarios registered without an explicit one.
pub const DEFAULT_WEIGHT: f64 = 10.0;

pub type ScenarioFuture = Pin<Box<dyn Future<Output = std::result::Result<(), ScenarioError>> + Send>>;

type ScenarioFn = Arc<dyn Fn(Arc<Session>) -> ScenarioFuture + Send + Sync>;

/// The only failure type a scenario may surface. Anything the scenario
/// body raises (transport errors, bad responses) must be folded into
/// one of these before crossing back into the harness.
#[derive(Debug, thiserror::Error)]
pub enum ScenarioError {
    /// The remote API answered with a non-success HTTP status.
    #[error("http status {status}: {detail}")]
    Status { status: u16, detail: String },

    /// Network-layer failure (connect, timeout, body read, ...).
    #[error("{0}")]
    Transport(String),

    /// Anything else: missing data in a response, precondition not met.
    #[error("{0}")]
    Other(String),
}

impl ScenarioError {
    pub fn status(status: u16, detail: impl Into<String>) -> Self {
        Self::Status {
            status,
            detail: detail.into(),
        }
    }

    pub fn transport(detail: impl Into<String>) -> Self {
        Self::Transport(detail.into())
    }

    pub fn other(detail: impl Into<String>) -> Self {
        Self::Other(detail.into())
    }
}

/// A named multi-step interaction against the target API, polymorphic
/// over the single capability "execute against a session". Immutable
/// once built; identified by its stable name for weighting and
/// reporting.
#[derive(Clone)]
pub struct Scenario {
    name: Arc<str>,
    run: ScenarioFn,
}

impl Scenario {
    pub fn new<F, Fut>(name: &str, run: F) -> Self
    where
        F: Fn(Arc<Session>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<(), ScenarioError>> + Send + 'static,
    {
        Self {
            name: Arc::from(name),
            run: Arc::new(move |session| Box::pin(run(session))),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn name_arc(&self) -> Arc<str> {
        self.name.clone()
    }

    pub fn execute(&self, session: Arc<Session>) -> ScenarioFuture {
        (self.run)(session)
    }
}

impl std::fmt::Debug for Scenario {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scenario").field("name", &self.name).finish()
    }
}

#[derive(Debug, Clone)]
pub(crate) struct CatalogEntry {
    pub scenario: Arc<Scenario>,
    pub weight: f64,
}

/// Insertion-ordered scenario registry. The registration order is the
/// deterministic walk order for weighted selection and the cycle order
/// for the periodic runner.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    entries: Vec<CatalogEntry>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, scenario: Scenario) {
        self.register_weighted(scenario, DEFAULT_WEIGHT);
    }

    pub fn register_weighted(&mut self, scenario: Scenario, weight: f64) {
        self.entries.push(CatalogEntry {
            scenario: Arc::new(scenario),
            weight,
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<Arc<Scenario>> {
        self.entries
            .iter()
            .find(|e| e.scenario.name() == name)
            .map(|e| e.scenario.clone())
    }

    pub fn scenarios(&self) -> impl Iterator<Item = &Arc<Scenario>> {
        self.entries.iter().map(|e| &e.scenario)
    }

    pub fn weight_of(&self, name: &str) -> Option<f64> {
        self.entries
            .iter()
            .find(|e| e.scenario.name() == name)
            .map(|e| e.weight)
    }

    /// Sum of positive weights; entries with weight <= 0 never select.
    pub fn total_weight(&self) -> f64 {
        self.entries
            .iter()
            .map(|e| e.weight.max(0.0))
            .sum()
    }

    pub(crate) fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }
}
