use std::sync::Arc;

use crate::stats::StatsSummary;

/// Structured events for a downstream observer (log sink or dashboard).
///
/// Delivery is best-effort: the callback runs inline on the emitting
/// worker and must not block or panic; an observer that has gone away
/// simply drops events.
#[derive(Debug, Clone)]
pub enum Event {
    /// Run lifecycle transition (authenticating, dispatching, ...).
    Stage { message: String },

    /// A scenario completed successfully.
    Log { scenario: String, latency_ms: f64 },

    /// Completion progress, emitted at a configurable granularity.
    Progress {
        completed: u64,
        total: u64,
        percent: f64,
    },

    /// The API answered with an error status.
    ApiError {
        scenario: String,
        status: u16,
        detail: String,
    },

    /// A scenario failed below the HTTP layer (or for any other reason).
    Error { scenario: String, detail: String },

    /// Final summary; always the last event of a run.
    Complete { summary: StatsSummary },
}

pub type ObserverFn = Arc<dyn Fn(Event) + Send + Sync + 'static>;
