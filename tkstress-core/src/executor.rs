use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use crate::scenario::{Scenario, ScenarioError};
use crate::session::Session;

/// Failure classification used by the per-kind error counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
    /// The API answered with an error status (502, 500, ...).
    #[strum(to_string = "http_{0}")]
    Http(u16),
    ConnectionRefused,
    Timeout,
    Protocol,
    Other,
}

#[derive(Debug, Clone)]
pub enum Outcome {
    Success {
        latency: Duration,
    },
    Failure {
        latency: Duration,
        kind: ErrorKind,
        detail: String,
    },
}

impl Outcome {
    pub fn latency(&self) -> Duration {
        match self {
            Self::Success { latency } | Self::Failure { latency, .. } => *latency,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

/// One finished scenario invocation. Produced here, consumed exactly
/// once by [`crate::ResultAggregator::record`].
#[derive(Debug, Clone)]
pub struct ExecutionRecord {
    pub scenario: Arc<str>,
    pub outcome: Outcome,
    pub started_at: SystemTime,
}

/// Runs one scenario invocation against the shared session and measures
/// elapsed time on a monotonic clock.
///
/// Any error the scenario surfaces is converted to `Failure` data; this
/// boundary never propagates an error upward, so the worker pool cannot
/// crash on application-level failures.
pub async fn execute(scenario: &Scenario, session: Arc<Session>) -> ExecutionRecord {
    let started_at = SystemTime::now();
    let started = Instant::now();

    let outcome = match scenario.execute(session).await {
        Ok(()) => Outcome::Success {
            latency: started.elapsed(),
        },
        Err(err) => {
            let latency = started.elapsed();
            let kind = classify(&err);
            tracing::debug!(scenario = scenario.name(), %err, %kind, "scenario failed");
            Outcome::Failure {
                latency,
                kind,
                detail: err.to_string(),
            }
        }
    };

    ExecutionRecord {
        scenario: scenario.name_arc(),
        outcome,
        started_at,
    }
}

/// Explicit status codes win; otherwise fall back to the message
/// heuristic the original error taxonomy was built on.
fn classify(err: &ScenarioError) -> ErrorKind {
    if let ScenarioError::Status { status, .. } = err {
        return ErrorKind::Http(*status);
    }

    let message = err.to_string().to_ascii_lowercase();
    if message.contains("refused") {
        ErrorKind::ConnectionRefused
    } else if message.contains("timed out") || message.contains("timeout") {
        ErrorKind::Timeout
    } else if message.contains("protocol") || message.contains("parse") {
        ErrorKind::Protocol
    } else {
        ErrorKind::Other
    }
}
