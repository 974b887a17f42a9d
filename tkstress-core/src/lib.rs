#![forbid(unsafe_code)]

//! Load-generation and aggregation harness for a remote ticketing API.
//!
//! The crate is protocol-agnostic: a [`Scenario`] is an opaque named
//! operation against a shared [`Session`], and the harness only sees its
//! [`Outcome`]. Two drivers are provided: [`LoadHarness`] (bounded-
//! concurrency synthetic load) and [`CycleRunner`] (one session walking
//! an ordered scenario cycle on a timer).

pub mod cycle;
pub mod error;
pub mod executor;
pub mod harness;
pub mod health;
pub mod progress;
pub mod scenario;
pub mod select;
pub mod session;
pub mod stats;

pub use cycle::{CycleConfig, CyclePhase, CycleRunner};
pub use error::{Error, Result};
pub use executor::{ErrorKind, ExecutionRecord, Outcome, execute};
pub use harness::{HarnessConfig, LoadHarness, Phase, StopSignal};
pub use health::{HealthRecord, HealthSink};
pub use progress::{Event, ObserverFn};
pub use scenario::{Catalog, DEFAULT_WEIGHT, Scenario, ScenarioError, ScenarioFuture};
pub use select::select;
pub use session::{Authenticator, AuthFuture, Session};
pub use stats::{ResultAggregator, StatsSummary};
