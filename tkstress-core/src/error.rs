pub type Result<T> = std::result::Result<T, Error>;

/// Setup-phase and internal harness failures.
///
/// Scenario-level failures never appear here: they are converted to
/// [`crate::Outcome::Failure`] data at the executor boundary and only
/// ever reach callers through the aggregated summary.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("authentication failed")]
    Auth,

    #[error("scenario catalog is empty or has no positive weight")]
    EmptyCatalog,

    #[error("dispatch failure: {0}")]
    Dispatch(String),
}
