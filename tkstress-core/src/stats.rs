use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::executor::{ErrorKind, ExecutionRecord, Outcome};

/// First failure details retained; long soaks would otherwise grow the
/// buffer without bound.
const ERROR_DETAIL_CAP: usize = 100;

/// Failure details surfaced in a summary.
const ERROR_DETAIL_SUMMARY: usize = 10;

#[derive(Debug)]
struct AggregateState {
    success_count: u64,
    fail_count: u64,
    latencies_ms: Vec<f64>,
    errors_by_kind: BTreeMap<ErrorKind, u64>,
    error_details: Vec<String>,
    ended: Option<Instant>,
}

/// Thread-safe accumulation of execution records.
///
/// Counts, the latency buffer, and the error taxonomy are updated in a
/// single critical section per record, so `summary()` can never observe
/// a partial update. No operation here fails; it only accumulates.
#[derive(Debug)]
pub struct ResultAggregator {
    state: Mutex<AggregateState>,
    started: Instant,
}

/// Point-in-time snapshot of the aggregate. Latency figures are in
/// milliseconds; percentiles use floor-indexed lookup on the sorted
/// sample (`sorted[floor(len * p)]`, clamped to the last element).
#[derive(Debug, Clone, Default)]
pub struct StatsSummary {
    pub total_count: u64,
    pub success_count: u64,
    pub fail_count: u64,
    pub error_rate: f64,
    pub elapsed: Duration,
    pub qps: f64,
    pub avg_response_ms: f64,
    pub min_response_ms: f64,
    pub max_response_ms: f64,
    pub p90_response_ms: f64,
    pub p95_response_ms: f64,
    pub p99_response_ms: f64,
    pub std_dev_response_ms: f64,
    pub errors_by_kind: Vec<(ErrorKind, u64)>,
    /// First few failure details, for operator eyes.
    pub errors: Vec<String>,
}

impl Default for ResultAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl ResultAggregator {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(AggregateState {
                success_count: 0,
                fail_count: 0,
                latencies_ms: Vec::new(),
                errors_by_kind: BTreeMap::new(),
                error_details: Vec::new(),
                ended: None,
            }),
            started: Instant::now(),
        }
    }

    /// Safe to call from any number of concurrent workers.
    pub fn record(&self, record: &ExecutionRecord) {
        let latency_ms = record.outcome.latency().as_secs_f64() * 1000.0;

        let mut state = self.lock();
        state.latencies_ms.push(latency_ms);
        match &record.outcome {
            Outcome::Success { .. } => {
                state.success_count += 1;
            }
            Outcome::Failure { kind, detail, .. } => {
                state.fail_count += 1;
                *state.errors_by_kind.entry(*kind).or_insert(0) += 1;
                if state.error_details.len() < ERROR_DETAIL_CAP {
                    state
                        .error_details
                        .push(format!("{}: {detail}", record.scenario));
                }
            }
        }
    }

    pub fn total_count(&self) -> u64 {
        let state = self.lock();
        state.success_count + state.fail_count
    }

    /// Freezes the wall-clock window used for qps. Idempotent; the
    /// first call wins.
    pub fn complete(&self) {
        let mut state = self.lock();
        if state.ended.is_none() {
            state.ended = Some(Instant::now());
        }
    }

    pub fn summary(&self) -> StatsSummary {
        let state = self.lock();

        let total = state.success_count + state.fail_count;
        let elapsed = state
            .ended
            .unwrap_or_else(Instant::now)
            .duration_since(self.started);
        let secs = elapsed.as_secs_f64();

        let mut sorted = state.latencies_ms.clone();
        sorted.sort_by(|a, b| a.total_cmp(b));

        let qps = if secs == 0.0 { 0.0 } else { total as f64 / secs };
        let error_rate = if total == 0 {
            0.0
        } else {
            state.fail_count as f64 / total as f64
        };

        let avg = if sorted.is_empty() {
            0.0
        } else {
            sorted.iter().sum::<f64>() / sorted.len() as f64
        };

        StatsSummary {
            total_count: total,
            success_count: state.success_count,
            fail_count: state.fail_count,
            error_rate,
            elapsed,
            qps,
            avg_response_ms: avg,
            min_response_ms: sorted.first().copied().unwrap_or(0.0),
            max_response_ms: sorted.last().copied().unwrap_or(0.0),
            p90_response_ms: percentile(&sorted, 0.90),
            p95_response_ms: percentile(&sorted, 0.95),
            p99_response_ms: percentile(&sorted, 0.99),
            std_dev_response_ms: std_dev(&sorted),
            errors_by_kind: state
                .errors_by_kind
                .iter()
                .map(|(kind, count)| (*kind, *count))
                .collect(),
            errors: state
                .error_details
                .iter()
                .take(ERROR_DETAIL_SUMMARY)
                .cloned()
                .collect(),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, AggregateState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// `sorted[floor(len * p)]`, 0 for the empty sample. The index is
/// clamped so p values near 1 stay in bounds.
fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let index = ((sorted.len() as f64 * p) as usize).min(sorted.len() - 1);
    sorted[index]
}

/// Sample standard deviation (Bessel's correction); 0 for n <= 1.
fn std_dev(samples: &[f64]) -> f64 {
    if samples.len() <= 1 {
        return 0.0;
    }
    let n = samples.len() as f64;
    let mean = samples.iter().sum::<f64>() / n;
    let variance = samples.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1.0);
    variance.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::SystemTime;

    fn success_record(latency: Duration) -> ExecutionRecord {
        ExecutionRecord {
            scenario: Arc::from("s"),
            outcome: Outcome::Success { latency },
            started_at: SystemTime::now(),
        }
    }

    fn failure_record(kind: ErrorKind, detail: &str) -> ExecutionRecord {
        ExecutionRecord {
            scenario: Arc::from("s"),
            outcome: Outcome::Failure {
                latency: Duration::from_millis(1),
                kind,
                detail: detail.to_string(),
            },
            started_at: SystemTime::now(),
        }
    }

    #[test]
    fn empty_summary_is_all_zero() {
        let agg = ResultAggregator::new();
        agg.complete();
        let s = agg.summary();

        assert_eq!(s.total_count, 0);
        assert_eq!(s.success_count, 0);
        assert_eq!(s.fail_count, 0);
        assert_eq!(s.error_rate, 0.0);
        assert_eq!(s.avg_response_ms, 0.0);
        assert_eq!(s.p90_response_ms, 0.0);
        assert_eq!(s.p99_response_ms, 0.0);
        assert_eq!(s.std_dev_response_ms, 0.0);
        assert!(s.errors.is_empty());
    }

    #[test]
    fn percentile_uses_floor_index_on_sorted_sample() {
        // 10 samples: floor(10 * 0.9) = index 9 -> 100.0
        let sorted: Vec<f64> = vec![10.0, 20.0, 30.0, 40.0, 50.0, 60.0, 70.0, 80.0, 90.0, 100.0];
        assert_eq!(percentile(&sorted, 0.90), 100.0);
        assert_eq!(percentile(&sorted, 0.50), 60.0);
        // Clamp guard: p99 of a small sample stays in bounds.
        assert_eq!(percentile(&sorted, 0.99), 100.0);
        assert_eq!(percentile(&[42.0], 0.99), 42.0);
    }

    #[test]
    fn percentiles_are_monotonic() {
        let agg = ResultAggregator::new();
        for i in 1..=100u64 {
            agg.record(&success_record(Duration::from_millis(i)));
        }
        agg.complete();
        let s = agg.summary();

        assert!(s.p90_response_ms <= s.p95_response_ms);
        assert!(s.p95_response_ms <= s.p99_response_ms);
        assert!(s.p99_response_ms <= s.max_response_ms);
        assert!(s.min_response_ms <= s.avg_response_ms);
    }

    #[test]
    fn std_dev_uses_bessel_correction() {
        // Sample {2, 4, 4, 4, 5, 5, 7, 9}: mean 5, sum of squares 32,
        // sample variance 32/7.
        let samples = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        let expected = (32.0f64 / 7.0).sqrt();
        assert!((std_dev(&samples) - expected).abs() < 1e-12);
        assert_eq!(std_dev(&[3.0]), 0.0);
        assert_eq!(std_dev(&[]), 0.0);
    }

    #[test]
    fn failures_feed_the_error_taxonomy() {
        let agg = ResultAggregator::new();
        agg.record(&failure_record(ErrorKind::Http(502), "bad gateway"));
        agg.record(&failure_record(ErrorKind::Http(502), "bad gateway"));
        agg.record(&failure_record(ErrorKind::ConnectionRefused, "refused"));
        agg.record(&success_record(Duration::from_millis(3)));
        agg.complete();

        let s = agg.summary();
        assert_eq!(s.total_count, 4);
        assert_eq!(s.fail_count, 3);
        assert_eq!(s.error_rate, 0.75);
        assert_eq!(
            s.errors_by_kind,
            vec![(ErrorKind::Http(502), 2), (ErrorKind::ConnectionRefused, 1)]
        );
        assert_eq!(s.errors.len(), 3);
    }

    #[test]
    fn concurrent_records_lose_nothing() {
        const WORKERS: usize = 8;
        const PER_WORKER: u64 = 500;

        let agg = Arc::new(ResultAggregator::new());
        let mut handles = Vec::with_capacity(WORKERS);
        for _ in 0..WORKERS {
            let agg = agg.clone();
            handles.push(std::thread::spawn(move || {
                for i in 0..PER_WORKER {
                    agg.record(&success_record(Duration::from_micros(i)));
                }
            }));
        }
        for h in handles {
            if h.join().is_err() {
                panic!("worker thread panicked");
            }
        }
        agg.complete();

        let s = agg.summary();
        assert_eq!(s.total_count, WORKERS as u64 * PER_WORKER);
        assert_eq!(s.success_count, WORKERS as u64 * PER_WORKER);
        assert_eq!(s.fail_count, 0);
    }
}
