use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

fn parse_duration(input: &str) -> Result<Duration, String> {
    let s = input.trim();
    if s.is_empty() {
        return Err("duration cannot be empty (expected e.g. 10s, 250ms, 1m)".to_string());
    }

    let number_end = s
        .char_indices()
        .find(|(_, ch)| !ch.is_ascii_digit())
        .map_or(s.len(), |(idx, _)| idx);

    if number_end == 0 {
        return Err(format!(
            "invalid duration '{s}' (expected e.g. 10s, 250ms, 1m)"
        ));
    }

    let (number_str, unit_str) = s.split_at(number_end);
    let value: u64 = number_str
        .parse()
        .map_err(|_| format!("invalid duration '{s}' (expected e.g. 10s, 250ms, 1m)"))?;

    match unit_str.trim() {
        "" | "s" | "sec" | "secs" | "second" | "seconds" => Ok(Duration::from_secs(value)),
        "ms" | "msec" | "msecs" | "millisecond" | "milliseconds" => {
            Ok(Duration::from_millis(value))
        }
        "m" | "min" | "mins" | "minute" | "minutes" => {
            let secs = value
                .checked_mul(60)
                .ok_or_else(|| format!("duration '{s}' is too large"))?;
            Ok(Duration::from_secs(secs))
        }
        "h" | "hr" | "hrs" | "hour" | "hours" => {
            let secs = value
                .checked_mul(60)
                .and_then(|v| v.checked_mul(60))
                .ok_or_else(|| format!("duration '{s}' is too large"))?;
            Ok(Duration::from_secs(secs))
        }
        _ => Err(format!(
            "invalid duration '{s}' (expected e.g. 10s, 250ms, 1m)"
        )),
    }
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable summary.
    HumanReadable,
    /// Emit the summary as a single JSON object on stdout.
    Json,
}

#[derive(Debug, Parser)]
#[command(
    name = "tkstress",
    version,
    about = "Load and soak testing harness for the train ticketing service",
    after_help = "Examples:\n  tkstress check\n  tkstress stress --count 500 --concurrency 20\n  tkstress stress --scenario high_speed --count 100\n  tkstress run book\n  tkstress cycle --interval 30s --health-file /tmp/tkstress_health"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a concurrent stress test with the weighted scenario mix
    Stress(StressArgs),

    /// Execute scenarios one by one on a fixed timer, forever
    Cycle(CycleArgs),

    /// Execute a single named scenario once and report the outcome
    Run(RunArgs),

    /// Verify the target is reachable and credentials work
    Check(ConnectionArgs),
}

#[derive(Debug, Args)]
pub struct ConnectionArgs {
    /// Base URL of the ticketing service
    #[arg(long, env = "TS_BASE_URL", default_value = "http://localhost:31000")]
    pub base_url: String,

    /// Login username
    #[arg(long, env = "TS_USERNAME", default_value = "fdse_microservice")]
    pub username: String,

    /// Login password
    #[arg(long, env = "TS_PASSWORD", default_value = "111111")]
    pub password: String,

    /// Travel date for ticket queries (YYYY-MM-DD), defaults to today
    #[arg(long, env = "TS_DEFAULT_DATE")]
    pub date: Option<String>,

    /// Per-request timeout (e.g. 10s, 250ms)
    #[arg(long, value_parser = parse_duration, default_value = "10s")]
    pub request_timeout: Duration,
}

#[derive(Debug, Args)]
pub struct StressArgs {
    #[command(flatten)]
    pub connection: ConnectionArgs,

    /// Total number of scenario executions to dispatch
    #[arg(long, default_value_t = 100)]
    pub count: u64,

    /// Number of concurrent workers
    #[arg(long, default_value_t = 10)]
    pub concurrency: u64,

    /// Stagger between worker starts
    #[arg(long, value_parser = parse_duration, default_value = "100ms")]
    pub start_interval: Duration,

    /// Bound on the drain wait once all work is dispatched
    #[arg(long, value_parser = parse_duration, default_value = "30s")]
    pub timeout: Duration,

    /// Restrict the run to a single named scenario instead of the mix
    #[arg(long)]
    pub scenario: Option<String>,

    /// Fail the run (exit 1) when the error rate exceeds this fraction
    #[arg(long, default_value_t = 1.0)]
    pub max_error_rate: f64,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::HumanReadable)]
    pub output: OutputFormat,
}

#[derive(Debug, Args)]
pub struct CycleArgs {
    #[command(flatten)]
    pub connection: ConnectionArgs,

    /// Pause between scenario executions
    #[arg(long, value_parser = parse_duration, default_value = "60s")]
    pub interval: Duration,

    /// Re-login when the credentials are older than this
    #[arg(long, value_parser = parse_duration, default_value = "15m")]
    pub refresh_after: Duration,

    /// File to touch with liveness info after every execution
    #[arg(long)]
    pub health_file: Option<PathBuf>,

    /// Keep the session across laps instead of re-logging each wrap
    #[arg(long)]
    pub keep_session: bool,
}

#[derive(Debug, Args)]
pub struct RunArgs {
    #[command(flatten)]
    pub connection: ConnectionArgs,

    /// Scenario name (e.g. high_speed, normal, food, book, pay,
    /// consign, collect, rebook, cancel, parallel); omit to run the
    /// whole cycle list once in order
    pub scenario: Option<String>,

    /// Run N weighted-random scenarios instead of a fixed list
    #[arg(long, value_name = "N", conflicts_with = "scenario")]
    pub random: Option<u64>,

    /// Pause between scenario executions
    #[arg(long, value_parser = parse_duration, default_value = "1s")]
    pub interval: Duration,
}
