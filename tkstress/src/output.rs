use std::fmt::Write as _;

use tkstress_core::StatsSummary;

pub(crate) fn render_human(summary: &StatsSummary) -> String {
    let mut out = String::new();

    out.push_str("summary\n");
    writeln!(
        &mut out,
        "  requests: {} (ok {}, failed {})",
        summary.total_count, summary.success_count, summary.fail_count
    )
    .ok();
    writeln!(&mut out, "  error_rate: {:.2}%", summary.error_rate * 100.0).ok();
    writeln!(&mut out, "  elapsed: {:.2}s", summary.elapsed.as_secs_f64()).ok();
    writeln!(&mut out, "  qps: {:.2}", summary.qps).ok();
    writeln!(
        &mut out,
        "  latency = avg={:.2}ms min={:.2}ms max={:.2}ms",
        summary.avg_response_ms, summary.min_response_ms, summary.max_response_ms
    )
    .ok();
    writeln!(
        &mut out,
        "  percentiles = p90={:.2}ms p95={:.2}ms p99={:.2}ms stddev={:.2}ms",
        summary.p90_response_ms,
        summary.p95_response_ms,
        summary.p99_response_ms,
        summary.std_dev_response_ms
    )
    .ok();

    if !summary.errors_by_kind.is_empty() {
        out.push_str("  errors_by_kind:\n");
        for (kind, count) in &summary.errors_by_kind {
            writeln!(&mut out, "    {kind}: {count}").ok();
        }
    }

    if !summary.errors.is_empty() {
        writeln!(&mut out, "  first errors ({} shown):", summary.errors.len()).ok();
        for (i, error) in summary.errors.iter().enumerate() {
            writeln!(&mut out, "    {}. {error}", i + 1).ok();
        }
    }

    out
}

pub(crate) fn render_json(summary: &StatsSummary) -> String {
    let errors_by_kind: serde_json::Map<String, serde_json::Value> = summary
        .errors_by_kind
        .iter()
        .map(|(kind, count)| (kind.to_string(), serde_json::Value::from(*count)))
        .collect();

    serde_json::json!({
        "total_requests": summary.total_count,
        "success_count": summary.success_count,
        "fail_count": summary.fail_count,
        "error_rate": summary.error_rate,
        "total_time": summary.elapsed.as_secs_f64(),
        "qps": summary.qps,
        "avg_response_time": summary.avg_response_ms,
        "min_response_time": summary.min_response_ms,
        "max_response_time": summary.max_response_ms,
        "p90_response_time": summary.p90_response_ms,
        "p95_response_time": summary.p95_response_ms,
        "p99_response_time": summary.p99_response_ms,
        "std_dev_response_time": summary.std_dev_response_ms,
        "errors_by_kind": errors_by_kind,
        "errors": summary.errors,
    })
    .to_string()
}
