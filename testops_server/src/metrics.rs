//! Prometheus metrics for Jenkins reconciliation.

use metrics::{counter, histogram};

/// Initialize metrics exporter (Prometheus).
pub fn init_metrics() {
    let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
    if let Err(e) = builder.install() {
        tracing::warn!("Failed to install Prometheus exporter: {}", e);
    }
}

/// Record one Jenkins API call.
pub fn jenkins_call(op: &'static str, ok: bool) {
    let outcome = if ok { "ok" } else { "error" };
    counter!("testops_jenkins_calls_total", "op" => op, "outcome" => outcome).increment(1);
}

/// Record a task status write.
pub fn task_status_changed(kind: &str, status: &str) {
    counter!(
        "testops_task_status_total",
        "kind" => kind.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record a build-completion webhook and how it was handled.
pub fn webhook_received(outcome: &'static str) {
    counter!("testops_webhooks_total", "outcome" => outcome).increment(1);
}

/// Record a stored report and its test count.
pub fn report_recorded(kind: &str, status: &str, total_tests: i32) {
    counter!(
        "testops_reports_recorded_total",
        "kind" => kind.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("testops_report_tests").record(f64::from(total_tests));
}
