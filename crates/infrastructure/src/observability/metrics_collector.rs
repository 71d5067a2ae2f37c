//! 派单引擎指标
//!
//! 使用metrics门面记录，进程启动时可选安装Prometheus导出器。

use anyhow::Result;
use metrics::{counter, gauge, histogram, Counter, Gauge, Histogram};
use tracing::{debug, info, warn};

pub struct MetricsCollector {
    jobs_submitted_total: Counter,
    attempts_total: Counter,
    assignments_total: Counter,
    arbitration_conflicts_total: Counter,
    rejections_total: Counter,
    jobs_parked_total: Counter,
    notification_failures_total: Counter,
    recovered_jobs_total: Counter,

    queue_depth: Gauge,
    time_to_assign: Histogram,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            jobs_submitted_total: counter!("dispatch_jobs_submitted_total"),
            attempts_total: counter!("dispatch_attempts_total"),
            assignments_total: counter!("dispatch_assignments_total"),
            arbitration_conflicts_total: counter!("dispatch_arbitration_conflicts_total"),
            rejections_total: counter!("dispatch_rejections_total"),
            jobs_parked_total: counter!("dispatch_jobs_parked_total"),
            notification_failures_total: counter!("dispatch_notification_failures_total"),
            recovered_jobs_total: counter!("dispatch_recovered_jobs_total"),
            queue_depth: gauge!("dispatch_queue_depth"),
            time_to_assign: histogram!("dispatch_time_to_assign_seconds"),
        }
    }

    pub fn record_job_submitted(&self) {
        self.jobs_submitted_total.increment(1);
    }

    pub fn record_attempt(&self, order_id: &str, attempt: u32, candidates: usize) {
        self.attempts_total.increment(1);

        debug!(
            order_id = order_id,
            attempt = attempt,
            candidates = candidates,
            "Dispatch attempt started"
        );
    }

    pub fn record_assignment(&self, order_id: &str, courier_id: &str, seconds_since_created: f64) {
        self.assignments_total.increment(1);
        self.time_to_assign.record(seconds_since_created);

        info!(
            order_id = order_id,
            courier_id = courier_id,
            time_to_assign_seconds = seconds_since_created,
            "Order assigned"
        );
    }

    pub fn record_arbitration_conflict(&self) {
        self.arbitration_conflicts_total.increment(1);
    }

    pub fn record_rejection(&self) {
        self.rejections_total.increment(1);
    }

    pub fn record_job_parked(&self, order_id: &str, attempts: u32) {
        self.jobs_parked_total.increment(1);

        warn!(
            order_id = order_id,
            attempts = attempts,
            "Order parked waiting for couriers"
        );
    }

    pub fn record_notification_failure(&self, channel: &str) {
        self.notification_failures_total.increment(1);
        debug!(channel = channel, "Notification delivery failed");
    }

    pub fn record_recovered_jobs(&self, count: u64) {
        self.recovered_jobs_total.increment(count);
    }

    pub fn update_queue_depth(&self, depth: usize) {
        self.queue_depth.set(depth as f64);
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// 安装Prometheus导出器
pub fn init_metrics(port: u16) -> Result<()> {
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .map_err(|e| anyhow::anyhow!("Failed to install Prometheus exporter: {}", e))?;

    info!("Prometheus metrics exporter listening on :{}", port);
    Ok(())
}
