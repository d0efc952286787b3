use crate::Error;
use prometheus::{HistogramVec, IntCounterVec, Registry, histogram_opts, opts};
use tokio::time::Instant;

#[derive(Clone)]
pub struct Metrics {
    pub operations: IntCounterVec,
    pub failures: IntCounterVec,
    pub conflict_retries: IntCounterVec,
    pub operation_duration: HistogramVec,
}

impl Default for Metrics {
    fn default() -> Self {
        let operation_duration = HistogramVec::new(
            histogram_opts!(
                "alert_management_operation_duration_seconds",
                "The duration of management operations to complete in seconds"
            )
            .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1., 5., 30.]),
            &["operation"],
        )
        .unwrap();
        let failures = IntCounterVec::new(
            opts!(
                "alert_management_operation_errors_total",
                "management operation errors",
            ),
            &["operation", "error"],
        )
        .unwrap();
        let operations = IntCounterVec::new(
            opts!(
                "alert_management_operations_total",
                "management operations"
            ),
            &["operation"],
        )
        .unwrap();
        let conflict_retries = IntCounterVec::new(
            opts!(
                "alert_management_conflict_retries_total",
                "writes retried after a conflicting concurrent update"
            ),
            &["kind"],
        )
        .unwrap();
        Metrics {
            operations,
            failures,
            conflict_retries,
            operation_duration,
        }
    }
}

impl Metrics {
    /// Register API metrics to start tracking them.
    pub fn register(self, registry: &Registry) -> Result<Self, prometheus::Error> {
        registry.register(Box::new(self.operation_duration.clone()))?;
        registry.register(Box::new(self.failures.clone()))?;
        registry.register(Box::new(self.operations.clone()))?;
        registry.register(Box::new(self.conflict_retries.clone()))?;
        Ok(self)
    }

    pub fn operation_failure(&self, operation: &str, e: &Error) {
        self.failures
            .with_label_values(&[operation, e.metric_label()])
            .inc()
    }

    pub fn conflict_retry(&self, kind: &str) {
        self.conflict_retries.with_label_values(&[kind]).inc()
    }

    pub fn count_and_measure(&self, operation: &'static str) -> OperationMeasurer {
        self.operations.with_label_values(&[operation]).inc();
        OperationMeasurer {
            start: Instant::now(),
            operation,
            metric: self.operation_duration.clone(),
        }
    }
}

/// Smart function duration measurer
///
/// Relies on Drop to calculate duration and register the observation in the histogram
pub struct OperationMeasurer {
    start: Instant,
    operation: &'static str,
    metric: HistogramVec,
}

impl Drop for OperationMeasurer {
    fn drop(&mut self) {
        #[allow(clippy::cast_precision_loss)]
        let duration = self.start.elapsed().as_millis() as f64 / 1000.0;
        self.metric
            .with_label_values(&[self.operation])
            .observe(duration);
    }
}
