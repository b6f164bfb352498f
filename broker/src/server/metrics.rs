use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder};
use std::time::{Duration, Instant};

use super::error::{BrokerError, BrokerResult};

pub const CREDENTIALS_HANDLER: &str = "credentialsHandler";
pub const ROLE_NAME_HANDLER: &str = "roleNameHandler";

pub const SUCCESS: &str = "success";
pub const EMPTY_ROLE: &str = "emptyRole";
pub const LOOKUP_ERROR: &str = "lookupError";

const DURATION_BUCKETS: &[f64] = &[
    0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// Named timers and counters, injected per handler instance
pub trait MetricsSink: Send + Sync {
    /// Record one timed invocation of `timer`
    fn record_duration(&self, timer: &str, elapsed: Duration);

    /// Increment the `event` counter for `timer`
    fn mark(&self, timer: &str, event: &str);
}

/// Records elapsed time into a sink when dropped, so every return path is timed.
pub struct ScopedTimer<'a> {
    sink: &'a dyn MetricsSink,
    name: &'static str,
    started: Instant,
}

impl<'a> ScopedTimer<'a> {
    pub fn start(sink: &'a dyn MetricsSink, name: &'static str) -> Self {
        Self {
            sink,
            name,
            started: Instant::now(),
        }
    }
}

impl Drop for ScopedTimer<'_> {
    fn drop(&mut self) {
        self.sink
            .record_duration(self.name, self.started.elapsed());
    }
}

/// Prometheus-backed sink owning its own registry
#[derive(Clone)]
pub struct PrometheusMetrics {
    registry: Registry,
    durations: HistogramVec,
    events: IntCounterVec,
}

impl PrometheusMetrics {
    pub fn new() -> BrokerResult<Self> {
        let registry = Registry::new_custom(Some("role_broker".to_string()), None)
            .map_err(metrics_error)?;

        let durations = HistogramVec::new(
            HistogramOpts::new("handler_duration_seconds", "Handler latency in seconds")
                .buckets(DURATION_BUCKETS.to_vec()),
            &["handler"],
        )
        .map_err(metrics_error)?;
        let events = IntCounterVec::new(
            Opts::new("handler_events_total", "Handler outcomes by event name"),
            &["handler", "event"],
        )
        .map_err(metrics_error)?;

        registry
            .register(Box::new(durations.clone()))
            .map_err(metrics_error)?;
        registry
            .register(Box::new(events.clone()))
            .map_err(metrics_error)?;

        Ok(Self {
            registry,
            durations,
            events,
        })
    }

    #[cfg(test)]
    pub fn event_count(&self, timer: &str, event: &str) -> u64 {
        self.events.with_label_values(&[timer, event]).get()
    }

    /// Text exposition of everything in the registry
    pub fn render(&self) -> BrokerResult<String> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(metrics_error)?;
        String::from_utf8(buffer).map_err(|e| BrokerError::internal(e.to_string()))
    }
}

impl MetricsSink for PrometheusMetrics {
    fn record_duration(&self, timer: &str, elapsed: Duration) {
        self.durations
            .with_label_values(&[timer])
            .observe(elapsed.as_secs_f64());
    }

    fn mark(&self, timer: &str, event: &str) {
        self.events.with_label_values(&[timer, event]).inc();
    }
}

fn metrics_error(e: prometheus::Error) -> BrokerError {
    BrokerError::internal(format!("metrics: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registries_are_isolated() {
        let first = PrometheusMetrics::new().unwrap();
        let second = PrometheusMetrics::new().unwrap();

        first.mark(CREDENTIALS_HANDLER, SUCCESS);
        first.mark(CREDENTIALS_HANDLER, SUCCESS);

        assert_eq!(first.event_count(CREDENTIALS_HANDLER, SUCCESS), 2);
        assert_eq!(second.event_count(CREDENTIALS_HANDLER, SUCCESS), 0);
    }

    #[test]
    fn test_scoped_timer_records_on_drop() {
        let metrics = PrometheusMetrics::new().unwrap();
        {
            let _timer = ScopedTimer::start(&metrics, CREDENTIALS_HANDLER);
        }
        let rendered = metrics.render().unwrap();
        assert!(rendered.contains(
            "role_broker_handler_duration_seconds_count{handler=\"credentialsHandler\"} 1"
        ));
    }
}
