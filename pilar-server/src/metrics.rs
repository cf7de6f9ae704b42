use crate::error::ErrorKind;
use metrics::{counter, gauge, histogram};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Prediction counters, mirrored to the `metrics` facade and rendered as
/// Prometheus text on `/metrics`
pub struct Metrics {
    requests_total: AtomicU64,
    predictions_total: AtomicU64,
    uncertain_total: AtomicU64,
    failures: RwLock<BTreeMap<ErrorKind, u64>>,
    inference_micros_sum: AtomicU64,
    inference_count: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            requests_total: AtomicU64::new(0),
            predictions_total: AtomicU64::new(0),
            uncertain_total: AtomicU64::new(0),
            failures: RwLock::new(BTreeMap::new()),
            inference_micros_sum: AtomicU64::new(0),
            inference_count: AtomicU64::new(0),
        }
    }

    pub fn record_request(&self) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
        counter!("pilar_predict_requests_total").increment(1);
    }

    pub fn record_success(&self, elapsed: Duration, uncertain: bool) {
        self.predictions_total.fetch_add(1, Ordering::Relaxed);
        self.inference_micros_sum
            .fetch_add(elapsed.as_micros().min(u64::MAX as u128) as u64, Ordering::Relaxed);
        self.inference_count.fetch_add(1, Ordering::Relaxed);
        counter!("pilar_predictions_total").increment(1);
        histogram!("pilar_inference_duration_ms").record(elapsed.as_secs_f64() * 1000.0);
        if uncertain {
            self.uncertain_total.fetch_add(1, Ordering::Relaxed);
            counter!("pilar_uncertain_predictions_total").increment(1);
        }
    }

    pub fn record_failure(&self, kind: ErrorKind) {
        *self.failures.write().entry(kind).or_insert(0) += 1;
        counter!("pilar_predict_failures_total", "kind" => kind.as_str()).increment(1);
    }

    pub fn set_model_ready(&self, ready: bool) {
        gauge!("pilar_model_ready").set(if ready { 1.0 } else { 0.0 });
    }

    pub fn requests(&self) -> u64 {
        self.requests_total.load(Ordering::Relaxed)
    }

    pub fn successes(&self) -> u64 {
        self.predictions_total.load(Ordering::Relaxed)
    }

    pub fn failures(&self, kind: ErrorKind) -> u64 {
        self.failures.read().get(&kind).copied().unwrap_or(0)
    }

    pub fn render_prometheus(&self, model_ready: bool, in_flight: usize) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "# HELP pilar_predict_requests_total Prediction requests received");
        let _ = writeln!(out, "# TYPE pilar_predict_requests_total counter");
        let _ = writeln!(out, "pilar_predict_requests_total {}", self.requests());

        let _ = writeln!(out, "# HELP pilar_predictions_total Successful predictions");
        let _ = writeln!(out, "# TYPE pilar_predictions_total counter");
        let _ = writeln!(out, "pilar_predictions_total {}", self.successes());

        let _ = writeln!(out, "# HELP pilar_uncertain_predictions_total Predictions flagged uncertain");
        let _ = writeln!(out, "# TYPE pilar_uncertain_predictions_total counter");
        let _ = writeln!(out, "pilar_uncertain_predictions_total {}", self.uncertain_total.load(Ordering::Relaxed));

        let _ = writeln!(out, "# HELP pilar_predict_failures_total Failed predictions by error kind");
        let _ = writeln!(out, "# TYPE pilar_predict_failures_total counter");
        let failures = self.failures.read();
        for kind in ErrorKind::ALL {
            let count = failures.get(&kind).copied().unwrap_or(0);
            let _ = writeln!(out, "pilar_predict_failures_total{{kind=\"{}\"}} {}", kind.as_str(), count);
        }

        let count = self.inference_count.load(Ordering::Relaxed);
        let sum_seconds = self.inference_micros_sum.load(Ordering::Relaxed) as f64 / 1_000_000.0;
        let _ = writeln!(out, "# HELP pilar_inference_duration_seconds Time spent extracting and predicting");
        let _ = writeln!(out, "# TYPE pilar_inference_duration_seconds summary");
        let _ = writeln!(out, "pilar_inference_duration_seconds_sum {}", sum_seconds);
        let _ = writeln!(out, "pilar_inference_duration_seconds_count {}", count);

        let _ = writeln!(out, "# HELP pilar_inference_in_flight Inference jobs currently running");
        let _ = writeln!(out, "# TYPE pilar_inference_in_flight gauge");
        let _ = writeln!(out, "pilar_inference_in_flight {}", in_flight);

        let _ = writeln!(out, "# HELP pilar_model_ready Whether the model artifact is loaded");
        let _ = writeln!(out, "# TYPE pilar_model_ready gauge");
        let _ = writeln!(out, "pilar_model_ready {}", u8::from(model_ready));
        out
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
