use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry};
use std::collections::HashSet;

pub struct Metrics {
    request_counter: IntCounterVec,
    prediction_duration: HistogramVec,
    prediction_counter: IntCounterVec,
    error_counter: IntCounterVec,
    pub registry: Registry,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let request_counter = IntCounterVec::new(
            Opts::new("requests_total", "Total number of requests"),
            &["route"],
        )?;

        let prediction_duration = HistogramVec::new(
            HistogramOpts::new(
                "prediction_duration_ms",
                "Duration of prediction operations in milliseconds",
            )
            .buckets(generate_boundaries((10, 50, 100, 500, 2000))),
            &["route"],
        )?;

        let prediction_counter = IntCounterVec::new(
            Opts::new("predictions_total", "Successful predictions per disease"),
            &["disease"],
        )?;

        let error_counter = IntCounterVec::new(
            Opts::new("prediction_errors_total", "Failed predictions per error kind"),
            &["kind"],
        )?;

        registry.register(Box::new(request_counter.clone()))?;
        registry.register(Box::new(prediction_duration.clone()))?;
        registry.register(Box::new(prediction_counter.clone()))?;
        registry.register(Box::new(error_counter.clone()))?;

        Ok(Metrics {
            request_counter,
            prediction_duration,
            prediction_counter,
            error_counter,
            registry,
        })
    }

    pub fn record_request(&self, route: &str) {
        self.request_counter.with_label_values(&[route]).inc();
    }

    pub fn record_prediction_duration(&self, duration_ms: u64, route: &str) {
        self.prediction_duration
            .with_label_values(&[route])
            .observe(duration_ms as f64);
    }

    pub fn record_prediction(&self, disease: &str) {
        self.prediction_counter.with_label_values(&[disease]).inc();
    }

    pub fn record_error(&self, kind: &str) {
        self.error_counter.with_label_values(&[kind]).inc();
    }
}

/// Histogram buckets: step 10 up to the first boundary pair, then coarser
/// steps of 25, 100 and 500 for each following segment.
fn generate_boundaries(parts: (u32, u32, u32, u32, u32)) -> Vec<f64> {
    let first_part = (parts.0..=parts.1).step_by(10);
    let middle_part = (parts.1..=parts.2).step_by(25);
    let end_part = (parts.2..=parts.3).step_by(100);
    let tail_part = (parts.3..=parts.4).step_by(500);

    let mut seen = HashSet::new();
    first_part
        .chain(middle_part)
        .chain(end_part)
        .chain(tail_part)
        .filter(|&x| seen.insert(x))
        .map(f64::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use prometheus::{Encoder, TextEncoder};

    #[test]
    fn test_generate_boundaries() {
        let get = generate_boundaries((10, 30, 80, 280, 1280));
        let expected = vec![
            10.0, 20.0, 30.0, 55.0, 80.0, 180.0, 280.0, 780.0, 1280.0,
        ];

        assert_eq!(get, expected);
    }

    #[test]
    fn test_metrics_are_exported() {
        let metrics = Metrics::new().unwrap();
        metrics.record_request("/predict");
        metrics.record_prediction_duration(42, "/predict");
        metrics.record_prediction("FU-ringworm");
        metrics.record_error("decode");

        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&metrics.registry.gather(), &mut buffer)
            .unwrap();
        let text = String::from_utf8(buffer).unwrap();

        assert!(text.contains("requests_total{route=\"/predict\"} 1"));
        assert!(text.contains("prediction_duration_ms_count{route=\"/predict\"} 1"));
        assert!(text.contains("predictions_total{disease=\"FU-ringworm\"} 1"));
        assert!(text.contains("prediction_errors_total{kind=\"decode\"} 1"));
    }
}
