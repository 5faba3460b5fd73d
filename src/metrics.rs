//! Prometheus metrics collection for the arbiter
//!
//! Tracks:
//! - Requests by endpoint and outcome
//! - Pipeline stage failures and latency
//! - Judge decisions
//! - Streams cut short after the response status was sent
//!
//! Metrics are exposed via the `/metrics` endpoint in Prometheus text format.

use crate::error::Stage;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::sync::Arc;

/// HTTP endpoint label
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    /// `POST /stream/`
    Arbitrated,
    /// `POST /stream/direct`
    Direct,
}

impl Endpoint {
    pub fn as_str(&self) -> &'static str {
        match self {
            Endpoint::Arbitrated => "arbitrated",
            Endpoint::Direct => "direct",
        }
    }
}

/// Request outcome label
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::Failure => "failure",
        }
    }
}

/// Metrics collector
///
/// Label values come from closed enums, so cardinality stays bounded.
#[derive(Clone)]
pub struct Metrics {
    pub registry: Arc<Registry>,
    requests_total: IntCounterVec,
    stage_failures: IntCounterVec,
    stage_duration: HistogramVec,
    decisions: IntCounterVec,
    stream_interruptions: IntCounter,
}

impl Metrics {
    /// Create a new Metrics instance with its own registry
    ///
    /// # Errors
    ///
    /// Returns an error if metric registration fails (e.g., duplicate names).
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let requests_total = IntCounterVec::new(
            Opts::new(
                "arbiter_requests_total",
                "Total streaming requests by endpoint and outcome",
            ),
            &["endpoint", "outcome"],
        )?;

        let stage_failures = IntCounterVec::new(
            Opts::new(
                "arbiter_stage_failures_total",
                "Pipeline failures by the stage that raised them",
            ),
            &["stage"],
        )?;

        // Upstream model calls dominate; buckets span fast local models to slow judges
        let stage_duration = HistogramVec::new(
            HistogramOpts::new(
                "arbiter_stage_duration_ms",
                "Pipeline stage latency in milliseconds",
            )
            .buckets(vec![
                1.0, 10.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 10000.0, 30000.0,
                60000.0,
            ]),
            &["stage"],
        )?;

        let decisions = IntCounterVec::new(
            Opts::new("arbiter_decisions_total", "Judge decisions by value"),
            &["decision"],
        )?;

        let stream_interruptions = IntCounter::new(
            "arbiter_stream_interruptions_total",
            "Streams terminated by an upstream error after the response status was sent",
        )?;

        registry.register(Box::new(requests_total.clone()))?;
        registry.register(Box::new(stage_failures.clone()))?;
        registry.register(Box::new(stage_duration.clone()))?;
        registry.register(Box::new(decisions.clone()))?;
        registry.register(Box::new(stream_interruptions.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            requests_total,
            stage_failures,
            stage_duration,
            decisions,
            stream_interruptions,
        })
    }

    pub fn record_request(&self, endpoint: Endpoint, outcome: Outcome) {
        self.requests_total
            .with_label_values(&[endpoint.as_str(), outcome.as_str()])
            .inc();
    }

    pub fn record_stage_failure(&self, stage: Stage) {
        self.stage_failures
            .with_label_values(&[stage.as_str()])
            .inc();
    }

    pub fn record_stage_duration(&self, stage: Stage, duration_ms: f64) {
        self.stage_duration
            .with_label_values(&[stage.as_str()])
            .observe(duration_ms);
    }

    pub fn record_decision(&self, decision_label: &'static str) {
        self.decisions.with_label_values(&[decision_label]).inc();
    }

    pub fn record_stream_interruption(&self) {
        self.stream_interruptions.inc();
    }

    /// Current value of a request counter (tests and health reporting)
    pub fn requests_count(&self, endpoint: Endpoint, outcome: Outcome) -> u64 {
        self.requests_total
            .with_label_values(&[endpoint.as_str(), outcome.as_str()])
            .get()
    }

    /// Current value of a stage failure counter
    pub fn stage_failures_count(&self, stage: Stage) -> u64 {
        self.stage_failures
            .with_label_values(&[stage.as_str()])
            .get()
    }

    pub fn stream_interruptions_count(&self) -> u64 {
        self.stream_interruptions.get()
    }

    /// Render every metric in Prometheus text format
    pub fn gather(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer)
            .map_err(|e| prometheus::Error::Msg(format!("metrics output is not UTF-8: {}", e)))
    }
}
