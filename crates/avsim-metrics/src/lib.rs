//! Metric declarations for AVSim.
//!
//! Every metric the simulator emits is declared once in [`metric_defs`] as a
//! const [`Metric`] carrying its name, kind, description, unit and label keys.
//! Emission goes through the `metrics` facade (re-exported here); whichever
//! recorder the host installs receives the values.
//!
//! ```rust,ignore
//! use avsim_metrics::{describe_metrics, metric_defs, MetricLabels};
//!
//! describe_metrics();
//!
//! let labels = MetricLabels::new("node_003", "beacon");
//! metrics::counter!(metric_defs::RADIO_TX_BYTES.name, &labels.to_labels()).increment(1);
//! ```

pub use metrics;

use metrics::{describe_counter, describe_gauge, describe_histogram, Unit};

/// The kind of metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    /// Monotonically increasing.
    Counter,
    /// Can go up and down.
    Gauge,
    /// Distribution of samples.
    Histogram,
}

impl MetricKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Counter => "counter",
            MetricKind::Gauge => "gauge",
            MetricKind::Histogram => "histogram",
        }
    }
}

impl std::fmt::Display for MetricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A metric declaration.
///
/// Built with the const constructors so declarations live in `const` items:
///
/// ```rust
/// use avsim_metrics::{Metric, MetricKind};
/// use metrics::Unit;
///
/// const ROUNDS: Metric = Metric::counter("avsim.sync.rounds")
///     .with_description("Completed barrier rounds")
///     .with_unit(Unit::Count);
///
/// assert_eq!(ROUNDS.kind, MetricKind::Counter);
/// ```
#[derive(Debug, Clone)]
pub struct Metric {
    /// Metric name, dot separated (`avsim.<layer>.<what>`).
    pub name: &'static str,
    pub kind: MetricKind,
    pub description: &'static str,
    pub unit: Option<Unit>,
    /// Label keys the emitter attaches.
    pub labels: &'static [&'static str],
}

impl Metric {
    const fn new(name: &'static str, kind: MetricKind) -> Self {
        Self {
            name,
            kind,
            description: "",
            unit: None,
            labels: &[],
        }
    }

    /// Declare a counter.
    pub const fn counter(name: &'static str) -> Self {
        Self::new(name, MetricKind::Counter)
    }

    /// Declare a gauge.
    pub const fn gauge(name: &'static str) -> Self {
        Self::new(name, MetricKind::Gauge)
    }

    /// Declare a histogram.
    pub const fn histogram(name: &'static str) -> Self {
        Self::new(name, MetricKind::Histogram)
    }

    pub const fn with_description(mut self, description: &'static str) -> Self {
        self.description = description;
        self
    }

    pub const fn with_unit(mut self, unit: Unit) -> Self {
        self.unit = Some(unit);
        self
    }

    pub const fn with_labels(mut self, labels: &'static [&'static str]) -> Self {
        self.labels = labels;
        self
    }

    /// Register this metric's description with the installed recorder.
    pub fn describe(&self) {
        match (self.kind, self.unit) {
            (MetricKind::Counter, Some(unit)) => describe_counter!(self.name, unit, self.description),
            (MetricKind::Counter, None) => describe_counter!(self.name, self.description),
            (MetricKind::Gauge, Some(unit)) => describe_gauge!(self.name, unit, self.description),
            (MetricKind::Gauge, None) => describe_gauge!(self.name, self.description),
            (MetricKind::Histogram, Some(unit)) => {
                describe_histogram!(self.name, unit, self.description)
            }
            (MetricKind::Histogram, None) => describe_histogram!(self.name, self.description),
        }
    }

    /// The unit as a human-readable string (empty when unset).
    pub fn unit_str(&self) -> &'static str {
        match self.unit {
            Some(unit) => unit.as_str(),
            None => "",
        }
    }
}

/// All metric definitions.
pub mod metric_defs {
    use super::{Metric, Unit};

    /// Labels present on node-scoped metrics.
    pub const NODE_LABELS: &[&str] = &["node", "program"];

    // ========================================================================
    // Synchronization
    // ========================================================================

    /// Completed barrier rounds (equals the global time).
    pub const SYNC_ROUNDS: Metric = Metric::counter("avsim.sync.rounds")
        .with_description("Completed barrier rounds")
        .with_unit(Unit::Count);

    /// Time a participant spent parked at the meet.
    pub const SYNC_WAIT: Metric = Metric::histogram("avsim.sync.wait_us")
        .with_description("Time spent waiting at the barrier in microseconds")
        .with_unit(Unit::Microseconds)
        .with_labels(&["node"]);

    /// Registered barrier participants.
    pub const SYNC_PARTICIPANTS: Metric = Metric::gauge("avsim.sync.participants")
        .with_description("Registered barrier participants")
        .with_unit(Unit::Count);

    /// Global events fired by the clock coordinator.
    pub const SYNC_GLOBAL_EVENTS: Metric = Metric::counter("avsim.sync.global_events")
        .with_description("Global events fired")
        .with_unit(Unit::Count);

    // ========================================================================
    // Node clocks
    // ========================================================================

    /// Cycles simulated by a node.
    pub const CLOCK_CYCLES: Metric = Metric::counter("avsim.clock.cycles")
        .with_description("Cycles simulated by a node")
        .with_unit(Unit::Count)
        .with_labels(NODE_LABELS);

    /// Local events fired by a node's clock.
    pub const CLOCK_EVENTS_FIRED: Metric = Metric::counter("avsim.clock.events_fired")
        .with_description("Local clock events fired")
        .with_unit(Unit::Count)
        .with_labels(NODE_LABELS);

    // ========================================================================
    // Radio
    // ========================================================================

    /// Bytes written to the channel.
    pub const RADIO_TX_BYTES: Metric = Metric::counter("avsim.radio.tx_bytes")
        .with_description("Bytes written to the shared channel")
        .with_unit(Unit::Bytes)
        .with_labels(&["node"]);

    /// RSSI samples and byte reads taken from the channel.
    pub const RADIO_CHANNEL_SAMPLES: Metric = Metric::counter("avsim.radio.channel_samples")
        .with_description("Channel samples and reads")
        .with_unit(Unit::Count)
        .with_labels(&["node"]);

    /// Every declared metric, for [`describe_metrics`](super::describe_metrics).
    pub const ALL: &[&Metric] = &[
        &SYNC_ROUNDS,
        &SYNC_WAIT,
        &SYNC_PARTICIPANTS,
        &SYNC_GLOBAL_EVENTS,
        &CLOCK_CYCLES,
        &CLOCK_EVENTS_FIRED,
        &RADIO_TX_BYTES,
        &RADIO_CHANNEL_SAMPLES,
    ];
}

/// Label set for node-scoped metrics.
#[derive(Debug, Clone)]
pub struct MetricLabels {
    pub node: String,
    /// Workload running on the node.
    pub program: String,
}

impl MetricLabels {
    pub fn new(node: impl Into<String>, program: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            program: program.into(),
        }
    }

    /// The labels as key/value pairs for the `metrics` macros.
    pub fn to_labels(&self) -> Vec<(&'static str, String)> {
        vec![("node", self.node.clone()), ("program", self.program.clone())]
    }

    /// The labels plus `extra` pairs.
    pub fn with(&self, extra: &[(&'static str, String)]) -> Vec<(&'static str, String)> {
        let mut labels = self.to_labels();
        labels.extend_from_slice(extra);
        labels
    }
}

/// Describe every metric in [`metric_defs::ALL`]. Call once after installing
/// a recorder.
pub fn describe_metrics() {
    for metric in metric_defs::ALL {
        metric.describe();
    }
}

/// Install the Prometheus exporter listening on `addr` and describe all metrics.
#[cfg(feature = "prometheus")]
pub fn install_prometheus(
    addr: std::net::SocketAddr,
) -> Result<(), metrics_exporter_prometheus::BuildError> {
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    describe_metrics();
    Ok(())
}
