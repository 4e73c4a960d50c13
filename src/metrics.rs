//! Gauges published for the scraper.
//!
//! The collector only knows the [`GaugeSink`] interface. [`PrometheusSink`]
//! backs it with a `prometheus::Registry` that the HTTP exporter gathers
//! from; [`RecordingSink`] keeps the last value per series for tests.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use prometheus::{Gauge, GaugeVec, Opts, Registry};
use tracing::debug;

/// Resident memory of the measured process tree, in bytes.
pub const TOTAL_MEMORY_USAGE: &str = "total_memory_usage";
/// Installed physical memory of the machine, in bytes.
pub const MAX_MEMORY_USAGE: &str = "max_memory_usage";
/// Resident memory of the process attributed to a kernel, in bytes.
pub const KERNEL_MEMORY_USAGE: &str = "kernel_memory_usage";
/// Label of [`KERNEL_MEMORY_USAGE`].
pub const KERNEL_ID_LABEL: &str = "kernel_id";

/// Failure to set up the gauge registry.
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    #[error("failed to register gauge: {0}")]
    Register(#[from] prometheus::Error),
}

/// Write side of the metrics transport.
///
/// Each call overwrites the previous value of the `name` + `labels` series.
pub trait GaugeSink: Send + Sync {
    fn set_gauge(&self, name: &str, labels: &[(&str, &str)], value: f64);
}

impl<S: GaugeSink> GaugeSink for Arc<S> {
    fn set_gauge(&self, name: &str, labels: &[(&str, &str)], value: f64) {
        (**self).set_gauge(name, labels, value)
    }
}

/// Prometheus-backed gauge set.
#[derive(Clone)]
pub struct PrometheusSink {
    registry: Registry,
    total_memory_usage: Gauge,
    max_memory_usage: Gauge,
    kernel_memory_usage: GaugeVec,
}

impl PrometheusSink {
    /// Creates the three gauges and registers them in a fresh registry.
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let total_memory_usage = Gauge::with_opts(Opts::new(
            TOTAL_MEMORY_USAGE,
            "Resident memory of the notebook server and all its child processes in bytes.",
        ))?;
        let max_memory_usage = Gauge::with_opts(Opts::new(
            MAX_MEMORY_USAGE,
            "Total physical memory installed on the machine in bytes.",
        ))?;
        let kernel_memory_usage = GaugeVec::new(
            Opts::new(
                KERNEL_MEMORY_USAGE,
                "Resident memory of the process running each kernel in bytes.",
            ),
            &[KERNEL_ID_LABEL],
        )?;

        registry.register(Box::new(total_memory_usage.clone()))?;
        registry.register(Box::new(max_memory_usage.clone()))?;
        registry.register(Box::new(kernel_memory_usage.clone()))?;

        Ok(Self {
            registry,
            total_memory_usage,
            max_memory_usage,
            kernel_memory_usage,
        })
    }

    /// Registry to gather from when serving `/metrics`.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

impl GaugeSink for PrometheusSink {
    fn set_gauge(&self, name: &str, labels: &[(&str, &str)], value: f64) {
        match name {
            TOTAL_MEMORY_USAGE => self.total_memory_usage.set(value),
            MAX_MEMORY_USAGE => self.max_memory_usage.set(value),
            KERNEL_MEMORY_USAGE => {
                let kernel_id = labels
                    .iter()
                    .find(|(key, _)| *key == KERNEL_ID_LABEL)
                    .map(|(_, v)| *v);
                match kernel_id {
                    Some(kernel_id) => self
                        .kernel_memory_usage
                        .with_label_values(&[kernel_id])
                        .set(value),
                    None => debug!(name, "gauge set without kernel_id label"),
                }
            }
            _ => debug!(name, "unknown gauge"),
        }
    }
}

/// Identity of one series: name plus sorted labels.
pub type SeriesKey = (String, Vec<(String, String)>);

/// Sink that remembers the last value of every series.
#[derive(Debug, Default)]
pub struct RecordingSink {
    values: Mutex<BTreeMap<SeriesKey, f64>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last value set for `name` with exactly `labels`.
    pub fn get(&self, name: &str, labels: &[(&str, &str)]) -> Option<f64> {
        let key = series_key(name, labels);
        self.values
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&key)
            .copied()
    }

    /// Every series recorded so far.
    pub fn snapshot(&self) -> BTreeMap<SeriesKey, f64> {
        self.values.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Number of distinct series named `name`.
    pub fn series_count(&self, name: &str) -> usize {
        self.values
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .filter(|(n, _)| n == name)
            .count()
    }
}

impl GaugeSink for RecordingSink {
    fn set_gauge(&self, name: &str, labels: &[(&str, &str)], value: f64) {
        self.values
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(series_key(name, labels), value);
    }
}

fn series_key(name: &str, labels: &[(&str, &str)]) -> SeriesKey {
    let mut labels: Vec<(String, String)> = labels
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    labels.sort();
    (name.to_string(), labels)
}

#[cfg(test)]
mod tests {
    use super::*;
    use prometheus::{Encoder, TextEncoder};

    fn render(registry: &Registry) -> String {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&registry.gather(), &mut buffer)
            .unwrap();
        String::from_utf8(buffer).unwrap()
    }

    #[test]
    fn test_prometheus_sink_sets_all_families() {
        let sink = PrometheusSink::new().unwrap();
        sink.set_gauge(TOTAL_MEMORY_USAGE, &[], 15_000_000.0);
        sink.set_gauge(MAX_MEMORY_USAGE, &[], 17_179_869_184.0);
        sink.set_gauge(
            KERNEL_MEMORY_USAGE,
            &[(KERNEL_ID_LABEL, "K1")],
            50_000_000.0,
        );

        let text = render(sink.registry());
        assert!(text.contains("total_memory_usage 15000000"));
        assert!(text.contains("max_memory_usage 17179869184"));
        assert!(text.contains("kernel_memory_usage{kernel_id=\"K1\"} 50000000"));
    }

    #[test]
    fn test_prometheus_sink_overwrites() {
        let sink = PrometheusSink::new().unwrap();
        sink.set_gauge(TOTAL_MEMORY_USAGE, &[], 1.0);
        sink.set_gauge(TOTAL_MEMORY_USAGE, &[], 2.0);
        assert!(render(sink.registry()).contains("total_memory_usage 2\n"));
    }

    #[test]
    fn test_prometheus_sink_ignores_unknown_and_unlabelled() {
        let sink = PrometheusSink::new().unwrap();
        sink.set_gauge("something_else", &[], 1.0);
        sink.set_gauge(KERNEL_MEMORY_USAGE, &[], 1.0);

        let text = render(sink.registry());
        assert!(!text.contains("something_else"));
        assert!(!text.contains("kernel_memory_usage{"));
    }

    #[test]
    fn test_recording_sink() {
        let sink = RecordingSink::new();
        let k1 = [(KERNEL_ID_LABEL, "K1")];
        let k2 = [(KERNEL_ID_LABEL, "K2")];
        sink.set_gauge(KERNEL_MEMORY_USAGE, &k1, 1.0);
        sink.set_gauge(KERNEL_MEMORY_USAGE, &k2, 2.0);
        sink.set_gauge(KERNEL_MEMORY_USAGE, &k1, 3.0);

        assert_eq!(sink.get(KERNEL_MEMORY_USAGE, &k1), Some(3.0));
        assert_eq!(sink.series_count(KERNEL_MEMORY_USAGE), 2);
        assert_eq!(sink.get(TOTAL_MEMORY_USAGE, &[]), None);
    }
}
