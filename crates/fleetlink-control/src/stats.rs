//! CPU statistics publishing.
//!
//! Samples CPU time shares and publishes them to the local datalogger topic
//! and, when the console is connected, to this platform's datalogger topic
//! on the console.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use fleetlink_core::{Bus, Headers, InstanceId};
use parking_lot::Mutex;
use serde_json::{json, Map, Value};

use crate::error::{ControlError, Result};
use crate::sink::ConsoleSink;

/// Local topic for CPU statistics.
pub const LOCAL_STATS_TOPIC: &str = "datalogger/platform/status/cpu";

/// Column names of the `cpu` line in `/proc/stat`.
const CPU_FIELDS: [&str; 10] = [
    "user",
    "nice",
    "system",
    "idle",
    "iowait",
    "irq",
    "softirq",
    "steal",
    "guest",
    "guest_nice",
];

/// One CPU statistics sample.
#[derive(Debug, Clone, PartialEq)]
pub struct CpuSample {
    /// Share of time per CPU state, in percent.
    pub times_percent: BTreeMap<String, f64>,
    /// Share of non-idle time, in percent.
    pub percent: f64,
}

impl CpuSample {
    /// The datalogger message for this sample.
    #[must_use]
    pub fn to_message(&self) -> Value {
        let reading = |v: f64| json!({"Readings": v, "Units": "double"});
        let mut message: Map<String, Value> = self
            .times_percent
            .iter()
            .map(|(k, v)| (format!("times_percent/{k}"), reading(*v)))
            .collect();
        message.insert("percent".to_string(), reading(self.percent));
        Value::Object(message)
    }
}

/// Source of CPU samples.
pub trait StatsSampler: Send + Sync {
    /// Take a sample covering the time since the previous one.
    ///
    /// # Errors
    ///
    /// Returns an error if the counters cannot be read.
    fn sample(&self) -> Result<CpuSample>;
}

/// Sampler reading the kernel's `/proc/stat` counters.
#[derive(Debug)]
pub struct ProcStatSampler {
    path: PathBuf,
    previous: Mutex<Option<Vec<u64>>>,
}

impl Default for ProcStatSampler {
    fn default() -> Self {
        Self::new("/proc/stat")
    }
}

impl ProcStatSampler {
    /// Create a sampler reading `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            previous: Mutex::new(None),
        }
    }
}

/// Parse the aggregate `cpu` line of `/proc/stat`.
fn parse_cpu_line(contents: &str) -> Option<Vec<u64>> {
    let line = contents
        .lines()
        .find(|l| l.split_whitespace().next() == Some("cpu"))?;
    let values: Vec<u64> = line
        .split_whitespace()
        .skip(1)
        .take(CPU_FIELDS.len())
        .map(str::parse)
        .collect::<std::result::Result<_, _>>()
        .ok()?;
    if values.len() < 4 {
        return None;
    }
    Some(values)
}

#[allow(clippy::cast_precision_loss)]
fn shares(deltas: &[u64]) -> CpuSample {
    // guest time is already counted in user and nice
    let total: u64 = deltas.iter().take(8).sum();
    let pct = |v: u64| {
        if total == 0 {
            0.0
        } else {
            (v as f64 * 1000.0 / total as f64).round() / 10.0
        }
    };

    let times_percent = CPU_FIELDS
        .iter()
        .zip(deltas)
        .map(|(name, v)| ((*name).to_string(), pct(*v)))
        .collect();
    let idle = deltas.get(3).copied().unwrap_or(0) + deltas.get(4).copied().unwrap_or(0);

    CpuSample {
        times_percent,
        percent: pct(total.saturating_sub(idle)),
    }
}

impl StatsSampler for ProcStatSampler {
    fn sample(&self) -> Result<CpuSample> {
        let contents = std::fs::read_to_string(&self.path).map_err(|e| {
            ControlError::Internal(format!("cannot read {}: {e}", self.path.display()))
        })?;
        let current = parse_cpu_line(&contents)
            .ok_or_else(|| ControlError::Internal("malformed cpu line".to_string()))?;

        let mut previous = self.previous.lock();
        let deltas: Vec<u64> = match previous.as_ref() {
            Some(prev) if prev.len() == current.len() => current
                .iter()
                .zip(prev)
                .map(|(now, before)| now.saturating_sub(*before))
                .collect(),
            _ => current.clone(),
        };
        *previous = Some(current);
        Ok(shares(&deltas))
    }
}

/// Sampler returning a fixed sample.
#[cfg(any(test, feature = "test-utils"))]
#[derive(Debug)]
pub struct MockSampler {
    /// The sample returned, or `None` to fail.
    pub sample: Mutex<Option<CpuSample>>,
}

#[cfg(any(test, feature = "test-utils"))]
impl MockSampler {
    /// A sampler reporting `percent` busy time.
    #[must_use]
    pub fn busy(percent: f64) -> Self {
        let mut times_percent = BTreeMap::new();
        times_percent.insert("user".to_string(), percent);
        times_percent.insert("idle".to_string(), 100.0 - percent);
        Self {
            sample: Mutex::new(Some(CpuSample {
                times_percent,
                percent,
            })),
        }
    }
}

#[cfg(any(test, feature = "test-utils"))]
impl StatsSampler for MockSampler {
    fn sample(&self) -> Result<CpuSample> {
        self.sample
            .lock()
            .clone()
            .ok_or_else(|| ControlError::Internal("no sample".to_string()))
    }
}

/// Publishes CPU statistics locally and to the console.
pub struct StatsPublisher {
    bus: Arc<dyn Bus>,
    sink: Arc<ConsoleSink>,
    sampler: Arc<dyn StatsSampler>,
}

impl StatsPublisher {
    /// Create a publisher.
    #[must_use]
    pub fn new(bus: Arc<dyn Bus>, sink: Arc<ConsoleSink>, sampler: Arc<dyn StatsSampler>) -> Self {
        Self { bus, sink, sampler }
    }

    /// The console topic for an instance.
    #[must_use]
    pub fn console_topic(id: &InstanceId) -> String {
        format!("datalogger/platforms/{id}/status/cpu")
    }

    /// Sample once and publish.
    ///
    /// # Errors
    ///
    /// Returns an error if sampling or the local publish fails. Console
    /// failures are logged only.
    pub async fn publish_once(&self) -> Result<()> {
        let message = self.sampler.sample()?.to_message();

        self.bus
            .publish(LOCAL_STATS_TOPIC, &Headers::new(), &message)
            .await?;

        if let Some(id) = self.sink.instance_id() {
            let topic = Self::console_topic(&id);
            match self.sink.try_publish_raw(&topic, &message).await {
                Ok(true) => tracing::debug!(topic = %topic, "Published stats to console"),
                Ok(false) => {}
                Err(e) => tracing::info!(topic = %topic, error = %e, "Stats publish to console failed"),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ConnectionManager;
    use fleetlink_core::mock::MockBus;
    use fleetlink_core::{identities, ConnectTarget};
    use std::io::Write;

    #[test]
    fn parse_proc_stat() {
        let contents = "cpu  100 0 50 800 50 0 0 0 0 0\ncpu0 100 0 50 800 50 0 0 0 0 0\n";
        let values = parse_cpu_line(contents).unwrap();
        assert_eq!(values, vec![100, 0, 50, 800, 50, 0, 0, 0, 0, 0]);
        assert!(parse_cpu_line("intr 1 2 3").is_none());
    }

    #[test]
    fn shares_are_percentages() {
        let sample = shares(&[100, 0, 50, 800, 50, 0, 0, 0, 0, 0]);
        assert!((sample.times_percent["idle"] - 80.0).abs() < f64::EPSILON);
        assert!((sample.percent - 15.0).abs() < f64::EPSILON);
    }

    #[test]
    fn second_sample_uses_deltas() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "cpu  100 0 0 900 0 0 0 0 0 0").unwrap();
        let sampler = ProcStatSampler::new(file.path());
        sampler.sample().unwrap();

        std::fs::write(file.path(), "cpu  150 0 0 950 0 0 0 0 0 0\n").unwrap();
        let sample = sampler.sample().unwrap();
        assert!((sample.percent - 50.0).abs() < f64::EPSILON);
    }

    #[test]
    fn message_shape() {
        let message = MockSampler::busy(25.0).sample().unwrap().to_message();
        assert_eq!(message["percent"]["Readings"], 25.0);
        assert_eq!(message["percent"]["Units"], "double");
        assert_eq!(message["times_percent/user"]["Readings"], 25.0);
    }

    #[tokio::test]
    async fn publishes_locally_and_to_console() {
        let bus = Arc::new(MockBus::new(identities::PLATFORM, "pk"));
        let connections = Arc::new(ConnectionManager::new(bus.clone()));
        let sink = Arc::new(ConsoleSink::new(connections.clone()));
        let id = InstanceId::from_address("tcp://10.0.0.5:22916");
        sink.set_instance_id(Some(id));
        let publisher = StatsPublisher::new(bus.clone(), sink, Arc::new(MockSampler::busy(10.0)));

        publisher.publish_once().await.unwrap();
        assert_eq!(bus.published()[0].topic, LOCAL_STATS_TOPIC);
        assert!(bus.console().published().is_empty());

        connections
            .get(Some(ConnectTarget {
                address: "tcp://10.0.0.1:22916".into(),
                serverkey: "vc-sk".into(),
                peer: identities::CONSOLE.into(),
                identity: "bldg-1".into(),
            }))
            .await
            .unwrap();
        publisher.publish_once().await.unwrap();
        assert_eq!(
            bus.console().published()[0].topic,
            StatsPublisher::console_topic(&id)
        );
    }
}
