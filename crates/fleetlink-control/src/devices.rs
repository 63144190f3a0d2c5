//! Device registry fed by telemetry publishes.
//!
//! Every `devices/<path>/all` publish upserts one record keyed by the
//! anonymized `<path>`. Records are never evicted; a device that stops
//! publishing turns BAD once its last publish is five minutes old.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Duration, Utc};
use fleetlink_core::{Headers, HealthStatus, Status, FORWARDED_HEADER};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::anonymize::TopicAnonymizer;
use crate::config::TopicReplaceRule;

/// Root segment of telemetry topics.
pub const DEVICES_ROOT: &str = "devices";

/// Final segment of whole-device publishes.
pub const ALL_SEGMENT: &str = "all";

/// Age at which a device is considered stale, in seconds.
pub const STALE_AFTER_SECS: i64 = 300;

/// The last publish seen for one device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRecord {
    /// Point names in the last publish, sorted.
    pub points: Vec<String>,
    /// When the last publish arrived.
    pub last_published_utc: DateTime<Utc>,
    /// Digest of the topic and point set.
    pub hash: String,
}

/// A device record annotated with its health.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceView {
    /// The record.
    #[serde(flatten)]
    pub record: DeviceRecord,
    /// Freshness of the record.
    pub health: HealthStatus,
}

/// Snapshot of every device plus the aggregate health.
#[derive(Debug, Clone, PartialEq)]
pub struct DevicesReport {
    /// Devices keyed by anonymized topic.
    pub devices: BTreeMap<String, DeviceView>,
    /// Aggregate health; `None` when no device has published.
    pub aggregate: Option<HealthStatus>,
}

/// Result of recording one publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceUpdate {
    /// Anonymized topic.
    pub topic: String,
    /// The stored record.
    pub record: DeviceRecord,
}

impl DeviceUpdate {
    /// The compact notice forwarded to the console.
    #[must_use]
    pub fn notice(&self) -> Value {
        json!({
            "hash": self.record.hash,
            "last_publish_utc": self.record.last_published_utc,
        })
    }
}

/// Extract the device key from a `devices/<path>/all` topic.
#[must_use]
pub fn device_key(topic: &str) -> Option<String> {
    let segments: Vec<&str> = topic.split('/').collect();
    match segments.as_slice() {
        [root, path @ .., last] if *root == DEVICES_ROOT && *last == ALL_SEGMENT => {
            if path.is_empty() {
                None
            } else {
                Some(path.join("/"))
            }
        }
        _ => None,
    }
}

/// Point names of a publish: `[points, metadata]` or a bare points object.
#[must_use]
pub fn point_names(message: &Value) -> Option<BTreeSet<String>> {
    let points = match message {
        Value::Array(items) => items.first()?,
        other => other,
    };
    points
        .as_object()
        .map(|map| map.keys().cloned().collect())
}

/// Digest of an anonymized topic and its point set.
#[must_use]
pub fn content_hash(topic: &str, points: &BTreeSet<String>) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(topic.as_bytes());
    for point in points {
        hasher.update(point.as_bytes());
    }
    hex::encode(hasher.finalize().as_bytes())
}

/// Health of a record at `now`.
#[must_use]
pub fn record_health(topic: &str, record: &DeviceRecord, now: DateTime<Utc>) -> HealthStatus {
    if record.last_published_utc <= now - Duration::seconds(STALE_AFTER_SECS) {
        HealthStatus {
            status: Status::Bad,
            context: Some(Value::from(format!("Too long between publishes for {topic}"))),
            last_updated: now,
        }
    } else {
        HealthStatus {
            status: Status::Good,
            context: None,
            last_updated: now,
        }
    }
}

/// In-memory registry of device records.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    anonymizer: TopicAnonymizer,
    records: RwLock<BTreeMap<String, DeviceRecord>>,
}

impl DeviceRegistry {
    /// Create an empty registry using `rules` to anonymize topics.
    #[must_use]
    pub fn new(rules: Vec<TopicReplaceRule>) -> Self {
        Self {
            anonymizer: TopicAnonymizer::new(rules),
            records: RwLock::new(BTreeMap::new()),
        }
    }

    /// Replace the anonymization rules.
    pub fn set_rules(&self, rules: Vec<TopicReplaceRule>) {
        self.anonymizer.set_rules(rules);
    }

    /// Record a telemetry publish. Returns `None` for forwarded messages,
    /// topics that are not whole-device publishes, and payloads without a
    /// points object.
    pub fn observe(
        &self,
        topic: &str,
        headers: &Headers,
        message: &Value,
        now: DateTime<Utc>,
    ) -> Option<DeviceUpdate> {
        if headers.contains_key(FORWARDED_HEADER) {
            return None;
        }
        let key = device_key(topic)?;
        let Some(points) = point_names(message) else {
            tracing::debug!(topic = %topic, "Ignoring device publish without points");
            return None;
        };

        let anon = self.anonymizer.anonymize(&key);
        let record = DeviceRecord {
            hash: content_hash(&anon, &points),
            points: points.into_iter().collect(),
            last_published_utc: now,
        };
        self.records.write().insert(anon.clone(), record.clone());

        Some(DeviceUpdate {
            topic: anon,
            record,
        })
    }

    /// One record by anonymized topic.
    #[must_use]
    pub fn get(&self, topic: &str) -> Option<DeviceRecord> {
        self.records.read().get(topic).cloned()
    }

    /// Copy of every record with health computed at `now`.
    #[must_use]
    pub fn report(&self, now: DateTime<Utc>) -> DevicesReport {
        let devices: BTreeMap<String, DeviceView> = self
            .records
            .read()
            .iter()
            .map(|(topic, record)| {
                let view = DeviceView {
                    health: record_health(topic, record, now),
                    record: record.clone(),
                };
                (topic.clone(), view)
            })
            .collect();

        let aggregate = if devices.is_empty() {
            None
        } else if devices.values().any(|v| v.health.status == Status::Bad) {
            Some(HealthStatus {
                status: Status::Bad,
                context: Some(Value::from(
                    "At least one device has not published in 5 minutes",
                )),
                last_updated: now,
            })
        } else {
            Some(HealthStatus {
                status: Status::Good,
                context: Some(Value::from("All devices publishing normally.")),
                last_updated: now,
            })
        };

        DevicesReport { devices, aggregate }
    }

    /// Number of known devices.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Whether no device has published yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}
