//! Health status reporting.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Coarse health of a device, an agent, or the platform itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
    /// Operating normally.
    Good,
    /// Degraded or stale.
    Bad,
    /// Not yet known.
    Unknown,
}

impl Status {
    /// Return the wire representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Good => "GOOD",
            Self::Bad => "BAD",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A status with optional context and the time it was last changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthStatus {
    /// Current status.
    pub status: Status,
    /// Free-form detail about the status.
    #[serde(default)]
    pub context: Option<Value>,
    /// When the status was last updated.
    pub last_updated: DateTime<Utc>,
}

impl HealthStatus {
    /// A fresh status stamped with the current time.
    #[must_use]
    pub fn new(status: Status) -> Self {
        Self {
            status,
            context: None,
            last_updated: Utc::now(),
        }
    }

    /// A fresh `UNKNOWN` status.
    #[must_use]
    pub fn unknown() -> Self {
        Self::new(Status::Unknown)
    }

    /// Replace the status and context, restamping the update time.
    pub fn update(&mut self, status: Status, context: Option<Value>) {
        self.status = status;
        self.context = context;
        self.last_updated = Utc::now();
    }
}

impl Default for HealthStatus {
    fn default() -> Self {
        Self::unknown()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_serializes_uppercase() {
        let json = serde_json::to_string(&Status::Good).unwrap();
        assert_eq!(json, "\"GOOD\"");
        let parsed: Status = serde_json::from_str("\"BAD\"").unwrap();
        assert_eq!(parsed, Status::Bad);
    }

    #[test]
    fn update_restamps() {
        let mut health = HealthStatus::unknown();
        let before = health.last_updated;
        health.update(Status::Good, Some(Value::from("ok")));
        assert_eq!(health.status, Status::Good);
        assert!(health.last_updated >= before);
    }
}
