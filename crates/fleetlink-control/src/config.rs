//! Platform configuration records and the console configuration derived
//! from them.
//!
//! Two records feed the configuration: `default_config`, shipped with the
//! service, and an optional `config` override. Either one changing triggers
//! a full recomputation of [`ConsoleConfig`] together with facts queried
//! from the local router.

use std::str::FromStr;
use std::time::Duration;

use fleetlink_core::{identities, Bus, ConnectTarget, InstanceId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ControlError, Result};

/// Shortest allowed stats publish interval, in seconds.
pub const MIN_STATS_PUBLISH_INTERVAL: u64 = 20;

/// Name of the configuration record an event refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigName {
    /// The record shipped with the service.
    Default,
    /// The operator's override record.
    Config,
    /// Platform-level record; accepted and ignored.
    Platform,
}

impl ConfigName {
    /// The record name in the configuration store.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Default => "default_config",
            Self::Config => "config",
            Self::Platform => "platform",
        }
    }
}

impl FromStr for ConfigName {
    type Err = ControlError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "default_config" => Ok(Self::Default),
            "config" => Ok(Self::Config),
            "platform" => Ok(Self::Platform),
            other => Err(ControlError::InvalidConfig(format!(
                "unknown configuration name: {other}"
            ))),
        }
    }
}

/// What happened to a configuration record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ConfigAction {
    /// The record was created.
    New,
    /// The record was changed.
    Update,
    /// The record was removed.
    Delete,
}

/// A configuration change delivered by the configuration store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigEvent {
    /// Record name.
    pub name: String,
    /// Change kind.
    pub action: ConfigAction,
    /// Record contents; empty on delete.
    #[serde(default)]
    pub contents: Value,
}

/// A single ordered string replacement applied to device topics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicReplaceRule {
    /// Substring to replace.
    pub from: String,
    /// Replacement.
    pub to: String,
}

/// A platform configuration record as stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PlatformConfig {
    /// Seconds between console reconnect attempts.
    #[serde(default = "PlatformConfig::default_reconnect_interval")]
    pub volttron_central_reconnect_interval: u64,
    /// Console address (`http`, `https`, `tcp` or `ipc`).
    #[serde(default)]
    pub volttron_central_address: Option<String>,
    /// Console server key, required for `tcp` and `ipc` addresses.
    #[serde(default)]
    pub volttron_central_serverkey: Option<String>,
    /// Display name of this platform.
    #[serde(default)]
    pub instance_name: Option<String>,
    /// Seconds between CPU statistics publishes.
    #[serde(default = "PlatformConfig::default_stats_publish_interval")]
    pub stats_publish_interval: u64,
    /// Ordered topic anonymization rules.
    #[serde(default)]
    pub topic_replace_list: Vec<TopicReplaceRule>,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            volttron_central_reconnect_interval: Self::default_reconnect_interval(),
            volttron_central_address: None,
            volttron_central_serverkey: None,
            instance_name: None,
            stats_publish_interval: Self::default_stats_publish_interval(),
            topic_replace_list: Vec::new(),
        }
    }
}

impl PlatformConfig {
    const fn default_reconnect_interval() -> u64 {
        5
    }

    const fn default_stats_publish_interval() -> u64 {
        30
    }

    /// Parse a record from JSON.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::InvalidConfig` if the value is not a valid record.
    pub fn from_json(value: Value) -> Result<Self> {
        serde_json::from_value(value).map_err(|e| ControlError::InvalidConfig(e.to_string()))
    }

    /// Layer the keys present in `overrides` over this record.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::InvalidConfig` if the result is not a valid record.
    pub fn layered(&self, overrides: &Map<String, Value>) -> Result<Self> {
        let mut base = match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            Ok(_) => Map::new(),
            Err(e) => return Err(ControlError::InvalidConfig(e.to_string())),
        };
        base.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));
        Self::from_json(Value::Object(base))
    }
}

/// Facts about the local platform queried from the router.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouterFacts {
    /// External bus addresses of this platform.
    pub addresses: Vec<String>,
    /// This platform's server key.
    pub serverkey: Option<String>,
    /// Console address configured on the platform.
    pub console_address: Option<String>,
    /// Console server key configured on the platform.
    pub console_serverkey: Option<String>,
    /// Platform instance name.
    pub instance_name: Option<String>,
}

fn non_empty_string(value: Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s),
        _ => None,
    }
}

impl RouterFacts {
    /// Query every fact from the router, each bounded by `timeout`.
    ///
    /// # Errors
    ///
    /// Returns an error if any query fails.
    pub async fn query(bus: &dyn Bus, timeout: Duration) -> Result<Self> {
        let addresses = match bus.query("addresses", timeout).await? {
            Value::Array(items) => items.into_iter().filter_map(non_empty_string).collect(),
            Value::String(s) if !s.is_empty() => vec![s],
            _ => Vec::new(),
        };

        Ok(Self {
            addresses,
            serverkey: non_empty_string(bus.query("serverkey", timeout).await?),
            console_address: non_empty_string(
                bus.query("volttron-central-address", timeout).await?,
            ),
            console_serverkey: non_empty_string(
                bus.query("volttron-central-serverkey", timeout).await?,
            ),
            instance_name: non_empty_string(bus.query("instance-name", timeout).await?),
        })
    }
}

/// The console configuration for one configuration epoch.
#[derive(Debug, Clone, PartialEq)]
pub struct ConsoleConfig {
    /// Interval between console reconnect attempts.
    pub reconnect_interval: Duration,
    /// Console address as configured.
    pub console_address: Option<String>,
    /// Console server key as configured.
    pub console_serverkey: Option<String>,
    /// Resolved native bus address of the console.
    pub connect_address: Option<String>,
    /// Resolved server key of the console.
    pub connect_serverkey: Option<String>,
    /// Identifier of this platform instance.
    pub instance_id: Option<InstanceId>,
    /// Display name of this platform instance.
    pub instance_name: Option<String>,
    /// This platform's server key.
    pub local_serverkey: Option<String>,
    /// External addresses of this platform.
    pub external_addresses: Vec<String>,
    /// Ordered topic anonymization rules.
    pub topic_replace_list: Vec<TopicReplaceRule>,
    /// Interval between CPU statistics publishes.
    pub stats_publish_interval: Duration,
    /// Configuration epoch this value belongs to.
    pub epoch: u64,
}

fn is_blank(value: Option<&String>) -> bool {
    value.is_none_or(String::is_empty)
}

impl ConsoleConfig {
    /// Merge a configuration record with router facts.
    ///
    /// For `default_config` every non-empty fact overwrites the record. For
    /// `config` the override is layered over `defaults` and facts only fill
    /// values that are missing or empty. The resolved connect address and
    /// key are left unset; discovery fills them.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::InvalidConfig` if the override is not an object
    /// or the name is `platform`.
    pub fn merge(
        name: ConfigName,
        defaults: &PlatformConfig,
        overrides: Option<&Value>,
        facts: RouterFacts,
        epoch: u64,
    ) -> Result<Self> {
        let mut config = match (name, overrides) {
            (ConfigName::Default, _) | (ConfigName::Config, None | Some(Value::Null)) => {
                defaults.clone()
            }
            (ConfigName::Config, Some(Value::Object(map))) => defaults.layered(map)?,
            (ConfigName::Config, Some(_)) => {
                return Err(ControlError::InvalidConfig(
                    "config contents must be an object".to_string(),
                ))
            }
            (ConfigName::Platform, _) => {
                return Err(ControlError::InvalidConfig(
                    "platform record does not configure the console".to_string(),
                ))
            }
        };

        let fill = |slot: &mut Option<String>, fact: Option<String>| match name {
            ConfigName::Default => {
                if fact.is_some() {
                    *slot = fact;
                }
            }
            _ => {
                if is_blank(slot.as_ref()) {
                    *slot = fact;
                }
            }
        };
        fill(&mut config.volttron_central_address, facts.console_address);
        fill(
            &mut config.volttron_central_serverkey,
            facts.console_serverkey,
        );
        fill(&mut config.instance_name, facts.instance_name);

        let stats_interval = if config.stats_publish_interval < MIN_STATS_PUBLISH_INTERVAL {
            tracing::warn!(
                requested = config.stats_publish_interval,
                minimum = MIN_STATS_PUBLISH_INTERVAL,
                "Stats publish interval too short, using minimum"
            );
            MIN_STATS_PUBLISH_INTERVAL
        } else {
            config.stats_publish_interval
        };

        Ok(Self {
            reconnect_interval: Duration::from_secs(config.volttron_central_reconnect_interval),
            console_address: config.volttron_central_address,
            console_serverkey: config.volttron_central_serverkey,
            connect_address: None,
            connect_serverkey: None,
            instance_id: facts.addresses.first().map(|a| InstanceId::from_address(a)),
            instance_name: config.instance_name,
            local_serverkey: facts.serverkey,
            external_addresses: facts.addresses,
            topic_replace_list: config.topic_replace_list,
            stats_publish_interval: Duration::from_secs(stats_interval),
            epoch,
        })
    }

    /// First external address of this platform, as sent to the console.
    #[must_use]
    pub fn external_address(&self) -> Option<&str> {
        self.external_addresses.first().map(String::as_str)
    }

    /// Target for a console connection, if the console has been resolved.
    #[must_use]
    pub fn connect_target(&self) -> Option<ConnectTarget> {
        let address = self.connect_address.clone().filter(|a| !a.is_empty())?;
        let serverkey = self.connect_serverkey.clone().filter(|k| !k.is_empty())?;
        let identity = self
            .instance_name
            .clone()
            .or_else(|| self.instance_id.map(|id| id.to_hex()))
            .unwrap_or_else(|| identities::PLATFORM.to_string());

        Some(ConnectTarget {
            address,
            serverkey,
            peer: identities::CONSOLE.to_string(),
            identity,
        })
    }
}
