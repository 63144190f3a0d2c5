//! Platform liaison service implementation.
//!
//! This module provides the `ManagedPlatform` trait and the
//! `PlatformService` implementation that owns every piece of liaison state:
//! the console configuration, the console connection, registration, the
//! device registry and the background tasks.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use fleetlink_auth::{Authorizer, Caller, Capability, PublicKey};
use fleetlink_core::{
    identities, AgentUuid, Bus, Connection, Headers, HealthStatus, RpcParams,
};
use fleetlink_store::{Setting, Store};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde_json::{json, Value};

use crate::agents::{AgentInventory, AgentSummary};
use crate::bacnet::{
    parse_request, PropertyReader, PropsRequest, ProxyPropertyReader, ScanController, ScanRequest,
};
use crate::config::{ConfigAction, ConfigEvent, ConfigName, ConsoleConfig, PlatformConfig, RouterFacts};
use crate::connection::{ConnectionManager, LIVENESS_TIMEOUT};
use crate::control_client::{
    AgentStatusEntry, BusControlClient, ControlClient, LifecycleMethod, ProcessStatus,
};
use crate::devices::{DeviceRecord, DeviceRegistry, DeviceView};
use crate::discovery::{self, AddressScheme, DiscoveryClient, HttpDiscoveryClient};
use crate::error::{codes, ControlError, Result};
use crate::install::Installer;
use crate::registration::{Registration, RegistrationState};
use crate::retry::{RetryScheduler, REGISTRATION_PERIOD};
use crate::router::{self, params, Command};
use crate::sink::ConsoleSink;
use crate::stats::{ProcStatSampler, StatsPublisher, StatsSampler};

/// Timeout for each router fact query.
pub const FACT_TIMEOUT: Duration = Duration::from_secs(5);

/// Timeout for calls to the console.
pub const CONSOLE_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout for calls forwarded to agents.
pub const AGENT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout for the historian peer check.
pub const HISTORIAN_PEERS_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout for calls forwarded to the historian.
pub const HISTORIAN_TIMEOUT: Duration = Duration::from_secs(45);

/// Delay between a restart and the status snapshot returned for it.
pub const RESTART_SETTLE: Duration = Duration::from_millis(200);

/// User id recorded on the console's authorization entry.
const CONSOLE_USER_ID: &str = "vc";

/// Comment recorded on the console's authorization entry.
const CONSOLE_GRANT_COMMENT: &str = "Added by VCP";

/// Trait defining the operations the platform liaison exposes.
#[async_trait]
pub trait ManagedPlatform: Send + Sync {
    // =========================================================================
    // Configuration and Inbound Traffic
    // =========================================================================

    /// Apply a configuration store event.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::InvalidConfig` for an unknown record or invalid
    /// contents and `ControlError::InvalidAddress` for an unsupported console
    /// address. The previous configuration stays in effect on error.
    async fn configure(&self, event: ConfigEvent) -> Result<()>;

    /// Handle a device telemetry publish.
    async fn on_device_message(&self, topic: &str, headers: &Headers, message: &Value);

    /// Handle a BACnet I-Am announcement from a proxy.
    async fn on_iam(&self, sender: &str, message: &Value);

    // =========================================================================
    // Console Management
    // =========================================================================

    /// This platform's public key. Requires the manager capability.
    async fn get_publickey(&self, caller: &Caller) -> Result<String>;

    /// Accept management by the console at `address`. Returns this
    /// platform's public key, or `None` if the address is not the
    /// configured console.
    async fn manage(&self, caller: &Caller, address: &str) -> Result<Option<String>>;

    /// Record that the console no longer manages this platform.
    async fn unmanage(&self, caller: &Caller) -> Result<()>;

    /// Health of this platform.
    fn get_health(&self) -> HealthStatus;

    /// Hex instance id, once configured.
    fn get_instance_id(&self) -> Option<String>;

    /// Current registration state.
    fn registration_state(&self) -> RegistrationState;

    // =========================================================================
    // Agents
    // =========================================================================

    /// Installed agents with state, permissions and health.
    async fn list_agents(&self) -> Result<Vec<AgentSummary>>;

    /// Start an agent.
    async fn start_agent(&self, uuid: &AgentUuid) -> Result<Option<ProcessStatus>>;

    /// Stop an agent.
    async fn stop_agent(&self, uuid: &AgentUuid) -> Result<Option<ProcessStatus>>;

    /// Restart an agent and report its state shortly after.
    async fn restart_agent(&self, uuid: &AgentUuid) -> Result<Option<ProcessStatus>>;

    /// Process state of one agent.
    async fn agent_status(&self, uuid: &AgentUuid) -> Result<Option<ProcessStatus>>;

    /// Process state of every agent.
    async fn status_agents(&self) -> Result<Vec<AgentStatusEntry>>;

    /// Public keys of every agent.
    async fn get_public_keys(&self) -> Result<Value>;

    /// Always answers with a not-implemented error envelope.
    fn list_agent_methods(&self, id: &Value) -> Value;

    // =========================================================================
    // Devices
    // =========================================================================

    /// One device record by anonymized topic.
    fn get_device(&self, topic: &str) -> Option<DeviceRecord>;

    /// Every device with its health. Updates the platform health.
    fn get_devices(&self) -> BTreeMap<String, DeviceView>;

    // =========================================================================
    // Routing
    // =========================================================================

    /// Route a console request. Failures are returned as JSON-RPC error
    /// envelopes.
    async fn route_request(&self, id: Value, method: &str, params: Value) -> Value;

    // =========================================================================
    // BACnet
    // =========================================================================

    /// Start a BACnet I-Am scan through a proxy.
    async fn start_bacnet_scan(&self, request: ScanRequest) -> Result<()>;

    /// Read a device's properties in the background and publish them.
    async fn publish_bacnet_props(&self, request: PropsRequest) -> Result<Value>;

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Stop background tasks and close the console connection.
    async fn shutdown(&self);
}

/// Pluggable collaborators of the service.
pub struct Collaborators {
    /// Control plane client.
    pub control: Arc<dyn ControlClient>,
    /// Console discovery client.
    pub discovery: Arc<dyn DiscoveryClient>,
    /// BACnet property reader.
    pub reader: Arc<dyn PropertyReader>,
    /// CPU statistics source.
    pub sampler: Arc<dyn StatsSampler>,
}

impl Collaborators {
    /// The production collaborators for `bus`.
    #[must_use]
    pub fn for_bus(bus: &Arc<dyn Bus>) -> Self {
        Self {
            control: Arc::new(BusControlClient::new(Arc::clone(bus))),
            discovery: Arc::new(HttpDiscoveryClient::new()),
            reader: Arc::new(ProxyPropertyReader::new(Arc::clone(bus))),
            sampler: Arc::new(ProcStatSampler::default()),
        }
    }
}

/// Implementation of the platform liaison.
pub struct PlatformService<S: Store> {
    bus: Arc<dyn Bus>,
    store: Arc<S>,
    authorizer: Arc<dyn Authorizer>,
    control: Arc<dyn ControlClient>,
    discovery: Arc<dyn DiscoveryClient>,
    connections: Arc<ConnectionManager>,
    sink: Arc<ConsoleSink>,
    registration: Registration,
    registration_enabled: AtomicBool,
    defaults: RwLock<PlatformConfig>,
    overrides: RwLock<Option<Value>>,
    current: RwLock<Option<Arc<ConsoleConfig>>>,
    config_lock: tokio::sync::Mutex<()>,
    pending_config: Mutex<Option<ConfigEvent>>,
    epoch: AtomicU64,
    devices: DeviceRegistry,
    agents: AgentInventory,
    installer: Installer,
    scans: ScanController,
    stats: StatsPublisher,
    health: RwLock<HealthStatus>,
    registration_task: Mutex<Option<RetryScheduler>>,
    stats_task: Mutex<Option<RetryScheduler>>,
}

fn to_json<T: Serialize>(value: &T) -> Result<Value> {
    serde_json::to_value(value).map_err(|e| ControlError::Internal(e.to_string()))
}

impl<S: Store + 'static> PlatformService<S> {
    /// Create a new platform service.
    #[must_use]
    pub fn new(
        bus: Arc<dyn Bus>,
        store: Arc<S>,
        authorizer: Arc<dyn Authorizer>,
        defaults: PlatformConfig,
        parts: Collaborators,
    ) -> Self {
        let connections = Arc::new(ConnectionManager::new(Arc::clone(&bus)));
        let sink = Arc::new(ConsoleSink::new(Arc::clone(&connections)));

        Self {
            agents: AgentInventory::new(Arc::clone(&bus), Arc::clone(&parts.control)),
            installer: Installer::new(Arc::clone(&parts.control)),
            scans: ScanController::new(Arc::clone(&bus), parts.reader, Arc::clone(&sink)),
            stats: StatsPublisher::new(Arc::clone(&bus), Arc::clone(&sink), parts.sampler),
            devices: DeviceRegistry::new(defaults.topic_replace_list.clone()),
            bus,
            store,
            authorizer,
            control: parts.control,
            discovery: parts.discovery,
            connections,
            sink,
            registration: Registration::new(),
            registration_enabled: AtomicBool::new(false),
            defaults: RwLock::new(defaults),
            overrides: RwLock::new(None),
            current: RwLock::new(None),
            config_lock: tokio::sync::Mutex::new(()),
            pending_config: Mutex::new(None),
            epoch: AtomicU64::new(0),
            health: RwLock::new(HealthStatus::unknown()),
            registration_task: Mutex::new(None),
            stats_task: Mutex::new(None),
        }
    }

    /// Create a service with the production collaborators.
    #[must_use]
    pub fn with_defaults(
        bus: Arc<dyn Bus>,
        store: Arc<S>,
        authorizer: Arc<dyn Authorizer>,
        defaults: PlatformConfig,
    ) -> Self {
        let parts = Collaborators::for_bus(&bus);
        Self::new(bus, store, authorizer, defaults, parts)
    }

    /// Spawn the registration and stats tasks.
    pub fn start(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        let registration = RetryScheduler::spawn("registration", REGISTRATION_PERIOD, move || {
            let weak = weak.clone();
            async move {
                match weak.upgrade() {
                    Some(service) => service.tick().await,
                    None => Ok(()),
                }
            }
        });

        let weak = Arc::downgrade(self);
        let period = weak.clone();
        let stats = RetryScheduler::spawn_with(
            "stats",
            move || {
                period
                    .upgrade()
                    .map_or(Duration::from_secs(30), |service| service.stats_interval())
            },
            move || {
                let weak = weak.clone();
                async move {
                    match weak.upgrade() {
                        Some(service) => service.stats.publish_once().await,
                        None => Ok(()),
                    }
                }
            },
        );

        *self.registration_task.lock() = Some(registration);
        *self.stats_task.lock() = Some(stats);
        tracing::info!("Platform service started");
    }

    /// The configuration of the current epoch.
    #[must_use]
    pub fn config(&self) -> Option<Arc<ConsoleConfig>> {
        self.current.read().clone()
    }

    /// The store holding settings and grants.
    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    fn stats_interval(&self) -> Duration {
        self.config()
            .map_or(Duration::from_secs(30), |c| c.stats_publish_interval)
    }

    /// One registration attempt.
    ///
    /// # Errors
    ///
    /// Returns an error if connecting or registering fails. The scheduler
    /// logs it and tries again on the next tick.
    pub async fn tick(&self) -> Result<()> {
        let pending = self.pending_config.lock().take();
        if let Some(event) = pending {
            tracing::info!(config = %event.name, "Retrying configuration");
            self.configure(event).await?;
        }

        if !self.registration_enabled.load(Ordering::SeqCst) {
            tracing::debug!("Registration not enabled yet");
            return Ok(());
        }
        let Some(config) = self.resolved_config().await else {
            return Ok(());
        };

        let Some(conn) = self.connections.get(config.connect_target()).await? else {
            tracing::debug!("No console connection available");
            return Ok(());
        };

        if !self.registration.begin_attempt() {
            tracing::debug!(state = %self.registration.state(), "No registration needed");
            return Ok(());
        }
        let result = self.register(&config, &conn).await;
        self.registration.finish_attempt();
        result
    }

    async fn register(&self, config: &ConsoleConfig, conn: &Arc<dyn Connection>) -> Result<()> {
        let key = conn
            .call("get_publickey", RpcParams::None, CONSOLE_TIMEOUT)
            .await?;
        let key = key
            .as_str()
            .ok_or_else(|| ControlError::Internal("console returned no public key".to_string()))?;
        let key = PublicKey::parse(key)?;

        self.authorizer
            .grant(&key, CONSOLE_USER_ID, &Capability::Manager, CONSOLE_GRANT_COMMENT)?;

        let params = RpcParams::named([
            ("address", json!(config.external_address())),
            ("display_name", json!(config.instance_name)),
            ("vcpserverkey", json!(config.local_serverkey)),
            ("vcpagentkey", json!(self.bus.public_key())),
        ]);
        conn.call("register_instance", params, CONSOLE_TIMEOUT)
            .await?;

        tracing::info!(
            address = ?config.external_address(),
            display_name = ?config.instance_name,
            "Sent registration to console"
        );
        Ok(())
    }

    /// The current configuration, resolving the console address first if an
    /// earlier discovery failed.
    async fn resolved_config(&self) -> Option<Arc<ConsoleConfig>> {
        let config = self.config()?;
        if config.connect_address.is_some() {
            return Some(config);
        }
        let Some(address) = config.console_address.as_deref() else {
            return Some(config);
        };

        match discovery::resolve(
            self.discovery.as_ref(),
            address,
            config.console_serverkey.as_deref(),
        )
        .await
        {
            Ok(resolved) => {
                let mut updated = (*config).clone();
                updated.connect_address = Some(resolved.address);
                updated.connect_serverkey = resolved.serverkey;
                let updated = Arc::new(updated);

                let mut current = self.current.write();
                if current.as_ref().is_some_and(|c| c.epoch == updated.epoch) {
                    *current = Some(Arc::clone(&updated));
                    self.sink.set_target(updated.connect_target());
                }
                Some(updated)
            }
            Err(e) => {
                tracing::warn!(address = %address, error = %e, "Console discovery failed");
                Some(config)
            }
        }
    }

    async fn apply_config(&self, name: ConfigName, event: ConfigEvent) -> Result<()> {
        match (name, event.action) {
            (ConfigName::Default, ConfigAction::Delete) | (ConfigName::Platform, _) => {}
            (ConfigName::Default, _) => {
                if event.contents.is_object() {
                    *self.defaults.write() = PlatformConfig::from_json(event.contents)?;
                }
            }
            (ConfigName::Config, ConfigAction::Delete) => *self.overrides.write() = None,
            (ConfigName::Config, _) => *self.overrides.write() = Some(event.contents),
        }

        let defaults = self.defaults.read().clone();
        let overrides = self.overrides.read().clone();
        let merge_as = if overrides.is_some() {
            ConfigName::Config
        } else {
            ConfigName::Default
        };

        let facts = RouterFacts::query(self.bus.as_ref(), FACT_TIMEOUT).await?;
        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        let mut config = ConsoleConfig::merge(merge_as, &defaults, overrides.as_ref(), facts, epoch)?;

        let previous = self.config();
        let same_console = previous.as_ref().is_some_and(|p| {
            p.console_address == config.console_address
                && p.console_serverkey == config.console_serverkey
        });

        if let Some(address) = config.console_address.clone() {
            AddressScheme::classify(&address)?;
            match discovery::resolve(
                self.discovery.as_ref(),
                &address,
                config.console_serverkey.as_deref(),
            )
            .await
            {
                Ok(resolved) => {
                    config.connect_address = Some(resolved.address);
                    config.connect_serverkey = resolved.serverkey;
                }
                Err(e) => {
                    tracing::warn!(address = %address, error = %e, "Console discovery failed, will retry");
                    // Keep the last resolution for an unchanged console.
                    if let Some(prev) = previous.as_ref().filter(|_| same_console) {
                        config.connect_address.clone_from(&prev.connect_address);
                        config.connect_serverkey.clone_from(&prev.connect_serverkey);
                    }
                }
            }
        }

        let previous_connect = previous.as_ref().and_then(|p| p.connect_address.clone());
        let moved = previous_connect.is_some()
            && (!same_console
                || (config.connect_address.is_some() && previous_connect != config.connect_address));
        if moved {
            tracing::info!(
                previous = ?previous_connect,
                current = ?config.connect_address,
                "Console address changed"
            );
            self.connections.close().await;
            self.registration.transition(RegistrationState::NotRegistered)?;
        }

        self.sink.set_instance_id(config.instance_id);
        self.sink.set_target(config.connect_target());
        self.devices.set_rules(config.topic_replace_list.clone());

        tracing::info!(
            epoch,
            instance_name = ?config.instance_name,
            console = ?config.connect_address,
            "Applied platform configuration"
        );
        *self.current.write() = Some(Arc::new(config));
        Ok(())
    }

    async fn dispatch(&self, command: Command, params: Value) -> Result<Value> {
        match command {
            Command::ListAgents => to_json(&self.agents.list().await?),
            Command::GetDevices => to_json(&self.get_devices()),
            Command::StatusAgents => to_json(&self.control.status_agents().await?),
            Command::GetSetting => {
                let key = params::required_str(&params, "key")?;
                Ok(self
                    .store
                    .get_setting(key)?
                    .map_or(Value::Null, |setting| setting.value))
            }
            Command::SetSetting => {
                let key = params::required_str(&params, "key")?;
                let value = params::required(&params, "value")?.clone();
                self.store.put_setting(&Setting::new(key, value))?;
                tracing::debug!(key = %key, "Stored setting");
                Ok(Value::Null)
            }
            Command::Lifecycle(method) => {
                let uuid = params::agent_uuid(&params)?;
                self.route_lifecycle(method, &uuid).await
            }
            Command::Install => to_json(&self.installer.install(&params).await?),
            Command::Historian { method } => self.call_historian(&method, params).await,
            Command::AgentCall { agent, method } => self.call_agent(&agent, &method, params).await,
            Command::Unknown(name) => Err(ControlError::MethodNotFound(name)),
        }
    }

    async fn route_lifecycle(&self, method: LifecycleMethod, uuid: &AgentUuid) -> Result<Value> {
        let status = self.control.lifecycle(method, uuid).await?;
        let status = match (method, status) {
            (LifecycleMethod::AgentStatus, status) => status,
            (LifecycleMethod::StopAgent, _) | (_, None) => {
                self.control
                    .lifecycle(LifecycleMethod::AgentStatus, uuid)
                    .await?
            }
            (_, status) => status,
        };
        status.map_or(Ok(Value::Null), |s| to_json(&s))
    }

    async fn call_historian(&self, method: &str, params: Value) -> Result<Value> {
        let peers = self.bus.peers(HISTORIAN_PEERS_TIMEOUT).await?;
        if !peers.iter().any(|p| p == identities::HISTORIAN) {
            return Err(ControlError::InvalidParams("historian unavailable".to_string()));
        }
        Ok(self
            .bus
            .call(
                identities::HISTORIAN,
                method,
                RpcParams::from_value(params),
                HISTORIAN_TIMEOUT,
            )
            .await?)
    }

    async fn call_agent(&self, agent: &str, method: &str, params: Value) -> Result<Value> {
        match method {
            "start_bacnet_scan" => {
                let request = parse_request(&RpcParams::from_value(params))?;
                self.start_bacnet_scan(request).await?;
                Ok(Value::Null)
            }
            "publish_bacnet_props" => {
                let request = parse_request(&RpcParams::from_value(params))?;
                self.publish_bacnet_props(request).await
            }
            _ => {
                let uuid = AgentUuid::parse(agent)
                    .map_err(|e| ControlError::InvalidParams(format!("invalid agent uuid: {e}")))?;
                let identity = self
                    .control
                    .agent_vip_identity(&uuid)
                    .await?
                    .ok_or_else(|| ControlError::Unreachable(format!("agent {uuid}")))?;

                tracing::debug!(identity = %identity, method = %method, "Forwarding console call");
                Ok(self
                    .bus
                    .call(&identity, method, RpcParams::from_value(params), AGENT_CALL_TIMEOUT)
                    .await?)
            }
        }
    }
}

#[async_trait]
impl<S: Store + 'static> ManagedPlatform for PlatformService<S> {
    // =========================================================================
    // Configuration and Inbound Traffic
    // =========================================================================

    async fn configure(&self, event: ConfigEvent) -> Result<()> {
        let name: ConfigName = event.name.parse()?;
        if name == ConfigName::Platform {
            tracing::debug!("Ignoring platform configuration record");
            return Ok(());
        }

        let _guard = self.config_lock.lock().await;
        self.registration_enabled.store(false, Ordering::SeqCst);
        let result = self.apply_config(name, event.clone()).await;
        self.registration_enabled
            .store(self.config().is_some(), Ordering::SeqCst);

        match &result {
            Err(e) if e.is_retriable() => {
                tracing::warn!(config = name.as_str(), error = %e, "Configuration failed, will retry");
                *self.pending_config.lock() = Some(event);
            }
            Err(e) => {
                tracing::error!(config = name.as_str(), error = %e, "Configuration rejected");
            }
            Ok(()) => *self.pending_config.lock() = None,
        }
        if result.is_ok() {
            if let Some(task) = self.registration_task.lock().as_ref() {
                task.trigger();
            }
        }
        result
    }

    async fn on_device_message(&self, topic: &str, headers: &Headers, message: &Value) {
        let Some(update) = self.devices.observe(topic, headers, message, Utc::now()) else {
            return;
        };
        let notice = update.notice();

        let sent = match self.sink.topic(&format!("devices/{}", update.topic)) {
            Some(remote) => match self.sink.try_publish_raw(&remote, &notice).await {
                Ok(sent) => sent,
                Err(e) => {
                    tracing::warn!(topic = %remote, error = %e, "Device notice to console failed");
                    false
                }
            },
            None => false,
        };

        if !sent {
            let local = format!("platform/devices/{}", update.topic);
            if let Err(e) = self.bus.publish(&local, &Headers::new(), &notice).await {
                tracing::warn!(topic = %local, error = %e, "Local device notice failed");
            }
        }
    }

    async fn on_iam(&self, sender: &str, message: &Value) {
        self.scans.on_iam(sender, message).await;
    }

    // =========================================================================
    // Console Management
    // =========================================================================

    async fn get_publickey(&self, caller: &Caller) -> Result<String> {
        self.authorizer.authorize(caller, &Capability::Manager)?;
        Ok(self.bus.public_key())
    }

    async fn manage(&self, caller: &Caller, address: &str) -> Result<Option<String>> {
        self.authorizer.authorize(caller, &Capability::Manager)?;

        let Some(config) = self.config() else {
            tracing::warn!(address = %address, "Manage request before configuration");
            return Ok(None);
        };
        let known = [
            config.connect_address.as_deref(),
            config.console_address.as_deref(),
        ];
        if !known.contains(&Some(address)) {
            tracing::warn!(address = %address, "Managed by different console");
            return Ok(None);
        }

        let reachable = match self.connections.get(config.connect_target()).await? {
            Some(conn) => conn.is_peer_connected(LIVENESS_TIMEOUT).await,
            None => false,
        };
        if reachable {
            self.registration.transition(RegistrationState::Registered)?;
            tracing::info!(address = %address, "Platform managed by console");
        } else {
            self.registration.transition(RegistrationState::NotRegistered)?;
            tracing::warn!(address = %address, "Console not reachable during manage");
        }

        Ok(Some(self.bus.public_key()))
    }

    async fn unmanage(&self, caller: &Caller) -> Result<()> {
        self.authorizer.authorize(caller, &Capability::Manager)?;
        self.registration.transition(RegistrationState::Unregistered)?;
        tracing::info!("Platform unmanaged by console");
        Ok(())
    }

    fn get_health(&self) -> HealthStatus {
        self.health.read().clone()
    }

    fn get_instance_id(&self) -> Option<String> {
        self.sink.instance_id().map(|id| id.to_hex())
    }

    fn registration_state(&self) -> RegistrationState {
        self.registration.state()
    }

    // =========================================================================
    // Agents
    // =========================================================================

    async fn list_agents(&self) -> Result<Vec<AgentSummary>> {
        self.agents.list().await
    }

    async fn start_agent(&self, uuid: &AgentUuid) -> Result<Option<ProcessStatus>> {
        tracing::info!(uuid = %uuid, "Starting agent");
        self.control.lifecycle(LifecycleMethod::StartAgent, uuid).await
    }

    async fn stop_agent(&self, uuid: &AgentUuid) -> Result<Option<ProcessStatus>> {
        tracing::info!(uuid = %uuid, "Stopping agent");
        self.control.lifecycle(LifecycleMethod::StopAgent, uuid).await
    }

    async fn restart_agent(&self, uuid: &AgentUuid) -> Result<Option<ProcessStatus>> {
        tracing::info!(uuid = %uuid, "Restarting agent");
        self.control
            .lifecycle(LifecycleMethod::RestartAgent, uuid)
            .await?;
        tokio::time::sleep(RESTART_SETTLE).await;
        self.agent_status(uuid).await
    }

    async fn agent_status(&self, uuid: &AgentUuid) -> Result<Option<ProcessStatus>> {
        self.control
            .lifecycle(LifecycleMethod::AgentStatus, uuid)
            .await
    }

    async fn status_agents(&self) -> Result<Vec<AgentStatusEntry>> {
        self.control.status_agents().await
    }

    async fn get_public_keys(&self) -> Result<Value> {
        self.control.agents_publickeys().await
    }

    fn list_agent_methods(&self, id: &Value) -> Value {
        router::error_envelope(id, codes::INTERNAL_ERROR, "Not implemented")
    }

    // =========================================================================
    // Devices
    // =========================================================================

    fn get_device(&self, topic: &str) -> Option<DeviceRecord> {
        self.devices.get(topic)
    }

    fn get_devices(&self) -> BTreeMap<String, DeviceView> {
        let report = self.devices.report(Utc::now());
        if let Some(aggregate) = report.aggregate {
            *self.health.write() = aggregate;
        }
        report.devices
    }

    // =========================================================================
    // Routing
    // =========================================================================

    async fn route_request(&self, id: Value, method: &str, params: Value) -> Value {
        tracing::debug!(method = %method, "Routing console request");
        match self.dispatch(Command::parse(method), params).await {
            Ok(value) => router::normalize_result(value),
            Err(e) => {
                tracing::warn!(method = %method, error = %e, "Console request failed");
                router::error_reply(&id, &e)
            }
        }
    }

    // =========================================================================
    // BACnet
    // =========================================================================

    async fn start_bacnet_scan(&self, request: ScanRequest) -> Result<()> {
        self.scans.start(request).await.map(|_handle| ())
    }

    async fn publish_bacnet_props(&self, request: PropsRequest) -> Result<Value> {
        let (reply, _task) = self.scans.publish_props(request);
        Ok(reply)
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    async fn shutdown(&self) {
        for slot in [&self.registration_task, &self.stats_task] {
            if let Some(task) = slot.lock().take() {
                task.shutdown();
            }
        }
        self.scans.shutdown();
        self.connections.close().await;
        tracing::info!("Platform service stopped");
    }
}
