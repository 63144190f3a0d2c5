//! Router method names parsed into commands.

use crate::control_client::LifecycleMethod;

/// Method prefix routed to the platform historian.
pub const HISTORIAN_PREFIX: &str = "historian";

/// A router method, classified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `list_agents`
    ListAgents,
    /// `get_devices`
    GetDevices,
    /// `status_agents`
    StatusAgents,
    /// `get_setting`
    GetSetting,
    /// `set_setting`
    SetSetting,
    /// One of the agent lifecycle operations.
    Lifecycle(LifecycleMethod),
    /// `install`
    Install,
    /// `historian.<method>`
    Historian {
        /// Method called on the historian.
        method: String,
    },
    /// `<namespace>.<agent>.<method...>` or `<namespace>.uuid.<agent>.<method...>`
    AgentCall {
        /// Agent uuid.
        agent: String,
        /// Dotted method called on the agent.
        method: String,
    },
    /// Anything else.
    Unknown(String),
}

impl Command {
    /// Classify a router method name.
    #[must_use]
    pub fn parse(method: &str) -> Self {
        match method {
            "list_agents" => return Self::ListAgents,
            "get_devices" => return Self::GetDevices,
            "status_agents" => return Self::StatusAgents,
            "get_setting" => return Self::GetSetting,
            "set_setting" => return Self::SetSetting,
            "install" => return Self::Install,
            _ => {}
        }
        if let Some(lifecycle) = LifecycleMethod::parse(method) {
            return Self::Lifecycle(lifecycle);
        }

        let fields: Vec<&str> = method.split('.').collect();
        if fields.iter().any(|f| f.is_empty()) {
            return Self::Unknown(method.to_string());
        }

        match fields.as_slice() {
            [HISTORIAN_PREFIX, rest @ ..] if !rest.is_empty() => Self::Historian {
                method: rest.join("."),
            },
            [_, "uuid", agent, rest @ ..] if !rest.is_empty() => Self::AgentCall {
                agent: (*agent).to_string(),
                method: rest.join("."),
            },
            [_, agent, rest @ ..] if *agent != "uuid" && !rest.is_empty() => Self::AgentCall {
                agent: (*agent).to_string(),
                method: rest.join("."),
            },
            _ => Self::Unknown(method.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_commands() {
        assert_eq!(Command::parse("list_agents"), Command::ListAgents);
        assert_eq!(Command::parse("get_devices"), Command::GetDevices);
        assert_eq!(Command::parse("install"), Command::Install);
        assert_eq!(
            Command::parse("stop_agent"),
            Command::Lifecycle(LifecycleMethod::StopAgent)
        );
    }

    #[test]
    fn historian_commands() {
        assert_eq!(
            Command::parse("historian.query"),
            Command::Historian {
                method: "query".into()
            }
        );
        assert!(matches!(Command::parse("historian"), Command::Unknown(_)));
    }

    #[test]
    fn agent_calls() {
        assert_eq!(
            Command::parse("platform.abc.health.get_status"),
            Command::AgentCall {
                agent: "abc".into(),
                method: "health.get_status".into()
            }
        );
        assert_eq!(
            Command::parse("platforms.uuid.abc.start_bacnet_scan"),
            Command::AgentCall {
                agent: "abc".into(),
                method: "start_bacnet_scan".into()
            }
        );
    }

    #[test]
    fn uuid_is_not_an_agent() {
        assert_eq!(
            Command::parse("platform.uuid.abc"),
            Command::Unknown("platform.uuid.abc".into())
        );
        assert_eq!(
            Command::parse("platform.uuid.abc.stop"),
            Command::AgentCall {
                agent: "abc".into(),
                method: "stop".into()
            }
        );
    }

    #[test]
    fn malformed_names_are_unknown() {
        for name in [
            "frobnicate",
            "platform.abc",
            "platform..x",
            "a.b.",
            "platform.uuid.abc",
            "platforms.uuid",
        ] {
            assert!(matches!(Command::parse(name), Command::Unknown(_)), "{name}");
        }
    }
}
