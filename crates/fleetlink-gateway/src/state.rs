//! Gateway application state.
//!
//! This module defines the shared state that is available to all request handlers.

use std::sync::Arc;

use fleetlink_control::ManagedPlatform;

use crate::config::GatewayConfig;

/// Shared application state for the gateway.
pub struct GatewayState<P>
where
    P: ManagedPlatform,
{
    /// The platform liaison.
    pub platform: Arc<P>,
    /// Gateway configuration.
    pub config: GatewayConfig,
}

impl<P> GatewayState<P>
where
    P: ManagedPlatform,
{
    /// Create a new gateway state.
    #[must_use]
    pub fn new(platform: Arc<P>, config: GatewayConfig) -> Self {
        Self { platform, config }
    }
}

impl<P> Clone for GatewayState<P>
where
    P: ManagedPlatform,
{
    fn clone(&self) -> Self {
        Self {
            platform: Arc::clone(&self.platform),
            config: self.config.clone(),
        }
    }
}
