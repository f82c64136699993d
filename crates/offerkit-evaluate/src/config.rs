//! Configuration for the offer evaluator.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{EvaluateError, Result};

/// Configuration shared by every stage of an [`OfferEvaluator`](crate::OfferEvaluator).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluatorConfig {
    /// Name of the service being scheduled, passed to TLS provisioning.
    pub service_name: String,
    /// Role fresh reservations are made under.
    pub role: String,
    /// Principal fresh reservations are made by.
    pub principal: String,
    /// Upper bound for a single TLS provisioning call, in seconds.
    pub tls_timeout_secs: u64,
    /// DNS suffix for discovery names.
    pub discovery_domain: String,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            service_name: "hello-world".to_string(),
            role: "hello-world-role".to_string(),
            principal: "hello-world-principal".to_string(),
            tls_timeout_secs: 30,
            discovery_domain: "autoip.dcos.thisdcos.directory".to_string(),
        }
    }
}

impl EvaluatorConfig {
    /// Create a config for the given service, deriving role and principal from it.
    #[must_use]
    pub fn for_service(service_name: impl Into<String>) -> Self {
        let service_name = service_name.into();
        Self {
            role: format!("{service_name}-role"),
            principal: format!("{service_name}-principal"),
            service_name,
            ..Default::default()
        }
    }

    /// Load configuration from environment variables.
    ///
    /// Supported environment variables:
    /// - `OFFERKIT_SERVICE_NAME`: Service name
    /// - `OFFERKIT_RESOURCE_ROLE`: Reservation role
    /// - `OFFERKIT_PRINCIPAL`: Reservation principal
    /// - `OFFERKIT_TLS_TIMEOUT_SECS`: TLS provisioning timeout
    /// - `OFFERKIT_DISCOVERY_DOMAIN`: Discovery DNS suffix
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("OFFERKIT_SERVICE_NAME") {
            config.service_name = val;
        }
        if let Ok(val) = std::env::var("OFFERKIT_RESOURCE_ROLE") {
            config.role = val;
        }
        if let Ok(val) = std::env::var("OFFERKIT_PRINCIPAL") {
            config.principal = val;
        }
        if let Ok(val) = std::env::var("OFFERKIT_TLS_TIMEOUT_SECS") {
            if let Ok(n) = val.parse() {
                config.tls_timeout_secs = n;
            }
        }
        if let Ok(val) = std::env::var("OFFERKIT_DISCOVERY_DOMAIN") {
            config.discovery_domain = val;
        }

        config
    }

    /// TLS provisioning timeout.
    #[must_use]
    pub fn tls_timeout(&self) -> Duration {
        Duration::from_secs(self.tls_timeout_secs)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if a name is empty or the TLS timeout is zero.
    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("service_name", &self.service_name),
            ("role", &self.role),
            ("principal", &self.principal),
        ] {
            if value.trim().is_empty() {
                return Err(EvaluateError::Config(format!("{field} must not be empty")));
            }
        }
        if self.tls_timeout_secs == 0 {
            return Err(EvaluateError::Config(
                "tls_timeout_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
