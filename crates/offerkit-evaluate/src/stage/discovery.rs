//! Service discovery attachment.

use std::sync::Arc;

use async_trait::async_trait;

use super::{unknown_task, OfferEvaluationStage};
use crate::config::EvaluatorConfig;
use crate::outcome::{EvaluationOutcome, ReasonCode};
use crate::pool::OfferPool;
use crate::recommendation::DiscoveryInfo;
use crate::requirement::PodInstanceRequirement;
use crate::spec::DiscoverySpec;
use crate::{pass, Result};

const SOURCE: &str = "DiscoveryStage";
const DEFAULT_VISIBILITY: &str = "CLUSTER";

/// Publishes a task's name and assigned ports for discovery.
///
/// Runs after the ports stage of the same task so the assigned port numbers
/// are known.
pub struct DiscoveryStage {
    config: Arc<EvaluatorConfig>,
    task: String,
    discovery: Option<DiscoverySpec>,
}

impl DiscoveryStage {
    /// Create a discovery stage for `task`.
    #[must_use]
    pub fn new(
        config: Arc<EvaluatorConfig>,
        task: impl Into<String>,
        discovery: Option<DiscoverySpec>,
    ) -> Self {
        Self {
            config,
            task: task.into(),
            discovery,
        }
    }
}

#[async_trait]
impl OfferEvaluationStage for DiscoveryStage {
    fn source(&self) -> &str {
        SOURCE
    }

    async fn evaluate(
        &self,
        pool: &mut OfferPool,
        requirement: &PodInstanceRequirement,
    ) -> Result<EvaluationOutcome> {
        let Some(draft) = pool.draft_mut(&self.task) else {
            return Ok(unknown_task(SOURCE, &self.task));
        };

        let pod = requirement.pod_instance();
        let spec = self.discovery.clone().unwrap_or_default();
        let name = match spec.prefix {
            Some(prefix) => format!("{prefix}-{}", pod.index),
            None => pod.task_full_name(&self.task),
        };
        let info = DiscoveryInfo {
            dns_name: format!(
                "{name}.{}.{}",
                self.config.service_name, self.config.discovery_domain
            ),
            name,
            visibility: spec
                .visibility
                .unwrap_or_else(|| DEFAULT_VISIBILITY.to_string()),
            ports: draft.ports.clone(),
        };

        let outcome = pass!(
            SOURCE,
            ReasonCode::DiscoveryAttached,
            "task '{}' discoverable as {} with {} port(s)",
            self.task,
            info.dns_name,
            info.ports.len()
        );
        draft.discovery = Some(info);
        Ok(outcome)
    }
}
