//! Task launch assembly.

use async_trait::async_trait;

use super::{unknown_task, OfferEvaluationStage};
use crate::outcome::{EvaluationOutcome, ReasonCode};
use crate::pool::OfferPool;
use crate::recommendation::{OfferRecommendation, TaskLaunch};
use crate::requirement::PodInstanceRequirement;
use crate::{pass, Result};

const SOURCE: &str = "LaunchStage";

/// Assembles the launch operation for a task from what earlier stages
/// placed in its draft.
///
/// The environment is layered: the task's static environment, then the
/// requirement's overrides, then values contributed by stages such as
/// assigned ports. Later layers win.
pub struct LaunchStage {
    task: String,
}

impl LaunchStage {
    /// Create a launch stage for `task`.
    #[must_use]
    pub fn new(task: impl Into<String>) -> Self {
        Self { task: task.into() }
    }
}

#[async_trait]
impl OfferEvaluationStage for LaunchStage {
    fn source(&self) -> &str {
        SOURCE
    }

    async fn evaluate(
        &self,
        pool: &mut OfferPool,
        requirement: &PodInstanceRequirement,
    ) -> Result<EvaluationOutcome> {
        let pod = requirement.pod_instance();
        let (Some(spec), Some(draft)) = (pod.pod.task(&self.task), pool.draft(&self.task)) else {
            return Ok(unknown_task(SOURCE, &self.task));
        };

        let mut environment = spec.environment.clone();
        environment.extend(
            requirement
                .environment()
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );
        environment.extend(draft.environment.clone());

        let launch = TaskLaunch {
            name: pod.task_full_name(&self.task),
            task: self.task.clone(),
            pod_instance: pod.name(),
            goal: spec.goal,
            command: spec.command.clone(),
            user: pod.pod.user.clone(),
            environment,
            resources: draft.resources.clone(),
            health_check: draft.health_check.clone(),
            readiness_check: draft.readiness_check.clone(),
            discovery: draft.discovery.clone(),
            transport_encryption: draft.transport_encryption.clone(),
            resource_set: spec.resource_set.clone(),
        };

        let outcome = pass!(
            SOURCE,
            ReasonCode::LaunchReady,
            "launching {} with {} resource(s)",
            launch.name,
            launch.resources.len()
        );
        Ok(outcome.with_recommendation(OfferRecommendation::Launch {
            offer_id: pool.offer_id().clone(),
            task: Box::new(launch),
        }))
    }
}
