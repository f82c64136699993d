//! Scalar resource matching: CPUs, GPUs, memory.

use std::sync::Arc;

use async_trait::async_trait;

use super::{reserve_slice, reuse_slice, unknown_task, OfferEvaluationStage};
use crate::config::EvaluatorConfig;
use crate::offer::ResourceValue;
use crate::outcome::{EvaluationOutcome, ReasonCode};
use crate::pool::{ClaimAmount, OfferPool};
use crate::recommendation::OfferRecommendation;
use crate::requirement::PodInstanceRequirement;
use crate::{fail, pass, Result};

const SOURCE: &str = "ScalarResourceStage";

/// Claims a quantity of one scalar resource for a task.
///
/// The whole quantity must come from a single offered resource. A prior
/// reservation for the task is used when it is large enough and the recovery
/// type allows reuse; otherwise a fresh slice of an unreserved resource is
/// reserved.
pub struct ScalarResourceStage {
    config: Arc<EvaluatorConfig>,
    task: String,
    resource: String,
    amount: f64,
}

impl ScalarResourceStage {
    /// Create a stage claiming `amount` of `resource` for `task`.
    #[must_use]
    pub fn new(
        config: Arc<EvaluatorConfig>,
        task: impl Into<String>,
        resource: impl Into<String>,
        amount: f64,
    ) -> Self {
        Self {
            config,
            task: task.into(),
            resource: resource.into(),
            amount,
        }
    }
}

#[async_trait]
impl OfferEvaluationStage for ScalarResourceStage {
    fn source(&self) -> &str {
        SOURCE
    }

    async fn evaluate(
        &self,
        pool: &mut OfferPool,
        requirement: &PodInstanceRequirement,
    ) -> Result<EvaluationOutcome> {
        if pool.draft(&self.task).is_none() {
            return Ok(unknown_task(SOURCE, &self.task));
        }
        if self.amount <= 0.0 {
            return Ok(pass!(
                SOURCE,
                ReasonCode::NotRequested,
                "task '{}' requests no {}",
                self.task,
                self.resource
            ));
        }

        let candidates = pool.candidates(&self.resource, requirement, &self.task);
        let chosen = candidates
            .iter()
            .copied()
            .find(|&i| pool.fits_scalar(i, self.amount));

        let Some(index) = chosen else {
            let largest = candidates
                .iter()
                .map(|&i| pool.remaining_scalar(i))
                .fold(0.0_f64, f64::max);
            return Ok(fail!(
                SOURCE,
                ReasonCode::InsufficientResource,
                "offer {} has insufficient {} for task '{}': requested {}, largest available {}",
                pool.offer_id(),
                self.resource,
                self.task,
                self.amount,
                largest
            ));
        };

        let Some(resource) = pool.resource(index).cloned() else {
            return Ok(unknown_task(SOURCE, &self.task));
        };
        pool.claim(index, &self.task, ClaimAmount::Scalar(self.amount));
        let value = ResourceValue::Scalar(self.amount);

        if resource.is_unreserved() {
            let slice = reserve_slice(&self.config, &resource, value, requirement, &self.task);
            let recommendation = OfferRecommendation::Reserve {
                offer_id: pool.offer_id().clone(),
                resource: slice.clone(),
            };
            if let Some(draft) = pool.draft_mut(&self.task) {
                draft.resources.push(slice);
            }
            Ok(pass!(
                SOURCE,
                ReasonCode::Reserved,
                "reserved {} {} for task '{}'",
                self.amount,
                self.resource,
                self.task
            )
            .with_recommendation(recommendation))
        } else {
            if let Some(draft) = pool.draft_mut(&self.task) {
                draft.resources.push(reuse_slice(&resource, value));
            }
            Ok(pass!(
                SOURCE,
                ReasonCode::Reused,
                "reused {} {} from prior reservation for task '{}'",
                self.amount,
                self.resource,
                self.task
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::offer::{Resource, CPUS, MEM};
    use crate::requirement::RecoveryType;
    use crate::stage::fixtures::{config, offer, prior, requirement_with, task};

    #[tokio::test]
    async fn reserves_fresh_cpu() {
        let req = requirement_with(task("server"), RecoveryType::None);
        let mut pool = OfferPool::new(offer(vec![Resource::scalar(CPUS, 4.0)]), &req);
        let stage = ScalarResourceStage::new(config(), "server", CPUS, 1.5);

        let outcome = stage.evaluate(&mut pool, &req).await.unwrap();

        assert!(outcome.is_passing());
        assert_eq!(outcome.code(), ReasonCode::Reserved);
        let recs = outcome.recommendations();
        assert_eq!(recs.len(), 1);
        let OfferRecommendation::Reserve { resource, .. } = &recs[0] else {
            panic!("expected reserve");
        };
        assert_eq!(resource.as_scalar(), Some(1.5));
        let reservation = resource.reservation.as_ref().unwrap();
        assert_eq!(reservation.role, "test-svc-role");
        assert_eq!(reservation.owner.task, "server");
        assert!((pool.remaining_scalar(0) - 2.5).abs() < f64::EPSILON);
        assert_eq!(pool.draft("server").unwrap().resources.len(), 1);
    }

    #[tokio::test]
    async fn fails_when_insufficient() {
        let req = requirement_with(task("server"), RecoveryType::None);
        let mut pool = OfferPool::new(offer(vec![Resource::scalar(MEM, 256.0)]), &req);
        let stage = ScalarResourceStage::new(config(), "server", MEM, 1024.0);

        let outcome = stage.evaluate(&mut pool, &req).await.unwrap();

        assert!(!outcome.is_passing());
        assert_eq!(outcome.code(), ReasonCode::InsufficientResource);
        assert!(outcome.reason().contains("largest available 256"));
        assert!(outcome.recommendations().is_empty());
        assert!(pool.claims().is_empty());
    }

    #[tokio::test]
    async fn transient_recovery_reuses_prior_reservation() {
        let req = requirement_with(task("server"), RecoveryType::Transient);
        let (reserved, id) = prior(Resource::scalar(CPUS, 1.0), &req, "server");
        let mut pool = OfferPool::new(offer(vec![Resource::scalar(CPUS, 8.0), reserved]), &req);
        let stage = ScalarResourceStage::new(config(), "server", CPUS, 1.0);

        let outcome = stage.evaluate(&mut pool, &req).await.unwrap();

        assert_eq!(outcome.code(), ReasonCode::Reused);
        assert!(outcome.recommendations().is_empty());
        let draft = pool.draft("server").unwrap();
        assert_eq!(draft.resources[0].reservation.as_ref().unwrap().id, id);
    }

    #[tokio::test]
    async fn permanent_recovery_reserves_fresh() {
        let req = requirement_with(task("server"), RecoveryType::Permanent);
        let (reserved, old_id) = prior(Resource::scalar(CPUS, 1.0), &req, "server");
        let mut pool = OfferPool::new(offer(vec![reserved, Resource::scalar(CPUS, 8.0)]), &req);
        let stage = ScalarResourceStage::new(config(), "server", CPUS, 1.0);

        let outcome = stage.evaluate(&mut pool, &req).await.unwrap();

        assert_eq!(outcome.code(), ReasonCode::Reserved);
        let new_id = outcome.recommendations()[0].reservation_id().unwrap();
        assert_ne!(new_id, old_id);
        assert_eq!(pool.claims()[0].resource_index, 1);
    }

    #[tokio::test]
    async fn zero_amount_is_not_requested() {
        let req = requirement_with(task("server"), RecoveryType::None);
        let mut pool = OfferPool::new(offer(vec![]), &req);
        let stage = ScalarResourceStage::new(config(), "server", "gpus", 0.0);

        let outcome = stage.evaluate(&mut pool, &req).await.unwrap();
        assert!(outcome.is_passing());
        assert_eq!(outcome.code(), ReasonCode::NotRequested);
    }

    #[tokio::test]
    async fn unknown_task_fails() {
        let req = requirement_with(task("server"), RecoveryType::None);
        let mut pool = OfferPool::new(offer(vec![Resource::scalar(CPUS, 4.0)]), &req);
        let stage = ScalarResourceStage::new(config(), "ghost", CPUS, 1.0);

        let outcome = stage.evaluate(&mut pool, &req).await.unwrap();
        assert_eq!(outcome.code(), ReasonCode::UnknownTask);
    }
}
