//! The offer evaluation pipeline.
//!
//! An [`OfferEvaluator`] runs an ordered list of stages over one offer. Every
//! stage runs, even after an earlier one has failed, so the returned tree
//! always carries the full diagnosis. The offer is accepted only when every
//! stage passed.

use std::sync::Arc;

use offerkit_core::OfferId;
use tracing::{debug, info};

use crate::config::EvaluatorConfig;
use crate::offer::{Offer, CPUS, GPUS, MEM};
use crate::outcome::{EvaluationOutcome, ReasonCode};
use crate::pool::OfferPool;
use crate::recommendation::OfferRecommendation;
use crate::requirement::PodInstanceRequirement;
use crate::security::TlsProvisioner;
use crate::stage::{
    CheckStage, DiscoveryStage, LaunchStage, OfferEvaluationStage, PortsStage,
    ScalarResourceStage, TransportEncryptionStage, VolumeStage,
};
use crate::Result;

/// Result of evaluating a requirement against several offers.
#[derive(Debug, Clone)]
pub struct OfferSelection {
    /// The first accepted offer and the operations to submit for it.
    pub accepted: Option<(OfferId, Vec<OfferRecommendation>)>,
    /// Outcome trees of every offer evaluated, in order.
    pub outcomes: Vec<(OfferId, EvaluationOutcome)>,
}

/// Ordered pipeline of evaluation stages.
pub struct OfferEvaluator {
    stages: Vec<Box<dyn OfferEvaluationStage>>,
}

impl OfferEvaluator {
    /// Create a pipeline from an explicit list of stages.
    #[must_use]
    pub fn new(stages: Vec<Box<dyn OfferEvaluationStage>>) -> Self {
        Self { stages }
    }

    /// Build the standard pipeline for `requirement`.
    ///
    /// Tasks are visited in the pod's declaration order. For each task the
    /// stages are: scalar resources, ports, volumes, health check, readiness
    /// check, discovery, transport encryption, launch.
    #[must_use]
    pub fn for_requirement(
        requirement: &PodInstanceRequirement,
        config: Arc<EvaluatorConfig>,
        provisioner: Arc<dyn TlsProvisioner>,
    ) -> Self {
        let mut stages: Vec<Box<dyn OfferEvaluationStage>> = Vec::new();

        for task in requirement.launch_tasks() {
            let name = task.name.as_str();
            for (resource, amount) in [
                (CPUS, task.resources.cpus),
                (GPUS, task.resources.gpus),
                (MEM, task.resources.memory_mb),
            ] {
                if amount > 0.0 {
                    stages.push(Box::new(ScalarResourceStage::new(
                        Arc::clone(&config),
                        name,
                        resource,
                        amount,
                    )));
                }
            }
            stages.push(Box::new(PortsStage::new(
                Arc::clone(&config),
                name,
                task.ports.clone(),
            )));
            for volume in &task.volumes {
                stages.push(Box::new(VolumeStage::new(
                    Arc::clone(&config),
                    name,
                    volume.clone(),
                )));
            }
            stages.push(Box::new(CheckStage::health(name, task.health_check.clone())));
            stages.push(Box::new(CheckStage::readiness(
                name,
                task.readiness_check.clone(),
            )));
            stages.push(Box::new(DiscoveryStage::new(
                Arc::clone(&config),
                name,
                task.discovery.clone(),
            )));
            stages.push(Box::new(TransportEncryptionStage::new(
                Arc::clone(&config),
                name,
                task.transport_encryption.clone(),
                Arc::clone(&provisioner),
            )));
            stages.push(Box::new(LaunchStage::new(name)));
        }

        Self::new(stages)
    }

    /// Number of stages in the pipeline.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Run every stage over `offer` and aggregate their outcomes.
    ///
    /// The aggregate passes only if every stage passed. Its recommendations
    /// are those of the stages, in stage order, and should be submitted only
    /// when it passes.
    ///
    /// # Errors
    ///
    /// Returns an error if a stage reports a contract violation.
    pub async fn evaluate(
        &self,
        offer: &Offer,
        requirement: &PodInstanceRequirement,
    ) -> Result<EvaluationOutcome> {
        let mut pool = OfferPool::new(offer.clone(), requirement);
        let skipped = pool.skipped_reservations(requirement);
        if !skipped.is_empty() {
            debug!(
                offer_id = %offer.id,
                requirement = %requirement.name(),
                recovery = %requirement.recovery_type(),
                skipped = skipped.len(),
                "Prior reservations of the pod left untouched"
            );
        }
        let mut children = Vec::with_capacity(self.stages.len());

        for stage in &self.stages {
            let outcome = stage.evaluate(&mut pool, requirement).await?;
            debug!(
                offer_id = %offer.id,
                stage = stage.source(),
                outcome = %outcome.outcome_type(),
                reason = outcome.reason(),
                "Stage evaluated"
            );
            children.push(outcome);
        }

        let total = children.len();
        let passed = children.iter().filter(|c| c.is_passing()).count();
        let aggregate = EvaluationOutcome::new(
            passed == total,
            format!("OfferEvaluator[{}]", requirement.name()),
            ReasonCode::Aggregate,
            format!("{passed} of {total} stages passed for offer {}", offer.id),
        )
        .with_children(children);

        if aggregate.is_passing() {
            info!(
                offer_id = %offer.id,
                requirement = %requirement.name(),
                recovery = %requirement.recovery_type(),
                operations = aggregate.collect_recommendations().len(),
                "Offer accepted"
            );
        } else {
            info!(
                offer_id = %offer.id,
                requirement = %requirement.name(),
                passed,
                total,
                nodes = aggregate.node_count(),
                "Offer rejected"
            );
            debug!("Evaluation tree:\n{}", aggregate.render_tree());
        }

        Ok(aggregate)
    }

    /// Evaluate `offers` in order until one is accepted.
    ///
    /// Every offer is evaluated against a fresh pool, so claims made while
    /// evaluating a rejected offer never carry over to the next one.
    ///
    /// # Errors
    ///
    /// Returns an error if a stage reports a contract violation.
    pub async fn evaluate_offers(
        &self,
        requirement: &PodInstanceRequirement,
        offers: &[Offer],
    ) -> Result<OfferSelection> {
        let mut outcomes = Vec::with_capacity(offers.len());

        for offer in offers {
            let outcome = self.evaluate(offer, requirement).await?;
            let operations = accepted_operations(&outcome);
            outcomes.push((offer.id.clone(), outcome));
            if let Some(operations) = operations {
                return Ok(OfferSelection {
                    accepted: Some((offer.id.clone(), operations)),
                    outcomes,
                });
            }
        }

        debug!(
            requirement = %requirement.name(),
            offers = offers.len(),
            "No offer accepted"
        );
        Ok(OfferSelection {
            accepted: None,
            outcomes,
        })
    }
}

/// Operations to submit for an evaluated offer, or `None` if it was rejected.
#[must_use]
pub fn accepted_operations(outcome: &EvaluationOutcome) -> Option<Vec<OfferRecommendation>> {
    outcome
        .is_passing()
        .then(|| outcome.collect_recommendations())
}
