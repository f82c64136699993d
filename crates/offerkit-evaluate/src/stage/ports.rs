//! Port matching.

use std::sync::Arc;

use async_trait::async_trait;

use super::{reserve_slice, reuse_slice, unknown_task, OfferEvaluationStage};
use crate::config::EvaluatorConfig;
use crate::offer::{Range, ResourceValue, PORTS};
use crate::outcome::{EvaluationOutcome, ReasonCode};
use crate::pool::{ClaimAmount, OfferPool};
use crate::recommendation::{DiscoveryPort, OfferRecommendation};
use crate::requirement::PodInstanceRequirement;
use crate::spec::PortSpec;
use crate::{fail, pass, Result};

const SOURCE: &str = "PortsStage";

/// Claims every declared port of a task, or none of them.
///
/// A fixed port must be contained in an offered range. Port `0` takes the
/// lowest free port. Assigned ports are exported to the task environment and
/// recorded for discovery.
pub struct PortsStage {
    config: Arc<EvaluatorConfig>,
    task: String,
    ports: Vec<PortSpec>,
}

struct Assignment<'a> {
    spec: &'a PortSpec,
    number: u64,
    resource_index: usize,
}

impl PortsStage {
    /// Create a stage claiming `ports` for `task`.
    #[must_use]
    pub fn new(config: Arc<EvaluatorConfig>, task: impl Into<String>, ports: Vec<PortSpec>) -> Self {
        Self {
            config,
            task: task.into(),
            ports,
        }
    }

    fn pick(
        &self,
        pool: &OfferPool,
        requirement: &PodInstanceRequirement,
        spec: &PortSpec,
    ) -> Option<(usize, u64)> {
        pool.candidates(PORTS, requirement, &self.task)
            .into_iter()
            .find_map(|index| {
                let remaining = pool.remaining_ranges(index);
                let number = if spec.port == 0 {
                    remaining.iter().map(|r| r.begin).min()
                } else {
                    remaining
                        .iter()
                        .any(|r| r.contains(spec.port))
                        .then_some(spec.port)
                };
                number.map(|n| (index, n))
            })
    }
}

#[async_trait]
impl OfferEvaluationStage for PortsStage {
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
        if self.ports.is_empty() {
            return Ok(pass!(
                SOURCE,
                ReasonCode::NotRequested,
                "task '{}' declares no ports",
                self.task
            ));
        }

        let checkpoint = pool.checkpoint();
        let mut assigned = Vec::with_capacity(self.ports.len());
        let mut details = Vec::with_capacity(self.ports.len());
        let mut missing = 0usize;

        for spec in &self.ports {
            if let Some((resource_index, number)) = self.pick(pool, requirement, spec) {
                pool.claim(resource_index, &self.task, ClaimAmount::Ports(vec![number]));
                details.push(pass!(
                    SOURCE,
                    ReasonCode::Reserved,
                    "port '{}' assigned {number}",
                    spec.name
                ));
                assigned.push(Assignment {
                    spec,
                    number,
                    resource_index,
                });
            } else {
                missing += 1;
                let wanted = if spec.port == 0 {
                    "any port".to_string()
                } else {
                    format!("port {}", spec.port)
                };
                details.push(fail!(
                    SOURCE,
                    ReasonCode::PortUnavailable,
                    "port '{}' needs {wanted}, not available in offer {}",
                    spec.name,
                    pool.offer_id()
                ));
            }
        }

        if missing > 0 {
            pool.rollback(checkpoint);
            return Ok(fail!(
                SOURCE,
                ReasonCode::PortUnavailable,
                "{missing} of {} port(s) for task '{}' unavailable",
                self.ports.len(),
                self.task
            )
            .with_children(details));
        }

        let mut recommendations = Vec::new();
        let mut reused = 0usize;
        let mut slices = Vec::with_capacity(assigned.len());
        for a in &assigned {
            let Some(resource) = pool.resource(a.resource_index) else {
                continue;
            };
            let value = ResourceValue::Ranges(vec![Range::single(a.number)]);
            if resource.is_unreserved() {
                let slice = reserve_slice(&self.config, resource, value, requirement, &self.task);
                recommendations.push(OfferRecommendation::Reserve {
                    offer_id: pool.offer_id().clone(),
                    resource: slice.clone(),
                });
                slices.push(slice);
            } else {
                reused += 1;
                slices.push(reuse_slice(resource, value));
            }
        }

        if let Some(draft) = pool.draft_mut(&self.task) {
            draft.resources.extend(slices);
            for a in &assigned {
                draft
                    .environment
                    .insert(a.spec.env_name(), a.number.to_string());
                draft.ports.push(DiscoveryPort {
                    name: a.spec.name.clone(),
                    number: a.number,
                });
            }
        }

        let code = if recommendations.is_empty() {
            ReasonCode::Reused
        } else {
            ReasonCode::Reserved
        };
        Ok(pass!(
            SOURCE,
            code,
            "assigned {} port(s) to task '{}' ({reused} reused)",
            assigned.len(),
            self.task
        )
        .with_recommendations(recommendations)
        .with_children(details))
    }
}
