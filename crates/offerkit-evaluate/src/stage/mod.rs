//! Evaluation stages.
//!
//! A stage looks at the remaining resources of one offer and at the
//! requirement, claims what it needs in the [`OfferPool`], and reports one
//! [`EvaluationOutcome`]. Stages never fail a run by returning an error for a
//! resource mismatch; `Err` is reserved for contract violations.
//!
//! The set of stages is open: anything implementing [`OfferEvaluationStage`]
//! can be added to an [`OfferEvaluator`](crate::OfferEvaluator).

use async_trait::async_trait;
use offerkit_core::ReservationId;

use crate::config::EvaluatorConfig;
use crate::offer::{Reservation, ReservationOwner, Resource, ResourceValue};
use crate::outcome::{EvaluationOutcome, ReasonCode};
use crate::pool::OfferPool;
use crate::requirement::PodInstanceRequirement;
use crate::Result;

pub mod checks;
pub mod discovery;
pub mod launch;
pub mod ports;
pub mod scalar;
pub mod tls;
pub mod volume;

pub use checks::CheckStage;
pub use discovery::DiscoveryStage;
pub use launch::LaunchStage;
pub use ports::PortsStage;
pub use scalar::ScalarResourceStage;
pub use tls::TransportEncryptionStage;
pub use volume::VolumeStage;

/// One step of the offer evaluation pipeline.
#[async_trait]
pub trait OfferEvaluationStage: Send + Sync {
    /// Label used as the source of this stage's outcomes.
    fn source(&self) -> &str;

    /// Evaluate the remaining resources in `pool` against `requirement`.
    ///
    /// # Errors
    ///
    /// Returns an error only for contract violations. Resource mismatches are
    /// reported as FAIL outcomes.
    async fn evaluate(
        &self,
        pool: &mut OfferPool,
        requirement: &PodInstanceRequirement,
    ) -> Result<EvaluationOutcome>;
}

/// FAIL outcome for a stage bound to a task the requirement does not launch.
pub(crate) fn unknown_task(source: &str, task: &str) -> EvaluationOutcome {
    crate::fail!(
        source,
        ReasonCode::UnknownTask,
        "task '{task}' is not part of this requirement"
    )
}

/// A fresh reservation of `value` carved out of `resource` for `task`.
pub(crate) fn reserve_slice(
    config: &EvaluatorConfig,
    resource: &Resource,
    value: ResourceValue,
    requirement: &PodInstanceRequirement,
    task: &str,
) -> Resource {
    Resource {
        name: resource.name.clone(),
        value,
        reservation: Some(Reservation {
            id: ReservationId::generate(),
            role: config.role.clone(),
            principal: config.principal.clone(),
            owner: ReservationOwner::for_task(requirement.pod_instance(), task),
        }),
        disk: resource.disk.clone(),
    }
}

/// The reused slice of a resource already reserved for the task.
pub(crate) fn reuse_slice(resource: &Resource, value: ResourceValue) -> Resource {
    Resource {
        value,
        ..resource.clone()
    }
}
