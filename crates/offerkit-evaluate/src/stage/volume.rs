//! Persistent volume matching.

use std::sync::Arc;

use async_trait::async_trait;
use offerkit_core::PersistenceId;

use super::{reserve_slice, unknown_task, OfferEvaluationStage};
use crate::config::EvaluatorConfig;
use crate::offer::{DiskSource, Persistence, Resource, ResourceValue, DISK};
use crate::outcome::{EvaluationOutcome, ReasonCode};
use crate::pool::{to_milli, ClaimAmount, OfferPool};
use crate::recommendation::OfferRecommendation;
use crate::requirement::PodInstanceRequirement;
use crate::spec::{VolumeKind, VolumeSpec};
use crate::{fail, pass, Result};

const SOURCE: &str = "VolumeStage";

/// Places one persistent volume of a task.
///
/// An existing volume of the same kind at the same container path, reserved
/// for the task and at least as large as requested, is reused when recovery
/// allows it. Otherwise a root disk slice or an entire
/// mount disk is reserved and a volume is created on it.
pub struct VolumeStage {
    config: Arc<EvaluatorConfig>,
    task: String,
    volume: VolumeSpec,
}

impl VolumeStage {
    /// Create a stage placing `volume` for `task`.
    #[must_use]
    pub fn new(config: Arc<EvaluatorConfig>, task: impl Into<String>, volume: VolumeSpec) -> Self {
        Self {
            config,
            task: task.into(),
            volume,
        }
    }

    fn matches_kind(&self, resource: &Resource) -> bool {
        match (&self.volume.kind, resource.disk.as_ref().map(|d| &d.source)) {
            (VolumeKind::Root, Some(DiskSource::Root)) => true,
            (VolumeKind::Mount, Some(DiskSource::Mount { .. })) => true,
            _ => false,
        }
    }

    fn large_enough(&self, resource: &Resource) -> bool {
        to_milli(resource.as_scalar().unwrap_or(0.0)) >= to_milli(self.volume.size_mb)
    }

    fn existing_volume(&self, pool: &OfferPool, candidates: &[usize]) -> Option<usize> {
        candidates.iter().copied().find(|&i| {
            pool.is_untouched(i)
                && pool.resource(i).is_some_and(|r| {
                    !r.is_unreserved()
                        && self.matches_kind(r)
                        && self.large_enough(r)
                        && r.disk
                            .as_ref()
                            .and_then(|d| d.persistence.as_ref())
                            .is_some_and(|p| p.container_path == self.volume.container_path)
                })
        })
    }

    fn fresh_disk(&self, pool: &OfferPool, candidates: &[usize]) -> Option<usize> {
        candidates.iter().copied().find(|&i| {
            let Some(resource) = pool.resource(i) else {
                return false;
            };
            if !resource.is_unreserved() || !self.matches_kind(resource) {
                return false;
            }
            match self.volume.kind {
                VolumeKind::Root => pool.fits_scalar(i, self.volume.size_mb),
                VolumeKind::Mount => pool.is_untouched(i) && self.large_enough(resource),
            }
        })
    }
}

#[async_trait]
impl OfferEvaluationStage for VolumeStage {
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

        let candidates = pool.candidates(DISK, requirement, &self.task);

        if let Some(index) = self.existing_volume(pool, &candidates) {
            let Some(resource) = pool.resource(index).cloned() else {
                return Ok(unknown_task(SOURCE, &self.task));
            };
            pool.claim(index, &self.task, ClaimAmount::Whole);
            if let Some(draft) = pool.draft_mut(&self.task) {
                draft.resources.push(resource);
            }
            return Ok(pass!(
                SOURCE,
                ReasonCode::Reused,
                "reused volume at '{}' for task '{}'",
                self.volume.container_path,
                self.task
            ));
        }

        let Some(index) = self.fresh_disk(pool, &candidates) else {
            return Ok(fail!(
                SOURCE,
                ReasonCode::VolumeUnavailable,
                "offer {} has no {:?} disk with {} MB for volume '{}' of task '{}'",
                pool.offer_id(),
                self.volume.kind,
                self.volume.size_mb,
                self.volume.container_path,
                self.task
            ));
        };
        let Some(resource) = pool.resource(index).cloned() else {
            return Ok(unknown_task(SOURCE, &self.task));
        };

        let (amount, size) = match self.volume.kind {
            VolumeKind::Root => (ClaimAmount::Scalar(self.volume.size_mb), self.volume.size_mb),
            VolumeKind::Mount => (
                ClaimAmount::Whole,
                resource.as_scalar().unwrap_or(self.volume.size_mb),
            ),
        };
        pool.claim(index, &self.task, amount);

        let slice = reserve_slice(
            &self.config,
            &resource,
            ResourceValue::Scalar(size),
            requirement,
            &self.task,
        );
        let volume = slice.clone().with_persistence(Persistence {
            id: PersistenceId::generate(),
            container_path: self.volume.container_path.clone(),
        });
        let offer_id = pool.offer_id().clone();
        let recommendations = vec![
            OfferRecommendation::Reserve {
                offer_id: offer_id.clone(),
                resource: slice,
            },
            OfferRecommendation::CreateVolume {
                offer_id,
                resource: volume.clone(),
            },
        ];
        if let Some(draft) = pool.draft_mut(&self.task) {
            draft.resources.push(volume);
        }

        Ok(pass!(
            SOURCE,
            ReasonCode::VolumeCreated,
            "created {size} MB volume at '{}' for task '{}'",
            self.volume.container_path,
            self.task
        )
        .with_recommendations(recommendations))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::requirement::RecoveryType;
    use crate::stage::fixtures::{config, offer, prior, requirement_with, task};

    fn volume(kind: VolumeKind, size_mb: f64) -> VolumeSpec {
        VolumeSpec {
            container_path: "data".to_string(),
            size_mb,
            kind,
        }
    }

    #[tokio::test]
    async fn creates_root_volume() {
        let req = requirement_with(task("server"), RecoveryType::None);
        let mut pool = OfferPool::new(
            offer(vec![Resource::disk(10_000.0, DiskSource::Root)]),
            &req,
        );
        let stage = VolumeStage::new(config(), "server", volume(VolumeKind::Root, 500.0));

        let outcome = stage.evaluate(&mut pool, &req).await.unwrap();

        assert_eq!(outcome.code(), ReasonCode::VolumeCreated);
        let kinds: Vec<_> = outcome.recommendations().iter().map(OfferRecommendation::kind).collect();
        assert_eq!(kinds, vec!["reserve", "create_volume"]);
        assert_eq!(
            outcome.recommendations()[0].reservation_id(),
            outcome.recommendations()[1].reservation_id()
        );
        assert!((pool.remaining_scalar(0) - 9_500.0).abs() < f64::EPSILON);
        let placed = &pool.draft("server").unwrap().resources[0];
        let persistence = placed.disk.as_ref().unwrap().persistence.as_ref().unwrap();
        assert_eq!(persistence.container_path, "data");
    }

    #[tokio::test]
    async fn mount_disk_is_taken_whole() {
        let req = requirement_with(task("server"), RecoveryType::None);
        let mount = Resource::disk(
            2_000.0,
            DiskSource::Mount {
                root: "/mnt/disk0".to_string(),
            },
        );
        let mut pool = OfferPool::new(offer(vec![mount]), &req);
        let stage = VolumeStage::new(config(), "server", volume(VolumeKind::Mount, 1_000.0));

        let outcome = stage.evaluate(&mut pool, &req).await.unwrap();

        assert!(outcome.is_passing());
        assert_eq!(pool.remaining_scalar(0), 0.0);
        let OfferRecommendation::Reserve { resource, .. } = &outcome.recommendations()[0] else {
            panic!("expected reserve");
        };
        assert_eq!(resource.as_scalar(), Some(2_000.0));
    }

    #[tokio::test]
    async fn root_volume_does_not_use_mount_disk() {
        let req = requirement_with(task("server"), RecoveryType::None);
        let mount = Resource::disk(
            2_000.0,
            DiskSource::Mount {
                root: "/mnt/disk0".to_string(),
            },
        );
        let mut pool = OfferPool::new(offer(vec![mount]), &req);
        let stage = VolumeStage::new(config(), "server", volume(VolumeKind::Root, 100.0));

        let outcome = stage.evaluate(&mut pool, &req).await.unwrap();

        assert_eq!(outcome.code(), ReasonCode::VolumeUnavailable);
        assert!(pool.claims().is_empty());
    }

    #[tokio::test]
    async fn reuses_existing_volume_when_recovering() {
        let req = requirement_with(task("server"), RecoveryType::Transient);
        let existing = Resource::disk(500.0, DiskSource::Root).with_persistence(Persistence {
            id: PersistenceId::generate(),
            container_path: "data".to_string(),
        });
        let (existing, id) = prior(existing, &req, "server");
        let mut pool = OfferPool::new(
            offer(vec![Resource::disk(10_000.0, DiskSource::Root), existing]),
            &req,
        );
        let stage = VolumeStage::new(config(), "server", volume(VolumeKind::Root, 500.0));

        let outcome = stage.evaluate(&mut pool, &req).await.unwrap();

        assert_eq!(outcome.code(), ReasonCode::Reused);
        assert!(outcome.recommendations().is_empty());
        let placed = &pool.draft("server").unwrap().resources[0];
        assert_eq!(placed.reservation.as_ref().unwrap().id, id);
    }

    #[tokio::test]
    async fn prior_volume_of_other_kind_is_not_reused() {
        let req = requirement_with(task("server"), RecoveryType::Transient);
        let existing = Resource::disk(
            2_000.0,
            DiskSource::Mount {
                root: "/mnt/disk0".to_string(),
            },
        )
        .with_persistence(Persistence {
            id: PersistenceId::generate(),
            container_path: "data".to_string(),
        });
        let (existing, old_id) = prior(existing, &req, "server");
        let mut pool = OfferPool::new(
            offer(vec![existing, Resource::disk(10_000.0, DiskSource::Root)]),
            &req,
        );
        let stage = VolumeStage::new(config(), "server", volume(VolumeKind::Root, 500.0));

        let outcome = stage.evaluate(&mut pool, &req).await.unwrap();

        assert_eq!(outcome.code(), ReasonCode::VolumeCreated);
        assert_ne!(outcome.recommendations()[0].reservation_id(), Some(old_id));
        assert_eq!(pool.claims()[0].resource_index, 1);
    }

    #[tokio::test]
    async fn smaller_prior_volume_is_not_reused() {
        let req = requirement_with(task("server"), RecoveryType::Transient);
        let existing = Resource::disk(250.0, DiskSource::Root).with_persistence(Persistence {
            id: PersistenceId::generate(),
            container_path: "data".to_string(),
        });
        let (existing, old_id) = prior(existing, &req, "server");
        let mut pool = OfferPool::new(
            offer(vec![existing, Resource::disk(10_000.0, DiskSource::Root)]),
            &req,
        );
        let stage = VolumeStage::new(config(), "server", volume(VolumeKind::Root, 500.0));

        let outcome = stage.evaluate(&mut pool, &req).await.unwrap();

        assert_eq!(outcome.code(), ReasonCode::VolumeCreated);
        assert_ne!(outcome.recommendations()[0].reservation_id(), Some(old_id));
        assert!(pool.is_untouched(0));
    }

    #[tokio::test]
    async fn permanent_recovery_creates_new_volume() {
        let req = requirement_with(task("server"), RecoveryType::Permanent);
        let existing = Resource::disk(500.0, DiskSource::Root).with_persistence(Persistence {
            id: PersistenceId::generate(),
            container_path: "data".to_string(),
        });
        let (existing, old_id) = prior(existing, &req, "server");
        let mut pool = OfferPool::new(
            offer(vec![existing, Resource::disk(10_000.0, DiskSource::Root)]),
            &req,
        );
        let stage = VolumeStage::new(config(), "server", volume(VolumeKind::Root, 500.0));

        let outcome = stage.evaluate(&mut pool, &req).await.unwrap();

        assert_eq!(outcome.code(), ReasonCode::VolumeCreated);
        assert_ne!(outcome.recommendations()[0].reservation_id(), Some(old_id));
        assert_eq!(pool.claims()[0].resource_index, 1);
    }
}
