//! Resource ledger for a single pipeline run.
//!
//! An [`OfferPool`] never modifies the offer it wraps. Stages append
//! [`Claim`]s, and the remaining view of every resource is derived from the
//! original offer minus the claims recorded so far. A stage that fails halfway
//! through can [`rollback`](OfferPool::rollback) to a
//! [`checkpoint`](OfferPool::checkpoint) so it leaves no partial claims behind.
//!
//! The pool also holds one [`LaunchDraft`] per task being launched, which
//! stages fill in as they claim resources and attach checks.

use std::collections::{BTreeMap, BTreeSet};

use offerkit_core::OfferId;

use crate::offer::{Offer, Range, Resource};
use crate::recommendation::{DiscoveryInfo, DiscoveryPort, TlsMaterial};
use crate::requirement::PodInstanceRequirement;
use crate::spec::CheckSpec;

/// How much of a resource a claim takes.
#[derive(Debug, Clone, PartialEq)]
pub enum ClaimAmount {
    /// Part of a scalar resource.
    Scalar(f64),
    /// Individual ports of a ranges resource.
    Ports(Vec<u64>),
    /// The whole resource, e.g. a mount disk or a reused volume.
    Whole,
}

/// One resource consumption recorded in the ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct Claim {
    /// Index into the offer's resources.
    pub resource_index: usize,
    /// Task the claim was made for.
    pub task: String,
    /// Amount taken.
    pub amount: ClaimAmount,
}

/// Per-task launch state assembled by the stages.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LaunchDraft {
    /// Task name within the pod.
    pub task: String,
    /// Resources assigned to the task, reused or freshly reserved.
    pub resources: Vec<Resource>,
    /// Environment contributed by stages, e.g. assigned ports.
    pub environment: BTreeMap<String, String>,
    /// Named ports assigned to the task.
    pub ports: Vec<DiscoveryPort>,
    /// Health check to attach.
    pub health_check: Option<CheckSpec>,
    /// Readiness check to attach.
    pub readiness_check: Option<CheckSpec>,
    /// Discovery information to attach.
    pub discovery: Option<DiscoveryInfo>,
    /// TLS material to attach.
    pub transport_encryption: Vec<TlsMaterial>,
}

/// Ledger over one offer, exclusively owned by one pipeline run.
#[derive(Debug, Clone)]
pub struct OfferPool {
    offer: Offer,
    claims: Vec<Claim>,
    drafts: BTreeMap<String, LaunchDraft>,
}

impl OfferPool {
    /// Create a ledger over `offer` with an empty draft for every task in
    /// `requirement`.
    #[must_use]
    pub fn new(offer: Offer, requirement: &PodInstanceRequirement) -> Self {
        let drafts = requirement
            .tasks_to_launch()
            .iter()
            .map(|task| {
                (
                    task.clone(),
                    LaunchDraft {
                        task: task.clone(),
                        ..Default::default()
                    },
                )
            })
            .collect();
        Self {
            offer,
            claims: Vec::new(),
            drafts,
        }
    }

    /// The original offer.
    #[must_use]
    pub fn offer(&self) -> &Offer {
        &self.offer
    }

    /// Identity of the offer.
    #[must_use]
    pub fn offer_id(&self) -> &OfferId {
        &self.offer.id
    }

    /// Claims recorded so far, in order.
    #[must_use]
    pub fn claims(&self) -> &[Claim] {
        &self.claims
    }

    /// Record a claim.
    pub fn claim(&mut self, resource_index: usize, task: &str, amount: ClaimAmount) {
        self.claims.push(Claim {
            resource_index,
            task: task.to_string(),
            amount,
        });
    }

    /// Marker for [`rollback`](Self::rollback).
    #[must_use]
    pub fn checkpoint(&self) -> usize {
        self.claims.len()
    }

    /// Drop every claim recorded after `checkpoint`.
    pub fn rollback(&mut self, checkpoint: usize) {
        self.claims.truncate(checkpoint);
    }

    /// Whether no claim touches the resource.
    #[must_use]
    pub fn is_untouched(&self, resource_index: usize) -> bool {
        !self.claims.iter().any(|c| c.resource_index == resource_index)
    }

    fn is_taken_whole(&self, resource_index: usize) -> bool {
        self.claims
            .iter()
            .any(|c| c.resource_index == resource_index && c.amount == ClaimAmount::Whole)
    }

    /// Unclaimed amount of a scalar resource; `0.0` for other kinds.
    ///
    /// Computed in thousandths, so fractional claims that exactly fill a
    /// resource leave nothing behind instead of a rounding residue.
    #[must_use]
    pub fn remaining_scalar(&self, resource_index: usize) -> f64 {
        from_milli(self.remaining_milli(resource_index))
    }

    /// Whether `amount` fits in what is left of a scalar resource.
    #[must_use]
    pub fn fits_scalar(&self, resource_index: usize, amount: f64) -> bool {
        self.remaining_milli(resource_index) >= to_milli(amount)
    }

    fn remaining_milli(&self, resource_index: usize) -> i64 {
        let Some(total) = self
            .offer
            .resources
            .get(resource_index)
            .and_then(Resource::as_scalar)
        else {
            return 0;
        };
        if self.is_taken_whole(resource_index) {
            return 0;
        }
        let used: i64 = self
            .claims
            .iter()
            .filter(|c| c.resource_index == resource_index)
            .map(|c| match c.amount {
                ClaimAmount::Scalar(v) => to_milli(v),
                _ => 0,
            })
            .sum();
        (to_milli(total) - used).max(0)
    }

    /// Unclaimed ranges of a ranges resource; empty for other kinds.
    #[must_use]
    pub fn remaining_ranges(&self, resource_index: usize) -> Vec<Range> {
        let Some(ranges) = self
            .offer
            .resources
            .get(resource_index)
            .and_then(Resource::as_ranges)
        else {
            return Vec::new();
        };
        if self.is_taken_whole(resource_index) {
            return Vec::new();
        }
        let taken: BTreeSet<u64> = self
            .claims
            .iter()
            .filter(|c| c.resource_index == resource_index)
            .filter_map(|c| match &c.amount {
                ClaimAmount::Ports(ports) => Some(ports.iter().copied()),
                _ => None,
            })
            .flatten()
            .collect();
        subtract_ports(ranges, &taken)
    }

    /// Indexes of resources named `name` that `task` may draw from, in
    /// preference order.
    ///
    /// When the requirement's recovery type allows it, resources reserved for
    /// the same task of the same pod instance come first. Unreserved resources
    /// follow. Resources reserved for anyone else, including this pod's prior
    /// reservations under `PERMANENT` recovery, are never returned.
    #[must_use]
    pub fn candidates(
        &self,
        name: &str,
        requirement: &PodInstanceRequirement,
        task: &str,
    ) -> Vec<usize> {
        let pod = requirement.pod_instance();
        let named = || {
            self.offer
                .resources
                .iter()
                .enumerate()
                .filter(move |(_, r)| r.name == name)
        };

        let mut out = Vec::new();
        if requirement.recovery_type().reuses_reservations() {
            out.extend(
                named()
                    .filter(|(_, r)| r.is_reserved_for(pod, task))
                    .map(|(i, _)| i),
            );
        }
        out.extend(named().filter(|(_, r)| r.is_unreserved()).map(|(i, _)| i));
        out
    }

    /// Indexes of resources reserved for the requirement's pod instance that
    /// this run never draws from.
    ///
    /// Under `PERMANENT` recovery that is every prior reservation of the pod.
    /// Otherwise it is the reservations held by tasks outside the run.
    #[must_use]
    pub fn skipped_reservations(&self, requirement: &PodInstanceRequirement) -> Vec<usize> {
        let pod = requirement.pod_instance();
        let reuses = requirement.recovery_type().reuses_reservations();
        self.offer
            .resources
            .iter()
            .enumerate()
            .filter(|(_, r)| r.is_reserved_for_pod(pod))
            .filter(|(_, r)| {
                !reuses
                    || r.reservation
                        .as_ref()
                        .is_some_and(|res| !requirement.tasks_to_launch().contains(&res.owner.task))
            })
            .map(|(i, _)| i)
            .collect()
    }

    /// Resource at `index` in the original offer.
    #[must_use]
    pub fn resource(&self, index: usize) -> Option<&Resource> {
        self.offer.resources.get(index)
    }

    /// Draft for `task`, if the task is part of this run.
    #[must_use]
    pub fn draft(&self, task: &str) -> Option<&LaunchDraft> {
        self.drafts.get(task)
    }

    /// Mutable draft for `task`, if the task is part of this run.
    pub fn draft_mut(&mut self, task: &str) -> Option<&mut LaunchDraft> {
        self.drafts.get_mut(task)
    }
}

/// Scalar quantity in thousandths, the precision the cluster manager keeps.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn to_milli(value: f64) -> i64 {
    (value * 1000.0).round() as i64
}

#[allow(clippy::cast_precision_loss)]
fn from_milli(milli: i64) -> f64 {
    milli as f64 / 1000.0
}

/// Remove `taken` values from `ranges`, splitting ranges as needed.
#[must_use]
pub fn subtract_ports(ranges: &[Range], taken: &BTreeSet<u64>) -> Vec<Range> {
    let mut out = Vec::new();
    for range in ranges {
        let mut begin = range.begin;
        for &port in taken.range(range.begin..=range.end) {
            if port > begin {
                out.push(Range {
                    begin,
                    end: port - 1,
                });
            }
            begin = port + 1;
        }
        if begin <= range.end {
            out.push(Range {
                begin,
                end: range.end,
            });
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::offer::{Reservation, ReservationOwner, ResourceValue, CPUS, PORTS};
    use crate::requirement::RecoveryType;
    use crate::spec::{PodInstance, PodSpec, TaskSpec};
    use offerkit_core::ReservationId;

    fn requirement(recovery: RecoveryType) -> PodInstanceRequirement {
        let pod = PodInstance::new(
            PodSpec {
                pod_type: "web".to_string(),
                user: None,
                tasks: vec![TaskSpec {
                    name: "server".to_string(),
                    ..Default::default()
                }],
            },
            0,
        );
        PodInstanceRequirement::new(pod, ["server"])
            .unwrap()
            .with_recovery_type(recovery)
    }

    fn reserved_cpu(req: &PodInstanceRequirement, amount: f64) -> Resource {
        Resource::scalar(CPUS, amount).reserved(Reservation {
            id: ReservationId::generate(),
            role: "web-role".to_string(),
            principal: "web".to_string(),
            owner: ReservationOwner::for_task(req.pod_instance(), "server"),
        })
    }

    fn offer(resources: Vec<Resource>) -> Offer {
        Offer::new(OfferId::new("o1").unwrap(), "host", resources)
    }

    #[test]
    fn scalar_claims_reduce_remaining() {
        let req = requirement(RecoveryType::None);
        let mut pool = OfferPool::new(offer(vec![Resource::scalar(CPUS, 4.0)]), &req);
        pool.claim(0, "server", ClaimAmount::Scalar(1.5));
        assert!((pool.remaining_scalar(0) - 2.5).abs() < f64::EPSILON);
        assert!(!pool.is_untouched(0));
        // the offer itself is untouched
        assert_eq!(pool.offer().resources[0].as_scalar(), Some(4.0));
    }

    #[test]
    fn fractional_claims_fill_resource_exactly() {
        let req = requirement(RecoveryType::None);
        let mut pool = OfferPool::new(offer(vec![Resource::scalar(CPUS, 0.3)]), &req);
        pool.claim(0, "server", ClaimAmount::Scalar(0.1));
        assert!(pool.fits_scalar(0, 0.2));
        assert!(!pool.fits_scalar(0, 0.201));
        pool.claim(0, "server", ClaimAmount::Scalar(0.2));
        assert_eq!(pool.remaining_scalar(0), 0.0);
        assert!(!pool.fits_scalar(0, 0.001));
    }

    #[test]
    fn rollback_discards_later_claims() {
        let req = requirement(RecoveryType::None);
        let mut pool = OfferPool::new(offer(vec![Resource::scalar(CPUS, 4.0)]), &req);
        pool.claim(0, "server", ClaimAmount::Scalar(1.0));
        let cp = pool.checkpoint();
        pool.claim(0, "server", ClaimAmount::Scalar(2.0));
        pool.rollback(cp);
        assert_eq!(pool.claims().len(), 1);
        assert!((pool.remaining_scalar(0) - 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn whole_claim_empties_resource() {
        let req = requirement(RecoveryType::None);
        let mut pool = OfferPool::new(
            offer(vec![Resource::ranges(PORTS, vec![Range { begin: 1, end: 5 }])]),
            &req,
        );
        pool.claim(0, "server", ClaimAmount::Whole);
        assert!(pool.remaining_ranges(0).is_empty());
    }

    #[test]
    fn port_claims_split_ranges() {
        let req = requirement(RecoveryType::None);
        let mut pool = OfferPool::new(
            offer(vec![Resource::ranges(
                PORTS,
                vec![Range { begin: 8000, end: 8005 }, Range::single(9000)],
            )]),
            &req,
        );
        pool.claim(0, "server", ClaimAmount::Ports(vec![8000, 8003, 9000]));
        assert_eq!(
            pool.remaining_ranges(0),
            vec![Range { begin: 8001, end: 8002 }, Range { begin: 8004, end: 8005 }]
        );
    }

    #[test]
    fn candidates_prefer_prior_reservation() {
        let req = requirement(RecoveryType::Transient);
        let pool = OfferPool::new(
            offer(vec![Resource::scalar(CPUS, 8.0), reserved_cpu(&req, 1.0)]),
            &req,
        );
        assert_eq!(pool.candidates(CPUS, &req, "server"), vec![1, 0]);
    }

    #[test]
    fn permanent_recovery_skips_prior_reservation() {
        let req = requirement(RecoveryType::Permanent);
        let pool = OfferPool::new(
            offer(vec![Resource::scalar(CPUS, 8.0), reserved_cpu(&req, 1.0)]),
            &req,
        );
        assert_eq!(pool.candidates(CPUS, &req, "server"), vec![0]);
    }

    #[test]
    fn skipped_reservations_follow_recovery_type() {
        let permanent = requirement(RecoveryType::Permanent);
        let resources = vec![Resource::scalar(CPUS, 8.0), reserved_cpu(&permanent, 1.0)];

        let pool = OfferPool::new(offer(resources.clone()), &permanent);
        assert_eq!(pool.skipped_reservations(&permanent), vec![1]);

        let transient = permanent.with_recovery_type(RecoveryType::Transient);
        let pool = OfferPool::new(offer(resources), &transient);
        assert!(pool.skipped_reservations(&transient).is_empty());
    }

    #[test]
    fn set_resources_have_no_scalar_or_range_view() {
        let req = requirement(RecoveryType::None);
        let set = Resource {
            name: CPUS.to_string(),
            value: ResourceValue::Set(["a".to_string()].into_iter().collect()),
            reservation: None,
            disk: None,
        };
        let pool = OfferPool::new(offer(vec![set]), &req);
        assert_eq!(pool.candidates(CPUS, &req, "server"), vec![0]);
        assert!(!pool.fits_scalar(0, 0.001));
        assert!(pool.remaining_ranges(0).is_empty());
    }

    #[test]
    fn foreign_reservations_are_never_candidates() {
        let req = requirement(RecoveryType::None);
        let foreign = Resource::scalar(CPUS, 2.0).reserved(Reservation {
            id: ReservationId::generate(),
            role: "other".to_string(),
            principal: "other".to_string(),
            owner: ReservationOwner {
                pod_type: "db".to_string(),
                index: 0,
                task: "server".to_string(),
            },
        });
        let pool = OfferPool::new(offer(vec![foreign]), &req);
        assert!(pool.candidates(CPUS, &req, "server").is_empty());
    }

    #[test]
    fn drafts_exist_for_launched_tasks_only() {
        let req = requirement(RecoveryType::None);
        let pool = OfferPool::new(offer(vec![]), &req);
        assert!(pool.draft("server").is_some());
        assert!(pool.draft("sidecar").is_none());
    }
}
