//! Resource offers as presented by the cluster manager.

use std::collections::BTreeSet;

use offerkit_core::{OfferId, PersistenceId, ReservationId};
use serde::{Deserialize, Serialize};

use crate::spec::PodInstance;

/// Resource name for CPU shares.
pub const CPUS: &str = "cpus";
/// Resource name for GPUs.
pub const GPUS: &str = "gpus";
/// Resource name for memory, in megabytes.
pub const MEM: &str = "mem";
/// Resource name for port ranges.
pub const PORTS: &str = "ports";
/// Resource name for disk, in megabytes.
pub const DISK: &str = "disk";

/// Inclusive numeric range, e.g. a block of ports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Range {
    /// First value, inclusive.
    pub begin: u64,
    /// Last value, inclusive.
    pub end: u64,
}

impl Range {
    /// A range covering a single value.
    #[must_use]
    pub const fn single(value: u64) -> Self {
        Self {
            begin: value,
            end: value,
        }
    }

    /// Whether `value` falls inside the range.
    #[must_use]
    pub const fn contains(&self, value: u64) -> bool {
        self.begin <= value && value <= self.end
    }
}

/// Value carried by a resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceValue {
    /// A divisible quantity.
    Scalar(f64),
    /// A list of inclusive ranges.
    Ranges(Vec<Range>),
    /// A set of named items.
    Set(BTreeSet<String>),
}

/// The pod task a reservation was made for.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReservationOwner {
    /// Pod type.
    pub pod_type: String,
    /// Replica index.
    pub index: u32,
    /// Task name.
    pub task: String,
}

impl ReservationOwner {
    /// Owner label for a task of a pod instance.
    #[must_use]
    pub fn for_task(pod_instance: &PodInstance, task: &str) -> Self {
        Self {
            pod_type: pod_instance.pod_type().to_string(),
            index: pod_instance.index,
            task: task.to_string(),
        }
    }

    /// Whether the reservation belongs to `task` of `pod_instance`.
    #[must_use]
    pub fn is_task(&self, pod_instance: &PodInstance, task: &str) -> bool {
        self.is_pod(pod_instance) && self.task == task
    }

    /// Whether the reservation belongs to any task of `pod_instance`.
    #[must_use]
    pub fn is_pod(&self, pod_instance: &PodInstance) -> bool {
        self.pod_type == pod_instance.pod_type() && self.index == pod_instance.index
    }
}

/// A dynamic reservation carried on a resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    /// Reservation identity.
    pub id: ReservationId,
    /// Role the resource is reserved to.
    pub role: String,
    /// Principal that made the reservation.
    pub principal: String,
    /// Task the reservation was made for.
    pub owner: ReservationOwner,
}

/// Where disk space comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DiskSource {
    /// The agent's root disk, divisible.
    #[default]
    Root,
    /// A dedicated mount disk, only usable whole.
    Mount {
        /// Host path of the mount point.
        root: String,
    },
}

/// A persistent volume living on a reserved disk resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Persistence {
    /// Volume identity.
    pub id: PersistenceId,
    /// Path the volume is mounted at inside the task sandbox.
    pub container_path: String,
}

/// Disk-specific resource information.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct DiskInfo {
    /// Disk source.
    pub source: DiskSource,
    /// Persistent volume, if one has been created.
    pub persistence: Option<Persistence>,
}

/// One resource in an offer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    /// Resource name, e.g. `cpus` or `ports`.
    pub name: String,
    /// Resource value.
    pub value: ResourceValue,
    /// Dynamic reservation, if any.
    pub reservation: Option<Reservation>,
    /// Disk information for `disk` resources.
    pub disk: Option<DiskInfo>,
}

impl Resource {
    /// An unreserved scalar resource.
    #[must_use]
    pub fn scalar(name: impl Into<String>, amount: f64) -> Self {
        Self {
            name: name.into(),
            value: ResourceValue::Scalar(amount),
            reservation: None,
            disk: None,
        }
    }

    /// An unreserved ranges resource.
    #[must_use]
    pub fn ranges(name: impl Into<String>, ranges: Vec<Range>) -> Self {
        Self {
            name: name.into(),
            value: ResourceValue::Ranges(ranges),
            reservation: None,
            disk: None,
        }
    }

    /// An unreserved disk resource.
    #[must_use]
    pub fn disk(size_mb: f64, source: DiskSource) -> Self {
        Self {
            name: DISK.to_string(),
            value: ResourceValue::Scalar(size_mb),
            reservation: None,
            disk: Some(DiskInfo {
                source,
                persistence: None,
            }),
        }
    }

    /// This resource with a reservation attached.
    #[must_use]
    pub fn reserved(mut self, reservation: Reservation) -> Self {
        self.reservation = Some(reservation);
        self
    }

    /// This disk resource with a persistent volume attached.
    #[must_use]
    pub fn with_persistence(mut self, persistence: Persistence) -> Self {
        let disk = self.disk.get_or_insert_with(DiskInfo::default);
        disk.persistence = Some(persistence);
        self
    }

    /// Scalar amount, if this is a scalar resource.
    #[must_use]
    pub fn as_scalar(&self) -> Option<f64> {
        match self.value {
            ResourceValue::Scalar(v) => Some(v),
            _ => None,
        }
    }

    /// Ranges, if this is a ranges resource.
    #[must_use]
    pub fn as_ranges(&self) -> Option<&[Range]> {
        match &self.value {
            ResourceValue::Ranges(r) => Some(r),
            _ => None,
        }
    }

    /// Whether the resource has no dynamic reservation.
    #[must_use]
    pub fn is_unreserved(&self) -> bool {
        self.reservation.is_none()
    }

    /// Whether the resource is reserved for `task` of `pod_instance`.
    #[must_use]
    pub fn is_reserved_for(&self, pod_instance: &PodInstance, task: &str) -> bool {
        self.reservation
            .as_ref()
            .is_some_and(|r| r.owner.is_task(pod_instance, task))
    }

    /// Whether the resource is reserved for any task of `pod_instance`.
    #[must_use]
    pub fn is_reserved_for_pod(&self, pod_instance: &PodInstance) -> bool {
        self.reservation
            .as_ref()
            .is_some_and(|r| r.owner.is_pod(pod_instance))
    }
}

/// A bundle of resources offered by one agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Offer {
    /// Offer identity.
    pub id: OfferId,
    /// Agent hostname.
    pub hostname: String,
    /// Offered resources.
    pub resources: Vec<Resource>,
}

impl Offer {
    /// Create an offer.
    #[must_use]
    pub fn new(id: OfferId, hostname: impl Into<String>, resources: Vec<Resource>) -> Self {
        Self {
            id,
            hostname: hostname.into(),
            resources,
        }
    }
}
