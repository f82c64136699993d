//! Resource-claiming operations to submit when accepting an offer.

use std::collections::BTreeMap;

use offerkit_core::{OfferId, ReservationId};
use serde::Serialize;

use crate::offer::Resource;
use crate::security::TlsArtifacts;
use crate::spec::{CheckSpec, EncryptionKind, GoalState};

/// A named port published through discovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscoveryPort {
    /// Port name.
    pub name: String,
    /// Assigned port number.
    pub number: u64,
}

/// Service discovery information attached to a launched task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscoveryInfo {
    /// Published name.
    pub name: String,
    /// Fully qualified DNS name.
    pub dns_name: String,
    /// Visibility, `CLUSTER` unless declared otherwise.
    pub visibility: String,
    /// Published ports.
    pub ports: Vec<DiscoveryPort>,
}

/// TLS material handed to a launched task.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TlsMaterial {
    /// Name the material is published under.
    pub name: String,
    /// Format the task asked for.
    pub kind: EncryptionKind,
    /// The issued artifacts.
    pub artifacts: TlsArtifacts,
}

/// A fully assembled task ready to be launched.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskLaunch {
    /// Full task name, `<pod>-<index>-<task>`.
    pub name: String,
    /// Task name within the pod.
    pub task: String,
    /// Pod instance name.
    pub pod_instance: String,
    /// Desired terminal state.
    pub goal: GoalState,
    /// Command line.
    pub command: String,
    /// User the task runs as.
    pub user: Option<String>,
    /// Effective environment.
    pub environment: BTreeMap<String, String>,
    /// Resources the task consumes, reused or freshly reserved.
    pub resources: Vec<Resource>,
    /// Health check.
    pub health_check: Option<CheckSpec>,
    /// Readiness check.
    pub readiness_check: Option<CheckSpec>,
    /// Discovery information.
    pub discovery: Option<DiscoveryInfo>,
    /// TLS material.
    pub transport_encryption: Vec<TlsMaterial>,
    /// Resource set the task draws from.
    pub resource_set: Option<String>,
}

/// An operation against an offer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OfferRecommendation {
    /// Dynamically reserve a slice of an offered resource.
    Reserve {
        /// Offer the resource comes from.
        offer_id: OfferId,
        /// The reserved slice, carrying its new reservation.
        resource: Resource,
    },
    /// Create a persistent volume on a reserved disk slice.
    CreateVolume {
        /// Offer the disk comes from.
        offer_id: OfferId,
        /// The disk slice, carrying its reservation and persistence.
        resource: Resource,
    },
    /// Launch a task.
    Launch {
        /// Offer the task's resources come from.
        offer_id: OfferId,
        /// The assembled task.
        task: Box<TaskLaunch>,
    },
}

impl OfferRecommendation {
    /// Offer this operation applies to.
    #[must_use]
    pub fn offer_id(&self) -> &OfferId {
        match self {
            Self::Reserve { offer_id, .. }
            | Self::CreateVolume { offer_id, .. }
            | Self::Launch { offer_id, .. } => offer_id,
        }
    }

    /// Short operation name for logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Reserve { .. } => "reserve",
            Self::CreateVolume { .. } => "create_volume",
            Self::Launch { .. } => "launch",
        }
    }

    /// Reservation created or consumed by a reserve/create operation.
    #[must_use]
    pub fn reservation_id(&self) -> Option<ReservationId> {
        match self {
            Self::Reserve { resource, .. } | Self::CreateVolume { resource, .. } => {
                resource.reservation.as_ref().map(|r| r.id)
            }
            Self::Launch { .. } => None,
        }
    }
}
