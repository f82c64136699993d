//! Requirement model: what must be launched for one pod instance.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::spec::{PodInstance, TaskSpec};
use crate::{EvaluateError, Result};

/// Why a pod instance is being (re)launched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecoveryType {
    /// Initial or normal launch.
    #[default]
    None,
    /// Temporary failure; previously reserved resources are preferred.
    Transient,
    /// Permanent replacement; prior reservations must not be reused.
    Permanent,
}

impl RecoveryType {
    /// Whether resources reserved for the pod's prior incarnation may be used.
    #[must_use]
    pub const fn reuses_reservations(&self) -> bool {
        matches!(self, Self::None | Self::Transient)
    }
}

impl fmt::Display for RecoveryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::None => "NONE",
            Self::Transient => "TRANSIENT",
            Self::Permanent => "PERMANENT",
        };
        f.write_str(s)
    }
}

/// Optional fields of a [`PodInstanceRequirement`].
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RequirementOptions {
    /// Environment overrides merged over each task's declared environment.
    pub environment: BTreeMap<String, String>,
    /// Recovery classification.
    pub recovery_type: RecoveryType,
}

/// A pod instance together with the tasks that should be launched in it.
///
/// Immutable once constructed. Copies with a changed field are made through
/// [`with_recovery_type`](Self::with_recovery_type),
/// [`with_environment`](Self::with_environment), or
/// [`with_options`](Self::with_options) fed from [`to_options`](Self::to_options).
#[derive(Debug, Clone, PartialEq)]
pub struct PodInstanceRequirement {
    pod_instance: PodInstance,
    tasks_to_launch: BTreeSet<String>,
    environment: BTreeMap<String, String>,
    recovery_type: RecoveryType,
}

impl PodInstanceRequirement {
    /// Create a requirement with an empty environment and `RecoveryType::None`.
    ///
    /// # Errors
    ///
    /// Returns [`EvaluateError::InvalidRequirement`] if `tasks_to_launch` is
    /// empty or names a task the pod does not declare.
    pub fn new<I, S>(pod_instance: PodInstance, tasks_to_launch: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_options(pod_instance, tasks_to_launch, RequirementOptions::default())
    }

    /// Create a requirement with explicit optional fields.
    ///
    /// # Errors
    ///
    /// Returns [`EvaluateError::InvalidRequirement`] if `tasks_to_launch` is
    /// empty or names a task the pod does not declare.
    pub fn with_options<I, S>(
        pod_instance: PodInstance,
        tasks_to_launch: I,
        options: RequirementOptions,
    ) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let tasks_to_launch: BTreeSet<String> =
            tasks_to_launch.into_iter().map(Into::into).collect();

        if tasks_to_launch.is_empty() {
            return Err(EvaluateError::InvalidRequirement(format!(
                "no tasks to launch for pod {}",
                pod_instance.name()
            )));
        }
        if let Some(unknown) = tasks_to_launch
            .iter()
            .find(|name| pod_instance.pod.task(name).is_none())
        {
            return Err(EvaluateError::InvalidRequirement(format!(
                "pod {} does not declare task '{unknown}'",
                pod_instance.name()
            )));
        }

        Ok(Self {
            pod_instance,
            tasks_to_launch,
            environment: options.environment,
            recovery_type: options.recovery_type,
        })
    }

    /// The pod instance to realize.
    #[must_use]
    pub fn pod_instance(&self) -> &PodInstance {
        &self.pod_instance
    }

    /// Names of the tasks to launch.
    #[must_use]
    pub fn tasks_to_launch(&self) -> &BTreeSet<String> {
        &self.tasks_to_launch
    }

    /// Task specs to launch, in the pod's declaration order.
    pub fn launch_tasks(&self) -> impl Iterator<Item = &TaskSpec> {
        self.pod_instance
            .pod
            .tasks
            .iter()
            .filter(|t| self.tasks_to_launch.contains(&t.name))
    }

    /// Environment overrides.
    #[must_use]
    pub fn environment(&self) -> &BTreeMap<String, String> {
        &self.environment
    }

    /// Recovery classification.
    #[must_use]
    pub fn recovery_type(&self) -> RecoveryType {
        self.recovery_type
    }

    /// The optional fields of this requirement, for copy-with-override.
    #[must_use]
    pub fn to_options(&self) -> RequirementOptions {
        RequirementOptions {
            environment: self.environment.clone(),
            recovery_type: self.recovery_type,
        }
    }

    /// Copy of this requirement with a different recovery type.
    #[must_use]
    pub fn with_recovery_type(&self, recovery_type: RecoveryType) -> Self {
        Self {
            recovery_type,
            ..self.clone()
        }
    }

    /// Copy of this requirement with a different environment.
    #[must_use]
    pub fn with_environment(&self, environment: BTreeMap<String, String>) -> Self {
        Self {
            environment,
            ..self.clone()
        }
    }

    /// Scheduling fingerprint: `<pod-instance>:[task, ...]` with sorted task names.
    #[must_use]
    pub fn name(&self) -> String {
        let tasks: Vec<&str> = self.tasks_to_launch.iter().map(String::as_str).collect();
        format!("{}:[{}]", self.pod_instance.name(), tasks.join(", "))
    }

    /// Whether this requirement would act on the same tasks of the same pod
    /// instance as `other`.
    ///
    /// Comparing a requirement with itself returns `true`; callers that scan a
    /// queue containing `self` must skip it.
    #[must_use]
    pub fn conflicts_with(&self, other: &PodInstanceRequirement) -> bool {
        self.pod_instance.conflicts_with(&other.pod_instance)
            && !self.tasks_to_launch.is_disjoint(&other.tasks_to_launch)
    }
}

impl fmt::Display for PodInstanceRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}
