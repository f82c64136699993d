//! Pod and task declarations consumed by the evaluation stages.
//!
//! These types are produced by the declarative service-spec layer, which has
//! already rejected duplicate keys and malformed values. The evaluation core
//! treats them as read-only input.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Desired terminal state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GoalState {
    /// Task should keep running.
    #[default]
    Running,
    /// Task runs to completion, and is relaunched on configuration change.
    Finished,
    /// Task runs to completion exactly once.
    Once,
}

/// Scalar resources a task asks for.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct ResourceRequest {
    /// CPU shares.
    #[serde(default)]
    pub cpus: f64,
    /// GPU count.
    #[serde(default)]
    pub gpus: f64,
    /// Memory in megabytes.
    #[serde(default)]
    pub memory_mb: f64,
}

/// A named port declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortSpec {
    /// Port name, also used for discovery and the default env var.
    pub name: String,
    /// Requested port; `0` asks for any available port.
    #[serde(default)]
    pub port: u64,
    /// Environment variable to export the assigned port under.
    #[serde(default)]
    pub env_key: Option<String>,
}

impl PortSpec {
    /// Environment variable the assigned port is exported under.
    #[must_use]
    pub fn env_name(&self) -> String {
        self.env_key.clone().unwrap_or_else(|| {
            format!("PORT_{}", self.name.to_uppercase().replace('-', "_"))
        })
    }
}

/// Command-based health or readiness check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckSpec {
    /// Shell command to run.
    pub command: String,
    /// Seconds between checks.
    #[serde(default = "default_check_interval")]
    pub interval_secs: u32,
    /// Seconds before a single check is considered timed out.
    #[serde(default = "default_check_timeout")]
    pub timeout_secs: u32,
    /// Seconds to wait after launch before the first check.
    #[serde(default)]
    pub delay_secs: u32,
    /// Seconds during which failures are not counted.
    #[serde(default)]
    pub grace_period_secs: u32,
    /// Failures tolerated before the task is killed.
    #[serde(default = "default_max_failures")]
    pub max_consecutive_failures: u32,
}

fn default_check_interval() -> u32 {
    30
}

fn default_check_timeout() -> u32 {
    20
}

fn default_max_failures() -> u32 {
    3
}

impl CheckSpec {
    /// Create a check with default timing for the given command.
    #[must_use]
    pub fn command(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            interval_secs: default_check_interval(),
            timeout_secs: default_check_timeout(),
            delay_secs: 0,
            grace_period_secs: 0,
            max_consecutive_failures: default_max_failures(),
        }
    }
}

/// Kind of disk backing a volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VolumeKind {
    /// A slice of the agent's root disk.
    #[default]
    Root,
    /// An entire dedicated mount disk.
    Mount,
}

/// A persistent volume declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeSpec {
    /// Path the volume is mounted at inside the task sandbox.
    pub container_path: String,
    /// Requested size in megabytes.
    pub size_mb: f64,
    /// Disk kind.
    #[serde(default)]
    pub kind: VolumeKind,
}

/// Service discovery settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct DiscoverySpec {
    /// Name prefix; the task is published as `<prefix>-<index>`.
    #[serde(default)]
    pub prefix: Option<String>,
    /// Discovery visibility, e.g. `CLUSTER` or `EXTERNAL`.
    #[serde(default)]
    pub visibility: Option<String>,
}

/// Format of the TLS material handed to a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EncryptionKind {
    /// PEM-encoded certificate, key, and CA files.
    #[default]
    Tls,
    /// Key store and trust store.
    Keystore,
}

/// A transport-encryption request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportEncryptionSpec {
    /// Name the material is published under.
    pub name: String,
    /// Format of the material.
    #[serde(default)]
    pub kind: EncryptionKind,
}

/// Declaration of a single task within a pod.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct TaskSpec {
    /// Task name, unique within its pod.
    pub name: String,
    /// Desired terminal state.
    #[serde(default)]
    pub goal: GoalState,
    /// Command line to execute.
    pub command: String,
    /// Statically declared environment.
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
    /// Scalar resources.
    #[serde(default)]
    pub resources: ResourceRequest,
    /// Port declarations.
    #[serde(default)]
    pub ports: Vec<PortSpec>,
    /// Health check.
    #[serde(default)]
    pub health_check: Option<CheckSpec>,
    /// Readiness check.
    #[serde(default)]
    pub readiness_check: Option<CheckSpec>,
    /// Persistent volumes.
    #[serde(default)]
    pub volumes: Vec<VolumeSpec>,
    /// Resource set this task draws from.
    #[serde(default)]
    pub resource_set: Option<String>,
    /// Discovery settings.
    #[serde(default)]
    pub discovery: Option<DiscoverySpec>,
    /// Transport-encryption requests.
    #[serde(default)]
    pub transport_encryption: Vec<TransportEncryptionSpec>,
}

/// Declaration of a pod type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PodSpec {
    /// Pod type, e.g. `web`.
    pub pod_type: String,
    /// User the tasks run as.
    #[serde(default)]
    pub user: Option<String>,
    /// Tasks in declaration order.
    pub tasks: Vec<TaskSpec>,
}

impl PodSpec {
    /// Look up a task by name.
    #[must_use]
    pub fn task(&self, name: &str) -> Option<&TaskSpec> {
        self.tasks.iter().find(|t| t.name == name)
    }
}

/// One replica of a pod type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PodInstance {
    /// The pod declaration.
    pub pod: PodSpec,
    /// Replica index.
    pub index: u32,
}

impl PodInstance {
    /// Create a pod instance.
    #[must_use]
    pub fn new(pod: PodSpec, index: u32) -> Self {
        Self { pod, index }
    }

    /// Pod type of this instance.
    #[must_use]
    pub fn pod_type(&self) -> &str {
        &self.pod.pod_type
    }

    /// Instance name, `<type>-<index>`.
    #[must_use]
    pub fn name(&self) -> String {
        format!("{}-{}", self.pod.pod_type, self.index)
    }

    /// Full name of a task in this instance, `<type>-<index>-<task>`.
    #[must_use]
    pub fn task_full_name(&self, task: &str) -> String {
        format!("{}-{task}", self.name())
    }

    /// Two instances conflict when they are the same replica of the same type.
    #[must_use]
    pub fn conflicts_with(&self, other: &PodInstance) -> bool {
        self.pod.pod_type == other.pod.pod_type && self.index == other.index
    }
}
