//! Transport encryption provisioning.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, warn};

use super::{unknown_task, OfferEvaluationStage};
use crate::config::EvaluatorConfig;
use crate::outcome::{EvaluationOutcome, ReasonCode};
use crate::pool::OfferPool;
use crate::recommendation::TlsMaterial;
use crate::requirement::PodInstanceRequirement;
use crate::security::{SecurityError, TlsArtifacts, TlsProvisioner};
use crate::spec::TransportEncryptionSpec;
use crate::{fail, pass, Result};

const SOURCE: &str = "TransportEncryptionStage";

/// Obtains TLS material for each transport-encryption request of a task.
///
/// Every request is provisioned through the [`TlsProvisioner`], bounded by the
/// configured timeout, and validated. The stage passes only when every
/// request succeeds; any collaborator failure becomes a FAIL child.
pub struct TransportEncryptionStage {
    config: Arc<EvaluatorConfig>,
    task: String,
    requests: Vec<TransportEncryptionSpec>,
    provisioner: Arc<dyn TlsProvisioner>,
}

impl TransportEncryptionStage {
    /// Create a stage provisioning `requests` for `task`.
    #[must_use]
    pub fn new(
        config: Arc<EvaluatorConfig>,
        task: impl Into<String>,
        requests: Vec<TransportEncryptionSpec>,
        provisioner: Arc<dyn TlsProvisioner>,
    ) -> Self {
        Self {
            config,
            task: task.into(),
            requests,
            provisioner,
        }
    }

    async fn provision(&self, task_name: &str) -> std::result::Result<TlsArtifacts, SecurityError> {
        let timeout = self.config.tls_timeout();
        let artifacts = tokio::time::timeout(
            timeout,
            self.provisioner
                .generate(&self.config.service_name, task_name),
        )
        .await
        .map_err(|_| SecurityError::Timeout(self.config.tls_timeout_secs))??;
        artifacts.validate(Utc::now())?;
        Ok(artifacts)
    }
}

#[async_trait]
impl OfferEvaluationStage for TransportEncryptionStage {
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
        if self.requests.is_empty() {
            return Ok(pass!(
                SOURCE,
                ReasonCode::NotRequested,
                "task '{}' requests no transport encryption",
                self.task
            ));
        }

        let task_name = requirement.pod_instance().task_full_name(&self.task);
        let mut materials = Vec::with_capacity(self.requests.len());
        let mut children = Vec::with_capacity(self.requests.len());

        for request in &self.requests {
            match self.provision(&task_name).await {
                Ok(artifacts) => {
                    debug!(task = %task_name, name = %request.name, "TLS material provisioned");
                    children.push(pass!(
                        SOURCE,
                        ReasonCode::TlsProvisioned,
                        "provisioned {:?} material '{}' for {task_name}",
                        request.kind,
                        request.name
                    ));
                    materials.push(TlsMaterial {
                        name: request.name.clone(),
                        kind: request.kind,
                        artifacts,
                    });
                }
                Err(e) => {
                    warn!(task = %task_name, name = %request.name, error = %e, "TLS provisioning failed");
                    children.push(fail!(
                        SOURCE,
                        ReasonCode::TlsFailed,
                        "could not provision '{}' for {task_name}: {e}",
                        request.name
                    ));
                }
            }
        }

        let failed = children.iter().filter(|c| !c.is_passing()).count();
        if failed > 0 {
            return Ok(fail!(
                SOURCE,
                ReasonCode::TlsFailed,
                "{failed} of {} transport encryption request(s) failed for task '{}'",
                self.requests.len(),
                self.task
            )
            .with_children(children));
        }

        if let Some(draft) = pool.draft_mut(&self.task) {
            draft.transport_encryption.extend(materials);
        }
        Ok(pass!(
            SOURCE,
            ReasonCode::TlsProvisioned,
            "provisioned {} transport encryption request(s) for task '{}'",
            self.requests.len(),
            self.task
        )
        .with_children(children))
    }
}
