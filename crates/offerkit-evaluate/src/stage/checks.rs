//! Health and readiness check attachment.

use async_trait::async_trait;

use super::{unknown_task, OfferEvaluationStage};
use crate::outcome::{EvaluationOutcome, ReasonCode};
use crate::pool::OfferPool;
use crate::requirement::PodInstanceRequirement;
use crate::spec::CheckSpec;
use crate::{fail, pass, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CheckKind {
    Health,
    Readiness,
}

impl CheckKind {
    const fn source(self) -> &'static str {
        match self {
            Self::Health => "HealthCheckStage",
            Self::Readiness => "ReadinessCheckStage",
        }
    }

    const fn label(self) -> &'static str {
        match self {
            Self::Health => "health",
            Self::Readiness => "readiness",
        }
    }
}

/// Attaches a health or readiness check to a task.
///
/// Claims no resources.
pub struct CheckStage {
    kind: CheckKind,
    task: String,
    check: Option<CheckSpec>,
}

impl CheckStage {
    /// Attach `check` as the health check of `task`.
    #[must_use]
    pub fn health(task: impl Into<String>, check: Option<CheckSpec>) -> Self {
        Self {
            kind: CheckKind::Health,
            task: task.into(),
            check,
        }
    }

    /// Attach `check` as the readiness check of `task`.
    #[must_use]
    pub fn readiness(task: impl Into<String>, check: Option<CheckSpec>) -> Self {
        Self {
            kind: CheckKind::Readiness,
            task: task.into(),
            check,
        }
    }
}

#[async_trait]
impl OfferEvaluationStage for CheckStage {
    fn source(&self) -> &str {
        self.kind.source()
    }

    async fn evaluate(
        &self,
        pool: &mut OfferPool,
        _requirement: &PodInstanceRequirement,
    ) -> Result<EvaluationOutcome> {
        let source = self.kind.source();
        let label = self.kind.label();
        let Some(draft) = pool.draft_mut(&self.task) else {
            return Ok(unknown_task(source, &self.task));
        };
        let Some(check) = &self.check else {
            return Ok(pass!(
                source,
                ReasonCode::NotRequested,
                "task '{}' declares no {label} check",
                self.task
            ));
        };

        if check.command.trim().is_empty() {
            return Ok(fail!(
                source,
                ReasonCode::CheckInvalid,
                "{label} check of task '{}' has an empty command",
                self.task
            ));
        }
        if check.interval_secs == 0 {
            return Ok(fail!(
                source,
                ReasonCode::CheckInvalid,
                "{label} check of task '{}' has a zero interval",
                self.task
            ));
        }

        match self.kind {
            CheckKind::Health => draft.health_check = Some(check.clone()),
            CheckKind::Readiness => draft.readiness_check = Some(check.clone()),
        }
        Ok(pass!(
            source,
            ReasonCode::CheckAttached,
            "attached {label} check '{}' to task '{}'",
            check.command,
            self.task
        ))
    }
}
