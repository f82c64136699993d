//! Registry of requirements currently being evaluated.
//!
//! The orchestration layer admits a requirement here before running its
//! pipeline and releases it afterwards, so no two runs act on the same tasks
//! of the same pod instance at the same time.

use std::collections::HashMap;

use parking_lot::RwLock;
use thiserror::Error;

use crate::requirement::PodInstanceRequirement;

/// Why a requirement was not admitted.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AdmissionError {
    /// A requirement with the same fingerprint is already in flight.
    #[error("requirement {0} is already in flight")]
    InFlight(String),

    /// An in-flight requirement shares tasks with this one.
    #[error("requirement {requirement} conflicts with in-flight {in_flight}")]
    Conflict {
        /// Fingerprint of the refused requirement.
        requirement: String,
        /// Fingerprint of the in-flight requirement it overlaps.
        in_flight: String,
    },
}

/// In-flight requirements keyed by fingerprint.
#[derive(Debug, Default)]
pub struct InFlightRequirements {
    entries: RwLock<HashMap<String, PodInstanceRequirement>>,
}

impl InFlightRequirements {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit `requirement` unless it duplicates or conflicts with one in flight.
    ///
    /// Returns the fingerprint to pass to [`release`](Self::release).
    ///
    /// # Errors
    ///
    /// Returns an [`AdmissionError`] naming the blocking requirement.
    pub fn try_admit(&self, requirement: &PodInstanceRequirement) -> Result<String, AdmissionError> {
        let name = requirement.name();
        let mut entries = self.entries.write();

        if entries.contains_key(&name) {
            return Err(AdmissionError::InFlight(name));
        }
        if let Some(other) = entries.values().find(|r| r.conflicts_with(requirement)) {
            return Err(AdmissionError::Conflict {
                requirement: name,
                in_flight: other.name(),
            });
        }

        entries.insert(name.clone(), requirement.clone());
        Ok(name)
    }

    /// Remove a requirement by fingerprint.
    pub fn release(&self, fingerprint: &str) -> Option<PodInstanceRequirement> {
        self.entries.write().remove(fingerprint)
    }

    /// Check if a fingerprint is in flight.
    #[must_use]
    pub fn contains(&self, fingerprint: &str) -> bool {
        self.entries.read().contains_key(fingerprint)
    }

    /// Number of in-flight requirements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Check if nothing is in flight.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
