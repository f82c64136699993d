//! Core identifier types for offerkit.
//!
//! This module provides strongly-typed identifiers for offers, reservations,
//! and persistent volumes. Offer IDs come from the cluster manager; the other
//! two are minted by the scheduler whenever it claims fresh resources.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identifier of a resource offer, as issued by the cluster manager.
///
/// Offer IDs are opaque to the scheduler. The only requirement is that they
/// are non-empty.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OfferId(String);

impl OfferId {
    /// Create a new `OfferId`.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is empty or only whitespace.
    pub fn new(value: impl Into<String>) -> Result<Self, IdError> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(IdError::Empty);
        }
        Ok(Self(value))
    }

    /// Return the underlying string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for OfferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OfferId({})", self.0)
    }
}

impl fmt::Display for OfferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for OfferId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for OfferId {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<OfferId> for String {
    fn from(id: OfferId) -> Self {
        id.0
    }
}

/// A 16-byte reservation identifier based on UUID v4.
///
/// A new reservation ID is generated for every fresh reservation the scheduler
/// makes. Reservations carried on an offer keep the ID they were created with,
/// which is how a pod's prior reservation is recognized.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ReservationId(uuid::Uuid);

/// A 16-byte persistent volume identifier based on UUID v4.
///
/// Generated when a persistent volume is first created and stable for the
/// lifetime of the volume.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PersistenceId(uuid::Uuid);

impl ReservationId {
    /// Create a new `ReservationId` from a UUID.
    #[must_use]
    pub const fn from_uuid(uuid: uuid::Uuid) -> Self {
        Self(uuid)
    }

    /// Generate a new random `ReservationId`.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    /// Return the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &uuid::Uuid {
        &self.0
    }
}

impl FromStr for ReservationId {
    type Err = IdError;

    /// Parse a `ReservationId` from a UUID string.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let uuid = uuid::Uuid::parse_str(s).map_err(|_| IdError::InvalidUuid)?;
        Ok(Self(uuid))
    }
}

impl fmt::Debug for ReservationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ReservationId({})", self.0)
    }
}

impl fmt::Display for ReservationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for ReservationId {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ReservationId> for String {
    fn from(id: ReservationId) -> Self {
        id.0.to_string()
    }
}

impl PersistenceId {
    /// Create a new `PersistenceId` from a UUID.
    #[must_use]
    pub const fn from_uuid(uuid: uuid::Uuid) -> Self {
        Self(uuid)
    }

    /// Generate a new random `PersistenceId`.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    /// Return the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &uuid::Uuid {
        &self.0
    }
}

impl FromStr for PersistenceId {
    type Err = IdError;

    /// Parse a `PersistenceId` from a UUID string.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let uuid = uuid::Uuid::parse_str(s).map_err(|_| IdError::InvalidUuid)?;
        Ok(Self(uuid))
    }
}

impl fmt::Debug for PersistenceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PersistenceId({})", self.0)
    }
}

impl fmt::Display for PersistenceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for PersistenceId {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PersistenceId> for String {
    fn from(id: PersistenceId) -> Self {
        id.0.to_string()
    }
}

/// Errors that can occur when parsing identifiers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdError {
    /// The identifier was empty.
    #[error("identifier must not be empty")]
    Empty,

    /// The input is not a valid UUID.
    #[error("invalid UUID format")]
    InvalidUuid,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offer_id_rejects_empty() {
        assert_eq!(OfferId::new(""), Err(IdError::Empty));
        assert_eq!(OfferId::new("   "), Err(IdError::Empty));
        assert_eq!(OfferId::new("offer-7").unwrap().as_str(), "offer-7");
    }

    #[test]
    fn offer_id_serde_json() {
        let id = OfferId::new("20240101-0001-O42").unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"20240101-0001-O42\"");
        let parsed: OfferId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, parsed);

        let empty: Result<OfferId, _> = serde_json::from_str("\"\"");
        assert!(empty.is_err());
    }

    #[test]
    fn reservation_ids_are_unique() {
        assert_ne!(ReservationId::generate(), ReservationId::generate());
    }

    #[test]
    fn reservation_id_roundtrip() {
        let id = ReservationId::generate();
        let parsed = ReservationId::from_str(&id.to_string()).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn reservation_id_invalid_uuid() {
        let result = ReservationId::from_str("not-a-uuid");
        assert!(matches!(result, Err(IdError::InvalidUuid)));
    }

    #[test]
    fn persistence_id_serde_json() {
        let id = PersistenceId::generate();
        let json = serde_json::to_string(&id).unwrap();
        let parsed: PersistenceId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn persistence_id_invalid_uuid() {
        let result = PersistenceId::from_str("volume-1");
        assert!(matches!(result, Err(IdError::InvalidUuid)));
    }
}
