//! Core types and utilities for offerkit.
//!
//! This crate provides the foundational types shared by the offer evaluation
//! layers:
//!
//! - **Identifiers**: Strongly-typed IDs for offers, reservations, and persistent volumes
//! - **Error types**: Identifier parsing errors shared across crates
//!
//! # Example
//!
//! ```
//! use offerkit_core::{OfferId, PersistenceId, ReservationId};
//!
//! // Offer IDs are issued by the cluster manager
//! let offer_id = OfferId::new("offer-1").unwrap();
//!
//! // Reservation and persistence IDs are minted by the scheduler
//! let reservation_id = ReservationId::generate();
//! let persistence_id = PersistenceId::generate();
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod ids;

pub use ids::{IdError, OfferId, PersistenceId, ReservationId};
