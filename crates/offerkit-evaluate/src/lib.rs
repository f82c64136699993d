//! Offer evaluation for a cluster resource scheduler.
//!
//! This crate decides whether a resource offer from the cluster manager can
//! host the tasks of one pod instance, and if so which operations to submit
//! to claim it. It handles:
//!
//! - Requirements: which tasks of which pod instance to launch, and why
//! - A pipeline of stages, each claiming part of the offer
//! - A PASS/FAIL outcome tree explaining every decision
//! - Reuse or replacement of prior reservations depending on recovery type
//! - TLS provisioning through a pluggable collaborator
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      Orchestration layer                        │
//! │          (InFlightRequirements, retries, submission)            │
//! └─────────────────────────────────────────────────────────────────┘
//!                              │  PodInstanceRequirement + Offer
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        OfferEvaluator                           │
//! │  ┌──────────┐ ┌───────┐ ┌────────┐ ┌────────┐ ┌─────┐ ┌──────┐  │
//! │  │ Scalar   │→│ Ports │→│ Volume │→│ Checks │→│ TLS │→│Launch│  │
//! │  └──────────┘ └───────┘ └────────┘ └────────┘ └─────┘ └──────┘  │
//! │                         │                        │              │
//! │                   ┌─────┴─────┐           ┌──────┴───────┐      │
//! │                   │ OfferPool │           │TlsProvisioner│      │
//! │                   └───────────┘           └──────────────┘      │
//! └─────────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//!                 EvaluationOutcome (tree) + operations
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use offerkit_evaluate::{
//!     accepted_operations, EvaluatorConfig, Offer, OfferEvaluator, PodInstance,
//!     PodInstanceRequirement, PodSpec, TaskSpec, TlsProvisioner,
//! };
//!
//! # async fn example(
//! #     offer: Offer,
//! #     provisioner: Arc<dyn TlsProvisioner>,
//! # ) -> Result<(), Box<dyn std::error::Error>> {
//! let pod = PodSpec {
//!     pod_type: "web".to_string(),
//!     user: None,
//!     tasks: vec![TaskSpec {
//!         name: "server".to_string(),
//!         command: "./server".to_string(),
//!         ..Default::default()
//!     }],
//! };
//! let requirement = PodInstanceRequirement::new(PodInstance::new(pod, 0), ["server"])?;
//!
//! let config = Arc::new(EvaluatorConfig::from_env());
//! config.validate()?;
//! let evaluator = OfferEvaluator::for_requirement(&requirement, config, provisioner);
//!
//! let outcome = evaluator.evaluate(&offer, &requirement).await?;
//! match accepted_operations(&outcome) {
//!     Some(operations) => println!("submitting {} operations", operations.len()),
//!     None => println!("declined:\n{}", outcome.render_tree()),
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Testing
//!
//! Enable the `test-utils` feature to use `MockTlsProvisioner`, which
//! fabricates PEM material and can be told to fail, stall, or issue expired
//! certificates.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod evaluator;
pub mod inflight;
pub mod offer;
pub mod outcome;
pub mod pool;
pub mod recommendation;
pub mod requirement;
pub mod security;
pub mod spec;
pub mod stage;

pub use config::EvaluatorConfig;
pub use error::{EvaluateError, Result};
pub use evaluator::{accepted_operations, OfferEvaluator, OfferSelection};
pub use inflight::{AdmissionError, InFlightRequirements};
pub use offer::{DiskSource, Offer, Range, Reservation, ReservationOwner, Resource, ResourceValue};
pub use outcome::{EvaluationOutcome, OutcomeType, ReasonCode};
pub use pool::OfferPool;
pub use recommendation::{OfferRecommendation, TaskLaunch};
pub use requirement::{PodInstanceRequirement, RecoveryType, RequirementOptions};
pub use security::{SecurityError, TlsArtifacts, TlsProvisioner};
pub use spec::{PodInstance, PodSpec, TaskSpec};
pub use stage::OfferEvaluationStage;

#[cfg(any(test, feature = "test-utils"))]
pub use security::mock::MockTlsProvisioner;
