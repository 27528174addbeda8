/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Trait definition for decidable items, the boundary between snowstorm-rs and the VM that produces
//! them.
//!
//! A [`Candidate`] is an opaque item (a transaction, or a block) that competes for acceptance. The VM
//! is responsible for producing candidates and checking that they are semantically valid; snowstorm-rs
//! is only responsible for deciding, through repeated polling, which of a set of conflicting candidates
//! becomes final.
//!
//! ## Resources and dependencies
//!
//! A candidate exposes two lists of identifiers that the [conflict graph](crate::snowstorm) uses:
//! 1. **Resources** ([`Candidate::resources`]): shared resources the candidate consumes. Two
//!    candidates that claim the same resource conflict, and at most one of them may be accepted.
//! 2. **Dependencies** ([`Candidate::dependencies`]): other candidates that must be accepted before this
//!    one can be. If a dependency is rejected, so is this candidate.
//!
//! ## Decisions
//!
//! The conflict graph calls [`accept`](Candidate::accept) or [`reject`](Candidate::reject) exactly once
//! on every candidate it tracks. Implementations typically persist the decision. A failing decision is
//! **fatal** to the consensus instance: the in-memory graph may no longer agree with durable storage,
//! so the instance halts and surfaces the error to its host.
//!
//! ## Status freshness
//!
//! [`Candidate::status`] and the statuses reported in [`Candidate::dependencies`] must reflect the
//! latest decision made on the corresponding candidate, including decisions made by the conflict graph
//! through a *different* value with the same ID. The conflict graph relies on this to make `add`
//! idempotent and to decide whether a dependency still needs to be waited on.

use crate::types::data_types::{CandidateId, ResourceId};

/// Methods that a type needs to implement to be decided by a
/// [`ConflictGraph`](crate::snowstorm::ConflictGraph).
pub trait Candidate {
    /// The candidate's unique identifier.
    fn id(&self) -> CandidateId;

    /// The shared resources the candidate consumes, in order.
    fn resources(&self) -> Vec<ResourceId>;

    /// The candidates this candidate depends on, together with their current status.
    fn dependencies(&self) -> Vec<Dependency>;

    /// The candidate's current status.
    fn status(&self) -> Status;

    /// Mark the candidate as accepted.
    fn accept(&mut self) -> Result<(), DecisionError>;

    /// Mark the candidate as rejected.
    fn reject(&mut self) -> Result<(), DecisionError>;

    /// The candidate's binary payload. The graph only reads its length, for the `AddCandidate` event.
    fn bytes(&self) -> Vec<u8>;
}

/// Lifecycle of a candidate. `Accepted` and `Rejected` are terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Status {
    Processing,
    Accepted,
    Rejected,
}

impl Status {
    /// Whether the status is terminal.
    pub fn is_decided(self) -> bool {
        matches!(self, Status::Accepted | Status::Rejected)
    }
}

/// A dependency of a candidate, as reported by the VM.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Dependency {
    pub id: CandidateId,
    pub status: Status,
}

impl Dependency {
    pub fn new(id: CandidateId, status: Status) -> Self {
        Self { id, status }
    }
}

/// The two irreversible decisions that can be made on a candidate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
    Accept,
    Reject,
}

/// Enumerates the ways [`Candidate::accept`] or [`Candidate::reject`] can fail.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DecisionError {
    /// The decision could not be written to durable storage.
    PersistenceFailed { reason: String },

    /// The candidate was already decided differently, e.g., by another process sharing its storage.
    AlreadyDecided { status: Status },
}
