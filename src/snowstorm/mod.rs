/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Subprotocol for deciding between conflicting candidates.
//!
//! The [`ConflictGraph`] tracks every [`Candidate`](crate::candidate::Candidate) that is currently being
//! processed, which of them conflict (claim a common resource), and which way each conflict currently
//! leans. Poll results fed into [`record_poll`](ConflictGraph::record_poll) move these leanings and, once
//! a candidate has gathered enough consecutive support, decide it.
//!
//! ## Edges and preferences
//!
//! Every pair of conflicting candidates is connected by exactly one directed edge, which points *from*
//! the less preferred candidate *to* the more preferred one. From the point of view of a node:
//! - `outs` are the conflicts that are currently preferred over it, and
//! - `ins` are the conflicts that it is currently preferred over.
//!
//! A candidate with no `outs` is **preferred**. A candidate that has never had a conflict is
//! **virtuous**; one that has is **rogue** (this flag is sticky).
//!
//! When a candidate is added, every existing claimant of each of its resources is preferred over it
//! ("first mover wins"). An edge is flipped only when the candidate at its tail has strictly more
//! successful polls than the candidate at its head. Ties never flip an edge, so two candidates with equal
//! support do not oscillate. The candidate that loses an edge has its confidence counter reset to zero,
//! so it must out-poll the winner from scratch to take the edge back.
//!
//! ## Finalization
//!
//! A candidate is finalized when its confidence counter reaches `beta_virtuous` (virtuous candidates) or
//! `beta_rogue` (rogue candidates). Finalization does not accept the candidate right away: its
//! acceptance is deferred until every undecided dependency is accepted.
//!
//! ## Cascades
//!
//! Decisions propagate:
//! - **Acceptance** of a candidate rejects every candidate it conflicts with, and may make candidates
//!   that were waiting for it ready to be accepted. Its resources stay consumed: a candidate added
//!   later that claims one of them is rejected on arrival.
//! - **Rejection** of a candidate frees its resources and edges (possibly making its conflicts preferred),
//!   rejects every candidate that depends on it, and abandons the pending acceptance of those same
//!   dependents.
//!
//! A cascade is applied in full within the `add` or `record_poll` call that started it. The
//! [`Candidate::accept`](crate::candidate::Candidate::accept)/[`reject`](crate::candidate::Candidate::reject)
//! calls made during a cascade can fail; every failure is collected, the cascade is still finished, and
//! the call returns all of them. From then on, the graph is halted.
//!
//! ## Concurrency
//!
//! The conflict graph is not internally synchronized. The caller must serialize access, which
//! [`InstanceHandle`](crate::instance::InstanceHandle) does by keeping it behind a mutex.

pub mod conflict_graph;

pub(crate) mod dependencies;

pub use conflict_graph::{ConflictGraph, ConflictGraphError, DecisionFailure, Node};
