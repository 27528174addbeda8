/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The [`ConflictGraph`] struct and its node type.

use std::collections::{HashMap, HashSet, VecDeque};
use std::mem;
use std::sync::mpsc::Sender;
use std::time::SystemTime;

use crate::candidate::{Candidate, Decision, DecisionError, Dependency, Status};
use crate::events::*;
use crate::logging::first_seven_base64_chars;
use crate::parameters::{Parameters, ParametersError};
use crate::snowball::ConfidenceCounter;
use crate::types::{
    bag::Bag,
    data_types::{CandidateId, PollRound, ResourceId},
};

use super::dependencies::DependencyIndex;

/// Directed conflict graph over the candidates currently being processed.
///
/// Not internally synchronized: all methods take `&mut self` or `&self` and are expected to be called
/// from a single serialized execution context. [`InstanceHandle`](crate::instance::InstanceHandle)
/// provides such a context.
///
/// Read the [module-level docs](super) for an explanation of edges, preferences, and cascades.
pub struct ConflictGraph<C: Candidate> {
    parameters: Parameters,

    // The round of the last poll recorded.
    round: PollRound,

    nodes: HashMap<CandidateId, Node<C>>,

    // Resource index: every resource claimed by a processing candidate, and the candidates claiming it.
    spenders: HashMap<ResourceId, HashSet<CandidateId>>,

    // Resources claimed by accepted candidates. Any later claimant is rejected on arrival.
    consumed: HashSet<ResourceId>,

    // Candidates with no outbound edge.
    preferences: HashSet<CandidateId>,

    // Candidates that have never been in conflict.
    virtuous: HashSet<CandidateId>,

    // Virtuous candidates that have not yet been finalized.
    virtuous_voting: HashSet<CandidateId>,

    pending_acceptance: DependencyIndex,
    pending_rejection: DependencyIndex,

    // Number of accept and reject decisions made so far.
    decisions: u64,

    // Decision failures of the cascade currently being applied.
    failures: Vec<DecisionFailure>,
    halted: bool,

    event_publisher: Option<Sender<Event>>,
}

/// A candidate being processed, together with its consensus state.
pub struct Node<C: Candidate> {
    candidate: C,
    resources: Vec<ResourceId>,
    counter: ConfidenceCounter,

    // Conflicting candidates that this candidate is preferred over.
    ins: HashSet<CandidateId>,

    // Conflicting candidates that are preferred over this candidate.
    outs: HashSet<CandidateId>,

    rogue: bool,
    pending_accept: bool,
    acceptance_abandoned: bool,
}

impl<C: Candidate> Node<C> {
    fn new(candidate: C, resources: Vec<ResourceId>) -> Self {
        Self {
            candidate,
            resources,
            counter: ConfidenceCounter::new(),
            ins: HashSet::new(),
            outs: HashSet::new(),
            rogue: false,
            pending_accept: false,
            acceptance_abandoned: false,
        }
    }

    pub fn candidate(&self) -> &C {
        &self.candidate
    }

    /// The resources claimed by the candidate, without duplicates.
    pub fn resources(&self) -> &[ResourceId] {
        &self.resources
    }

    pub fn counter(&self) -> &ConfidenceCounter {
        &self.counter
    }

    /// Conflicting candidates that this candidate is currently preferred over.
    pub fn ins(&self) -> &HashSet<CandidateId> {
        &self.ins
    }

    /// Conflicting candidates that are currently preferred over this candidate.
    pub fn outs(&self) -> &HashSet<CandidateId> {
        &self.outs
    }

    /// Whether the candidate has ever been in conflict.
    pub fn is_rogue(&self) -> bool {
        self.rogue
    }

    /// Whether the candidate has met its finalization threshold, and is waiting for its dependencies
    /// before being accepted.
    pub fn is_pending_accept(&self) -> bool {
        self.pending_accept
    }

    /// Whether a dependency of the candidate was rejected after it met its finalization threshold, so
    /// that it will never be accepted.
    pub fn is_acceptance_abandoned(&self) -> bool {
        self.acceptance_abandoned
    }
}

// A decision queued while applying a cascade.
enum Transition {
    Accept(CandidateId),
    Reject(CandidateId),
}

// What the dependencies of a candidate look like from the graph's point of view.
enum DependencyState {
    Undecided(HashSet<CandidateId>),
    Rejected(CandidateId),
}

impl<C: Candidate> ConflictGraph<C> {
    /// Create an empty conflict graph, if `parameters` are valid.
    pub fn new(
        parameters: Parameters,
        event_publisher: Option<Sender<Event>>,
    ) -> Result<Self, ParametersError> {
        parameters.verify()?;
        Ok(Self {
            parameters,
            round: PollRound::init(),
            nodes: HashMap::new(),
            spenders: HashMap::new(),
            consumed: HashSet::new(),
            preferences: HashSet::new(),
            virtuous: HashSet::new(),
            virtuous_voting: HashSet::new(),
            pending_acceptance: DependencyIndex::new(),
            pending_rejection: DependencyIndex::new(),
            decisions: 0,
            failures: Vec::new(),
            halted: false,
            event_publisher,
        })
    }

    /// Start processing `candidate`.
    ///
    /// This is a no-op if the candidate is already being processed or has already been decided. A
    /// candidate that claims no resources cannot conflict with anything, and is accepted as soon as its
    /// dependencies are, without being voted on. A candidate with an already-rejected dependency, or
    /// that claims a resource already consumed by an accepted candidate, is rejected immediately.
    ///
    /// # Errors
    ///
    /// Returns [`ConflictGraphError::DecisionFailures`] if a decision made as a result of adding the
    /// candidate failed, and [`ConflictGraphError::Halted`] if an earlier call already did.
    pub fn add(&mut self, candidate: C) -> Result<(), ConflictGraphError> {
        self.ensure_not_halted()?;

        let id = candidate.id();
        if self.nodes.contains_key(&id) || candidate.status().is_decided() {
            log::trace!(
                "Ignoring candidate {} which is already known.",
                first_seven_base64_chars(&id.bytes())
            );
            return Ok(());
        }

        let mut resources = Vec::new();
        for resource in candidate.resources() {
            if !resources.contains(&resource) {
                resources.push(resource);
            }
        }
        let consumed = resources
            .iter()
            .find(|resource| self.consumed.contains(*resource))
            .copied();
        let dependency_state = self.dependency_state(candidate.dependencies());
        let size = candidate.bytes().len();
        let mut node = Node::new(candidate, resources);

        // Every existing claimant of a resource that this candidate claims is preferred over it.
        for resource in &node.resources {
            if let Some(spenders) = self.spenders.get(resource) {
                for spender_id in spenders {
                    if let Some(spender) = self.nodes.get_mut(spender_id) {
                        spender.ins.insert(id);
                        node.outs.insert(*spender_id);
                        if !spender.rogue {
                            spender.rogue = true;
                            self.virtuous.remove(spender_id);
                            self.virtuous_voting.remove(spender_id);
                        }
                    }
                }
            }
            self.spenders.entry(*resource).or_default().insert(id);
        }

        node.rogue = !node.outs.is_empty() || consumed.is_some();
        if !node.rogue {
            self.virtuous.insert(id);
            self.virtuous_voting.insert(id);
            self.preferences.insert(id);
        }
        let vacuous = node.resources.is_empty();
        let virtuous = !node.rogue;
        self.nodes.insert(id, node);

        Event::publish(
            &self.event_publisher,
            Event::AddCandidate(AddCandidateEvent {
                timestamp: SystemTime::now(),
                candidate: id,
                size,
                virtuous,
            }),
        );

        let mut queue = VecDeque::new();
        match (consumed, dependency_state) {
            (Some(resource), _) => {
                log::debug!(
                    "Rejecting candidate {} because it claims resource {} of an accepted candidate.",
                    first_seven_base64_chars(&id.bytes()),
                    first_seven_base64_chars(&resource.bytes())
                );
                self.reject(id, &mut queue);
            }
            (None, DependencyState::Rejected(dependency)) => {
                log::debug!(
                    "Rejecting candidate {} because its dependency {} is already rejected.",
                    first_seven_base64_chars(&id.bytes()),
                    first_seven_base64_chars(&dependency.bytes())
                );
                self.reject(id, &mut queue);
            }
            (None, DependencyState::Undecided(dependencies)) => {
                self.pending_rejection.register(id, dependencies);
                if vacuous {
                    self.defer_acceptance(id, &mut queue);
                }
            }
        }
        self.apply(queue);

        self.take_failures()
    }

    /// Apply the result of a poll.
    ///
    /// Every processing candidate that received at least alpha votes in `votes` has a successful poll
    /// recorded on its confidence counter. Candidates that thereby meet their finalization threshold
    /// have their acceptance deferred until their dependencies are accepted. Candidates that are not
    /// accepted have their edges redirected towards them wherever they now have strictly more
    /// successful polls than the competitor.
    ///
    /// Returns whether any preference changed, or any candidate was finalized or decided.
    ///
    /// # Errors
    ///
    /// Same as [`add`](Self::add).
    pub fn record_poll(&mut self, votes: &Bag<CandidateId>) -> Result<bool, ConflictGraphError> {
        self.ensure_not_halted()?;

        self.round = self.round + 1;
        let round = self.round;
        let decisions_before = self.decisions;
        let mut changed = false;

        let mut met_threshold: Vec<CandidateId> = votes
            .threshold(self.parameters.alpha as u64)
            .into_iter()
            .copied()
            .collect();
        met_threshold.sort();

        let mut successful = Vec::new();
        for id in met_threshold {
            let Some(node) = self.nodes.get_mut(&id) else {
                // Already decided, e.g., accepted because of its dependencies.
                continue;
            };
            node.counter.record_successful_poll(round);
            successful.push(id);

            log::trace!(
                "Candidate {} had a successful poll in round {} (total: {}, confidence: {}).",
                first_seven_base64_chars(&id.bytes()),
                round,
                node.counter.num_successful_polls(),
                node.counter.confidence()
            );

            if !node.pending_accept
                && node.counter.finalized(
                    self.parameters.beta_virtuous,
                    self.parameters.beta_rogue,
                    node.rogue,
                )
            {
                let mut queue = VecDeque::new();
                self.defer_acceptance(id, &mut queue);
                self.apply(queue);
                changed = true;
            }

            if self.nodes.contains_key(&id) {
                changed = self.redirect_edges(id) || changed;
            }
        }

        changed = changed || self.decisions != decisions_before;

        Event::publish(
            &self.event_publisher,
            Event::RecordPoll(RecordPollEvent {
                timestamp: SystemTime::now(),
                round,
                successful,
                changed,
            }),
        );

        self.take_failures().map(|()| changed)
    }

    /// Check whether `candidate` has no current or potential conflict.
    ///
    /// For a candidate that is being processed, this is whether it has ever been in conflict. For any
    /// other candidate, this is whether none of its resources are claimed by a processing candidate or
    /// consumed by an accepted one.
    pub fn is_virtuous(&self, candidate: &C) -> bool {
        if let Some(node) = self.nodes.get(&candidate.id()) {
            return !node.rogue;
        }
        candidate.resources().iter().all(|resource| {
            !self.spenders.contains_key(resource) && !self.consumed.contains(resource)
        })
    }

    /// Get the processing candidates that conflict with `candidate`.
    pub fn conflicts(&self, candidate: &C) -> HashSet<CandidateId> {
        let id = candidate.id();
        if let Some(node) = self.nodes.get(&id) {
            return node.ins.union(&node.outs).copied().collect();
        }

        let mut conflicts = HashSet::new();
        for resource in candidate.resources() {
            if let Some(spenders) = self.spenders.get(&resource) {
                conflicts.extend(spenders.iter().copied());
            }
        }
        conflicts.remove(&id);
        conflicts
    }

    /// Candidates that no conflicting candidate is preferred over.
    pub fn preferences(&self) -> &HashSet<CandidateId> {
        &self.preferences
    }

    /// Processing candidates that have never been in conflict.
    pub fn virtuous(&self) -> &HashSet<CandidateId> {
        &self.virtuous
    }

    /// Virtuous candidates that have not yet met their finalization threshold.
    pub fn virtuous_voting(&self) -> &HashSet<CandidateId> {
        &self.virtuous_voting
    }

    /// Whether there is no virtuous, unfinalized candidate left to poll for.
    pub fn quiesce(&self) -> bool {
        self.virtuous_voting.is_empty()
    }

    /// Whether every candidate that was added has been decided.
    pub fn finalized(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn is_processing(&self, id: &CandidateId) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn num_processing(&self) -> usize {
        self.nodes.len()
    }

    pub fn node(&self, id: &CandidateId) -> Option<&Node<C>> {
        self.nodes.get(id)
    }

    /// The resources currently claimed by processing candidates, and who claims them.
    pub fn spenders(&self, resource: &ResourceId) -> Option<&HashSet<CandidateId>> {
        self.spenders.get(resource)
    }

    /// Whether `resource` was claimed by a candidate that has been accepted.
    pub fn is_consumed(&self, resource: &ResourceId) -> bool {
        self.consumed.contains(resource)
    }

    /// Get the undecided dependencies a finalized candidate is still waiting for.
    pub fn pending_dependencies(&self, id: &CandidateId) -> Option<&HashSet<CandidateId>> {
        self.pending_acceptance.remaining(id)
    }

    /// The round of the last poll recorded.
    pub fn round(&self) -> PollRound {
        self.round
    }

    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    /// Whether a decision has failed, so that the graph refuses to process anything further.
    pub fn is_halted(&self) -> bool {
        self.halted
    }
}

// Cascades.
impl<C: Candidate> ConflictGraph<C> {
    // Mark `id` as pending acceptance, and queue its acceptance if it has nothing left to wait on.
    fn defer_acceptance(&mut self, id: CandidateId, queue: &mut VecDeque<Transition>) {
        let Some(node) = self.nodes.get_mut(&id) else {
            return;
        };
        node.pending_accept = true;
        let dependencies = node.candidate.dependencies();
        self.virtuous_voting.remove(&id);

        match self.dependency_state(dependencies) {
            DependencyState::Rejected(_) => queue.push_back(Transition::Reject(id)),
            DependencyState::Undecided(dependencies) => {
                if self.pending_acceptance.register(id, dependencies) {
                    queue.push_back(Transition::Accept(id));
                } else {
                    log::trace!(
                        "Deferring acceptance of candidate {} until its dependencies are accepted.",
                        first_seven_base64_chars(&id.bytes())
                    );
                }
            }
        }
    }

    // Apply every queued decision, and every decision they cause in turn.
    fn apply(&mut self, mut queue: VecDeque<Transition>) {
        while let Some(transition) = queue.pop_front() {
            match transition {
                Transition::Accept(id) => self.accept(id, &mut queue),
                Transition::Reject(id) => self.reject(id, &mut queue),
            }
        }
    }

    fn accept(&mut self, id: CandidateId, queue: &mut VecDeque<Transition>) {
        let ready = match self.nodes.get(&id) {
            Some(node) => {
                node.pending_accept
                    && !node.acceptance_abandoned
                    && !self.pending_acceptance.is_waiting(&id)
            }
            None => false,
        };
        if !ready {
            return;
        }
        let Some(mut node) = self.nodes.remove(&id) else {
            return;
        };

        self.forget(&id, &node.resources);
        self.consumed.extend(node.resources.iter().copied());
        self.decisions += 1;
        if let Err(error) = node.candidate.accept() {
            self.failures.push(DecisionFailure {
                candidate: id,
                decision: Decision::Accept,
                error,
            });
        }
        Event::publish(
            &self.event_publisher,
            Event::AcceptCandidate(AcceptCandidateEvent {
                timestamp: SystemTime::now(),
                candidate: id,
            }),
        );

        // At most one side of a conflict can be accepted. Conflicts are rejected right away, rather than
        // queued, so that a conflict whose own acceptance is already queued can never be accepted too.
        let mut conflicts: Vec<CandidateId> = node.ins.union(&node.outs).copied().collect();
        conflicts.sort();
        for conflict in conflicts {
            self.reject(conflict, queue);
        }

        for waiter in self.pending_acceptance.resolve(&id) {
            queue.push_back(Transition::Accept(waiter));
        }
        self.pending_rejection.resolve(&id);
    }

    fn reject(&mut self, id: CandidateId, queue: &mut VecDeque<Transition>) {
        let Some(mut node) = self.nodes.remove(&id) else {
            return;
        };

        for neighbor_id in node.ins.union(&node.outs) {
            if let Some(neighbor) = self.nodes.get_mut(neighbor_id) {
                neighbor.ins.remove(&id);
                neighbor.outs.remove(&id);
                if neighbor.outs.is_empty() {
                    self.preferences.insert(*neighbor_id);
                }
            }
        }

        self.forget(&id, &node.resources);
        self.decisions += 1;
        if let Err(error) = node.candidate.reject() {
            self.failures.push(DecisionFailure {
                candidate: id,
                decision: Decision::Reject,
                error,
            });
        }
        Event::publish(
            &self.event_publisher,
            Event::RejectCandidate(RejectCandidateEvent {
                timestamp: SystemTime::now(),
                candidate: id,
            }),
        );

        for waiter in self.pending_acceptance.drop_dependency(&id) {
            if let Some(waiter_node) = self.nodes.get_mut(&waiter) {
                waiter_node.acceptance_abandoned = true;
                log::debug!(
                    "Abandoning acceptance of candidate {} because its dependency {} was rejected.",
                    first_seven_base64_chars(&waiter.bytes()),
                    first_seven_base64_chars(&id.bytes())
                );
            }
        }
        for waiter in self.pending_rejection.drop_dependency(&id) {
            queue.push_back(Transition::Reject(waiter));
        }
    }

    // Remove every trace of a decided candidate from the graph's bookkeeping, except for its edges.
    fn forget(&mut self, id: &CandidateId, resources: &[ResourceId]) {
        self.preferences.remove(id);
        self.virtuous.remove(id);
        self.virtuous_voting.remove(id);
        self.pending_acceptance.forget(id);
        self.pending_rejection.forget(id);

        for resource in resources {
            if let Some(spenders) = self.spenders.get_mut(resource) {
                spenders.remove(id);
                if spenders.is_empty() {
                    self.spenders.remove(resource);
                }
            }
        }
    }

    // Work out which of `dependencies` must still be waited on. A dependency that is being processed
    // here is undecided no matter what status it reports.
    fn dependency_state(&self, dependencies: Vec<Dependency>) -> DependencyState {
        let mut undecided = HashSet::new();
        for dependency in dependencies {
            if self.nodes.contains_key(&dependency.id) {
                undecided.insert(dependency.id);
                continue;
            }
            match dependency.status {
                Status::Accepted => (),
                Status::Processing => {
                    undecided.insert(dependency.id);
                }
                Status::Rejected => return DependencyState::Rejected(dependency.id),
            }
        }
        DependencyState::Undecided(undecided)
    }

    fn ensure_not_halted(&self) -> Result<(), ConflictGraphError> {
        if self.halted {
            Err(ConflictGraphError::Halted)
        } else {
            Ok(())
        }
    }

    // Surface the failures of the cascade that was just applied. Any failure halts the graph.
    fn take_failures(&mut self) -> Result<(), ConflictGraphError> {
        if self.failures.is_empty() {
            return Ok(());
        }

        self.halted = true;
        let failures = mem::take(&mut self.failures);
        for failure in &failures {
            log::error!(
                "Failed to {:?} candidate {}: {:?}. Halting.",
                failure.decision,
                first_seven_base64_chars(&failure.candidate.bytes()),
                failure.error
            );
        }
        Event::publish(
            &self.event_publisher,
            Event::Halt(HaltEvent {
                timestamp: SystemTime::now(),
                failures: failures.clone(),
            }),
        );
        Err(ConflictGraphError::DecisionFailures(failures))
    }
}

// Edges.
impl<C: Candidate> ConflictGraph<C> {
    fn redirect_edges(&mut self, id: CandidateId) -> bool {
        let mut outs: Vec<CandidateId> = match self.nodes.get(&id) {
            Some(node) => node.outs.iter().copied().collect(),
            None => return false,
        };
        outs.sort();

        let mut changed = false;
        for conflict_id in outs {
            changed = self.redirect_edge(id, conflict_id) || changed;
        }
        changed
    }

    // Point the edge between `id` and `conflict_id` towards `id`, if `id` has strictly more successful
    // polls. Ties keep the current direction. The loser starts counting again from zero.
    fn redirect_edge(&mut self, id: CandidateId, conflict_id: CandidateId) -> bool {
        let Some(polls) = self
            .nodes
            .get(&id)
            .map(|node| node.counter.num_successful_polls())
        else {
            return false;
        };
        let Some(conflict) = self.nodes.get_mut(&conflict_id) else {
            return false;
        };
        if polls <= conflict.counter.num_successful_polls() {
            return false;
        }

        conflict.ins.remove(&id);
        conflict.outs.insert(id);
        conflict.counter.reset();
        self.preferences.remove(&conflict_id);

        if let Some(node) = self.nodes.get_mut(&id) {
            node.ins.insert(conflict_id);
            node.outs.remove(&conflict_id);
            if node.outs.is_empty() {
                self.preferences.insert(id);
            }
        }

        log::trace!(
            "Candidate {} is now preferred over {}.",
            first_seven_base64_chars(&id.bytes()),
            first_seven_base64_chars(&conflict_id.bytes())
        );
        true
    }
}

/// A decision on a single candidate that failed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecisionFailure {
    pub candidate: CandidateId,
    pub decision: Decision,
    pub error: DecisionError,
}

/// The different ways a call to a method of the `ConflictGraph` struct can fail.
///
/// Both variants are fatal: the graph's in-memory state may no longer agree with durable storage.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConflictGraphError {
    /// One or more decisions in a cascade failed. The failures are listed in the order they happened.
    /// Every other decision in the cascade was still applied.
    DecisionFailures(Vec<DecisionFailure>),

    /// A previous call returned `DecisionFailures`, and the graph refuses to process anything further.
    Halted,
}
