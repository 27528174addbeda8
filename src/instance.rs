/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Methods to build, run, and drive a consensus instance.
//!
//! An instance bundles the [conflict graph](crate::snowstorm) and the [poll set](crate::poll) behind a
//! single lock, so that the host (the driver that talks to the network and the VM) can call into it from
//! as many threads as it likes. Every operation on an [`InstanceHandle`] takes the lock, runs to
//! completion, and releases it. In particular, when a vote finishes a poll, the poll's result is applied
//! to the conflict graph before the lock is released, so no caller can ever observe a decision cascade
//! half-applied.
//!
//! ## Starting an instance
//!
//! Instances are started using the builder pattern:
//!
//! ```ignore
//! let instance =
//!     InstanceSpec::builder()
//!     .configuration(configuration)
//!     .on_accept_candidate(accept_candidate_handler)
//!     .build()
//!     .start()?;
//!
//! let handle = instance.handle();
//! handle.issue(candidate)?;
//! ```
//!
//! Event handlers registered on the [`InstanceSpec`] are run on a separate event bus thread, which is
//! shut down when the [`Instance`] is dropped. Handles can outlive the instance, but events published
//! after it was dropped are discarded.
//!
//! ## Halting
//!
//! A failed [`Candidate::accept`] or [`Candidate::reject`] is fatal: the instance publishes a
//! [`HaltEvent`], logs the failures at `error` level, and from then on every mutating operation returns
//! [`ConflictGraphError::Halted`]. Queries keep working, so the host can inspect the state it was left
//! in.

use std::collections::HashSet;
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;

use typed_builder::TypedBuilder;

use crate::candidate::Candidate;
use crate::event_bus::*;
use crate::events::*;
use crate::parameters::{Parameters, ParametersError};
use crate::poll::{EarlyTermPollFactory, FinishedPoll, NoEarlyTermPollFactory, PollSet};
use crate::snowstorm::{ConflictGraph, ConflictGraphError};
use crate::types::{
    bag::Bag,
    crypto_primitives::VerifyingKey,
    data_types::{CandidateId, ChainID, RequestId},
};

#[derive(TypedBuilder, Clone, Copy, Debug)]
#[builder(builder_method(doc = "
    Create a builder for building a [Configuration]. On the builder call the following methods to construct a valid [Configuration].

    Required:
    - `.chain_id(...)`
    - `.parameters(...)`
    - `.early_termination(...)`
    - `.log_events(...)`
"))]
pub struct Configuration {
    #[builder(setter(doc = "Set the chain ID of the network the instance decides candidates for. Required."))]
    pub chain_id: ChainID,
    #[builder(setter(doc = "Set the Snowball [parameters](crate::parameters::Parameters). Required."))]
    pub parameters: Parameters,
    #[builder(setter(doc = "Finish polls as soon as their outcome is known, rather than waiting for every sampled validator? Required."))]
    pub early_termination: bool,
    #[builder(setter(doc = "Enable logging? Required."))]
    pub log_events: bool,
}

#[derive(TypedBuilder)]
#[builder(builder_method(doc = "
    Create a builder for building an [InstanceSpec]. On the builder call the following methods to construct a valid [InstanceSpec].

    Required:
    - `.configuration(...)`

    Optional:
    - `.on_add_candidate(...)`
    - `.on_accept_candidate(...)`
    - `.on_reject_candidate(...)`
    - `.on_record_poll(...)`
    - `.on_start_poll(...)`
    - `.on_finish_poll(...)`
    - `.on_halt(...)`
"))]
pub struct InstanceSpec<C: Candidate + Send + 'static> {
    #[builder(setter(doc = "Set the [configuration](Configuration), which contains the necessary parameters to run an instance. Required."))]
    configuration: Configuration,
    #[builder(default, setter(transform = |handler: impl Fn(&AddCandidateEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<AddCandidateEvent>),
    doc = "Register a handler closure to be invoked after a candidate starts being processed. Optional."))]
    on_add_candidate: Option<HandlerPtr<AddCandidateEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&AcceptCandidateEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<AcceptCandidateEvent>),
    doc = "Register a handler closure to be invoked after a candidate is accepted. Optional."))]
    on_accept_candidate: Option<HandlerPtr<AcceptCandidateEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&RejectCandidateEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<RejectCandidateEvent>),
    doc = "Register a handler closure to be invoked after a candidate is rejected. Optional."))]
    on_reject_candidate: Option<HandlerPtr<RejectCandidateEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&RecordPollEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<RecordPollEvent>),
    doc = "Register a handler closure to be invoked after a poll result is applied to the conflict graph. Optional."))]
    on_record_poll: Option<HandlerPtr<RecordPollEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&StartPollEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<StartPollEvent>),
    doc = "Register a handler closure to be invoked after a poll is registered. Optional."))]
    on_start_poll: Option<HandlerPtr<StartPollEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&FinishPollEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<FinishPollEvent>),
    doc = "Register a handler closure to be invoked after a poll finishes. Optional."))]
    on_finish_poll: Option<HandlerPtr<FinishPollEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&HaltEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<HaltEvent>),
    doc = "Register a handler closure to be invoked after a decision fails and the instance halts. Optional."))]
    on_halt: Option<HandlerPtr<HaltEvent>>,
    #[builder(default, setter(skip))]
    _candidate: std::marker::PhantomData<fn() -> C>,
}

impl<C: Candidate + Send + 'static> InstanceSpec<C> {
    /// Start the instance, and its event bus thread if any handler (or logging) is enabled.
    ///
    /// # Errors
    ///
    /// Returns [`InstanceError::Parameters`] if the configured parameters are invalid.
    pub fn start(self) -> Result<Instance<C>, InstanceError> {
        let configuration = self.configuration;
        configuration.parameters.verify()?;

        let event_handlers = EventHandlers::new(
            configuration.log_events,
            self.on_add_candidate,
            self.on_accept_candidate,
            self.on_reject_candidate,
            self.on_record_poll,
            self.on_start_poll,
            self.on_finish_poll,
            self.on_halt,
        );

        let (event_publisher, event_bus, event_bus_shutdown) = if !event_handlers.is_empty() {
            let (event_publisher, event_subscriber) = mpsc::channel();
            let (event_bus_shutdown, event_bus_shutdown_receiver) = mpsc::channel();
            let event_bus =
                start_event_bus(event_handlers, event_subscriber, event_bus_shutdown_receiver);
            (Some(event_publisher), Some(event_bus), Some(event_bus_shutdown))
        } else {
            (None, None, None)
        };

        let conflict_graph = ConflictGraph::new(configuration.parameters, event_publisher.clone())?;
        let polls = if configuration.early_termination {
            Polls::EarlyTerm(PollSet::new(
                EarlyTermPollFactory::new(&configuration.parameters)?,
                event_publisher,
            ))
        } else {
            Polls::NoEarlyTerm(PollSet::new(NoEarlyTermPollFactory::new(), event_publisher))
        };

        log::debug!(
            "Starting instance on chain {} with {:?}.",
            configuration.chain_id,
            configuration.parameters
        );

        Ok(Instance {
            chain_id: configuration.chain_id,
            handle: InstanceHandle {
                state: Arc::new(Mutex::new(State {
                    conflict_graph,
                    polls,
                })),
            },
            event_bus,
            event_bus_shutdown,
        })
    }
}

/// A running consensus instance. Dropping it shuts down its event bus thread.
pub struct Instance<C: Candidate + Send + 'static> {
    chain_id: ChainID,
    handle: InstanceHandle<C>,
    event_bus: Option<JoinHandle<()>>,
    event_bus_shutdown: Option<Sender<()>>,
}

impl<C: Candidate + Send + 'static> Instance<C> {
    /// Get a handle through which the instance can be driven. Handles are cheap to clone and can be
    /// shared across threads.
    pub fn handle(&self) -> InstanceHandle<C> {
        self.handle.clone()
    }

    pub fn chain_id(&self) -> ChainID {
        self.chain_id
    }
}

impl<C: Candidate + Send + 'static> Drop for Instance<C> {
    fn drop(&mut self) {
        // A send error means that the event bus already exited because every publisher was dropped.
        if let Some(shutdown) = self.event_bus_shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(event_bus) = self.event_bus.take() {
            if event_bus.join().is_err() {
                log::error!("An event handler panicked.");
            }
        }
    }
}

/// Whether a vote (or a dropped vote) finished its poll.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PollOutcome {
    /// The poll is still outstanding, or the request ID is unknown.
    Pending,

    /// The poll finished and its result was applied to the conflict graph. `changed` is whether any
    /// preference changed or any candidate was finalized or decided as a result.
    Finished { changed: bool },
}

/// Cloneable, thread-safe handle to a running [`Instance`].
pub struct InstanceHandle<C: Candidate + Send + 'static> {
    state: Arc<Mutex<State<C>>>,
}

impl<C: Candidate + Send + 'static> Clone for InstanceHandle<C> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

struct State<C: Candidate> {
    conflict_graph: ConflictGraph<C>,
    polls: Polls,
}

// The two kinds of poll sets, chosen at start-up by `Configuration::early_termination`.
enum Polls {
    EarlyTerm(PollSet<EarlyTermPollFactory>),
    NoEarlyTerm(PollSet<NoEarlyTermPollFactory>),
}

impl Polls {
    fn add(&mut self, request_id: RequestId, sample: Bag<VerifyingKey>) -> bool {
        match self {
            Polls::EarlyTerm(polls) => polls.add(request_id, sample),
            Polls::NoEarlyTerm(polls) => polls.add(request_id, sample),
        }
    }

    fn vote(
        &mut self,
        request_id: RequestId,
        voter: &VerifyingKey,
        choice: CandidateId,
    ) -> Option<FinishedPoll> {
        match self {
            Polls::EarlyTerm(polls) => polls.vote(request_id, voter, choice),
            Polls::NoEarlyTerm(polls) => polls.vote(request_id, voter, choice),
        }
    }

    fn drop_voter(&mut self, request_id: RequestId, voter: &VerifyingKey) -> Option<FinishedPoll> {
        match self {
            Polls::EarlyTerm(polls) => polls.drop_voter(request_id, voter),
            Polls::NoEarlyTerm(polls) => polls.drop_voter(request_id, voter),
        }
    }

    fn len(&self) -> usize {
        match self {
            Polls::EarlyTerm(polls) => polls.len(),
            Polls::NoEarlyTerm(polls) => polls.len(),
        }
    }
}

impl<C: Candidate + Send + 'static> InstanceHandle<C> {
    /// Start processing `candidate`. A no-op for candidates that are already known.
    pub fn issue(&self, candidate: C) -> Result<(), InstanceError> {
        let mut state = self.lock_for_update()?;
        state.conflict_graph.add(candidate)?;
        Ok(())
    }

    /// Register a poll that samples `sample` under `request_id`.
    ///
    /// Returns `false` if the poll was not registered because the request ID is already in use or the
    /// sample is empty.
    pub fn start_poll(
        &self,
        request_id: RequestId,
        sample: Bag<VerifyingKey>,
    ) -> Result<bool, InstanceError> {
        let mut state = self.lock_for_update()?;
        Ok(state.polls.add(request_id, sample))
    }

    /// Record `voter`'s response to the poll with `request_id`, applying the poll's result to the
    /// conflict graph if this vote finished it.
    pub fn vote(
        &self,
        request_id: RequestId,
        voter: &VerifyingKey,
        choice: CandidateId,
    ) -> Result<PollOutcome, InstanceError> {
        let mut state = self.lock_for_update()?;
        let finished = state.polls.vote(request_id, voter, choice);
        state.record(finished)
    }

    /// Record that `voter` will not respond to the poll with `request_id`, applying the poll's result
    /// to the conflict graph if this finished it.
    pub fn drop_vote(
        &self,
        request_id: RequestId,
        voter: &VerifyingKey,
    ) -> Result<PollOutcome, InstanceError> {
        let mut state = self.lock_for_update()?;
        let finished = state.polls.drop_voter(request_id, voter);
        state.record(finished)
    }

    /// Number of polls currently outstanding.
    pub fn outstanding_polls(&self) -> usize {
        self.lock().polls.len()
    }

    /// Number of new polls the driver should start to keep `concurrent_repolls` polls outstanding.
    /// Zero if there is nothing to poll for.
    pub fn polls_needed(&self) -> usize {
        let state = self.lock();
        if state.conflict_graph.quiesce() {
            return 0;
        }
        let concurrent_repolls = state.conflict_graph.parameters().concurrent_repolls as usize;
        concurrent_repolls.saturating_sub(state.polls.len())
    }

    /// Whether there is no virtuous, unfinalized candidate left to poll for.
    pub fn quiesce(&self) -> bool {
        self.lock().conflict_graph.quiesce()
    }

    /// Whether every candidate issued so far has been decided.
    pub fn finalized(&self) -> bool {
        self.lock().conflict_graph.finalized()
    }

    /// The candidates that should be voted for when answering a query.
    pub fn preferences(&self) -> HashSet<CandidateId> {
        self.lock().conflict_graph.preferences().clone()
    }

    pub fn virtuous(&self) -> HashSet<CandidateId> {
        self.lock().conflict_graph.virtuous().clone()
    }

    pub fn is_virtuous(&self, candidate: &C) -> bool {
        self.lock().conflict_graph.is_virtuous(candidate)
    }

    pub fn conflicts(&self, candidate: &C) -> HashSet<CandidateId> {
        self.lock().conflict_graph.conflicts(candidate)
    }

    pub fn is_processing(&self, id: &CandidateId) -> bool {
        self.lock().conflict_graph.is_processing(id)
    }

    pub fn num_processing(&self) -> usize {
        self.lock().conflict_graph.num_processing()
    }

    pub fn is_halted(&self) -> bool {
        self.lock().conflict_graph.is_halted()
    }

    // Queries are still answered after a panic poisoned the lock. Updates are not.
    fn lock(&self) -> MutexGuard<'_, State<C>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_for_update(&self) -> Result<MutexGuard<'_, State<C>>, InstanceError> {
        let state = self.state.lock().map_err(|_| InstanceError::Poisoned)?;
        if state.conflict_graph.is_halted() {
            return Err(InstanceError::ConflictGraph(ConflictGraphError::Halted));
        }
        Ok(state)
    }
}

impl<C: Candidate> State<C> {
    fn record(&mut self, finished: Option<FinishedPoll>) -> Result<PollOutcome, InstanceError> {
        match finished {
            Some(finished) => {
                let changed = self.conflict_graph.record_poll(&finished.votes)?;
                Ok(PollOutcome::Finished { changed })
            }
            None => Ok(PollOutcome::Pending),
        }
    }
}

/// The different ways starting or driving an instance can fail.
#[derive(Debug)]
pub enum InstanceError {
    Parameters(ParametersError),
    ConflictGraph(ConflictGraphError),

    /// A thread panicked while holding the instance's lock, possibly in the middle of a cascade.
    Poisoned,
}

impl From<ParametersError> for InstanceError {
    fn from(value: ParametersError) -> Self {
        InstanceError::Parameters(value)
    }
}

impl From<ConflictGraphError> for InstanceError {
    fn from(value: ConflictGraphError) -> Self {
        InstanceError::ConflictGraph(value)
    }
}
