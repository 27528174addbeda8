/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Definitions of snowstorm-rs events for event handling and logging.
//!
//! An event for a given action indicates that the action has been completed. Events are published
//! by the [conflict graph](crate::snowstorm) and the [poll set](crate::poll) onto a channel, and
//! dispatched to user-registered handlers (and, if enabled, the default [loggers](crate::logging))
//! on a separate thread by the [`Instance`](crate::instance::Instance).
//!
//! Because handlers run on another thread, they can never observe a cascade half-applied: every event
//! of a cascade is published before the lock that guards the conflict graph is released, but handlers
//! only see the events, never the graph.

use std::sync::mpsc::Sender;
use std::time::{Duration, SystemTime};

use crate::snowstorm::DecisionFailure;
use crate::types::{
    bag::Bag,
    data_types::{CandidateId, PollRound, RequestId},
};

/// Enumerates all events defined for snowstorm-rs.
pub enum Event {
    // Events that change the conflict graph.
    AddCandidate(AddCandidateEvent),
    AcceptCandidate(AcceptCandidateEvent),
    RejectCandidate(RejectCandidateEvent),
    RecordPoll(RecordPollEvent),
    // Events that change the poll set.
    StartPoll(StartPollEvent),
    FinishPoll(FinishPollEvent),
    // Fatal.
    Halt(HaltEvent),
}

impl Event {
    /// Send `event` to the event bus, if there is one. A disconnected bus means that the instance is
    /// shutting down, so the event is silently discarded.
    pub(crate) fn publish(event_publisher: &Option<Sender<Event>>, event: Event) {
        if let Some(event_publisher) = event_publisher {
            let _ = event_publisher.send(event);
        }
    }
}

/// A new candidate was added to the conflict graph and is now being processed (or was vacuously
/// accepted, in which case an [`AcceptCandidateEvent`] follows).
pub struct AddCandidateEvent {
    pub timestamp: SystemTime,
    pub candidate: CandidateId,
    /// Length of the candidate's binary payload, in bytes.
    pub size: usize,
    pub virtuous: bool,
}

/// A candidate was accepted.
pub struct AcceptCandidateEvent {
    pub timestamp: SystemTime,
    pub candidate: CandidateId,
}

/// A candidate was rejected, either because a conflicting candidate was accepted or because one of its
/// dependencies was rejected.
pub struct RejectCandidateEvent {
    pub timestamp: SystemTime,
    pub candidate: CandidateId,
}

/// A poll result was applied to the conflict graph.
pub struct RecordPollEvent {
    pub timestamp: SystemTime,
    pub round: PollRound,
    /// Candidates that received at least alpha votes and were still being processed.
    pub successful: Vec<CandidateId>,
    pub changed: bool,
}

/// A new poll was registered in the poll set.
pub struct StartPollEvent {
    pub timestamp: SystemTime,
    pub request_id: RequestId,
    pub sample_size: u64,
}

/// A poll finished and was removed from the poll set.
pub struct FinishPollEvent {
    pub timestamp: SystemTime,
    pub request_id: RequestId,
    /// Time elapsed between the poll being registered and it finishing.
    pub duration: Duration,
    pub votes: Bag<CandidateId>,
}

/// A candidate decision failed, and the instance stopped processing.
pub struct HaltEvent {
    pub timestamp: SystemTime,
    pub failures: Vec<DecisionFailure>,
}
