/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Subprotocol for aggregating the responses to outstanding queries.
//!
//! Every time the driver queries a sample of validators for their preferences, it registers a
//! [`Poll`] in the [`PollSet`] under the query's [`RequestId`](crate::types::data_types::RequestId).
//! Responses are then fed to the poll set as they arrive: [`vote`](PollSet::vote) for an answer, and
//! [`drop_voter`](PollSet::drop_voter) for a timeout or an error. When a poll finishes, it is removed
//! from the set and its tally is returned, ready to be handed to
//! [`ConflictGraph::record_poll`](crate::snowstorm::ConflictGraph::record_poll).
//!
//! ## Lifecycle of a poll
//!
//! A poll is **open** from the moment it is added until its completion condition is met, at which point
//! it becomes **finished**. Finished polls are removed from the set immediately, so any later vote or
//! drop for the same request ID is a no-op, exactly like one for a request ID that was never added.
//!
//! ## Completion conditions
//!
//! Two kinds of polls are provided, and chosen between by passing the corresponding [`PollFactory`] to
//! the poll set:
//! 1. [`EarlyTermPoll`]: finishes as soon as the outcome is known, that is, when every sampled
//!    validator has responded, when some candidate has already received alpha votes, or when no
//!    candidate can still reach alpha votes.
//! 2. [`NoEarlyTermPoll`]: finishes only when every sampled validator has responded.
//!
//! ## Weights
//!
//! Samples are [bags](crate::types::bag::Bag) of validators. A validator sampled `n` times responds once,
//! and its vote counts `n` times.
//!
//! ## Cancellation
//!
//! Polls have no internal timer. A poll that never completes stays open until the driver's timeout
//! manager calls `drop_voter` on behalf of every unresponsive validator.

use crate::types::{bag::Bag, crypto_primitives::VerifyingKey, data_types::CandidateId};

pub mod early_term;

pub mod no_early_term;

pub mod set;

pub use early_term::{EarlyTermPoll, EarlyTermPollFactory};
pub use no_early_term::{NoEarlyTermPoll, NoEarlyTermPollFactory};
pub use set::{FinishedPoll, PollSet};

/// A single outstanding query.
pub trait Poll {
    /// Record `voter`'s vote for `choice`. A no-op if `voter` was not sampled or has already responded.
    fn vote(&mut self, voter: &VerifyingKey, choice: CandidateId);

    /// Record that `voter` will not respond. A no-op if `voter` was not sampled or has already
    /// responded.
    fn drop_voter(&mut self, voter: &VerifyingKey);

    /// Whether the poll's completion condition has been met.
    fn finished(&self) -> bool;

    /// The tally of the votes received so far.
    fn result(&self) -> &Bag<CandidateId>;

    /// Consume the poll, returning its tally.
    fn into_result(self) -> Bag<CandidateId>;
}

/// Creates [`Poll`]s for a [`PollSet`].
pub trait PollFactory {
    type Poll: Poll;

    fn new_poll(&self, sample: Bag<VerifyingKey>) -> Self::Poll;
}

// State shared by both kinds of polls: who still has to respond, and what has been voted so far.
#[derive(Clone, Debug)]
pub(crate) struct Tally {
    pub(crate) polled: Bag<VerifyingKey>,
    pub(crate) votes: Bag<CandidateId>,
}

impl Tally {
    pub(crate) fn new(sample: Bag<VerifyingKey>) -> Self {
        Self {
            polled: sample,
            votes: Bag::new(),
        }
    }

    pub(crate) fn vote(&mut self, voter: &VerifyingKey, choice: CandidateId) {
        let weight = self.polled.remove(voter);
        self.votes.add_count(choice, weight);
    }

    pub(crate) fn drop_voter(&mut self, voter: &VerifyingKey) {
        self.polled.remove(voter);
    }

    /// Weight of the sampled validators that have not responded yet.
    pub(crate) fn remaining(&self) -> u64 {
        self.polled.len()
    }
}
