/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Polls that finish as soon as their outcome is known.

use crate::parameters::{Parameters, ParametersError};
use crate::types::{bag::Bag, crypto_primitives::VerifyingKey, data_types::CandidateId};

use super::{Poll, PollFactory, Tally};

/// Creates [`EarlyTermPoll`]s with a fixed `alpha`.
#[derive(Clone, Copy, Debug)]
pub struct EarlyTermPollFactory {
    alpha: u64,
}

impl EarlyTermPollFactory {
    /// Create a factory for polls with the `alpha` in `parameters`, if the parameters are valid.
    pub fn new(parameters: &Parameters) -> Result<Self, ParametersError> {
        parameters.verify()?;
        Ok(Self {
            alpha: parameters.alpha as u64,
        })
    }
}

impl PollFactory for EarlyTermPollFactory {
    type Poll = EarlyTermPoll;

    fn new_poll(&self, sample: Bag<VerifyingKey>) -> EarlyTermPoll {
        EarlyTermPoll {
            tally: Tally::new(sample),
            alpha: self.alpha,
        }
    }
}

/// A poll that finishes when either:
/// 1. Every sampled validator has responded,
/// 2. Some candidate has received at least alpha votes, or
/// 3. No candidate can receive alpha votes anymore, even if every remaining validator votes for it.
#[derive(Clone, Debug)]
pub struct EarlyTermPoll {
    tally: Tally,
    alpha: u64,
}

impl Poll for EarlyTermPoll {
    fn vote(&mut self, voter: &VerifyingKey, choice: CandidateId) {
        self.tally.vote(voter, choice)
    }

    fn drop_voter(&mut self, voter: &VerifyingKey) {
        self.tally.drop_voter(voter)
    }

    fn finished(&self) -> bool {
        let remaining = self.tally.remaining();
        let most_votes = self.tally.votes.mode().map_or(0, |(_, count)| count);

        remaining == 0 || most_votes >= self.alpha || most_votes + remaining < self.alpha
    }

    fn result(&self) -> &Bag<CandidateId> {
        &self.tally.votes
    }

    fn into_result(self) -> Bag<CandidateId> {
        self.tally.votes
    }
}
