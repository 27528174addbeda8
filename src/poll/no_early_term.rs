/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Polls that wait for every sampled validator.

use crate::types::{bag::Bag, crypto_primitives::VerifyingKey, data_types::CandidateId};

use super::{Poll, PollFactory, Tally};

/// Creates [`NoEarlyTermPoll`]s.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoEarlyTermPollFactory;

impl NoEarlyTermPollFactory {
    pub fn new() -> Self {
        Self
    }
}

impl PollFactory for NoEarlyTermPollFactory {
    type Poll = NoEarlyTermPoll;

    fn new_poll(&self, sample: Bag<VerifyingKey>) -> NoEarlyTermPoll {
        NoEarlyTermPoll {
            tally: Tally::new(sample),
        }
    }
}

/// A poll that finishes only when every sampled validator has either voted or been dropped.
#[derive(Clone, Debug)]
pub struct NoEarlyTermPoll {
    tally: Tally,
}

impl Poll for NoEarlyTermPoll {
    fn vote(&mut self, voter: &VerifyingKey, choice: CandidateId) {
        self.tally.vote(voter, choice)
    }

    fn drop_voter(&mut self, voter: &VerifyingKey) {
        self.tally.drop_voter(voter)
    }

    fn finished(&self) -> bool {
        self.tally.remaining() == 0
    }

    fn result(&self) -> &Bag<CandidateId> {
        &self.tally.votes
    }

    fn into_result(self) -> Bag<CandidateId> {
        self.tally.votes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::crypto_primitives::SigningKey;

    #[test]
    fn waits_for_every_validator() {
        let validators: Vec<VerifyingKey> = (1..=3u8)
            .map(|seed| SigningKey::from_bytes(&[seed; 32]).verifying_key())
            .collect();
        let x = CandidateId::new([9; 32]);
        let mut poll = NoEarlyTermPollFactory::new().new_poll(validators.iter().copied().collect());

        poll.vote(&validators[0], x);
        poll.vote(&validators[1], x);
        assert!(!poll.finished());

        poll.drop_voter(&validators[2]);
        assert!(poll.finished());
        assert_eq!(poll.into_result().count(&x), 2);
    }
}
