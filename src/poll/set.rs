/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The [`PollSet`]: outstanding polls, keyed by request ID.

use std::collections::HashMap;
use std::sync::mpsc::Sender;
use std::time::{Duration, Instant, SystemTime};

use crate::events::{Event, FinishPollEvent, StartPollEvent};
use crate::logging::first_seven_base64_chars;
use crate::types::{
    bag::Bag,
    crypto_primitives::VerifyingKey,
    data_types::{CandidateId, RequestId},
};

use super::{Poll, PollFactory};

/// Collection of outstanding polls.
///
/// Not internally synchronized: the caller must serialize access. Duplicate registrations and responses
/// for unknown polls are expected under adversarial or lossy network conditions, and are treated as
/// no-ops.
pub struct PollSet<F: PollFactory> {
    factory: F,
    polls: HashMap<RequestId, PollHolder<F::Poll>>,
    event_publisher: Option<Sender<Event>>,
}

struct PollHolder<P> {
    poll: P,
    start: Instant,
}

/// The outcome of a poll that has just finished.
#[derive(Clone, Debug)]
pub struct FinishedPoll {
    pub request_id: RequestId,

    /// Vote weight received by each candidate.
    pub votes: Bag<CandidateId>,

    /// Time elapsed between the poll being added and it finishing.
    pub duration: Duration,
}

impl<F: PollFactory> PollSet<F> {
    pub fn new(factory: F, event_publisher: Option<Sender<Event>>) -> Self {
        Self {
            factory,
            polls: HashMap::new(),
            event_publisher,
        }
    }

    /// Register a new poll that samples `sample`.
    ///
    /// Returns `false`, and does nothing, if a poll with `request_id` is already outstanding or if
    /// `sample` is empty. In both cases the caller should not expect the poll to ever finish.
    pub fn add(&mut self, request_id: RequestId, sample: Bag<VerifyingKey>) -> bool {
        if self.polls.contains_key(&request_id) {
            log::debug!(
                "Dropping poll due to duplicated request ID: {}.",
                request_id
            );
            return false;
        }
        if sample.is_empty() {
            log::debug!("Dropping poll {} with an empty sample.", request_id);
            return false;
        }

        log::trace!(
            "Creating poll {} sampling {} validators.",
            request_id,
            sample.len()
        );
        let sample_size = sample.len();
        self.polls.insert(
            request_id,
            PollHolder {
                poll: self.factory.new_poll(sample),
                start: Instant::now(),
            },
        );

        Event::publish(
            &self.event_publisher,
            Event::StartPoll(StartPollEvent {
                timestamp: SystemTime::now(),
                request_id,
                sample_size,
            }),
        );
        true
    }

    /// Record `voter`'s vote for `choice` in the poll with `request_id`.
    ///
    /// Returns the poll's outcome if this vote finished it. Votes for unknown (or already finished)
    /// polls, repeated votes, and votes from validators that were not sampled are ignored.
    pub fn vote(
        &mut self,
        request_id: RequestId,
        voter: &VerifyingKey,
        choice: CandidateId,
    ) -> Option<FinishedPoll> {
        let Some(holder) = self.polls.get_mut(&request_id) else {
            log::trace!(
                "Dropping vote from {} to an unknown poll with request ID: {}.",
                first_seven_base64_chars(voter.as_bytes()),
                request_id
            );
            return None;
        };

        log::trace!(
            "Processing vote from {} in poll {} for candidate {}.",
            first_seven_base64_chars(voter.as_bytes()),
            request_id,
            first_seven_base64_chars(&choice.bytes())
        );
        holder.poll.vote(voter, choice);
        self.finish_if_done(request_id)
    }

    /// Record that `voter` will not respond to the poll with `request_id`, e.g., because its request
    /// timed out.
    ///
    /// Returns the poll's outcome if this finished it.
    pub fn drop_voter(&mut self, request_id: RequestId, voter: &VerifyingKey) -> Option<FinishedPoll> {
        let Some(holder) = self.polls.get_mut(&request_id) else {
            log::trace!(
                "Dropping failed response from {} to an unknown poll with request ID: {}.",
                first_seven_base64_chars(voter.as_bytes()),
                request_id
            );
            return None;
        };

        log::trace!(
            "Processing failed response from {} in poll {}.",
            first_seven_base64_chars(voter.as_bytes()),
            request_id
        );
        holder.poll.drop_voter(voter);
        self.finish_if_done(request_id)
    }

    /// Number of outstanding polls.
    pub fn len(&self) -> usize {
        self.polls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.polls.is_empty()
    }

    pub fn contains(&self, request_id: &RequestId) -> bool {
        self.polls.contains_key(request_id)
    }

    fn finish_if_done(&mut self, request_id: RequestId) -> Option<FinishedPoll> {
        if !self.polls.get(&request_id)?.poll.finished() {
            return None;
        }

        let holder = self.polls.remove(&request_id)?;
        let duration = holder.start.elapsed();
        let votes = holder.poll.into_result();
        log::trace!(
            "Poll {} finished after {:?} with {} votes.",
            request_id,
            duration,
            votes.len()
        );

        Event::publish(
            &self.event_publisher,
            Event::FinishPoll(FinishPollEvent {
                timestamp: SystemTime::now(),
                request_id,
                duration,
                votes: votes.clone(),
            }),
        );

        Some(FinishedPoll {
            request_id,
            votes,
            duration,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;

    use super::*;
    use crate::parameters::Parameters;
    use crate::poll::{EarlyTermPollFactory, NoEarlyTermPollFactory};
    use crate::types::crypto_primitives::SigningKey;

    fn validators(n: u8) -> Vec<VerifyingKey> {
        (1..=n)
            .map(|seed| SigningKey::from_bytes(&[seed; 32]).verifying_key())
            .collect()
    }

    fn early_term_set(k: u32, alpha: u32) -> PollSet<EarlyTermPollFactory> {
        let parameters = Parameters::builder()
            .k(k)
            .alpha(alpha)
            .beta_virtuous(1)
            .beta_rogue(1)
            .build();
        PollSet::new(EarlyTermPollFactory::new(&parameters).unwrap(), None)
    }

    #[test]
    fn duplicate_request_id_is_refused() {
        let vdrs = validators(3);
        let mut set = early_term_set(3, 2);
        assert!(set.add(RequestId::new(1), vdrs.iter().copied().collect()));
        assert!(!set.add(RequestId::new(1), vdrs.iter().copied().collect()));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn empty_sample_is_refused() {
        let mut set = early_term_set(3, 2);
        assert!(!set.add(RequestId::new(1), Bag::new()));
        assert!(set.is_empty());
    }

    #[test]
    fn finishes_early_with_alpha_votes() {
        let vdrs = validators(3);
        let x = CandidateId::new([7; 32]);
        let request = RequestId::new(1);
        let mut set = early_term_set(3, 2);
        set.add(request, vdrs.iter().copied().collect());

        assert!(set.vote(request, &vdrs[0], x).is_none());
        let finished = set.vote(request, &vdrs[1], x).expect("poll should finish");
        assert_eq!(finished.request_id, request);
        assert_eq!(finished.votes.count(&x), 2);
        assert!(set.is_empty());

        // The poll is gone, so the last validator's vote is a no-op.
        assert!(set.vote(request, &vdrs[2], x).is_none());
    }

    #[test]
    fn unknown_poll_and_repeated_votes_are_ignored() {
        let vdrs = validators(3);
        let x = CandidateId::new([7; 32]);
        let mut set = PollSet::new(NoEarlyTermPollFactory::new(), None);
        set.add(RequestId::new(1), vdrs.iter().copied().collect());

        assert!(set.vote(RequestId::new(2), &vdrs[0], x).is_none());
        assert!(set.drop_voter(RequestId::new(2), &vdrs[0]).is_none());
        assert!(set.vote(RequestId::new(1), &vdrs[0], x).is_none());
        assert!(set.vote(RequestId::new(1), &vdrs[0], x).is_none());
        assert!(set.drop_voter(RequestId::new(1), &vdrs[1]).is_none());

        let finished = set
            .vote(RequestId::new(1), &vdrs[2], x)
            .expect("poll should finish");
        assert_eq!(finished.votes.count(&x), 2);
    }

    #[test]
    fn publishes_start_and_finish_events() {
        let vdrs = validators(1);
        let x = CandidateId::new([7; 32]);
        let (publisher, subscriber) = mpsc::channel();
        let mut set = PollSet::new(NoEarlyTermPollFactory::new(), Some(publisher));

        set.add(RequestId::new(5), vdrs.iter().copied().collect());
        set.vote(RequestId::new(5), &vdrs[0], x);

        match subscriber.try_recv() {
            Ok(Event::StartPoll(event)) => {
                assert_eq!(event.request_id, RequestId::new(5));
                assert_eq!(event.sample_size, 1);
            }
            _ => panic!("expected a StartPoll event"),
        }
        match subscriber.try_recv() {
            Ok(Event::FinishPoll(event)) => assert_eq!(event.votes.count(&x), 1),
            _ => panic!("expected a FinishPoll event"),
        }
    }
}
