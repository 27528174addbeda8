/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The Snowball confidence counter: the per-candidate state machine that turns repeated successful
//! polls into a finalization decision.
//!
//! ## Two counts
//!
//! A [`ConfidenceCounter`] tracks two numbers:
//! 1. `num_successful_polls`: how many polls have returned an alpha majority for the candidate since it
//!    last lost an edge. The [conflict graph](crate::snowstorm) compares these between conflicting
//!    candidates to decide which way the edge between them points.
//! 2. `confidence`: how many *consecutive* poll rounds returned an alpha majority for the candidate
//!    while it stayed preferred. This is what the finalization predicate checks against beta.
//!
//! `confidence` is reset when the candidate misses a poll round. Losing an edge to a competitor resets
//! both counts (see [`ConfidenceCounter::reset`]), so support gathered before the flip neither counts
//! towards finalization nor towards winning the edge back. Since `confidence` never exceeds
//! `num_successful_polls`, a candidate with fewer than beta successful polls can never finalize.
//!
//! ## Rounds
//!
//! Every physical poll round may advance a counter at most once. Recording a second success in the
//! same [`PollRound`] is a no-op.

use crate::types::data_types::PollRound;

/// Snowball counter of a single candidate.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConfidenceCounter {
    num_successful_polls: u32,
    confidence: u32,
    last_vote: Option<PollRound>,
}

impl ConfidenceCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that the candidate received an alpha majority in `round`.
    ///
    /// Returns whether the counter changed, i.e., `false` if a success was already recorded for `round`.
    pub fn record_successful_poll(&mut self, round: PollRound) -> bool {
        if let Some(last_vote) = self.last_vote {
            if round <= last_vote {
                return false;
            }
            if last_vote + 1 != round {
                // Missed at least one round, so the streak is broken.
                self.confidence = 0;
            }
        }

        self.last_vote = Some(round);
        self.num_successful_polls += 1;
        self.confidence += 1;
        true
    }

    /// Whether the candidate has gathered enough consecutive successes to be finalized.
    ///
    /// Virtuous candidates finalize at `beta_virtuous`; rogue candidates need `beta_rogue`.
    pub fn finalized(&self, beta_virtuous: u32, beta_rogue: u32, is_rogue: bool) -> bool {
        (!is_rogue && self.confidence >= beta_virtuous) || self.confidence >= beta_rogue
    }

    /// Start counting from zero. Called on the candidate that loses preference on an edge flip, since
    /// its support is only valid while it remains continuously preferred.
    ///
    /// The last recorded round is kept, so a success already recorded in the current round is not
    /// recorded again.
    pub fn reset(&mut self) {
        self.num_successful_polls = 0;
        self.confidence = 0;
    }

    pub fn num_successful_polls(&self) -> u32 {
        self.num_successful_polls
    }

    pub fn confidence(&self) -> u32 {
        self.confidence
    }

    pub fn last_vote(&self) -> Option<PollRound> {
        self.last_vote
    }
}
