/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Functions that log out events.
//!
//! The logs defined in this module are printed if the user enabled them via the instance's
//! [configuration](crate::instance::Configuration).
//!
//! snowstorm-rs logs using the [log](https://docs.rs/log/latest/log/) crate. To get these messages
//! printed onto a terminal or to a file, set up a
//! [logging implementation](https://docs.rs/log/latest/log/#available-logging-implementations).
//!
//! ## Log message format
//!
//! Log messages are CSVs (Comma Separated Values) with at least two values. The first two values are
//! always:
//! 1. The name of the [event](crate::events) in PascalCase (defined in this module as constants).
//! 2. The time the event was emitted (as number of seconds since the Unix Epoch).
//!
//! The rest of the values differ depending on the kind of event. For example, the following snippet
//! is how a [FinishPoll](crate::events::FinishPollEvent) is printed:
//!
//! ```text
//! FinishPoll, 1701329264, 17, 12, 15, fNGCJyk
//! ```
//!
//! In the snippet:
//! - The third value is the request ID of the poll.
//! - The fourth value is how long the poll was outstanding, in milliseconds.
//! - The fifth value is the vote weight received by the most voted-for candidate.
//! - The sixth value is the first seven characters of the Base64 encoding of the ID of that candidate
//!   (empty if nobody voted).

use crate::events::*;
use base64::{engine::general_purpose::STANDARD_NO_PAD, Engine as _};
use log;
use std::time::SystemTime;

// Names of each event in PascalCase for printing:
pub const ADD_CANDIDATE: &str = "AddCandidate";
pub const ACCEPT_CANDIDATE: &str = "AcceptCandidate";
pub const REJECT_CANDIDATE: &str = "RejectCandidate";
pub const RECORD_POLL: &str = "RecordPoll";

pub const START_POLL: &str = "StartPoll";
pub const FINISH_POLL: &str = "FinishPoll";

pub const HALT: &str = "Halt";

/// Implemented by event types. Used to get a closure that logs the event.
pub(crate) trait Logger {
    /// Returns a pointer to the default logging handler for a given event type.
    fn get_logger() -> Box<dyn Fn(&Self) + Send>;
}

impl Logger for AddCandidateEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |add_candidate_event: &AddCandidateEvent| {
            log::info!(
                "{}, {}, {}, {}, {}",
                ADD_CANDIDATE,
                secs_since_unix_epoch(add_candidate_event.timestamp),
                first_seven_base64_chars(&add_candidate_event.candidate.bytes()),
                add_candidate_event.size,
                add_candidate_event.virtuous
            )
        };
        Box::new(logger)
    }
}

impl Logger for AcceptCandidateEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |accept_candidate_event: &AcceptCandidateEvent| {
            log::info!(
                "{}, {}, {}",
                ACCEPT_CANDIDATE,
                secs_since_unix_epoch(accept_candidate_event.timestamp),
                first_seven_base64_chars(&accept_candidate_event.candidate.bytes())
            )
        };
        Box::new(logger)
    }
}

impl Logger for RejectCandidateEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |reject_candidate_event: &RejectCandidateEvent| {
            log::info!(
                "{}, {}, {}",
                REJECT_CANDIDATE,
                secs_since_unix_epoch(reject_candidate_event.timestamp),
                first_seven_base64_chars(&reject_candidate_event.candidate.bytes())
            )
        };
        Box::new(logger)
    }
}

impl Logger for RecordPollEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |record_poll_event: &RecordPollEvent| {
            log::info!(
                "{}, {}, {}, {}, {}",
                RECORD_POLL,
                secs_since_unix_epoch(record_poll_event.timestamp),
                record_poll_event.round,
                record_poll_event.successful.len(),
                record_poll_event.changed
            )
        };
        Box::new(logger)
    }
}

impl Logger for StartPollEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |start_poll_event: &StartPollEvent| {
            log::info!(
                "{}, {}, {}, {}",
                START_POLL,
                secs_since_unix_epoch(start_poll_event.timestamp),
                start_poll_event.request_id,
                start_poll_event.sample_size
            )
        };
        Box::new(logger)
    }
}

impl Logger for FinishPollEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |finish_poll_event: &FinishPollEvent| {
            let (leader, weight) = match finish_poll_event.votes.mode() {
                Some((candidate, weight)) => (first_seven_base64_chars(&candidate.bytes()), weight),
                None => (String::new(), 0),
            };
            log::info!(
                "{}, {}, {}, {}, {}, {}",
                FINISH_POLL,
                secs_since_unix_epoch(finish_poll_event.timestamp),
                finish_poll_event.request_id,
                finish_poll_event.duration.as_millis(),
                weight,
                leader
            )
        };
        Box::new(logger)
    }
}

impl Logger for HaltEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |halt_event: &HaltEvent| {
            let failed: Vec<String> = halt_event
                .failures
                .iter()
                .map(|failure| first_seven_base64_chars(&failure.candidate.bytes()))
                .collect();
            log::info!(
                "{}, {}, {}, {}",
                HALT,
                secs_since_unix_epoch(halt_event.timestamp),
                halt_event.failures.len(),
                failed.join(" ")
            )
        };
        Box::new(logger)
    }
}

// Get a more readable representation of a bytesequence by base64-encoding it and taking the first 7 characters.
pub(crate) fn first_seven_base64_chars(bytes: &[u8]) -> String {
    let encoded = STANDARD_NO_PAD.encode(bytes);
    if encoded.len() > 7 {
        encoded[0..7].to_string()
    } else {
        encoded
    }
}

// Events are timestamped with the system clock, which may have been set to before the epoch.
fn secs_since_unix_epoch(timestamp: SystemTime) -> u64 {
    timestamp
        .duration_since(SystemTime::UNIX_EPOCH)
        .map_or(0, |duration| duration.as_secs())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_seven_base64_chars_truncates() {
        assert_eq!(first_seven_base64_chars(&[0u8; 32]), "AAAAAAA");
        assert_eq!(first_seven_base64_chars(&[255u8]), "/w");
        assert_eq!(first_seven_base64_chars(&[]), "");
    }

    #[test]
    fn timestamps_before_the_epoch_log_as_zero() {
        let before = SystemTime::UNIX_EPOCH - std::time::Duration::from_secs(10);
        assert_eq!(secs_since_unix_epoch(before), 0);
        let after = SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(10);
        assert_eq!(secs_since_unix_epoch(after), 10);
    }
}
