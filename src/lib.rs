/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! A Rust implementation of the Snowball/Snowstorm family of metastable consensus protocols.
//!
//! snowstorm-rs decides, through repeated random sampling of validators, which of a set of conflicting
//! [candidates](candidate::Candidate) becomes final. It is the decision core of a node: networking,
//! validator sampling, and candidate validity are left to the host.
//!
//! The crate is organized in layers:
//! 1. [`snowball`]: the per-candidate confidence counter.
//! 2. [`snowstorm`]: the conflict graph, which tracks conflicts, preferences, and decision cascades.
//! 3. [`poll`]: aggregation of the responses to outstanding queries.
//! 4. [`instance`]: a thread-safe bundle of the above, with [events](events) dispatched to
//!    user-registered handlers.

pub mod candidate;

pub(crate) mod event_bus;

pub mod events;

pub mod instance;

pub mod logging;

pub mod parameters;

pub mod poll;

pub mod snowball;

pub mod snowstorm;

pub mod types;
