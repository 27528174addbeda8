//! Tests that drive an instance through its handle, including from several threads at once.

mod common;

use std::{
    collections::HashSet,
    sync::{Arc, Mutex},
    thread,
};

use log::LevelFilter;
use snowstorm_rs::{
    candidate::{Candidate, Status},
    instance::{Configuration, InstanceError, InstanceSpec, PollOutcome},
    parameters::{Parameters, ParametersError},
    snowstorm::ConflictGraphError,
    types::data_types::{ChainID, RequestId},
};

use crate::common::{
    logging::setup_logger,
    mock_vm::{MockCandidate, MockVM},
    validators::{generate_validators, sample_of},
};

fn configuration(early_termination: bool, log_events: bool) -> Configuration {
    Configuration::builder()
        .chain_id(ChainID::new(0))
        .parameters(
            Parameters::builder()
                .k(3)
                .alpha(2)
                .beta_virtuous(3)
                .beta_rogue(4)
                .concurrent_repolls(2)
                .build(),
        )
        .early_termination(early_termination)
        .log_events(log_events)
        .build()
}

#[test]
fn invalid_parameters_prevent_start() {
    let configuration = Configuration::builder()
        .chain_id(ChainID::new(0))
        .parameters(
            Parameters::builder()
                .k(3)
                .alpha(2)
                .beta_virtuous(3)
                .beta_rogue(2)
                .build(),
        )
        .early_termination(true)
        .log_events(false)
        .build();
    let result = InstanceSpec::<MockCandidate>::builder()
        .configuration(configuration)
        .build()
        .start();
    assert!(matches!(
        result,
        Err(InstanceError::Parameters(
            ParametersError::BetaRogueBelowBetaVirtuous { .. }
        ))
    ));
}

#[test]
fn instance_accepts_a_virtuous_candidate_and_fires_handlers() {
    setup_logger(LevelFilter::Info);
    let vm = MockVM::new();
    let validators = generate_validators(3);
    let accepted = Arc::new(Mutex::new(Vec::new()));
    let accepted_clone = accepted.clone();
    let finished_polls = Arc::new(Mutex::new(0));
    let finished_polls_clone = finished_polls.clone();

    let instance = InstanceSpec::builder()
        .configuration(configuration(true, true))
        .on_accept_candidate(move |event| accepted_clone.lock().unwrap().push(event.candidate))
        .on_finish_poll(move |_| *finished_polls_clone.lock().unwrap() += 1)
        .build()
        .start()
        .unwrap();
    let handle = instance.handle();

    let a = vm.candidate(0, &[1], &[]);
    handle.issue(a.clone()).unwrap();
    assert!(handle.is_processing(&a.id()));
    assert!(handle.is_virtuous(&a));
    assert_eq!(handle.preferences(), HashSet::from([a.id()]));
    assert_eq!(handle.virtuous(), HashSet::from([a.id()]));
    assert!(handle.conflicts(&a).is_empty());
    assert!(!handle.quiesce());
    assert_eq!(handle.polls_needed(), 2);

    for round in 0..3 {
        let request_id = RequestId::new(round);
        assert!(handle.start_poll(request_id, sample_of(&validators)).unwrap());
        assert!(!handle.start_poll(request_id, sample_of(&validators)).unwrap());
        assert_eq!(handle.outstanding_polls(), 1);
        assert_eq!(handle.polls_needed(), 1);

        assert_eq!(
            handle.vote(request_id, &validators[0], a.id()).unwrap(),
            PollOutcome::Pending
        );
        let outcome = handle.vote(request_id, &validators[1], a.id()).unwrap();
        assert_eq!(outcome, PollOutcome::Finished { changed: round == 2 });
        assert_eq!(
            handle.vote(request_id, &validators[2], a.id()).unwrap(),
            PollOutcome::Pending
        );
    }

    assert_eq!(vm.status(&a.id()), Status::Accepted);
    assert!(handle.finalized());
    assert!(handle.quiesce());
    assert_eq!(handle.polls_needed(), 0);
    assert_eq!(handle.num_processing(), 0);

    // Dropping the instance drains the event bus.
    drop(instance);
    assert_eq!(*accepted.lock().unwrap(), vec![a.id()]);
    assert_eq!(*finished_polls.lock().unwrap(), 3);
}

#[test]
fn dropped_votes_finish_polls_without_early_termination() {
    let vm = MockVM::new();
    let validators = generate_validators(3);
    let instance = InstanceSpec::builder()
        .configuration(configuration(false, false))
        .build()
        .start()
        .unwrap();
    let handle = instance.handle();

    let a = vm.candidate(0, &[1], &[]);
    handle.issue(a.clone()).unwrap();

    let request_id = RequestId::new(9);
    handle.start_poll(request_id, sample_of(&validators)).unwrap();
    assert_eq!(
        handle.vote(request_id, &validators[0], a.id()).unwrap(),
        PollOutcome::Pending
    );
    assert_eq!(
        handle.vote(request_id, &validators[1], a.id()).unwrap(),
        PollOutcome::Pending
    );
    assert_eq!(
        handle.drop_vote(request_id, &validators[2]).unwrap(),
        PollOutcome::Finished { changed: false }
    );
    assert_eq!(
        handle.drop_vote(RequestId::new(10), &validators[2]).unwrap(),
        PollOutcome::Pending
    );
}

#[test]
fn decision_failure_halts_the_instance() {
    setup_logger(LevelFilter::Info);
    let vm = MockVM::new();
    let validators = generate_validators(3);
    let halted = Arc::new(Mutex::new(false));
    let halted_clone = halted.clone();

    let instance = InstanceSpec::builder()
        .configuration(configuration(true, true))
        .on_halt(move |event| *halted_clone.lock().unwrap() = !event.failures.is_empty())
        .build()
        .start()
        .unwrap();
    let handle = instance.handle();

    let a = vm.candidate(0, &[1], &[]);
    vm.fail_decisions_on(a.id());
    handle.issue(a.clone()).unwrap();

    let mut failure = None;
    for round in 0..3 {
        let request_id = RequestId::new(round);
        handle.start_poll(request_id, sample_of(&validators)).unwrap();
        handle.vote(request_id, &validators[0], a.id()).unwrap();
        if let Err(error) = handle.vote(request_id, &validators[1], a.id()) {
            failure = Some(error);
        }
    }
    assert!(matches!(
        failure,
        Some(InstanceError::ConflictGraph(
            ConflictGraphError::DecisionFailures(_)
        ))
    ));
    assert!(handle.is_halted());

    // Every update is refused from now on, but queries still work.
    let b = vm.candidate(1, &[2], &[]);
    assert!(matches!(
        handle.issue(b.clone()),
        Err(InstanceError::ConflictGraph(ConflictGraphError::Halted))
    ));
    assert!(matches!(
        handle.start_poll(RequestId::new(3), sample_of(&validators)),
        Err(InstanceError::ConflictGraph(ConflictGraphError::Halted))
    ));
    assert!(!handle.is_processing(&b.id()));

    drop(instance);
    assert!(*halted.lock().unwrap());
}

#[test]
fn concurrent_drivers_decide_conflicts_safely() {
    setup_logger(LevelFilter::Info);
    let vm = MockVM::new();
    let validators = Arc::new(generate_validators(3));
    let instance = InstanceSpec::builder()
        .configuration(configuration(true, false))
        .build()
        .start()
        .unwrap();
    let handle = instance.handle();

    let candidates: Vec<MockCandidate> = (0..8)
        .map(|nonce| vm.candidate(nonce, &[(nonce % 4) as u8], &[]))
        .collect();
    for candidate in &candidates {
        handle.issue(candidate.clone()).unwrap();
    }

    // Each thread repeatedly polls for the current preferences, with its own range of request IDs.
    let threads: Vec<_> = (0..4u32)
        .map(|thread_index| {
            let handle = handle.clone();
            let validators = validators.clone();
            thread::spawn(move || {
                let mut finished = 0u32;
                for round in 0..50u32 {
                    let request_id = RequestId::new(thread_index * 1000 + round);
                    let preferences: Vec<_> = handle.preferences().into_iter().collect();
                    let Some(choice) = preferences.first().copied() else {
                        break;
                    };
                    handle
                        .start_poll(request_id, sample_of(&validators))
                        .unwrap();
                    for validator in validators.iter() {
                        if let PollOutcome::Finished { .. } =
                            handle.vote(request_id, validator, choice).unwrap()
                        {
                            finished += 1;
                        }
                    }
                }
                finished
            })
        })
        .collect();

    let finished: u32 = threads.into_iter().map(|thread| thread.join().unwrap()).sum();
    assert!(finished > 0);

    let accepted = vm.accepted();
    for resource in 0..4u8 {
        let claimants = candidates
            .iter()
            .filter(|candidate| candidate.resources()[0].bytes()[0] == resource)
            .filter(|candidate| accepted.contains(&candidate.id()))
            .count();
        assert!(claimants <= 1);
    }
    assert_eq!(handle.outstanding_polls(), 0);
}
