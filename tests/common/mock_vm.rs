//! [`MockVM`], a simple, volatile, in-memory candidate provider used in all of the integration tests.

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex},
};

use borsh::{BorshDeserialize, BorshSerialize};
use snowstorm_rs::{
    candidate::{Candidate, Decision, DecisionError, Dependency, Status},
    types::data_types::{CandidateId, ResourceId},
};

/// Shared status table of every candidate produced by a `MockVM`.
///
/// Clones share the same table, so a candidate handed to a conflict graph and the copy kept by the test
/// always agree on the candidate's status, exactly like two views over the same database would.
#[derive(Clone, Default)]
pub(crate) struct MockVM(Arc<Mutex<MockVMState>>);

#[derive(Default)]
struct MockVMState {
    statuses: HashMap<CandidateId, Status>,

    // Every decision made, in order.
    decisions: Vec<(CandidateId, Decision)>,

    // Candidates whose decisions fail to persist.
    failing: HashSet<CandidateId>,
}

impl MockVM {
    /// Create a new VM with no candidates.
    pub(crate) fn new() -> MockVM {
        MockVM::default()
    }

    /// Create a candidate that claims a resource for each byte in `resources`, and depends on every
    /// candidate in `dependencies`. `nonce` distinguishes candidates with the same resources.
    pub(crate) fn candidate(
        &self,
        nonce: u64,
        resources: &[u8],
        dependencies: &[&MockCandidate],
    ) -> MockCandidate {
        let body = MockCandidateBody {
            nonce,
            resources: resources.iter().map(|seed| [*seed; 32]).collect(),
            dependencies: dependencies
                .iter()
                .map(|dependency| dependency.id().bytes())
                .collect(),
        };
        let id = CandidateId::digest(&body.try_to_vec().unwrap());
        MockCandidate {
            id,
            body,
            vm: self.clone(),
        }
    }

    /// Get the current status of the candidate with `id`. Candidates never decided are `Processing`.
    pub(crate) fn status(&self, id: &CandidateId) -> Status {
        self.0
            .lock()
            .unwrap()
            .statuses
            .get(id)
            .copied()
            .unwrap_or(Status::Processing)
    }

    /// Make every future decision on the candidate with `id` fail.
    pub(crate) fn fail_decisions_on(&self, id: CandidateId) {
        self.0.lock().unwrap().failing.insert(id);
    }

    /// Every decision made so far, in order.
    pub(crate) fn decisions(&self) -> Vec<(CandidateId, Decision)> {
        self.0.lock().unwrap().decisions.clone()
    }

    /// IDs of the candidates that have been accepted so far.
    pub(crate) fn accepted(&self) -> HashSet<CandidateId> {
        self.0
            .lock()
            .unwrap()
            .statuses
            .iter()
            .filter(|(_, status)| **status == Status::Accepted)
            .map(|(id, _)| *id)
            .collect()
    }

    fn decide(&self, id: CandidateId, decision: Decision) -> Result<(), DecisionError> {
        let mut state = self.0.lock().unwrap();
        state.decisions.push((id, decision));
        if state.failing.contains(&id) {
            return Err(DecisionError::PersistenceFailed {
                reason: String::from("disk full"),
            });
        }
        if let Some(status) = state.statuses.get(&id) {
            return Err(DecisionError::AlreadyDecided { status: *status });
        }
        let status = match decision {
            Decision::Accept => Status::Accepted,
            Decision::Reject => Status::Rejected,
        };
        state.statuses.insert(id, status);
        Ok(())
    }
}

#[derive(Clone, BorshSerialize, BorshDeserialize)]
struct MockCandidateBody {
    nonce: u64,
    resources: Vec<[u8; 32]>,
    dependencies: Vec<[u8; 32]>,
}

/// A candidate produced by a [`MockVM`]. Its ID is the SHA256 digest of its Borsh-encoded body.
#[derive(Clone)]
pub(crate) struct MockCandidate {
    id: CandidateId,
    body: MockCandidateBody,
    vm: MockVM,
}

impl Candidate for MockCandidate {
    fn id(&self) -> CandidateId {
        self.id
    }

    fn resources(&self) -> Vec<ResourceId> {
        self.body
            .resources
            .iter()
            .map(|bytes| ResourceId::new(*bytes))
            .collect()
    }

    fn dependencies(&self) -> Vec<Dependency> {
        self.body
            .dependencies
            .iter()
            .map(|bytes| {
                let id = CandidateId::new(*bytes);
                Dependency::new(id, self.vm.status(&id))
            })
            .collect()
    }

    fn status(&self) -> Status {
        self.vm.status(&self.id)
    }

    fn accept(&mut self) -> Result<(), DecisionError> {
        self.vm.decide(self.id, Decision::Accept)
    }

    fn reject(&mut self) -> Result<(), DecisionError> {
        self.vm.decide(self.id, Decision::Reject)
    }

    fn bytes(&self) -> Vec<u8> {
        self.body.try_to_vec().unwrap()
    }
}
