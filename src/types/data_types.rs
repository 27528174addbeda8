/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Types that exist only to store bytes or numbers, and do not have any major "active" behavior.

use std::{
    fmt::{self, Debug, Display, Formatter},
    hash::Hash,
    ops::Add,
};

use borsh::{BorshDeserialize, BorshSerialize};

use super::crypto_primitives::{CryptoHasher, Digest};

/// Number that uniquely identifies an independent agreement domain, e.g., a chain.
///
/// Every consensus [instance](crate::instance::Instance) drives exactly one agreement domain. Instances
/// with different `ChainID`s share no state and no lock, and can therefore run fully in parallel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, BorshDeserialize, BorshSerialize)]
pub struct ChainID(u64);

impl ChainID {
    /// Create a new `ChainID` with an `int` value.
    pub const fn new(int: u64) -> Self {
        Self(int)
    }

    /// Get the `u64` value of this `ChainID`.
    pub const fn int(&self) -> u64 {
        self.0
    }
}

impl Display for ChainID {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

/// 32-byte identifier of a [`Candidate`](crate::candidate::Candidate).
///
/// Candidate IDs have value semantics: they are copied into edge sets, the resource index, and the
/// dependency index, never referenced. Providers are free to derive them however they like, but the
/// usual choice is [`CandidateId::digest`] over the candidate's bytes.
#[derive(
    Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, BorshDeserialize, BorshSerialize,
)]
pub struct CandidateId([u8; 32]);

impl CandidateId {
    /// Create a new `CandidateId` wrapping `bytes`.
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the inner `[u8; 32]` value of this `CandidateId`.
    pub const fn bytes(&self) -> [u8; 32] {
        self.0
    }

    /// Compute the SHA256 digest of `payload` and use it as a `CandidateId`.
    pub fn digest(payload: &[u8]) -> Self {
        let mut hasher = CryptoHasher::new();
        hasher.update(payload);
        Self(hasher.finalize().into())
    }
}

impl Display for CandidateId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl Debug for CandidateId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// 32-byte identifier of a shared resource that a candidate consumes, e.g., a UTXO.
///
/// Two candidates that claim the same `ResourceId` conflict: at most one of them may ever be accepted.
#[derive(
    Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, BorshDeserialize, BorshSerialize,
)]
pub struct ResourceId([u8; 32]);

impl ResourceId {
    /// Create a new `ResourceId` wrapping `bytes`.
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the inner `[u8; 32]` value of this `ResourceId`.
    pub const fn bytes(&self) -> [u8; 32] {
        self.0
    }
}

impl Debug for ResourceId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Identifier of an outstanding network query, chosen by the driver.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, BorshDeserialize, BorshSerialize,
)]
pub struct RequestId(u32);

impl RequestId {
    pub const fn new(int: u32) -> Self {
        Self(int)
    }

    pub const fn int(&self) -> u32 {
        self.0
    }
}

impl Display for RequestId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

/// Sequence number of a poll result applied to a [`ConflictGraph`](crate::snowstorm::ConflictGraph).
///
/// Every call to `record_poll` starts a new round. A confidence counter may only be advanced once per
/// round, and a counter that was not advanced in round `r` loses its consecutive-success streak in
/// round `r + 1`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct PollRound(u64);

impl PollRound {
    pub const fn new(int: u64) -> Self {
        Self(int)
    }

    /// The round before any poll has been recorded.
    pub const fn init() -> Self {
        Self(0)
    }

    pub const fn int(&self) -> u64 {
        self.0
    }
}

impl Add<u64> for PollRound {
    type Output = PollRound;

    fn add(self, rhs: u64) -> Self::Output {
        PollRound(self.0 + rhs)
    }
}

impl Display for PollRound {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}
