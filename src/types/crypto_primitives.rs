/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Cryptographic primitives.
//!
//! The re-exports in this module provide two categories of cryptographic primitives:
//! 1. **Cryptographic Hashes**: provided by the [`sha2`] crate, used to derive
//!    [`CandidateId`](super::data_types::CandidateId)s from candidate bytes.
//! 2. **Validator Identities**: provided by the [`ed25519_dalek`] crate. Every sampled participant of a
//!    [poll](crate::poll) is identified by its Ed25519 [`VerifyingKey`].

// re-exports below.
pub use sha2::Digest;
pub use sha2::Sha256 as CryptoHasher;

pub use ed25519_dalek::{SigningKey, VerifyingKey};
