//! Validator keys and samples for poll tests.

use rand_core::OsRng;
use snowstorm_rs::types::{
    bag::Bag,
    crypto_primitives::{SigningKey, VerifyingKey},
};

/// Generate the verifying keys of `n` fresh validators.
pub(crate) fn generate_validators(n: usize) -> Vec<VerifyingKey> {
    let mut csprg = OsRng {};
    (0..n)
        .map(|_| SigningKey::generate(&mut csprg).verifying_key())
        .collect()
}

/// A sample in which every validator in `validators` appears exactly once.
pub(crate) fn sample_of(validators: &[VerifyingKey]) -> Bag<VerifyingKey> {
    validators.iter().copied().collect()
}
