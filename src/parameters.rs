/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Snowball parameters, and the rules they must satisfy.
//!
//! The parameters can be defined using the builder pattern, for example:
//!
//! ```
//! use snowstorm_rs::parameters::Parameters;
//!
//! let parameters =
//!     Parameters::builder()
//!     .k(20)
//!     .alpha(15)
//!     .beta_virtuous(20)
//!     .beta_rogue(30)
//!     .concurrent_repolls(4)
//!     .build();
//!
//! assert!(parameters.verify().is_ok());
//! ```
//!
//! Every component that consumes `Parameters` calls [`verify`](Parameters::verify) when it is
//! constructed, and refuses to be constructed if the parameters are invalid.

use typed_builder::TypedBuilder;

/// Stores the protocol constants of a consensus instance:
/// 1. `k`: the number of validators sampled in every poll.
/// 2. `alpha`: the vote weight a candidate must receive in a single poll for that poll to count as a
///    successful poll for the candidate. Must be a strict majority of `k`.
/// 3. `beta_virtuous`: the number of consecutive successful polls a candidate that was never in conflict
///    needs to be finalized.
/// 4. `beta_rogue`: the same as `beta_virtuous`, but for candidates that have been in conflict.
///    Resolving contested resources needs stronger evidence, so this must be at least `beta_virtuous`.
/// 5. `concurrent_repolls`: the number of polls the driver should keep outstanding while there are
///    still undecided candidates. Cannot exceed `beta_rogue`, since polls beyond that are wasted.
#[derive(TypedBuilder, Clone, Copy, Debug, PartialEq, Eq)]
#[builder(builder_method(doc = "
    Create a builder for building [Parameters]. On the builder call the following methods to construct [Parameters].

    Required:
    - `.k(...)`
    - `.alpha(...)`
    - `.beta_virtuous(...)`
    - `.beta_rogue(...)`

    Optional:
    - `.concurrent_repolls(...)` (default: 1)
"))]
pub struct Parameters {
    #[builder(setter(doc = "Set the sample size. Required."))]
    pub k: u32,
    #[builder(setter(doc = "Set the quorum threshold. Required."))]
    pub alpha: u32,
    #[builder(setter(doc = "Set the finalization threshold for virtuous candidates. Required."))]
    pub beta_virtuous: u32,
    #[builder(setter(doc = "Set the finalization threshold for rogue candidates. Required."))]
    pub beta_rogue: u32,
    #[builder(
        default = 1,
        setter(doc = "Set the number of polls to keep outstanding. Optional.")
    )]
    pub concurrent_repolls: u32,
}

impl Parameters {
    /// Check the parameters against every rule, returning the first rule that they break.
    pub fn verify(&self) -> Result<(), ParametersError> {
        if self.alpha <= self.k / 2 {
            Err(ParametersError::AlphaNotMajority {
                k: self.k,
                alpha: self.alpha,
            })
        } else if self.k < self.alpha {
            Err(ParametersError::AlphaExceedsK {
                k: self.k,
                alpha: self.alpha,
            })
        } else if self.beta_virtuous == 0 {
            Err(ParametersError::NonPositiveBetaVirtuous)
        } else if self.beta_rogue < self.beta_virtuous {
            Err(ParametersError::BetaRogueBelowBetaVirtuous {
                beta_virtuous: self.beta_virtuous,
                beta_rogue: self.beta_rogue,
            })
        } else if self.concurrent_repolls == 0 {
            Err(ParametersError::NonPositiveConcurrentRepolls)
        } else if self.concurrent_repolls > self.beta_rogue {
            Err(ParametersError::ConcurrentRepollsExceedsBetaRogue {
                concurrent_repolls: self.concurrent_repolls,
                beta_rogue: self.beta_rogue,
            })
        } else {
            Ok(())
        }
    }
}

/// Enumerates the rules that [`Parameters`] can break.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParametersError {
    /// `alpha` must be greater than `k / 2`.
    AlphaNotMajority { k: u32, alpha: u32 },

    /// `alpha` must be at most `k`.
    AlphaExceedsK { k: u32, alpha: u32 },

    /// `beta_virtuous` must be positive.
    NonPositiveBetaVirtuous,

    /// `beta_rogue` must be at least `beta_virtuous`.
    BetaRogueBelowBetaVirtuous { beta_virtuous: u32, beta_rogue: u32 },

    /// `concurrent_repolls` must be positive.
    NonPositiveConcurrentRepolls,

    /// `concurrent_repolls` must be at most `beta_rogue`.
    ConcurrentRepollsExceedsBetaRogue {
        concurrent_repolls: u32,
        beta_rogue: u32,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parameters(k: u32, alpha: u32, beta_virtuous: u32, beta_rogue: u32) -> Parameters {
        Parameters::builder()
            .k(k)
            .alpha(alpha)
            .beta_virtuous(beta_virtuous)
            .beta_rogue(beta_rogue)
            .build()
    }

    #[test]
    fn accepts_valid_parameters() {
        assert_eq!(parameters(20, 15, 20, 30).verify(), Ok(()));
        assert_eq!(parameters(1, 1, 1, 1).verify(), Ok(()));
        assert_eq!(parameters(3, 2, 1, 1).concurrent_repolls, 1);
    }

    #[test]
    fn rejects_minority_alpha() {
        assert_eq!(
            parameters(20, 10, 20, 30).verify(),
            Err(ParametersError::AlphaNotMajority { k: 20, alpha: 10 })
        );
    }

    #[test]
    fn rejects_alpha_above_k() {
        assert_eq!(
            parameters(20, 21, 20, 30).verify(),
            Err(ParametersError::AlphaExceedsK { k: 20, alpha: 21 })
        );
    }

    #[test]
    fn rejects_bad_betas() {
        assert_eq!(
            parameters(20, 15, 0, 30).verify(),
            Err(ParametersError::NonPositiveBetaVirtuous)
        );
        assert_eq!(
            parameters(20, 15, 20, 19).verify(),
            Err(ParametersError::BetaRogueBelowBetaVirtuous {
                beta_virtuous: 20,
                beta_rogue: 19
            })
        );
    }

    #[test]
    fn rejects_bad_concurrent_repolls() {
        let mut params = parameters(20, 15, 20, 30);
        params.concurrent_repolls = 0;
        assert_eq!(
            params.verify(),
            Err(ParametersError::NonPositiveConcurrentRepolls)
        );
        params.concurrent_repolls = 31;
        assert_eq!(
            params.verify(),
            Err(ParametersError::ConcurrentRepollsExceedsBetaRogue {
                concurrent_repolls: 31,
                beta_rogue: 30
            })
        );
    }
}
