//! Explicit, seeded sources of randomness.
//!
//! There is no ambient global seed. A `RandomSource` carries a base seed and hands out
//! independent generators keyed by an [`RngId`] type declared with [`define_rng!`]. Each
//! call to [`RandomSource::rng`] starts the stream over from the beginning, so two
//! simulations that ask for the same `RngId` from the same source see identical draws at
//! corresponding positions. The scenario comparator relies on this to pair baseline and
//! counterfactual replicates.
//!
//! [`define_rng!`]: crate::define_rng

use crate::hashing::hash_str;
use log::trace;
use rand::{RngCore, SeedableRng};
use std::any::Any;

pub trait RngId: Any {
    type RngType: SeedableRng + RngCore;
    fn get_name() -> &'static str;
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RandomSource {
    base_seed: u64,
}

impl RandomSource {
    #[must_use]
    pub fn new(base_seed: u64) -> Self {
        RandomSource { base_seed }
    }

    #[must_use]
    pub fn base_seed(&self) -> u64 {
        self.base_seed
    }

    /// Creates the generator for `R`, positioned at the start of its stream.
    #[must_use]
    pub fn rng<R: RngId>(&self, _rng_id: R) -> R::RngType {
        let seed_offset = hash_str(R::get_name());
        trace!(
            "creating rng {} (seed={}, offset={})",
            R::get_name(),
            self.base_seed,
            seed_offset
        );
        R::RngType::seed_from_u64(self.base_seed.wrapping_add(seed_offset))
    }
}
