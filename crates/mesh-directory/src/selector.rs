//! Mistrust-weighted random selection.
//!
//! Breaks ties among equally well-matching primary receivers. Each tied
//! candidate carries a mistrust factor `f_i >= 1`; with `P = prod(f_i)`,
//! the candidate's selection weight is `w_i = P / f_i` — inversely
//! proportional to its own mistrust, so a factor of 1 yields full weight
//! and a factor of 3 one third of it. The weights partition a contiguous
//! integer range and one uniform draw picks the winner.
//!
//! Factors are small per-unit trust weights; their product stays far from
//! the `u64` range in any realistic tie group.

use rand::Rng;

use crate::error::SelectorError;

/// Select an index among candidates weighted by their mistrust factors.
///
/// A single candidate is returned directly without drawing randomness.
pub fn select_index(factors: &[u32]) -> Result<usize, SelectorError> {
    select_index_with(factors, &mut rand::thread_rng())
}

/// [`select_index`] with a caller-supplied random source.
pub fn select_index_with<R: Rng + ?Sized>(
    factors: &[u32],
    rng: &mut R,
) -> Result<usize, SelectorError> {
    if factors.is_empty() {
        return Err(SelectorError::NoCandidates);
    }
    if let Some(index) = factors.iter().position(|&f| f == 0) {
        return Err(SelectorError::ZeroFactor { index });
    }
    if factors.len() == 1 {
        return Ok(0);
    }

    let product: u64 = factors.iter().map(|&f| u64::from(f)).product();
    let weights: Vec<u64> = factors.iter().map(|&f| product / u64::from(f)).collect();
    let total: u64 = weights.iter().sum();

    let draw = rng.gen_range(0..total);
    let mut upper = 0u64;
    for (index, weight) in weights.iter().enumerate() {
        upper += weight;
        if draw < upper {
            return Ok(index);
        }
    }
    // draw is uniform in [0, total); the ranges cover exactly that span.
    unreachable!("draw {draw} outside weight ranges totalling {total}")
}
