use bio::stats::LogProb;

/// Log-space sum of a sequence of log-likelihoods.
///
/// The fold is seeded with `-f64::MAX + first + 1`: numerically equivalent to
/// log(0) under `ln_add_exp`, while the offset by the first term keeps the
/// seed finite so no NaN can be produced when the first real term is added.
pub(crate) fn ln_sum_exp(terms: &[LogProb]) -> LogProb {
    debug_assert!(!terms.is_empty());
    let seed = LogProb(-f64::MAX + *terms[0] + 1.0);
    terms.iter().fold(seed, |sum, ll| sum.ln_add_exp(*ll))
}
