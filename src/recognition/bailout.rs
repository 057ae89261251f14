use bio::stats::LogProb;
use itertools::Itertools;
use ordered_float::NotNan;

use crate::model::Observation;
use crate::recognition::{Engine, PlaceRecognizer};

/// Tuning of the bail-out pruning.
#[derive(Clone, Copy, Debug, CopyGetters, Builder)]
#[builder(build_fn(validate = "Self::validate"))]
pub struct BailoutParams {
    /// Likelihood ratio to the leader below which a trailing hypothesis is
    /// written off.
    #[builder(default = "1e-8")]
    #[getset(get_copy = "pub")]
    rejection_threshold: f64,
    /// Per-word budget for the probability that pruning discards the
    /// eventual winner.
    #[builder(default = "1e-8")]
    #[getset(get_copy = "pub")]
    ps_gd: f64,
    /// Upper bound of the bail-out margin search.
    #[builder(default = "512.0")]
    #[getset(get_copy = "pub")]
    bisection_start: f64,
    /// Number of bisection iterations.
    #[builder(default = "20")]
    #[getset(get_copy = "pub")]
    bisection_its: usize,
}

impl BailoutParamsBuilder {
    fn validate(&self) -> std::result::Result<(), String> {
        for &(name, value) in &[
            ("rejection_threshold", self.rejection_threshold),
            ("ps_gd", self.ps_gd),
        ] {
            if let Some(v) = value {
                if !(v > 0.0 && v < 1.0) {
                    return Err(format!("{} must lie strictly between 0 and 1", name));
                }
            }
        }
        if let Some(start) = self.bisection_start {
            if start <= 0.0 {
                return Err("bisection_start must be positive".to_owned());
            }
        }
        if let Some(its) = self.bisection_its {
            if its == 0 {
                return Err("bisection_its must be positive".to_owned());
            }
        }
        Ok(())
    }
}

impl Default for BailoutParams {
    fn default() -> Self {
        BailoutParamsBuilder::default().build().unwrap()
    }
}

/// Per-word sufficient statistics for one query, ordered by information
/// content. `variance` and `amplitude` describe the distribution of the
/// log-likelihood increments still ahead once this word is reached, treating
/// each place's word indicator as Bernoulli with the word's existence prior.
#[derive(Clone, Debug)]
struct WordStats {
    word: usize,
    info: NotNan<f64>,
    variance: f64,
    amplitude: f64,
}

/// Recognizer that processes words by ascending information content and
/// drops hypotheses that have fallen too far behind the current leader, as
/// bounded by the Bennett inequality.
pub struct BailoutRecognizer {
    engine: Engine,
    params: BailoutParams,
}

impl BailoutRecognizer {
    pub fn new(engine: Engine, params: BailoutParams) -> Self {
        BailoutRecognizer { engine, params }
    }

    pub fn params(&self) -> &BailoutParams {
        &self.params
    }

    /// Sort words by increasing information I_q = -ln P(z_q | z_parent), then
    /// accumulate, from the most informative word down, the variance sum and
    /// the maximum increment amplitude of the words still to come.
    fn word_statistics(&self, query: &Observation) -> Vec<WordStats> {
        let sensor = self.engine.sensor();
        let tree = sensor.tree();

        let mut stats = (0..tree.vocab_size())
            .map(|q| {
                let z = query.contains(q);
                let zp = query.contains(tree.parent(q));
                WordStats {
                    word: q,
                    info: NotNan::new(-tree.conditional(q, z, zp).ln()).unwrap(),
                    variance: 0.0,
                    amplitude: 0.0,
                }
            })
            .collect_vec();
        stats.sort_by_key(|stat| stat.info);

        let mut variance = 0.0;
        let mut amplitude: f64 = 0.0;
        for stat in stats.iter_mut().rev() {
            let z = query.contains(stat.word);
            let zp = query.contains(tree.parent(stat.word));
            let d = sensor.place_term(stat.word, z, zp, true).ln()
                - sensor.place_term(stat.word, z, zp, false).ln();
            let u = tree.marginal(stat.word, true);
            variance += d.powi(2) * 2.0 * (u - u.powi(2));
            amplitude = amplitude.max(d.abs());
            stat.variance = variance;
            stat.amplitude = amplitude;
        }

        stats
    }

    /// One-sided Bennett tail bound on the remaining partial sum exceeding
    /// `delta`, given its variance and maximum increment amplitude.
    fn bennett_bound(variance: f64, amplitude: f64, delta: f64) -> f64 {
        let ratio = delta * amplitude / variance;
        let f = (ratio + (ratio.powi(2) + 1.0).sqrt()).ln();
        ((variance / amplitude.powi(2)) * (f.cosh() - 1.0 - ratio * f)).exp()
    }

    /// Solve Bennett(variance, amplitude, delta) = ps_gd for delta by
    /// bisection on [0, bisection_start].
    fn bail_out_margin(&self, variance: f64, amplitude: f64) -> f64 {
        let mut left = 0.0;
        let mut right = self.params.bisection_start();
        let mut left_val = Self::bennett_bound(variance, amplitude, left) - self.params.ps_gd();

        for _ in 0..self.params.bisection_its() {
            let midpoint = 0.5 * (left + right);
            let mid_val =
                Self::bennett_bound(variance, amplitude, midpoint) - self.params.ps_gd();
            if left_val * mid_val > 0.0 {
                left = midpoint;
                left_val = mid_val;
            } else {
                right = midpoint;
            }
        }

        0.5 * (left + right)
    }
}

impl PlaceRecognizer for BailoutRecognizer {
    fn engine(&self) -> &Engine {
        &self.engine
    }

    fn engine_mut(&mut self) -> &mut Engine {
        &mut self.engine
    }

    fn likelihoods(&self, query: &Observation, places: &[Observation]) -> Vec<LogProb> {
        let sensor = self.engine.sensor();
        let tree = sensor.tree();
        let stats = self.word_statistics(query);

        let mut log_likelihoods = vec![0.0; places.len()];
        let mut bailed = vec![false; places.len()];
        let mut live = (0..places.len()).collect_vec();
        let mut curr_best = 0.0;

        for stat in &stats {
            let z = query.contains(stat.word);
            let zp = query.contains(tree.parent(stat.word));

            curr_best = -f64::MAX;
            for &i in &live {
                log_likelihoods[i] +=
                    sensor.place_term(stat.word, z, zp, places[i].contains(stat.word)).ln();
                curr_best = curr_best.max(log_likelihoods[i]);
            }

            if live.len() <= 1 {
                continue;
            }

            let margin = self
                .bail_out_margin(stat.variance, stat.amplitude)
                .max(-self.params.rejection_threshold().ln());
            live.retain(|&i| {
                if curr_best - log_likelihoods[i] > margin {
                    bailed[i] = true;
                    false
                } else {
                    true
                }
            });
            trace!("{} live hypotheses after word {}", live.len(), stat.word);
        }

        // written-off hypotheses are floored at the rejection ratio to the leader
        let floor = curr_best + self.params.rejection_threshold().ln();
        log_likelihoods
            .into_iter()
            .zip(bailed)
            .map(|(ll, out)| LogProb(if out { floor } else { ll }))
            .collect_vec()
    }
}
