use std::cmp;

use bio::stats::LogProb;
use itertools::Itertools;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::errors::{Error, Result};
use crate::model::sensor::SensorModel;
use crate::model::{Match, Observation};
use crate::utils;

pub mod bailout;
pub mod exhaustive;
pub mod inverted;
pub mod table;

/// How the likelihood of the new-place hypothesis is estimated.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NewPlaceModel {
    /// Closed-form mean-field estimate over the tree, with the new-place term
    /// taken as uniform.
    MeanField,
    /// Monte-Carlo average over descriptors drawn uniformly with replacement
    /// from the training gallery.
    Sampled { samples: usize },
}

/// Temporal smoothing of the posterior between consecutive queries.
///
/// The previous posterior is blurred with a 3-tap kernel over neighbouring
/// places before being multiplied into the current likelihoods; `bias`
/// controls how much mass drifts towards the successor place.
#[derive(Clone, Copy, Debug, CopyGetters, Builder)]
#[builder(build_fn(validate = "Self::validate"))]
pub struct MotionModel {
    /// Prior probability mass reserved for the new-place hypothesis.
    #[builder(default = "0.9")]
    #[getset(get_copy = "pub")]
    p_new: f64,
    /// Forward bias of the prior blur; 0.5 is symmetric.
    #[builder(default = "0.5")]
    #[getset(get_copy = "pub")]
    bias: f64,
}

impl MotionModelBuilder {
    fn validate(&self) -> std::result::Result<(), String> {
        for &(name, value) in &[("p_new", self.p_new), ("bias", self.bias)] {
            if let Some(v) = value {
                if !(0.0..=1.0).contains(&v) {
                    return Err(format!("{} must lie within [0, 1]", name));
                }
            }
        }
        Ok(())
    }
}

impl Default for MotionModel {
    fn default() -> Self {
        MotionModelBuilder::default().build().unwrap()
    }
}

/// State shared by every recognizer: the probability kernels, the training
/// and place galleries, the posterior of the previous query and the sampling
/// RNG.
#[derive(Getters, CopyGetters, Debug)]
pub struct Engine {
    /// Per-word probability kernels.
    #[getset(get = "pub")]
    sensor: SensorModel,
    /// New-place likelihood estimator.
    #[getset(get_copy = "pub")]
    new_place_model: NewPlaceModel,
    /// Optional temporal smoothing over the previous posterior.
    #[getset(get_copy = "pub")]
    motion_model: Option<MotionModel>,
    /// Posterior smoothing factor.
    #[getset(get_copy = "pub")]
    smoothing: f64,
    /// Descriptors sampled from when estimating the new-place likelihood.
    #[getset(get = "pub")]
    training: Vec<Observation>,
    /// The accumulated gallery of visited places.
    #[getset(get = "pub")]
    places: Vec<Observation>,
    /// Smoothed posterior of the previous query, new-place slot first.
    #[getset(get = "pub")]
    prior: Vec<f64>,
    rng: StdRng,
}

/// Builder for the shared engine state.
#[derive(Debug, Clone)]
pub struct EngineBuilder {
    sensor: SensorModel,
    new_place_model: NewPlaceModel,
    motion_model: Option<MotionModel>,
    smoothing: f64,
    seed: u64,
}

impl EngineBuilder {
    pub fn new(sensor: SensorModel, new_place_model: NewPlaceModel) -> Self {
        EngineBuilder {
            sensor,
            new_place_model,
            motion_model: None,
            smoothing: 0.99,
            seed: 0,
        }
    }

    pub fn motion_model(mut self, motion_model: MotionModel) -> Self {
        self.motion_model = Some(motion_model);

        self
    }

    pub fn smoothing(mut self, smoothing: f64) -> Self {
        self.smoothing = smoothing;

        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;

        self
    }

    pub fn build(self) -> Result<Engine> {
        if !(0.0..=1.0).contains(&self.smoothing) {
            return Err(Error::ParameterOutOfRange { name: "smoothing" });
        }
        if let NewPlaceModel::Sampled { samples } = self.new_place_model {
            if samples == 0 {
                return Err(Error::InvalidSampleCount);
            }
        }
        Ok(Engine {
            sensor: self.sensor,
            new_place_model: self.new_place_model,
            motion_model: self.motion_model,
            smoothing: self.smoothing,
            training: Vec::new(),
            places: Vec::new(),
            prior: Vec::new(),
            rng: StdRng::seed_from_u64(self.seed),
        })
    }
}

impl Engine {
    fn ensure_vocab(&self, observation: &Observation) -> Result<()> {
        let vocab = self.sensor.tree().vocab_size();
        if observation.len() != vocab {
            return Err(Error::WordCountMismatch {
                expected: vocab,
                got: observation.len(),
            });
        }
        Ok(())
    }

    /// Closed-form observation likelihood for a place never visited before.
    fn mean_field_likelihood(&self, query: &Observation) -> LogProb {
        let tree = self.sensor.tree();
        let mut log_p = 0.0;
        for q in 0..tree.vocab_size() {
            let z = query.contains(q);
            let zp = query.contains(tree.parent(q));
            log_p += self.sensor.marginal_term(q, z, zp).ln();
        }
        LogProb(log_p)
    }

    /// Draw descriptors uniformly with replacement from the training gallery.
    fn sample_training(&mut self, samples: usize) -> Result<Vec<Observation>> {
        if self.training.is_empty() {
            return Err(Error::EmptyTrainingGallery);
        }
        let training = &self.training;
        let rng = &mut self.rng;
        let n = training.len();
        Ok((0..samples)
            .map(|_| training[rng.gen_range(0, n)].clone())
            .collect_vec())
    }

    /// Turn per-hypothesis log-likelihoods into a smoothed posterior.
    /// `matches[0]` must be the new-place hypothesis.
    fn normalise(&mut self, matches: &mut [Match]) {
        debug_assert!(!matches.is_empty());

        let scores = match self.motion_model {
            Some(motion) => self.motion_scores(matches, motion),
            None => matches.iter().map(|m| m.likelihood).collect_vec(),
        };

        let z = utils::ln_sum_exp(&scores);
        let n = matches.len() as f64;
        for (m, score) in matches.iter_mut().zip(scores) {
            let p = (score - z).exp();
            m.probability = self.smoothing * p + (1.0 - self.smoothing) / n;
        }

        if self.motion_model.is_some() {
            self.prior = matches.iter().map(|m| m.probability).collect_vec();
        }
    }

    /// Blend each score with a 3-tap blur of the previous posterior. Places
    /// collected after the prior was captured receive no adjustment; the
    /// blur only engages once the prior covers at least two places.
    fn motion_scores(&self, matches: &[Match], motion: MotionModel) -> Vec<LogProb> {
        let mut scores = matches.iter().map(|m| m.likelihood).collect_vec();
        scores[0] = scores[0] + LogProb(motion.p_new().ln());
        if self.prior.len() > 2 {
            let last = self.prior.len() - 1;
            for i in 1..self.prior.len() {
                let left = self.prior[cmp::max(i - 1, 1)];
                let centre = self.prior[i];
                let right = self.prior[cmp::min(i + 1, last)];
                let blurred = (2.0 * (1.0 - motion.bias()) * left
                    + centre
                    + 2.0 * motion.bias() * right)
                    / 3.0;
                scores[i] = scores[i] + LogProb(blurred.ln());
            }
        }
        scores
    }
}

/// Appearance-based place recognition over a gallery of previously collected
/// descriptors.
///
/// Implementors supply the per-place likelihood computation; the provided
/// methods drive the shared pipeline: new-place estimation, normalization,
/// the motion prior and gallery bookkeeping.
pub trait PlaceRecognizer {
    fn engine(&self) -> &Engine;

    fn engine_mut(&mut self) -> &mut Engine;

    /// Log-likelihood of `query` for every descriptor in `places`.
    fn likelihoods(&self, query: &Observation, places: &[Observation]) -> Vec<LogProb>;

    /// Log-likelihood of `query` for every place in the engine's own gallery.
    fn gallery_likelihoods(&self, query: &Observation) -> Vec<LogProb> {
        self.likelihoods(query, self.engine().places())
    }

    /// Maintenance hook invoked before a descriptor enters the training gallery.
    fn index_training(&mut self, _observation: &Observation) {}

    /// Maintenance hook invoked before a descriptor enters the place gallery.
    fn index_place(&mut self, _observation: &Observation) {}

    /// Append a descriptor to the training gallery.
    fn add_training(&mut self, observation: Observation) -> Result<()> {
        self.engine().ensure_vocab(&observation)?;
        self.index_training(&observation);
        self.engine_mut().training.push(observation);
        Ok(())
    }

    fn add_training_batch<I>(&mut self, batch: I) -> Result<()>
    where
        I: IntoIterator<Item = Observation>,
        Self: Sized,
    {
        for observation in batch {
            self.add_training(observation)?;
        }
        Ok(())
    }

    /// Append a descriptor to the place gallery.
    fn add_place(&mut self, observation: Observation) -> Result<()> {
        self.engine().ensure_vocab(&observation)?;
        self.index_place(&observation);
        self.engine_mut().places.push(observation);
        Ok(())
    }

    fn add_place_batch<I>(&mut self, batch: I) -> Result<()>
    where
        I: IntoIterator<Item = Observation>,
        Self: Sized,
    {
        for observation in batch {
            self.add_place(observation)?;
        }
        Ok(())
    }

    /// Estimate the likelihood that `query` stems from a place outside the
    /// gallery.
    fn new_place_likelihood(&mut self, query: &Observation) -> Result<LogProb> {
        match self.engine().new_place_model() {
            NewPlaceModel::MeanField => Ok(self.engine().mean_field_likelihood(query)),
            NewPlaceModel::Sampled { samples } => {
                let sampled = self.engine_mut().sample_training(samples)?;
                let likelihoods = self.likelihoods(query, &sampled);
                let average = LogProb(*utils::ln_sum_exp(&likelihoods) - (samples as f64).ln());
                debug!("sampled new-place log-likelihood: {:?}", average);
                Ok(average)
            }
        }
    }

    /// Compare queries against the engine's own gallery. With `add_queries`,
    /// each query is appended to the gallery once its own comparison has
    /// finished.
    fn compare(&mut self, queries: &[Observation], add_queries: bool) -> Result<Vec<Match>> {
        let mut matches = Vec::with_capacity(queries.len() * (self.engine().places().len() + 1));
        for (k, query) in queries.iter().enumerate() {
            self.engine().ensure_vocab(query)?;
            matches.extend(self.compare_query(k, query, None)?);
            if add_queries {
                self.add_place(query.clone())?;
            }
        }
        Ok(matches)
    }

    /// Compare queries against a caller-provided gallery. The prior buffer is
    /// meaningless for foreign galleries, so the motion model is rejected.
    fn compare_against(
        &mut self,
        queries: &[Observation],
        gallery: &[Observation],
    ) -> Result<Vec<Match>> {
        if self.engine().motion_model().is_some() {
            return Err(Error::MotionModelExternalGallery);
        }
        for place in gallery {
            self.engine().ensure_vocab(place)?;
        }
        let mut matches = Vec::with_capacity(queries.len() * (gallery.len() + 1));
        for (k, query) in queries.iter().enumerate() {
            self.engine().ensure_vocab(query)?;
            matches.extend(self.compare_query(k, query, Some(gallery))?);
        }
        Ok(matches)
    }

    /// Run the full inference for a single query: new-place record first,
    /// then one record per place, normalized into a posterior.
    fn compare_query(
        &mut self,
        index: usize,
        query: &Observation,
        gallery: Option<&[Observation]>,
    ) -> Result<Vec<Match>> {
        let new_place = self.new_place_likelihood(query)?;
        let mut block = vec![Match::new(index, None, new_place)];
        let likelihoods = match gallery {
            Some(places) => self.likelihoods(query, places),
            None => self.gallery_likelihoods(query),
        };
        block.extend(
            likelihoods
                .into_iter()
                .enumerate()
                .map(|(i, ll)| Match::new(index, Some(i), ll)),
        );
        self.engine_mut().normalise(&mut block);
        Ok(block)
    }
}
