use std::collections::HashMap;

use bio::stats::LogProb;
use itertools::Itertools;

use crate::errors::{Error, Result};
use crate::model::Observation;
use crate::recognition::{Engine, NewPlaceModel, PlaceRecognizer};
use crate::utils;

/// Posting lists and per-place default log-likelihoods for one gallery.
#[derive(Clone, Debug, Default)]
struct InvertedIndex {
    defaults: Vec<f64>,
    postings: HashMap<usize, Vec<usize>>,
}

impl InvertedIndex {
    fn insert(&mut self, observation: &Observation, baseline: &[f64]) {
        let place = self.defaults.len();
        let mut default = 0.0;
        for q in 0..observation.len() {
            if observation.contains(q) {
                default += baseline[q];
                self.postings.entry(q).or_insert_with(Vec::new).push(place);
            }
        }
        self.defaults.push(default);
    }

    fn len(&self) -> usize {
        self.defaults.len()
    }

    fn postings(&self, q: usize) -> &[usize] {
        self.postings.get(&q).map(|p| p.as_slice()).unwrap_or(&[])
    }
}

/// Recognizer backed by an inverted index from words to the places that
/// contain them.
///
/// Likelihoods are kept in log-ratio space relative to the hypothesis that
/// the query matches no place. The absent-word/absent-parent ratio of every
/// word a place contains is pre-baked into that place's default score when it
/// is indexed; a query then only walks the posting lists of its present words
/// and applies the three remaining corrections. Reported log-likelihoods
/// therefore differ from the exhaustive backend by a per-query constant,
/// which normalization cancels.
#[derive(Debug)]
pub struct IndexRecognizer {
    engine: Engine,
    /// Log-ratio of P(z_q = F | z_parent = F, place has q) to the same term
    /// without the word at the place; the default contribution per indexed
    /// word. The other three arrays are stored relative to this baseline.
    ratio_absent_absent: Vec<f64>,
    ratio_absent_present: Vec<f64>,
    ratio_present_absent: Vec<f64>,
    ratio_present_present: Vec<f64>,
    children: Vec<Vec<usize>>,
    training_index: InvertedIndex,
    gallery_index: InvertedIndex,
}

impl IndexRecognizer {
    pub fn new(engine: Engine) -> Result<Self> {
        if engine.new_place_model() == NewPlaceModel::MeanField {
            return Err(Error::SampledModelRequired);
        }

        let sensor = engine.sensor();
        let tree = sensor.tree();
        let vocab = tree.vocab_size();
        let ratio = |z: bool, zp: bool, q: usize| {
            (sensor.place_term(q, z, zp, true) / sensor.place_term(q, z, zp, false)).ln()
        };

        let mut ratio_absent_absent = Vec::with_capacity(vocab);
        let mut ratio_absent_present = Vec::with_capacity(vocab);
        let mut ratio_present_absent = Vec::with_capacity(vocab);
        let mut ratio_present_present = Vec::with_capacity(vocab);
        let mut children = vec![Vec::new(); vocab];
        for q in 0..vocab {
            let baseline = ratio(false, false, q);
            ratio_absent_absent.push(baseline);
            ratio_absent_present.push(ratio(false, true, q) - baseline);
            ratio_present_absent.push(ratio(true, false, q) - baseline);
            ratio_present_present.push(ratio(true, true, q) - baseline);
            if tree.parent(q) != q {
                children[tree.parent(q)].push(q);
            }
        }

        Ok(IndexRecognizer {
            engine,
            ratio_absent_absent,
            ratio_absent_present,
            ratio_present_absent,
            ratio_present_present,
            children,
            training_index: InvertedIndex::default(),
            gallery_index: InvertedIndex::default(),
        })
    }

    /// Score every indexed place against `query`, starting from the default
    /// scores and correcting only the places on the posting lists of the
    /// query's present words (and of their absent children).
    fn index_likelihoods(&self, query: &Observation, index: &InvertedIndex) -> Vec<LogProb> {
        let tree = self.engine.sensor().tree();
        let mut likelihoods = index.defaults.clone();

        for q in 0..tree.vocab_size() {
            if !query.contains(q) {
                continue;
            }
            let correction = if query.contains(tree.parent(q)) {
                self.ratio_present_present[q]
            } else {
                self.ratio_present_absent[q]
            };
            for &place in index.postings(q) {
                likelihoods[place] += correction;
            }
            for &child in &self.children[q] {
                if !query.contains(child) {
                    for &place in index.postings(child) {
                        likelihoods[place] += self.ratio_absent_present[child];
                    }
                }
            }
        }

        likelihoods.into_iter().map(LogProb).collect_vec()
    }

    fn scratch_index(&self, places: &[Observation]) -> InvertedIndex {
        let mut index = InvertedIndex::default();
        for place in places {
            index.insert(place, &self.ratio_absent_absent);
        }
        index
    }
}

impl PlaceRecognizer for IndexRecognizer {
    fn engine(&self) -> &Engine {
        &self.engine
    }

    fn engine_mut(&mut self) -> &mut Engine {
        &mut self.engine
    }

    /// External galleries are scored through a scratch index built on the fly.
    fn likelihoods(&self, query: &Observation, places: &[Observation]) -> Vec<LogProb> {
        let index = self.scratch_index(places);
        self.index_likelihoods(query, &index)
    }

    fn gallery_likelihoods(&self, query: &Observation) -> Vec<LogProb> {
        self.index_likelihoods(query, &self.gallery_index)
    }

    fn index_training(&mut self, observation: &Observation) {
        self.training_index
            .insert(observation, &self.ratio_absent_absent);
    }

    fn index_place(&mut self, observation: &Observation) {
        self.gallery_index
            .insert(observation, &self.ratio_absent_absent);
    }

    /// Average over the whole training index instead of drawing samples; the
    /// index makes touching every training place cheap enough.
    fn new_place_likelihood(&mut self, query: &Observation) -> Result<LogProb> {
        if self.training_index.len() == 0 {
            return Err(Error::EmptyTrainingGallery);
        }
        let likelihoods = self.index_likelihoods(query, &self.training_index);
        let average = LogProb(
            *utils::ln_sum_exp(&likelihoods) - (self.training_index.len() as f64).ln(),
        );
        debug!("indexed new-place log-likelihood: {:?}", average);
        Ok(average)
    }
}
