use bio::stats::LogProb;
use ndarray::Array2;

use crate::errors::{Error, Result};

pub mod sensor;
pub mod tree;

/// A binary bag-of-visual-words image descriptor.
///
/// Entries are 32-bit floats for compatibility with quantizer output, but the
/// semantics are strictly binary: a word is present iff its entry is > 0.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    words: Vec<f32>,
}

impl Observation {
    pub fn new(words: Vec<f32>) -> Result<Self> {
        if words.is_empty() {
            return Err(Error::EmptyObservation);
        }
        Ok(Observation { words })
    }

    /// Build an observation from per-word presence flags.
    pub fn from_presence(present: &[bool]) -> Result<Self> {
        Observation::new(present.iter().map(|&p| if p { 1.0 } else { 0.0 }).collect())
    }

    /// Split a row-per-descriptor matrix into single observations.
    pub fn from_rows(batch: &Array2<f32>) -> Result<Vec<Self>> {
        batch
            .genrows()
            .into_iter()
            .map(|row| Observation::new(row.to_vec()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Whether word `q` was observed.
    #[inline]
    pub fn contains(&self, q: usize) -> bool {
        self.words[q] > 0.0
    }
}

/// A scored hypothesis for one query: either a previously collected place or
/// the new-place hypothesis.
#[derive(Clone, Debug, Serialize)]
pub struct Match {
    /// Index of the query descriptor within its batch.
    pub query: usize,
    /// Matched place; `None` denotes the new-place hypothesis.
    pub place: Option<usize>,
    /// Log-likelihood of the query under this hypothesis.
    pub likelihood: LogProb,
    /// Posterior probability after normalization and smoothing.
    pub probability: f64,
}

impl Match {
    pub fn new(query: usize, place: Option<usize>, likelihood: LogProb) -> Self {
        Match {
            query,
            place,
            likelihood,
            probability: 0.0,
        }
    }

    pub fn is_new_place(&self) -> bool {
        self.place.is_none()
    }
}
