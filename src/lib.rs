//! Appearance-based place recognition over binary bag-of-visual-words
//! observations.
//!
//! Given a stream of image descriptors, the engine computes for each new
//! descriptor a probability distribution over every previously collected
//! place and a dedicated new-place hypothesis. The observation model is a
//! Chow-Liu tree approximation of the joint distribution of visual word
//! occurrences combined with a per-word detector error model; the posterior
//! can optionally be smoothed with a simple motion prior between consecutive
//! queries.
//!
//! Four interchangeable likelihood backends are provided:
//!
//! * [`ExhaustiveRecognizer`]: per-(place, word) log-likelihood sums.
//! * [`TableRecognizer`]: decimal fixed-point lookup table, integer
//!   accumulation in the inner loop.
//! * [`BailoutRecognizer`]: processes words by ascending information content
//!   and prunes trailing hypotheses with a Bennett concentration bound.
//! * [`IndexRecognizer`]: inverted index keyed by word, touching only the
//!   places affected by the words actually observed.
//!
//! All four agree on the resulting posterior (the table variant up to its
//! fixed-point truncation error).

#[macro_use]
extern crate serde_derive;
#[macro_use]
extern crate derive_builder;
#[macro_use]
extern crate getset;
#[macro_use]
extern crate log;
#[cfg(test)]
#[macro_use]
extern crate approx;

pub mod errors;
pub mod model;
pub mod recognition;
pub(crate) mod utils;

pub use crate::errors::{Error, Result};
pub use crate::model::sensor::{DetectorModel, ObservationModel, SensorModel};
pub use crate::model::tree::ChowLiuTree;
pub use crate::model::{Match, Observation};
pub use crate::recognition::bailout::{BailoutParams, BailoutParamsBuilder, BailoutRecognizer};
pub use crate::recognition::exhaustive::ExhaustiveRecognizer;
pub use crate::recognition::inverted::IndexRecognizer;
pub use crate::recognition::table::TableRecognizer;
pub use crate::recognition::{
    Engine, EngineBuilder, MotionModel, MotionModelBuilder, NewPlaceModel, PlaceRecognizer,
};
