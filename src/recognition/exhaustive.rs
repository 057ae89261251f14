use bio::stats::LogProb;
use itertools::Itertools;

use crate::model::Observation;
use crate::recognition::{Engine, PlaceRecognizer};

/// Baseline recognizer: a full per-(place, word) log-likelihood sum.
///
/// Costs O(places x vocabulary) per query; the other backends exist to beat
/// this, and are validated against it.
pub struct ExhaustiveRecognizer {
    engine: Engine,
}

impl ExhaustiveRecognizer {
    pub fn new(engine: Engine) -> Self {
        ExhaustiveRecognizer { engine }
    }
}

impl PlaceRecognizer for ExhaustiveRecognizer {
    fn engine(&self) -> &Engine {
        &self.engine
    }

    fn engine_mut(&mut self) -> &mut Engine {
        &mut self.engine
    }

    fn likelihoods(&self, query: &Observation, places: &[Observation]) -> Vec<LogProb> {
        let sensor = self.engine.sensor();
        let tree = sensor.tree();
        places
            .iter()
            .map(|place| {
                let mut log_p = 0.0;
                for q in 0..tree.vocab_size() {
                    let z = query.contains(q);
                    let zp = query.contains(tree.parent(q));
                    log_p += sensor.place_term(q, z, zp, place.contains(q)).ln();
                }
                LogProb(log_p)
            })
            .collect_vec()
    }
}
