use bio::stats::LogProb;
use itertools::Itertools;

use crate::model::Observation;
use crate::recognition::{Engine, PlaceRecognizer};

/// Recognizer with a decimal fixed-point lookup table.
///
/// At construction every per-word likelihood is evaluated for all 8
/// combinations of (place has word, query has word, query has parent word)
/// and stored as a scaled negative log. The inner loop then only performs
/// integer additions; `precision` is the number of decimal digits kept,
/// trading truncation error against accumulator headroom.
pub struct TableRecognizer {
    engine: Engine,
    precision: u32,
    /// V x 8 entries, indexed as `table[q * 8 + i]` with bit 0 = parent word
    /// present in the query, bit 1 = word present in the query, bit 2 = word
    /// present at the place.
    table: Vec<u64>,
}

impl TableRecognizer {
    pub fn new(engine: Engine, precision: u32) -> Self {
        let sensor = engine.sensor();
        let tree = sensor.tree();
        let scale = 10f64.powi(precision as i32);

        let mut table = Vec::with_capacity(tree.vocab_size() * 8);
        for q in 0..tree.vocab_size() {
            for i in 0..8u8 {
                let at_place = (i >> 2) & 1 == 1;
                let z = (i >> 1) & 1 == 1;
                let zp = i & 1 == 1;
                let log_p = sensor.place_term(q, z, zp, at_place).ln();
                table.push((-log_p * scale).round() as u64);
            }
        }

        TableRecognizer {
            engine,
            precision,
            table,
        }
    }
}

impl PlaceRecognizer for TableRecognizer {
    fn engine(&self) -> &Engine {
        &self.engine
    }

    fn engine_mut(&mut self) -> &mut Engine {
        &mut self.engine
    }

    fn likelihoods(&self, query: &Observation, places: &[Observation]) -> Vec<LogProb> {
        let tree = self.engine.sensor().tree();
        let scale = 10f64.powi(-(self.precision as i32));
        places
            .iter()
            .map(|place| {
                let mut acc: u64 = 0;
                for q in 0..tree.vocab_size() {
                    let i = query.contains(tree.parent(q)) as usize
                        | (query.contains(q) as usize) << 1
                        | (place.contains(q) as usize) << 2;
                    acc += self.table[q * 8 + i];
                }
                LogProb(-(acc as f64) * scale)
            })
            .collect_vec()
    }
}
