use anyhow::Result;
use approx::assert_relative_eq;
use itertools::Itertools;
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use dejavu::{
    BailoutParamsBuilder, BailoutRecognizer, ChowLiuTree, DetectorModel, EngineBuilder, Error,
    ExhaustiveRecognizer, IndexRecognizer, Match, MotionModelBuilder, NewPlaceModel, Observation,
    ObservationModel, PlaceRecognizer, SensorModel, TableRecognizer,
};

fn setup_logger() {
    let _ = env_logger::init();
}

fn random_tree(vocab: usize, rng: &mut StdRng) -> ChowLiuTree {
    let mut table = Array2::zeros((4, vocab));
    for q in 0..vocab {
        table[[0, q]] = if q == 0 {
            0.0
        } else {
            rng.gen_range(0, q) as f64
        };
        for row in 1..4 {
            table[[row, q]] = rng.gen_range(0.05, 0.95);
        }
    }
    ChowLiuTree::new(table).unwrap()
}

fn random_sensor(vocab: usize, model: ObservationModel, seed: u64) -> SensorModel {
    let mut rng = StdRng::seed_from_u64(seed);
    SensorModel::new(
        random_tree(vocab, &mut rng),
        DetectorModel::new(0.39, 0.05).unwrap(),
        model,
    )
}

fn random_observation(vocab: usize, rng: &mut StdRng) -> Observation {
    Observation::new(
        (0..vocab)
            .map(|_| if rng.gen_bool(0.3) { 1.0 } else { 0.0 })
            .collect(),
    )
    .unwrap()
}

fn assert_posterior(matches: &[Match], places: usize) {
    // one new-place record, first in the block, and a normalized posterior
    assert_eq!(matches.len(), places + 1);
    assert!(matches[0].is_new_place());
    assert_eq!(matches.iter().filter(|m| m.is_new_place()).count(), 1);
    let total: f64 = matches.iter().map(|m| m.probability).sum();
    assert_relative_eq!(total, 1.0, epsilon = 1e-9);
}

#[test]
fn test_revisited_place_beats_new_place() {
    setup_logger();
    // V = 2 tree with root 0 and parent(1) = 0
    let table = ndarray::arr2(&[[0.0, 0.0], [0.4, 0.3], [0.7, 0.8], [0.2, 0.1]]);
    let sensor = SensorModel::new(
        ChowLiuTree::new(table).unwrap(),
        DetectorModel::new(0.39, 0.05).unwrap(),
        ObservationModel::ChowLiu,
    );
    let mut recognizer = ExhaustiveRecognizer::new(
        EngineBuilder::new(sensor, NewPlaceModel::MeanField)
            .build()
            .unwrap(),
    );

    let observation = Observation::new(vec![1.0, 0.0]).unwrap();
    recognizer.add_place(observation.clone()).unwrap();
    let matches = recognizer.compare(&[observation], false).unwrap();

    assert_posterior(&matches, 1);
    assert!(matches[1].probability > matches[0].probability);
}

#[test]
fn test_empty_gallery_yields_single_certain_record() {
    let vocab = 8;
    let sensor = random_sensor(vocab, ObservationModel::ChowLiu, 31);
    let mut recognizer = ExhaustiveRecognizer::new(
        EngineBuilder::new(sensor, NewPlaceModel::Sampled { samples: 3 })
            .build()
            .unwrap(),
    );

    let query =
        Observation::from_presence(&[true, false, true, false, true, false, true, false]).unwrap();
    for _ in 0..3 {
        recognizer.add_training(query.clone()).unwrap();
    }

    let matches = recognizer.compare(&[query], false).unwrap();
    assert_eq!(matches.len(), 1);
    assert!(matches[0].is_new_place());
    assert_relative_eq!(matches[0].probability, 1.0, epsilon = 1e-12);
}

#[test]
fn test_every_variant_emits_normalized_posteriors() -> Result<()> {
    let vocab = 32;
    let mut rng = StdRng::seed_from_u64(41);
    let places = (0..12)
        .map(|_| random_observation(vocab, &mut rng))
        .collect_vec();
    let training = (0..6)
        .map(|_| random_observation(vocab, &mut rng))
        .collect_vec();
    let queries = (0..4)
        .map(|_| random_observation(vocab, &mut rng))
        .collect_vec();

    let engine = || {
        EngineBuilder::new(
            random_sensor(vocab, ObservationModel::ChowLiu, 41),
            NewPlaceModel::Sampled { samples: 5 },
        )
        .seed(77)
        .build()
        .unwrap()
    };

    let mut recognizers: Vec<Box<dyn PlaceRecognizer>> = vec![
        Box::new(ExhaustiveRecognizer::new(engine())),
        Box::new(TableRecognizer::new(engine(), 6)),
        Box::new(BailoutRecognizer::new(engine(), Default::default())),
        Box::new(IndexRecognizer::new(engine())?),
    ];

    for recognizer in &mut recognizers {
        for observation in &training {
            recognizer.add_training(observation.clone())?;
        }
        for observation in &places {
            recognizer.add_place(observation.clone())?;
        }
        let matches = recognizer.compare(&queries, false)?;
        assert_eq!(matches.len(), queries.len() * (places.len() + 1));
        for (k, block) in matches.chunks(places.len() + 1).enumerate() {
            assert_posterior(block, places.len());
            assert!(block.iter().all(|m| m.query == k));
        }
    }
    Ok(())
}

#[test]
fn test_table_recognizer_tracks_exhaustive() {
    let vocab = 64;
    let precision = 3;
    let mut rng = StdRng::seed_from_u64(3);
    let sensor = random_sensor(vocab, ObservationModel::ChowLiu, 19);

    let mut exhaustive = ExhaustiveRecognizer::new(
        EngineBuilder::new(sensor.clone(), NewPlaceModel::MeanField)
            .build()
            .unwrap(),
    );
    let mut table = TableRecognizer::new(
        EngineBuilder::new(sensor, NewPlaceModel::MeanField)
            .build()
            .unwrap(),
        precision,
    );

    let places = (0..10)
        .map(|_| random_observation(vocab, &mut rng))
        .collect_vec();
    exhaustive.add_place_batch(places.clone()).unwrap();
    table.add_place_batch(places).unwrap();

    let mut total_error = 0.0;
    let mut records = 0;
    for _ in 0..100 {
        let query = random_observation(vocab, &mut rng);
        let exact = exhaustive.compare(&[query.clone()], false).unwrap();
        let coarse = table.compare(&[query], false).unwrap();
        for (a, b) in exact.iter().zip(coarse.iter()) {
            total_error += (a.probability - b.probability).abs();
            records += 1;
        }
    }
    assert!(total_error / (records as f64) < 1e-3);
}

#[test]
fn test_bailout_keeps_the_winner() {
    let vocab = 48;
    let mut rng = StdRng::seed_from_u64(57);
    let sensor = random_sensor(vocab, ObservationModel::ChowLiu, 23);
    let params = BailoutParamsBuilder::default()
        .rejection_threshold(0.01)
        .ps_gd(1e-6)
        .bisection_start(512.0)
        .bisection_its(100)
        .build()
        .unwrap();

    let mut exhaustive = ExhaustiveRecognizer::new(
        EngineBuilder::new(sensor.clone(), NewPlaceModel::MeanField)
            .build()
            .unwrap(),
    );
    let mut bailout = BailoutRecognizer::new(
        EngineBuilder::new(sensor, NewPlaceModel::MeanField)
            .build()
            .unwrap(),
        params,
    );

    let places = (0..25)
        .map(|_| random_observation(vocab, &mut rng))
        .collect_vec();
    exhaustive.add_place_batch(places.clone()).unwrap();
    bailout.add_place_batch(places).unwrap();

    for _ in 0..10 {
        let query = random_observation(vocab, &mut rng);
        let exact = exhaustive.compare(&[query.clone()], false).unwrap();
        let pruned = bailout.compare(&[query], false).unwrap();

        let argmax = |matches: &[Match]| {
            matches
                .iter()
                .skip(1)
                .max_by(|a, b| a.probability.partial_cmp(&b.probability).unwrap())
                .unwrap()
                .place
        };
        assert_eq!(argmax(&exact), argmax(&pruned));
        let best = exact
            .iter()
            .skip(1)
            .max_by(|a, b| a.probability.partial_cmp(&b.probability).unwrap())
            .unwrap();
        let same = pruned.iter().find(|m| m.place == best.place).unwrap();
        assert_relative_eq!(*best.likelihood, *same.likelihood, epsilon = 1e-9);
    }
}

#[test]
fn test_index_recognizer_agrees_with_exhaustive_posterior() -> Result<()> {
    let vocab = 32;
    let mut rng = StdRng::seed_from_u64(67);
    let sensor = random_sensor(vocab, ObservationModel::ChowLiu, 29);

    // identical training descriptors make the sampled average and the
    // full-index average coincide, so whole posteriors are comparable
    let prototype = random_observation(vocab, &mut rng);
    let training = vec![prototype; 5];
    let places = (0..15)
        .map(|_| random_observation(vocab, &mut rng))
        .collect_vec();

    let mut exhaustive = ExhaustiveRecognizer::new(
        EngineBuilder::new(sensor.clone(), NewPlaceModel::Sampled { samples: 8 })
            .seed(1)
            .build()
            .unwrap(),
    );
    let mut index = IndexRecognizer::new(
        EngineBuilder::new(sensor, NewPlaceModel::Sampled { samples: 8 })
            .seed(1)
            .build()
            .unwrap(),
    )?;

    exhaustive.add_training_batch(training.clone())?;
    index.add_training_batch(training)?;
    exhaustive.add_place_batch(places.clone())?;
    index.add_place_batch(places.clone())?;

    for _ in 0..5 {
        let query = random_observation(vocab, &mut rng);
        let exact = exhaustive.compare(&[query.clone()], false)?;
        let indexed = index.compare(&[query], false)?;
        assert_posterior(&indexed, places.len());
        for (a, b) in exact.iter().zip(indexed.iter()) {
            assert_relative_eq!(a.probability, b.probability, epsilon = 1e-9);
        }
    }
    Ok(())
}

#[test]
fn test_index_recognizer_is_deterministic_across_rebuilds() -> Result<()> {
    let vocab = 16;
    let run = || -> Result<Vec<f64>> {
        let mut rng = StdRng::seed_from_u64(101);
        let mut recognizer = IndexRecognizer::new(
            EngineBuilder::new(
                random_sensor(vocab, ObservationModel::ChowLiu, 5),
                NewPlaceModel::Sampled { samples: 4 },
            )
            .seed(9)
            .build()
            .unwrap(),
        )?;
        for _ in 0..4 {
            recognizer.add_training(random_observation(vocab, &mut rng))?;
        }
        let queries = (0..6)
            .map(|_| random_observation(vocab, &mut rng))
            .collect_vec();
        let matches = recognizer.compare(&queries, true)?;
        // after five self-appended queries the sixth block carries five place
        // records plus the new-place hypothesis
        let last_block = matches.iter().filter(|m| m.query == 5).collect_vec();
        assert_eq!(last_block.len(), 6);
        Ok(matches.iter().map(|m| m.probability).collect_vec())
    };

    assert_eq!(run()?, run()?);
    Ok(())
}

#[test]
fn test_sampled_comparison_is_deterministic_under_fixed_seed() {
    let vocab = 16;
    let run = || {
        let mut rng = StdRng::seed_from_u64(201);
        let mut recognizer = ExhaustiveRecognizer::new(
            EngineBuilder::new(
                random_sensor(vocab, ObservationModel::NaiveBayes, 6),
                NewPlaceModel::Sampled { samples: 7 },
            )
            .seed(42)
            .build()
            .unwrap(),
        );
        for _ in 0..5 {
            recognizer
                .add_training(random_observation(vocab, &mut rng))
                .unwrap();
        }
        let queries = (0..3)
            .map(|_| random_observation(vocab, &mut rng))
            .collect_vec();
        let matches = recognizer.compare(&queries, true).unwrap();
        matches.iter().map(|m| m.probability).collect_vec()
    };

    assert_eq!(run(), run());
}

#[test]
fn test_external_gallery_rejects_motion_model() {
    let vocab = 8;
    let mut rng = StdRng::seed_from_u64(71);
    let sensor = random_sensor(vocab, ObservationModel::ChowLiu, 7);
    let mut recognizer = ExhaustiveRecognizer::new(
        EngineBuilder::new(sensor, NewPlaceModel::MeanField)
            .motion_model(MotionModelBuilder::default().build().unwrap())
            .build()
            .unwrap(),
    );

    let gallery = vec![random_observation(vocab, &mut rng)];
    let queries = vec![random_observation(vocab, &mut rng)];
    assert_eq!(
        recognizer.compare_against(&queries, &gallery).unwrap_err(),
        Error::MotionModelExternalGallery
    );
}

#[test]
fn test_external_gallery_comparison_matches_own_gallery() {
    let vocab = 16;
    let mut rng = StdRng::seed_from_u64(83);
    let sensor = random_sensor(vocab, ObservationModel::ChowLiu, 11);
    let places = (0..5)
        .map(|_| random_observation(vocab, &mut rng))
        .collect_vec();
    let query = vec![random_observation(vocab, &mut rng)];

    let engine = || {
        EngineBuilder::new(sensor.clone(), NewPlaceModel::MeanField)
            .build()
            .unwrap()
    };
    let mut own = ExhaustiveRecognizer::new(engine());
    own.add_place_batch(places.clone()).unwrap();
    let mut foreign = ExhaustiveRecognizer::new(engine());

    let a = own.compare(&query, false).unwrap();
    let b = foreign.compare_against(&query, &places).unwrap();
    assert_eq!(a.len(), b.len());
    for (x, y) in a.iter().zip(b.iter()) {
        assert_eq!(x.probability, y.probability);
    }
}

#[test]
fn test_dimension_mismatch_is_rejected() {
    let sensor = random_sensor(8, ObservationModel::ChowLiu, 13);
    let mut recognizer = ExhaustiveRecognizer::new(
        EngineBuilder::new(sensor, NewPlaceModel::MeanField)
            .build()
            .unwrap(),
    );
    let short = Observation::new(vec![1.0, 0.0]).unwrap();
    assert_eq!(
        recognizer.add_place(short).unwrap_err(),
        Error::WordCountMismatch {
            expected: 8,
            got: 2
        }
    );
}

#[test]
fn test_sampling_from_empty_training_fails() {
    let sensor = random_sensor(4, ObservationModel::ChowLiu, 17);
    let mut recognizer = ExhaustiveRecognizer::new(
        EngineBuilder::new(sensor, NewPlaceModel::Sampled { samples: 3 })
            .build()
            .unwrap(),
    );
    let query = vec![Observation::from_presence(&[true, false, true, false]).unwrap()];
    assert_eq!(
        recognizer.compare(&query, false).unwrap_err(),
        Error::EmptyTrainingGallery
    );
}

#[test]
fn test_match_records_serialize() {
    let table = ndarray::arr2(&[[0.0, 0.0], [0.4, 0.3], [0.7, 0.8], [0.2, 0.1]]);
    let sensor = SensorModel::new(
        ChowLiuTree::new(table).unwrap(),
        DetectorModel::new(0.39, 0.05).unwrap(),
        ObservationModel::NaiveBayes,
    );
    let mut recognizer = ExhaustiveRecognizer::new(
        EngineBuilder::new(sensor, NewPlaceModel::MeanField)
            .build()
            .unwrap(),
    );
    recognizer
        .add_place(Observation::new(vec![1.0, 0.0]).unwrap())
        .unwrap();
    let matches = recognizer
        .compare(&[Observation::new(vec![1.0, 1.0]).unwrap()], false)
        .unwrap();
    let json = serde_json::to_string(&matches).unwrap();
    assert!(json.contains("\"probability\""));
}
