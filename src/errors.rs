use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, PartialEq)]
pub enum Error {
    #[error("empty observation given; descriptors must contain at least one word")]
    EmptyObservation,
    #[error("observation carries {got} words but the vocabulary has {expected}")]
    WordCountMismatch { expected: usize, got: usize },
    #[error("Chow-Liu tree table must have 4 rows, got {rows}")]
    InvalidTreeShape { rows: usize },
    #[error("Chow-Liu tree table must cover at least one word")]
    EmptyTree,
    #[error("Chow-Liu tree probability out of (0, 1) at row {row}, word {word}")]
    TreeProbabilityOutOfRange { row: usize, word: usize },
    #[error("parent map of the Chow-Liu tree must contain exactly one root, found {roots}")]
    InvalidRootCount { roots: usize },
    #[error("parent map of the Chow-Liu tree is not a rooted tree at word {word}")]
    InvalidParentMap { word: usize },
    #[error("detector probabilities must lie strictly between 0 and 1")]
    InvalidDetectorModel,
    #[error("{name} must lie within [0, 1]")]
    ParameterOutOfRange { name: &'static str },
    #[error("sampled new-place estimation requires a nonempty training gallery")]
    EmptyTrainingGallery,
    #[error("number of samples must be greater than zero")]
    InvalidSampleCount,
    #[error("the motion model requires comparisons against the engine's own gallery")]
    MotionModelExternalGallery,
    #[error("the inverted-index recognizer requires the sampled new-place model")]
    SampledModelRequired,
}
