//! The structured offer record, its signature and its rating.

pub mod evaluator;
pub mod model;
pub mod signature;

pub use evaluator::{
    evaluate, CombinedRating, EvaluationResult, IndividualRating, RatingThresholds,
};
pub use model::StructuredOffer;
pub use signature::signature;
