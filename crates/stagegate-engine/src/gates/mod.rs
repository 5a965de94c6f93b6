pub mod evaluator;
pub mod result;
pub mod status;

pub use evaluator::GateEvaluator;
pub use result::GateEvaluationResult;
pub use status::{GateBlockers, GateStatus};
