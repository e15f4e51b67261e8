pub mod hospital;
pub mod infection;
pub mod progression;
pub mod testing;

use crate::dims::Axis;
use crate::error::EngineError;
use crate::policy::{QuarantineDecision, SimTime};
use crate::rates::RateTensor;
use crate::state::StateTensor;

use self::testing::{TestCapacity, TestingPolicy};

/// Everything a sub-model may read while contributing rates.
pub struct StepContext<'a> {
    pub time: SimTime,
    pub state: &'a StateTensor,
    pub quarantine: QuarantineDecision,
    pub testing_policy: &'a dyn TestingPolicy,
    pub capacity: &'a dyn TestCapacity,
}

/// A transition-rate sub-model. Each one owns exactly one axis and may only
/// emit edges that change that axis.
pub trait RateModel: Send + Sync {
    fn name(&self) -> &'static str;

    fn axis(&self) -> Axis;

    fn contribute(&self, ctx: &StepContext<'_>, out: &mut RateTensor) -> Result<(), EngineError>;
}
