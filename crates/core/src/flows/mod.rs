pub mod engine;
pub mod states;

pub use engine::{FlowDefinition, FlowEngine, FlowTransitionError, TravelRequestFlow};
pub use states::{FlowType, RequestEvent, TransitionOutcome};
