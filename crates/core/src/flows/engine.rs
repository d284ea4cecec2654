use thiserror::Error;

use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::domain::request::RequestStatus;
use crate::flows::states::{FlowType, RequestEvent, TransitionOutcome};

pub trait FlowDefinition {
    fn flow_type(&self) -> FlowType;
    fn initial_state(&self) -> RequestStatus;
    fn transition(
        &self,
        current: &RequestStatus,
        event: &RequestEvent,
    ) -> Result<TransitionOutcome, FlowTransitionError>;
}

#[derive(Clone, Debug, Default)]
pub struct TravelRequestFlow;

impl FlowDefinition for TravelRequestFlow {
    fn flow_type(&self) -> FlowType {
        FlowType::TravelRequest
    }

    fn initial_state(&self) -> RequestStatus {
        RequestStatus::Submitted
    }

    fn transition(
        &self,
        current: &RequestStatus,
        event: &RequestEvent,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        transition_travel_request(current, event)
    }
}

pub struct FlowEngine<F> {
    flow: F,
}

impl<F> FlowEngine<F>
where
    F: FlowDefinition,
{
    pub fn new(flow: F) -> Self {
        Self { flow }
    }

    pub fn flow_type(&self) -> FlowType {
        self.flow.flow_type()
    }

    pub fn initial_state(&self) -> RequestStatus {
        self.flow.initial_state()
    }

    pub fn apply(
        &self,
        current: &RequestStatus,
        event: &RequestEvent,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        self.flow.transition(current, event)
    }

    pub fn apply_with_audit<S>(
        &self,
        current: &RequestStatus,
        event: &RequestEvent,
        sink: &S,
        audit: &AuditContext,
    ) -> Result<TransitionOutcome, FlowTransitionError>
    where
        S: AuditSink + ?Sized,
    {
        let result = self.apply(current, event);
        match &result {
            Ok(outcome) => {
                sink.emit(
                    AuditEvent::new(
                        audit.entity_id.clone(),
                        audit.correlation_id.clone(),
                        "flow.transition_applied",
                        AuditCategory::Flow,
                        audit.actor.clone(),
                        AuditOutcome::Success,
                    )
                    .with_metadata("from", outcome.from.as_str())
                    .with_metadata("to", outcome.to.as_str())
                    .with_metadata("event", format!("{:?}", outcome.event)),
                );
            }
            Err(error) => {
                sink.emit(
                    AuditEvent::new(
                        audit.entity_id.clone(),
                        audit.correlation_id.clone(),
                        "flow.transition_rejected",
                        AuditCategory::Flow,
                        audit.actor.clone(),
                        AuditOutcome::Rejected,
                    )
                    .with_metadata("error", error.to_string()),
                );
            }
        }
        result
    }
}

impl Default for FlowEngine<TravelRequestFlow> {
    fn default() -> Self {
        Self::new(TravelRequestFlow)
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FlowTransitionError {
    #[error("invalid transition from {state:?} using event {event:?}")]
    InvalidTransition { state: RequestStatus, event: RequestEvent },
}

fn transition_travel_request(
    current: &RequestStatus,
    event: &RequestEvent,
) -> Result<TransitionOutcome, FlowTransitionError> {
    use RequestEvent::{Accept, Cancel, Close, CompleteBooking, FailBooking, RequestInfo, StartBooking};
    use RequestStatus::{
        Accepted, Booking, Cancelled, Closed, Failed, InfoNeeded, Submitted, Success,
    };

    let to = match (current, event) {
        (Submitted, Accept) | (InfoNeeded, Accept) => Accepted,
        (Accepted, StartBooking) => Booking,
        (Accepted, RequestInfo) => InfoNeeded,
        (Booking, CompleteBooking) => Success,
        (Booking, FailBooking) => Failed,
        (Submitted | Accepted | InfoNeeded | Booking, Cancel) => Cancelled,
        (Closed, Close) => {
            return Err(FlowTransitionError::InvalidTransition { state: *current, event: *event });
        }
        (_, Close) => Closed,
        _ => {
            return Err(FlowTransitionError::InvalidTransition { state: *current, event: *event });
        }
    };

    Ok(TransitionOutcome { from: *current, to, event: *event })
}

#[cfg(test)]
mod tests {
    use crate::audit::{AuditContext, InMemoryAuditSink};
    use crate::domain::request::RequestStatus;
    use crate::flows::engine::{FlowDefinition, FlowEngine, FlowTransitionError, TravelRequestFlow};
    use crate::flows::states::{FlowType, RequestEvent};

    #[test]
    fn booking_happy_path_reaches_success() {
        let engine = FlowEngine::new(TravelRequestFlow);
        let mut state = engine.initial_state();
        assert_eq!(state, RequestStatus::Submitted);

        for event in [RequestEvent::Accept, RequestEvent::StartBooking, RequestEvent::CompleteBooking]
        {
            state = engine.apply(&state, &event).expect("happy path").to;
        }

        assert_eq!(state, RequestStatus::Success);
    }

    #[test]
    fn info_loop_returns_to_accepted() {
        let engine = FlowEngine::default();

        let info = engine
            .apply(&RequestStatus::Accepted, &RequestEvent::RequestInfo)
            .expect("accepted -> info needed");
        assert_eq!(info.to, RequestStatus::InfoNeeded);

        let back = engine.apply(&info.to, &RequestEvent::Accept).expect("info needed -> accepted");
        assert_eq!(back.from, RequestStatus::InfoNeeded);
        assert_eq!(back.to, RequestStatus::Accepted);
    }

    #[test]
    fn booking_outcomes_require_booking_state() {
        let engine = FlowEngine::default();
        let error = engine
            .apply(&RequestStatus::Submitted, &RequestEvent::CompleteBooking)
            .expect_err("submitted cannot complete a booking");

        assert_eq!(
            error,
            FlowTransitionError::InvalidTransition {
                state: RequestStatus::Submitted,
                event: RequestEvent::CompleteBooking,
            }
        );
    }

    #[test]
    fn cancel_is_limited_to_open_states() {
        let engine = FlowEngine::default();
        for state in RequestStatus::ALL {
            let result = engine.apply(&state, &RequestEvent::Cancel);
            let open = matches!(
                state,
                RequestStatus::Submitted
                    | RequestStatus::Accepted
                    | RequestStatus::InfoNeeded
                    | RequestStatus::Booking
            );
            assert_eq!(result.is_ok(), open, "cancel from {state:?}");
        }
    }

    #[test]
    fn close_is_allowed_everywhere_but_closed() {
        let engine = FlowEngine::default();
        for state in RequestStatus::ALL {
            let result = engine.apply(&state, &RequestEvent::Close);
            assert_eq!(result.is_ok(), state != RequestStatus::Closed, "close from {state:?}");
        }
    }

    #[test]
    fn replay_is_deterministic_for_same_event_sequence() {
        let engine = FlowEngine::default();
        let events = [
            RequestEvent::Accept,
            RequestEvent::RequestInfo,
            RequestEvent::Accept,
            RequestEvent::StartBooking,
            RequestEvent::FailBooking,
            RequestEvent::Close,
        ];

        let run = |engine: &FlowEngine<TravelRequestFlow>| {
            let mut state = engine.initial_state();
            let mut trail = Vec::new();
            for event in &events {
                let outcome = engine.apply(&state, event).expect("deterministic run");
                trail.push(outcome);
                state = outcome.to;
            }
            (state, trail)
        };

        let first = run(&engine);
        let second = run(&engine);

        assert_eq!(first, second);
        assert_eq!(first.0, RequestStatus::Closed);
        assert_eq!(engine.flow_type(), FlowType::TravelRequest);
        assert_eq!(TravelRequestFlow.flow_type(), FlowType::TravelRequest);
    }

    #[test]
    fn rejected_transition_emits_audit_event() {
        let engine = FlowEngine::default();
        let sink = InMemoryAuditSink::default();

        let result = engine.apply_with_audit(
            &RequestStatus::Success,
            &RequestEvent::Cancel,
            &sink,
            &AuditContext::new(Some("REQ-20240115-0001".to_owned()), "req-42", "admin"),
        );

        assert!(result.is_err());
        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].correlation_id, "req-42");
        assert_eq!(events[0].entity_id.as_deref(), Some("REQ-20240115-0001"));
        assert_eq!(events[0].event_type, "flow.transition_rejected");
    }
}
