use serde::{Deserialize, Serialize};

use crate::domain::request::RequestStatus;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowType {
    TravelRequest,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequestEvent {
    Accept,
    StartBooking,
    RequestInfo,
    CompleteBooking,
    FailBooking,
    Cancel,
    Close,
}

impl RequestEvent {
    /// Maps an administrative status change onto its lifecycle event.
    ///
    /// SUBMITTED is only ever an initial state. SUCCESS and FAILED carry a booking payload
    /// and are reached through the dedicated booking operations.
    pub fn for_target(target: RequestStatus) -> Option<Self> {
        match target {
            RequestStatus::Accepted => Some(Self::Accept),
            RequestStatus::Booking => Some(Self::StartBooking),
            RequestStatus::InfoNeeded => Some(Self::RequestInfo),
            RequestStatus::Cancelled => Some(Self::Cancel),
            RequestStatus::Closed => Some(Self::Close),
            RequestStatus::Submitted | RequestStatus::Success | RequestStatus::Failed => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub from: RequestStatus,
    pub to: RequestStatus,
    pub event: RequestEvent,
}
