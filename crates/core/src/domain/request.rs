use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rand::Rng;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::user::{Role, Traveler, User, UserId};
use crate::errors::DomainError;
use crate::flows::{FlowEngine, FlowTransitionError, RequestEvent, TransitionOutcome};

pub const ACTION_CREATED: &str = "CREATED";
pub const ACTION_BOOKING_COMPLETED: &str = "BOOKING_COMPLETED";
pub const ACTION_BOOKING_FAILED: &str = "BOOKING_FAILED";
pub const ACTION_FILES_UPDATED: &str = "FILES_UPDATED";
const FILES_UPDATED_DETAILS: &str = "管理员修改了预定附件";

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestId(pub String);

impl RequestId {
    /// `REQ-<YYYYMMDD>-<rand>`, dated by the caller's local calendar day.
    pub fn generate<R: Rng + ?Sized>(day: NaiveDate, rng: &mut R) -> Self {
        Self(format!("REQ-{}-{:04}", day.format("%Y%m%d"), rng.gen_range(0..10_000)))
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestType {
    Flight,
    Hotel,
    CarRental,
    Charter,
    Other,
}

impl RequestType {
    pub const ALL: [Self; 5] =
        [Self::Flight, Self::Hotel, Self::CarRental, Self::Charter, Self::Other];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Flight => "FLIGHT",
            Self::Hotel => "HOTEL",
            Self::CarRental => "CAR_RENTAL",
            Self::Charter => "CHARTER",
            Self::Other => "OTHER",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == raw)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Flight => "机票",
            Self::Hotel => "酒店",
            Self::CarRental => "租车",
            Self::Charter => "包车",
            Self::Other => "其他/自由需求",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestStatus {
    Submitted,
    Accepted,
    InfoNeeded,
    Booking,
    Success,
    Failed,
    Cancelled,
    Closed,
}

impl RequestStatus {
    pub const ALL: [Self; 8] = [
        Self::Submitted,
        Self::Accepted,
        Self::InfoNeeded,
        Self::Booking,
        Self::Success,
        Self::Failed,
        Self::Cancelled,
        Self::Closed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Submitted => "SUBMITTED",
            Self::Accepted => "ACCEPTED",
            Self::InfoNeeded => "INFO_NEEDED",
            Self::Booking => "BOOKING",
            Self::Success => "SUCCESS",
            Self::Failed => "FAILED",
            Self::Cancelled => "CANCELLED",
            Self::Closed => "CLOSED",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|status| status.as_str() == raw)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Submitted => "待受理",
            Self::Accepted => "已受理",
            Self::InfoNeeded => "待补充信息",
            Self::Booking => "预定中",
            Self::Success => "预定成功",
            Self::Failed => "预定失败",
            Self::Cancelled => "已取消",
            Self::Closed => "已关闭",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Urgency {
    #[default]
    Normal,
    Urgent,
}

impl Urgency {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Normal => "普通",
            Self::Urgent => "加急",
        }
    }
}

/// Fields shared by every request scenario.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TripBasics {
    pub purpose: String,
    pub urgency: Urgency,
    pub budget_cap: Option<Decimal>,
    pub currency: Option<String>,
    pub cost_center: Option<String>,
    pub notes: Option<String>,
    pub travelers: Vec<Traveler>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TripType {
    OneWay,
    RoundTrip,
    MultiCity,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CabinClass {
    Economy,
    Business,
    First,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FlightDetails {
    pub trip_type: TripType,
    pub departure_city: String,
    pub arrival_city: String,
    pub departure_date: NaiveDate,
    pub return_date: Option<NaiveDate>,
    pub preferred_time: Option<String>,
    pub cabin_class: CabinClass,
    pub airline_preference: Option<String>,
    pub flight_number: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HotelDetails {
    pub city: String,
    pub check_in_date: NaiveDate,
    pub check_out_date: NaiveDate,
    pub room_count: u32,
    pub guest_count: u32,
    pub room_type: String,
    pub star_rating: Option<String>,
    pub location_preference: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CarRentalDetails {
    pub pickup_city: String,
    pub pickup_date: NaiveDate,
    pub return_date: NaiveDate,
    pub car_type: String,
    pub driving_license: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CharterDetails {
    pub city: String,
    pub usage_date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub passenger_count: u32,
    pub route_description: String,
    pub car_type: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OtherDetails {
    pub description: String,
    pub requirements: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Scenario {
    Flight(FlightDetails),
    Hotel(HotelDetails),
    CarRental(CarRentalDetails),
    Charter(CharterDetails),
    Other(OtherDetails),
}

impl Scenario {
    pub fn request_type(&self) -> RequestType {
        match self {
            Self::Flight(_) => RequestType::Flight,
            Self::Hotel(_) => RequestType::Hotel,
            Self::CarRental(_) => RequestType::CarRental,
            Self::Charter(_) => RequestType::Charter,
            Self::Other(_) => RequestType::Other,
        }
    }

    fn validate(&self) -> Result<(), DomainError> {
        match self {
            Self::Flight(flight) => {
                require("departure_city", &flight.departure_city)?;
                require("arrival_city", &flight.arrival_city)?;
                if flight.trip_type == TripType::RoundTrip && flight.return_date.is_none() {
                    return Err(DomainError::Validation(
                        "round trip flights require a return_date".to_owned(),
                    ));
                }
                Ok(())
            }
            Self::Hotel(hotel) => {
                require("city", &hotel.city)?;
                if hotel.check_out_date <= hotel.check_in_date {
                    return Err(DomainError::Validation(
                        "check_out_date must be after check_in_date".to_owned(),
                    ));
                }
                Ok(())
            }
            Self::CarRental(rental) => {
                require("pickup_city", &rental.pickup_city)?;
                require("driving_license", &rental.driving_license)
            }
            Self::Charter(charter) => {
                require("city", &charter.city)?;
                require("route_description", &charter.route_description)
            }
            Self::Other(other) => require("description", &other.description),
        }
    }
}

/// Scenario payload plus the common fields. The request type is read off the scenario tag.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RequestDetails {
    pub basics: TripBasics,
    pub scenario: Scenario,
}

impl RequestDetails {
    pub fn request_type(&self) -> RequestType {
        self.scenario.request_type()
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        require("purpose", &self.basics.purpose)?;
        if let Some(budget) = self.basics.budget_cap {
            if budget.is_sign_negative() {
                return Err(DomainError::Validation("budget_cap must not be negative".to_owned()));
            }
        }
        for (position, traveler) in self.basics.travelers.iter().enumerate() {
            traveler.validate(position)?;
        }
        self.scenario.validate()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: String,
    pub author: String,
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// One entry of a request's append-only history.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: String,
    pub action: String,
    pub actor: String,
    pub timestamp: DateTime<Utc>,
    pub details: Option<String>,
}

impl AuditLogEntry {
    fn new(action: impl Into<String>, actor: &User, at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            action: action.into(),
            actor: actor.name.clone(),
            timestamp: at,
            details: None,
        }
    }

    fn with_details(mut self, details: Option<String>) -> Self {
        self.details = details;
        self
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BookingConfirmation {
    pub platform: String,
    pub order_id: String,
    pub price: Decimal,
    pub currency: Option<String>,
    pub files: Vec<String>,
}

impl BookingConfirmation {
    pub fn validate(&self) -> Result<(), DomainError> {
        require("platform", &self.platform)?;
        require("order_id", &self.order_id)?;
        if self.price.is_sign_negative() {
            return Err(DomainError::Validation("price must not be negative".to_owned()));
        }
        Ok(())
    }
}

/// Terminal booking outcome. A confirmation exists only on SUCCESS and a
/// failure reason only on FAILED.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingResult {
    Confirmed(BookingConfirmation),
    Failed { failure_reason: String },
}

impl BookingResult {
    pub fn price(&self) -> Option<Decimal> {
        match self {
            Self::Confirmed(confirmation) => Some(confirmation.price),
            Self::Failed { .. } => None,
        }
    }

    pub fn files(&self) -> &[String] {
        match self {
            Self::Confirmed(confirmation) => &confirmation.files,
            Self::Failed { .. } => &[],
        }
    }

    pub fn failure_reason(&self) -> Option<&str> {
        match self {
            Self::Confirmed(_) => None,
            Self::Failed { failure_reason } => Some(failure_reason),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TravelRequest {
    pub id: RequestId,
    pub user_id: UserId,
    pub user_name: String,
    pub request_type: RequestType,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub data: RequestDetails,
    pub assigned_to: Option<UserId>,
    pub booking_result: Option<BookingResult>,
    pub comments: Vec<Comment>,
    pub history: Vec<AuditLogEntry>,
    pub version: u32,
}

impl TravelRequest {
    pub fn submit(
        id: RequestId,
        owner: &User,
        data: RequestDetails,
        now: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        data.validate()?;

        Ok(Self {
            id,
            user_id: owner.id.clone(),
            user_name: owner.name.clone(),
            request_type: data.request_type(),
            status: FlowEngine::default().initial_state(),
            created_at: now,
            updated_at: now,
            data,
            assigned_to: None,
            booking_result: None,
            comments: Vec::new(),
            history: vec![AuditLogEntry::new(ACTION_CREATED, owner, now)],
            version: 0,
        })
    }

    pub fn purpose(&self) -> &str {
        &self.data.basics.purpose
    }

    pub fn urgency(&self) -> Urgency {
        self.data.basics.urgency
    }

    /// Booking price, present only for SUCCESS requests.
    pub fn spend(&self) -> Option<Decimal> {
        if self.status != RequestStatus::Success {
            return None;
        }
        self.booking_result.as_ref().and_then(BookingResult::price)
    }

    /// Administrative status change. Booking outcomes carry a payload and go through
    /// [`Self::complete_booking`] / [`Self::fail_booking`] instead.
    pub fn change_status(
        &mut self,
        target: RequestStatus,
        actor: &User,
        note: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<TransitionOutcome, DomainError> {
        let event = RequestEvent::for_target(target).ok_or(DomainError::InvalidTransition {
            from: self.status,
            to: target,
        })?;
        let outcome = self.advance(&event, target)?;

        if target == RequestStatus::Accepted && actor.is_admin() && self.assigned_to.is_none() {
            self.assigned_to = Some(actor.id.clone());
        }

        self.updated_at = now;
        self.history.push(
            AuditLogEntry::new(format!("STATUS_CHANGE_TO_{}", target.as_str()), actor, now)
                .with_details(note.filter(|value| !value.trim().is_empty())),
        );
        Ok(outcome)
    }

    pub fn complete_booking(
        &mut self,
        actor: &User,
        confirmation: BookingConfirmation,
        now: DateTime<Utc>,
    ) -> Result<TransitionOutcome, DomainError> {
        confirmation.validate()?;
        let outcome = self.advance(&RequestEvent::CompleteBooking, RequestStatus::Success)?;

        self.booking_result = Some(BookingResult::Confirmed(confirmation));
        self.updated_at = now;
        self.history.push(AuditLogEntry::new(ACTION_BOOKING_COMPLETED, actor, now));
        Ok(outcome)
    }

    pub fn fail_booking(
        &mut self,
        actor: &User,
        reason: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<TransitionOutcome, DomainError> {
        let reason = reason.into();
        require("failure reason", &reason)?;
        let outcome = self.advance(&RequestEvent::FailBooking, RequestStatus::Failed)?;

        self.booking_result = Some(BookingResult::Failed { failure_reason: reason.clone() });
        self.updated_at = now;
        self.history.push(
            AuditLogEntry::new(ACTION_BOOKING_FAILED, actor, now).with_details(Some(reason)),
        );
        Ok(outcome)
    }

    /// Amends the attachments of a confirmed booking without a status change.
    pub fn replace_booking_files(
        &mut self,
        actor: &User,
        files: Vec<String>,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        let Some(BookingResult::Confirmed(confirmation)) = self.booking_result.as_mut() else {
            return Err(DomainError::NoBookingResult { id: self.id.clone() });
        };

        confirmation.files = files;
        self.updated_at = now;
        self.history.push(
            AuditLogEntry::new(ACTION_FILES_UPDATED, actor, now)
                .with_details(Some(FILES_UPDATED_DETAILS.to_owned())),
        );
        Ok(())
    }

    pub fn add_comment(
        &mut self,
        actor: &User,
        content: &str,
        now: DateTime<Utc>,
    ) -> Result<Comment, DomainError> {
        let content = content.trim();
        if content.is_empty() {
            return Err(DomainError::Validation("comment text must not be empty".to_owned()));
        }

        let comment = Comment {
            id: Uuid::new_v4().to_string(),
            author: actor.name.clone(),
            role: actor.role,
            content: content.to_owned(),
            created_at: now,
        };
        self.comments.push(comment.clone());
        Ok(comment)
    }

    fn advance(
        &mut self,
        event: &RequestEvent,
        target: RequestStatus,
    ) -> Result<TransitionOutcome, DomainError> {
        let outcome = FlowEngine::default().apply(&self.status, event).map_err(|error| match error {
            FlowTransitionError::InvalidTransition { state, .. } => {
                DomainError::InvalidTransition { from: state, to: target }
            }
        })?;
        self.status = outcome.to;
        Ok(outcome)
    }
}

fn require(field: &str, value: &str) -> Result<(), DomainError> {
    if value.trim().is_empty() {
        return Err(DomainError::Validation(format!("{field} is required")));
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use chrono::{NaiveDate, TimeZone, Utc};
    use rand::{rngs::StdRng, SeedableRng};
    use rust_decimal::Decimal;

    use super::{
        BookingConfirmation, BookingResult, CabinClass, FlightDetails, OtherDetails,
        RequestDetails, RequestId, RequestStatus, RequestType, Scenario, TravelRequest,
        TripBasics, TripType, Urgency,
    };
    use crate::domain::user::{Traveler, User};
    use crate::errors::DomainError;

    pub(crate) fn flight_details(purpose: &str) -> RequestDetails {
        RequestDetails {
            basics: TripBasics {
                purpose: purpose.to_owned(),
                urgency: Urgency::Normal,
                budget_cap: Some(Decimal::new(1500, 0)),
                currency: Some("CNY".to_owned()),
                travelers: vec![Traveler {
                    name: "王员工".to_owned(),
                    id_type: "身份证".to_owned(),
                    id_number: "110101199001010011".to_owned(),
                    phone: "13800000000".to_owned(),
                }],
                ..TripBasics::default()
            },
            scenario: Scenario::Flight(FlightDetails {
                trip_type: TripType::OneWay,
                departure_city: "北京".to_owned(),
                arrival_city: "上海".to_owned(),
                departure_date: NaiveDate::from_ymd_opt(2024, 3, 1).expect("valid date"),
                return_date: None,
                preferred_time: None,
                cabin_class: CabinClass::Economy,
                airline_preference: None,
                flight_number: None,
            }),
        }
    }

    fn submitted() -> (TravelRequest, User, User) {
        let employee = User::new_employee("王员工", "user@corp.com");
        let admin = User::admin("admin");
        let request = TravelRequest::submit(
            RequestId("REQ-20240301-0001".to_owned()),
            &employee,
            flight_details("客户拜访"),
            Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).single().expect("valid timestamp"),
        )
        .expect("submit");
        (request, employee, admin)
    }

    fn confirmation(price: i64) -> BookingConfirmation {
        BookingConfirmation {
            platform: "Ctrip".to_owned(),
            order_id: "X1".to_owned(),
            price: Decimal::new(price, 0),
            currency: None,
            files: Vec::new(),
        }
    }

    #[test]
    fn request_ids_follow_dated_format() {
        let mut rng = StdRng::seed_from_u64(7);
        let id = RequestId::generate(
            NaiveDate::from_ymd_opt(2024, 1, 15).expect("valid date"),
            &mut rng,
        );

        assert!(id.0.starts_with("REQ-20240115-"));
        assert_eq!(id.0.len(), "REQ-20240115-0000".len());
    }

    #[test]
    fn submission_starts_with_single_created_entry() {
        let (request, employee, _) = submitted();

        assert_eq!(request.status, RequestStatus::Submitted);
        assert_eq!(request.request_type, RequestType::Flight);
        assert_eq!(request.history.len(), 1);
        assert_eq!(request.history[0].action, "CREATED");
        assert_eq!(request.history[0].actor, employee.name);
        assert!(request.comments.is_empty());
        assert!(request.assigned_to.is_none());
    }

    #[test]
    fn full_booking_path_records_four_history_entries() {
        let (mut request, _, admin) = submitted();
        let now = Utc::now();

        request.change_status(RequestStatus::Accepted, &admin, None, now).expect("accept");
        request.change_status(RequestStatus::Booking, &admin, None, now).expect("start booking");
        request.complete_booking(&admin, confirmation(1200), now).expect("complete");

        assert_eq!(request.status, RequestStatus::Success);
        assert_eq!(request.spend(), Some(Decimal::new(1200, 0)));
        assert_eq!(request.history.len(), 4);
        assert_eq!(request.history[1].action, "STATUS_CHANGE_TO_ACCEPTED");
        assert_eq!(request.history[3].action, "BOOKING_COMPLETED");
        assert_eq!(request.assigned_to, Some(admin.id));
    }

    #[test]
    fn first_accepting_admin_keeps_assignment() {
        let (mut request, _, admin) = submitted();
        let mut second_admin = User::admin("ops");
        second_admin.id = crate::domain::user::UserId("admin-2".to_owned());
        let now = Utc::now();

        request.change_status(RequestStatus::Accepted, &admin, None, now).expect("accept");
        request.change_status(RequestStatus::InfoNeeded, &admin, None, now).expect("info");
        request.change_status(RequestStatus::Accepted, &second_admin, None, now).expect("re-accept");

        assert_eq!(request.assigned_to, Some(admin.id));
    }

    #[test]
    fn booking_cannot_complete_before_booking_state() {
        let (mut request, _, admin) = submitted();

        let error = request
            .complete_booking(&admin, confirmation(800), Utc::now())
            .expect_err("submitted request cannot complete booking");

        assert_eq!(
            error,
            DomainError::InvalidTransition {
                from: RequestStatus::Submitted,
                to: RequestStatus::Success
            }
        );
        assert!(request.booking_result.is_none());
        assert_eq!(request.history.len(), 1);
    }

    #[test]
    fn status_change_cannot_target_booking_outcomes() {
        let (mut request, _, admin) = submitted();
        let now = Utc::now();
        request.change_status(RequestStatus::Accepted, &admin, None, now).expect("accept");
        request.change_status(RequestStatus::Booking, &admin, None, now).expect("booking");

        let error = request
            .change_status(RequestStatus::Success, &admin, None, now)
            .expect_err("success needs a booking payload");

        assert!(matches!(error, DomainError::InvalidTransition { .. }));
        assert_eq!(request.status, RequestStatus::Booking);
    }

    #[test]
    fn failed_booking_stores_reason_in_result_and_history() {
        let (mut request, _, admin) = submitted();
        let now = Utc::now();
        request.change_status(RequestStatus::Accepted, &admin, None, now).expect("accept");
        request.change_status(RequestStatus::Booking, &admin, None, now).expect("booking");

        request.fail_booking(&admin, "航班已满", now).expect("fail");

        assert_eq!(request.status, RequestStatus::Failed);
        let result = request.booking_result.as_ref().expect("result");
        assert_eq!(result.failure_reason(), Some("航班已满"));
        assert!(result.files().is_empty());
        assert_eq!(request.history.last().and_then(|e| e.details.as_deref()), Some("航班已满"));
        assert_eq!(request.spend(), None);
    }

    #[test]
    fn booking_files_require_confirmed_result() {
        let (mut request, _, admin) = submitted();

        let error = request
            .replace_booking_files(&admin, vec!["ticket.pdf".to_owned()], Utc::now())
            .expect_err("no booking result yet");
        assert!(matches!(error, DomainError::NoBookingResult { .. }));

        let now = Utc::now();
        request.change_status(RequestStatus::Accepted, &admin, None, now).expect("accept");
        request.change_status(RequestStatus::Booking, &admin, None, now).expect("booking");
        request.complete_booking(&admin, confirmation(900), now).expect("complete");
        request
            .replace_booking_files(&admin, vec!["itinerary.pdf".to_owned()], now)
            .expect("amend files");

        assert_eq!(request.status, RequestStatus::Success);
        assert!(matches!(
            request.booking_result,
            Some(BookingResult::Confirmed(ref c)) if c.files == vec!["itinerary.pdf".to_owned()]
        ));
        assert_eq!(request.history.last().map(|e| e.action.as_str()), Some("FILES_UPDATED"));
    }

    #[test]
    fn blank_comments_are_rejected() {
        let (mut request, employee, _) = submitted();

        let error = request.add_comment(&employee, "   ", Utc::now()).expect_err("blank");
        assert!(matches!(error, DomainError::Validation(_)));

        let comment = request.add_comment(&employee, " 请尽快 ", Utc::now()).expect("comment");
        assert_eq!(comment.content, "请尽快");
        assert_eq!(request.comments.len(), 1);
        assert_eq!(request.history.len(), 1, "comments do not touch the history");
    }

    #[test]
    fn incomplete_travelers_block_submission() {
        let employee = User::new_employee("王员工", "user@corp.com");
        let mut details = flight_details("培训");
        details.basics.travelers[0].phone.clear();

        let error = TravelRequest::submit(
            RequestId("REQ-1".to_owned()),
            &employee,
            details,
            Utc::now(),
        )
        .expect_err("missing phone");

        assert!(matches!(error, DomainError::Validation(ref message) if message.contains("phone")));
    }

    #[test]
    fn scenario_tag_determines_request_type() {
        let details = RequestDetails {
            basics: TripBasics { purpose: "团建".to_owned(), ..TripBasics::default() },
            scenario: Scenario::Other(OtherDetails {
                description: "安排团建场地".to_owned(),
                requirements: None,
            }),
        };

        let json = serde_json::to_value(&details).expect("serialize");
        assert_eq!(json["scenario"]["type"], "OTHER");
        assert_eq!(details.request_type(), RequestType::Other);
    }
}
