use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use rust_decimal::Decimal;
use thiserror::Error;

use tripdesk_core::domain::reimbursement::{
    Reimbursement, ReimbursementCategory, ReimbursementClaim, ReimbursementId,
    ReimbursementStatus, Resolution,
};
use tripdesk_core::domain::request::{
    BookingConfirmation, CabinClass, CarRentalDetails, CharterDetails, FlightDetails,
    HotelDetails, OtherDetails, RequestDetails, RequestId, RequestStatus, Scenario,
    TravelRequest, TripBasics, TripType, Urgency,
};
use tripdesk_core::domain::user::{IdentityDocument, Role, Traveler, User, UserId, UserProfile};
use tripdesk_core::errors::DomainError;

use crate::connection::DbPool;
use crate::repositories::{
    ProfileRepository, ReimbursementRepository, RepositoryError, SqlProfileRepository,
    SqlReimbursementRepository, SqlTravelRequestRepository, SqlUserRepository,
    TravelRequestRepository, UserRepository,
};

#[derive(Debug, Error)]
pub enum SeedError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error("seed entity `{id}` is invalid: {source}")]
    Domain { id: &'static str, source: DomainError },
}

#[derive(Clone, Copy, Debug)]
struct SeedEmployee {
    id: &'static str,
    name: &'static str,
    email: &'static str,
}

const WANG: SeedEmployee =
    SeedEmployee { id: "u-demo-wang", name: "王员工", email: "wang@tripdesk.demo" };
const LI: SeedEmployee = SeedEmployee { id: "u-demo-li", name: "李员工", email: "li@tripdesk.demo" };

#[derive(Clone, Copy, Debug)]
enum SeedScenario {
    Flight { to: &'static str },
    Hotel { city: &'static str },
    CarRental,
    Charter,
    Other,
}

#[derive(Clone, Copy, Debug)]
struct SeedRequest {
    id: &'static str,
    owner: SeedEmployee,
    purpose: &'static str,
    scenario: SeedScenario,
    submitted: (u32, u32),
    status: RequestStatus,
    price: Option<i64>,
    description: &'static str,
}

/// Requests in every reachable lifecycle state, spread over two months.
const SEED_REQUESTS: &[SeedRequest] = &[
    SeedRequest {
        id: "REQ-DEMO-001",
        owner: WANG,
        purpose: "季度客户拜访",
        scenario: SeedScenario::Flight { to: "上海" },
        submitted: (4, 8),
        status: RequestStatus::Success,
        price: Some(1200),
        description: "Flight booked in April",
    },
    SeedRequest {
        id: "REQ-DEMO-002",
        owner: WANG,
        purpose: "上海展会住宿",
        scenario: SeedScenario::Hotel { city: "上海" },
        submitted: (5, 6),
        status: RequestStatus::Accepted,
        price: None,
        description: "Hotel accepted by an admin",
    },
    SeedRequest {
        id: "REQ-DEMO-003",
        owner: WANG,
        purpose: "深圳项目交付",
        scenario: SeedScenario::Flight { to: "深圳" },
        submitted: (5, 10),
        status: RequestStatus::Submitted,
        price: None,
        description: "Fresh flight request",
    },
    SeedRequest {
        id: "REQ-DEMO-004",
        owner: LI,
        purpose: "杭州供应商审核",
        scenario: SeedScenario::CarRental,
        submitted: (5, 12),
        status: RequestStatus::Failed,
        price: None,
        description: "Car rental that could not be booked",
    },
    SeedRequest {
        id: "REQ-DEMO-005",
        owner: LI,
        purpose: "团队年会",
        scenario: SeedScenario::Charter,
        submitted: (5, 14),
        status: RequestStatus::InfoNeeded,
        price: None,
        description: "Charter awaiting more information",
    },
    SeedRequest {
        id: "REQ-DEMO-006",
        owner: LI,
        purpose: "签证办理",
        scenario: SeedScenario::Other,
        submitted: (5, 15),
        status: RequestStatus::Cancelled,
        price: None,
        description: "Cancelled free-form request",
    },
    SeedRequest {
        id: "REQ-DEMO-007",
        owner: LI,
        purpose: "上海技术峰会",
        scenario: SeedScenario::Flight { to: "上海" },
        submitted: (5, 18),
        status: RequestStatus::Success,
        price: Some(2350),
        description: "Flight booked in May",
    },
];

#[derive(Clone, Copy, Debug)]
struct SeedClaim {
    id: &'static str,
    owner: SeedEmployee,
    amount_cents: i64,
    category: ReimbursementCategory,
    description: &'static str,
    day: u32,
    status: ReimbursementStatus,
}

const SEED_CLAIMS: &[SeedClaim] = &[
    SeedClaim {
        id: "RMB-DEMO-001",
        owner: WANG,
        amount_cents: 8_850,
        category: ReimbursementCategory::Meals,
        description: "客户午餐",
        day: 9,
        status: ReimbursementStatus::Pending,
    },
    SeedClaim {
        id: "RMB-DEMO-002",
        owner: WANG,
        amount_cents: 35_600,
        category: ReimbursementCategory::Transport,
        description: "机场往返出租车",
        day: 11,
        status: ReimbursementStatus::Approved,
    },
    SeedClaim {
        id: "RMB-DEMO-003",
        owner: LI,
        amount_cents: 68_000,
        category: ReimbursementCategory::Accommodation,
        description: "杭州酒店两晚",
        day: 13,
        status: ReimbursementStatus::Rejected,
    },
];

const REJECTION_REASON: &str = "凭证模糊";
const FAILURE_REASON: &str = "目标日期车型无库存";

/// Demo dataset for local runs: two employees, requests in every lifecycle state and
/// reimbursements in every resolution state. Loading is idempotent.
pub struct DemoSeedDataset;

impl DemoSeedDataset {
    pub async fn load(pool: &DbPool, admin: &User) -> Result<SeedResult, SeedError> {
        let users = SqlUserRepository::new(pool.clone());
        let profiles = SqlProfileRepository::new(pool.clone());
        let requests = SqlTravelRequestRepository::new(pool.clone());
        let claims = SqlReimbursementRepository::new(pool.clone());
        let mut result = SeedResult::default();

        if users.find_by_id(&admin.id).await?.is_none() {
            users.insert(admin.clone()).await?;
            result.users_created += 1;
        }
        for employee in [WANG, LI] {
            let user = employee.user();
            if users.find_by_id(&user.id).await?.is_none() {
                users.insert(user.clone()).await?;
                result.users_created += 1;
            }
            if profiles.get(&user.id).await?.is_none() {
                profiles.put(&user.id, employee.profile()).await?;
            }
        }

        for seed in SEED_REQUESTS {
            if requests.find_by_id(&RequestId(seed.id.to_owned())).await?.is_some() {
                result.skipped += 1;
                continue;
            }
            let request =
                seed.build(admin).map_err(|source| SeedError::Domain { id: seed.id, source })?;
            requests.insert(request).await?;
            result.requests_created += 1;
        }

        for seed in SEED_CLAIMS {
            if claims.find_by_id(&ReimbursementId(seed.id.to_owned())).await?.is_some() {
                result.skipped += 1;
                continue;
            }
            let claim =
                seed.build(admin).map_err(|source| SeedError::Domain { id: seed.id, source })?;
            claims.insert(claim).await?;
            result.reimbursements_created += 1;
        }

        Ok(result)
    }

    /// Checks every seeded entity exists in its expected state.
    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let users = SqlUserRepository::new(pool.clone());
        let requests = SqlTravelRequestRepository::new(pool.clone());
        let claims = SqlReimbursementRepository::new(pool.clone());
        let mut checks = Vec::new();

        for employee in [WANG, LI] {
            let found = users.find_by_email(employee.email).await?;
            checks.push((employee.id, found.is_some_and(|user| user.id.0 == employee.id)));
        }

        for seed in SEED_REQUESTS {
            let found = requests.find_by_id(&RequestId(seed.id.to_owned())).await?;
            let ok = found.is_some_and(|request| {
                request.status == seed.status
                    && request.user_id.0 == seed.owner.id
                    && request.spend() == seed.price.map(|price| Decimal::new(price, 0))
            });
            checks.push((seed.id, ok));
        }

        for seed in SEED_CLAIMS {
            let found = claims.find_by_id(&ReimbursementId(seed.id.to_owned())).await?;
            checks.push((seed.id, found.is_some_and(|claim| claim.status == seed.status)));
        }

        let all_present = checks.iter().all(|(_, ok)| *ok);
        Ok(VerificationResult { all_present, checks })
    }

    /// Removes seeded requests and claims. Accounts are kept.
    pub async fn clean(pool: &DbPool) -> Result<(), RepositoryError> {
        let mut tx = pool.begin().await?;

        for seed in SEED_REQUESTS {
            sqlx::query("DELETE FROM travel_request WHERE id = ?")
                .bind(seed.id)
                .execute(&mut *tx)
                .await?;
        }
        for seed in SEED_CLAIMS {
            sqlx::query("DELETE FROM reimbursement WHERE id = ?")
                .bind(seed.id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    pub fn descriptions() -> Vec<(&'static str, &'static str)> {
        SEED_REQUESTS.iter().map(|seed| (seed.id, seed.description)).collect()
    }
}

impl SeedEmployee {
    fn user(&self) -> User {
        User {
            id: UserId(self.id.to_owned()),
            role: Role::User,
            name: self.name.to_owned(),
            email: self.email.to_owned(),
        }
    }

    fn traveler(&self) -> Traveler {
        Traveler {
            name: self.name.to_owned(),
            id_type: "身份证".to_owned(),
            id_number: "110101199001010011".to_owned(),
            phone: "13800000000".to_owned(),
        }
    }

    fn profile(&self) -> UserProfile {
        let mut profile = UserProfile::for_new_user(&self.user());
        profile.phone = Some("13800000000".to_owned());
        profile.documents.push(IdentityDocument {
            doc_type: "身份证".to_owned(),
            number: "110101199001010011".to_owned(),
            expiry_date: None,
        });
        profile.contacts.push(self.traveler());
        profile
    }
}

fn seed_time(month: u32, day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, month, day, hour, 0, 0).single().unwrap_or_else(Utc::now)
}

fn seed_date(month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, month, day).unwrap_or_default()
}

impl SeedRequest {
    fn details(&self) -> RequestDetails {
        let (month, day) = self.submitted;
        let travel_day = seed_date(month, day + 7);
        let basics = TripBasics {
            purpose: self.purpose.to_owned(),
            urgency: if matches!(self.status, RequestStatus::InfoNeeded) {
                Urgency::Urgent
            } else {
                Urgency::Normal
            },
            travelers: vec![self.owner.traveler()],
            ..TripBasics::default()
        };

        let scenario = match self.scenario {
            SeedScenario::Flight { to } => demo_flight_on(self.purpose, to, travel_day).scenario,
            SeedScenario::Hotel { city } => Scenario::Hotel(HotelDetails {
                city: city.to_owned(),
                check_in_date: travel_day,
                check_out_date: travel_day + chrono::Duration::days(2),
                room_count: 1,
                guest_count: 1,
                room_type: "大床房".to_owned(),
                star_rating: Some("4 Star".to_owned()),
                location_preference: Some("靠近会展中心".to_owned()),
            }),
            SeedScenario::CarRental => Scenario::CarRental(CarRentalDetails {
                pickup_city: "杭州".to_owned(),
                pickup_date: travel_day,
                return_date: travel_day + chrono::Duration::days(3),
                car_type: "SUV".to_owned(),
                driving_license: "330100199001010022".to_owned(),
            }),
            SeedScenario::Charter => Scenario::Charter(CharterDetails {
                city: "苏州".to_owned(),
                usage_date: travel_day,
                start_time: NaiveTime::from_hms_opt(8, 0, 0).unwrap_or_default(),
                end_time: NaiveTime::from_hms_opt(18, 0, 0).unwrap_or_default(),
                passenger_count: 30,
                route_description: "酒店 - 会场 - 酒店".to_owned(),
                car_type: "大巴".to_owned(),
            }),
            SeedScenario::Other => Scenario::Other(OtherDetails {
                description: "办理商务签证".to_owned(),
                requirements: None,
            }),
        };

        RequestDetails { basics, scenario }
    }

    fn build(&self, admin: &User) -> Result<TravelRequest, DomainError> {
        let (month, day) = self.submitted;
        let owner = self.owner.user();
        let mut request = TravelRequest::submit(
            RequestId(self.id.to_owned()),
            &owner,
            self.details(),
            seed_time(month, day, 9),
        )?;
        let handled = seed_time(month, day, 14);

        match self.status {
            RequestStatus::Submitted => {}
            RequestStatus::Cancelled | RequestStatus::Closed => {
                request.change_status(self.status, admin, None, handled)?;
            }
            RequestStatus::Accepted => {
                request.change_status(RequestStatus::Accepted, admin, None, handled)?;
            }
            RequestStatus::InfoNeeded => {
                request.change_status(RequestStatus::Accepted, admin, None, handled)?;
                request.change_status(
                    RequestStatus::InfoNeeded,
                    admin,
                    Some("请补充乘车人名单".to_owned()),
                    handled,
                )?;
            }
            RequestStatus::Booking | RequestStatus::Success | RequestStatus::Failed => {
                request.change_status(RequestStatus::Accepted, admin, None, handled)?;
                request.change_status(RequestStatus::Booking, admin, None, handled)?;
                match (self.status, self.price) {
                    (RequestStatus::Success, Some(price)) => {
                        request.complete_booking(
                            admin,
                            BookingConfirmation {
                                platform: "Ctrip".to_owned(),
                                order_id: format!("CT-{}", self.id),
                                price: Decimal::new(price, 0),
                                currency: Some("CNY".to_owned()),
                                files: vec![format!("{}-itinerary.pdf", self.id)],
                            },
                            handled,
                        )?;
                    }
                    (RequestStatus::Failed, _) => {
                        request.fail_booking(admin, FAILURE_REASON, handled)?;
                    }
                    _ => {}
                }
            }
        }

        Ok(request)
    }
}

impl SeedClaim {
    fn build(&self, admin: &User) -> Result<Reimbursement, DomainError> {
        let mut claim = Reimbursement::submit(
            ReimbursementId(self.id.to_owned()),
            &self.owner.user(),
            ReimbursementClaim {
                amount: Decimal::new(self.amount_cents, 2),
                category: self.category,
                description: self.description.to_owned(),
                date: seed_date(5, self.day),
                attachments: vec![format!("{}-receipt.jpg", self.id)],
            },
            seed_time(5, self.day + 1, 10),
        )?;

        match self.status {
            ReimbursementStatus::Pending => {}
            ReimbursementStatus::Approved => claim.resolve(Resolution::Approve, admin)?,
            ReimbursementStatus::Rejected => claim.resolve(
                Resolution::Reject { reason: REJECTION_REASON.to_owned() },
                admin,
            )?,
        }

        Ok(claim)
    }
}

/// One-way economy flight from Beijing, a week out from 2024-03-01.
pub fn demo_flight(purpose: &str, destination: &str) -> RequestDetails {
    demo_flight_on(purpose, destination, seed_date(3, 8))
}

fn demo_flight_on(purpose: &str, destination: &str, departure: NaiveDate) -> RequestDetails {
    RequestDetails {
        basics: TripBasics {
            purpose: purpose.to_owned(),
            urgency: Urgency::Normal,
            budget_cap: Some(Decimal::new(1500, 0)),
            currency: Some("CNY".to_owned()),
            travelers: vec![WANG.traveler()],
            ..TripBasics::default()
        },
        scenario: Scenario::Flight(FlightDetails {
            trip_type: TripType::OneWay,
            departure_city: "北京".to_owned(),
            arrival_city: destination.to_owned(),
            departure_date: departure,
            return_date: None,
            preferred_time: Some("上午".to_owned()),
            cabin_class: CabinClass::Economy,
            airline_preference: None,
            flight_number: None,
        }),
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SeedResult {
    pub users_created: usize,
    pub requests_created: usize,
    pub reimbursements_created: usize,
    pub skipped: usize,
}

#[derive(Debug)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}
