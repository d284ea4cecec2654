pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;
pub mod flows;
pub mod identity;
pub mod pricing;
pub mod query;
pub mod reporting;

pub use domain::reimbursement::{
    Reimbursement, ReimbursementCategory, ReimbursementClaim, ReimbursementId,
    ReimbursementStatus, Resolution,
};
pub use domain::request::{
    AuditLogEntry, BookingConfirmation, BookingResult, Comment, RequestDetails, RequestId,
    RequestStatus, RequestType, Scenario, TravelRequest, TripBasics, Urgency,
};
pub use domain::user::{IdentityDocument, Role, Traveler, User, UserId, UserProfile};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use identity::{IdentityPolicy, LoginRoute, Registration};
pub use pricing::{BudgetEstimate, PriceLookup, PriceLookupError};
pub use query::{DateRange, RequestQuery, SortDirection, SortField, SortSpec, WorkbenchTab};
pub use reporting::{DashboardReport, MonthlyTrend, ReimbursementSummary};
