//! The travel desk service: every user-facing operation over injected repositories.
//!
//! Mutations follow one pattern. Load the entity, apply the pure domain change to a copy and
//! write it back with a compare-and-swap on `version`. A lost race re-reads and re-applies, so
//! the lifecycle guard always runs against the freshest state. Each lifecycle transition attempt
//! records exactly one `flow.*` audit event, written once the outcome is known.

use std::sync::Arc;

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use tripdesk_core::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use tripdesk_core::config::AppConfig;
use tripdesk_core::domain::reimbursement::{
    Reimbursement, ReimbursementClaim, ReimbursementId, ReimbursementStatus,
};
use tripdesk_core::domain::request::{
    BookingConfirmation, Comment, RequestDetails, RequestId, RequestStatus, RequestType, Scenario,
    TravelRequest,
};
use tripdesk_core::domain::user::{User, UserId, UserProfile};
use tripdesk_core::errors::{ApplicationError, DomainError};
use tripdesk_core::flows::{FlowEngine, RequestEvent, TransitionOutcome, TravelRequestFlow};
use tripdesk_core::identity::{IdentityPolicy, LoginRoute, Registration};
use tripdesk_core::pricing::{
    BudgetEstimate, DisabledPriceLookup, FlightSearch, HotelSearch, PriceLookup,
};
use tripdesk_core::query::{
    creator_options, scope_reimbursements, scope_requests, tab_counts, CreatorOption,
    RequestQuery, TabCounts,
};
use tripdesk_core::reporting::{DashboardReport, ReimbursementSummary};
use tripdesk_db::repositories::{
    InMemoryProfileRepository, InMemoryReimbursementRepository, InMemoryTravelRequestRepository,
    InMemoryUserRepository, ProfileRepository, ReimbursementRepository, RepositoryError,
    SqlProfileRepository, SqlReimbursementRepository, SqlTravelRequestRepository,
    SqlUserRepository, TravelRequestRepository, UserRepository, REIMBURSEMENT_ENTITY,
    REQUEST_ENTITY,
};
use tripdesk_db::DbPool;

use crate::telemetry::TracingAuditSink;

/// Attempts per write before a lost race surfaces as `ConcurrentModification`.
pub const MAX_WRITE_ATTEMPTS: usize = 3;

#[derive(Clone)]
pub struct Repositories {
    pub users: Arc<dyn UserRepository>,
    pub profiles: Arc<dyn ProfileRepository>,
    pub requests: Arc<dyn TravelRequestRepository>,
    pub reimbursements: Arc<dyn ReimbursementRepository>,
}

impl Repositories {
    pub fn sql(pool: DbPool) -> Self {
        Self {
            users: Arc::new(SqlUserRepository::new(pool.clone())),
            profiles: Arc::new(SqlProfileRepository::new(pool.clone())),
            requests: Arc::new(SqlTravelRequestRepository::new(pool.clone())),
            reimbursements: Arc::new(SqlReimbursementRepository::new(pool)),
        }
    }

    pub fn in_memory() -> Self {
        Self {
            users: Arc::new(InMemoryUserRepository::default()),
            profiles: Arc::new(InMemoryProfileRepository::default()),
            requests: Arc::new(InMemoryTravelRequestRepository::default()),
            reimbursements: Arc::new(InMemoryReimbursementRepository::default()),
        }
    }
}

/// Operation names used in permission errors.
mod operation {
    pub const UPDATE_STATUS: &str = "update request status";
    pub const COMPLETE_BOOKING: &str = "complete a booking";
    pub const FAIL_BOOKING: &str = "fail a booking";
    pub const UPDATE_BOOKING_FILES: &str = "update booking files";
    pub const DELETE_REQUESTS: &str = "delete requests";
    pub const RESOLVE_REIMBURSEMENT: &str = "resolve a reimbursement";
    pub const COMMENT: &str = "comment on this request";
}

pub struct TravelDesk {
    repos: Repositories,
    identity: IdentityPolicy,
    prices: Arc<dyn PriceLookup>,
    audit: Arc<dyn AuditSink>,
    engine: FlowEngine<TravelRequestFlow>,
    utc_offset: FixedOffset,
    currency: String,
}

impl TravelDesk {
    pub fn new(repos: Repositories, identity: IdentityPolicy, utc_offset: FixedOffset) -> Self {
        Self {
            repos,
            identity,
            prices: Arc::new(DisabledPriceLookup),
            audit: Arc::new(TracingAuditSink),
            engine: FlowEngine::default(),
            utc_offset,
            currency: "CNY".to_owned(),
        }
    }

    pub fn from_config(repos: Repositories, config: &AppConfig) -> Self {
        let mut desk = Self::new(
            repos,
            IdentityPolicy::from_config(&config.identity),
            config.reporting.utc_offset,
        );
        desk.currency = config.pricing.currency.clone();
        desk
    }

    pub fn with_price_lookup(mut self, prices: Arc<dyn PriceLookup>) -> Self {
        self.prices = prices;
        self
    }

    pub fn with_audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub fn identity(&self) -> &IdentityPolicy {
        &self.identity
    }

    pub fn utc_offset(&self) -> FixedOffset {
        self.utc_offset
    }

    // ---- identity -------------------------------------------------------------------------

    /// Makes sure the configured admin account exists. Safe to call repeatedly.
    pub async fn ensure_admin(&self) -> Result<User, ApplicationError> {
        let admin = self.identity.admin_user();
        if let Some(existing) = self.repos.users.find_by_id(&admin.id).await? {
            return Ok(existing);
        }

        self.repos.users.insert(admin.clone()).await?;
        info!(
            event_name = "desk.identity.admin_created",
            correlation_id = "bootstrap",
            user_id = %admin.id,
            "admin account created"
        );
        Ok(admin)
    }

    /// `Ok(None)` means no such user. A wrong admin password looks the same.
    pub async fn login(
        &self,
        identifier: &str,
        password: Option<&str>,
    ) -> Result<Option<User>, ApplicationError> {
        let correlation_id = new_correlation_id();
        let user = match self.identity.route(identifier, password) {
            None => None,
            Some(LoginRoute::Admin) => {
                let admin = self.identity.admin_user();
                Some(self.repos.users.find_by_id(&admin.id).await?.unwrap_or(admin))
            }
            Some(LoginRoute::Email(email)) => self.repos.users.find_by_email(&email).await?,
        };

        let (event_type, outcome) = match &user {
            Some(_) => ("identity.login_succeeded", AuditOutcome::Success),
            None => ("identity.login_rejected", AuditOutcome::Rejected),
        };
        self.audit.emit(AuditEvent::new(
            user.as_ref().map(|found| found.id.0.clone()),
            correlation_id.as_str(),
            event_type,
            AuditCategory::Identity,
            identifier.trim(),
            outcome,
        ));
        Ok(user)
    }

    pub async fn register(&self, name: &str, email: &str) -> Result<User, ApplicationError> {
        let correlation_id = new_correlation_id();
        let registration = Registration::parse(name, email)?;
        if self.repos.users.find_by_email(&registration.email).await?.is_some() {
            warn!(
                event_name = "desk.identity.duplicate_email",
                correlation_id = %correlation_id,
                email = %registration.email,
                "registration rejected"
            );
            return Err(ApplicationError::DuplicateEmail(registration.email));
        }

        let (user, profile) = registration.into_account();
        self.repos.users.insert(user.clone()).await?;
        if let Err(error) = self.repos.profiles.put(&user.id, profile).await {
            // Roll the account back so the same email can register again.
            if let Err(cleanup) = self.repos.users.delete(&user.id).await {
                warn!(
                    event_name = "desk.identity.rollback_failed",
                    correlation_id = %correlation_id,
                    user_id = %user.id,
                    error = %cleanup,
                    "account left without a profile"
                );
            }
            return Err(error.into());
        }

        info!(
            event_name = "desk.identity.registered",
            correlation_id = %correlation_id,
            user_id = %user.id,
            "user registered"
        );
        Ok(user)
    }

    /// Missing profiles read as the empty default.
    pub async fn get_user_profile(&self, user_id: &UserId) -> Result<UserProfile, ApplicationError> {
        Ok(self.repos.profiles.get(user_id).await?.unwrap_or_default())
    }

    pub async fn update_user_profile(
        &self,
        user_id: &UserId,
        profile: UserProfile,
    ) -> Result<(), ApplicationError> {
        for (position, contact) in profile.contacts.iter().enumerate() {
            contact.validate(position)?;
        }
        self.repos.profiles.put(user_id, profile).await?;
        info!(
            event_name = "desk.profile.updated",
            correlation_id = %new_correlation_id(),
            user_id = %user_id,
            "profile replaced"
        );
        Ok(())
    }

    // ---- requests: reads ------------------------------------------------------------------

    pub async fn list_requests(&self, actor: &User) -> Result<Vec<TravelRequest>, ApplicationError> {
        let requests = if actor.is_admin() {
            self.repos.requests.list_all().await?
        } else {
            self.repos.requests.list_by_user(&actor.id).await?
        };
        Ok(scope_requests(actor, requests))
    }

    pub async fn get_request(&self, id: &RequestId) -> Result<TravelRequest, ApplicationError> {
        self.repos
            .requests
            .find_by_id(id)
            .await?
            .ok_or_else(|| ApplicationError::not_found(REQUEST_ENTITY, id.0.clone()))
    }

    /// Scoped read: requests owned by someone else are reported as missing.
    pub async fn get_request_for(
        &self,
        actor: &User,
        id: &RequestId,
    ) -> Result<TravelRequest, ApplicationError> {
        let request = self.get_request(id).await?;
        if !actor.can_view(&request.user_id) {
            return Err(ApplicationError::not_found(REQUEST_ENTITY, id.0.clone()));
        }
        Ok(request)
    }

    pub async fn query_requests(
        &self,
        actor: &User,
        query: &RequestQuery,
    ) -> Result<Vec<TravelRequest>, ApplicationError> {
        let scoped = self.list_requests(actor).await?;
        Ok(query.apply(&scoped, self.utc_offset))
    }

    pub async fn workbench_counts(&self, actor: &User) -> Result<TabCounts, ApplicationError> {
        Ok(tab_counts(&self.list_requests(actor).await?))
    }

    pub async fn creator_options(
        &self,
        actor: &User,
    ) -> Result<Vec<CreatorOption>, ApplicationError> {
        Ok(creator_options(&self.list_requests(actor).await?))
    }

    pub async fn dashboard(
        &self,
        actor: &User,
        query: &RequestQuery,
    ) -> Result<DashboardReport, ApplicationError> {
        let filtered = self.query_requests(actor, query).await?;
        Ok(DashboardReport::compute(&filtered, self.utc_offset))
    }

    // ---- requests: writes -----------------------------------------------------------------

    pub async fn create_request(
        &self,
        actor: &User,
        request_type: RequestType,
        data: RequestDetails,
    ) -> Result<TravelRequest, ApplicationError> {
        if data.request_type() != request_type {
            return Err(DomainError::Validation(format!(
                "request type {} does not match the {} details supplied",
                request_type.as_str(),
                data.request_type().as_str()
            ))
            .into());
        }

        let correlation_id = new_correlation_id();
        let now = Utc::now();
        let today = self.local_day(now);

        for attempt in 1..=MAX_WRITE_ATTEMPTS {
            let id = RequestId::generate(today, &mut rand::thread_rng());
            let request = TravelRequest::submit(id, actor, data.clone(), now)?;

            match self.repos.requests.insert(request.clone()).await {
                Ok(()) => {
                    info!(
                        event_name = "desk.request.created",
                        correlation_id = %correlation_id,
                        request_id = %request.id,
                        request_type = request.request_type.as_str(),
                        actor = %actor.id,
                        "travel request submitted"
                    );
                    return Ok(request);
                }
                Err(RepositoryError::DuplicateKey { .. }) if attempt < MAX_WRITE_ATTEMPTS => {
                    continue;
                }
                Err(error) => return Err(error.into()),
            }
        }

        Err(ApplicationError::Persistence("could not allocate a request id".to_owned()))
    }

    pub async fn update_status(
        &self,
        id: &RequestId,
        target: RequestStatus,
        actor: &User,
        note: Option<String>,
    ) -> Result<TravelRequest, ApplicationError> {
        let audit = self.audit_context(actor, id.0.as_str());
        self.require_admin(actor, operation::UPDATE_STATUS, &audit)?;

        let Some(event) = RequestEvent::for_target(target) else {
            let current = self.get_request(id).await?;
            let error = ApplicationError::from(DomainError::InvalidTransition {
                from: current.status,
                to: target,
            });
            self.transition_rejected(&audit, Some(current.status), &error);
            return Err(error);
        };

        let saved = self
            .transition_request(id, event, &audit, |request| {
                request.change_status(target, actor, note.clone(), Utc::now())?;
                Ok(())
            })
            .await?;

        info!(
            event_name = "desk.request.status_changed",
            correlation_id = %audit.correlation_id,
            request_id = %id,
            status = target.as_str(),
            actor = %actor.id,
            "request status changed"
        );
        Ok(saved)
    }

    pub async fn add_comment(
        &self,
        id: &RequestId,
        actor: &User,
        text: &str,
    ) -> Result<Comment, ApplicationError> {
        let audit = self.audit_context(actor, id.0.as_str());

        let (_, comment) = self
            .mutate_request(id, &audit, |request| {
                if !actor.can_view(&request.user_id) {
                    return Err(permission_denied(actor, operation::COMMENT));
                }
                Ok(request.add_comment(actor, text, Utc::now())?)
            })
            .await?;

        info!(
            event_name = "desk.request.commented",
            correlation_id = %audit.correlation_id,
            request_id = %id,
            actor = %actor.id,
            "comment added"
        );
        Ok(comment)
    }

    pub async fn complete_booking(
        &self,
        id: &RequestId,
        actor: &User,
        confirmation: BookingConfirmation,
    ) -> Result<TravelRequest, ApplicationError> {
        let audit = self.audit_context(actor, id.0.as_str());
        self.require_admin(actor, operation::COMPLETE_BOOKING, &audit)?;

        if let Err(invalid) = confirmation.validate() {
            let error = ApplicationError::from(invalid);
            self.transition_rejected(&audit, None, &error);
            return Err(error);
        }

        let saved = self
            .transition_request(id, RequestEvent::CompleteBooking, &audit, |request| {
                request.complete_booking(actor, confirmation.clone(), Utc::now())?;
                Ok(())
            })
            .await?;

        self.audit.emit(
            AuditEvent::from_context(
                &audit,
                "booking.completed",
                AuditCategory::Booking,
                AuditOutcome::Success,
            )
            .with_metadata("platform", confirmation.platform.as_str())
            .with_metadata("order_id", confirmation.order_id.as_str())
            .with_metadata("price", confirmation.price.to_string()),
        );
        info!(
            event_name = "desk.request.booking_completed",
            correlation_id = %audit.correlation_id,
            request_id = %id,
            actor = %actor.id,
            price = %confirmation.price,
            "booking completed"
        );
        Ok(saved)
    }

    pub async fn update_booking_files(
        &self,
        id: &RequestId,
        actor: &User,
        files: Vec<String>,
    ) -> Result<TravelRequest, ApplicationError> {
        let audit = self.audit_context(actor, id.0.as_str());
        self.require_admin(actor, operation::UPDATE_BOOKING_FILES, &audit)?;

        let (saved, _) = self
            .mutate_request(id, &audit, |request| {
                request.replace_booking_files(actor, files.clone(), Utc::now())?;
                Ok(())
            })
            .await?;

        info!(
            event_name = "desk.request.files_updated",
            correlation_id = %audit.correlation_id,
            request_id = %id,
            actor = %actor.id,
            file_count = files.len(),
            "booking files replaced"
        );
        Ok(saved)
    }

    pub async fn fail_booking(
        &self,
        id: &RequestId,
        actor: &User,
        reason: &str,
    ) -> Result<TravelRequest, ApplicationError> {
        let audit = self.audit_context(actor, id.0.as_str());
        self.require_admin(actor, operation::FAIL_BOOKING, &audit)?;

        let reason = reason.trim();
        if reason.is_empty() {
            let error = ApplicationError::from(DomainError::Validation(
                "failure reason is required".to_owned(),
            ));
            self.transition_rejected(&audit, None, &error);
            return Err(error);
        }

        let saved = self
            .transition_request(id, RequestEvent::FailBooking, &audit, |request| {
                request.fail_booking(actor, reason, Utc::now())?;
                Ok(())
            })
            .await?;

        self.audit.emit(
            AuditEvent::from_context(
                &audit,
                "booking.failed",
                AuditCategory::Booking,
                AuditOutcome::Failed,
            )
            .with_metadata("reason", reason),
        );
        info!(
            event_name = "desk.request.booking_failed",
            correlation_id = %audit.correlation_id,
            request_id = %id,
            actor = %actor.id,
            "booking marked failed"
        );
        Ok(saved)
    }

    /// Admin-only. Unknown ids are ignored; the rest are removed together.
    pub async fn delete_requests(
        &self,
        actor: &User,
        ids: &[RequestId],
    ) -> Result<usize, ApplicationError> {
        let audit = self.audit_context(actor, "bulk");
        self.require_admin(actor, operation::DELETE_REQUESTS, &audit)?;

        let removed = self.repos.requests.delete_many(ids).await?;
        info!(
            event_name = "desk.request.deleted",
            correlation_id = %audit.correlation_id,
            requested = ids.len(),
            removed,
            actor = %actor.id,
            "requests deleted"
        );
        Ok(removed)
    }

    // ---- reimbursements -------------------------------------------------------------------

    pub async fn list_reimbursements(
        &self,
        actor: &User,
    ) -> Result<Vec<Reimbursement>, ApplicationError> {
        let claims = if actor.is_admin() {
            self.repos.reimbursements.list_all().await?
        } else {
            self.repos.reimbursements.list_by_user(&actor.id).await?
        };
        Ok(scope_reimbursements(actor, claims))
    }

    pub async fn reimbursement_summary(
        &self,
        actor: &User,
    ) -> Result<ReimbursementSummary, ApplicationError> {
        Ok(ReimbursementSummary::compute(&self.list_reimbursements(actor).await?))
    }

    pub async fn create_reimbursement(
        &self,
        actor: &User,
        claim: ReimbursementClaim,
    ) -> Result<Reimbursement, ApplicationError> {
        let correlation_id = new_correlation_id();
        let now = Utc::now();
        let today = self.local_day(now);

        for attempt in 1..=MAX_WRITE_ATTEMPTS {
            let id = ReimbursementId::generate(today, &mut rand::thread_rng());
            let created = Reimbursement::submit(id, actor, claim.clone(), now)?;

            match self.repos.reimbursements.insert(created.clone()).await {
                Ok(()) => {
                    info!(
                        event_name = "desk.reimbursement.created",
                        correlation_id = %correlation_id,
                        reimbursement_id = %created.id,
                        amount = %created.amount,
                        actor = %actor.id,
                        "reimbursement submitted"
                    );
                    return Ok(created);
                }
                Err(RepositoryError::DuplicateKey { .. }) if attempt < MAX_WRITE_ATTEMPTS => {
                    continue;
                }
                Err(error) => return Err(error.into()),
            }
        }

        Err(ApplicationError::Persistence("could not allocate a reimbursement id".to_owned()))
    }

    pub async fn resolve_reimbursement(
        &self,
        id: &ReimbursementId,
        status: ReimbursementStatus,
        actor: &User,
        reason: Option<String>,
    ) -> Result<Reimbursement, ApplicationError> {
        let audit = self.audit_context(actor, id.0.as_str());
        self.require_admin(actor, operation::RESOLVE_REIMBURSEMENT, &audit)?;

        for attempt in 1..=MAX_WRITE_ATTEMPTS {
            let mut claim = self
                .repos
                .reimbursements
                .find_by_id(id)
                .await?
                .ok_or_else(|| ApplicationError::not_found(REIMBURSEMENT_ENTITY, id.0.clone()))?;

            if let Err(error) = claim.resolve_to(status, reason.clone(), actor) {
                self.audit.emit(
                    AuditEvent::from_context(
                        &audit,
                        "reimbursement.resolution_rejected",
                        AuditCategory::Reimbursement,
                        AuditOutcome::Rejected,
                    )
                    .with_metadata("error", error.to_string()),
                );
                return Err(error.into());
            }

            match self.repos.reimbursements.update(claim).await {
                Ok(saved) => {
                    self.audit.emit(
                        AuditEvent::from_context(
                            &audit,
                            "reimbursement.resolved",
                            AuditCategory::Reimbursement,
                            AuditOutcome::Success,
                        )
                        .with_metadata("status", saved.status.as_str()),
                    );
                    info!(
                        event_name = "desk.reimbursement.resolved",
                        correlation_id = %audit.correlation_id,
                        reimbursement_id = %id,
                        status = saved.status.as_str(),
                        actor = %actor.id,
                        "reimbursement resolved"
                    );
                    return Ok(saved);
                }
                Err(RepositoryError::VersionConflict { .. }) if attempt < MAX_WRITE_ATTEMPTS => {
                    self.log_retry(&audit, attempt);
                }
                Err(error) => return Err(error.into()),
            }
        }

        Err(ApplicationError::ConcurrentModification {
            entity: REIMBURSEMENT_ENTITY,
            id: id.0.clone(),
        })
    }

    // ---- price lookups --------------------------------------------------------------------

    /// Advisory budget for a flight or hotel scenario. Lookup failures come back as
    /// [`BudgetEstimate::Unavailable`] and never block request submission.
    pub async fn estimate_budget(&self, scenario: &Scenario) -> BudgetEstimate {
        let correlation_id = new_correlation_id();
        let result = match scenario {
            Scenario::Flight(flight) => self
                .prices
                .search_flights(FlightSearch::from(flight))
                .await
                .map(|offers| BudgetEstimate::from_flights(&offers, &self.currency)),
            Scenario::Hotel(hotel) => self
                .prices
                .search_hotels(HotelSearch::from(hotel))
                .await
                .map(|offers| BudgetEstimate::from_hotels(&offers, &self.currency)),
            other => {
                return BudgetEstimate::Unavailable {
                    reason: format!(
                        "no price search exists for {} requests",
                        other.request_type().label()
                    ),
                }
            }
        };

        match result {
            Ok(estimate) => estimate,
            Err(error) => {
                warn!(
                    event_name = "desk.pricing.lookup_failed",
                    correlation_id = %correlation_id,
                    error = %error,
                    "price lookup failed; continuing without an estimate"
                );
                BudgetEstimate::Unavailable { reason: error.to_string() }
            }
        }
    }

    // ---- helpers --------------------------------------------------------------------------

    fn local_day(&self, at: DateTime<Utc>) -> NaiveDate {
        at.with_timezone(&self.utc_offset).date_naive()
    }

    fn audit_context(&self, actor: &User, entity_id: &str) -> AuditContext {
        AuditContext::new(Some(entity_id.to_owned()), new_correlation_id(), actor.id.0.clone())
    }

    fn require_admin(
        &self,
        actor: &User,
        operation: &'static str,
        audit: &AuditContext,
    ) -> Result<(), ApplicationError> {
        if actor.is_admin() {
            return Ok(());
        }

        warn!(
            event_name = "desk.permission_denied",
            correlation_id = %audit.correlation_id,
            actor = %actor.id,
            operation,
            "non-admin attempted an admin operation"
        );
        Err(permission_denied(actor, operation))
    }

    /// Guards `event` against the current status on every attempt, then applies the domain
    /// change. The audit trail gets one event with the final outcome, not one per attempt.
    async fn transition_request<F>(
        &self,
        id: &RequestId,
        event: RequestEvent,
        audit: &AuditContext,
        mut apply: F,
    ) -> Result<TravelRequest, ApplicationError>
    where
        F: FnMut(&mut TravelRequest) -> Result<(), ApplicationError>,
    {
        let mut observed = None;
        let result = self
            .mutate_request(id, audit, |request| {
                observed = Some(request.status);
                let outcome =
                    self.engine.apply(&request.status, &event).map_err(DomainError::from)?;
                apply(request)?;
                Ok(outcome)
            })
            .await;

        match result {
            Ok((saved, outcome)) => {
                self.transition_applied(audit, &outcome);
                Ok(saved)
            }
            Err(error) => {
                self.transition_rejected(audit, observed, &error);
                Err(error)
            }
        }
    }

    fn transition_applied(&self, audit: &AuditContext, outcome: &TransitionOutcome) {
        self.audit.emit(
            AuditEvent::from_context(
                audit,
                "flow.transition_applied",
                AuditCategory::Flow,
                AuditOutcome::Success,
            )
            .with_metadata("from", outcome.from.as_str())
            .with_metadata("to", outcome.to.as_str())
            .with_metadata("event", format!("{:?}", outcome.event)),
        );
    }

    fn transition_rejected(
        &self,
        audit: &AuditContext,
        from: Option<RequestStatus>,
        error: &ApplicationError,
    ) {
        let mut event = AuditEvent::from_context(
            audit,
            "flow.transition_rejected",
            AuditCategory::Flow,
            AuditOutcome::Rejected,
        )
        .with_metadata("error", error.to_string());
        if let Some(from) = from {
            event = event.with_metadata("from", from.as_str());
        }
        self.audit.emit(event);
    }

    fn log_retry(&self, audit: &AuditContext, attempt: usize) {
        warn!(
            event_name = "desk.write_conflict",
            correlation_id = %audit.correlation_id,
            entity_id = audit.entity_id.as_deref().unwrap_or("none"),
            attempt,
            "concurrent write detected; retrying against fresh state"
        );
    }

    async fn mutate_request<T, F>(
        &self,
        id: &RequestId,
        audit: &AuditContext,
        mut apply: F,
    ) -> Result<(TravelRequest, T), ApplicationError>
    where
        F: FnMut(&mut TravelRequest) -> Result<T, ApplicationError>,
    {
        for attempt in 1..=MAX_WRITE_ATTEMPTS {
            let mut request = self.get_request(id).await?;
            let value = apply(&mut request)?;

            match self.repos.requests.update(request).await {
                Ok(saved) => return Ok((saved, value)),
                Err(RepositoryError::VersionConflict { .. }) if attempt < MAX_WRITE_ATTEMPTS => {
                    self.log_retry(audit, attempt);
                }
                Err(error) => return Err(error.into()),
            }
        }

        Err(ApplicationError::ConcurrentModification { entity: REQUEST_ENTITY, id: id.0.clone() })
    }
}

fn permission_denied(actor: &User, operation: &'static str) -> ApplicationError {
    ApplicationError::PermissionDenied { actor: actor.id.0.clone(), operation }
}

fn new_correlation_id() -> String {
    format!("req-{}", Uuid::new_v4().simple())
}
