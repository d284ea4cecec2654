//! Role-scoped read views over requests and reimbursements.
//!
//! Every listing starts from the actor's scoped set: admins see everything, employees see only
//! what they own. The filters below are derived views and never mutate the underlying entities.

use std::cmp::Ordering;
use std::collections::HashSet;

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::reimbursement::Reimbursement;
use crate::domain::request::{RequestStatus, TravelRequest, Urgency};
use crate::domain::user::{User, UserId};

/// Requests visible to `actor`, newest first.
pub fn scope_requests(actor: &User, requests: Vec<TravelRequest>) -> Vec<TravelRequest> {
    let mut scoped: Vec<_> =
        requests.into_iter().filter(|request| actor.can_view(&request.user_id)).collect();
    scoped.sort_by(|left, right| right.created_at.cmp(&left.created_at));
    scoped
}

/// Reimbursements visible to `actor`, newest first.
pub fn scope_reimbursements(actor: &User, claims: Vec<Reimbursement>) -> Vec<Reimbursement> {
    let mut scoped: Vec<_> =
        claims.into_iter().filter(|claim| actor.can_view(&claim.user_id)).collect();
    scoped.sort_by(|left, right| right.created_at.cmp(&left.created_at));
    scoped
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkbenchTab {
    Todo,
    Processing,
    Finished,
}

impl WorkbenchTab {
    pub const ALL: [Self; 3] = [Self::Todo, Self::Processing, Self::Finished];

    /// Every status belongs to exactly one tab.
    pub fn of(status: RequestStatus) -> Self {
        match status {
            RequestStatus::Submitted | RequestStatus::InfoNeeded => Self::Todo,
            RequestStatus::Accepted | RequestStatus::Booking => Self::Processing,
            RequestStatus::Success
            | RequestStatus::Failed
            | RequestStatus::Cancelled
            | RequestStatus::Closed => Self::Finished,
        }
    }

    pub fn contains(&self, status: RequestStatus) -> bool {
        Self::of(status) == *self
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TabCounts {
    pub todo: usize,
    pub processing: usize,
    pub finished: usize,
}

impl TabCounts {
    pub fn get(&self, tab: WorkbenchTab) -> usize {
        match tab {
            WorkbenchTab::Todo => self.todo,
            WorkbenchTab::Processing => self.processing,
            WorkbenchTab::Finished => self.finished,
        }
    }
}

pub fn tab_counts(requests: &[TravelRequest]) -> TabCounts {
    requests.iter().fold(TabCounts::default(), |mut counts, request| {
        match WorkbenchTab::of(request.status) {
            WorkbenchTab::Todo => counts.todo += 1,
            WorkbenchTab::Processing => counts.processing += 1,
            WorkbenchTab::Finished => counts.finished += 1,
        }
        counts
    })
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatorOption {
    pub user_id: UserId,
    pub user_name: String,
}

/// Distinct creators in first-seen order.
pub fn creator_options(requests: &[TravelRequest]) -> Vec<CreatorOption> {
    let mut seen = HashSet::new();
    requests
        .iter()
        .filter(|request| seen.insert(request.user_id.clone()))
        .map(|request| CreatorOption {
            user_id: request.user_id.clone(),
            user_name: request.user_name.clone(),
        })
        .collect()
}

/// Inclusive day range evaluated on the desk's local calendar.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl DateRange {
    pub fn new(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        Self { start, end }
    }

    pub fn is_unbounded(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }

    pub fn contains(&self, at: DateTime<Utc>, offset: FixedOffset) -> bool {
        let day = at.with_timezone(&offset).date_naive();
        self.start.map_or(true, |start| day >= start) && self.end.map_or(true, |end| day <= end)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    CreatedAt,
    Type,
    UserName,
    Purpose,
    Status,
    Urgency,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpec {
    pub field: SortField,
    pub direction: SortDirection,
}

impl SortSpec {
    pub fn asc(field: SortField) -> Self {
        Self { field, direction: SortDirection::Asc }
    }

    pub fn desc(field: SortField) -> Self {
        Self { field, direction: SortDirection::Desc }
    }

    /// Workbench header toggle: a second click on an ascending column flips it.
    pub fn toggled(current: Option<Self>, field: SortField) -> Self {
        match current {
            Some(spec) if spec.field == field && spec.direction == SortDirection::Asc => {
                Self::desc(field)
            }
            _ => Self::asc(field),
        }
    }

    fn compare(&self, left: &TravelRequest, right: &TravelRequest) -> Ordering {
        let ordering = match self.field {
            SortField::CreatedAt => left.created_at.cmp(&right.created_at),
            SortField::Type => left.request_type.label().cmp(right.request_type.label()),
            SortField::UserName => left.user_name.cmp(&right.user_name),
            SortField::Purpose => left.purpose().cmp(right.purpose()),
            SortField::Status => left.status.label().cmp(right.status.label()),
            SortField::Urgency => urgency_rank(left.urgency()).cmp(&urgency_rank(right.urgency())),
        };
        match self.direction {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        }
    }
}

fn urgency_rank(urgency: Urgency) -> u8 {
    match urgency {
        Urgency::Normal => 0,
        Urgency::Urgent => 1,
    }
}

/// Filters applied over a scoped set in the order creator, date range, tab, search, sort.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestQuery {
    pub creator: Option<UserId>,
    pub date_range: DateRange,
    pub tab: Option<WorkbenchTab>,
    pub search: Option<String>,
    pub sort: Option<SortSpec>,
}

impl RequestQuery {
    pub fn for_creator(mut self, creator: UserId) -> Self {
        self.creator = Some(creator);
        self
    }

    pub fn within(mut self, date_range: DateRange) -> Self {
        self.date_range = date_range;
        self
    }

    pub fn in_tab(mut self, tab: WorkbenchTab) -> Self {
        self.tab = Some(tab);
        self
    }

    pub fn matching(mut self, search: impl Into<String>) -> Self {
        self.search = Some(search.into());
        self
    }

    pub fn sorted_by(mut self, sort: SortSpec) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn apply(&self, scoped: &[TravelRequest], offset: FixedOffset) -> Vec<TravelRequest> {
        let needle = self
            .search
            .as_deref()
            .filter(|term| !term.is_empty())
            .map(str::to_lowercase);

        let mut result: Vec<TravelRequest> = scoped
            .iter()
            .filter(|request| self.creator.as_ref().map_or(true, |id| &request.user_id == id))
            .filter(|request| self.date_range.contains(request.created_at, offset))
            .filter(|request| self.tab.map_or(true, |tab| tab.contains(request.status)))
            .filter(|request| needle.as_deref().map_or(true, |term| matches_search(request, term)))
            .cloned()
            .collect();

        match self.sort {
            Some(spec) => result.sort_by(|left, right| spec.compare(left, right)),
            None => result.sort_by(|left, right| right.created_at.cmp(&left.created_at)),
        }
        result
    }
}

fn matches_search(request: &TravelRequest, lowered_term: &str) -> bool {
    [request.user_name.as_str(), request.id.0.as_str(), request.purpose()]
        .into_iter()
        .any(|field| field.to_lowercase().contains(lowered_term))
}

#[cfg(test)]
pub(crate) mod tests {
    use chrono::{DateTime, FixedOffset, NaiveDate, TimeZone, Utc};

    use super::{
        creator_options, scope_requests, tab_counts, DateRange, RequestQuery, SortField, SortSpec,
        WorkbenchTab,
    };
    use crate::domain::request::tests::flight_details;
    use crate::domain::request::{RequestId, RequestStatus, TravelRequest, Urgency};
    use crate::domain::user::User;

    pub(crate) fn beijing() -> FixedOffset {
        FixedOffset::east_opt(8 * 3600).expect("valid offset")
    }

    pub(crate) fn local(
        year: i32,
        month: u32,
        day: u32,
        hour: u32,
        minute: u32,
        second: u32,
    ) -> DateTime<Utc> {
        beijing()
            .with_ymd_and_hms(year, month, day, hour, minute, second)
            .single()
            .expect("unambiguous local time")
            .with_timezone(&Utc)
    }

    pub(crate) fn request_at(
        id: &str,
        owner: &User,
        purpose: &str,
        created_at: DateTime<Utc>,
    ) -> TravelRequest {
        TravelRequest::submit(RequestId(id.to_owned()), owner, flight_details(purpose), created_at)
            .expect("valid request")
    }

    fn day(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
    }

    #[test]
    fn employees_see_exactly_their_own_requests() {
        let admin = User::admin("admin");
        let alice = User::new_employee("Alice", "alice@corp.com");
        let bob = User::new_employee("Bob", "bob@corp.com");
        let requests = vec![
            request_at("REQ-1", &alice, "a1", local(2024, 1, 1, 9, 0, 0)),
            request_at("REQ-2", &bob, "b1", local(2024, 1, 2, 9, 0, 0)),
            request_at("REQ-3", &alice, "a2", local(2024, 1, 3, 9, 0, 0)),
            request_at("REQ-4", &bob, "b2", local(2024, 1, 4, 9, 0, 0)),
            request_at("REQ-5", &bob, "b3", local(2024, 1, 5, 9, 0, 0)),
        ];

        let everything = scope_requests(&admin, requests.clone());
        let alices = scope_requests(&alice, requests.clone());
        let bobs = scope_requests(&bob, requests);

        assert_eq!(everything.len(), 5);
        assert_eq!(alices.len(), 2);
        assert_eq!(bobs.len(), 3);
        assert!(alices.iter().all(|request| request.user_id == alice.id));
        assert_eq!(everything[0].id.0, "REQ-5", "scoped listings are newest first");
    }

    #[test]
    fn end_date_includes_the_last_local_second_of_the_day() {
        let owner = User::new_employee("Alice", "alice@corp.com");
        let late = request_at("REQ-LATE", &owner, "late", local(2024, 1, 15, 23, 59, 59));
        let scoped = vec![late];

        let inclusive = RequestQuery::default()
            .within(DateRange::new(None, Some(day(2024, 1, 15))))
            .apply(&scoped, beijing());
        let exclusive = RequestQuery::default()
            .within(DateRange::new(None, Some(day(2024, 1, 14))))
            .apply(&scoped, beijing());
        let from_start = RequestQuery::default()
            .within(DateRange::new(Some(day(2024, 1, 15)), None))
            .apply(&scoped, beijing());

        assert_eq!(inclusive.len(), 1);
        assert!(exclusive.is_empty());
        assert_eq!(from_start.len(), 1);
    }

    #[test]
    fn search_is_case_insensitive_over_name_id_and_purpose() {
        let owner = User::new_employee("Alice Wang", "alice@corp.com");
        let scoped = vec![
            request_at("REQ-20240101-0001", &owner, "Client visit Shanghai", Utc::now()),
            request_at("REQ-20240101-0002", &owner, "Offsite", Utc::now()),
        ];

        let by_purpose = RequestQuery::default().matching("SHANGHAI").apply(&scoped, beijing());
        let by_id = RequestQuery::default().matching("0002").apply(&scoped, beijing());
        let by_name = RequestQuery::default().matching("alice").apply(&scoped, beijing());
        let empty = RequestQuery::default().matching("").apply(&scoped, beijing());
        let padded = RequestQuery::default().matching(" shanghai").apply(&scoped, beijing());
        let blank = RequestQuery::default().matching("   ").apply(&scoped, beijing());

        assert_eq!(by_purpose.len(), 1);
        assert_eq!(by_purpose[0].id.0, "REQ-20240101-0001");
        assert_eq!(by_id.len(), 1);
        assert_eq!(by_name.len(), 2);
        assert_eq!(empty.len(), 2);
        // Terms are matched as typed, surrounding whitespace included.
        assert_eq!(padded.len(), 1);
        assert!(blank.is_empty());
    }

    #[test]
    fn urgency_sort_ranks_urgent_above_normal_and_is_stable() {
        let owner = User::new_employee("Alice", "alice@corp.com");
        let mut first = request_at("REQ-A", &owner, "a", local(2024, 1, 1, 8, 0, 0));
        let second = request_at("REQ-B", &owner, "b", local(2024, 1, 2, 8, 0, 0));
        let mut third = request_at("REQ-C", &owner, "c", local(2024, 1, 3, 8, 0, 0));
        first.data.basics.urgency = Urgency::Urgent;
        third.data.basics.urgency = Urgency::Urgent;
        let scoped = vec![first, second, third];

        let descending = RequestQuery::default()
            .sorted_by(SortSpec::desc(SortField::Urgency))
            .apply(&scoped, beijing());
        let ids: Vec<_> = descending.iter().map(|request| request.id.0.as_str()).collect();

        assert_eq!(ids, vec!["REQ-A", "REQ-C", "REQ-B"]);
    }

    #[test]
    fn default_order_is_newest_first_and_toggle_flips_direction() {
        let owner = User::new_employee("Alice", "alice@corp.com");
        let scoped = vec![
            request_at("REQ-OLD", &owner, "old", local(2024, 1, 1, 8, 0, 0)),
            request_at("REQ-NEW", &owner, "new", local(2024, 2, 1, 8, 0, 0)),
        ];

        let newest_first = RequestQuery::default().apply(&scoped, beijing());
        assert_eq!(newest_first[0].id.0, "REQ-NEW");

        let ascending = SortSpec::toggled(None, SortField::CreatedAt);
        let descending = SortSpec::toggled(Some(ascending), SortField::CreatedAt);
        assert_eq!(ascending, SortSpec::asc(SortField::CreatedAt));
        assert_eq!(descending, SortSpec::desc(SortField::CreatedAt));
        assert_eq!(SortSpec::toggled(Some(descending), SortField::CreatedAt), ascending);

        let oldest_first = RequestQuery::default().sorted_by(ascending).apply(&scoped, beijing());
        assert_eq!(oldest_first[0].id.0, "REQ-OLD");
    }

    #[test]
    fn tabs_partition_every_status() {
        for status in RequestStatus::ALL {
            let owning = WorkbenchTab::ALL.iter().filter(|tab| tab.contains(status)).count();
            assert_eq!(owning, 1, "{status:?} must belong to exactly one tab");
        }
    }

    #[test]
    fn tab_counts_and_creator_options_use_the_unfiltered_scoped_set() {
        let admin = User::admin("admin");
        let alice = User::new_employee("Alice", "alice@corp.com");
        let bob = User::new_employee("Bob", "bob@corp.com");
        let mut accepted = request_at("REQ-2", &bob, "b", local(2024, 1, 2, 8, 0, 0));
        accepted
            .change_status(RequestStatus::Accepted, &admin, None, Utc::now())
            .expect("accept");
        let scoped = vec![
            request_at("REQ-1", &alice, "a", local(2024, 1, 1, 8, 0, 0)),
            accepted,
            request_at("REQ-3", &alice, "c", local(2024, 1, 3, 8, 0, 0)),
        ];

        let counts = tab_counts(&scoped);
        assert_eq!(counts.get(WorkbenchTab::Todo), 2);
        assert_eq!(counts.get(WorkbenchTab::Processing), 1);
        assert_eq!(counts.get(WorkbenchTab::Finished), 0);

        let options = creator_options(&scoped);
        let names: Vec<_> = options.iter().map(|option| option.user_name.as_str()).collect();
        assert_eq!(names, vec!["Alice", "Bob"]);

        let bobs_todo = RequestQuery::default()
            .for_creator(bob.id.clone())
            .in_tab(WorkbenchTab::Todo)
            .apply(&scoped, beijing());
        assert!(bobs_todo.is_empty());
    }
}
