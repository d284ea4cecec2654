//! Dashboard aggregates. Every function here is pure and computed over whatever filtered
//! set the caller hands in; an empty input yields zeroed metrics and empty series.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Datelike, FixedOffset, Utc};
use rust_decimal::Decimal;
use serde::ser::{Serialize, Serializer};
use serde::Deserialize;

use crate::domain::reimbursement::{Reimbursement, ReimbursementCategory, ReimbursementStatus};
use crate::domain::request::{RequestStatus, RequestType, TravelRequest};

pub const TOP_SPENDER_LIMIT: usize = 5;

#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, Deserialize)]
pub struct LabeledAmount {
    pub label: String,
    pub amount: Decimal,
}

#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, Deserialize)]
pub struct LabeledCount {
    pub label: String,
    pub count: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MonthKey {
    pub year: i32,
    pub month: u32,
}

impl MonthKey {
    pub fn of(at: DateTime<Utc>, offset: FixedOffset) -> Self {
        let local = at.with_timezone(&offset);
        Self { year: local.year(), month: local.month() }
    }
}

impl std::fmt::Display for MonthKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct MonthlySpend {
    pub month: String,
    pub amount: Decimal,
}

/// SUCCESS spend bucketed by local calendar month. Iteration is ascending by month and can
/// be restarted by calling [`MonthlyTrend::iter`] again.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MonthlyTrend {
    buckets: BTreeMap<MonthKey, Decimal>,
}

impl MonthlyTrend {
    pub fn compute(requests: &[TravelRequest], offset: FixedOffset) -> Self {
        let mut buckets = BTreeMap::new();
        for (request, price) in successful(requests) {
            *buckets.entry(MonthKey::of(request.created_at, offset)).or_insert(Decimal::ZERO) +=
                price;
        }
        Self { buckets }
    }

    pub fn iter(&self) -> impl Iterator<Item = MonthlySpend> + '_ {
        self.buckets
            .iter()
            .map(|(key, amount)| MonthlySpend { month: key.to_string(), amount: *amount })
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

impl Serialize for MonthlyTrend {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct DashboardReport {
    pub request_count: usize,
    pub total_spend: Decimal,
    pub avg_order_value: Decimal,
    pub pending_count: usize,
    pub active_users_count: usize,
    pub monthly_trend: MonthlyTrend,
    pub category_spend: Vec<LabeledAmount>,
    pub top_spenders: Vec<LabeledAmount>,
    pub status_distribution: Vec<LabeledCount>,
}

impl DashboardReport {
    pub fn compute(filtered: &[TravelRequest], offset: FixedOffset) -> Self {
        let total_spend = total_spend(filtered);
        let success_count = successful(filtered).count();

        Self {
            request_count: filtered.len(),
            total_spend,
            avg_order_value: average(total_spend, success_count),
            pending_count: filtered
                .iter()
                .filter(|request| request.status == RequestStatus::Submitted)
                .count(),
            active_users_count: filtered
                .iter()
                .map(|request| &request.user_id)
                .collect::<HashSet<_>>()
                .len(),
            monthly_trend: MonthlyTrend::compute(filtered, offset),
            category_spend: category_spend(filtered),
            top_spenders: top_spenders(filtered, TOP_SPENDER_LIMIT),
            status_distribution: status_distribution(filtered),
        }
    }
}

pub fn total_spend(requests: &[TravelRequest]) -> Decimal {
    successful(requests).map(|(_, price)| price).sum()
}

fn average(total: Decimal, count: usize) -> Decimal {
    if count == 0 {
        return Decimal::ZERO;
    }
    (total / Decimal::from(count)).round_dp(2)
}

pub fn category_spend(requests: &[TravelRequest]) -> Vec<LabeledAmount> {
    let mut sums: BTreeMap<RequestType, Decimal> = BTreeMap::new();
    for (request, price) in successful(requests) {
        *sums.entry(request.request_type).or_insert(Decimal::ZERO) += price;
    }

    RequestType::ALL
        .into_iter()
        .filter_map(|kind| {
            sums.get(&kind)
                .map(|amount| LabeledAmount { label: kind.label().to_owned(), amount: *amount })
        })
        .collect()
}

/// Ties keep the order in which the spender first appears in `requests`.
pub fn top_spenders(requests: &[TravelRequest], limit: usize) -> Vec<LabeledAmount> {
    let mut totals: Vec<LabeledAmount> = Vec::new();
    for (request, price) in successful(requests) {
        match totals.iter_mut().find(|entry| entry.label == request.user_name) {
            Some(entry) => entry.amount += price,
            None => totals.push(LabeledAmount { label: request.user_name.clone(), amount: price }),
        }
    }

    totals.sort_by(|left, right| right.amount.cmp(&left.amount));
    totals.truncate(limit);
    totals
}

pub fn status_distribution(requests: &[TravelRequest]) -> Vec<LabeledCount> {
    RequestStatus::ALL
        .into_iter()
        .filter_map(|status| {
            let count = requests.iter().filter(|request| request.status == status).count();
            (count > 0).then(|| LabeledCount { label: status.label().to_owned(), count })
        })
        .collect()
}

fn successful(requests: &[TravelRequest]) -> impl Iterator<Item = (&TravelRequest, Decimal)> {
    requests.iter().filter_map(|request| request.spend().map(|price| (request, price)))
}

#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, Deserialize)]
pub struct ReimbursementSummary {
    pub total_amount: Decimal,
    pub pending_count: usize,
    pub pending_amount: Decimal,
    pub approved_by_category: Vec<LabeledAmount>,
}

impl ReimbursementSummary {
    pub fn compute(claims: &[Reimbursement]) -> Self {
        let approved =
            || claims.iter().filter(|claim| claim.status == ReimbursementStatus::Approved);
        let pending =
            || claims.iter().filter(|claim| claim.status == ReimbursementStatus::Pending);

        let approved_by_category = ReimbursementCategory::ALL
            .into_iter()
            .filter_map(|category| {
                let mut matching = approved().filter(|claim| claim.category == category).peekable();
                matching.peek()?;
                Some(LabeledAmount {
                    label: category.label().to_owned(),
                    amount: matching.map(|claim| claim.amount).sum(),
                })
            })
            .collect();

        Self {
            total_amount: approved().map(|claim| claim.amount).sum(),
            pending_count: pending().count(),
            pending_amount: pending().map(|claim| claim.amount).sum(),
            approved_by_category,
        }
    }
}
