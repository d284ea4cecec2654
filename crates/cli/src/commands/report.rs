use chrono::NaiveDate;
use serde::Serialize;
use tripdesk_core::domain::reimbursement::Reimbursement;
use tripdesk_core::domain::request::TravelRequest;
use tripdesk_core::domain::user::UserId;
use tripdesk_core::query::{DateRange, RequestQuery};
use tripdesk_core::reporting::{DashboardReport, ReimbursementSummary};
use tripdesk_db::repositories::{
    ReimbursementRepository, RepositoryError, SqlReimbursementRepository,
    SqlTravelRequestRepository, TravelRequestRepository,
};
use tripdesk_db::DbPool;

use crate::commands::{open_migrated, prepare, CommandResult};

#[derive(Clone, Debug, Default)]
pub struct ReportArgs {
    pub user: Option<String>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

#[derive(Debug, Serialize)]
struct ReportData {
    user: Option<String>,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
    dashboard: DashboardReport,
    reimbursements: ReimbursementSummary,
}

pub fn run(args: ReportArgs) -> CommandResult {
    if let (Some(from), Some(to)) = (args.from, args.to) {
        if from > to {
            return CommandResult::failure(
                "report",
                "invalid_arguments",
                format!("--from {from} is after --to {to}"),
                2,
            );
        }
    }

    let (config, runtime) = match prepare("report") {
        Ok(prepared) => prepared,
        Err(result) => return result,
    };
    let offset = config.reporting.utc_offset;

    let result = runtime.block_on(async {
        let pool = open_migrated(&config).await?;
        let loaded = load(&pool, args.user.as_deref()).await;
        pool.close().await;
        loaded.map_err(|error| ("report_query", error.to_string(), 6u8))
    });

    let (requests, claims) = match result {
        Ok(loaded) => loaded,
        Err(failure) => return CommandResult::from_failure("report", failure),
    };

    let mut query = RequestQuery::default().within(DateRange::new(args.from, args.to));
    if let Some(user) = &args.user {
        query = query.for_creator(UserId(user.clone()));
    }
    let filtered = query.apply(&requests, offset);

    let data = ReportData {
        dashboard: DashboardReport::compute(&filtered, offset),
        reimbursements: ReimbursementSummary::compute(&claims),
        user: args.user,
        from: args.from,
        to: args.to,
    };
    let message = format!(
        "{} requests, total spend {}",
        data.dashboard.request_count, data.dashboard.total_spend
    );

    match serde_json::to_value(&data) {
        Ok(value) => CommandResult::success_with("report", message, Some(value)),
        Err(error) => CommandResult::failure("report", "serialization", error.to_string(), 6),
    }
}

async fn load(
    pool: &DbPool,
    user: Option<&str>,
) -> Result<(Vec<TravelRequest>, Vec<Reimbursement>), RepositoryError> {
    let requests = SqlTravelRequestRepository::new(pool.clone());
    let claims = SqlReimbursementRepository::new(pool.clone());

    match user {
        Some(user) => {
            let user_id = UserId(user.to_owned());
            Ok((requests.list_by_user(&user_id).await?, claims.list_by_user(&user_id).await?))
        }
        None => Ok((requests.list_all().await?, claims.list_all().await?)),
    }
}

