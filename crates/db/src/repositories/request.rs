use std::collections::HashMap;

use sqlx::sqlite::SqliteRow;
use sqlx::SqliteConnection;

use tripdesk_core::domain::request::{
    AuditLogEntry, BookingResult, Comment, RequestDetails, RequestId, RequestStatus, RequestType,
    TravelRequest,
};
use tripdesk_core::domain::user::{Role, UserId};

use super::rows::{
    column, from_json, parse_timestamp, parse_version, timestamp, to_json, unknown_value,
};
use super::{RepositoryError, TravelRequestRepository, REQUEST_ENTITY};
use crate::DbPool;

const REQUEST_COLUMNS: &str = "r.id, r.user_id, r.user_name, r.request_type, r.status,
    r.details_json, r.assigned_to, r.booking_result_json, r.version, r.created_at, r.updated_at";

/// `NULL` selects every owner.
const OWNER_FILTER: &str = "r.user_id = COALESCE(?1, r.user_id)";

pub struct SqlTravelRequestRepository {
    pool: DbPool,
}

impl SqlTravelRequestRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn list_owned_by(
        &self,
        owner: Option<&UserId>,
    ) -> Result<Vec<TravelRequest>, RepositoryError> {
        let owner = owner.map(|id| id.0.as_str());

        let rows = sqlx::query(&format!(
            "SELECT {REQUEST_COLUMNS} FROM travel_request r
             WHERE {OWNER_FILTER}
             ORDER BY r.created_at DESC, r.id ASC"
        ))
        .bind(owner)
        .fetch_all(&self.pool)
        .await?;

        let comment_rows = sqlx::query(&format!(
            "SELECT c.request_id, c.id, c.author, c.role, c.content, c.created_at
             FROM request_comment c JOIN travel_request r ON r.id = c.request_id
             WHERE {OWNER_FILTER}
             ORDER BY c.request_id, c.seq"
        ))
        .bind(owner)
        .fetch_all(&self.pool)
        .await?;

        let history_rows = sqlx::query(&format!(
            "SELECT h.request_id, h.id, h.action, h.actor, h.details, h.occurred_at
             FROM request_audit_log h JOIN travel_request r ON r.id = h.request_id
             WHERE {OWNER_FILTER}
             ORDER BY h.request_id, h.seq"
        ))
        .bind(owner)
        .fetch_all(&self.pool)
        .await?;

        let mut comments = group_by_request(&comment_rows, row_to_comment)?;
        let mut history = group_by_request(&history_rows, row_to_history)?;

        rows.iter()
            .map(|row| {
                let id: String = column(row, "id")?;
                let comments = comments.remove(&id).unwrap_or_default();
                let history = history.remove(&id).unwrap_or_default();
                row_to_request(row, comments, history)
            })
            .collect()
    }
}

fn group_by_request<T>(
    rows: &[SqliteRow],
    decode: fn(&SqliteRow) -> Result<T, RepositoryError>,
) -> Result<HashMap<String, Vec<T>>, RepositoryError> {
    let mut grouped: HashMap<String, Vec<T>> = HashMap::new();
    for row in rows {
        let request_id: String = column(row, "request_id")?;
        grouped.entry(request_id).or_default().push(decode(row)?);
    }
    Ok(grouped)
}

fn row_to_comment(row: &SqliteRow) -> Result<Comment, RepositoryError> {
    let role: String = column(row, "role")?;
    let created_at: String = column(row, "created_at")?;

    Ok(Comment {
        id: column(row, "id")?,
        author: column(row, "author")?,
        role: Role::parse(&role).ok_or_else(|| unknown_value("role", &role))?,
        content: column(row, "content")?,
        created_at: parse_timestamp("created_at", &created_at)?,
    })
}

fn row_to_history(row: &SqliteRow) -> Result<AuditLogEntry, RepositoryError> {
    let occurred_at: String = column(row, "occurred_at")?;

    Ok(AuditLogEntry {
        id: column(row, "id")?,
        action: column(row, "action")?,
        actor: column(row, "actor")?,
        timestamp: parse_timestamp("occurred_at", &occurred_at)?,
        details: column(row, "details")?,
    })
}

fn row_to_request(
    row: &SqliteRow,
    comments: Vec<Comment>,
    history: Vec<AuditLogEntry>,
) -> Result<TravelRequest, RepositoryError> {
    let request_type: String = column(row, "request_type")?;
    let status: String = column(row, "status")?;
    let details: String = column(row, "details_json")?;
    let booking: Option<String> = column(row, "booking_result_json")?;
    let assigned_to: Option<String> = column(row, "assigned_to")?;
    let created_at: String = column(row, "created_at")?;
    let updated_at: String = column(row, "updated_at")?;

    Ok(TravelRequest {
        id: RequestId(column(row, "id")?),
        user_id: UserId(column(row, "user_id")?),
        user_name: column(row, "user_name")?,
        request_type: RequestType::parse(&request_type)
            .ok_or_else(|| unknown_value("request_type", &request_type))?,
        status: RequestStatus::parse(&status).ok_or_else(|| unknown_value("status", &status))?,
        created_at: parse_timestamp("created_at", &created_at)?,
        updated_at: parse_timestamp("updated_at", &updated_at)?,
        data: from_json::<RequestDetails>("details_json", &details)?,
        assigned_to: assigned_to.map(UserId),
        booking_result: booking
            .map(|raw| from_json::<BookingResult>("booking_result_json", &raw))
            .transpose()?,
        comments,
        history,
        version: parse_version(column(row, "version")?)?,
    })
}

fn booking_json(request: &TravelRequest) -> Result<Option<String>, RepositoryError> {
    request
        .booking_result
        .as_ref()
        .map(|result| to_json("booking_result_json", result))
        .transpose()
}

/// Inserts children not yet stored. Both lists are append-only so existing ids are skipped.
async fn append_children(
    conn: &mut SqliteConnection,
    request: &TravelRequest,
) -> Result<(), RepositoryError> {
    for (seq, comment) in request.comments.iter().enumerate() {
        sqlx::query(
            "INSERT OR IGNORE INTO request_comment
                 (id, request_id, seq, author, role, content, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&comment.id)
        .bind(&request.id.0)
        .bind(seq as i64)
        .bind(&comment.author)
        .bind(comment.role.as_str())
        .bind(&comment.content)
        .bind(timestamp(&comment.created_at))
        .execute(&mut *conn)
        .await?;
    }

    for (seq, entry) in request.history.iter().enumerate() {
        sqlx::query(
            "INSERT OR IGNORE INTO request_audit_log
                 (id, request_id, seq, action, actor, details, occurred_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&entry.id)
        .bind(&request.id.0)
        .bind(seq as i64)
        .bind(&entry.action)
        .bind(&entry.actor)
        .bind(&entry.details)
        .bind(timestamp(&entry.timestamp))
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}

#[async_trait::async_trait]
impl TravelRequestRepository for SqlTravelRequestRepository {
    async fn find_by_id(&self, id: &RequestId) -> Result<Option<TravelRequest>, RepositoryError> {
        let row =
            sqlx::query(&format!("SELECT {REQUEST_COLUMNS} FROM travel_request r WHERE r.id = ?"))
                .bind(&id.0)
                .fetch_optional(&self.pool)
                .await?;
        let Some(row) = row else {
            return Ok(None);
        };

        let comments = sqlx::query(
            "SELECT request_id, id, author, role, content, created_at
             FROM request_comment WHERE request_id = ? ORDER BY seq",
        )
        .bind(&id.0)
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(row_to_comment)
        .collect::<Result<Vec<_>, _>>()?;

        let history = sqlx::query(
            "SELECT request_id, id, action, actor, details, occurred_at
             FROM request_audit_log WHERE request_id = ? ORDER BY seq",
        )
        .bind(&id.0)
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(row_to_history)
        .collect::<Result<Vec<_>, _>>()?;

        row_to_request(&row, comments, history).map(Some)
    }

    async fn list_all(&self) -> Result<Vec<TravelRequest>, RepositoryError> {
        self.list_owned_by(None).await
    }

    async fn list_by_user(&self, user_id: &UserId) -> Result<Vec<TravelRequest>, RepositoryError> {
        self.list_owned_by(Some(user_id)).await
    }

    async fn insert(&self, request: TravelRequest) -> Result<(), RepositoryError> {
        let details = to_json("details_json", &request.data)?;
        let booking = booking_json(&request)?;
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO travel_request (id, user_id, user_name, request_type, status,
                                         details_json, assigned_to, booking_result_json,
                                         version, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&request.id.0)
        .bind(&request.user_id.0)
        .bind(&request.user_name)
        .bind(request.request_type.as_str())
        .bind(request.status.as_str())
        .bind(details)
        .bind(request.assigned_to.as_ref().map(|id| id.0.as_str()))
        .bind(booking)
        .bind(i64::from(request.version))
        .bind(timestamp(&request.created_at))
        .bind(timestamp(&request.updated_at))
        .execute(&mut *tx)
        .await
        .map_err(RepositoryError::on_insert(REQUEST_ENTITY, &request.id.0))?;

        append_children(&mut *tx, &request).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn update(&self, mut request: TravelRequest) -> Result<TravelRequest, RepositoryError> {
        let details = to_json("details_json", &request.data)?;
        let booking = booking_json(&request)?;
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            "UPDATE travel_request SET
                 user_name = ?, status = ?, details_json = ?, assigned_to = ?,
                 booking_result_json = ?, updated_at = ?, version = version + 1
             WHERE id = ? AND version = ?",
        )
        .bind(&request.user_name)
        .bind(request.status.as_str())
        .bind(details)
        .bind(request.assigned_to.as_ref().map(|id| id.0.as_str()))
        .bind(booking)
        .bind(timestamp(&request.updated_at))
        .bind(&request.id.0)
        .bind(i64::from(request.version))
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(RepositoryError::VersionConflict {
                entity: REQUEST_ENTITY,
                id: request.id.0,
                expected: request.version,
            });
        }

        append_children(&mut *tx, &request).await?;
        tx.commit().await?;

        request.version += 1;
        Ok(request)
    }

    async fn delete_many(&self, ids: &[RequestId]) -> Result<usize, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let mut removed = 0_u64;

        for id in ids {
            removed += sqlx::query("DELETE FROM travel_request WHERE id = ?")
                .bind(&id.0)
                .execute(&mut *tx)
                .await?
                .rows_affected();
        }

        tx.commit().await?;
        Ok(removed as usize)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use rust_decimal::Decimal;

    use tripdesk_core::domain::request::{
        BookingConfirmation, RequestId, RequestStatus, TravelRequest,
    };
    use tripdesk_core::domain::user::User;

    use super::SqlTravelRequestRepository;
    use crate::fixtures::demo_flight;
    use crate::repositories::{RepositoryError, TravelRequestRepository};
    use crate::{connect_with_settings, migrations, DbPool};

    async fn pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrate");
        pool
    }

    fn submitted(id: &str, owner: &User, day: u32) -> TravelRequest {
        let at = Utc.with_ymd_and_hms(2024, 5, day, 10, 30, 0).single().expect("timestamp");
        TravelRequest::submit(RequestId(id.to_owned()), owner, demo_flight("项目交付", "深圳"), at)
            .expect("valid request")
    }

    #[tokio::test]
    async fn round_trip_keeps_history_and_comments_in_order() {
        let repo = SqlTravelRequestRepository::new(pool().await);
        let owner = User::new_employee("王员工", "wang@corp.com");
        let admin = User::admin("admin");
        let mut request = submitted("REQ-1", &owner, 2);
        repo.insert(request.clone()).await.expect("insert");

        let now = Utc.with_ymd_and_hms(2024, 5, 3, 9, 0, 0).single().expect("timestamp");
        request.change_status(RequestStatus::Accepted, &admin, None, now).expect("accept");
        request.change_status(RequestStatus::Booking, &admin, None, now).expect("book");
        request
            .complete_booking(
                &admin,
                BookingConfirmation {
                    platform: "Ctrip".to_owned(),
                    order_id: "X1".to_owned(),
                    price: Decimal::new(1200, 0),
                    currency: Some("CNY".to_owned()),
                    files: vec!["ticket.pdf".to_owned()],
                },
                now,
            )
            .expect("complete");
        request.add_comment(&owner, "谢谢", now).expect("comment");

        let saved = repo.update(request.clone()).await.expect("update");
        assert_eq!(saved.version, 1);

        let loaded = repo.find_by_id(&request.id).await.expect("find").expect("present");
        assert_eq!(loaded, saved);
        assert_eq!(loaded.status, RequestStatus::Success);
        assert_eq!(loaded.history.len(), 4);
        assert_eq!(loaded.comments.len(), 1);
        assert_eq!(loaded.spend(), Some(Decimal::new(1200, 0)));
    }

    #[tokio::test]
    async fn stale_update_is_rejected() {
        let repo = SqlTravelRequestRepository::new(pool().await);
        let owner = User::new_employee("王员工", "wang@corp.com");
        let request = submitted("REQ-1", &owner, 2);
        repo.insert(request.clone()).await.expect("insert");

        repo.update(request.clone()).await.expect("first write");
        let stale = repo.update(request).await;

        assert!(matches!(stale, Err(RepositoryError::VersionConflict { expected: 0, .. })));
    }

    #[tokio::test]
    async fn listing_is_scoped_by_owner_and_newest_first() {
        let repo = SqlTravelRequestRepository::new(pool().await);
        let wang = User::new_employee("王员工", "wang@corp.com");
        let li = User::new_employee("李员工", "li@corp.com");
        repo.insert(submitted("REQ-1", &wang, 1)).await.expect("insert");
        repo.insert(submitted("REQ-2", &li, 2)).await.expect("insert");
        repo.insert(submitted("REQ-3", &wang, 3)).await.expect("insert");

        let all: Vec<String> =
            repo.list_all().await.expect("list").into_iter().map(|r| r.id.0).collect();
        assert_eq!(all, ["REQ-3", "REQ-2", "REQ-1"]);

        let wangs = repo.list_by_user(&wang.id).await.expect("list");
        assert_eq!(wangs.len(), 2);
        assert!(wangs.iter().all(|request| request.history.len() == 1));
    }

    #[tokio::test]
    async fn bulk_delete_ignores_missing_ids() {
        let repo = SqlTravelRequestRepository::new(pool().await);
        let owner = User::new_employee("王员工", "wang@corp.com");
        for (id, day) in [("REQ-1", 1), ("REQ-2", 2), ("REQ-3", 3)] {
            repo.insert(submitted(id, &owner, day)).await.expect("insert");
        }

        let ids = ["REQ-1", "REQ-3", "REQ-404"].map(|id| RequestId(id.to_owned()));
        assert_eq!(repo.delete_many(&ids).await.expect("delete"), 2);

        let remaining: Vec<String> =
            repo.list_all().await.expect("list").into_iter().map(|r| r.id.0).collect();
        assert_eq!(remaining, ["REQ-2"]);
    }
}
