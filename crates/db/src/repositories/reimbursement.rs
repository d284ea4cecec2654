use sqlx::sqlite::SqliteRow;

use tripdesk_core::domain::reimbursement::{
    Reimbursement, ReimbursementCategory, ReimbursementId, ReimbursementStatus,
};
use tripdesk_core::domain::user::UserId;

use super::rows::{
    column, from_json, parse_date, parse_decimal, parse_timestamp, parse_version, timestamp,
    to_json, unknown_value,
};
use super::{ReimbursementRepository, RepositoryError, REIMBURSEMENT_ENTITY};
use crate::DbPool;

const SELECT_CLAIMS: &str = "SELECT id, user_id, user_name, amount, category, description,
        expense_date, attachments_json, status, approved_by, rejection_reason, version,
        created_at
    FROM reimbursement";

pub struct SqlReimbursementRepository {
    pool: DbPool,
}

impl SqlReimbursementRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_claim(row: &SqliteRow) -> Result<Reimbursement, RepositoryError> {
    let amount: String = column(row, "amount")?;
    let category: String = column(row, "category")?;
    let status: String = column(row, "status")?;
    let expense_date: String = column(row, "expense_date")?;
    let attachments: String = column(row, "attachments_json")?;
    let created_at: String = column(row, "created_at")?;

    Ok(Reimbursement {
        id: ReimbursementId(column(row, "id")?),
        user_id: UserId(column(row, "user_id")?),
        user_name: column(row, "user_name")?,
        amount: parse_decimal("amount", &amount)?,
        category: ReimbursementCategory::parse(&category)
            .ok_or_else(|| unknown_value("category", &category))?,
        description: column(row, "description")?,
        date: parse_date("expense_date", &expense_date)?,
        attachments: from_json("attachments_json", &attachments)?,
        status: ReimbursementStatus::parse(&status)
            .ok_or_else(|| unknown_value("status", &status))?,
        created_at: parse_timestamp("created_at", &created_at)?,
        approved_by: column(row, "approved_by")?,
        rejection_reason: column(row, "rejection_reason")?,
        version: parse_version(column(row, "version")?)?,
    })
}

#[async_trait::async_trait]
impl ReimbursementRepository for SqlReimbursementRepository {
    async fn find_by_id(
        &self,
        id: &ReimbursementId,
    ) -> Result<Option<Reimbursement>, RepositoryError> {
        let row = sqlx::query(&format!("{SELECT_CLAIMS} WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_claim).transpose()
    }

    async fn list_all(&self) -> Result<Vec<Reimbursement>, RepositoryError> {
        let rows = sqlx::query(&format!("{SELECT_CLAIMS} ORDER BY created_at DESC, id ASC"))
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(row_to_claim).collect()
    }

    async fn list_by_user(&self, user_id: &UserId) -> Result<Vec<Reimbursement>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "{SELECT_CLAIMS} WHERE user_id = ? ORDER BY created_at DESC, id ASC"
        ))
        .bind(&user_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_claim).collect()
    }

    async fn insert(&self, claim: Reimbursement) -> Result<(), RepositoryError> {
        let attachments = to_json("attachments_json", &claim.attachments)?;

        sqlx::query(
            "INSERT INTO reimbursement (id, user_id, user_name, amount, category, description,
                                        expense_date, attachments_json, status, approved_by,
                                        rejection_reason, version, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&claim.id.0)
        .bind(&claim.user_id.0)
        .bind(&claim.user_name)
        .bind(claim.amount.to_string())
        .bind(claim.category.as_str())
        .bind(&claim.description)
        .bind(claim.date.format("%Y-%m-%d").to_string())
        .bind(attachments)
        .bind(claim.status.as_str())
        .bind(&claim.approved_by)
        .bind(&claim.rejection_reason)
        .bind(i64::from(claim.version))
        .bind(timestamp(&claim.created_at))
        .execute(&self.pool)
        .await
        .map_err(RepositoryError::on_insert(REIMBURSEMENT_ENTITY, &claim.id.0))?;

        Ok(())
    }

    async fn update(&self, mut claim: Reimbursement) -> Result<Reimbursement, RepositoryError> {
        let attachments = to_json("attachments_json", &claim.attachments)?;

        let updated = sqlx::query(
            "UPDATE reimbursement SET
                 amount = ?, category = ?, description = ?, expense_date = ?,
                 attachments_json = ?, status = ?, approved_by = ?, rejection_reason = ?,
                 version = version + 1
             WHERE id = ? AND version = ?",
        )
        .bind(claim.amount.to_string())
        .bind(claim.category.as_str())
        .bind(&claim.description)
        .bind(claim.date.format("%Y-%m-%d").to_string())
        .bind(attachments)
        .bind(claim.status.as_str())
        .bind(&claim.approved_by)
        .bind(&claim.rejection_reason)
        .bind(&claim.id.0)
        .bind(i64::from(claim.version))
        .execute(&self.pool)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(RepositoryError::VersionConflict {
                entity: REIMBURSEMENT_ENTITY,
                id: claim.id.0,
                expected: claim.version,
            });
        }

        claim.version += 1;
        Ok(claim)
    }
}
