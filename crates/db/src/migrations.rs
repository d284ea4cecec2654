use sqlx::migrate::{MigrateError, Migrator};

use crate::DbPool;

pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

pub async fn run_pending(pool: &DbPool) -> Result<(), MigrateError> {
    MIGRATOR.run(pool).await
}

/// Rolls back every applied migration.
pub async fn undo_all(pool: &DbPool) -> Result<(), MigrateError> {
    MIGRATOR.undo(pool, 0).await
}

#[cfg(test)]
mod tests {
    use sqlx::Row;

    use super::{run_pending, undo_all};
    use crate::connect_with_settings;

    const MANAGED_TABLES: &[&str] = &[
        "app_user",
        "user_profile",
        "travel_request",
        "request_comment",
        "request_audit_log",
        "reimbursement",
    ];

    const MANAGED_INDEXES: &[&str] = &[
        "idx_travel_request_user_id",
        "idx_travel_request_status",
        "idx_travel_request_created_at",
        "idx_request_comment_request_id",
        "idx_request_audit_log_request_id",
        "idx_reimbursement_user_id",
        "idx_reimbursement_status",
    ];

    fn is_managed(name: &str) -> bool {
        MANAGED_TABLES.contains(&name) || MANAGED_INDEXES.contains(&name)
    }

    async fn table_exists(pool: &sqlx::SqlitePool, table: &str) -> bool {
        sqlx::query(
            "SELECT COUNT(*) AS count FROM sqlite_master WHERE type = 'table' AND name = ?",
        )
        .bind(table)
        .fetch_one(pool)
        .await
        .expect("query sqlite_master")
        .get::<i64, _>("count")
            == 1
    }

    #[tokio::test]
    async fn migrations_create_baseline_tables() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("run migrations");

        for table in MANAGED_TABLES {
            assert!(table_exists(&pool, table).await, "missing table {table}");
        }
    }

    #[tokio::test]
    async fn migrations_are_reversible() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("run migrations");

        undo_all(&pool).await.expect("undo migrations");

        assert!(!table_exists(&pool, "travel_request").await);
        assert!(!table_exists(&pool, "reimbursement").await);
    }

    #[tokio::test]
    async fn migrations_up_down_up_preserves_schema_signature() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("run migrations");

        let initial_signature = managed_schema_signature(&pool).await;
        assert_eq!(
            initial_signature.len(),
            MANAGED_TABLES.len() + MANAGED_INDEXES.len(),
            "initial migration pass should create all managed schema objects",
        );

        undo_all(&pool).await.expect("undo migrations");
        assert!(managed_schema_signature(&pool).await.is_empty());

        run_pending(&pool).await.expect("re-run migrations");
        assert_eq!(managed_schema_signature(&pool).await, initial_signature);
    }

    #[tokio::test]
    async fn email_uniqueness_is_enforced_by_the_schema() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("run migrations");

        let insert = "INSERT INTO app_user (id, name, email, role, created_at)
                      VALUES (?, ?, 'dup@corp.com', 'USER', '2024-01-01T00:00:00Z')";
        sqlx::query(insert).bind("u1").bind("甲").execute(&pool).await.expect("first insert");
        let second = sqlx::query(insert).bind("u2").bind("乙").execute(&pool).await;

        assert!(second.is_err());
    }

    async fn managed_schema_signature(pool: &sqlx::SqlitePool) -> Vec<(String, String, String)> {
        let mut signature: Vec<(String, String, String)> = sqlx::query(
            "SELECT type, name, IFNULL(sql, '') AS sql
             FROM sqlite_master
             WHERE type IN ('table', 'index')",
        )
        .fetch_all(pool)
        .await
        .expect("load schema objects")
        .into_iter()
        .filter_map(|row| {
            let name = row.get::<String, _>("name");
            is_managed(&name)
                .then(|| (row.get::<String, _>("type"), name, row.get::<String, _>("sql")))
        })
        .collect();
        signature.sort();
        signature
    }
}
