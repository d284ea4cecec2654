use chrono::Utc;
use sqlx::sqlite::SqliteRow;

use tripdesk_core::domain::user::{
    IdentityDocument, Role, Traveler, User, UserId, UserProfile,
};

use super::rows::{column, from_json, timestamp, to_json, unknown_value};
use super::{ProfileRepository, RepositoryError, UserRepository, USER_ENTITY};
use crate::DbPool;

pub struct SqlUserRepository {
    pool: DbPool,
}

impl SqlUserRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_user(row: &SqliteRow) -> Result<User, RepositoryError> {
    let role: String = column(row, "role")?;
    Ok(User {
        id: UserId(column(row, "id")?),
        name: column(row, "name")?,
        email: column(row, "email")?,
        role: Role::parse(&role).ok_or_else(|| unknown_value("role", &role))?,
    })
}

#[async_trait::async_trait]
impl UserRepository for SqlUserRepository {
    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query("SELECT id, name, email, role FROM app_user WHERE id = ?")
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_user).transpose()
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query("SELECT id, name, email, role FROM app_user WHERE email = ?")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_user).transpose()
    }

    async fn insert(&self, user: User) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO app_user (id, name, email, role, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&user.id.0)
        .bind(&user.name)
        .bind(&user.email)
        .bind(user.role.as_str())
        .bind(timestamp(&Utc::now()))
        .execute(&self.pool)
        .await
        .map_err(RepositoryError::on_insert(USER_ENTITY, &user.email))?;

        Ok(())
    }

    async fn list(&self) -> Result<Vec<User>, RepositoryError> {
        let rows = sqlx::query("SELECT id, name, email, role FROM app_user ORDER BY id")
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(row_to_user).collect()
    }

    async fn delete(&self, id: &UserId) -> Result<bool, RepositoryError> {
        let removed = sqlx::query("DELETE FROM app_user WHERE id = ?")
            .bind(&id.0)
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(removed > 0)
    }
}

pub struct SqlProfileRepository {
    pool: DbPool,
}

impl SqlProfileRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_profile(row: &SqliteRow) -> Result<UserProfile, RepositoryError> {
    let documents: String = column(row, "documents_json")?;
    let contacts: String = column(row, "contacts_json")?;

    Ok(UserProfile {
        chinese_name: column(row, "chinese_name")?,
        english_name: column(row, "english_name")?,
        nationality: column(row, "nationality")?,
        gender: column(row, "gender")?,
        birthday: column(row, "birthday")?,
        birth_place: column(row, "birth_place")?,
        phone: column(row, "phone")?,
        email: column(row, "email")?,
        documents: from_json::<Vec<IdentityDocument>>("documents_json", &documents)?,
        contacts: from_json::<Vec<Traveler>>("contacts_json", &contacts)?,
    })
}

#[async_trait::async_trait]
impl ProfileRepository for SqlProfileRepository {
    async fn get(&self, user_id: &UserId) -> Result<Option<UserProfile>, RepositoryError> {
        let row = sqlx::query(
            "SELECT chinese_name, english_name, nationality, gender, birthday, birth_place,
                    phone, email, documents_json, contacts_json
             FROM user_profile WHERE user_id = ?",
        )
        .bind(&user_id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_profile).transpose()
    }

    async fn put(&self, user_id: &UserId, profile: UserProfile) -> Result<(), RepositoryError> {
        let documents = to_json("documents_json", &profile.documents)?;
        let contacts = to_json("contacts_json", &profile.contacts)?;

        sqlx::query(
            "INSERT INTO user_profile (user_id, chinese_name, english_name, nationality, gender,
                                       birthday, birth_place, phone, email, documents_json,
                                       contacts_json, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(user_id) DO UPDATE SET
                 chinese_name = excluded.chinese_name,
                 english_name = excluded.english_name,
                 nationality = excluded.nationality,
                 gender = excluded.gender,
                 birthday = excluded.birthday,
                 birth_place = excluded.birth_place,
                 phone = excluded.phone,
                 email = excluded.email,
                 documents_json = excluded.documents_json,
                 contacts_json = excluded.contacts_json,
                 updated_at = excluded.updated_at",
        )
        .bind(&user_id.0)
        .bind(&profile.chinese_name)
        .bind(&profile.english_name)
        .bind(&profile.nationality)
        .bind(&profile.gender)
        .bind(&profile.birthday)
        .bind(&profile.birth_place)
        .bind(&profile.phone)
        .bind(&profile.email)
        .bind(documents)
        .bind(contacts)
        .bind(timestamp(&Utc::now()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
