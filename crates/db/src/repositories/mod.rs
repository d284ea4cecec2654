use async_trait::async_trait;
use thiserror::Error;

use tripdesk_core::domain::reimbursement::{Reimbursement, ReimbursementId};
use tripdesk_core::domain::request::{RequestId, TravelRequest};
use tripdesk_core::domain::user::{User, UserId, UserProfile};
use tripdesk_core::errors::ApplicationError;

pub mod memory;
pub mod reimbursement;
pub mod request;
mod rows;
pub mod user;

pub use memory::{
    InMemoryProfileRepository, InMemoryReimbursementRepository, InMemoryTravelRequestRepository,
    InMemoryUserRepository,
};
pub use reimbursement::SqlReimbursementRepository;
pub use request::SqlTravelRequestRepository;
pub use user::{SqlProfileRepository, SqlUserRepository};

pub const USER_ENTITY: &str = "user";
pub const REQUEST_ENTITY: &str = "travel_request";
pub const REIMBURSEMENT_ENTITY: &str = "reimbursement";

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("{entity} `{id}` changed since version {expected}")]
    VersionConflict { entity: &'static str, id: String, expected: u32 },
    #[error("{entity} with key `{key}` already exists")]
    DuplicateKey { entity: &'static str, key: String },
}

impl RepositoryError {
    /// Maps a unique-constraint failure on insert to [`RepositoryError::DuplicateKey`].
    pub(crate) fn on_insert(entity: &'static str, key: &str) -> impl FnOnce(sqlx::Error) -> Self {
        let key = key.to_owned();
        move |error| match &error {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                Self::DuplicateKey { entity, key }
            }
            _ => Self::Database(error),
        }
    }
}

impl From<RepositoryError> for ApplicationError {
    fn from(error: RepositoryError) -> Self {
        match error {
            RepositoryError::VersionConflict { entity, id, .. } => {
                ApplicationError::ConcurrentModification { entity, id }
            }
            RepositoryError::DuplicateKey { entity: USER_ENTITY, key } => {
                ApplicationError::DuplicateEmail(key)
            }
            other => ApplicationError::Persistence(other.to_string()),
        }
    }
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, RepositoryError>;
    /// Exact, case-sensitive match.
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError>;
    /// Fails with `DuplicateKey` when the id or email is taken.
    async fn insert(&self, user: User) -> Result<(), RepositoryError>;
    async fn list(&self) -> Result<Vec<User>, RepositoryError>;
    /// Returns whether a row was removed.
    async fn delete(&self, id: &UserId) -> Result<bool, RepositoryError>;
}

#[async_trait]
pub trait ProfileRepository: Send + Sync {
    async fn get(&self, user_id: &UserId) -> Result<Option<UserProfile>, RepositoryError>;
    /// Full replace.
    async fn put(&self, user_id: &UserId, profile: UserProfile) -> Result<(), RepositoryError>;
}

/// Storage for travel requests with optimistic concurrency on `version`.
#[async_trait]
pub trait TravelRequestRepository: Send + Sync {
    async fn find_by_id(&self, id: &RequestId) -> Result<Option<TravelRequest>, RepositoryError>;
    async fn list_all(&self) -> Result<Vec<TravelRequest>, RepositoryError>;
    async fn list_by_user(&self, user_id: &UserId) -> Result<Vec<TravelRequest>, RepositoryError>;
    async fn insert(&self, request: TravelRequest) -> Result<(), RepositoryError>;

    /// Compare-and-swap write. `request.version` must equal the stored version; the stored
    /// copy and the returned value carry `version + 1`.
    async fn update(&self, request: TravelRequest) -> Result<TravelRequest, RepositoryError>;

    /// Removes every listed id that exists, as one unit. Unknown ids are skipped.
    async fn delete_many(&self, ids: &[RequestId]) -> Result<usize, RepositoryError>;
}

#[async_trait]
pub trait ReimbursementRepository: Send + Sync {
    async fn find_by_id(
        &self,
        id: &ReimbursementId,
    ) -> Result<Option<Reimbursement>, RepositoryError>;
    async fn list_all(&self) -> Result<Vec<Reimbursement>, RepositoryError>;
    async fn list_by_user(&self, user_id: &UserId) -> Result<Vec<Reimbursement>, RepositoryError>;
    async fn insert(&self, claim: Reimbursement) -> Result<(), RepositoryError>;
    /// Same compare-and-swap contract as [`TravelRequestRepository::update`].
    async fn update(&self, claim: Reimbursement) -> Result<Reimbursement, RepositoryError>;
}

#[cfg(test)]
mod tests {
    use tripdesk_core::errors::ApplicationError;

    use super::{RepositoryError, REQUEST_ENTITY, USER_ENTITY};

    #[test]
    fn repository_errors_map_to_application_errors() {
        let conflict = RepositoryError::VersionConflict {
            entity: REQUEST_ENTITY,
            id: "REQ-1".to_owned(),
            expected: 2,
        };
        assert!(matches!(
            ApplicationError::from(conflict),
            ApplicationError::ConcurrentModification { entity: REQUEST_ENTITY, .. }
        ));

        let duplicate =
            RepositoryError::DuplicateKey { entity: USER_ENTITY, key: "a@corp.com".to_owned() };
        assert_eq!(
            ApplicationError::from(duplicate),
            ApplicationError::DuplicateEmail("a@corp.com".to_owned())
        );

        let decode = RepositoryError::Decode("bad row".to_owned());
        assert!(matches!(ApplicationError::from(decode), ApplicationError::Persistence(_)));
    }
}
