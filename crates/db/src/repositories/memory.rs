use std::collections::HashMap;

use tokio::sync::RwLock;

use tripdesk_core::domain::reimbursement::{Reimbursement, ReimbursementId};
use tripdesk_core::domain::request::{RequestId, TravelRequest};
use tripdesk_core::domain::user::{User, UserId, UserProfile};

use super::{
    ProfileRepository, ReimbursementRepository, RepositoryError, TravelRequestRepository,
    UserRepository, REIMBURSEMENT_ENTITY, REQUEST_ENTITY, USER_ENTITY,
};

#[derive(Default)]
pub struct InMemoryUserRepository {
    users: RwLock<HashMap<String, User>>,
}

#[async_trait::async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, RepositoryError> {
        let users = self.users.read().await;
        Ok(users.get(&id.0).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError> {
        let users = self.users.read().await;
        Ok(users.values().find(|user| user.email == email).cloned())
    }

    async fn insert(&self, user: User) -> Result<(), RepositoryError> {
        let mut users = self.users.write().await;
        if users.contains_key(&user.id.0) || users.values().any(|known| known.email == user.email)
        {
            return Err(RepositoryError::DuplicateKey { entity: USER_ENTITY, key: user.email });
        }
        users.insert(user.id.0.clone(), user);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<User>, RepositoryError> {
        let users = self.users.read().await;
        let mut listed: Vec<User> = users.values().cloned().collect();
        listed.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(listed)
    }

    async fn delete(&self, id: &UserId) -> Result<bool, RepositoryError> {
        let mut users = self.users.write().await;
        Ok(users.remove(&id.0).is_some())
    }
}

#[derive(Default)]
pub struct InMemoryProfileRepository {
    profiles: RwLock<HashMap<String, UserProfile>>,
}

#[async_trait::async_trait]
impl ProfileRepository for InMemoryProfileRepository {
    async fn get(&self, user_id: &UserId) -> Result<Option<UserProfile>, RepositoryError> {
        let profiles = self.profiles.read().await;
        Ok(profiles.get(&user_id.0).cloned())
    }

    async fn put(&self, user_id: &UserId, profile: UserProfile) -> Result<(), RepositoryError> {
        let mut profiles = self.profiles.write().await;
        profiles.insert(user_id.0.clone(), profile);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryTravelRequestRepository {
    requests: RwLock<HashMap<String, TravelRequest>>,
}

fn newest_first(mut requests: Vec<TravelRequest>) -> Vec<TravelRequest> {
    requests.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.0.cmp(&b.id.0)));
    requests
}

#[async_trait::async_trait]
impl TravelRequestRepository for InMemoryTravelRequestRepository {
    async fn find_by_id(&self, id: &RequestId) -> Result<Option<TravelRequest>, RepositoryError> {
        let requests = self.requests.read().await;
        Ok(requests.get(&id.0).cloned())
    }

    async fn list_all(&self) -> Result<Vec<TravelRequest>, RepositoryError> {
        let requests = self.requests.read().await;
        Ok(newest_first(requests.values().cloned().collect()))
    }

    async fn list_by_user(&self, user_id: &UserId) -> Result<Vec<TravelRequest>, RepositoryError> {
        let requests = self.requests.read().await;
        Ok(newest_first(
            requests.values().filter(|request| &request.user_id == user_id).cloned().collect(),
        ))
    }

    async fn insert(&self, request: TravelRequest) -> Result<(), RepositoryError> {
        let mut requests = self.requests.write().await;
        if requests.contains_key(&request.id.0) {
            return Err(RepositoryError::DuplicateKey { entity: REQUEST_ENTITY, key: request.id.0 });
        }
        requests.insert(request.id.0.clone(), request);
        Ok(())
    }

    async fn update(&self, mut request: TravelRequest) -> Result<TravelRequest, RepositoryError> {
        let mut requests = self.requests.write().await;
        let stored_version = requests.get(&request.id.0).map(|stored| stored.version);
        if stored_version != Some(request.version) {
            return Err(RepositoryError::VersionConflict {
                entity: REQUEST_ENTITY,
                id: request.id.0,
                expected: request.version,
            });
        }

        request.version += 1;
        requests.insert(request.id.0.clone(), request.clone());
        Ok(request)
    }

    async fn delete_many(&self, ids: &[RequestId]) -> Result<usize, RepositoryError> {
        let mut requests = self.requests.write().await;
        Ok(ids.iter().filter(|id| requests.remove(&id.0).is_some()).count())
    }
}

#[derive(Default)]
pub struct InMemoryReimbursementRepository {
    claims: RwLock<HashMap<String, Reimbursement>>,
}

fn claims_newest_first(mut claims: Vec<Reimbursement>) -> Vec<Reimbursement> {
    claims.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.0.cmp(&b.id.0)));
    claims
}

#[async_trait::async_trait]
impl ReimbursementRepository for InMemoryReimbursementRepository {
    async fn find_by_id(
        &self,
        id: &ReimbursementId,
    ) -> Result<Option<Reimbursement>, RepositoryError> {
        let claims = self.claims.read().await;
        Ok(claims.get(&id.0).cloned())
    }

    async fn list_all(&self) -> Result<Vec<Reimbursement>, RepositoryError> {
        let claims = self.claims.read().await;
        Ok(claims_newest_first(claims.values().cloned().collect()))
    }

    async fn list_by_user(&self, user_id: &UserId) -> Result<Vec<Reimbursement>, RepositoryError> {
        let claims = self.claims.read().await;
        Ok(claims_newest_first(
            claims.values().filter(|claim| &claim.user_id == user_id).cloned().collect(),
        ))
    }

    async fn insert(&self, claim: Reimbursement) -> Result<(), RepositoryError> {
        let mut claims = self.claims.write().await;
        if claims.contains_key(&claim.id.0) {
            return Err(RepositoryError::DuplicateKey {
                entity: REIMBURSEMENT_ENTITY,
                key: claim.id.0,
            });
        }
        claims.insert(claim.id.0.clone(), claim);
        Ok(())
    }

    async fn update(&self, mut claim: Reimbursement) -> Result<Reimbursement, RepositoryError> {
        let mut claims = self.claims.write().await;
        let stored_version = claims.get(&claim.id.0).map(|stored| stored.version);
        if stored_version != Some(claim.version) {
            return Err(RepositoryError::VersionConflict {
                entity: REIMBURSEMENT_ENTITY,
                id: claim.id.0,
                expected: claim.version,
            });
        }

        claim.version += 1;
        claims.insert(claim.id.0.clone(), claim.clone());
        Ok(claim)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use tripdesk_core::domain::request::{RequestId, TravelRequest};
    use tripdesk_core::domain::user::{User, UserId};

    use crate::fixtures::demo_flight;
    use crate::repositories::{
        InMemoryTravelRequestRepository, InMemoryUserRepository, RepositoryError,
        TravelRequestRepository, UserRepository,
    };

    fn request(id: &str, owner: &User, day: u32) -> TravelRequest {
        let at = Utc.with_ymd_and_hms(2024, 3, day, 9, 0, 0).single().expect("timestamp");
        TravelRequest::submit(RequestId(id.to_owned()), owner, demo_flight("客户拜访", "上海"), at)
            .expect("valid request")
    }

    #[tokio::test]
    async fn user_email_is_unique() {
        let repo = InMemoryUserRepository::default();
        repo.insert(User::new_employee("甲", "a@corp.com")).await.expect("first");

        let duplicate = repo.insert(User::new_employee("乙", "a@corp.com")).await;

        assert!(matches!(duplicate, Err(RepositoryError::DuplicateKey { .. })));
        assert!(repo.find_by_email("A@corp.com").await.expect("lookup").is_none());
    }

    #[tokio::test]
    async fn update_is_compare_and_swap_on_version() {
        let repo = InMemoryTravelRequestRepository::default();
        let owner = User::new_employee("王员工", "wang@corp.com");
        repo.insert(request("REQ-1", &owner, 1)).await.expect("insert");

        let first = repo.find_by_id(&RequestId("REQ-1".to_owned())).await.expect("find");
        let first = first.expect("present");
        let stale = first.clone();

        let saved = repo.update(first).await.expect("first writer wins");
        assert_eq!(saved.version, 1);

        let lost = repo.update(stale).await;
        assert!(matches!(lost, Err(RepositoryError::VersionConflict { expected: 0, .. })));
    }

    #[tokio::test]
    async fn delete_many_skips_unknown_ids_and_lists_newest_first() {
        let repo = InMemoryTravelRequestRepository::default();
        let owner = User::new_employee("王员工", "wang@corp.com");
        for (id, day) in [("REQ-1", 1), ("REQ-2", 2), ("REQ-3", 3)] {
            repo.insert(request(id, &owner, day)).await.expect("insert");
        }

        let removed = repo
            .delete_many(&[RequestId("REQ-1".to_owned()), RequestId("REQ-3".to_owned())])
            .await
            .expect("delete");
        assert_eq!(removed, 2);
        assert_eq!(repo.delete_many(&[RequestId("REQ-1".to_owned())]).await.expect("noop"), 0);

        let remaining = repo.list_by_user(&owner.id).await.expect("list");
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id.0, "REQ-2");
        assert!(repo.list_by_user(&UserId("nobody".to_owned())).await.expect("list").is_empty());
    }
}
