use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::DomainError;

pub const ADMIN_USER_ID: &str = "admin";
pub const DEFAULT_NATIONALITY: &str = "中国大陆";

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub String);

impl UserId {
    pub fn generate() -> Self {
        Self(format!("u{}", Uuid::new_v4().simple()))
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "USER",
            Self::Admin => "ADMIN",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "USER" => Some(Self::User),
            "ADMIN" => Some(Self::Admin),
            _ => None,
        }
    }
}

/// An account. The role is fixed at creation; no promotion path exists.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub role: Role,
}

impl User {
    pub fn new_employee(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self { id: UserId::generate(), name: name.into(), email: email.into(), role: Role::User }
    }

    pub fn admin(handle: impl Into<String>) -> Self {
        Self {
            id: UserId(ADMIN_USER_ID.to_owned()),
            name: "系统管理员".to_owned(),
            email: handle.into(),
            role: Role::Admin,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Whether this actor may see entities owned by `owner`.
    pub fn can_view(&self, owner: &UserId) -> bool {
        self.is_admin() || &self.id == owner
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityDocument {
    pub doc_type: String,
    pub number: String,
    pub expiry_date: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Traveler {
    pub name: String,
    pub id_type: String,
    pub id_number: String,
    pub phone: String,
}

impl Traveler {
    pub fn validate(&self, position: usize) -> Result<(), DomainError> {
        let missing = [
            ("name", self.name.trim().is_empty()),
            ("id_number", self.id_number.trim().is_empty()),
            ("phone", self.phone.trim().is_empty()),
        ]
        .into_iter()
        .filter_map(|(field, empty)| empty.then_some(field))
        .collect::<Vec<_>>();

        if missing.is_empty() {
            return Ok(());
        }

        Err(DomainError::Validation(format!(
            "traveler #{} is missing required fields: {}",
            position + 1,
            missing.join(", ")
        )))
    }
}

/// Per-user profile, replaced wholesale on update.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub chinese_name: String,
    pub english_name: Option<String>,
    pub nationality: Option<String>,
    pub gender: Option<String>,
    pub birthday: Option<String>,
    pub birth_place: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub documents: Vec<IdentityDocument>,
    pub contacts: Vec<Traveler>,
}

impl UserProfile {
    pub fn for_new_user(user: &User) -> Self {
        Self {
            chinese_name: user.name.clone(),
            nationality: Some(DEFAULT_NATIONALITY.to_owned()),
            email: Some(user.email.clone()),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Role, Traveler, User, UserId, UserProfile};
    use crate::errors::DomainError;

    #[test]
    fn employees_only_view_their_own_entities() {
        let employee = User::new_employee("王员工", "user@corp.com");
        let admin = User::admin("admin");
        let other = UserId("u-other".to_owned());

        assert!(employee.can_view(&employee.id));
        assert!(!employee.can_view(&other));
        assert!(admin.can_view(&other));
        assert_eq!(employee.role, Role::User);
    }

    #[test]
    fn traveler_validation_names_every_missing_field() {
        let traveler = Traveler {
            name: "李四".to_owned(),
            id_type: "身份证".to_owned(),
            id_number: " ".to_owned(),
            phone: String::new(),
        };

        let error = traveler.validate(1).expect_err("incomplete traveler");
        assert_eq!(
            error,
            DomainError::Validation(
                "traveler #2 is missing required fields: id_number, phone".to_owned()
            )
        );
    }

    #[test]
    fn new_user_profile_copies_identity_fields() {
        let user = User::new_employee("张三", "zhang@corp.com");
        let profile = UserProfile::for_new_user(&user);

        assert_eq!(profile.chinese_name, "张三");
        assert_eq!(profile.email.as_deref(), Some("zhang@corp.com"));
        assert_eq!(profile.nationality.as_deref(), Some("中国大陆"));
        assert!(profile.documents.is_empty());
        assert!(profile.contacts.is_empty());
    }
}
