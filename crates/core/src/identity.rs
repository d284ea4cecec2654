use secrecy::{ExposeSecret, SecretString};

use crate::config::IdentityConfig;
use crate::domain::user::{User, UserProfile};
use crate::errors::DomainError;

/// Where a login attempt should be resolved.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LoginRoute {
    Admin,
    /// Employee accounts are looked up by exact email; no password is checked.
    Email(String),
}

#[derive(Clone, Debug)]
pub struct IdentityPolicy {
    admin_handle: String,
    admin_password: SecretString,
}

impl IdentityPolicy {
    pub fn new(admin_handle: impl Into<String>, admin_password: SecretString) -> Self {
        Self { admin_handle: admin_handle.into(), admin_password }
    }

    pub fn from_config(config: &IdentityConfig) -> Self {
        Self::new(config.admin_handle.clone(), config.admin_password.clone())
    }

    pub fn admin_handle(&self) -> &str {
        &self.admin_handle
    }

    pub fn admin_user(&self) -> User {
        User::admin(self.admin_handle.clone())
    }

    /// `None` means "no such user"; a wrong admin password is indistinguishable from an
    /// unknown identifier.
    pub fn route(&self, identifier: &str, password: Option<&str>) -> Option<LoginRoute> {
        let identifier = identifier.trim();
        if identifier.is_empty() {
            return None;
        }

        if identifier == self.admin_handle {
            let matches = password.is_some_and(|given| given == self.admin_password.expose_secret());
            return matches.then_some(LoginRoute::Admin);
        }

        Some(LoginRoute::Email(identifier.to_owned()))
    }
}

/// Validated sign-up input.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Registration {
    pub name: String,
    pub email: String,
}

impl Registration {
    pub fn parse(name: &str, email: &str) -> Result<Self, DomainError> {
        let name = name.trim();
        let email = email.trim();

        if name.is_empty() {
            return Err(DomainError::Validation("name is required".to_owned()));
        }
        if email.is_empty() || !email.contains('@') {
            return Err(DomainError::Validation(format!("`{email}` is not a valid email")));
        }

        Ok(Self { name: name.to_owned(), email: email.to_owned() })
    }

    pub fn into_account(self) -> (User, UserProfile) {
        let user = User::new_employee(self.name, self.email);
        let profile = UserProfile::for_new_user(&user);
        (user, profile)
    }
}

#[cfg(test)]
mod tests {
    use secrecy::SecretString;

    use super::{IdentityPolicy, LoginRoute, Registration};
    use crate::domain::user::Role;
    use crate::errors::DomainError;

    fn policy() -> IdentityPolicy {
        IdentityPolicy::new("admin", SecretString::from("admin123".to_owned()))
    }

    #[test]
    fn admin_requires_the_configured_password() {
        let policy = policy();

        assert_eq!(policy.route("admin", Some("admin123")), Some(LoginRoute::Admin));
        assert_eq!(policy.route("admin", Some("wrong")), None);
        assert_eq!(policy.route("admin", None), None);
    }

    #[test]
    fn other_identifiers_route_to_email_lookup() {
        let policy = policy();

        assert_eq!(
            policy.route(" user@corp.com ", None),
            Some(LoginRoute::Email("user@corp.com".to_owned()))
        );
        assert_eq!(policy.route("   ", Some("x")), None);
        assert_eq!(policy.admin_user().role, Role::Admin);
        assert_eq!(policy.admin_user().email, "admin");
    }

    #[test]
    fn registration_validates_name_and_email() {
        assert!(matches!(Registration::parse("", "a@b.com"), Err(DomainError::Validation(_))));
        assert!(matches!(Registration::parse("张三", "nope"), Err(DomainError::Validation(_))));

        let (user, profile) =
            Registration::parse(" 张三 ", "zhang@corp.com").expect("valid").into_account();
        assert_eq!(user.name, "张三");
        assert_eq!(user.role, Role::User);
        assert_eq!(profile.chinese_name, "张三");
    }
}
